//! Uniform values stored in the UNIFORMS group

/// A value bound to a uniform location
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// `count` float vectors of `components` each, flattened
    Float { components: u8, values: Vec<f32> },
    /// `count` int vectors of `components` each, flattened
    Int { components: u8, values: Vec<i32> },
    /// `count` square matrices of `dimensions`, column major unless `transpose`
    Matrix {
        dimensions: u8,
        transpose: bool,
        values: Vec<f32>,
    },
}

impl UniformValue {
    /// Number of array elements the value covers
    pub fn count(&self) -> usize {
        match self {
            UniformValue::Float { components, values } => values.len() / *components as usize,
            UniformValue::Int { components, values } => values.len() / *components as usize,
            UniformValue::Matrix {
                dimensions, values, ..
            } => values.len() / (*dimensions as usize * *dimensions as usize),
        }
    }
}
