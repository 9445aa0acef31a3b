use std::fmt;

/// Target feature a blend string needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFeature {
    /// Different functions for the RGB and alpha statements
    SeparateEquation,
    /// `CONSTANT` as a blend factor
    BlendConstant,
}

/// Error type for blend string compilation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlendStringError {
    /// The text does not follow the blend string grammar
    Parse {
        /// Byte offset of the offending character
        offset: usize,
        /// Index of the argument being parsed, if any
        argument: Option<usize>,
        message: &'static str,
    },
    /// Well-formed, but not a blend equation that can be expressed
    Invalid { message: &'static str },
    /// Well-formed, but needs a capability the target lacks
    Unsupported {
        feature: BlendFeature,
        message: &'static str,
    },
}

impl BlendStringError {
    /// Whether the failure depends on target capabilities
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BlendStringError::Unsupported { .. })
    }

    pub fn message(&self) -> &'static str {
        match self {
            BlendStringError::Parse { message, .. }
            | BlendStringError::Invalid { message }
            | BlendStringError::Unsupported { message, .. } => message,
        }
    }
}

impl fmt::Display for BlendStringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlendStringError::Parse {
                offset,
                argument: Some(argument),
                message,
            } => write!(
                f,
                "Syntax error for argument {} at offset {}: {}",
                argument, offset, message
            ),
            BlendStringError::Parse {
                offset,
                argument: None,
                message,
            } => write!(f, "Syntax error at offset {}: {}", offset, message),
            BlendStringError::Invalid { message }
            | BlendStringError::Unsupported { message, .. } => {
                write!(f, "Invalid blend string: {}", message)
            }
        }
    }
}

impl std::error::Error for BlendStringError {}
