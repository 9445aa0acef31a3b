//! Blend equation state
//!
//! A [`BlendState`] is the resolved form of a compiled blend string: one
//! equation and a source/destination factor pair for each of the RGB and
//! alpha channels, plus the constant color used by `CONSTANT` factors.

use nether_blend::{Argument, BlendFunction, ChannelMask, ColorSourceKind, Statement};

use super::render::Color;

/// Blend equation combining the scaled source and destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlendEquation {
    Add = 0x8006,
}

impl From<BlendFunction> for BlendEquation {
    fn from(function: BlendFunction) -> Self {
        match function {
            BlendFunction::Add => BlendEquation::Add,
        }
    }
}

/// Multiplier applied to a blend input
///
/// Discriminants follow the GL enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlendFactor {
    Zero = 0,
    One = 1,
    SrcColor = 0x0300,
    OneMinusSrcColor = 0x0301,
    SrcAlpha = 0x0302,
    OneMinusSrcAlpha = 0x0303,
    DstAlpha = 0x0304,
    OneMinusDstAlpha = 0x0305,
    DstColor = 0x0306,
    OneMinusDstColor = 0x0307,
    SrcAlphaSaturate = 0x0308,
    ConstantColor = 0x8001,
    OneMinusConstantColor = 0x8002,
    ConstantAlpha = 0x8003,
    OneMinusConstantAlpha = 0x8004,
}

impl BlendFactor {
    /// Maps a compiled blend argument to the factor it stands for.
    pub fn from_argument(arg: &Argument) -> Self {
        if arg.source.is_zero {
            return BlendFactor::Zero;
        }
        if arg.factor.is_one {
            return BlendFactor::One;
        }
        if arg.factor.is_src_alpha_saturate {
            return BlendFactor::SrcAlphaSaturate;
        }

        let source = &arg.factor.source;
        let alpha = source.mask == ChannelMask::Alpha;
        match (source.kind, alpha, source.one_minus) {
            (Some(ColorSourceKind::SrcColor), false, false) => BlendFactor::SrcColor,
            (Some(ColorSourceKind::SrcColor), false, true) => BlendFactor::OneMinusSrcColor,
            (Some(ColorSourceKind::SrcColor), true, false) => BlendFactor::SrcAlpha,
            (Some(ColorSourceKind::SrcColor), true, true) => BlendFactor::OneMinusSrcAlpha,
            (Some(ColorSourceKind::DstColor), false, false) => BlendFactor::DstColor,
            (Some(ColorSourceKind::DstColor), false, true) => BlendFactor::OneMinusDstColor,
            (Some(ColorSourceKind::DstColor), true, false) => BlendFactor::DstAlpha,
            (Some(ColorSourceKind::DstColor), true, true) => BlendFactor::OneMinusDstAlpha,
            (Some(ColorSourceKind::Constant), false, false) => BlendFactor::ConstantColor,
            (Some(ColorSourceKind::Constant), false, true) => BlendFactor::OneMinusConstantColor,
            (Some(ColorSourceKind::Constant), true, false) => BlendFactor::ConstantAlpha,
            (Some(ColorSourceKind::Constant), true, true) => BlendFactor::OneMinusConstantAlpha,
            (None, _, _) => BlendFactor::One,
        }
    }

    /// Whether this factor reads the blend constant
    pub fn uses_constant(self) -> bool {
        matches!(
            self,
            BlendFactor::ConstantColor
                | BlendFactor::OneMinusConstantColor
                | BlendFactor::ConstantAlpha
                | BlendFactor::OneMinusConstantAlpha
        )
    }
}

/// Resolved blend equations and factors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub equation_rgb: BlendEquation,
    pub equation_alpha: BlendEquation,
    pub src_factor_rgb: BlendFactor,
    pub dst_factor_rgb: BlendFactor,
    pub src_factor_alpha: BlendFactor,
    pub dst_factor_alpha: BlendFactor,
    pub constant: Color,
}

impl Default for BlendState {
    /// Premultiplied "over": `RGBA = ADD(SRC_COLOR, DST_COLOR*(1-SRC_COLOR[A]))`
    fn default() -> Self {
        Self {
            equation_rgb: BlendEquation::Add,
            equation_alpha: BlendEquation::Add,
            src_factor_rgb: BlendFactor::One,
            dst_factor_rgb: BlendFactor::OneMinusSrcAlpha,
            src_factor_alpha: BlendFactor::One,
            dst_factor_alpha: BlendFactor::OneMinusSrcAlpha,
            constant: Color::TRANSPARENT,
        }
    }
}

impl BlendState {
    /// Builds the equations from an RGB and an alpha statement, keeping
    /// `constant` as the blend constant.
    pub fn from_statements(rgb: &Statement, alpha: &Statement, constant: Color) -> Self {
        Self {
            equation_rgb: rgb.function.into(),
            equation_alpha: alpha.function.into(),
            src_factor_rgb: BlendFactor::from_argument(&rgb.args[0]),
            dst_factor_rgb: BlendFactor::from_argument(&rgb.args[1]),
            src_factor_alpha: BlendFactor::from_argument(&alpha.args[0]),
            dst_factor_alpha: BlendFactor::from_argument(&alpha.args[1]),
            constant,
        }
    }

    /// Whether any factor reads the constant color
    pub fn uses_constant(&self) -> bool {
        [
            self.src_factor_rgb,
            self.dst_factor_rgb,
            self.src_factor_alpha,
            self.dst_factor_alpha,
        ]
        .into_iter()
        .any(BlendFactor::uses_constant)
    }

    /// Render equivalence: the constant only matters when a factor reads it.
    pub fn equivalent(&self, other: &BlendState) -> bool {
        if self.equation_rgb != other.equation_rgb
            || self.equation_alpha != other.equation_alpha
            || self.src_factor_alpha != other.src_factor_alpha
            || self.dst_factor_alpha != other.dst_factor_alpha
            || self.src_factor_rgb != other.src_factor_rgb
            || self.dst_factor_rgb != other.dst_factor_rgb
        {
            return false;
        }

        if self.uses_constant() || other.uses_constant() {
            return self.constant == other.constant;
        }
        true
    }

    /// The identity blend that writes the source unchanged
    pub(crate) fn is_replace(&self) -> bool {
        self.equation_rgb == BlendEquation::Add
            && self.equation_alpha == BlendEquation::Add
            && self.src_factor_alpha == BlendFactor::One
            && self.dst_factor_alpha == BlendFactor::Zero
    }

    /// Default premultiplied "over", which only blends when the source
    /// is translucent
    pub(crate) fn is_over(&self) -> bool {
        self.src_factor_alpha == BlendFactor::One
            && self.dst_factor_alpha == BlendFactor::OneMinusSrcAlpha
            && self.src_factor_rgb == BlendFactor::One
            && self.dst_factor_rgb == BlendFactor::OneMinusSrcAlpha
    }
}
