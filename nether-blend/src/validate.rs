//! Semantic checks on parsed statements

use crate::error::{BlendFeature, BlendStringError};
use crate::statement::{ChannelMask, ColorSourceKind, Statement};

/// Target features that decide which blend strings are expressible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendCapabilities {
    /// RGB and alpha may use different blend equations
    pub separate_equation: bool,
    /// `CONSTANT` may appear as a blend factor
    pub blend_constant: bool,
}

impl BlendCapabilities {
    /// Every blend feature available
    pub const ALL: BlendCapabilities = BlendCapabilities {
        separate_equation: true,
        blend_constant: true,
    };
}

pub(crate) fn validate(
    caps: &BlendCapabilities,
    statements: &[Statement],
) -> Result<(), BlendStringError> {
    if let [single] = statements {
        match single.mask {
            ChannelMask::Alpha => {
                return Err(BlendStringError::Invalid {
                    message: "You need to also give a blend statement for the RGB channels",
                });
            }
            ChannelMask::Rgb => {
                return Err(BlendStringError::Invalid {
                    message: "You need to also give a blend statement for the Alpha channel",
                });
            }
            ChannelMask::Rgba => {}
        }
    }

    if let [first, second] = statements {
        if !caps.separate_equation && first.function != second.function {
            return Err(BlendStringError::Unsupported {
                feature: BlendFeature::SeparateEquation,
                message: "Separate blend functions for the RGB and A channels aren't supported",
            });
        }
    }

    for statement in statements {
        for (i, arg) in statement.args.iter().enumerate() {
            if arg.source.is_zero {
                continue;
            }

            let expected = match i {
                0 => ColorSourceKind::SrcColor,
                _ => ColorSourceKind::DstColor,
            };
            if arg.source.kind != Some(expected) {
                return Err(BlendStringError::Invalid {
                    message: "For blending you must always use SRC_COLOR for arg0 and DST_COLOR for arg1",
                });
            }

            if !caps.blend_constant
                && arg.factor.is_color
                && arg.factor.source.kind == Some(ColorSourceKind::Constant)
            {
                return Err(BlendStringError::Unsupported {
                    feature: BlendFeature::BlendConstant,
                    message: "Constant blend factors aren't supported",
                });
            }
        }
    }

    Ok(())
}
