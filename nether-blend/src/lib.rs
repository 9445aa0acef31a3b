//! Blend string compiler
//!
//! Turns a textual blend description into structured [`Statement`]s:
//!
//! ```text
//! RGBA = ADD(SRC_COLOR, DST_COLOR*(1-SRC_COLOR[A]))
//! RGB  = ADD(SRC_COLOR, DST_COLOR*(1-SRC_COLOR[A]))  A = ADD(SRC_COLOR, 0)
//! ```
//!
//! # Modules
//!
//! - [`statement`] - Statement, argument and factor types, RGBA splitting
//! - [`parser`] - Hand-written two-level state machine parser
//! - [`validate`] - Capability and semantic checks
//! - [`error`] - Error taxonomy

pub mod error;
pub mod parser;
pub mod statement;
pub mod validate;

pub use error::{BlendFeature, BlendStringError};
pub use statement::{
    Argument, BlendFunction, ChannelMask, ColorSource, ColorSourceKind, Factor, Statement,
    Statements,
};
pub use validate::BlendCapabilities;

/// Compiles a blend string into one RGBA statement or an RGB plus an
/// alpha statement.
///
/// # Errors
///
/// - [`BlendStringError::Parse`] when the text breaks the grammar
/// - [`BlendStringError::Invalid`] when it parses but is not a valid blend
/// - [`BlendStringError::Unsupported`] when `caps` lacks a needed feature
pub fn compile(caps: &BlendCapabilities, text: &str) -> Result<Statements, BlendStringError> {
    tracing::debug!("Compiling blend string: {:?}", text);

    let list = parser::Parser::new(text).parse_statements().inspect_err(|e| {
        tracing::debug!("Blend string {:?} rejected: {}", text, e);
    })?;

    for (i, statement) in list.iter().enumerate() {
        tracing::debug!(
            "Statement {}: mask={} function={} args={:?}",
            i,
            statement.mask.name(),
            statement.function.name(),
            statement.args
        );
    }

    validate::validate(caps, &list)?;

    Ok(Statements { list })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_round_trip() {
        let statements = compile(&BlendCapabilities::ALL, "RGBA=ADD(SRC_COLOR,DST_COLOR)").unwrap();
        assert_eq!(statements.len(), 1);

        let (rgb, alpha) = statements.rgb_alpha();
        assert_eq!(rgb, alpha);
        assert_eq!(rgb.mask, ChannelMask::Rgba);
        assert_eq!(rgb.function, BlendFunction::Add);

        let arg0 = &rgb.args[0];
        assert_eq!(arg0.source.kind, Some(ColorSourceKind::SrcColor));
        assert!(!arg0.source.one_minus);
        assert!(arg0.factor.is_one);

        let arg1 = &rgb.args[1];
        assert_eq!(arg1.source.kind, Some(ColorSourceKind::DstColor));
        assert!(!arg1.source.one_minus);
        assert!(arg1.factor.is_one);
    }

    #[test]
    fn test_rgb_alpha_order_independent() {
        let statements = compile(
            &BlendCapabilities::ALL,
            "A = ADD(SRC_COLOR, 0) RGB = ADD(SRC_COLOR, DST_COLOR)",
        )
        .unwrap();
        let (rgb, alpha) = statements.rgb_alpha();
        assert_eq!(rgb.mask, ChannelMask::Rgb);
        assert_eq!(alpha.mask, ChannelMask::Alpha);
    }
}
