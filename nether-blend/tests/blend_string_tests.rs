//! End-to-end tests for blend string compilation.

use nether_blend::*;

const NO_FEATURES: BlendCapabilities = BlendCapabilities {
    separate_equation: false,
    blend_constant: false,
};

// ============================================================================
// Accepted strings
// ============================================================================

#[test]
fn test_valid_strings_compile() {
    let valid = [
        "RGBA = ADD(SRC_COLOR*(SRC_COLOR[A]), DST_COLOR*(1-SRC_COLOR[A]))",
        "RGBA = ADD(SRC_COLOR,\nDST_COLOR*(0))",
        "RGBA = ADD(SRC_COLOR, 0)",
        "RGBA = ADD(SRC_COLOR, DST_COLOR)",
        "RGBA=ADD(SRC_COLOR,DST_COLOR)",
        "RGB = ADD(SRC_COLOR, DST_COLOR*(1-SRC_COLOR[A])) A = ADD(SRC_COLOR, 0)",
        "RGBA = ADD(1-SRC_COLOR, 0)",
        "RGBA = ADD(0, DST_COLOR)",
        "RGBA = ADD(SRC_COLOR*(DST_COLOR[RGB]), DST_COLOR*(SRC_COLOR[RGBA]))",
    ];

    for text in valid {
        if let Err(e) = compile(&BlendCapabilities::ALL, text) {
            panic!("unexpected error for {:?}: {}", text, e);
        }
    }
}

#[test]
fn test_default_blend_structure() {
    let statements = compile(
        &BlendCapabilities::ALL,
        "RGBA = ADD(SRC_COLOR, DST_COLOR*(1-SRC_COLOR[A]))",
    )
    .unwrap();
    let statement = &statements.as_slice()[0];

    assert!(statement.args[0].factor.is_one);
    let factor = &statement.args[1].factor;
    assert!(factor.is_color);
    assert!(factor.source.one_minus);
    assert_eq!(factor.source.kind, Some(ColorSourceKind::SrcColor));
    assert_eq!(factor.source.mask, ChannelMask::Alpha);
}

// ============================================================================
// Rejected strings
// ============================================================================

#[test]
fn test_missing_arguments_rejected() {
    let err = compile(&BlendCapabilities::ALL, "RGBA = ADD()").unwrap_err();
    assert!(matches!(err, BlendStringError::Parse { .. }));
}

#[test]
fn test_lone_rgb_statement_rejected() {
    let err = compile(&BlendCapabilities::ALL, "RGB = ADD(SRC_COLOR, DST_COLOR)").unwrap_err();
    assert_eq!(
        err,
        BlendStringError::Invalid {
            message: "You need to also give a blend statement for the Alpha channel"
        }
    );
}

#[test]
fn test_lone_alpha_statement_rejected() {
    let err = compile(&BlendCapabilities::ALL, "A = ADD(SRC_COLOR, DST_COLOR)").unwrap_err();
    assert_eq!(
        err,
        BlendStringError::Invalid {
            message: "You need to also give a blend statement for the RGB channels"
        }
    );
}

#[test]
fn test_swapped_sources_rejected() {
    let err = compile(&BlendCapabilities::ALL, "RGBA = ADD(DST_COLOR, SRC_COLOR)").unwrap_err();
    assert!(matches!(err, BlendStringError::Invalid { .. }));
    assert!(!err.is_unsupported());
}

#[test]
fn test_zero_source_skips_source_check() {
    assert!(compile(&BlendCapabilities::ALL, "RGBA = ADD(0, 0)").is_ok());
}

#[test]
fn test_constant_factor_needs_capability() {
    let text = "RGBA = ADD(SRC_COLOR*(CONSTANT[A]), 0)";
    assert!(compile(&BlendCapabilities::ALL, text).is_ok());

    let err = compile(&NO_FEATURES, text).unwrap_err();
    assert!(err.is_unsupported());
    assert!(matches!(
        err,
        BlendStringError::Unsupported {
            feature: BlendFeature::BlendConstant,
            ..
        }
    ));
    assert_eq!(
        err.to_string(),
        "Invalid blend string: Constant blend factors aren't supported"
    );
}

#[test]
fn test_same_function_needs_no_separate_equation() {
    let text = "RGB = ADD(SRC_COLOR, DST_COLOR) A = ADD(SRC_COLOR, 0)";
    assert!(compile(&NO_FEATURES, text).is_ok());
}

#[test]
fn test_parse_error_display() {
    let err = compile(&BlendCapabilities::ALL, "RGBA = ADD(SRC_COLOR, DST_COLOR*(1-)").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Syntax error for argument 1 at offset 35: expected a color source name"
    );

    let err = compile(&BlendCapabilities::ALL, "RGBA").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Syntax error at offset 4: Expected an '=' following the destination channel mask"
    );
}

// ============================================================================
// Splitting
// ============================================================================

#[test]
fn test_split_compiled_statement() {
    let statements = compile(
        &BlendCapabilities::ALL,
        "RGBA = ADD(SRC_COLOR*(DST_COLOR[RGBA]), DST_COLOR*(1-SRC_COLOR[A]))",
    )
    .unwrap();
    let (rgb, alpha) = statements.as_slice()[0].split_rgba();

    assert_eq!(rgb.mask, ChannelMask::Rgb);
    assert_eq!(alpha.mask, ChannelMask::Alpha);

    // Statement-masked sources follow the split
    assert_eq!(rgb.args[0].source.mask, ChannelMask::Rgb);
    assert_eq!(alpha.args[0].source.mask, ChannelMask::Alpha);
    assert_eq!(rgb.args[0].factor.source.mask, ChannelMask::Rgb);
    assert_eq!(alpha.args[0].factor.source.mask, ChannelMask::Alpha);

    // Explicit [A] factor stays alpha on both halves
    assert_eq!(rgb.args[1].factor.source.mask, ChannelMask::Alpha);
    assert_eq!(alpha.args[1].factor.source.mask, ChannelMask::Alpha);

    // Everything else is carried over
    assert_eq!(rgb.args[1].factor.source.one_minus, true);
    assert_eq!(rgb.function, alpha.function);
}
