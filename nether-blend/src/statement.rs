//! Compiled blend statement types
//!
//! A blend string compiles into one or two [`Statement`]s. Each statement
//! names the destination channels it writes, the blend function and the
//! function's arguments. An argument is a color source scaled by a factor.

use smallvec::SmallVec;

/// Destination or source channel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMask {
    /// Red, green and blue only
    Rgb,
    /// Alpha only
    Alpha,
    /// All four channels
    Rgba,
}

impl ChannelMask {
    /// Name as written in a blend string
    pub fn name(self) -> &'static str {
        match self {
            ChannelMask::Rgb => "RGB",
            ChannelMask::Alpha => "A",
            ChannelMask::Rgba => "RGBA",
        }
    }
}

/// Named color input of a blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSourceKind {
    /// The incoming fragment color
    SrcColor,
    /// The color already in the framebuffer
    DstColor,
    /// The blend constant color
    Constant,
}

/// Color source names, in lookup order.
const COLOR_SOURCES: [(&str, ColorSourceKind); 3] = [
    ("SRC_COLOR", ColorSourceKind::SrcColor),
    ("DST_COLOR", ColorSourceKind::DstColor),
    ("CONSTANT", ColorSourceKind::Constant),
];

impl ColorSourceKind {
    pub fn name(self) -> &'static str {
        match self {
            ColorSourceKind::SrcColor => "SRC_COLOR",
            ColorSourceKind::DstColor => "DST_COLOR",
            ColorSourceKind::Constant => "CONSTANT",
        }
    }

    /// Finds the first source whose name is a prefix of `word`.
    pub fn lookup(word: &[u8]) -> Option<Self> {
        COLOR_SOURCES
            .iter()
            .find(|(name, _)| word.starts_with(name.as_bytes()))
            .map(|&(_, kind)| kind)
    }
}

/// Blend function applied to a statement's arguments
///
/// Only `ADD` exists today. New equations slot in here with their arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFunction {
    /// `arg0 + arg1`
    Add,
}

const BLEND_FUNCTIONS: [BlendFunction; 1] = [BlendFunction::Add];

impl BlendFunction {
    pub fn name(self) -> &'static str {
        match self {
            BlendFunction::Add => "ADD",
        }
    }

    /// Number of arguments the function takes
    pub fn argc(self) -> usize {
        match self {
            BlendFunction::Add => 2,
        }
    }

    /// Finds the first function whose name is a prefix of `word`.
    pub fn lookup(word: &[u8]) -> Option<Self> {
        BLEND_FUNCTIONS
            .iter()
            .copied()
            .find(|function| word.starts_with(function.name().as_bytes()))
    }
}

/// A color input, optionally negated (`1-X`) and channel-masked (`X[A]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSource {
    /// The literal `0`; makes the whole argument contribute nothing
    pub is_zero: bool,
    /// Which color, `None` for literals
    pub kind: Option<ColorSourceKind>,
    /// `1-` prefix
    pub one_minus: bool,
    pub mask: ChannelMask,
}

impl ColorSource {
    pub(crate) fn new(mask: ChannelMask) -> Self {
        Self {
            is_zero: false,
            kind: None,
            one_minus: false,
            mask,
        }
    }
}

/// Multiplier applied to an argument's color source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Factor {
    /// Literal `1`, or no factor given
    pub is_one: bool,
    /// The `SRC_ALPHA_SATURATE` keyword
    pub is_src_alpha_saturate: bool,
    /// The factor is `source` below
    pub is_color: bool,
    pub source: ColorSource,
}

impl Factor {
    pub(crate) fn new(mask: ChannelMask) -> Self {
        Self {
            is_one: false,
            is_src_alpha_saturate: false,
            is_color: false,
            source: ColorSource::new(mask),
        }
    }
}

/// One term of a blend function: `source * factor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Argument {
    pub source: ColorSource,
    pub factor: Factor,
}

impl Argument {
    pub(crate) fn new(mask: ChannelMask) -> Self {
        Self {
            source: ColorSource::new(mask),
            factor: Factor::new(mask),
        }
    }
}

/// `MASK = FUNCTION(arg0, arg1, ...)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    pub mask: ChannelMask,
    pub function: BlendFunction,
    pub args: SmallVec<[Argument; 2]>,
}

impl Statement {
    /// Derives separate RGB and alpha statements from an RGBA one.
    ///
    /// Any RGBA-masked source (or color factor source) is narrowed to the
    /// half it now feeds. Needed by targets that program the RGB and alpha
    /// equations independently.
    pub fn split_rgba(&self) -> (Statement, Statement) {
        let mut rgb = self.clone();
        let mut alpha = self.clone();
        rgb.mask = ChannelMask::Rgb;
        alpha.mask = ChannelMask::Alpha;

        for (i, arg) in self.args.iter().enumerate() {
            if arg.source.mask == ChannelMask::Rgba {
                rgb.args[i].source.mask = ChannelMask::Rgb;
                alpha.args[i].source.mask = ChannelMask::Alpha;
            }
            if arg.factor.is_color && arg.factor.source.mask == ChannelMask::Rgba {
                rgb.args[i].factor.source.mask = ChannelMask::Rgb;
                alpha.args[i].factor.source.mask = ChannelMask::Alpha;
            }
        }

        (rgb, alpha)
    }
}

/// Result of compiling a blend string: one RGBA statement, or two
/// statements covering RGB and alpha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub(crate) list: SmallVec<[Statement; 2]>,
}

impl Statements {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn as_slice(&self) -> &[Statement] {
        &self.list
    }

    /// The statements driving the RGB and alpha equations.
    ///
    /// A lone statement drives both. With two statements the alpha-masked
    /// one drives alpha, whichever order they were written in.
    pub fn rgb_alpha(&self) -> (&Statement, &Statement) {
        match self.list.as_slice() {
            [single] => (single, single),
            [first, second] if first.mask == ChannelMask::Alpha => (second, first),
            [first, second, ..] => (first, second),
            [] => unreachable!("compiled blend strings hold at least one statement"),
        }
    }
}

impl<'a> IntoIterator for &'a Statements {
    type Item = &'a Statement;
    type IntoIter = std::slice::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn source(kind: ColorSourceKind, mask: ChannelMask) -> ColorSource {
        ColorSource {
            kind: Some(kind),
            ..ColorSource::new(mask)
        }
    }

    #[test]
    fn test_lookup_is_prefix_match() {
        assert_eq!(
            ColorSourceKind::lookup(b"SRC_COLOR"),
            Some(ColorSourceKind::SrcColor)
        );
        assert_eq!(
            ColorSourceKind::lookup(b"CONSTANT_X"),
            Some(ColorSourceKind::Constant)
        );
        assert_eq!(ColorSourceKind::lookup(b"SRC"), None);
        assert_eq!(BlendFunction::lookup(b"ADD"), Some(BlendFunction::Add));
        assert_eq!(BlendFunction::lookup(b"SUB"), None);
    }

    #[test]
    fn test_split_rgba_rewrites_masks() {
        let mut factor = Factor::new(ChannelMask::Rgba);
        factor.is_color = true;
        factor.source = source(ColorSourceKind::SrcColor, ChannelMask::Rgba);
        let statement = Statement {
            mask: ChannelMask::Rgba,
            function: BlendFunction::Add,
            args: smallvec![
                Argument {
                    source: source(ColorSourceKind::SrcColor, ChannelMask::Rgba),
                    factor,
                },
                Argument {
                    source: source(ColorSourceKind::DstColor, ChannelMask::Alpha),
                    factor: Factor {
                        is_one: true,
                        ..Factor::new(ChannelMask::Rgba)
                    },
                },
            ],
        };

        let (rgb, alpha) = statement.split_rgba();

        assert_eq!(rgb.mask, ChannelMask::Rgb);
        assert_eq!(alpha.mask, ChannelMask::Alpha);
        assert_eq!(rgb.args[0].source.mask, ChannelMask::Rgb);
        assert_eq!(alpha.args[0].source.mask, ChannelMask::Alpha);
        assert_eq!(rgb.args[0].factor.source.mask, ChannelMask::Rgb);
        assert_eq!(alpha.args[0].factor.source.mask, ChannelMask::Alpha);
        // Explicit [A] masks survive the split untouched
        assert_eq!(rgb.args[1].source.mask, ChannelMask::Alpha);
        assert_eq!(alpha.args[1].source.mask, ChannelMask::Alpha);
        // Non-color factors keep their default mask
        assert_eq!(rgb.args[1].factor.source.mask, ChannelMask::Rgba);
    }
}
