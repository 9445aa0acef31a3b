//! Blend string parser
//!
//! Two cooperating state machines: the statement level scans
//! `MASK = FUNCTION(` and hands each argument to the argument level, which
//! scans `[1-]SOURCE[MASK][*FACTOR]`. Both read through a [`Cursor`] that
//! can hold its position (re-dispatch the same character in a new state)
//! or rewind to an earlier mark.

use smallvec::SmallVec;

use crate::error::BlendStringError;
use crate::statement::{Argument, BlendFunction, ChannelMask, ColorSourceKind, Statement};

/// Most statements a blend string may hold (one RGB, one alpha)
pub const MAX_STATEMENTS: usize = 2;

const SRC_ALPHA_SATURATE: &[u8] = b"SRC_ALPHA_SATURATE";

fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

fn is_symbol(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_alphanum(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Read position over the blend string bytes
struct Cursor<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text: text.as_bytes(),
            pos: 0,
        }
    }

    /// Current character, `None` at the end of input or at a NUL.
    fn peek(&self) -> Option<u8> {
        match self.text.get(self.pos) {
            None | Some(0) => None,
            Some(&c) => Some(c),
        }
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn rewind_to(&mut self, mark: usize) {
        self.pos = mark;
    }

    /// Text from `mark` up to (not including) the current character.
    fn since(&self, mark: usize) -> &'a [u8] {
        &self.text[mark..self.pos]
    }

    /// Text from `mark` to the end of input.
    fn rest_from(&self, mark: usize) -> &'a [u8] {
        &self.text[mark..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementState {
    ExpectDestChannels,
    ScrapingDestChannels,
    ExpectFunctionName,
    ScrapingFunctionName,
    ExpectArgStart,
    ExpectStatementEnd,
}

impl StatementState {
    /// Why the input may not end in this state
    fn end_of_input_message(self) -> &'static str {
        match self {
            StatementState::ExpectDestChannels => "Empty statement",
            StatementState::ScrapingDestChannels => {
                "Expected an '=' following the destination channel mask"
            }
            StatementState::ExpectFunctionName => "Expected a function name",
            StatementState::ScrapingFunctionName => {
                "Expected parenthesis after the function name"
            }
            StatementState::ExpectArgStart => "Expected to find the start of an argument",
            StatementState::ExpectStatementEnd => "Expected closing parenthesis for statement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgState {
    Start,
    ExpectMinus,
    ExpectColorSrcName,
    ScrapingColorSrcName,
    MaybeColorMask,
    ScrapingMask,
    MaybeMult,
    ExpectOpenParen,
    ExpectFactor,
    MaybeSrcAlphaSaturate,
    MaybeMinus,
    ExpectCloseParen,
    ExpectEnd,
}

pub(crate) struct Parser<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            cursor: Cursor::new(text),
        }
    }

    fn error(&self, argument: Option<usize>, message: &'static str) -> BlendStringError {
        BlendStringError::Parse {
            offset: self.cursor.pos,
            argument,
            message,
        }
    }

    /// Parses up to [`MAX_STATEMENTS`] statements. Input after the last
    /// one is ignored.
    pub(crate) fn parse_statements(
        &mut self,
    ) -> Result<SmallVec<[Statement; MAX_STATEMENTS]>, BlendStringError> {
        let mut statements: SmallVec<[Statement; MAX_STATEMENTS]> = SmallVec::new();
        let mut state = StatementState::ExpectDestChannels;
        let mut mark = 0;
        let mut mask = ChannelMask::Rgba;
        let mut function = BlendFunction::Add;
        let mut args: SmallVec<[Argument; 2]> = SmallVec::new();
        let mut remaining_argc = 0;

        loop {
            let Some(c) = self.cursor.peek() else {
                if state == StatementState::ExpectDestChannels && !statements.is_empty() {
                    return Ok(statements);
                }
                return Err(self.error(None, state.end_of_input_message()));
            };

            if is_space(c) {
                self.cursor.bump();
                continue;
            }

            match state {
                StatementState::ExpectDestChannels => {
                    mark = self.cursor.pos;
                    state = StatementState::ScrapingDestChannels;
                }

                StatementState::ScrapingDestChannels => {
                    if c != b'=' {
                        self.cursor.bump();
                        continue;
                    }
                    let word = self.cursor.rest_from(mark);
                    mask = if word.starts_with(b"RGBA") {
                        ChannelMask::Rgba
                    } else if word.starts_with(b"RGB") {
                        ChannelMask::Rgb
                    } else if word.starts_with(b"A") {
                        ChannelMask::Alpha
                    } else {
                        return Err(self.error(
                            None,
                            "Unknown destination channel mask; expected RGBA=, RGB= or A=",
                        ));
                    };
                    state = StatementState::ExpectFunctionName;
                    self.cursor.bump();
                }

                StatementState::ExpectFunctionName => {
                    mark = self.cursor.pos;
                    state = StatementState::ScrapingFunctionName;
                }

                StatementState::ScrapingFunctionName => {
                    if c != b'(' {
                        if !is_alphanum(c) {
                            return Err(
                                self.error(None, "non alpha numeric character in function name")
                            );
                        }
                        self.cursor.bump();
                        continue;
                    }
                    function = BlendFunction::lookup(self.cursor.since(mark))
                        .ok_or_else(|| self.error(None, "Unknown function name"))?;
                    remaining_argc = function.argc();
                    args.clear();
                    state = StatementState::ExpectArgStart;
                }

                StatementState::ExpectArgStart => {
                    if c != b'(' && c != b',' {
                        self.cursor.bump();
                        continue;
                    }
                    if remaining_argc == 0 {
                        state = StatementState::ExpectStatementEnd;
                        self.cursor.bump();
                        continue;
                    }
                    // The argument parser starts on the argument's first character
                    self.cursor.bump();
                    let arg = self.parse_argument(mask, args.len())?;
                    args.push(arg);
                    remaining_argc -= 1;
                    if remaining_argc == 0 {
                        state = StatementState::ExpectStatementEnd;
                    }
                }

                StatementState::ExpectStatementEnd => {
                    if c != b')' {
                        return Err(self.error(None, "Expected end of statement"));
                    }
                    statements.push(Statement {
                        mask,
                        function,
                        args: std::mem::take(&mut args),
                    });
                    self.cursor.bump();
                    if statements.len() == MAX_STATEMENTS {
                        return Ok(statements);
                    }
                    state = StatementState::ExpectDestChannels;
                }
            }
        }
    }

    /// Parses one argument. Returns with the cursor on the `,` or `)`
    /// that ends it.
    fn parse_argument(
        &mut self,
        statement_mask: ChannelMask,
        index: usize,
    ) -> Result<Argument, BlendStringError> {
        let mut arg = Argument::new(statement_mask);
        let mut state = ArgState::Start;
        let mut mark = self.cursor.pos;
        let mut parsing_factor = false;
        let mut implicit_factor_brace = false;

        loop {
            let Some(c) = self.cursor.peek() else {
                return Err(self.error(
                    Some(index),
                    "Unexpected end of string while parsing argument",
                ));
            };

            if is_space(c) {
                self.cursor.bump();
                continue;
            }

            match state {
                ArgState::Start => match c {
                    b'1' => {
                        state = ArgState::ExpectMinus;
                        self.cursor.bump();
                    }
                    b'0' => {
                        arg.source.is_zero = true;
                        state = ArgState::ExpectEnd;
                        self.cursor.bump();
                    }
                    _ => state = ArgState::ExpectColorSrcName,
                },

                ArgState::ExpectMinus => {
                    if c != b'-' {
                        return Err(self.error(Some(index), "expected a '-' following the 1"));
                    }
                    arg.source.one_minus = true;
                    state = ArgState::ExpectColorSrcName;
                    self.cursor.bump();
                }

                ArgState::ExpectColorSrcName => {
                    if !is_symbol(c) {
                        return Err(self.error(Some(index), "expected a color source name"));
                    }
                    mark = self.cursor.pos;
                    if parsing_factor {
                        arg.factor.is_color = true;
                    }
                    state = ArgState::ScrapingColorSrcName;
                }

                ArgState::ScrapingColorSrcName => {
                    if is_symbol(c) {
                        self.cursor.bump();
                        continue;
                    }
                    let kind = ColorSourceKind::lookup(self.cursor.since(mark))
                        .ok_or_else(|| self.error(Some(index), "Unknown color source name"))?;
                    let source = if parsing_factor {
                        &mut arg.factor.source
                    } else {
                        &mut arg.source
                    };
                    source.kind = Some(kind);
                    state = ArgState::MaybeColorMask;
                }

                ArgState::MaybeColorMask => {
                    if c == b'[' {
                        mark = self.cursor.pos;
                        state = ArgState::ScrapingMask;
                        self.cursor.bump();
                    } else if parsing_factor {
                        state = ArgState::ExpectCloseParen;
                    } else {
                        state = ArgState::MaybeMult;
                    }
                }

                ArgState::ScrapingMask => {
                    if c != b']' {
                        self.cursor.bump();
                        continue;
                    }
                    let mask = match self.cursor.since(mark) {
                        b"[RGBA" => {
                            if statement_mask != ChannelMask::Rgba {
                                return Err(self.error(
                                    Some(index),
                                    "You can't use an RGBA color mask if the statement hasn't also got an RGBA= mask",
                                ));
                            }
                            ChannelMask::Rgba
                        }
                        b"[RGB" => ChannelMask::Rgb,
                        b"[A" => ChannelMask::Alpha,
                        _ => {
                            return Err(self.error(
                                Some(index),
                                "Expected a channel mask of [RGBA] [RGB] or [A]",
                            ));
                        }
                    };
                    if parsing_factor {
                        arg.factor.source.mask = mask;
                        state = ArgState::ExpectCloseParen;
                    } else {
                        arg.source.mask = mask;
                        state = ArgState::MaybeMult;
                    }
                    self.cursor.bump();
                }

                ArgState::MaybeMult => {
                    if c == b'*' {
                        state = ArgState::ExpectOpenParen;
                        self.cursor.bump();
                    } else {
                        arg.factor.is_one = true;
                        state = ArgState::ExpectEnd;
                    }
                }

                ArgState::ExpectOpenParen => {
                    if c == b'(' {
                        implicit_factor_brace = false;
                        self.cursor.bump();
                    } else if is_alphanum(c) {
                        // This character already belongs to the factor
                        implicit_factor_brace = true;
                    } else {
                        return Err(self.error(
                            Some(index),
                            "Expected '(' around blend factor or alpha numeric character for blend factor name",
                        ));
                    }
                    parsing_factor = true;
                    state = ArgState::ExpectFactor;
                }

                ArgState::ExpectFactor => {
                    match c {
                        b'1' => state = ArgState::MaybeMinus,
                        b'0' => {
                            arg.source.is_zero = true;
                            state = ArgState::ExpectCloseParen;
                        }
                        _ => {
                            mark = self.cursor.pos;
                            state = ArgState::MaybeSrcAlphaSaturate;
                        }
                    }
                    self.cursor.bump();
                }

                ArgState::MaybeSrcAlphaSaturate => {
                    if is_symbol(c) {
                        self.cursor.bump();
                        continue;
                    }
                    if self.cursor.since(mark).trim_ascii_end() == SRC_ALPHA_SATURATE {
                        arg.factor.is_src_alpha_saturate = true;
                        state = ArgState::ExpectCloseParen;
                    } else {
                        // Not the keyword; re-read the word as a color source
                        self.cursor.rewind_to(mark);
                        state = ArgState::ExpectColorSrcName;
                    }
                }

                ArgState::MaybeMinus => {
                    if c == b'-' {
                        if implicit_factor_brace {
                            return Err(self.error(
                                Some(index),
                                "Expected ( ) braces around blend factor with a subtraction",
                            ));
                        }
                        arg.factor.source.one_minus = true;
                        state = ArgState::ExpectColorSrcName;
                        self.cursor.bump();
                    } else {
                        arg.factor.is_one = true;
                        state = ArgState::ExpectCloseParen;
                    }
                }

                ArgState::ExpectCloseParen => {
                    if !implicit_factor_brace {
                        if c != b')' {
                            return Err(self.error(
                                Some(index),
                                "Expected closing parenthesis after blend factor",
                            ));
                        }
                        self.cursor.bump();
                    }
                    state = ArgState::ExpectEnd;
                }

                ArgState::ExpectEnd => {
                    if c != b',' && c != b')' {
                        return Err(self.error(Some(index), "expected , or )"));
                    }
                    return Ok(arg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<SmallVec<[Statement; MAX_STATEMENTS]>, BlendStringError> {
        Parser::new(text).parse_statements()
    }

    fn parse_offset(text: &str) -> usize {
        match parse(text) {
            Err(BlendStringError::Parse { offset, .. }) => offset,
            other => panic!("expected a parse error for {:?}, got {:?}", text, other),
        }
    }

    #[test]
    fn test_simple_statement() {
        let statements = parse("RGBA=ADD(SRC_COLOR,DST_COLOR)").unwrap();
        assert_eq!(statements.len(), 1);
        let statement = &statements[0];
        assert_eq!(statement.mask, ChannelMask::Rgba);
        assert_eq!(statement.function, BlendFunction::Add);
        assert_eq!(statement.args.len(), 2);
        assert_eq!(statement.args[0].source.kind, Some(ColorSourceKind::SrcColor));
        assert!(statement.args[0].factor.is_one);
        assert_eq!(statement.args[1].source.kind, Some(ColorSourceKind::DstColor));
        assert!(statement.args[1].factor.is_one);
    }

    #[test]
    fn test_whitespace_is_ignored() {
        let compact = parse("RGBA=ADD(SRC_COLOR,DST_COLOR*(1-SRC_COLOR[A]))").unwrap();
        let spaced =
            parse("  RGBA = ADD ( SRC_COLOR ,\n\tDST_COLOR * ( 1 - SRC_COLOR[A] ) )").unwrap();
        assert_eq!(compact, spaced);
    }

    #[test]
    fn test_explicit_factor() {
        let statements = parse("RGBA = ADD(SRC_COLOR*(SRC_COLOR[A]), DST_COLOR*(1-SRC_COLOR[A]))")
            .unwrap();
        let args = &statements[0].args;

        assert!(args[0].factor.is_color);
        assert!(!args[0].factor.is_one);
        assert_eq!(args[0].factor.source.kind, Some(ColorSourceKind::SrcColor));
        assert_eq!(args[0].factor.source.mask, ChannelMask::Alpha);
        assert!(!args[0].factor.source.one_minus);

        assert!(args[1].factor.is_color);
        assert!(args[1].factor.source.one_minus);
        assert_eq!(args[1].factor.source.mask, ChannelMask::Alpha);
    }

    #[test]
    fn test_implicit_factor_brace() {
        let statements = parse("RGBA = ADD(SRC_COLOR*CONSTANT, DST_COLOR*0)").unwrap();
        let args = &statements[0].args;
        assert!(args[0].factor.is_color);
        assert_eq!(args[0].factor.source.kind, Some(ColorSourceKind::Constant));
        assert!(args[1].source.is_zero);
    }

    #[test]
    fn test_implicit_brace_rejects_subtraction() {
        let err = parse("RGBA = ADD(SRC_COLOR*1-CONSTANT, DST_COLOR)").unwrap_err();
        assert!(matches!(
            err,
            BlendStringError::Parse {
                argument: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn test_unmasked_color_factor_in_last_argument() {
        let statements = parse("RGBA = ADD(SRC_COLOR, DST_COLOR*(SRC_COLOR))").unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].args[1].factor.is_color);
        assert_eq!(statements[0].args[1].factor.source.mask, ChannelMask::Rgba);
    }

    #[test]
    fn test_src_alpha_saturate() {
        let explicit = parse("RGB = ADD(SRC_COLOR*(SRC_ALPHA_SATURATE), 0) A = ADD(SRC_COLOR, 0)")
            .unwrap();
        assert!(explicit[0].args[0].factor.is_src_alpha_saturate);

        let implicit = parse("RGBA = ADD(SRC_COLOR*SRC_ALPHA_SATURATE, 0)").unwrap();
        assert!(implicit[0].args[0].factor.is_src_alpha_saturate);
    }

    #[test]
    fn test_factor_one_and_zero() {
        let statements = parse("RGBA = ADD(SRC_COLOR*(1), DST_COLOR*(0))").unwrap();
        let args = &statements[0].args;
        assert!(args[0].factor.is_one);
        assert!(!args[0].source.is_zero);
        assert!(args[1].source.is_zero);
    }

    #[test]
    fn test_two_statements() {
        let statements =
            parse("RGB = ADD(SRC_COLOR, 0)\nA = ADD(SRC_COLOR, DST_COLOR) trailing").unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].mask, ChannelMask::Rgb);
        assert_eq!(statements[1].mask, ChannelMask::Alpha);
    }

    #[test]
    fn test_rgba_mask_needs_rgba_statement() {
        let err = parse("RGB = ADD(SRC_COLOR[RGBA], 0) A = ADD(SRC_COLOR, 0)").unwrap_err();
        assert_eq!(
            err.message(),
            "You can't use an RGBA color mask if the statement hasn't also got an RGBA= mask"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("").unwrap_err().message(), "Empty statement");
        assert_eq!(parse("   ").unwrap_err().message(), "Empty statement");
    }

    #[test]
    fn test_missing_arguments() {
        let err = parse("RGBA = ADD()").unwrap_err();
        assert_eq!(err.message(), "expected a color source name");
        assert_eq!(parse_offset("RGBA = ADD()"), 11);
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(
            parse("RGBA = SUB(SRC_COLOR, DST_COLOR)").unwrap_err().message(),
            "Unknown function name"
        );
        assert_eq!(
            parse("RGBA = ADD(SRC_ALPHA, DST_COLOR)").unwrap_err().message(),
            "Unknown color source name"
        );
        assert_eq!(
            parse("XYZ = ADD(SRC_COLOR, DST_COLOR)").unwrap_err().message(),
            "Unknown destination channel mask; expected RGBA=, RGB= or A="
        );
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(
            parse("RGBA").unwrap_err().message(),
            "Expected an '=' following the destination channel mask"
        );
        assert_eq!(parse("RGBA =").unwrap_err().message(), "Expected a function name");
        assert_eq!(
            parse("RGBA = ADD").unwrap_err().message(),
            "Expected parenthesis after the function name"
        );
        assert_eq!(
            parse("RGBA = ADD(SRC_COLOR").unwrap_err().message(),
            "Unexpected end of string while parsing argument"
        );
        assert_eq!(
            parse("RGBA = ADD(SRC_COLOR, DST_COLOR").unwrap_err().message(),
            "Unexpected end of string while parsing argument"
        );
        assert_eq!(
            parse("RGBA = ADD(SRC_COLOR)").unwrap_err().message(),
            "Expected to find the start of an argument"
        );
    }

    #[test]
    fn test_error_offset_points_at_character() {
        // The '+' sits at byte 20
        assert_eq!(parse_offset("RGBA = ADD(SRC_COLOR+DST_COLOR)"), 20);
    }
}
