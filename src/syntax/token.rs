//! Token and source-position types shared by the lexer, reader and highlighter.

use serde::Serialize;

/// Zero-based (line, column) position. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// Classification of a token.
///
/// The lexer assigns the lexical kinds. The reader and the paren-balance pass
/// produce *resolved* kinds (`FunctionName`, `Parameter`, `LocalName`,
/// `MismatchedOpenParen`, `MismatchedCloseParen`) in a separate array indexed
/// by token position, so a token sequence is never mutated after lexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    OpenParen,
    CloseParen,
    Whitespace,
    Identifier,
    /// Package-qualified symbol or keyword: any identifier containing `:`.
    Symbol,
    String,
    Comment,
    BlockComment,
    Quote,
    BackQuote,
    Comma,
    SharpSequence,

    // Keyword categories
    ControlKeyword,
    MacroKeyword,
    SpecialOperator,
    VariableKeyword,
    LambdaListKeyword,

    // Individually distinguished definition keywords
    Defun,
    DefPackage,
    InPackage,
    DefineCondition,
    DefClass,
    DefMacro,
    DefMethod,
    Loop,
    LocalBinding,

    // Resolved kinds
    FunctionName,
    Parameter,
    LocalName,

    // Tolerated malformed input
    MismatchedOpenParen,
    MismatchedCloseParen,
    MismatchedString,
    MismatchedBarredSymbol,
    MismatchedBlockComment,
}

impl TokenKind {
    /// Whitespace and comments carry no meaning for the reader.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace
                | TokenKind::Comment
                | TokenKind::BlockComment
                | TokenKind::MismatchedBlockComment
        )
    }

    pub fn is_mismatched(self) -> bool {
        matches!(
            self,
            TokenKind::MismatchedOpenParen
                | TokenKind::MismatchedCloseParen
                | TokenKind::MismatchedString
                | TokenKind::MismatchedBarredSymbol
                | TokenKind::MismatchedBlockComment
        )
    }

    /// Kinds that name a definition form the reader recognizes structurally.
    pub fn is_definition(self) -> bool {
        matches!(
            self,
            TokenKind::Defun
                | TokenKind::DefPackage
                | TokenKind::InPackage
                | TokenKind::DefineCondition
                | TokenKind::DefClass
                | TokenKind::DefMacro
                | TokenKind::DefMethod
        )
    }
}

/// A lexed token: its kind, exclusive source span and raw source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Position,
    pub end: Position,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, start: Position, end: Position, text: impl Into<String>) -> Self {
        Self {
            kind,
            start,
            end,
            text: text.into(),
        }
    }
}

/// Per-token information produced after lexing (see [`TokenKind`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenClass {
    pub kind: TokenKind,
    pub quoted: bool,
    pub backquoted: bool,
}

impl TokenClass {
    pub fn plain(kind: TokenKind) -> Self {
        Self {
            kind,
            quoted: false,
            backquoted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        assert!(Position::new(0, 5) < Position::new(1, 0));
        assert!(Position::new(2, 1) < Position::new(2, 3));
    }

    #[test]
    fn test_trivia_kinds() {
        assert!(TokenKind::Whitespace.is_trivia());
        assert!(TokenKind::Comment.is_trivia());
        assert!(TokenKind::MismatchedBlockComment.is_trivia());
        assert!(!TokenKind::Identifier.is_trivia());
        assert!(!TokenKind::MismatchedString.is_trivia());
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&TokenKind::MismatchedOpenParen).unwrap();
        assert_eq!(json, "\"mismatched-open-paren\"");
    }
}
