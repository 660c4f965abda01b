//! Lisp source reader.
//!
//! The pipeline is strictly two-pass:
//!
//! ```text
//! text ──tokenize──► [Token] ──read──► [Expr] + [TokenClass]
//!                        │
//!                        └──balance_parens──► [TokenKind]   (quick highlighting)
//! ```
//!
//! Tokens are immutable once lexed. Everything the reader learns about a
//! token (call position, parameter, quote taint, paren mismatch) lands in a
//! parallel array indexed by token position.
//!
//! Both passes are total and synchronous: live, half-typed buffers are
//! expected input, and malformed spans come back as `Mismatched*` kinds.

mod highlight;
mod keywords;
mod lexer;
mod reader;
mod token;

pub use highlight::{balance_parens, classify, quick_classify, HighlightToken};
pub use lexer::tokenize;
pub use reader::{
    designator_name, normalize_package_name, read, read_with_classes, Atom, Binding, Compound,
    Expr, FunctionDef, LocalBinding, PackageDef, PackageSwitch, ReadOutput, DEFAULT_PACKAGE,
    MAX_DEPTH,
};
pub use token::{Position, Token, TokenClass, TokenKind};

/// Tokenize and read `text` in one call.
pub fn parse(text: &str) -> Vec<Expr> {
    read(&tokenize(text))
}
