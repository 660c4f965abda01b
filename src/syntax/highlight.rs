//! Resolved token kinds for syntax highlighting.
//!
//! Two passes are offered. [`balance_parens`] is the lightweight one: lexical
//! kinds plus paren-mismatch relabeling, no tree building. [`classify`] runs
//! the full reader and reports its resolved classes (function names,
//! parameters, quote taint). Both agree on which parens are mismatched.

use serde::Serialize;

use super::lexer::tokenize;
use super::reader::read_with_classes;
use super::token::{Position, Token, TokenKind};

/// A span the host should paint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightToken {
    pub start: Position,
    pub end: Position,
    pub kind: TokenKind,
    pub quoted: bool,
    pub backquoted: bool,
}

/// Lexical kinds with unbalanced parens relabeled.
///
/// A `)` with no open partner becomes `MismatchedCloseParen` immediately.
/// Open parens still pending at end of input are resolved once the scan is
/// done: the outermost one becomes `MismatchedOpenParen`.
pub fn balance_parens(tokens: &[Token]) -> Vec<TokenKind> {
    let mut kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    let mut open = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenParen => open.push(index),
            TokenKind::CloseParen => {
                if open.pop().is_none() {
                    kinds[index] = TokenKind::MismatchedCloseParen;
                }
            }
            _ => {}
        }
    }

    if let Some(&outermost) = open.first() {
        kinds[outermost] = TokenKind::MismatchedOpenParen;
    }
    kinds
}

/// Fast highlighting without reading: whitespace is omitted.
pub fn quick_classify(text: &str) -> Vec<HighlightToken> {
    let tokens = tokenize(text);
    let kinds = balance_parens(&tokens);
    tokens
        .iter()
        .zip(kinds)
        .filter(|(token, _)| token.kind != TokenKind::Whitespace)
        .map(|(token, kind)| HighlightToken {
            start: token.start,
            end: token.end,
            kind,
            quoted: false,
            backquoted: false,
        })
        .collect()
}

/// Full highlighting through the reader: whitespace is omitted.
pub fn classify(text: &str) -> Vec<HighlightToken> {
    let tokens = tokenize(text);
    let output = read_with_classes(&tokens);
    tokens
        .iter()
        .zip(output.classes)
        .filter(|(token, _)| token.kind != TokenKind::Whitespace)
        .map(|(token, class)| HighlightToken {
            start: token.start,
            end: token.end,
            kind: class.kind,
            quoted: class.quoted,
            backquoted: class.backquoted,
        })
        .collect()
}
