//! Token stream builder.
//!
//! [`tokenize`] is total: malformed constructs (unterminated strings, barred
//! symbols and block comments) produce a `Mismatched*` token holding all the
//! consumed text and scanning continues. Every character of the input belongs
//! to exactly one token, so concatenating token texts reproduces the input.

use super::keywords;
use super::token::{Position, Token, TokenKind};

/// Characters that end an identifier run.
#[inline]
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"')
}

/// Scan `text` into a flat token sequence.
pub fn tokenize(text: &str) -> Vec<Token> {
    Lexer::new(text).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
            line: 0,
            col: 0,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(ch) = c {
            if ch == '\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
            self.pos += 1;
        }
        c
    }

    fn run(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(c) = self.current() {
            let start_idx = self.pos;
            let start = self.position();
            let kind = self.scan(c);
            let text: String = self.chars[start_idx..self.pos].iter().collect();
            tokens.push(Token::new(kind, start, self.position(), text));
        }
        tokens
    }

    /// Consume one token starting at `c` and return its kind.
    fn scan(&mut self, c: char) -> TokenKind {
        match c {
            c if c.is_whitespace() => {
                while self.current().is_some_and(char::is_whitespace) {
                    self.advance();
                }
                TokenKind::Whitespace
            }
            '(' => {
                self.advance();
                TokenKind::OpenParen
            }
            ')' => {
                self.advance();
                TokenKind::CloseParen
            }
            '"' => self.read_delimited('"', TokenKind::String, TokenKind::MismatchedString),
            '|' => self.read_delimited(
                '|',
                TokenKind::Identifier,
                TokenKind::MismatchedBarredSymbol,
            ),
            ';' => {
                while self.current().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                TokenKind::Comment
            }
            '\'' => {
                self.advance();
                TokenKind::Quote
            }
            '`' => {
                self.advance();
                TokenKind::BackQuote
            }
            ',' => {
                self.advance();
                // ,@ splices; it is still an unquote for the reader
                if self.current() == Some('@') {
                    self.advance();
                }
                TokenKind::Comma
            }
            '#' if self.peek(1) == Some('|') => self.read_block_comment(),
            '#' => self.read_sharp(),
            _ => self.read_identifier(),
        }
    }

    /// Strings and barred symbols: backslash escapes the next character.
    fn read_delimited(&mut self, delim: char, ok: TokenKind, mismatched: TokenKind) -> TokenKind {
        self.advance();
        loop {
            match self.current() {
                None => return mismatched,
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == delim => {
                    self.advance();
                    return ok;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// `#| ... |#` with nesting.
    fn read_block_comment(&mut self) -> TokenKind {
        self.advance();
        self.advance();
        let mut depth: i32 = 0;
        loop {
            match (self.current(), self.peek(1)) {
                (None, _) => return TokenKind::MismatchedBlockComment,
                (Some('#'), Some('|')) => {
                    self.advance();
                    self.advance();
                    depth += 1;
                }
                (Some('|'), Some('#')) => {
                    self.advance();
                    self.advance();
                    depth -= 1;
                    if depth < 0 {
                        return TokenKind::BlockComment;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// `#` dispatch: character literals, balanced `#(...)`-style data, or a
    /// run up to the next delimiter.
    fn read_sharp(&mut self) -> TokenKind {
        self.advance();

        if self.current() == Some('\\') {
            self.advance();
            if let Some(ch) = self.advance() {
                // Named characters such as #\Space or #\Newline
                if ch.is_alphabetic() {
                    while self
                        .current()
                        .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_')
                    {
                        self.advance();
                    }
                }
            }
            return TokenKind::SharpSequence;
        }

        while self.current().is_some_and(|c| !is_delimiter(c)) {
            self.advance();
        }

        if self.current() == Some('(') {
            self.read_balanced();
        }
        TokenKind::SharpSequence
    }

    /// Consume a parenthesized span starting at `(`, tracking a local depth.
    /// Strings and escapes inside the span do not affect the depth.
    fn read_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.current() {
            match c {
                '(' => {
                    depth += 1;
                    self.advance();
                }
                ')' => {
                    self.advance();
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                '"' => {
                    self.read_delimited('"', TokenKind::String, TokenKind::MismatchedString);
                }
                '\\' => {
                    self.advance();
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn read_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self.current().is_some_and(|c| !is_delimiter(c)) {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();

        if text.contains(':') {
            TokenKind::Symbol
        } else {
            keywords::lookup(&text).unwrap_or(TokenKind::Identifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).into_iter().map(|t| t.kind).collect()
    }

    fn rebuild(text: &str) -> String {
        tokenize(text).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_tokenize_simple_form() {
        use TokenKind::*;
        assert_eq!(
            kinds("(defun foo (x) x)"),
            vec![
                OpenParen, Defun, Whitespace, Identifier, Whitespace, OpenParen, Identifier,
                CloseParen, Whitespace, Identifier, CloseParen
            ]
        );
    }

    #[test]
    fn test_tokenize_is_total_and_lossless() {
        for input in [
            "",
            "(",
            ")",
            "\"",
            "|",
            "#",
            "#|",
            "#\\",
            "#(",
            ",@",
            "(a (b c",
            "a) b)",
            "\"abc\\",
            "héllo wörld ; ünïcode\n(x)",
            "#| a #| b |# c |#",
            "(format t \"~a~%\" '(1 . 2))",
        ] {
            assert_eq!(rebuild(input), input, "lossy tokenization of {:?}", input);
        }
    }

    #[test]
    fn test_empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        let tokens = tokenize("  \t\n  x");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Whitespace);
        assert_eq!(tokens[0].text, "  \t\n  ");
        assert_eq!(tokens[1].start, Position::new(1, 2));
    }

    #[test]
    fn test_string_with_escapes() {
        let tokens = tokenize(r#""a \"quoted\" word""#);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::String);
    }

    #[test]
    fn test_unterminated_string_is_mismatched() {
        let tokens = tokenize("(print \"oops");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::MismatchedString);
        assert_eq!(last.text, "\"oops");
    }

    #[test]
    fn test_line_comment_excludes_newline() {
        let tokens = tokenize("; note\nx");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, "; note");
        assert_eq!(tokens[1].kind, TokenKind::Whitespace);
    }

    #[test]
    fn test_nested_block_comment() {
        let input = "#| a #| b |# c |#";
        let tokens = tokenize(input);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::BlockComment);
        assert_eq!(tokens[0].text, input);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let tokens = tokenize("#| a #| b |# c");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::MismatchedBlockComment);
    }

    #[test]
    fn test_barred_symbol() {
        assert_eq!(kinds("|hello world|"), vec![TokenKind::Identifier]);
        assert_eq!(kinds("|a\\|b|"), vec![TokenKind::Identifier]);
        assert_eq!(kinds("|open"), vec![TokenKind::MismatchedBarredSymbol]);
    }

    #[test]
    fn test_character_literals() {
        let tokens = tokenize("#\\( #\\Space #\\a)");
        assert_eq!(tokens[0].text, "#\\(");
        assert_eq!(tokens[2].text, "#\\Space");
        assert_eq!(tokens[4].text, "#\\a");
        assert_eq!(tokens[5].kind, TokenKind::CloseParen);
    }

    #[test]
    fn test_sharp_balanced_span() {
        let tokens = tokenize("#(1 (2) \")\" 3) x");
        assert_eq!(tokens[0].kind, TokenKind::SharpSequence);
        assert_eq!(tokens[0].text, "#(1 (2) \")\" 3)");
        assert_eq!(tokens[2].text, "x");
    }

    #[test]
    fn test_sharp_function_quote() {
        let tokens = tokenize("#'car #'(lambda (x) x)");
        assert_eq!(tokens[0].text, "#'car");
        assert_eq!(tokens[2].text, "#'(lambda (x) x)");
    }

    #[test]
    fn test_qualified_symbols() {
        assert_eq!(kinds("swank:eval"), vec![TokenKind::Symbol]);
        assert_eq!(kinds(":export"), vec![TokenKind::Symbol]);
        assert_eq!(kinds("pkg::internal"), vec![TokenKind::Symbol]);
    }

    #[test]
    fn test_quote_backquote_comma() {
        use TokenKind::*;
        assert_eq!(
            kinds("'a `(b ,c ,@d)"),
            vec![
                Quote, Identifier, Whitespace, BackQuote, OpenParen, Identifier, Whitespace,
                Comma, Identifier, Whitespace, Comma, Identifier, CloseParen
            ]
        );
    }

    #[test]
    fn test_columns_count_characters() {
        let tokens = tokenize("(λ ü)");
        let u = tokens.iter().find(|t| t.text == "ü").unwrap();
        assert_eq!(u.start, Position::new(0, 3));
        assert_eq!(u.end, Position::new(0, 4));
    }

    #[test]
    fn test_lexer_does_not_track_paren_balance() {
        use TokenKind::*;
        assert_eq!(kinds("a)"), vec![Identifier, CloseParen]);
        assert_eq!(kinds("(a"), vec![OpenParen, Identifier]);
    }
}
