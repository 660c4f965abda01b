//! Expression reader.
//!
//! Recursive descent over the token sequence produced by
//! [`tokenize`](super::lexer::tokenize). Reading never fails: an unclosed form
//! ends at the last token of the stream and a stray `)` becomes an atom whose
//! resolved kind is [`TokenKind::MismatchedCloseParen`].
//!
//! Besides the expression tree the reader produces one [`TokenClass`] per
//! input token. That array carries the resolved kinds (function names,
//! parameters, local names, paren mismatches) and the quote/backquote taint,
//! so consumers never have to mutate the shared tokens.

use super::token::{Position, Token, TokenClass, TokenKind};

/// Package that owns everything not claimed by an `in-package` form.
pub const DEFAULT_PACKAGE: &str = "CL-USER";

/// Deepest form nesting read as a tree. Forms opened below this depth are
/// read flat: their tokens become atoms of a single form.
pub const MAX_DEPTH: usize = 256;

/// Canonical package name: designator prefix and string quotes stripped,
/// upper-cased, and the standard user/common-lisp names folded into
/// [`DEFAULT_PACKAGE`].
pub fn normalize_package_name(designator: &str) -> String {
    let name = designator_name(designator).to_uppercase();
    match name.as_str() {
        "CL" | "COMMON-LISP" | "COMMON-LISP-USER" => DEFAULT_PACKAGE.to_string(),
        _ => name,
    }
}

/// Strip `#:`, `:` or surrounding double quotes from a symbol designator.
pub fn designator_name(designator: &str) -> &str {
    if let Some(rest) = designator.strip_prefix("#:") {
        rest
    } else if let Some(rest) = designator.strip_prefix(':') {
        rest
    } else if designator.len() >= 2 && designator.starts_with('"') && designator.ends_with('"') {
        &designator[1..designator.len() - 1]
    } else {
        designator
    }
}

// =============================================================================
// Expression Tree
// =============================================================================

/// A leaf: one token and its position in the token sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub token: Token,
    pub index: usize,
    pub quoted: bool,
    pub backquoted: bool,
}

impl Atom {
    pub fn text(&self) -> &str {
        &self.token.text
    }

    pub fn kind(&self) -> TokenKind {
        self.token.kind
    }
}

/// A parenthesized form. `parts` never contains whitespace or comments.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub open: Position,
    /// End of the closing paren, or of the last token when unclosed.
    pub close: Position,
    pub closed: bool,
    pub parts: Vec<Expr>,
    pub quoted: bool,
    pub backquoted: bool,
}

impl Compound {
    fn head_atom(&self) -> Option<&Atom> {
        match self.parts.first() {
            Some(Expr::Atom(atom)) => Some(atom),
            _ => None,
        }
    }

    fn is_data(&self) -> bool {
        self.quoted || self.backquoted
    }
}

/// `(defun name (params...) body...)`, also used for `defmacro`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub is_macro: bool,
    pub form: Compound,
}

impl FunctionDef {
    pub fn body(&self) -> &[Expr] {
        self.form.parts.get(3..).unwrap_or(&[])
    }
}

/// `(defpackage name (:use ...) (:export ...))`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDef {
    pub name: String,
    pub uses: Vec<String>,
    pub exports: Vec<String>,
    pub form: Compound,
}

/// `(in-package name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSwitch {
    pub name: String,
    pub form: Compound,
}

/// One `let` binding. `value` is absent for bare `(let (x) ...)` names.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: Option<Expr>,
}

/// `(let ((name value)...) body...)` and `let*`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBinding {
    pub bindings: Vec<Binding>,
    pub form: Compound,
}

impl LocalBinding {
    pub fn body(&self) -> &[Expr] {
        self.form.parts.get(2..).unwrap_or(&[])
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.bindings
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .and_then(|b| b.value.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Atom(Atom),
    Form(Compound),
    Function(FunctionDef),
    Package(PackageDef),
    InPackage(PackageSwitch),
    Let(LocalBinding),
}

impl Expr {
    /// The underlying compound for every non-atom variant.
    pub fn compound(&self) -> Option<&Compound> {
        match self {
            Expr::Atom(_) => None,
            Expr::Form(form) => Some(form),
            Expr::Function(def) => Some(&def.form),
            Expr::Package(def) => Some(&def.form),
            Expr::InPackage(switch) => Some(&switch.form),
            Expr::Let(binding) => Some(&binding.form),
        }
    }

    pub fn parts(&self) -> &[Expr] {
        self.compound().map(|c| c.parts.as_slice()).unwrap_or(&[])
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Expr::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn start(&self) -> Position {
        match self {
            Expr::Atom(atom) => atom.token.start,
            other => other.compound().map(|c| c.open).unwrap_or_default(),
        }
    }

    pub fn end(&self) -> Position {
        match self {
            Expr::Atom(atom) => atom.token.end,
            other => other.compound().map(|c| c.close).unwrap_or_default(),
        }
    }

    pub fn quoted(&self) -> bool {
        match self {
            Expr::Atom(atom) => atom.quoted,
            other => other.compound().is_some_and(|c| c.quoted),
        }
    }

    pub fn backquoted(&self) -> bool {
        match self {
            Expr::Atom(atom) => atom.backquoted,
            other => other.compound().is_some_and(|c| c.backquoted),
        }
    }
}

/// Result of a read: top-level expressions plus one class per token.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutput {
    pub forms: Vec<Expr>,
    pub classes: Vec<TokenClass>,
}

/// Read every top-level expression in `tokens`.
pub fn read(tokens: &[Token]) -> Vec<Expr> {
    read_with_classes(tokens).forms
}

/// Read `tokens`, also returning the resolved per-token classes.
pub fn read_with_classes(tokens: &[Token]) -> ReadOutput {
    Reader::new(tokens).run()
}

// =============================================================================
// Reader
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Taint {
    quoted: bool,
    backquoted: bool,
}

struct Reader<'a> {
    tokens: &'a [Token],
    classes: Vec<TokenClass>,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            classes: tokens.iter().map(|t| TokenClass::plain(t.kind)).collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn run(mut self) -> ReadOutput {
        let tokens = self.tokens;
        let mut forms = Vec::new();
        loop {
            self.skip_trivia();
            let Some(token) = tokens.get(self.pos) else {
                break;
            };
            if token.kind == TokenKind::CloseParen {
                self.classes[self.pos].kind = TokenKind::MismatchedCloseParen;
                forms.push(Expr::Atom(Atom {
                    token: token.clone(),
                    index: self.pos,
                    quoted: false,
                    backquoted: false,
                }));
                self.pos += 1;
                continue;
            }
            if let Some(expr) = self.read_datum(Taint::default()) {
                forms.push(expr);
            }
        }
        ReadOutput {
            forms,
            classes: self.classes,
        }
    }

    fn skip_trivia(&mut self) {
        while self.tokens.get(self.pos).is_some_and(|t| t.kind.is_trivia()) {
            self.pos += 1;
        }
    }

    fn mark(&mut self, index: usize, taint: Taint) {
        if let Some(class) = self.classes.get_mut(index) {
            class.quoted = taint.quoted;
            class.backquoted = taint.backquoted;
        }
    }

    fn resolve(&mut self, index: usize, kind: TokenKind) {
        if let Some(class) = self.classes.get_mut(index) {
            class.kind = kind;
        }
    }

    /// Read one datum. Returns `None` at end of input or in front of `)`,
    /// which is left for the caller.
    fn read_datum(&mut self, mut taint: Taint) -> Option<Expr> {
        let tokens = self.tokens;
        loop {
            self.skip_trivia();
            let index = self.pos;
            let token = tokens.get(index)?;

            match token.kind {
                TokenKind::CloseParen => return None,
                TokenKind::OpenParen => return Some(self.read_compound(taint)),
                TokenKind::Quote | TokenKind::BackQuote | TokenKind::Comma => {
                    self.mark(index, taint);
                    self.pos += 1;
                    taint = match token.kind {
                        TokenKind::Quote => Taint {
                            quoted: true,
                            ..taint
                        },
                        TokenKind::BackQuote => Taint {
                            backquoted: true,
                            ..taint
                        },
                        // Unquote escapes the surrounding quoting for its operand
                        _ => Taint::default(),
                    };
                }
                _ => {
                    self.mark(index, taint);
                    self.pos += 1;
                    return Some(Expr::Atom(Atom {
                        token: token.clone(),
                        index,
                        quoted: taint.quoted,
                        backquoted: taint.backquoted,
                    }));
                }
            }
        }
    }

    fn read_compound(&mut self, taint: Taint) -> Expr {
        if self.depth >= MAX_DEPTH {
            return self.read_flat(taint);
        }

        let tokens = self.tokens;
        let open_index = self.pos;
        let open = tokens[open_index].start;
        self.mark(open_index, taint);
        self.pos += 1;
        self.depth += 1;

        let mut parts = Vec::new();
        let (close, closed) = loop {
            self.skip_trivia();
            match tokens.get(self.pos) {
                None => {
                    let close = tokens.last().map(|t| t.end).unwrap_or(open);
                    break (close, false);
                }
                Some(token) if token.kind == TokenKind::CloseParen => {
                    let close = token.end;
                    self.mark(self.pos, taint);
                    self.pos += 1;
                    break (close, true);
                }
                Some(_) => {
                    if let Some(expr) = self.read_datum(taint) {
                        parts.push(expr);
                    }
                }
            }
        };

        self.depth -= 1;
        // Only the outermost unclosed form is flagged; it swallows the rest.
        if !closed && self.depth == 0 {
            self.resolve(open_index, TokenKind::MismatchedOpenParen);
        }

        self.recognize(Compound {
            open,
            close,
            closed,
            parts,
            quoted: taint.quoted,
            backquoted: taint.backquoted,
        })
    }

    /// Read a form without descending: nested parens only move a counter and
    /// every other token up to the matching `)` becomes an atom.
    fn read_flat(&mut self, taint: Taint) -> Expr {
        let tokens = self.tokens;
        let open = tokens[self.pos].start;
        self.mark(self.pos, taint);
        self.pos += 1;

        let mut nesting = 1usize;
        let mut parts = Vec::new();
        let mut close = None;
        while let Some(token) = tokens.get(self.pos) {
            let index = self.pos;
            self.pos += 1;
            match token.kind {
                kind if kind.is_trivia() => {}
                TokenKind::OpenParen => {
                    self.mark(index, taint);
                    nesting += 1;
                }
                TokenKind::CloseParen => {
                    self.mark(index, taint);
                    nesting -= 1;
                    if nesting == 0 {
                        close = Some(token.end);
                        break;
                    }
                }
                _ => {
                    self.mark(index, taint);
                    parts.push(Expr::Atom(Atom {
                        token: token.clone(),
                        index,
                        quoted: taint.quoted,
                        backquoted: taint.backquoted,
                    }));
                }
            }
        }

        let closed = close.is_some();
        let close = close.unwrap_or_else(|| tokens.last().map(|t| t.end).unwrap_or(open));
        Expr::Form(Compound {
            open,
            close,
            closed,
            parts,
            quoted: taint.quoted,
            backquoted: taint.backquoted,
        })
    }

    /// Refine a compound into one of the recognized forms, resolving token
    /// classes along the way.
    fn recognize(&mut self, form: Compound) -> Expr {
        if form.is_data() {
            return Expr::Form(form);
        }
        let Some(head) = form.head_atom() else {
            return Expr::Form(form);
        };
        let head_kind = head.kind();
        let head_index = head.index;

        match head_kind {
            TokenKind::Defun | TokenKind::DefMacro => self.function_def(form, head_kind),
            TokenKind::DefMethod | TokenKind::DefineCondition | TokenKind::DefClass => {
                if let Some(Expr::Atom(name)) = form.parts.get(1) {
                    self.resolve(name.index, TokenKind::FunctionName);
                }
                Expr::Form(form)
            }
            TokenKind::DefPackage => package_def(form),
            TokenKind::InPackage => package_switch(form),
            TokenKind::LocalBinding => self.local_binding(form),
            TokenKind::Identifier => {
                self.resolve(head_index, TokenKind::FunctionName);
                Expr::Form(form)
            }
            TokenKind::Symbol if !head.text().starts_with(':') => {
                self.resolve(head_index, TokenKind::FunctionName);
                Expr::Form(form)
            }
            _ => Expr::Form(form),
        }
    }

    fn function_def(&mut self, form: Compound, head_kind: TokenKind) -> Expr {
        let Some(Expr::Atom(name_atom)) = form.parts.get(1) else {
            return Expr::Form(form);
        };
        let name = name_atom.text().to_string();
        self.resolve(name_atom.index, TokenKind::FunctionName);

        let mut params = Vec::new();
        let mut param_indices = Vec::new();
        if let Some(list) = form.parts.get(2).and_then(Expr::compound) {
            for part in &list.parts {
                let atom = match part {
                    Expr::Atom(atom) => Some(atom),
                    // (name default) or ((:key name) default)
                    other => other.parts().first().and_then(Expr::as_atom),
                };
                if let Some(atom) = atom {
                    if atom.kind() != TokenKind::LambdaListKeyword {
                        params.push(atom.text().to_string());
                        param_indices.push(atom.index);
                    }
                }
            }
        }
        for index in param_indices {
            self.resolve(index, TokenKind::Parameter);
        }

        Expr::Function(FunctionDef {
            name,
            params,
            is_macro: head_kind == TokenKind::DefMacro,
            form,
        })
    }

    fn local_binding(&mut self, form: Compound) -> Expr {
        let Some(list) = form.parts.get(1).and_then(Expr::compound) else {
            return Expr::Form(form);
        };

        let mut bindings = Vec::new();
        let mut name_indices = Vec::new();
        for part in &list.parts {
            match part {
                Expr::Atom(atom) => {
                    name_indices.push(atom.index);
                    bindings.push(Binding {
                        name: atom.text().to_string(),
                        value: None,
                    });
                }
                other => {
                    if let Some(atom) = other.parts().first().and_then(Expr::as_atom) {
                        name_indices.push(atom.index);
                        bindings.push(Binding {
                            name: atom.text().to_string(),
                            value: other.parts().get(1).cloned(),
                        });
                    }
                }
            }
        }
        for index in name_indices {
            self.resolve(index, TokenKind::LocalName);
        }

        Expr::Let(LocalBinding { bindings, form })
    }
}

fn package_def(form: Compound) -> Expr {
    let Some(name) = form.parts.get(1).and_then(Expr::as_atom) else {
        return Expr::Form(form);
    };
    let name = normalize_package_name(name.text());

    let mut uses = Vec::new();
    let mut exports = Vec::new();
    for option in form.parts.iter().skip(2) {
        let mut items = option.parts().iter().filter_map(Expr::as_atom);
        let Some(key) = items.next() else {
            continue;
        };
        match designator_name(key.text()).to_uppercase().as_str() {
            "USE" => uses.extend(items.map(|a| normalize_package_name(a.text()))),
            "EXPORT" => exports.extend(items.map(|a| designator_name(a.text()).to_string())),
            _ => {}
        }
    }

    Expr::Package(PackageDef {
        name,
        uses,
        exports,
        form,
    })
}

fn package_switch(form: Compound) -> Expr {
    match form.parts.get(1).and_then(Expr::as_atom) {
        Some(name) => Expr::InPackage(PackageSwitch {
            name: normalize_package_name(name.text()),
            form,
        }),
        None => Expr::Form(form),
    }
}
