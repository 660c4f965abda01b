//! Static keyword tables used to classify identifiers.
//!
//! Built once on first use and shared read-only afterwards. Lookups take the
//! upper-cased identifier text.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::token::TokenKind;

const CONTROL: &[&str] = &[
    "AND",
    "BLOCK",
    "CASE",
    "CATCH",
    "CCASE",
    "COND",
    "CTYPECASE",
    "DO",
    "DO*",
    "DO-ALL-SYMBOLS",
    "DO-EXTERNAL-SYMBOLS",
    "DO-SYMBOLS",
    "DOLIST",
    "DOTIMES",
    "ECASE",
    "ETYPECASE",
    "GO",
    "HANDLER-BIND",
    "HANDLER-CASE",
    "IF",
    "IGNORE-ERRORS",
    "OR",
    "PROG1",
    "PROG2",
    "PROGN",
    "RESTART-BIND",
    "RESTART-CASE",
    "RETURN",
    "RETURN-FROM",
    "TAGBODY",
    "THROW",
    "TYPECASE",
    "UNLESS",
    "UNWIND-PROTECT",
    "WHEN",
];

const MACRO: &[&str] = &[
    "ASSERT",
    "CHECK-TYPE",
    "DECF",
    "DEFINE-COMPILER-MACRO",
    "DEFINE-MODIFY-MACRO",
    "DEFINE-SETF-EXPANDER",
    "DEFINE-SYMBOL-MACRO",
    "DEFGENERIC",
    "DEFSETF",
    "DEFSTRUCT",
    "DEFTYPE",
    "DESTRUCTURING-BIND",
    "INCF",
    "MULTIPLE-VALUE-BIND",
    "MULTIPLE-VALUE-LIST",
    "MULTIPLE-VALUE-SETQ",
    "POP",
    "PUSH",
    "PUSHNEW",
    "SETF",
    "WITH-ACCESSORS",
    "WITH-INPUT-FROM-STRING",
    "WITH-OPEN-FILE",
    "WITH-OPEN-STREAM",
    "WITH-OUTPUT-TO-STRING",
    "WITH-SLOTS",
    "WITH-STANDARD-IO-SYNTAX",
];

const SPECIAL_OPERATORS: &[&str] = &[
    "DECLARE",
    "EVAL-WHEN",
    "FLET",
    "FUNCTION",
    "LABELS",
    "LAMBDA",
    "LOAD-TIME-VALUE",
    "LOCALLY",
    "MACROLET",
    "MULTIPLE-VALUE-CALL",
    "MULTIPLE-VALUE-PROG1",
    "PROGV",
    "QUOTE",
    "SETQ",
    "SYMBOL-MACROLET",
    "THE",
];

const VARIABLES: &[&str] = &["DEFCONSTANT", "DEFPARAMETER", "DEFVAR"];

const LAMBDA_LIST: &[&str] = &[
    "&ALLOW-OTHER-KEYS",
    "&AUX",
    "&BODY",
    "&ENVIRONMENT",
    "&KEY",
    "&OPTIONAL",
    "&REST",
    "&WHOLE",
];

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    let mut table = HashMap::new();

    let categories: [(&[&str], TokenKind); 5] = [
        (CONTROL, TokenKind::ControlKeyword),
        (MACRO, TokenKind::MacroKeyword),
        (SPECIAL_OPERATORS, TokenKind::SpecialOperator),
        (VARIABLES, TokenKind::VariableKeyword),
        (LAMBDA_LIST, TokenKind::LambdaListKeyword),
    ];
    for (names, kind) in categories {
        for name in names {
            table.insert(*name, kind);
        }
    }

    table.insert("DEFUN", TokenKind::Defun);
    table.insert("DEFPACKAGE", TokenKind::DefPackage);
    table.insert("IN-PACKAGE", TokenKind::InPackage);
    table.insert("DEFINE-CONDITION", TokenKind::DefineCondition);
    table.insert("DEFCLASS", TokenKind::DefClass);
    table.insert("DEFMACRO", TokenKind::DefMacro);
    table.insert("DEFMETHOD", TokenKind::DefMethod);
    table.insert("LOOP", TokenKind::Loop);
    table.insert("LET", TokenKind::LocalBinding);
    table.insert("LET*", TokenKind::LocalBinding);

    table
});

/// Look up the kind for an identifier. `None` means a plain identifier.
pub fn lookup(text: &str) -> Option<TokenKind> {
    KEYWORDS.get(text.to_uppercase().as_str()).copied()
}
