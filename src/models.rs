//! Data models for the SWANK protocol.
//!
//! [`Value`] is the single data type that crosses the wire in both
//! directions: requests are built from it by the codec and inbound payloads
//! are converted into it from reader expressions. The typed models below are
//! decoded from `Value` trees returned by the remote Lisp and serialize to
//! JSON for the editor host.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::syntax::{Expr, TokenKind};

// =============================================================================
// Value
// =============================================================================

/// Lisp data as it travels over the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    T,
    Int(i64),
    Float(f64),
    Str(String),
    /// Emitted verbatim: operator names such as `swank:connection-info`.
    Symbol(String),
    /// Stored without the leading colon, emitted with it.
    Keyword(String),
    List(Vec<Value>),
    /// Ordered key/value pairs, emitted as a `:key value` plist.
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn keyword(name: impl Into<String>) -> Self {
        Value::Keyword(name.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    /// An operator form: `(operator args...)`.
    pub fn call(operator: &str, args: impl IntoIterator<Item = Value>) -> Self {
        let mut items = vec![Value::symbol(operator)];
        items.extend(args);
        Value::List(items)
    }

    /// Convert a reader expression into a value. Recursion follows the
    /// tree, which the reader caps at [`MAX_DEPTH`](crate::syntax::MAX_DEPTH).
    pub fn from_expr(expr: &Expr) -> Self {
        match expr {
            Expr::Atom(atom) => match atom.kind() {
                TokenKind::String | TokenKind::MismatchedString => {
                    Value::Str(unescape_string(atom.text()))
                }
                _ => atom_value(atom.text()),
            },
            other => {
                let parts = other.parts();
                if parts.is_empty() {
                    Value::Nil
                } else {
                    Value::List(parts.iter().map(Value::from_expr).collect())
                }
            }
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// String contents, or the text of a symbol.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// List elements; `nil` is the empty list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            Value::Nil => Some(&[]),
            _ => None,
        }
    }

    /// Generalized boolean: anything but `nil` is true.
    pub fn is_true(&self) -> bool {
        !self.is_nil()
    }

    pub fn keyword_eq(&self, name: &str) -> bool {
        matches!(self, Value::Keyword(k) if k.eq_ignore_ascii_case(name))
    }

    /// Look up `key` (without colon) in a plist or record.
    pub fn plist_get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(pairs) => pairs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v),
            Value::List(items) => items
                .chunks(2)
                .find(|pair| pair[0].keyword_eq(key))
                .and_then(|pair| pair.get(1)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        if b {
            Value::T
        } else {
            Value::Nil
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_none(),
            Value::T => serializer.serialize_bool(true),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) | Value::Symbol(s) => serializer.serialize_str(s),
            Value::Keyword(k) => serializer.serialize_str(&format!(":{}", k)),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (k, v) in pairs {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Strip the surrounding quotes and resolve backslash escapes.
fn unescape_string(text: &str) -> String {
    let inner = text.strip_prefix('"').unwrap_or(text);
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn atom_value(text: &str) -> Value {
    if text.eq_ignore_ascii_case("nil") {
        return Value::Nil;
    }
    if text.eq_ignore_ascii_case("t") {
        return Value::T;
    }
    if let Some(name) = text.strip_prefix(':') {
        if !name.is_empty() {
            return Value::Keyword(name.to_string());
        }
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Int(n);
    }
    if looks_numeric(text) {
        // Lisp exponent markers: 1.5d0, 2.0f3
        let normalized: String = text
            .chars()
            .map(|c| match c {
                'd' | 'D' | 'f' | 'F' | 's' | 'S' | 'l' | 'L' => 'e',
                other => other,
            })
            .collect();
        if let Ok(f) = normalized.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::Symbol(text.to_string())
}

fn looks_numeric(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    let body = body.strip_prefix('.').unwrap_or(body);
    body.starts_with(|c: char| c.is_ascii_digit())
}

// =============================================================================
// Typed Replies
// =============================================================================

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.plist_get(key).and_then(Value::as_str).map(str::to_string)
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_list()
        .unwrap_or(&[])
        .iter()
        .filter_map(|v| match v {
            Value::Keyword(k) => Some(format!(":{}", k)),
            other => other.as_str().map(str::to_string),
        })
        .collect()
}

/// Reply to `swank:connection-info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub pid: Option<i64>,
    /// Lisp implementation type, e.g. `SBCL`.
    pub implementation: Option<String>,
    pub implementation_version: Option<String>,
    /// SWANK protocol version.
    pub version: Option<String>,
    pub package: Option<String>,
    pub prompt: Option<String>,
    pub features: Vec<String>,
}

impl ConnectionInfo {
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_list()?;
        let implementation = value.plist_get("lisp-implementation");
        let package = value.plist_get("package");
        Some(Self {
            pid: value.plist_get("pid").and_then(Value::as_int),
            implementation: implementation.and_then(|i| string_field(i, "type")),
            implementation_version: implementation.and_then(|i| string_field(i, "version")),
            version: string_field(value, "version"),
            package: package.and_then(|p| string_field(p, "name")),
            prompt: package.and_then(|p| string_field(p, "prompt")),
            features: value.plist_get("features").map(strings).unwrap_or_default(),
        })
    }
}

/// Reply to `swank:simple-completions`: `((candidates...) common-prefix)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Completions {
    pub candidates: Vec<String>,
    pub common_prefix: String,
}

impl Completions {
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_list()?;
        if items.is_empty() {
            return Some(Self::default());
        }
        Some(Self {
            candidates: strings(items.first()?),
            common_prefix: items
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Restart {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktraceFrame {
    pub index: i64,
    pub description: String,
    pub restartable: bool,
}

impl BacktraceFrame {
    /// `(index "description" [(:restartable t)])`
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_list()?;
        let restartable = items
            .get(2)
            .and_then(|extra| extra.plist_get("restartable"))
            .is_some_and(Value::is_true);
        Some(Self {
            index: items.first()?.as_int()?,
            description: items.get(1)?.as_str()?.to_string(),
            restartable,
        })
    }

    pub fn list_from_value(value: &Value) -> Vec<Self> {
        value
            .as_list()
            .unwrap_or(&[])
            .iter()
            .filter_map(Self::from_value)
            .collect()
    }
}

/// Payload of a `(:debug ...)` notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    pub thread: i64,
    pub level: i64,
    /// Condition description, then its type line.
    pub condition: Vec<String>,
    pub restarts: Vec<Restart>,
    pub frames: Vec<BacktraceFrame>,
    pub continuations: Vec<i64>,
}

impl DebugInfo {
    /// Decode the arguments following `:debug`:
    /// `thread level (condition type extras) restarts frames continuations`.
    pub fn from_args(args: &[Value]) -> Option<Self> {
        let condition = args
            .get(2)?
            .as_list()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        let restarts = args
            .get(3)
            .and_then(Value::as_list)
            .unwrap_or(&[])
            .iter()
            .filter_map(|r| {
                let pair = r.as_list()?;
                Some(Restart {
                    name: pair.first()?.as_str()?.to_string(),
                    description: pair.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
                })
            })
            .collect();
        Some(Self {
            thread: args.first()?.as_int()?,
            level: args.get(1)?.as_int()?,
            condition,
            restarts,
            frames: args.get(4).map(BacktraceFrame::list_from_value).unwrap_or_default(),
            continuations: args
                .get(5)
                .and_then(Value::as_list)
                .unwrap_or(&[])
                .iter()
                .filter_map(Value::as_int)
                .collect(),
        })
    }
}

/// One local variable of a debugger frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameLocal {
    pub name: String,
    pub id: i64,
    pub value: String,
}

impl FrameLocal {
    /// `(:name "X" :id 0 :value "1")`
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            name: string_field(value, "name")?,
            id: value.plist_get("id").and_then(Value::as_int).unwrap_or(0),
            value: string_field(value, "value").unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompilerNote {
    pub message: String,
    /// `error`, `warning`, `style-warning`, `note`...
    pub severity: String,
    pub file: Option<String>,
    pub position: Option<i64>,
}

impl CompilerNote {
    pub fn from_value(value: &Value) -> Option<Self> {
        let message = string_field(value, "message")?;
        let severity = match value.plist_get("severity") {
            Some(Value::Keyword(k)) => k.to_lowercase(),
            _ => "note".to_string(),
        };

        // (:location (:file "x.lisp") (:position 42) nil)
        let mut file = None;
        let mut position = None;
        if let Some(parts) = value.plist_get("location").and_then(Value::as_list) {
            for part in parts {
                let Some(entry) = part.as_list() else {
                    continue;
                };
                match entry.first() {
                    Some(head) if head.keyword_eq("file") => {
                        file = entry.get(1).and_then(Value::as_str).map(str::to_string);
                    }
                    Some(head) if head.keyword_eq("position") => {
                        position = entry.get(1).and_then(Value::as_int);
                    }
                    _ => {}
                }
            }
        }

        Some(Self {
            message,
            severity,
            file,
            position,
        })
    }
}

/// Reply to `swank:compile-file-for-emacs`:
/// `(:compilation-result notes success duration loaded fasl)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompilationResult {
    pub notes: Vec<CompilerNote>,
    pub success: bool,
    pub duration: f64,
    pub loaded: bool,
    pub fasl: Option<String>,
}

impl CompilationResult {
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_list()?;
        let fields = match items.first() {
            Some(head) if head.keyword_eq("compilation-result") => &items[1..],
            _ => items,
        };
        Some(Self {
            notes: fields
                .first()?
                .as_list()
                .unwrap_or(&[])
                .iter()
                .filter_map(CompilerNote::from_value)
                .collect(),
            success: fields.get(1).is_some_and(Value::is_true),
            duration: fields.get(2).and_then(Value::as_float).unwrap_or(0.0),
            loaded: fields.get(3).is_some_and(Value::is_true),
            fasl: fields.get(4).and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn has_errors(&self) -> bool {
        self.notes.iter().any(|n| n.severity == "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;
    use pretty_assertions::assert_eq;

    fn value(text: &str) -> Value {
        Value::from_expr(&parse(text)[0])
    }

    #[test]
    fn test_atoms_convert() {
        assert_eq!(value("nil"), Value::Nil);
        assert_eq!(value("NIL"), Value::Nil);
        assert_eq!(value("t"), Value::T);
        assert_eq!(value("42"), Value::Int(42));
        assert_eq!(value("-7"), Value::Int(-7));
        assert_eq!(value("1.5"), Value::Float(1.5));
        assert_eq!(value("2.0d0"), Value::Float(2.0));
        assert_eq!(value(":ok"), Value::keyword("ok"));
        assert_eq!(value("swank:eval"), Value::symbol("swank:eval"));
        assert_eq!(value("foo"), Value::symbol("foo"));
    }

    #[test]
    fn test_deep_payload_converts() {
        let mut current = &value(&"(1 ".repeat(100_000));
        let mut levels = 0;
        while let Value::List(items) = current {
            levels += 1;
            current = items.last().unwrap();
        }
        assert_eq!(levels, crate::syntax::MAX_DEPTH + 1);
        assert_eq!(current, &Value::Int(1));
    }

    #[test]
    fn test_symbol_that_looks_numeric_is_not_float() {
        assert_eq!(value("inf"), Value::symbol("inf"));
        assert_eq!(value("1+"), Value::symbol("1+"));
    }

    #[test]
    fn test_keyword_keeps_hyphens() {
        assert_eq!(value(":debug-activate"), Value::keyword("debug-activate"));
    }

    #[test]
    fn test_string_unescaped() {
        assert_eq!(value(r#""say \"hi\" \\ bye""#), Value::string(r#"say "hi" \ bye"#));
    }

    #[test]
    fn test_empty_list_is_nil() {
        assert_eq!(value("()"), Value::Nil);
        assert_eq!(value("()").as_list(), Some(&[][..]));
    }

    #[test]
    fn test_nested_lists() {
        assert_eq!(
            value("(:return (:ok \"3\") 7)"),
            Value::List(vec![
                Value::keyword("return"),
                Value::List(vec![Value::keyword("ok"), Value::string("3")]),
                Value::Int(7),
            ])
        );
    }

    #[test]
    fn test_plist_get() {
        let v = value("(:name \"X\" :id 3)");
        assert_eq!(v.plist_get("id"), Some(&Value::Int(3)));
        assert_eq!(v.plist_get("NAME").and_then(Value::as_str), Some("X"));
        assert_eq!(v.plist_get("missing"), None);

        let record = Value::Record(vec![("a".into(), Value::T)]);
        assert_eq!(record.plist_get("a"), Some(&Value::T));
    }

    #[test]
    fn test_value_serializes_to_json() {
        let v = value("(:ok (1 \"two\" nil t))");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"[":ok",[1,"two",null,true]]"#);
    }

    #[test]
    fn test_connection_info() {
        let v = value(
            r#"(:pid 4242 :style :spawn
                :lisp-implementation (:type "SBCL" :name "sbcl" :version "2.4.0")
                :package (:name "COMMON-LISP-USER" :prompt "CL-USER")
                :features (:swank :sbcl)
                :version "2.29")"#,
        );
        let info = ConnectionInfo::from_value(&v).unwrap();
        assert_eq!(info.pid, Some(4242));
        assert_eq!(info.implementation.as_deref(), Some("SBCL"));
        assert_eq!(info.implementation_version.as_deref(), Some("2.4.0"));
        assert_eq!(info.version.as_deref(), Some("2.29"));
        assert_eq!(info.prompt.as_deref(), Some("CL-USER"));
        assert_eq!(info.features, vec![":swank", ":sbcl"]);
    }

    #[test]
    fn test_completions() {
        let v = value(r#"(("list" "list*" "list-length") "list")"#);
        let completions = Completions::from_value(&v).unwrap();
        assert_eq!(completions.candidates.len(), 3);
        assert_eq!(completions.common_prefix, "list");

        assert_eq!(Completions::from_value(&Value::Nil), Some(Completions::default()));
    }

    #[test]
    fn test_debug_info() {
        let v = value(
            r#"(1 1 ("division by zero" "   [Condition of type DIVISION-BY-ZERO]" nil)
                (("RETRY" "Retry evaluation") ("*ABORT" "Return to top level"))
                ((0 "(/ 1 0)") (1 "(EVAL (/ 1 0))" (:restartable t)))
                (12))"#,
        );
        let info = DebugInfo::from_args(v.as_list().unwrap()).unwrap();
        assert_eq!(info.thread, 1);
        assert_eq!(info.level, 1);
        assert_eq!(info.condition[0], "division by zero");
        assert_eq!(info.restarts.len(), 2);
        assert_eq!(info.restarts[1].name, "*ABORT");
        assert_eq!(info.frames.len(), 2);
        assert!(!info.frames[0].restartable);
        assert!(info.frames[1].restartable);
        assert_eq!(info.continuations, vec![12]);
    }

    #[test]
    fn test_compilation_result() {
        let v = value(
            r#"(:compilation-result
                ((:message "undefined variable: X" :severity :warning
                  :location (:location (:file "/tmp/a.lisp") (:position 17) nil)))
                t 0.25 nil "/tmp/a.fasl")"#,
        );
        let result = CompilationResult::from_value(&v).unwrap();
        assert!(result.success);
        assert!(!result.loaded);
        assert_eq!(result.duration, 0.25);
        assert_eq!(result.fasl.as_deref(), Some("/tmp/a.fasl"));
        assert_eq!(result.notes.len(), 1);
        let note = &result.notes[0];
        assert_eq!(note.severity, "warning");
        assert_eq!(note.file.as_deref(), Some("/tmp/a.lisp"));
        assert_eq!(note.position, Some(17));
        assert!(!result.has_errors());
    }

    #[test]
    fn test_frame_local() {
        let v = value(r#"(:name "X" :id 0 :value "42")"#);
        let local = FrameLocal::from_value(&v).unwrap();
        assert_eq!(local.name, "X");
        assert_eq!(local.value, "42");
    }
}
