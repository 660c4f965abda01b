//! Lisp-syntax encoding of outbound messages.
//!
//! Requests are literal Lisp source read by the remote process, so the
//! encoding here must stay within what a standard Lisp reader accepts.

use std::fmt::Write;

use thiserror::Error;

use crate::ipc::framing::MAX_FRAME_LEN;
use crate::models::Value;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload of {0} bytes does not fit a 6-digit length header")]
    PayloadTooLarge(usize),

    #[error("Request id {0} does not fit a Lisp fixnum")]
    IdOutOfRange(u64),
}

/// Thread a request runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSelector {
    /// `t`: let the server pick.
    Any,
    /// `:repl-thread`
    Repl,
    Id(i64),
}

impl ThreadSelector {
    pub fn to_value(self) -> Value {
        match self {
            ThreadSelector::Any => Value::T,
            ThreadSelector::Repl => Value::keyword("repl-thread"),
            ThreadSelector::Id(id) => Value::Int(id),
        }
    }
}

/// Encode a value as Lisp source.
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut String) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::T => out.push('t'),
        Value::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::Float(f) => {
            // Debug keeps the fraction, so 1.0 is not read back as an integer
            let _ = write!(out, "{:?}", f);
        }
        Value::Str(s) => {
            out.push('"');
            for c in s.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
        Value::Symbol(s) => out.push_str(s),
        Value::Keyword(k) => {
            out.push(':');
            out.push_str(k);
        }
        Value::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                encode_into(item, out);
            }
            out.push(')');
        }
        Value::Record(pairs) => {
            out.push('(');
            for (i, (key, item)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push(':');
                out.push_str(key);
                out.push(' ');
                encode_into(item, out);
            }
            out.push(')');
        }
    }
}

/// Prefix `payload` with its zero-padded hex byte length.
pub fn frame(payload: &str) -> Result<String, CodecError> {
    let len = payload.len();
    if len > MAX_FRAME_LEN {
        return Err(CodecError::PayloadTooLarge(len));
    }
    Ok(format!("{:06x}{}", len, payload))
}

/// Encode and frame `(:emacs-rex form "package" thread id)`.
pub fn encode_request(
    id: u64,
    form: &Value,
    package: &str,
    thread: ThreadSelector,
) -> Result<String, CodecError> {
    let wire_id = i64::try_from(id).map_err(|_| CodecError::IdOutOfRange(id))?;
    let message = Value::List(vec![
        Value::keyword("emacs-rex"),
        form.clone(),
        Value::string(package),
        thread.to_value(),
        Value::Int(wire_id),
    ]);
    frame(&encode(&message))
}

/// Encode and frame a message that expects no reply.
pub fn encode_message(message: &Value) -> Result<String, CodecError> {
    frame(&encode(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&Value::Nil), "nil");
        assert_eq!(encode(&Value::T), "t");
        assert_eq!(encode(&true.into()), "t");
        assert_eq!(encode(&false.into()), "nil");
        assert_eq!(encode(&Value::Int(-3)), "-3");
        assert_eq!(encode(&Value::Float(1.0)), "1.0");
        assert_eq!(encode(&Value::keyword("ok")), ":ok");
        assert_eq!(encode(&Value::symbol("swank:eval")), "swank:eval");
    }

    #[test]
    fn test_encode_string_escapes() {
        assert_eq!(encode(&Value::string(r#"a "b" \c"#)), r#""a \"b\" \\c""#);
    }

    #[test]
    fn test_encode_record_keeps_insertion_order() {
        let record = Value::Record(vec![
            ("zeta".into(), Value::Int(1)),
            ("alpha".into(), Value::string("x")),
        ]);
        assert_eq!(encode(&record), r#"(:zeta 1 :alpha "x")"#);
    }

    #[test]
    fn test_encode_nested_list() {
        let v = Value::call("swank:foo", [Value::List(vec![Value::Int(1), Value::Nil])]);
        assert_eq!(encode(&v), "(swank:foo (1 nil))");
    }

    #[test]
    fn test_frame_header() {
        assert_eq!(frame("(x)").unwrap(), "000003(x)");
        assert_eq!(frame("").unwrap(), "000000");
    }

    #[test]
    fn test_frame_header_for_reply_and_request() {
        assert_eq!(
            frame(r#"(:return (:ok "3") 7)"#).unwrap(),
            r#"000015(:return (:ok "3") 7)"#
        );
        let form = Value::call("swank:interactive-eval", [Value::string("(+ 1 2)")]);
        let framed = encode_request(7, &form, "CL-USER", ThreadSelector::Any).unwrap();
        assert!(framed.starts_with("00003d(:emacs-rex "));
    }

    #[test]
    fn test_frame_header_counts_bytes() {
        // "é" is two bytes in UTF-8
        assert_eq!(frame("\"é\"").unwrap(), "000004\"é\"");
    }

    #[test]
    fn test_encode_request() {
        let form = Value::call("swank:interactive-eval", [Value::string("(+ 1 2)")]);
        let framed = encode_request(7, &form, "CL-USER", ThreadSelector::Any).unwrap();
        let body = r#"(:emacs-rex (swank:interactive-eval "(+ 1 2)") "CL-USER" t 7)"#;
        assert_eq!(&framed[6..], body);
        assert_eq!(usize::from_str_radix(&framed[..6], 16).unwrap(), body.len());
    }

    #[test]
    fn test_request_id_out_of_range() {
        let form = Value::call("swank:x", []);
        let max = i64::MAX as u64;
        assert!(encode_request(max, &form, "CL-USER", ThreadSelector::Any)
            .unwrap()
            .ends_with(&format!("t {})", max)));
        assert!(matches!(
            encode_request(max + 1, &form, "CL-USER", ThreadSelector::Any),
            Err(CodecError::IdOutOfRange(id)) if id == max + 1
        ));
    }

    #[test]
    fn test_thread_selectors() {
        let form = Value::call("swank:x", []);
        let repl = encode_request(1, &form, "P", ThreadSelector::Repl).unwrap();
        assert!(repl.ends_with("\"P\" :repl-thread 1)"));
        let id = encode_request(2, &form, "P", ThreadSelector::Id(5)).unwrap();
        assert!(id.ends_with("\"P\" 5 2)"));
    }
}
