//! Classification of inbound SWANK messages.
//!
//! Every frame's payload is read into a [`Value`] and dispatched on its
//! leading keyword. Messages this layer does not understand are reported as
//! `None` and dropped by the session.

use serde::Serialize;

use crate::models::{DebugInfo, Value};

/// Outcome carried by a `(:return (status payload) id)` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum ReturnStatus {
    Ok,
    /// `:abort`, or any other non-`:ok` status, with the remote's reason.
    Abort(String),
}

/// One classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    Return {
        id: u64,
        status: ReturnStatus,
        payload: Value,
    },
    DebugEntered(DebugInfo),
    DebugActivated {
        thread: i64,
        level: i64,
    },
    DebugReturned {
        thread: i64,
        level: i64,
    },
    Output(String),
    PackageChanged {
        name: String,
        prompt: String,
    },
    Ping {
        thread: Value,
        tag: Value,
    },
    InvalidRpc {
        id: u64,
        message: String,
    },
}

impl ProtocolEvent {
    /// Classify a message by its leading keyword.
    pub fn classify(message: &Value) -> Option<Self> {
        let items = message.as_list()?;
        let (head, args) = items.split_first()?;
        let Value::Keyword(kind) = head else {
            return None;
        };

        match kind.to_ascii_lowercase().as_str() {
            "return" => {
                let outcome = args.first()?.as_list()?;
                let id = request_id(args.get(1)?)?;
                let status = match outcome.first()? {
                    s if s.keyword_eq("ok") => ReturnStatus::Ok,
                    other => ReturnStatus::Abort(abort_reason(other, outcome.get(1))),
                };
                Some(ProtocolEvent::Return {
                    id,
                    status,
                    payload: outcome.get(1).cloned().unwrap_or(Value::Nil),
                })
            }
            "debug" => DebugInfo::from_args(args).map(ProtocolEvent::DebugEntered),
            "debug-activate" => Some(ProtocolEvent::DebugActivated {
                thread: args.first()?.as_int()?,
                level: args.get(1)?.as_int()?,
            }),
            "debug-return" => Some(ProtocolEvent::DebugReturned {
                thread: args.first()?.as_int()?,
                level: args.get(1)?.as_int()?,
            }),
            "write-string" => Some(ProtocolEvent::Output(args.first()?.as_str()?.to_string())),
            "new-package" => Some(ProtocolEvent::PackageChanged {
                name: args.first()?.as_str()?.to_string(),
                prompt: args.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
            }),
            "ping" => Some(ProtocolEvent::Ping {
                thread: args.first()?.clone(),
                tag: args.get(1)?.clone(),
            }),
            "invalid-rpc" => Some(ProtocolEvent::InvalidRpc {
                id: request_id(args.first()?)?,
                message: args.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
            }),
            _ => None,
        }
    }
}

fn request_id(value: &Value) -> Option<u64> {
    value.as_int().and_then(|n| u64::try_from(n).ok())
}

fn abort_reason(status: &Value, detail: Option<&Value>) -> String {
    if let Some(text) = detail.and_then(Value::as_str) {
        return text.to_string();
    }
    match status {
        Value::Keyword(k) => format!(":{}", k),
        other => crate::ipc::codec::encode(other),
    }
}

/// Notification delivered to session subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    Return {
        id: u64,
        status: ReturnStatus,
    },
    DebugEntered(DebugInfo),
    DebugActivated {
        thread: i64,
        level: i64,
    },
    DebugReturned {
        thread: i64,
        level: i64,
    },
    Output {
        text: String,
    },
    PackageChanged {
        name: String,
        prompt: String,
    },
    Closed,
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;
    use pretty_assertions::assert_eq;

    fn classify(text: &str) -> Option<ProtocolEvent> {
        ProtocolEvent::classify(&Value::from_expr(&parse(text)[0]))
    }

    #[test]
    fn test_return_ok() {
        assert_eq!(
            classify(r#"(:return (:ok "3") 7)"#),
            Some(ProtocolEvent::Return {
                id: 7,
                status: ReturnStatus::Ok,
                payload: Value::string("3"),
            })
        );
    }

    #[test]
    fn test_return_abort_with_reason() {
        let event = classify(r#"(:return (:abort "NIL") 3)"#).unwrap();
        let ProtocolEvent::Return { id, status, .. } = event else {
            panic!("expected return");
        };
        assert_eq!(id, 3);
        assert_eq!(status, ReturnStatus::Abort("NIL".to_string()));
    }

    #[test]
    fn test_return_abort_without_reason() {
        let event = classify("(:return (:abort) 4)").unwrap();
        assert!(matches!(
            event,
            ProtocolEvent::Return { status: ReturnStatus::Abort(ref r), .. } if r == ":abort"
        ));
    }

    #[test]
    fn test_keyword_case_insensitive() {
        assert!(matches!(
            classify(r#"(:RETURN (:OK nil) 1)"#),
            Some(ProtocolEvent::Return { status: ReturnStatus::Ok, .. })
        ));
    }

    #[test]
    fn test_debug_entered() {
        let event = classify(
            r#"(:debug 1 1 ("boom" "[Condition of type ERROR]" nil)
                (("ABORT" "Return to top level")) ((0 "(ERROR \"boom\")")) nil)"#,
        )
        .unwrap();
        let ProtocolEvent::DebugEntered(info) = event else {
            panic!("expected debug");
        };
        assert_eq!(info.thread, 1);
        assert_eq!(info.restarts[0].name, "ABORT");
        assert_eq!(info.frames[0].description, "(ERROR \"boom\")");
        assert!(info.continuations.is_empty());
    }

    #[test]
    fn test_debug_activate_and_return() {
        assert_eq!(
            classify("(:debug-activate 1 2 nil)"),
            Some(ProtocolEvent::DebugActivated { thread: 1, level: 2 })
        );
        assert_eq!(
            classify("(:debug-return 1 1 nil)"),
            Some(ProtocolEvent::DebugReturned { thread: 1, level: 1 })
        );
    }

    #[test]
    fn test_output_and_package() {
        assert_eq!(
            classify("(:write-string \"hi\n\" :repl-result)"),
            Some(ProtocolEvent::Output("hi\n".to_string()))
        );
        assert_eq!(
            classify(r#"(:new-package "MY-APP" "APP")"#),
            Some(ProtocolEvent::PackageChanged {
                name: "MY-APP".to_string(),
                prompt: "APP".to_string(),
            })
        );
    }

    #[test]
    fn test_ping_and_invalid_rpc() {
        assert_eq!(
            classify("(:ping 3 17)"),
            Some(ProtocolEvent::Ping {
                thread: Value::Int(3),
                tag: Value::Int(17),
            })
        );
        assert_eq!(
            classify(r#"(:invalid-rpc 9 "bad form")"#),
            Some(ProtocolEvent::InvalidRpc {
                id: 9,
                message: "bad form".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_messages_dropped() {
        assert_eq!(classify("(:indentation-update ((\"foo\" . 1)))"), None);
        assert_eq!(classify("(not-a-keyword 1)"), None);
        assert_eq!(classify("42"), None);
        assert_eq!(classify("(:return)"), None);
        assert_eq!(classify("(:return (:ok 1) -1)"), None);
    }

    #[test]
    fn test_session_event_json() {
        let event = SessionEvent::DebugActivated { thread: 1, level: 1 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"debug-activated","thread":1,"level":1}"#);
    }
}
