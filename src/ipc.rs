//! SWANK protocol client.
//!
//! This module talks to a running Lisp process through its SWANK server over
//! TCP. Payloads in both directions are Lisp source, so inbound frames are
//! parsed with the same reader used for editor buffers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐            TCP             ┌─────────────────────┐
//! │  Editor core    │  ◄────────────────────────►│   SWANK server      │
//! │   (Session)     │   hex-length framing +     │   (Lisp process)    │
//! └─────────────────┘   Lisp-syntax messages     └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Each message is a 6-digit hex byte length followed by one Lisp form:
//!
//! ```text
//! 00003d(:emacs-rex (swank:interactive-eval "(+ 1 2)") "CL-USER" t 7)
//! 000015(:return (:ok "3") 7)
//! ```
//!
//! Replies carry the request id and may arrive in any order. Debugger
//! notifications (`:debug`, `:debug-activate`, ...) arrive unsolicited and
//! are delivered through [`Session::subscribe`].
//!
//! # Usage
//!
//! ```ignore
//! use lisp_editor_core::ipc::Session;
//!
//! let session = Session::connect("127.0.0.1", 4005).await?;
//! let mut events = session.subscribe();
//! let value = session.eval("(+ 1 2)").await?;
//! ```

mod client;
mod codec;
mod commands;
mod events;
mod framing;

pub use client::{ReplyHandle, Session, SessionError, DEFAULT_TIMEOUT_SECS};
pub use codec::{encode, encode_message, encode_request, frame, CodecError, ThreadSelector};
pub use events::{ProtocolEvent, ReturnStatus, SessionEvent};
pub use framing::{write_frame, FrameError, FrameReader, HEADER_LEN, MAX_FRAME_LEN};
