//! Lisp Editor Core Library
//!
//! This library provides the editor-independent core of a Common Lisp
//! editor integration:
//!
//! - `syntax` - Tokenizer, expression reader and highlighting classes
//! - `packages` - Which package owns which lines, and which names are visible
//! - `ipc` - SWANK protocol session over TCP
//! - `models` - Wire values and typed SWANK replies
//! - `config` - Connection settings
//!
//! # Reading source
//!
//! ```ignore
//! use lisp_editor_core::packages::{FileId, PackageTable};
//! use lisp_editor_core::syntax;
//!
//! let forms = syntax::parse(&text);
//! let mut table = PackageTable::new();
//! table.update(&forms, &FileId::from_path(path));
//! let package = table.resolve(&file, line);
//! ```
//!
//! # Talking to a Lisp
//!
//! ```ignore
//! use lisp_editor_core::ipc::Session;
//!
//! let session = Session::connect("127.0.0.1", 4005).await?;
//! let result = session.eval("(+ 1 2)").await?;
//! ```

pub mod config;
pub mod ipc;
pub mod models;
pub mod packages;
pub mod syntax;
