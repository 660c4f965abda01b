//! Typed SWANK operations.
//!
//! Each method builds the operator form, sends it through the session and
//! decodes the reply into a model. Replies of an unexpected shape surface as
//! [`SessionError::Protocol`].

use crate::ipc::client::{Session, SessionError};
use crate::ipc::codec::{encode, ThreadSelector};
use crate::models::{
    BacktraceFrame, CompilationResult, Completions, ConnectionInfo, FrameLocal, Value,
};

fn unexpected(operation: &str, reply: &Value) -> SessionError {
    SessionError::Protocol(format!(
        "Unexpected reply to {}: {}",
        operation,
        encode(reply)
    ))
}

/// Text of a string reply, or its Lisp rendering otherwise.
fn reply_text(reply: Value) -> String {
    match reply {
        Value::Str(s) => s,
        other => encode(&other),
    }
}

/// Debugger commands unwind the stack, so the server often answers them with
/// an abort. That is the expected outcome, not a failure.
fn ignore_abort(result: Result<Value, SessionError>) -> Result<(), SessionError> {
    match result {
        Ok(_) | Err(SessionError::Aborted(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

impl Session {
    /// `(swank:connection-info)`: the handshake performed by `connect`.
    pub async fn request_connection_info(&self) -> Result<ConnectionInfo, SessionError> {
        let reply = self.send(&Value::call("swank:connection-info", [])).await?;
        ConnectionInfo::from_value(&reply).ok_or_else(|| unexpected("connection-info", &reply))
    }

    /// Evaluate `expr` and return the printed result, e.g. `"=> 3"`.
    pub async fn eval(&self, expr: &str) -> Result<String, SessionError> {
        let form = Value::call("swank:interactive-eval", [Value::string(expr)]);
        self.send(&form).await.map(reply_text)
    }

    /// Evaluate `expr`, returning `(output, value)`.
    pub async fn eval_and_grab_output(&self, expr: &str) -> Result<(String, String), SessionError> {
        let form = Value::call("swank:eval-and-grab-output", [Value::string(expr)]);
        let reply = self.send(&form).await?;
        let items = reply.as_list().unwrap_or(&[]);
        match (items.first().and_then(Value::as_str), items.get(1).and_then(Value::as_str)) {
            (Some(output), Some(value)) => Ok((output.to_string(), value.to_string())),
            _ => Err(unexpected("eval-and-grab-output", &reply)),
        }
    }

    pub async fn completions(&self, prefix: &str) -> Result<Completions, SessionError> {
        let form = Value::call(
            "swank:simple-completions",
            [Value::string(prefix), Value::string(self.package())],
        );
        let reply = self.send(&form).await?;
        Completions::from_value(&reply).ok_or_else(|| unexpected("simple-completions", &reply))
    }

    pub async fn describe_symbol(&self, name: &str) -> Result<String, SessionError> {
        let form = Value::call("swank:describe-symbol", [Value::string(name)]);
        self.send(&form).await.map(reply_text)
    }

    /// Argument list of an operator, `None` when the server does not know it.
    pub async fn operator_arglist(&self, name: &str) -> Result<Option<String>, SessionError> {
        let form = Value::call(
            "swank:operator-arglist",
            [Value::string(name), Value::string(self.package())],
        );
        let reply = self.send(&form).await?;
        Ok(reply.as_str().map(str::to_string))
    }

    pub async fn list_all_package_names(
        &self,
        include_nicknames: bool,
    ) -> Result<Vec<String>, SessionError> {
        let form = Value::call("swank:list-all-package-names", [Value::from(include_nicknames)]);
        let reply = self.send(&form).await?;
        let names = reply
            .as_list()
            .ok_or_else(|| unexpected("list-all-package-names", &reply))?;
        Ok(names
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    pub async fn load_file(&self, path: &str) -> Result<String, SessionError> {
        let form = Value::call("swank:load-file", [Value::string(path)]);
        self.send(&form).await.map(reply_text)
    }

    pub async fn compile_file(
        &self,
        path: &str,
        load: bool,
    ) -> Result<CompilationResult, SessionError> {
        let form = Value::call(
            "swank:compile-file-for-emacs",
            [Value::string(path), Value::from(load)],
        );
        let reply = self.send(&form).await?;
        CompilationResult::from_value(&reply)
            .ok_or_else(|| unexpected("compile-file-for-emacs", &reply))
    }

    /// Load SWANK contribs such as `swank-repl`. Returns the loaded modules.
    pub async fn swank_require(&self, modules: &[&str]) -> Result<Vec<String>, SessionError> {
        let names = modules.iter().map(|m| Value::keyword(*m)).collect();
        let quoted = Value::List(vec![Value::symbol("quote"), Value::List(names)]);
        let reply = self.send(&Value::call("swank:swank-require", [quoted])).await?;
        Ok(reply
            .as_list()
            .unwrap_or(&[])
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    // =========================================================================
    // Debugger
    // =========================================================================

    pub async fn invoke_nth_restart(
        &self,
        thread: i64,
        level: i64,
        restart: i64,
    ) -> Result<(), SessionError> {
        let form = Value::call(
            "swank:invoke-nth-restart-for-emacs",
            [Value::Int(level), Value::Int(restart)],
        );
        ignore_abort(
            self.send_in(&form, self.package(), ThreadSelector::Id(thread))
                .await,
        )
    }

    pub async fn sldb_abort(&self, thread: i64) -> Result<(), SessionError> {
        let form = Value::call("swank:sldb-abort", []);
        ignore_abort(
            self.send_in(&form, self.package(), ThreadSelector::Id(thread))
                .await,
        )
    }

    pub async fn throw_to_toplevel(&self, thread: i64) -> Result<(), SessionError> {
        let form = Value::call("swank:throw-to-toplevel", []);
        ignore_abort(
            self.send_in(&form, self.package(), ThreadSelector::Id(thread))
                .await,
        )
    }

    /// Frames `start..end` of the debugger's backtrace.
    pub async fn backtrace(
        &self,
        thread: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<BacktraceFrame>, SessionError> {
        let form = Value::call("swank:backtrace", [Value::Int(start), Value::Int(end)]);
        let reply = self
            .send_in(&form, self.package(), ThreadSelector::Id(thread))
            .await?;
        Ok(BacktraceFrame::list_from_value(&reply))
    }

    pub async fn frame_locals(
        &self,
        thread: i64,
        frame: i64,
    ) -> Result<Vec<FrameLocal>, SessionError> {
        let form = Value::call("swank:frame-locals-and-catch-tags", [Value::Int(frame)]);
        let reply = self
            .send_in(&form, self.package(), ThreadSelector::Id(thread))
            .await?;
        let locals = reply
            .as_list()
            .and_then(|items| items.first())
            .and_then(Value::as_list)
            .unwrap_or(&[]);
        Ok(locals.iter().filter_map(FrameLocal::from_value).collect())
    }

    /// Interrupt a running evaluation. No reply is expected.
    pub async fn interrupt(&self, thread: ThreadSelector) -> Result<(), SessionError> {
        let message = Value::List(vec![Value::keyword("emacs-interrupt"), thread.to_value()]);
        self.send_message(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::codec::frame;
    use crate::ipc::framing::FrameReader;
    use crate::syntax::parse;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Answer exactly one request with `(:return (:ok <reply>) id)` and hand
    /// back the request text.
    async fn serve_one(mut server: TcpStream, reply: &'static str) -> String {
        let mut frames = FrameReader::new();
        let mut buf = [0u8; 1024];
        let request = loop {
            let n = server.read(&mut buf).await.unwrap();
            frames.feed(&buf[..n]).unwrap();
            if let Some(request) = frames.take_frame().unwrap() {
                break request;
            }
        };
        let message = Value::from_expr(&parse(&request)[0]);
        let id = message.as_list().unwrap()[4].as_int().unwrap();
        let framed = frame(&format!("(:return (:ok {}) {})", reply, id)).unwrap();
        server.write_all(framed.as_bytes()).await.unwrap();
        request
    }

    async fn exchange<T, F, Fut>(reply: &'static str, call: F) -> (T, String)
    where
        F: FnOnce(Session) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let session = Session::attach(client.unwrap());
        let server = tokio::spawn(serve_one(server.unwrap().0, reply));

        let result = timeout(TEST_TIMEOUT, call(session)).await.expect("Test timed out");
        let request = server.await.unwrap();
        (result, request)
    }

    #[tokio::test]
    async fn test_eval() {
        let (result, request) =
            exchange("\"=> 3\"", |s| async move { s.eval("(+ 1 2)").await }).await;
        assert_eq!(result.unwrap(), "=> 3");
        assert!(request.starts_with(r#"(:emacs-rex (swank:interactive-eval "(+ 1 2)") "CL-USER" t "#));
    }

    #[tokio::test]
    async fn test_completions() {
        let (result, request) = exchange(r#"(("car" "cadr") "ca")"#, |s| async move {
            s.completions("ca").await
        })
        .await;
        let completions = result.unwrap();
        assert_eq!(completions.candidates, vec!["car", "cadr"]);
        assert_eq!(completions.common_prefix, "ca");
        assert!(request.contains(r#"(swank:simple-completions "ca" "CL-USER")"#));
    }

    #[tokio::test]
    async fn test_operator_arglist_unknown() {
        let (result, _) =
            exchange("nil", |s| async move { s.operator_arglist("nope").await }).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_swank_require_quotes_module_list() {
        let (result, request) = exchange(r#"("SWANK-REPL")"#, |s| async move {
            s.swank_require(&["swank-repl"]).await
        })
        .await;
        assert_eq!(result.unwrap(), vec!["SWANK-REPL"]);
        assert!(request.contains("(swank:swank-require (quote (:swank-repl)))"));
    }

    #[tokio::test]
    async fn test_backtrace_runs_in_thread() {
        let (result, request) = exchange(r#"((0 "(FOO)") (1 "(BAR)"))"#, |s| async move {
            s.backtrace(3, 0, 20).await
        })
        .await;
        assert_eq!(result.unwrap().len(), 2);
        assert!(request.contains(r#"(swank:backtrace 0 20) "CL-USER" 3 "#));
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_protocol_error() {
        let (result, _) = exchange("42", |s| async move { s.compile_file("/tmp/x.lisp", true).await })
            .await;
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }
}
