//! Incremental decoder for the `/chat/stream` event stream.
//!
//! [`decode`] reads a byte stream chunk by chunk, reassembles frames that
//! span reads, hands content and image events to a [`StreamHandler`] and
//! ends with exactly one terminal outcome: completion, error, or timeout.
//!
//! ## Example
//! ```no_run
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use cortexai::stream::{decode, Callbacks};
//! use futures::stream;
//!
//! # async fn run() -> Result<(), cortexai::stream::StreamError> {
//! let body = stream::iter(vec![
//!     Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"Hi\"}\n")),
//!     Ok(Bytes::from_static(b"data: {\"type\":\"end\"}\n")),
//! ]);
//!
//! let mut callbacks = Callbacks::new().with_content(|delta| print!("{}", delta));
//! let text = decode(body, Duration::from_secs(60), &mut callbacks).await?;
//! assert_eq!(text, "Hi");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::model::{image_marker, StreamEvent};
use crate::sse::{parse_frame, parse_sse_line, LineBuffer};

/// Timeout used when the caller does not configure one.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(60);

// Roughly 30 years; deadlines past this are treated as never expiring.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Terminal failures of a stream session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Request timeout - no response from server")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Server(String),

    #[error("Stream ended without data")]
    EmptyStream,

    #[error("Stream timeout must be greater than zero")]
    InvalidTimeout,
}

/// Terminal result of a session: the final text or the failure.
pub type Outcome = Result<String, StreamError>;

/// Receives decoded events.
///
/// `on_content` and `on_image` fire in decode order, always before the single
/// terminal call to `on_complete` or `on_error`. Every method defaults to a
/// no-op.
pub trait StreamHandler {
    /// A text delta.
    fn on_content(&mut self, _text: &str) {}

    /// A generated image payload.
    fn on_image(&mut self, _data: &str) {}

    /// The session completed with its final text.
    fn on_complete(&mut self, _text: &str) {}

    /// The session failed.
    fn on_error(&mut self, _message: &str) {}
}

impl StreamHandler for () {}

type Callback<'a> = Box<dyn FnMut(&str) + 'a>;

/// Closure-backed [`StreamHandler`]; unset callbacks are skipped.
#[derive(Default)]
pub struct Callbacks<'a> {
    content: Option<Callback<'a>>,
    image: Option<Callback<'a>>,
    complete: Option<Callback<'a>>,
    error: Option<Callback<'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content callback.
    pub fn with_content(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.content = Some(Box::new(f));
        self
    }

    /// Set the image callback.
    pub fn with_image(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.image = Some(Box::new(f));
        self
    }

    /// Set the completion callback.
    pub fn with_complete(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    /// Set the error callback.
    pub fn with_error(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Callbacks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("content", &self.content.is_some())
            .field("image", &self.image.is_some())
            .field("complete", &self.complete.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl StreamHandler for Callbacks<'_> {
    fn on_content(&mut self, text: &str) {
        if let Some(f) = self.content.as_mut() {
            f(text);
        }
    }

    fn on_image(&mut self, data: &str) {
        if let Some(f) = self.image.as_mut() {
            f(data);
        }
    }

    fn on_complete(&mut self, text: &str) {
        if let Some(f) = self.complete.as_mut() {
            f(text);
        }
    }

    fn on_error(&mut self, message: &str) {
        if let Some(f) = self.error.as_mut() {
            f(message);
        }
    }
}

/// Working state of one request/response exchange.
///
/// The session can be driven without any transport: feed it chunks with
/// [`feed`](Self::feed), then [`close`](Self::close) it at end of input.
/// Each of `feed`, `close` and `fail` returns `Some` only for the call that
/// produced the terminal outcome; once finished, the session ignores further
/// input and never invokes the handler again.
#[derive(Debug)]
pub struct StreamSession {
    accumulated_text: String,
    lines: LineBuffer,
    has_received_data: bool,
    deadline: Instant,
    finished: bool,
}

impl StreamSession {
    /// Start a session that expires `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            accumulated_text: String::new(),
            lines: LineBuffer::new(),
            has_received_data: false,
            deadline: deadline_after(timeout),
            finished: false,
        }
    }

    /// Text assembled from every content and image event so far.
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn has_received_data(&self) -> bool {
        self.has_received_data
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk of the body, dispatching every frame it completes.
    pub fn feed<H>(&mut self, chunk: &[u8], handler: &mut H) -> Option<Outcome>
    where
        H: StreamHandler + ?Sized,
    {
        if self.finished {
            return None;
        }
        self.has_received_data = true;

        for line in self.lines.push(chunk) {
            let Some(data) = parse_sse_line(&line) else {
                continue;
            };

            let event = match parse_frame(data) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(frame = data, "ignoring frame with unknown type");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, frame = data, "skipping malformed stream frame");
                    continue;
                }
            };

            if let Some(outcome) = self.dispatch(event, handler) {
                return Some(outcome);
            }
        }
        None
    }

    /// End of input.
    ///
    /// A session that already collected text completes with it even without
    /// an `end` frame; otherwise it fails with [`StreamError::EmptyStream`].
    pub fn close<H>(&mut self, handler: &mut H) -> Option<Outcome>
    where
        H: StreamHandler + ?Sized,
    {
        if self.finished {
            return None;
        }

        if !self.lines.is_empty() {
            debug!(
                bytes = self.lines.pending().len(),
                "discarding unterminated trailing frame"
            );
        }

        let outcome = if self.has_received_data && !self.accumulated_text.is_empty() {
            warn!(
                len = self.accumulated_text.len(),
                "stream ended without completion frame, using collected response"
            );
            Ok(self.accumulated_text.clone())
        } else {
            Err(StreamError::EmptyStream)
        };
        Some(self.finish(outcome, handler))
    }

    /// Abort with an externally detected failure (timeout, transport).
    pub fn fail<H>(&mut self, error: StreamError, handler: &mut H) -> Option<Outcome>
    where
        H: StreamHandler + ?Sized,
    {
        if self.finished {
            return None;
        }
        Some(self.finish(Err(error), handler))
    }

    fn dispatch<H>(&mut self, event: StreamEvent, handler: &mut H) -> Option<Outcome>
    where
        H: StreamHandler + ?Sized,
    {
        debug!(?event, "stream event");
        match event {
            StreamEvent::Content { text } => {
                self.accumulated_text.push_str(&text);
                handler.on_content(&text);
                None
            }
            StreamEvent::Image { data } => {
                self.accumulated_text.push_str(&image_marker(&data));
                handler.on_image(&data);
                None
            }
            StreamEvent::End { final_text } => {
                let text = final_text.unwrap_or_else(|| self.accumulated_text.clone());
                Some(self.finish(Ok(text), handler))
            }
            StreamEvent::Error { message } => {
                Some(self.finish(Err(StreamError::Server(message)), handler))
            }
        }
    }

    fn finish<H>(&mut self, outcome: Outcome, handler: &mut H) -> Outcome
    where
        H: StreamHandler + ?Sized,
    {
        self.finished = true;
        match &outcome {
            Ok(text) => handler.on_complete(text),
            Err(e) => {
                warn!(error = %e, "stream session failed");
                handler.on_error(&e.to_string());
            }
        }
        outcome
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Decode a chat event stream to completion.
///
/// Reads `stream` until a terminal frame, end of input, a transport error or
/// the `timeout` deadline, whichever comes first. The handler sees exactly one
/// `on_complete` or `on_error`, matching the returned result. No retries are
/// attempted.
pub async fn decode<S, B, E, H>(stream: S, timeout: Duration, handler: &mut H) -> Outcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    H: StreamHandler + ?Sized,
{
    if timeout.is_zero() {
        let error = StreamError::InvalidTimeout;
        handler.on_error(&error.to_string());
        return Err(error);
    }

    let mut session = StreamSession::new(timeout);
    let deadline = tokio::time::sleep_until(session.deadline());
    tokio::pin!(deadline);
    futures::pin_mut!(stream);

    loop {
        let outcome = tokio::select! {
            _ = &mut deadline => session.fail(StreamError::Timeout, handler),
            next = stream.next() => match next {
                Some(Ok(chunk)) => session.feed(chunk.as_ref(), handler),
                Some(Err(e)) => session.fail(StreamError::Transport(e.to_string()), handler),
                None => session.close(handler),
            },
        };

        if let Some(outcome) = outcome {
            return outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use std::io;

    #[derive(Debug, Default)]
    struct Recorder {
        content: Vec<String>,
        images: Vec<String>,
        complete: Vec<String>,
        errors: Vec<String>,
    }

    impl StreamHandler for Recorder {
        fn on_content(&mut self, text: &str) {
            self.content.push(text.to_string());
        }

        fn on_image(&mut self, data: &str) {
            self.images.push(data.to_string());
        }

        fn on_complete(&mut self, text: &str) {
            self.complete.push(text.to_string());
        }

        fn on_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn run(parts: &[&'static str]) -> (Outcome, Recorder) {
        let mut recorder = Recorder::default();
        let outcome = decode(chunks(parts), Duration::from_secs(5), &mut recorder).await;
        (outcome, recorder)
    }

    #[tokio::test]
    async fn test_content_then_end() {
        let (outcome, rec) = run(&[
            "data: {\"type\":\"content\",\"content\":\"Hel\"}\n",
            "data: {\"type\":\"content\",\"content\":\"lo\"}\n",
            "data: {\"type\":\"end\",\"full_response\":\"Hello\"}\n",
        ])
        .await;

        assert_eq!(outcome, Ok("Hello".to_string()));
        assert_eq!(rec.content, vec!["Hel", "lo"]);
        assert_eq!(rec.complete, vec!["Hello"]);
        assert!(rec.errors.is_empty());
    }

    #[tokio::test]
    async fn test_end_without_full_response_uses_accumulated() {
        let (outcome, rec) = run(&[
            "data: {\"type\":\"content\",\"content\":\"a\"}\ndata: {\"type\":\"content\",\"content\":\"b\"}\n",
            "data: {\"type\":\"end\"}\n",
        ])
        .await;

        assert_eq!(outcome, Ok("ab".to_string()));
        assert_eq!(rec.complete, vec!["ab"]);
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks() {
        let (outcome, rec) = run(&[
            "data: {\"typ",
            "e\":\"content\",\"content\":\"x\"}\n",
            "data: {\"type\":\"end\"}\n",
        ])
        .await;

        assert_eq!(rec.content, vec!["x"]);
        assert_eq!(outcome, Ok("x".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (outcome, rec) = run(&[
            "data: {\"type\":\"content\",\"content\":\"one\"}\n",
            "data: {not json}\n",
            "data: {\"type\":\"content\",\"content\":\"two\"}\n",
            "data: {\"type\":\"end\"}\n",
        ])
        .await;

        assert_eq!(rec.content, vec!["one", "two"]);
        assert!(rec.errors.is_empty());
        assert_eq!(outcome, Ok("onetwo".to_string()));
    }

    #[tokio::test]
    async fn test_noise_and_unknown_types_are_ignored() {
        let (outcome, rec) = run(&[
            ": keep-alive\n\nevent: message\n",
            "data: {\"type\":\"ping\"}\n",
            "data: {\"type\":\"content\",\"content\":\"ok\"}\n",
            "data: {\"type\":\"end\"}\n",
        ])
        .await;

        assert_eq!(rec.content, vec!["ok"]);
        assert_eq!(outcome, Ok("ok".to_string()));
    }

    #[tokio::test]
    async fn test_lenient_recovery_without_end() {
        let (outcome, rec) = run(&["data: {\"type\":\"content\",\"content\":\"partial\"}\n"]).await;

        assert_eq!(outcome, Ok("partial".to_string()));
        assert_eq!(rec.complete, vec!["partial"]);
        assert!(rec.errors.is_empty());
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let (outcome, rec) = run(&[]).await;

        assert_eq!(outcome, Err(StreamError::EmptyStream));
        assert_eq!(rec.errors, vec!["Stream ended without data"]);
        assert!(rec.complete.is_empty());
    }

    #[tokio::test]
    async fn test_stream_with_only_noise_is_empty() {
        let (outcome, rec) = run(&["retry: 1000\n", "data: {\"type\":\"ping\"}\n"]).await;

        assert_eq!(outcome, Err(StreamError::EmptyStream));
        assert_eq!(rec.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_unterminated_trailing_frame_is_discarded() {
        let (outcome, rec) = run(&[
            "data: {\"type\":\"content\",\"content\":\"kept\"}\n",
            "data: {\"type\":\"content\",\"content\":\"lost\"}",
        ])
        .await;

        assert_eq!(rec.content, vec!["kept"]);
        assert_eq!(outcome, Ok("kept".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_frame() {
        let (outcome, rec) = run(&[
            "data: {\"type\":\"content\",\"content\":\"x\"}\n",
            "data: {\"type\":\"error\",\"error\":\"quota exceeded\"}\n",
            "data: {\"type\":\"end\"}\n",
        ])
        .await;

        assert_eq!(outcome, Err(StreamError::Server("quota exceeded".to_string())));
        assert_eq!(rec.errors, vec!["quota exceeded"]);
        assert!(rec.complete.is_empty());
    }

    #[tokio::test]
    async fn test_no_callbacks_after_end() {
        let (outcome, rec) = run(&[
            "data: {\"type\":\"end\",\"full_response\":\"done\"}\ndata: {\"type\":\"content\",\"content\":\"late\"}\n",
            "data: {\"type\":\"error\",\"error\":\"late\"}\n",
        ])
        .await;

        assert_eq!(outcome, Ok("done".to_string()));
        assert!(rec.content.is_empty());
        assert!(rec.errors.is_empty());
        assert_eq!(rec.complete.len(), 1);
    }

    #[tokio::test]
    async fn test_image_folds_marker_into_transcript() {
        let (outcome, rec) = run(&[
            "data: {\"type\":\"content\",\"content\":\"Here:\"}\n",
            "data: {\"type\":\"image\",\"image\":\"data:image/png;base64,AAAA\"}\n",
        ])
        .await;

        assert_eq!(rec.images, vec!["data:image/png;base64,AAAA"]);
        assert_eq!(
            outcome,
            Ok("Here:\n\n![Generated Image](data:image/png;base64,AAAA)\n\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_transport_error() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"x\"}\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
        ]);
        let mut rec = Recorder::default();
        let outcome = decode(body, Duration::from_secs(5), &mut rec).await;

        assert_eq!(outcome, Err(StreamError::Transport("connection reset".to_string())));
        assert_eq!(rec.content, vec!["x"]);
        assert_eq!(rec.errors, vec!["connection reset"]);
        assert!(rec.complete.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_without_data() {
        let body = stream::pending::<Result<Bytes, io::Error>>();
        let mut rec = Recorder::default();
        let outcome = decode(body, Duration::from_millis(20), &mut rec).await;

        assert_eq!(outcome, Err(StreamError::Timeout));
        assert_eq!(rec.errors, vec!["Request timeout - no response from server"]);
    }

    #[tokio::test]
    async fn test_timeout_ignores_late_data() {
        let body = stream::once(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, io::Error>(Bytes::from_static(
                b"data: {\"type\":\"content\",\"content\":\"late\"}\n",
            ))
        });
        let mut rec = Recorder::default();
        let outcome = decode(body, Duration::from_millis(20), &mut rec).await;

        assert_eq!(outcome, Err(StreamError::Timeout));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rec.content.is_empty());
        assert!(rec.complete.is_empty());
        assert_eq!(rec.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_timeout_is_rejected() {
        let mut rec = Recorder::default();
        let outcome = decode(chunks(&[]), Duration::ZERO, &mut rec).await;

        assert_eq!(outcome, Err(StreamError::InvalidTimeout));
        assert_eq!(rec.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        for timeout in [Duration::from_secs(u64::MAX), Duration::MAX] {
            let mut rec = Recorder::default();
            let outcome = decode(
                chunks(&["data: {\"type\":\"content\",\"content\":\"x\"}\n"]),
                timeout,
                &mut rec,
            )
            .await;

            assert_eq!(outcome, Ok("x".to_string()));
            assert_eq!(rec.complete, vec!["x"]);
        }
    }

    #[test]
    fn test_session_huge_timeout_deadline() {
        let before = Instant::now();
        let session = StreamSession::new(Duration::MAX);
        assert!(session.deadline() > before + Duration::from_secs(86400 * 365));
    }

    #[tokio::test]
    async fn test_callbacks_accept_non_send_closures() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut callbacks =
            Callbacks::new().with_content(move |t| sink.borrow_mut().push(t.to_string()));

        let outcome = decode(
            chunks(&[
                "data: {\"type\":\"content\",\"content\":\"a\"}\n",
                "data: {\"type\":\"content\",\"content\":\"b\"}\n",
            ]),
            Duration::from_secs(5),
            &mut callbacks,
        )
        .await;

        assert_eq!(outcome, Ok("ab".to_string()));
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_cancel_closes_stream() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, io::Error>>();
        let (cancel_tx, cancel_rx) = futures::channel::oneshot::channel::<()>();
        tx.unbounded_send(Ok(Bytes::from_static(
            b"data: {\"type\":\"content\",\"content\":\"partial\"}\n",
        )))
        .unwrap();

        let task = tokio::spawn(async move {
            let mut rec = Recorder::default();
            let outcome = decode(rx.take_until(cancel_rx), Duration::from_secs(5), &mut rec).await;
            (outcome, rec)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(()).unwrap();
        let (outcome, rec) = task.await.unwrap();
        drop(tx);

        assert_eq!(outcome, Ok("partial".to_string()));
        assert_eq!(rec.complete, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_callbacks_handler() {
        let mut deltas = Vec::new();
        let mut finals = Vec::new();
        {
            let mut callbacks = Callbacks::new()
                .with_content(|t| deltas.push(t.to_string()))
                .with_complete(|t| finals.push(t.to_string()));
            let outcome = decode(
                chunks(&[
                    "data: {\"type\":\"content\",\"content\":\"Hel\"}\n",
                    "data: {\"type\":\"content\",\"content\":\"lo\"}\n",
                    "data: {\"type\":\"end\",\"full_response\":\"Hello\"}\n",
                ]),
                Duration::from_secs(5),
                &mut callbacks,
            )
            .await;
            assert_eq!(outcome, Ok("Hello".to_string()));
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(finals, vec!["Hello"]);
    }

    #[test]
    fn test_session_terminal_once() {
        let mut session = StreamSession::new(Duration::from_secs(5));
        let mut rec = Recorder::default();

        assert!(session
            .feed(b"data: {\"type\":\"content\",\"content\":\"a\"}\n", &mut rec)
            .is_none());
        assert_eq!(session.accumulated_text(), "a");
        assert!(session.has_received_data());

        let outcome = session.feed(b"data: {\"type\":\"end\"}\n", &mut rec);
        assert_eq!(outcome, Some(Ok("a".to_string())));
        assert!(session.is_finished());

        assert!(session
            .feed(b"data: {\"type\":\"content\",\"content\":\"b\"}\n", &mut rec)
            .is_none());
        assert!(session.close(&mut rec).is_none());
        assert!(session.fail(StreamError::Timeout, &mut rec).is_none());

        assert_eq!(session.accumulated_text(), "a");
        assert_eq!(rec.complete, vec!["a"]);
        assert!(rec.errors.is_empty());
    }

    #[test]
    fn test_session_deadline() {
        let before = Instant::now();
        let session = StreamSession::new(Duration::from_secs(60));
        assert!(session.deadline() >= before + Duration::from_secs(60));
        assert!(!session.has_received_data());
    }
}
