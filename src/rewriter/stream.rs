//! Streaming HTML rewriter.
//!
//! # Data Flow
//! ```text
//! poll_next()
//!     → output buffered?  yes → yield it
//!     → no: poll the source stream for the next chunk
//!         → chunk: feed lol_html, whose element handler runs the strategies
//!         → source ended: end the parser and flush what it still holds
//! ```
//!
//! # Design Decisions
//! - One source chunk is fed per poll, so a slow reader paces how fast
//!   chunks are pulled from upstream
//! - Only opening tags are offered to strategies; text, comments and end
//!   tags are passed through by the parser as written
//! - A source error is yielded once and the stream then ends

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use lol_html::errors::RewritingError;
use lol_html::html_content::ContentType;
use lol_html::send::{HtmlRewriter as Parser, Settings};
use lol_html::{element, OutputSink};
use thiserror::Error;

use super::token::{AttrChange, Token};
use super::TokenRewriter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure while rewriting a body mid-stream.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("upstream body read failed: {0}")]
    Body(#[source] BoxError),

    #[error("HTML rewriting failed: {0}")]
    Html(#[from] RewritingError),
}

/// Bytes emitted by the parser and not yet handed to the reader.
#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<BytesMut>>);

impl SharedOutput {
    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> Option<Bytes> {
        let mut buf = self.lock();
        (!buf.is_empty()).then(|| buf.split().freeze())
    }
}

impl OutputSink for SharedOutput {
    fn handle_chunk(&mut self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }
}

/// Rewrites an HTML byte stream tag by tag.
pub struct HtmlRewriter<S> {
    source: Option<S>,
    parser: Option<Parser<'static, SharedOutput>>,
    output: SharedOutput,
}

impl<S> HtmlRewriter<S> {
    /// Strategies run in the order given.
    pub fn new(source: S, rewriters: Vec<Arc<dyn TokenRewriter>>) -> Self {
        let output = SharedOutput::default();
        let mut handlers = Vec::new();
        if !rewriters.is_empty() {
            handlers.push(element!("*", move |el| {
                let original = Token::from_source(
                    &el.tag_name(),
                    el.attributes().iter().map(|a| (a.name(), a.value())),
                );
                let Some((token, prepend, append)) = render(&rewriters, &original) else {
                    return Ok(());
                };
                for change in token.changes_from(&original) {
                    match change {
                        AttrChange::Remove(key) => el.remove_attribute(&key),
                        AttrChange::Set(key, value) => el.set_attribute(&key, &value)?,
                    }
                }
                if !prepend.is_empty() {
                    el.before(&prepend, ContentType::Html);
                }
                if !append.is_empty() {
                    if el.can_have_content() {
                        el.prepend(&append, ContentType::Html);
                    } else {
                        el.after(&append, ContentType::Html);
                    }
                }
                Ok(())
            }));
        }
        let settings = Settings {
            element_content_handlers: handlers,
            strict: false,
            ..Settings::new_send()
        };
        Self {
            source: Some(source),
            parser: Some(Parser::new(settings, output.clone())),
            output,
        }
    }

    /// Drop the source and any buffered input. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.source = None;
        self.parser = None;
        self.output.lock().clear();
    }
}

/// Run every matching strategy over `original`.
///
/// Returns `None` when no strategy wanted the tag.
fn render(rewriters: &[Arc<dyn TokenRewriter>], original: &Token) -> Option<(Token, String, String)> {
    let mut token = original.clone();
    let mut touched = false;
    let mut prepend = String::new();
    let mut append = String::new();
    for rewriter in rewriters {
        if !rewriter.should_rewrite(&token) {
            continue;
        }
        let out = rewriter.rewrite(token);
        prepend.push_str(&out.prepend);
        append.push_str(&out.append);
        token = out.token;
        touched = true;
    }
    touched.then_some((token, prepend, append))
}

impl<S, E> Stream for HtmlRewriter<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    type Item = Result<Bytes, RewriteError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(bytes) = this.output.take() {
                return Poll::Ready(Some(Ok(bytes)));
            }
            let Some(parser) = this.parser.as_mut() else {
                return Poll::Ready(None);
            };
            let Some(source) = this.source.as_mut() else {
                let result = this.parser.take().map_or(Ok(()), |parser| parser.end());
                if let Err(err) = result {
                    return Poll::Ready(Some(Err(this.fail(err.into()))));
                }
                continue;
            };
            let fed = match Pin::new(source).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => parser.write(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    return Poll::Ready(Some(Err(this.fail(RewriteError::Body(err.into())))));
                }
                Poll::Ready(None) => {
                    this.source = None;
                    Ok(())
                }
            };
            if let Err(err) = fed {
                return Poll::Ready(Some(Err(this.fail(err.into()))));
            }
        }
    }
}

impl<S> HtmlRewriter<S> {
    fn fail(&mut self, err: RewriteError) -> RewriteError {
        tracing::warn!(error = %err, "HTML stream truncated");
        self.close();
        err
    }
}

/// Rewrite a complete document in memory.
pub fn rewrite_str(html: &str, rewriters: Vec<Arc<dyn TokenRewriter>>) -> Result<String, RewriteError> {
    let source = futures_util::stream::empty::<Result<Bytes, BoxError>>();
    let mut rewriter = HtmlRewriter::new(source, rewriters);
    if let Some(mut parser) = rewriter.parser.take() {
        parser.write(html.as_bytes())?;
        parser.end()?;
    }
    let bytes = rewriter.output.take().unwrap_or_default();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
