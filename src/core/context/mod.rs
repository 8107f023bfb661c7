//! Shutdown scoping for the long-running parts of a node.
//!
//! A node owns one root context. The TCP accept loop and every maintenance task run under a
//! child of it, so cancelling the root stops all of them. Errors the node cannot recover from
//! (a listener that dies, a task that cannot be restarted) are escalated with
//! [`IrrevocableContext::throw_irrecoverable`], which walks up to the root and terminates there.


use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

pub struct IrrevocableContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    tag: String,
    token: CancellationToken,
    parent: Option<IrrevocableContext>,
    span: Span,
}

impl IrrevocableContext {
    /// Creates a root context. Its span is parented under `parent_span`.
    pub fn new(parent_span: &Span, tag: &str) -> Self {
        let span =
            tracing::span!(parent: parent_span, tracing::Level::TRACE, "context", tag = tag);
        IrrevocableContext {
            inner: Arc::new(ContextInner {
                tag: tag.to_string(),
                token: CancellationToken::new(),
                parent: None,
                span,
            }),
        }
    }

    /// Creates a context that is cancelled together with `self`. Cancelling the child leaves the
    /// parent running.
    pub fn child(&self, tag: &str) -> Self {
        let span =
            tracing::span!(parent: &self.inner.span, tracing::Level::TRACE, "context", tag = tag);
        IrrevocableContext {
            inner: Arc::new(ContextInner {
                tag: tag.to_string(),
                token: self.inner.token.child_token(),
                parent: Some(self.clone()),
                span,
            }),
        }
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    /// Cancels this context and all of its descendants.
    pub fn cancel(&self) {
        let _enter = self.inner.span.enter();
        tracing::debug!("cancelling {}", self.inner.tag);
        self.inner.token.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes once this context, or any of its ancestors, is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Escalates `err` to the root context, which panics with it.
    pub fn throw_irrecoverable(&self, err: anyhow::Error) -> ! {
        let _enter = self.inner.span.enter();
        match &self.inner.parent {
            Some(parent) => {
                tracing::error!("{} escalating irrecoverable error: {:#}", self.inner.tag, err);
                parent.throw_irrecoverable(err)
            }
            None => panic!("irrecoverable error: {:#}", err),
        }
    }
}

impl std::fmt::Debug for IrrevocableContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrrevocableContext")
            .field("tag", &self.inner.tag)
            .field("cancelled", &self.is_cancelled())
            .field("root", &self.inner.parent.is_none())
            .finish()
    }
}

/// Clones share the same cancellation state.
impl Clone for IrrevocableContext {
    fn clone(&self) -> Self {
        IrrevocableContext {
            inner: Arc::clone(&self.inner),
        }
    }
}
