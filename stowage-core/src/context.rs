//! Cancellation and deadlines for port operations.
//!
//! Every cache and repository method takes a [`Context`]. The operation's I/O
//! is driven through [`Context::run`], which races it against the context's
//! cancellation token and deadline. Whichever fires first wins; an interrupted
//! operation is dropped and reported as [`Interrupted`].
//!
//! ```ignore
//! let ctx = Context::background().with_timeout(Duration::from_millis(250));
//! let user: User = cache.get(&ctx, "user:42").await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Classify, ErrorKind};

/// Reason an operation was stopped by its [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupted::Cancelled => write!(f, "context cancelled"),
            Interrupted::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

impl std::error::Error for Interrupted {}

impl Classify for Interrupted {
    fn kind(&self) -> ErrorKind {
        match self {
            Interrupted::Cancelled => ErrorKind::Cancelled,
            Interrupted::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }
}

/// A cancellable, optionally deadline-bound scope for one logical operation.
///
/// Cloning shares the cancellation token. Derived contexts
/// ([`with_timeout`](Self::with_timeout), [`child`](Self::child)) are cancelled
/// together with their parent but can also be cancelled on their own.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A child context cancelled when `self` is, or when [`cancel`](Self::cancel)
    /// is called on the child.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child context whose deadline is `timeout` from now (or the parent's
    /// deadline, if that is sooner).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context that expires at `deadline` (or the parent's deadline,
    /// if that is sooner).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The cancellation token backing this context.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<Interrupted> {
        if self.token.is_cancelled() {
            return Some(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(at) if at <= Instant::now() => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail fast when the context is already done.
    pub fn check(&self) -> Result<(), Interrupted> {
        match self.err() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first, in which case `fut` is dropped.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
