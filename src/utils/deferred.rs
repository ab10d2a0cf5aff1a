//! Single-shot result channel with an externally callable settle side.

use std::cell::RefCell;

use futures::channel::oneshot;

/// Reading side of a [`Deferred`].
///
/// Resolves with [`oneshot::Canceled`] if the [`Deferred`] was dropped
/// without being settled.
pub type Settled<T, E> = oneshot::Receiver<Result<T, E>>;

/// Handle settling a pending result exactly once.
///
/// The first call to [`Deferred::resolve()`] or [`Deferred::reject()`] wins,
/// every later call is a no-op.
#[derive(Debug)]
pub struct Deferred<T, E>(RefCell<Option<oneshot::Sender<Result<T, E>>>>);

impl<T, E> Deferred<T, E> {
    /// Creates a new unsettled [`Deferred`] along with its reading side.
    #[must_use]
    pub fn new() -> (Self, Settled<T, E>) {
        let (tx, rx) = oneshot::channel();
        (Self(RefCell::new(Some(tx))), rx)
    }

    /// Settles this [`Deferred`] with the provided `value`.
    ///
    /// Returns `false` if it has been settled already.
    #[inline]
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles this [`Deferred`] with the provided `reason`.
    ///
    /// Returns `false` if it has been settled already.
    #[inline]
    pub fn reject(&self, reason: E) -> bool {
        self.settle(Err(reason))
    }

    /// Indicates whether this [`Deferred`] has been settled.
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.0.borrow().is_none()
    }

    fn settle(&self, result: Result<T, E>) -> bool {
        let sender = self.0.borrow_mut().take();
        sender.map_or(false, |tx| {
            // Receiver may be gone already, the caller stopped waiting.
            let _ = tx.send(result);
            true
        })
    }
}
