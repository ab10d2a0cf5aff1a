//! Scoped subscriptions unregistering themselves on drop.

use std::fmt;

/// Registered event handler, unregistered once this [`EventListener`] is
/// dropped.
///
/// Returned by every API that attaches a handler to some event source, so
/// the subscription lives exactly as long as its owner keeps it.
#[must_use = "handler is unregistered when the `EventListener` is dropped"]
pub struct EventListener {
    /// Name of the observed event, used for diagnostics only.
    event_name: &'static str,

    /// Unregisters the handler from its event source.
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl EventListener {
    /// Creates a new [`EventListener`] calling the provided `unsubscribe`
    /// closure on drop.
    #[inline]
    pub fn new<F>(event_name: &'static str, unsubscribe: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            event_name,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Returns name of the event this [`EventListener`] observes.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("event_name", &self.event_name)
            .finish()
    }
}

impl Drop for EventListener {
    /// Unregisters the handler of this [`EventListener`].
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            log::trace!("Removing `{}` event listener", self.event_name);
            (unsubscribe)();
        }
    }
}
