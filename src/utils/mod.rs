//! Miscellaneous utility structs and functions.

mod deferred;
mod event_emitter;
mod event_listener;

#[doc(inline)]
pub use self::{
    deferred::{Deferred, Settled},
    event_emitter::EventEmitter,
    event_listener::EventListener,
};
