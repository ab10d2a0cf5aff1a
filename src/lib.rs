//! Client side WebRTC endpoint of a media server.
//!
//! Mutations of the peer connection (adding, removing and replacing tracks,
//! toggling simulcast encodings, changing bitrate limits) are serialized
//! through a [`CommandsQueue`] and applied only when the connection is
//! quiescent, so they never interleave with an in-flight offer/answer
//! exchange.
//!
//! [`CommandsQueue`]: commands_queue::CommandsQueue

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod commands_queue;
pub mod conf;
pub mod endpoint;
pub mod negotiation;
pub mod platform;
pub mod state;
pub mod utils;

#[doc(inline)]
pub use self::{
    commands_queue::CommandError,
    conf::Conf,
    endpoint::{
        ConnectionStatus, Endpoint, EndpointError, EndpointEvent, RemoteTrack,
        WebRtcEndpoint,
    },
    state::LocalTrack,
};

#[doc(inline)]
pub use medea_media_event_proto as proto;
