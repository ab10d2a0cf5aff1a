//! Platform specific functionality: the WebRTC stack the endpoint drives,
//! task spawning and logging.
//!
//! WebRTC primitives are consumed through the traits of this module, so any
//! native or browser stack can be plugged in by implementing them.

mod media_track;
mod peer_connection;
mod transceiver;

use std::future::Future;

pub use self::{
    media_track::MediaStreamTrack,
    peer_connection::{
        IceConnectionState, IceGatheringState, ListenerId,
        PeerConnectionEvent, PeerConnectionFactory, PeerConnectionState,
        RtcConfiguration, RtcPeerConnection, RtcPeerConnectionError, SdpType,
        SignalingState,
    },
    transceiver::{
        kbps_to_bps, SendEncodingParameters, Transceiver,
        TransceiverDirection, TransceiverInit,
    },
};

use crate::conf;

/// Initializes [`env_logger`] as default application logger with the level
/// configured in the provided [`conf::Log`].
///
/// `RUST_LOG` environment variable refines the configured level. Does nothing
/// if some logger has been installed already.
pub fn init_logger(conf: &conf::Log) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(conf.level()).parse_default_env();
    if builder.try_init().is_err() {
        log::debug!("Logger is already initialized");
    }
}

/// Runs a Rust [`Future`] on the current thread.
///
/// # Panics
///
/// If called outside of a [`tokio::task::LocalSet`] context.
#[inline]
pub fn spawn<F>(task: F)
where
    F: Future<Output = ()> + 'static,
{
    drop(tokio::task::spawn_local(task));
}
