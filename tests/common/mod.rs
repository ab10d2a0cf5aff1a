//! Fake WebRTC stack and helpers driving a [`WebRtcEndpoint`] in tests.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::Rc,
};

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use medea_webrtc_endpoint::{
    platform::{
        self,
        IceConnectionState, IceGatheringState, ListenerId, MediaStreamTrack,
        PeerConnectionEvent, PeerConnectionFactory, PeerConnectionState,
        RtcConfiguration, RtcPeerConnection, RtcPeerConnectionError, SdpType,
        SignalingState, Transceiver, TransceiverDirection, TransceiverInit,
    },
    proto::{Encoding, IceCandidate, MediaKind, SimulcastConfig, TrackId},
    Conf, EndpointEvent, WebRtcEndpoint,
};
use mockall::mock;
use serde_json::Value;
use tokio::task::LocalSet;

type Result<T> =
    std::result::Result<T, tracerr::Traced<RtcPeerConnectionError>>;

mock! {
    pub Track {}

    impl MediaStreamTrack for Track {
        fn id(&self) -> String;
        fn kind(&self) -> MediaKind;
    }
}

/// Creates a new media source of the provided [`MediaKind`].
pub fn track(kind: MediaKind) -> Rc<dyn MediaStreamTrack> {
    let mut track = MockTrack::new();
    track.expect_kind().return_const(kind);
    track.expect_id().return_const(format!("{}-source", kind));
    Rc::new(track)
}

/// Runs the provided test body inside a [`LocalSet`].
pub async fn local<F: Future>(test: F) -> F::Output {
    LocalSet::new().run_until(test).await
}

/// Polls the provided `fut` in background, exposing its output once ready.
pub fn watch<T: 'static>(
    fut: LocalBoxFuture<'static, T>,
) -> Rc<RefCell<Option<T>>> {
    let output = Rc::new(RefCell::new(None));
    let out = Rc::clone(&output);
    drop(tokio::task::spawn_local(async move {
        let res = fut.await;
        *out.borrow_mut() = Some(res);
    }));
    output
}

/// Lets every spawned task make progress.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub struct FakeTransceiver {
    mid: String,
    kind: MediaKind,
    direction: TransceiverDirection,
    track: RefCell<Option<Rc<dyn MediaStreamTrack>>>,
    active: RefCell<Vec<(Encoding, bool)>>,
    bitrates: RefCell<Vec<(Option<Encoding>, u64)>>,
    fail_replace: Rc<Cell<bool>>,
}

impl FakeTransceiver {
    pub fn mid_str(&self) -> &str {
        &self.mid
    }

    pub fn sent_track_kind(&self) -> Option<MediaKind> {
        self.track.borrow().as_ref().map(|t| t.kind())
    }

    pub fn encoding_changes(&self) -> Vec<(Encoding, bool)> {
        self.active.borrow().clone()
    }

    pub fn bitrate_changes(&self) -> Vec<(Option<Encoding>, u64)> {
        self.bitrates.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Transceiver for FakeTransceiver {
    fn mid(&self) -> Option<String> {
        Some(self.mid.clone())
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn direction(&self) -> TransceiverDirection {
        self.direction
    }

    async fn replace_track(
        &self,
        track: Option<Rc<dyn MediaStreamTrack>>,
    ) -> Result<()> {
        if self.fail_replace.get() {
            return Err(tracerr::new!(RtcPeerConnectionError::ReplaceTrack(
                "sender is gone".to_owned()
            )));
        }
        *self.track.borrow_mut() = track;
        Ok(())
    }

    async fn set_encoding_active(
        &self,
        encoding: Encoding,
        active: bool,
    ) -> Result<()> {
        self.active.borrow_mut().push((encoding, active));
        Ok(())
    }

    async fn set_max_bitrate(
        &self,
        encoding: Option<Encoding>,
        bitrate: u64,
    ) -> Result<()> {
        self.bitrates.borrow_mut().push((encoding, bitrate));
        Ok(())
    }
}

type Listener = Rc<dyn Fn(PeerConnectionEvent)>;

/// In-memory [`RtcPeerConnection`] whose states are driven by the test.
pub struct FakePeer {
    pub config: RtcConfiguration,
    signaling: Cell<SignalingState>,
    connection: Cell<PeerConnectionState>,
    ice: Cell<IceConnectionState>,
    gathering: Cell<IceGatheringState>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<u64>,
    transceivers: RefCell<Vec<Rc<FakeTransceiver>>>,
    offers: Cell<usize>,
    remote_answers: RefCell<Vec<String>>,
    remote_candidates: RefCell<Vec<IceCandidate>>,
    closed: Cell<bool>,
    pub fail_offer: Cell<bool>,
    pub fail_replace: Rc<Cell<bool>>,
}

impl FakePeer {
    fn new(config: RtcConfiguration) -> Self {
        Self {
            config,
            signaling: Cell::new(SignalingState::Stable),
            connection: Cell::new(PeerConnectionState::New),
            ice: Cell::new(IceConnectionState::New),
            gathering: Cell::new(IceGatheringState::New),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            transceivers: RefCell::new(Vec::new()),
            offers: Cell::new(0),
            remote_answers: RefCell::new(Vec::new()),
            remote_candidates: RefCell::new(Vec::new()),
            closed: Cell::new(false),
            fail_offer: Cell::new(false),
            fail_replace: Rc::new(Cell::new(false)),
        }
    }

    /// Delivers the provided `event` to every listener.
    pub fn fire(&self, event: PeerConnectionEvent) {
        let listeners: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            (listener)(event.clone());
        }
    }

    pub fn set_signaling_state(&self, state: SignalingState) {
        self.signaling.set(state);
        self.fire(PeerConnectionEvent::SignalingStateChange(state));
    }

    pub fn set_connection_state(&self, state: PeerConnectionState) {
        self.connection.set(state);
        self.fire(PeerConnectionEvent::ConnectionStateChange(state));
    }

    pub fn set_ice_connection_state(&self, state: IceConnectionState) {
        self.ice.set(state);
        self.fire(PeerConnectionEvent::IceConnectionStateChange(state));
    }

    /// Makes this [`FakePeer`] connected and quiescent.
    pub fn establish(&self) {
        self.set_ice_connection_state(IceConnectionState::Connected);
        self.set_connection_state(PeerConnectionState::Connected);
    }

    pub fn listeners_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn transceivers(&self) -> Vec<Rc<FakeTransceiver>> {
        self.transceivers.borrow().clone()
    }

    pub fn offers_count(&self) -> usize {
        self.offers.get()
    }

    pub fn remote_answers(&self) -> Vec<String> {
        self.remote_answers.borrow().clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.remote_candidates.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

#[async_trait(?Send)]
impl RtcPeerConnection for FakePeer {
    fn signaling_state(&self) -> SignalingState {
        self.signaling.get()
    }

    fn connection_state(&self) -> PeerConnectionState {
        self.connection.get()
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.ice.get()
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        self.gathering.get()
    }

    fn add_event_listener(
        &self,
        listener: Box<dyn Fn(PeerConnectionEvent)>,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::from(listener)));
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(i, _)| *i != id);
    }

    fn add_transceiver(
        &self,
        init: TransceiverInit,
    ) -> Result<Rc<dyn Transceiver>> {
        let mut transceivers = self.transceivers.borrow_mut();
        let transceiver = Rc::new(FakeTransceiver {
            mid: transceivers.len().to_string(),
            kind: init.kind,
            direction: init.direction,
            track: RefCell::new(init.track),
            active: RefCell::new(Vec::new()),
            bitrates: RefCell::new(Vec::new()),
            fail_replace: Rc::clone(&self.fail_replace),
        });
        transceivers.push(Rc::clone(&transceiver));
        Ok(transceiver)
    }

    fn remove_transceiver(
        &self,
        transceiver: &Rc<dyn Transceiver>,
    ) -> Result<()> {
        let mid = transceiver.mid();
        self.transceivers
            .borrow_mut()
            .retain(|t| Some(t.mid.clone()) != mid);
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        if self.fail_offer.get() {
            return Err(tracerr::new!(RtcPeerConnectionError::CreateOffer(
                "no codecs".to_owned()
            )));
        }
        self.offers.set(self.offers.get() + 1);
        Ok(format!("offer-{}", self.offers.get()))
    }

    async fn set_local_description(&self, sdp: SdpType) -> Result<()> {
        if let SdpType::Offer(_) = sdp {
            self.set_signaling_state(SignalingState::HaveLocalOffer);
        }
        Ok(())
    }

    async fn set_remote_description(&self, sdp: SdpType) -> Result<()> {
        if let SdpType::Answer(sdp) = sdp {
            self.remote_answers.borrow_mut().push(sdp);
            self.set_signaling_state(SignalingState::Stable);
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.remote_candidates.borrow_mut().push(candidate);
        Ok(())
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

/// [`WebRtcEndpoint`] wired to [`FakePeer`]s along with everything it emits.
pub struct Harness {
    pub endpoint: WebRtcEndpoint,
    pub fail_connection: Rc<Cell<bool>>,
    peers: Rc<RefCell<Vec<Rc<FakePeer>>>>,
    sent: Rc<RefCell<Vec<Value>>>,
    events: Rc<RefCell<Vec<String>>>,
    _listener: medea_webrtc_endpoint::utils::EventListener,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_conf(Conf::default())
    }

    pub fn with_conf(conf: Conf) -> Self {
        platform::init_logger(&conf.log);
        let peers = Rc::new(RefCell::new(Vec::new()));
        let fail_connection = Rc::new(Cell::new(false));
        let factory: PeerConnectionFactory = {
            let peers = Rc::clone(&peers);
            let fail = Rc::clone(&fail_connection);
            Box::new(move |config| {
                if fail.get() {
                    return Err(tracerr::new!(
                        RtcPeerConnectionError::CreatePeer("boom".to_owned())
                    ));
                }
                let peer = Rc::new(FakePeer::new(config));
                peers.borrow_mut().push(Rc::clone(&peer));
                Ok(peer as Rc<dyn RtcPeerConnection>)
            })
        };
        let endpoint = WebRtcEndpoint::new(conf, factory);

        let sent = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(RefCell::new(Vec::new()));
        let listener = {
            let sent = Rc::clone(&sent);
            let events = Rc::clone(&events);
            endpoint.on_event(move |event| match event {
                EndpointEvent::SendMediaEvent(json) => {
                    if let Ok(msg) = serde_json::from_str(json) {
                        sent.borrow_mut().push(msg);
                    }
                }
                other => events.borrow_mut().push(describe(other)),
            })
        };

        Self {
            endpoint,
            fail_connection,
            peers,
            sent,
            events,
            _listener: listener,
        }
    }

    /// Feeds the provided inbound signaling message to the endpoint.
    pub fn receive(&self, msg: Value) {
        self.endpoint
            .receive_media_event(&msg.to_string())
            .expect("valid media event");
    }

    /// Connects the endpoint as `me` into a session with the provided
    /// remote endpoints.
    pub fn join(&self, others: Value) {
        self.endpoint.connect(Value::Null);
        self.receive(serde_json::json!({
            "type": "connected",
            "data": {"id": "me", "otherEndpoints": others},
        }));
    }

    pub fn offer_data(&self, audio: u32, video: u32) {
        self.receive(serde_json::json!({
            "type": "custom",
            "data": {
                "type": "offerData",
                "data": {
                    "tracksTypes": {"audio": audio, "video": video},
                    "integratedTurnServers": [],
                },
            },
        }));
    }

    pub fn sdp_answer(&self, sdp: &str, mids: Value) {
        self.receive(serde_json::json!({
            "type": "custom",
            "data": {
                "type": "sdpAnswer",
                "data": {"sdp": sdp, "midToTrackId": mids},
            },
        }));
    }

    /// Completes the requested renegotiation, establishing the connection if
    /// it's new.
    pub async fn renegotiate(&self) {
        self.offer_data(0, 0);
        settle().await;
        self.sdp_answer("answer", serde_json::json!({}));
        settle().await;
        self.peer().establish();
        settle().await;
    }

    /// Returns the only [`FakePeer`] created so far.
    pub fn peer(&self) -> Rc<FakePeer> {
        let peers = self.peers.borrow();
        assert_eq!(peers.len(), 1, "exactly one peer expected");
        Rc::clone(&peers[0])
    }

    pub fn peers_count(&self) -> usize {
        self.peers.borrow().len()
    }

    /// Returns `type` of every sent message, unwrapping custom ones.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .map(|msg| {
                let ty = if msg["type"] == "custom" {
                    msg["data"]["type"].as_str()
                } else {
                    msg["type"].as_str()
                };
                ty.unwrap_or_default().to_owned()
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.borrow().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
        self.events.borrow_mut().clear();
    }
}

/// Short description of the provided [`EndpointEvent`].
fn describe(event: &EndpointEvent) -> String {
    match event {
        EndpointEvent::Connected { endpoint_id, .. } => {
            format!("Connected({})", endpoint_id)
        }
        EndpointEvent::ConnectionError(_) => "ConnectionError".to_owned(),
        EndpointEvent::Disconnected => "Disconnected".to_owned(),
        EndpointEvent::EndpointAdded(e) => format!("EndpointAdded({})", e.id),
        EndpointEvent::EndpointRemoved(e) => {
            format!("EndpointRemoved({})", e.id)
        }
        EndpointEvent::EndpointUpdated(e) => {
            format!("EndpointUpdated({})", e.id)
        }
        EndpointEvent::TrackAdded(t) => format!("TrackAdded({})", t.id),
        EndpointEvent::TrackReady(t) => format!("TrackReady({})", t.id),
        EndpointEvent::TrackRemoved(t) => format!("TrackRemoved({})", t.id),
        EndpointEvent::TrackUpdated(t) => format!("TrackUpdated({})", t.id),
        EndpointEvent::TrackEncodingChanged { track, .. } => {
            format!("TrackEncodingChanged({})", track.id)
        }
        EndpointEvent::VoiceActivityChanged { track_id, .. } => {
            format!("VoiceActivityChanged({})", track_id)
        }
        EndpointEvent::BandwidthEstimationChanged(_) => {
            "BandwidthEstimationChanged".to_owned()
        }
        EndpointEvent::LocalTrackAdded(_) => "LocalTrackAdded".to_owned(),
        EndpointEvent::LocalTrackRemoved(_) => "LocalTrackRemoved".to_owned(),
        EndpointEvent::LocalTrackReplaced(_) => {
            "LocalTrackReplaced".to_owned()
        }
        EndpointEvent::LocalTrackMetadataChanged { .. } => {
            "LocalTrackMetadataChanged".to_owned()
        }
        EndpointEvent::LocalTrackEncodingEnabled { encoding, .. } => {
            format!("LocalTrackEncodingEnabled({})", encoding)
        }
        EndpointEvent::LocalTrackEncodingDisabled { encoding, .. } => {
            format!("LocalTrackEncodingDisabled({})", encoding)
        }
        EndpointEvent::LocalTrackBandwidthChanged { .. } => {
            "LocalTrackBandwidthChanged".to_owned()
        }
        EndpointEvent::SendMediaEvent(_) => "SendMediaEvent".to_owned(),
    }
}

/// Joins an empty session and publishes a single video track, completing
/// the whole negotiation.
pub async fn publish_video(h: &Harness, simulcast: SimulcastConfig) -> TrackId {
    h.join(serde_json::json!([]));
    let added = watch(h.endpoint.add_track(
        track(MediaKind::Video),
        serde_json::json!({"name": "cam"}),
        simulcast,
        None,
    ));
    settle().await;
    h.renegotiate().await;

    let id = added
        .borrow_mut()
        .take()
        .expect("track is published")
        .expect("negotiation succeeds");
    h.clear();
    id
}
