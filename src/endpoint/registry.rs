//! Remote endpoints and the tracks they publish.

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use medea_media_event_proto::{
    Encoding, EndpointId, EndpointInfo, Metadata, SimulcastConfig, TrackId,
    TrackInfo, VadStatus,
};

use crate::platform::MediaStreamTrack;

/// Remote participant of the session.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoint {
    /// ID of this [`Endpoint`].
    pub id: EndpointId,

    /// Type of this [`Endpoint`] (`webrtc`, `hls`, etc).
    pub endpoint_type: String,

    /// Metadata of this [`Endpoint`].
    pub metadata: Metadata,

    /// IDs of the tracks published by this [`Endpoint`].
    pub track_ids: HashSet<TrackId>,
}

/// Track published by a remote [`Endpoint`].
#[derive(Clone)]
pub struct RemoteTrack {
    /// ID of this [`RemoteTrack`].
    pub id: TrackId,

    /// ID of the [`Endpoint`] publishing this [`RemoteTrack`].
    pub endpoint_id: EndpointId,

    /// Metadata of this [`RemoteTrack`].
    pub metadata: Metadata,

    /// Simulcast configuration of this [`RemoteTrack`].
    pub simulcast: SimulcastConfig,

    /// [`Encoding`] currently received, if simulcast is used.
    pub encoding: Option<Encoding>,

    /// Last reported voice activity.
    pub vad: VadStatus,

    /// Received media, [`None`] until it arrives on the connection.
    pub track: Option<Rc<dyn MediaStreamTrack>>,
}

impl RemoteTrack {
    fn new(id: TrackId, endpoint_id: EndpointId, info: TrackInfo) -> Self {
        Self {
            id,
            endpoint_id,
            metadata: info.metadata,
            simulcast: info.simulcast_config,
            encoding: None,
            vad: VadStatus::Silence,
            track: None,
        }
    }
}

/// Registry of the remote [`Endpoint`]s and their [`RemoteTrack`]s.
///
/// Every mutation returns the affected entries, so the caller can emit
/// events after releasing its borrow of this [`Registry`].
#[derive(Default)]
pub struct Registry {
    endpoints: HashMap<EndpointId, Endpoint>,
    tracks: HashMap<TrackId, RemoteTrack>,
}

impl Registry {
    /// Registers a new [`Endpoint`] along with its tracks.
    ///
    /// Returns [`None`] if the [`Endpoint`] is known already.
    pub fn add_endpoint(
        &mut self,
        info: EndpointInfo,
    ) -> Option<(Endpoint, Vec<RemoteTrack>)> {
        if self.endpoints.contains_key(&info.id) {
            return None;
        }
        let endpoint = Endpoint {
            id: info.id.clone(),
            endpoint_type: info.endpoint_type,
            metadata: info.metadata,
            track_ids: HashSet::new(),
        };
        self.endpoints.insert(info.id.clone(), endpoint);
        let tracks = self.add_tracks(&info.id, info.tracks);
        let endpoint = self.endpoints.get(&info.id)?.clone();
        Some((endpoint, tracks))
    }

    /// Removes the [`Endpoint`] along with its tracks.
    pub fn remove_endpoint(
        &mut self,
        id: &EndpointId,
    ) -> Option<(Endpoint, Vec<RemoteTrack>)> {
        let endpoint = self.endpoints.remove(id)?;
        let tracks = endpoint
            .track_ids
            .iter()
            .filter_map(|t| self.tracks.remove(t))
            .collect();
        Some((endpoint, tracks))
    }

    /// Replaces metadata of the [`Endpoint`].
    pub fn update_endpoint(
        &mut self,
        id: &EndpointId,
        metadata: Metadata,
    ) -> Option<Endpoint> {
        let endpoint = self.endpoints.get_mut(id)?;
        endpoint.metadata = metadata;
        Some(endpoint.clone())
    }

    /// Registers tracks published by the [`Endpoint`].
    ///
    /// Returns the newly registered [`RemoteTrack`]s, known ones and tracks of
    /// unknown [`Endpoint`]s are skipped.
    pub fn add_tracks(
        &mut self,
        endpoint_id: &EndpointId,
        tracks: HashMap<TrackId, TrackInfo>,
    ) -> Vec<RemoteTrack> {
        let endpoint = match self.endpoints.get_mut(endpoint_id) {
            Some(endpoint) => endpoint,
            None => return Vec::new(),
        };
        let mut added = Vec::new();
        for (id, info) in tracks {
            if self.tracks.contains_key(&id) {
                continue;
            }
            let track = RemoteTrack::new(id.clone(), endpoint_id.clone(), info);
            endpoint.track_ids.insert(id.clone());
            self.tracks.insert(id, track.clone());
            added.push(track);
        }
        added
    }

    /// Removes tracks of the [`Endpoint`].
    pub fn remove_tracks(
        &mut self,
        endpoint_id: &EndpointId,
        track_ids: &[TrackId],
    ) -> Vec<RemoteTrack> {
        let endpoint = match self.endpoints.get_mut(endpoint_id) {
            Some(endpoint) => endpoint,
            None => return Vec::new(),
        };
        let tracks = &mut self.tracks;
        track_ids
            .iter()
            .filter(|id| endpoint.track_ids.remove(*id))
            .filter_map(|id| tracks.remove(id))
            .collect()
    }

    /// Applies the provided mutation to the [`RemoteTrack`] of the
    /// [`Endpoint`].
    pub fn update_track<F>(
        &mut self,
        endpoint_id: &EndpointId,
        track_id: &TrackId,
        f: F,
    ) -> Option<RemoteTrack>
    where
        F: FnOnce(&mut RemoteTrack),
    {
        let track = self
            .tracks
            .get_mut(track_id)
            .filter(|t| &t.endpoint_id == endpoint_id)?;
        (f)(track);
        Some(track.clone())
    }

    /// Applies the provided mutation to the [`RemoteTrack`] regardless of
    /// its [`Endpoint`].
    pub fn update_track_by_id<F>(
        &mut self,
        track_id: &TrackId,
        f: F,
    ) -> Option<RemoteTrack>
    where
        F: FnOnce(&mut RemoteTrack),
    {
        let track = self.tracks.get_mut(track_id)?;
        (f)(track);
        Some(track.clone())
    }

    /// Returns the [`RemoteTrack`] with the provided [`TrackId`].
    #[must_use]
    pub fn track(&self, id: &TrackId) -> Option<&RemoteTrack> {
        self.tracks.get(id)
    }

    /// Returns all the registered [`Endpoint`]s.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.values().cloned().collect()
    }

    /// Returns all the registered [`RemoteTrack`]s.
    #[must_use]
    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.values().cloned().collect()
    }

    /// Indicates whether any [`RemoteTrack`] is registered.
    #[must_use]
    pub fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.endpoints.clear();
        self.tracks.clear();
    }
}
