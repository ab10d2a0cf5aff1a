mod common;

use medea_webrtc_endpoint::{
    platform::{PeerConnectionEvent, SignalingState, Transceiver as _},
    proto::{Encoding, MediaKind, SimulcastConfig, TrackBitrates},
    CommandError, ConnectionStatus, EndpointError,
};
use serde_json::json;

use self::common::{local, publish_video, settle, track, watch, Harness};

#[tokio::test]
async fn publishes_track_through_full_exchange() {
    local(async {
        let h = Harness::new();
        h.join(json!([]));

        let added = watch(h.endpoint.add_track(
            track(MediaKind::Video),
            json!({"name": "cam"}),
            SimulcastConfig::default(),
            Some(TrackBitrates::Single(500)),
        ));
        settle().await;
        assert_eq!(h.sent_types(), vec!["connect", "renegotiateTracks"]);
        assert_eq!(h.endpoint.status(), ConnectionStatus::Renegotiating);

        h.offer_data(0, 0);
        settle().await;
        let offer = h.sent().pop().unwrap();
        assert_eq!(offer["data"]["type"], "sdpOffer");
        let offer = &offer["data"]["data"];
        assert_eq!(
            offer["sdpOffer"],
            json!({"type": "offer", "sdp": "offer-1"}),
        );
        let track_id = offer["midToTrackId"]["0"].as_str().unwrap().to_owned();
        assert_eq!(
            offer["trackIdToTrackMetadata"][&track_id],
            json!({"name": "cam"}),
        );
        assert_eq!(offer["trackIdToTrackBitrates"][&track_id], json!(500));
        assert!(added.borrow().is_none());

        h.sdp_answer("answer-1", json!({}));
        settle().await;
        assert_eq!(h.peer().remote_answers(), vec!["answer-1"]);
        assert!(
            added.borrow().is_none(),
            "resolved before the connection is established",
        );

        h.peer().establish();
        settle().await;
        let id = added.borrow_mut().take().unwrap().unwrap();
        assert_eq!(id.0, track_id);
        assert!(id.0.starts_with("me:"));
        assert_eq!(h.endpoint.status(), ConnectionStatus::Connected);
    })
    .await;
}

#[tokio::test]
async fn queued_additions_negotiate_one_after_another() {
    local(async {
        let h = Harness::new();
        h.join(json!([]));

        let first = watch(h.endpoint.add_track(
            track(MediaKind::Audio),
            json!(null),
            SimulcastConfig::default(),
            None,
        ));
        let second = watch(h.endpoint.add_track(
            track(MediaKind::Video),
            json!(null),
            SimulcastConfig::default(),
            None,
        ));
        settle().await;
        assert_eq!(h.endpoint.local_tracks().len(), 1);

        h.renegotiate().await;
        assert!(matches!(*first.borrow(), Some(Ok(_))));
        assert!(second.borrow().is_none());
        assert_eq!(h.endpoint.local_tracks().len(), 2);
        let renegotiations = h
            .sent_types()
            .into_iter()
            .filter(|t| t == "renegotiateTracks")
            .count();
        assert_eq!(renegotiations, 2);

        h.renegotiate().await;
        assert!(matches!(*second.borrow(), Some(Ok(_))));
        assert_eq!(h.peer().offers_count(), 2);
    })
    .await;
}

#[tokio::test]
async fn failed_offer_rejects_command_and_unblocks_queue() {
    local(async {
        let h = Harness::new();
        h.join(json!([]));
        let added = watch(h.endpoint.add_track(
            track(MediaKind::Video),
            json!(null),
            SimulcastConfig::default(),
            None,
        ));
        settle().await;

        h.offer_data(0, 0);
        h.peer().fail_offer.set(true);
        let updated = watch(
            h.endpoint
                .update_track_metadata("unknown".into(), json!({"x": 1})),
        );
        settle().await;

        let err = added.borrow_mut().take().unwrap().unwrap_err();
        assert!(matches!(
            err.into_inner(),
            EndpointError::Command(CommandError::Negotiation(_)),
        ));
        assert_eq!(h.endpoint.status(), ConnectionStatus::Connected);
        assert!(updated.borrow().is_none());

        h.peer().establish();
        settle().await;
        let err = updated.borrow_mut().take().unwrap().unwrap_err();
        assert_eq!(
            err.into_inner(),
            EndpointError::Command(CommandError::UnknownTrack(
                "unknown".into()
            )),
        );
    })
    .await;
}

#[tokio::test]
async fn failed_connection_creation_rejects_command_and_unblocks_queue() {
    local(async {
        let h = Harness::new();
        h.fail_connection.set(true);
        h.join(json!([]));
        let added = watch(h.endpoint.add_track(
            track(MediaKind::Video),
            json!(null),
            SimulcastConfig::default(),
            None,
        ));
        settle().await;
        assert_eq!(h.endpoint.status(), ConnectionStatus::Renegotiating);

        h.offer_data(0, 1);
        settle().await;

        let err = added.borrow_mut().take().unwrap().unwrap_err();
        assert!(matches!(
            err.into_inner(),
            EndpointError::Command(CommandError::Negotiation(_)),
        ));
        assert_eq!(h.peers_count(), 0);
        assert_eq!(
            h.events(),
            vec!["Connected(me)", "LocalTrackAdded", "ConnectionError"],
        );
        assert_eq!(h.endpoint.status(), ConnectionStatus::Connected);

        h.fail_connection.set(false);
        h.clear();
        let retried = watch(h.endpoint.add_track(
            track(MediaKind::Audio),
            json!(null),
            SimulcastConfig::default(),
            None,
        ));
        settle().await;
        assert_eq!(h.sent_types(), vec!["renegotiateTracks"]);

        h.renegotiate().await;
        assert!(matches!(*retried.borrow(), Some(Ok(_))));
        assert_eq!(h.peer().transceivers().len(), 2);
    })
    .await;
}

#[tokio::test]
async fn rejects_implausible_remote_tracks_count() {
    local(async {
        let h = Harness::new();
        h.join(json!([]));
        let added = watch(h.endpoint.add_track(
            track(MediaKind::Video),
            json!(null),
            SimulcastConfig::default(),
            None,
        ));
        settle().await;

        h.offer_data(0, 4_000_000_000);
        settle().await;

        let err = added.borrow_mut().take().unwrap().unwrap_err();
        assert!(matches!(
            err.into_inner(),
            EndpointError::Command(CommandError::Negotiation(_)),
        ));
        assert!(h.peer().transceivers().is_empty());
        assert_eq!(h.peer().offers_count(), 0);
        assert_eq!(h.endpoint.status(), ConnectionStatus::Connected);
    })
    .await;
}

#[tokio::test]
async fn commands_wait_for_stable_signaling_state() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        h.peer().set_signaling_state(SignalingState::HaveLocalOffer);
        let updated = watch(
            h.endpoint.update_track_metadata(id.clone(), json!({"v": 1})),
        );
        settle().await;
        assert!(updated.borrow().is_none());
        assert!(h.sent_types().is_empty());

        h.peer().set_signaling_state(SignalingState::Stable);
        settle().await;
        assert!(matches!(*updated.borrow(), Some(Ok(()))));
        assert_eq!(h.sent_types(), vec!["updateTrackMetadata"]);
    })
    .await;
}

#[tokio::test]
async fn immediate_commands_run_back_to_back() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let results: Vec<_> = (0..3)
            .map(|v| {
                watch(
                    h.endpoint
                        .update_track_metadata(id.clone(), json!({ "v": v })),
                )
            })
            .collect();
        settle().await;

        for res in &results {
            assert!(matches!(*res.borrow(), Some(Ok(()))));
        }
        let versions: Vec<_> = h
            .sent()
            .iter()
            .map(|m| m["data"]["trackMetadata"]["v"].clone())
            .collect();
        assert_eq!(versions, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(h.endpoint.local_tracks()[0].metadata, json!({"v": 2}));
    })
    .await;
}

#[tokio::test]
async fn replaces_track_without_renegotiation() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let replaced = watch(h.endpoint.replace_track(
            id.clone(),
            track(MediaKind::Video),
            Some(json!({"name": "screen"})),
        ));
        settle().await;

        assert!(matches!(*replaced.borrow(), Some(Ok(()))));
        assert_eq!(h.sent_types(), vec!["updateTrackMetadata"]);
        assert_eq!(h.events(), vec!["LocalTrackReplaced"]);
        assert_eq!(h.peer().offers_count(), 1);
        assert_eq!(
            h.endpoint.local_tracks()[0].metadata,
            json!({"name": "screen"}),
        );
    })
    .await;
}

#[tokio::test]
async fn failed_replacement_restores_track() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;
        h.peer().fail_replace.set(true);

        let replaced = watch(h.endpoint.replace_track(
            id.clone(),
            track(MediaKind::Video),
            Some(json!({"name": "screen"})),
        ));
        settle().await;

        let err = replaced.borrow_mut().take().unwrap().unwrap_err();
        assert!(matches!(
            err.into_inner(),
            EndpointError::Command(CommandError::Negotiation(_)),
        ));
        assert_eq!(
            h.endpoint.local_tracks()[0].metadata,
            json!({"name": "cam"}),
        );

        let updated =
            watch(h.endpoint.update_track_metadata(id, json!({"v": 1})));
        settle().await;
        assert!(matches!(*updated.borrow(), Some(Ok(()))));
    })
    .await;
}

#[tokio::test]
async fn rejects_replacement_with_other_kind() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let replaced =
            watch(h.endpoint.replace_track(id, track(MediaKind::Audio), None));
        settle().await;

        let err = replaced.borrow_mut().take().unwrap().unwrap_err();
        assert!(matches!(
            err.into_inner(),
            EndpointError::Command(CommandError::Validation(_)),
        ));
        assert!(h.events().is_empty());
    })
    .await;
}

#[tokio::test]
async fn offer_request_waits_for_track_replacement() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let replaced = watch(h.endpoint.replace_track(
            id,
            track(MediaKind::Video),
            None,
        ));
        h.offer_data(1, 0);
        assert_eq!(h.peer().transceivers().len(), 1);

        settle().await;
        assert_eq!(h.events(), vec!["LocalTrackReplaced"]);
        assert_eq!(h.peer().transceivers().len(), 2);
        assert_eq!(h.peer().offers_count(), 2);
        assert_eq!(h.sent_types(), vec!["sdpOffer"]);
        assert_eq!(h.endpoint.status(), ConnectionStatus::Renegotiating);
        assert!(replaced.borrow().is_none());

        h.sdp_answer("answer-2", json!({}));
        settle().await;
        assert!(matches!(*replaced.borrow(), Some(Ok(()))));
        assert_eq!(h.endpoint.status(), ConnectionStatus::Connected);
    })
    .await;
}

#[tokio::test]
async fn removes_track_with_renegotiation() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let removed = watch(h.endpoint.remove_track(id));
        settle().await;
        assert!(h.peer().transceivers().is_empty());
        assert_eq!(h.sent_types(), vec!["renegotiateTracks"]);
        assert!(removed.borrow().is_none());

        h.renegotiate().await;
        assert!(matches!(*removed.borrow(), Some(Ok(()))));
        assert!(h.endpoint.local_tracks().is_empty());
        assert!(h.events().contains(&"LocalTrackRemoved".to_owned()));
    })
    .await;
}

#[tokio::test]
async fn toggles_simulcast_encodings() {
    local(async {
        let h = Harness::new();
        let id = publish_video(
            &h,
            SimulcastConfig {
                enabled: true,
                active_encodings: vec![Encoding::Low, Encoding::High],
                disabled_encodings: vec![],
            },
        )
        .await;
        let simulcast = h.endpoint.local_tracks()[0].simulcast.clone();
        assert_eq!(simulcast.disabled_encodings, vec![Encoding::Medium]);

        let disabled = watch(
            h.endpoint.disable_track_encoding(id.clone(), Encoding::High),
        );
        settle().await;
        assert!(matches!(*disabled.borrow(), Some(Ok(()))));

        let simulcast = h.endpoint.local_tracks()[0].simulcast.clone();
        assert_eq!(simulcast.active_encodings, vec![Encoding::Low]);
        assert_eq!(
            simulcast.disabled_encodings,
            vec![Encoding::Medium, Encoding::High],
        );
        assert_eq!(
            h.peer().transceivers()[0].encoding_changes(),
            vec![(Encoding::High, false)],
        );
        assert_eq!(h.sent_types(), vec!["disableTrackEncoding"]);
        assert_eq!(h.events(), vec!["LocalTrackEncodingDisabled(h)"]);

        let enabled =
            watch(h.endpoint.enable_track_encoding(id, Encoding::Medium));
        settle().await;
        assert!(matches!(*enabled.borrow(), Some(Ok(()))));
        assert_eq!(
            h.endpoint.local_tracks()[0].simulcast.active_encodings,
            vec![Encoding::Low, Encoding::Medium],
        );
    })
    .await;
}

#[tokio::test]
async fn rejects_encoding_toggle_without_simulcast() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let enabled =
            watch(h.endpoint.enable_track_encoding(id, Encoding::Low));
        settle().await;

        let err = enabled.borrow_mut().take().unwrap().unwrap_err();
        assert!(matches!(
            err.into_inner(),
            EndpointError::Command(CommandError::Validation(_)),
        ));
        assert!(h.sent_types().is_empty());
    })
    .await;
}

#[tokio::test]
async fn applies_bandwidth_limits() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let limited = watch(
            h.endpoint
                .set_track_bandwidth(id, Some(TrackBitrates::Single(300))),
        );
        settle().await;

        assert!(matches!(*limited.borrow(), Some(Ok(()))));
        assert_eq!(
            h.peer().transceivers()[0].bitrate_changes(),
            vec![(None, 300_000)],
        );
        assert_eq!(h.events(), vec!["LocalTrackBandwidthChanged"]);
    })
    .await;
}

#[tokio::test]
async fn applies_bandwidth_limits_beyond_u32_bps() {
    local(async {
        let h = Harness::new();
        let id = publish_video(&h, SimulcastConfig::default()).await;

        let limited = watch(h.endpoint.set_track_bandwidth(
            id.clone(),
            Some(TrackBitrates::Single(5_000_000)),
        ));
        settle().await;
        assert!(matches!(*limited.borrow(), Some(Ok(()))));

        let updated = watch(h.endpoint.update_track_metadata(id, json!(1)));
        settle().await;

        assert!(matches!(*updated.borrow(), Some(Ok(()))));
        assert_eq!(
            h.peer().transceivers()[0].bitrate_changes(),
            vec![(None, 5_000_000_000)],
        );
    })
    .await;
}

#[tokio::test]
async fn exchanges_ice_candidates() {
    local(async {
        let h = Harness::new();
        publish_video(&h, SimulcastConfig::default()).await;

        h.peer().fire(PeerConnectionEvent::IceCandidate(
            serde_json::from_value(json!({
                "candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host",
                "sdpMLineIndex": 0,
                "sdpMid": "0",
            }))
            .unwrap(),
        ));
        assert_eq!(h.sent_types(), vec!["candidate"]);

        h.receive(json!({
            "type": "custom",
            "data": {
                "type": "candidate",
                "data": {
                    "candidate": "candidate:2 1 udp 1 10.0.0.2 5000 typ host",
                    "sdpMLineIndex": 0,
                    "sdpMid": "0",
                },
            },
        }));
        settle().await;
        assert_eq!(h.peer().remote_candidates().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn builds_connection_with_media_server_turn() {
    local(async {
        let h = Harness::new();
        h.join(json!([]));

        h.receive(json!({
            "type": "custom",
            "data": {
                "type": "offerData",
                "data": {
                    "tracksTypes": {"audio": 1, "video": 1},
                    "integratedTurnServers": [{
                        "serverAddr": "1.2.3.4",
                        "serverPort": 3478,
                        "transport": "udp",
                        "username": "user",
                        "password": "pass",
                    }],
                },
            },
        }));

        let peer = h.peer();
        let turn = &peer.config.ice_servers[0];
        assert_eq!(turn.urls, vec!["turn:1.2.3.4:3478?transport=udp"]);
        assert_eq!(turn.username.as_deref(), Some("user"));
        assert_eq!(turn.credential.as_deref(), Some("pass"));
        let kinds: Vec<_> =
            peer.transceivers().iter().map(|t| t.kind()).collect();
        assert_eq!(kinds, vec![MediaKind::Audio, MediaKind::Video]);
    })
    .await;
}
