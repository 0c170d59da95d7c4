//! ServerSession against scripted loopback game servers.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_approx_eq::assert_approx_eq;
use common::*;
use rsource::config::FormatHint;
use rsource::error::{Error, ProtocolError, TransportError};
use rsource::info::{Environment, ServerType};
use rsource::server::Format;
use rsource::{EngineType, ServerInfo, ServerSession};

const INFO_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFFTSource Engine Query\0";
const DETAILS_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFFdetails\0";
const PLAYER_CHALLENGE_REQUEST: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0x55, 0xFF, 0xFF, 0xFF, 0xFF];
const RULES_CHALLENGE_REQUEST: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0x56, 0xFF, 0xFF, 0xFF, 0xFF];

mod info_tests {
    use super::*;

    /// The server demands a challenge before answering A2S_INFO
    #[tokio::test]
    async fn info_after_anti_spoof_challenge() {
        let addr = spawn_udp(|req| {
            if req == INFO_REQUEST {
                vec![oob(&[0x41, 0xDE, 0xAD, 0xBE, 0xEF])]
            } else if req.starts_with(INFO_REQUEST) && req.ends_with(&[0xDE, 0xAD, 0xBE, 0xEF]) {
                vec![oob(&info_payload("Challenged Server", 12))]
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        let info = session.get_info().await.unwrap();
        let ServerInfo::Current(info) = info else {
            panic!("expected current info");
        };
        assert_eq!(info.protocol, 17);
        assert_eq!(info.hostname, "Challenged Server");
        assert_eq!(info.map, "cp_badlands");
        assert_eq!(info.folder, "tf");
        assert_eq!(info.game, "Team Fortress");
        assert_eq!(info.game_id, 440);
        assert_eq!(info.players, 12);
        assert_eq!(info.maxplayers, 24);
        assert_eq!(info.bots, 0);
        assert_eq!(info.server_type, ServerType::Dedicated);
        assert_eq!(info.server_env, Environment::Windows);
        assert!(info.password_protected);
        assert!(info.vac_enabled);
        assert_eq!(info.version, "7504330");
        assert_eq!(info.extra.unwrap().port, Some(27015));
        assert!(info.latency < Duration::from_secs(1));
    }

    /// A server that never stops challenging is given up on
    #[tokio::test]
    async fn endless_challenges_are_capped() {
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&requests);
        let addr = spawn_udp(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            vec![oob(&[0x41, 1, 2, 3, 4])]
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        let err = session.get_info().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ChallengeLoop { .. })
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn probe_locks_obsolete_format() {
        let addr = spawn_udp(|req| {
            if req == DETAILS_REQUEST {
                vec![oob(&obsolete_info_payload())]
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::GoldSource, config(FormatHint::Probe))
            .await
            .unwrap();
        assert_eq!(session.format(), Format::Obsolete);

        let info = session.get_info().await.unwrap();
        assert!(info.is_obsolete());
        assert_eq!(info.hostname(), "Classic");
        assert_eq!(info.map(), "de_dust");
        assert_eq!(info.players(), 7);
        assert_eq!(info.maxplayers(), 32);
    }

    /// Silence on the legacy query must not hold up session creation
    #[tokio::test]
    async fn probe_timeout_means_current() {
        let addr = spawn_udp(|req| {
            if req == INFO_REQUEST {
                vec![oob(&info_payload("Modern", 3))]
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Probe))
            .await
            .unwrap();
        assert_eq!(session.format(), Format::Current);
        assert_eq!(session.get_info().await.unwrap().hostname(), "Modern");
    }

    #[tokio::test]
    async fn ping_measures_round_trip() {
        let addr = spawn_udp(|_| vec![oob(&info_payload("Pinged", 0))]).await;
        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        let rtt = session.ping().await.unwrap();
        assert!(rtt < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let addr = spawn_udp(|_| vec![]).await;
        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        assert!(session.get_info().await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn one_shot_query() {
        let addr = spawn_udp(|_| vec![oob(&info_payload("One Shot", 1))]).await;
        let info = rsource::query(&addr.to_string(), Some(Duration::from_millis(300)))
            .await
            .unwrap();
        assert_eq!(info.hostname(), "One Shot");
    }
}

mod listing_tests {
    use super::*;

    /// The challenge is fetched once and reused for later queries
    #[tokio::test]
    async fn player_challenge_is_cached() {
        let challenge_requests = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&challenge_requests);
        let addr = spawn_udp(move |req| {
            if req == PLAYER_CHALLENGE_REQUEST {
                seen.fetch_add(1, Ordering::SeqCst);
                vec![oob(&[0x41, 9, 8, 7, 6])]
            } else if req == [0xFF, 0xFF, 0xFF, 0xFF, 0x55, 9, 8, 7, 6] {
                vec![oob(&player_payload(&[("Soldier", 20, 1200.0), ("Engineer", 5, 30.5)]))]
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        for _ in 0..3 {
            let players = session.get_players().await.unwrap();
            assert_eq!(players.len(), 2);
            assert_eq!(players[0].name, "Soldier");
            assert_eq!(players[0].score, 20);
            assert_approx_eq!(players[1].duration.as_secs_f32(), 30.5);
        }
        assert_eq!(challenge_requests.load(Ordering::SeqCst), 1);
    }

    /// Some servers answer the challenge request with the player list itself
    #[tokio::test]
    async fn direct_player_answer_is_accepted() {
        let addr = spawn_udp(|req| {
            if req == PLAYER_CHALLENGE_REQUEST {
                vec![oob(&player_payload(&[("Sniper", 3, 90.0)]))]
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        assert_eq!(session.get_players().await.unwrap()[0].name, "Sniper");
        assert_eq!(session.get_players().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn max_players_placeholder_is_empty() {
        let addr = spawn_udp(|_| vec![oob(&player_payload(&[("Max Players", 0, 0.0)]))]).await;
        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        assert!(session.get_players().await.unwrap().is_empty());
    }

    /// Obsolete servers hand out challenges through A2S_SERVERQUERY_GETCHALLENGE
    #[tokio::test]
    async fn obsolete_server_uses_getchallenge() {
        let addr = spawn_udp(|req| {
            if req == [0xFF, 0xFF, 0xFF, 0xFF, 0x57] {
                vec![oob(&[0x41, 1, 1, 1, 1])]
            } else if req == [0xFF, 0xFF, 0xFF, 0xFF, 0x56, 1, 1, 1, 1] {
                vec![oob(&rules_payload(2))]
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::GoldSource, config(FormatHint::Obsolete))
            .await
            .unwrap();
        let rules = session.get_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].name, "sv_rule_1");
        assert_eq!(rules[1].value, "10");
    }

    /// Compressed Source split response, delivered out of order
    #[tokio::test]
    async fn compressed_split_rules() {
        let addr = spawn_udp(|req| {
            if req == RULES_CHALLENGE_REQUEST {
                vec![oob(&[0x41, 5, 5, 5, 5])]
            } else if req == [0xFF, 0xFF, 0xFF, 0xFF, 0x56, 5, 5, 5, 5] {
                let mut packets = source_split_compressed(&oob(&rules_payload(80)), 90);
                packets.reverse();
                packets
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        let rules = session.get_rules().await.unwrap();
        assert_eq!(rules.len(), 80);
        assert_eq!(rules[79].name, "sv_rule_79");
        assert_eq!(rules[79].value, "790");
    }

    /// GoldSource split response, delivered out of order
    #[tokio::test]
    async fn goldsource_split_players() {
        let names: Vec<String> = (0..20).map(|i| format!("player_with_long_name_{}", i)).collect();
        let records: Vec<(&str, i32, f32)> = names.iter().map(|n| (n.as_str(), 1, 2.0)).collect();
        let packets = goldsource_split(&oob(&player_payload(&records)), 200);
        assert!(packets.len() > 2);

        let addr = spawn_udp(move |req| {
            if req == PLAYER_CHALLENGE_REQUEST {
                let mut shuffled = packets.clone();
                shuffled.rotate_left(1);
                shuffled
            } else {
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::GoldSource, config(FormatHint::Current))
            .await
            .unwrap();
        let players = session.get_players().await.unwrap();
        assert_eq!(players.len(), 20);
        assert_eq!(players[19].name, "player_with_long_name_19");
    }

    /// Players and rules each get their own challenge, and neither reuses the other's
    #[tokio::test]
    async fn player_and_rules_challenges_are_independent() {
        let player_challenges = Arc::new(AtomicUsize::new(0));
        let rules_challenges = Arc::new(AtomicUsize::new(0));
        let (seen_players, seen_rules) = (Arc::clone(&player_challenges), Arc::clone(&rules_challenges));
        let addr = spawn_udp(move |req| {
            if req == PLAYER_CHALLENGE_REQUEST {
                seen_players.fetch_add(1, Ordering::SeqCst);
                vec![oob(&[0x41, 1, 1, 1, 1])]
            } else if req == RULES_CHALLENGE_REQUEST {
                seen_rules.fetch_add(1, Ordering::SeqCst);
                vec![oob(&[0x41, 2, 2, 2, 2])]
            } else if req == [0xFF, 0xFF, 0xFF, 0xFF, 0x55, 1, 1, 1, 1] {
                vec![oob(&player_payload(&[("Medic", 7, 60.0)]))]
            } else if req == [0xFF, 0xFF, 0xFF, 0xFF, 0x56, 2, 2, 2, 2] {
                vec![oob(&rules_payload(3))]
            } else {
                // a token sent to the wrong listing gets no answer
                vec![]
            }
        })
        .await;

        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        assert_eq!(session.get_players().await.unwrap()[0].name, "Medic");
        assert_eq!(rules_challenges.load(Ordering::SeqCst), 0);

        assert_eq!(session.get_rules().await.unwrap().len(), 3);
        assert_eq!(rules_challenges.load(Ordering::SeqCst), 1);

        for _ in 0..2 {
            assert_eq!(session.get_players().await.unwrap().len(), 1);
            assert_eq!(session.get_rules().await.unwrap().len(), 3);
        }
        assert_eq!(player_challenges.load(Ordering::SeqCst), 1);
        assert_eq!(rules_challenges.load(Ordering::SeqCst), 1);
    }

    /// A single-packet datagram in the middle of a split response is rejected as such
    #[tokio::test]
    async fn stray_single_packet_inside_split() {
        let names: Vec<String> = (0..20).map(|i| format!("player_with_long_name_{}", i)).collect();
        let records: Vec<(&str, i32, f32)> = names.iter().map(|n| (n.as_str(), 1, 2.0)).collect();
        let mut packets = goldsource_split(&oob(&player_payload(&records)), 200);
        let stray = oob(&[0x41, 3, 3, 3, 3]);
        packets[1] = stray.clone();

        let addr = spawn_udp(move |_| packets.clone()).await;
        let mut session = ServerSession::connect(addr, EngineType::GoldSource, config(FormatHint::Current))
            .await
            .unwrap();
        match session.get_players().await {
            Err(Error::Protocol(ProtocolError::InvalidSplit { raw, .. })) => assert_eq!(raw, stray),
            other => panic!("expected invalid split error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_reply_type_keeps_raw_bytes() {
        let addr = spawn_udp(|_| vec![oob(&[0x49, 0x00])]).await;
        let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
            .await
            .unwrap();
        match session.get_players().await {
            Err(Error::Protocol(err @ ProtocolError::UnexpectedType { .. })) => {
                assert_eq!(err.raw(), &[0x49, 0x00]);
            }
            other => panic!("expected unexpected type error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn closed_session_refuses_queries() {
    let addr = spawn_udp(|_| vec![oob(&info_payload("Closing", 0))]).await;
    let mut session = ServerSession::connect(addr, EngineType::Source, config(FormatHint::Current))
        .await
        .unwrap();
    session.close();
    session.close();
    assert!(session.is_closed());
    assert!(matches!(
        session.get_info().await,
        Err(Error::Transport(TransportError::Closed))
    ));
}
