//! Flood detection scenarios (S4).

mod common;

use common::{TestServer, closes, move_packet};
use tmserv_core::CloseReason;
use tmserv_server::ServerAction;

#[test]
fn s4_move_flood_throttles_then_closes() {
    let mut server = TestServer::new();
    server.login(1, "alice", 100, 100);

    // 200 moves inside one second against a 10/s, burst-20 budget.
    let mut flood_closed_at = None;
    for i in 0..200u32 {
        server.env.advance(5);
        let actions = server.packet(1, move_packet((100, 100), (101, 100)));
        if closes(&actions).iter().any(|(_, r)| *r == CloseReason::FloodDetected) {
            flood_closed_at = Some(i);
            break;
        }
    }

    let closed_at = flood_closed_at.expect("flood close");
    // Burst of 20 passes, then each packet is throttled; the tenth
    // violation closes.
    assert_eq!(closed_at, 29);

    let stats = server.driver.stats();
    assert_eq!(stats.counters.throttled_packets, 10);
}

#[test]
fn s4_flood_soft_bans_the_peer() {
    let mut server = TestServer::new();
    let peer = TestServer::peer(77);

    // Build a session from one address and flood it out.
    server.connect_from(1, peer);
    server.authenticate(1, "alice");
    server.packet(1, common::character_login("alice"));
    server.event(tmserv_server::ServerEvent::CharacterLoaded {
        session_id: 1,
        character: Some(tmserv_server::CharacterBlob {
            name: "alice".to_string(),
            class_id: 0,
            level: 10,
            map: 1,
            x: 100,
            y: 100,
            vitals: tmserv_world::entity::Vitals::full(500, 100),
            stats: tmserv_world::entity::CombatStats { attack: 50, defense: 20, level: 10 },
            guild: None,
        }),
    });

    for _ in 0..200 {
        server.env.advance(5);
        let actions = server.packet(1, move_packet((100, 100), (101, 100)));
        if !closes(&actions).is_empty() {
            break;
        }
    }
    server.event(tmserv_server::ServerEvent::ConnectionClosed { session_id: 1 });

    // Reconnection from the same address is rejected while the ban lives.
    let actions = server.connect_from(2, peer);
    assert_eq!(closes(&actions), vec![(2, CloseReason::Banned)]);

    // A different address is fine.
    let actions = server.connect_from(3, TestServer::peer(78));
    assert!(closes(&actions).is_empty());
    assert!(actions.iter().any(|a| matches!(a, ServerAction::Send { session_id: 3, .. })));
}

#[test]
fn throttled_packets_are_dropped_not_fatal() {
    let mut server = TestServer::new();
    server.login(1, "alice", 100, 100);

    // Fill the burst exactly, then one more: throttled, session alive.
    for _ in 0..20 {
        server.env.advance(5);
        let actions = server.packet(1, move_packet((100, 100), (101, 100)));
        assert!(closes(&actions).is_empty());
    }

    server.env.advance(5);
    let actions = server.packet(1, move_packet((100, 100), (101, 100)));
    assert!(closes(&actions).is_empty(), "first throttle is recoverable");
    assert_eq!(server.driver.stats().counters.throttled_packets, 1);

    // After the window drains the budget recovers.
    server.env.advance(3000);
    let actions = server.packet(1, move_packet((100, 100), (101, 100)));
    assert!(closes(&actions).is_empty());
    assert_eq!(server.driver.stats().counters.throttled_packets, 1);
}

#[test]
fn keep_alive_is_never_throttled() {
    let mut server = TestServer::new();
    server.login(1, "alice", 100, 100);

    for i in 0..500u32 {
        let actions = server.packet(1, common::keep_alive(i));
        assert!(closes(&actions).is_empty());
    }
    assert_eq!(server.driver.stats().counters.throttled_packets, 0);
}
