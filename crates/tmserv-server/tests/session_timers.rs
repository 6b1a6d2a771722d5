//! Timed lifecycle transitions: handshake timeout, idle timeout, drain.

mod common;

use common::{TestServer, chat_local, closes};
use tmserv_core::CloseReason;
use tmserv_core::session::LifecycleState;
use tmserv_proto::{Opcode, Packet};
use tmserv_proto::messages::BodyWriter;

#[test]
fn handshake_timeout_closes_silent_connections() {
    let mut server = TestServer::new();
    server.connect(1);

    // Nothing for six seconds.
    server.env.advance(5900);
    let actions = server.tick();

    assert_eq!(closes(&actions), vec![(1, CloseReason::HandshakeTimeout)]);
}

#[test]
fn idle_timeout_closes_quiet_sessions() {
    let mut server = TestServer::new();
    server.login(1, "alice", 100, 100);

    server.env.advance(60_900);
    let actions = server.tick();

    assert_eq!(closes(&actions), vec![(1, CloseReason::IdleTimeout)]);
}

#[test]
fn activity_resets_the_idle_timer() {
    let mut server = TestServer::new();
    server.login(1, "alice", 100, 100);

    for _ in 0..4 {
        server.env.advance(30_000);
        let actions = server.packet(1, common::keep_alive(1));
        assert!(closes(&actions).is_empty());
        let actions = server.tick();
        assert!(closes(&actions).is_empty(), "keep-alive held the session open");
    }
}

#[test]
fn logout_drains_then_releases_resources() {
    let mut server = TestServer::new();
    server.login(1, "alice", 100, 100);

    let logout = {
        let mut w = BodyWriter::new();
        w.reserved(4);
        Packet::new(Opcode::Logout.to_u16(), 0, w.finish())
    };
    let actions = server.packet(1, logout);
    assert_eq!(closes(&actions), vec![(1, CloseReason::ClientLogout)]);

    let entry = server.driver.registry().get(1).expect("draining");
    assert_eq!(entry.session.state(), LifecycleState::Closing);

    // Packets arriving while closing are dropped silently.
    let actions = server.packet(1, chat_local("too late"));
    assert!(actions.is_empty());

    // The drain deadline passes; the driver releases the session even if
    // the runtime never reports the socket closed.
    server.env.advance(5900);
    server.tick();
    assert!(server.driver.registry().get(1).is_none());
}

#[test]
fn close_reason_is_recorded_once() {
    let mut server = TestServer::new();
    server.login(1, "alice", 100, 100);

    let logout = {
        let mut w = BodyWriter::new();
        w.reserved(4);
        Packet::new(Opcode::Logout.to_u16(), 0, w.finish())
    };
    server.packet(1, logout);

    // A framing error after the close must not overwrite the reason.
    server.event(tmserv_server::ServerEvent::FramingFailed {
        session_id: 1,
        error: tmserv_proto::ProtocolError::BadSize { size: 3 },
    });

    let entry = server.driver.registry().get(1).expect("draining");
    assert_eq!(entry.session.close_reason(), Some(CloseReason::ClientLogout));
}
