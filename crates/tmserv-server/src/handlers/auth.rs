//! Login, character selection, keep-alive and logout.

use tmserv_core::CloseReason;
use tmserv_core::env::Environment;
use tmserv_core::session::LifecycleState;
use tmserv_proto::messages::session as session_msgs;
use tmserv_proto::{ClientMessage, ServerMessage};

use crate::config::PROTOCOL_VERSION;
use crate::dispatch::HandlerResult;
use crate::driver::{LogLevel, ServerAction, ServerDriver};

impl<E: Environment> ServerDriver<E> {
    /// `AccountLogin`: kick off deferred verification.
    pub(crate) fn handle_account_login(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::AccountLogin(login) = message else { return HandlerResult::Ok };

        let Some(entry) = self.registry.get_mut(session_id) else { return HandlerResult::Ok };
        if entry.auth_in_flight {
            // A second login while the first is pending is either a confused
            // client or a probe; drop it.
            return HandlerResult::Ok;
        }

        if login.client_version != PROTOCOL_VERSION {
            let client_id = entry.client_id;
            let response = ServerMessage::AccountLoginResponse(session_msgs::AccountLoginResponse {
                result: 4,
                permission: 0,
                notice: String::new(),
            });
            actions.push(ServerAction::Send { session_id, packet: response.into_packet(client_id) });
            return HandlerResult::CloseConnection(CloseReason::AuthFailed);
        }

        entry.auth_in_flight = true;
        actions.push(ServerAction::Authenticate {
            session_id,
            account: login.account,
            password: login.password,
        });
        HandlerResult::Deferred
    }

    /// `CharacterLogin`: kick off deferred character load.
    pub(crate) fn handle_character_login(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::CharacterLogin(select) = message else { return HandlerResult::Ok };

        let Some(entry) = self.registry.get_mut(session_id) else { return HandlerResult::Ok };
        if entry.session.state() != LifecycleState::CharacterSelect || entry.load_in_flight {
            return HandlerResult::Ok;
        }
        let Some(account) = entry.session.account() else { return HandlerResult::Ok };
        let account_id = account.account_id;

        entry.load_in_flight = true;
        actions.push(ServerAction::LoadCharacter {
            session_id,
            account_id,
            name: select.char_name,
        });
        HandlerResult::Deferred
    }

    /// `KeepAlive`: refresh activity and fold the RTT sample.
    pub(crate) fn handle_keep_alive(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::KeepAlive(ka) = message else { return HandlerResult::Ok };
        let now_ms = self.now_ms();

        let Some(entry) = self.registry.get_mut(session_id) else { return HandlerResult::Ok };

        // The client echoes the value of the last server keep-alive; the
        // difference to its send time is one round trip.
        if let Some((value, sent_ms)) = entry.last_keepalive
            && ka.client_time == value
        {
            let sample = now_ms.saturating_sub(sent_ms) as u32;
            entry.session.record_rtt_sample(sample);
            entry.last_keepalive = None;
        }

        let echo = ServerMessage::KeepAlive(session_msgs::KeepAlive { client_time: ka.client_time });
        self.send_to(session_id, echo, actions);
        HandlerResult::Ok
    }

    /// `Logout`: graceful close.
    pub(crate) fn handle_logout(
        &mut self,
        session_id: u32,
        _message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("session {session_id} requested logout"),
        });
        HandlerResult::CloseConnection(CloseReason::ClientLogout)
    }
}
