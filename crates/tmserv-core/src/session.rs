//! Session lifecycle state machine.
//!
//! Drives one connection from socket accept through handshake, account
//! authentication, character selection and world entry, and finally through
//! graceful close. Pure state: time is passed in, timeouts are reported
//! back, and the caller (the server driver) performs all I/O.
//!
//! ```text
//! Accepted ─► HandshakeSent ─► AwaitingAuth ─► Authenticated
//!                                                   │
//!                        InGame ◄─ EnteringWorld ◄─ CharacterSelect
//!
//!                 any ─► Closing ─► Closed
//! ```
//!
//! Identity invariants are enforced here and only here: the account binding
//! is immutable once set, and `InGame` is unreachable without a character.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use tmserv_proto::Opcode;

use crate::error::{CloseReason, SessionError};

/// Time allowed to complete the handshake and reach authentication.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum time without any valid packet before the session is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum time a closing session may spend draining its outbound queue.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Socket accepted; nothing sent yet.
    Accepted,
    /// `Initial` packet (version + cipher material) dispatched to client.
    HandshakeSent,
    /// Client acknowledged the protocol; waiting for credentials.
    AwaitingAuth,
    /// Credentials verified; character list being prepared.
    Authenticated,
    /// Character list delivered; waiting for selection.
    CharacterSelect,
    /// Character selected; world-entry handshake in flight.
    EnteringWorld,
    /// Fully in the world; eligible for area routing and broadcast.
    InGame,
    /// Marked for shutdown; outbound queue draining.
    Closing,
    /// Terminal. Resources released.
    Closed,
}

/// Timeouts for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Budget for reaching `Authenticated`.
    pub handshake_timeout: Duration,
    /// Inactivity budget after authentication.
    pub idle_timeout: Duration,
    /// Outbound drain budget while `Closing`.
    pub drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Account identity bound at authentication. Immutable for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    /// Authenticated account id.
    pub account_id: u32,
    /// Account name as logged in.
    pub name: String,
    /// Permission level; non-zero unlocks GM opcodes.
    pub permission: u8,
}

/// Character identity bound at world entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterIdentity {
    /// In-world entity id.
    pub char_id: u16,
    /// Character name.
    pub name: String,
}

/// Timeout verdicts reported by [`Session::check_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTimeout {
    /// Handshake budget exhausted.
    Handshake,
    /// Idle budget exhausted.
    Idle,
    /// Drain budget exhausted; finalize the close now.
    DrainExpired,
}

/// Lifecycle state machine for one connection.
///
/// Generic over the instant type so virtual clocks drive it in tests.
#[derive(Debug, Clone)]
pub struct Session<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: LifecycleState,
    config: SessionConfig,
    created_at: I,
    last_activity: I,
    close_deadline: Option<I>,
    close_reason: Option<CloseReason>,
    account: Option<AccountIdentity>,
    character: Option<CharacterIdentity>,
    /// Smoothed round-trip estimate from keep-alive echoes.
    rtt_ms: Option<u32>,
}

impl<I> Session<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a session in [`LifecycleState::Accepted`].
    pub fn new(now: I, config: SessionConfig) -> Self {
        Self {
            state: LifecycleState::Accepted,
            config,
            created_at: now,
            last_activity: now,
            close_deadline: None,
            close_reason: None,
            account: None,
            character: None,
            rtt_ms: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Bound account identity, if authenticated.
    #[must_use]
    pub fn account(&self) -> Option<&AccountIdentity> {
        self.account.as_ref()
    }

    /// Bound character identity, if selected.
    #[must_use]
    pub fn character(&self) -> Option<&CharacterIdentity> {
        self.character.as_ref()
    }

    /// Reason recorded when the close began.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Smoothed round-trip time in milliseconds.
    #[must_use]
    pub fn rtt_ms(&self) -> Option<u32> {
        self.rtt_ms
    }

    /// When the session was created.
    #[must_use]
    pub fn created_at(&self) -> I {
        self.created_at
    }

    /// Mark inbound activity (any valid packet).
    pub fn touch(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Fold one round-trip sample into the smoothed estimate.
    ///
    /// Classic EWMA with alpha 1/8.
    pub fn record_rtt_sample(&mut self, sample_ms: u32) {
        self.rtt_ms = Some(match self.rtt_ms {
            None => sample_ms,
            Some(prev) => prev - prev / 8 + sample_ms / 8,
        });
    }

    /// Whether `opcode` is permitted in the current state.
    ///
    /// `Closing` and `Closed` permit nothing; inbound packets there are
    /// dropped silently rather than treated as violations.
    #[must_use]
    pub fn allows(&self, opcode: Opcode) -> bool {
        use LifecycleState as S;
        use Opcode as O;

        match self.state {
            S::Accepted | S::Closing | S::Closed => false,
            S::HandshakeSent | S::AwaitingAuth => {
                matches!(opcode, O::KeepAlive | O::AccountLogin)
            },
            S::Authenticated | S::CharacterSelect => {
                matches!(opcode, O::KeepAlive | O::CharacterLogin | O::Logout)
            },
            S::EnteringWorld => matches!(opcode, O::KeepAlive),
            S::InGame => !matches!(
                opcode,
                O::AccountLogin
                    | O::CharacterLogin
                    | O::Initial
                    | O::CharacterList
                    | O::AccountLoginResponse
                    | O::CharacterLoginResponse
                    | O::ItemResult
                    | O::ShopList
                    | O::StorageResult
                    | O::TradeResult
                    | O::MoveNotify
                    | O::EntitySpawn
                    | O::EntityDespawn
                    | O::EffectNotify
                    | O::AttackResult
                    | O::SkillResult
            ),
        }
    }

    /// `Accepted → HandshakeSent`: the `Initial` packet has been queued.
    pub fn handshake_sent(&mut self) -> Result<(), SessionError> {
        self.transition(LifecycleState::Accepted, LifecycleState::HandshakeSent, "send handshake")
    }

    /// `HandshakeSent → AwaitingAuth`: first valid client packet arrived.
    ///
    /// The legacy client does not send a dedicated acknowledgement; any
    /// packet that frames and deciphers correctly proves the version and
    /// cipher agreement.
    pub fn protocol_acknowledged(&mut self) -> Result<(), SessionError> {
        self.transition(
            LifecycleState::HandshakeSent,
            LifecycleState::AwaitingAuth,
            "acknowledge protocol",
        )
    }

    /// `AwaitingAuth → Authenticated`: credentials verified.
    ///
    /// # Errors
    ///
    /// [`SessionError::AccountAlreadyBound`] if an identity was already set;
    /// the binding is immutable for the session's lifetime.
    pub fn authenticate(&mut self, identity: AccountIdentity) -> Result<(), SessionError> {
        if self.account.is_some() {
            return Err(SessionError::AccountAlreadyBound);
        }
        self.transition(LifecycleState::AwaitingAuth, LifecycleState::Authenticated, "authenticate")?;
        self.account = Some(identity);
        Ok(())
    }

    /// `Authenticated → CharacterSelect`: character list queued.
    pub fn character_list_sent(&mut self) -> Result<(), SessionError> {
        self.transition(
            LifecycleState::Authenticated,
            LifecycleState::CharacterSelect,
            "send character list",
        )
    }

    /// `CharacterSelect → EnteringWorld`: character chosen and loading.
    pub fn begin_world_entry(&mut self, character: CharacterIdentity) -> Result<(), SessionError> {
        self.transition(
            LifecycleState::CharacterSelect,
            LifecycleState::EnteringWorld,
            "begin world entry",
        )?;
        self.character = Some(character);
        Ok(())
    }

    /// `EnteringWorld → InGame`: entry packets acknowledged.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoCharacterSelected`] if no character is bound; the
    /// `InGame ⇒ character` invariant is unconditional.
    pub fn complete_world_entry(&mut self) -> Result<(), SessionError> {
        if self.character.is_none() {
            return Err(SessionError::NoCharacterSelected);
        }
        self.transition(LifecycleState::EnteringWorld, LifecycleState::InGame, "complete world entry")
    }

    /// `any → Closing`: record the reason and start the drain clock.
    ///
    /// Idempotent: closing an already-closing session keeps the first
    /// reason and deadline.
    pub fn begin_close(&mut self, reason: CloseReason, now: I) {
        if matches!(self.state, LifecycleState::Closing | LifecycleState::Closed) {
            return;
        }
        self.state = LifecycleState::Closing;
        self.close_reason = Some(reason);
        self.close_deadline = Some(now);
    }

    /// `Closing → Closed`: outbound queue drained or deadline hit.
    pub fn finalize_close(&mut self) {
        self.state = LifecycleState::Closed;
    }

    /// Check timers against `now`.
    pub fn check_timeout(&self, now: I) -> Option<SessionTimeout> {
        match self.state {
            LifecycleState::Accepted
            | LifecycleState::HandshakeSent
            | LifecycleState::AwaitingAuth => {
                ((now - self.created_at) > self.config.handshake_timeout)
                    .then_some(SessionTimeout::Handshake)
            },
            LifecycleState::Authenticated
            | LifecycleState::CharacterSelect
            | LifecycleState::EnteringWorld
            | LifecycleState::InGame => ((now - self.last_activity) > self.config.idle_timeout)
                .then_some(SessionTimeout::Idle),
            LifecycleState::Closing => self
                .close_deadline
                .is_some_and(|at| (now - at) > self.config.drain_timeout)
                .then_some(SessionTimeout::DrainExpired),
            LifecycleState::Closed => None,
        }
    }

    fn transition(
        &mut self,
        from: LifecycleState,
        to: LifecycleState,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition { state: self.state, operation });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::now()
    }

    fn in_game_session(now: Instant) -> Session {
        let mut s = Session::new(now, SessionConfig::default());
        s.handshake_sent().unwrap();
        s.protocol_acknowledged().unwrap();
        s.authenticate(AccountIdentity { account_id: 42, name: "alice".into(), permission: 0 })
            .unwrap();
        s.character_list_sent().unwrap();
        s.begin_world_entry(CharacterIdentity { char_id: 1, name: "alice".into() }).unwrap();
        s.complete_world_entry().unwrap();
        s
    }

    #[test]
    fn full_lifecycle_reaches_in_game() {
        let s = in_game_session(t0());
        assert_eq!(s.state(), LifecycleState::InGame);
        assert_eq!(s.account().unwrap().account_id, 42);
        assert_eq!(s.character().unwrap().char_id, 1);
    }

    #[test]
    fn account_binding_is_immutable() {
        let now = t0();
        let mut s = Session::new(now, SessionConfig::default());
        s.handshake_sent().unwrap();
        s.protocol_acknowledged().unwrap();
        s.authenticate(AccountIdentity { account_id: 1, name: "a".into(), permission: 0 }).unwrap();

        let err =
            s.authenticate(AccountIdentity { account_id: 2, name: "b".into(), permission: 0 });
        assert_eq!(err, Err(SessionError::AccountAlreadyBound));
        assert_eq!(s.account().unwrap().account_id, 1);
    }

    #[test]
    fn in_game_requires_character() {
        let now = t0();
        let mut s = Session::new(now, SessionConfig::default());
        s.handshake_sent().unwrap();
        s.protocol_acknowledged().unwrap();
        s.authenticate(AccountIdentity { account_id: 1, name: "a".into(), permission: 0 }).unwrap();
        s.character_list_sent().unwrap();

        // Skipping begin_world_entry: there is no path into EnteringWorld
        // without a character, so complete_world_entry cannot even be
        // attempted from CharacterSelect.
        assert!(matches!(
            s.complete_world_entry(),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn awaiting_auth_has_no_account() {
        let now = t0();
        let mut s = Session::new(now, SessionConfig::default());
        s.handshake_sent().unwrap();
        s.protocol_acknowledged().unwrap();
        assert_eq!(s.state(), LifecycleState::AwaitingAuth);
        assert!(s.account().is_none());
    }

    #[test]
    fn opcode_gating_follows_state() {
        let now = t0();
        let mut s = Session::new(now, SessionConfig::default());
        s.handshake_sent().unwrap();

        assert!(s.allows(Opcode::AccountLogin));
        assert!(!s.allows(Opcode::Move));
        assert!(!s.allows(Opcode::CharacterLogin));

        let s = in_game_session(now);
        assert!(s.allows(Opcode::Move));
        assert!(s.allows(Opcode::Chat));
        assert!(!s.allows(Opcode::AccountLogin));
        assert!(!s.allows(Opcode::AttackResult));
    }

    #[test]
    fn closing_allows_nothing() {
        let now = t0();
        let mut s = in_game_session(now);
        s.begin_close(CloseReason::ClientLogout, now);
        assert!(!s.allows(Opcode::KeepAlive));
        assert_eq!(s.close_reason(), Some(CloseReason::ClientLogout));
    }

    #[test]
    fn begin_close_keeps_first_reason() {
        let now = t0();
        let mut s = in_game_session(now);
        s.begin_close(CloseReason::FloodDetected, now);
        s.begin_close(CloseReason::IdleTimeout, now);
        assert_eq!(s.close_reason(), Some(CloseReason::FloodDetected));
    }

    #[test]
    fn handshake_timeout_fires_before_auth() {
        let now = t0();
        let s: Session = Session::new(now, SessionConfig::default());
        let later = now + Duration::from_secs(6);
        assert_eq!(s.check_timeout(later), Some(SessionTimeout::Handshake));
    }

    #[test]
    fn idle_timeout_fires_in_game() {
        let now = t0();
        let mut s = in_game_session(now);

        let later = now + Duration::from_secs(61);
        assert_eq!(s.check_timeout(later), Some(SessionTimeout::Idle));

        s.touch(later);
        assert_eq!(s.check_timeout(later + Duration::from_secs(30)), None);
    }

    #[test]
    fn drain_deadline_expires() {
        let now = t0();
        let mut s = in_game_session(now);
        s.begin_close(CloseReason::ServerShutdown, now);

        assert_eq!(s.check_timeout(now + Duration::from_secs(1)), None);
        assert_eq!(
            s.check_timeout(now + Duration::from_secs(6)),
            Some(SessionTimeout::DrainExpired)
        );

        s.finalize_close();
        assert_eq!(s.state(), LifecycleState::Closed);
        assert_eq!(s.check_timeout(now + Duration::from_secs(60)), None);
    }

    #[test]
    fn rtt_smoothing_converges() {
        let now = t0();
        let mut s = in_game_session(now);
        s.record_rtt_sample(80);
        assert_eq!(s.rtt_ms(), Some(80));

        for _ in 0..64 {
            s.record_rtt_sample(40);
        }
        // Integer EWMA settles within one alpha step of the sample.
        let rtt = s.rtt_ms().unwrap();
        assert!((40..=47).contains(&rtt), "smoothed rtt {rtt} should approach 40");
    }
}
