//! Session registry.
//!
//! The authoritative owner of every session: lifecycle state machine,
//! rate-control state, cipher material, in-world character record and the
//! interactive sub-states (shop, storage, trade, party). Secondary indices
//! (account name, character name, character entity id) update atomically
//! with the primary map because every mutation goes through this API.
//!
//! The registry also implements [`CharacterView`] so the mob AI can resolve
//! character ids without knowing anything about sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::Sub;
use std::time::Duration;

use tmserv_core::rate::{FloodPolicy, RateControl};
use tmserv_core::session::Session;
use tmserv_world::CharacterView;
use tmserv_world::entity::{CombatStats, EntityId, MOB_ID_BASE, MapId, Position, Vitals};

/// In-world state of a character bound to a session.
#[derive(Debug, Clone)]
pub struct CharacterRecord {
    /// Wire-visible entity id, below [`MOB_ID_BASE`].
    pub char_id: EntityId,
    /// Character name.
    pub name: String,
    /// Class identifier.
    pub class_id: u8,
    /// Level.
    pub level: u16,
    /// Current position.
    pub position: Position,
    /// Pools.
    pub vitals: Vitals,
    /// Combat numbers.
    pub stats: CombatStats,
    /// Guild membership.
    pub guild: Option<u16>,
    /// Carried gold.
    pub gold: u32,
}

/// One side of an in-flight trade.
#[derive(Debug, Clone, Default)]
pub struct TradeState {
    /// Session id of the other party.
    pub partner: u32,
    /// Gold offered by this side.
    pub gold: u32,
    /// Inventory slots offered by this side.
    pub slots: Vec<u16>,
    /// Whether this side has accepted the current state.
    pub accepted: bool,
}

/// Per-session traffic counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Valid packets dispatched.
    pub packets_received: u64,
    /// Packets queued outbound.
    pub packets_sent: u64,
}

/// Everything the server holds for one connection.
#[derive(Debug)]
pub struct SessionEntry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Registry-unique session id.
    pub id: u32,
    /// Peer address, for ban bookkeeping.
    pub peer: SocketAddr,
    /// Wire client id echoed in packet headers.
    pub client_id: u16,
    /// Lifecycle state machine.
    pub session: Session<I>,
    /// Per-opcode rate state.
    pub rate: RateControl,
    /// Negotiated cipher key.
    pub cipher_key: u32,
    /// Initial cipher seed.
    pub cipher_seed: u8,
    /// An auth request is in flight; duplicates are dropped.
    pub auth_in_flight: bool,
    /// A character load is in flight.
    pub load_in_flight: bool,
    /// In-world character, present from `EnteringWorld` on.
    pub character: Option<CharacterRecord>,
    /// Value and send time of the last server keep-alive, for RTT.
    pub last_keepalive: Option<(u32, u64)>,
    /// NPC shop the client has open.
    pub open_shop: Option<u16>,
    /// Whether account storage is open.
    pub storage_open: bool,
    /// In-flight trade, if any.
    pub trade: Option<TradeState>,
    /// Party membership.
    pub party: Option<u32>,
    /// Pending party invite: the inviting session.
    pub pending_invite: Option<u32>,
    /// Traffic counters.
    pub stats: SessionStats,
}

impl<I> SessionEntry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Character entity id, if in the world.
    #[must_use]
    pub fn char_id(&self) -> Option<EntityId> {
        self.character.as_ref().map(|c| c.char_id)
    }
}

/// Authoritative map of session id → session, plus secondary indices.
#[derive(Debug)]
pub struct SessionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    sessions: HashMap<u32, SessionEntry<I>>,
    by_account: HashMap<String, u32>,
    by_character: HashMap<String, u32>,
    by_char_id: HashMap<EntityId, u32>,
    parties: HashMap<u32, Vec<u32>>,
    next_client_id: u16,
    next_party_id: u32,
}

impl<I> Default for SessionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> SessionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            by_account: HashMap::new(),
            by_character: HashMap::new(),
            by_char_id: HashMap::new(),
            parties: HashMap::new(),
            next_client_id: 0,
            next_party_id: 0,
        }
    }

    /// Register a new session under a runtime-assigned id.
    ///
    /// Returns `false` without touching the registry if the id is already
    /// in use (a runtime bug, not client behavior).
    pub fn create(
        &mut self,
        id: u32,
        peer: SocketAddr,
        session: Session<I>,
        cipher_key: u32,
        cipher_seed: u8,
        flood: FloodPolicy,
    ) -> bool {
        if self.sessions.contains_key(&id) {
            return false;
        }

        // Client ids wrap within the character range; collisions with live
        // sessions are skipped.
        let client_id = loop {
            self.next_client_id = (self.next_client_id + 1) % MOB_ID_BASE;
            let candidate = self.next_client_id.max(1);
            if !self.by_char_id.contains_key(&candidate)
                && !self.sessions.values().any(|e| e.client_id == candidate)
            {
                break candidate;
            }
        };

        self.sessions.insert(id, SessionEntry {
            id,
            peer,
            client_id,
            session,
            rate: RateControl::new(flood),
            cipher_key,
            cipher_seed,
            auth_in_flight: false,
            load_in_flight: false,
            character: None,
            last_keepalive: None,
            open_shop: None,
            storage_open: false,
            trade: None,
            party: None,
            pending_invite: None,
            stats: SessionStats::default(),
        });
        true
    }

    /// Remove a session, cleaning every index and its party slot.
    pub fn remove(&mut self, id: u32) -> Option<SessionEntry<I>> {
        let entry = self.sessions.remove(&id)?;

        if let Some(account) = entry.session.account() {
            if self.by_account.get(&account.name) == Some(&id) {
                self.by_account.remove(&account.name);
            }
        }
        if let Some(character) = &entry.character {
            self.by_character.remove(&character.name);
            self.by_char_id.remove(&character.char_id);
        }
        if let Some(party_id) = entry.party {
            self.leave_party_slot(party_id, id);
        }

        Some(entry)
    }

    /// Session by id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&SessionEntry<I>> {
        self.sessions.get(&id)
    }

    /// Mutable session by id.
    #[must_use]
    pub fn get_mut(&mut self, id: u32) -> Option<&mut SessionEntry<I>> {
        self.sessions.get_mut(&id)
    }

    /// Session currently bound to an account name.
    #[must_use]
    pub fn lookup_by_account(&self, account: &str) -> Option<u32> {
        self.by_account.get(account).copied()
    }

    /// Session currently playing a character name.
    #[must_use]
    pub fn lookup_by_character(&self, name: &str) -> Option<u32> {
        self.by_character.get(name).copied()
    }

    /// Session owning a character entity id.
    #[must_use]
    pub fn session_by_char_id(&self, char_id: EntityId) -> Option<u32> {
        self.by_char_id.get(&char_id).copied()
    }

    /// Bind an account name to a session in the index.
    ///
    /// Returns the previously bound session if the account was already
    /// online (the duplicate-login case; the caller closes the older one).
    pub fn bind_account(&mut self, id: u32, account: &str) -> Option<u32> {
        let previous = self.by_account.insert(account.to_string(), id);
        previous.filter(|&prev| prev != id)
    }

    /// Bind a character record to a session, updating all indices.
    pub fn bind_character(&mut self, id: u32, record: CharacterRecord) {
        self.by_character.insert(record.name.clone(), id);
        self.by_char_id.insert(record.char_id, id);
        if let Some(entry) = self.sessions.get_mut(&id) {
            entry.character = Some(record);
        }
    }

    /// Take a session's character out of the world, clearing its indices.
    ///
    /// Idempotent: a second call returns `None` and does nothing.
    pub fn unbind_character(&mut self, id: u32) -> Option<CharacterRecord> {
        let entry = self.sessions.get_mut(&id)?;
        let record = entry.character.take()?;
        self.by_character.remove(&record.name);
        self.by_char_id.remove(&record.char_id);
        Some(record)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of all session ids, sorted for deterministic iteration.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Connected player count per map, for spawn density.
    #[must_use]
    pub fn players_by_map(&self) -> HashMap<MapId, usize> {
        let mut out = HashMap::new();
        for entry in self.sessions.values() {
            if let Some(character) = &entry.character {
                *out.entry(character.position.map).or_insert(0) += 1;
            }
        }
        out
    }

    /// Create a party led by `leader`. Returns the party id.
    pub fn create_party(&mut self, leader: u32) -> u32 {
        self.next_party_id += 1;
        let party_id = self.next_party_id;
        self.parties.insert(party_id, vec![leader]);
        if let Some(entry) = self.sessions.get_mut(&leader) {
            entry.party = Some(party_id);
        }
        party_id
    }

    /// Add a session to a party.
    pub fn join_party(&mut self, party_id: u32, id: u32) -> bool {
        let Some(members) = self.parties.get_mut(&party_id) else { return false };
        if !members.contains(&id) {
            members.push(id);
        }
        if let Some(entry) = self.sessions.get_mut(&id) {
            entry.party = Some(party_id);
        }
        true
    }

    /// Remove a session from its party. Disbands singleton parties.
    pub fn leave_party(&mut self, id: u32) {
        let Some(party_id) = self.sessions.get(&id).and_then(|e| e.party) else { return };
        self.leave_party_slot(party_id, id);
        if let Some(entry) = self.sessions.get_mut(&id) {
            entry.party = None;
        }
    }

    fn leave_party_slot(&mut self, party_id: u32, id: u32) {
        if let Some(members) = self.parties.get_mut(&party_id) {
            members.retain(|&m| m != id);
            if members.len() <= 1 {
                for member in self.parties.remove(&party_id).unwrap_or_default() {
                    if let Some(entry) = self.sessions.get_mut(&member) {
                        entry.party = None;
                    }
                }
            }
        }
    }

    /// Members of a party, leader first.
    #[must_use]
    pub fn party_members(&self, party_id: u32) -> Vec<u32> {
        self.parties.get(&party_id).cloned().unwrap_or_default()
    }

    /// Party leader, if the party exists.
    #[must_use]
    pub fn party_leader(&self, party_id: u32) -> Option<u32> {
        self.parties.get(&party_id).and_then(|m| m.first().copied())
    }
}

impl<I> CharacterView for SessionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn position_of(&self, id: EntityId) -> Option<Position> {
        let session_id = self.session_by_char_id(id)?;
        self.get(session_id)?.character.as_ref().map(|c| c.position)
    }

    fn is_alive(&self, id: EntityId) -> bool {
        self.session_by_char_id(id)
            .and_then(|sid| self.get(sid))
            .and_then(|e| e.character.as_ref())
            .is_some_and(|c| c.vitals.is_alive())
    }

    fn combat_stats(&self, id: EntityId) -> Option<CombatStats> {
        let session_id = self.session_by_char_id(id)?;
        self.get(session_id)?.character.as_ref().map(|c| c.stats)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tmserv_core::session::SessionConfig;

    use super::*;

    fn peer() -> SocketAddr {
        "198.51.100.10:40000".parse().expect("addr")
    }

    fn registry_with_sessions(n: usize) -> (SessionRegistry<Instant>, Vec<u32>) {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();
        let ids: Vec<u32> = (1..=n as u32).collect();
        for &id in &ids {
            assert!(registry.create(
                id,
                peer(),
                Session::new(now, SessionConfig::default()),
                0x1234,
                id as u8,
                FloodPolicy::default(),
            ));
        }
        (registry, ids)
    }

    fn record(char_id: EntityId, name: &str) -> CharacterRecord {
        CharacterRecord {
            char_id,
            name: name.to_string(),
            class_id: 0,
            level: 5,
            position: Position { map: 1, x: 100, y: 100 },
            vitals: Vitals::full(100, 50),
            stats: CombatStats { attack: 10, defense: 5, level: 5 },
            guild: None,
            gold: 0,
        }
    }

    #[test]
    fn create_assigns_unique_ids() {
        let (registry, ids) = registry_with_sessions(3);
        assert_eq!(registry.len(), 3);

        let mut client_ids: Vec<u16> =
            ids.iter().map(|&id| registry.get(id).expect("present").client_id).collect();
        client_ids.sort_unstable();
        client_ids.dedup();
        assert_eq!(client_ids.len(), 3);
        assert!(client_ids.iter().all(|&c| c > 0 && c < MOB_ID_BASE));
    }

    #[test]
    fn bind_account_reports_duplicate() {
        let (mut registry, ids) = registry_with_sessions(2);

        assert_eq!(registry.bind_account(ids[0], "alice"), None);
        assert_eq!(registry.bind_account(ids[1], "alice"), Some(ids[0]));
        assert_eq!(registry.lookup_by_account("alice"), Some(ids[1]));
    }

    #[test]
    fn character_indices_update_together() {
        let (mut registry, ids) = registry_with_sessions(1);
        registry.bind_character(ids[0], record(42, "alice"));

        assert_eq!(registry.lookup_by_character("alice"), Some(ids[0]));
        assert_eq!(registry.session_by_char_id(42), Some(ids[0]));

        registry.remove(ids[0]);
        assert_eq!(registry.lookup_by_character("alice"), None);
        assert_eq!(registry.session_by_char_id(42), None);
    }

    #[test]
    fn character_view_resolves_through_indices() {
        let (mut registry, ids) = registry_with_sessions(1);
        registry.bind_character(ids[0], record(42, "alice"));

        assert!(registry.is_alive(42));
        assert_eq!(registry.position_of(42), Some(Position { map: 1, x: 100, y: 100 }));
        assert!(registry.combat_stats(42).is_some());
        assert!(!registry.is_alive(43));
    }

    #[test]
    fn party_lifecycle() {
        let (mut registry, ids) = registry_with_sessions(3);

        let party = registry.create_party(ids[0]);
        assert!(registry.join_party(party, ids[1]));
        assert!(registry.join_party(party, ids[2]));
        assert_eq!(registry.party_members(party), vec![ids[0], ids[1], ids[2]]);
        assert_eq!(registry.party_leader(party), Some(ids[0]));

        registry.leave_party(ids[1]);
        assert_eq!(registry.party_members(party), vec![ids[0], ids[2]]);

        // Dropping to one member disbands.
        registry.leave_party(ids[2]);
        assert!(registry.party_members(party).is_empty());
        assert_eq!(registry.get(ids[0]).expect("present").party, None);
    }

    #[test]
    fn remove_cleans_party_membership() {
        let (mut registry, ids) = registry_with_sessions(3);
        let party = registry.create_party(ids[0]);
        registry.join_party(party, ids[1]);
        registry.join_party(party, ids[2]);

        registry.remove(ids[0]);
        assert_eq!(registry.party_members(party), vec![ids[1], ids[2]]);
    }

    #[test]
    fn players_by_map_counts_characters() {
        let (mut registry, ids) = registry_with_sessions(3);
        registry.bind_character(ids[0], record(1, "a"));
        registry.bind_character(ids[1], record(2, "b"));
        let mut on_two = record(3, "c");
        on_two.position.map = 2;
        registry.bind_character(ids[2], on_two);

        let counts = registry.players_by_map();
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.get(&2), Some(&1));
    }
}
