//! External collaborator interfaces.
//!
//! Authentication and character storage are separate services in
//! production. The server only sees these traits; the driver never calls
//! them directly on a worker path — the runtime executes them off-thread
//! and feeds the outcome back as an event, which is what lets handlers
//! return `Deferred` instead of blocking.
//!
//! The in-memory implementations back tests and standalone operation.

use std::collections::HashMap;
use std::sync::Mutex;

use tmserv_world::entity::{CombatStats, Vitals};

/// Verdict from the account service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted.
    Ok {
        /// Stable account id.
        account_id: u32,
        /// Permission level; non-zero unlocks GM commands.
        permission: u8,
    },
    /// Account/password pair rejected.
    BadCredentials,
    /// Account is banned.
    Banned,
    /// Logins disabled for maintenance.
    MaintenanceLock,
}

/// Account verification service.
pub trait AuthProvider: Send + Sync + 'static {
    /// Verify a credential pair.
    fn verify(&self, account: &str, password: &str) -> AuthOutcome;
}

/// Stored character state as the character service returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterBlob {
    /// Character name (unique per server).
    pub name: String,
    /// Class identifier.
    pub class_id: u8,
    /// Level.
    pub level: u16,
    /// Map the character last stood on.
    pub map: u16,
    /// Last position.
    pub x: u16,
    /// Last position.
    pub y: u16,
    /// Pools at save time.
    pub vitals: Vitals,
    /// Combat numbers.
    pub stats: CombatStats,
    /// Guild membership.
    pub guild: Option<u16>,
}

/// Character roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSummary {
    /// Character name.
    pub name: String,
    /// Class identifier.
    pub class_id: u8,
    /// Level.
    pub level: u16,
}

/// Character persistence service.
pub trait CharacterStore: Send + Sync + 'static {
    /// Characters belonging to an account.
    fn list(&self, account_id: u32) -> Vec<CharacterSummary>;

    /// Load a character by name. `None` if it does not exist or belongs to
    /// another account.
    fn load(&self, account_id: u32, name: &str) -> Option<CharacterBlob>;

    /// Persist a character snapshot.
    fn save(&self, account_id: u32, blob: &CharacterBlob);
}

/// In-memory auth provider for tests and standalone runs.
///
/// Any credential pair authenticates; account ids are assigned on first
/// login and sticky afterwards. Accounts listed in `gm_accounts` get
/// permission level 1.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    state: Mutex<MemoryAuthState>,
}

#[derive(Debug, Default)]
struct MemoryAuthState {
    ids: HashMap<String, u32>,
    next_id: u32,
    banned: Vec<String>,
    gm_accounts: Vec<String>,
}

impl MemoryAuth {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an account banned.
    pub fn ban(&self, account: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.banned.push(account.to_string());
        }
    }

    /// Grant GM permission to an account.
    pub fn grant_gm(&self, account: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.gm_accounts.push(account.to_string());
        }
    }
}

impl AuthProvider for MemoryAuth {
    fn verify(&self, account: &str, _password: &str) -> AuthOutcome {
        let Ok(mut state) = self.state.lock() else {
            return AuthOutcome::MaintenanceLock;
        };

        if state.banned.iter().any(|a| a == account) {
            return AuthOutcome::Banned;
        }

        let permission = u8::from(state.gm_accounts.iter().any(|a| a == account));
        let account_id = match state.ids.get(account) {
            Some(&id) => id,
            None => {
                state.next_id += 1;
                let id = state.next_id;
                state.ids.insert(account.to_string(), id);
                id
            },
        };

        AuthOutcome::Ok { account_id, permission }
    }
}

/// In-memory character store for tests and standalone runs.
///
/// Accounts start with one default character named after the account, so a
/// fresh server is immediately playable.
#[derive(Debug, Default)]
pub struct MemoryCharacters {
    state: Mutex<HashMap<(u32, String), CharacterBlob>>,
}

impl MemoryCharacters {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a character directly (test setup).
    pub fn insert(&self, account_id: u32, blob: CharacterBlob) {
        if let Ok(mut state) = self.state.lock() {
            state.insert((account_id, blob.name.clone()), blob);
        }
    }

    fn default_character(name: &str) -> CharacterBlob {
        CharacterBlob {
            name: name.to_string(),
            class_id: 0,
            level: 1,
            map: 1,
            x: 100,
            y: 100,
            vitals: Vitals::full(100, 50),
            stats: CombatStats { attack: 12, defense: 6, level: 1 },
            guild: None,
        }
    }
}

impl CharacterStore for MemoryCharacters {
    fn list(&self, account_id: u32) -> Vec<CharacterSummary> {
        let Ok(state) = self.state.lock() else { return Vec::new() };
        let mut out: Vec<CharacterSummary> = state
            .iter()
            .filter(|((owner, _), _)| *owner == account_id)
            .map(|(_, blob)| CharacterSummary {
                name: blob.name.clone(),
                class_id: blob.class_id,
                level: blob.level,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn load(&self, account_id: u32, name: &str) -> Option<CharacterBlob> {
        let Ok(mut state) = self.state.lock() else { return None };
        Some(
            state
                .entry((account_id, name.to_string()))
                .or_insert_with(|| Self::default_character(name))
                .clone(),
        )
    }

    fn save(&self, account_id: u32, blob: &CharacterBlob) {
        if let Ok(mut state) = self.state.lock() {
            state.insert((account_id, blob.name.clone()), blob.clone());
        }
    }
}
