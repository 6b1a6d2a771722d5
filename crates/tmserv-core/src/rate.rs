//! Per-opcode rate limiting and flood detection.
//!
//! Each registered opcode keeps a ring of recent arrival timestamps. On
//! receipt, entries older than `rate_limit_ms * burst_limit` are evicted; a
//! full ring means the packet is throttled. Throttles and protocol
//! violations both feed a per-session violation window; crossing the
//! threshold inside the window escalates to `FloodDetected`, which closes
//! the session and soft-bans the peer address.
//!
//! Time is plain milliseconds since an epoch the caller chooses (the driver
//! uses server start). No clock is read here.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

/// Rate configuration for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConfig {
    /// Sustained budget: one packet per this many milliseconds.
    pub rate_limit_ms: u64,
    /// Burst allowance above the sustained rate.
    pub burst_limit: usize,
}

impl RateConfig {
    /// Sustained `per_second` packets with the given burst.
    #[must_use]
    pub fn per_second(count: u64, burst_limit: usize) -> Self {
        Self { rate_limit_ms: 1000 / count.max(1), burst_limit }
    }

    fn window_ms(&self) -> u64 {
        self.rate_limit_ms.saturating_mul(self.burst_limit as u64)
    }
}

/// Verdict for one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    /// Within budget.
    Allowed,
    /// Over budget; drop the packet but keep the session.
    Throttled,
    /// Violation threshold crossed; close the session.
    FloodDetected,
}

/// Flood escalation policy.
#[derive(Debug, Clone, Copy)]
pub struct FloodPolicy {
    /// Violations tolerated inside the window.
    pub threshold: usize,
    /// Length of the violation window in milliseconds.
    pub window_ms: u64,
}

impl Default for FloodPolicy {
    fn default() -> Self {
        Self { threshold: 10, window_ms: 30_000 }
    }
}

#[derive(Debug, Default)]
struct OpcodeRing {
    arrivals: VecDeque<u64>,
}

/// Per-session rate state across all registered opcodes.
#[derive(Debug)]
pub struct RateControl {
    rings: HashMap<u16, OpcodeRing>,
    violations: VecDeque<u64>,
    policy: FloodPolicy,
}

impl RateControl {
    /// Create rate state with the given escalation policy.
    #[must_use]
    pub fn new(policy: FloodPolicy) -> Self {
        Self { rings: HashMap::new(), violations: VecDeque::new(), policy }
    }

    /// Account one packet of `opcode` at `now_ms` against `config`.
    ///
    /// Opcodes without a rate configuration are never throttled; pass
    /// `None` for those (the violation window still applies to them via
    /// [`Self::record_violation`]).
    pub fn check(&mut self, opcode: u16, config: Option<RateConfig>, now_ms: u64) -> RateVerdict {
        let Some(config) = config else {
            return RateVerdict::Allowed;
        };

        let over_budget = {
            let ring = self.rings.entry(opcode).or_default();
            let horizon = now_ms.saturating_sub(config.window_ms());
            while ring.arrivals.front().is_some_and(|&t| t < horizon) {
                ring.arrivals.pop_front();
            }

            if ring.arrivals.len() >= config.burst_limit {
                true
            } else {
                ring.arrivals.push_back(now_ms);
                false
            }
        };

        if over_budget { self.record_violation(now_ms) } else { RateVerdict::Allowed }
    }

    /// Record a violation (throttle, wrong-state opcode, malformed packet)
    /// and report whether it escalates to a flood close.
    pub fn record_violation(&mut self, now_ms: u64) -> RateVerdict {
        let horizon = now_ms.saturating_sub(self.policy.window_ms);
        while self.violations.front().is_some_and(|&t| t < horizon) {
            self.violations.pop_front();
        }

        self.violations.push_back(now_ms);
        if self.violations.len() >= self.policy.threshold {
            RateVerdict::FloodDetected
        } else {
            RateVerdict::Throttled
        }
    }

    /// Violations currently inside the window (diagnostics).
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }
}

/// Soft ban list keyed by peer address, with TTL.
///
/// Consulted at accept time. Entries are purged lazily on lookup and
/// insert, so an idle list costs nothing.
#[derive(Debug)]
pub struct BanList {
    entries: HashMap<IpAddr, u64>,
    ttl_ms: u64,
}

impl BanList {
    /// Create a ban list whose entries last `ttl_ms` milliseconds.
    #[must_use]
    pub fn new(ttl_ms: u64) -> Self {
        Self { entries: HashMap::new(), ttl_ms }
    }

    /// Ban an address starting at `now_ms`.
    pub fn ban(&mut self, addr: IpAddr, now_ms: u64) {
        self.purge(now_ms);
        self.entries.insert(addr, now_ms.saturating_add(self.ttl_ms));
    }

    /// Whether an address is currently banned.
    pub fn is_banned(&mut self, addr: IpAddr, now_ms: u64) -> bool {
        match self.entries.get(&addr) {
            Some(&expires) if expires > now_ms => true,
            Some(_) => {
                self.entries.remove(&addr);
                false
            },
            None => false,
        }
    }

    /// Number of live entries (diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge(&mut self, now_ms: u64) {
        self.entries.retain(|_, &mut expires| expires > now_ms);
    }
}

/// Global protocol counters, one set per server.
///
/// Plain integers mutated from the driver only; exported through the
/// driver's stats snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlowCounters {
    /// Packets rejected by framing, size or state checks.
    pub invalid_packets: u64,
    /// Packets rejected by checksum verification.
    pub checksum_errors: u64,
    /// Packets dropped by rate limiting.
    pub throttled_packets: u64,
}
