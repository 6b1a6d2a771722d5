//! Broadcast routing.
//!
//! Resolves a message plus a scope (one session, an area, a party, a
//! guild, everyone) into concrete `(session, packet)` deliveries. Each
//! destination gets its own packet because the header carries the
//! recipient's client id.
//!
//! Destination order within one call is deterministic: area queries return
//! sorted entity ids and the other scopes iterate sorted session ids. No
//! ordering is promised across separate calls; per-session delivery order
//! is the outbound queue's job.

use std::ops::Sub;
use std::time::Duration;

use tmserv_proto::{Packet, ServerMessage};
use tmserv_world::AreaIndex;
use tmserv_world::entity::{EntityId, MOB_ID_BASE, MapId};

use crate::registry::SessionRegistry;
use tmserv_core::session::LifecycleState;

/// One resolved delivery.
pub type Delivery = (u32, Packet);

/// Scope resolver for outbound messages.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastRouter {
    /// Radius used for "visible area" scoping.
    pub view_radius: u16,
}

impl BroadcastRouter {
    /// Create a router with the given view radius.
    #[must_use]
    pub fn new(view_radius: u16) -> Self {
        Self { view_radius }
    }

    /// Address one session directly, in any state before `Closing`.
    pub fn send<I>(
        &self,
        registry: &SessionRegistry<I>,
        session_id: u32,
        message: ServerMessage,
    ) -> Vec<Delivery>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let Some(entry) = registry.get(session_id) else { return Vec::new() };
        if matches!(entry.session.state(), LifecycleState::Closing | LifecycleState::Closed) {
            return Vec::new();
        }
        vec![(session_id, message.into_packet(entry.client_id))]
    }

    /// Fan out to every in-game character within `radius` of a point.
    #[allow(clippy::too_many_arguments)]
    pub fn to_area<I>(
        &self,
        registry: &SessionRegistry<I>,
        area: &AreaIndex,
        map: MapId,
        x: u16,
        y: u16,
        radius: u16,
        message: &ServerMessage,
        except: Option<u32>,
    ) -> Vec<Delivery>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        area.query_radius(map, x, y, radius)
            .into_iter()
            .filter(|&id| id < MOB_ID_BASE)
            .filter_map(|char_id: EntityId| registry.session_by_char_id(char_id))
            .filter(|&sid| except != Some(sid))
            .filter_map(|sid| {
                let entry = registry.get(sid)?;
                (entry.session.state() == LifecycleState::InGame)
                    .then(|| (sid, message.clone().into_packet(entry.client_id)))
            })
            .collect()
    }

    /// Fan out to the visible area around a point using the configured
    /// view radius.
    #[allow(clippy::too_many_arguments)]
    pub fn to_view<I>(
        &self,
        registry: &SessionRegistry<I>,
        area: &AreaIndex,
        map: MapId,
        x: u16,
        y: u16,
        message: &ServerMessage,
        except: Option<u32>,
    ) -> Vec<Delivery>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        self.to_area(registry, area, map, x, y, self.view_radius, message, except)
    }

    /// Fan out to every member of a party.
    pub fn to_party<I>(
        &self,
        registry: &SessionRegistry<I>,
        party_id: u32,
        message: &ServerMessage,
        except: Option<u32>,
    ) -> Vec<Delivery>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let mut members = registry.party_members(party_id);
        members.sort_unstable();
        members
            .into_iter()
            .filter(|&sid| except != Some(sid))
            .filter_map(|sid| {
                let entry = registry.get(sid)?;
                (entry.session.state() == LifecycleState::InGame)
                    .then(|| (sid, message.clone().into_packet(entry.client_id)))
            })
            .collect()
    }

    /// Fan out to every in-game member of a guild.
    pub fn to_guild<I>(
        &self,
        registry: &SessionRegistry<I>,
        guild_id: u16,
        message: &ServerMessage,
        except: Option<u32>,
    ) -> Vec<Delivery>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        registry
            .ids()
            .into_iter()
            .filter(|&sid| except != Some(sid))
            .filter_map(|sid| {
                let entry = registry.get(sid)?;
                let in_guild =
                    entry.character.as_ref().is_some_and(|c| c.guild == Some(guild_id));
                (in_guild && entry.session.state() == LifecycleState::InGame)
                    .then(|| (sid, message.clone().into_packet(entry.client_id)))
            })
            .collect()
    }

    /// Fan out to every in-game session.
    pub fn to_all<I>(
        &self,
        registry: &SessionRegistry<I>,
        message: &ServerMessage,
        except: Option<u32>,
    ) -> Vec<Delivery>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        registry
            .ids()
            .into_iter()
            .filter(|&sid| except != Some(sid))
            .filter_map(|sid| {
                let entry = registry.get(sid)?;
                (entry.session.state() == LifecycleState::InGame)
                    .then(|| (sid, message.clone().into_packet(entry.client_id)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Instant;

    use tmserv_core::rate::FloodPolicy;
    use tmserv_core::session::{
        AccountIdentity, CharacterIdentity, Session, SessionConfig,
    };
    use tmserv_proto::messages::game::{Chat, ChatType};
    use tmserv_world::entity::{CombatStats, Position, Vitals};

    use super::*;
    use crate::registry::CharacterRecord;

    fn peer() -> SocketAddr {
        "198.51.100.10:40000".parse().expect("addr")
    }

    fn in_game_session(now: Instant) -> Session<Instant> {
        let mut s = Session::new(now, SessionConfig::default());
        s.handshake_sent().expect("transition");
        s.protocol_acknowledged().expect("transition");
        s.authenticate(AccountIdentity { account_id: 1, name: "acct".into(), permission: 0 })
            .expect("transition");
        s.character_list_sent().expect("transition");
        s.begin_world_entry(CharacterIdentity { char_id: 0, name: "char".into() })
            .expect("transition");
        s.complete_world_entry().expect("transition");
        s
    }

    fn add_character(
        registry: &mut SessionRegistry<Instant>,
        area: &mut AreaIndex,
        char_id: u16,
        name: &str,
        map: u16,
        x: u16,
        y: u16,
    ) -> u32 {
        let now = Instant::now();
        let sid = u32::from(char_id);
        assert!(registry.create(sid, peer(), in_game_session(now), 0, 0, FloodPolicy::default()));
        let position = Position { map, x, y };
        registry.bind_character(sid, CharacterRecord {
            char_id,
            name: name.to_string(),
            class_id: 0,
            level: 1,
            position,
            vitals: Vitals::full(100, 0),
            stats: CombatStats { attack: 1, defense: 1, level: 1 },
            guild: None,
            gold: 0,
        });
        area.update(char_id, position);
        sid
    }

    fn chat() -> ServerMessage {
        ServerMessage::Chat(Chat {
            chat_type: ChatType::Local,
            name: "alice".to_string(),
            message: "hi".to_string(),
        })
    }

    #[test]
    fn area_scope_respects_radius_and_except() {
        let mut registry = SessionRegistry::new();
        let mut area = AreaIndex::new();

        let a = add_character(&mut registry, &mut area, 1, "a", 1, 100, 100);
        let b = add_character(&mut registry, &mut area, 2, "b", 1, 105, 103);
        let c = add_character(&mut registry, &mut area, 3, "c", 1, 200, 200);

        let router = BroadcastRouter::new(16);
        let deliveries =
            router.to_area(&registry, &area, 1, 100, 100, 16, &chat(), Some(a));

        let targets: Vec<u32> = deliveries.iter().map(|(sid, _)| *sid).collect();
        assert_eq!(targets, vec![b]);
        assert!(!targets.contains(&c));
    }

    #[test]
    fn guild_scope_filters_membership() {
        let mut registry = SessionRegistry::new();
        let mut area = AreaIndex::new();

        let a = add_character(&mut registry, &mut area, 1, "a", 1, 10, 10);
        let b = add_character(&mut registry, &mut area, 2, "b", 1, 20, 20);
        if let Some(entry) = registry.get_mut(a) {
            if let Some(c) = entry.character.as_mut() {
                c.guild = Some(7);
            }
        }

        let router = BroadcastRouter::new(16);
        let deliveries = router.to_guild(&registry, 7, &chat(), None);
        let targets: Vec<u32> = deliveries.iter().map(|(sid, _)| *sid).collect();
        assert_eq!(targets, vec![a]);
        let _ = b;
    }

    #[test]
    fn packets_carry_the_recipient_client_id() {
        let mut registry = SessionRegistry::new();
        let mut area = AreaIndex::new();

        let a = add_character(&mut registry, &mut area, 1, "a", 1, 10, 10);
        let b = add_character(&mut registry, &mut area, 2, "b", 1, 12, 12);

        let router = BroadcastRouter::new(16);
        let deliveries = router.to_all(&registry, &chat(), None);
        assert_eq!(deliveries.len(), 2);

        for (sid, packet) in deliveries {
            let expected = registry.get(sid).expect("present").client_id;
            assert_eq!(packet.header.client_id(), expected);
        }
        let _ = (a, b);
    }

    #[test]
    fn closing_sessions_receive_nothing() {
        let mut registry = SessionRegistry::new();
        let mut area = AreaIndex::new();
        let a = add_character(&mut registry, &mut area, 1, "a", 1, 10, 10);

        let now = Instant::now();
        registry
            .get_mut(a)
            .expect("present")
            .session
            .begin_close(tmserv_core::CloseReason::ClientLogout, now);

        let router = BroadcastRouter::new(16);
        assert!(router.send(&registry, a, chat()).is_empty());
        assert!(router.to_all(&registry, &chat(), None).is_empty());
    }
}
