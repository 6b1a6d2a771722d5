//! Party and guild handlers.

use tmserv_core::env::Environment;
use tmserv_core::session::LifecycleState;
use tmserv_proto::messages::{game, social as social_msgs};
use tmserv_proto::{ClientMessage, ServerMessage};

use crate::dispatch::HandlerResult;
use crate::driver::{ServerAction, ServerDriver};

impl<E: Environment> ServerDriver<E> {
    /// `PartyInvite`/`PartyAccept`/`PartyKick`/`PartyInfo`.
    pub(crate) fn handle_party(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        match message {
            ClientMessage::PartyInvite(invite) => {
                let Some(target) = self
                    .registry
                    .session_by_char_id(invite.target_id)
                    .filter(|&sid| sid != session_id)
                else {
                    return HandlerResult::Ok;
                };

                let target_ready = self.registry.get(target).is_some_and(|e| {
                    e.session.state() == LifecycleState::InGame && e.party.is_none()
                });
                if !target_ready {
                    return HandlerResult::Ok;
                }

                let inviter_name = self
                    .registry
                    .get(session_id)
                    .and_then(|e| e.character.as_ref())
                    .map(|c| c.name.clone());
                let Some(inviter_name) = inviter_name else { return HandlerResult::Ok };

                if let Some(entry) = self.registry.get_mut(target) {
                    entry.pending_invite = Some(session_id);
                }

                // The invite reaches the target as a system whisper; the
                // legacy client renders it as a dialog.
                let notice = ServerMessage::Chat(game::Chat {
                    chat_type: game::ChatType::Whisper,
                    name: inviter_name,
                    message: "invites you to a party".to_string(),
                });
                self.send_to(target, notice, actions);
            },
            ClientMessage::PartyAccept(answer) => {
                let Some(inviter) =
                    self.registry.get(session_id).and_then(|e| e.pending_invite)
                else {
                    return HandlerResult::Ok;
                };
                if let Some(entry) = self.registry.get_mut(session_id) {
                    entry.pending_invite = None;
                }
                if !answer.accept {
                    return HandlerResult::Ok;
                }

                // The inviter may have vanished between invite and answer.
                if self.registry.get(inviter).is_none() {
                    return HandlerResult::Ok;
                }

                let party_id = match self.registry.get(inviter).and_then(|e| e.party) {
                    Some(existing) => existing,
                    None => self.registry.create_party(inviter),
                };
                self.registry.join_party(party_id, session_id);
                self.broadcast_roster(party_id, actions);
            },
            ClientMessage::PartyKick(kick) => {
                let Some(party_id) = self.registry.get(session_id).and_then(|e| e.party) else {
                    return HandlerResult::Ok;
                };
                // Only the leader kicks.
                if self.registry.party_leader(party_id) != Some(session_id) {
                    return HandlerResult::Ok;
                }
                let Some(target) = self.registry.session_by_char_id(kick.target_id) else {
                    return HandlerResult::Ok;
                };
                if target == session_id {
                    return HandlerResult::Ok;
                }

                self.registry.leave_party(target);
                self.broadcast_roster(party_id, actions);
            },
            ClientMessage::PartyInfo => {
                let Some(party_id) = self.registry.get(session_id).and_then(|e| e.party) else {
                    let empty = ServerMessage::PartyInfo(social_msgs::PartyInfo {
                        leader_id: 0,
                        members: Vec::new(),
                    });
                    self.send_to(session_id, empty, actions);
                    return HandlerResult::Ok;
                };
                let roster = self.build_roster(party_id);
                self.send_to(session_id, roster, actions);
            },
            _ => {},
        }
        HandlerResult::Ok
    }

    fn build_roster(&self, party_id: u32) -> ServerMessage {
        let members = self.registry.party_members(party_id);
        let leader_id = members
            .first()
            .and_then(|&sid| self.registry.get(sid))
            .and_then(|e| e.character.as_ref())
            .map_or(0, |c| c.char_id);

        let roster = members
            .iter()
            .filter_map(|&sid| {
                let character = self.registry.get(sid)?.character.as_ref()?;
                Some(social_msgs::PartyMember {
                    char_id: character.char_id,
                    name: character.name.clone(),
                    level: character.level,
                    class_id: character.class_id,
                })
            })
            .collect();

        ServerMessage::PartyInfo(social_msgs::PartyInfo { leader_id, members: roster })
    }

    fn broadcast_roster(&mut self, party_id: u32, actions: &mut Vec<ServerAction>) {
        let roster = self.build_roster(party_id);
        let deliveries = self.router.to_party(&self.registry, party_id, &roster, None);
        for (sid, packet) in deliveries {
            actions.push(ServerAction::Send { session_id: sid, packet });
        }
    }

    /// `GuildInfo`/`GuildMembers`.
    pub(crate) fn handle_guild(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        match message {
            ClientMessage::GuildInfo(request) => {
                let members = self.guild_roster(request.guild_id);
                let info = ServerMessage::GuildInfo(social_msgs::GuildInfo {
                    guild_id: request.guild_id,
                    name: format!("Guild {}", request.guild_id),
                    member_count: members.len() as u16,
                    level: 1,
                    exp: 0,
                });
                self.send_to(session_id, info, actions);
            },
            ClientMessage::GuildMembers(request) => {
                let members = self.guild_roster(request.guild_id);
                let list = ServerMessage::GuildMembers(social_msgs::GuildMembers {
                    guild_id: request.guild_id,
                    members,
                });
                self.send_to(session_id, list, actions);
            },
            _ => {},
        }
        HandlerResult::Ok
    }

    /// Online members of a guild, from the session registry.
    ///
    /// The guild collaborator owns offline membership; the online view is
    /// what the legacy member-list window shows first.
    fn guild_roster(&self, guild_id: u16) -> Vec<social_msgs::GuildMember> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|sid| {
                let character = self.registry.get(sid)?.character.as_ref()?;
                (character.guild == Some(guild_id)).then(|| social_msgs::GuildMember {
                    name: character.name.clone(),
                    level: character.level.min(255) as u8,
                    class_id: character.class_id,
                    rank: 1,
                })
            })
            .collect()
    }
}
