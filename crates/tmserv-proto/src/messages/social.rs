//! Party and guild messages.

use super::{BodyError, BodyReader, BodyWriter, NAME_LENGTH};

/// Width of the guild name field.
const GUILD_NAME_LENGTH: usize = 16;

/// Party invite or kick target (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartyTarget {
    /// Character the operation applies to.
    pub target_id: u16,
}

impl PartyTarget {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let target_id = r.u16()?;
        r.skip(2)?;
        Ok(Self { target_id })
    }
}

/// Answer to a party invite (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartyAccept {
    /// Leader whose invite is being answered.
    pub leader_id: u16,
    /// true = join, false = decline.
    pub accept: bool,
}

impl PartyAccept {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let leader_id = r.u16()?;
        let flag = r.u16()?;
        Ok(Self { leader_id, accept: flag != 0 })
    }
}

/// One member of the party roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyMember {
    /// Character entity id.
    pub char_id: u16,
    /// Character name.
    pub name: String,
    /// Character level.
    pub level: u16,
    /// Class identifier.
    pub class_id: u8,
}

/// Party roster (S→C, variable size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyInfo {
    /// Current leader.
    pub leader_id: u16,
    /// All members, leader included.
    pub members: Vec<PartyMember>,
}

impl PartyInfo {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.leader_id);
        w.u16(self.members.len() as u16);
        for member in &self.members {
            w.u16(member.char_id);
            w.u16(member.level);
            w.u8(member.class_id);
            w.reserved(1);
            w.fixed_str(&member.name, NAME_LENGTH);
        }
    }
}

/// Guild summary or member-list request (C→S, variable size).
///
/// The original client pads this packet inconsistently across versions, so
/// only the leading guild id is read and the remainder ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildRequest {
    /// Guild being asked about.
    pub guild_id: u16,
}

impl GuildRequest {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let guild_id = r.u16()?;
        Ok(Self { guild_id })
    }
}

/// Guild summary (S→C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    /// Guild id.
    pub guild_id: u16,
    /// Guild display name.
    pub name: String,
    /// Number of members.
    pub member_count: u16,
    /// Guild level.
    pub level: u16,
    /// Accumulated guild experience.
    pub exp: u32,
}

impl GuildInfo {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.guild_id);
        w.fixed_str(&self.name, GUILD_NAME_LENGTH);
        w.u16(self.member_count);
        w.u16(self.level);
        w.u32(self.exp);
        w.reserved(2);
    }
}

/// One entry of the guild member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    /// Character name.
    pub name: String,
    /// Character level.
    pub level: u8,
    /// Class identifier.
    pub class_id: u8,
    /// Guild rank (0 = leader).
    pub rank: u8,
}

/// Guild member list (S→C, variable size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMembers {
    /// Guild id.
    pub guild_id: u16,
    /// All current members.
    pub members: Vec<GuildMember>,
}

impl GuildMembers {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.guild_id);
        w.u16(self.members.len() as u16);
        for member in &self.members {
            w.fixed_str(&member.name, NAME_LENGTH);
            w.u8(member.level);
            w.u8(member.class_id);
            w.u8(member.rank);
            w.reserved(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ClientMessage, decode_client};
    use crate::opcode::Opcode;
    use crate::packet::Packet;

    #[test]
    fn guild_request_tolerates_trailing_padding() {
        let mut w = BodyWriter::new();
        w.u16(7);
        w.reserved(6); // version-dependent padding
        let packet = Packet::new(Opcode::GuildInfo.to_u16(), 1, w.finish());

        match decode_client(&packet).expect("decodes") {
            ClientMessage::GuildInfo(req) => assert_eq!(req.guild_id, 7),
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn party_accept_flag_maps_to_bool() {
        let mut w = BodyWriter::new();
        w.u16(42);
        w.u16(1);
        let packet = Packet::new(Opcode::PartyAccept.to_u16(), 1, w.finish());

        match decode_client(&packet).expect("decodes") {
            ClientMessage::PartyAccept(m) => {
                assert_eq!(m.leader_id, 42);
                assert!(m.accept);
            },
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn roster_encodings_track_member_count() {
        let party = PartyInfo {
            leader_id: 1,
            members: vec![PartyMember {
                char_id: 1,
                name: "alice".to_string(),
                level: 40,
                class_id: 2,
            }],
        };
        let mut w = BodyWriter::new();
        party.encode(&mut w);
        assert_eq!(w.finish().len(), 4 + 22);

        let guild = GuildMembers {
            guild_id: 9,
            members: vec![
                GuildMember { name: "alice".to_string(), level: 40, class_id: 2, rank: 0 },
                GuildMember { name: "bob".to_string(), level: 35, class_id: 1, rank: 1 },
            ],
        };
        let mut w = BodyWriter::new();
        guild.encode(&mut w);
        assert_eq!(w.finish().len(), 4 + 2 * 20);
    }
}
