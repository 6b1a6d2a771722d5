//! Typed message layouts.
//!
//! Each opcode's payload layout is written once, as an explicit byte-level
//! encode/decode pair, in one of the submodules. [`ClientMessage`] covers
//! everything a client may send; [`ServerMessage`] everything the server
//! emits. The split keeps the inbound size table honest: opcodes that exist
//! in both directions (chat, party info, guild info) have different layouts
//! per direction and the decoder only ever sees the client-side one.
//!
//! String fields are fixed-width ASCII, NUL-padded, exactly as the original
//! client lays them out.

pub mod game;
pub mod item;
pub mod session;
pub mod social;

use bytes::Bytes;

use crate::{
    error::ProtocolError,
    opcode::Opcode,
    packet::Packet,
};

/// Fixed width of account, password and character name fields.
pub const NAME_LENGTH: usize = 16;

/// Fixed width of a chat line.
pub const CHAT_MESSAGE_LENGTH: usize = 128;

/// Inbound packet sizes, header included. Referenced by the opcode table.
pub mod wire {
    use crate::header::PacketHeader;

    const H: u16 = PacketHeader::SIZE as u16;

    /// `AccountLogin`: account[16] + password[16] + version + reserved.
    pub const ACCOUNT_LOGIN_SIZE: u16 = H + 36;
    /// `CharacterLogin`: name[16] + reserved.
    pub const CHARACTER_LOGIN_SIZE: u16 = H + 18;
    /// `KeepAlive`: client time + reserved.
    pub const KEEP_ALIVE_SIZE: u16 = H + 6;
    /// `Logout`: reserved dword.
    pub const LOGOUT_SIZE: u16 = H + 4;
    /// `Move`: position, destination, speed, move type.
    pub const MOVE_SIZE: u16 = H + 12;
    /// `Attack`: target, skill, reserved dword.
    pub const ATTACK_SIZE: u16 = H + 8;
    /// `SkillUse`: skill, parameter, target position, target id, reserved.
    pub const SKILL_USE_SIZE: u16 = H + 12;
    /// `Chat`: type + speaker[16] + message[128].
    pub const CHAT_SIZE: u16 = H + 146;
    /// `ItemUse`/`ItemEquip`/`ItemRemove`: source, destination, reserved.
    pub const ITEM_SLOT_PAIR_SIZE: u16 = H + 6;
    /// `ItemDrop`: slot, position, reserved.
    pub const ITEM_DROP_SIZE: u16 = H + 8;
    /// `ItemGet`: ground id + reserved.
    pub const ITEM_GET_SIZE: u16 = H + 4;
    /// `ShopOpen`: npc id + reserved.
    pub const SHOP_OPEN_SIZE: u16 = H + 4;
    /// Requests that carry only a reserved word.
    pub const BARE_REQUEST_SIZE: u16 = H + 2;
    /// `ShopBuy`: shop slot, quantity, reserved.
    pub const SHOP_BUY_SIZE: u16 = H + 6;
    /// `ShopSell`: inventory slot + reserved.
    pub const SHOP_SELL_SIZE: u16 = H + 4;
    /// `StoragePut`/`StorageGet`: two slots + reserved.
    pub const STORAGE_MOVE_SIZE: u16 = H + 6;
    /// `TradeStart`: target id + reserved.
    pub const TRADE_START_SIZE: u16 = H + 4;
    /// `TradeSetItem`: inventory slot, trade slot, reserved.
    pub const TRADE_SET_ITEM_SIZE: u16 = H + 6;
    /// `TradeSetGold`: gold dword + reserved.
    pub const TRADE_SET_GOLD_SIZE: u16 = H + 6;
    /// `TradeAccept`: accept flag + reserved.
    pub const TRADE_ACCEPT_SIZE: u16 = H + 4;
    /// `PartyInvite`/`PartyKick`: target id + reserved.
    pub const PARTY_TARGET_SIZE: u16 = H + 4;
    /// `PartyAccept`: leader id + accept flag.
    pub const PARTY_ACCEPT_SIZE: u16 = H + 4;
    /// `GmCommand`: command[128].
    pub const GM_COMMAND_SIZE: u16 = H + 128;
}

/// Payload-level decode failure, without opcode context.
///
/// [`decode_client`] attaches the opcode and converts to [`ProtocolError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// Fewer bytes than the layout requires.
    Truncated {
        /// Bytes the layout requires
        needed: usize,
        /// Bytes actually present
        available: usize,
    },
    /// Bytes present but content invalid for the message.
    Invalid(&'static str),
}

/// Sequential little-endian payload reader.
#[derive(Debug)]
pub struct BodyReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> BodyReader<'a> {
    /// Wrap a payload slice.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BodyError> {
        let end = self.at.checked_add(n).ok_or(BodyError::Invalid("length overflow"))?;
        if end > self.buf.len() {
            return Err(BodyError::Truncated { needed: end, available: self.buf.len() });
        }
        let out = &self.buf[self.at..end];
        self.at = end;
        Ok(out)
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, BodyError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn u16(&mut self) -> Result<u16, BodyError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32.
    pub fn u32(&mut self) -> Result<u32, BodyError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read and discard reserved bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), BodyError> {
        self.take(n).map(|_| ())
    }

    /// Read a fixed-width NUL-padded ASCII string field.
    pub fn fixed_str(&mut self, width: usize) -> Result<String, BodyError> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
        if !raw[..end].is_ascii() {
            return Err(BodyError::Invalid("non-ascii name field"));
        }
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

/// Sequential little-endian payload writer.
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: Vec<u8>,
}

impl BodyWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte.
    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Append a little-endian u16.
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian u32.
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append zeroed reserved bytes.
    pub fn reserved(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    /// Append a fixed-width NUL-padded string field, truncating if needed.
    pub fn fixed_str(&mut self, s: &str, width: usize) {
        let bytes = s.as_bytes();
        let n = bytes.len().min(width);
        self.buf.extend_from_slice(&bytes[..n]);
        self.reserved(width - n);
    }

    /// Finish and take the payload bytes.
    #[must_use]
    pub fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

/// Every message a client may send, decoded from a validated packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Account credentials.
    AccountLogin(session::AccountLogin),
    /// Character selection.
    CharacterLogin(session::CharacterLogin),
    /// Activity refresh carrying the client clock.
    KeepAlive(session::KeepAlive),
    /// Graceful logout request.
    Logout,
    /// Movement request.
    Move(game::Move),
    /// Attack request.
    Attack(game::Attack),
    /// Skill cast request.
    SkillUse(game::SkillUse),
    /// Chat line.
    Chat(game::Chat),
    /// GM console command.
    GmCommand(game::GmCommand),
    /// Consume or apply an item.
    ItemUse(item::SlotPair),
    /// Equip an item.
    ItemEquip(item::SlotPair),
    /// Unequip an item.
    ItemRemove(item::SlotPair),
    /// Drop an item on the ground.
    ItemDrop(item::ItemDrop),
    /// Pick an item up.
    ItemGet(item::ItemGet),
    /// Open an NPC shop.
    ShopOpen(item::ShopOpen),
    /// Close the open shop.
    ShopClose,
    /// Buy from the open shop.
    ShopBuy(item::ShopBuy),
    /// Sell to the open shop.
    ShopSell(item::ShopSell),
    /// Open account storage.
    StorageOpen,
    /// Put an item into storage.
    StoragePut(item::StorageMove),
    /// Take an item out of storage.
    StorageGet(item::StorageMove),
    /// Close storage.
    StorageClose,
    /// Propose a trade.
    TradeStart(item::TradeStart),
    /// Offer an item in the trade window.
    TradeSetItem(item::TradeSetItem),
    /// Offer gold in the trade window.
    TradeSetGold(item::TradeSetGold),
    /// Accept or retract acceptance.
    TradeAccept(item::TradeAccept),
    /// Abort the trade.
    TradeCancel,
    /// Invite to party.
    PartyInvite(social::PartyTarget),
    /// Answer a party invite.
    PartyAccept(social::PartyAccept),
    /// Kick from party.
    PartyKick(social::PartyTarget),
    /// Request the party roster.
    PartyInfo,
    /// Request a guild summary.
    GuildInfo(social::GuildRequest),
    /// Request a guild member list.
    GuildMembers(social::GuildRequest),
}

/// Decode a client packet payload into a typed message.
///
/// The payload must already be deciphered. Size validation against the
/// opcode table happens in the dispatcher before this call; the decoders
/// still bounds-check every read so a variable-size payload cannot overrun.
///
/// # Errors
///
/// - [`ProtocolError::UnknownOpcode`] for uncatalogued opcodes
/// - [`ProtocolError::TruncatedPayload`] / [`ProtocolError::InvalidPayload`]
///   from the per-message decoders
pub fn decode_client(packet: &Packet) -> Result<ClientMessage, ProtocolError> {
    let raw_opcode = packet.opcode();
    let opcode = Opcode::from_u16(raw_opcode).ok_or(ProtocolError::UnknownOpcode(raw_opcode))?;

    let mut r = BodyReader::new(&packet.payload);
    let result = match opcode {
        Opcode::AccountLogin => session::AccountLogin::decode(&mut r).map(ClientMessage::AccountLogin),
        Opcode::CharacterLogin => {
            session::CharacterLogin::decode(&mut r).map(ClientMessage::CharacterLogin)
        },
        Opcode::KeepAlive => session::KeepAlive::decode(&mut r).map(ClientMessage::KeepAlive),
        Opcode::Logout => Ok(ClientMessage::Logout),
        Opcode::Move => game::Move::decode(&mut r).map(ClientMessage::Move),
        Opcode::Attack => game::Attack::decode(&mut r).map(ClientMessage::Attack),
        Opcode::SkillUse => game::SkillUse::decode(&mut r).map(ClientMessage::SkillUse),
        Opcode::Chat => game::Chat::decode(&mut r).map(ClientMessage::Chat),
        Opcode::GmCommand => game::GmCommand::decode(&mut r).map(ClientMessage::GmCommand),
        Opcode::ItemUse => item::SlotPair::decode(&mut r).map(ClientMessage::ItemUse),
        Opcode::ItemEquip => item::SlotPair::decode(&mut r).map(ClientMessage::ItemEquip),
        Opcode::ItemRemove => item::SlotPair::decode(&mut r).map(ClientMessage::ItemRemove),
        Opcode::ItemDrop => item::ItemDrop::decode(&mut r).map(ClientMessage::ItemDrop),
        Opcode::ItemGet => item::ItemGet::decode(&mut r).map(ClientMessage::ItemGet),
        Opcode::ShopOpen => item::ShopOpen::decode(&mut r).map(ClientMessage::ShopOpen),
        Opcode::ShopClose => Ok(ClientMessage::ShopClose),
        Opcode::ShopBuy => item::ShopBuy::decode(&mut r).map(ClientMessage::ShopBuy),
        Opcode::ShopSell => item::ShopSell::decode(&mut r).map(ClientMessage::ShopSell),
        Opcode::StorageOpen => Ok(ClientMessage::StorageOpen),
        Opcode::StoragePut => item::StorageMove::decode(&mut r).map(ClientMessage::StoragePut),
        Opcode::StorageGet => item::StorageMove::decode(&mut r).map(ClientMessage::StorageGet),
        Opcode::StorageClose => Ok(ClientMessage::StorageClose),
        Opcode::TradeStart => item::TradeStart::decode(&mut r).map(ClientMessage::TradeStart),
        Opcode::TradeSetItem => item::TradeSetItem::decode(&mut r).map(ClientMessage::TradeSetItem),
        Opcode::TradeSetGold => item::TradeSetGold::decode(&mut r).map(ClientMessage::TradeSetGold),
        Opcode::TradeAccept => item::TradeAccept::decode(&mut r).map(ClientMessage::TradeAccept),
        Opcode::TradeCancel => Ok(ClientMessage::TradeCancel),
        Opcode::PartyInvite => social::PartyTarget::decode(&mut r).map(ClientMessage::PartyInvite),
        Opcode::PartyAccept => social::PartyAccept::decode(&mut r).map(ClientMessage::PartyAccept),
        Opcode::PartyKick => social::PartyTarget::decode(&mut r).map(ClientMessage::PartyKick),
        Opcode::PartyInfo => Ok(ClientMessage::PartyInfo),
        Opcode::GuildInfo => social::GuildRequest::decode(&mut r).map(ClientMessage::GuildInfo),
        Opcode::GuildMembers => social::GuildRequest::decode(&mut r).map(ClientMessage::GuildMembers),

        Opcode::Initial
        | Opcode::CharacterList
        | Opcode::AccountLoginResponse
        | Opcode::CharacterLoginResponse
        | Opcode::ItemResult
        | Opcode::ShopList
        | Opcode::StorageResult
        | Opcode::TradeResult
        | Opcode::MoveNotify
        | Opcode::EntitySpawn
        | Opcode::EntityDespawn
        | Opcode::EffectNotify
        | Opcode::AttackResult
        | Opcode::SkillResult => Err(BodyError::Invalid("server-to-client opcode")),
    };

    result.map_err(|e| match e {
        BodyError::Truncated { needed, available } => {
            ProtocolError::TruncatedPayload { opcode: raw_opcode, needed, available }
        },
        BodyError::Invalid(detail) => ProtocolError::InvalidPayload { opcode: raw_opcode, detail },
    })
}

/// Every message the server emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Handshake: protocol version plus cipher material.
    Initial(session::Initial),
    /// Login verdict.
    AccountLoginResponse(session::AccountLoginResponse),
    /// Character roster.
    CharacterList(session::CharacterList),
    /// World-entry verdict and character snapshot.
    CharacterLoginResponse(session::CharacterLoginResponse),
    /// Keep-alive echo.
    KeepAlive(session::KeepAlive),
    /// Another entity moved.
    MoveNotify(game::MoveNotify),
    /// Resolved attack outcome.
    AttackResult(game::AttackResult),
    /// Skill cast verdict.
    SkillResult(game::SkillResult),
    /// Chat line fan-out.
    Chat(game::Chat),
    /// Item operation verdict.
    ItemResult(item::ItemResult),
    /// Shop inventory listing.
    ShopList(item::ShopList),
    /// Storage operation verdict.
    StorageResult(item::StorageResult),
    /// Trade operation verdict.
    TradeResult(item::TradeResult),
    /// Party roster.
    PartyInfo(social::PartyInfo),
    /// Guild summary.
    GuildInfo(social::GuildInfo),
    /// Guild member list.
    GuildMembers(social::GuildMembers),
    /// Entity entered visual range.
    EntitySpawn(game::EntitySpawn),
    /// Entity left visual range.
    EntityDespawn(game::EntityDespawn),
    /// Effect change on a visible entity.
    EffectNotify(game::EffectNotify),
}

impl ServerMessage {
    /// Opcode this message is carried under.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Initial(_) => Opcode::Initial,
            Self::AccountLoginResponse(_) => Opcode::AccountLoginResponse,
            Self::CharacterList(_) => Opcode::CharacterList,
            Self::CharacterLoginResponse(_) => Opcode::CharacterLoginResponse,
            Self::KeepAlive(_) => Opcode::KeepAlive,
            Self::MoveNotify(_) => Opcode::MoveNotify,
            Self::AttackResult(_) => Opcode::AttackResult,
            Self::SkillResult(_) => Opcode::SkillResult,
            Self::Chat(_) => Opcode::Chat,
            Self::ItemResult(_) => Opcode::ItemResult,
            Self::ShopList(_) => Opcode::ShopList,
            Self::StorageResult(_) => Opcode::StorageResult,
            Self::TradeResult(_) => Opcode::TradeResult,
            Self::PartyInfo(_) => Opcode::PartyInfo,
            Self::GuildInfo(_) => Opcode::GuildInfo,
            Self::GuildMembers(_) => Opcode::GuildMembers,
            Self::EntitySpawn(_) => Opcode::EntitySpawn,
            Self::EntityDespawn(_) => Opcode::EntityDespawn,
            Self::EffectNotify(_) => Opcode::EffectNotify,
        }
    }

    /// Encode the payload bytes for this message.
    #[must_use]
    pub fn encode_body(&self) -> Bytes {
        let mut w = BodyWriter::new();
        match self {
            Self::Initial(m) => m.encode(&mut w),
            Self::AccountLoginResponse(m) => m.encode(&mut w),
            Self::CharacterList(m) => m.encode(&mut w),
            Self::CharacterLoginResponse(m) => m.encode(&mut w),
            Self::KeepAlive(m) => m.encode(&mut w),
            Self::MoveNotify(m) => m.encode(&mut w),
            Self::AttackResult(m) => m.encode(&mut w),
            Self::SkillResult(m) => m.encode(&mut w),
            Self::Chat(m) => m.encode(&mut w),
            Self::ItemResult(m) => m.encode(&mut w),
            Self::ShopList(m) => m.encode(&mut w),
            Self::StorageResult(m) => m.encode(&mut w),
            Self::TradeResult(m) => m.encode(&mut w),
            Self::PartyInfo(m) => m.encode(&mut w),
            Self::GuildInfo(m) => m.encode(&mut w),
            Self::GuildMembers(m) => m.encode(&mut w),
            Self::EntitySpawn(m) => m.encode(&mut w),
            Self::EntityDespawn(m) => m.encode(&mut w),
            Self::EffectNotify(m) => m.encode(&mut w),
        }
        w.finish()
    }

    /// Build a complete packet addressed to one client.
    #[must_use]
    pub fn into_packet(self, client_id: u16) -> Packet {
        Packet::new(self.opcode().to_u16(), client_id, self.encode_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_str_round_trip() {
        let mut w = BodyWriter::new();
        w.fixed_str("alice", NAME_LENGTH);
        let bytes = w.finish();
        assert_eq!(bytes.len(), NAME_LENGTH);

        let mut r = BodyReader::new(&bytes);
        assert_eq!(r.fixed_str(NAME_LENGTH).expect("reads"), "alice");
    }

    #[test]
    fn fixed_str_truncates_overlong_input() {
        let mut w = BodyWriter::new();
        w.fixed_str("a-very-long-character-name", NAME_LENGTH);
        let bytes = w.finish();
        assert_eq!(bytes.len(), NAME_LENGTH);
    }

    #[test]
    fn reader_rejects_overrun() {
        let mut r = BodyReader::new(&[1, 2]);
        assert!(matches!(r.u32(), Err(BodyError::Truncated { needed: 4, available: 2 })));
    }

    #[test]
    fn server_opcode_inbound_is_rejected() {
        let packet = Packet::new(Opcode::AttackResult.to_u16(), 1, vec![0u8; 14]);
        assert!(matches!(
            decode_client(&packet),
            Err(ProtocolError::InvalidPayload { detail: "server-to-client opcode", .. })
        ));
    }
}
