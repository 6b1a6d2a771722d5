//! Opcode catalogue.
//!
//! Every packet kind the server understands, with its expected inbound size.
//! The catalogue is closed: an opcode outside this enum is `UnknownOpcode`
//! and closes the connection. Opcodes whose original size table was
//! incomplete are registered as [`InboundSize::Variable`] and validated by
//! their handlers.

/// Expected size rule for client-to-server packets of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundSize {
    /// Total packet size (header included) must equal this value.
    Fixed(u16),
    /// Size varies; the message decoder validates internally.
    Variable,
    /// Never legal from a client; server-to-client only.
    ServerOnly,
}

/// 16-bit packet kind identifier.
///
/// Values are wire-compatible with the legacy client. `Initial` and
/// `AccountLogin` are pinned by the original protocol; the rest of the
/// catalogue is assigned in stable per-subsystem blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Handshake packet carrying protocol version and cipher material (S→C).
    Initial = 0x0101,
    /// Account credentials (C→S).
    AccountLogin = 0x010D,
    /// Character roster after authentication (S→C, variable).
    CharacterList = 0x010F,
    /// Login verdict (S→C).
    AccountLoginResponse = 0x011D,
    /// Activity refresh and RTT echo.
    KeepAlive = 0x0176,
    /// Character selection (C→S).
    CharacterLogin = 0x0213,
    /// World-entry verdict and character snapshot (S→C).
    CharacterLoginResponse = 0x0223,

    /// Consume or apply an inventory item.
    ItemUse = 0x0281,
    /// Move an item from inventory to an equipment slot.
    ItemEquip = 0x0282,
    /// Move an item from equipment back to inventory.
    ItemRemove = 0x0283,
    /// Drop an item on the ground.
    ItemDrop = 0x0284,
    /// Pick an item up from the ground.
    ItemGet = 0x0285,
    /// Generic item operation verdict (S→C).
    ItemResult = 0x028F,

    /// Open an NPC shop.
    ShopOpen = 0x0291,
    /// Close the open shop.
    ShopClose = 0x0292,
    /// Buy from the open shop.
    ShopBuy = 0x0293,
    /// Sell to the open shop.
    ShopSell = 0x0294,
    /// Shop inventory listing (S→C, variable).
    ShopList = 0x029F,

    /// Open account storage.
    StorageOpen = 0x02A1,
    /// Put an item into storage.
    StoragePut = 0x02A2,
    /// Take an item out of storage.
    StorageGet = 0x02A3,
    /// Close storage.
    StorageClose = 0x02A4,
    /// Storage operation verdict (S→C).
    StorageResult = 0x02AF,

    /// Propose a trade to another character.
    TradeStart = 0x02B1,
    /// Place an item into the trade window.
    TradeSetItem = 0x02B2,
    /// Set offered gold.
    TradeSetGold = 0x02B3,
    /// Accept the current trade state.
    TradeAccept = 0x02B4,
    /// Abort the trade.
    TradeCancel = 0x02B5,
    /// Trade operation verdict (S→C).
    TradeResult = 0x02BF,

    /// Invite a character to the party.
    PartyInvite = 0x02C1,
    /// Answer a party invite.
    PartyAccept = 0x02C2,
    /// Remove a member from the party.
    PartyKick = 0x02C3,
    /// Party roster request (C→S) or roster payload (S→C, variable).
    PartyInfo = 0x02C4,

    /// Guild summary request (C→S) or summary payload (S→C).
    GuildInfo = 0x02D1,
    /// Guild member list (variable both directions).
    GuildMembers = 0x02D2,

    /// Chat line (both directions).
    Chat = 0x0333,

    /// Movement request (C→S).
    Move = 0x0366,
    /// Movement of another entity (S→C).
    MoveNotify = 0x0367,
    /// An entity entered visual range (S→C).
    EntitySpawn = 0x0371,
    /// An entity left visual range or died (S→C).
    EntityDespawn = 0x0372,
    /// Effect applied or removed on a visible entity (S→C).
    EffectNotify = 0x0373,

    /// Basic or skill-tagged attack request (C→S).
    Attack = 0x039D,
    /// Resolved attack outcome (S→C, broadcast to observers).
    AttackResult = 0x039E,
    /// Targeted or ground skill cast (C→S).
    SkillUse = 0x03A1,
    /// Skill cast verdict (S→C).
    SkillResult = 0x03A2,

    /// GM console command (requires permission).
    GmCommand = 0x03E8,

    /// Graceful logout request (C→S).
    Logout = 0x0FDE,
}

impl Opcode {
    /// All catalogued opcodes, in wire-value order.
    pub const ALL: &'static [Self] = &[
        Self::Initial,
        Self::AccountLogin,
        Self::CharacterList,
        Self::AccountLoginResponse,
        Self::KeepAlive,
        Self::CharacterLogin,
        Self::CharacterLoginResponse,
        Self::ItemUse,
        Self::ItemEquip,
        Self::ItemRemove,
        Self::ItemDrop,
        Self::ItemGet,
        Self::ItemResult,
        Self::ShopOpen,
        Self::ShopClose,
        Self::ShopBuy,
        Self::ShopSell,
        Self::ShopList,
        Self::StorageOpen,
        Self::StoragePut,
        Self::StorageGet,
        Self::StorageClose,
        Self::StorageResult,
        Self::TradeStart,
        Self::TradeSetItem,
        Self::TradeSetGold,
        Self::TradeAccept,
        Self::TradeCancel,
        Self::TradeResult,
        Self::PartyInvite,
        Self::PartyAccept,
        Self::PartyKick,
        Self::PartyInfo,
        Self::GuildInfo,
        Self::GuildMembers,
        Self::Chat,
        Self::Move,
        Self::MoveNotify,
        Self::EntitySpawn,
        Self::EntityDespawn,
        Self::EffectNotify,
        Self::Attack,
        Self::AttackResult,
        Self::SkillUse,
        Self::SkillResult,
        Self::GmCommand,
        Self::Logout,
    ];

    /// Wire value of this opcode.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Opcode for a wire value. `None` if not catalogued.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.to_u16() == value)
    }

    /// Expected total size for client-to-server packets of this opcode.
    ///
    /// Fixed sizes include the 12-byte header. Server-to-client message
    /// sizes are not checked here; outbound packets are built by the
    /// encoders and are correct by construction.
    #[must_use]
    pub fn inbound_size(self) -> InboundSize {
        use crate::messages::wire;

        match self {
            Self::AccountLogin => InboundSize::Fixed(wire::ACCOUNT_LOGIN_SIZE),
            Self::CharacterLogin => InboundSize::Fixed(wire::CHARACTER_LOGIN_SIZE),
            Self::KeepAlive => InboundSize::Fixed(wire::KEEP_ALIVE_SIZE),
            Self::Logout => InboundSize::Fixed(wire::LOGOUT_SIZE),
            Self::Move => InboundSize::Fixed(wire::MOVE_SIZE),
            Self::Attack => InboundSize::Fixed(wire::ATTACK_SIZE),
            Self::SkillUse => InboundSize::Fixed(wire::SKILL_USE_SIZE),
            Self::Chat => InboundSize::Fixed(wire::CHAT_SIZE),
            Self::ItemUse | Self::ItemEquip | Self::ItemRemove => {
                InboundSize::Fixed(wire::ITEM_SLOT_PAIR_SIZE)
            },
            Self::ItemDrop => InboundSize::Fixed(wire::ITEM_DROP_SIZE),
            Self::ItemGet => InboundSize::Fixed(wire::ITEM_GET_SIZE),
            Self::ShopOpen => InboundSize::Fixed(wire::SHOP_OPEN_SIZE),
            Self::ShopClose | Self::StorageOpen | Self::StorageClose | Self::TradeCancel => {
                InboundSize::Fixed(wire::BARE_REQUEST_SIZE)
            },
            Self::ShopBuy => InboundSize::Fixed(wire::SHOP_BUY_SIZE),
            Self::ShopSell => InboundSize::Fixed(wire::SHOP_SELL_SIZE),
            Self::StoragePut | Self::StorageGet => InboundSize::Fixed(wire::STORAGE_MOVE_SIZE),
            Self::TradeStart => InboundSize::Fixed(wire::TRADE_START_SIZE),
            Self::TradeSetItem => InboundSize::Fixed(wire::TRADE_SET_ITEM_SIZE),
            Self::TradeSetGold => InboundSize::Fixed(wire::TRADE_SET_GOLD_SIZE),
            Self::TradeAccept => InboundSize::Fixed(wire::TRADE_ACCEPT_SIZE),
            Self::PartyInvite | Self::PartyKick => InboundSize::Fixed(wire::PARTY_TARGET_SIZE),
            Self::PartyAccept => InboundSize::Fixed(wire::PARTY_ACCEPT_SIZE),
            Self::GmCommand => InboundSize::Fixed(wire::GM_COMMAND_SIZE),

            // Size table incomplete in the original client for these; the
            // decoders validate length prefixes internally.
            Self::PartyInfo | Self::GuildInfo | Self::GuildMembers => InboundSize::Variable,

            Self::Initial
            | Self::CharacterList
            | Self::AccountLoginResponse
            | Self::CharacterLoginResponse
            | Self::ItemResult
            | Self::ShopList
            | Self::StorageResult
            | Self::TradeResult
            | Self::MoveNotify
            | Self::EntitySpawn
            | Self::EntityDespawn
            | Self::EffectNotify
            | Self::AttackResult
            | Self::SkillResult => InboundSize::ServerOnly,
        }
    }
}
