//! Opcode dispatch table.
//!
//! Built once at boot: every client opcode maps to its rate configuration
//! and handler function. The allowed-lifecycle-state check lives in the
//! session state machine (`Session::allows`); this table owns what happens
//! after a packet has passed framing, size, state and rate validation.
//!
//! Runtime registration is deliberately absent. The original server let
//! subsystems register packet callbacks at any time, which made lifetime
//! reasoning miserable; here the table is immutable after boot.

use std::collections::HashMap;

use tmserv_core::CloseReason;
use tmserv_core::env::Environment;
use tmserv_core::rate::RateConfig;
use tmserv_proto::{ClientMessage, Opcode};

use crate::driver::{ServerAction, ServerDriver};

/// What a handler decided about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// Continue normally.
    Ok,
    /// Close the session with this reason.
    CloseConnection(CloseReason),
    /// The handler started an external call; a later event resumes the
    /// flow. The worker is free immediately.
    Deferred,
}

/// Handler function: session id, decoded message, action sink.
pub type Handler<E> =
    fn(&mut ServerDriver<E>, u32, ClientMessage, &mut Vec<ServerAction>) -> HandlerResult;

/// One dispatch table entry.
pub struct HandlerEntry<E: Environment> {
    /// Rate configuration; `None` disables throttling for the opcode.
    pub rate: Option<RateConfig>,
    /// Handler function.
    pub handler: Handler<E>,
}

/// Opcode → handler table.
pub struct DispatchTable<E: Environment> {
    entries: HashMap<u16, HandlerEntry<E>>,
}

impl<E: Environment> DispatchTable<E> {
    /// Entry for an opcode.
    #[must_use]
    pub fn get(&self, opcode: Opcode) -> Option<&HandlerEntry<E>> {
        self.entries.get(&opcode.to_u16())
    }

    /// Number of registered opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the boot-time dispatch table.
#[must_use]
pub fn build_table<E: Environment>() -> DispatchTable<E> {
    let mut entries: HashMap<u16, HandlerEntry<E>> = HashMap::new();

    let mut register = |opcode: Opcode, rate: Option<RateConfig>, handler: Handler<E>| {
        let replaced = entries.insert(opcode.to_u16(), HandlerEntry { rate, handler });
        debug_assert!(replaced.is_none(), "duplicate handler for {opcode:?}");
    };

    register(Opcode::KeepAlive, None, ServerDriver::handle_keep_alive);
    register(Opcode::AccountLogin, Some(RateConfig::per_second(1, 3)), ServerDriver::handle_account_login);
    register(Opcode::CharacterLogin, Some(RateConfig::per_second(1, 3)), ServerDriver::handle_character_login);
    register(Opcode::Logout, None, ServerDriver::handle_logout);

    register(Opcode::Move, Some(RateConfig::per_second(10, 20)), ServerDriver::handle_move);
    register(Opcode::Attack, Some(RateConfig::per_second(8, 16)), ServerDriver::handle_attack);
    register(Opcode::SkillUse, Some(RateConfig::per_second(4, 8)), ServerDriver::handle_skill_use);
    register(Opcode::Chat, Some(RateConfig::per_second(4, 8)), ServerDriver::handle_chat);
    register(Opcode::GmCommand, Some(RateConfig::per_second(2, 4)), ServerDriver::handle_gm_command);

    let item_rate = Some(RateConfig::per_second(5, 10));
    register(Opcode::ItemUse, item_rate, ServerDriver::handle_item);
    register(Opcode::ItemEquip, item_rate, ServerDriver::handle_item);
    register(Opcode::ItemRemove, item_rate, ServerDriver::handle_item);
    register(Opcode::ItemDrop, item_rate, ServerDriver::handle_item);
    register(Opcode::ItemGet, item_rate, ServerDriver::handle_item);

    register(Opcode::ShopOpen, item_rate, ServerDriver::handle_shop);
    register(Opcode::ShopClose, item_rate, ServerDriver::handle_shop);
    register(Opcode::ShopBuy, item_rate, ServerDriver::handle_shop);
    register(Opcode::ShopSell, item_rate, ServerDriver::handle_shop);

    register(Opcode::StorageOpen, item_rate, ServerDriver::handle_storage);
    register(Opcode::StoragePut, item_rate, ServerDriver::handle_storage);
    register(Opcode::StorageGet, item_rate, ServerDriver::handle_storage);
    register(Opcode::StorageClose, item_rate, ServerDriver::handle_storage);

    register(Opcode::TradeStart, item_rate, ServerDriver::handle_trade);
    register(Opcode::TradeSetItem, item_rate, ServerDriver::handle_trade);
    register(Opcode::TradeSetGold, item_rate, ServerDriver::handle_trade);
    register(Opcode::TradeAccept, item_rate, ServerDriver::handle_trade);
    register(Opcode::TradeCancel, item_rate, ServerDriver::handle_trade);

    let social_rate = Some(RateConfig::per_second(5, 10));
    register(Opcode::PartyInvite, social_rate, ServerDriver::handle_party);
    register(Opcode::PartyAccept, social_rate, ServerDriver::handle_party);
    register(Opcode::PartyKick, social_rate, ServerDriver::handle_party);
    register(Opcode::PartyInfo, social_rate, ServerDriver::handle_party);
    register(Opcode::GuildInfo, social_rate, ServerDriver::handle_guild);
    register(Opcode::GuildMembers, social_rate, ServerDriver::handle_guild);

    DispatchTable { entries }
}
