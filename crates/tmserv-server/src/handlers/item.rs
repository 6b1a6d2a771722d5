//! Item, shop, storage and trade handlers.
//!
//! Authoritative item state lives in the inventory collaborator; these
//! handlers own the interactive session sub-state (which shop is open,
//! whether storage is open, the trade pairing) and the result packets. A
//! request that does not fit the sub-state gets a non-zero result code
//! instead of a close: a laggy client is not an attacker.

use tmserv_core::env::Environment;
use tmserv_proto::messages::item as item_msgs;
use tmserv_proto::{ClientMessage, ServerMessage};
use tmserv_world::entity::MOB_ID_BASE;

use crate::dispatch::HandlerResult;
use crate::driver::{LogLevel, ServerAction, ServerDriver};
use crate::registry::TradeState;

/// Result code: request does not fit the current session sub-state.
const RESULT_REJECTED: u16 = 1;

/// Result code: not enough gold.
const RESULT_NO_GOLD: u16 = 3;

/// Stock NPC shop inventory. Item pricing is the collaborator's job; this
/// table is the standalone-server stand-in.
const SHOP_STOCK: &[(u16, u32)] = &[(500, 100), (501, 250), (502, 990), (503, 1500)];

/// Flat price paid for any sold item.
const SELL_PRICE: u32 = 10;

impl<E: Environment> ServerDriver<E> {
    /// `ItemUse`/`ItemEquip`/`ItemRemove`/`ItemDrop`/`ItemGet`.
    pub(crate) fn handle_item(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let slot = match &message {
            ClientMessage::ItemUse(pair)
            | ClientMessage::ItemEquip(pair)
            | ClientMessage::ItemRemove(pair) => pair.src_slot,
            ClientMessage::ItemDrop(drop) => drop.src_slot,
            ClientMessage::ItemGet(get) => get.ground_id,
            _ => return HandlerResult::Ok,
        };

        // The inventory collaborator validates and applies; the session
        // only needs a character to act on.
        let has_character =
            self.registry.get(session_id).is_some_and(|e| e.character.is_some());
        let result = if has_character { 0 } else { RESULT_REJECTED };

        let response = ServerMessage::ItemResult(item_msgs::ItemResult { result, slot });
        self.send_to(session_id, response, actions);
        HandlerResult::Ok
    }

    /// `ShopOpen`/`ShopClose`/`ShopBuy`/`ShopSell`.
    pub(crate) fn handle_shop(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        match message {
            ClientMessage::ShopOpen(open) => {
                // The shopkeeper must be a live NPC the character can see.
                let keeper_ok = open.npc_id >= MOB_ID_BASE
                    && self.world.spawner.mob(open.npc_id).is_some_and(tmserv_world::Mob::is_alive);
                if !keeper_ok {
                    let response = ServerMessage::ItemResult(item_msgs::ItemResult {
                        result: RESULT_REJECTED,
                        slot: 0,
                    });
                    self.send_to(session_id, response, actions);
                    return HandlerResult::Ok;
                }

                if let Some(entry) = self.registry.get_mut(session_id) {
                    entry.open_shop = Some(open.npc_id);
                }
                let list = ServerMessage::ShopList(item_msgs::ShopList {
                    shop_name: "General Goods".to_string(),
                    entries: SHOP_STOCK
                        .iter()
                        .map(|&(item_id, price)| item_msgs::ShopEntry { item_id, price })
                        .collect(),
                });
                self.send_to(session_id, list, actions);
            },
            ClientMessage::ShopClose => {
                if let Some(entry) = self.registry.get_mut(session_id) {
                    entry.open_shop = None;
                }
            },
            ClientMessage::ShopBuy(buy) => {
                let open = self.registry.get(session_id).and_then(|e| e.open_shop);
                let price = SHOP_STOCK
                    .get(usize::from(buy.shop_slot))
                    .map(|&(_, price)| price.saturating_mul(u32::from(buy.quantity)));

                let result = match (open, price) {
                    (Some(_), Some(price)) => {
                        let paid = self
                            .registry
                            .get_mut(session_id)
                            .and_then(|e| e.character.as_mut())
                            .is_some_and(|c| {
                                if c.gold >= price {
                                    c.gold -= price;
                                    true
                                } else {
                                    false
                                }
                            });
                        if paid { 0 } else { RESULT_NO_GOLD }
                    },
                    _ => RESULT_REJECTED,
                };

                let response = ServerMessage::ItemResult(item_msgs::ItemResult {
                    result,
                    slot: buy.shop_slot,
                });
                self.send_to(session_id, response, actions);
            },
            ClientMessage::ShopSell(sell) => {
                let open = self.registry.get(session_id).and_then(|e| e.open_shop);
                let result = if open.is_some() {
                    if let Some(character) =
                        self.registry.get_mut(session_id).and_then(|e| e.character.as_mut())
                    {
                        character.gold = character.gold.saturating_add(SELL_PRICE);
                    }
                    0
                } else {
                    RESULT_REJECTED
                };

                let response = ServerMessage::ItemResult(item_msgs::ItemResult {
                    result,
                    slot: sell.inven_slot,
                });
                self.send_to(session_id, response, actions);
            },
            _ => {},
        }
        HandlerResult::Ok
    }

    /// `StorageOpen`/`StoragePut`/`StorageGet`/`StorageClose`.
    pub(crate) fn handle_storage(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let result = match message {
            ClientMessage::StorageOpen => {
                if let Some(entry) = self.registry.get_mut(session_id) {
                    entry.storage_open = true;
                }
                0
            },
            ClientMessage::StorageClose => {
                if let Some(entry) = self.registry.get_mut(session_id) {
                    entry.storage_open = false;
                }
                0
            },
            ClientMessage::StoragePut(_) | ClientMessage::StorageGet(_) => {
                let open = self.registry.get(session_id).is_some_and(|e| e.storage_open);
                if open { 0 } else { RESULT_REJECTED }
            },
            _ => return HandlerResult::Ok,
        };

        let response = ServerMessage::StorageResult(item_msgs::StorageResult { result });
        self.send_to(session_id, response, actions);
        HandlerResult::Ok
    }

    /// `TradeStart`/`TradeSetItem`/`TradeSetGold`/`TradeAccept`/`TradeCancel`.
    pub(crate) fn handle_trade(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        match message {
            ClientMessage::TradeStart(start) => {
                let partner = self
                    .registry
                    .session_by_char_id(start.target_id)
                    .filter(|&sid| sid != session_id);

                let both_free = partner.is_some_and(|sid| {
                    self.registry.get(sid).is_some_and(|e| e.trade.is_none())
                }) && self
                    .registry
                    .get(session_id)
                    .is_some_and(|e| e.trade.is_none() && e.character.is_some());

                let Some(partner) = partner.filter(|_| both_free) else {
                    let response = ServerMessage::TradeResult(item_msgs::TradeResult {
                        result: RESULT_REJECTED,
                    });
                    self.send_to(session_id, response, actions);
                    return HandlerResult::Ok;
                };

                if let Some(entry) = self.registry.get_mut(session_id) {
                    entry.trade = Some(TradeState { partner, ..TradeState::default() });
                }
                if let Some(entry) = self.registry.get_mut(partner) {
                    entry.trade = Some(TradeState { partner: session_id, ..TradeState::default() });
                }

                let response = ServerMessage::TradeResult(item_msgs::TradeResult { result: 0 });
                self.send_to(session_id, response.clone(), actions);
                self.send_to(partner, response, actions);
            },
            ClientMessage::TradeSetItem(set) => {
                self.trade_update(session_id, actions, |trade| {
                    if !trade.slots.contains(&set.inven_slot) {
                        trade.slots.push(set.inven_slot);
                    }
                    trade.accepted = false;
                });
            },
            ClientMessage::TradeSetGold(set) => {
                self.trade_update(session_id, actions, |trade| {
                    trade.gold = set.gold;
                    trade.accepted = false;
                });
            },
            ClientMessage::TradeAccept(accept) => {
                let Some(partner) = self.trade_partner(session_id) else {
                    let response = ServerMessage::TradeResult(item_msgs::TradeResult {
                        result: RESULT_REJECTED,
                    });
                    self.send_to(session_id, response, actions);
                    return HandlerResult::Ok;
                };

                if let Some(trade) =
                    self.registry.get_mut(session_id).and_then(|e| e.trade.as_mut())
                {
                    trade.accepted = accept.accept;
                }

                let both_accepted = self
                    .registry
                    .get(session_id)
                    .and_then(|e| e.trade.as_ref())
                    .is_some_and(|t| t.accepted)
                    && self
                        .registry
                        .get(partner)
                        .and_then(|e| e.trade.as_ref())
                        .is_some_and(|t| t.accepted);

                if both_accepted {
                    // The inventory collaborator performs the actual item
                    // and gold movement; here the pairing completes.
                    self.clear_trade(session_id, partner);
                    let done = ServerMessage::TradeResult(item_msgs::TradeResult { result: 0 });
                    self.send_to(session_id, done.clone(), actions);
                    self.send_to(partner, done, actions);
                    actions.push(ServerAction::Log {
                        level: LogLevel::Info,
                        message: format!("trade completed between {session_id} and {partner}"),
                    });
                }
            },
            ClientMessage::TradeCancel => {
                if let Some(partner) = self.trade_partner(session_id) {
                    self.clear_trade(session_id, partner);
                    let cancelled =
                        ServerMessage::TradeResult(item_msgs::TradeResult { result: RESULT_REJECTED });
                    self.send_to(session_id, cancelled.clone(), actions);
                    self.send_to(partner, cancelled, actions);
                }
            },
            _ => {},
        }
        HandlerResult::Ok
    }

    fn trade_partner(&self, session_id: u32) -> Option<u32> {
        self.registry.get(session_id)?.trade.as_ref().map(|t| t.partner)
    }

    fn trade_update(
        &mut self,
        session_id: u32,
        actions: &mut Vec<ServerAction>,
        update: impl FnOnce(&mut TradeState),
    ) {
        let updated = self
            .registry
            .get_mut(session_id)
            .and_then(|e| e.trade.as_mut())
            .map(update)
            .is_some();

        // Changing the offer retracts the partner's acceptance too.
        if updated {
            if let Some(partner) = self.trade_partner(session_id) {
                if let Some(trade) =
                    self.registry.get_mut(partner).and_then(|e| e.trade.as_mut())
                {
                    trade.accepted = false;
                }
            }
        }

        let result = if updated { 0 } else { RESULT_REJECTED };
        let response = ServerMessage::TradeResult(item_msgs::TradeResult { result });
        self.send_to(session_id, response, actions);
    }

    fn clear_trade(&mut self, a: u32, b: u32) {
        if let Some(entry) = self.registry.get_mut(a) {
            entry.trade = None;
        }
        if let Some(entry) = self.registry.get_mut(b) {
            entry.trade = None;
        }
    }
}
