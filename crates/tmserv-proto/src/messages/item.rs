//! Inventory, shop, storage and trade messages.

use super::{BodyError, BodyReader, BodyWriter};

/// Width of the shop name field in [`ShopList`].
const SHOP_NAME_LENGTH: usize = 24;

/// Source/destination slot pair shared by `ItemUse`, `ItemEquip` and
/// `ItemRemove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPair {
    /// Slot the item comes from.
    pub src_slot: u16,
    /// Slot the item goes to.
    pub dst_slot: u16,
}

impl SlotPair {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let src_slot = r.u16()?;
        let dst_slot = r.u16()?;
        r.skip(2)?;
        Ok(Self { src_slot, dst_slot })
    }
}

/// Drop an item on the ground (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemDrop {
    /// Inventory slot to drop from.
    pub src_slot: u16,
    /// Ground position.
    pub pos_x: u16,
    /// Ground position.
    pub pos_y: u16,
}

impl ItemDrop {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let src_slot = r.u16()?;
        let pos_x = r.u16()?;
        let pos_y = r.u16()?;
        r.skip(2)?;
        Ok(Self { src_slot, pos_x, pos_y })
    }
}

/// Pick an item up from the ground (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemGet {
    /// Ground item id.
    pub ground_id: u16,
}

impl ItemGet {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let ground_id = r.u16()?;
        r.skip(2)?;
        Ok(Self { ground_id })
    }
}

/// Generic item operation verdict (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemResult {
    /// 0 = success.
    pub result: u16,
    /// Slot affected by the operation.
    pub slot: u16,
}

impl ItemResult {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.result);
        w.u16(self.slot);
    }
}

/// Open an NPC shop (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShopOpen {
    /// Shopkeeper NPC entity id.
    pub npc_id: u16,
}

impl ShopOpen {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let npc_id = r.u16()?;
        r.skip(2)?;
        Ok(Self { npc_id })
    }
}

/// Buy from the open shop (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShopBuy {
    /// Shop slot to buy.
    pub shop_slot: u16,
    /// Quantity requested.
    pub quantity: u16,
}

impl ShopBuy {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let shop_slot = r.u16()?;
        let quantity = r.u16()?;
        r.skip(2)?;
        if quantity == 0 {
            return Err(BodyError::Invalid("zero quantity"));
        }
        Ok(Self { shop_slot, quantity })
    }
}

/// Sell to the open shop (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShopSell {
    /// Inventory slot to sell.
    pub inven_slot: u16,
}

impl ShopSell {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let inven_slot = r.u16()?;
        r.skip(2)?;
        Ok(Self { inven_slot })
    }
}

/// One sellable entry of a shop listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShopEntry {
    /// Item template id.
    pub item_id: u16,
    /// Unit price in gold.
    pub price: u32,
}

/// Shop inventory listing (S→C, variable size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopList {
    /// Shop display name.
    pub shop_name: String,
    /// Items for sale.
    pub entries: Vec<ShopEntry>,
}

impl ShopList {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.fixed_str(&self.shop_name, SHOP_NAME_LENGTH);
        w.u16(self.entries.len() as u16);
        for entry in &self.entries {
            w.u16(entry.item_id);
            w.u32(entry.price);
        }
    }
}

/// Move an item between inventory and storage (C→S).
///
/// For `StoragePut`, `from` is the inventory slot; for `StorageGet` it is
/// the storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageMove {
    /// Slot the item comes from.
    pub from: u16,
    /// Slot the item goes to.
    pub to: u16,
}

impl StorageMove {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let from = r.u16()?;
        let to = r.u16()?;
        r.skip(2)?;
        Ok(Self { from, to })
    }
}

/// Storage operation verdict (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageResult {
    /// 0 = success.
    pub result: u16,
}

impl StorageResult {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.result);
        w.reserved(2);
    }
}

/// Propose a trade to another character (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeStart {
    /// Character to trade with.
    pub target_id: u16,
}

impl TradeStart {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let target_id = r.u16()?;
        r.skip(2)?;
        Ok(Self { target_id })
    }
}

/// Place an item into the trade window (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeSetItem {
    /// Inventory slot offered.
    pub inven_slot: u16,
    /// Trade window slot (0-14).
    pub trade_slot: u16,
}

impl TradeSetItem {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let inven_slot = r.u16()?;
        let trade_slot = r.u16()?;
        r.skip(2)?;
        if trade_slot > 14 {
            return Err(BodyError::Invalid("trade slot out of range"));
        }
        Ok(Self { inven_slot, trade_slot })
    }
}

/// Set offered gold (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeSetGold {
    /// Gold amount offered.
    pub gold: u32,
}

impl TradeSetGold {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let gold = r.u32()?;
        r.skip(2)?;
        Ok(Self { gold })
    }
}

/// Accept or retract acceptance of the current trade state (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeAccept {
    /// true = accept, false = retract.
    pub accept: bool,
}

impl TradeAccept {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let flag = r.u16()?;
        r.skip(2)?;
        Ok(Self { accept: flag != 0 })
    }
}

/// Trade operation verdict (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeResult {
    /// 0 = success.
    pub result: u16,
}

impl TradeResult {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.result);
        w.reserved(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ClientMessage, decode_client};
    use crate::opcode::Opcode;
    use crate::packet::Packet;

    fn slot_pair_packet(opcode: Opcode, src: u16, dst: u16) -> Packet {
        let mut w = BodyWriter::new();
        w.u16(src);
        w.u16(dst);
        w.reserved(2);
        Packet::new(opcode.to_u16(), 1, w.finish())
    }

    #[test]
    fn slot_pair_opcodes_decode_to_distinct_messages() {
        let equip = decode_client(&slot_pair_packet(Opcode::ItemEquip, 3, 1)).expect("equip");
        assert!(matches!(equip, ClientMessage::ItemEquip(SlotPair { src_slot: 3, dst_slot: 1 })));

        let remove = decode_client(&slot_pair_packet(Opcode::ItemRemove, 1, 3)).expect("remove");
        assert!(matches!(remove, ClientMessage::ItemRemove(SlotPair { src_slot: 1, dst_slot: 3 })));
    }

    #[test]
    fn shop_buy_rejects_zero_quantity() {
        let mut w = BodyWriter::new();
        w.u16(0);
        w.u16(0);
        w.reserved(2);
        let packet = Packet::new(Opcode::ShopBuy.to_u16(), 1, w.finish());
        assert!(decode_client(&packet).is_err());
    }

    #[test]
    fn trade_slot_range_is_enforced() {
        let mut w = BodyWriter::new();
        w.u16(0);
        w.u16(15);
        w.reserved(2);
        let packet = Packet::new(Opcode::TradeSetItem.to_u16(), 1, w.finish());
        assert!(decode_client(&packet).is_err());
    }

    #[test]
    fn shop_list_size_tracks_entries() {
        let list = ShopList {
            shop_name: "armory".to_string(),
            entries: vec![
                ShopEntry { item_id: 10, price: 100 },
                ShopEntry { item_id: 11, price: 250 },
                ShopEntry { item_id: 12, price: 990 },
            ],
        };
        let mut w = BodyWriter::new();
        list.encode(&mut w);
        assert_eq!(w.finish().len(), 24 + 2 + 3 * 6);
    }
}
