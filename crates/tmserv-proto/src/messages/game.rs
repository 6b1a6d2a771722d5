//! Movement, combat, chat and visibility messages.

use super::{BodyError, BodyReader, BodyWriter, CHAT_MESSAGE_LENGTH, NAME_LENGTH};

/// Chat channel selector carried in [`Chat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ChatType {
    /// Heard by characters within the local radius.
    Local = 0,
    /// Party members only.
    Party = 1,
    /// Guild members only.
    Guild = 2,
    /// One named recipient.
    Whisper = 3,
    /// Every connected character.
    Global = 4,
}

impl ChatType {
    /// Parse a wire value.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Local),
            1 => Some(Self::Party),
            2 => Some(Self::Guild),
            3 => Some(Self::Whisper),
            4 => Some(Self::Global),
            _ => None,
        }
    }
}

/// Movement request (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Current position as the client believes it.
    pub pos_x: u16,
    /// Current position as the client believes it.
    pub pos_y: u16,
    /// Requested destination.
    pub dest_x: u16,
    /// Requested destination.
    pub dest_y: u16,
    /// Client movement speed.
    pub speed: u16,
    /// Walk, run, or forced move.
    pub move_type: u16,
}

impl Move {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        Ok(Self {
            pos_x: r.u16()?,
            pos_y: r.u16()?,
            dest_x: r.u16()?,
            dest_y: r.u16()?,
            speed: r.u16()?,
            move_type: r.u16()?,
        })
    }
}

/// Movement of another entity (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveNotify {
    /// Entity that moved.
    pub entity_id: u16,
    /// Position at notification time.
    pub pos_x: u16,
    /// Position at notification time.
    pub pos_y: u16,
    /// Destination the entity is heading for.
    pub dest_x: u16,
    /// Destination the entity is heading for.
    pub dest_y: u16,
    /// Movement speed.
    pub speed: u16,
}

impl MoveNotify {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.entity_id);
        w.u16(self.pos_x);
        w.u16(self.pos_y);
        w.u16(self.dest_x);
        w.u16(self.dest_y);
        w.u16(self.speed);
    }
}

/// Attack request (C→S). `skill_id` 0 is a basic attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attack {
    /// Target entity.
    pub target_id: u16,
    /// Skill used, 0 for a plain attack.
    pub skill_id: u16,
}

impl Attack {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let target_id = r.u16()?;
        let skill_id = r.u16()?;
        r.skip(4)?;
        Ok(Self { target_id, skill_id })
    }
}

/// Resolved attack outcome, broadcast to observers (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackResult {
    /// Attacking entity.
    pub attacker_id: u16,
    /// Defending entity.
    pub defender_id: u16,
    /// Damage dealt.
    pub damage: u16,
    /// Hit flags (critical, miss, block).
    pub flags: u16,
    /// Defender hit points after the hit.
    pub defender_hp: u32,
}

impl AttackResult {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.attacker_id);
        w.u16(self.defender_id);
        w.u16(self.damage);
        w.u16(self.flags);
        w.u32(self.defender_hp);
        w.reserved(2);
    }
}

/// Skill cast request (C→S).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillUse {
    /// Skill identifier.
    pub skill_id: u16,
    /// Skill-specific parameter.
    pub skill_param: u16,
    /// Ground target position.
    pub target_x: u16,
    /// Ground target position.
    pub target_y: u16,
    /// Target entity, 0 for ground-targeted skills.
    pub target_id: u16,
}

impl SkillUse {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let skill_id = r.u16()?;
        let skill_param = r.u16()?;
        let target_x = r.u16()?;
        let target_y = r.u16()?;
        let target_id = r.u16()?;
        r.skip(2)?;
        Ok(Self { skill_id, skill_param, target_x, target_y, target_id })
    }
}

/// Skill cast verdict (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillResult {
    /// 0 = success.
    pub result: u16,
    /// Casting entity.
    pub caster_id: u16,
    /// Skill that was cast.
    pub skill_id: u16,
}

impl SkillResult {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.result);
        w.u16(self.caster_id);
        w.u16(self.skill_id);
        w.reserved(2);
    }
}

/// Chat line. Same layout in both directions; the server rewrites the
/// speaker name before fan-out so clients cannot spoof it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    /// Channel selector.
    pub chat_type: ChatType,
    /// Speaker (C→S: whisper recipient; S→C: speaker).
    pub name: String,
    /// Message text.
    pub message: String,
}

impl Chat {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let raw_type = r.u16()?;
        let chat_type = ChatType::from_u16(raw_type).ok_or(BodyError::Invalid("bad chat type"))?;
        let name = r.fixed_str(NAME_LENGTH)?;
        let message = r.fixed_str(CHAT_MESSAGE_LENGTH)?;
        Ok(Self { chat_type, name, message })
    }

    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.chat_type as u16);
        w.fixed_str(&self.name, NAME_LENGTH);
        w.fixed_str(&self.message, CHAT_MESSAGE_LENGTH);
    }
}

/// GM console command (C→S, permission-gated at dispatch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmCommand {
    /// Raw command line, e.g. `/teleport 1 100 100`.
    pub command: String,
}

impl GmCommand {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let command = r.fixed_str(CHAT_MESSAGE_LENGTH)?;
        if command.is_empty() {
            return Err(BodyError::Invalid("empty gm command"));
        }
        Ok(Self { command })
    }
}

/// An entity entered visual range (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpawn {
    /// Entity id (character or mob).
    pub entity_id: u16,
    /// Mob template, 0 for characters.
    pub template_id: u16,
    /// Position.
    pub pos_x: u16,
    /// Position.
    pub pos_y: u16,
    /// Display flags.
    pub flags: u16,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
}

impl EntitySpawn {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.entity_id);
        w.u16(self.template_id);
        w.u16(self.pos_x);
        w.u16(self.pos_y);
        w.u16(self.flags);
        w.u32(self.hp);
        w.u32(self.max_hp);
    }
}

/// An entity left visual range or died (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDespawn {
    /// Entity that disappeared.
    pub entity_id: u16,
    /// 0 = out of range, 1 = died, 2 = logged out.
    pub reason: u8,
}

impl EntityDespawn {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.entity_id);
        w.u8(self.reason);
        w.reserved(1);
    }
}

/// Effect applied to or removed from a visible entity (S→C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectNotify {
    /// Affected entity.
    pub entity_id: u16,
    /// Effect type id.
    pub effect_type: u16,
    /// Effect magnitude; 0 signals removal.
    pub magnitude: u16,
    /// Remaining duration in milliseconds, 0 = permanent.
    pub duration_ms: u32,
}

impl EffectNotify {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.entity_id);
        w.u16(self.effect_type);
        w.u16(self.magnitude);
        w.u32(self.duration_ms);
    }
}
