//! Handshake, authentication and character selection messages.

use super::{BodyError, BodyReader, BodyWriter, NAME_LENGTH};

/// Width of the login notice field in the login response.
const NOTICE_LENGTH: usize = 44;

/// Handshake packet sent as soon as a socket is accepted (S→C).
///
/// Carries the protocol version and the cipher material for this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initial {
    /// Protocol version the server speaks.
    pub version: u16,
    /// 32-bit cipher key for both directions.
    pub cipher_key: u32,
    /// Initial rolling seed.
    pub cipher_seed: u8,
}

impl Initial {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.version);
        w.u32(self.cipher_key);
        w.u8(self.cipher_seed);
        w.reserved(1);
    }
}

/// Account credentials (C→S).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLogin {
    /// Account name, at most 15 ASCII characters on the wire.
    pub account: String,
    /// Password field. Plaintext on the wire, as the legacy client sends it.
    pub password: String,
    /// Client build number.
    pub client_version: u16,
}

impl AccountLogin {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let account = r.fixed_str(NAME_LENGTH)?;
        let password = r.fixed_str(NAME_LENGTH)?;
        let client_version = r.u16()?;
        r.skip(2)?;

        if account.is_empty() {
            return Err(BodyError::Invalid("empty account name"));
        }
        Ok(Self { account, password, client_version })
    }
}

/// Login verdict (S→C). `result` 0 means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLoginResponse {
    /// 0 = success; non-zero values map to client-side error strings.
    pub result: u16,
    /// Granted permission level (0 = player).
    pub permission: u8,
    /// Server notice line shown on the character screen.
    pub notice: String,
}

impl AccountLoginResponse {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.result);
        w.u8(self.permission);
        w.reserved(1);
        w.fixed_str(&self.notice, NOTICE_LENGTH);
    }
}

/// One entry of the character roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSummary {
    /// Character name.
    pub name: String,
    /// Class identifier (0-3).
    pub class_id: u8,
    /// Character level.
    pub level: u16,
}

/// Character roster delivered after authentication (S→C, variable size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterList {
    /// Up to four characters per account.
    pub characters: Vec<CharacterSummary>,
}

impl CharacterList {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.characters.len() as u16);
        w.reserved(2);
        for ch in &self.characters {
            w.fixed_str(&ch.name, NAME_LENGTH);
            w.u8(ch.class_id);
            w.u16(ch.level);
            w.reserved(1);
        }
    }
}

/// Character selection (C→S).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterLogin {
    /// Name of the character to enter the world with.
    pub char_name: String,
}

impl CharacterLogin {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let char_name = r.fixed_str(NAME_LENGTH)?;
        r.skip(2)?;

        if char_name.is_empty() {
            return Err(BodyError::Invalid("empty character name"));
        }
        Ok(Self { char_name })
    }
}

/// World-entry verdict and character snapshot (S→C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterLoginResponse {
    /// 0 = success.
    pub result: u16,
    /// In-world entity id assigned to the character.
    pub char_id: u16,
    /// Spawn position.
    pub pos_x: u16,
    /// Spawn position.
    pub pos_y: u16,
    /// Map the character enters on.
    pub map_id: u16,
    /// Character level.
    pub level: u16,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Current mana.
    pub mp: u32,
    /// Maximum mana.
    pub max_mp: u32,
}

impl CharacterLoginResponse {
    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u16(self.result);
        w.u16(self.char_id);
        w.u16(self.pos_x);
        w.u16(self.pos_y);
        w.u16(self.map_id);
        w.u16(self.level);
        w.u32(self.hp);
        w.u32(self.max_hp);
        w.u32(self.mp);
        w.u32(self.max_mp);
    }

    /// A failure response carrying only the result code.
    #[must_use]
    pub fn failure(result: u16) -> Self {
        Self {
            result,
            char_id: 0,
            pos_x: 0,
            pos_y: 0,
            map_id: 0,
            level: 0,
            hp: 0,
            max_hp: 0,
            mp: 0,
            max_mp: 0,
        }
    }
}

/// Activity refresh. The client clock is echoed back for RTT estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Client millisecond clock at send time.
    pub client_time: u32,
}

impl KeepAlive {
    pub(super) fn decode(r: &mut BodyReader<'_>) -> Result<Self, BodyError> {
        let client_time = r.u32()?;
        r.skip(2)?;
        Ok(Self { client_time })
    }

    pub(super) fn encode(&self, w: &mut BodyWriter) {
        w.u32(self.client_time);
        w.reserved(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ServerMessage, decode_client, wire};
    use crate::packet::Packet;
    use crate::opcode::Opcode;

    #[test]
    fn account_login_decodes() {
        let mut w = BodyWriter::new();
        w.fixed_str("alice", NAME_LENGTH);
        w.fixed_str("pw", NAME_LENGTH);
        w.u16(1);
        w.reserved(2);
        let body = w.finish();

        let packet = Packet::new(Opcode::AccountLogin.to_u16(), 0, body);
        assert_eq!(packet.wire_size(), wire::ACCOUNT_LOGIN_SIZE as usize);

        match decode_client(&packet).expect("decodes") {
            crate::messages::ClientMessage::AccountLogin(m) => {
                assert_eq!(m.account, "alice");
                assert_eq!(m.password, "pw");
                assert_eq!(m.client_version, 1);
            },
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn empty_account_is_invalid() {
        let mut w = BodyWriter::new();
        w.fixed_str("", NAME_LENGTH);
        w.fixed_str("pw", NAME_LENGTH);
        w.u16(1);
        w.reserved(2);

        let packet = Packet::new(Opcode::AccountLogin.to_u16(), 0, w.finish());
        assert!(decode_client(&packet).is_err());
    }

    #[test]
    fn initial_encodes_to_fixed_size() {
        let msg = ServerMessage::Initial(Initial {
            version: 1,
            cipher_key: 0xDEAD_BEEF,
            cipher_seed: 0x42,
        });
        let packet = msg.into_packet(0);
        assert_eq!(packet.wire_size(), 20);
        assert_eq!(packet.opcode(), 0x0101);
    }

    #[test]
    fn login_response_carries_notice() {
        let msg = ServerMessage::AccountLoginResponse(AccountLoginResponse {
            result: 0,
            permission: 0,
            notice: "welcome".to_string(),
        });
        let body = msg.encode_body();
        assert_eq!(body.len(), 48);
        assert_eq!(&body[4..11], b"welcome");
    }

    #[test]
    fn character_list_size_tracks_count() {
        let list = CharacterList {
            characters: vec![
                CharacterSummary { name: "one".to_string(), class_id: 0, level: 10 },
                CharacterSummary { name: "two".to_string(), class_id: 3, level: 99 },
            ],
        };
        let body = ServerMessage::CharacterList(list).encode_body();
        assert_eq!(body.len(), 4 + 2 * 20);
    }

    #[test]
    fn keep_alive_round_trip() {
        let mut w = BodyWriter::new();
        KeepAlive { client_time: 123_456 }.encode(&mut w);
        let body = w.finish();
        assert_eq!(body.len() + 12, wire::KEEP_ALIVE_SIZE as usize);

        let mut r = BodyReader::new(&body);
        let parsed = KeepAlive::decode(&mut r).expect("round trip");
        assert_eq!(parsed.client_time, 123_456);
    }
}
