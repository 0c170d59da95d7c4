use std::time::Duration;

use crate::error::{ParseError, ProtocolError};
use crate::packet::ResponseType;
use crate::parse::BinaryCursor;

/// Name some servers put in a lone placeholder record when nobody is online.
const PLACEHOLDER_NAME: &str = "Max Players";

/// One entry of an A2S_PLAYER reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Slot index as sent by the server; often always 0.
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Time connected to the server.
    pub duration: Duration,
}

impl Player {
    fn read(cursor: &mut BinaryCursor) -> Result<Self, ParseError> {
        let index = cursor.read_u8()?;
        let name = cursor.read_cstring()?;
        let score = cursor.read_i32_le()?;
        let seconds = cursor.read_f32_le()?;
        Ok(Player {
            index,
            name,
            score,
            duration: Duration::try_from_secs_f32(seconds).unwrap_or_default(),
        })
    }

    fn read_all(cursor: &mut BinaryCursor) -> Result<Vec<Self>, ParseError> {
        let count = cursor.read_u8()?;
        (0..count).map(|_| Player::read(cursor)).collect()
    }

    /// Parse a reassembled A2S_PLAYER payload.
    pub fn parse_list(payload: &[u8]) -> Result<Vec<Player>, ProtocolError> {
        ResponseType::Player.expect(payload)?;
        let players = Player::read_all(&mut BinaryCursor::new(&payload[1..]))
            .map_err(|e| ProtocolError::malformed(e, payload))?;

        if players.len() == 1 && players[0].name == PLACEHOLDER_NAME {
            return Ok(Vec::new());
        }
        Ok(players)
    }
}
