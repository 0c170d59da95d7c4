use crate::error::{ParseError, ProtocolError};
use crate::packet::ResponseType;
use crate::parse::BinaryCursor;

/// A server cvar from an A2S_RULES reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub value: String,
}

impl Rule {
    /// Parse a reassembled A2S_RULES payload.
    pub fn parse_list(payload: &[u8]) -> Result<Vec<Rule>, ProtocolError> {
        ResponseType::Rules.expect(payload)?;
        read_all(&mut BinaryCursor::new(&payload[1..]))
            .map_err(|e| ProtocolError::malformed(e, payload))
    }
}

fn read_all(cursor: &mut BinaryCursor) -> Result<Vec<Rule>, ParseError> {
    let count = cursor.read_u16_le()?;
    let mut rules = Vec::with_capacity(count as usize);
    for _ in 0..count {
        rules.push(Rule {
            name: cursor.read_cstring()?,
            value: cursor.read_cstring()?,
        });
    }
    Ok(rules)
}
