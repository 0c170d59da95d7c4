use std::time::Duration;

/// Used for every timeout that is not set explicitly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on challenge round-trips per request.
pub const DEFAULT_CHALLENGE_RETRIES: u8 = 2;

/// Socket timeouts, applied per send / receive call.
///
/// Connecting uses the `send` timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub send: Duration,
    pub receive: Duration,
}

impl Timeouts {
    pub fn uniform(dur: Duration) -> Self {
        Timeouts {
            send: dur,
            receive: dur,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts::uniform(DEFAULT_TIMEOUT)
    }
}

/// How a [ServerSession](crate::server::ServerSession) picks its info format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatHint {
    /// Ask the server with the legacy query on connect.
    #[default]
    Probe,
    /// Skip probing, use the current format.
    Current,
    /// Skip probing, use the obsolete format.
    Obsolete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub timeouts: Timeouts,
    pub format: FormatHint,
    /// Maximum number of challenges accepted for a single request
    /// before giving up with [ProtocolError::ChallengeLoop](crate::error::ProtocolError::ChallengeLoop).
    pub challenge_retries: u8,
}

impl SessionConfig {
    pub fn with_timeout(dur: Duration) -> Self {
        SessionConfig {
            timeouts: Timeouts::uniform(dur),
            ..Default::default()
        }
    }

    pub fn format(mut self, format: FormatHint) -> Self {
        self.format = format;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            timeouts: Timeouts::default(),
            format: FormatHint::default(),
            challenge_retries: DEFAULT_CHALLENGE_RETRIES,
        }
    }
}
