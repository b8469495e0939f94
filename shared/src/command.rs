//! Symbol to drone command encoding
//!
//! Decoded symbol text maps onto the drone's text protocol as:
//! ```text
//! forward -> "forward <distance_cm>"
//! left    -> "left <angle_deg>"
//! right   -> "right <angle_deg>"
//! ```
//!
//! One command per datagram, no terminator.

use std::fmt;
use thiserror::Error;

/// Symbol text that does not name a known command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

/// Movement commands the bridge can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Forward,
    Left,
    Right,
}

impl CommandKind {
    /// All recognized kinds, in token order
    pub const ALL: [CommandKind; 3] = [CommandKind::Forward, CommandKind::Left, CommandKind::Right];

    /// Parse a raw symbol: trimmed, case-insensitive
    pub fn parse(token: &str) -> Result<Self, UnknownCommand> {
        let normalized = token.trim().to_lowercase();
        match normalized.as_str() {
            "forward" => Ok(CommandKind::Forward),
            "left" => Ok(CommandKind::Left),
            "right" => Ok(CommandKind::Right),
            _ => Err(UnknownCommand(normalized)),
        }
    }

    /// Wire token for this kind
    pub fn token(&self) -> &'static str {
        match self {
            CommandKind::Forward => "forward",
            CommandKind::Left => "left",
            CommandKind::Right => "right",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A movement command with its magnitude (cm for forward, degrees for turns)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub magnitude: u32,
}

impl Command {
    /// Build the command for a symbol using the configured magnitudes
    pub fn from_symbol(
        token: &str,
        forward_distance: u32,
        turn_angle: u32,
    ) -> Result<Self, UnknownCommand> {
        let kind = CommandKind::parse(token)?;
        let magnitude = match kind {
            CommandKind::Forward => forward_distance,
            CommandKind::Left | CommandKind::Right => turn_angle,
        };
        Ok(Self { kind, magnitude })
    }

    /// Wire encoding: token, one space, integer parameter
    pub fn to_wire(&self) -> String {
        format!("{} {}", self.kind.token(), self.magnitude)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.token(), self.magnitude)
    }
}

/// Encode a decoded symbol into its wire command string
pub fn encode(token: &str, forward_distance: u32, turn_angle: u32) -> Result<String, UnknownCommand> {
    Command::from_symbol(token, forward_distance, turn_angle).map(|cmd| cmd.to_wire())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_with_padding_and_case() {
        assert_eq!(encode("FORWARD  ", 20, 90).unwrap(), "forward 20");
    }

    #[test]
    fn test_left_mixed_case() {
        assert_eq!(encode("Left", 20, 90).unwrap(), "left 90");
    }

    #[test]
    fn test_right_uses_turn_angle() {
        assert_eq!(encode("\tright\n", 35, 45).unwrap(), "right 45");
    }

    #[test]
    fn test_unknown_token_rejected() {
        let err = encode("up", 20, 90).unwrap_err();
        assert_eq!(err, UnknownCommand("up".into()));

        // Magnitudes play no part in recognition
        assert!(encode("up", 0, 0).is_err());
        assert!(encode("up", u32::MAX, u32::MAX).is_err());
    }

    #[test]
    fn test_empty_and_partial_tokens_rejected() {
        assert!(encode("", 20, 90).is_err());
        assert!(encode("   ", 20, 90).is_err());
        assert!(encode("forwards", 20, 90).is_err());
        assert!(encode("for ward", 20, 90).is_err());
    }

    #[test]
    fn test_case_variants_of_every_kind() {
        for kind in CommandKind::ALL {
            let upper = kind.token().to_uppercase();
            let padded = format!("  {}  ", upper);
            let expected_magnitude = if kind == CommandKind::Forward { 20 } else { 90 };
            assert_eq!(
                encode(&padded, 20, 90).unwrap(),
                format!("{} {}", kind.token(), expected_magnitude)
            );
        }
    }

    #[test]
    fn test_command_display_matches_wire() {
        let cmd = Command::from_symbol("left", 20, 30).unwrap();
        assert_eq!(cmd.kind, CommandKind::Left);
        assert_eq!(cmd.magnitude, 30);
        assert_eq!(cmd.to_string(), cmd.to_wire());
    }
}
