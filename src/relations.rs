//! Relationship Extraction
//!
//! Infers a conversational edge when a public message addresses another
//! participant with the `nick: message` convention.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::events::Edge;

/// Addressed content this short (in characters) is noise
pub const MICRO_MESSAGE_MAX_CHARS: usize = 3;

/// `name: rest`, where `name` is one nick token
static ADDRESSING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_\-\[\]\\^{}|`]+): (.*)$").expect("addressing regex is valid")
});

/// What the extractor made of one public message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// No `name: ` prefix
    NotAddressed,
    /// Addressed to the bot; carries the remainder for the dialog handler
    ToBot(String),
    /// Addressed content too short to count
    MicroMessage { dest: String },
    /// Addressee is not in the channel right now
    AbsentDest { dest: String },
    /// A relationship to persist
    Relationship(Edge),
}

/// Split `name: rest`
pub fn parse_addressing(text: &str) -> Option<(&str, &str)> {
    let caps = ADDRESSING_REGEX.captures(text)?;
    let name = caps.get(1)?.as_str();
    let rest = caps.get(2)?.as_str();
    Some((name, rest))
}

/// Decide whether `author`'s message creates an edge
///
/// `roster` is the channel membership at the time the message was received.
pub fn extract<S: AsRef<str>>(author: &str, text: &str, self_nick: &str, roster: &[S]) -> Extraction {
    let Some((dest, rest)) = parse_addressing(text) else {
        return Extraction::NotAddressed;
    };

    if dest == self_nick {
        return Extraction::ToBot(rest.to_string());
    }

    if rest.chars().count() <= MICRO_MESSAGE_MAX_CHARS {
        return Extraction::MicroMessage {
            dest: dest.to_string(),
        };
    }

    if !roster.iter().any(|nick| nick.as_ref() == dest) {
        return Extraction::AbsentDest {
            dest: dest.to_string(),
        };
    }

    Extraction::Relationship(Edge::new(author, dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &[&str] = &["alice", "bob", "pirc_bt", "[away]`x"];

    #[test]
    fn test_relationship_detected() {
        match extract("alice", "bob: hey there!", "pirc_bt", ROSTER) {
            Extraction::Relationship(edge) => assert_eq!(edge.pair(), ("alice", "bob")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_edge_is_canonical_regardless_of_author() {
        match extract("bob", "alice: how are you", "pirc_bt", ROSTER) {
            Extraction::Relationship(edge) => assert_eq!(edge.pair(), ("alice", "bob")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_micro_message_skipped() {
        assert_eq!(
            extract("alice", "bob: hi", "pirc_bt", ROSTER),
            Extraction::MicroMessage {
                dest: "bob".to_string()
            }
        );
        assert_eq!(
            extract("alice", "bob: éèà", "pirc_bt", ROSTER),
            Extraction::MicroMessage {
                dest: "bob".to_string()
            }
        );
        assert!(matches!(
            extract("alice", "bob: okay", "pirc_bt", ROSTER),
            Extraction::Relationship(_)
        ));
    }

    #[test]
    fn test_absent_dest_skipped() {
        assert_eq!(
            extract("alice", "carol: are you there?", "pirc_bt", ROSTER),
            Extraction::AbsentDest {
                dest: "carol".to_string()
            }
        );
    }

    #[test]
    fn test_addressed_to_bot() {
        assert_eq!(
            extract("alice", "pirc_bt: help", "pirc_bt", ROSTER),
            Extraction::ToBot("help".to_string())
        );
        // Short commands still reach the bot
        assert_eq!(
            extract("alice", "pirc_bt: 1", "pirc_bt", ROSTER),
            Extraction::ToBot("1".to_string())
        );
    }

    #[test]
    fn test_not_addressed() {
        let roster: Vec<String> = Vec::new();
        assert_eq!(extract("alice", "hello world", "pirc_bt", &roster), Extraction::NotAddressed);
        assert_eq!(extract("alice", "bob:no space", "pirc_bt", &roster), Extraction::NotAddressed);
        assert_eq!(extract("alice", "bob and carol: hi", "pirc_bt", &roster), Extraction::NotAddressed);
        assert_eq!(extract("alice", "", "pirc_bt", &roster), Extraction::NotAddressed);
    }

    #[test]
    fn test_irc_special_chars_in_nick() {
        assert!(matches!(
            extract("alice", "[away]`x: back soon?", "pirc_bt", ROSTER),
            Extraction::Relationship(_)
        ));
    }
}
