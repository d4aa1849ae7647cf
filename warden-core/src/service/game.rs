//! Game-specific command templates: how to ask for the player count,
//! how to read the answer, and how to broadcast a message.

use serde::{Deserialize, Serialize};

/// How to extract a player count from the reply to `players_command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerCountFormat {
    /// The first number in the reply, e.g.
    /// `There are 3 of a max of 20 players online`.
    FirstNumber,
    /// One line per player, each starting with an index, e.g.
    /// `0. Alice, 7656119...`.
    NumberedLines,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameProfile {
    /// Command that lists connected players.
    pub players_command: String,
    pub player_count: PlayerCountFormat,
    /// Broadcast template; `{message}` is replaced by the text.
    pub broadcast_command: String,
    /// Optional command sent over the open channel before the process is
    /// terminated (for example `save` or `quit`).
    pub stop_command: Option<String>,
}

impl Default for GameProfile {
    fn default() -> Self {
        Self {
            players_command: "list".into(),
            player_count: PlayerCountFormat::FirstNumber,
            broadcast_command: "say {message}".into(),
            stop_command: None,
        }
    }
}

impl GameProfile {
    pub fn parse_player_count(&self, reply: &str) -> Option<u32> {
        match self.player_count {
            PlayerCountFormat::FirstNumber => {
                let digits: String = reply
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                digits.parse().ok()
            }
            PlayerCountFormat::NumberedLines => {
                let count = reply
                    .lines()
                    .filter(|line| {
                        line.trim_start()
                            .chars()
                            .next()
                            .is_some_and(|c| c.is_ascii_digit())
                    })
                    .count();
                Some(count as u32)
            }
        }
    }

    pub fn broadcast(&self, message: &str) -> String {
        self.broadcast_command.replace("{message}", message)
    }
}
