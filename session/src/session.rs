//! Session command dispatch
//!
//! Commands arrive as `>command args` lines; responses are newline-framed
//! blocks whose first line is a tag (`update`, `sideupdate`, `requesteddata`,
//! `end`). Per-turn anomalies never kill a session; only unknown commands and
//! malformed bundle JSON surface as `|error|` lines.

use serde::Deserialize;
use serde_json::json;

use rewind_protocol::{export_team, unpack_team, SideId};
use rewind_replay::{TurnBundle, TurnPatch};

use crate::driver::{ExportBundle, ReplayDriver};
use crate::engine::{ChoiceOutcome, Engine, FormatConfig};

/// Player registration payload for the `player` command
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerOptions {
    pub name: String,
    pub team: String,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            team: String::new(),
        }
    }
}

/// One replay session: a driver plus the command alphabet around it
pub struct ReplaySession<E: Engine> {
    driver: Option<ReplayDriver<E>>,
}

impl<E: Engine> ReplaySession<E> {
    pub fn new() -> Self {
        Self { driver: None }
    }

    pub fn driver(&self) -> Option<&ReplayDriver<E>> {
        self.driver.as_ref()
    }

    /// Process one command line and return the response blocks
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        let line = line.strip_prefix('>').unwrap_or(line).trim();
        if line.is_empty() {
            return Vec::new();
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let mut blocks = self.dispatch(command, rest);

        // Whatever the engine narrated during the command goes out too
        if let Some(driver) = self.driver.as_mut() {
            let output = driver.take_output();
            if !output.is_empty() {
                blocks.push(format!("update\n{}", output.join("\n")));
            }
        }
        blocks
    }

    fn dispatch(&mut self, command: &str, rest: &str) -> Vec<String> {
        match command {
            "version" => vec![requested(env!("CARGO_PKG_VERSION"))],

            "start" => self.cmd_start(rest),

            "player" => self.cmd_player(rest),

            "p1" | "p2" => {
                let side = if command == "p1" { SideId::P1 } else { SideId::P2 };
                self.cmd_choice(side, rest)
            }

            "forcewin" => self.with_driver(|driver| {
                driver.force_win(SideId::parse(rest).or(Some(SideId::P1)));
                Vec::new()
            }),

            "forcelose" => self.with_driver(|driver| {
                let loser = SideId::parse(rest).unwrap_or(SideId::P1);
                driver.force_win(Some(loser.opponent()));
                Vec::new()
            }),

            "forcetie" => self.with_driver(|driver| {
                driver.force_win(None);
                Vec::new()
            }),

            "tiebreak" => self.with_driver(|driver| {
                driver.tiebreak();
                Vec::new()
            }),

            "reseed" => self.with_driver(|driver| {
                let seed = rest.parse().unwrap_or_else(|_| rand::random());
                driver.reseed(seed);
                Vec::new()
            }),

            "chat" => vec![format!("update\n|chat|{}", rest)],

            "eval" => vec![error_block("eval is not supported in replay sessions")],

            "requestlog" => self.with_driver(|driver| {
                vec![requested(&driver.input_log().join("\n"))]
            }),

            "requestteam" => self.with_driver(|driver| {
                let teams: Vec<String> = [SideId::P1, SideId::P2]
                    .iter()
                    .filter_map(|side| {
                        driver
                            .packed_team(*side)
                            .map(|team| format!("{}|{}", side.as_str(), team))
                    })
                    .collect();
                vec![requested(&teams.join("\n"))]
            }),

            "requestexport" => self.with_driver(|driver| {
                let exports: Vec<String> = [SideId::P1, SideId::P2]
                    .iter()
                    .filter_map(|side| driver.packed_team(*side))
                    .map(|packed| export_team(&unpack_team(packed)))
                    .collect();
                vec![requested(&exports.join("\n"))]
            }),

            "show-openteamsheets" => self.with_driver(|driver| {
                let sheets: Vec<String> = [SideId::P1, SideId::P2]
                    .iter()
                    .filter_map(|side| {
                        driver
                            .packed_team(*side)
                            .map(|team| format!("|showteam|{}|{}", side.as_str(), team))
                    })
                    .collect();
                vec![format!("update\n{}", sheets.join("\n"))]
            }),

            "jumptoturn" => self.with_driver(|driver| match rest.parse::<usize>() {
                Ok(turn) => match driver.jump_to_turn(turn) {
                    Ok(landed) => vec![format!("update\n|jumped|{}", landed)],
                    Err(err) => vec![error_block(&format!("{:#}", err))],
                },
                Err(_) => vec![error_block("jumptoturn expects a turn number")],
            }),

            "exportstate" => self.with_driver(|driver| match driver.export_state() {
                Ok(bundle) => match serde_json::to_string(&bundle) {
                    Ok(text) => vec![requested(&text)],
                    Err(err) => vec![error_block(&err.to_string())],
                },
                Err(err) => vec![error_block(&format!("{:#}", err))],
            }),

            "loadstate" => match serde_json::from_str::<ExportBundle>(rest) {
                Ok(bundle) => self.with_driver(|driver| match driver.load_state(&bundle) {
                    Ok(()) => Vec::new(),
                    Err(err) => vec![error_block(&format!("{:#}", err))],
                }),
                Err(err) => vec![error_block(&format!("malformed bundle: {}", err))],
            },

            "patchturn" => match serde_json::from_str::<TurnPatch>(rest) {
                Ok(patch) => self.with_driver(|driver| match driver.patch_turn(&patch) {
                    Ok(()) => Vec::new(),
                    Err(err) => vec![error_block(&format!("{:#}", err))],
                }),
                Err(err) => vec![error_block(&format!("malformed patch: {}", err))],
            },

            "replayturn" => match serde_json::from_str::<TurnBundle>(rest) {
                Ok(bundle) => self.with_driver(|driver| match driver.replay_turn(&bundle) {
                    Ok(()) => Vec::new(),
                    Err(err) => vec![error_block(&format!("{:#}", err))],
                }),
                Err(err) => vec![error_block(&format!("malformed bundle: {}", err))],
            },

            "replaydone" => self.with_driver(|driver| {
                let summary = json!({
                    "turn": driver.turn(),
                    "ended": driver.ended(),
                });
                vec![format!("end\n{}", summary)]
            }),

            other => vec![error_block(&format!("unknown command: {}", other))],
        }
    }

    fn cmd_start(&mut self, rest: &str) -> Vec<String> {
        let config = if rest.is_empty() {
            Ok(FormatConfig::default())
        } else {
            serde_json::from_str::<FormatConfig>(rest)
        };
        match config {
            Ok(config) => match ReplayDriver::new(config) {
                Ok(driver) => {
                    self.driver = Some(driver);
                    Vec::new()
                }
                Err(err) => vec![error_block(&format!("{:#}", err))],
            },
            Err(err) => vec![error_block(&format!("malformed format config: {}", err))],
        }
    }

    fn cmd_player(&mut self, rest: &str) -> Vec<String> {
        let (side_str, options_json) = rest.split_once(' ').unwrap_or((rest, "{}"));
        let Some(side) = SideId::parse(side_str) else {
            return vec![error_block("player expects a side id")];
        };
        match serde_json::from_str::<PlayerOptions>(options_json) {
            Ok(options) => self.with_driver(|driver| {
                match driver.set_player(side, &options.name, &options.team) {
                    Ok(()) => Vec::new(),
                    Err(err) => vec![error_block(&format!("{:#}", err))],
                }
            }),
            Err(err) => vec![error_block(&format!("malformed player options: {}", err))],
        }
    }

    fn cmd_choice(&mut self, side: SideId, rest: &str) -> Vec<String> {
        self.with_driver(|driver| {
            if rest == "undo" {
                driver.undo_choice(side);
                return Vec::new();
            }
            match driver.choose(side, rest) {
                ChoiceOutcome::Accepted => Vec::new(),
                ChoiceOutcome::Rejected(reason) => {
                    vec![format!(
                        "sideupdate\n{}\n|error|[Invalid choice] {}",
                        side.as_str(),
                        reason
                    )]
                }
            }
        })
    }

    fn with_driver<F>(&mut self, f: F) -> Vec<String>
    where
        F: FnOnce(&mut ReplayDriver<E>) -> Vec<String>,
    {
        match self.driver.as_mut() {
            Some(driver) => f(driver),
            None => vec![error_block("session not started")],
        }
    }
}

impl<E: Engine> Default for ReplaySession<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn error_block(message: &str) -> String {
    format!("update\n|error|{}", message)
}

fn requested(data: &str) -> String {
    format!("requesteddata\n{}", data)
}
