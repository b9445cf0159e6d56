//! Replay script assembly
//!
//! One call turns a raw log into everything the driver needs: packed teams
//! for player registration, team-preview commands, and a bundle per turn.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use rewind_protocol::{parse_log, LogRecord, SideId, TeamMember};

use crate::choices::ChoiceReconstructor;
use crate::patch::{PatchExtractor, TurnPatch};
use crate::preview::resolve_preview;
use crate::roster::{Appearances, Rosters};

/// Everything the driver needs to process one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnBundle {
    pub turn: u32,
    pub p1_choice: String,
    pub p2_choice: String,
    pub patch: TurnPatch,
    pub forced_p1: String,
    pub forced_p2: String,
    pub forced_p1_species: BTreeMap<String, String>,
    pub forced_p2_species: BTreeMap<String, String>,
}

/// Parsing knobs
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Creatures each side brings to battle (4 in the usual doubles formats)
    pub bring_count: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self { bring_count: 4 }
    }
}

/// One side's pre-battle plan
#[derive(Debug, Clone, Default)]
pub struct SidePlan {
    pub username: String,
    /// Raw packed declaration, empty when the side never declared
    pub packed: String,
    pub roster: Vec<TeamMember>,
    /// Team-selection command for the engine
    pub preview_choice: String,
    /// Roster order the engine uses after selection
    pub post_preview_order: Vec<String>,
}

/// A fully parsed replay, ready to drive
#[derive(Debug, Clone, Default)]
pub struct ReplayScript {
    pub p1: SidePlan,
    pub p2: SidePlan,
    pub turns: Vec<TurnBundle>,
    pub turn_count: u32,
    pub winner: Option<String>,
}

impl ReplayScript {
    pub fn parse(log: &str) -> Result<Self> {
        Self::parse_with(log, ReplayOptions::default())
    }

    pub fn parse_with(log: &str, options: ReplayOptions) -> Result<Self> {
        let records: Vec<LogRecord> = parse_log(log).collect();

        let rosters = Rosters::extract(&records);
        let appearances = Appearances::scan(&records);

        let mut orders = BTreeMap::new();
        let mut plans: BTreeMap<SideId, SidePlan> = BTreeMap::new();
        for side in [SideId::P1, SideId::P2] {
            let preview =
                resolve_preview(rosters.side(side), appearances.side(side), options.bring_count);
            orders.insert(side, preview.order.clone());
            plans.insert(
                side,
                SidePlan {
                    username: String::new(),
                    packed: rosters.packed(side).unwrap_or("").to_string(),
                    roster: rosters.side(side).to_vec(),
                    preview_choice: preview.choice,
                    post_preview_order: preview.order,
                },
            );
        }

        for record in &records {
            if let LogRecord::Player { side, username } = record {
                if let Some(plan) = plans.get_mut(side) {
                    if plan.username.is_empty() {
                        plan.username = username.clone();
                    }
                }
            }
        }

        let mut reconstructor = ChoiceReconstructor::new(orders);
        let mut extractor = PatchExtractor::new();
        for record in &records {
            reconstructor.handle(record);
            extractor.handle(record);
        }
        let intents = reconstructor.finish();
        let patches = extractor.finish();

        let turn_count = records
            .iter()
            .filter_map(|r| match r {
                LogRecord::Turn(n) => Some(*n),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let winner = records.iter().find_map(|r| match r {
            LogRecord::Win(user) => Some(user.clone()),
            _ => None,
        });

        let turns = (1..=turn_count)
            .map(|turn| {
                let intent = intents.iter().find(|i| i.turn == turn);
                let patch = patches
                    .get((turn - 1) as usize)
                    .cloned()
                    .unwrap_or_default();
                match intent {
                    Some(intent) => TurnBundle {
                        turn,
                        p1_choice: intent.p1.clone(),
                        p2_choice: intent.p2.clone(),
                        patch,
                        forced_p1: intent.forced_p1.clone(),
                        forced_p2: intent.forced_p2.clone(),
                        forced_p1_species: intent.forced_p1_species.clone(),
                        forced_p2_species: intent.forced_p2_species.clone(),
                    },
                    None => TurnBundle {
                        turn,
                        patch,
                        ..Default::default()
                    },
                }
            })
            .collect();

        Ok(ReplayScript {
            p1: plans.remove(&SideId::P1).unwrap_or_default(),
            p2: plans.remove(&SideId::P2).unwrap_or_default(),
            turns,
            turn_count,
            winner,
        })
    }

    pub fn side(&self, side: SideId) -> &SidePlan {
        match side {
            SideId::P2 => &self.p2,
            _ => &self.p1,
        }
    }
}
