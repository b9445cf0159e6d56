//! Replay driver
//!
//! Owns the live engine for the duration of a replay. Per turn: submit both
//! recorded choices, resolve forced switches against the engine's current
//! roster order, auto-resolve whatever the divergent simulation still asks
//! for, apply the recorded state patch, and rewrite the turn snapshot so
//! resumption always lands on the recorded state.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use rewind_protocol::{species_matches, SideId, Slot};
use rewind_replay::{ReplayScript, TurnBundle, TurnPatch};

use crate::engine::{ChoiceOutcome, Engine, FormatConfig, PokemonUpdate, RequestKind, SideView};
use crate::snapshot::patch_snapshot;

const AUTO_RESOLVE_LIMIT: usize = 10;

/// Everything a session can export or restore in one piece
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportBundle {
    pub format_id: String,
    pub turn: usize,
    pub state: Value,
    pub state_by_turn: Vec<Value>,
    pub log: Vec<String>,
}

/// Drives a live engine through a parsed replay
pub struct ReplayDriver<E: Engine> {
    config: FormatConfig,
    engine: E,
    input_log: Vec<String>,
    teams: BTreeMap<SideId, String>,
}

impl<E: Engine> ReplayDriver<E> {
    pub fn new(config: FormatConfig) -> Result<Self> {
        let engine = E::new(&config)?;
        Ok(Self {
            config,
            engine,
            input_log: Vec::new(),
            teams: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &FormatConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn turn(&self) -> usize {
        self.engine.turn()
    }

    pub fn ended(&self) -> bool {
        self.engine.ended()
    }

    pub fn packed_team(&self, side: SideId) -> Option<&str> {
        self.teams.get(&side).map(String::as_str)
    }

    pub fn input_log(&self) -> &[String] {
        &self.input_log
    }

    /// Drain engine output accumulated since the last call
    pub fn take_output(&mut self) -> Vec<String> {
        self.engine.take_output()
    }

    pub fn set_player(&mut self, side: SideId, name: &str, packed_team: &str) -> Result<()> {
        self.input_log
            .push(format!(">player {} {}", side.as_str(), name));
        self.teams.insert(side, packed_team.to_string());
        self.engine.set_player(side, name, packed_team)
    }

    /// Submit a raw choice string, recording it in the input log
    pub fn choose(&mut self, side: SideId, choice: &str) -> ChoiceOutcome {
        self.input_log
            .push(format!(">{} {}", side.as_str(), choice));
        self.engine.choose(side, choice)
    }

    pub fn undo_choice(&mut self, side: SideId) {
        self.input_log.push(format!(">{} undo", side.as_str()));
        self.engine.undo_choice(side);
    }

    pub fn force_win(&mut self, winner: Option<SideId>) {
        self.engine.force_win(winner);
    }

    pub fn tiebreak(&mut self) {
        self.engine.tiebreak();
    }

    pub fn reseed(&mut self, seed: u64) {
        self.engine.reseed(seed);
    }

    /// Register both players and replay every turn of a parsed script
    pub fn run_script(&mut self, script: &ReplayScript) -> Result<()> {
        let p1_name = non_empty(&script.p1.username, "Player 1");
        let p2_name = non_empty(&script.p2.username, "Player 2");
        self.set_player(SideId::P1, p1_name, &script.p1.packed)?;
        self.set_player(SideId::P2, p2_name, &script.p2.packed)?;

        for (side, plan) in [(SideId::P1, &script.p1), (SideId::P2, &script.p2)] {
            if plan.preview_choice.starts_with("team ") {
                if let ChoiceOutcome::Rejected(reason) = self.choose(side, &plan.preview_choice) {
                    warn!(side = side.as_str(), %reason, "team preview rejected");
                }
            }
        }

        for bundle in &script.turns {
            self.replay_turn(bundle)?;
        }
        Ok(())
    }

    /// Process a single turn end-to-end.
    ///
    /// Rejected choices are non-fatal: the patch at the end of the turn
    /// erases whatever the divergent simulation did instead.
    pub fn replay_turn(&mut self, bundle: &TurnBundle) -> Result<()> {
        let result = self.replay_turn_inner(bundle);
        if result.is_err() {
            // Never leave the engine waiting on a dead request
            self.engine.clear_pending();
            for side in [SideId::P1, SideId::P2] {
                self.engine.force_request_state(side, RequestKind::Move);
            }
        }
        result
    }

    fn replay_turn_inner(&mut self, bundle: &TurnBundle) -> Result<()> {
        let turn_before = self.engine.turn();

        for (side, choice) in [(SideId::P1, &bundle.p1_choice), (SideId::P2, &bundle.p2_choice)] {
            if choice.is_empty() {
                continue;
            }
            if let ChoiceOutcome::Rejected(reason) = self.choose(side, choice) {
                debug!(side = side.as_str(), %choice, %reason, "recorded choice rejected");
            }
        }

        for side in [SideId::P1, SideId::P2] {
            let (forced, species) = match side {
                SideId::P1 => (&bundle.forced_p1, &bundle.forced_p1_species),
                _ => (&bundle.forced_p2, &bundle.forced_p2_species),
            };
            if forced.is_empty() {
                continue;
            }
            let resolved = self.resolve_forced_switch(side, forced, species);
            if let ChoiceOutcome::Rejected(reason) = self.choose(side, &resolved) {
                debug!(
                    side = side.as_str(),
                    forced = %resolved,
                    %reason,
                    "forced switch rejected"
                );
            }
        }

        self.auto_resolve_switches();

        if self.engine.turn() == turn_before && !self.engine.ended() {
            warn!(turn = turn_before, "turn did not advance; force-advancing");
            self.engine.clear_pending();
            self.engine.force_turn(turn_before + 1);
            let placeholder = self.engine.to_json()?;
            let turn = self.engine.turn();
            let states = self.engine.state_by_turn_mut();
            while states.len() < turn {
                states.push(placeholder.clone());
            }
        }

        self.apply_patch(&bundle.patch)?;
        self.resync_snapshot()?;
        self.reprime(RequestKind::Move);
        Ok(())
    }

    /// While the divergent sim still demands switches, feed it defaults; a
    /// rejected default means no valid target is left, so clear the request.
    fn auto_resolve_switches(&mut self) {
        'outer: for _ in 0..AUTO_RESOLVE_LIMIT {
            let pending: Vec<SideId> = [SideId::P1, SideId::P2]
                .into_iter()
                .filter(|side| self.engine.request_state(*side) == RequestKind::Switch)
                .collect();
            if pending.is_empty() {
                break;
            }
            for side in pending {
                if let ChoiceOutcome::Rejected(reason) = self.choose(side, "default") {
                    debug!(
                        side = side.as_str(),
                        %reason, "default rejected; clearing stuck switch request"
                    );
                    self.engine.clear_pending();
                    self.engine.force_request_state(side, RequestKind::Move);
                    break 'outer;
                }
            }
        }
    }

    /// Rewrite `switch K` indices against the engine's current roster order.
    ///
    /// The recorded index is keyed to the post-preview order, but the engine
    /// reorders its roster on every switch-in; the expected species is what
    /// survives, so search for it among benched, unfainted creatures.
    pub fn resolve_forced_switch(
        &self,
        side: SideId,
        forced: &str,
        species_map: &BTreeMap<String, String>,
    ) -> String {
        let view = self.engine.side_view(side);
        let slotted: Vec<usize> = view.active.iter().flatten().copied().collect();

        forced
            .split(',')
            .map(str::trim)
            .enumerate()
            .map(|(position, entry)| {
                if !entry.starts_with("switch ") {
                    return entry.to_string();
                }
                let letter = char::from(b'a' + position as u8).to_string();
                let Some(expected) = species_map.get(&letter) else {
                    return entry.to_string();
                };
                let found = (0..view.pokemon.len()).find(|&index| {
                    !slotted.contains(&index)
                        && !view.pokemon[index].fainted
                        && species_matches(&view.pokemon[index].species, expected)
                });
                match found {
                    Some(index) => format!("switch {}", index + 1),
                    None => entry.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Apply one turn's recorded corrections to the live engine
    pub fn apply_patch(&mut self, patch: &TurnPatch) -> Result<()> {
        // Occupants first so HP and status land on the right creature
        for entry in &patch.active {
            let Some(slot) = Slot::parse(&entry.slot) else {
                continue;
            };
            let view = self.engine.side_view(slot.side);
            let position = slot.index();
            let matches = view
                .active_species(position)
                .map(|s| species_matches(s, &entry.species))
                .unwrap_or(false);
            if matches {
                continue;
            }
            let Some(index) = view.find_species(&entry.species) else {
                warn!(
                    species = %entry.species,
                    "patched occupant not found in engine roster"
                );
                continue;
            };
            self.engine.set_active(slot.side, position, index)?;
        }

        for entry in &patch.hp {
            let Some(slot) = Slot::parse(&entry.slot) else {
                continue;
            };
            let view = self.engine.side_view(slot.side);
            let Some(index) = view.active.get(slot.index()).copied().flatten() else {
                continue;
            };
            let update = PokemonUpdate {
                hp: Some(hp_from_percent(
                    entry.percent,
                    view.pokemon[index].max_hp,
                    entry.fainted,
                )),
                status: None,
                fainted: Some(entry.fainted),
            };
            self.engine.apply_update(slot.side, index, &update)?;
        }

        for entry in &patch.status {
            let Some(slot) = Slot::parse(&entry.slot) else {
                continue;
            };
            let view = self.engine.side_view(slot.side);
            let Some(index) = view.active.get(slot.index()).copied().flatten() else {
                continue;
            };
            let update = PokemonUpdate {
                hp: None,
                status: Some(entry.status.clone()),
                fainted: None,
            };
            self.engine.apply_update(slot.side, index, &update)?;
        }

        for entry in &patch.bench {
            let Some(side) = SideId::parse(&entry.side) else {
                continue;
            };
            let view = self.engine.side_view(side);
            let slotted: Vec<usize> = view.active.iter().flatten().copied().collect();
            let found = (0..view.pokemon.len())
                .filter(|index| !slotted.contains(index))
                .find(|&index| species_matches(&view.pokemon[index].species, &entry.species))
                .or_else(|| view.find_species(&entry.species));
            let Some(index) = found else {
                continue;
            };
            let update = PokemonUpdate {
                hp: Some(hp_from_percent(
                    entry.percent,
                    view.pokemon[index].max_hp,
                    entry.fainted,
                )),
                status: Some(entry.status.clone()),
                fainted: Some(entry.fainted),
            };
            self.engine.apply_update(side, index, &update)?;
        }

        Ok(())
    }

    /// Apply a patch outside the replay pipeline and resync the snapshot
    pub fn patch_turn(&mut self, patch: &TurnPatch) -> Result<()> {
        self.apply_patch(patch)?;
        self.resync_snapshot()
    }

    /// Rewrite the snapshot the engine's turn hook saved for the turn that
    /// just ended, which predates forced switches and the patch.
    fn resync_snapshot(&mut self) -> Result<()> {
        let index = self.engine.turn().saturating_sub(1);
        let views: Vec<(SideId, SideView)> = [SideId::P1, SideId::P2]
            .into_iter()
            .map(|side| (side, self.engine.side_view(side)))
            .collect();
        let active_count = self.config.active_slots();

        let fresh = self.engine.to_json()?;
        let states = self.engine.state_by_turn_mut();
        while states.len() <= index {
            states.push(fresh.clone());
        }
        let (history, tail) = states.split_at_mut(index);
        patch_snapshot(&mut tail[0], &views, active_count, history)
    }

    /// Replace the live engine with one deserialized from the snapshot at
    /// `turn` (or the nearest earlier turn), re-primed for the next choice.
    ///
    /// A deserialization failure keeps the live engine unchanged.
    pub fn jump_to_turn(&mut self, turn: usize) -> Result<usize> {
        let states = self.engine.state_by_turn();
        if states.is_empty() {
            bail!("no snapshots recorded yet");
        }
        let target = turn.min(states.len() - 1);
        let snapshot = states[target].clone();
        let saved = states.to_vec();

        let mut engine = E::from_json(&self.config, &snapshot)
            .with_context(|| format!("failed to restore snapshot for turn {}", target))?;
        *engine.state_by_turn_mut() = saved;
        self.engine = engine;

        let kind = if target == 0 {
            RequestKind::TeamPreview
        } else {
            RequestKind::Move
        };
        self.reprime(kind);
        Ok(target)
    }

    /// Replace the engine from an externally provided bundle
    pub fn load_state(&mut self, bundle: &ExportBundle) -> Result<()> {
        let mut engine = E::from_json(&self.config, &bundle.state)
            .context("failed to restore engine from bundle")?;
        *engine.state_by_turn_mut() = bundle.state_by_turn.clone();
        self.engine = engine;
        if !bundle.log.is_empty() {
            self.input_log = bundle.log.clone();
        }
        self.reprime(RequestKind::Move);
        Ok(())
    }

    /// Export the engine state, the snapshot array, and the input log
    pub fn export_state(&self) -> Result<ExportBundle> {
        Ok(ExportBundle {
            format_id: self.config.format_id.clone(),
            turn: self.engine.turn(),
            state: self.engine.to_json()?,
            state_by_turn: self.engine.state_by_turn().to_vec(),
            log: self.input_log.clone(),
        })
    }

    /// Ensure the engine's next request matches `kind`, falling back to
    /// forcing the request state when the engine refuses.
    fn reprime(&mut self, kind: RequestKind) {
        let primed = [SideId::P1, SideId::P2]
            .iter()
            .all(|side| self.engine.request_state(*side) == kind);
        if primed || self.engine.ended() {
            return;
        }
        if self.engine.make_request(kind).is_err() {
            self.engine.clear_pending();
            for side in [SideId::P1, SideId::P2] {
                self.engine.force_request_state(side, kind);
            }
        }
    }
}

fn hp_from_percent(percent: u8, max_hp: u32, fainted: bool) -> u32 {
    if fainted {
        return 0;
    }
    let raw = ((percent as f64) * (max_hp as f64) / 100.0).round() as u32;
    raw.clamp(1, max_hp.max(1))
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
