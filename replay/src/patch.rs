//! Per-turn state patches
//!
//! A cumulative single-pass walker, independent of choice reconstruction.
//! For each turn it emits the corrections the driver applies to the live
//! engine: HP and status by slot, end-of-turn slot occupants, and the state
//! of every benched creature.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rewind_protocol::{HpStatus, LogRecord, SideId, Slot, SlotRef};

/// HP correction for one active slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HpEntry {
    pub slot: String,
    pub percent: u8,
    pub fainted: bool,
}

/// Status correction for one active slot; empty string clears
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub slot: String,
    pub status: String,
}

/// End-of-turn occupant of one active slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEntry {
    pub slot: String,
    pub species: String,
}

/// Cumulative state of one benched creature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchEntry {
    pub side: String,
    pub species: String,
    pub percent: u8,
    pub fainted: bool,
    pub status: String,
}

/// State corrections for one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnPatch {
    pub hp: Vec<HpEntry>,
    pub status: Vec<StatusEntry>,
    pub active: Vec<ActiveEntry>,
    pub bench: Vec<BenchEntry>,
}

impl TurnPatch {
    pub fn is_empty(&self) -> bool {
        self.hp.is_empty()
            && self.status.is_empty()
            && self.active.is_empty()
            && self.bench.is_empty()
    }
}

#[derive(Debug, Clone)]
struct TrackState {
    percent: u8,
    fainted: bool,
    status: String,
}

impl Default for TrackState {
    fn default() -> Self {
        Self {
            percent: 100,
            fainted: false,
            status: String::new(),
        }
    }
}

/// Walks the record stream and accumulates per-turn patches
pub struct PatchExtractor {
    current_turn: u32,
    ended: bool,
    /// Occupant species of each active slot
    active: BTreeMap<Slot, String>,
    /// Latest known state per creature, per side, in encounter order
    trackers: BTreeMap<SideId, Vec<(String, TrackState)>>,
    /// Slot-local deltas for the turn in progress
    hp_local: BTreeMap<Slot, (u8, bool)>,
    status_local: BTreeMap<Slot, String>,
    patches: Vec<TurnPatch>,
}

impl PatchExtractor {
    pub fn new() -> Self {
        Self {
            current_turn: 0,
            ended: false,
            active: BTreeMap::new(),
            trackers: BTreeMap::new(),
            hp_local: BTreeMap::new(),
            status_local: BTreeMap::new(),
            patches: Vec::new(),
        }
    }

    /// Fold one record into the walker
    pub fn handle(&mut self, record: &LogRecord) {
        if self.ended {
            return;
        }

        match record {
            LogRecord::Turn(n) => {
                if self.current_turn > 0 {
                    self.emit();
                } else {
                    // Lead switch-ins are not part of the first turn's deltas
                    self.hp_local.clear();
                    self.status_local.clear();
                }
                self.current_turn = *n;
            }

            LogRecord::Switch { ident, details, hp }
            | LogRecord::Drag { ident, details, hp }
            | LogRecord::Replace { ident, details, hp } => {
                self.on_switch(ident, details.species_id(), hp.as_ref());
            }

            LogRecord::DetailsChange { ident, details, .. } => {
                let Some(slot) = ident.slot() else { return };
                let species = details.species_id();
                if let Some(old) = self.active.get(&slot).cloned() {
                    let entries = self.trackers.entry(slot.side).or_default();
                    if let Some(entry) = entries.iter_mut().find(|(s, _)| *s == old) {
                        entry.0 = species.clone();
                    }
                }
                self.active.insert(slot, species);
            }

            LogRecord::Damage { ident, hp } | LogRecord::Heal { ident, hp } => {
                self.on_hp_change(ident, hp.as_ref());
            }

            LogRecord::Faint(ident) => {
                let Some(slot) = ident.slot() else { return };
                self.hp_local.insert(slot, (0, true));
                if let Some(species) = self.active.get(&slot).cloned() {
                    let state = self.track(slot.side, &species);
                    state.percent = 0;
                    state.fainted = true;
                }
            }

            LogRecord::Status { ident, status } => self.on_status(ident, status),

            LogRecord::CureStatus { ident, .. } => self.on_status(ident, ""),

            LogRecord::Win(_) | LogRecord::Tie => self.finish_battle(),

            LogRecord::Message(message) if message.contains("forfeited") => self.finish_battle(),

            _ => {}
        }
    }

    /// Emit the trailing turn and return all patches, index 0 = turn 1
    pub fn finish(mut self) -> Vec<TurnPatch> {
        if self.current_turn > 0 && !self.ended {
            self.emit();
        }
        self.patches
    }

    fn finish_battle(&mut self) {
        if self.current_turn > 0 {
            self.emit();
        }
        self.ended = true;
    }

    fn on_switch(&mut self, ident: &SlotRef, species: String, hp: Option<&HpStatus>) {
        let Some(slot) = ident.slot() else { return };

        if let Some(hp) = hp {
            let percent = hp.percent();
            let fainted = hp.is_fainted();
            // A switch-in with no trailing tag explicitly clears status
            let status = hp.status_tag().unwrap_or("").to_string();

            let state = self.track(slot.side, &species);
            state.percent = percent;
            state.fainted = fainted;
            state.status = status.clone();

            self.hp_local.insert(slot, (percent, fainted));
            self.status_local.insert(slot, status);
        } else {
            self.track(slot.side, &species);
        }

        self.active.insert(slot, species);
    }

    fn on_hp_change(&mut self, ident: &SlotRef, hp: Option<&HpStatus>) {
        let Some(slot) = ident.slot() else { return };
        let Some(hp) = hp else { return };
        let Some(species) = self.active.get(&slot).cloned() else {
            return;
        };

        let percent = hp.percent();
        let fainted = hp.is_fainted();
        self.hp_local.insert(slot, (percent, fainted));

        let tag = hp.status_tag().map(str::to_string);
        let state = self.track(slot.side, &species);
        state.percent = percent;
        state.fainted = fainted;
        if let Some(tag) = tag {
            state.status = tag.clone();
            self.status_local.insert(slot, tag);
        }
    }

    fn on_status(&mut self, ident: &SlotRef, status: &str) {
        let Some(slot) = ident.slot() else { return };
        self.status_local.insert(slot, status.to_string());
        if let Some(species) = self.active.get(&slot).cloned() {
            self.track(slot.side, &species).status = status.to_string();
        }
    }

    fn track(&mut self, side: SideId, species: &str) -> &mut TrackState {
        let entries = self.trackers.entry(side).or_default();
        if let Some(index) = entries.iter().position(|(s, _)| s == species) {
            &mut entries[index].1
        } else {
            entries.push((species.to_string(), TrackState::default()));
            &mut entries.last_mut().expect("just pushed").1
        }
    }

    fn emit(&mut self) {
        let mut patch = TurnPatch::default();

        for (slot, (percent, fainted)) in &self.hp_local {
            patch.hp.push(HpEntry {
                slot: slot.to_wire(),
                percent: *percent,
                fainted: *fainted,
            });
        }

        for (slot, status) in &self.status_local {
            patch.status.push(StatusEntry {
                slot: slot.to_wire(),
                status: status.clone(),
            });
        }

        // Full occupant map, not a delta: together with the bench it
        // partitions the side's brought roster every turn.
        for (slot, species) in &self.active {
            patch.active.push(ActiveEntry {
                slot: slot.to_wire(),
                species: species.clone(),
            });
        }

        for side in [SideId::P1, SideId::P2] {
            let on_field: Vec<&String> = self
                .active
                .iter()
                .filter(|(slot, _)| slot.side == side)
                .map(|(_, species)| species)
                .collect();
            if let Some(entries) = self.trackers.get(&side) {
                for (species, state) in entries {
                    if !on_field.contains(&species) {
                        patch.bench.push(BenchEntry {
                            side: side.as_str().to_string(),
                            species: species.clone(),
                            percent: state.percent,
                            fainted: state.fainted,
                            status: state.status.clone(),
                        });
                    }
                }
            }
        }

        self.patches.push(patch);
        self.hp_local.clear();
        self.status_local.clear();
    }
}

impl Default for PatchExtractor {
    fn default() -> Self {
        Self::new()
    }
}
