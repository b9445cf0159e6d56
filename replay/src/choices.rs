//! Choice reconstruction
//!
//! Walks the event stream and recovers, for every turn, the choice string
//! each side must have submitted: moves with targets and tera/mega
//! declarations, switches keyed to the post-preview roster order, `default`
//! placeholders for slots that could not act, and the forced switches made
//! between turns after a knock-out.

use std::collections::{BTreeMap, BTreeSet};

use rewind_protocol::{
    species_matches, to_id, LogRecord, PokemonDetails, SideId, Slot, SlotChoice, SlotRef,
    TurnChoice,
};
use tracing::debug;

/// Reconstructed intents for one turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnIntents {
    pub turn: u32,
    /// Comma-joined choice string per side, slot order a before b
    pub p1: String,
    pub p2: String,
    /// Forced-switch string per side; empty when nothing was forced
    pub forced_p1: String,
    pub forced_p2: String,
    /// Slot letter -> species expected at that forced switch, so the driver
    /// can re-resolve team indices against the live roster order
    pub forced_p1_species: BTreeMap<String, String>,
    pub forced_p2_species: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PreBattle,
    TeamPreview,
    Battle,
    Ended,
}

#[derive(Debug, Clone)]
struct PendingAction {
    slot: Slot,
    choice: SlotChoice,
}

/// State machine folding the record stream into per-turn choices.
///
/// All mutable state lives here; the fold never reaches outside it.
pub struct ChoiceReconstructor {
    phase: Phase,
    current_turn: u32,
    between_turns: bool,
    /// Post-preview species order per side, for switch index resolution
    orders: BTreeMap<SideId, Vec<String>>,
    /// Occupant species of each active slot
    active: BTreeMap<Slot, String>,
    /// Actions observed this turn, in emission order, at most one per slot
    actions: Vec<PendingAction>,
    /// Slots that declared terastallization this turn
    teras: BTreeSet<Slot>,
    /// Slots that declared mega evolution this turn
    megas: BTreeSet<Slot>,
    /// Slots whose occupant fainted during the current turn
    fainted: BTreeSet<Slot>,
    /// Slots absorbed by an ally's ability; the engine auto-passes them
    commanding: BTreeSet<Slot>,
    turn_start_active: BTreeMap<Slot, String>,
    turn_start_commanding: BTreeSet<Slot>,
    /// Forced switches observed between upkeep and the next turn record
    forced: BTreeMap<Slot, usize>,
    forced_species: BTreeMap<Slot, String>,
    turns: Vec<TurnIntents>,
}

impl ChoiceReconstructor {
    pub fn new(orders: BTreeMap<SideId, Vec<String>>) -> Self {
        Self {
            phase: Phase::PreBattle,
            current_turn: 0,
            between_turns: false,
            orders,
            active: BTreeMap::new(),
            actions: Vec::new(),
            teras: BTreeSet::new(),
            megas: BTreeSet::new(),
            fainted: BTreeSet::new(),
            commanding: BTreeSet::new(),
            turn_start_active: BTreeMap::new(),
            turn_start_commanding: BTreeSet::new(),
            forced: BTreeMap::new(),
            forced_species: BTreeMap::new(),
            turns: Vec::new(),
        }
    }

    /// Fold one record into the state machine
    pub fn handle(&mut self, record: &LogRecord) {
        if self.phase == Phase::Ended {
            return;
        }

        match record {
            LogRecord::Start => {
                self.phase = Phase::TeamPreview;
            }

            LogRecord::Turn(n) => {
                if self.phase == Phase::Battle {
                    self.flush_turn(true);
                } else {
                    self.phase = Phase::Battle;
                }
                self.current_turn = *n;
                self.between_turns = false;
                self.turn_start_active = self.active.clone();
                self.turn_start_commanding = self.commanding.clone();
            }

            LogRecord::Upkeep => {
                self.between_turns = true;
                self.forced.clear();
                self.forced_species.clear();
            }

            LogRecord::Switch { ident, details, .. } => self.on_switch(ident, details),

            // Drags and identity changes are consequences, never choices:
            // they only move the occupant map.
            LogRecord::Drag { ident, details, .. }
            | LogRecord::Replace { ident, details, .. }
            | LogRecord::DetailsChange { ident, details, .. } => {
                if let Some(slot) = ident.slot() {
                    self.active.insert(slot, details.species_id());
                }
            }

            LogRecord::Move {
                ident,
                move_name,
                target,
                spread,
            } => self.on_move(ident, move_name, target.as_ref(), *spread),

            LogRecord::Cant { ident, .. } => {
                if self.phase == Phase::Battle {
                    if let Some(slot) = ident.slot() {
                        self.push_action(slot, SlotChoice::Default);
                    }
                }
            }

            LogRecord::Faint(ident) => {
                if let Some(slot) = ident.slot() {
                    self.fainted.insert(slot);
                    // An absorbing ally going down releases every commanding
                    // slot on that side; species clause keeps this safe.
                    let side = slot.side;
                    self.commanding.retain(|c| c.side != side);
                }
            }

            LogRecord::Terastallize { ident, .. } => {
                if let Some(slot) = ident.slot() {
                    self.teras.insert(slot);
                }
            }

            LogRecord::Mega { ident, .. } => {
                if let Some(slot) = ident.slot() {
                    self.megas.insert(slot);
                }
            }

            LogRecord::Activate { ident, effect, .. } => {
                if effect == "ability: Commander" {
                    if let Some(slot) = ident.as_ref().and_then(|i| i.slot()) {
                        self.commanding.insert(slot);
                    }
                }
            }

            LogRecord::Win(_) | LogRecord::Tie => self.finish_battle(),

            LogRecord::Message(message) if message.contains("forfeited") => self.finish_battle(),

            _ => {}
        }
    }

    /// Flush the trailing turn and return the reconstructed choices
    pub fn finish(mut self) -> Vec<TurnIntents> {
        if self.phase == Phase::Battle {
            self.flush_turn(false);
        }
        self.turns
    }

    fn finish_battle(&mut self) {
        if self.phase == Phase::Battle {
            // No forced switches after the game is decided
            self.flush_turn(false);
        }
        self.phase = Phase::Ended;
    }

    fn on_switch(&mut self, ident: &SlotRef, details: &PokemonDetails) {
        let Some(slot) = ident.slot() else { return };
        let species = details.species_id();

        if self.phase == Phase::Battle {
            if self.between_turns {
                if self.fainted.remove(&slot) {
                    let index = self.order_index(slot.side, &species);
                    self.forced.insert(slot, index);
                    self.forced_species.insert(slot, species.clone());
                }
            } else {
                let index = self.order_index(slot.side, &species);
                self.push_action(slot, SlotChoice::Switch(index));
            }
        }

        self.active.insert(slot, species);
    }

    fn on_move(
        &mut self,
        ident: &SlotRef,
        move_name: &str,
        target: Option<&SlotRef>,
        spread: bool,
    ) {
        if self.phase != Phase::Battle {
            return;
        }
        let Some(slot) = ident.slot() else { return };

        let target_loc = match (spread, target) {
            (true, _) | (false, None) => None,
            (false, Some(t)) => t.position.map(|pos| {
                let loc = (pos as u8).saturating_sub(b'a') as i8 + 1;
                if t.side == slot.side {
                    -loc
                } else {
                    loc
                }
            }),
        };

        self.push_action(
            slot,
            SlotChoice::Move {
                move_id: to_id(move_name),
                target: target_loc,
                mega: false,
                tera: false,
            },
        );
    }

    /// First action per slot wins: chained move records and the switch that
    /// follows a pivoting move must not produce a second action.
    fn push_action(&mut self, slot: Slot, choice: SlotChoice) {
        if self.actions.iter().any(|a| a.slot == slot) {
            return;
        }
        self.actions.push(PendingAction { slot, choice });
    }

    /// 1-based index of a species in the side's post-preview order.
    ///
    /// Exact id first, base form second; a miss falls back to 1 and leaves
    /// the driver's runtime species remapping to find the true index.
    fn order_index(&self, side: SideId, species: &str) -> usize {
        let order = self
            .orders
            .get(&side)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        order
            .iter()
            .position(|s| s == species)
            .or_else(|| order.iter().position(|s| species_matches(s, species)))
            .map(|i| i + 1)
            .unwrap_or_else(|| {
                debug!(side = side.as_str(), species, "species missing from post-preview order");
                1
            })
    }

    fn flush_turn(&mut self, synthesize_forced: bool) {
        if self.current_turn == 0 {
            return;
        }

        let mut intents = TurnIntents {
            turn: self.current_turn,
            ..Default::default()
        };

        for side in [SideId::P1, SideId::P2] {
            let needs_choice: Vec<Slot> = self
                .turn_start_active
                .keys()
                .filter(|s| s.side == side && !self.turn_start_commanding.contains(*s))
                .copied()
                .collect();

            // Observed actions for this side; a slot KO'd before acting has
            // neither a move nor a cant record, so fill with default.
            let mut entries: Vec<(Slot, SlotChoice)> = self
                .actions
                .iter()
                .filter(|a| needs_choice.contains(&a.slot))
                .map(|a| (a.slot, a.choice.clone()))
                .collect();
            for slot in &needs_choice {
                if !entries.iter().any(|(s, _)| s == slot) {
                    entries.push((*slot, SlotChoice::Default));
                }
            }
            entries.sort_by_key(|(slot, _)| *slot);

            let choice = TurnChoice(
                entries
                    .into_iter()
                    .map(|(slot, mut choice)| {
                        if let SlotChoice::Move { mega, tera, .. } = &mut choice {
                            *tera = *tera || self.teras.contains(&slot);
                            *mega = *mega || self.megas.contains(&slot);
                            if *tera {
                                *mega = false;
                            }
                        }
                        choice
                    })
                    .collect(),
            )
            .to_wire();

            let mut forced_entries = Vec::new();
            let mut species_map = BTreeMap::new();
            if synthesize_forced {
                let mut slots: Vec<Slot> = self
                    .turn_start_active
                    .keys()
                    .filter(|s| s.side == side)
                    .copied()
                    .collect();
                slots.sort();
                for slot in slots {
                    match self.forced.get(&slot) {
                        Some(index) => {
                            forced_entries.push(SlotChoice::Switch(*index));
                            if let Some(species) = self.forced_species.get(&slot) {
                                species_map.insert(slot.position.to_string(), species.clone());
                            }
                        }
                        None => forced_entries.push(SlotChoice::Pass),
                    }
                }
            }
            let forced_choice = TurnChoice(forced_entries);
            let forced = if forced_choice.is_all_pass() {
                String::new()
            } else {
                forced_choice.to_wire()
            };

            match side {
                SideId::P1 => {
                    intents.p1 = choice;
                    intents.forced_p1 = forced;
                    intents.forced_p1_species = species_map;
                }
                SideId::P2 => {
                    intents.p2 = choice;
                    intents.forced_p2 = forced;
                    intents.forced_p2_species = species_map;
                }
                _ => {}
            }
        }

        self.turns.push(intents);

        self.actions.clear();
        self.teras.clear();
        self.megas.clear();
        self.fainted.clear();
        self.forced.clear();
        self.forced_species.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_protocol::parse_log;

    fn reconstruct(log: &str, p1_order: &[&str], p2_order: &[&str]) -> Vec<TurnIntents> {
        let mut orders = BTreeMap::new();
        orders.insert(SideId::P1, p1_order.iter().map(|s| s.to_string()).collect());
        orders.insert(SideId::P2, p2_order.iter().map(|s| s.to_string()).collect());
        let mut rec = ChoiceReconstructor::new(orders);
        for record in parse_log(log) {
            rec.handle(&record);
        }
        rec.finish()
    }

    const P1_ORDER: &[&str] = &["fluttermane", "ogerpon-wellspring", "amoonguss", "incineroar"];
    const P2_ORDER: &[&str] = &["porygon2", "incineroar", "amoonguss", "dondozo"];

    #[test]
    fn test_doubles_first_turn_spread_and_switch() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p1b: Ogerpon|Ogerpon-Wellspring, L50, F|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|switch|p2b: Incineroar|Incineroar, L50, M|100/100
|turn|1
|move|p1a: Flutter Mane|Dazzling Gleam|p2a: Porygon2|[spread] p2a,p2b
|-damage|p2a: Porygon2|120/191
|-damage|p2b: Incineroar|130/202
|move|p1b: Ogerpon|Ivy Cudgel|p2b: Incineroar
|-damage|p2b: Incineroar|60/202
|move|p2a: Porygon2|Trick Room
|switch|p2b: Amoonguss|Amoonguss, L50|100/100
|win|Alice
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].p1, "move dazzlinggleam, move ivycudgel 2");
        assert_eq!(turns[0].p2, "move trickroom, switch 3");
        assert!(turns[0].forced_p1.is_empty());
        assert!(turns[0].forced_p2.is_empty());
    }

    #[test]
    fn test_flinch_produces_default() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p1b: Ogerpon|Ogerpon-Wellspring, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|switch|p2b: Incineroar|Incineroar, L50|100/100
|turn|1
|move|p1a: Flutter Mane|Moonblast|p2a: Porygon2
|move|p1b: Ogerpon|Ivy Cudgel|p2b: Incineroar
|move|p2a: Porygon2|Ice Beam|p1b: Ogerpon
|cant|p2b: Incineroar|flinch
|upkeep
|turn|2
|win|Alice
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert_eq!(turns[0].p2, "move icebeam 2, default");
    }

    #[test]
    fn test_faint_before_acting_fills_default_and_forces_switch() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p1b: Ogerpon|Ogerpon-Wellspring, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|switch|p2b: Incineroar|Incineroar, L50|100/100
|turn|1
|move|p1b: Ogerpon|Ivy Cudgel|p2b: Incineroar
|-damage|p2b: Incineroar|0 fnt
|faint|p2b: Incineroar
|move|p1a: Flutter Mane|Moonblast|p2a: Porygon2
|move|p2a: Porygon2|Trick Room
|upkeep
|switch|p2b: Dondozo|Dondozo, L50|100/100
|turn|2
|win|Alice
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        let first = &turns[0];
        assert_eq!(first.p2.split(", ").count(), 2);
        assert_eq!(first.p2, "move trickroom, default");
        assert_eq!(first.forced_p2, "pass, switch 4");
        assert_eq!(first.forced_p2_species.get("b").unwrap(), "dondozo");
        assert!(first.forced_p1.is_empty());
    }

    #[test]
    fn test_mid_turn_terastallize_flags_move() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|turn|1
|-terastallize|p1a: Flutter Mane|Fairy
|move|p1a: Flutter Mane|Dazzling Gleam|p2a: Porygon2
|move|p2a: Porygon2|Ice Beam|p1a: Flutter Mane
|win|Alice
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert_eq!(turns[0].p1, "move dazzlinggleam 1 terastallize");
    }

    #[test]
    fn test_terastallize_after_move_record() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|turn|1
|move|p1a: Flutter Mane|Dazzling Gleam|p2a: Porygon2
|-terastallize|p1a: Flutter Mane|Fairy
|win|Alice
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert!(turns[0].p1.ends_with(" terastallize"));
    }

    #[test]
    fn test_mega_declaration_flags_move() {
        let log = "\
|start
|switch|p1a: Gardevoir|Gardevoir, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|turn|1
|-mega|p1a: Gardevoir|Gardevoirite
|move|p1a: Gardevoir|Moonblast|p2a: Porygon2
|win|Alice
";
        let turns = reconstruct(log, &["gardevoir"], P2_ORDER);
        assert_eq!(turns[0].p1, "move moonblast 1 mega");
    }

    #[test]
    fn test_commander_suppresses_choice_until_ally_faints() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p1b: Ogerpon|Ogerpon-Wellspring, L50|100/100
|switch|p2a: Tatsugiri|Tatsugiri, L50|100/100
|switch|p2b: Dondozo|Dondozo, L50|100/100
|-activate|p2a: Tatsugiri|ability: Commander|[of] p2b: Dondozo
|turn|1
|move|p1a: Flutter Mane|Moonblast|p2b: Dondozo
|move|p1b: Ogerpon|Ivy Cudgel|p2b: Dondozo
|move|p2b: Dondozo|Order Up|p1a: Flutter Mane
|upkeep
|turn|2
|move|p1a: Flutter Mane|Moonblast|p2b: Dondozo
|-damage|p2b: Dondozo|0 fnt
|faint|p2b: Dondozo
|move|p1b: Ogerpon|Ivy Cudgel|p2a: Tatsugiri
|upkeep
|turn|3
|move|p2a: Tatsugiri|Muddy Water
|move|p1a: Flutter Mane|Moonblast|p2a: Tatsugiri
|win|Alice
";
        let turns = reconstruct(log, P1_ORDER, &["tatsugiri", "dondozo", "amoonguss", "porygon2"]);
        // Turns 1 and 2: Tatsugiri is commanding, only Dondozo's slot chooses
        assert_eq!(turns[0].p2, "move orderup 1");
        assert_eq!(turns[1].p2, "default");
        // Turn 3: released by the ally faint, the slot chooses again
        assert_eq!(turns[2].p2.split(", ").count(), 2);
        assert!(turns[2].p2.starts_with("move muddywater"));
    }

    #[test]
    fn test_pivot_switch_is_not_a_second_action() {
        let log = "\
|start
|switch|p1a: Incineroar|Incineroar, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|turn|1
|move|p1a: Incineroar|Parting Shot|p2a: Porygon2
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|move|p2a: Porygon2|Ice Beam|p1a: Flutter Mane
|win|Bob
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert_eq!(turns[0].p1, "move partingshot 1");
    }

    #[test]
    fn test_drag_emits_no_action() {
        let log = "\
|start
|switch|p1a: Incineroar|Incineroar, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|turn|1
|move|p2a: Porygon2|Whirlwind|p1a: Incineroar
|drag|p1a: Amoonguss|Amoonguss, L50|100/100
|win|Bob
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert_eq!(turns[0].p1, "default");
    }

    #[test]
    fn test_turn_with_no_events_flushes_defaults() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p1b: Ogerpon|Ogerpon-Wellspring, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|switch|p2b: Incineroar|Incineroar, L50|100/100
|turn|1
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].p1, "default, default");
        assert_eq!(turns[0].p2, "default, default");
    }

    #[test]
    fn test_forfeit_flushes_without_forced_switches() {
        let log = "\
|start
|switch|p1a: Flutter Mane|Flutter Mane, L50|100/100
|switch|p2a: Porygon2|Porygon2, L50|100/100
|turn|1
|move|p1a: Flutter Mane|Moonblast|p2a: Porygon2
|-damage|p2a: Porygon2|0 fnt
|faint|p2a: Porygon2
|upkeep
|-message|Bob forfeited.
|win|Alice
";
        let turns = reconstruct(log, P1_ORDER, P2_ORDER);
        assert_eq!(turns.len(), 1);
        assert!(turns[0].forced_p2.is_empty());
    }

    #[test]
    fn test_empty_log_yields_no_turns() {
        let turns = reconstruct("", P1_ORDER, P2_ORDER);
        assert!(turns.is_empty());
    }
}
