//! In-memory engine double
//!
//! A miniature battle engine implementing the [`Engine`] trait with its own
//! seeded RNG for damage rolls. Replayed outcomes deliberately drift from
//! any recorded log, which is exactly what the driver's patches exist to
//! erase. Used by the test suite and the example binaries.

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use rewind_protocol::{unpack_team, SideId};

use crate::engine::{
    ChoiceOutcome, Engine, FormatConfig, PokemonUpdate, PokemonView, RequestKind, SideView,
};

#[derive(Debug, Clone, Default)]
struct MockSide {
    name: String,
    team: Vec<MockPokemon>,
    registered: bool,
}

#[derive(Debug, Clone)]
struct MockPokemon {
    species: String,
    moves: Vec<String>,
    hp: u32,
    max_hp: u32,
    status: String,
    fainted: bool,
    active: bool,
}

#[derive(Debug, Clone)]
enum MockAction {
    Move { target: Option<i8> },
    Switch(usize),
    Default,
}

/// Deterministic, divergent mini-engine
pub struct MockEngine {
    config: FormatConfig,
    rng: StdRng,
    turn: usize,
    leads_out: bool,
    ended: bool,
    winner: Option<String>,
    sides: [MockSide; 2],
    requests: [RequestKind; 2],
    pending: [Option<Vec<MockAction>>; 2],
    needs_switch: [Vec<usize>; 2],
    states: Vec<Value>,
    output: Vec<String>,
}

impl MockEngine {
    fn side_index(side: SideId) -> usize {
        match side {
            SideId::P2 => 1,
            _ => 0,
        }
    }

    fn side_tag(side_index: usize) -> &'static str {
        if side_index == 0 {
            "p1"
        } else {
            "p2"
        }
    }

    fn slot_count(&self, side_index: usize) -> usize {
        self.config
            .active_slots()
            .min(self.sides[side_index].team.len())
    }

    fn slot_name(&self, side_index: usize, position: usize) -> String {
        let letter = char::from(b'a' + position as u8);
        let species = self.sides[side_index]
            .team
            .get(position)
            .map(|p| p.species.as_str())
            .unwrap_or("?");
        format!("{}{}: {}", Self::side_tag(side_index), letter, species)
    }

    fn snapshot(&self) -> Value {
        json!({
            "turn": self.turn,
            "ended": self.ended,
            "winner": self.winner,
            "sides": [self.side_json(0), self.side_json(1)],
        })
    }

    fn side_json(&self, side_index: usize) -> Value {
        let side = &self.sides[side_index];
        let len = side.team.len();
        let encoding = if len <= 9 {
            (1..=len).map(|i| i.to_string()).collect::<String>()
        } else {
            (1..=len)
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        json!({
            "id": Self::side_tag(side_index),
            "name": side.name,
            "team": encoding,
            "pokemon": side
                .team
                .iter()
                .enumerate()
                .map(|(position, p)| json!({
                    "species": p.species,
                    "hp": p.hp,
                    "maxhp": p.max_hp,
                    "status": p.status,
                    "fainted": p.fainted,
                    "isActive": p.active,
                    "position": position,
                    "moves": p.moves,
                }))
                .collect::<Vec<_>>(),
        })
    }

    fn start_battle(&mut self) {
        self.output.push("|start".to_string());
        for side_index in 0..2 {
            for position in 0..self.slot_count(side_index) {
                self.sides[side_index].team[position].active = true;
                let line = format!("|switch|{}", self.slot_name(side_index, position));
                self.output.push(line);
            }
        }
        self.leads_out = true;
        self.turn = 1;
        self.requests = [RequestKind::Move, RequestKind::Move];
        self.output.push("|turn|1".to_string());
    }

    fn next_turn(&mut self) {
        self.turn += 1;
        // Entry turn - 1 holds the end state of the turn that just finished
        let snapshot = self.snapshot();
        self.states.push(snapshot);
        self.requests = [RequestKind::Move, RequestKind::Move];
        self.output.push(format!("|turn|{}", self.turn));
    }

    fn parse_team_order(&self, side_index: usize, choice: &str) -> Result<Vec<usize>, String> {
        let digits = choice
            .strip_prefix("team")
            .ok_or_else(|| "expected a team choice".to_string())?
            .trim();
        let team_len = self.sides[side_index].team.len();
        let mut order = Vec::new();
        for c in digits.chars().filter(|c| c.is_ascii_digit()) {
            let index = (c as u8 - b'0') as usize;
            if index == 0 || index > team_len {
                return Err(format!("team index {} out of range", index));
            }
            if !order.contains(&(index - 1)) {
                order.push(index - 1);
            }
        }
        if order.is_empty() {
            return Err("empty team selection".to_string());
        }
        Ok(order)
    }

    fn parse_turn_choice(&self, side_index: usize, choice: &str) -> Result<Vec<MockAction>, String> {
        let entries: Vec<&str> = choice.split(',').map(str::trim).collect();
        let expected = self.slot_count(side_index);
        if entries.len() != expected {
            return Err(format!(
                "expected {} choices, got {}",
                expected,
                entries.len()
            ));
        }

        let team = &self.sides[side_index].team;
        let mut actions = Vec::new();
        for (position, entry) in entries.iter().enumerate() {
            let tokens: Vec<&str> = entry.split_whitespace().collect();
            match tokens.first().copied() {
                Some("move") => {
                    let move_id = tokens
                        .get(1)
                        .ok_or_else(|| "move without a move id".to_string())?;
                    let user = &team[position];
                    if user.fainted {
                        return Err(format!("{} is fainted and cannot move", user.species));
                    }
                    let known = user.moves.is_empty()
                        || user.moves.iter().any(|m| m == move_id)
                        || move_id
                            .parse::<usize>()
                            .map(|n| n >= 1 && n <= user.moves.len())
                            .unwrap_or(false);
                    if !known {
                        return Err(format!("{} does not know {}", user.species, move_id));
                    }
                    let target = tokens.get(2).and_then(|t| t.parse::<i8>().ok());
                    actions.push(MockAction::Move { target });
                }
                Some("switch") => {
                    let index = self.validate_switch_target(side_index, tokens.get(1).copied())?;
                    actions.push(MockAction::Switch(index));
                }
                Some("default") => actions.push(MockAction::Default),
                // Pass only makes sense while a switch is pending
                Some("pass") => return Err("nothing to pass".to_string()),
                _ => return Err(format!("unrecognized choice: {}", entry)),
            }
        }
        Ok(actions)
    }

    fn validate_switch_target(
        &self,
        side_index: usize,
        token: Option<&str>,
    ) -> Result<usize, String> {
        let k: usize = token
            .ok_or("switch without a target")?
            .parse()
            .map_err(|_| "bad switch index".to_string())?;
        let team = &self.sides[side_index].team;
        if k == 0 || k > team.len() {
            return Err(format!("switch index {} out of range", k));
        }
        let index = k - 1;
        if team[index].fainted {
            return Err(format!("{} is fainted", team[index].species));
        }
        if index < self.slot_count(side_index) {
            return Err(format!("{} is already active", team[index].species));
        }
        Ok(index)
    }

    fn execute_turn(&mut self) {
        let p1 = self.pending[0].take().unwrap_or_default();
        let p2 = self.pending[1].take().unwrap_or_default();

        for (side_index, actions) in [(0, p1), (1, p2)] {
            for (position, action) in actions.into_iter().enumerate() {
                match action {
                    MockAction::Switch(index) => self.do_switch(side_index, position, index),
                    MockAction::Move { target } => self.do_move(side_index, position, target),
                    MockAction::Default => self.do_move(side_index, position, None),
                }
            }
        }

        for side_index in 0..2 {
            if self.sides[side_index].team.iter().all(|p| p.fainted) {
                let winner = self.sides[1 - side_index].name.clone();
                self.output.push(format!("|win|{}", winner));
                self.winner = Some(winner);
                self.ended = true;
                self.requests = [RequestKind::None, RequestKind::None];
                return;
            }
        }

        let mut any_forced = false;
        for side_index in 0..2 {
            let slot_count = self.slot_count(side_index);
            let side = &self.sides[side_index];
            let has_bench = side.team[slot_count.min(side.team.len())..]
                .iter()
                .any(|p| !p.fainted);
            let needs: Vec<usize> = (0..slot_count)
                .filter(|&position| side.team[position].fainted && has_bench)
                .collect();
            if needs.is_empty() {
                self.requests[side_index] = RequestKind::None;
            } else {
                self.requests[side_index] = RequestKind::Switch;
                any_forced = true;
            }
            self.needs_switch[side_index] = needs;
        }

        if !any_forced {
            self.next_turn();
        }
    }

    fn do_switch(&mut self, side_index: usize, position: usize, index: usize) {
        if position >= self.sides[side_index].team.len() || index >= self.sides[side_index].team.len()
        {
            return;
        }
        if position != index {
            self.sides[side_index].team.swap(position, index);
            self.sides[side_index].team[index].active = false;
        }
        self.sides[side_index].team[position].active = true;
        let line = format!("|switch|{}", self.slot_name(side_index, position));
        self.output.push(line);
    }

    fn do_move(&mut self, side_index: usize, position: usize, target: Option<i8>) {
        let Some(user) = self.sides[side_index].team.get(position) else {
            return;
        };
        if user.fainted {
            return;
        }
        let user_name = self.slot_name(side_index, position);

        let (target_side, target_position) = match target {
            Some(loc) if loc < 0 => (side_index, (-loc - 1) as usize),
            Some(loc) if loc > 0 => (1 - side_index, (loc - 1) as usize),
            _ => (1 - side_index, 0),
        };
        // Ally-targeted moves are support; only opposing targets take damage
        if target_side == side_index {
            return;
        }

        let slot_count = self.slot_count(target_side);
        let target_position = if target_position < slot_count {
            target_position
        } else {
            0
        };
        let damage = self.rng.gen_range(20..=60);
        let target_name = self.slot_name(target_side, target_position);
        let Some(defender) = self.sides[target_side].team.get_mut(target_position) else {
            return;
        };
        if defender.fainted {
            return;
        }
        defender.hp = defender.hp.saturating_sub(damage);
        self.output
            .push(format!("|move|{}|{}", user_name, target_name));
        if defender.hp == 0 {
            defender.fainted = true;
            defender.active = false;
            self.output.push(format!("|faint|{}", target_name));
        }
    }

    fn handle_forced(&mut self, side_index: usize, choice: &str) -> Result<(), String> {
        let needs = self.needs_switch[side_index].clone();
        if needs.is_empty() {
            return Err("no switch request pending".to_string());
        }

        let entries: Vec<&str> = choice.split(',').map(str::trim).collect();
        let mut plans: Vec<(usize, usize)> = Vec::new();

        if entries.len() == 1 && entries[0] == "default" {
            let mut taken = Vec::new();
            for &position in &needs {
                let slot_count = self.slot_count(side_index);
                let team = &self.sides[side_index].team;
                let found = (slot_count..team.len())
                    .find(|index| !team[*index].fainted && !taken.contains(index));
                match found {
                    Some(index) => {
                        plans.push((position, index));
                        taken.push(index);
                    }
                    None => return Err("no valid switch target".to_string()),
                }
            }
        } else {
            for (position, entry) in entries.iter().enumerate() {
                if let Some(token) = entry.strip_prefix("switch ") {
                    if !needs.contains(&position) {
                        return Err(format!("slot {} cannot switch", position + 1));
                    }
                    let index = self.validate_switch_target(side_index, Some(token.trim()))?;
                    plans.push((position, index));
                }
            }
            if plans.is_empty() {
                return Err("choice contains no switch".to_string());
            }
        }

        for (position, index) in plans {
            self.do_switch(side_index, position, index);
        }
        self.needs_switch[side_index].clear();
        if self.needs_switch.iter().all(Vec::is_empty) {
            self.next_turn();
        } else {
            self.requests[side_index] = RequestKind::None;
        }
        Ok(())
    }

    fn total_hp(&self, side_index: usize) -> u32 {
        self.sides[side_index].team.iter().map(|p| p.hp).sum()
    }
}

impl Engine for MockEngine {
    fn new(config: &FormatConfig) -> Result<Self> {
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config: config.clone(),
            turn: 0,
            leads_out: false,
            ended: false,
            winner: None,
            sides: [MockSide::default(), MockSide::default()],
            requests: [RequestKind::None, RequestKind::None],
            pending: [None, None],
            needs_switch: [Vec::new(), Vec::new()],
            states: Vec::new(),
            output: Vec::new(),
        })
    }

    fn from_json(config: &FormatConfig, snapshot: &Value) -> Result<Self> {
        let turn = snapshot
            .get("turn")
            .and_then(Value::as_u64)
            .context("snapshot missing turn")? as usize;
        let ended = snapshot
            .get("ended")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let winner = snapshot
            .get("winner")
            .and_then(Value::as_str)
            .map(str::to_string);

        let side_values = snapshot
            .get("sides")
            .and_then(Value::as_array)
            .context("snapshot missing sides")?;
        let mut sides = [MockSide::default(), MockSide::default()];
        for (side_index, value) in side_values.iter().take(2).enumerate() {
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let team = value
                .get("pokemon")
                .and_then(Value::as_array)
                .context("snapshot side missing pokemon")?
                .iter()
                .map(|entry| MockPokemon {
                    species: entry
                        .get("species")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    moves: entry
                        .get("moves")
                        .and_then(Value::as_array)
                        .map(|moves| {
                            moves
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                    hp: entry.get("hp").and_then(Value::as_u64).unwrap_or(0) as u32,
                    max_hp: entry.get("maxhp").and_then(Value::as_u64).unwrap_or(1) as u32,
                    status: entry
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    fainted: entry
                        .get("fainted")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    active: entry
                        .get("isActive")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
                .collect();
            sides[side_index] = MockSide {
                name,
                team,
                registered: true,
            };
        }

        let request = if ended {
            RequestKind::None
        } else if turn == 0 {
            RequestKind::TeamPreview
        } else {
            RequestKind::Move
        };

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(turn as u64)),
            config: config.clone(),
            turn,
            leads_out: turn >= 1,
            ended,
            winner,
            sides,
            requests: [request, request],
            pending: [None, None],
            needs_switch: [Vec::new(), Vec::new()],
            states: Vec::new(),
            output: Vec::new(),
        })
    }

    fn to_json(&self) -> Result<Value> {
        Ok(self.snapshot())
    }

    fn set_player(&mut self, side: SideId, name: &str, packed_team: &str) -> Result<()> {
        let side_index = Self::side_index(side);
        let team = unpack_team(packed_team)
            .into_iter()
            .map(|member| {
                let max_hp = 60 + 2 * member.level as u32;
                MockPokemon {
                    species: member.species_id,
                    moves: member.moves,
                    hp: max_hp,
                    max_hp,
                    status: String::new(),
                    fainted: false,
                    active: false,
                }
            })
            .collect();
        self.sides[side_index] = MockSide {
            name: name.to_string(),
            team,
            registered: true,
        };

        if self.sides.iter().all(|s| s.registered) && self.states.is_empty() {
            self.requests = [RequestKind::TeamPreview, RequestKind::TeamPreview];
            self.output.push("|teampreview".to_string());
            let snapshot = self.snapshot();
            self.states.push(snapshot);
        }
        Ok(())
    }

    fn choose(&mut self, side: SideId, choice: &str) -> ChoiceOutcome {
        if self.ended {
            return ChoiceOutcome::Rejected("battle already ended".to_string());
        }
        let side_index = Self::side_index(side);
        let choice = choice.trim();

        let result = match self.requests[side_index] {
            RequestKind::None => Err("no request pending".to_string()),
            RequestKind::TeamPreview => match self.parse_team_order(side_index, choice) {
                Ok(order) => {
                    let team = &mut self.sides[side_index].team;
                    let mut reordered: Vec<MockPokemon> =
                        order.iter().map(|&i| team[i].clone()).collect();
                    for (index, pokemon) in team.iter().enumerate() {
                        if !order.contains(&index) {
                            reordered.push(pokemon.clone());
                        }
                    }
                    *team = reordered;
                    self.requests[side_index] = RequestKind::None;
                    if self
                        .requests
                        .iter()
                        .all(|r| *r == RequestKind::None)
                        && !self.leads_out
                    {
                        self.start_battle();
                    }
                    Ok(())
                }
                Err(reason) => Err(reason),
            },
            RequestKind::Move => match self.parse_turn_choice(side_index, choice) {
                Ok(actions) => {
                    self.pending[side_index] = Some(actions);
                    if self.pending.iter().all(Option::is_some) {
                        self.execute_turn();
                    }
                    Ok(())
                }
                Err(reason) => Err(reason),
            },
            RequestKind::Switch => self.handle_forced(side_index, choice),
        };

        match result {
            Ok(()) => ChoiceOutcome::Accepted,
            Err(reason) => ChoiceOutcome::Rejected(reason),
        }
    }

    fn undo_choice(&mut self, side: SideId) {
        self.pending[Self::side_index(side)] = None;
    }

    fn request_state(&self, side: SideId) -> RequestKind {
        self.requests[Self::side_index(side)]
    }

    fn force_request_state(&mut self, side: SideId, kind: RequestKind) {
        self.requests[Self::side_index(side)] = kind;
    }

    fn make_request(&mut self, kind: RequestKind) -> Result<()> {
        if self.ended {
            bail!("battle already ended");
        }
        if kind != RequestKind::Switch {
            self.needs_switch = [Vec::new(), Vec::new()];
        }
        self.requests = [kind, kind];
        Ok(())
    }

    fn clear_pending(&mut self) {
        self.pending = [None, None];
    }

    fn turn(&self) -> usize {
        self.turn
    }

    fn force_turn(&mut self, turn: usize) {
        self.turn = turn;
    }

    fn ended(&self) -> bool {
        self.ended
    }

    fn side_view(&self, side: SideId) -> SideView {
        let side_index = Self::side_index(side);
        let slot_count = self.slot_count(side_index);
        let pokemon = self.sides[side_index]
            .team
            .iter()
            .map(|p| PokemonView {
                species: p.species.clone(),
                hp: p.hp,
                max_hp: p.max_hp,
                status: p.status.clone(),
                fainted: p.fainted,
                active: p.active,
            })
            .collect();
        let active = (0..self.config.active_slots())
            .map(|position| (self.leads_out && position < slot_count).then_some(position))
            .collect();
        SideView { pokemon, active }
    }

    fn apply_update(&mut self, side: SideId, index: usize, update: &PokemonUpdate) -> Result<()> {
        let side_index = Self::side_index(side);
        let pokemon = self.sides[side_index]
            .team
            .get_mut(index)
            .context("pokemon index out of range")?;
        if let Some(hp) = update.hp {
            pokemon.hp = hp.min(pokemon.max_hp);
        }
        if let Some(status) = &update.status {
            pokemon.status = status.clone();
        }
        if let Some(fainted) = update.fainted {
            pokemon.fainted = fainted;
            if fainted {
                pokemon.hp = 0;
                pokemon.active = false;
            }
        }
        Ok(())
    }

    fn set_active(&mut self, side: SideId, position: usize, index: usize) -> Result<()> {
        let side_index = Self::side_index(side);
        if position >= self.slot_count(side_index).max(1) {
            bail!("active position {} out of range", position);
        }
        self.do_switch(side_index, position, index);
        Ok(())
    }

    fn force_win(&mut self, winner: Option<SideId>) {
        self.ended = true;
        self.requests = [RequestKind::None, RequestKind::None];
        match winner {
            Some(side) => {
                let name = self.sides[Self::side_index(side)].name.clone();
                self.output.push(format!("|win|{}", name));
                self.winner = Some(name);
            }
            None => {
                self.output.push("|tie".to_string());
                self.winner = None;
            }
        }
    }

    fn tiebreak(&mut self) {
        let winner = match self.total_hp(0).cmp(&self.total_hp(1)) {
            std::cmp::Ordering::Greater => Some(SideId::P1),
            std::cmp::Ordering::Less => Some(SideId::P2),
            std::cmp::Ordering::Equal => None,
        };
        self.force_win(winner);
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn state_by_turn(&self) -> &[Value] {
        &self.states
    }

    fn state_by_turn_mut(&mut self) -> &mut Vec<Value> {
        &mut self.states
    }

    fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}
