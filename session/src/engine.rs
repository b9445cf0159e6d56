//! The injected battle engine
//!
//! The replay core never computes battle mechanics itself; it drives an
//! engine behind this trait. Submissions report acceptance explicitly, and
//! rejection always leaves the engine unchanged.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rewind_protocol::{species_matches, GameType, SideId};

/// What the engine is currently asking a side for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    None,
    TeamPreview,
    Move,
    Switch,
}

/// Result of submitting a choice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceOutcome {
    Accepted,
    Rejected(String),
}

impl ChoiceOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, ChoiceOutcome::Accepted)
    }
}

/// Format configuration handed to the engine constructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatConfig {
    pub format_id: String,
    /// "singles" or "doubles"
    pub game_type: String,
    /// Creatures each side brings to battle
    pub bring_count: usize,
    /// RNG seed for the engine
    pub seed: u64,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            format_id: String::new(),
            game_type: "singles".to_string(),
            bring_count: 4,
            seed: 0,
        }
    }
}

impl FormatConfig {
    pub fn game_type(&self) -> GameType {
        GameType::parse(&self.game_type).unwrap_or(GameType::Singles)
    }

    /// Simultaneously active slots per side
    pub fn active_slots(&self) -> usize {
        self.game_type().active_slots()
    }
}

/// Read-only view of one creature in the engine's roster
#[derive(Debug, Clone, PartialEq)]
pub struct PokemonView {
    pub species: String,
    pub hp: u32,
    pub max_hp: u32,
    pub status: String,
    pub fainted: bool,
    pub active: bool,
}

/// Read-only view of one side's roster and active slots
#[derive(Debug, Clone, Default)]
pub struct SideView {
    /// Creatures in the engine's current roster order
    pub pokemon: Vec<PokemonView>,
    /// Roster index occupying each active slot position
    pub active: Vec<Option<usize>>,
}

impl SideView {
    /// Species occupying an active slot position
    pub fn active_species(&self, position: usize) -> Option<&str> {
        let index = (*self.active.get(position)?)?;
        self.pokemon.get(index).map(|p| p.species.as_str())
    }

    /// Find a roster index by species, exact id first, base form second
    pub fn find_species(&self, species: &str) -> Option<usize> {
        self.pokemon
            .iter()
            .position(|p| p.species == species)
            .or_else(|| {
                self.pokemon
                    .iter()
                    .position(|p| species_matches(&p.species, species))
            })
    }
}

/// State correction for one creature; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct PokemonUpdate {
    pub hp: Option<u32>,
    pub status: Option<String>,
    pub fainted: Option<bool>,
}

/// The deterministic battle engine the driver borrows for a replay.
///
/// Serialization is opaque to the driver except for the snapshot patcher's
/// structural view (see [`crate::snapshot`]). The engine records a snapshot
/// of itself whenever a new turn begins; entry `t` of [`Engine::state_by_turn`]
/// holds the end-of-turn-`t` state (entry 0 is the pre-battle state).
pub trait Engine: Sized {
    fn new(config: &FormatConfig) -> Result<Self>;

    /// Rebuild an engine from a serialized snapshot
    fn from_json(config: &FormatConfig, snapshot: &Value) -> Result<Self>;

    fn to_json(&self) -> Result<Value>;

    fn set_player(&mut self, side: SideId, name: &str, packed_team: &str) -> Result<()>;

    /// Submit a choice string; never fails hard on bad input
    fn choose(&mut self, side: SideId, choice: &str) -> ChoiceOutcome;

    fn undo_choice(&mut self, side: SideId);

    fn request_state(&self, side: SideId) -> RequestKind;

    /// Overwrite a side's request state without consulting the engine
    fn force_request_state(&mut self, side: SideId, kind: RequestKind);

    /// Ask the engine to issue fresh requests of the given kind
    fn make_request(&mut self, kind: RequestKind) -> Result<()>;

    /// Drop any half-submitted choices
    fn clear_pending(&mut self);

    /// Current turn number; 0 before the battle starts
    fn turn(&self) -> usize;

    /// Overwrite the turn counter (force-advance)
    fn force_turn(&mut self, turn: usize);

    fn ended(&self) -> bool;

    fn side_view(&self, side: SideId) -> SideView;

    fn apply_update(&mut self, side: SideId, index: usize, update: &PokemonUpdate) -> Result<()>;

    /// Put the creature at `index` into active slot `position`
    fn set_active(&mut self, side: SideId, position: usize, index: usize) -> Result<()>;

    fn force_win(&mut self, winner: Option<SideId>);

    /// Decide a stalled game by comparing remaining resources
    fn tiebreak(&mut self);

    fn reseed(&mut self, seed: u64);

    fn state_by_turn(&self) -> &[Value];

    fn state_by_turn_mut(&mut self) -> &mut Vec<Value>;

    /// Drain output lines produced since the last call
    fn take_output(&mut self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_config_defaults() {
        let config: FormatConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.game_type(), GameType::Singles);
        assert_eq!(config.active_slots(), 1);
        assert_eq!(config.bring_count, 4);
    }

    #[test]
    fn test_format_config_json() {
        let config: FormatConfig =
            serde_json::from_str(r#"{"formatId":"gen9vgc2025","gameType":"doubles","seed":7}"#)
                .unwrap();
        assert_eq!(config.format_id, "gen9vgc2025");
        assert_eq!(config.active_slots(), 2);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_side_view_lookup() {
        let view = SideView {
            pokemon: vec![
                PokemonView {
                    species: "ogerpon-wellspring".into(),
                    hp: 10,
                    max_hp: 100,
                    status: String::new(),
                    fainted: false,
                    active: true,
                },
                PokemonView {
                    species: "amoonguss".into(),
                    hp: 100,
                    max_hp: 100,
                    status: String::new(),
                    fainted: false,
                    active: false,
                },
            ],
            active: vec![Some(0), None],
        };
        assert_eq!(view.active_species(0), Some("ogerpon-wellspring"));
        assert_eq!(view.active_species(1), None);
        assert_eq!(view.find_species("amoonguss"), Some(1));
        assert_eq!(view.find_species("ogerpon"), Some(0));
        assert_eq!(view.find_species("dondozo"), None);
    }
}
