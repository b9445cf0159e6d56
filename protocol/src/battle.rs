//! Shared types for battle log records

use crate::ParseError;

/// A side in a battle (p1, p2, p3, p4)
///
/// Free-for-all formats admit p3/p4; the replay core only drives p1/p2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SideId {
    P1,
    P2,
    P3,
    P4,
}

impl SideId {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "p1" => Some(SideId::P1),
            "p2" => Some(SideId::P2),
            "p3" => Some(SideId::P3),
            "p4" => Some(SideId::P4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SideId::P1 => "p1",
            SideId::P2 => "p2",
            SideId::P3 => "p3",
            SideId::P4 => "p4",
        }
    }

    /// The opposing side (1v1 pairing)
    pub fn opponent(&self) -> SideId {
        match self {
            SideId::P1 => SideId::P2,
            SideId::P2 => SideId::P1,
            SideId::P3 => SideId::P4,
            SideId::P4 => SideId::P3,
        }
    }
}

/// An active slot: side plus position letter (`p1a`, `p2b`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    pub side: SideId,
    pub position: char,
}

impl Slot {
    pub fn new(side: SideId, position: char) -> Self {
        Self { side, position }
    }

    /// Parse a slot id like "p1a"
    pub fn parse(s: &str) -> Option<Self> {
        let side = SideId::parse(s.get(..2)?)?;
        let position = s.chars().nth(2)?;
        position.is_ascii_lowercase().then_some(Self { side, position })
    }

    /// 0-based index of the position letter (a = 0, b = 1, ...)
    pub fn index(&self) -> usize {
        (self.position as u8).saturating_sub(b'a') as usize
    }

    pub fn to_wire(&self) -> String {
        format!("{}{}", self.side.as_str(), self.position)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.side.as_str(), self.position)
    }
}

/// Creature identifier in the form "POSITION: NAME" (e.g., "p1a: Pikachu")
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRef {
    /// Side that owns this creature
    pub side: SideId,
    /// Position letter (a, b for active slots, or None when inactive)
    pub position: Option<char>,
    /// Creature's name/nickname
    pub name: String,
}

impl SlotRef {
    /// Parse an identifier string like "p1a: Pikachu" or "p1: Pikachu"
    pub fn parse(s: &str) -> Option<Self> {
        let (pos_part, name) = s.split_once(": ")?;
        let side = SideId::parse(pos_part.get(..2)?)?;
        let position = pos_part.chars().nth(2);

        Some(SlotRef {
            side,
            position,
            name: name.to_string(),
        })
    }

    /// The active slot this identifier names, if it carries a position letter
    pub fn slot(&self) -> Option<Slot> {
        self.position.map(|p| Slot::new(self.side, p))
    }
}

/// Creature details string (species, level, gender, shiny, tera)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PokemonDetails {
    pub species: String,
    pub level: Option<u8>,
    pub gender: Option<char>,
    pub shiny: bool,
    pub tera_type: Option<String>,
}

impl PokemonDetails {
    /// Parse a details string like "Pikachu, L50, M, shiny" or "Ogerpon, L50, F, tera:Water"
    pub fn parse(s: &str) -> Self {
        let mut details = PokemonDetails::default();
        let parts: Vec<&str> = s.split(", ").collect();

        if let Some(species) = parts.first() {
            details.species = species.to_string();
        }

        for part in parts.iter().skip(1) {
            if let Some(level_str) = part.strip_prefix('L') {
                details.level = level_str.parse().ok();
            } else if *part == "M" {
                details.gender = Some('M');
            } else if *part == "F" {
                details.gender = Some('F');
            } else if *part == "shiny" {
                details.shiny = true;
            } else if let Some(tera) = part.strip_prefix("tera:") {
                details.tera_type = Some(tera.to_string());
            }
        }

        details
    }

    /// Canonical species id of these details
    pub fn species_id(&self) -> String {
        to_id(&self.species)
    }
}

/// HP and status condition (e.g., "100/100", "50/100 slp", "0 fnt")
#[derive(Debug, Clone, PartialEq)]
pub struct HpStatus {
    /// Current HP (raw value or percentage depending on log verbosity)
    pub current: u32,
    /// Max HP (if known)
    pub max: Option<u32>,
    /// Status condition (slp, par, brn, psn, tox, frz, fnt)
    pub status: Option<String>,
}

impl HpStatus {
    /// Parse an HP status string like "100/100", "50/100 slp", or "0 fnt"
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let hp_part = parts.first()?;
        let status = parts.get(1).map(|s| s.to_string());

        if let Some((current_str, max_str)) = hp_part.split_once('/') {
            Some(HpStatus {
                current: current_str.parse().ok()?,
                max: Some(max_str.parse().ok()?),
                status,
            })
        } else {
            Some(HpStatus {
                current: hp_part.parse().ok()?,
                max: None,
                status,
            })
        }
    }

    /// Whether this condition marks a fainted creature
    pub fn is_fainted(&self) -> bool {
        self.status.as_deref() == Some("fnt") || (self.current == 0 && self.max.is_none())
    }

    /// HP as a rounded percentage in [0, 100]
    pub fn percent(&self) -> u8 {
        match self.max {
            Some(0) | None => {
                if self.current > 100 {
                    100
                } else {
                    self.current as u8
                }
            }
            Some(max) => ((self.current as f64) * 100.0 / (max as f64)).round() as u8,
        }
    }

    /// The non-fainted status tag, if any ("brn", "par", ...)
    pub fn status_tag(&self) -> Option<&str> {
        self.status.as_deref().filter(|s| *s != "fnt")
    }
}

/// Game type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameType {
    Singles,
    Doubles,
}

impl GameType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "singles" => Some(GameType::Singles),
            "doubles" => Some(GameType::Doubles),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Singles => "singles",
            GameType::Doubles => "doubles",
        }
    }

    /// Simultaneously active slots per side
    pub fn active_slots(&self) -> usize {
        match self {
            GameType::Singles => 1,
            GameType::Doubles => 2,
        }
    }
}

/// Normalize a display name to its canonical id.
///
/// Lowercases and strips everything except ASCII alphanumerics, keeping
/// hyphens so forme suffixes stay separable ("Ogerpon-Wellspring" ->
/// "ogerpon-wellspring", "Flutter Mane" -> "fluttermane").
pub fn to_id(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Base-form id: everything before the first forme hyphen
pub fn base_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}

/// Exact-id match, falling back to base-form match for forme changers
pub fn species_matches(a: &str, b: &str) -> bool {
    a == b || base_id(a) == base_id(b)
}

/// Helper to parse a SlotRef from record fields
pub fn parse_slot_ref(parts: &[&str], index: usize) -> Result<SlotRef, anyhow::Error> {
    parts
        .get(index)
        .and_then(|s| SlotRef::parse(s))
        .ok_or_else(|| ParseError::MissingField("slot identifier".to_string()).into())
}

/// Helper to parse PokemonDetails from record fields
pub fn parse_details(parts: &[&str], index: usize) -> PokemonDetails {
    parts
        .get(index)
        .map(|s| PokemonDetails::parse(s))
        .unwrap_or_default()
}

/// Helper to parse HpStatus from record fields
pub fn parse_hp_status(parts: &[&str], index: usize) -> Option<HpStatus> {
    parts.get(index).and_then(|s| HpStatus::parse(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parse() {
        assert_eq!(SideId::parse("p1"), Some(SideId::P1));
        assert_eq!(SideId::parse("p2"), Some(SideId::P2));
        assert_eq!(SideId::parse("p5"), None);
        assert_eq!(SideId::P1.opponent(), SideId::P2);
    }

    #[test]
    fn test_slot_parse() {
        let slot = Slot::parse("p2b").unwrap();
        assert_eq!(slot.side, SideId::P2);
        assert_eq!(slot.position, 'b');
        assert_eq!(slot.index(), 1);
        assert_eq!(slot.to_wire(), "p2b");
        assert!(Slot::parse("p2").is_none());
    }

    #[test]
    fn test_slot_ref_parse() {
        let r = SlotRef::parse("p1a: Sparky").unwrap();
        assert_eq!(r.side, SideId::P1);
        assert_eq!(r.position, Some('a'));
        assert_eq!(r.name, "Sparky");
        assert_eq!(r.slot(), Some(Slot::new(SideId::P1, 'a')));

        let benched = SlotRef::parse("p1: Sparky").unwrap();
        assert_eq!(benched.slot(), None);
    }

    #[test]
    fn test_details_parse() {
        let d = PokemonDetails::parse("Ogerpon-Wellspring, L50, F, tera:Water");
        assert_eq!(d.species, "Ogerpon-Wellspring");
        assert_eq!(d.level, Some(50));
        assert_eq!(d.gender, Some('F'));
        assert_eq!(d.tera_type.as_deref(), Some("Water"));
        assert_eq!(d.species_id(), "ogerpon-wellspring");
    }

    #[test]
    fn test_hp_status_parse() {
        let hp = HpStatus::parse("50/100 slp").unwrap();
        assert_eq!(hp.percent(), 50);
        assert_eq!(hp.status_tag(), Some("slp"));
        assert!(!hp.is_fainted());

        let fnt = HpStatus::parse("0 fnt").unwrap();
        assert!(fnt.is_fainted());
        assert_eq!(fnt.percent(), 0);
        assert_eq!(fnt.status_tag(), None);

        let rounded = HpStatus::parse("167/250").unwrap();
        assert_eq!(rounded.percent(), 67);
    }

    #[test]
    fn test_to_id() {
        assert_eq!(to_id("Flutter Mane"), "fluttermane");
        assert_eq!(to_id("Ogerpon-Wellspring"), "ogerpon-wellspring");
        assert_eq!(to_id("Farfetch'd"), "farfetchd");
    }

    #[test]
    fn test_species_matches() {
        assert!(species_matches("ogerpon-wellspring", "ogerpon"));
        assert!(species_matches("ogerpon", "ogerpon-wellspring"));
        assert!(species_matches("fluttermane", "fluttermane"));
        assert!(!species_matches("porygon2", "porygon-z"));
    }
}
