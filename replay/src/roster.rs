//! Team rosters and appearance order
//!
//! Rosters come from `showteam` declarations; the appearance scanner records
//! which creatures ever occupied an active slot, in first-appearance order.

use std::collections::BTreeMap;

use rewind_protocol::{unpack_team, LogRecord, SideId, TeamMember};

/// Declared rosters per side
#[derive(Debug, Clone, Default)]
pub struct Rosters {
    members: BTreeMap<SideId, Vec<TeamMember>>,
    packed: BTreeMap<SideId, String>,
}

impl Rosters {
    /// Extract rosters from the first `showteam` record of each side.
    ///
    /// A side with no declaration gets an empty roster.
    pub fn extract(records: &[LogRecord]) -> Self {
        let mut rosters = Rosters::default();
        for record in records {
            if let LogRecord::ShowTeam { side, packed } = record {
                rosters
                    .packed
                    .entry(*side)
                    .or_insert_with(|| packed.clone());
                rosters
                    .members
                    .entry(*side)
                    .or_insert_with(|| unpack_team(packed));
            }
        }
        rosters
    }

    /// Declared members of a side, in declaration order
    pub fn side(&self, side: SideId) -> &[TeamMember] {
        self.members.get(&side).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The raw packed declaration, if the side made one
    pub fn packed(&self, side: SideId) -> Option<&str> {
        self.packed.get(&side).map(String::as_str)
    }
}

/// Species that ever entered play, per side, in first-appearance order
#[derive(Debug, Clone, Default)]
pub struct Appearances {
    order: BTreeMap<SideId, Vec<String>>,
}

impl Appearances {
    /// Single pass over switch/drag/replace records.
    ///
    /// The first time a species appears for a side fixes its position.
    pub fn scan(records: &[LogRecord]) -> Self {
        let mut appearances = Appearances::default();
        for record in records {
            let (ident, details) = match record {
                LogRecord::Switch { ident, details, .. }
                | LogRecord::Drag { ident, details, .. }
                | LogRecord::Replace { ident, details, .. } => (ident, details),
                _ => continue,
            };
            let species = details.species_id();
            let seen = appearances.order.entry(ident.side).or_default();
            if !seen.contains(&species) {
                seen.push(species);
            }
        }
        appearances
    }

    /// Appearance order for a side
    pub fn side(&self, side: SideId) -> &[String] {
        self.order.get(&side).map(Vec::as_slice).unwrap_or(&[])
    }
}
