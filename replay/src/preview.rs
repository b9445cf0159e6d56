//! Team-preview resolution
//!
//! Turns appearance order plus the declared roster into the engine's
//! team-selection command and the roster ordering the engine will use after
//! selection.

use rewind_protocol::{species_matches, TeamMember};

/// Resolved team preview for one side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamPreview {
    /// Team-selection command: `team` followed by 1-based declaration indices
    pub choice: String,
    /// Species order after selection: chosen creatures first in appearance
    /// order, unchosen afterwards in declaration order
    pub order: Vec<String>,
}

/// Resolve a side's team selection.
///
/// Brings every creature that ever appeared; pads from the front of the
/// declaration when fewer than `bring_count` appeared. Appearance-to-roster
/// matching is exact-id first, base-form second (forme changers).
pub fn resolve_preview(
    roster: &[TeamMember],
    appeared: &[String],
    bring_count: usize,
) -> TeamPreview {
    let mut chosen: Vec<usize> = Vec::new();

    for species in appeared {
        let found = roster
            .iter()
            .position(|m| m.species_id == *species)
            .or_else(|| {
                roster
                    .iter()
                    .position(|m| species_matches(&m.species_id, species))
            });
        if let Some(index) = found {
            if !chosen.contains(&index) {
                chosen.push(index);
            }
        }
    }

    let target = bring_count.min(roster.len()).max(chosen.len());
    for index in 0..roster.len() {
        if chosen.len() >= target {
            break;
        }
        if !chosen.contains(&index) {
            chosen.push(index);
        }
    }

    let digits: String = chosen.iter().map(|i| (i + 1).to_string()).collect();
    let choice = format!("team {}", digits).trim_end().to_string();

    let mut order: Vec<String> = chosen
        .iter()
        .map(|&i| roster[i].species_id.clone())
        .collect();
    for (index, member) in roster.iter().enumerate() {
        if !chosen.contains(&index) {
            order.push(member.species_id.clone());
        }
    }

    TeamPreview { choice, order }
}
