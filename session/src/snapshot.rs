//! Snapshot patching
//!
//! The engine snapshot is opaque to the driver except for one structural
//! view, mutated here and nowhere else:
//!
//! ```json
//! {
//!   "turn": 3,
//!   "sides": [
//!     {
//!       "id": "p1",
//!       "team": "1234",
//!       "pokemon": [
//!         { "species": "fluttermane", "hp": 81, "maxhp": 160,
//!           "status": "", "fainted": false, "isActive": true, "position": 0 }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! The `pokemon` array is ordered active-first; `team` encodes declaration
//! order against current roster positions. After a turn the engine's own
//! hook has already saved a snapshot, but one taken before forced switches
//! and patches ran; the patcher rewrites it so active occupants, creature
//! state, and the position encoding all match the live engine.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::warn;

use rewind_protocol::{species_matches, SideId};

use crate::engine::{PokemonView, SideView};

/// Identity-changing abilities can make a creature vanish from a snapshot;
/// the recovery search walks this many earlier snapshots at most.
const BACKWARD_WINDOW: usize = 8;

/// Rewrite one turn snapshot so it matches the live engine.
///
/// `history` holds the snapshots of earlier turns, oldest first; only the
/// trailing window is searched.
pub fn patch_snapshot(
    snapshot: &mut Value,
    live: &[(SideId, SideView)],
    active_count: usize,
    history: &[Value],
) -> Result<()> {
    for (side, view) in live {
        let side_index = side_array_index(*side);

        for position in 0..active_count {
            let Some(live_index) = view.active.get(position).copied().flatten() else {
                continue;
            };
            let live_species = view.pokemon[live_index].species.clone();
            fix_active_entry(snapshot, side_index, position, &live_species, history)?;
        }

        sync_states(snapshot, side_index, view, active_count)?;
        rewrite_team_encoding(snapshot, side_index)?;
    }
    Ok(())
}

/// p1 -> 0, p2 -> 1, ...
pub fn side_array_index(side: SideId) -> usize {
    match side {
        SideId::P1 => 0,
        SideId::P2 => 1,
        SideId::P3 => 2,
        SideId::P4 => 3,
    }
}

fn roster_mut(snapshot: &mut Value, side_index: usize) -> Result<&mut Vec<Value>> {
    snapshot
        .get_mut("sides")
        .and_then(|s| s.get_mut(side_index))
        .and_then(|s| s.get_mut("pokemon"))
        .and_then(Value::as_array_mut)
        .context("snapshot missing side roster")
}

fn entry_species(entry: &Value) -> &str {
    entry.get("species").and_then(Value::as_str).unwrap_or("")
}

fn set_position(entry: &mut Value, position: usize) {
    entry["position"] = json!(position);
}

/// Step 1: make the serialized occupant of an active position match the
/// live engine, swapping within the roster or recovering a vanished entry
/// from snapshot history.
fn fix_active_entry(
    snapshot: &mut Value,
    side_index: usize,
    position: usize,
    live_species: &str,
    history: &[Value],
) -> Result<()> {
    let roster = roster_mut(snapshot, side_index)?;
    if position >= roster.len() {
        return Ok(());
    }
    if species_matches(entry_species(&roster[position]), live_species) {
        return Ok(());
    }

    if let Some(found) = (0..roster.len())
        .filter(|i| *i != position)
        .find(|&i| species_matches(entry_species(&roster[i]), live_species))
    {
        roster.swap(position, found);
        set_position(&mut roster[position], position);
        set_position(&mut roster[found], found);
        return Ok(());
    }

    // Gone from the serialization entirely
    let Some(copied) = find_in_history(history, side_index, live_species) else {
        warn!(
            species = live_species,
            "active occupant missing from snapshot and history"
        );
        return Ok(());
    };

    let target = duplicate_index(roster).unwrap_or(position);
    roster[target] = copied;
    if target != position {
        roster.swap(position, target);
        set_position(&mut roster[target], target);
    }
    set_position(&mut roster[position], position);
    Ok(())
}

/// Index of the later of two entries sharing a species, if any
fn duplicate_index(roster: &[Value]) -> Option<usize> {
    for i in 0..roster.len() {
        for j in 0..i {
            if entry_species(&roster[i]) == entry_species(&roster[j]) {
                return Some(i);
            }
        }
    }
    None
}

fn find_in_history(history: &[Value], side_index: usize, species: &str) -> Option<Value> {
    history
        .iter()
        .rev()
        .take(BACKWARD_WINDOW)
        .find_map(|snapshot| {
            let roster = snapshot
                .get("sides")?
                .get(side_index)?
                .get("pokemon")?
                .as_array()?;
            roster
                .iter()
                .find(|entry| species_matches(entry_species(entry), species))
                .cloned()
        })
}

/// Step 2: copy HP/status/fainted from the live engine into the snapshot,
/// actives by position, bench entries matched by species.
fn sync_states(
    snapshot: &mut Value,
    side_index: usize,
    view: &SideView,
    active_count: usize,
) -> Result<()> {
    let slotted: Vec<usize> = view.active.iter().flatten().copied().collect();
    let roster = roster_mut(snapshot, side_index)?;
    let bound = active_count.min(roster.len());
    let mut used: Vec<usize> = Vec::new();

    for position in 0..bound {
        if let Some(live_index) = view.active.get(position).copied().flatten() {
            let live = &view.pokemon[live_index];
            // A fainted active may carry is_active = false; keep its flag
            copy_state(&mut roster[position], live, live.active);
            used.push(live_index);
        }
    }

    for position in bound..roster.len() {
        let species = entry_species(&roster[position]).to_string();
        let found = (0..view.pokemon.len())
            .find(|i| {
                !slotted.contains(i)
                    && !used.contains(i)
                    && species_matches(&view.pokemon[*i].species, &species)
            });
        if let Some(live_index) = found {
            copy_state(&mut roster[position], &view.pokemon[live_index], false);
            used.push(live_index);
        }
    }
    Ok(())
}

fn copy_state(entry: &mut Value, live: &PokemonView, is_active: bool) {
    entry["hp"] = json!(live.hp);
    entry["maxhp"] = json!(live.max_hp);
    entry["status"] = json!(live.status);
    entry["fainted"] = json!(live.fainted);
    entry["isActive"] = json!(is_active);
}

/// Step 3: replacement creatures can corrupt the original encoding, and a
/// jump overwrites the full state right after deserializing, so the identity
/// mapping is always safe.
fn rewrite_team_encoding(snapshot: &mut Value, side_index: usize) -> Result<()> {
    let len = roster_mut(snapshot, side_index)?.len();
    let encoding = if len <= 9 {
        (1..=len).map(|i| i.to_string()).collect::<String>()
    } else {
        (1..=len)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    snapshot["sides"][side_index]["team"] = json!(encoding);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(species: &str, hp: u32, position: usize) -> Value {
        json!({
            "species": species,
            "hp": hp,
            "maxhp": 100,
            "status": "",
            "fainted": false,
            "isActive": position == 0,
            "position": position,
        })
    }

    fn poke(species: &str, hp: u32, active: bool) -> PokemonView {
        PokemonView {
            species: species.to_string(),
            hp,
            max_hp: 100,
            status: String::new(),
            fainted: false,
            active,
        }
    }

    fn snapshot_with(p1: Vec<Value>) -> Value {
        json!({
            "turn": 2,
            "sides": [
                { "id": "p1", "team": "123", "pokemon": p1 },
                { "id": "p2", "team": "1", "pokemon": [entry("dondozo", 100, 0)] },
            ],
        })
    }

    #[test]
    fn test_active_mismatch_swaps_entries() {
        let mut snapshot = snapshot_with(vec![
            entry("fluttermane", 80, 0),
            entry("amoonguss", 90, 1),
            entry("incineroar", 100, 2),
        ]);

        // Live engine has Incineroar active instead of Flutter Mane
        let view = SideView {
            pokemon: vec![
                poke("incineroar", 55, true),
                poke("fluttermane", 80, false),
                poke("amoonguss", 90, false),
            ],
            active: vec![Some(0)],
        };
        let live = vec![(SideId::P1, view)];
        let p2 = SideView {
            pokemon: vec![poke("dondozo", 100, true)],
            active: vec![Some(0)],
        };
        let live = [live, vec![(SideId::P2, p2)]].concat();

        patch_snapshot(&mut snapshot, &live, 1, &[]).unwrap();

        let roster = snapshot["sides"][0]["pokemon"].as_array().unwrap();
        assert_eq!(roster[0]["species"], "incineroar");
        assert_eq!(roster[0]["hp"], 55);
        assert_eq!(roster[0]["position"], 0);
        assert_eq!(roster[2]["species"], "fluttermane");
        assert_eq!(roster[2]["hp"], 80);
    }

    #[test]
    fn test_vanished_species_recovered_from_history() {
        let mut snapshot = snapshot_with(vec![
            entry("amoonguss", 90, 0),
            entry("incineroar", 100, 1),
        ]);
        let old = snapshot_with(vec![
            entry("fluttermane", 70, 0),
            entry("amoonguss", 95, 1),
        ]);

        let view = SideView {
            pokemon: vec![
                poke("fluttermane", 70, true),
                poke("incineroar", 100, false),
            ],
            active: vec![Some(0)],
        };
        let live = vec![(SideId::P1, view)];

        patch_snapshot(&mut snapshot, &live, 1, std::slice::from_ref(&old)).unwrap();

        let roster = snapshot["sides"][0]["pokemon"].as_array().unwrap();
        assert_eq!(roster[0]["species"], "fluttermane");
        assert_eq!(roster[0]["hp"], 70);
        assert_eq!(roster[0]["position"], 0);
    }

    #[test]
    fn test_bench_state_synced_by_species() {
        let mut snapshot = snapshot_with(vec![
            entry("fluttermane", 100, 0),
            entry("amoonguss", 100, 1),
        ]);

        let view = SideView {
            pokemon: vec![poke("fluttermane", 40, true), {
                let mut p = poke("amoonguss", 0, false);
                p.fainted = true;
                p.status = "psn".to_string();
                p
            }],
            active: vec![Some(0)],
        };
        let live = vec![(SideId::P1, view)];

        patch_snapshot(&mut snapshot, &live, 1, &[]).unwrap();

        let roster = snapshot["sides"][0]["pokemon"].as_array().unwrap();
        assert_eq!(roster[1]["hp"], 0);
        assert_eq!(roster[1]["fainted"], true);
        assert_eq!(roster[1]["status"], "psn");
        assert_eq!(roster[1]["isActive"], false);
    }

    #[test]
    fn test_team_encoding_rewritten_to_identity() {
        let mut snapshot = snapshot_with(vec![
            entry("fluttermane", 100, 0),
            entry("amoonguss", 100, 1),
            entry("incineroar", 100, 2),
        ]);
        snapshot["sides"][0]["team"] = json!("312");

        let view = SideView {
            pokemon: vec![
                poke("fluttermane", 100, true),
                poke("amoonguss", 100, false),
                poke("incineroar", 100, false),
            ],
            active: vec![Some(0)],
        };
        patch_snapshot(&mut snapshot, &[(SideId::P1, view)], 1, &[]).unwrap();

        assert_eq!(snapshot["sides"][0]["team"], "123");
    }

    #[test]
    fn test_idempotent() {
        let mut snapshot = snapshot_with(vec![
            entry("fluttermane", 80, 0),
            entry("amoonguss", 90, 1),
        ]);
        let view = SideView {
            pokemon: vec![poke("amoonguss", 90, true), poke("fluttermane", 80, false)],
            active: vec![Some(0)],
        };
        let live = vec![(SideId::P1, view)];

        patch_snapshot(&mut snapshot, &live, 1, &[]).unwrap();
        let once = snapshot.clone();
        patch_snapshot(&mut snapshot, &live, 1, &[]).unwrap();
        assert_eq!(snapshot, once);
    }
}
