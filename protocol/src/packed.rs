//! Packed team codec
//!
//! Teams travel through `showteam` records in the simulator's packed format:
//! one member per `]`-delimited segment, fields `|`-delimited inside. Only the
//! fields the replay core needs are retained; EV/IV spreads and natures are
//! hidden information the log never confirms.

use crate::battle::to_id;

/// One member of a declared team
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMember {
    /// Canonical id of the declared species
    pub species_id: String,
    /// Display nickname as declared
    pub nickname: String,
    /// Held item id, if any
    pub item_id: Option<String>,
    /// Ability id
    pub ability_id: String,
    /// Move ids in declared order
    pub moves: Vec<String>,
    /// Gender ('M', 'F', or None)
    pub gender: Option<char>,
    /// Level (1-100)
    pub level: u8,
    /// Declared tera type, if any
    pub tera_type: Option<String>,
    /// 0-based position in the original team declaration
    pub showteam_index: usize,
}

/// Unpack a packed team declaration into member records.
///
/// Fails soft: an empty or unparseable declaration yields an empty roster.
pub fn unpack_team(packed: &str) -> Vec<TeamMember> {
    packed
        .split(']')
        .filter(|set| !set.trim().is_empty())
        .enumerate()
        .map(|(index, set)| unpack_member(set, index))
        .collect()
}

fn unpack_member(set: &str, index: usize) -> TeamMember {
    let fields: Vec<&str> = set.split('|').collect();

    let nickname = fields.first().unwrap_or(&"").to_string();
    let species_field = fields.get(1).copied().unwrap_or("");
    let species_id = if species_field.is_empty() {
        to_id(&nickname)
    } else {
        to_id(species_field)
    };

    let item_id = fields
        .get(2)
        .map(|s| to_id(s))
        .filter(|s| !s.is_empty());

    let ability_id = fields.get(3).map(|s| to_id(s)).unwrap_or_default();

    let moves = fields
        .get(4)
        .map(|s| {
            s.split(',')
                .filter(|m| !m.is_empty())
                .map(to_id)
                .collect()
        })
        .unwrap_or_default();

    let gender = match fields.get(7).copied() {
        Some("M") => Some('M'),
        Some("F") => Some('F'),
        _ => None,
    };

    let level = fields
        .get(10)
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);

    // Tail field: happiness,pokeball,hiddenpower,gmax,dmaxlevel,teratype
    let tera_type = fields
        .get(11)
        .and_then(|s| s.split(',').nth(5))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string());

    TeamMember {
        species_id,
        nickname,
        item_id,
        ability_id,
        moves,
        gender,
        level,
        tera_type,
        showteam_index: index,
    }
}

/// Pack member records back into the wire format.
///
/// Inverse of [`unpack_team`] over the retained fields: unpacking the result
/// yields the same records.
pub fn pack_team(team: &[TeamMember]) -> String {
    team.iter().map(pack_member).collect::<Vec<_>>().join("]")
}

fn pack_member(member: &TeamMember) -> String {
    let item = member.item_id.as_deref().unwrap_or("");
    let moves = member.moves.join(",");
    let gender = member.gender.map(String::from).unwrap_or_default();
    let level = if member.level == 100 {
        String::new()
    } else {
        member.level.to_string()
    };
    let tail = member
        .tera_type
        .as_deref()
        .map(|t| format!(",,,,,{}", t))
        .unwrap_or_default();

    format!(
        "{}|{}|{}|{}|{}|||{}|||{}|{}",
        member.nickname, member.species_id, item, member.ability_id, moves, gender, level, tail
    )
}

/// Render a team in the human-readable export layout
pub fn export_team(team: &[TeamMember]) -> String {
    let mut out = String::new();
    for member in team {
        let headline = if to_id(&member.nickname) == member.species_id {
            member.species_id.clone()
        } else {
            format!("{} ({})", member.nickname, member.species_id)
        };
        out.push_str(&headline);
        if let Some(item) = &member.item_id {
            out.push_str(&format!(" @ {}", item));
        }
        out.push('\n');
        out.push_str(&format!("Ability: {}\n", member.ability_id));
        if member.level != 100 {
            out.push_str(&format!("Level: {}\n", member.level));
        }
        if let Some(tera) = &member.tera_type {
            out.push_str(&format!("Tera Type: {}\n", tera));
        }
        for mv in &member.moves {
            out.push_str(&format!("- {}\n", mv));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKED: &str = "Sparky|Pikachu|lightball|static|thunderbolt,voltswitch,protect,fakeout|||M|||50|\
]Flutter Mane||boosterenergy|protosynthesis|moonblast,dazzlinggleam,shadowball,protect||\
||||50|,,,,,Fairy";

    #[test]
    fn test_unpack_team() {
        let team = unpack_team(PACKED);
        assert_eq!(team.len(), 2);

        assert_eq!(team[0].nickname, "Sparky");
        assert_eq!(team[0].species_id, "pikachu");
        assert_eq!(team[0].item_id.as_deref(), Some("lightball"));
        assert_eq!(team[0].ability_id, "static");
        assert_eq!(team[0].moves.len(), 4);
        assert_eq!(team[0].gender, Some('M'));
        assert_eq!(team[0].level, 50);
        assert_eq!(team[0].showteam_index, 0);
        assert_eq!(team[0].tera_type, None);

        assert_eq!(team[1].species_id, "fluttermane");
        assert_eq!(team[1].tera_type.as_deref(), Some("Fairy"));
        assert_eq!(team[1].showteam_index, 1);
    }

    #[test]
    fn test_pack_round_trip() {
        let team = unpack_team(PACKED);
        let repacked = pack_team(&team);
        assert_eq!(unpack_team(&repacked), team);
    }

    #[test]
    fn test_unpack_empty() {
        assert!(unpack_team("").is_empty());
    }

    #[test]
    fn test_export_team() {
        let team = unpack_team(PACKED);
        let export = export_team(&team);
        assert!(export.contains("Sparky (pikachu) @ lightball"));
        assert!(export.contains("Tera Type: Fairy"));
        assert!(export.contains("- moonblast"));
    }
}
