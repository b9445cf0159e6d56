//! Event-log tokenizer
//!
//! Splits a battle log into typed records: one record per line, fields
//! delimited by `|` with an empty first field. Records the replay core does
//! not recognize come back as `Unknown` and are skipped downstream.

use anyhow::Result;

use crate::battle::{HpStatus, PokemonDetails, SideId, SlotRef};
use crate::{major, minor, progress, setup, ParseError};

/// One typed record of the battle event log
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// |player|SIDE|USERNAME|AVATAR|RATING
    Player { side: SideId, username: String },

    /// |showteam|SIDE|PACKED
    ShowTeam { side: SideId, packed: String },

    /// |poke|SIDE|DETAILS|ITEM
    Poke {
        side: SideId,
        details: PokemonDetails,
        has_item: bool,
    },

    /// |teampreview or |teampreview|COUNT
    TeamPreview(Option<u32>),

    /// |start
    Start,

    /// |turn|NUMBER
    Turn(u32),

    /// |upkeep
    Upkeep,

    /// |switch|IDENT|DETAILS|HP
    Switch {
        ident: SlotRef,
        details: PokemonDetails,
        hp: Option<HpStatus>,
    },

    /// |drag|IDENT|DETAILS|HP
    Drag {
        ident: SlotRef,
        details: PokemonDetails,
        hp: Option<HpStatus>,
    },

    /// |detailschange|IDENT|DETAILS|HP
    DetailsChange {
        ident: SlotRef,
        details: PokemonDetails,
        hp: Option<HpStatus>,
    },

    /// |replace|IDENT|DETAILS|HP
    Replace {
        ident: SlotRef,
        details: PokemonDetails,
        hp: Option<HpStatus>,
    },

    /// |move|IDENT|MOVE|TARGET with optional annotations
    Move {
        ident: SlotRef,
        move_name: String,
        target: Option<SlotRef>,
        spread: bool,
    },

    /// |faint|IDENT
    Faint(SlotRef),

    /// |cant|IDENT|REASON or |cant|IDENT|REASON|MOVE
    Cant {
        ident: SlotRef,
        reason: String,
        move_name: Option<String>,
    },

    /// |-damage|IDENT|HP
    Damage {
        ident: SlotRef,
        hp: Option<HpStatus>,
    },

    /// |-heal|IDENT|HP
    Heal {
        ident: SlotRef,
        hp: Option<HpStatus>,
    },

    /// |-status|IDENT|STATUS
    Status { ident: SlotRef, status: String },

    /// |-curestatus|IDENT|STATUS
    CureStatus { ident: SlotRef, status: String },

    /// |-terastallize|IDENT|TYPE
    Terastallize { ident: SlotRef, tera_type: String },

    /// |-mega|IDENT|MEGASTONE
    Mega { ident: SlotRef, megastone: String },

    /// |-activate|IDENT|EFFECT with optional [of] SOURCE
    Activate {
        ident: Option<SlotRef>,
        effect: String,
        of: Option<SlotRef>,
    },

    /// |-message|MESSAGE
    Message(String),

    /// |win|USER
    Win(String),

    /// |tie
    Tie,

    /// Catch-all for records the replay core ignores
    Unknown(String),
}

/// Parse a single log line into a record
pub fn parse_record(line: &str) -> Result<LogRecord> {
    let line = line.trim_end_matches('\r');

    if line.is_empty() {
        return Err(ParseError::EmptyRecord.into());
    }

    if !line.starts_with('|') {
        return Ok(LogRecord::Unknown(line.to_string()));
    }

    let parts: Vec<&str> = line.split('|').collect();

    if parts.len() < 2 {
        return Ok(LogRecord::Unknown(line.to_string()));
    }

    match parts[1] {
        "player" => setup::parse_player(&parts),
        "showteam" => setup::parse_showteam(&parts),
        "poke" => setup::parse_poke(&parts),
        "teampreview" => setup::parse_teampreview(&parts),
        "start" => setup::parse_start(&parts),
        "turn" => progress::parse_turn(&parts),
        "upkeep" => progress::parse_upkeep(&parts),
        "win" => progress::parse_win(&parts),
        "tie" => progress::parse_tie(&parts),
        "switch" => major::parse_switch(&parts),
        "drag" => major::parse_drag(&parts),
        "detailschange" => major::parse_detailschange(&parts),
        "replace" => major::parse_replace(&parts),
        "move" => major::parse_move(&parts),
        "faint" => major::parse_faint(&parts),
        "cant" => major::parse_cant(&parts),
        "-damage" => minor::parse_damage(&parts),
        "-heal" => minor::parse_heal(&parts),
        "-status" => minor::parse_status(&parts),
        "-curestatus" => minor::parse_curestatus(&parts),
        "-terastallize" => minor::parse_terastallize(&parts),
        "-mega" => minor::parse_mega(&parts),
        "-activate" => minor::parse_activate(&parts),
        "-message" => minor::parse_message(&parts),
        _ => Ok(LogRecord::Unknown(line.to_string())),
    }
}

/// Tokenize a whole log into a lazy record stream.
///
/// Blank lines are dropped; malformed lines degrade to `Unknown` so a bad
/// record never aborts the scan.
pub fn parse_log(log: &str) -> impl Iterator<Item = LogRecord> + '_ {
    log.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_record(line).unwrap_or_else(|_| LogRecord::Unknown(line.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::SideId;

    #[test]
    fn test_parse_switch() {
        let rec = parse_record("|switch|p1a: Sparky|Pikachu, L50, M|100/100").unwrap();
        match rec {
            LogRecord::Switch { ident, details, hp } => {
                assert_eq!(ident.side, SideId::P1);
                assert_eq!(ident.name, "Sparky");
                assert_eq!(details.species, "Pikachu");
                assert_eq!(hp.unwrap().percent(), 100);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_parse_move_with_target() {
        let rec = parse_record("|move|p1a: Flutter Mane|Moonblast|p2b: Incineroar").unwrap();
        match rec {
            LogRecord::Move {
                ident,
                move_name,
                target,
                spread,
            } => {
                assert_eq!(ident.side, SideId::P1);
                assert_eq!(move_name, "Moonblast");
                assert_eq!(target.unwrap().position, Some('b'));
                assert!(!spread);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_parse_move_spread() {
        let rec =
            parse_record("|move|p1a: Flutter Mane|Dazzling Gleam|p2a: Porygon2|[spread] p2a,p2b")
                .unwrap();
        match rec {
            LogRecord::Move { spread, .. } => assert!(spread),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_parse_activate_commander() {
        let rec =
            parse_record("|-activate|p2a: Tatsugiri|ability: Commander|[of] p2b: Dondozo").unwrap();
        match rec {
            LogRecord::Activate { ident, effect, of } => {
                assert_eq!(ident.unwrap().name, "Tatsugiri");
                assert_eq!(effect, "ability: Commander");
                assert_eq!(of.unwrap().name, "Dondozo");
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_parse_showteam_preserves_pipes() {
        let rec = parse_record("|showteam|p1|Sparky|pikachu|lightball|static|thunderbolt|||M|||50|")
            .unwrap();
        match rec {
            LogRecord::ShowTeam { side, packed } => {
                assert_eq!(side, SideId::P1);
                assert!(packed.starts_with("Sparky|pikachu|lightball"));
                assert!(packed.ends_with("|50|"));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_records_ignored() {
        assert!(matches!(
            parse_record("|j|someone").unwrap(),
            LogRecord::Unknown(_)
        ));
        let records: Vec<_> = parse_log("|turn|1\n\n|nonsense|x\n|upkeep\n").collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], LogRecord::Turn(1));
        assert_eq!(records[2], LogRecord::Upkeep);
    }
}
