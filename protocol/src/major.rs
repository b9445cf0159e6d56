//! Major battle action record parsers
//!
//! The primary actions in battle: moves, switches, faints, identity changes.

use anyhow::Result;

use crate::battle::{parse_details, parse_hp_status, parse_slot_ref, SlotRef};
use crate::record::LogRecord;

/// Parse |switch|IDENT|DETAILS|HP
pub fn parse_switch(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let details = parse_details(parts, 3);
    let hp = parse_hp_status(parts, 4);

    Ok(LogRecord::Switch { ident, details, hp })
}

/// Parse |drag|IDENT|DETAILS|HP
pub fn parse_drag(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let details = parse_details(parts, 3);
    let hp = parse_hp_status(parts, 4);

    Ok(LogRecord::Drag { ident, details, hp })
}

/// Parse |detailschange|IDENT|DETAILS|HP
pub fn parse_detailschange(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let details = parse_details(parts, 3);
    let hp = parse_hp_status(parts, 4);

    Ok(LogRecord::DetailsChange { ident, details, hp })
}

/// Parse |replace|IDENT|DETAILS|HP
pub fn parse_replace(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let details = parse_details(parts, 3);
    let hp = parse_hp_status(parts, 4);

    Ok(LogRecord::Replace { ident, details, hp })
}

/// Parse |move|IDENT|MOVE|TARGET with optional annotations
///
/// The target field is only a real target when it parses as an identifier;
/// `[spread]`, `[still]` and friends are annotations, not targets.
pub fn parse_move(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let move_name = parts.get(3).unwrap_or(&"").to_string();
    let target = parts.get(4).and_then(|s| SlotRef::parse(s));
    let spread = parts.iter().any(|p| p.starts_with("[spread]"));

    Ok(LogRecord::Move {
        ident,
        move_name,
        target,
        spread,
    })
}

/// Parse |faint|IDENT
pub fn parse_faint(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    Ok(LogRecord::Faint(ident))
}

/// Parse |cant|IDENT|REASON or |cant|IDENT|REASON|MOVE
pub fn parse_cant(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let reason = parts.get(3).unwrap_or(&"").to_string();
    let move_name = parts.get(4).map(|s| s.to_string());

    Ok(LogRecord::Cant {
        ident,
        reason,
        move_name,
    })
}
