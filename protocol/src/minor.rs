//! Minor battle action record parsers
//!
//! Secondary effects: damage, healing, status, terastallization, ability
//! activations.

use anyhow::Result;

use crate::battle::{parse_hp_status, parse_slot_ref, SlotRef};
use crate::record::LogRecord;

/// Parse |-damage|IDENT|HP
pub fn parse_damage(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let hp = parse_hp_status(parts, 3);

    Ok(LogRecord::Damage { ident, hp })
}

/// Parse |-heal|IDENT|HP
pub fn parse_heal(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let hp = parse_hp_status(parts, 3);

    Ok(LogRecord::Heal { ident, hp })
}

/// Parse |-status|IDENT|STATUS
pub fn parse_status(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let status = parts.get(3).unwrap_or(&"").to_string();

    Ok(LogRecord::Status { ident, status })
}

/// Parse |-curestatus|IDENT|STATUS
pub fn parse_curestatus(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let status = parts.get(3).unwrap_or(&"").to_string();

    Ok(LogRecord::CureStatus { ident, status })
}

/// Parse |-terastallize|IDENT|TYPE
pub fn parse_terastallize(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let tera_type = parts.get(3).unwrap_or(&"").to_string();

    Ok(LogRecord::Terastallize { ident, tera_type })
}

/// Parse |-mega|IDENT|MEGASTONE
pub fn parse_mega(parts: &[&str]) -> Result<LogRecord> {
    let ident = parse_slot_ref(parts, 2)?;
    let megastone = parts.get(3).unwrap_or(&"").to_string();

    Ok(LogRecord::Mega { ident, megastone })
}

/// Parse |-activate|IDENT|EFFECT with optional [of] SOURCE
pub fn parse_activate(parts: &[&str]) -> Result<LogRecord> {
    // First field might be an identifier or already the effect
    let ident = parts.get(2).and_then(|s| SlotRef::parse(s));
    let effect = if ident.is_some() {
        parts.get(3).unwrap_or(&"").to_string()
    } else {
        parts.get(2).unwrap_or(&"").to_string()
    };
    let of = parts
        .iter()
        .find_map(|p| p.strip_prefix("[of] ").and_then(SlotRef::parse));

    Ok(LogRecord::Activate { ident, effect, of })
}

/// Parse |-message|MESSAGE
pub fn parse_message(parts: &[&str]) -> Result<LogRecord> {
    let message = parts.get(2).unwrap_or(&"").to_string();
    Ok(LogRecord::Message(message))
}
