//! Pre-battle record parsers
//!
//! These records appear before the first turn: player registration, open
//! team sheets, and team preview.

use anyhow::Result;

use crate::battle::{parse_details, SideId};
use crate::record::LogRecord;
use crate::ParseError;

/// Parse |player|SIDE|USERNAME|AVATAR|RATING
pub fn parse_player(parts: &[&str]) -> Result<LogRecord> {
    let side = parse_side(parts)?;
    let username = parts.get(3).unwrap_or(&"").to_string();

    Ok(LogRecord::Player { side, username })
}

/// Parse |showteam|SIDE|PACKED
///
/// The packed team itself contains `|` field delimiters, so everything after
/// the side is rejoined verbatim.
pub fn parse_showteam(parts: &[&str]) -> Result<LogRecord> {
    let side = parse_side(parts)?;
    if parts.len() < 4 {
        return Err(ParseError::MissingField("packed team".to_string()).into());
    }
    let packed = parts[3..].join("|");

    Ok(LogRecord::ShowTeam { side, packed })
}

/// Parse |poke|SIDE|DETAILS|ITEM
pub fn parse_poke(parts: &[&str]) -> Result<LogRecord> {
    let side = parse_side(parts)?;
    let details = parse_details(parts, 3);
    let has_item = parts.get(4).map(|s| *s == "item").unwrap_or(false);

    Ok(LogRecord::Poke {
        side,
        details,
        has_item,
    })
}

/// Parse |teampreview or |teampreview|COUNT
pub fn parse_teampreview(parts: &[&str]) -> Result<LogRecord> {
    let count = parts.get(2).and_then(|s| s.parse().ok());
    Ok(LogRecord::TeamPreview(count))
}

/// Parse |start
pub fn parse_start(_parts: &[&str]) -> Result<LogRecord> {
    Ok(LogRecord::Start)
}

fn parse_side(parts: &[&str]) -> Result<SideId> {
    parts
        .get(2)
        .and_then(|s| SideId::parse(s))
        .ok_or_else(|| ParseError::MissingField("side".to_string()).into())
}
