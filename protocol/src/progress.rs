//! Battle progress record parsers

use anyhow::Result;

use crate::record::LogRecord;
use crate::ParseError;

/// Parse |turn|NUMBER
pub fn parse_turn(parts: &[&str]) -> Result<LogRecord> {
    let turn = parts
        .get(2)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::MissingField("turn number".to_string()))?;

    Ok(LogRecord::Turn(turn))
}

/// Parse |upkeep
pub fn parse_upkeep(_parts: &[&str]) -> Result<LogRecord> {
    Ok(LogRecord::Upkeep)
}

/// Parse |win|USER
pub fn parse_win(parts: &[&str]) -> Result<LogRecord> {
    let user = parts.get(2).unwrap_or(&"").to_string();
    Ok(LogRecord::Win(user))
}

/// Parse |tie
pub fn parse_tie(_parts: &[&str]) -> Result<LogRecord> {
    Ok(LogRecord::Tie)
}
