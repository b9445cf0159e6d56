use thiserror::Error;

pub mod battle;
pub mod choice;
pub mod packed;
pub mod record;

mod major;
mod minor;
mod progress;
mod setup;

pub use battle::{
    base_id, species_matches, to_id, GameType, HpStatus, PokemonDetails, SideId, Slot, SlotRef,
};
pub use choice::{SlotChoice, TurnChoice};
pub use packed::{export_team, pack_team, unpack_team, TeamMember};
pub use record::{parse_log, parse_record, LogRecord};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid record format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Empty record")]
    EmptyRecord,
}
