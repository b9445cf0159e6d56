//! Replay sessions: drive a live battle engine through a parsed replay,
//! keeping a resumable snapshot per turn.
//!
//! The engine is injected behind the [`Engine`] trait; [`ReplayDriver`]
//! borrows it for the duration of a replay and reconciles its divergent
//! simulation against the recorded log after every turn. [`ReplaySession`]
//! wraps a driver in the line-oriented command protocol, and
//! [`spawn_session`] runs one session as an independent actor.

pub mod actor;
pub mod driver;
pub mod engine;
pub mod mock;
pub mod session;
pub mod snapshot;

pub use actor::{spawn_session, SessionHandle};
pub use driver::{ExportBundle, ReplayDriver};
pub use engine::{
    ChoiceOutcome, Engine, FormatConfig, PokemonUpdate, PokemonView, RequestKind, SideView,
};
pub use mock::MockEngine;
pub use session::{PlayerOptions, ReplaySession};
pub use snapshot::patch_snapshot;
