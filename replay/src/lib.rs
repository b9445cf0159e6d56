//! Reconstruction of player intents and per-turn state patches from a
//! finished battle log.
//!
//! This crate sits between `rewind-protocol` (log records) and
//! `rewind-session` (the replay driver):
//!
//! ```text
//! rewind-protocol (log records, packed teams)
//!        │
//!        ▼
//! rewind-replay (intents + patches)  ← THIS CRATE
//!        │
//!        └─> rewind-session (drives the live engine)
//! ```
//!
//! The pipeline: tokenize the log, recover rosters and team-preview
//! selections, walk the event stream once for choices and once for state
//! patches, and assemble per-turn bundles the replay driver feeds into a
//! live engine.

pub mod choices;
pub mod patch;
pub mod preview;
pub mod roster;
pub mod script;

pub use choices::{ChoiceReconstructor, TurnIntents};
pub use patch::{ActiveEntry, BenchEntry, HpEntry, PatchExtractor, StatusEntry, TurnPatch};
pub use preview::{resolve_preview, TeamPreview};
pub use roster::{Appearances, Rosters};
pub use script::{ReplayOptions, ReplayScript, SidePlan, TurnBundle};
