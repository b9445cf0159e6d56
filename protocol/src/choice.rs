//! Choice strings submitted back to the engine
//!
//! One entry per active slot, rendered in the engine's choice syntax and
//! joined with ", " across a side's slots.

use std::fmt;

/// A single slot's decision for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotChoice {
    /// `move <id> [<target>] [mega] [terastallize]`
    Move {
        move_id: String,
        /// Target location: positive for the opposing side (a=1, b=2),
        /// negative for allies (a=-1, b=-2), absent for spread moves
        target: Option<i8>,
        mega: bool,
        tera: bool,
    },

    /// `switch <team index>` (1-based)
    Switch(usize),

    /// Let the engine pick a legal no-op for a slot that could not act
    Default,

    /// Nothing to do for this slot (forced-switch filler)
    Pass,
}

impl fmt::Display for SlotChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotChoice::Move {
                move_id,
                target,
                mega,
                tera,
            } => {
                write!(f, "move {}", move_id)?;
                if let Some(loc) = target {
                    write!(f, " {}", loc)?;
                }
                if *mega {
                    write!(f, " mega")?;
                }
                if *tera {
                    write!(f, " terastallize")?;
                }
                Ok(())
            }
            SlotChoice::Switch(index) => write!(f, "switch {}", index),
            SlotChoice::Default => write!(f, "default"),
            SlotChoice::Pass => write!(f, "pass"),
        }
    }
}

/// A full side's decision for one turn, slot order a before b
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnChoice(pub Vec<SlotChoice>);

impl TurnChoice {
    /// Render in wire form: entries joined with ", "
    pub fn to_wire(&self) -> String {
        self.0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether every entry is `pass`
    pub fn is_all_pass(&self) -> bool {
        self.0.iter().all(|c| matches!(c, SlotChoice::Pass))
    }
}

impl fmt::Display for TurnChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}
