//! XP ledger and leveling.
//!
//! The ledger is append-only; total XP and level are always derived.

pub mod ledger;
pub mod level;

pub use ledger::{XpAward, XpEntry, XpLedger};
pub use level::{level_for_xp, level_title, LevelProgress, LEVEL_THRESHOLDS, MAX_LEVEL};
