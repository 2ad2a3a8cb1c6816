//! Level derivation from total XP.

use serde::{Deserialize, Serialize};

/// Cumulative XP needed to reach each level; index 0 is level 1.
/// Strictly ascending, so `level_for_xp` is monotonic.
pub const LEVEL_THRESHOLDS: [u64; 10] = [0, 100, 250, 500, 1000, 1750, 2750, 4000, 5500, 7500];

pub const MAX_LEVEL: u32 = LEVEL_THRESHOLDS.len() as u32;

const LEVEL_TITLES: [&str; 10] = [
    "Newcomer",
    "Explorer",
    "Apprentice",
    "Builder",
    "Contributor",
    "Specialist",
    "Strategist",
    "Mentor",
    "Luminary",
    "Legend",
];

/// Level (1-based) reached with `total_xp`.
pub fn level_for_xp(total_xp: u64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .take_while(|&&threshold| threshold <= total_xp)
        .count() as u32
}

/// Display title for a level. Levels past the table keep the last title.
pub fn level_title(level: u32) -> &'static str {
    let idx = (level.max(1) as usize - 1).min(LEVEL_TITLES.len() - 1);
    LEVEL_TITLES[idx]
}

/// Snapshot of where a total sits within the level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub title: String,
    pub total_xp: u64,
    pub level_floor: u64,
    /// `None` at max level.
    pub next_level_at: Option<u64>,
    pub xp_to_next: Option<u64>,
}

impl LevelProgress {
    pub fn for_xp(total_xp: u64) -> Self {
        let level = level_for_xp(total_xp);
        let level_floor = LEVEL_THRESHOLDS[level as usize - 1];
        let next_level_at = LEVEL_THRESHOLDS.get(level as usize).copied();
        Self {
            level,
            title: level_title(level).to_string(),
            total_xp,
            level_floor,
            next_level_at,
            xp_to_next: next_level_at.map(|next| next - total_xp),
        }
    }

    /// 0.0 .. 1.0 progress through the current level. 1.0 at max level.
    pub fn fraction(&self) -> f64 {
        match self.next_level_at {
            Some(next) => {
                let span = (next - self.level_floor) as f64;
                (self.total_xp - self.level_floor) as f64 / span
            }
            None => 1.0,
        }
    }
}
