//! Experience points and levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::badges::Badge;
use crate::error::ConfigError;

/// Tunables for XP awards and the level curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationConfig {
    /// XP for any completion
    #[serde(default = "default_base_xp")]
    pub base_xp: u64,
    /// Extra XP per streak day on recurring occurrences
    #[serde(default = "default_streak_bonus_step")]
    pub streak_bonus_step: u64,
    /// Ceiling on the streak bonus
    #[serde(default = "default_streak_bonus_cap")]
    pub streak_bonus_cap: u64,
    /// Level n needs `level_step_xp * n * (n - 1) / 2` XP
    #[serde(default = "default_level_step_xp")]
    pub level_step_xp: u64,
}

fn default_base_xp() -> u64 {
    10
}
fn default_streak_bonus_step() -> u64 {
    2
}
fn default_streak_bonus_cap() -> u64 {
    20
}
fn default_level_step_xp() -> u64 {
    100
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            base_xp: default_base_xp(),
            streak_bonus_step: default_streak_bonus_step(),
            streak_bonus_cap: default_streak_bonus_cap(),
            level_step_xp: default_level_step_xp(),
        }
    }
}

impl GamificationConfig {
    /// # Errors
    /// Returns an error if `level_step_xp` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level_step_xp == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gamification.level_step_xp".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Streak bonus for a run of `streak`. Non-decreasing, capped.
    pub fn streak_bonus(&self, streak: u32) -> u64 {
        u64::from(streak)
            .saturating_mul(self.streak_bonus_step)
            .min(self.streak_bonus_cap)
    }

    /// XP for one completion. Only recurring occurrences get a streak bonus.
    pub fn xp_for_completion(&self, streak: Option<u32>) -> u64 {
        self.base_xp
            .saturating_add(streak.map_or(0, |s| self.streak_bonus(s)))
    }

    /// Cumulative XP needed to reach `level`.
    pub fn xp_for_level(&self, level: u32) -> Option<u64> {
        let n = u64::from(level.max(1));
        n.checked_mul(n - 1)
            .map(|t| t / 2)
            .and_then(|t| t.checked_mul(self.level_step_xp))
    }

    /// Level reached with `xp` cumulative XP. Level 1 starts at 0 XP.
    pub fn level_for_xp(&self, xp: u64) -> u32 {
        let step = self.level_step_xp.max(1) as f64;
        // Closed-form estimate, then corrected for float rounding
        let estimate = ((1.0 + (1.0 + 8.0 * xp as f64 / step).sqrt()) / 2.0).floor();
        let mut level = (estimate as u32).max(1);
        while level > 1 && self.xp_for_level(level).map_or(true, |need| need > xp) {
            level -= 1;
        }
        while self
            .xp_for_level(level.saturating_add(1))
            .is_some_and(|need| need <= xp)
            && level < u32::MAX
        {
            level += 1;
        }
        level
    }
}

/// The user's gamification record. Created by the first completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationState {
    pub xp: u64,
    pub level: u32,
    pub badges: BTreeSet<Badge>,
    pub completions: u64,
    /// Row version for compare-and-set writes; 0 until first stored
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GamificationState {
    pub fn new(now: DateTime<Utc>) -> Self {
        GamificationState {
            xp: 0,
            level: 1,
            badges: BTreeSet::new(),
            completions: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// XP still needed for the next level.
    pub fn xp_to_next_level(&self, config: &GamificationConfig) -> Option<u64> {
        config
            .xp_for_level(self.level.saturating_add(1))
            .map(|need| need.saturating_sub(self.xp))
    }
}
