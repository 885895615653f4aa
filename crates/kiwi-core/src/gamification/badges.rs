use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Achievement badges. Each is held at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    FirstCompletion,
    StreakThree,
    StreakWeek,
    StreakMonth,
    #[serde(rename = "xp_100")]
    Xp100,
    #[serde(rename = "xp_1000")]
    Xp1000,
    #[serde(rename = "level_5")]
    Level5,
    #[serde(rename = "level_10")]
    Level10,
}

/// Counters a badge threshold is checked against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub completions: u64,
    pub xp: u64,
    pub level: u32,
    pub streak: u32,
}

impl Badge {
    pub const ALL: [Badge; 8] = [
        Badge::FirstCompletion,
        Badge::StreakThree,
        Badge::StreakWeek,
        Badge::StreakMonth,
        Badge::Xp100,
        Badge::Xp1000,
        Badge::Level5,
        Badge::Level10,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::FirstCompletion => "first_completion",
            Badge::StreakThree => "streak_three",
            Badge::StreakWeek => "streak_week",
            Badge::StreakMonth => "streak_month",
            Badge::Xp100 => "xp_100",
            Badge::Xp1000 => "xp_1000",
            Badge::Level5 => "level_5",
            Badge::Level10 => "level_10",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Badge::FirstCompletion => "Completed a first task",
            Badge::StreakThree => "Reached a 3-occurrence streak",
            Badge::StreakWeek => "Reached a 7-occurrence streak",
            Badge::StreakMonth => "Reached a 30-occurrence streak",
            Badge::Xp100 => "Earned 100 XP",
            Badge::Xp1000 => "Earned 1000 XP",
            Badge::Level5 => "Reached level 5",
            Badge::Level10 => "Reached level 10",
        }
    }

    pub fn is_earned(&self, p: &Progress) -> bool {
        match self {
            Badge::FirstCompletion => p.completions >= 1,
            Badge::StreakThree => p.streak >= 3,
            Badge::StreakWeek => p.streak >= 7,
            Badge::StreakMonth => p.streak >= 30,
            Badge::Xp100 => p.xp >= 100,
            Badge::Xp1000 => p.xp >= 1000,
            Badge::Level5 => p.level >= 5,
            Badge::Level10 => p.level >= 10,
        }
    }

    /// Every badge whose threshold `progress` meets.
    pub fn earned(progress: &Progress) -> impl Iterator<Item = Badge> + '_ {
        Badge::ALL.into_iter().filter(move |b| b.is_earned(progress))
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Badge {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Badge::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| ValidationError::invalid("badge", format!("unknown badge '{s}'")))
    }
}
