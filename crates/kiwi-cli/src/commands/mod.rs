pub mod config;
pub mod daemon;
pub mod daily;
pub mod stats;
pub mod streak;
pub mod task;
