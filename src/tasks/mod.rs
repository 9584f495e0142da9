//! Background Tasks Module
//!
//! Contains the task that runs periodically for the lifetime of a cache.
//!
//! # Tasks
//! - Reaper: physically removes expired rows at a fixed interval

mod reaper;

pub use reaper::{spawn_reaper, sweep, ReaperHandle, ReaperState};
