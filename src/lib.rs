//! Cli time tracker that watches for keyboard and mouse inactivity while an entry is open.
//! Idle spans past a configurable threshold are held back until the user decides whether the
//! time counts, so recorded durations stay honest without silent corrections.
//!

pub mod cli;
pub mod probe;
pub mod storage;
pub mod tracker;
pub mod utils;
