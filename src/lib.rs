//! Sprint Scheduler Library
//!
//! A store-backed task scheduler shared by several shards, and the
//! writing-sprint lifecycle it drives.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod goals;
pub mod logging;
pub mod notifier;
pub mod reminders;
pub mod scheduler;
pub mod sprint;
pub mod types;
