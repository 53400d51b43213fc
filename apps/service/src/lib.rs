//! Synthetic uptime monitoring: scheduled HTTP probes, assertion rules and
//! an at-least-once task pipeline feeding a libsql result store.

pub mod assertions;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod validation;
