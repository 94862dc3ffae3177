// File: agent/src/services/mod.rs
pub mod commands;
pub mod sql;
