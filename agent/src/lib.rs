//! JEE fleet update agent
//!
//! Each agent reconciles the part of a declarative fleet model it owns with
//! the live state of its hosts, and forwards the rest to the owning agents.

pub mod change_detector;
pub mod config;
pub mod constants;
pub mod content_manager;
pub mod controller;
pub mod delegation;
pub mod errors;
pub mod journal;
pub mod mailer;
pub mod model;
pub mod notifier;
pub mod publisher;
pub mod scheduler;
pub mod services;
pub mod types;
pub mod update_log;
pub mod updater;
pub mod web;

pub use errors::{UpdateError, UpdateResult};
pub use updater::Engine;
pub use web::AppState;
