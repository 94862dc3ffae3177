//! Central repository for agent constants
//!
//! Organized by category: HTTP plumbing, delegation limits, cache layout and
//! defaults used when the agent configuration omits a value.

use std::time::Duration;

/// HTTP client and server constants
pub mod http {
    use super::Duration;

    /// Timeout for establishing connections to other agents and the mail relay
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout for mail relay requests
    pub const MAIL_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout when fetching the fleet model over HTTP
    pub const MODEL_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Delegation limits
pub mod delegation {
    /// Maximum nesting of agent-to-agent calls within one top-level run
    pub const MAX_DELEGATION_DEPTH: u32 = 16;
}

/// Agent cache layout
pub mod cache {
    pub const ENVIRONMENTS_DIR: &str = "environments";
    pub const APPLICATIONS_DIR: &str = "applications";
    pub const SOFTWARE_DIR: &str = "software";

    pub const ARCHIVES_FOLDER: &str = "archives";
    pub const CONFIG_FOLDER: &str = "config";
    pub const SQL_FOLDER: &str = "sql";
    pub const LOCATIONS_FOLDER: &str = "locations";

    /// Suffix of the record of the last executed SQL script
    pub const APPLIED_SUFFIX: &str = "applied";
}

/// Variable substitution
pub mod variables {
    /// Bound on nested `${...}` expansion passes
    pub const MAX_SUBSTITUTION_PASSES: usize = 8;
}

/// Default configuration values
pub mod defaults {
    pub const BIND_HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8745;
    pub const CACHE_DIR: &str = "data/cache";
    pub const LOG_DIR: &str = "data/logs";
    pub const JOURNAL_DIR: &str = "data/journal";
    pub const MODEL_LOCATION: &str = "config/fleet.toml";
    pub const DEVELOPMENT_API_KEY: &str = "default-development-key";
    pub const MAIL_FROM: &str = "jeefleet-agent@localhost";
}
