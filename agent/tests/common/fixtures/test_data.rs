//! Common test data and constants

pub const LOCAL_AGENT: &str = "agent-a";
pub const REMOTE_AGENT: &str = "agent-b";
pub const REMOTE_API_KEY: &str = "remote-key";
pub const TECHNOLOGY: &str = "mock";

pub mod environments {
    pub const PROD: &str = "prod";
    pub const QA: &str = "qa";
}

pub mod servers {
    pub const AS1: &str = "as1";
    pub const AS2: &str = "as2";
}

/// Single environment owned by the local agent: one server with one pool,
/// one application carrying a configuration file, and one software with a
/// location. `@ROOT@` is the test directory.
pub const BASIC_FLEET: &str = r#"
[[agents]]
id = "agent-a"
hostname = "localhost"

[[environments]]
name = "prod"
agent = "agent-a"

[[environments.application_servers]]
name = "as1"
technology = "mock"

[[environments.application_servers.jdbc_connection_pools]]
name = "P1"
driver = "org.postgresql.Driver"
url = "jdbc:postgresql://db/app"
maximal = 10

[[environments.application_servers.applications]]
name = "shop"

[[environments.application_servers.applications.configuration_files]]
name = "app.properties"
uri = "@ROOT@/source/app.properties"
path = "@ROOT@/installed/app.properties"

[[environments.application_servers.applications.configuration_files.mappings]]
key = "@db.host@"
value = "db.prod"

[[environments.software]]
name = "tools"

[[environments.software.update_plan]]
type = "location"
name = "scripts"
uri = "@ROOT@/source/scripts"
path = "@ROOT@/installed/scripts"
"#;

/// Three pools on one server; the middle one is made to fail by the tests.
pub const THREE_POOLS_FLEET: &str = r#"
[[agents]]
id = "agent-a"
hostname = "localhost"

[[environments]]
name = "prod"
agent = "agent-a"

[[environments.application_servers]]
name = "as1"
technology = "mock"

[[environments.application_servers.jdbc_connection_pools]]
name = "P1"
url = "jdbc:postgresql://db/one"

[[environments.application_servers.jdbc_connection_pools]]
name = "P2"
url = "jdbc:postgresql://db/two"
blocker = @BLOCKER@

[[environments.application_servers.jdbc_connection_pools]]
name = "P3"
url = "jdbc:postgresql://db/three"
"#;
