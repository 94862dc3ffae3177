//! Integration tests for SQL scripts, archives, content managers and
//! software commands
//!
//! Tests verify:
//! - SQL scripts run once per distinct content against a real SQLite file
//! - Archives are compared against the pristine cached copy, not the
//!   artifact the runtime rewrote
//! - Content managers and commands run on every update

mod common;

use agent::constants::cache::APPLIED_SUFFIX;
use agent::types::{ResourceKind, ResourceRequest};
use common::fixtures::*;
use sqlx::{Connection, SqliteConnection};

const SQL_FLEET: &str = r#"
[[agents]]
id = "agent-a"
hostname = "localhost"

[[environments]]
name = "prod"
agent = "agent-a"

[[environments.software]]
name = "tools"

[[environments.software.update_plan]]
type = "database"
name = "appdb"
url = "sqlite://@ROOT@/app.db?mode=rwc"

[[environments.software.update_plan.sql_scripts]]
name = "schema.sql"
uri = "@ROOT@/source/schema.sql"

[[environments.software.update_plan.sql_scripts.mappings]]
key = "@release@"
value = "42"
"#;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS runs (build INTEGER);\n\
                      INSERT INTO runs VALUES (@release@);\n";

async fn count_runs(agent: &TestAgent) -> i64 {
    let url = format!("sqlite://{}", agent.path("app.db").display());
    let mut connection = SqliteConnection::connect(&url).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE build = 42")
        .fetch_one(&mut connection)
        .await
        .unwrap();
    connection.close().await.unwrap();
    count
}

fn tools() -> ResourceRequest {
    ResourceRequest::environment(environments::PROD).software("tools")
}

#[tokio::test]
async fn sql_script_runs_once_per_distinct_content() {
    let agent = TestAgent::new(LOCAL_AGENT, SQL_FLEET);
    agent.write("source/schema.sql", SCHEMA);

    let first = agent
        .engine
        .update(ResourceKind::Software, tools())
        .await
        .unwrap();
    assert!(first.updated);
    assert_eq!(count_runs(&agent).await, 1);

    let applied = glob::glob(&format!(
        "{}/**/schema.sql.{}",
        agent.config.cache_dir.display(),
        APPLIED_SUFFIX
    ))
    .unwrap()
    .count();
    assert_eq!(applied, 1);

    let second = agent
        .engine
        .update(ResourceKind::Software, tools())
        .await
        .unwrap();
    assert!(!second.updated);
    assert_eq!(count_runs(&agent).await, 1);
    assert!(second
        .messages
        .iter()
        .any(|m| m.text == "SQL script schema.sql already executed"));

    agent.write("source/schema.sql", format!("-- second release\n{}", SCHEMA));
    assert!(!agent
        .engine
        .check(
            ResourceKind::SqlScript,
            tools().database("appdb").name("schema.sql")
        )
        .await
        .unwrap());

    agent
        .engine
        .update(
            ResourceKind::SqlScript,
            tools().database("appdb").name("schema.sql"),
        )
        .await
        .unwrap();
    assert_eq!(count_runs(&agent).await, 2);
}

#[tokio::test]
async fn failed_sql_script_is_retried_next_run() {
    let agent = TestAgent::new(LOCAL_AGENT, SQL_FLEET);
    agent.write("source/schema.sql", "INSERT INTO missing_table VALUES (1);\n");

    let err = agent
        .engine
        .update(
            ResourceKind::SqlScript,
            tools().database("appdb").name("schema.sql"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing_table"));

    agent.write("source/schema.sql", SCHEMA);
    let outcome = agent
        .engine
        .update(
            ResourceKind::SqlScript,
            tools().database("appdb").name("schema.sql"),
        )
        .await
        .unwrap();
    assert!(outcome.updated);
    assert_eq!(count_runs(&agent).await, 1);
}

const APP_FLEET: &str = r#"
[[agents]]
id = "agent-a"
hostname = "localhost"

[[environments]]
name = "prod"
agent = "agent-a"

[[environments.application_servers]]
name = "as1"
technology = "mock"

[[environments.application_servers.applications]]
name = "shop"
"#;

const ARCHIVE: &str = r#"
[[environments.application_servers.applications.archives]]
name = "shop.war"
uri = "@ROOT@/source/shop.war"
context_root = "/shop"
"#;

fn shop_archive() -> ResourceRequest {
    ResourceRequest::environment(environments::PROD)
        .server(servers::AS1)
        .application("shop")
        .name("shop.war")
}

#[tokio::test]
async fn rewritten_archive_is_not_redeployed() {
    let agent = TestAgent::new(LOCAL_AGENT, &format!("{}{}", APP_FLEET, ARCHIVE));
    agent.controller.rewrite_archives_on_deploy();
    agent.write("source/shop.war", "release 1");

    let first = agent
        .engine
        .update(ResourceKind::Archive, shop_archive())
        .await
        .unwrap();
    assert!(first.updated);
    assert!(first.messages.iter().any(|m| m.text == "Archive shop.war deployed"));

    assert!(agent
        .engine
        .check(ResourceKind::Archive, shop_archive())
        .await
        .unwrap());

    let second = agent
        .engine
        .update(ResourceKind::Archive, shop_archive())
        .await
        .unwrap();
    assert!(!second.updated);
    assert_eq!(agent.controller.mutations(), vec!["deploy:shop.war"]);

    agent.write("source/shop.war", "release 2");
    let third = agent
        .engine
        .update(ResourceKind::Archive, shop_archive())
        .await
        .unwrap();
    assert!(third.updated);
    assert!(third.messages.iter().any(|m| m.text == "Archive shop.war redeployed"));
    assert_eq!(
        agent.controller.mutations(),
        vec!["deploy:shop.war", "undeploy:shop.war", "deploy:shop.war"]
    );
}

#[tokio::test]
async fn content_manager_runs_on_every_update() {
    let fleet = format!(
        "{}{}",
        APP_FLEET,
        r#"
[[environments.application_servers.applications.content_managers]]
name = "catalog"
classname = "shell"

[[environments.application_servers.applications.content_managers.properties]]
name = "command"
value = "echo loaded >> @ROOT@/catalog.log"
"#
    );
    let agent = TestAgent::new(LOCAL_AGENT, &fleet);
    let request = ResourceRequest::environment(environments::PROD)
        .server(servers::AS1)
        .application("shop");

    for _ in 0..2 {
        let outcome = agent
            .engine
            .update(ResourceKind::Application, request.clone())
            .await
            .unwrap();
        assert!(outcome.updated);
    }

    assert_eq!(agent.read("catalog.log"), "loaded\nloaded\n");
    assert!(!agent
        .engine
        .check(ResourceKind::Application, request)
        .await
        .unwrap());
}

#[tokio::test]
async fn command_output_is_logged() {
    let fleet = r#"
[[agents]]
id = "agent-a"
hostname = "localhost"

[[environments]]
name = "prod"
agent = "agent-a"

[[environments.software]]
name = "tools"

[[environments.software.update_plan]]
type = "command"
name = "prepare"
command = "echo first && echo second"
"#;
    let agent = TestAgent::new(LOCAL_AGENT, fleet);

    let outcome = agent
        .engine
        .update(ResourceKind::Software, tools())
        .await
        .unwrap();

    let texts: Vec<_> = outcome.messages.iter().map(|m| m.text.as_str()).collect();
    let first = texts.iter().position(|t| *t == "first").unwrap();
    let second = texts.iter().position(|t| *t == "second").unwrap();
    let executed = texts.iter().position(|t| *t == "Command prepare executed").unwrap();
    assert!(first < second && second < executed);
    assert!(!agent
        .engine
        .check(ResourceKind::Command, tools().name("prepare"))
        .await
        .unwrap());
}
