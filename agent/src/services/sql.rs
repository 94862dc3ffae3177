//! SQL script execution, either through an external client command or
//! directly through the sqlx `Any` driver.

use reqwest::Url;
use sqlx::{AnyConnection, Connection};
use std::path::Path;
use std::sync::Once;
use tracing::{debug, info};

use super::commands::execute_shell_command;
use crate::errors::{UpdateError, UpdateResult};

const SCRIPT_PLACEHOLDER: &str = "${script}";

static INSTALL_DRIVERS: Once = Once::new();

/// Where and how a database's scripts are executed.
#[derive(Debug, Clone, Default)]
pub struct SqlTarget {
    pub database: String,
    pub url: String,
    pub user: String,
    pub password: String,
    pub sql_command: String,
}

/// Builds the client command line for a script.
pub fn client_command(sql_command: &str, script: &Path) -> String {
    let script = script.display().to_string();
    if sql_command.contains(SCRIPT_PLACEHOLDER) {
        sql_command.replace(SCRIPT_PLACEHOLDER, &script)
    } else {
        format!("{} {}", sql_command, script)
    }
}

/// Turns a JDBC style URL into an sqlx one and adds credentials when the
/// URL carries none. Credentials are percent-encoded.
pub fn connection_url(url: &str, user: &str, password: &str) -> UpdateResult<String> {
    let url = url.strip_prefix("jdbc:").unwrap_or(url);
    if user.is_empty() {
        return Ok(url.to_string());
    }

    let invalid = |reason: &str| {
        UpdateError::Configuration(format!("database URL '{}' {}", url, reason))
    };
    let mut parsed = Url::parse(url).map_err(|e| invalid(&format!("is invalid: {}", e)))?;
    if !parsed.username().is_empty() {
        return Ok(url.to_string());
    }

    parsed
        .set_username(user)
        .map_err(|()| invalid("cannot carry credentials"))?;
    if !password.is_empty() {
        parsed
            .set_password(Some(password))
            .map_err(|()| invalid("cannot carry credentials"))?;
    }
    Ok(parsed.to_string())
}

pub async fn execute_script(target: &SqlTarget, script: &Path) -> UpdateResult<()> {
    if !target.sql_command.is_empty() {
        let command = client_command(&target.sql_command, script);
        let output = execute_shell_command(&command)
            .await
            .map_err(|e| UpdateError::controller(format!("database {}", target.database), e))?;
        debug!("SQL client output: {}", output.trim());
        return Ok(());
    }

    if target.url.is_empty() {
        return Err(UpdateError::Configuration(format!(
            "database '{}' declares neither a URL, a connection pool nor an SQL command",
            target.database
        )));
    }

    let sql = tokio::fs::read_to_string(script)
        .await
        .map_err(|e| UpdateError::cache_io(script, e))?;

    INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

    let url = connection_url(&target.url, &target.user, &target.password)?;
    let mut connection = AnyConnection::connect(&url).await?;
    sqlx::Executor::execute(&mut connection, sqlx::raw_sql(&sql)).await?;
    connection.close().await?;

    info!("Executed {} on database {}", script.display(), target.database);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("psql -f ${script} app", "psql -f /c/s.sql app" ; "placeholder")]
    #[test_case("sqlplus app/app@db", "sqlplus app/app@db /c/s.sql" ; "appended")]
    fn builds_client_command(command: &str, expected: &str) {
        assert_eq!(client_command(command, Path::new("/c/s.sql")), expected);
    }

    #[test_case("jdbc:postgresql://db:5432/app", "app", "secret", "postgresql://app:secret@db:5432/app" ; "jdbc with credentials")]
    #[test_case("mysql://root@db/app", "app", "secret", "mysql://root@db/app" ; "credentials already present")]
    #[test_case("sqlite::memory:", "", "", "sqlite::memory:" ; "no user")]
    #[test_case("jdbc:postgresql://db/app", "app", "p/w#x?y", "postgresql://app:p%2Fw%23x%3Fy@db/app" ; "reserved characters in password")]
    #[test_case("mysql://db:3306/app", "ops", "", "mysql://ops@db:3306/app" ; "user without password")]
    fn builds_connection_url(url: &str, user: &str, password: &str, expected: &str) {
        assert_eq!(connection_url(url, user, password).unwrap(), expected);
    }

    #[test]
    fn unparseable_url_with_credentials_is_configuration_error() {
        let err = connection_url("not a url", "app", "secret").unwrap_err();
        assert!(matches!(err, UpdateError::Configuration(_)));
    }

    #[tokio::test]
    async fn runs_script_through_external_command() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("schema.sql");
        let marker = dir.path().join("ran");
        std::fs::write(&script, "create table t (id int);").unwrap();

        let target = SqlTarget {
            database: "app".into(),
            sql_command: format!("cp ${{script}} {}", marker.display()),
            ..Default::default()
        };
        execute_script(&target, &script).await.unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn runs_script_against_sqlite() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("app.db");
        let script = dir.path().join("schema.sql");
        std::fs::write(
            &script,
            "create table item (id integer primary key); insert into item (id) values (1);",
        )
        .unwrap();

        let target = SqlTarget {
            database: "app".into(),
            url: format!("sqlite://{}?mode=rwc", db.display()),
            ..Default::default()
        };
        execute_script(&target, &script).await.unwrap();
        assert!(db.exists());
    }

    #[tokio::test]
    async fn database_without_target_is_configuration_error() {
        let err = execute_script(&SqlTarget::default(), Path::new("/tmp/x.sql"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Configuration(_)));
    }
}
