//! Databases and their SQL scripts.
//!
//! A script is executed when its fetched, mapped content differs from the
//! copy recorded after its last successful execution, or when forced.

use std::path::PathBuf;

use super::{Engine, RunContext, Scope};
use crate::change_detector::{self, cache_entry, resolve_uri};
use crate::constants::cache::{APPLIED_SUFFIX, SQL_FOLDER};
use crate::errors::{UpdateError, UpdateResult};
use crate::model::{Database, SqlScript};
use crate::services::sql::{execute_script, SqlTarget};
use crate::types::ResourceKind;

fn script_paths(scope: &Scope<'_>, database: &Database, script: &SqlScript) -> (PathBuf, PathBuf) {
    let dir = cache_entry(&scope.cache, SQL_FOLDER, &database.name);
    (
        dir.join(&script.name),
        dir.join(format!("{}.{}", script.name, APPLIED_SUFFIX)),
    )
}

impl Engine {
    /// Connection settings of a database; a declared connection pool of the
    /// owning server lends URL and credentials not set on the database.
    pub(crate) fn sql_target(&self, scope: &Scope<'_>, database: &Database) -> UpdateResult<SqlTarget> {
        let mut target = SqlTarget {
            database: database.name.clone(),
            url: database.url.clone(),
            user: database.user.clone(),
            password: database.password.clone(),
            sql_command: database.sql_command.clone(),
        };

        if !database.connection_pool.is_empty() {
            let server = scope.server.ok_or_else(|| {
                UpdateError::Configuration(format!(
                    "database '{}' uses connection pool '{}' outside an application server",
                    database.name, database.connection_pool
                ))
            })?;
            let pool = server.jdbc_connection_pool(&database.connection_pool)?;
            if target.url.is_empty() {
                target.url = pool.url.clone();
            }
            if target.user.is_empty() {
                target.user = pool.user.clone();
                target.password = pool.password.clone();
            }
        }

        Ok(target)
    }

    pub(crate) async fn update_database(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        database: &Database,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::Database;
        if self.skip_inactive(ctx, kind, database) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(database, scope.agent) {
            let request = scope.request.clone().name(&database.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        for script in &database.sql_scripts {
            let result = self.update_sql_script(ctx, scope, database, script).await;
            self.apply_policy(ctx, ResourceKind::SqlScript, script, result)?;
        }
        Ok(())
    }

    pub(crate) async fn check_database(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        database: &Database,
    ) -> UpdateResult<bool> {
        if !database.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(database, scope.agent) {
            let request = scope.request.clone().name(&database.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::Database, request)
                .await;
        }

        for script in &database.sql_scripts {
            if !self.check_sql_script(ctx, scope, database, script).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) async fn update_sql_script(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        database: &Database,
        script: &SqlScript,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::SqlScript;
        if self.skip_inactive(ctx, kind, script) {
            return Ok(());
        }
        let owner = crate::model::effective_agent(database, scope.agent);
        if let Some(agent) = self.remote_owner(script, owner) {
            let request = scope
                .request
                .clone()
                .database(&database.name)
                .name(&script.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        let target = self.sql_target(scope, database)?;
        let result = self
            .execute_sql_script(ctx, scope, &target, database, script)
            .await;
        if result.is_err() {
            let (cache, _) = script_paths(scope, database, script);
            change_detector::remove(&cache).await;
        }
        result
    }

    async fn execute_sql_script(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        target: &SqlTarget,
        database: &Database,
        script: &SqlScript,
    ) -> UpdateResult<()> {
        let uri = resolve_uri(&script.uri, scope.uri);
        let (cache, applied) = script_paths(scope, database, script);
        self.detector.fetch(&uri, &cache).await?;
        change_detector::apply_mappings(&cache, &script.mappings).await?;

        if !script.force && change_detector::content_equals(&cache, &applied).await? {
            ctx.log.info(format!("SQL script {} already executed", script.name));
            return Ok(());
        }

        execute_script(target, &cache).await?;
        change_detector::copy(&cache, &applied).await?;
        ctx.log.mark_updated();
        ctx.log.info(format!(
            "SQL script {} executed on database {}",
            script.name, database.name
        ));
        Ok(())
    }

    pub(crate) async fn check_sql_script(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        database: &Database,
        script: &SqlScript,
    ) -> UpdateResult<bool> {
        if !script.active {
            return Ok(true);
        }
        let owner = crate::model::effective_agent(database, scope.agent);
        if let Some(agent) = self.remote_owner(script, owner) {
            let request = scope
                .request
                .clone()
                .database(&database.name)
                .name(&script.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::SqlScript, request)
                .await;
        }

        let uri = resolve_uri(&script.uri, scope.uri);
        let (_, applied) = script_paths(scope, database, script);
        self.detector
            .matches_installed(&uri, &script.mappings, &applied)
            .await
    }
}
