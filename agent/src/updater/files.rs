//! File-like resources: application archives, configuration files and
//! software locations.
//!
//! Configuration files and locations compare the fetched (and mapped) source
//! with the installed copy. Archives compare the source with the pristine
//! copy kept in the cache since the last deployment, because target runtimes
//! may rewrite the deployed artifact.

use std::path::{Path, PathBuf};

use super::{Engine, RunContext, Scope};
use crate::change_detector::{self, cache_entry, resolve_uri};
use crate::constants::cache::{ARCHIVES_FOLDER, CONFIG_FOLDER, LOCATIONS_FOLDER};
use crate::controller::{ArchiveSpec, Controller, ResourceSpec};
use crate::errors::UpdateResult;
use crate::model::{Archive, ConfigurationFile, Location, Node};
use crate::types::ResourceKind;

const DEPLOYED_FOLDER: &str = "deployed";

impl Engine {
    fn archive_spec(scope: &Scope<'_>, archive: &Archive, install: PathBuf) -> ArchiveSpec {
        ArchiveSpec {
            name: archive.name.clone(),
            application: scope.request.application.clone().unwrap_or_default(),
            path: install,
            context_root: archive.context_root.clone(),
            virtual_host: archive.virtual_host.clone(),
        }
    }

    /// Installation path of an archive; archives without a path are deployed
    /// from a copy inside the application cache.
    fn archive_install_path(scope: &Scope<'_>, archive: &Archive) -> PathBuf {
        if archive.path.is_empty() {
            scope.cache.join(DEPLOYED_FOLDER).join(&archive.name)
        } else {
            PathBuf::from(&archive.path)
        }
    }

    pub(crate) async fn update_archive(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        archive: &Archive,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::Archive;
        if self.skip_inactive(ctx, kind, archive) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(archive, scope.agent) {
            let request = scope.request.clone().name(&archive.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        let controller = self.controller(scope)?;
        let cache = cache_entry(&scope.cache, ARCHIVES_FOLDER, &archive.name);

        let result = self
            .deploy_archive(ctx, scope, controller.as_ref(), archive, &cache)
            .await;
        if result.is_err() {
            change_detector::remove(&cache).await;
        }
        result
    }

    async fn deploy_archive(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        controller: &dyn Controller,
        archive: &Archive,
        cache: &Path,
    ) -> UpdateResult<()> {
        let uri = resolve_uri(&archive.uri, scope.uri);
        let install = Self::archive_install_path(scope, archive);
        let spec = ResourceSpec::Archive(Self::archive_spec(scope, archive, install.clone()));

        let deployed = controller.is_deployed(&spec).await?;
        let unchanged = self.detector.matches_installed(&uri, &[], cache).await?;

        if deployed && unchanged && !archive.force {
            ctx.log.info(format!("Archive {} already up to date", archive.name));
            return Ok(());
        }

        self.detector.fetch(&uri, cache).await?;
        change_detector::replace(cache, &install).await?;

        if deployed {
            controller.undeploy(&spec).await?;
        }
        controller.deploy(&spec).await?;

        // The runtime may have rewritten the artifact during deployment
        self.detector.fetch(&uri, cache).await?;

        ctx.log.mark_updated();
        ctx.log.info(format!(
            "Archive {} {}",
            archive.name,
            if deployed { "redeployed" } else { "deployed" }
        ));
        Ok(())
    }

    pub(crate) async fn check_archive(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        archive: &Archive,
    ) -> UpdateResult<bool> {
        if !archive.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(archive, scope.agent) {
            let request = scope.request.clone().name(&archive.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::Archive, request)
                .await;
        }

        let controller = self.controller(scope)?;
        let install = Self::archive_install_path(scope, archive);
        let spec = ResourceSpec::Archive(Self::archive_spec(scope, archive, install));
        if !controller.is_deployed(&spec).await? {
            return Ok(false);
        }

        let uri = resolve_uri(&archive.uri, scope.uri);
        let cache = cache_entry(&scope.cache, ARCHIVES_FOLDER, &archive.name);
        self.detector.matches_installed(&uri, &[], &cache).await
    }

    pub(crate) async fn update_configuration_file(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        file: &ConfigurationFile,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::ConfigurationFile;
        if self.skip_inactive(ctx, kind, file) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(file, scope.agent) {
            let request = scope.request.clone().name(&file.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        let uri = resolve_uri(&file.uri, scope.uri);
        let cache = cache_entry(&scope.cache, CONFIG_FOLDER, &file.name);

        let result = self
            .install_configuration_file(ctx, file, &uri, &cache)
            .await;
        if result.is_err() {
            change_detector::remove(&cache).await;
        }
        result
    }

    async fn install_configuration_file(
        &self,
        ctx: &RunContext,
        file: &ConfigurationFile,
        uri: &str,
        cache: &Path,
    ) -> UpdateResult<()> {
        let install = Path::new(&file.path);
        self.detector.fetch(uri, cache).await?;
        change_detector::apply_mappings(cache, &file.mappings).await?;

        if !file.force && change_detector::content_equals(cache, install).await? {
            ctx.log.info(format!("Configuration file {} already up to date", file.name));
            return Ok(());
        }

        change_detector::copy(cache, install).await?;
        ctx.log.mark_updated();
        ctx.log.info(format!(
            "Configuration file {} installed to {}",
            file.name, file.path
        ));
        Ok(())
    }

    pub(crate) async fn check_configuration_file(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        file: &ConfigurationFile,
    ) -> UpdateResult<bool> {
        if !file.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(file, scope.agent) {
            let request = scope.request.clone().name(&file.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::ConfigurationFile, request)
                .await;
        }

        let uri = resolve_uri(&file.uri, scope.uri);
        self.detector
            .matches_installed(&uri, &file.mappings, Path::new(&file.path))
            .await
    }

    pub(crate) async fn update_location(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        location: &Location,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::Location;
        if self.skip_inactive(ctx, kind, location) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(location, scope.agent) {
            let request = scope.request.clone().name(location.name());
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        let uri = resolve_uri(&location.uri, scope.uri);
        let cache = cache_entry(&scope.cache, LOCATIONS_FOLDER, &location.name);

        let result = self.install_location(ctx, location, &uri, &cache).await;
        if result.is_err() {
            change_detector::remove(&cache).await;
        }
        result
    }

    /// The previous copy is only replaced once the new one is complete.
    async fn install_location(
        &self,
        ctx: &RunContext,
        location: &Location,
        uri: &str,
        cache: &Path,
    ) -> UpdateResult<()> {
        let install = Path::new(&location.path);
        self.detector.fetch(uri, cache).await?;

        if !location.force && change_detector::content_equals(cache, install).await? {
            ctx.log.info(format!("Location {} already up to date", location.name));
            return Ok(());
        }

        change_detector::replace(cache, install).await?;
        ctx.log.mark_updated();
        ctx.log.info(format!(
            "Location {} copied to {}",
            location.name, location.path
        ));
        Ok(())
    }

    pub(crate) async fn check_location(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        location: &Location,
    ) -> UpdateResult<bool> {
        if !location.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(location, scope.agent) {
            let request = scope.request.clone().name(&location.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::Location, request)
                .await;
        }

        let uri = resolve_uri(&location.uri, scope.uri);
        self.detector
            .matches_installed(&uri, &[], Path::new(&location.path))
            .await
    }
}
