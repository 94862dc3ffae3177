//! Change detection for file-like resources
//!
//! Resolves resource URIs (absolute, or relative to the parent artifact with
//! the `!/` separator), fetches sources into the agent cache and compares the
//! fetched content with the installed copy. Supported sources:
//!
//! - local paths and `file:` URIs (files or directories)
//! - `http://` / `https://`
//! - `jar:` / `zip:` archives and directories addressed with `<outer>!/<entry>`

use reqwest::Client;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::{debug, warn};

use crate::constants::cache;
use crate::errors::{UpdateError, UpdateResult};
use crate::model::Mapping;

pub const ENTRY_SEPARATOR: &str = "!/";

/// True when the URI starts with a scheme such as `file:`, `http:` or `jar:`.
pub fn has_protocol(uri: &str) -> bool {
    match uri.find(':') {
        Some(idx) if idx >= 2 => {
            let scheme = &uri[..idx];
            scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Resolves a resource URI against its parent artifact URI.
pub fn resolve_uri(uri: &str, parent_uri: &str) -> String {
    if has_protocol(uri) || parent_uri.is_empty() {
        uri.to_string()
    } else {
        format!(
            "{}{}{}",
            parent_uri.trim_end_matches('/'),
            ENTRY_SEPARATOR,
            uri.trim_start_matches('/')
        )
    }
}

pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Applies ordered search/replace pairs.
pub fn apply_mappings_to(content: &str, mappings: &[Mapping]) -> String {
    mappings
        .iter()
        .fold(content.to_string(), |acc, m| acc.replace(&m.key, &m.value))
}

fn local_path(uri: &str) -> PathBuf {
    let path = uri
        .strip_prefix("file://")
        .or_else(|| uri.strip_prefix("file:"))
        .unwrap_or(uri);
    PathBuf::from(path)
}

/// Where cached copies of an environment's artifacts live on this agent.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn environment(&self, environment: &str) -> PathBuf {
        self.root.join(cache::ENVIRONMENTS_DIR).join(environment)
    }

    pub fn application(&self, environment: &str, application: &str) -> PathBuf {
        self.environment(environment)
            .join(cache::APPLICATIONS_DIR)
            .join(application)
    }

    pub fn software(&self, environment: &str, software: &str) -> PathBuf {
        self.environment(environment)
            .join(cache::SOFTWARE_DIR)
            .join(software)
    }
}

/// `<parent-cache>/<folder>/<name>`
pub fn cache_entry(parent_cache: &Path, folder: &str, name: &str) -> PathBuf {
    parent_cache.join(folder).join(name)
}

enum Source {
    File(Vec<u8>),
    Directory(PathBuf),
}

type SourceFuture<'a> = Pin<Box<dyn Future<Output = UpdateResult<Source>> + Send + 'a>>;

#[derive(Clone)]
pub struct ChangeDetector {
    client: Client,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Nested `!/` entries recurse, hence the boxed future.
    fn read_source<'a>(&'a self, uri: &'a str) -> SourceFuture<'a> {
        Box::pin(async move {
            if let Some((outer, entry)) = uri.split_once(ENTRY_SEPARATOR) {
                let outer = outer
                    .strip_prefix("jar:")
                    .or_else(|| outer.strip_prefix("zip:"))
                    .unwrap_or(outer);

                if !outer.starts_with("http://") && !outer.starts_with("https://") {
                    let dir = local_path(outer);
                    if fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
                        let nested = dir.join(entry).display().to_string();
                        return self.read_source(&nested).await;
                    }
                }

                let bytes = match self.read_source(outer).await? {
                    Source::File(bytes) => bytes,
                    Source::Directory(path) => {
                        return Err(UpdateError::cache_io(path, "expected an archive"));
                    }
                };
                return extract_entry(uri, bytes, entry).map(Source::File);
            }

            if uri.starts_with("http://") || uri.starts_with("https://") {
                let response = self
                    .client
                    .get(uri)
                    .send()
                    .await
                    .map_err(|e| UpdateError::cache_io(uri, e))?;
                if !response.status().is_success() {
                    return Err(UpdateError::cache_io(
                        uri,
                        format!("status {}", response.status()),
                    ));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| UpdateError::cache_io(uri, e))?;
                return Ok(Source::File(bytes.to_vec()));
            }

            let path = local_path(uri);
            let metadata = fs::metadata(&path)
                .await
                .map_err(|e| UpdateError::cache_io(&path, e))?;
            if metadata.is_dir() {
                Ok(Source::Directory(path))
            } else {
                let bytes = fs::read(&path)
                    .await
                    .map_err(|e| UpdateError::cache_io(&path, e))?;
                Ok(Source::File(bytes))
            }
        })
    }

    /// Copies the source into `cache_path`, replacing any previous copy.
    /// A partially written entry is removed before the error is returned.
    pub async fn fetch(&self, uri: &str, cache_path: &Path) -> UpdateResult<()> {
        debug!("Fetching {} into {}", uri, cache_path.display());
        remove(cache_path).await;

        let result = self.write_source(uri, cache_path).await;
        if result.is_err() {
            remove(cache_path).await;
        }
        result
    }

    async fn write_source(&self, uri: &str, cache_path: &Path) -> UpdateResult<()> {
        match self.read_source(uri).await? {
            Source::File(bytes) => write_file(cache_path, &bytes).await,
            Source::Directory(dir) => copy(&dir, cache_path).await,
        }
    }

    /// Read-only comparison of a source (after mappings) with an installed copy.
    pub async fn matches_installed(
        &self,
        uri: &str,
        mappings: &[Mapping],
        installed: &Path,
    ) -> UpdateResult<bool> {
        match self.read_source(uri).await? {
            Source::File(bytes) => {
                let bytes = if mappings.is_empty() {
                    bytes
                } else {
                    let text = String::from_utf8(bytes)
                        .map_err(|e| UpdateError::cache_io(uri, e))?;
                    apply_mappings_to(&text, mappings).into_bytes()
                };
                match fs::read(installed).await {
                    Ok(current) => Ok(digest(&current) == digest(&bytes)),
                    Err(_) => Ok(false),
                }
            }
            Source::Directory(dir) => content_equals(&dir, installed).await,
        }
    }
}

fn extract_entry(uri: &str, bytes: Vec<u8>, entry: &str) -> UpdateResult<Vec<u8>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| UpdateError::cache_io(uri, e))?;
    let mut file = archive
        .by_name(entry)
        .map_err(|e| UpdateError::cache_io(uri, e))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|e| UpdateError::cache_io(uri, e))?;
    Ok(content)
}

async fn write_file(path: &Path, bytes: &[u8]) -> UpdateResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| UpdateError::cache_io(parent, e))?;
    }
    fs::write(path, bytes)
        .await
        .map_err(|e| UpdateError::cache_io(path, e))
}

/// Files below `root`, as paths relative to it, sorted.
async fn list_files(root: &Path) -> UpdateResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| UpdateError::cache_io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| UpdateError::cache_io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| UpdateError::cache_io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Byte equality (SHA-256) of two files or two directory trees.
/// A missing side is never equal.
pub async fn content_equals(left: &Path, right: &Path) -> UpdateResult<bool> {
    let (Ok(left_meta), Ok(right_meta)) = (fs::metadata(left).await, fs::metadata(right).await)
    else {
        return Ok(false);
    };

    match (left_meta.is_dir(), right_meta.is_dir()) {
        (false, false) => {
            let a = fs::read(left).await.map_err(|e| UpdateError::cache_io(left, e))?;
            let b = fs::read(right).await.map_err(|e| UpdateError::cache_io(right, e))?;
            Ok(digest(&a) == digest(&b))
        }
        (true, true) => {
            let left_files = list_files(left).await?;
            if left_files != list_files(right).await? {
                return Ok(false);
            }
            for file in left_files {
                let a = fs::read(left.join(&file))
                    .await
                    .map_err(|e| UpdateError::cache_io(left.join(&file), e))?;
                let b = fs::read(right.join(&file))
                    .await
                    .map_err(|e| UpdateError::cache_io(right.join(&file), e))?;
                if digest(&a) != digest(&b) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Copies a file or a directory tree, creating parent directories.
pub async fn copy(from: &Path, to: &Path) -> UpdateResult<()> {
    let metadata = fs::metadata(from)
        .await
        .map_err(|e| UpdateError::cache_io(from, e))?;

    if !metadata.is_dir() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::cache_io(parent, e))?;
        }
        fs::copy(from, to)
            .await
            .map_err(|e| UpdateError::cache_io(to, e))?;
        return Ok(());
    }

    fs::create_dir_all(to)
        .await
        .map_err(|e| UpdateError::cache_io(to, e))?;
    for file in list_files(from).await? {
        let target = to.join(&file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::cache_io(parent, e))?;
        }
        fs::copy(from.join(&file), &target)
            .await
            .map_err(|e| UpdateError::cache_io(&target, e))?;
    }
    Ok(())
}

/// Installs a copy of `from` at `to`. The copy is written next to the
/// target and renamed into place, so a failed copy leaves `to` untouched.
pub async fn replace(from: &Path, to: &Path) -> UpdateResult<()> {
    let name = to
        .file_name()
        .ok_or_else(|| UpdateError::cache_io(to, "installation path has no file name"))?;
    let staging = to.with_file_name(format!(".{}.partial", name.to_string_lossy()));

    remove(&staging).await;
    if let Err(e) = copy(from, &staging).await {
        remove(&staging).await;
        return Err(e);
    }

    remove(to).await;
    fs::rename(&staging, to)
        .await
        .map_err(|e| UpdateError::cache_io(to, e))
}

/// Rewrites a cached text file with ordered search/replace pairs.
pub async fn apply_mappings(path: &Path, mappings: &[Mapping]) -> UpdateResult<()> {
    if mappings.is_empty() {
        return Ok(());
    }
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| UpdateError::cache_io(path, e))?;
    fs::write(path, apply_mappings_to(&content, mappings))
        .await
        .map_err(|e| UpdateError::cache_io(path, e))
}

/// Best-effort removal of a cache entry (file or directory).
pub async fn remove(path: &Path) {
    let result = match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!("Cannot remove cache entry {}: {}", path.display(), e);
    }
}
