use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::AppConfig;
use crate::storage::models::Report;

/// Non-fatal failure while reclaiming an image. Logged and counted, never propagated.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("image reference '{0}' does not resolve to a managed location")]
    Unresolvable(String),

    #[error("asset '{}' does not exist", .0.display())]
    Missing(PathBuf),

    #[error("failed to remove '{}': {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Locates and deletes the files behind image references.
pub trait AssetStore: Send + Sync {
    fn resolve(&self, reference: &str) -> Option<PathBuf>;
    fn exists(&self, location: &Path) -> bool;
    fn remove(&self, location: &Path) -> io::Result<()>;
}

/// Images stored on local disk under `root` and published under `public_prefix`.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.upload_dir, &config.public_prefix)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path inside `root`, rejecting anything that could escape it.
    fn contained(&self, relative: &str) -> Option<PathBuf> {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }
        let path = Path::new(relative);
        if path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        {
            Some(self.root.join(path))
        } else {
            None
        }
    }

    fn strip_prefix<'a>(&self, path: &'a str) -> &'a str {
        if self.public_prefix.is_empty() {
            return path;
        }
        match path.strip_prefix(self.public_prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }
}

impl AssetStore for LocalAssetStore {
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        // Absolute filesystem path already inside the upload root.
        let direct = Path::new(reference);
        if direct.is_absolute() && direct.starts_with(&self.root) {
            let rest = direct.strip_prefix(&self.root).ok()?;
            return self.contained(&rest.to_string_lossy());
        }

        if let Ok(url) = Url::parse(reference) {
            return match url.scheme() {
                "http" | "https" => {
                    let decoded = urlencoding::decode(url.path()).ok()?;
                    self.contained(self.strip_prefix(&decoded))
                }
                "file" => {
                    let path = url.to_file_path().ok()?;
                    let rest = path.strip_prefix(&self.root).ok()?;
                    self.contained(&rest.to_string_lossy())
                }
                _ => None,
            };
        }

        self.contained(self.strip_prefix(reference))
    }

    fn exists(&self, location: &Path) -> bool {
        location.is_file()
    }

    fn remove(&self, location: &Path) -> io::Result<()> {
        fs::remove_file(location)
    }
}

/// What happened to the images of one discarded report.
#[derive(Debug, Default)]
pub struct ReclaimOutcome {
    pub removed: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failures: Vec<AssetError>,
}

impl ReclaimOutcome {
    pub fn merge(&mut self, other: ReclaimOutcome) {
        self.removed.extend(other.removed);
        self.missing.extend(other.missing);
        self.failures.extend(other.failures);
    }
}

/// Delete both images owned by `report`. Call only after its row is gone.
pub fn reclaim(report: &Report, assets: &dyn AssetStore) -> ReclaimOutcome {
    let mut outcome = ReclaimOutcome::default();
    for reference in report.image_refs() {
        reclaim_reference(report.id, reference, assets, &mut outcome);
    }
    outcome
}

/// Delete a single image reference, recording the result in `outcome`.
pub fn reclaim_reference(
    report_id: i64,
    reference: &str,
    assets: &dyn AssetStore,
    outcome: &mut ReclaimOutcome,
) {
    let location = match assets.resolve(reference) {
        Some(location) => location,
        None => {
            warn!("Report {}: cannot resolve image '{}'", report_id, reference);
            outcome
                .failures
                .push(AssetError::Unresolvable(reference.to_string()));
            return;
        }
    };

    if !assets.exists(&location) {
        warn!(
            "Report {}: image '{}' already missing, skipping",
            report_id,
            location.display()
        );
        outcome.missing.push(location);
        return;
    }

    match assets.remove(&location) {
        Ok(()) => {
            debug!("Report {}: removed image '{}'", report_id, location.display());
            outcome.removed.push(location);
        }
        Err(source) => {
            error!(
                "Report {}: failed to remove image '{}': {}",
                report_id,
                location.display(),
                source
            );
            outcome.failures.push(AssetError::Remove {
                path: location,
                source,
            });
        }
    }
}
