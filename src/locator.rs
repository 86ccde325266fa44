//! Finds the file behind a catalog record.
//!
//! Stored paths come in several historical shapes (absolute, relative to the
//! process, relative to the uploads folder, relative to the install dir), so
//! every candidate is tried against a fixed list of bases. Nothing is cached:
//! a file that disappears must stop being served immediately.

use mime_guess::from_path;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Content type used when the extension says nothing useful
pub const FALLBACK_CONTENT_TYPE: &str = "audio/mpeg";

/// One way of turning a stored path into a filesystem path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeBase {
    /// The stored path itself, only when it is absolute
    AsGiven,
    /// Relative to the process working directory
    WorkingDir(PathBuf),
    /// Relative to the configured uploads root
    UploadsRoot(PathBuf),
    /// Relative to the directory the binary was installed in
    InstallDir(PathBuf),
}

impl ProbeBase {
    fn apply(&self, candidate: &Path) -> Option<PathBuf> {
        match self {
            ProbeBase::AsGiven => candidate.is_absolute().then(|| candidate.to_path_buf()),
            ProbeBase::WorkingDir(base)
            | ProbeBase::UploadsRoot(base)
            | ProbeBase::InstallDir(base) => Some(base.join(candidate)),
        }
    }
}

/// Ordered, cache-free resolution of candidate paths
#[derive(Debug, Clone)]
pub struct AssetLocator {
    bases: Vec<ProbeBase>,
}

impl AssetLocator {
    /// Standard precedence: as given, working dir, uploads root, install dir.
    ///
    /// A relative `uploads_dir` is taken relative to the working directory.
    pub fn new(uploads_dir: &Path) -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        let uploads = if uploads_dir.is_absolute() {
            uploads_dir.to_path_buf()
        } else {
            cwd.join(uploads_dir)
        };

        let mut bases = vec![
            ProbeBase::AsGiven,
            ProbeBase::WorkingDir(cwd),
            ProbeBase::UploadsRoot(uploads),
        ];

        match std::env::current_exe() {
            Ok(exe) => {
                if let Some(dir) = exe.parent() {
                    bases.push(ProbeBase::InstallDir(dir.to_path_buf()));
                }
            }
            Err(error) => debug!(%error, "Install directory unknown, skipping it as a probe base"),
        }

        Ok(Self { bases })
    }

    pub fn with_bases(bases: Vec<ProbeBase>) -> Self {
        Self { bases }
    }

    pub fn bases(&self) -> &[ProbeBase] {
        &self.bases
    }

    /// First candidate, in order, that exists under any base
    pub async fn resolve<S: AsRef<str>>(&self, candidates: &[S]) -> Option<PathBuf> {
        self.resolve_with_trace(candidates).await.0
    }

    /// Like [`resolve`](Self::resolve) but also returns every path probed
    pub async fn resolve_with_trace<S: AsRef<str>>(
        &self,
        candidates: &[S],
    ) -> (Option<PathBuf>, Vec<PathBuf>) {
        let mut tried = Vec::new();

        for candidate in candidates.iter().map(AsRef::as_ref) {
            if candidate.is_empty() {
                continue;
            }
            let candidate = Path::new(candidate);

            for path in self.bases.iter().filter_map(|base| base.apply(candidate)) {
                let found = is_readable_file(&path).await;
                trace!(?path, found, "Probed asset path");
                tried.push(path);
                if found {
                    let hit = tried.last().cloned();
                    return (hit, tried);
                }
            }
        }

        (None, tried)
    }
}

/// A hit must be a regular file we can open; directories and unreadable
/// files fall through to the next base or candidate.
async fn is_readable_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => tokio::fs::File::open(path).await.is_ok(),
        _ => false,
    }
}

/// A located file, probed at request time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub size: u64,
    pub content_type: String,
}

impl ResolvedAsset {
    /// Stat `path` now. `Ok(None)` when it is gone, unreadable, or not a
    /// regular file; `Err` only for unexpected I/O failures.
    pub async fn probe(path: PathBuf) -> std::io::Result<Option<Self>> {
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(error) if matches!(error.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!(?path, %error, "Asset vanished before it could be served");
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        if !metadata.is_file() {
            debug!(?path, "Asset path is not a regular file");
            return Ok(None);
        }

        Ok(Some(Self {
            content_type: content_type_for(&path),
            size: metadata.len(),
            path,
        }))
    }
}

pub fn content_type_for(path: &Path) -> String {
    from_path(path)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}
