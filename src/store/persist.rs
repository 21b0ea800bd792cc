//! Durable on-disk layout of both tiers.
//!
//! ```text
//! <data_dir>/draft.json              latest draft snapshot
//! <data_dir>/published/v0000000042.json
//! <data_dir>/published/CURRENT       "42": last committed version
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! crash never leaves a torn file. A published version file only counts once
//! `CURRENT` names it; a crash between the two writes leaves an orphan that
//! the next commit overwrites.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::store::snapshot::{PublishedSnapshot, Snapshot};

const DRAFT_FILE: &str = "draft.json";
const PUBLISHED_DIR: &str = "published";
const CURRENT_FILE: &str = "CURRENT";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} does not contain a version number: {content:?}", .path.display())]
    InvalidPointer { path: PathBuf, content: String },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File-backed persistence for a [`ConfigStore`](crate::store::ConfigStore).
#[derive(Debug)]
pub struct Persistence {
    root: PathBuf,
    published_dir: PathBuf,
    /// Highest draft revision already on disk.
    draft_revision: Mutex<u64>,
}

impl Persistence {
    /// Open (creating if needed) the data directory.
    pub fn open(root: &Path) -> Result<Self, PersistError> {
        let published_dir = root.join(PUBLISHED_DIR);
        fs::create_dir_all(&published_dir).map_err(io_err(&published_dir))?;
        tracing::info!(data_dir = %root.display(), "Configuration store persistence enabled");

        Ok(Self {
            root: root.to_path_buf(),
            published_dir,
            draft_revision: Mutex::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_draft(&self) -> Result<Option<Snapshot>, PersistError> {
        let path = self.root.join(DRAFT_FILE);
        let draft: Option<Snapshot> = read_json(&path)?;
        if let Some(snapshot) = &draft {
            *self.draft_revision.lock() = snapshot.revision;
        }
        Ok(draft)
    }

    /// Write the draft unless a newer revision is already on disk.
    ///
    /// Returns whether anything was written.
    pub fn write_draft(&self, snapshot: &Snapshot) -> Result<bool, PersistError> {
        let mut on_disk = self.draft_revision.lock();
        if snapshot.revision <= *on_disk {
            return Ok(false);
        }
        write_json(&self.root.join(DRAFT_FILE), snapshot)?;
        *on_disk = snapshot.revision;
        Ok(true)
    }

    /// Last committed version, 0 when nothing was ever published.
    pub fn current_version(&self) -> Result<u64, PersistError> {
        let path = self.published_dir.join(CURRENT_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(&path)(e)),
        };
        content
            .trim()
            .parse()
            .map_err(|_| PersistError::InvalidPointer { path, content })
    }

    pub fn load_version(&self, version: u64) -> Result<Option<PublishedSnapshot>, PersistError> {
        read_json(&self.version_path(version))
    }

    /// Load the snapshot `CURRENT` points to.
    pub fn load_current(&self) -> Result<Option<PublishedSnapshot>, PersistError> {
        match self.current_version()? {
            0 => Ok(None),
            version => {
                let path = self.version_path(version);
                self.load_version(version)?
                    .map(Some)
                    .ok_or_else(|| PersistError::Io {
                        path,
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "committed version file is missing",
                        ),
                    })
            }
        }
    }

    /// Persist a new published snapshot and then move `CURRENT` to it.
    pub fn write_published(&self, snapshot: &PublishedSnapshot) -> Result<(), PersistError> {
        write_json(&self.version_path(snapshot.version), snapshot)?;
        write_atomic(
            &self.published_dir.join(CURRENT_FILE),
            format!("{}\n", snapshot.version).as_bytes(),
        )
    }

    fn version_path(&self, version: u64) -> PathBuf {
        self.published_dir.join(format!("v{version:010}.json"))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path)(e)),
    };
    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|source| PersistError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
    file.write_all(bytes).map_err(io_err(&tmp))?;
    file.sync_all().map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;

    if let Some(dir) = path.parent() {
        if let Ok(dir) = File::open(dir) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
