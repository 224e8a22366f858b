//! Raw upload persistence.
//!
//! The ledger never embeds file bytes; it records the opaque locator an
//! [`UploadStore`] hands back.

use crate::error::Result;
use log::error;
use md5::Context;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Where a `put` left the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub locator: String,
    /// False when identical content was already stored.
    pub created: bool,
}

pub trait UploadStore: Send + Sync {
    /// Persists `bytes` and returns the locator to record on the submission.
    fn put(&self, bytes: &[u8]) -> Result<StoredUpload>;

    /// Deletes what `put` stored under `locator`. Missing files are not an
    /// error.
    fn remove(&self, locator: &str) -> Result<()>;
}

/// Stores each upload once under `<dir>/<md5>.csv`.
#[derive(Debug, Clone)]
pub struct FsUploadStore {
    dir: PathBuf,
}

impl FsUploadStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Context::new();
    hasher.consume(bytes);
    format!("{:x}", hasher.finalize())
}

impl UploadStore for FsUploadStore {
    fn put(&self, bytes: &[u8]) -> Result<StoredUpload> {
        let name = format!("{}.csv", content_digest(bytes));
        let target = self.dir.join(&name);
        if target.exists() {
            return Ok(StoredUpload {
                locator: name,
                created: false,
            });
        }

        let persist = || -> std::io::Result<()> {
            fs::create_dir_all(&self.dir)?;
            // A half-written file never appears under its final name.
            let partial = self
                .dir
                .join(format!(".{}.{}", name, uuid::Uuid::new_v4().simple()));
            let mut writer = BufWriter::new(File::create(&partial)?);
            writer.write_all(bytes)?;
            writer.flush()?;
            drop(writer);
            fs::rename(&partial, &target)
        };
        persist().map_err(|e| {
            error!("storing upload {} failed: {}", name, e);
            e
        })?;
        Ok(StoredUpload {
            locator: name,
            created: true,
        })
    }

    fn remove(&self, locator: &str) -> Result<()> {
        // Locators are bare file names; anything else was not ours.
        if locator.contains(['/', '\\']) || locator.starts_with('.') {
            return Ok(());
        }
        match fs::remove_file(self.dir.join(locator)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
