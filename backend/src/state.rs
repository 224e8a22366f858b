//! Shared application state handed to every handler as `web::Data`.

use crate::config::Config;
use crate::db::Database;
use crate::locks::KeyedLocks;
use crate::storage::{FsUploadStore, UploadStore};
use crate::validation::sensitive::Screen;
use crate::validation::Validator;
use log::info;
use std::io;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub validator: Validator,
    pub uploads: Arc<dyn UploadStore>,
    /// Serializes uploads per (project, center).
    pub center_locks: KeyedLocks<(i64, String)>,
    /// Serializes schema saves per project.
    pub schema_locks: KeyedLocks<i64>,
}

impl AppState {
    pub fn new(config: Config, db: Database, uploads: Arc<dyn UploadStore>) -> io::Result<Self> {
        let screen = Screen::standard().map_err(io::Error::other)?;
        info!(
            "sensitive-data screen: {} (policy {:?})",
            screen.detector_names().join(", "),
            config.sensitive_policy
        );
        let validator =
            Validator::new(screen, config.sensitive_policy, config.sensitive_sample_rows);
        Ok(Self {
            config,
            db,
            validator,
            uploads,
            center_locks: KeyedLocks::new(),
            schema_locks: KeyedLocks::new(),
        })
    }

    /// Opens the database named in `config` and creates any missing tables.
    pub fn from_config(config: Config) -> io::Result<Self> {
        let db = Database::new(&config.db_path, config.busy_timeout_ms);
        db.init().map_err(io::Error::other)?;
        let uploads: Arc<dyn UploadStore> = Arc::new(FsUploadStore::new(&config.upload_dir));
        Self::new(config, db, uploads)
    }
}
