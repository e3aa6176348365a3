use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use thali_core::store::DirPlanStore;

/// Plans saved from a checkout of the web app live here, relative to the
/// working directory. They are listed and loadable but never written.
const LOCAL_PLANS_DIR: &str = "saved_meal_plans";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub plans_dir: PathBuf,
}

impl Config {
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => ProjectDirs::from("", "", "thali")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("thali.db"),
            plans_dir: data_dir.join(LOCAL_PLANS_DIR),
            data_dir,
        })
    }

    pub fn plan_store(&self) -> DirPlanStore {
        DirPlanStore::new(&self.plans_dir).with_fallback(LOCAL_PLANS_DIR)
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true on first run.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        tracing::info!(path = %path.display(), "generated API key");
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }
}
