use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl Config {
    /// Resolve the data directory (`NUTRIFIT_DATA_DIR` wins over the per-user
    /// default) and read Gemini settings from the environment.
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os("NUTRIFIT_DATA_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => ProjectDirs::from("", "", "nutrifit")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        let mut config = Self::in_dir(&data_dir)?;
        config.gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(model) = std::env::var("GEMINI_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
        {
            config.gemini_model = model;
        }
        Ok(config)
    }

    fn in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("nutrifit.db"),
            data_dir: data_dir.to_path_buf(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
        })
    }

    /// Load the token signing secret from disk, or generate a new one.
    pub fn load_or_create_jwt_secret(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("jwt_secret");

        if path.exists() {
            let secret = std::fs::read_to_string(&path).context("Failed to read JWT secret file")?;
            let secret = secret.trim().to_string();
            if !secret.is_empty() {
                return Ok(secret);
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let secret = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &secret).context("Failed to write JWT secret file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set JWT secret file permissions")?;
        }
        tracing::info!(path = %path.display(), "generated new JWT signing secret");
        Ok(secret)
    }
}
