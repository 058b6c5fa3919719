//! Harness configuration
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! yields the stock setup: `gitea/gitea:1.19.0`, author `John Doe`, RSA keys
//! of 3072 bits.

use std::fs;
use std::path::Path;

use forge_git::{Author, GitClient};
use serde::{Deserialize, Serialize};

use crate::preparation::PreparationConfig;
use crate::server::ServerConfig;
use crate::{Error, Result};

/// Path of a TOML file to load in [`HarnessConfig::from_env`].
pub const CONFIG_ENV: &str = "FORGE_FIXTURE_CONFIG";
/// Image override applied last in [`HarnessConfig::from_env`].
pub const IMAGE_ENV: &str = "FORGE_FIXTURE_IMAGE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub server: ServerConfig,
    pub git: GitConfig,
    pub preparation: PreparationConfig,
}

/// Defaults for local git operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub author_name: String,
    pub author_email: String,
    pub initial_branch: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        let client = GitClient::default();
        Self {
            author_name: client.author().name.clone(),
            author_email: client.author().email.clone(),
            initial_branch: client.initial_branch().to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    /// Defaults, overlaid by the file named in `FORGE_FIXTURE_CONFIG` and the
    /// image in `FORGE_FIXTURE_IMAGE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`HarnessConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(CONFIG_ENV).filter(|path| !path.is_empty()) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(image) = lookup(IMAGE_ENV) {
            config.server = config.server.with_image(image);
        }
        Ok(config)
    }

    /// A [`GitClient`] using the configured author and initial branch.
    pub fn git_client(&self) -> GitClient {
        GitClient::new()
            .with_author(Author::new(&self.git.author_name, &self.git.author_email))
            .with_initial_branch(&self.git.initial_branch)
    }
}
