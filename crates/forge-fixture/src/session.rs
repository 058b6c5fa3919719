//! One authenticated actor against the hosting API

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::api::{CreateFileOptions, CreateKeyOption, CreateRepoOption, CreateTagOption, ForgeApi};
use crate::{Context, Error, Result};

/// Default bound on list/delete rounds in [`Session::remove_all_public_keys`].
pub const DEFAULT_MAX_KEY_REMOVAL_ROUNDS: usize = 16;

/// Bound to one username for its whole lifetime.
///
/// Cloning is cheap; clones share the API client.
#[derive(Clone)]
pub struct Session {
    username: String,
    api: Arc<dyn ForgeApi>,
    max_key_removal_rounds: usize,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("max_key_removal_rounds", &self.max_key_removal_rounds)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(username: impl Into<String>, api: Arc<dyn ForgeApi>) -> Self {
        Self {
            username: username.into(),
            api,
            max_key_removal_rounds: DEFAULT_MAX_KEY_REMOVAL_ROUNDS,
        }
    }

    pub fn with_max_key_removal_rounds(mut self, rounds: usize) -> Self {
        self.max_key_removal_rounds = rounds;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Create a private, empty repository owned by this user.
    pub fn create_repo(&self, ctx: &Context, name: &str) -> Result<()> {
        let options = CreateRepoOption {
            name: name.to_string(),
            private: true,
            auto_init: false,
            template: false,
            ..Default::default()
        };
        self.api.create_repo(ctx, &options)?;
        debug!(user = %self.username, repo = %name, "Created repository");
        Ok(())
    }

    /// Commit a new file through the API with message `added <file_name>`.
    pub fn create_file(
        &self,
        ctx: &Context,
        repo: &str,
        file_name: &str,
        contents: &str,
    ) -> Result<()> {
        let options = CreateFileOptions {
            content: STANDARD.encode(contents),
            message: format!("added {file_name}"),
            branch: None,
        };
        self.api
            .create_file(ctx, &self.username, repo, file_name, &options)?;
        debug!(user = %self.username, repo = %repo, file = %file_name, "Created file");
        Ok(())
    }

    /// Tag the tip of the repository's default branch.
    pub fn create_tag(&self, ctx: &Context, repo: &str, tag: &str) -> Result<()> {
        let repository = self.api.get_repo(ctx, &self.username, repo)?;
        let options = CreateTagOption {
            tag_name: tag.to_string(),
            message: String::new(),
            target: repository.default_branch,
        };
        self.api.create_tag(ctx, &self.username, repo, &options)?;
        debug!(user = %self.username, repo = %repo, tag = %tag, branch = %options.target, "Created tag");
        Ok(())
    }

    /// Reference name to object sha. References without an object are left out.
    pub fn get_refs(&self, ctx: &Context, repo: &str) -> Result<BTreeMap<String, String>> {
        let refs = self.api.list_refs(ctx, &self.username, repo)?;
        Ok(refs
            .into_iter()
            .filter_map(|reference| {
                reference
                    .object
                    .map(|object| (reference.name, object.sha))
            })
            .collect())
    }

    /// Register an authorized-key line for this user.
    pub fn add_public_key(&self, ctx: &Context, key: &[u8]) -> Result<()> {
        let options = CreateKeyOption {
            title: public_key_title(key),
            key: String::from_utf8_lossy(key).into_owned(),
            read_only: false,
        };
        let created = self.api.create_public_key(ctx, &options)?;
        debug!(user = %self.username, key_id = created.id, title = %options.title, "Added public key");
        Ok(())
    }

    /// Delete every public key of this user.
    ///
    /// Lists and deletes until an empty list comes back. Stops with
    /// [`Error::PublicKeysRemain`] once the round limit is used up.
    pub fn remove_all_public_keys(&self, ctx: &Context) -> Result<()> {
        for _ in 0..self.max_key_removal_rounds {
            let keys = self.api.list_public_keys(ctx)?;
            if keys.is_empty() {
                info!(user = %self.username, "Removed all public keys");
                return Ok(());
            }
            for key in keys {
                self.api.delete_public_key(ctx, key.id)?;
                debug!(user = %self.username, key_id = key.id, "Deleted public key");
            }
        }

        let remaining = self.api.list_public_keys(ctx)?.len();
        if remaining == 0 {
            return Ok(());
        }
        Err(Error::PublicKeysRemain {
            remaining,
            rounds: self.max_key_removal_rounds,
        })
    }
}

/// `publickey-` followed by the first 8 hex chars of the key's SHA-256.
pub fn public_key_title(key: &[u8]) -> String {
    let digest = Sha256::digest(key);
    let hex: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("publickey-{hex}")
}
