//! The slice of the hosting service's REST API the fixtures rely on
//!
//! [`ForgeApi`] is the seam between [`Session`](crate::Session) and the HTTP
//! transport. The wire types mirror Gitea's `/api/v1` JSON.

use serde::{Deserialize, Serialize};

use crate::{Context, Result};

/// REST operations issued on behalf of one authenticated user.
pub trait ForgeApi: Send + Sync {
    /// `POST /user/repos`
    fn create_repo(&self, ctx: &Context, options: &CreateRepoOption) -> Result<()>;

    /// `GET /repos/{owner}/{repo}`
    fn get_repo(&self, ctx: &Context, owner: &str, repo: &str) -> Result<Repository>;

    /// `POST /repos/{owner}/{repo}/contents/{path}`
    fn create_file(
        &self,
        ctx: &Context,
        owner: &str,
        repo: &str,
        path: &str,
        options: &CreateFileOptions,
    ) -> Result<()>;

    /// `POST /repos/{owner}/{repo}/tags`
    fn create_tag(
        &self,
        ctx: &Context,
        owner: &str,
        repo: &str,
        options: &CreateTagOption,
    ) -> Result<()>;

    /// `GET /repos/{owner}/{repo}/git/refs`
    fn list_refs(&self, ctx: &Context, owner: &str, repo: &str) -> Result<Vec<GitReference>>;

    /// `POST /user/keys`
    fn create_public_key(&self, ctx: &Context, options: &CreateKeyOption) -> Result<PublicKey>;

    /// `GET /user/keys`
    fn list_public_keys(&self, ctx: &Context) -> Result<Vec<PublicKey>>;

    /// `DELETE /user/keys/{id}`
    fn delete_public_key(&self, ctx: &Context, id: i64) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRepoOption {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
    pub template: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issue_labels: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gitignores: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub readme: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trust_model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFileOptions {
    /// Base64 encoded file content.
    pub content: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTagOption {
    pub tag_name: String,
    pub message: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKeyOption {
    pub title: String,
    pub key: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub empty: bool,
    pub default_branch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitReference {
    #[serde(rename = "ref")]
    pub name: String,
    #[serde(default)]
    pub object: Option<GitObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicKey {
    pub id: i64,
    pub title: String,
    pub key: String,
    pub read_only: bool,
}
