//! Blocking Gitea REST client
//!
//! Implements [`ForgeApi`] against `<base>/api/v1` with HTTP basic auth. The
//! [`Context`] deadline becomes the per-request timeout.

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{
    CreateFileOptions, CreateKeyOption, CreateRepoOption, CreateTagOption, ForgeApi,
    GitReference, PublicKey, Repository,
};
use crate::{Context, Error, Result};

/// [`ForgeApi`] over HTTP, authenticated as a single user.
#[derive(Debug, Clone)]
pub struct GiteaClient {
    base_url: Url,
    authorization: String,
    http: Client,
}

impl GiteaClient {
    /// Create a client for the server at `base_url` (e.g. `http://host:3000`).
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| Error::InvalidUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                url: base_url.to_string(),
                message: "URL cannot be used as a base".into(),
            });
        }

        let http = Client::builder().build().map_err(|e| Error::Http {
            operation: "build HTTP client",
            source: e,
        })?;

        Ok(Self {
            base_url: parsed,
            authorization: forge_keys::basic_auth_header(username, password),
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>/api/v1/<segments...>`, each segment percent-encoded.
    pub fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl {
                url: self.base_url.to_string(),
                message: "URL cannot be used as a base".into(),
            })?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    fn send(
        &self,
        ctx: &Context,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response> {
        ctx.check(operation)?;

        let mut request = request
            .header(AUTHORIZATION, &self.authorization)
            .header(ACCEPT, "application/json");
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining);
        }

        let response = request.send().map_err(|e| Error::Http {
            operation,
            source: e,
        })?;

        let status = response.status();
        debug!(%operation, status = status.as_u16(), url = %response.url(), "API call");
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(Error::Api {
                operation,
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(response)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        self.send(ctx, operation, request)?
            .json()
            .map_err(|e| Error::Http {
                operation,
                source: e,
            })
    }
}

impl ForgeApi for GiteaClient {
    fn create_repo(&self, ctx: &Context, options: &CreateRepoOption) -> Result<()> {
        let url = self.endpoint(["user", "repos"])?;
        self.send(ctx, "create new repo", self.http.post(url).json(options))?;
        Ok(())
    }

    fn get_repo(&self, ctx: &Context, owner: &str, repo: &str) -> Result<Repository> {
        let url = self.endpoint(["repos", owner, repo])?;
        self.send_json(ctx, "get repo", self.http.get(url))
    }

    fn create_file(
        &self,
        ctx: &Context,
        owner: &str,
        repo: &str,
        path: &str,
        options: &CreateFileOptions,
    ) -> Result<()> {
        let segments = ["repos", owner, repo, "contents"]
            .into_iter()
            .chain(path.split('/').filter(|segment| !segment.is_empty()));
        let url = self.endpoint(segments)?;
        self.send(ctx, "create new file", self.http.post(url).json(options))?;
        Ok(())
    }

    fn create_tag(
        &self,
        ctx: &Context,
        owner: &str,
        repo: &str,
        options: &CreateTagOption,
    ) -> Result<()> {
        let url = self.endpoint(["repos", owner, repo, "tags"])?;
        self.send(ctx, "create new tag", self.http.post(url).json(options))?;
        Ok(())
    }

    fn list_refs(&self, ctx: &Context, owner: &str, repo: &str) -> Result<Vec<GitReference>> {
        let url = self.endpoint(["repos", owner, repo, "git", "refs"])?;
        self.send_json(ctx, "list refs", self.http.get(url))
    }

    fn create_public_key(&self, ctx: &Context, options: &CreateKeyOption) -> Result<PublicKey> {
        let url = self.endpoint(["user", "keys"])?;
        self.send_json(ctx, "create public key", self.http.post(url).json(options))
    }

    fn list_public_keys(&self, ctx: &Context) -> Result<Vec<PublicKey>> {
        let url = self.endpoint(["user", "keys"])?;
        self.send_json(ctx, "list public keys", self.http.get(url))
    }

    fn delete_public_key(&self, ctx: &Context, id: i64) -> Result<()> {
        let id = id.to_string();
        let url = self.endpoint(["user", "keys", id.as_str()])?;
        self.send(ctx, "delete public key", self.http.delete(url))?;
        Ok(())
    }
}
