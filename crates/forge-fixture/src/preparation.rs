//! Seeding a source and a destination repository on a running server
//!
//! [`prepare_repositories`] creates one user per side, registers a fresh SSH
//! key for each, creates the repositories and commits the requested files
//! through the API. Nothing is rolled back on failure; tearing down the whole
//! server is the expected cleanup.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::server::{HostingServer, Server};
use crate::{Context, Error, Result, Session};

/// SSH user every repository URL authenticates as.
pub const SSH_USERNAME: &str = "git";

/// Where and how to reach a repository over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// Where and how to reach a repository over SSH.
#[derive(Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub url: String,
    pub username: String,
    /// PEM encoded private key registered for the owner.
    pub private_key: Vec<u8>,
    pub private_key_password: String,
    /// Host keys to trust; the server's key captured during preparation.
    pub known_hosts: Vec<ssh_key::PublicKey>,
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("private_key", &format_args!("<{} bytes>", self.private_key.len()))
            .field("known_hosts", &self.known_hosts.len())
            .finish_non_exhaustive()
    }
}

/// One repository under test together with the session of its owner.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub repo_name: String,
    pub http: HttpConfig,
    pub ssh: SshConfig,
    pub session: Session,
}

/// The seeded state a test scenario starts from.
pub struct Preparation<'a, S = Server> {
    pub source: RepositoryConfig,
    pub destination: RepositoryConfig,
    pub server: &'a S,
}

impl<S: HostingServer> fmt::Debug for Preparation<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preparation")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("http_address", &self.server.http_address())
            .field("ssh_address", &self.server.ssh_address())
            .finish()
    }
}

impl<S> Preparation<'_, S> {
    /// Nothing to release: users and repositories disappear with the server.
    pub fn close(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Account and repository settings of one side of a preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Appended to the sanitised test name to form the username.
    pub suffix: String,
    pub password: String,
    pub repository: String,
}

impl ActorConfig {
    pub fn source() -> Self {
        Self {
            suffix: "-src".to_string(),
            password: "src".to_string(),
            repository: "src".to_string(),
        }
    }

    pub fn destination() -> Self {
        Self {
            suffix: "-dst".to_string(),
            password: "dst".to_string(),
            repository: "dst".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreparationConfig {
    /// RSA key size of the generated SSH keys.
    pub key_bits: usize,
    pub source: ActorConfig,
    pub destination: ActorConfig,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            key_bits: 3072,
            source: ActorConfig::source(),
            destination: ActorConfig::destination(),
        }
    }
}

/// A `(file name, contents)` entry to seed a repository with.
pub trait SeedFile {
    fn name(&self) -> &str;
    fn contents(&self) -> &str;
}

impl<K: AsRef<str>, V: AsRef<str>> SeedFile for (K, V) {
    fn name(&self) -> &str {
        self.0.as_ref()
    }

    fn contents(&self) -> &str {
        self.1.as_ref()
    }
}

/// Derive an account name from a free-form test name.
///
/// The result only contains `[a-z0-9_-]` and never starts or ends with `_`
/// or `-`; any other character becomes `_`.
pub fn create_user_name(prefix: &str, test_name: &str, suffix: &str) -> String {
    let lowered = format!("{prefix}{test_name}{suffix}").to_lowercase();
    let sanitised: String = lowered
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    sanitised.trim_matches(['_', '-']).to_string()
}

/// [`prepare_repositories_with`] using [`PreparationConfig::default`].
pub fn prepare_repositories<'a, S, Src, Dst>(
    ctx: &Context,
    server: &'a S,
    test_name: &str,
    source_files: Src,
    destination_files: Dst,
) -> Result<Preparation<'a, S>>
where
    S: HostingServer,
    Src: IntoIterator,
    Src::Item: SeedFile,
    Dst: IntoIterator,
    Dst::Item: SeedFile,
{
    prepare_repositories_with(
        ctx,
        server,
        test_name,
        &PreparationConfig::default(),
        source_files,
        destination_files,
    )
}

/// Create, key and seed a source and a destination repository.
///
/// Runs strictly in order and stops at the first failure, which is returned
/// wrapped with the name of the step. Files are committed one API call each,
/// in iteration order.
pub fn prepare_repositories_with<'a, S, Src, Dst>(
    ctx: &Context,
    server: &'a S,
    test_name: &str,
    config: &PreparationConfig,
    source_files: Src,
    destination_files: Dst,
) -> Result<Preparation<'a, S>>
where
    S: HostingServer,
    Src: IntoIterator,
    Src::Item: SeedFile,
    Dst: IntoIterator,
    Dst::Item: SeedFile,
{
    let source = Actor::new(test_name, &config.source);
    let destination = Actor::new(test_name, &config.destination);
    info!(
        test = %test_name,
        source = %source.username,
        destination = %destination.username,
        "Preparing repositories"
    );

    let host_key = server
        .host_key(ctx)
        .map_err(|e| e.at_step("unable to get public keys"))?;

    let source_endpoints = source.endpoints(server, &host_key);
    let destination_endpoints = destination.endpoints(server, &host_key);

    source.create_user(ctx, server)?;
    destination.create_user(ctx, server)?;

    let mut source_repo = source.open_session(server, source_endpoints)?;
    let mut destination_repo = destination.open_session(server, destination_endpoints)?;

    register_key(ctx, &mut source_repo, config.key_bits)?;
    register_key(ctx, &mut destination_repo, config.key_bits)?;

    create_repo(ctx, &source_repo)?;
    create_repo(ctx, &destination_repo)?;

    seed(ctx, &source_repo, source_files)?;
    seed(ctx, &destination_repo, destination_files)?;

    info!(test = %test_name, "Repositories prepared");
    Ok(Preparation {
        source: source_repo,
        destination: destination_repo,
        server,
    })
}

struct Actor<'c> {
    username: String,
    config: &'c ActorConfig,
}

impl<'c> Actor<'c> {
    fn new(test_name: &str, config: &'c ActorConfig) -> Self {
        Self {
            username: create_user_name("", test_name, &config.suffix),
            config,
        }
    }

    fn endpoints<S: HostingServer>(
        &self,
        server: &S,
        host_key: &ssh_key::PublicKey,
    ) -> (HttpConfig, SshConfig) {
        let path = format!("{}/{}.git", self.username, self.config.repository);
        let authorization = forge_keys::basic_auth_header(&self.username, &self.config.password);

        let http = HttpConfig {
            url: format!("http://{}/{path}", server.http_address()),
            headers: BTreeMap::from([("Authorization".to_string(), authorization)]),
        };
        let ssh = SshConfig {
            url: format!("ssh://{}/{path}", server.ssh_address()),
            username: SSH_USERNAME.to_string(),
            private_key: Vec::new(),
            private_key_password: String::new(),
            known_hosts: vec![host_key.clone()],
        };
        (http, ssh)
    }

    fn create_user<S: HostingServer>(&self, ctx: &Context, server: &S) -> Result<()> {
        let email = format!("{}@example.com", self.username);
        server
            .create_user(ctx, &self.username, &self.config.password, &email)
            .map_err(|e| e.at_step(format!("unable to create user {}", self.username)))
    }

    fn open_session<S: HostingServer>(
        &self,
        server: &S,
        (http, ssh): (HttpConfig, SshConfig),
    ) -> Result<RepositoryConfig> {
        let session = server
            .new_session(&self.username, &self.config.password)
            .map_err(|e| e.at_step(format!("unable to open session for {}", self.username)))?;
        Ok(RepositoryConfig {
            repo_name: self.config.repository.clone(),
            http,
            ssh,
            session,
        })
    }
}

fn register_key(ctx: &Context, repo: &mut RepositoryConfig, bits: usize) -> Result<()> {
    let user = repo.session.username().to_string();
    let keys = forge_keys::create_ssh_key_material(bits)
        .map_err(|e| Error::from(e).at_step(format!("unable to create SSH key for {user}")))?;
    repo.session
        .add_public_key(ctx, &keys.authorized_key)
        .map_err(|e| e.at_step(format!("unable to add public key for {user}")))?;
    repo.ssh.private_key = keys.private_key_pem;
    Ok(())
}

fn create_repo(ctx: &Context, repo: &RepositoryConfig) -> Result<()> {
    repo.session.create_repo(ctx, &repo.repo_name).map_err(|e| {
        e.at_step(format!(
            "unable to create repository {}/{}",
            repo.session.username(),
            repo.repo_name
        ))
    })
}

fn seed<I>(ctx: &Context, repo: &RepositoryConfig, files: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: SeedFile,
{
    for file in files {
        repo.session
            .create_file(ctx, &repo.repo_name, file.name(), file.contents())
            .map_err(|e| {
                e.at_step(format!(
                    "unable to create file {} in {}/{}",
                    file.name(),
                    repo.session.username(),
                    repo.repo_name
                ))
            })?;
    }
    Ok(())
}
