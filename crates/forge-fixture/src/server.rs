//! Lifecycle of the containerised Gitea server

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::docker::{CommandOutput, DockerCli};
use crate::session::DEFAULT_MAX_KEY_REMOVAL_ROUNDS;
use crate::{Context, Error, GiteaClient, Result, Session};

pub const DEFAULT_IMAGE: &str = "gitea/gitea:1.19.0";
pub const HTTP_PORT: &str = "3000/tcp";
pub const SSH_PORT: &str = "22/tcp";
pub const HEALTH_PATH: &str = "/api/healthz";

const CONTAINER_NAME_PREFIX: &str = "test-gitea-";
const INSTALL_LOCK_ENV: &str = "GITEA__security__INSTALL_LOCK=true";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// How to launch the server container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub image: String,
    /// Container engine CLI binary.
    pub docker: String,
    pub startup_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Passed on to every [`Session`] the server opens.
    pub max_key_removal_rounds: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            docker: "docker".to_string(),
            startup_timeout_secs: 120,
            poll_interval_ms: 500,
            max_key_removal_rounds: DEFAULT_MAX_KEY_REMOVAL_ROUNDS,
        }
    }
}

impl ServerConfig {
    /// Override the image; an empty string keeps the current one.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        if !image.is_empty() {
            self.image = image;
        }
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// What the preparation workflow needs from a running hosting server.
pub trait HostingServer {
    /// `host:port` of the SSH endpoint.
    fn ssh_address(&self) -> String;

    /// `host:port` of the HTTP endpoint.
    fn http_address(&self) -> String;

    /// The server's SSH host key.
    fn host_key(&self, ctx: &Context) -> Result<ssh_key::PublicKey>;

    /// Create an account whose password never has to be changed.
    fn create_user(&self, ctx: &Context, username: &str, password: &str, email: &str)
    -> Result<()>;

    /// A session authenticated as `username` with basic auth.
    fn new_session(&self, username: &str, password: &str) -> Result<Session>;
}

/// A running Gitea container.
#[derive(Debug)]
pub struct Server {
    docker: DockerCli,
    container_id: String,
    name: String,
    ssh_host: String,
    ssh_port: u16,
    http_host: String,
    http_port: u16,
    max_key_removal_rounds: usize,
}

impl Server {
    /// Start a container and wait until it serves HTTP and SSH.
    ///
    /// Waits at most `startup_timeout_secs`, or less if `ctx` expires first.
    /// A container that fails to come up is removed before returning.
    pub fn start(ctx: &Context, config: &ServerConfig) -> Result<Self> {
        let docker = DockerCli::new(&config.docker);
        let name = format!("{CONTAINER_NAME_PREFIX}{}", uuid::Uuid::new_v4().simple());

        let output = docker
            .run_checked(
                ctx,
                &[
                    "run",
                    "--detach",
                    "--rm",
                    "--name",
                    name.as_str(),
                    "--env",
                    INSTALL_LOCK_ENV,
                    "--publish",
                    HTTP_PORT,
                    "--publish",
                    SSH_PORT,
                    config.image.as_str(),
                ],
            )
            .map_err(|e| {
                // The daemon may have created the container before the CLI gave up.
                discard_container(&docker, &name, &name);
                Error::ContainerStart {
                    message: e.to_string(),
                }
            })?;

        let container_id = output.stdout.trim().to_string();
        let container_id = if container_id.is_empty() {
            name.clone()
        } else {
            container_id
        };
        info!(image = %config.image, container = %name, "Started server container");

        match Self::finish_start(ctx, config, docker.clone(), container_id.clone(), name.clone()) {
            Ok(server) => Ok(server),
            Err(e) => {
                warn!(container = %name, error = %e, "Server did not come up, removing container");
                discard_container(&docker, &container_id, &name);
                Err(e)
            }
        }
    }

    fn finish_start(
        ctx: &Context,
        config: &ServerConfig,
        docker: DockerCli,
        container_id: String,
        name: String,
    ) -> Result<Self> {
        let host = docker_host();
        let http_port = mapped_port(&docker, ctx, &container_id, HTTP_PORT)?;
        let ssh_port = mapped_port(&docker, ctx, &container_id, SSH_PORT)?;

        let server = Self {
            docker,
            container_id,
            name,
            ssh_host: host.clone(),
            ssh_port,
            http_host: host,
            http_port,
            max_key_removal_rounds: config.max_key_removal_rounds,
        };

        server.wait_until_ready(&ctx.bounded(config.startup_timeout()), config.poll_interval())?;
        server.exec_as_git(ctx, &["gitea", "migrate"], true)?;
        info!(
            container = %server.name,
            http = %server.http_address(),
            ssh = %server.ssh_address(),
            "Server ready"
        );
        Ok(server)
    }

    /// Remove the container. Calling this twice reports the engine's error.
    pub fn stop(&self, ctx: &Context) -> Result<()> {
        remove_container(&self.docker, ctx, &self.container_id)?;
        info!(container = %self.name, "Stopped server container");
        Ok(())
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn wait_until_ready(&self, ctx: &Context, poll_interval: Duration) -> Result<()> {
        let health_url = format!("http://{}{HEALTH_PATH}", self.http_address());
        let http = reqwest::blocking::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| Error::Http {
                operation: "build HTTP client",
                source: e,
            })?;

        loop {
            let ssh_ready = ssh_banner_seen(&self.ssh_address());
            let http_ready = health_passes(&http, &health_url);
            if ssh_ready && http_ready {
                return Ok(());
            }
            debug!(ssh_ready, http_ready, "Waiting for server");

            if ctx.is_expired() {
                return Err(Error::ContainerStart {
                    message: format!(
                        "{} not ready before deadline (ssh ready: {ssh_ready}, http ready: {http_ready})",
                        self.name
                    ),
                });
            }
            let pause = ctx
                .remaining()
                .map_or(poll_interval, |remaining| remaining.min(poll_interval));
            thread::sleep(pause);
        }
    }

    /// `docker exec --user git <container> <command...>`.
    fn exec_as_git(
        &self,
        ctx: &Context,
        command: &[&str],
        checked: bool,
    ) -> Result<CommandOutput> {
        let mut args = vec!["exec", "--user", "git", self.container_id.as_str()];
        args.extend_from_slice(command);
        if checked {
            self.docker.run_checked(ctx, &args)
        } else {
            self.docker.run(ctx, &args)
        }
    }
}

impl HostingServer for Server {
    fn ssh_address(&self) -> String {
        join_host_port(&self.ssh_host, self.ssh_port)
    }

    fn http_address(&self) -> String {
        join_host_port(&self.http_host, self.http_port)
    }

    fn host_key(&self, ctx: &Context) -> Result<ssh_key::PublicKey> {
        ctx.check("probe host key")?;
        Ok(forge_keys::probe_server_host_key(
            &self.ssh_address(),
            ctx.remaining(),
        )?)
    }

    fn create_user(
        &self,
        ctx: &Context,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<()> {
        let output = self.exec_as_git(
            ctx,
            &[
                "gitea",
                "admin",
                "user",
                "create",
                "--username",
                username,
                "--password",
                password,
                "--email",
                email,
                "--must-change-password=false",
            ],
            false,
        )?;

        check_user_created(username, &output)?;
        info!(user = %username, "Created user");
        Ok(())
    }

    fn new_session(&self, username: &str, password: &str) -> Result<Session> {
        let client = GiteaClient::new(
            &format!("http://{}", self.http_address()),
            username,
            password,
        )?;
        Ok(Session::new(username, Arc::new(client))
            .with_max_key_removal_rounds(self.max_key_removal_rounds))
    }
}

fn remove_container(docker: &DockerCli, ctx: &Context, container: &str) -> Result<()> {
    docker.run_checked(ctx, &["rm", "--force", "--volumes", container])?;
    Ok(())
}

/// Best-effort removal after a failed start; failures are only logged.
fn discard_container(docker: &DockerCli, container: &str, name: &str) {
    let ctx = Context::with_timeout(CLEANUP_TIMEOUT);
    if let Err(e) = remove_container(docker, &ctx, container) {
        warn!(container = %name, error = %e, "Failed to remove container");
    }
}

fn mapped_port(docker: &DockerCli, ctx: &Context, container: &str, port: &str) -> Result<u16> {
    let output = docker
        .run_checked(ctx, &["port", container, port])
        .map_err(|e| Error::PortResolution {
            port: port.to_string(),
            message: e.to_string(),
        })?;
    parse_mapped_port(&output.stdout).ok_or_else(|| Error::PortResolution {
        port: port.to_string(),
        message: format!("unexpected output {:?}", output.stdout.trim()),
    })
}

/// First host port in `docker port` output (`0.0.0.0:49153`, `[::]:49153`).
pub(crate) fn parse_mapped_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}

/// Host the published ports are reachable on.
fn docker_host() -> String {
    std::env::var("DOCKER_HOST")
        .ok()
        .and_then(|url| host_from_docker_url(&url))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Host part of a TCP daemon URL; `None` for unix sockets and the like.
pub(crate) fn host_from_docker_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "tcp" | "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    (!host.is_empty()).then(|| host.to_string())
}

/// `host:port`, with IPv6 hosts in brackets.
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Exec output framed by the engine can carry NUL and SOH bytes around the text.
pub(crate) fn trim_exec_output(output: &str) -> &str {
    output.trim_matches(|c: char| c.is_whitespace() || c == '\0' || c == '\u{1}')
}

fn user_created_phrase(username: &str) -> String {
    format!("New user '{username}' has been successfully created!")
}

/// `gitea admin user create` succeeded only if its output ends with the
/// confirmation for `username`; anything else is reported verbatim.
pub(crate) fn check_user_created(username: &str, output: &CommandOutput) -> Result<()> {
    let stdout = trim_exec_output(&output.stdout);
    if stdout.ends_with(&user_created_phrase(username)) {
        return Ok(());
    }
    let stderr = trim_exec_output(&output.stderr);
    let response = if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{stdout}\n{stderr}")
    };
    Err(Error::CreateUser {
        username: username.to_string(),
        response,
    })
}

fn ssh_banner_seen(addr: &str) -> bool {
    let Some(addr) = addr.to_socket_addrs().ok().and_then(|mut addrs| addrs.next()) else {
        return false;
    };
    let Ok(mut stream) = TcpStream::connect_timeout(&addr, PROBE_TIMEOUT) else {
        return false;
    };
    if stream.set_read_timeout(Some(PROBE_TIMEOUT)).is_err() {
        return false;
    }
    let mut banner = [0u8; 4];
    stream.read_exact(&mut banner).is_ok() && &banner == b"SSH-"
}

#[derive(Deserialize)]
struct Health {
    #[serde(default)]
    status: String,
}

fn health_passes(http: &reqwest::blocking::Client, url: &str) -> bool {
    http.get(url)
        .send()
        .ok()
        .filter(|response| response.status().is_success())
        .and_then(|response| response.json::<Health>().ok())
        .is_some_and(|health| health.status == "pass")
}
