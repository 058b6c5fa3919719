#![allow(dead_code)]

//! In-memory stand-ins for the hosting server and its REST API.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use forge_fixture::api::{
    CreateFileOptions, CreateKeyOption, CreateRepoOption, CreateTagOption, ForgeApi, GitObject,
    GitReference, PublicKey, Repository,
};
use forge_fixture::{Context, Error, HostingServer, Result, Session};
use ssh_key::public::{Ed25519PublicKey, KeyData};

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Default)]
pub struct FakeRepo {
    pub files: Vec<(String, String)>,
    pub messages: Vec<String>,
    pub refs: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct FakeUser {
    pub password: String,
    pub email: String,
    pub repos: BTreeMap<String, FakeRepo>,
    pub keys: Vec<PublicKey>,
}

#[derive(Debug, Default)]
pub struct ForgeState {
    pub users: BTreeMap<String, FakeUser>,
    /// Every mutating call in order, e.g. `create_repo alice/src`.
    pub calls: Vec<String>,
    next_id: i64,
    /// Deletions report success but keep the key.
    pub stuck_keys: bool,
    /// `list_refs` also returns a reference without an object.
    pub dangling_ref: bool,
    /// Name of an operation that fails with HTTP 500.
    pub fail_on: Option<&'static str>,
}

/// Shared backing store of a fake Gitea instance.
#[derive(Debug, Default)]
pub struct FakeForge {
    state: Mutex<ForgeState>,
}

impl FakeForge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, ForgeState> {
        self.state.lock().unwrap()
    }

    pub fn api_for(self: &Arc<Self>, username: &str) -> Arc<dyn ForgeApi> {
        Arc::new(FakeUserApi {
            forge: Arc::clone(self),
            username: username.to_string(),
        })
    }

    pub fn add_user(&self, username: &str) {
        self.state()
            .users
            .insert(username.to_string(), FakeUser::default());
    }
}

fn api_error(operation: &'static str, status: u16, body: &str) -> Error {
    Error::Api {
        operation,
        status,
        body: body.to_string(),
    }
}

/// [`ForgeApi`] acting as one user of a [`FakeForge`].
pub struct FakeUserApi {
    forge: Arc<FakeForge>,
    username: String,
}

impl FakeUserApi {
    fn enter(&self, ctx: &Context, operation: &'static str) -> Result<MutexGuard<'_, ForgeState>> {
        ctx.check(operation)?;
        let state = self.forge.state();
        if state.fail_on == Some(operation) {
            return Err(api_error(operation, 500, "injected failure"));
        }
        if !state.users.contains_key(&self.username) {
            return Err(api_error(operation, 401, "user does not exist"));
        }
        Ok(state)
    }
}

fn repo_mut<'s>(
    state: &'s mut ForgeState,
    operation: &'static str,
    owner: &str,
    repo: &str,
) -> Result<&'s mut FakeRepo> {
    state
        .users
        .get_mut(owner)
        .and_then(|user| user.repos.get_mut(repo))
        .ok_or_else(|| api_error(operation, 404, "repository not found"))
}

impl ForgeApi for FakeUserApi {
    fn create_repo(&self, ctx: &Context, options: &CreateRepoOption) -> Result<()> {
        let mut state = self.enter(ctx, "create new repo")?;
        state
            .calls
            .push(format!("create_repo {}/{}", self.username, options.name));
        let user = state
            .users
            .get_mut(&self.username)
            .ok_or_else(|| api_error("create new repo", 401, "user does not exist"))?;
        if user.repos.contains_key(&options.name) {
            return Err(api_error("create new repo", 409, "repository already exists"));
        }
        user.repos.insert(options.name.clone(), FakeRepo::default());
        Ok(())
    }

    fn get_repo(&self, ctx: &Context, owner: &str, repo: &str) -> Result<Repository> {
        let mut state = self.enter(ctx, "get repo")?;
        let found = repo_mut(&mut state, "get repo", owner, repo)?;
        Ok(Repository {
            name: repo.to_string(),
            full_name: format!("{owner}/{repo}"),
            private: true,
            empty: found.refs.is_empty(),
            default_branch: DEFAULT_BRANCH.to_string(),
            ..Default::default()
        })
    }

    fn create_file(
        &self,
        ctx: &Context,
        owner: &str,
        repo: &str,
        path: &str,
        options: &CreateFileOptions,
    ) -> Result<()> {
        let mut state = self.enter(ctx, "create new file")?;
        if owner != self.username {
            return Err(api_error("create new file", 403, "not the owner"));
        }
        state.calls.push(format!("create_file {owner}/{repo} {path}"));
        state.next_id += 1;
        let sha = format!("{:040x}", state.next_id);

        let contents = STANDARD
            .decode(&options.content)
            .map_err(|e| api_error("create new file", 422, &e.to_string()))?;
        let found = repo_mut(&mut state, "create new file", owner, repo)?;
        found
            .files
            .push((path.to_string(), String::from_utf8_lossy(&contents).into_owned()));
        found.messages.push(options.message.clone());
        found
            .refs
            .insert(format!("refs/heads/{DEFAULT_BRANCH}"), sha);
        Ok(())
    }

    fn create_tag(
        &self,
        ctx: &Context,
        owner: &str,
        repo: &str,
        options: &CreateTagOption,
    ) -> Result<()> {
        let mut state = self.enter(ctx, "create new tag")?;
        state
            .calls
            .push(format!("create_tag {owner}/{repo} {}", options.tag_name));
        let found = repo_mut(&mut state, "create new tag", owner, repo)?;
        let sha = found
            .refs
            .get(&format!("refs/heads/{}", options.target))
            .cloned()
            .ok_or_else(|| api_error("create new tag", 404, "target not found"))?;
        found
            .refs
            .insert(format!("refs/tags/{}", options.tag_name), sha);
        Ok(())
    }

    fn list_refs(&self, ctx: &Context, owner: &str, repo: &str) -> Result<Vec<GitReference>> {
        let mut state = self.enter(ctx, "list refs")?;
        let dangling = state.dangling_ref;
        let found = repo_mut(&mut state, "list refs", owner, repo)?;
        let mut refs: Vec<GitReference> = found
            .refs
            .iter()
            .map(|(name, sha)| GitReference {
                name: name.clone(),
                object: Some(GitObject {
                    kind: "commit".to_string(),
                    sha: sha.clone(),
                }),
            })
            .collect();
        if dangling {
            refs.push(GitReference {
                name: "refs/pull/1/head".to_string(),
                object: None,
            });
        }
        Ok(refs)
    }

    fn create_public_key(&self, ctx: &Context, options: &CreateKeyOption) -> Result<PublicKey> {
        let mut state = self.enter(ctx, "create public key")?;
        state.calls.push(format!("add_key {}", self.username));
        state.next_id += 1;
        let id = state.next_id;

        let duplicate = state
            .users
            .values()
            .flat_map(|user| &user.keys)
            .any(|key| key.key == options.key);
        if duplicate {
            return Err(api_error("create public key", 422, "Key content has been used"));
        }

        let key = PublicKey {
            id,
            title: options.title.clone(),
            key: options.key.clone(),
            read_only: options.read_only,
        };
        if let Some(user) = state.users.get_mut(&self.username) {
            user.keys.push(key.clone());
        }
        Ok(key)
    }

    fn list_public_keys(&self, ctx: &Context) -> Result<Vec<PublicKey>> {
        let state = self.enter(ctx, "list public keys")?;
        Ok(state
            .users
            .get(&self.username)
            .map(|user| user.keys.clone())
            .unwrap_or_default())
    }

    fn delete_public_key(&self, ctx: &Context, id: i64) -> Result<()> {
        let mut state = self.enter(ctx, "delete public key")?;
        state.calls.push(format!("delete_key {} {id}", self.username));
        if state.stuck_keys {
            return Ok(());
        }
        let user = state
            .users
            .get_mut(&self.username)
            .ok_or_else(|| api_error("delete public key", 401, "user does not exist"))?;
        let before = user.keys.len();
        user.keys.retain(|key| key.id != id);
        if user.keys.len() == before {
            return Err(api_error("delete public key", 404, "key not found"));
        }
        Ok(())
    }
}

/// A [`HostingServer`] backed by a [`FakeForge`].
pub struct FakeServer {
    pub forge: Arc<FakeForge>,
    pub host_key: ssh_key::PublicKey,
    pub host_key_error: bool,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            forge: FakeForge::new(),
            host_key: fake_host_key(),
            host_key_error: false,
        }
    }
}

pub fn fake_host_key() -> ssh_key::PublicKey {
    ssh_key::PublicKey::new(KeyData::Ed25519(Ed25519PublicKey([7; 32])), "fake-host")
}

impl HostingServer for FakeServer {
    fn ssh_address(&self) -> String {
        "127.0.0.1:2222".to_string()
    }

    fn http_address(&self) -> String {
        "127.0.0.1:3000".to_string()
    }

    fn host_key(&self, ctx: &Context) -> Result<ssh_key::PublicKey> {
        ctx.check("probe host key")?;
        if self.host_key_error {
            return Err(forge_keys::Error::HostKeyProbe {
                addr: self.ssh_address(),
                message: "connection refused".to_string(),
            }
            .into());
        }
        Ok(self.host_key.clone())
    }

    fn create_user(&self, ctx: &Context, username: &str, password: &str, email: &str) -> Result<()> {
        ctx.check("create user")?;
        let mut state = self.forge.state();
        state.calls.push(format!("create_user {username}"));
        if state.users.contains_key(username) {
            return Err(Error::CreateUser {
                username: username.to_string(),
                response: format!("user already exists [name: {username}]"),
            });
        }
        state.users.insert(
            username.to_string(),
            FakeUser {
                password: password.to_string(),
                email: email.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn new_session(&self, username: &str, _password: &str) -> Result<Session> {
        Ok(Session::new(username, self.forge.api_for(username)))
    }
}

/// Serve exactly one HTTP request with a canned response.
///
/// The join handle yields the raw request text.
pub fn one_shot_http(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        request
    });

    (base_url, handle)
}

fn read_request(stream: &mut impl Read) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
