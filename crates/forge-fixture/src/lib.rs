//! Integration-test fixtures backed by a throwaway Gitea server
//!
//! [`Server`] runs Gitea in a Docker container, [`Session`] talks to its REST
//! API as one user, and [`prepare_repositories`] combines both into a pair of
//! seeded source/destination repositories with SSH keys and credentials.
//!
//! All operations block. Every network or exec call takes a [`Context`]
//! whose deadline, if any, bounds the call.

pub mod api;
pub mod config;
pub mod context;
pub mod docker;
pub mod error;
pub mod gitea;
pub mod logging;
pub mod preparation;
pub mod server;
pub mod session;

pub use api::ForgeApi;
pub use config::HarnessConfig;
pub use context::Context;
pub use error::{Error, Result};
pub use gitea::GiteaClient;
pub use preparation::{
    ActorConfig, HttpConfig, Preparation, PreparationConfig, RepositoryConfig, SeedFile, SshConfig,
    create_user_name, prepare_repositories, prepare_repositories_with,
};
pub use server::{HostingServer, Server, ServerConfig};
pub use session::Session;
