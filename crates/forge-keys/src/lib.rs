//! Key and credential utilities for forge-fixture
//!
//! Generates SSH key material for test accounts, captures a server's SSH
//! host key and builds HTTP basic-auth header values.

pub mod credentials;
pub mod error;
pub mod host_key;
pub mod keygen;

pub use credentials::basic_auth_header;
pub use error::{Error, Result};
pub use host_key::probe_server_host_key;
pub use keygen::{KeyMaterial, create_ssh_key_material, generate_rsa_key};
