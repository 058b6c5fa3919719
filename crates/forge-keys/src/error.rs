//! Error types for forge-keys

/// Result type for forge-keys operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in forge-keys operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to generate private key: {0}")]
    Generate(#[source] rsa::Error),

    #[error("Generated private key failed validation: {0}")]
    Validate(#[source] rsa::Error),

    #[error("Unable to encode private key as PEM: {0}")]
    EncodePrivateKey(#[source] rsa::pkcs1::Error),

    #[error("Unable to encode public key: {0}")]
    EncodePublicKey(#[source] ssh_key::Error),

    #[error("Failure during connect to {addr}: {message}")]
    HostKeyProbe { addr: String, message: String },

    #[error("Unable to start SSH runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
