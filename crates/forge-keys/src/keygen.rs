//! RSA key generation and SSH encodings
//!
//! Private keys are emitted as PKCS#1 PEM (`RSA PRIVATE KEY`), public keys as
//! a single OpenSSH `authorized_keys` line.

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use ssh_key::public::{KeyData, RsaPublicKey};

use crate::{Error, Result};

/// A freshly generated SSH key pair in its on-disk encodings.
#[derive(Clone)]
pub struct KeyMaterial {
    /// PKCS#1 PEM encoded private key.
    pub private_key_pem: Vec<u8>,
    /// `ssh-rsa AAAA...` line, newline terminated.
    pub authorized_key: Vec<u8>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key_pem", &"<redacted>")
            .field("authorized_key", &String::from_utf8_lossy(&self.authorized_key))
            .finish()
    }
}

/// Generate an RSA private key of `bits` bits and validate it.
///
/// # Errors
///
/// Returns [`Error::Generate`] if the size is unsupported or the RNG fails,
/// and [`Error::Validate`] if the generated key is not self-consistent.
pub fn generate_rsa_key(bits: usize) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::new(&mut OsRng, bits).map_err(Error::Generate)?;
    key.validate().map_err(Error::Validate)?;
    Ok(key)
}

/// Generate an RSA key pair and encode it for SSH use.
pub fn create_ssh_key_material(bits: usize) -> Result<KeyMaterial> {
    let key = generate_rsa_key(bits)?;

    let pem = key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(Error::EncodePrivateKey)?;

    let public = RsaPublicKey::try_from(&key.to_public_key()).map_err(Error::EncodePublicKey)?;
    let mut line = ssh_key::PublicKey::new(KeyData::Rsa(public), "")
        .to_openssh()
        .map_err(Error::EncodePublicKey)?;
    line.push('\n');

    tracing::debug!(bits, "Generated SSH key material");

    Ok(KeyMaterial {
        private_key_pem: pem.as_bytes().to_vec(),
        authorized_key: line.into_bytes(),
    })
}
