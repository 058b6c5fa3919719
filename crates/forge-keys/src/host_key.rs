//! SSH host key capture
//!
//! Connects to an SSH server only far enough to complete the key exchange,
//! records the host key the server presented, then disconnects. No user
//! authentication is attempted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use russh::client;
use russh_keys::PublicKeyBase64;
use tracing::debug;

use crate::{Error, Result};

/// Client handler that accepts any host key and stores its wire encoding.
struct HostKeyCapture {
    captured: Arc<Mutex<Option<Vec<u8>>>>,
}

#[async_trait::async_trait]
impl client::Handler for HostKeyCapture {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if let Ok(mut slot) = self.captured.lock() {
            *slot = Some(server_public_key.public_key_bytes());
        }
        Ok(true)
    }
}

/// Retrieve the host key presented by the SSH server at `addr` (`host:port`).
///
/// `timeout` bounds the whole exchange. A key observed before the connection
/// fails still counts as success.
///
/// # Errors
///
/// Returns [`Error::HostKeyProbe`] if the connection fails before a host key
/// was observed, or if the observed key cannot be decoded.
pub fn probe_server_host_key(addr: &str, timeout: Option<Duration>) -> Result<ssh_key::PublicKey> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;

    let captured = Arc::new(Mutex::new(None));
    let handler = HostKeyCapture {
        captured: Arc::clone(&captured),
    };

    let outcome: std::result::Result<(), String> = runtime.block_on(async {
        let connect = async {
            let config = Arc::new(client::Config::default());
            let handle = client::connect(config, addr, handler).await?;
            if let Err(e) = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
            {
                debug!(%addr, error = %e, "Disconnect after host key capture failed");
            }
            Ok::<(), russh::Error>(())
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, connect).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {limit:?}")),
            },
            None => connect.await.map_err(|e| e.to_string()),
        }
    });

    let key_bytes = captured.lock().ok().and_then(|mut slot| slot.take());

    match (key_bytes, outcome) {
        (Some(bytes), outcome) => {
            if let Err(message) = outcome {
                debug!(%addr, %message, "Connection failed after host key was captured");
            }
            let key = ssh_key::PublicKey::from_bytes(&bytes).map_err(|e| Error::HostKeyProbe {
                addr: addr.to_string(),
                message: format!("unable to decode host key: {e}"),
            })?;
            debug!(%addr, algorithm = %key.algorithm(), "Captured SSH host key");
            Ok(key)
        }
        (None, Err(message)) => Err(Error::HostKeyProbe {
            addr: addr.to_string(),
            message,
        }),
        (None, Ok(())) => Err(Error::HostKeyProbe {
            addr: addr.to_string(),
            message: "handshake finished without presenting a host key".into(),
        }),
    }
}
