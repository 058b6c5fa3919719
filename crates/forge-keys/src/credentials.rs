//! HTTP credential helpers

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Build the value of an `Authorization` header for HTTP basic auth.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}
