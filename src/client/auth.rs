//! Contains the functionality for the challenge-response handshake.
//!
//! Both sides of the handshake prove knowledge of the shared secret the same
//! way: pick a nonce, publish `hex(sha256(secret ‖ nonce))`, and let the peer
//! recompute it. The client sends its proof in the CONNECT request and
//! verifies the `client_auth` proof the server returns before trusting the
//! issued access token.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Generates a per-handshake nonce: the hex SHA-256 of 16 random bytes.
///
/// The protocol relies on the secret, not the nonce, for authenticity, so the
/// process-wide RNG is sufficient here.
pub(crate) fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(Sha256::digest(bytes))
}

/// Computes the request token proving knowledge of the secret for a given
/// nonce: `hex(sha256(secret_key ‖ nonce))`.
pub(crate) fn request_token(secret_key: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret_key.as_bytes());
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// The server's proof of the shared secret, carried in the `client_auth`
/// member of the handshake reply.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct AuthProof {
    pub(crate) nonce: String,
    pub(crate) request_token: String,
}

/// Verifies that the server's proof was derived from the shared secret.
pub(crate) fn verify_server_proof(secret_key: &str, proof: &AuthProof) -> Result<()> {
    if request_token(secret_key, &proof.nonce) != proof.request_token {
        return Err(Error::authentication_error(
            "the server's request token does not match the shared secret",
        ));
    }

    Ok(())
}

/// The credentials the server issues on a successful handshake; the access
/// token is attached to every subsequent query on the session.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ServerAuth {
    pub(crate) client_key: String,
    pub(crate) access_key: String,
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) access_token_expire: Option<serde_json::Value>,
}
