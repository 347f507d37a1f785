use serde_json::json;

use crate::client::{auth::ServerAuth, options::ClientOptions};

/// Request type codes sent to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RequestType {
    Connect,
    Query,
}

impl RequestType {
    pub(crate) fn value(&self) -> i32 {
        match self {
            RequestType::Connect => 0x001,
            RequestType::Query => 0x005,
        }
    }
}

/// Response codes the client reacts to. All other codes pass through
/// untouched: an error frame surfaces as a server error regardless of its
/// code, and any other frame is data.
pub(crate) const CLIENT_AUTH_ERROR: i32 = 0x006;
pub(crate) const QUERY_DATA: i32 = 0x007;
pub(crate) const TOKEN_EXPIRED: i32 = 0x400;
pub(crate) const QUERY_COMPLETE: i32 = 0x608;

/// Builds the CONNECT request: the credentials' public keys plus the nonce
/// and the proof derived from the secret.
pub(crate) fn connect_command(
    options: &ClientOptions,
    nonce: &str,
    request_token: &str,
) -> serde_json::Value {
    json!({
        "access_key": options.access_key,
        "client_key": options.client_key,
        "nonce": nonce,
        "request_token": request_token,
        "request_type": RequestType::Connect.value(),
    })
}

/// Builds a QUERY request around a rendered query dictionary, attaching the
/// database routing fields from the configuration and the access token the
/// server issued for this session.
pub(crate) fn query_command(
    query: crate::query::Document,
    options: &ClientOptions,
    server_auth: &ServerAuth,
) -> serde_json::Value {
    json!({
        "query": query,
        "request_type": RequestType::Query.value(),
        "database_id": options.database_id,
        "env": options.env.as_str(),
        "client_key": server_auth.client_key,
        "access_token": server_auth.access_token,
    })
}
