pub(crate) mod command;
pub(crate) mod wire;

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::net::TcpStream;
use tracing::debug;

use self::wire::{Message, Reply};
use super::PoolInner;
use crate::{
    client::{
        auth::{self, ServerAuth},
        options::{ClientOptions, ServerAddress},
    },
    error::{Error, Result},
};

/// An authenticated session with the server.
///
/// A connection moves through `connect → authenticate → ready` inside
/// [`Connection::connect`] and is handed out fully authenticated or not at
/// all. Exclusive use is guaranteed structurally: the pool lease transfers
/// ownership, and all I/O takes `&mut self`, so send/receive ordering cannot
/// interleave across tasks.
#[derive(Debug)]
pub(crate) struct Connection {
    id: u32,
    address: ServerAddress,
    stream: TcpStream,

    /// Snapshot of the credentials the session authenticated with.
    options: Arc<ClientOptions>,

    server_auth: Option<ServerAuth>,
    connected: bool,

    /// Back-reference used to keep the pool's live count accurate when a
    /// session is dropped instead of being checked back in.
    pub(super) pool: Option<Weak<PoolInner>>,
}

impl Connection {
    /// Opens a TCP connection to `address` and runs the authentication
    /// handshake. `connect_timeout` from the options bounds each of the two
    /// handshake reads.
    pub(crate) async fn connect(
        id: u32,
        address: ServerAddress,
        options: Arc<ClientOptions>,
    ) -> Result<Self> {
        let mut stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
        stream.set_nodelay(true)?;

        let nonce = auth::generate_nonce();
        let request_token = auth::request_token(&options.secret_key, &nonce);
        Message::new(command::connect_command(&options, &nonce, &request_token))
            .write_to(&mut stream)
            .await?;

        let reply =
            Reply::parse(read_handshake_frame(&mut stream, options.connect_timeout).await?)?;
        if reply.error {
            return Err(Error::authentication_error(reply.error_message()));
        }

        let proof = reply.client_auth.as_ref().ok_or_else(|| {
            Error::authentication_error("the server reply did not include a client_auth proof")
        })?;
        auth::verify_server_proof(&options.secret_key, proof)?;

        let server_auth: ServerAuth = serde_json::from_value(reply.data).map_err(|err| {
            Error::invalid_response(format!("unexpected server auth shape: {err}"))
        })?;

        // The server emits one extra frame after the handshake reply; read it
        // and discard.
        read_handshake_frame(&mut stream, options.connect_timeout).await?;

        debug!(
            session_id = id,
            access_key = %server_auth.access_key,
            token_expire = ?server_auth.access_token_expire,
            "session authenticated to {}",
            address
        );

        Ok(Self {
            id,
            address,
            stream,
            options,
            server_auth: Some(server_auth),
            connected: true,
            pool: None,
        })
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    /// The credentials snapshot this session authenticated with.
    pub(crate) fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn server_auth(&self) -> Result<&ServerAuth> {
        self.server_auth
            .as_ref()
            .ok_or_else(|| Error::internal("session is missing its server authentication"))
    }

    /// Sends a single request frame. A network failure closes the session.
    pub(crate) async fn execute(&mut self, payload: serde_json::Value) -> Result<()> {
        if !self.connected {
            return Err(Error::internal("attempted to use a closed session"));
        }

        if let Err(err) = Message::new(payload).write_to(&mut self.stream).await {
            if err.is_network_error() {
                self.close().await;
            }
            return Err(err);
        }

        Ok(())
    }

    /// Reads and classifies the next response frame for an in-flight query.
    ///
    /// Returns `Ok(Some(data))` for a data frame and `Ok(None)` when the
    /// stream is done, either because the server sent the completion code or
    /// because a frame arrived without data. A frame that cannot be read or
    /// decoded is fatal: the session closes and the error surfaces. A
    /// server-reported error leaves the session usable, since the wire is
    /// still framed correctly.
    pub(crate) async fn read_response(
        &mut self,
        query_timeout: Option<Duration>,
    ) -> Result<Option<serde_json::Value>> {
        if !self.connected {
            return Err(Error::internal("attempted to read from a closed session"));
        }

        let message = match self.read_frame(query_timeout).await {
            Ok(message) => message,
            Err(err) => {
                self.close().await;
                return Err(err);
            }
        };

        let reply = match Reply::parse(message) {
            Ok(reply) => reply,
            Err(err) => {
                self.close().await;
                return Err(err);
            }
        };

        if reply.error {
            let message = reply.error_message();
            return Err(match reply.response_code {
                command::CLIENT_AUTH_ERROR | command::TOKEN_EXPIRED => {
                    Error::authentication_error(message)
                }
                code => Error::server_error(code, message),
            });
        }

        if reply.response_code == command::QUERY_COMPLETE || !reply.has_data() {
            return Ok(None);
        }

        Ok(Some(reply.data))
    }

    async fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Message> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, Message::read_from(&mut self.stream))
                .await
                .map_err(|_| Error::network_timeout())?,
            None => Message::read_from(&mut self.stream).await,
        }
    }

    /// Shuts down the session's write half and marks it closed. Idempotent.
    pub(crate) async fn close(&mut self) {
        if self.connected {
            self.connected = false;
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut self.stream).await;
            debug!(session_id = self.id, "session to {} closed", self.address);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) {
            pool.connection_dropped();
        }
    }
}

async fn read_handshake_frame(
    stream: &mut TcpStream,
    timeout: Option<Duration>,
) -> Result<Message> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, Message::read_from(stream))
            .await
            .map_err(|_| Error::network_timeout())?,
        None => Message::read_from(stream).await,
    }
}
