use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use serde::Deserialize;

use crate::{
    client::auth::AuthProof,
    error::{Error, Result},
};

/// The maximum payload a single frame can carry: the length prefix is an
/// unsigned 16-bit big-endian integer.
pub(crate) const MAX_MESSAGE_LENGTH: usize = u16::MAX as usize;

/// A single framed protocol message: a 2-byte big-endian length prefix
/// followed by that many bytes of UTF-8 JSON.
#[derive(Clone, Debug)]
pub(crate) struct Message {
    payload: serde_json::Value,
}

impl Message {
    pub(crate) fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    pub(crate) fn into_payload(self) -> serde_json::Value {
        self.payload
    }

    /// Reads a message from `reader`: exactly two length bytes, then exactly
    /// that many payload bytes. A short read at either step is an I/O error,
    /// which callers treat as fatal to the session.
    pub(crate) async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let length = reader.read_u16().await? as usize;

        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).await?;

        let payload = serde_json::from_slice(&payload).map_err(|err| {
            Error::invalid_response(format!("malformed frame payload: {err}"))
        })?;

        Ok(Self { payload })
    }

    /// Serializes the message and writes the header and payload as a single
    /// write, so concurrent writers on other sessions cannot interleave
    /// within a frame.
    pub(crate) async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let payload = serde_json::to_vec(&self.payload)
            .map_err(|err| Error::internal(format!("failed to encode frame payload: {err}")))?;

        if payload.len() > MAX_MESSAGE_LENGTH {
            return Err(Error::invalid_query(format!(
                "message of {} bytes exceeds the maximum frame size of {} bytes",
                payload.len(),
                MAX_MESSAGE_LENGTH
            )));
        }

        let mut frame = Vec::with_capacity(2 + payload.len());
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(&payload);

        writer.write_all(&frame).await?;
        writer.flush().await?;

        Ok(())
    }
}

/// The shape every server frame decodes to.
#[derive(Debug, Deserialize)]
pub(crate) struct Reply {
    pub(crate) error: bool,
    pub(crate) response_code: i32,
    #[serde(default)]
    pub(crate) client_auth: Option<AuthProof>,
    #[serde(default)]
    pub(crate) data: serde_json::Value,
}

impl Reply {
    pub(crate) fn parse(message: Message) -> Result<Self> {
        serde_json::from_value(message.into_payload())
            .map_err(|err| Error::invalid_response(format!("unexpected reply shape: {err}")))
    }

    /// The reply's `data` member flattened to an error message: strings are
    /// taken as-is, anything else is rendered as compact JSON.
    pub(crate) fn error_message(&self) -> String {
        match &self.data {
            serde_json::Value::String(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the `data` member carries anything for the caller. An empty
    /// frame marks the end of a response stream.
    pub(crate) fn has_data(&self) -> bool {
        match &self.data {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
            _ => true,
        }
    }
}
