pub(crate) mod auth;
pub mod options;

use std::{sync::Arc, time::Duration};

use crate::{
    cmap::{conn::command, ConnectionPool},
    cursor::QueryStream,
    error::{Error, Result},
    query::Query,
};

use self::options::{ClientOptions, ServerAddress};

/// The entry point to the ZTeraDB client.
///
/// A `Client` owns a pool of authenticated sessions to a single server; a
/// session is leased from the pool for each query and returned when the
/// response completes. `Client` uses `std::sync::Arc` internally, so it can
/// be shared and cloned across tasks freely.
///
/// A `Client` must be created from within a Tokio runtime so the pool can
/// prewarm its minimum sessions in the background.
///
/// ```rust,no_run
/// # use zteradb::{Client, ClientOptions, Env};
/// # fn main() -> zteradb::Result<()> {
/// let options = ClientOptions::builder()
///     .client_key("2AKOHVT0VO81B9KSUJP8Q5PIKW")
///     .access_key("4SVOHVT0VO81B9KSUJP8Q4PIFS")
///     .secret_key("7fbb52c011ecafaa9a1d1b8683dd661c")
///     .database_id("db-main")
///     .env(Env::Dev)
///     .build();
/// let client = Client::new("db.zteradb.com", 7777, options)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    options: Arc<ClientOptions>,
    pool: ConnectionPool,
}

/// The result of [`Client::run`]: a single document for insert, update, and
/// delete queries, or a lazy row stream for selects.
#[derive(Debug)]
pub enum QueryResponse {
    /// The single result of a non-select query, e.g. a map carrying
    /// `last_insert_id`, `is_updated`, or `is_deleted`.
    Single(serde_json::Value),

    /// The lazily streamed rows of a select query.
    Stream(QueryStream),
}

impl QueryResponse {
    /// Unwraps the single result of a non-select query.
    pub fn into_single(self) -> Result<serde_json::Value> {
        match self {
            QueryResponse::Single(value) => Ok(value),
            QueryResponse::Stream(_) => Err(Error::invalid_query(
                "a select query returns a row stream, not a single result",
            )),
        }
    }

    /// Unwraps the row stream of a select query.
    pub fn into_stream(self) -> Result<QueryStream> {
        match self {
            QueryResponse::Stream(stream) => Ok(stream),
            QueryResponse::Single(_) => Err(Error::invalid_query(
                "a non-select query returns a single result, not a row stream",
            )),
        }
    }
}

impl Client {
    /// Validates the configuration and creates a client for the given server.
    /// The connection pool starts prewarming to its minimum size immediately.
    pub fn new(host: impl Into<String>, port: u16, options: ClientOptions) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Error::configuration("host must be a non-empty string"));
        }

        options.validate()?;

        let options = Arc::new(options);
        let address = ServerAddress::new(host, port);
        let pool = ConnectionPool::new(address, options.clone());

        Ok(Self {
            inner: Arc::new(ClientInner { options, pool }),
        })
    }

    /// Runs a query on a session leased from the pool.
    ///
    /// Select queries return [`QueryResponse::Stream`]; all other kinds wait
    /// for the server's single result and return [`QueryResponse::Single`].
    /// In both cases the session is returned to the pool once the response
    /// completes, or destroyed if its I/O failed.
    pub async fn run(&self, query: &Query) -> Result<QueryResponse> {
        self.execute(query, None).await
    }

    /// Like [`run`](Client::run), but bounds each response-frame read with
    /// `query_timeout`. A timeout closes the session and surfaces as an I/O
    /// timeout error.
    pub async fn run_with_timeout(
        &self,
        query: &Query,
        query_timeout: Duration,
    ) -> Result<QueryResponse> {
        self.execute(query, Some(query_timeout)).await
    }

    async fn execute(&self, query: &Query, query_timeout: Option<Duration>) -> Result<QueryResponse> {
        // Build errors surface before any session is leased.
        let document = query.generate()?;

        let mut conn = self.inner.pool.acquire().await?;

        let payload = command::query_command(document, conn.options(), conn.server_auth()?);
        if let Err(err) = conn.execute(payload).await {
            // The send failed, so the session closed itself; check_in
            // destroys it.
            self.inner.pool.check_in(conn);
            return Err(err);
        }

        let mut stream = QueryStream::new(self.inner.pool.clone(), conn, query_timeout);

        if query.is_select() {
            return Ok(QueryResponse::Stream(stream));
        }

        let first = match stream.next().await {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => return Err(err),
            None => None,
        };

        // Drain to the completion frame so the session goes back to the pool
        // in a known-good state.
        while let Some(row) = stream.next().await {
            row?;
        }

        let value = first.ok_or_else(|| {
            Error::invalid_response("the server completed the response without returning a result")
        })?;

        Ok(QueryResponse::Single(value))
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Closes the pool and every idle session in it. Sessions currently
    /// leased out are destroyed as they are returned.
    pub async fn shutdown(self) {
        self.inner.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }
}
