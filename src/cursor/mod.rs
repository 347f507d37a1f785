use std::{
    future::Future,
    mem,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures_core::Stream;

use crate::{
    cmap::{Connection, ConnectionPool},
    error::Result,
    BoxFuture,
};

/// A `QueryStream` streams the result of a select query. Rows are read from
/// the session lazily, one response frame per item, in the order the server
/// emits them.
///
/// The stream owns the session it reads from. When the server signals that
/// the response is complete, the session is returned to the pool and the
/// stream ends. If the server reports an error mid-stream, the error is
/// yielded and the session, whose framing is still intact, is returned to
/// the pool. An I/O failure or timeout closes the session and yields the
/// error; the session is not returned.
///
/// Dropping the stream before it is exhausted closes the session rather than
/// draining the remaining frames, since undrained frames would otherwise be
/// misread as responses to a later query.
///
/// The simplest way to consume the stream is to iterate with
/// [`next`](QueryStream::next):
///
/// ```rust,no_run
/// # use zteradb::{Client, Query, QueryResponse};
/// # async fn run(client: Client) -> zteradb::Result<()> {
/// let query = Query::new("users").select();
/// if let QueryResponse::Stream(mut rows) = client.run(&query).await? {
///     while let Some(row) = rows.next().await {
///         println!("{}", row?);
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// `QueryStream` also implements [`futures_core::Stream`], so the adapters
/// from `futures::StreamExt` all apply.
pub struct QueryStream {
    pool: ConnectionPool,
    query_timeout: Option<Duration>,
    state: StreamState,
}

enum StreamState {
    /// Holding the session between reads.
    Idle(Box<Connection>),

    /// A response-frame read is in flight.
    InFlight(BoxFuture<'static, (Box<Connection>, Result<Option<serde_json::Value>>)>),

    /// Terminal: the response completed, errored, or the stream was never
    /// given a session.
    Exhausted,
}

impl QueryStream {
    pub(crate) fn new(
        pool: ConnectionPool,
        conn: Connection,
        query_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            query_timeout,
            state: StreamState::Idle(Box::new(conn)),
        }
    }

    /// Advances the stream, returning the next row or `None` once the
    /// response is complete.
    pub async fn next(&mut self) -> Option<Result<serde_json::Value>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Drains the stream into a vector, stopping at the first error.
    pub async fn try_collect(mut self) -> Result<Vec<serde_json::Value>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("QueryStream").finish_non_exhaustive()
    }
}

impl Stream for QueryStream {
    type Item = Result<serde_json::Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match mem::replace(&mut this.state, StreamState::Exhausted) {
                StreamState::Exhausted => return Poll::Ready(None),

                StreamState::Idle(mut conn) => {
                    let query_timeout = this.query_timeout;
                    this.state = StreamState::InFlight(Box::pin(async move {
                        let result = conn.read_response(query_timeout).await;
                        (conn, result)
                    }));
                }

                StreamState::InFlight(mut future) => match future.as_mut().poll(cx) {
                    Poll::Pending => {
                        this.state = StreamState::InFlight(future);
                        return Poll::Pending;
                    }
                    Poll::Ready((conn, result)) => match result {
                        Ok(Some(row)) => {
                            this.state = StreamState::Idle(conn);
                            return Poll::Ready(Some(Ok(row)));
                        }
                        Ok(None) => {
                            this.pool.check_in(*conn);
                            return Poll::Ready(None);
                        }
                        Err(err) => {
                            // check_in destroys the session if the error
                            // closed it.
                            this.pool.check_in(*conn);
                            return Poll::Ready(Some(Err(err)));
                        }
                    },
                },
            }
        }
    }
}
