pub(crate) mod conn;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use tokio::sync::Notify;
use tracing::{debug, warn};

pub(crate) use self::conn::Connection;
use crate::{
    client::options::{ClientOptions, ServerAddress},
    error::{Error, Result},
};

const DEFAULT_WAIT_QUEUE_TIMEOUT: Duration = Duration::from_secs(10);

/// A pool of authenticated sessions, checked out in FIFO order. All state is
/// kept internally in an `Arc`, so the pool is cheap to clone and share.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
pub(crate) struct PoolInner {
    address: ServerAddress,
    options: Arc<ClientOptions>,

    /// The maximum number of live sessions, counting leased ones. 0 disables
    /// enforcement and the pool grows on demand.
    max_pool_size: u32,

    /// How long `acquire` may wait for a session when the pool is at
    /// `max_pool_size`.
    wait_queue_timeout: Duration,

    state: Mutex<PoolState>,
    next_connection_id: AtomicU32,
    closed: AtomicBool,

    /// Waiters blocked on the pool being at maximum size; notified whenever a
    /// session is checked in or destroyed.
    wait_queue: Notify,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Idle sessions. FIFO: check-in pushes to the back, acquire pops from
    /// the front.
    connections: VecDeque<Connection>,

    /// The number of live sessions, including leased ones and connects in
    /// progress.
    total_connection_count: u32,
}

impl ConnectionPool {
    /// Creates the pool and launches the concurrent prewarm to
    /// `min_pool_size` sessions.
    pub(crate) fn new(address: ServerAddress, options: Arc<ClientOptions>) -> Self {
        let pool_options = &options.pool_options;
        let min_pool_size = pool_options.min_pool_size;

        let inner = PoolInner {
            address,
            max_pool_size: pool_options.max_pool_size,
            wait_queue_timeout: pool_options
                .wait_queue_timeout
                .unwrap_or(DEFAULT_WAIT_QUEUE_TIMEOUT),
            options,
            state: Mutex::new(PoolState::default()),
            next_connection_id: AtomicU32::new(1),
            closed: AtomicBool::new(false),
            wait_queue: Notify::new(),
        };

        let pool = Self {
            inner: Arc::new(inner),
        };

        pool.prewarm(min_pool_size);

        pool
    }

    /// Opens `min_pool_size` sessions concurrently, pushing each into the
    /// pool as its handshake completes. Failures are logged and skipped; the
    /// pool still comes up and grows on demand.
    fn prewarm(&self, min_pool_size: u32) {
        if min_pool_size == 0 {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("connection pool prewarm skipped: no async runtime is running");
                return;
            }
        };

        for _ in 0..min_pool_size {
            let pool = self.clone();
            handle.spawn(async move {
                match pool.establish_connection().await {
                    Ok(conn) => pool.check_in(conn),
                    Err(err) => {
                        warn!(error = %err, "failed to open a session while prewarming the pool")
                    }
                }
            });
        }
    }

    /// Checks a session out of the pool.
    ///
    /// Pops the oldest idle session if one is available; otherwise opens a
    /// fresh one, unless the pool is at `max_pool_size`, in which case the
    /// caller waits (bounded by the wait queue timeout) for a session to be
    /// returned.
    pub(crate) async fn acquire(&self) -> Result<Connection> {
        let start = Instant::now();

        loop {
            // Register interest before re-checking state so a check-in
            // between the check and the await cannot be missed.
            let notified = self.inner.wait_queue.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let should_open = {
                let mut state = self.inner.state.lock().unwrap();

                if self.inner.closed.load(Ordering::SeqCst) {
                    return Err(Error::internal("the connection pool has been closed"));
                }

                if let Some(conn) = state.connections.pop_front() {
                    return Ok(conn);
                }

                if self.inner.max_pool_size == 0
                    || state.total_connection_count < self.inner.max_pool_size
                {
                    // Reserve the slot under the lock so concurrent acquires
                    // cannot overshoot the maximum.
                    state.total_connection_count += 1;
                    true
                } else {
                    false
                }
            };

            if should_open {
                return self.open_connection().await;
            }

            let remaining = match self.inner.wait_queue_timeout.checked_sub(start.elapsed()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Err(Error::wait_queue_timeout(self.inner.address.clone())),
            };
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// Opens a session for a slot that has already been reserved in
    /// `total_connection_count`.
    async fn open_connection(&self) -> Result<Connection> {
        let id = self.inner.next_connection_id.fetch_add(1, Ordering::SeqCst);

        match Connection::connect(id, self.inner.address.clone(), self.inner.options.clone()).await
        {
            Ok(mut conn) => {
                conn.pool = Some(Arc::downgrade(&self.inner));
                debug!(session_id = id, "established session to {}", self.inner.address);
                Ok(conn)
            }
            Err(err) => {
                self.inner.connection_dropped();
                Err(err)
            }
        }
    }

    async fn establish_connection(&self) -> Result<Connection> {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.total_connection_count += 1;
        }
        self.open_connection().await
    }

    /// Returns a session to the pool. Dead sessions and sessions returned
    /// after the pool has closed are destroyed instead.
    pub(crate) fn check_in(&self, conn: Connection) {
        if !conn.is_connected() {
            debug!(
                session_id = conn.id(),
                "destroying a dead session instead of returning it to the pool"
            );
            drop(conn);
            return;
        }

        if self.inner.closed.load(Ordering::SeqCst) {
            debug!(
                session_id = conn.id(),
                "destroying a session returned after pool shutdown"
            );
            drop(conn);
            return;
        }

        let mut state = self.inner.state.lock().unwrap();
        state.connections.push_back(conn);
        drop(state);
        self.inner.wait_queue.notify_waiters();
    }

    /// Drains the pool and closes every idle session. Leased sessions are
    /// destroyed as they are returned. Idempotent.
    pub(crate) async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        let connections: Vec<Connection> = {
            let mut state = self.inner.state.lock().unwrap();
            state.connections.drain(..).collect()
        };

        for mut conn in connections {
            conn.close().await;
        }

        self.inner.wait_queue.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn available_connection_count(&self) -> usize {
        self.inner.state.lock().unwrap().connections.len()
    }

    #[cfg(test)]
    pub(crate) fn total_connection_count(&self) -> u32 {
        self.inner.state.lock().unwrap().total_connection_count
    }
}

impl PoolInner {
    /// Called from `Connection::drop` so that leaked, discarded, and drained
    /// sessions all keep the live count accurate and wake any waiters.
    fn connection_dropped(&self) {
        let mut state = self.state.lock().unwrap();
        state.total_connection_count = state.total_connection_count.saturating_sub(1);
        drop(state);
        self.wait_queue.notify_waiters();
    }
}
