//! Connection facade: the exclusion-locked, cloneable handle `Cursor`s
//! execute through.
//!
//! Grounded on `psycopg3/connection.py`'s `BaseConnection` (one PGconn per
//! process, one `Transformer`-bearing cursor borrowing it at a time) and on
//! the teacher's `sync::Conn`. The "exclusion lock" spec.md §3/§5 describe
//! is a plain [`Mutex`] here: multiple `Cursor`s can hold an `Arc`-shared
//! `Connection`, and Rust's static borrow checker cannot enforce
//! single-in-flight access across that dynamic sharing, so it falls to
//! runtime locking the way it would in any other language without a
//! compile-time aliasing story for shared mutable state.

use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{DriverError, DriverResult};
use crate::opts::Opts;
use crate::protocol::frontend::write_cancel_request;
use crate::protocol::types::TransactionStatus;
use crate::registry::Registry;
use crate::sync::Conn as SyncConn;

use crate::cursor::{Cursor, NamedCursor};

/// The process id/secret key pair needed to cancel a running query on this
/// connection from a second, transient connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelToken {
    pub pid: u32,
    pub secret: u32,
}

pub(crate) struct ConnInner {
    /// `None` once `Connection::close` has run; every subsequent operation
    /// raises `DriverError::Interface` rather than panicking.
    conn: Option<SyncConn>,
    pub(crate) registry: Registry,
}

/// A PostgreSQL connection, shared (via `Arc`) by every `Cursor` created
/// from it.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Mutex<ConnInner>>,
}

impl Connection {
    /// Connect using a `postgres://` DSN string.
    pub fn connect(dsn: &str) -> DriverResult<Self> {
        let opts = Opts::try_from(dsn).map_err(DriverError::from)?;
        Self::connect_with_opts(opts)
    }

    /// Connect using an already-resolved [`Opts`]. The concrete entry point
    /// `connect(dsn)` is a convenience layered on top of this.
    pub fn connect_with_opts(opts: Opts) -> DriverResult<Self> {
        crate::builtins::install();
        let conn = SyncConn::new(opts).map_err(DriverError::from)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(ConnInner {
                conn: Some(conn),
                registry: Registry::new(),
            })),
        })
    }

    /// Create a cursor sharing this connection. `binary` selects whether a
    /// parameterless `execute` still goes through the extended protocol to
    /// request binary-format results, rather than the default simple-query
    /// (always text) path.
    pub fn cursor(&self, binary: bool) -> Cursor {
        Cursor::new(self.clone(), binary)
    }

    /// Create a server-side named cursor sharing this connection, for
    /// results too large to buffer client-side via `DECLARE`/`FETCH`.
    pub fn named_cursor(&self, name: impl Into<String>, binary: bool) -> NamedCursor {
        NamedCursor::new(name.into(), self.clone(), binary)
    }

    pub fn transaction_status(&self) -> DriverResult<TransactionStatus> {
        self.with_conn_mut(|conn, _| Ok(conn.transaction_status()))
    }

    pub fn in_transaction(&self) -> DriverResult<bool> {
        self.with_conn_mut(|conn, _| Ok(conn.in_transaction()))
    }

    /// The cancellation key for this connection's backend process, usable
    /// from a second transient connection via [`cancel`].
    pub fn cancel_token(&self) -> DriverResult<CancelToken> {
        self.with_conn_mut(|conn, _| {
            let key = conn.backend_key().ok_or_else(|| {
                DriverError::Operational("no backend key; cancellation unavailable".into())
            })?;
            Ok(CancelToken {
                pid: key.process_id(),
                secret: key.secret(),
            })
        })
    }

    /// `COMMIT`, a no-op when the transaction status is already `Idle`.
    pub fn commit(&self) -> DriverResult<()> {
        self.run_transaction_boundary("COMMIT")
    }

    /// `ROLLBACK`, a no-op when the transaction status is already `Idle`.
    pub fn rollback(&self) -> DriverResult<()> {
        self.run_transaction_boundary("ROLLBACK")
    }

    fn run_transaction_boundary(&self, sql: &str) -> DriverResult<()> {
        self.with_conn_mut(|conn, _| {
            if conn.transaction_status() == TransactionStatus::Idle {
                return Ok(());
            }
            conn.query_drop(sql).map_err(DriverError::from)?;
            Ok(())
        })
    }

    /// Close the transport and move the connection to its terminal state.
    /// Idempotent: closing twice is a no-op on the second call.
    pub fn close(&self) -> DriverResult<()> {
        let mut guard = self.lock()?;
        match guard.conn.take() {
            Some(conn) => conn.close().map_err(DriverError::from),
            None => Ok(()),
        }
    }

    pub(crate) fn lock(&self) -> DriverResult<MutexGuard<'_, ConnInner>> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Acquire the exclusion lock and run `f` against the live connection
    /// and its registry overlay. Fails with `DriverError::Interface` if the
    /// connection has already been closed.
    pub(crate) fn with_conn_mut<R>(
        &self,
        f: impl FnOnce(&mut SyncConn, &Registry) -> DriverResult<R>,
    ) -> DriverResult<R> {
        let mut guard = self.lock()?;
        let ConnInner { conn, registry } = &mut *guard;
        let conn = conn
            .as_mut()
            .ok_or_else(|| DriverError::Operational("connection is closed".into()))?;
        f(conn, registry)
    }
}

/// Issue an out-of-band cancel request for a running query, per spec.md
/// §4.3/§5: opens a second transient connection to the same server, sends
/// `CancelRequest` on the cancel key, and closes. The server never replies
/// to this request; success just means the bytes went out.
pub fn cancel(opts: &Opts, token: CancelToken) -> DriverResult<()> {
    let mut buf = Vec::new();
    write_cancel_request(&mut buf, token.pid, token.secret);

    use std::io::Write;
    if let Some(socket_path) = &opts.socket {
        let mut stream = UnixStream::connect(socket_path)
            .map_err(|e| DriverError::Operational(format!("cancel connect failed: {e}")))?;
        stream
            .write_all(&buf)
            .map_err(|e| DriverError::Operational(format!("cancel send failed: {e}")))?;
    } else {
        let addr = format!("{}:{}", opts.host, opts.port);
        let mut stream = TcpStream::connect(&addr)
            .map_err(|e| DriverError::Operational(format!("cancel connect failed: {e}")))?;
        stream
            .write_all(&buf)
            .map_err(|e| DriverError::Operational(format!("cancel send failed: {e}")))?;
    }
    Ok(())
}
