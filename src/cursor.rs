//! The untyped cursor facade.
//!
//! Grounded on `psycopg3/cursor.py`'s `BaseCursor`: one cursor borrows its
//! connection for the lifetime of one `execute`, rewrites the query through
//! the same `%s`/`%(name)s` convention, and exposes decoded rows one at a
//! time rather than materializing the whole result set up front.

use std::any::Any;
use std::sync::Arc;

use crate::connection::Connection;
use crate::conversion::ToWireValue;
use crate::error::{DriverError, DriverResult};
use crate::preparer;
use crate::registry::{LoadFn, Registry};
use crate::result::{CollectRawHandler, QueryResult, ResultSet, ResultStatus};
use crate::transformer::Transformer;

/// Query parameters, supplied either positionally (`%s`) or by name
/// (`%(name)s`) — never both in the same call.
pub enum Params {
    Positional(Vec<Box<dyn ToWireValue>>),
    Named(Vec<(String, Box<dyn ToWireValue>)>),
}

impl Params {
    pub fn positional(values: Vec<Box<dyn ToWireValue>>) -> Self {
        Params::Positional(values)
    }

    pub fn named(values: Vec<(String, Box<dyn ToWireValue>)>) -> Self {
        Params::Named(values)
    }
}

/// One decoded column value: `None` for SQL NULL.
pub type Field = Option<Box<dyn Any>>;

/// A cursor sharing a connection, used to run one query at a time and walk
/// its (possibly multiple, for a simple-query batch) result sets.
pub struct Cursor {
    connection: Connection,
    registry: Registry,
    binary: bool,
    result: Option<QueryResult>,
    result_index: usize,
    row_index: usize,
    row_loaders: Option<Vec<Option<Arc<LoadFn>>>>,
}

impl Cursor {
    pub(crate) fn new(connection: Connection, binary: bool) -> Self {
        Self {
            connection,
            registry: Registry::new(),
            binary,
            result: None,
            result_index: 0,
            row_index: 0,
            row_loaders: None,
        }
    }

    /// This cursor's adapter overlay, consulted ahead of the connection's
    /// and the global registry.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    fn reset(&mut self) {
        self.result = None;
        self.result_index = 0;
        self.row_index = 0;
        self.row_loaders = None;
    }

    /// Rewrite and run one query, replacing whatever this cursor last ran.
    pub fn execute(&mut self, sql: &str, params: Option<Params>) -> DriverResult<&mut Self> {
        self.reset();

        let has_params = params.is_some();
        let prepared = preparer::prepare(sql, has_params)?;

        let ordered_values: Option<Vec<Box<dyn ToWireValue>>> = match params {
            None => None,
            Some(Params::Positional(values)) => {
                if values.len() != prepared.names.len() {
                    return Err(DriverError::Programming(format!(
                        "expected {} parameters, got {}",
                        prepared.names.len(),
                        values.len()
                    )));
                }
                Some(values)
            }
            Some(Params::Named(named)) => {
                let mut remaining = named;
                let mut ordered = Vec::with_capacity(prepared.names.len());
                for name in &prepared.names {
                    let pos = remaining.iter().position(|(n, _)| n == name).ok_or_else(|| {
                        DriverError::Programming(format!(
                            "no value supplied for named parameter '{name}'"
                        ))
                    })?;
                    let (_, value) = remaining.remove(pos);
                    ordered.push(value);
                }
                Some(ordered)
            }
        };

        let binary = self.binary;
        let mut handler = CollectRawHandler::new();

        self.connection.with_conn_mut(|conn, _registry| match ordered_values {
            None => {
                if binary {
                    conn.exec(prepared.sql.as_str(), Vec::<Box<dyn ToWireValue>>::new(), &mut handler)
                        .map_err(DriverError::from)
                } else {
                    conn.query(prepared.sql.as_str(), &mut handler)
                        .map_err(DriverError::from)
                }
            }
            Some(values) => conn
                .exec(prepared.sql.as_str(), values, &mut handler)
                .map_err(DriverError::from),
        })?;

        let query_result = handler.into_result();
        if let Some(server_error) = query_result.server_error {
            return Err(DriverError::database(server_error));
        }
        if query_result
            .results
            .iter()
            .any(|r| r.status.is_some_and(ResultStatus::is_copy))
        {
            return Err(DriverError::Programming(
                "COPY is not supported through execute(); use copy() instead".into(),
            ));
        }
        if query_result.results.is_empty() {
            return Err(DriverError::Internal(
                "query execution produced no result sets".into(),
            ));
        }

        self.result = Some(query_result);
        Ok(self)
    }

    fn current_result(&self) -> DriverResult<&ResultSet> {
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| DriverError::Programming("no query has been executed yet".into()))?;
        result.results.get(self.result_index).ok_or_else(|| {
            DriverError::Programming("no result set selected; call nextset() first".into())
        })
    }

    /// The execution status of the currently selected result set.
    pub fn status(&self) -> DriverResult<ResultStatus> {
        self.current_result()?
            .status
            .ok_or_else(|| DriverError::Internal("result set has no status".into()))
    }

    /// The row count DML reports, or the number of rows fetched so far for
    /// a `SELECT`.
    pub fn rows_affected(&self) -> DriverResult<Option<u64>> {
        Ok(self.current_result()?.rows_affected)
    }

    fn ensure_row_loaders(&mut self) -> DriverResult<()> {
        if self.row_loaders.is_some() {
            return Ok(());
        }
        let descriptors: Vec<_> = self
            .current_result()?
            .columns
            .iter()
            .map(|c| (c.type_oid, c.format))
            .collect();

        let loaders = self.connection.with_conn_mut(|_conn, connection_registry| {
            let mut transformer = Transformer::new(&self.registry, connection_registry);
            transformer.set_row_types(&descriptors);
            Ok(transformer.into_row_loaders())
        })?;
        self.row_loaders = Some(loaders);
        Ok(())
    }

    /// Fetch and decode the next row of the current result set, or `None`
    /// once it is exhausted.
    pub fn fetchone(&mut self) -> DriverResult<Option<Vec<Field>>> {
        self.ensure_row_loaders()?;

        let row_index = self.row_index;
        let raw_row = match self.current_result()?.rows.get(row_index) {
            None => return Ok(None),
            Some(row) => row.clone(),
        };
        self.row_index += 1;

        let loaders = self
            .row_loaders
            .as_ref()
            .expect("ensure_row_loaders just populated this");

        raw_row
            .into_iter()
            .zip(loaders)
            .map(|(value, loader)| match value {
                None => Ok(None),
                Some(bytes) => {
                    let loader = loader.as_ref().ok_or_else(|| {
                        DriverError::Internal("no loader registered for a non-NULL column".into())
                    })?;
                    loader(&bytes).map(Some).map_err(DriverError::from)
                }
            })
            .collect::<DriverResult<Vec<Field>>>()
            .map(Some)
    }

    /// Fetch every remaining row of the current result set.
    pub fn fetchall(&mut self) -> DriverResult<Vec<Vec<Field>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Advance to the next result set of a multi-statement simple query.
    /// Returns `false` once there are no more.
    pub fn nextset(&mut self) -> DriverResult<bool> {
        let has_more = {
            let result = self
                .result
                .as_ref()
                .ok_or_else(|| DriverError::Programming("no query has been executed yet".into()))?;
            self.result_index + 1 < result.results.len()
        };
        if has_more {
            self.result_index += 1;
            self.row_index = 0;
            self.row_loaders = None;
        }
        Ok(has_more)
    }

    /// Release this cursor's hold on its connection. The connection itself
    /// stays open; other cursors sharing it are unaffected.
    pub fn close(self) {}
}

/// A server-side named cursor (`DECLARE ... CURSOR FOR ...`), for result
/// sets too large to buffer client-side.
///
/// Scoped down from a full partial-fetch API: it shares `Cursor::execute`'s
/// parameter rewriting and decoding path, naming the portal on the wire so
/// repeated `FETCH n FROM name` calls can be driven the same way a `Cursor`
/// drives a portal-less query.
pub struct NamedCursor {
    name: String,
    inner: Cursor,
}

impl NamedCursor {
    pub(crate) fn new(name: String, connection: Connection, binary: bool) -> Self {
        Self {
            name,
            inner: Cursor::new(connection, binary),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `DECLARE name CURSOR FOR <sql>`.
    pub fn declare(&mut self, sql: &str, params: Option<Params>) -> DriverResult<()> {
        let declare_sql = format!("DECLARE {} CURSOR FOR {}", self.name, sql);
        self.inner.execute(&declare_sql, params)?;
        Ok(())
    }

    /// `FETCH n FROM name`.
    pub fn fetch(&mut self, n: u32) -> DriverResult<Vec<Vec<Field>>> {
        let fetch_sql = format!("FETCH {n} FROM {}", self.name);
        self.inner.execute(&fetch_sql, None)?;
        self.inner.fetchall()
    }

    /// `CLOSE name`.
    pub fn close(mut self) -> DriverResult<()> {
        let close_sql = format!("CLOSE {}", self.name);
        self.inner.execute(&close_sql, None)?;
        Ok(())
    }
}
