//! Query results: the bridge between the wire-level handler callbacks and
//! the facade's lazy, Transformer-decoded row access.
//!
//! `CollectRawHandler` implements both [`TextHandler`] and [`BinaryHandler`]
//! by buffering raw row bytes rather than decoding them eagerly — decoding
//! happens later, per row, through the Transformer when the caller actually
//! calls `fetchone()`. This mirrors spec.md §2's control-flow note:
//! "incoming rows are parked unparsed until the user fetches them."

use crate::error::{Result, ServerError};
use crate::handler::{BinaryHandler, CopyKind, TextHandler};
use crate::protocol::backend::query::{CommandComplete, DataRow, RowDescription};
use crate::protocol::types::{FormatCode, Oid};

/// A column's descriptor, copied out of the borrowed `RowDescription` so it
/// can outlive the handler callback that produced it.
#[derive(Debug, Clone)]
pub struct OwnedColumn {
    pub name: String,
    pub type_oid: Oid,
    pub format: FormatCode,
}

/// Execution status of one result set, mirroring spec.md §4.9's
/// `_execute_results` status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    TuplesOk,
    CommandOk,
    EmptyQueryResponse,
    CopyIn,
    CopyOut,
    CopyBoth,
}

impl ResultStatus {
    /// True for any of the COPY sub-protocol statuses — `execute()` rejects
    /// these rather than treating them as a normal result set.
    pub fn is_copy(self) -> bool {
        matches!(
            self,
            ResultStatus::CopyIn | ResultStatus::CopyOut | ResultStatus::CopyBoth
        )
    }
}

impl From<CopyKind> for ResultStatus {
    fn from(kind: CopyKind) -> Self {
        match kind {
            CopyKind::In => ResultStatus::CopyIn,
            CopyKind::Out => ResultStatus::CopyOut,
            CopyKind::Both => ResultStatus::CopyBoth,
        }
    }
}

/// One server result set: a `SELECT`'s rows, or a DML command's tag.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub status: Option<ResultStatus>,
    pub columns: Vec<OwnedColumn>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
    pub command_tag: Option<String>,
    pub rows_affected: Option<u64>,
}

/// The full outcome of one `execute`: zero or more result sets (one per
/// semicolon-separated statement for a simple query), and the server error
/// that ended the sequence, if any.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub results: Vec<ResultSet>,
    pub server_error: Option<ServerError>,
}

impl QueryResult {
    /// The result currently selected by `nextset`-style navigation — here,
    /// simply the first one; the Cursor tracks the active index itself.
    pub fn first(&self) -> Option<&ResultSet> {
        self.results.first()
    }
}

/// Handler that buffers rows as owned byte vectors instead of decoding
/// them, so the facade can defer per-row decode to the Transformer.
#[derive(Debug, Default)]
pub struct CollectRawHandler {
    results: Vec<ResultSet>,
    current_columns: Option<Vec<OwnedColumn>>,
    current_rows: Vec<Vec<Option<Vec<u8>>>>,
    server_error: Option<ServerError>,
}

impl CollectRawHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the handler, producing the accumulated [`QueryResult`].
    pub fn into_result(mut self) -> QueryResult {
        self.flush_pending_tuples_ok();
        QueryResult {
            results: self.results,
            server_error: self.server_error,
        }
    }

    /// `result_start` without a following `result_end` (e.g. the state
    /// machine stopped mid-stream) still needs its buffered rows surfaced;
    /// called defensively from `into_result`.
    fn flush_pending_tuples_ok(&mut self) {
        if let Some(columns) = self.current_columns.take() {
            self.results.push(ResultSet {
                status: Some(ResultStatus::TuplesOk),
                columns,
                rows: std::mem::take(&mut self.current_rows),
                command_tag: None,
                rows_affected: None,
            });
        }
    }

    fn owned_columns(cols: &RowDescription<'_>) -> Vec<OwnedColumn> {
        cols.iter()
            .map(|field| OwnedColumn {
                name: field.name.to_string(),
                type_oid: field.type_oid(),
                format: field.format(),
            })
            .collect()
    }

    fn owned_row(row: &DataRow<'_>) -> Vec<Option<Vec<u8>>> {
        row.iter().map(|value| value.map(<[u8]>::to_vec)).collect()
    }

    fn finish_result_end(&mut self, complete: &CommandComplete<'_>) {
        let columns = self.current_columns.take();
        let rows = std::mem::take(&mut self.current_rows);
        let status = if columns.is_some() {
            ResultStatus::TuplesOk
        } else {
            ResultStatus::CommandOk
        };
        self.results.push(ResultSet {
            status: Some(status),
            columns: columns.unwrap_or_default(),
            rows,
            command_tag: Some(complete.tag.to_string()),
            rows_affected: complete.rows_affected(),
        });
    }
}

impl TextHandler for CollectRawHandler {
    fn result_start(&mut self, cols: RowDescription<'_>) -> Result<()> {
        self.current_columns = Some(Self::owned_columns(&cols));
        Ok(())
    }

    fn row(&mut self, _cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()> {
        self.current_rows.push(Self::owned_row(&row));
        Ok(())
    }

    fn result_end(&mut self, complete: CommandComplete<'_>) -> Result<()> {
        self.finish_result_end(&complete);
        Ok(())
    }

    fn empty_query(&mut self) -> Result<()> {
        self.results.push(ResultSet {
            status: Some(ResultStatus::EmptyQueryResponse),
            ..ResultSet::default()
        });
        Ok(())
    }

    fn server_error(&mut self, err: ServerError) -> Result<()> {
        self.server_error = Some(err);
        Ok(())
    }

    fn copy_response(&mut self, kind: CopyKind) -> Result<()> {
        self.results.push(ResultSet {
            status: Some(kind.into()),
            ..ResultSet::default()
        });
        Ok(())
    }
}

impl BinaryHandler for CollectRawHandler {
    fn result_start(&mut self, cols: RowDescription<'_>) -> Result<()> {
        self.current_columns = Some(Self::owned_columns(&cols));
        Ok(())
    }

    fn row(&mut self, _cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()> {
        self.current_rows.push(Self::owned_row(&row));
        Ok(())
    }

    fn result_end(&mut self, complete: CommandComplete<'_>) -> Result<()> {
        self.finish_result_end(&complete);
        Ok(())
    }

    fn empty_query(&mut self) -> Result<()> {
        self.results.push(ResultSet {
            status: Some(ResultStatus::EmptyQueryResponse),
            ..ResultSet::default()
        });
        Ok(())
    }

    fn server_error(&mut self, err: ServerError) -> Result<()> {
        self.server_error = Some(err);
        Ok(())
    }

    fn copy_response(&mut self, kind: CopyKind) -> Result<()> {
        self.results.push(ResultSet {
            status: Some(kind.into()),
            ..ResultSet::default()
        });
        Ok(())
    }
}
