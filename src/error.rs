//! Error types.
//!
//! Two layers: [`Error`] is the wire/protocol-level error produced by the
//! codec and state machines (it knows about bytes, not SQL semantics).
//! [`DriverError`] is the public taxonomy the Cursor/Connection facade
//! raises, built by classifying an [`Error`] (and, for server errors, the
//! SQLSTATE class of the [`ServerError`] it carries).

use thiserror::Error as ThisError;

/// Result type for wire/protocol-level operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Result type for facade-level operations.
pub type DriverResult<T> = core::result::Result<T, DriverError>;

/// PostgreSQL error field type codes (`ErrorResponse`/`NoticeResponse`).
pub mod field_type {
    pub const SEVERITY: u8 = b'S';
    pub const SEVERITY_NON_LOCALIZED: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const INTERNAL_POSITION: u8 = b'p';
    pub const INTERNAL_QUERY: u8 = b'q';
    pub const WHERE: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// Parsed `ErrorResponse`/`NoticeResponse` diagnostic fields.
#[derive(Debug, Clone, Default)]
pub struct ServerError {
    pub severity: Option<String>,
    pub severity_non_localized: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<u32>,
    pub internal_position: Option<u32>,
    pub internal_query: Option<String>,
    pub where_: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub data_type: Option<String>,
    pub constraint: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub routine: Option<String>,
}

impl ServerError {
    /// Severity: prefers the non-localized field (PostgreSQL 9.6+), falls
    /// back to the localized one.
    pub fn severity(&self) -> &str {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
            .unwrap_or_default()
    }

    /// SQLSTATE error code (5 characters).
    pub fn code(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }

    /// Primary error message.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn position(&self) -> Option<u32> {
        self.position
    }

    pub fn internal_position(&self) -> Option<u32> {
        self.internal_position
    }

    pub fn internal_query(&self) -> Option<&str> {
        self.internal_query.as_deref()
    }

    pub fn where_(&self) -> Option<&str> {
        self.where_.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn routine(&self) -> Option<&str> {
        self.routine.as_deref()
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (SQLSTATE {})",
            self.severity(),
            self.message(),
            self.code()
        )?;
        if let Some(detail) = self.detail() {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

/// Wire/protocol-level error.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Server sent an `ErrorResponse`.
    #[error("PostgreSQL error: {0}")]
    Server(ServerError),

    /// Malformed message or unexpected response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication negotiation failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// TLS negotiation failed.
    #[cfg(any(feature = "sync-tls", feature = "tokio-tls"))]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// The connection is broken and cannot be reused.
    #[error("connection is broken")]
    ConnectionBroken,

    /// Caller misused the API (cursor/connection lifecycle).
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// Requested behavior is not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Failed to decode a value from wire format.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    pub fn type_mismatch(
        src_oid: crate::protocol::types::Oid,
        target_oid: crate::protocol::types::Oid,
    ) -> Self {
        Error::Decode(format!(
            "cannot encode natural oid {src_oid} as target oid {target_oid}"
        ))
    }

    pub fn overflow(from: &str, to: &str) -> Self {
        Error::Decode(format!("{from} value does not fit in {to}"))
    }

    /// True if the connection should be considered dead after this error.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionBroken => true,
            Error::Server(err) => matches!(err.severity(), "FATAL" | "PANIC"),
            _ => false,
        }
    }

    /// SQLSTATE code, if this wraps a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(err) => Some(err.code()),
            _ => None,
        }
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

/// SQLSTATE class, coarse grouping used to pick a [`DriverError::Database`]
/// subclass. Grounded in psycopg3's `exc.class_for_state` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStateClass {
    IntegrityError,
    DataError,
    SerializationFailure,
    NotSupportedError,
    InsufficientPrivilege,
    ConnectionException,
    InvalidAuthorizationSpecification,
    Other,
}

/// Classify a SQLSTATE code into a coarse error class.
///
/// `40001` (serialization_failure) is matched exactly because it is the one
/// code applications branch on for retry logic; everything else is matched
/// by its two-character class prefix.
pub fn class_for_state(code: &str) -> SqlStateClass {
    if code == "40001" {
        return SqlStateClass::SerializationFailure;
    }
    if code.starts_with("42501") {
        return SqlStateClass::InsufficientPrivilege;
    }
    match code.get(0..2) {
        Some("23") => SqlStateClass::IntegrityError,
        Some("22") => SqlStateClass::DataError,
        Some("0A") => SqlStateClass::NotSupportedError,
        Some("08") => SqlStateClass::ConnectionException,
        Some("28") => SqlStateClass::InvalidAuthorizationSpecification,
        _ => SqlStateClass::Other,
    }
}

/// Public error taxonomy surfaced by the Cursor/Connection facade.
#[derive(Debug, ThisError)]
pub enum DriverError {
    /// Transport failure, connection closed, authentication failure,
    /// cancellation without reconnect.
    #[error("operational error: {0}")]
    Operational(String),

    /// Misuse of cursor/connection lifecycle (e.g. `execute` after `close`).
    #[error("interface error: {0}")]
    Interface(String),

    /// Malformed query, illegal placeholder usage, COPY via `execute`,
    /// unknown conninfo key.
    #[error("programming error: {0}")]
    Programming(String),

    /// Server-side error, subclassed by SQLSTATE class.
    #[error("database error ({class:?}): {server}")]
    Database {
        class: SqlStateClass,
        server: ServerError,
    },

    /// Invariant violation inside the driver itself (no result from the PQ
    /// generator, unexpected status combination).
    #[error("internal error: {0}")]
    Internal(String),
}

impl DriverError {
    /// Classify a server-side error. `28*` (invalid_authorization_specification,
    /// e.g. bad password, role not permitted to log in) is an authentication
    /// failure rather than a query-shaped database error, so it surfaces as
    /// `Operational` instead of `Database`.
    pub fn database(server: ServerError) -> Self {
        let class = class_for_state(server.code());
        if class == SqlStateClass::InvalidAuthorizationSpecification {
            return DriverError::Operational(server.to_string());
        }
        DriverError::Database { class, server }
    }

    /// SQLSTATE code, if this is a database error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            DriverError::Database { server, .. } => Some(server.code()),
            _ => None,
        }
    }
}

impl From<Error> for DriverError {
    fn from(err: Error) -> Self {
        match err {
            Error::Server(server) => DriverError::database(server),
            Error::Io(e) => DriverError::Operational(e.to_string()),
            Error::ConnectionBroken => DriverError::Operational("connection is broken".into()),
            Error::Auth(msg) => DriverError::Operational(format!("authentication failed: {msg}")),
            #[cfg(any(feature = "sync-tls", feature = "tokio-tls"))]
            Error::Tls(e) => DriverError::Operational(format!("TLS error: {e}")),
            Error::Protocol(msg) => DriverError::Internal(msg),
            Error::InvalidUsage(msg) => DriverError::Interface(msg),
            Error::Unsupported(msg) => DriverError::Programming(msg),
            Error::Decode(msg) => DriverError::Programming(msg),
        }
    }
}
