//! Asynchronous PostgreSQL client using Tokio.

mod conn;
mod named_portal;
mod pipeline;
mod stream;
mod transaction;
mod unnamed_portal;

pub use conn::Conn;
pub use named_portal::NamedPortal;
pub use pipeline::Pipeline;
pub use transaction::Transaction;
pub use unnamed_portal::UnnamedPortal;
