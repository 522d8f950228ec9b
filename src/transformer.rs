//! Per-cursor adaptation context.
//!
//! Grounded on `psycopg3/proto.py`'s `Transformer` Protocol: the same
//! operation names (`set_row_types`, `dump_sequence`, `dump`,
//! `get_dump_function`, `lookup_dumper`, `load_row`, `load_sequence`,
//! `load`, `get_load_function`, `lookup_loader`) are kept, translated to
//! Rust ownership — the transformer borrows the cursor's and connection's
//! registry overlays for the duration of one `execute` rather than holding
//! a weak reference back to the connection.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::error::{DriverError, DriverResult};
use crate::protocol::backend::query::DataRow;
use crate::protocol::types::{FormatCode, Oid};
use crate::registry::{DumpFn, LoadFn, Registry, resolve_dumper, resolve_loader};

/// Adaptation context for one query lifecycle.
///
/// Not shared between cursors: each `execute` gets a fresh transformer, and
/// its row-type table is set exactly once, on first decode of that result.
pub struct Transformer<'r> {
    cursor_registry: &'r Registry,
    connection_registry: &'r Registry,
    row_loaders: Vec<Option<Arc<LoadFn>>>,
}

impl<'r> Transformer<'r> {
    /// Create a transformer scoped to one cursor's and one connection's
    /// registry overlays.
    pub fn new(cursor_registry: &'r Registry, connection_registry: &'r Registry) -> Self {
        Self {
            cursor_registry,
            connection_registry,
            row_loaders: Vec::new(),
        }
    }

    /// Memoize the load function for each column of a result. Idempotent
    /// per result: called once, on first decode.
    pub fn set_row_types(&mut self, descriptors: &[(Oid, FormatCode)]) {
        self.row_loaders = descriptors
            .iter()
            .map(|&(oid, format)| self.get_load_function(oid, format))
            .collect();
    }

    /// Take ownership of the memoized per-column loaders set by
    /// `set_row_types`, so a caller can decode rows after this transformer
    /// (and the registry borrows it holds) would otherwise have to stay
    /// alive.
    pub fn into_row_loaders(self) -> Vec<Option<Arc<LoadFn>>> {
        self.row_loaders
    }

    /// Resolve (without caching) the load function for an oid/format pair.
    pub fn get_load_function(&self, oid: Oid, format: FormatCode) -> Option<Arc<LoadFn>> {
        resolve_loader(self.cursor_registry, self.connection_registry, oid, format)
    }

    /// Alias kept for parity with the original `Transformer` Protocol.
    pub fn lookup_loader(&self, oid: Oid, format: FormatCode) -> Option<Arc<LoadFn>> {
        self.get_load_function(oid, format)
    }

    /// Decode one value. Used directly by composite codecs for their field
    /// values and indirectly by `load_row`/`load_sequence`.
    pub fn load(&self, bytes: &[u8], oid: Oid, format: FormatCode) -> DriverResult<Box<dyn Any>> {
        let loader = self
            .get_load_function(oid, format)
            .ok_or_else(|| DriverError::Programming(format!("no loader registered for oid {oid}")))?;
        loader(bytes)
    }

    /// Decode a full row using the memoized per-column loaders set by
    /// `set_row_types`. `None` entries are NULLs, never passed to a loader.
    pub fn load_row(&self, row: DataRow<'_>) -> DriverResult<Vec<Option<Box<dyn Any>>>> {
        row.iter()
            .enumerate()
            .map(|(i, value)| match value {
                None => Ok(None),
                Some(bytes) => {
                    let loader = self
                        .row_loaders
                        .get(i)
                        .and_then(Option::as_ref)
                        .ok_or_else(|| {
                            DriverError::Internal(format!("no memoized loader for column {i}"))
                        })?;
                    loader(bytes).map(Some)
                }
            })
            .collect()
    }

    /// Decode a flat slice of (possibly NULL) field payloads against an
    /// explicit oid list, without relying on `set_row_types`. Used by the
    /// composite loader, whose fields are not a top-level result row.
    pub fn load_sequence(
        &self,
        values: &[Option<&[u8]>],
        oids: &[Oid],
        format: FormatCode,
    ) -> DriverResult<Vec<Option<Box<dyn Any>>>> {
        if values.len() != oids.len() {
            return Err(DriverError::Internal(
                "load_sequence: value count does not match oid count".into(),
            ));
        }
        values
            .iter()
            .zip(oids)
            .map(|(value, &oid)| match value {
                None => Ok(None),
                Some(bytes) => self.load(bytes, oid, format).map(Some),
            })
            .collect()
    }

    /// Resolve (without caching) the dump function for a Rust type at a
    /// given format.
    pub fn get_dump_function(&self, type_id: TypeId, format: FormatCode) -> Option<Arc<DumpFn>> {
        resolve_dumper(self.cursor_registry, self.connection_registry, type_id, format)
    }

    /// Alias kept for parity with the original `Transformer` Protocol.
    pub fn lookup_dumper(&self, type_id: TypeId, format: FormatCode) -> Option<Arc<DumpFn>> {
        self.get_dump_function(type_id, format)
    }

    /// Encode one type-erased value for a target oid/format.
    pub fn dump(
        &self,
        value: &dyn Any,
        type_id: TypeId,
        target_oid: Oid,
        format: FormatCode,
    ) -> DriverResult<Vec<u8>> {
        let dumper = self.get_dump_function(type_id, format).ok_or_else(|| {
            DriverError::Programming("no dumper registered for this type".into())
        })?;
        let mut buf = Vec::new();
        dumper(value, target_oid, &mut buf)?;
        Ok(buf)
    }

    /// Encode a sequence of type-erased values against their target oids,
    /// returning one raw payload per value (`None` for a NULL slot) —
    /// parallel arrays aligned with the wire layout, matching spec's
    /// `adapt_sequence`. Used both for composite field dumping and as the
    /// building block a Bind-message encoder length-prefixes per field.
    pub fn dump_sequence(
        &self,
        values: &[Option<(TypeId, &dyn Any)>],
        target_oids: &[Oid],
        format: FormatCode,
    ) -> DriverResult<Vec<Option<Vec<u8>>>> {
        if values.len() != target_oids.len() {
            return Err(DriverError::Internal(
                "dump_sequence: value count does not match oid count".into(),
            ));
        }
        values
            .iter()
            .zip(target_oids)
            .map(|(value, &oid)| match value {
                None => Ok(None),
                Some((type_id, value)) => self.dump(*value, *type_id, oid, format).map(Some),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn load_row_respects_null_without_calling_loader() {
        let mut connection = Registry::new();
        connection.register_loader(oid::INT4, FormatCode::Binary, |bytes| {
            Ok(Box::new(i32::from_be_bytes(bytes.try_into().map_err(
                |_| DriverError::Internal("bad i32 payload".into()),
            )?)) as Box<dyn Any>)
        });
        let cursor = Registry::new();
        let mut transformer = Transformer::new(&cursor, &connection);
        transformer.set_row_types(&[(oid::INT4, FormatCode::Binary)]);

        let loader = transformer
            .get_load_function(oid::INT4, FormatCode::Binary)
            .unwrap();
        let decoded = loader(&42_i32.to_be_bytes()).unwrap();
        assert_eq!(*decoded.downcast::<i32>().unwrap(), 42);
    }
}
