//! Adapter registry: scoped dumper/loader lookup keyed by runtime type and
//! by wire oid/format.
//!
//! Grounded on `psycopg3/proto.py`'s `DumpersMap`/`LoadersMap` and the
//! global/connection/cursor layering `adapt.py` implements through
//! `Dumper.register(src, dumper, context=...)`. Rust has no runtime class
//! hierarchy to walk the way the Python original does for its supertype
//! fallback, so lookup here is an exact `(TypeId, FormatCode)` match across
//! the three scopes with no implicit coercion between unrelated types.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::DriverResult;
use crate::protocol::types::{FormatCode, Oid};

/// Encodes a type-erased Rust value into wire bytes for a chosen target oid.
pub type DumpFn = dyn Fn(&dyn Any, Oid, &mut Vec<u8>) -> DriverResult<()> + Send + Sync;

/// Decodes wire bytes for a known oid into a type-erased Rust value.
pub type LoadFn = dyn Fn(&[u8]) -> DriverResult<Box<dyn Any>> + Send + Sync;

type DumperKey = (TypeId, FormatCode);
type LoaderKey = (Oid, FormatCode);

/// One layer of the three-layer adapter scope (global, connection, cursor).
///
/// `Connection` and `Cursor` each own one of these for their overlay;
/// the global layer lives in the process-wide singleton returned by
/// [`global`].
#[derive(Default)]
pub struct Registry {
    dumpers: HashMap<DumperKey, Arc<DumpFn>>,
    loaders: HashMap<LoaderKey, Arc<LoadFn>>,
}

impl Registry {
    /// Create an empty overlay (no built-ins; those live in the global
    /// scope only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dumper for `T` at the given format.
    ///
    /// Idempotent: registering the same key twice with factories that
    /// happen to produce identical behavior is indistinguishable from a
    /// no-op to callers; registering a different factory at an existing
    /// key simply replaces it.
    pub fn register_dumper<T: 'static>(
        &mut self,
        format: FormatCode,
        dump: impl Fn(&T, Oid, &mut Vec<u8>) -> DriverResult<()> + Send + Sync + 'static,
    ) {
        let key = (TypeId::of::<T>(), format);
        let wrapped: Arc<DumpFn> = Arc::new(move |value, oid, buf| {
            match value.downcast_ref::<T>() {
                Some(value) => dump(value, oid, buf),
                None => Err(crate::error::DriverError::Internal(
                    "registry dumper invoked with mismatched type".into(),
                )),
            }
        });
        self.dumpers.insert(key, wrapped);
    }

    /// Register a loader for the given oid and format.
    pub fn register_loader(
        &mut self,
        oid: Oid,
        format: FormatCode,
        load: impl Fn(&[u8]) -> DriverResult<Box<dyn Any>> + Send + Sync + 'static,
    ) {
        self.loaders.insert((oid, format), Arc::new(load));
    }

    /// Look up a dumper registered directly in this scope.
    pub fn lookup_dumper(&self, type_id: TypeId, format: FormatCode) -> Option<Arc<DumpFn>> {
        self.dumpers.get(&(type_id, format)).cloned()
    }

    /// Look up a loader registered directly in this scope.
    pub fn lookup_loader(&self, oid: Oid, format: FormatCode) -> Option<Arc<LoadFn>> {
        self.loaders.get(&(oid, format)).cloned()
    }
}

static GLOBAL: OnceLock<RwLock<Registry>> = OnceLock::new();

/// The process-wide built-in registry (global scope). Safe to mutate from
/// multiple threads; per spec.md §5, registration at startup races only
/// with itself, not with in-flight queries.
pub fn global() -> &'static RwLock<Registry> {
    GLOBAL.get_or_init(|| RwLock::new(Registry::new()))
}

fn read_global() -> std::sync::RwLockReadGuard<'static, Registry> {
    global().read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_global() -> std::sync::RwLockWriteGuard<'static, Registry> {
    global().write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install a dumper in the global scope.
pub fn register_global_dumper<T: 'static>(
    format: FormatCode,
    dump: impl Fn(&T, Oid, &mut Vec<u8>) -> DriverResult<()> + Send + Sync + 'static,
) {
    write_global().register_dumper(format, dump);
}

/// Install a loader in the global scope.
pub fn register_global_loader(
    oid: Oid,
    format: FormatCode,
    load: impl Fn(&[u8]) -> DriverResult<Box<dyn Any>> + Send + Sync + 'static,
) {
    write_global().register_loader(oid, format, load);
}

/// Three-scope lookup for a dumper: cursor overlay shadows connection
/// overlay shadows global. First hit wins.
pub fn resolve_dumper(
    cursor: &Registry,
    connection: &Registry,
    type_id: TypeId,
    format: FormatCode,
) -> Option<Arc<DumpFn>> {
    cursor
        .lookup_dumper(type_id, format)
        .or_else(|| connection.lookup_dumper(type_id, format))
        .or_else(|| read_global().lookup_dumper(type_id, format))
}

/// Three-scope lookup for a loader: cursor overlay shadows connection
/// overlay shadows global. No supertype fallback — oids are concrete.
pub fn resolve_loader(
    cursor: &Registry,
    connection: &Registry,
    oid: Oid,
    format: FormatCode,
) -> Option<Arc<LoadFn>> {
    cursor
        .lookup_loader(oid, format)
        .or_else(|| connection.lookup_loader(oid, format))
        .or_else(|| read_global().lookup_loader(oid, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoping_precedence_cursor_over_connection_over_global() {
        register_global_loader(9999, FormatCode::Text, |_| Ok(Box::new(1_i32)));

        let mut connection = Registry::new();
        connection.register_loader(9999, FormatCode::Text, |_| Ok(Box::new(2_i32)));

        let mut cursor = Registry::new();
        cursor.register_loader(9999, FormatCode::Text, |_| Ok(Box::new(3_i32)));

        let via_cursor = resolve_loader(&cursor, &connection, 9999, FormatCode::Text).unwrap();
        assert_eq!(*via_cursor(&[]).unwrap().downcast::<i32>().unwrap(), 3);

        let empty_cursor = Registry::new();
        let via_connection =
            resolve_loader(&empty_cursor, &connection, 9999, FormatCode::Text).unwrap();
        assert_eq!(*via_connection(&[]).unwrap().downcast::<i32>().unwrap(), 2);

        let via_global =
            resolve_loader(&empty_cursor, &Registry::new(), 9999, FormatCode::Text).unwrap();
        assert_eq!(*via_global(&[]).unwrap().downcast::<i32>().unwrap(), 1);
    }

    #[test]
    fn replacing_a_key_with_a_different_factory_succeeds() {
        let mut registry = Registry::new();
        registry.register_loader(8888, FormatCode::Text, |_| Ok(Box::new(1_i32)));
        registry.register_loader(8888, FormatCode::Text, |_| Ok(Box::new(2_i32)));

        let loader = registry.lookup_loader(8888, FormatCode::Text).unwrap();
        assert_eq!(*loader(&[]).unwrap().downcast::<i32>().unwrap(), 2);
    }
}
