//! Built-in dynamic loaders/dumpers, installed into the global [`Registry`]
//! on first use.
//!
//! These bridge the compile-time-typed [`FromWireValue`]/[`ToWireValue`]
//! impls in [`crate::conversion`] (used by `query_collect`/`exec_collect`,
//! where the caller names the Rust type up front) into the type-erased
//! `Box<dyn Any>` world the Cursor facade and composite codec need, where
//! the type is only known at runtime. Grounded in spec.md §4.5's
//! illustrative built-in list: `int2/int4/int8`, `float4/float8`,
//! `numeric`, `bool`, `text/varchar/bpchar`, `bytea`.

use std::sync::Once;

use crate::conversion::{FromWireValue, ToWireValue, numeric_to_string};
use crate::error::{DriverError, Error};
use crate::protocol::types::{FormatCode, oid};
use crate::registry::{register_global_dumper, register_global_loader};

/// A `numeric` value kept in its decimal-string form, since the crate does
/// not depend on an arbitrary-precision decimal type for this illustrative
/// built-in. A `with-rust-decimal`-backed loader/dumper would register at
/// the same oid/format keys and simply shadow this one in a connection- or
/// cursor-scoped overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Numeric(pub String);

static INSTALL: Once = Once::new();

/// Install the illustrative built-ins into the global registry. Safe to
/// call repeatedly; only the first call does any work.
pub fn install() {
    INSTALL.call_once(|| {
        install_bool();
        install_ints();
        install_floats();
        install_text();
        install_bytea();
        install_numeric();
    });
}

fn wire_err(e: Error) -> DriverError {
    DriverError::Programming(e.to_string())
}

fn install_bool() {
    register_global_loader(oid::BOOL, FormatCode::Text, |bytes| {
        Ok(Box::new(bool::from_text(oid::BOOL, bytes).map_err(wire_err)?))
    });
    register_global_loader(oid::BOOL, FormatCode::Binary, |bytes| {
        Ok(Box::new(
            bool::from_binary(oid::BOOL, bytes).map_err(wire_err)?,
        ))
    });
    register_global_dumper::<bool>(FormatCode::Binary, |value, target_oid, buf| {
        if target_oid != oid::BOOL {
            return Err(DriverError::Programming(format!(
                "cannot encode bool as oid {target_oid}"
            )));
        }
        buf.push(u8::from(*value));
        Ok(())
    });
}

macro_rules! install_int {
    ($fn_name:ident, $ty:ty, $oid:expr) => {
        fn $fn_name() {
            register_global_loader($oid, FormatCode::Text, |bytes| {
                Ok(Box::new(<$ty>::from_text($oid, bytes).map_err(wire_err)?))
            });
            register_global_loader($oid, FormatCode::Binary, |bytes| {
                Ok(Box::new(<$ty>::from_binary($oid, bytes).map_err(wire_err)?))
            });
            register_global_dumper::<$ty>(FormatCode::Binary, |value, target_oid, buf| {
                let mut with_prefix = Vec::new();
                value.encode(target_oid, &mut with_prefix).map_err(wire_err)?;
                // strip the 4-byte length prefix ToWireValue::encode writes;
                // the registry's dump contract hands back a raw payload and
                // lets the caller (composite codec, Bind encoder) prefix it.
                buf.extend_from_slice(&with_prefix[4..]);
                Ok(())
            });
        }
    };
}

install_int!(install_int2, i16, oid::INT2);
install_int!(install_int4_impl, i32, oid::INT4);
install_int!(install_int8_impl, i64, oid::INT8);

fn install_ints() {
    install_int2();
    install_int4_impl();
    install_int8_impl();
}

fn install_floats() {
    register_global_loader(oid::FLOAT4, FormatCode::Text, |bytes| {
        Ok(Box::new(f32::from_text(oid::FLOAT4, bytes).map_err(wire_err)?))
    });
    register_global_loader(oid::FLOAT4, FormatCode::Binary, |bytes| {
        Ok(Box::new(
            f32::from_binary(oid::FLOAT4, bytes).map_err(wire_err)?,
        ))
    });
    register_global_dumper::<f32>(FormatCode::Binary, |value, target_oid, buf| {
        if target_oid != oid::FLOAT4 {
            return Err(DriverError::Programming(format!(
                "cannot encode f32 as oid {target_oid}"
            )));
        }
        buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    });

    register_global_loader(oid::FLOAT8, FormatCode::Text, |bytes| {
        Ok(Box::new(f64::from_text(oid::FLOAT8, bytes).map_err(wire_err)?))
    });
    register_global_loader(oid::FLOAT8, FormatCode::Binary, |bytes| {
        Ok(Box::new(
            f64::from_binary(oid::FLOAT8, bytes).map_err(wire_err)?,
        ))
    });
    register_global_dumper::<f64>(FormatCode::Binary, |value, target_oid, buf| {
        if target_oid != oid::FLOAT8 {
            return Err(DriverError::Programming(format!(
                "cannot encode f64 as oid {target_oid}"
            )));
        }
        buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    });
}

fn install_text() {
    for text_oid in [oid::TEXT, oid::VARCHAR, oid::BPCHAR, oid::NAME] {
        register_global_loader(text_oid, FormatCode::Text, |bytes| {
            Ok(Box::new(String::from_text(oid::TEXT, bytes).map_err(wire_err)?))
        });
        register_global_loader(text_oid, FormatCode::Binary, |bytes| {
            Ok(Box::new(
                String::from_binary(oid::TEXT, bytes).map_err(wire_err)?,
            ))
        });
    }
    for format in [FormatCode::Text, FormatCode::Binary] {
        register_global_dumper::<String>(format, |value, target_oid, buf| {
            if !matches!(target_oid, oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME) {
                return Err(DriverError::Programming(format!(
                    "cannot encode String as oid {target_oid}"
                )));
            }
            buf.extend_from_slice(value.as_bytes());
            Ok(())
        });
    }
}

fn install_bytea() {
    register_global_loader(oid::BYTEA, FormatCode::Text, |bytes| {
        Ok(Box::new(Vec::<u8>::from_text(oid::BYTEA, bytes).map_err(wire_err)?))
    });
    register_global_loader(oid::BYTEA, FormatCode::Binary, |bytes| {
        Ok(Box::new(
            Vec::<u8>::from_binary(oid::BYTEA, bytes).map_err(wire_err)?,
        ))
    });
    register_global_dumper::<Vec<u8>>(FormatCode::Binary, |value, target_oid, buf| {
        if target_oid != oid::BYTEA {
            return Err(DriverError::Programming(format!(
                "cannot encode bytes as oid {target_oid}"
            )));
        }
        buf.extend_from_slice(value);
        Ok(())
    });
}

fn install_numeric() {
    register_global_loader(oid::NUMERIC, FormatCode::Text, |bytes| {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DriverError::Programming(format!("invalid UTF-8 in numeric: {e}")))?;
        Ok(Box::new(Numeric(text.to_string())))
    });
    register_global_loader(oid::NUMERIC, FormatCode::Binary, |bytes| {
        Ok(Box::new(Numeric(
            numeric_to_string(bytes).map_err(wire_err)?,
        )))
    });
    register_global_dumper::<Numeric>(FormatCode::Text, |value, target_oid, buf| {
        if target_oid != oid::NUMERIC {
            return Err(DriverError::Programming(format!(
                "cannot encode numeric as oid {target_oid}"
            )));
        }
        buf.extend_from_slice(value.0.as_bytes());
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{global, resolve_loader};

    #[test]
    fn installed_loaders_round_trip_basic_types() {
        install();
        let empty = crate::registry::Registry::new();

        let loader =
            resolve_loader(&empty, &empty, oid::INT4, FormatCode::Binary).expect("int4 loader");
        let decoded = loader(&42_i32.to_be_bytes()).unwrap();
        assert_eq!(*decoded.downcast::<i32>().unwrap(), 42);

        let loader =
            resolve_loader(&empty, &empty, oid::TEXT, FormatCode::Text).expect("text loader");
        let decoded = loader(b"hello").unwrap();
        assert_eq!(*decoded.downcast::<String>().unwrap(), "hello".to_string());

        let loader = resolve_loader(&empty, &empty, oid::BOOL, FormatCode::Binary)
            .expect("bool loader");
        let decoded = loader(&[1]).unwrap();
        assert!(*decoded.downcast::<bool>().unwrap());

        let _ = global();
    }

    #[test]
    fn installed_int8_dumper_narrows_to_the_target_oid_natural_oid_picked() {
        use crate::conversion::ToWireValue;
        use crate::registry::resolve_dumper;
        use std::any::{Any, TypeId};

        install();
        let empty = crate::registry::Registry::new();
        let dumper =
            resolve_dumper(&empty, &empty, TypeId::of::<i64>(), FormatCode::Binary).expect("i64 dumper");

        let value: i64 = 42;
        let target_oid = value.natural_oid();
        assert_eq!(target_oid, oid::INT2);

        let mut buf = Vec::new();
        dumper(&value as &dyn Any, target_oid, &mut buf).unwrap();
        assert_eq!(buf, 42_i16.to_be_bytes());
    }
}
