//! Rewrites client-supplied parameterized queries into server-positional
//! form.
//!
//! Grounded on the rewrite rule spec.md gives in full and on
//! `psycopg3/cursor.py`'s parameter reordering ahead of
//! `PQsendQueryParams`. The rewrite is a single left-to-right byte scan —
//! no regex, no backtracking — recognizing `%s`, `%(name)s`, and `%%`.

use crate::error::{DriverError, DriverResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Positional,
    Named,
}

/// Result of rewriting one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    /// SQL with `%s`/`%(name)s` placeholders replaced by `$1..$N`.
    pub sql: String,
    /// Parameter names in bind order (`$1, $2, ...`). Positional queries
    /// carry synthetic empty names; a named parameter reused later in the
    /// query reuses its first-seen position rather than appending a new one.
    pub names: Vec<String>,
}

/// Rewrite `sql`'s placeholders to `$1..$N`.
///
/// `has_params` mirrors spec.md's "parameter vector (possibly empty) is
/// supplied" condition: when true, `%%` reduces to a literal `%`; when
/// false (a bare `execute(sql)` call with no params argument), the text is
/// passed through unchanged — `%%` included, since there is no parameter
/// context to disambiguate it from a literal percent sign.
pub fn prepare(sql: &str, has_params: bool) -> DriverResult<PreparedQuery> {
    if !has_params {
        return Ok(PreparedQuery {
            sql: sql.to_string(),
            names: Vec::new(),
        });
    }

    let bytes = sql.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut style: Option<Style> = None;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'%' {
                i += 1;
            }
            out.extend_from_slice(&bytes[start..i]);
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'%') => {
                out.push(b'%');
                i += 2;
            }
            Some(b's') => {
                check_style(&mut style, Style::Positional)?;
                names.push(String::new());
                out.push(b'$');
                out.extend_from_slice(names.len().to_string().as_bytes());
                i += 2;
            }
            Some(b'(') => {
                let rest = &sql[i + 2..];
                let close = rest.find(")s").ok_or_else(|| {
                    DriverError::Programming(format!("unterminated named placeholder at byte {i}"))
                })?;
                let name = &rest[..close];
                check_style(&mut style, Style::Named)?;
                let index = match names.iter().position(|n| n == name) {
                    Some(existing) => existing + 1,
                    None => {
                        names.push(name.to_string());
                        names.len()
                    }
                };
                out.push(b'$');
                out.extend_from_slice(index.to_string().as_bytes());
                i += 2 + close + 2;
            }
            _ => {
                return Err(DriverError::Programming(format!(
                    "malformed placeholder at byte {i}: '%' must be followed by 's', '(', or '%'"
                )));
            }
        }
    }

    let sql = String::from_utf8(out)
        .map_err(|e| DriverError::Internal(format!("placeholder rewrite produced invalid UTF-8: {e}")))?;
    Ok(PreparedQuery { sql, names })
}

fn check_style(current: &mut Option<Style>, found: Style) -> DriverResult<()> {
    match current {
        None => {
            *current = Some(found);
            Ok(())
        }
        Some(existing) if *existing == found => Ok(()),
        Some(_) => Err(DriverError::Programming(
            "cannot mix %s and %(name)s placeholders in one query".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_only() {
        let prepared = prepare("select %s, %s", true).unwrap();
        assert_eq!(prepared.sql, "select $1, $2");
        assert_eq!(prepared.names, vec!["".to_string(), "".to_string()]);
    }

    #[test]
    fn named_only_with_reuse() {
        let prepared = prepare("select %(a)s + %(b)s + %(a)s", true).unwrap();
        assert_eq!(prepared.sql, "select $1 + $2 + $1");
        assert_eq!(prepared.names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn mixed_style_rejected() {
        let err = prepare("select %s, %(a)s", true).unwrap_err();
        assert!(matches!(err, DriverError::Programming(_)));
    }

    #[test]
    fn percent_escape_only_reduces_with_params_supplied() {
        let prepared = prepare("select '100%%' , %s", true).unwrap();
        assert_eq!(prepared.sql, "select '100%' , $1");
    }

    #[test]
    fn no_params_passthrough_leaves_percent_escapes_alone() {
        let prepared = prepare("select '100%%'", false).unwrap();
        assert_eq!(prepared.sql, "select '100%%'");
        assert!(prepared.names.is_empty());
    }

    #[test]
    fn bare_percent_is_malformed() {
        let err = prepare("select 100 % 3", true).unwrap_err();
        assert!(matches!(err, DriverError::Programming(_)));
    }
}
