//! `$orderby` compilation.

use crate::diagnostics::{Deprecation, DiagnosticsSink};
use crate::error::{Error, Result};
use crate::filter::build_filter;
use crate::model::{CountOptions, OrderBy, OrderByValue};

/// Compile an ordering to its `$orderby` value.
///
/// # Errors
/// Returns an error for empty or nested lists, objects without exactly one
/// property, and objects with no direction.
pub fn build_orderby(orderby: &OrderBy, diagnostics: &dyn DiagnosticsSink) -> Result<String> {
    match orderby {
        OrderBy::Raw(text) => {
            if text.contains("/$count") {
                diagnostics.deprecated(&Deprecation::CountInOrderByString);
            }
            Ok(text.clone())
        }
        OrderBy::List(items) => {
            if items.is_empty() {
                return Err(Error::arity(
                    "'$orderby' arrays have to have at least 1 element",
                ));
            }
            let parts = items
                .iter()
                .map(|item| match item {
                    OrderBy::List(_) => Err(Error::shape("'$orderby' cannot have nested arrays")),
                    _ => build_orderby(item, diagnostics),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(","))
        }
        OrderBy::Object { entries, dir } => {
            let [(property, value)] = entries.as_slice() else {
                return Err(Error::arity(format!(
                    "'$orderby' objects must have exactly one element, got {} elements",
                    entries.len()
                )));
            };
            let (path, dir) = match value {
                OrderByValue::Dir(dir) => (property.clone(), Some(*dir)),
                OrderByValue::Count(count) => (count_path(property, count)?, *dir),
            };
            let dir = dir.ok_or_else(|| {
                Error::shape(
                    "'$orderby' objects should either use the '{ a: 'asc' }' or the $orderby: { a: { $count: ... }, $dir: 'asc' } notation",
                )
            })?;
            Ok(format!("{path} {}", dir.as_str()))
        }
    }
}

fn count_path(property: &str, count: &CountOptions) -> Result<String> {
    match &count.filter {
        Some(filter) => Ok(format!("{property}/$count($filter={})", build_filter(filter)?)),
        None => Ok(format!("{property}/$count")),
    }
}
