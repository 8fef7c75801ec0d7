//! `$expand` compilation.

use crate::diagnostics::{Deprecation, DiagnosticsSink};
use crate::error::{Error, Result};
use crate::escape::escape_resource;
use crate::model::{Expand, ODataOption, ODataOptions, ResourcePath};
use crate::options::build_option;

/// Reject navigation keys that are really options or removed count paths.
pub(crate) fn check_expand_key(key: &str) -> Result<()> {
    if key.starts_with('$') {
        return Err(Error::shape(
            "Cannot have expand options without first expanding something!",
        ));
    }
    if key.ends_with("/$count") {
        return Err(Error::count_expand_path());
    }
    Ok(())
}

/// Compile an expand tree to its `$expand` value.
///
/// # Errors
/// Returns an error for empty lists, option keys used as navigation
/// properties, and invalid nested options.
pub fn build_expand(expand: &Expand, diagnostics: &dyn DiagnosticsSink) -> Result<String> {
    match expand {
        Expand::Path(path) => Ok(escape_resource(&ResourcePath::Single(path.clone()))),
        Expand::List(items) => {
            if items.is_empty() {
                return Err(Error::arity(
                    "Expand arrays must have at least 1 elements, got: []",
                ));
            }
            let parts = items
                .iter()
                .map(|item| build_expand(item, diagnostics))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(","))
        }
        Expand::Object(entries) => {
            let parts = entries
                .iter()
                .map(|(path, options)| {
                    check_expand_key(path)?;
                    expand_options(path, options, diagnostics)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(","))
        }
    }
}

fn expand_options(
    path: &str,
    options: &ODataOptions,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<String> {
    if let Some(inner) = options.count() {
        if options.len() > 1 {
            return Err(Error::shape(format!(
                "When using '$expand: a: $count: ...' you can only specify $count, got: '{}'",
                serde_json::to_string(&options.keys()).unwrap_or_default()
            )));
        }
        let keys = inner.keys();
        if keys.iter().any(|key| key != "$filter") {
            diagnostics.deprecated(&Deprecation::ExpandCountOptions { keys });
        }
        // Only `$filter` is meaningful on a count; the rest is dropped.
        let filtered: ODataOptions = inner
            .iter()
            .filter(|option| matches!(option, ODataOption::Filter(_)))
            .cloned()
            .collect();
        return nested_options(&format!("{path}/$count"), &filtered, diagnostics);
    }
    nested_options(path, options, diagnostics)
}

fn nested_options(
    path: &str,
    options: &ODataOptions,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<String> {
    let compiled = options
        .iter()
        .map(|option| match option {
            ODataOption::Count(_) | ODataOption::ParameterAlias(..) | ODataOption::Custom(..) => {
                Err(Error::UnknownExpandOption(option.key()))
            }
            _ => build_option(option, diagnostics),
        })
        .collect::<Result<Vec<_>>>()?;
    let escaped = escape_resource(&ResourcePath::Single(path.to_owned()));
    if compiled.is_empty() {
        Ok(escaped)
    } else {
        Ok(format!("{escaped}({})", compiled.join(";")))
    }
}
