//! Per-option compilation: `key=value` pairs of the query string.

use crate::diagnostics::DiagnosticsSink;
use crate::error::{Error, Result};
use crate::escape::{escape_value, format_number};
use crate::expand::build_expand;
use crate::filter::build_filter;
use crate::model::{CustomValue, ODataOption, Select};
use crate::orderby::build_orderby;

/// Compile one option to its `key=value` query string pair.
///
/// `$count` wrappers are resolved by the caller and are rejected here.
pub fn build_option(
    option: &ODataOption,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<String> {
    let value = match option {
        ODataOption::Filter(filter) => build_filter(filter)?,
        ODataOption::Expand(expand) => build_expand(expand, diagnostics)?,
        ODataOption::OrderBy(orderby) => build_orderby(orderby, diagnostics)?,
        ODataOption::Top(n) | ODataOption::Skip(n) => n.to_string(),
        ODataOption::Select(select) => build_select(select)?,
        ODataOption::Format(format) => format.clone(),
        ODataOption::Count(_) => return Err(Error::UnknownOption(option.key())),
        ODataOption::ParameterAlias(_, value) => escape_value(value),
        ODataOption::Custom(name, value) => {
            if name.starts_with('$') {
                return Err(Error::UnknownOption(name.clone()));
            }
            custom_value(value)
        }
    };
    Ok(format!("{}={value}", option.key()))
}

fn build_select(select: &Select) -> Result<String> {
    match select {
        Select::Fields(fields) => Ok(fields.clone()),
        Select::List(fields) => {
            if fields.is_empty() {
                return Err(Error::arity("'$select' arrays have to have at least 1 element"));
            }
            Ok(fields.join(","))
        }
        Select::Set(fields) => {
            if fields.is_empty() {
                return Err(Error::arity("'$select' sets have to have at least 1 element"));
            }
            Ok(fields.iter().map(String::as_str).collect::<Vec<_>>().join(","))
        }
    }
}

fn custom_value(value: &CustomValue) -> String {
    match value {
        CustomValue::Text(text) => text.clone(),
        CustomValue::Bool(b) => b.to_string(),
        CustomValue::Number(n) => format_number(n),
        CustomValue::List(items) => items.join(","),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::diagnostics::NoopDiagnostics;
    use crate::model::Primitive;
    use std::collections::BTreeSet;

    fn option(option: &ODataOption) -> Result<String> {
        build_option(option, &NoopDiagnostics)
    }

    #[test]
    fn test_select_set_is_sorted_and_joined() {
        let set: BTreeSet<String> = ["b", "a"].into_iter().map(str::to_owned).collect();
        assert_eq!(option(&ODataOption::Select(Select::Set(set))).unwrap(), "$select=a,b");
        let err = option(&ODataOption::Select(Select::Set(BTreeSet::new()))).unwrap_err();
        assert_eq!(err.to_string(), "'$select' sets have to have at least 1 element");
    }

    #[test]
    fn test_parameter_alias_value_is_escaped() {
        let alias = ODataOption::ParameterAlias("p".into(), Primitive::from("it's"));
        assert_eq!(option(&alias).unwrap(), "@p='it''s'");
    }

    #[test]
    fn test_custom_values_are_stringified() {
        let flag = ODataOption::Custom("flag".into(), CustomValue::Bool(true));
        assert_eq!(option(&flag).unwrap(), "flag=true");
        let ids = CustomValue::List(vec!["1".into(), "2".into()]);
        let list = ODataOption::Custom("ids".into(), ids);
        assert_eq!(option(&list).unwrap(), "ids=1,2");
    }

    #[test]
    fn test_custom_dollar_keys_are_unknown_options() {
        let bogus = ODataOption::Custom("$bogus".into(), CustomValue::Text("x".into()));
        assert_eq!(option(&bogus).unwrap_err().to_string(), "Unknown odata option '$bogus'");
    }
}
