//! JSON intake.
//!
//! Query descriptions usually arrive as JSON. These conversions map a
//! `serde_json::Value` onto the typed model, rejecting values whose type does
//! not fit their position. Type names in messages follow the JavaScript
//! `typeof` vocabulary (`string`, `number`, `boolean`, `object`, `undefined`)
//! so messages match what clients of the wire format expect.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::expand::check_expand_key;
use crate::model::{
    AuthParams, BinaryOperator, CountOptions, CustomValue, DurationLiteral, Expand, Filter,
    FilterEntry, FilterFunction, KeyValue, Lambda, MethodCall, ODataOption, ODataOptions,
    Operator, OrderBy, OrderByValue, Primitive, QueryParams, RawFilter, ResourceId, ResourcePath,
    Select, SortDir,
};

fn js_type(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}

fn js_type_of(value: Option<&Value>) -> &'static str {
    value.map_or("undefined", js_type)
}

fn json_keys(map: &Map<String, Value>) -> String {
    let keys: Vec<&String> = map.keys().collect();
    serde_json::to_string(&keys).unwrap_or_default()
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

impl TryFrom<&Value> for Primitive {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Primitive::Null),
            Value::Bool(b) => Ok(Primitive::Bool(*b)),
            Value::Number(n) => Ok(Primitive::Number(n.clone())),
            Value::String(s) => Ok(Primitive::String(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(Error::InvalidValue(js_type(value))),
        }
    }
}

// Filters

impl TryFrom<&Value> for Filter {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(Filter::try_from)
                .collect::<Result<Vec<_>>>()
                .map(Filter::List),
            Value::Object(map) => filter_entries(map).map(Filter::Object),
            scalar => Primitive::try_from(scalar).map(Filter::Value),
        }
    }
}

fn filter_entries(map: &Map<String, Value>) -> Result<Vec<FilterEntry>> {
    map.iter()
        .map(|(key, value)| {
            if key.starts_with('$') {
                operator(key, value).map(FilterEntry::Operator)
            } else if key.starts_with('@') {
                match value {
                    Value::String(name) => Ok(FilterEntry::Alias(name.clone())),
                    other => Err(Error::InvalidParameterAlias(js_type(other))),
                }
            } else {
                Ok(FilterEntry::Property(key.clone(), Filter::try_from(value)?))
            }
        })
        .collect()
}

fn operator(key: &str, value: &Value) -> Result<Operator> {
    let name = &key[1..];
    if let Some(op) = BinaryOperator::from_name(name) {
        return Ok(Operator::Compare(op, Filter::try_from(value)?));
    }
    if let Some(function) = FilterFunction::from_name(name) {
        return Ok(Operator::Function(function, Filter::try_from(value)?));
    }
    match key {
        "$duration" => duration(value).map(Operator::Duration),
        "$raw" => raw(value).map(Operator::Raw),
        "$" => resource_path(value).map(Operator::Resource),
        "$count" => filter_count(value).map(Operator::Count),
        "$and" => Ok(Operator::And(Filter::try_from(value)?)),
        "$or" => Ok(Operator::Or(Filter::try_from(value)?)),
        "$in" => Ok(Operator::In(Filter::try_from(value)?)),
        "$not" => Ok(Operator::Not(Filter::try_from(value)?)),
        "$any" => lambda("$any", value).map(Operator::Any),
        "$all" => lambda("$all", value).map(Operator::All),
        "$fn" => method_call(value).map(Operator::Method),
        "$canAccess" => match value {
            Value::Bool(true) => Ok(Operator::CanAccess),
            other => Err(Error::shape(format!(
                "Expected true for $canAccess, got: {other}"
            ))),
        },
        _ => Err(Error::UnrecognisedOperator(key.to_owned())),
    }
}

fn duration(value: &Value) -> Result<DurationLiteral> {
    let map = match value {
        Value::Object(map) => map,
        Value::Array(_) => {
            return Err(Error::shape(
                "Expected $duration to include duration properties, got: object",
            ));
        }
        other => {
            return Err(Error::shape(format!(
                "Expected type for $duration, got: {}",
                js_type(other)
            )));
        }
    };
    let component = |name: &str| -> Result<f64> {
        match map.get(name) {
            None | Some(Value::Null) => Ok(0.0),
            Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or_default()),
            Some(other) => Err(Error::shape(format!(
                "Expected number for $duration {name}, got: {}",
                js_type(other)
            ))),
        }
    };
    let negative = match map.get("negative") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(Error::shape(format!(
                "Expected boolean for $duration negative, got: {}",
                js_type(other)
            )));
        }
    };
    Ok(DurationLiteral {
        negative,
        days: component("days")?,
        hours: component("hours")?,
        minutes: component("minutes")?,
        seconds: component("seconds")?,
    })
}

fn raw(value: &Value) -> Result<RawFilter> {
    match value {
        Value::String(text) => Ok(RawFilter::Text(text.clone())),
        Value::Array(items) => {
            let template = match items.first() {
                Some(Value::String(template)) => template.clone(),
                other => {
                    return Err(Error::shape(format!(
                        "First element of array for $raw must be a string, got: {}",
                        js_type_of(other)
                    )));
                }
            };
            let params = items[1..]
                .iter()
                .map(Filter::try_from)
                .collect::<Result<Vec<_>>>()?;
            Ok(RawFilter::positional(template, params))
        }
        Value::Object(map) => {
            let template = match map.get("$string") {
                Some(Value::String(template)) => template.clone(),
                other => {
                    return Err(Error::shape(format!(
                        "$string element of object for $raw must be a string, got: {}",
                        js_type_of(other)
                    )));
                }
            };
            let mut params = Vec::with_capacity(map.len().saturating_sub(1));
            for (name, param) in map {
                if name == "$string" {
                    continue;
                }
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(Error::shape(format!(
                        "$raw param names must contain only [a-zA-Z0-9], got: {name}"
                    )));
                }
                params.push((name.clone(), Filter::try_from(param)?));
            }
            Ok(RawFilter::Template { template, params })
        }
        other => Err(Error::shape(format!(
            "Expected string/array/object for $raw, got: {}",
            js_type(other)
        ))),
    }
}

fn resource_path(value: &Value) -> Result<ResourcePath> {
    match value {
        Value::String(name) => Ok(ResourcePath::Single(name.clone())),
        Value::Array(segments) => segments
            .iter()
            .map(|segment| match segment {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(Error::InvalidResource(js_type(other))),
            })
            .collect::<Result<Vec<_>>>()
            .map(ResourcePath::Segments),
        other => Err(Error::InvalidResource(js_type(other))),
    }
}

fn filter_count(value: &Value) -> Result<CountOptions> {
    match value {
        Value::Object(map) if map.keys().all(|key| key == "$filter") => Ok(CountOptions {
            filter: map.get("$filter").map(Filter::try_from).transpose()?,
        }),
        _ => Err(Error::count_comparison()),
    }
}

fn lambda(operator: &'static str, value: &Value) -> Result<Lambda> {
    let field = |name: &str| {
        value
            .as_object()
            .and_then(|map| map.get(name))
            .filter(|v| !v.is_null())
    };
    let alias = match field("$alias") {
        None => {
            return Err(Error::LambdaMissing {
                operator,
                field: "alias",
            });
        }
        Some(Value::String(alias)) => alias.clone(),
        Some(other) => {
            return Err(Error::shape(format!(
                "Lambda expression ({operator}) alias must be a string, got: {}",
                js_type(other)
            )));
        }
    };
    let expr = field("$expr").ok_or(Error::LambdaMissing {
        operator,
        field: "expr",
    })?;
    Ok(Lambda {
        alias,
        expr: Filter::try_from(expr)?,
    })
}

fn method_call(value: &Value) -> Result<MethodCall> {
    let Value::Object(map) = value else {
        return Err(Error::shape(format!(
            "Expected object for $fn, got: {}",
            js_type(value)
        )));
    };
    let string_field = |name: &str| match map.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(Error::shape(format!(
            "{name} of $fn must be a string, got: {}",
            js_type_of(other)
        ))),
    };
    let args = match map.get("$args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args
            .iter()
            .map(Filter::try_from)
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(Error::shape(format!(
                "$args of $fn must be an array, got: {}",
                js_type(other)
            )));
        }
    };
    Ok(MethodCall {
        scope: string_field("$scope")?,
        method: string_field("$method")?,
        args,
    })
}

// Expand

impl TryFrom<&Value> for Expand {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::String(path) => Ok(Expand::Path(path.clone())),
            Value::Array(items) => items
                .iter()
                .map(Expand::try_from)
                .collect::<Result<Vec<_>>>()
                .map(Expand::List),
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| {
                    check_expand_key(key)?;
                    match value {
                        Value::Object(options) => Ok((key.clone(), expand_options(key, options)?)),
                        Value::Array(_) => Err(Error::shape(format!(
                            "'$expand: {key}: [...]' is invalid, use '$expand: {key}: {{...}}' instead."
                        ))),
                        primitive => Err(Error::shape(format!(
                            "'$expand: {key}: {primitive}' is invalid, use '$expand: {key}: $expand: {primitive}' instead."
                        ))),
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Expand::Object),
            other => Err(Error::InvalidResource(js_type(other))),
        }
    }
}

fn expand_options(path: &str, map: &Map<String, Value>) -> Result<ODataOptions> {
    map.iter()
        .map(|(key, value)| {
            if !key.starts_with('$') {
                return Err(Error::shape(format!(
                    "'$expand: {path}: {key}: ...' is invalid, use '$expand: {path}: $expand: {key}: ...' instead."
                )));
            }
            if key == "$count" {
                return match value {
                    Value::Object(inner) => expand_options(path, inner).map(ODataOption::Count),
                    other => Err(Error::shape(format!(
                        "'$count' option has to be an object, got: {}",
                        js_type(other)
                    ))),
                };
            }
            query_option(key, value)?.ok_or_else(|| Error::UnknownExpandOption(key.clone()))
        })
        .collect()
}

// OrderBy

const DIRECTION_ERROR: &str = "'$orderby' direction must be 'asc' or 'desc'";

fn sort_dir(value: &Value) -> Result<SortDir> {
    value
        .as_str()
        .and_then(SortDir::from_name)
        .ok_or_else(|| Error::shape(DIRECTION_ERROR))
}

impl TryFrom<&Value> for OrderBy {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(OrderBy::Raw(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(OrderBy::try_from)
                .collect::<Result<Vec<_>>>()
                .map(OrderBy::List),
            Value::Object(map) => {
                let dir = map.get("$dir").map(sort_dir).transpose()?;
                let entries = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "$dir")
                    .map(|(key, value)| Ok((key.clone(), orderby_value(value)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(OrderBy::Object { entries, dir })
            }
            _ => Err(Error::shape(
                "'$orderby' option has to be either a string, array, or object",
            )),
        }
    }
}

fn orderby_value(value: &Value) -> Result<OrderByValue> {
    let Value::Object(map) = value else {
        return sort_dir(value).map(OrderByValue::Dir);
    };
    let count = match map.get("$count") {
        Some(count) if map.len() == 1 => count,
        _ => {
            return Err(Error::shape(format!(
                "When using '$orderby: {{ a: {{ $count: ... }}, $dir: 'asc' }}' you can only specify $count, got: '{}'",
                json_keys(map)
            )));
        }
    };
    let count_keys = match count {
        Value::Object(inner) if inner.keys().all(|key| key == "$filter") => inner,
        Value::Object(inner) => {
            return Err(Error::shape(format!(
                "When using '$orderby: {{ a: {{ $count: ... }}, $dir: 'asc' }}' you can only specify $filter in the $count, got: '{}'",
                json_keys(inner)
            )));
        }
        other => {
            return Err(Error::shape(format!(
                "'$count' option has to be an object, got: {}",
                js_type(other)
            )));
        }
    };
    Ok(OrderByValue::Count(CountOptions {
        filter: count_keys.get("$filter").map(Filter::try_from).transpose()?,
    }))
}

// Options

/// Parse a recognised `$` option. `Ok(None)` means the name is not an `OData` option.
fn query_option(key: &str, value: &Value) -> Result<Option<ODataOption>> {
    let option = match key {
        "$filter" => ODataOption::Filter(Filter::try_from(value)?),
        "$expand" => ODataOption::Expand(Expand::try_from(value)?),
        "$orderby" => ODataOption::OrderBy(OrderBy::try_from(value)?),
        "$top" | "$skip" => {
            let n = value
                .as_u64()
                .ok_or_else(|| Error::shape(format!("'{key}' option has to be a number")))?;
            if key == "$top" {
                ODataOption::Top(n)
            } else {
                ODataOption::Skip(n)
            }
        }
        "$select" => ODataOption::Select(select(value)?),
        "$format" => match value {
            Value::String(format) => ODataOption::Format(format.clone()),
            _ => return Err(Error::shape("'$format' option has to be a string")),
        },
        _ => return Ok(None),
    };
    Ok(Some(option))
}

fn select(value: &Value) -> Result<Select> {
    let invalid = || Error::shape("'$select' option has to be either a string or array");
    match value {
        Value::String(fields) => Ok(Select::Fields(fields.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()
            .map(Select::List),
        _ => Err(invalid()),
    }
}

fn custom_value(value: &Value) -> Result<CustomValue> {
    match value {
        Value::String(text) => Ok(CustomValue::Text(text.clone())),
        Value::Bool(b) => Ok(CustomValue::Bool(*b)),
        Value::Number(n) => Ok(CustomValue::Number(n.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                other => Err(Error::shape(format!(
                    "Unknown type for option {}",
                    js_type(other)
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(CustomValue::List),
        other => Err(Error::shape(format!(
            "Unknown type for option {}",
            js_type(other)
        ))),
    }
}

impl TryFrom<&Map<String, Value>> for ODataOptions {
    type Error = Error;

    fn try_from(map: &Map<String, Value>) -> Result<Self> {
        map.iter()
            .map(|(key, value)| {
                if key == "$count" {
                    return match value {
                        Value::Object(inner) => {
                            ODataOptions::try_from(inner).map(ODataOption::Count)
                        }
                        other => Err(Error::shape(format!(
                            "'$count' option has to be an object, got: {}",
                            js_type(other)
                        ))),
                    };
                }
                if key.starts_with('$') {
                    return query_option(key, value)?
                        .ok_or_else(|| Error::UnknownOption(key.clone()));
                }
                if let Some(name) = key.strip_prefix('@') {
                    if !is_primitive(value) {
                        return Err(Error::shape(format!(
                            "Unknown type for parameter alias option '{key}': {}",
                            js_type(value)
                        )));
                    }
                    return Ok(ODataOption::ParameterAlias(
                        name.to_owned(),
                        Primitive::try_from(value)?,
                    ));
                }
                Ok(ODataOption::Custom(key.clone(), custom_value(value)?))
            })
            .collect()
    }
}

impl TryFrom<&Value> for ODataOptions {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => ODataOptions::try_from(map),
            other => Err(Error::shape(format!(
                "Options must be an object, got: {}",
                js_type(other)
            ))),
        }
    }
}

// Query descriptions

fn alias_name(value: &Value) -> Result<String> {
    match value {
        Value::String(name) => Ok(name.clone()),
        other => Err(Error::InvalidParameterAlias(js_type(other))),
    }
}

impl TryFrom<&Value> for ResourceId {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(Error::NullId),
            Value::Object(map) => {
                if let Some(alias) = map.get("@") {
                    return alias_name(alias).map(ResourceId::Alias);
                }
                map.iter()
                    .map(|(key, value)| {
                        let component = match value {
                            Value::Object(inner) if inner.contains_key("@") => {
                                KeyValue::Alias(alias_name(&inner["@"])?)
                            }
                            other => KeyValue::Value(Primitive::try_from(other)?),
                        };
                        Ok((key.clone(), component))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(ResourceId::Composite)
            }
            scalar => Primitive::try_from(scalar).map(ResourceId::Value),
        }
    }
}

fn optional_string(map: &Map<String, Value>, field: &str) -> Result<Option<String>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::shape(format!(
            "'{field}' must be a string, got: {}",
            js_type(other)
        ))),
    }
}

impl TryFrom<&Value> for QueryParams {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::shape(format!(
                "Params must be an object, got: {}",
                js_type(value)
            )));
        };
        if map.get("customOptions").is_some_and(|v| !v.is_null()) {
            return Err(Error::custom_options());
        }
        Ok(QueryParams {
            resource: optional_string(map, "resource")?,
            id: map.get("id").map(ResourceId::try_from).transpose()?,
            action: optional_string(map, "action")?,
            url: optional_string(map, "url")?,
            options: match map.get("options") {
                None | Some(Value::Null) => None,
                Some(options) => Some(ODataOptions::try_from(options)?),
            },
        })
    }
}

impl TryFrom<&Value> for AuthParams {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::shape(format!(
                "Params must be an object, got: {}",
                js_type(value)
            )));
        };
        let required = |field: &str| {
            optional_string(map, field)?.ok_or_else(|| {
                Error::shape(format!("'{field}' must be a string, got: undefined"))
            })
        };
        let filter = map
            .get("options")
            .and_then(|options| options.get("$filter"))
            .map(Filter::try_from)
            .transpose()?;
        Ok(AuthParams {
            model_name: required("modelName")?,
            resource: required("resource")?,
            access: required("access")?,
            filter,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_keys_keep_their_order() {
        let filter = Filter::try_from(&json!({ "z": 1, "a": 2 })).unwrap();
        let Filter::Object(entries) = filter else {
            panic!("expected an object filter");
        };
        let names: Vec<_> = entries
            .iter()
            .map(|entry| match entry {
                FilterEntry::Property(name, _) => name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, ["z", "a"]);
    }

    #[test]
    fn test_operator_keys_are_classified() {
        let filter = Filter::try_from(&json!({ "$eq": 1, "$contains": "x", "@": "p" })).unwrap();
        assert_eq!(
            filter,
            Filter::Object(vec![
                FilterEntry::Operator(Operator::Compare(BinaryOperator::Eq, Filter::from(1i64))),
                FilterEntry::Operator(Operator::Function(
                    FilterFunction::Contains,
                    Filter::from("x")
                )),
                FilterEntry::Alias("p".into()),
            ])
        );
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = Filter::try_from(&json!({ "$foo": 1 })).unwrap_err();
        assert_eq!(err.to_string(), "Unrecognised operator: '$foo'");
    }

    #[test]
    fn test_non_string_alias_reference_is_rejected() {
        let err = Filter::try_from(&json!({ "a": { "@": true } })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parameter alias reference must be a string, got: boolean"
        );
    }

    #[test]
    fn test_lambda_requires_alias_before_expr() {
        let err = Filter::try_from(&json!({ "$any": {} })).unwrap_err();
        assert_eq!(err.to_string(), "Lambda expression ($any) has no alias defined.");
        let err = Filter::try_from(&json!({ "$all": { "$alias": "x" } })).unwrap_err();
        assert_eq!(err.to_string(), "Lambda expression ($all) has no expr defined.");
    }

    #[test]
    fn test_composite_ids_accept_alias_components() {
        let id = ResourceId::try_from(&json!({ "a": 1, "b": { "@": "p1" } })).unwrap();
        assert_eq!(
            id,
            ResourceId::Composite(vec![
                ("a".into(), KeyValue::Value(1i64.into())),
                ("b".into(), KeyValue::Alias("p1".into())),
            ])
        );
    }

    #[test]
    fn test_custom_options_field_is_rejected() {
        let err = QueryParams::try_from(&json!({ "resource": "a", "customOptions": {} }))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`customOptions` has been removed, use `options` instead."
        );
    }

    #[test]
    fn test_auth_params_read_filter_from_options() {
        let params = AuthParams::try_from(&json!({
            "modelName": "resin",
            "resource": "actor",
            "access": "delete",
            "options": { "$filter": { "id": { "@": "__ACTOR_ID" } } }
        }))
        .unwrap();
        assert_eq!(params.model_name, "resin");
        assert!(params.filter.is_some());
    }
}
