//! Typed descriptions back to their JSON form.
//!
//! Error messages quote the offending input as JSON, the shape callers wrote.

use chrono::SecondsFormat;
use serde_json::{Map, Number, Value, json};

use crate::model::{
    CountOptions, DurationLiteral, Filter, FilterEntry, Lambda, MethodCall, Operator, Primitive,
    RawFilter, ResourcePath,
};

impl From<&Primitive> for Value {
    fn from(primitive: &Primitive) -> Self {
        match primitive {
            Primitive::Null => Value::Null,
            Primitive::Bool(value) => Value::Bool(*value),
            Primitive::Number(number) => Value::Number(number.clone()),
            Primitive::String(text) => Value::String(text.clone()),
            Primitive::DateTime(date) => {
                Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl From<&Filter> for Value {
    fn from(filter: &Filter) -> Self {
        match filter {
            Filter::Value(primitive) => Value::from(primitive),
            Filter::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            Filter::Object(entries) => Value::Object(entries.iter().map(entry).collect()),
        }
    }
}

fn entry(entry: &FilterEntry) -> (String, Value) {
    match entry {
        FilterEntry::Property(name, filter) => (name.clone(), Value::from(filter)),
        FilterEntry::Alias(name) => ("@".to_owned(), Value::String(name.clone())),
        FilterEntry::Operator(operator) => operator_entry(operator),
    }
}

fn operator_entry(operator: &Operator) -> (String, Value) {
    let (key, value) = match operator {
        Operator::Compare(op, operand) => return (format!("${}", op.name()), operand.into()),
        Operator::Function(function, operand) => {
            return (format!("${}", function.name()), operand.into());
        }
        Operator::Duration(duration) => ("$duration", duration_value(duration)),
        Operator::Raw(raw) => ("$raw", raw_value(raw)),
        Operator::Resource(path) => ("$", resource_value(path)),
        Operator::Count(count) => ("$count", count_value(count)),
        Operator::And(operand) => ("$and", operand.into()),
        Operator::Or(operand) => ("$or", operand.into()),
        Operator::In(operand) => ("$in", operand.into()),
        Operator::Not(operand) => ("$not", operand.into()),
        Operator::Any(lambda) => ("$any", lambda_value(lambda)),
        Operator::All(lambda) => ("$all", lambda_value(lambda)),
        Operator::Method(call) => ("$fn", method_value(call)),
        Operator::CanAccess => ("$canAccess", Value::Bool(true)),
    };
    (key.to_owned(), value)
}

/// Whole components print as integers, as they were most likely written.
#[allow(clippy::cast_possible_truncation)] // guarded by the range check
fn component(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Value::from(value as i64);
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn duration_value(duration: &DurationLiteral) -> Value {
    let mut map = Map::new();
    if duration.negative {
        map.insert("negative".to_owned(), Value::Bool(true));
    }
    for (name, value) in [
        ("days", duration.days),
        ("hours", duration.hours),
        ("minutes", duration.minutes),
        ("seconds", duration.seconds),
    ] {
        if value != 0.0 {
            map.insert(name.to_owned(), component(value));
        }
    }
    Value::Object(map)
}

fn raw_value(raw: &RawFilter) -> Value {
    match raw {
        RawFilter::Text(text) => Value::String(text.clone()),
        RawFilter::Template { template, params } => {
            let positional = params
                .iter()
                .enumerate()
                .all(|(index, (name, _))| *name == (index + 1).to_string());
            if positional {
                let mut items = vec![Value::String(template.clone())];
                items.extend(params.iter().map(|(_, param)| Value::from(param)));
                Value::Array(items)
            } else {
                let mut map = Map::new();
                map.insert("$string".to_owned(), Value::String(template.clone()));
                map.extend(
                    params
                        .iter()
                        .map(|(name, param)| (name.clone(), Value::from(param))),
                );
                Value::Object(map)
            }
        }
    }
}

fn resource_value(path: &ResourcePath) -> Value {
    match path {
        ResourcePath::Single(name) => Value::String(name.clone()),
        ResourcePath::Segments(segments) => json!(segments),
    }
}

fn count_value(count: &CountOptions) -> Value {
    match &count.filter {
        Some(filter) => json!({ "$filter": Value::from(filter) }),
        None => json!({}),
    }
}

fn lambda_value(lambda: &Lambda) -> Value {
    json!({ "$alias": lambda.alias, "$expr": Value::from(&lambda.expr) })
}

fn method_value(call: &MethodCall) -> Value {
    json!({
        "$scope": call.scope,
        "$method": call.method,
        "$args": call.args.iter().map(Value::from).collect::<Vec<_>>(),
    })
}
