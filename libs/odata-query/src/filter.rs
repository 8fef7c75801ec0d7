//! `$filter` compilation.

use std::collections::HashMap;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::escape::{
    encode_component, escape_parameter_alias, escape_path, escape_resource, escape_value,
    format_f64,
};
use crate::model::{
    BinaryOperator, CountOptions, DurationLiteral, Filter, FilterEntry, FilterFunction, Lambda,
    MethodCall, Operator, RawFilter,
};
use crate::term::{Term, bind, bracket_join};

const EQ: &str = " eq ";
const AND: &str = " and ";
const OR: &str = " or ";
const SLASH: &str = "/";

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static PLACEHOLDER: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"\$([a-zA-Z0-9]+)").expect("static regex should not panic")
});

/// Compile a filter tree to its bare `$filter` text.
///
/// # Errors
/// Returns an error when the tree uses a removed form or violates an arity rule.
pub fn build_filter(filter: &Filter) -> Result<String> {
    FilterCompiler::default()
        .build(filter, None, None)
        .map(Term::into_bare)
}

#[derive(Default)]
struct FilterCompiler {
    // Set while compiling the body of `$any` / `$all`, where nested navigation is allowed.
    in_lambda: bool,
}

impl FilterCompiler {
    fn build(
        &mut self,
        filter: &Filter,
        path: Option<&[String]>,
        join: Option<&str>,
    ) -> Result<Term> {
        match filter {
            Filter::Value(value) => Ok(bind(Term::atom(escape_value(value)), path, EQ)),
            Filter::List(items) => {
                let terms = self.list(items, None, 2)?;
                Ok(bind(bracket_join(terms, join.unwrap_or(OR)), path, EQ))
            }
            Filter::Object(entries) => {
                let terms = self.entries(entries, path)?;
                Ok(bracket_join(terms, join.unwrap_or(AND)))
            }
        }
    }

    fn list(
        &mut self,
        items: &[Filter],
        path: Option<&[String]>,
        min: usize,
    ) -> Result<Vec<Term>> {
        if items.len() < min {
            let items = Value::Array(items.iter().map(Value::from).collect());
            return Err(Error::arity(format!(
                "Filter arrays must have at least {min} elements, got: {items}"
            )));
        }
        items.iter().map(|item| self.build(item, path, None)).collect()
    }

    fn entries(
        &mut self,
        entries: &[FilterEntry],
        path: Option<&[String]>,
    ) -> Result<Vec<Term>> {
        entries
            .iter()
            .map(|entry| match entry {
                FilterEntry::Operator(operator) => self.operator(operator, path),
                FilterEntry::Alias(name) => {
                    Ok(bind(Term::atom(escape_parameter_alias(name)), path, EQ))
                }
                FilterEntry::Property(name, value) => self.property(name, value, path),
            })
            .collect()
    }

    fn property(&mut self, name: &str, value: &Filter, path: Option<&[String]>) -> Result<Term> {
        let nested = match path {
            Some(_) if !self.in_lambda => return Err(Error::nested_navigation()),
            Some(parent) => {
                let mut nested = parent.to_vec();
                nested.push(name.to_owned());
                nested
            }
            None => vec![name.to_owned()],
        };
        self.build(value, Some(&nested), None)
    }

    fn operator(&mut self, operator: &Operator, path: Option<&[String]>) -> Result<Term> {
        match operator {
            Operator::Compare(op, operand) => self.infix(*op, operand, path),
            Operator::Function(function, operand) => self.function(*function, operand, path),
            Operator::Duration(duration) => {
                Ok(bind(Term::atom(duration_literal(duration)?), path, EQ))
            }
            Operator::Raw(raw) => self.raw(raw, path),
            Operator::Resource(resource) => {
                Ok(bind(Term::atom(escape_resource(resource)), path, EQ))
            }
            Operator::Count(options) => self.count(options, path),
            Operator::And(operand) => Ok(bind(self.build(operand, None, Some(AND))?, path, EQ)),
            Operator::Or(operand) => Ok(bind(self.build(operand, None, Some(OR))?, path, EQ)),
            Operator::In(operand) => self.in_list(operand, path),
            Operator::Not(operand) => {
                let inner = self.build(operand, None, None)?.into_bare();
                Ok(bind(Term::atom(format!("not({inner})")), path, EQ))
            }
            Operator::Any(lambda) => self.lambda("any", lambda, path),
            Operator::All(lambda) => self.lambda("all", lambda, path),
            Operator::Method(call) => self.method(call, path),
            Operator::CanAccess => Ok(bind(Term::atom("canAccess()"), path, SLASH)),
        }
    }

    fn infix(
        &mut self,
        op: BinaryOperator,
        operand: &Filter,
        path: Option<&[String]>,
    ) -> Result<Term> {
        let separator = format!(" {} ", op.name());
        match operand {
            Filter::Value(value) => Ok(bind(Term::atom(escape_value(value)), path, &separator)),
            Filter::List(items) => {
                let terms = self.list(items, None, 2)?;
                Ok(bind(bracket_join(terms, &separator), path, EQ))
            }
            Filter::Object(entries) => {
                let mut terms = self.entries(entries, None)?;
                match terms.len() {
                    0 => Err(Error::arity(format!(
                        "${} objects must have at least 1 property, got: {{}}",
                        op.name()
                    ))),
                    1 => Ok(bind(terms.remove(0), path, &separator)),
                    _ => Ok(bind(bracket_join(terms, &separator), path, EQ)),
                }
            }
        }
    }

    fn function(
        &mut self,
        function: FilterFunction,
        operand: &Filter,
        path: Option<&[String]>,
    ) -> Result<Term> {
        let name = function.name();
        match operand {
            Filter::Value(value) => {
                let mut args = Vec::with_capacity(2);
                if let Some(path) = path {
                    args.push(escape_path(path));
                }
                if !value.is_null() {
                    args.push(escape_value(value));
                }
                Ok(Term::atom(format!("{name}({})", args.join(","))))
            }
            Filter::List(items) => {
                let terms = self.list(items, None, 2)?;
                Ok(bind(call(name, terms), path, EQ))
            }
            Filter::Object(entries) => {
                let terms = self.entries(entries, None)?;
                Ok(bind(call(name, terms), path, EQ))
            }
        }
    }

    fn raw(&mut self, raw: &RawFilter, path: Option<&[String]>) -> Result<Term> {
        let text = match raw {
            RawFilter::Text(text) => format!("({text})"),
            RawFilter::Template { template, params } => {
                let mut compiled = HashMap::with_capacity(params.len());
                for (name, param) in params {
                    let value = self.build(param, None, None)?.into_bare();
                    compiled.insert(name.as_str(), format!("({value})"));
                }
                // Single pass: substituted text is never scanned for placeholders again.
                let substituted = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
                    compiled
                        .get(&caps[1])
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_owned())
                });
                format!("({substituted})")
            }
        };
        Ok(bind(Term::atom(text), path, EQ))
    }

    fn count(&mut self, options: &CountOptions, path: Option<&[String]>) -> Result<Term> {
        let base = match path {
            Some(path) => {
                let mut segments = path.to_vec();
                segments.push("$count".to_owned());
                escape_path(&segments)
            }
            None => "$count".to_owned(),
        };
        let text = match &options.filter {
            Some(filter) => {
                let inner = self.build(filter, None, None)?.into_bare();
                format!("{base}($filter={inner})")
            }
            None => base,
        };
        Ok(Term::atom(text))
    }

    fn in_list(&mut self, operand: &Filter, path: Option<&[String]>) -> Result<Term> {
        match operand {
            Filter::Value(value) => Ok(bind(Term::atom(escape_value(value)), path, EQ)),
            Filter::List(items) if items.iter().all(|item| matches!(item, Filter::Value(_))) => {
                let values: Vec<String> = self
                    .list(items, None, 1)?
                    .into_iter()
                    .map(Term::into_grouped)
                    .collect();
                Ok(bind(Term::atom(format!("({})", values.join(", "))), path, " in "))
            }
            Filter::List(items) => Ok(bracket_join(self.list(items, path, 1)?, OR)),
            Filter::Object(entries) => {
                let terms = self.entries(entries, path)?;
                if terms.is_empty() {
                    return Err(Error::arity("$in objects must have at least 1 property, got: {}"));
                }
                Ok(bracket_join(terms, OR))
            }
        }
    }

    fn lambda(&mut self, name: &str, lambda: &Lambda, path: Option<&[String]>) -> Result<Term> {
        let outer = std::mem::replace(&mut self.in_lambda, true);
        let expr = self.build(&lambda.expr, None, None);
        self.in_lambda = outer;
        let expr = expr?.into_bare();
        Ok(bind(
            Term::atom(format!("{name}({}:{expr})", lambda.alias)),
            path,
            SLASH,
        ))
    }

    fn method(&mut self, call: &MethodCall, path: Option<&[String]>) -> Result<Term> {
        let args = call
            .args
            .iter()
            .map(|arg| self.build(arg, None, None).map(Term::into_bare))
            .collect::<Result<Vec<_>>>()?;
        let text = format!(
            "{}.{}({})",
            encode_component(&call.scope),
            encode_component(&call.method),
            args.join(",")
        );
        Ok(bind(Term::atom(text), path, SLASH))
    }
}

fn call(name: &str, args: Vec<Term>) -> Term {
    let args: Vec<String> = args.into_iter().map(Term::into_bare).collect();
    Term::atom(format!("{name}({})", args.join(",")))
}

fn duration_literal(duration: &DurationLiteral) -> Result<String> {
    let is_set = |value: f64| value.abs() > 0.0;
    let days = if is_set(duration.days) {
        format!("{}D", format_f64(duration.days))
    } else {
        String::new()
    };
    let time: String = [
        (duration.hours, 'H'),
        (duration.minutes, 'M'),
        (duration.seconds, 'S'),
    ]
    .into_iter()
    .filter(|(value, _)| is_set(*value))
    .fold(String::new(), |mut time, (value, unit)| {
        time.push_str(&format_f64(value));
        time.push(unit);
        time
    });
    if days.is_empty() && time.is_empty() {
        return Err(Error::shape(
            "Expected $duration to include duration properties, got: object",
        ));
    }
    let sign = if duration.negative { "-" } else { "" };
    let time = if time.is_empty() { time } else { format!("T{time}") };
    Ok(format!("duration'{sign}P{days}{time}'"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::Primitive;

    #[test]
    fn test_duration_literal_skips_zero_components() {
        let duration = DurationLiteral {
            negative: true,
            days: 6.0,
            hours: 23.0,
            minutes: 59.0,
            seconds: 59.9999,
        };
        assert_eq!(duration_literal(&duration).unwrap(), "duration'-P6DT23H59M59.9999S'");

        let hours = DurationLiteral {
            hours: 23.0,
            ..DurationLiteral::default()
        };
        assert_eq!(duration_literal(&hours).unwrap(), "duration'PT23H'");
    }

    #[test]
    fn test_empty_duration_is_rejected() {
        let err = duration_literal(&DurationLiteral::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected $duration to include duration properties, got: object"
        );
    }

    #[test]
    fn test_lambda_flag_is_restored_after_error() {
        let mut compiler = FilterCompiler::default();
        let lambda = Lambda {
            alias: "x".into(),
            expr: Filter::operator(Operator::Raw(RawFilter::Text("x".into()))),
        };
        compiler.lambda("any", &lambda, None).unwrap();
        assert!(!compiler.in_lambda);

        let failing = Lambda {
            alias: "x".into(),
            expr: Filter::List(vec![]),
        };
        assert!(compiler.lambda("any", &failing, None).is_err());
        assert!(!compiler.in_lambda);
    }

    #[test]
    fn test_placeholders_without_params_are_kept() {
        let raw = RawFilter::Template {
            template: "a eq $x and b eq $1".into(),
            params: vec![("1".into(), Filter::Value(Primitive::from(2i64)))],
        };
        let term = FilterCompiler::default().raw(&raw, None).unwrap();
        assert_eq!(term.into_bare(), "(a eq $x and b eq (2))");
    }

    #[test]
    fn test_function_with_path_and_null_operand() {
        let path = vec!["a".to_owned()];
        let term = FilterCompiler::default()
            .function(FilterFunction::ToLower, &Filter::null(), Some(&path))
            .unwrap();
        assert_eq!(term.into_bare(), "tolower(a)");
    }
}
