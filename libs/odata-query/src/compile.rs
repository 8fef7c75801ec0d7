//! Query description to URL compilation.

use crate::diagnostics::{Deprecation, DiagnosticsSink, NoopDiagnostics};
use crate::error::{Error, Result};
use crate::escape::{escape_parameter_alias, escape_resource, escape_value};
use crate::expand::build_expand;
use crate::filter::build_filter;
use crate::model::{
    AuthParams, Expand, Filter, KeyValue, ODataOption, ODataOptions, OrderBy, QueryParams,
    ResourceId, ResourcePath,
};
use crate::options::build_option;
use crate::orderby::build_orderby;

/// Compiles query descriptions, reporting deprecated input to a sink.
///
/// The compiler holds no state of its own; one instance can be shared freely.
#[derive(Clone, Copy)]
pub struct QueryCompiler<'a> {
    diagnostics: &'a dyn DiagnosticsSink,
}

impl Default for QueryCompiler<'static> {
    fn default() -> Self {
        Self::new(&NoopDiagnostics)
    }
}

impl std::fmt::Debug for QueryCompiler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCompiler").finish_non_exhaustive()
    }
}

impl<'a> QueryCompiler<'a> {
    #[must_use]
    pub fn new(diagnostics: &'a dyn DiagnosticsSink) -> Self {
        Self { diagnostics }
    }

    /// Compile `params` to a path and query string, without any API prefix.
    ///
    /// # Errors
    /// Returns an error when no resource is given, when the id is null, or
    /// when any option fails to compile.
    pub fn compile(&self, params: &QueryParams) -> Result<String> {
        if let Some(url) = &params.url {
            self.diagnostics.deprecated(&Deprecation::UrlParameter);
            return Ok(url.clone());
        }
        let resource = params.resource.as_deref().ok_or(Error::MissingResource)?;
        if resource.ends_with("/$count") {
            return Err(Error::count_resource());
        }

        let mut url = escape_resource(&ResourcePath::Single(resource.to_owned()));
        if let Some(id) = &params.id {
            url.push('(');
            url.push_str(&build_id(id)?);
            url.push(')');
        }
        if let Some(action) = &params.action {
            url.push('/');
            url.push_str(action);
        }

        let Some(mut options) = params.options.as_ref() else {
            return Ok(url);
        };
        if let Some(inner) = options.count() {
            if options.len() > 1 {
                return Err(Error::shape(format!(
                    "When using '$count' you can only specify $count, got: '{}'",
                    serde_json::to_string(&options.keys()).unwrap_or_default()
                )));
            }
            url.push_str("/$count");
            options = inner;
        }
        let query = self.build_options(options)?;
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        Ok(url)
    }

    /// `<model>.<resource>.<access>` with an optional `?<filter>`.
    ///
    /// # Errors
    /// Returns an error when the filter fails to compile.
    pub fn compile_auth(&self, params: &AuthParams) -> Result<String> {
        let base = format!("{}.{}.{}", params.model_name, params.resource, params.access);
        match &params.filter {
            Some(filter) => Ok(format!("{base}?{}", build_filter(filter)?)),
            None => Ok(base),
        }
    }

    /// # Errors
    /// See [`build_filter`].
    pub fn build_filter(&self, filter: &Filter) -> Result<String> {
        build_filter(filter)
    }

    /// # Errors
    /// See [`build_expand`].
    pub fn build_expand(&self, expand: &Expand) -> Result<String> {
        build_expand(expand, self.diagnostics)
    }

    /// # Errors
    /// See [`build_orderby`].
    pub fn build_orderby(&self, orderby: &OrderBy) -> Result<String> {
        build_orderby(orderby, self.diagnostics)
    }

    /// Compile one option to `key=value`.
    ///
    /// # Errors
    /// Returns an error when the option value fails to compile.
    pub fn build_option(&self, option: &ODataOption) -> Result<String> {
        build_option(option, self.diagnostics)
    }

    /// Compile an option set to its `&`-joined query string, without the `?`.
    ///
    /// # Errors
    /// Returns the first option error.
    pub fn build_options(&self, options: &ODataOptions) -> Result<String> {
        let parts = options
            .iter()
            .map(|option| self.build_option(option))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join("&"))
    }
}

fn build_id(id: &ResourceId) -> Result<String> {
    match id {
        ResourceId::Value(value) if value.is_null() => Err(Error::NullId),
        ResourceId::Value(value) => Ok(escape_value(value)),
        ResourceId::Alias(name) => Ok(escape_parameter_alias(name)),
        ResourceId::Composite(keys) => {
            let parts: Vec<String> = keys
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        KeyValue::Value(value) => escape_value(value),
                        KeyValue::Alias(name) => escape_parameter_alias(name),
                    };
                    format!("{key}={value}")
                })
                .collect();
            Ok(parts.join(","))
        }
    }
}
