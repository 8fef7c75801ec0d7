#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Compiles structured query descriptions into `OData` v4 URLs.
//!
//! Descriptions are built either from the typed [`model`] or from JSON via the
//! `TryFrom<&serde_json::Value>` conversions, then handed to a
//! [`QueryCompiler`]:
//!
//! ```rust,ignore
//! let params = QueryParams::try_from(&json!({
//!     "resource": "pilot",
//!     "options": { "$filter": { "name": "x" }, "$top": 5 }
//! }))?;
//! assert_eq!(compile(&params)?, "pilot?$filter=name eq 'x'&$top=5");
//! ```

pub mod compile;
pub mod diagnostics;
pub mod error;
pub mod escape;
pub mod expand;
pub mod filter;
pub mod model;
pub mod orderby;

mod json;
mod options;
mod parse;
mod term;

pub use compile::QueryCompiler;
pub use diagnostics::{
    Deprecation, DiagnosticsSink, NoopDiagnostics, OnceDiagnostics, TracingDiagnostics,
};
pub use error::{Error, Result};
pub use escape::{escape_parameter_alias, escape_resource, escape_value};
pub use expand::build_expand;
pub use filter::build_filter;
pub use model::{
    AuthParams, BinaryOperator, CountOptions, CustomValue, DurationLiteral, Expand, Filter,
    FilterEntry, FilterFunction, KeyValue, Lambda, MethodCall, ODataOption, ODataOptions,
    Operator, OrderBy, OrderByValue, Primitive, QueryParams, RawFilter, ResourceId, ResourcePath,
    Select, SortDir,
};
pub use orderby::build_orderby;

/// Compile `params` with deprecations discarded.
///
/// # Errors
/// See [`QueryCompiler::compile`].
pub fn compile(params: &QueryParams) -> Result<String> {
    QueryCompiler::default().compile(params)
}

/// Compile an authorization string with deprecations discarded.
///
/// # Errors
/// See [`QueryCompiler::compile_auth`].
pub fn compile_auth(params: &AuthParams) -> Result<String> {
    QueryCompiler::default().compile_auth(params)
}
