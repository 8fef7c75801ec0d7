use thiserror::Error;

/// Errors raised while compiling a query description.
///
/// The `Display` text of every variant is the message shown to callers, so
/// tests and callers can match on it directly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Literal encoding errors
    #[error("Not a valid value: {0}")]
    InvalidValue(&'static str),

    #[error("Not a valid resource: {0}")]
    InvalidResource(&'static str),

    #[error("Parameter alias reference must be a string, got: {0}")]
    InvalidParameterAlias(&'static str),

    /// A value had the wrong type for the position it appeared in.
    #[error("{0}")]
    Shape(String),

    /// An array or object had fewer elements than required.
    #[error("{0}")]
    Arity(String),

    /// A removed syntax was used; the message names its replacement.
    #[error("{0}")]
    Removed(String),

    #[error("Unrecognised operator: '{0}'")]
    UnrecognisedOperator(String),

    #[error("Unknown odata option '{0}'")]
    UnknownOption(String),

    #[error("Unknown key option '{0}'")]
    UnknownExpandOption(String),

    #[error("Lambda expression ({operator}) has no {field} defined.")]
    LambdaMissing {
        operator: &'static str,
        field: &'static str,
    },

    // Query description errors
    #[error("Either the url or resource must be specified.")]
    MissingResource,

    #[error("If the id property is set it must be non-null")]
    NullId,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn nested_navigation() -> Self {
        Self::Removed(
            "`$filter: a: b: ...` has been removed, please use `$filter: a: $any: { $alias: \"x\", $expr: x: b: ... }` instead."
                .to_owned(),
        )
    }

    pub(crate) fn count_comparison() -> Self {
        Self::Removed(
            "`$filter: { a: { $count: { $op: number } } }` has been removed, please use `$filter: { $eq: [ { a: { $count: {} } }, number ] }` instead."
                .to_owned(),
        )
    }

    pub(crate) fn count_resource() -> Self {
        Self::Removed(
            "`resource: 'a/$count'` has been removed, please use `options: { $count: { ... } }` instead."
                .to_owned(),
        )
    }

    pub(crate) fn count_expand_path() -> Self {
        Self::Removed(
            "`$expand: { 'a/$count': {...} }` has been removed, please use `$expand: { a: { $count: {...} } }` instead."
                .to_owned(),
        )
    }

    pub(crate) fn custom_options() -> Self {
        Self::Removed("`customOptions` has been removed, use `options` instead.".to_owned())
    }

    pub(crate) fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    pub(crate) fn arity(message: impl Into<String>) -> Self {
        Self::Arity(message.into())
    }
}
