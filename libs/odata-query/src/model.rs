//! Typed query descriptions.
//!
//! Every shape a query description can take is a closed enum here. JSON input
//! is converted into these types by their `TryFrom<&serde_json::Value>` impls;
//! the compilers only ever see the typed form.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::Number;

use crate::error::{Error, Result};

/// A scalar value that compiles to an `OData` literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    DateTime(DateTime<Utc>),
}

impl Primitive {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Primitive::Null)
    }

    /// Build a numeric primitive from a float.
    ///
    /// # Errors
    /// Returns `Error::InvalidValue` for `NaN` and infinities.
    pub fn from_f64(value: f64) -> Result<Self> {
        Number::from_f64(value)
            .map(Primitive::Number)
            .ok_or(Error::InvalidValue("number"))
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::String(value.to_owned())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Primitive::String(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Bool(value)
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Primitive::Number(value.into())
    }
}

impl From<u64> for Primitive {
    fn from(value: u64) -> Self {
        Primitive::Number(value.into())
    }
}

impl From<i32> for Primitive {
    fn from(value: i32) -> Self {
        Primitive::Number(value.into())
    }
}

impl From<DateTime<Utc>> for Primitive {
    fn from(value: DateTime<Utc>) -> Self {
        Primitive::DateTime(value)
    }
}

/// A `$filter` tree.
///
/// Lists are joined with `or` and objects with `and` unless an enclosing
/// operator chooses another join word.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Value(Primitive),
    List(Vec<Filter>),
    Object(Vec<FilterEntry>),
}

impl Filter {
    /// An object filter built from its entries, in order.
    #[must_use]
    pub fn object(entries: impl IntoIterator<Item = FilterEntry>) -> Self {
        Filter::Object(entries.into_iter().collect())
    }

    /// `{ name: value }`
    #[must_use]
    pub fn property(name: impl Into<String>, value: impl Into<Filter>) -> Self {
        Filter::Object(vec![FilterEntry::Property(name.into(), value.into())])
    }

    /// `{ $op: ... }`
    #[must_use]
    pub fn operator(operator: Operator) -> Self {
        Filter::Object(vec![FilterEntry::Operator(operator)])
    }

    #[must_use]
    pub fn null() -> Self {
        Filter::Value(Primitive::Null)
    }
}

impl From<Primitive> for Filter {
    fn from(value: Primitive) -> Self {
        Filter::Value(value)
    }
}

impl From<&str> for Filter {
    fn from(value: &str) -> Self {
        Filter::Value(value.into())
    }
}

impl From<String> for Filter {
    fn from(value: String) -> Self {
        Filter::Value(value.into())
    }
}

impl From<bool> for Filter {
    fn from(value: bool) -> Self {
        Filter::Value(value.into())
    }
}

impl From<i64> for Filter {
    fn from(value: i64) -> Self {
        Filter::Value(value.into())
    }
}

impl From<i32> for Filter {
    fn from(value: i32) -> Self {
        Filter::Value(value.into())
    }
}

impl From<Vec<Filter>> for Filter {
    fn from(value: Vec<Filter>) -> Self {
        Filter::List(value)
    }
}

impl From<Operator> for Filter {
    fn from(value: Operator) -> Self {
        Filter::operator(value)
    }
}

/// One key of an object filter.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterEntry {
    /// A plain key: one navigation step.
    Property(String, Filter),
    /// An `@` key: a parameter alias reference.
    Alias(String),
    /// A `$` key.
    Operator(Operator),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    Compare(BinaryOperator, Filter),
    Function(FilterFunction, Filter),
    Duration(DurationLiteral),
    Raw(RawFilter),
    Resource(ResourcePath),
    Count(CountOptions),
    And(Filter),
    Or(Filter),
    In(Filter),
    Not(Filter),
    Any(Lambda),
    All(Lambda),
    Method(MethodCall),
    CanAccess,
}

/// Infix operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    pub const ALL: &'static [BinaryOperator] = &[
        BinaryOperator::Eq,
        BinaryOperator::Ne,
        BinaryOperator::Gt,
        BinaryOperator::Ge,
        BinaryOperator::Lt,
        BinaryOperator::Le,
        BinaryOperator::Add,
        BinaryOperator::Sub,
        BinaryOperator::Mul,
        BinaryOperator::Div,
        BinaryOperator::Mod,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BinaryOperator::Eq => "eq",
            BinaryOperator::Ne => "ne",
            BinaryOperator::Gt => "gt",
            BinaryOperator::Ge => "ge",
            BinaryOperator::Lt => "lt",
            BinaryOperator::Le => "le",
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::Div => "div",
            BinaryOperator::Mod => "mod",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

/// Function-call operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterFunction {
    Contains,
    EndsWith,
    StartsWith,
    Length,
    IndexOf,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    FractionalSeconds,
    Date,
    Time,
    TotalOffsetMinutes,
    Now,
    MaxDateTime,
    MinDateTime,
    TotalSeconds,
    Round,
    Floor,
    Ceiling,
    IsOf,
    Cast,
}

impl FilterFunction {
    pub const ALL: &'static [FilterFunction] = &[
        FilterFunction::Contains,
        FilterFunction::EndsWith,
        FilterFunction::StartsWith,
        FilterFunction::Length,
        FilterFunction::IndexOf,
        FilterFunction::Substring,
        FilterFunction::ToLower,
        FilterFunction::ToUpper,
        FilterFunction::Trim,
        FilterFunction::Concat,
        FilterFunction::Year,
        FilterFunction::Month,
        FilterFunction::Day,
        FilterFunction::Hour,
        FilterFunction::Minute,
        FilterFunction::Second,
        FilterFunction::FractionalSeconds,
        FilterFunction::Date,
        FilterFunction::Time,
        FilterFunction::TotalOffsetMinutes,
        FilterFunction::Now,
        FilterFunction::MaxDateTime,
        FilterFunction::MinDateTime,
        FilterFunction::TotalSeconds,
        FilterFunction::Round,
        FilterFunction::Floor,
        FilterFunction::Ceiling,
        FilterFunction::IsOf,
        FilterFunction::Cast,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FilterFunction::Contains => "contains",
            FilterFunction::EndsWith => "endswith",
            FilterFunction::StartsWith => "startswith",
            FilterFunction::Length => "length",
            FilterFunction::IndexOf => "indexof",
            FilterFunction::Substring => "substring",
            FilterFunction::ToLower => "tolower",
            FilterFunction::ToUpper => "toupper",
            FilterFunction::Trim => "trim",
            FilterFunction::Concat => "concat",
            FilterFunction::Year => "year",
            FilterFunction::Month => "month",
            FilterFunction::Day => "day",
            FilterFunction::Hour => "hour",
            FilterFunction::Minute => "minute",
            FilterFunction::Second => "second",
            FilterFunction::FractionalSeconds => "fractionalseconds",
            FilterFunction::Date => "date",
            FilterFunction::Time => "time",
            FilterFunction::TotalOffsetMinutes => "totaloffsetminutes",
            FilterFunction::Now => "now",
            FilterFunction::MaxDateTime => "maxdatetime",
            FilterFunction::MinDateTime => "mindatetime",
            FilterFunction::TotalSeconds => "totalseconds",
            FilterFunction::Round => "round",
            FilterFunction::Floor => "floor",
            FilterFunction::Ceiling => "ceiling",
            FilterFunction::IsOf => "isof",
            FilterFunction::Cast => "cast",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Components of an ISO-8601 duration literal. Zero components are omitted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DurationLiteral {
    pub negative: bool,
    pub days: f64,
    pub hours: f64,
    pub minutes: f64,
    pub seconds: f64,
}

/// A caller supplied `OData` fragment.
#[derive(Clone, Debug, PartialEq)]
pub enum RawFilter {
    Text(String),
    /// `$name` placeholders in `template` are replaced by the compiled
    /// parameter of the same name.
    Template {
        template: String,
        params: Vec<(String, Filter)>,
    },
}

impl RawFilter {
    /// Template with `$1`, `$2`, ... placeholders bound in order.
    #[must_use]
    pub fn positional(template: impl Into<String>, params: Vec<Filter>) -> Self {
        RawFilter::Template {
            template: template.into(),
            params: params
                .into_iter()
                .enumerate()
                .map(|(index, param)| ((index + 1).to_string(), param))
                .collect(),
        }
    }
}

/// A resource name or a path of segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourcePath {
    Single(String),
    Segments(Vec<String>),
}

impl From<&str> for ResourcePath {
    fn from(value: &str) -> Self {
        ResourcePath::Single(value.to_owned())
    }
}

/// Body of a `$count` used inside `$filter` and `$orderby`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountOptions {
    pub filter: Option<Filter>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lambda {
    pub alias: String,
    pub expr: Filter,
}

/// A bound method call, `scope.method(args)`.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodCall {
    pub scope: String,
    pub method: String,
    pub args: Vec<Filter>,
}

/// An `$expand` tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expand {
    Path(String),
    List(Vec<Expand>),
    /// Navigation properties with the options applied to each.
    Object(Vec<(String, ODataOptions)>),
}

impl From<&str> for Expand {
    fn from(value: &str) -> Self {
        Expand::Path(value.to_owned())
    }
}

// Ordering primitives
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SortDir {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

impl SortDir {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "asc" => Some(SortDir::Asc),
            "desc" => Some(SortDir::Desc),
            _ => None,
        }
    }
}

/// An `$orderby` specification.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderBy {
    Raw(String),
    List(Vec<OrderBy>),
    /// `{ prop: dir }` or `{ prop: { $count: ... }, $dir: dir }`.
    Object {
        entries: Vec<(String, OrderByValue)>,
        dir: Option<SortDir>,
    },
}

impl OrderBy {
    /// `{ property: dir }`
    #[must_use]
    pub fn by(property: impl Into<String>, dir: SortDir) -> Self {
        OrderBy::Object {
            entries: vec![(property.into(), OrderByValue::Dir(dir))],
            dir: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderByValue {
    Dir(SortDir),
    Count(CountOptions),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Select {
    Fields(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

/// Value of an option that is not part of the `OData` grammar.
#[derive(Clone, Debug, PartialEq)]
pub enum CustomValue {
    Text(String),
    Bool(bool),
    Number(Number),
    List(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ODataOption {
    Filter(Filter),
    Expand(Expand),
    OrderBy(OrderBy),
    Top(u64),
    Skip(u64),
    Select(Select),
    Format(String),
    Count(ODataOptions),
    /// `@name=value`; the name is stored without the `@`.
    ParameterAlias(String, Primitive),
    Custom(String, CustomValue),
}

impl ODataOption {
    /// The query string key this option is written under.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            ODataOption::Filter(_) => "$filter".to_owned(),
            ODataOption::Expand(_) => "$expand".to_owned(),
            ODataOption::OrderBy(_) => "$orderby".to_owned(),
            ODataOption::Top(_) => "$top".to_owned(),
            ODataOption::Skip(_) => "$skip".to_owned(),
            ODataOption::Select(_) => "$select".to_owned(),
            ODataOption::Format(_) => "$format".to_owned(),
            ODataOption::Count(_) => "$count".to_owned(),
            ODataOption::ParameterAlias(name, _) => format!("@{name}"),
            ODataOption::Custom(name, _) => name.clone(),
        }
    }
}

/// An ordered set of query options. Output order follows insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ODataOptions(Vec<ODataOption>);

impl ODataOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, option: ODataOption) -> Self {
        self.0.push(option);
        self
    }

    #[must_use]
    pub fn with_filter(self, filter: Filter) -> Self {
        self.with(ODataOption::Filter(filter))
    }

    #[must_use]
    pub fn with_expand(self, expand: Expand) -> Self {
        self.with(ODataOption::Expand(expand))
    }

    #[must_use]
    pub fn with_orderby(self, orderby: OrderBy) -> Self {
        self.with(ODataOption::OrderBy(orderby))
    }

    #[must_use]
    pub fn with_select(self, select: Select) -> Self {
        self.with(ODataOption::Select(select))
    }

    #[must_use]
    pub fn with_top(self, top: u64) -> Self {
        self.with(ODataOption::Top(top))
    }

    #[must_use]
    pub fn with_skip(self, skip: u64) -> Self {
        self.with(ODataOption::Skip(skip))
    }

    /// Wrap these options in a `$count` request.
    #[must_use]
    pub fn counted(self) -> Self {
        Self(vec![ODataOption::Count(self)])
    }

    pub fn push(&mut self, option: ODataOption) {
        self.0.push(option);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ODataOption> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.iter().map(ODataOption::key).collect()
    }

    /// The `$filter` option, if present.
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.0.iter().find_map(|option| match option {
            ODataOption::Filter(filter) => Some(filter),
            _ => None,
        })
    }

    /// The inner options of a `$count` option, if present.
    #[must_use]
    pub fn count(&self) -> Option<&ODataOptions> {
        self.0.iter().find_map(|option| match option {
            ODataOption::Count(inner) => Some(inner),
            _ => None,
        })
    }

    /// Replace the `$filter` option, keeping its position, or append one.
    pub fn set_filter(&mut self, filter: Filter) {
        match self
            .0
            .iter_mut()
            .find(|option| matches!(option, ODataOption::Filter(_)))
        {
            Some(slot) => *slot = ODataOption::Filter(filter),
            None => self.0.push(ODataOption::Filter(filter)),
        }
    }
}

impl FromIterator<ODataOption> for ODataOptions {
    fn from_iter<I: IntoIterator<Item = ODataOption>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ODataOptions {
    type Item = &'a ODataOption;
    type IntoIter = std::slice::Iter<'a, ODataOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One component of a composite key.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyValue {
    Value(Primitive),
    Alias(String),
}

/// The id predicate appended to a resource.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceId {
    Value(Primitive),
    Alias(String),
    Composite(Vec<(String, KeyValue)>),
}

impl From<Primitive> for ResourceId {
    fn from(value: Primitive) -> Self {
        ResourceId::Value(value)
    }
}

impl From<i64> for ResourceId {
    fn from(value: i64) -> Self {
        ResourceId::Value(value.into())
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        ResourceId::Value(value.into())
    }
}

/// A complete query description.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams {
    pub resource: Option<String>,
    pub id: Option<ResourceId>,
    pub action: Option<String>,
    /// A precompiled url; returned verbatim when set.
    pub url: Option<String>,
    pub options: Option<ODataOptions>,
}

impl QueryParams {
    #[must_use]
    pub fn resource(resource: impl Into<String>) -> Self {
        Self {
            resource: Some(resource.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ODataOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Whether the compiled query asks for a bare count.
    #[must_use]
    pub fn is_count(&self) -> bool {
        self.options
            .as_ref()
            .is_some_and(|options| options.count().is_some())
    }
}

/// Input of [`crate::compile_auth`].
#[derive(Clone, Debug, PartialEq)]
pub struct AuthParams {
    pub model_name: String,
    pub resource: String,
    pub access: String,
    pub filter: Option<Filter>,
}
