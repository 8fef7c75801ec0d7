#![allow(clippy::unwrap_used, clippy::expect_used, clippy::needless_pass_by_value)]

//! Whole-URL compilation: resources, ids, options and ordering.

use std::sync::Mutex;

use odata_query::{
    AuthParams, Deprecation, DiagnosticsSink, Error, Filter, FilterEntry, ODataOptions, OrderBy,
    QueryCompiler, QueryParams, Select, SortDir, compile, compile_auth,
};
use serde_json::{Value, json};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Deprecation>>,
}

impl DiagnosticsSink for Recorder {
    fn deprecated(&self, deprecation: &Deprecation) {
        self.seen.lock().unwrap().push(deprecation.clone());
    }
}

fn url(value: Value) -> Result<String, Error> {
    compile(&QueryParams::try_from(&value)?)
}

fn error(value: Value) -> String {
    url(value).unwrap_err().to_string()
}

fn with_options(options: Value) -> Result<String, Error> {
    url(json!({ "resource": "pilot", "options": options }))
}

#[test]
fn test_resource_and_ids() {
    assert_eq!(url(json!({ "resource": "pilot" })).unwrap(), "pilot");
    assert_eq!(url(json!({ "resource": "pilot", "id": 5 })).unwrap(), "pilot(5)");
    assert_eq!(url(json!({ "resource": "pilot", "id": "x" })).unwrap(), "pilot('x')");
    assert_eq!(
        url(json!({ "resource": "pilot", "id": { "@": "p" } })).unwrap(),
        "pilot(@p)"
    );
    assert_eq!(
        url(json!({ "resource": "pilot", "id": { "a": 1, "b": "c" } })).unwrap(),
        "pilot(a=1,b='c')"
    );
    assert_eq!(
        url(json!({ "resource": "a", "id": 1, "action": "act" })).unwrap(),
        "a(1)/act"
    );
}

#[test]
fn test_invalid_params() {
    assert_eq!(
        error(json!({ "resource": "pilot", "id": null })),
        "If the id property is set it must be non-null"
    );
    assert_eq!(error(json!({})), "Either the url or resource must be specified.");
    assert_eq!(
        error(json!({ "resource": "pilot/$count" })),
        "`resource: 'a/$count'` has been removed, please use `options: { $count: { ... } }` instead."
    );
    assert_eq!(
        error(json!({ "resource": "pilot", "customOptions": { "a": 1 } })),
        "`customOptions` has been removed, use `options` instead."
    );
}

#[test]
fn test_url_is_returned_verbatim_with_a_deprecation() {
    let recorder = Recorder::default();
    let compiler = QueryCompiler::new(&recorder);
    let compiled = compiler.compile(&QueryParams::url("pilot?$top=1")).unwrap();
    assert_eq!(compiled, "pilot?$top=1");
    assert_eq!(*recorder.seen.lock().unwrap(), vec![Deprecation::UrlParameter]);
}

#[test]
fn test_options_keep_insertion_order() {
    assert_eq!(
        with_options(json!({ "$filter": { "name": "x" }, "$top": 5, "$skip": 10 })).unwrap(),
        "pilot?$filter=name eq 'x'&$top=5&$skip=10"
    );
    assert_eq!(
        with_options(json!({ "$select": ["a", "b"], "$format": "json" })).unwrap(),
        "pilot?$select=a,b&$format=json"
    );
}

#[test]
fn test_count_wrapper() {
    assert_eq!(
        with_options(json!({ "$count": { "$filter": { "a": "b" } } })).unwrap(),
        "pilot/$count?$filter=a eq 'b'"
    );
    assert_eq!(with_options(json!({ "$count": {} })).unwrap(), "pilot/$count");
    assert_eq!(
        with_options(json!({ "$count": {}, "$top": 1 })).unwrap_err().to_string(),
        "When using '$count' you can only specify $count, got: '[\"$count\",\"$top\"]'"
    );
}

#[test]
fn test_parameter_aliases_and_custom_options() {
    assert_eq!(
        with_options(json!({ "@p": "it's", "foo": "bar", "flag": true, "n": 2 })).unwrap(),
        "pilot?@p='it''s'&foo=bar&flag=true&n=2"
    );
    assert_eq!(with_options(json!({ "ids": [1, 2] })).unwrap(), "pilot?ids=1,2");
    assert_eq!(
        with_options(json!({ "@p": {} })).unwrap_err().to_string(),
        "Unknown type for parameter alias option '@p': object"
    );
    assert_eq!(
        with_options(json!({ "foo": null })).unwrap_err().to_string(),
        "Unknown type for option object"
    );
}

#[test]
fn test_option_type_errors() {
    let message = |options: Value| with_options(options).unwrap_err().to_string();
    assert_eq!(message(json!({ "$bogus": 1 })), "Unknown odata option '$bogus'");
    assert_eq!(message(json!({ "$top": "x" })), "'$top' option has to be a number");
    assert_eq!(message(json!({ "$skip": -1 })), "'$skip' option has to be a number");
    assert_eq!(
        message(json!({ "$select": [] })),
        "'$select' arrays have to have at least 1 element"
    );
    assert_eq!(
        message(json!({ "$select": 5 })),
        "'$select' option has to be either a string or array"
    );
}

#[test]
fn test_orderby_forms() {
    let orderby = |value: Value| with_options(json!({ "$orderby": value }));
    assert_eq!(orderby(json!("a asc")).unwrap(), "pilot?$orderby=a asc");
    assert_eq!(orderby(json!({ "a": "desc" })).unwrap(), "pilot?$orderby=a desc");
    assert_eq!(
        orderby(json!([{ "a": "asc" }, { "b": "desc" }])).unwrap(),
        "pilot?$orderby=a asc,b desc"
    );
    assert_eq!(
        orderby(json!({ "a": { "$count": {} }, "$dir": "desc" })).unwrap(),
        "pilot?$orderby=a/$count desc"
    );
    assert_eq!(
        orderby(json!({ "a": { "$count": { "$filter": { "b": "c" } } }, "$dir": "asc" })).unwrap(),
        "pilot?$orderby=a/$count($filter=b eq 'c') asc"
    );
}

#[test]
fn test_orderby_errors() {
    let message = |value: Value| {
        with_options(json!({ "$orderby": value }))
            .unwrap_err()
            .to_string()
    };
    assert_eq!(
        message(json!({ "a": "asc", "b": "desc" })),
        "'$orderby' objects must have exactly one element, got 2 elements"
    );
    assert_eq!(message(json!({ "a": "up" })), "'$orderby' direction must be 'asc' or 'desc'");
    assert_eq!(message(json!([])), "'$orderby' arrays have to have at least 1 element");
    assert_eq!(message(json!([["a"]])), "'$orderby' cannot have nested arrays");
    assert_eq!(
        message(json!(5)),
        "'$orderby' option has to be either a string, array, or object"
    );
    assert_eq!(
        message(json!({ "a": { "$count": {} } })),
        "'$orderby' objects should either use the '{ a: 'asc' }' or the $orderby: { a: { $count: ... }, $dir: 'asc' } notation"
    );
    assert_eq!(
        message(json!({ "a": { "$count": { "$select": "x" } }, "$dir": "asc" })),
        "When using '$orderby: { a: { $count: ... }, $dir: 'asc' }' you can only specify $filter in the $count, got: '[\"$select\"]'"
    );
    assert_eq!(
        message(json!({ "a": { "$filter": {} }, "$dir": "asc" })),
        "When using '$orderby: { a: { $count: ... }, $dir: 'asc' }' you can only specify $count, got: '[\"$filter\"]'"
    );
}

#[test]
fn test_orderby_count_string_is_deprecated() {
    let recorder = Recorder::default();
    let compiled = QueryCompiler::new(&recorder)
        .build_orderby(&OrderBy::Raw("a/$count asc".into()))
        .unwrap();
    assert_eq!(compiled, "a/$count asc");
    assert_eq!(
        *recorder.seen.lock().unwrap(),
        vec![Deprecation::CountInOrderByString]
    );
}

#[test]
fn test_typed_builders() {
    let params = QueryParams::resource("pilot").with_id(1i64).with_options(
        ODataOptions::new()
            .with_select(Select::List(vec!["name".into()]))
            .with_orderby(OrderBy::by("name", SortDir::Desc))
            .with_top(1),
    );
    assert_eq!(
        compile(&params).unwrap(),
        "pilot(1)?$select=name&$orderby=name desc&$top=1"
    );

    let counted = QueryParams::resource("pilot")
        .with_options(ODataOptions::new().with_filter(Filter::property("a", 1i64)).counted());
    assert!(counted.is_count());
    assert_eq!(compile(&counted).unwrap(), "pilot/$count?$filter=a eq 1");
}

#[test]
fn test_auth_strings() {
    let params = AuthParams {
        model_name: "resin".into(),
        resource: "actor".into(),
        access: "delete".into(),
        filter: Some(Filter::property(
            "id",
            Filter::object([FilterEntry::Alias("__ACTOR_ID".into())]),
        )),
    };
    assert_eq!(compile_auth(&params).unwrap(), "resin.actor.delete?id eq @__ACTOR_ID");

    let bare = AuthParams { filter: None, ..params };
    assert_eq!(compile_auth(&bare).unwrap(), "resin.actor.delete");
}

#[test]
fn test_small_and_large_floats_keep_their_value() {
    assert_eq!(
        url(json!({ "resource": "a", "options": { "$filter": { "a": 1e-20 } } })).unwrap(),
        "a?$filter=a eq 1e-20"
    );
    assert_eq!(
        url(json!({ "resource": "a", "options": { "$filter": { "a": 1e21 } } })).unwrap(),
        "a?$filter=a eq 1e+21"
    );
}
