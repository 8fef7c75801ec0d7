#![allow(clippy::unwrap_used, clippy::expect_used, clippy::needless_pass_by_value)]

//! `$expand` compilation, including the tolerated `$count` options.

use std::sync::Mutex;

use odata_query::{Deprecation, DiagnosticsSink, Error, Expand, NoopDiagnostics, build_expand};
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

fn expand(value: Value) -> Result<String, Error> {
    build_expand(&Expand::try_from(&value)?, &NoopDiagnostics)
}

fn error(value: Value) -> String {
    expand(value).unwrap_err().to_string()
}

#[test]
fn test_paths_and_lists() {
    assert_eq!(expand(json!("a")).unwrap(), "a");
    assert_eq!(expand(json!(["a", "b"])).unwrap(), "a,b");
    assert_eq!(expand(json!(["a", { "b": {} }])).unwrap(), "a,b");
    assert_eq!(
        error(json!([])),
        "Expand arrays must have at least 1 elements, got: []"
    );
}

#[test]
fn test_nested_options_are_joined_with_semicolons() {
    assert_eq!(
        expand(json!({ "a": { "$filter": { "b": "c" } } })).unwrap(),
        "a($filter=b eq 'c')"
    );
    assert_eq!(
        expand(json!({ "a": { "$select": ["b", "c"], "$top": 2, "$orderby": "b asc" } })).unwrap(),
        "a($select=b,c;$top=2;$orderby=b asc)"
    );
    assert_eq!(
        expand(json!({ "a": { "$expand": { "b": { "$select": "c" } } } })).unwrap(),
        "a($expand=b($select=c))"
    );
    assert_eq!(
        expand(json!({ "a": { "$select": "b" }, "c": {} })).unwrap(),
        "a($select=b),c"
    );
}

#[test]
fn test_count_rewrites_the_path() {
    assert_eq!(expand(json!({ "a": { "$count": {} } })).unwrap(), "a/$count");
    assert_eq!(
        expand(json!({ "a": { "$count": { "$filter": { "b": "c" } } } })).unwrap(),
        "a/$count($filter=b eq 'c')"
    );
}

#[test]
fn test_count_drops_other_options_with_a_deprecation() {
    let recorder = Recorder::default();
    let value = json!({ "a": { "$count": { "$select": "x", "$filter": { "b": "c" } } } });
    let compiled = build_expand(&Expand::try_from(&value).unwrap(), &recorder).unwrap();
    assert_eq!(compiled, "a/$count($filter=b eq 'c')");
    assert_eq!(
        *recorder.seen.lock().unwrap(),
        vec![Deprecation::ExpandCountOptions {
            keys: vec!["$select".into(), "$filter".into()]
        }]
    );
}

#[test]
fn test_count_alone_reports_nothing() {
    let recorder = Recorder::default();
    let value = json!({ "a": { "$count": { "$filter": { "b": "c" } } } });
    build_expand(&Expand::try_from(&value).unwrap(), &recorder).unwrap();
    assert!(recorder.seen.lock().unwrap().is_empty());
}

#[test]
fn test_count_with_siblings_is_rejected() {
    assert_eq!(
        error(json!({ "a": { "$count": {}, "$select": "b" } })),
        "When using '$expand: a: $count: ...' you can only specify $count, got: '[\"$count\",\"$select\"]'"
    );
}

#[test]
fn test_misplaced_values_suggest_the_right_form() {
    assert_eq!(
        error(json!({ "$filter": { "a": "b" } })),
        "Cannot have expand options without first expanding something!"
    );
    assert_eq!(
        error(json!({ "a": "b" })),
        "'$expand: a: \"b\"' is invalid, use '$expand: a: $expand: \"b\"' instead."
    );
    assert_eq!(
        error(json!({ "a": null })),
        "'$expand: a: null' is invalid, use '$expand: a: $expand: null' instead."
    );
    assert_eq!(
        error(json!({ "a": ["b"] })),
        "'$expand: a: [...]' is invalid, use '$expand: a: {...}' instead."
    );
    assert_eq!(
        error(json!({ "a": { "b": {} } })),
        "'$expand: a: b: ...' is invalid, use '$expand: a: $expand: b: ...' instead."
    );
}

#[test]
fn test_removed_and_unknown_forms() {
    let message = error(json!({ "a/$count": {} }));
    assert!(message.starts_with("`$expand: { 'a/$count': {...} }` has been removed"));
    assert_eq!(error(json!({ "a": { "$bogus": 1 } })), "Unknown key option '$bogus'");
    assert_eq!(error(json!(5)), "Not a valid resource: number");
}

#[test]
fn test_typed_expand_rejects_option_keys() {
    let typed = Expand::Object(vec![("$top".into(), odata_query::ODataOptions::new())]);
    assert!(build_expand(&typed, &NoopDiagnostics).is_err());
}
