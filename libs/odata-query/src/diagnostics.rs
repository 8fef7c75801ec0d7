//! Deprecation reporting.
//!
//! The compiler never logs on its own. Deprecated but still accepted input is
//! reported to a [`DiagnosticsSink`] owned by the caller, which decides
//! whether and how often to surface it.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;

/// Input that compiles but uses a deprecated form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deprecation {
    /// A precompiled `url` was passed instead of a query description.
    UrlParameter,
    /// A textual `$orderby` contains a `/$count` path.
    CountInOrderByString,
    /// `$expand: a: $count` carried options other than `$filter`; they were dropped.
    ExpandCountOptions { keys: Vec<String> },
}

impl Deprecation {
    /// Stable identifier used to de-duplicate reports.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Deprecation::UrlParameter => "url",
            Deprecation::CountInOrderByString => "orderby-count-string",
            Deprecation::ExpandCountOptions { .. } => "expand-count-options",
        }
    }
}

impl fmt::Display for Deprecation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deprecation::UrlParameter => write!(
                f,
                "`url` is deprecated, please use `resource`, `id` and `options` instead."
            ),
            Deprecation::CountInOrderByString => write!(
                f,
                "'$orderby: 'a/$count ...'' is deprecated, please use '$orderby: {{ a: {{ $count: {{...}} }}, $dir: 'asc' }}' instead."
            ),
            Deprecation::ExpandCountOptions { keys } => write!(
                f,
                "When using '$expand: a: $count: ...' you can only specify $filter in the $count, got: '{}'",
                serde_json::to_string(keys).unwrap_or_default()
            ),
        }
    }
}

pub trait DiagnosticsSink: Send + Sync {
    fn deprecated(&self, deprecation: &Deprecation);
}

/// Discards every report.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn deprecated(&self, _deprecation: &Deprecation) {}
}

/// Logs every report as a warning.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn deprecated(&self, deprecation: &Deprecation) {
        tracing::warn!(key = deprecation.key(), "{deprecation}");
    }
}

/// Logs each kind of deprecation once for the lifetime of the sink.
#[derive(Debug, Default)]
pub struct OnceDiagnostics {
    seen: Mutex<HashSet<&'static str>>,
}

impl OnceDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn first_report(&self, key: &'static str) -> bool {
        self.seen.lock().insert(key)
    }
}

impl DiagnosticsSink for OnceDiagnostics {
    fn deprecated(&self, deprecation: &Deprecation) {
        if self.first_report(deprecation.key()) {
            TracingDiagnostics.deprecated(deprecation);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct WarningCapture {
        warnings: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                let mut visitor = MessageVisitor(String::new());
                event.record(&mut visitor);
                self.warnings.lock().unwrap().push(visitor.0);
            }
        }
    }

    struct MessageVisitor(String);

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    #[test]
    fn test_once_sink_reports_each_key_once() {
        let capture = WarningCapture::default();
        let warnings = capture.warnings.clone();
        let subscriber = tracing_subscriber::registry().with(capture);

        tracing::subscriber::with_default(subscriber, || {
            let sink = OnceDiagnostics::new();
            sink.deprecated(&Deprecation::UrlParameter);
            sink.deprecated(&Deprecation::UrlParameter);
            sink.deprecated(&Deprecation::CountInOrderByString);
        });

        let captured = warnings.lock().unwrap();
        assert_eq!(captured.len(), 2, "got: {:?}", *captured);
        assert!(captured[0].contains("`url` is deprecated"));
    }

    #[test]
    fn test_separate_sinks_do_not_share_state() {
        let first = OnceDiagnostics::new();
        let second = OnceDiagnostics::new();
        assert!(first.first_report("url"));
        assert!(!first.first_report("url"));
        assert!(second.first_report("url"));
    }

    #[test]
    fn test_expand_count_message_lists_keys() {
        let deprecation = Deprecation::ExpandCountOptions {
            keys: vec!["$select".into(), "$filter".into()],
        };
        assert_eq!(
            deprecation.to_string(),
            "When using '$expand: a: $count: ...' you can only specify $filter in the $count, got: '[\"$select\",\"$filter\"]'"
        );
    }

    #[test]
    fn test_orderby_count_message_shows_object_form() {
        assert_eq!(
            Deprecation::CountInOrderByString.to_string(),
            "'$orderby: 'a/$count ...'' is deprecated, please use '$orderby: { a: { $count: {...} }, $dir: 'asc' }' instead."
        );
    }
}
