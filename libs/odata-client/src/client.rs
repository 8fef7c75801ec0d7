//! The request lifecycle around compiled queries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use http::Method;
use odata_query::{
    DiagnosticsSink, Filter, KeyValue, ODataOptions, OnceDiagnostics, Operator, Primitive,
    QueryCompiler, QueryParams, ResourceId, escape_value,
};
use serde_json::{Map, Value};

use crate::config::{ClientConfig, ClientOverrides, DEFAULT_POLL_INTERVAL};
use crate::error::ClientError;
use crate::poll::Poll;
use crate::response::{Expect, GetResult, unwrap_get};
use crate::retry::{RetryConfig, RetryMode, call_with_retry};
use crate::transport::{Transport, TransportRequest};

/// Keys the client always sets itself; passthrough values for them are dropped.
const RESERVED_KEYS: &[&str] = &["url", "body", "method"];

/// A query plus everything needed to send it.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub query: QueryParams,
    pub method: Method,
    /// Overrides the client's api prefix
    pub api_prefix: Option<String>,
    pub body: Option<Value>,
    pub passthrough: Map<String, Value>,
    pub retry: RetryMode,
}

impl From<QueryParams> for RequestParams {
    fn from(query: QueryParams) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }
}

impl RequestParams {
    #[must_use]
    pub fn new(query: QueryParams) -> Self {
        Self::from(query)
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_api_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = Some(api_prefix.into());
        self
    }

    #[must_use]
    pub fn with_passthrough(mut self, passthrough: Map<String, Value>) -> Self {
        self.passthrough = passthrough;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryMode) -> Self {
        self.retry = retry;
        self
    }

    fn expected_shape(&self) -> Expect {
        if self.query.is_count() {
            Expect::Count
        } else if self.query.id.is_some() {
            Expect::One
        } else {
            Expect::Many
        }
    }
}

/// Accepts the query fields plus `method`, `body`, `apiPrefix` and
/// `passthrough`.
impl TryFrom<&Value> for RequestParams {
    type Error = ClientError;

    fn try_from(value: &Value) -> Result<Self, ClientError> {
        let query = QueryParams::try_from(value)?;
        let mut params = Self::from(query);
        let Value::Object(map) = value else {
            return Ok(params);
        };
        if let Some(method) = map.get("method").and_then(Value::as_str) {
            params.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| ClientError::invalid_params(format!("Invalid method '{method}'")))?;
        }
        if let Some(prefix) = map.get("apiPrefix").and_then(Value::as_str) {
            params.api_prefix = Some(prefix.to_owned());
        }
        params.body = map.get("body").filter(|body| !body.is_null()).cloned();
        match map.get("passthrough") {
            None | Some(Value::Null) => {}
            Some(Value::Object(passthrough)) => params.passthrough.clone_from(passthrough),
            Some(_) => {
                return Err(ClientError::invalid_params(
                    "The passthrough property must be an object",
                ));
            }
        }
        Ok(params)
    }
}

/// Parameters of [`ODataClient::upsert`] and [`ODataClient::get_or_create`].
#[derive(Debug, Clone, Default)]
pub struct UpsertParams {
    pub resource: String,
    /// The natural key: a JSON object of property values
    pub id: Value,
    pub body: Option<Value>,
    pub options: Option<ODataOptions>,
    pub passthrough: Map<String, Value>,
}

impl UpsertParams {
    #[must_use]
    pub fn new(resource: impl Into<String>, id: Value, body: Value) -> Self {
        Self {
            resource: resource.into(),
            id,
            body: Some(body),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ODataOptions) -> Self {
        self.options = Some(options);
        self
    }

    fn natural_key(&self) -> Result<&Map<String, Value>, ClientError> {
        let Value::Object(id) = &self.id else {
            return Err(ClientError::invalid_params("The id property must be an object"));
        };
        if id.is_empty() {
            return Err(ClientError::invalid_params(
                "The id property must be an object with the natural key of the model",
            ));
        }
        Ok(id)
    }

    /// `body` with the natural key merged over it.
    fn keyed_body(&self) -> Result<Value, ClientError> {
        let id = self.natural_key()?;
        let Some(body) = &self.body else {
            return Err(ClientError::invalid_params("The body property is missing"));
        };
        let Value::Object(body) = body else {
            return Err(ClientError::invalid_params("The body property must be an object"));
        };
        let mut merged = body.clone();
        merged.extend(id.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(Value::Object(merged))
    }

    fn request(&self, options: Option<ODataOptions>) -> RequestParams {
        let mut query = QueryParams::resource(self.resource.clone());
        query.options = options;
        RequestParams::new(query).with_passthrough(self.passthrough.clone())
    }
}

/// Parameters of [`ODataClient::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeParams {
    pub request: RequestParams,
    /// Defaults to 10 seconds
    pub poll_interval: Option<Duration>,
}

impl From<RequestParams> for SubscribeParams {
    fn from(request: RequestParams) -> Self {
        Self {
            request,
            poll_interval: None,
        }
    }
}

/// Compiles queries and drives them through a host [`Transport`].
pub struct ODataClient<T> {
    transport: Arc<T>,
    config: ClientConfig,
    retry: Option<RetryConfig>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl<T> Clone for ODataClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            retry: self.retry.clone(),
            diagnostics: Arc::clone(&self.diagnostics),
        }
    }
}

impl<T> fmt::Debug for ODataClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ODataClient")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ODataClient<T> {
    #[must_use]
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::from_shared(Arc::new(transport), config)
    }

    /// Build a client over a transport that is shared with other clients.
    #[must_use]
    pub fn from_shared(transport: Arc<T>, config: ClientConfig) -> Self {
        let retry = config.retry.as_ref().map(RetryConfig::from);
        Self {
            transport,
            config,
            retry,
            diagnostics: Arc::new(OnceDiagnostics::new()),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A client over the same transport and diagnostics with `overrides`
    /// applied.
    #[must_use]
    pub fn clone_with(&self, overrides: ClientOverrides) -> Self {
        let mut client = self.clone();
        let config = &mut client.config;
        if let Some(api_prefix) = overrides.api_prefix {
            config.api_prefix = api_prefix;
        }
        if let Some(passthrough) = overrides.passthrough {
            config.passthrough.extend(passthrough);
        }
        if let Some(by_method) = overrides.passthrough_by_method {
            config.passthrough_by_method.extend(by_method);
        }
        if let Some(retry) = overrides.retry {
            config.retry = Some(retry);
            client.retry = Some(RetryConfig::from(&retry));
        }
        client
    }

    /// Compile `query` without the api prefix.
    ///
    /// # Errors
    /// Returns `ClientError::Compile` when the query is invalid.
    pub fn compile(&self, query: &QueryParams) -> Result<String, ClientError> {
        Ok(QueryCompiler::new(self.diagnostics.as_ref()).compile(query)?)
    }

    /// Compile and send `params`, returning the raw response body.
    ///
    /// # Errors
    /// Returns compile errors before anything is sent, then whatever the
    /// transport reports once retries are exhausted.
    pub async fn request(&self, params: RequestParams) -> Result<Value, ClientError> {
        let url = self.compile(&params.query)?;
        self.dispatch(&params, &url).await
    }

    /// GET `params` and unwrap the response envelope.
    ///
    /// # Errors
    /// See [`Self::request`]; also fails on malformed envelopes and on more
    /// than one row for an id lookup.
    pub async fn get(&self, params: impl Into<RequestParams>) -> Result<GetResult, ClientError> {
        let params = params.into().with_method(Method::GET);
        let expect = params.expected_shape();
        let data = self.request(params).await?;
        unwrap_get(data, expect)
    }

    /// # Errors
    /// See [`Self::request`].
    pub async fn put(&self, params: impl Into<RequestParams>) -> Result<Value, ClientError> {
        self.request(params.into().with_method(Method::PUT)).await
    }

    /// # Errors
    /// See [`Self::request`].
    pub async fn patch(&self, params: impl Into<RequestParams>) -> Result<Value, ClientError> {
        self.request(params.into().with_method(Method::PATCH)).await
    }

    /// # Errors
    /// See [`Self::request`].
    pub async fn post(&self, params: impl Into<RequestParams>) -> Result<Value, ClientError> {
        self.request(params.into().with_method(Method::POST)).await
    }

    /// # Errors
    /// See [`Self::request`].
    pub async fn delete(&self, params: impl Into<RequestParams>) -> Result<Value, ClientError> {
        self.request(params.into().with_method(Method::DELETE)).await
    }

    /// POST the row; if that hits a unique constraint, PATCH the existing
    /// row matched by its natural key instead.
    ///
    /// # Errors
    /// Returns `InvalidParams` for a missing or empty natural key or body,
    /// and any error other than a unique violation from the POST.
    pub async fn upsert(&self, params: UpsertParams) -> Result<Value, ClientError> {
        let body = params.keyed_body()?;
        let post = params.request(params.options.clone()).with_body(body);
        match self.post(post).await {
            Err(err) if err.is_unique_violation() => {
                tracing::debug!(
                    resource = %params.resource,
                    "Unique violation on upsert, patching instead"
                );
            }
            result => return result,
        }

        let id_filter = Filter::try_from(&params.id)?;
        let mut options = params.options.clone().unwrap_or_default();
        let filter = match options.filter() {
            Some(existing) => Filter::operator(Operator::And(Filter::List(vec![
                existing.clone(),
                id_filter,
            ]))),
            None => id_filter,
        };
        options.set_filter(filter);

        let mut patch = params.request(Some(options));
        patch.body.clone_from(&params.body);
        self.patch(patch).await
    }

    /// Fetch the row with the given natural key, creating it when missing.
    ///
    /// # Errors
    /// Same as [`Self::upsert`], plus envelope errors from the lookup.
    pub async fn get_or_create(&self, params: UpsertParams) -> Result<Value, ClientError> {
        let body = params.keyed_body()?;
        let key = params
            .natural_key()?
            .iter()
            .map(|(name, value)| {
                Primitive::try_from(value).map(|value| (name.clone(), KeyValue::Value(value)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut lookup = params.request(params.options.clone());
        lookup.query.id = Some(ResourceId::Composite(key));
        if let Some(existing) = self.get(lookup).await?.into_one() {
            return Ok(existing);
        }
        self.post(params.request(None).with_body(body)).await
    }

    /// Compile `params` once for repeated calls that differ only in
    /// parameter aliases, body and passthrough.
    ///
    /// # Errors
    /// Returns `ClientError::Compile` when the query is invalid.
    pub fn prepare(&self, params: RequestParams) -> Result<PreparedQuery<T>, ClientError> {
        let url = self.compile(&params.query)?;
        let expect = (params.method == Method::GET).then(|| params.expected_shape());
        Ok(PreparedQuery {
            client: self.clone(),
            url,
            params: Arc::new(params),
            expect,
        })
    }

    /// Poll a GET query. The first request is sent immediately.
    ///
    /// # Errors
    /// Returns `InvalidParams` for a non-GET method or when called outside
    /// a tokio runtime, and compile errors for an invalid query.
    pub fn subscribe(&self, params: SubscribeParams) -> Result<Poll<GetResult>, ClientError> {
        if params.request.method != Method::GET {
            return Err(ClientError::invalid_params(format!(
                "Only GET requests can be subscribed to, got: {}",
                params.request.method
            )));
        }
        let prepared = self.prepare(params.request)?;
        Poll::new(
            move || {
                let prepared = prepared.clone();
                async move { prepared.fetch(PreparedCall::default()).await }.boxed()
            },
            params.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        )
    }

    fn passthrough_for(
        &self,
        method: &Method,
        request: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut merged = self.config.passthrough.clone();
        if let Some(by_method) = self.config.passthrough_by_method.get(method.as_str()) {
            merged.extend(by_method.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged.extend(request.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        merged
    }

    async fn dispatch(
        &self,
        params: &RequestParams,
        compiled: &str,
    ) -> Result<Value, ClientError> {
        let api_prefix = params.api_prefix.as_deref().unwrap_or(&self.config.api_prefix);
        let request = TransportRequest {
            method: params.method.clone(),
            url: format!("{api_prefix}{compiled}"),
            body: params.body.clone(),
            passthrough: self.passthrough_for(&params.method, &params.passthrough),
        };
        tracing::trace!(method = %request.method, url = %request.url, "Sending request");

        match params.retry.resolve(self.retry.as_ref()) {
            Some(retry) => call_with_retry(retry, || self.transport.send(request.clone())).await,
            None => self.transport.send(request).await,
        }
    }
}

/// Per-call inputs of a [`PreparedQuery`].
#[derive(Debug, Clone, Default)]
pub struct PreparedCall {
    /// Appended as `@name=<literal>`, in order
    pub parameter_aliases: Vec<(String, Primitive)>,
    /// Merged over the prepared body
    pub body: Option<Value>,
    /// Merged over the prepared passthrough
    pub passthrough: Option<Map<String, Value>>,
}

impl PreparedCall {
    #[must_use]
    pub fn alias(mut self, name: impl Into<String>, value: impl Into<Primitive>) -> Self {
        self.parameter_aliases.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A query compiled once by [`ODataClient::prepare`].
pub struct PreparedQuery<T> {
    client: ODataClient<T>,
    url: String,
    params: Arc<RequestParams>,
    /// Set for GET queries
    expect: Option<Expect>,
}

impl<T> Clone for PreparedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            url: self.url.clone(),
            params: Arc::clone(&self.params),
            expect: self.expect,
        }
    }
}

impl<T> fmt::Debug for PreparedQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("url", &self.url)
            .field("method", &self.params.method)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> PreparedQuery<T> {
    /// The compiled url, without api prefix or aliases.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send the prepared query and return the raw response body.
    ///
    /// # Errors
    /// See [`ODataClient::request`].
    pub async fn call(&self, call: PreparedCall) -> Result<Value, ClientError> {
        let mut params = RequestParams::clone(&self.params);
        params.body = merge_objects(params.body.take(), call.body);
        if let Some(passthrough) = call.passthrough {
            params.passthrough.extend(passthrough);
        }
        let url = with_aliases(&self.url, &call.parameter_aliases);
        self.client.dispatch(&params, &url).await
    }

    /// Send a prepared GET and unwrap the response envelope.
    ///
    /// # Errors
    /// Returns `InvalidParams` for non-GET queries, otherwise see
    /// [`ODataClient::get`].
    pub async fn fetch(&self, call: PreparedCall) -> Result<GetResult, ClientError> {
        let Some(expect) = self.expect else {
            return Err(ClientError::invalid_params(format!(
                "Only GET queries can be fetched, got: {}",
                self.params.method
            )));
        };
        unwrap_get(self.call(call).await?, expect)
    }
}

fn with_aliases(url: &str, aliases: &[(String, Primitive)]) -> String {
    if aliases.is_empty() {
        return url.to_owned();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    let aliases = aliases
        .iter()
        .map(|(name, value)| format!("@{name}={}", escape_value(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{url}{separator}{aliases}")
}

/// Shallow object merge; a non-object on either side means `overlay` wins.
fn merge_objects(base: Option<Value>, overlay: Option<Value>) -> Option<Value> {
    match (base, overlay) {
        (Some(Value::Object(mut base)), Some(Value::Object(overlay))) => {
            base.extend(overlay);
            Some(Value::Object(base))
        }
        (base, None) => base,
        (_, overlay) => overlay,
    }
}
