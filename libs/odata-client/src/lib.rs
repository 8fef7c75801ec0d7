#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Request lifecycle around [`odata_query`].
//!
//! [`ODataClient`] compiles query descriptions, prefixes them with the api
//! root and hands them to a host supplied [`Transport`]. On top of plain
//! requests it offers retries with exponential backoff, `upsert` and
//! `get_or_create`, queries prepared once and called with parameter aliases,
//! and polling subscriptions.

pub mod client;
pub mod config;
pub mod error;
pub mod poll;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::{
    ODataClient, PreparedCall, PreparedQuery, RequestParams, SubscribeParams, UpsertParams,
};
pub use config::{
    ClientConfig, ClientOverrides, DEFAULT_POLL_INTERVAL, ExponentialBackoff, RetrySettings,
};
pub use error::ClientError;
pub use poll::{Poll, Subscription};
pub use response::{Expect, GetResult, unwrap_get};
pub use retry::{
    RetryConfig, RetryMode, calculate_backoff, call_with_retry, default_can_retry,
    parse_retry_after,
};
pub use transport::{Transport, TransportRequest};

pub use odata_query;
