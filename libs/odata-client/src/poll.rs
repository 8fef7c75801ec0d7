//! Repeating requests with data and error subscribers.
//!
//! A [`Poll`] runs at most one request at a time: the next run is scheduled
//! only after the previous one finished, successfully or not.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

type RequestFn<R> = Arc<dyn Fn() -> BoxFuture<'static, Result<R, ClientError>> + Send + Sync>;
type DataFn<R> = Arc<dyn Fn(&R) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&ClientError) + Send + Sync>;

struct Subscribers<R> {
    next_id: u64,
    data: Vec<(u64, DataFn<R>)>,
    error: Vec<(u64, ErrorFn)>,
}

impl<R> Default for Subscribers<R> {
    fn default() -> Self {
        Self {
            next_id: 0,
            data: Vec::new(),
            error: Vec::new(),
        }
    }
}

impl<R> Subscribers<R> {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn clear(&mut self) {
        self.data.clear();
        self.error.clear();
    }
}

struct Shared<R> {
    handle: Handle,
    request: Mutex<Option<RequestFn<R>>>,
    subscribers: Mutex<Subscribers<R>>,
    interval: Mutex<Duration>,
    running: Mutex<Option<CancellationToken>>,
    /// Restart the pending wait with the current interval
    reschedule: Notify,
    /// End the pending wait and run immediately
    wake: Notify,
}

impl<R: Send + Sync + 'static> Shared<R> {
    fn publish(&self, outcome: &Result<R, ClientError>) {
        match outcome {
            Ok(data) => {
                let subscribers = self.subscribers.lock().data.clone();
                for (_, subscriber) in subscribers {
                    guarded("data", || subscriber(data));
                }
            }
            Err(err) => {
                let subscribers = self.subscribers.lock().error.clone();
                for (_, subscriber) in subscribers {
                    guarded("error", || subscriber(err));
                }
            }
        }
    }
}

/// Subscriber panics must not stop the loop or the remaining subscribers.
fn guarded(event: &'static str, notify: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(notify)) {
        tracing::error!(
            event,
            panic = panic_message(panic.as_ref()),
            "Caught panic in poll subscriber"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

async fn run_loop<R: Send + Sync + 'static>(shared: Arc<Shared<R>>, token: CancellationToken) {
    loop {
        let Some(request) = shared.request.lock().clone() else {
            break;
        };
        let outcome = tokio::select! {
            () = token.cancelled() => break,
            outcome = request() => outcome,
        };
        shared.publish(&outcome);

        loop {
            let interval = *shared.interval.lock();
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(interval) => break,
                () = shared.wake.notified() => break,
                () = shared.reschedule.notified() => {}
            }
        }
    }
    tracing::debug!("Poll loop finished");
}

/// A running subscription to a repeating request.
///
/// Dropping the `Poll` stops it.
pub struct Poll<R> {
    shared: Arc<Shared<R>>,
}

impl<R> fmt::Debug for Poll<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poll")
            .field("interval", &*self.shared.interval.lock())
            .field("running", &self.shared.running.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Send + Sync + 'static> Poll<R> {
    /// Start polling `request` every `interval`. The first request is sent
    /// right away.
    ///
    /// # Errors
    /// Returns `InvalidParams` when called outside a tokio runtime.
    pub fn new<F, Fut>(request: F, interval: Duration) -> Result<Self, ClientError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ClientError>> + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| {
            ClientError::invalid_params("Polling requires a running tokio runtime")
        })?;
        let request: RequestFn<R> = Arc::new(move || request().boxed());
        let poll = Self {
            shared: Arc::new(Shared {
                handle,
                request: Mutex::new(Some(request)),
                subscribers: Mutex::new(Subscribers::default()),
                interval: Mutex::new(interval),
                running: Mutex::new(None),
                reschedule: Notify::new(),
                wake: Notify::new(),
            }),
        };
        poll.start();
        Ok(poll)
    }

    /// Called with every successful response.
    #[must_use]
    pub fn on_data(&self, subscriber: impl Fn(&R) + Send + Sync + 'static) -> Subscription<R> {
        let mut subscribers = self.shared.subscribers.lock();
        let id = subscribers.next_id();
        subscribers.data.push((id, Arc::new(subscriber)));
        self.subscription(id)
    }

    /// Called with every failed request.
    #[must_use]
    pub fn on_error(
        &self,
        subscriber: impl Fn(&ClientError) + Send + Sync + 'static,
    ) -> Subscription<R> {
        let mut subscribers = self.shared.subscribers.lock();
        let id = subscribers.next_id();
        subscribers.error.push((id, Arc::new(subscriber)));
        self.subscription(id)
    }

    fn subscription(&self, id: u64) -> Subscription<R> {
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Resume polling with an immediate request. No-op while running or
    /// after [`Self::destroy`].
    pub fn start(&self) {
        let mut running = self.shared.running.lock();
        if running.is_some() || self.shared.request.lock().is_none() {
            return;
        }
        let token = CancellationToken::new();
        *running = Some(token.clone());
        drop(running);
        self.shared
            .handle
            .spawn(run_loop(Arc::clone(&self.shared), token));
    }

    /// Stop polling. A request in flight is abandoned and its result is
    /// not published.
    pub fn stop(&self) {
        if let Some(token) = self.shared.running.lock().take() {
            token.cancel();
        }
    }

    /// Stop polling and drop the request and every subscriber.
    pub fn destroy(&self) {
        self.stop();
        *self.shared.request.lock() = None;
        self.shared.subscribers.lock().clear();
    }

    /// Change the interval; a pending wait restarts with the new value.
    pub fn set_poll_interval(&self, interval: Duration) {
        *self.shared.interval.lock() = interval;
        self.shared.reschedule.notify_waiters();
    }

    /// Skip the rest of the pending wait. Has no effect while a request is
    /// in flight.
    pub fn run_now(&self) {
        self.shared.wake.notify_waiters();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.lock().is_some()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        *self.shared.interval.lock()
    }
}

impl<R> Drop for Poll<R> {
    fn drop(&mut self) {
        if let Some(token) = self.shared.running.lock().take() {
            token.cancel();
        }
    }
}

/// Handle returned by [`Poll::on_data`] and [`Poll::on_error`].
pub struct Subscription<R> {
    shared: Weak<Shared<R>>,
    id: u64,
}

impl<R> fmt::Debug for Subscription<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<R> Subscription<R> {
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut subscribers = shared.subscribers.lock();
            subscribers.data.retain(|(id, _)| *id != self.id);
            subscribers.error.retain(|(id, _)| *id != self.id);
        }
    }
}
