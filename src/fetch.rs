//! Coordinates variant fetches: at most one request in flight per client,
//! with timeout and retry policy applied before results merge into the store.
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::store::VariantStore;
use crate::transport::Transport;
use crate::{Error, Result, UserContext};

/// Serializes fetches for one client instance.
///
/// Only one fetch runs at a time. A `fetch` issued while another is in flight
/// joins the in-flight request and receives a clone of its eventual result;
/// no second network call is made. This is the join policy: there is no
/// "fetch in progress" error.
///
/// On a network or server failure, the fetch is retried exactly once after a
/// fixed backoff when `retry_on_failure` is set. A timeout is surfaced as
/// [`Error::FetchTimeout`] without retry. A successful response is merged
/// into the [`VariantStore`]; a failed or timed-out attempt never touches it.
pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<VariantStore>,
    fetch_timeout: Duration,
    retry_on_failure: bool,
    inflight: Mutex<Option<Arc<FetchSlot>>>,
}

/// Delay before the single retry attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Holds `None` until the owning fetch completes, then the fetch result.
/// Joined callers block on the condvar and clone the published result.
struct FetchSlot {
    result: Mutex<Option<Result<()>>>,
    done: Condvar,
}

impl FetchSlot {
    fn new() -> FetchSlot {
        FetchSlot {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<()> {
        let mut result = self
            .result
            .lock()
            .expect("thread holding fetch result lock should not panic");
        loop {
            match &*result {
                Some(result) => return result.clone(),
                None => {
                    result = self
                        .done
                        .wait(result)
                        .expect("thread holding fetch result lock should not panic");
                }
            }
        }
    }

    fn publish(&self, value: Result<()>) {
        *self
            .result
            .lock()
            .expect("thread holding fetch result lock should not panic") = Some(value);
        self.done.notify_all();
    }
}

impl FetchCoordinator {
    /// Create a coordinator that fetches via `transport` and merges results
    /// into `store`. `fetch_timeout` bounds each attempt.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<VariantStore>,
        fetch_timeout: Duration,
        retry_on_failure: bool,
    ) -> FetchCoordinator {
        FetchCoordinator {
            transport,
            store,
            fetch_timeout,
            retry_on_failure,
            inflight: Mutex::new(None),
        }
    }

    /// Fetch variants for `user` and merge them into the store.
    ///
    /// Blocks until the fetch (or the in-flight fetch being joined)
    /// completes.
    pub fn fetch(&self, user: Option<&UserContext>) -> Result<()> {
        let slot = {
            let mut inflight = self
                .inflight
                .lock()
                .expect("thread holding in-flight lock should not panic");
            match &*inflight {
                Some(slot) => {
                    let slot = Arc::clone(slot);
                    drop(inflight);
                    log::debug!(target: "experiment", "joining in-flight fetch");
                    return slot.wait();
                }
                None => {
                    let slot = Arc::new(FetchSlot::new());
                    *inflight = Some(Arc::clone(&slot));
                    slot
                }
            }
        };

        let result = self.fetch_and_merge(user);

        // Clear the slot before publishing so late callers start a fresh
        // fetch instead of receiving a stale result.
        *self
            .inflight
            .lock()
            .expect("thread holding in-flight lock should not panic") = None;
        slot.publish(result.clone());

        result
    }

    fn fetch_and_merge(&self, user: Option<&UserContext>) -> Result<()> {
        let anonymous = UserContext::new();
        let user = user.unwrap_or(&anonymous);

        let mut result = self.transport.fetch(user, self.fetch_timeout);
        if self.retry_on_failure && matches!(result, Err(Error::FetchFailed(_))) {
            log::debug!(target: "experiment", "fetch failed, retrying once after backoff");
            std::thread::sleep(RETRY_BACKOFF);
            result = self.transport.fetch(user, self.fetch_timeout);
        }

        match &result {
            Err(err) => log::warn!(target: "experiment", "fetch failed: {err}"),
            Ok(variants) => {
                log::debug!(target: "experiment", "fetched {} variants", variants.len())
            }
        }

        self.store.merge(result?)
    }
}
