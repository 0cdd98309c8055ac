use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::config::ExperimentConfig;
use crate::exposure::{ExposureSink, ExposureTracker, NoopExposureSink};
use crate::fetch::FetchCoordinator;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::store::VariantStore;
use crate::transport::{HttpTransport, Transport};
use crate::{Error, Result, UserContext, Variant, Variants};

/// A client for one experimentation deployment.
///
/// The client keeps the last-known variant for every flag in a
/// [`VariantStore`], refreshes it via [`Client::fetch`], and answers
/// [`Client::variant`] lookups from the store without blocking. Variants
/// survive process restarts when a storage directory is configured.
///
/// Most applications use the crate-level [`initialize`] function, which also
/// registers the client under its instance name; constructing a [`Client`]
/// directly is useful when the registry is not wanted.
///
/// # Examples
/// ```no_run
/// # use experiment::{ExperimentConfig, UserContext};
/// let client = experiment::initialize("deployment-key", ExperimentConfig::default()).unwrap();
/// client.fetch(Some(&UserContext::new().user_id("user-1"))).unwrap();
/// let variant = client.variant("my-flag", None);
/// ```
pub struct Client {
    config: ExperimentConfig,
    store: Arc<VariantStore>,
    fetcher: FetchCoordinator,
    exposures: ExposureTracker,
}

impl Client {
    /// Create a client fetching over HTTP on behalf of `deployment_key`.
    ///
    /// Storage is file-backed when the configuration names a storage
    /// directory, in-memory otherwise. Exposure events are dropped; use
    /// [`Client::with_dependencies`] to attach a sink.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if the deployment key is empty.
    /// - [`Error::Persistence`] if the storage directory cannot be created.
    pub fn new(deployment_key: &str, config: ExperimentConfig) -> Result<Client> {
        if deployment_key.is_empty() {
            return Err(Error::InvalidConfig(
                "deployment key must not be empty".to_owned(),
            ));
        }

        let transport = Arc::new(HttpTransport::new(
            deployment_key,
            config.resolved_server_url(),
        )?);
        let storage: Arc<dyn Storage> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::new(dir)?),
            None => Arc::new(MemoryStorage::new()),
        };

        Client::with_dependencies(config, transport, storage, Box::new(NoopExposureSink))
    }

    /// Create a client from explicit capabilities: a fetch transport, a
    /// storage backend, and an exposure sink.
    pub fn with_dependencies(
        config: ExperimentConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        sink: Box<dyn ExposureSink + Send + Sync>,
    ) -> Result<Client> {
        let store = Arc::new(VariantStore::open(
            storage,
            config.instance_name(),
            &config.initial_variants,
        ));
        let fetcher = FetchCoordinator::new(
            transport,
            store.clone(),
            config.fetch_timeout,
            config.retry_on_failure,
        );
        let client = Client {
            config,
            store,
            fetcher,
            exposures: ExposureTracker::new(sink),
        };

        if client.config.debug {
            log::debug!(target: "experiment",
                "initialized instance {:?} with {} variants",
                client.config.instance_name(),
                client.store.get_all().len());
        }
        if client.config.fetch_on_start {
            if let Err(err) = client.fetch(None) {
                log::warn!(target: "experiment", "startup fetch failed: {err}");
            }
        }

        Ok(client)
    }

    /// Fetch variants for `user` and merge them into the store. Keys absent
    /// from the response keep their previous values.
    ///
    /// Blocks until the fetch completes. If another fetch is already in
    /// flight on this client, this call joins it and receives its result
    /// instead of issuing a second request.
    ///
    /// # Errors
    ///
    /// - [`Error::FetchFailed`] on network or server failure (after one
    ///   retry, when retry is configured).
    /// - [`Error::FetchTimeout`] if the configured fetch timeout elapsed.
    /// - [`Error::Persistence`] if the merged snapshot could not be
    ///   persisted; the in-memory store is left unchanged.
    pub fn fetch(&self, user: Option<&UserContext>) -> Result<()> {
        self.fetcher.fetch(user)
    }

    /// Get the variant for `key`, or `fallback` if the store has no usable
    /// entry.
    ///
    /// A stored variant with every field absent behaves as missing: the
    /// fallback is used, and when that is also absent (or itself empty) the
    /// result is `None`.
    ///
    /// When automatic exposure tracking is configured, serving a
    /// store-resolved variant records an exposure.
    pub fn variant(&self, key: &str, fallback: Option<Variant>) -> Option<Variant> {
        let stored = self.store.get(key).filter(|variant| !variant.is_empty());
        if self.config.automatic_exposure_tracking {
            if let Some(variant) = &stored {
                self.exposures.track(key, Some(variant));
            }
        }
        stored.or(fallback).filter(|variant| !variant.is_empty())
    }

    /// Snapshot of all stored variants. Mutating the returned map does not
    /// affect the client.
    pub fn all(&self) -> Variants {
        self.store.get_all()
    }

    /// Record that the user was exposed to the variant stored for `key`.
    ///
    /// A no-op when the store has no usable variant for `key`. Each distinct
    /// flag/variant pair is reported at most once per client lifetime (the
    /// window resets on [`Client::clear`]). Never fails: exposure delivery
    /// problems are handled by the sink.
    pub fn exposure(&self, key: &str) {
        let variant = self.store.get(key).filter(|variant| !variant.is_empty());
        self.exposures.track(key, variant.as_ref());
    }

    /// Remove all stored variants, in memory and in durable storage, and
    /// reset exposure deduplication.
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if durable storage could not be cleared; the
    /// in-memory store is left unchanged in that case.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()?;
        self.exposures.clear();
        Ok(())
    }
}

static INSTANCES: Lazy<Mutex<HashMap<String, Arc<Client>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Initialize the client instance named by the configuration and register it
/// process-wide.
///
/// If an instance with that name already exists, it is returned unchanged
/// (the deployment key and configuration of the existing instance win).
///
/// # Errors
///
/// Construction errors from [`Client::new`], i.e. [`Error::InvalidConfig`]
/// or [`Error::Persistence`].
pub fn initialize(deployment_key: &str, config: ExperimentConfig) -> Result<Arc<Client>> {
    {
        let instances = INSTANCES
            .lock()
            .expect("thread holding instances lock should not panic");
        if let Some(existing) = instances.get(config.instance_name()) {
            return Ok(Arc::clone(existing));
        }
    }

    // Construct outside the lock: startup fetch may block on the network.
    let name = config.instance_name().to_owned();
    let client = Arc::new(Client::new(deployment_key, config)?);

    let mut instances = INSTANCES
        .lock()
        .expect("thread holding instances lock should not panic");
    Ok(Arc::clone(instances.entry(name).or_insert(client)))
}

/// Look up a previously initialized client instance by name.
///
/// # Errors
///
/// [`Error::NotInitialized`] if no instance with that name has been
/// initialized yet.
pub fn instance(name: &str) -> Result<Arc<Client>> {
    let instances = INSTANCES
        .lock()
        .expect("thread holding instances lock should not panic");
    instances.get(name).cloned().ok_or(Error::NotInitialized)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::{Client, ExperimentConfig};
    use crate::exposure::ExposureEvent;
    use crate::storage::MemoryStorage;
    use crate::transport::Transport;
    use crate::{Error, Result, UserContext, Variant, Variants};

    /// Serves a fixed response, or an error when `fail` is set.
    struct StubTransport {
        variants: Variants,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubTransport {
        fn serving(variants: Variants) -> Arc<StubTransport> {
            Arc::new(StubTransport {
                variants,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<StubTransport> {
            Arc::new(StubTransport {
                variants: Variants::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Transport for StubTransport {
        fn fetch(&self, _user: &UserContext, _timeout: Duration) -> Result<Variants> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::FetchFailed("server unavailable".to_owned()))
            } else {
                Ok(self.variants.clone())
            }
        }
    }

    fn on_variant() -> Variant {
        Variant::from_value("on").with_key("on")
    }

    fn client_with(
        config: ExperimentConfig,
        transport: Arc<StubTransport>,
    ) -> (Client, Arc<Mutex<Vec<ExposureEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let client = Client::with_dependencies(
            config,
            transport,
            Arc::new(MemoryStorage::new()),
            Box::new(move |event: ExposureEvent| {
                sink_events.lock().unwrap().push(event);
            }),
        )
        .unwrap();
        (client, events)
    }

    fn config() -> ExperimentConfig {
        ExperimentConfig::builder()
            .fetch_timeout_millis(1_000)
            .automatic_exposure_tracking(false)
            .build()
            .unwrap()
    }

    #[test]
    fn fetched_variant_is_served_and_absent_key_falls_back() {
        let transport =
            StubTransport::serving([("flagA".to_owned(), on_variant())].into());
        let (client, _) = client_with(config(), transport);

        client.fetch(Some(&UserContext::new().user_id("user-1"))).unwrap();

        assert_eq!(client.variant("flagA", None), Some(on_variant()));
        assert_eq!(
            client.variant("flagB", Some(Variant::from_key("control"))),
            Some(Variant::from_key("control"))
        );
        assert_eq!(client.variant("flagB", None), None);
    }

    #[test]
    fn empty_stored_variant_collapses_to_absence() {
        let transport =
            StubTransport::serving([("flagA".to_owned(), Variant::default())].into());
        let (client, _) = client_with(config(), transport);
        client.fetch(None).unwrap();

        assert_eq!(client.variant("flagA", None), None);
        // The fallback applies to an empty stored variant too.
        assert_eq!(
            client.variant("flagA", Some(Variant::from_key("control"))),
            Some(Variant::from_key("control"))
        );
        // An empty fallback collapses as well.
        assert_eq!(client.variant("flagA", Some(Variant::default())), None);
    }

    #[test]
    fn failed_fetch_keeps_serving_cached_variants() {
        let (client, _) = client_with(
            ExperimentConfig::builder()
                .automatic_exposure_tracking(false)
                .initial_variants([("flagA".to_owned(), on_variant())].into())
                .build()
                .unwrap(),
            StubTransport::failing(),
        );

        let result = client.fetch(None);

        assert!(matches!(result, Err(Error::FetchFailed(_))));
        assert_eq!(client.variant("flagA", None), Some(on_variant()));
    }

    #[test]
    fn all_returns_a_snapshot() {
        let transport =
            StubTransport::serving([("flagA".to_owned(), on_variant())].into());
        let (client, _) = client_with(config(), transport);
        client.fetch(None).unwrap();

        let mut all = client.all();
        all.remove("flagA");

        assert_eq!(client.all().len(), 1);
    }

    #[test]
    fn exposure_is_deduplicated_until_clear() {
        let transport =
            StubTransport::serving([("flagA".to_owned(), on_variant())].into());
        let (client, events) = client_with(config(), transport);
        client.fetch(None).unwrap();

        client.exposure("flagA");
        client.exposure("flagA");
        assert_eq!(events.lock().unwrap().len(), 1);

        client.clear().unwrap();
        assert!(client.all().is_empty());

        // Clear also resets the dedup window: once the variant is fetched
        // again, the same exposure is reported anew.
        client.fetch(None).unwrap();
        client.exposure("flagA");
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn exposure_of_an_unknown_flag_is_a_noop() {
        let (client, events) = client_with(config(), StubTransport::serving(Variants::new()));
        client.exposure("missing");
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn automatic_exposure_tracking_fires_on_variant_access() {
        let transport =
            StubTransport::serving([("flagA".to_owned(), on_variant())].into());
        let (client, events) = client_with(
            ExperimentConfig::builder()
                .automatic_exposure_tracking(true)
                .build()
                .unwrap(),
            transport,
        );
        client.fetch(None).unwrap();

        client.variant("flagA", None);
        client.variant("flagA", None);
        // Fallback-resolved lookups are not exposures.
        client.variant("flagB", Some(Variant::from_key("control")));

        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn fetch_on_start_populates_the_store() {
        let transport =
            StubTransport::serving([("flagA".to_owned(), on_variant())].into());
        let (client, _) = client_with(
            ExperimentConfig::builder()
                .fetch_on_start(true)
                .automatic_exposure_tracking(false)
                .build()
                .unwrap(),
            transport.clone(),
        );

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.variant("flagA", None), Some(on_variant()));
    }

    #[test]
    fn fetch_on_start_failure_does_not_fail_initialization() {
        let (client, _) = client_with(
            ExperimentConfig::builder()
                .fetch_on_start(true)
                .automatic_exposure_tracking(false)
                .initial_variants([("flagA".to_owned(), on_variant())].into())
                .build()
                .unwrap(),
            StubTransport::failing(),
        );

        assert_eq!(client.variant("flagA", None), Some(on_variant()));
    }

    #[test]
    fn empty_deployment_key_is_rejected() {
        let result = Client::new("", ExperimentConfig::default());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn instance_lookup_requires_initialize() {
        assert_eq!(
            super::instance("never-initialized").err(),
            Some(Error::NotInitialized)
        );

        let config = ExperimentConfig::builder()
            .instance_name("registry-test")
            .build()
            .unwrap();
        let initialized = super::initialize("deployment-key", config.clone()).unwrap();
        let looked_up = super::instance("registry-test").unwrap();
        assert!(Arc::ptr_eq(&initialized, &looked_up));

        // Re-initializing the same name returns the existing instance.
        let again = super::initialize("other-key", config).unwrap();
        assert!(Arc::ptr_eq(&initialized, &again));
    }
}
