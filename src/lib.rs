//! Client-side SDK core for feature experimentation: a persisted variant
//! cache with coordinated fetches and one-shot exposure tracking.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that serves the last-known
//! [`Variant`] for every flag key. Variants are evaluated remotely for a
//! [`UserContext`] and pulled with [`Client::fetch`]; results merge into a
//! [`VariantStore`] that optionally persists across process restarts, so
//! [`Client::variant`] lookups are local, non-blocking, and keep working
//! when the network does not.
//!
//! A fetch issued while another is in flight joins it instead of producing a
//! second network call. Lookups fall back to a caller-supplied default when
//! no server-evaluated value exists.
//!
//! ```no_run
//! use experiment::{ExperimentConfig, ServerZone, UserContext, Variant};
//!
//! let client = experiment::initialize(
//!     "deployment-key",
//!     ExperimentConfig::builder()
//!         .server_zone(ServerZone::Us)
//!         .fetch_timeout_millis(1_000)
//!         .build()?,
//! )?;
//!
//! client.fetch(Some(&UserContext::new().user_id("user-1")))?;
//!
//! let variant = client.variant("my-flag", Some(Variant::from_key("control")));
//! # Ok::<(), experiment::Error>(())
//! ```
//!
//! # Capabilities
//!
//! The pieces the core does not own are injected as traits:
//! [`Transport`] (the backend fetch), [`Storage`] (durable local snapshots),
//! and [`ExposureSink`] (analytics delivery). [`Client::with_dependencies`]
//! accepts any combination; [`Client::new`] wires the HTTP transport and the
//! configured storage backend.
//!
//! # Exposure tracking
//!
//! An [`ExposureSink`] receives at most one [`ExposureEvent`] per distinct
//! flag/variant pair per client lifetime, for experiment analysis. Delivery
//! is best-effort: sink failures are never surfaced to callers.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Failed fetches never
//! corrupt the store: `variant` calls keep returning previously cached (or
//! fallback) data.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) facade with
//! target `"experiment"`. Consider installing a `log`-compatible logger for
//! visibility into fetch and persistence activity.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod exposure;
mod fetch;
mod storage;
mod store;
mod transport;
mod user;
mod variant;

pub use client::{initialize, instance, Client};
pub use config::{
    ExperimentConfig, ExperimentConfigBuilder, ServerZone, DEFAULT_INSTANCE,
};
pub use error::{Error, Result};
pub use exposure::{ExposureEvent, ExposureSink};
pub use fetch::FetchCoordinator;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::VariantStore;
pub use transport::{HttpTransport, Transport};
pub use user::{GroupProperties, UserContext};
pub use variant::{Variant, Variants};
