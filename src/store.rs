//! A thread-safe store for the last-known variant of every flag.
//! [`VariantStore`] provides concurrent access for readers (variant lookup)
//! and serialized write access for the fetch path, and mirrors every write to
//! durable storage.
use std::sync::{Arc, Mutex, RwLock};

use crate::storage::Storage;
use crate::{Result, Variant, Variants};

/// `VariantStore` maps flag keys to their last-known [`Variant`].
///
/// Reads are concurrent and non-blocking; `merge` and `clear` are serialized
/// by an internal writer lock. Writes persist the new snapshot *before*
/// committing it to memory, so a storage failure leaves the in-memory state
/// untouched and the call returns
/// [`Error::Persistence`](crate::Error::Persistence).
pub struct VariantStore {
    variants: RwLock<Variants>,
    /// Serializes merge/clear without blocking readers on storage I/O.
    writer: Mutex<()>,
    storage: Arc<dyn Storage>,
    storage_key: String,
}

impl VariantStore {
    /// Open a store backed by `storage`, scoped by `storage_key`.
    ///
    /// Loads the persisted snapshot if one exists; otherwise seeds the store
    /// with `initial_variants`. An unreadable or corrupt snapshot is logged
    /// and treated as absent so the client stays usable.
    pub fn open(
        storage: Arc<dyn Storage>,
        storage_key: impl Into<String>,
        initial_variants: &Variants,
    ) -> VariantStore {
        let storage_key = storage_key.into();
        let variants = match Self::load(&*storage, &storage_key) {
            Ok(Some(loaded)) if !loaded.is_empty() => {
                log::debug!(target: "experiment", "loaded {} persisted variants", loaded.len());
                loaded
            }
            Ok(_) => initial_variants.clone(),
            Err(err) => {
                log::warn!(target: "experiment", "failed to load persisted variants: {err}");
                initial_variants.clone()
            }
        };

        VariantStore {
            variants: RwLock::new(variants),
            writer: Mutex::new(()),
            storage,
            storage_key,
        }
    }

    fn load(storage: &dyn Storage, storage_key: &str) -> Result<Option<Variants>> {
        let Some(bytes) = storage.get(storage_key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Get the stored variant for `key`. Returns `None` if absent.
    pub fn get(&self, key: &str) -> Option<Variant> {
        let variants = self
            .variants
            .read()
            .expect("thread holding variants lock should not panic");
        variants.get(key).cloned()
    }

    /// Snapshot of all stored variants. Mutating the returned map does not
    /// affect the store.
    pub fn get_all(&self) -> Variants {
        let variants = self
            .variants
            .read()
            .expect("thread holding variants lock should not panic");
        variants.clone()
    }

    /// Merge fetch `results` into the store: keys present in `results` are
    /// overwritten, all other keys keep their prior values.
    ///
    /// The merged snapshot is persisted before the in-memory commit; on a
    /// storage failure nothing is applied.
    pub fn merge(&self, results: Variants) -> Result<()> {
        let _writer = self.writer.lock().expect("variant writer should not panic");

        let mut next = self.get_all();
        next.extend(results);
        self.persist(&next)?;

        *self
            .variants
            .write()
            .expect("thread holding variants lock should not panic") = next;
        Ok(())
    }

    /// Empty the store, both in-memory and persisted. On a storage failure
    /// the in-memory state is left untouched.
    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().expect("variant writer should not panic");

        self.storage.delete(&self.storage_key)?;

        self.variants
            .write()
            .expect("thread holding variants lock should not panic")
            .clear();
        Ok(())
    }

    fn persist(&self, snapshot: &Variants) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.storage.put(&self.storage_key, &bytes)
    }
}
