//! Process-wide cache of open packs, populated single-flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use odb_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{PackError, PackResult};
use crate::reader::PackReader;

type OpenResult = Result<Arc<PackReader>, Arc<PackError>>;

/// One pack's cache slot. The `OnceLock` is the single-flight gate: the
/// first caller runs the open, concurrent callers block on it and then see
/// the same outcome.
struct Slot {
    cell: OnceLock<OpenResult>,
    last_access: Mutex<Instant>,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            last_access: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Opened packs of one repository, keyed by the 40-hex pack name.
///
/// A pack is opened at most once: concurrent first references coalesce into
/// a single open, and a failed open is cached and handed to every later
/// caller as [`PackError::Shared`]. Ready readers are immutable, so callers
/// use them without further locking.
pub struct PackCache {
    pack_dir: PathBuf,
    verify_crc: bool,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl PackCache {
    /// Cache for packs under `pack_dir` (normally `<root>/objects/pack`).
    pub fn new(pack_dir: impl Into<PathBuf>) -> Self {
        Self {
            pack_dir: pack_dir.into(),
            verify_crc: false,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Verify entry CRCs in every pack opened from now on.
    pub fn with_crc_verification(mut self, enabled: bool) -> Self {
        self.verify_crc = enabled;
        self
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    /// Reader for pack `name`, opening it on first use.
    pub fn get(&self, name: &str) -> PackResult<Arc<PackReader>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                slots
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Slot::new())),
            )
        };
        slot.touch();

        let outcome = slot.cell.get_or_init(|| {
            self.open(name).map(Arc::new).map_err(|e| {
                warn!(pack = name, error = %e, "failed to open pack");
                Arc::new(e)
            })
        });
        match outcome {
            Ok(reader) => Ok(Arc::clone(reader)),
            Err(e) => Err(PackError::Shared(Arc::clone(e))),
        }
    }

    fn open(&self, name: &str) -> PackResult<PackReader> {
        let pack_path = self.pack_dir.join(format!("pack-{name}.pack"));
        let index_path = self.pack_dir.join(format!("pack-{name}.idx"));
        debug!(pack = name, "opening pack");
        Ok(PackReader::open(&pack_path, &index_path)?.with_crc_verification(self.verify_crc))
    }

    /// Drop packs not touched for `max_idle`, returning how many were closed.
    ///
    /// Readers already handed out stay valid until their last user drops
    /// them. Slots still opening are kept.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|name, slot| {
            let keep = slot.cell.get().is_none() || slot.idle_for() < max_idle;
            if !keep {
                debug!(pack = name.as_str(), "evicting idle pack");
            }
            keep
        });
        before - slots.len()
    }

    /// Number of packs with a slot (opening, ready or failed).
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackCache")
            .field("pack_dir", &self.pack_dir)
            .field("verify_crc", &self.verify_crc)
            .field("cached", &self.len())
            .finish()
    }
}

/// Pack name from an index file name `pack-<40 hex>.idx`.
pub fn pack_name_from_index(file_name: &str) -> Option<&str> {
    let name = file_name.strip_prefix("pack-")?.strip_suffix(".idx")?;
    ObjectId::is_hex(name).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::PackBuilder;
    use odb_store::ObjectKind;
    use std::thread;

    #[test]
    fn opens_once_and_shares_reader() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = PackBuilder::new();
        let (id, _) = b.add_object(ObjectKind::Blob, b"cached");
        let name = b.write_to(dir.path());

        let cache = PackCache::new(dir.path());
        let first = cache.get(&name).unwrap();
        let second = cache.get(&name).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.load(&id).unwrap().unwrap().body, b"cached");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_first_use_coalesces() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = PackBuilder::new();
        b.add_object(ObjectKind::Blob, b"shared");
        let name = b.write_to(dir.path());

        let cache = Arc::new(PackCache::new(dir.path()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let name = name.clone();
                thread::spawn(move || cache.get(&name).unwrap())
            })
            .collect();
        let readers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &readers[1..] {
            assert!(Arc::ptr_eq(&readers[0], r));
        }
    }

    #[test]
    fn failure_is_cached_until_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackCache::new(dir.path());

        let mut b = PackBuilder::new();
        b.add_object(ObjectKind::Blob, b"late");
        let (pack, _) = b.finish();
        let name = hex::encode(&pack[pack.len() - 20..]);

        let err = cache.get(&name).unwrap_err();
        assert!(matches!(err, PackError::Shared(_)));
        assert!(matches!(err.root(), PackError::Io(_)));

        // The files appear, but the cached failure still wins.
        let mut b = PackBuilder::new();
        b.add_object(ObjectKind::Blob, b"late");
        b.write_to(dir.path());
        assert!(cache.get(&name).is_err());

        assert_eq!(cache.evict_idle(Duration::ZERO), 1);
        assert!(cache.get(&name).is_ok());
    }

    #[test]
    fn evict_idle_keeps_recent_packs() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = PackBuilder::new();
        b.add_object(ObjectKind::Blob, b"x");
        let name = b.write_to(dir.path());

        let cache = PackCache::new(dir.path());
        let reader = cache.get(&name).unwrap();
        assert_eq!(cache.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(cache.evict_idle(Duration::ZERO), 1);
        assert!(cache.is_empty());
        // Handed-out readers outlive eviction.
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn pack_names_from_index_files() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(pack_name_from_index(&format!("pack-{hex}.idx")), Some(hex));
        assert_eq!(pack_name_from_index(&format!("pack-{hex}.pack")), None);
        assert_eq!(pack_name_from_index("pack-short.idx"), None);
        assert_eq!(pack_name_from_index("README"), None);
    }
}
