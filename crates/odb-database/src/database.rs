use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use odb_crypto::ContentHasher;
use odb_pack::{pack_name_from_index, PackCache, PackReader};
use odb_refs::{RefStore, StorageRefs};
use odb_store::{deframe, frame, frame_object, FsStorage, Object, ObjectKind, RawObject, Storage};
use odb_types::ObjectId;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{DbError, DbResult};

/// Directory holding `pack-<hash>.pack` / `.idx` pairs.
pub const PACK_DIR: &str = "objects/pack";

/// Contents of `config` written by [`Database::init`].
pub const DEFAULT_CONFIG: &str = "[core]\n\
\trepositoryformatversion = 0\n\
\tfilemode = true\n\
\tbare = true\n\
[gc]\n\
\tauto=0\n";

/// Branch `HEAD` points at after [`Database::init`].
pub const DEFAULT_BRANCH: &str = "refs/heads/master";

/// A git-compatible object database over any [`Storage`] backend.
///
/// New objects are always written loose (`objects/ab/cdef...`, zlib
/// compressed). Reads look at the loose object first, then at every pack
/// under `objects/pack`. Packs are only consulted when the backend is a real
/// directory, since they are memory-mapped.
pub struct Database<S: Storage + ?Sized> {
    storage: Arc<S>,
    refs: StorageRefs<S>,
    packs: Option<PackCache>,
    config: DatabaseConfig,
}

impl Database<FsStorage> {
    /// Open the repository directory at `root` with default settings.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsStorage::new(root)))
    }
}

impl<S: Storage + ?Sized> Database<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::build(storage, DatabaseConfig::default())
    }

    pub fn with_config(storage: Arc<S>, config: DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        Ok(Self::build(storage, config))
    }

    fn build(storage: Arc<S>, config: DatabaseConfig) -> Self {
        let packs = storage.root().map(|root| {
            PackCache::new(root.join(PACK_DIR)).with_crc_verification(config.verify_pack_crc)
        });
        Self {
            refs: StorageRefs::new(Arc::clone(&storage)),
            storage,
            packs,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn refs(&self) -> &StorageRefs<S> {
        &self.refs
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Point `HEAD` at `refs/heads/master` and write a default `config`.
    ///
    /// An existing `config` is left alone, so re-running is harmless apart
    /// from resetting `HEAD`.
    pub fn init(&self) -> DbResult<()> {
        self.refs.update_head(DEFAULT_BRANCH)?;
        self.storage.put("config", DEFAULT_CONFIG.as_bytes())?;
        info!(head = DEFAULT_BRANCH, "initialized object database");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Whether `id` is stored loose or in any pack.
    pub fn has(&self, id: &ObjectId) -> DbResult<bool> {
        if self.storage.exists(&id.loose_path())? {
            return Ok(true);
        }
        for pack in self.open_packs()? {
            if pack.contains(id) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Framed bytes (`"<kind> <len>\0<body>"`) of `id`, or `None` if absent.
    pub fn load(&self, id: &ObjectId) -> DbResult<Option<Vec<u8>>> {
        if let Some(framed) = self.load_loose(id)? {
            return Ok(Some(framed));
        }
        Ok(self.load_packed(id)?.map(|raw| raw.to_framed()))
    }

    /// Kind and body of `id`, or `None` if absent.
    pub fn load_raw(&self, id: &ObjectId) -> DbResult<Option<RawObject>> {
        if let Some(framed) = self.load_loose(id)? {
            return Ok(Some(deframe(&framed)?));
        }
        self.load_packed(id)
    }

    /// Decode `id` into whichever object kind it is.
    pub fn load_any(&self, id: &ObjectId) -> DbResult<Option<Object>> {
        match self.load_raw(id)? {
            Some(raw) => Ok(Some(raw.decode()?)),
            None => Ok(None),
        }
    }

    /// Decode `id`, failing with [`DbError::TypeMismatch`] unless it is a
    /// `kind`.
    pub fn load_as(&self, kind: ObjectKind, id: &ObjectId) -> DbResult<Option<Object>> {
        let Some(raw) = self.load_raw(id)? else {
            return Ok(None);
        };
        if raw.kind != kind {
            return Err(DbError::TypeMismatch {
                id: *id,
                expected: kind,
                actual: raw.kind,
            });
        }
        Ok(Some(raw.decode()?))
    }

    /// Store already-framed bytes as a loose object and return their id.
    ///
    /// Writing an object that is already present is a no-op.
    pub fn save(&self, framed: &[u8]) -> DbResult<ObjectId> {
        deframe(framed)?;
        let id = ContentHasher::raw_hash(framed);
        let path = id.loose_path();
        if self.storage.exists(&path)? {
            debug!(%id, "object already stored");
            return Ok(id);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), self.config.compression());
        encoder.write_all(framed)?;
        let compressed = encoder.finish()?;
        self.storage.put(&path, &compressed)?;
        debug!(%id, bytes = framed.len(), "saved loose object");
        Ok(id)
    }

    /// Frame `body` as a `kind` and store it.
    pub fn save_raw(&self, kind: ObjectKind, body: &[u8]) -> DbResult<ObjectId> {
        self.save(&frame(kind, body))
    }

    /// Encode and store a typed object.
    pub fn save_as(&self, object: &Object) -> DbResult<ObjectId> {
        self.save(&frame_object(object))
    }

    /// Every object id in the database, loose and packed, sorted.
    pub fn hashes(&self) -> DbResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for dir in self.storage.nodes("objects")? {
            let dir = dir?;
            if dir.len() != 2 || !dir.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            for leaf in self.storage.leaves(&format!("objects/{dir}"))? {
                let hex = format!("{dir}{}", leaf?);
                if let Ok(id) = ObjectId::from_hex(&hex) {
                    ids.push(id);
                }
            }
        }
        for pack in self.open_packs()? {
            ids.extend(pack.ids());
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn load_loose(&self, id: &ObjectId) -> DbResult<Option<Vec<u8>>> {
        let Some(compressed) = self.storage.read(&id.loose_path())? else {
            return Ok(None);
        };
        let mut framed = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut framed)
            .map_err(|source| DbError::Decompression { id: *id, source })?;
        Ok(Some(framed))
    }

    fn load_packed(&self, id: &ObjectId) -> DbResult<Option<RawObject>> {
        for pack in self.open_packs()? {
            if let Some(raw) = pack.load(id)? {
                return Ok(Some(raw));
            }
        }
        Ok(None)
    }

    /// Names of the packs with an index file, in sorted order.
    pub fn pack_names(&self) -> DbResult<Vec<String>> {
        if self.packs.is_none() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for file in self.storage.leaves(PACK_DIR)? {
            let file = file?;
            match pack_name_from_index(&file) {
                Some(name) => names.push(name.to_string()),
                None if file.ends_with(".idx") => {
                    warn!(file = file.as_str(), "ignoring oddly named pack index")
                }
                None => {}
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_packs(&self) -> DbResult<Vec<Arc<PackReader>>> {
        let Some(cache) = &self.packs else {
            return Ok(Vec::new());
        };
        self.pack_names()?
            .iter()
            .map(|name| cache.get(name).map_err(DbError::from))
            .collect()
    }

    /// Close packs idle longer than `pack_idle_timeout_secs`. Returns how
    /// many were dropped; always 0 without a configured timeout.
    pub fn evict_idle_packs(&self) -> usize {
        match (&self.packs, self.config.pack_idle_timeout()) {
            (Some(cache), Some(timeout)) => cache.evict_idle(timeout),
            _ => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Refs
    // -----------------------------------------------------------------------

    /// Branch `HEAD` names, or `None` when `HEAD` is missing.
    pub fn get_head(&self) -> DbResult<Option<String>> {
        Ok(self.refs.get_head()?)
    }

    pub fn update_head(&self, target: &str) -> DbResult<()> {
        Ok(self.refs.update_head(target)?)
    }

    pub fn get_ref(&self, name: &str) -> DbResult<Option<ObjectId>> {
        Ok(self.refs.get_ref(name)?)
    }

    pub fn set_ref(&self, name: &str, id: &ObjectId) -> DbResult<()> {
        Ok(self.refs.set_ref(name, id)?)
    }

    /// Resolve a hex id, `HEAD`, or a full or short ref name.
    pub fn resolve(&self, rev: &str) -> DbResult<Option<ObjectId>> {
        Ok(self.refs.resolve(rev)?)
    }

    pub fn list_refs(&self, prefix: &str) -> DbResult<Vec<(String, ObjectId)>> {
        Ok(self.refs.list_refs(prefix)?)
    }
}

impl<S: Storage + ?Sized> std::fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("root", &self.storage.root())
            .field("packs", &self.packs)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odb_pack::testutil::{append_delta, PackBuilder};
    use odb_store::{Blob, Commit, InMemoryStorage, Person, PersonDate};

    fn fs_db() -> (tempfile::TempDir, Database<FsStorage>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path());
        (dir, db)
    }

    fn mem_db() -> Database<InMemoryStorage> {
        Database::new(Arc::new(InMemoryStorage::new()))
    }

    fn person() -> Person {
        Person::new("A U Thor", "author@example.com", PersonDate::new(1_700_000_000, 60))
    }

    #[test]
    fn init_sets_head_and_config() {
        let db = mem_db();
        db.init().unwrap();
        assert_eq!(db.get_head().unwrap().as_deref(), Some("refs/heads/master"));
        assert_eq!(
            db.storage().read("config").unwrap().unwrap(),
            DEFAULT_CONFIG.as_bytes()
        );
        assert!(db.resolve("HEAD").unwrap().is_none());
    }

    #[test]
    fn init_keeps_existing_config() {
        let db = mem_db();
        db.storage().write("config", b"custom").unwrap();
        db.init().unwrap();
        assert_eq!(db.storage().read("config").unwrap().unwrap(), b"custom");
    }

    #[test]
    fn save_writes_compressed_loose_object() {
        let (dir, db) = fs_db();
        let id = db.save_raw(ObjectKind::Blob, b"hello\n").unwrap();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");

        let path = dir
            .path()
            .join("objects/ce/013625030ba8dba906f756967f9e9ca394464a");
        let mut framed = Vec::new();
        ZlibDecoder::new(std::fs::read(path).unwrap().as_slice())
            .read_to_end(&mut framed)
            .unwrap();
        assert_eq!(framed, b"blob 6\0hello\n");
        assert_eq!(db.load(&id).unwrap().unwrap(), framed);
    }

    #[test]
    fn save_is_idempotent() {
        let db = mem_db();
        let a = db.save(b"blob 3\0abc").unwrap();
        let b = db.save(b"blob 3\0abc").unwrap();
        assert_eq!(a, b);
        assert_eq!(db.hashes().unwrap(), vec![a]);
    }

    #[test]
    fn save_rejects_unframed_bytes() {
        let db = mem_db();
        assert!(matches!(db.save(b"not an object"), Err(DbError::Store(_))));
        assert!(db.hashes().unwrap().is_empty());
    }

    #[test]
    fn missing_object_is_none() {
        let db = mem_db();
        let id = ObjectId::from_hash([7u8; 20]);
        assert!(!db.has(&id).unwrap());
        assert!(db.load(&id).unwrap().is_none());
        assert!(db.load_any(&id).unwrap().is_none());
        assert!(db.load_as(ObjectKind::Blob, &id).unwrap().is_none());
    }

    #[test]
    fn typed_roundtrip_and_mismatch() {
        let db = mem_db();
        let blob_id = db.save_as(&Object::Blob(Blob::from("content"))).unwrap();
        let commit = Commit {
            tree: blob_id,
            parents: vec![],
            author: person(),
            committer: person(),
            extra_headers: vec![],
            message: "initial\n".into(),
        };
        let commit_id = db.save_as(&Object::Commit(commit.clone())).unwrap();

        assert_eq!(
            db.load_as(ObjectKind::Commit, &commit_id).unwrap(),
            Some(Object::Commit(commit))
        );
        assert!(matches!(
            db.load_as(ObjectKind::Tree, &commit_id),
            Err(DbError::TypeMismatch {
                expected: ObjectKind::Tree,
                actual: ObjectKind::Commit,
                ..
            })
        ));
        let any = db.load_any(&blob_id).unwrap().unwrap();
        assert_eq!(any.as_blob().unwrap().data, b"content");
    }

    #[test]
    fn corrupt_loose_object_reports_id() {
        let db = mem_db();
        let id = ObjectId::from_hash([1u8; 20]);
        db.storage().write(&id.loose_path(), b"not zlib").unwrap();
        assert!(matches!(
            db.load(&id),
            Err(DbError::Decompression { id: bad, .. }) if bad == id
        ));
    }

    #[test]
    fn hashes_skip_foreign_files() {
        let db = mem_db();
        let id = db.save_raw(ObjectKind::Blob, b"x").unwrap();
        db.storage().write("objects/info/alternates", b"").unwrap();
        db.storage().write("objects/zz/not-an-object", b"").unwrap();
        assert_eq!(db.hashes().unwrap(), vec![id]);
    }

    #[test]
    fn refs_are_delegated() {
        let db = mem_db();
        db.init().unwrap();
        let id = db.save_raw(ObjectKind::Blob, b"tip").unwrap();
        db.set_ref("refs/heads/master", &id).unwrap();
        db.set_ref("refs/tags/v1", &id).unwrap();
        assert_eq!(db.resolve("HEAD").unwrap(), Some(id));
        assert_eq!(db.resolve("v1").unwrap(), Some(id));
        assert_eq!(db.get_ref("refs/heads/master").unwrap(), Some(id));
        let refs = db.list_refs("refs").unwrap();
        assert_eq!(
            refs.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            ["refs/heads/master", "refs/tags/v1"]
        );
    }

    #[test]
    fn refs_cannot_overwrite_objects_or_config() {
        let (_dir, db) = fs_db();
        db.init().unwrap();
        let id = db.save_raw(ObjectKind::Blob, b"immutable").unwrap();
        let other = ObjectId::from_hash([1u8; 20]);

        assert!(matches!(
            db.set_ref(&id.loose_path(), &other),
            Err(DbError::Ref(odb_refs::RefError::InvalidName { .. }))
        ));
        assert!(db.set_ref("config", &other).is_err());
        assert_eq!(db.load(&id).unwrap().unwrap(), b"blob 9\0immutable");
        assert_eq!(
            db.storage().read("config").unwrap().unwrap(),
            DEFAULT_CONFIG.as_bytes()
        );
    }

    #[test]
    fn branch_named_config_resolves_after_init() {
        let (_dir, db) = fs_db();
        db.init().unwrap();
        let id = db.save_raw(ObjectKind::Blob, b"tip").unwrap();
        db.set_ref("refs/heads/config", &id).unwrap();
        db.set_ref("refs/heads/objects", &id).unwrap();
        assert_eq!(db.resolve("config").unwrap(), Some(id));
        assert_eq!(db.resolve("objects").unwrap(), Some(id));
    }

    #[test]
    fn packed_objects_are_found() {
        let (dir, db) = fs_db();
        let base = b"base content shared by both objects\n".to_vec();
        let mut target = base.clone();
        target.extend_from_slice(b"and a little more\n");

        let mut builder = PackBuilder::new();
        let (base_id, base_off) = builder.add_object(ObjectKind::Blob, &base);
        let (target_id, _) = builder.add_ofs_delta(
            base_off,
            ObjectKind::Blob,
            &target,
            &append_delta(base.len(), b"and a little more\n"),
        );
        builder.write_to(&dir.path().join(PACK_DIR));

        assert!(db.has(&target_id).unwrap());
        assert_eq!(db.load(&target_id).unwrap().unwrap(), frame(ObjectKind::Blob, &target));
        let any = db.load_any(&base_id).unwrap().unwrap();
        assert_eq!(any.as_blob().unwrap().data, base);

        let loose = db.save_raw(ObjectKind::Blob, b"loose").unwrap();
        let mut expected = vec![base_id, target_id, loose];
        expected.sort();
        assert_eq!(db.hashes().unwrap(), expected);
        assert_eq!(db.pack_names().unwrap().len(), 1);
    }

    #[test]
    fn loose_copy_shadows_packed_copy() {
        let (dir, db) = fs_db();
        let mut builder = PackBuilder::new();
        let (id, _) = builder.add_object(ObjectKind::Blob, b"same");
        builder.write_to(&dir.path().join(PACK_DIR));

        assert_eq!(db.save_raw(ObjectKind::Blob, b"same").unwrap(), id);
        assert_eq!(db.hashes().unwrap(), vec![id]);
        assert_eq!(db.load(&id).unwrap().unwrap(), b"blob 4\0same");
    }

    #[test]
    fn broken_pack_is_an_error() {
        let (dir, db) = fs_db();
        let pack_dir = dir.path().join(PACK_DIR);
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("pack-broken.idx"), b"garbage").unwrap();
        std::fs::write(pack_dir.join("pack-broken.pack"), b"garbage").unwrap();
        let id = ObjectId::from_hash([9u8; 20]);
        assert!(matches!(db.load(&id), Err(DbError::Pack(_))));
    }

    #[test]
    fn in_memory_store_never_sees_packs() {
        let db = mem_db();
        db.storage().write("objects/pack/pack-x.idx", b"garbage").unwrap();
        assert!(db.pack_names().unwrap().is_empty());
        assert!(db.load(&ObjectId::from_hash([2u8; 20])).unwrap().is_none());
    }

    #[test]
    fn config_controls_packs() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            compression_level: 1,
            verify_pack_crc: true,
            pack_idle_timeout_secs: Some(0),
        };
        let db = Database::with_config(Arc::new(FsStorage::new(dir.path())), config).unwrap();
        let mut builder = PackBuilder::new();
        let (id, _) = builder.add_object(ObjectKind::Blob, b"packed");
        builder.write_to(&dir.path().join(PACK_DIR));

        assert!(db.has(&id).unwrap());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(db.evict_idle_packs(), 1);
        assert_eq!(db.evict_idle_packs(), 0);
        assert!(db.has(&id).unwrap());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DatabaseConfig {
            compression_level: 10,
            ..DatabaseConfig::default()
        };
        assert!(matches!(
            Database::with_config(Arc::new(InMemoryStorage::new()), config),
            Err(DbError::Config(_))
        ));
    }
}
