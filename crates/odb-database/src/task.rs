use std::sync::Arc;

use odb_store::{Object, ObjectKind, RawObject, Storage};
use odb_types::ObjectId;

use crate::database::Database;
use crate::error::{DbError, DbResult};

/// Async front for a [`Database`].
///
/// Every call runs on tokio's blocking pool, so file I/O, inflation and pack
/// mapping never stall the runtime. Clones share the same database and pack
/// cache.
pub struct AsyncDatabase<S: Storage + ?Sized + 'static> {
    inner: Arc<Database<S>>,
}

impl<S: Storage + ?Sized + 'static> Clone for AsyncDatabase<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Storage + ?Sized + 'static> AsyncDatabase<S> {
    pub fn new(db: Database<S>) -> Self {
        Self { inner: Arc::new(db) }
    }

    pub fn from_arc(inner: Arc<Database<S>>) -> Self {
        Self { inner }
    }

    /// The wrapped synchronous database.
    pub fn blocking(&self) -> &Database<S> {
        &self.inner
    }

    async fn run<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database<S>) -> DbResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| DbError::Task(e.to_string()))?
    }

    pub async fn init(&self) -> DbResult<()> {
        self.run(|db| db.init()).await
    }

    pub async fn has(&self, id: ObjectId) -> DbResult<bool> {
        self.run(move |db| db.has(&id)).await
    }

    pub async fn load(&self, id: ObjectId) -> DbResult<Option<Vec<u8>>> {
        self.run(move |db| db.load(&id)).await
    }

    pub async fn load_raw(&self, id: ObjectId) -> DbResult<Option<RawObject>> {
        self.run(move |db| db.load_raw(&id)).await
    }

    pub async fn load_any(&self, id: ObjectId) -> DbResult<Option<Object>> {
        self.run(move |db| db.load_any(&id)).await
    }

    pub async fn load_as(&self, kind: ObjectKind, id: ObjectId) -> DbResult<Option<Object>> {
        self.run(move |db| db.load_as(kind, &id)).await
    }

    pub async fn save(&self, framed: Vec<u8>) -> DbResult<ObjectId> {
        self.run(move |db| db.save(&framed)).await
    }

    pub async fn save_raw(&self, kind: ObjectKind, body: Vec<u8>) -> DbResult<ObjectId> {
        self.run(move |db| db.save_raw(kind, &body)).await
    }

    pub async fn save_as(&self, object: Object) -> DbResult<ObjectId> {
        self.run(move |db| db.save_as(&object)).await
    }

    pub async fn hashes(&self) -> DbResult<Vec<ObjectId>> {
        self.run(|db| db.hashes()).await
    }

    pub async fn resolve(&self, rev: impl Into<String>) -> DbResult<Option<ObjectId>> {
        let rev = rev.into();
        self.run(move |db| db.resolve(&rev)).await
    }

    pub async fn get_head(&self) -> DbResult<Option<String>> {
        self.run(|db| db.get_head()).await
    }

    pub async fn update_head(&self, target: impl Into<String>) -> DbResult<()> {
        let target = target.into();
        self.run(move |db| db.update_head(&target)).await
    }

    pub async fn get_ref(&self, name: impl Into<String>) -> DbResult<Option<ObjectId>> {
        let name = name.into();
        self.run(move |db| db.get_ref(&name)).await
    }

    pub async fn list_refs(&self, prefix: impl Into<String>) -> DbResult<Vec<(String, ObjectId)>> {
        let prefix = prefix.into();
        self.run(move |db| db.list_refs(&prefix)).await
    }

    pub async fn set_ref(&self, name: impl Into<String>, id: ObjectId) -> DbResult<()> {
        let name = name.into();
        self.run(move |db| db.set_ref(&name, &id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odb_store::{Blob, InMemoryStorage};

    fn db() -> AsyncDatabase<InMemoryStorage> {
        AsyncDatabase::new(Database::new(Arc::new(InMemoryStorage::new())))
    }

    #[tokio::test]
    async fn save_and_load_off_the_runtime() {
        let db = db();
        db.init().await.unwrap();
        let id = db.save_as(Object::Blob(Blob::from("async"))).await.unwrap();
        assert!(db.has(id).await.unwrap());
        assert_eq!(db.load(id).await.unwrap().unwrap(), b"blob 5\0async");
        assert!(matches!(
            db.load_as(ObjectKind::Tree, id).await,
            Err(DbError::TypeMismatch { .. })
        ));
        db.set_ref("refs/heads/master", id).await.unwrap();
        assert_eq!(db.resolve("HEAD").await.unwrap(), Some(id));
        assert_eq!(db.get_head().await.unwrap().as_deref(), Some("refs/heads/master"));
    }

    #[tokio::test]
    async fn raw_objects_and_refs() {
        let db = db();
        let id = db.save_raw(ObjectKind::Blob, b"raw".to_vec()).await.unwrap();
        let raw = db.load_raw(id).await.unwrap().unwrap();
        assert_eq!(raw.kind, ObjectKind::Blob);
        assert_eq!(raw.body, b"raw");

        db.update_head("refs/heads/main").await.unwrap();
        db.set_ref("refs/heads/main", id).await.unwrap();
        assert_eq!(db.get_head().await.unwrap().as_deref(), Some("refs/heads/main"));
        assert_eq!(db.get_ref("refs/heads/main").await.unwrap(), Some(id));
        assert_eq!(
            db.list_refs("refs").await.unwrap(),
            vec![("refs/heads/main".to_string(), id)]
        );
        assert!(matches!(
            db.set_ref("config", id).await,
            Err(DbError::Ref(_))
        ));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let db = db();
        let other = db.clone();
        let id = db.save(b"blob 1\0z".to_vec()).await.unwrap();
        assert_eq!(other.hashes().await.unwrap(), vec![id]);
        assert!(other.blocking().has(&id).unwrap());
    }

    #[tokio::test]
    async fn concurrent_saves_of_same_object() {
        let db = db();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.save(b"blob 4\0same".to_vec()).await.unwrap() })
            })
            .collect();
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(db.hashes().await.unwrap(), ids);
    }
}
