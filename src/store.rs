use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::db::KvBackend;
use crate::error::{Result, StorageError};

/// A persisted entity addressed by a stable string id.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// Where a record with a previously unseen id goes in its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    /// Newest first.
    Prepend,
    /// Insertion order.
    Append,
}

/// Atomic access to collections of records, each stored as one serialized
/// array under its root key.
///
/// Every mutation goes through the backend's `update` primitive, so two
/// calls against the same root never interleave their read-modify-write.
/// Backend work runs on the blocking pool; callers just `.await`.
#[derive(Clone)]
pub struct CollectionStore {
    backend: Arc<dyn KvBackend>,
}

impl CollectionStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Create an empty collection under `root` unless one already exists.
    pub async fn initialize(&self, root: &str) -> Result<()> {
        let root = root.to_string();
        self.run(move |backend| {
            let created = backend.insert_if_absent(&root, b"[]")?;
            tracing::debug!(root = %root, created, "initialized collection");
            Ok(())
        })
        .await
    }

    /// Full collection; empty if `root` was never written.
    pub async fn list_all<R: Record>(&self, root: &str) -> Result<Vec<R>> {
        let root = root.to_string();
        self.run(move |backend| decode(backend.get(&root)?)).await
    }

    pub async fn get_by_id<R: Record>(&self, root: &str, id: &str) -> Result<Option<R>> {
        let records: Vec<R> = self.list_all(root).await?;
        Ok(records.into_iter().find(|r| r.id() == id))
    }

    /// Insert or replace `record` by id in one atomic transaction.
    pub async fn upsert<R: Record>(
        &self,
        root: &str,
        record: R,
        policy: InsertPolicy,
    ) -> Result<()> {
        let root = root.to_string();
        self.run(move |backend| {
            let id = record.id().to_string();
            let mut pending = Some(record);
            let mut replaced = false;
            backend.update(&root, &mut |current| {
                let mut records: Vec<R> = decode(current)?;
                let record = pending.take().ok_or_else(|| {
                    StorageError::Unavailable("upsert transform re-entered".to_string())
                })?;
                replaced = upsert_into(&mut records, record, policy);
                encode(&records)
            })?;
            tracing::debug!(root = %root, id = %id, replaced, "upserted record");
            Ok(())
        })
        .await
    }

    /// Drop any record with `id`. Missing ids are not an error.
    pub async fn remove_by_id<R: Record>(&self, root: &str, id: &str) -> Result<()> {
        let root = root.to_string();
        let id = id.to_string();
        self.run(move |backend| {
            let mut removed = 0;
            backend.update(&root, &mut |current| {
                let mut records: Vec<R> = decode(current)?;
                let before = records.len();
                records.retain(|r| r.id() != id);
                removed = before - records.len();
                encode(&records)
            })?;
            tracing::debug!(root = %root, id = %id, removed, "removed record");
            Ok(())
        })
        .await
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KvBackend) -> Result<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || op(backend.as_ref()))
            .await
            .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
    }
}

fn decode<R: Record>(bytes: Option<Vec<u8>>) -> Result<Vec<R>> {
    match bytes {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

fn encode<R: Record>(records: &[R]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(records)?)
}

/// Replace the record with the same id in place, or insert per `policy`.
/// Returns true on replace. Stray duplicates of the id are dropped so exactly
/// one copy remains.
fn upsert_into<R: Record>(records: &mut Vec<R>, record: R, policy: InsertPolicy) -> bool {
    let Some(index) = records.iter().position(|r| r.id() == record.id()) else {
        match policy {
            InsertPolicy::Prepend => records.insert(0, record),
            InsertPolicy::Append => records.push(record),
        }
        return false;
    };

    let id = record.id().to_string();
    records[index] = record;
    let mut pos = 0;
    records.retain(|r| {
        let keep = pos == index || r.id() != id;
        pos += 1;
        keep
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemoryBackend};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        text: String,
    }

    impl Record for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, text: &str) -> Note {
        Note {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    fn store() -> CollectionStore {
        CollectionStore::new(Arc::new(MemoryBackend::new()))
    }

    fn ids(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_upsert_into_prepend_and_append() {
        let mut notes = vec![note("a", "1")];
        assert!(!upsert_into(&mut notes, note("b", "2"), InsertPolicy::Prepend));
        assert!(!upsert_into(&mut notes, note("c", "3"), InsertPolicy::Append));
        assert_eq!(ids(&notes), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_upsert_into_replaces_in_place() {
        let mut notes = vec![note("a", "1"), note("b", "2"), note("c", "3")];
        assert!(upsert_into(&mut notes, note("b", "changed"), InsertPolicy::Prepend));
        assert_eq!(ids(&notes), vec!["a", "b", "c"]);
        assert_eq!(notes[1].text, "changed");
    }

    #[test]
    fn test_upsert_into_collapses_duplicates() {
        let mut notes = vec![note("a", "1"), note("x", "2"), note("a", "3")];
        upsert_into(&mut notes, note("a", "new"), InsertPolicy::Append);
        assert_eq!(ids(&notes), vec!["a", "x"]);
        assert_eq!(notes[0].text, "new");
    }

    #[tokio::test]
    async fn test_list_all_uninitialized_is_empty() {
        let store = store();
        let notes: Vec<Note> = store.list_all("notes").await.unwrap();
        assert!(notes.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_and_keeps_data() {
        let store = store();
        store.initialize("notes").await.unwrap();
        store.upsert("notes", note("a", "1"), InsertPolicy::Append).await.unwrap();
        store.initialize("notes").await.unwrap();
        let notes: Vec<Note> = store.list_all("notes").await.unwrap();
        assert_eq!(notes, vec![note("a", "1")]);
    }

    #[tokio::test]
    async fn test_upsert_same_record_twice_keeps_one() {
        let store = store();
        store.upsert("notes", note("a", "1"), InsertPolicy::Prepend).await.unwrap();
        store.upsert("notes", note("a", "1"), InsertPolicy::Prepend).await.unwrap();
        let notes: Vec<Note> = store.list_all("notes").await.unwrap();
        assert_eq!(notes, vec![note("a", "1")]);
    }

    #[tokio::test]
    async fn test_remove_by_id() {
        let store = store();
        store.upsert("notes", note("a", "1"), InsertPolicy::Append).await.unwrap();
        store.upsert("notes", note("b", "2"), InsertPolicy::Append).await.unwrap();

        store.remove_by_id::<Note>("notes", "a").await.unwrap();
        let notes: Vec<Note> = store.list_all("notes").await.unwrap();
        assert_eq!(notes, vec![note("b", "2")]);
        assert!(store.get_by_id::<Note>("notes", "a").await.unwrap().is_none());

        // Missing id is a no-op
        store.remove_by_id::<Note>("notes", "zzz").await.unwrap();
        let notes: Vec<Note> = store.list_all("notes").await.unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_roots_are_independent() {
        let store = store();
        store.upsert("left", note("a", "1"), InsertPolicy::Append).await.unwrap();
        let right: Vec<Note> = store.list_all("right").await.unwrap();
        assert!(right.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_keep_every_record() {
        let store = CollectionStore::new(Arc::new(Database::open_in_memory().unwrap()));
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert("notes", note(&i.to_string(), "x"), InsertPolicy::Prepend)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let notes: Vec<Note> = store.list_all("notes").await.unwrap();
        assert_eq!(notes.len(), 32);
    }

    #[tokio::test]
    async fn test_corrupt_collection_surfaces_serialization_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("notes", b"{not json").unwrap();
        let store = CollectionStore::new(backend.clone());

        let listed = store.list_all::<Note>("notes").await;
        assert!(matches!(listed, Err(StorageError::Serialization(_))));

        let saved = store.upsert("notes", note("a", "1"), InsertPolicy::Append).await;
        assert!(matches!(saved, Err(StorageError::Serialization(_))));
        // Nothing was overwritten
        assert_eq!(backend.get("notes").unwrap().as_deref(), Some(&b"{not json"[..]));
    }
}
