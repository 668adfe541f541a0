use feed_msg::Doc;
use feed_ref::{CollectionPath, DocPath, MediaPath, RefError};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::{Connection, SqliteConnection};
use thiserror::Error as ThisError;
use tokio::sync::broadcast;

mod batch;
pub mod sql;
pub use batch::{MapUpdate, WriteBatch, WriteOp};
use sql::*;

const CHANGE_FEED_CAPACITY: usize = 1024;

/// Document and blob store backing the feed.
///
/// Documents are JSON objects addressed by [`DocPath`]; blobs are byte
/// strings grouped under a [`MediaPath`] prefix. Every write that changes
/// something is announced on the change feed (see [`Database::subscribe`]).
pub struct Database {
    sql: SqliteConnection,
    changes: broadcast::Sender<Change>,
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Json error, cause: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Sql error, cause: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Bad reference, cause: {0}")]
    Ref(#[from] RefError),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Field {field:?} of {path} is not a map")]
    NotAMap { path: String, field: String },
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    DocCreated(DocPath),
    DocUpdated(DocPath),
    DocDeleted(DocPath),
    BlobPut(String),
    BlobDeleted(String),
}

impl Change {
    pub fn doc_path(&self) -> Option<&DocPath> {
        match self {
            Change::DocCreated(path) | Change::DocUpdated(path) | Change::DocDeleted(path) => {
                Some(path)
            }
            Change::BlobPut(_) | Change::BlobDeleted(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobEntry {
    pub path: String,
    pub content_type: Option<String>,
    pub size: u64,
}

impl Database {
    pub async fn open(sql_path: &str) -> Result<Self, Error> {
        let mut sql = create_connection(sql_path).await?;
        setup_db(&mut sql).await?;

        match get_db_version(&mut sql).await? {
            None => {
                info!("sqlite db at {} is new. Creating tables.", sql_path);
                setup_new_db(&mut sql).await?;
            }
            Some(found) => ensure_supported_version(found)?,
        }

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Ok(Self { sql, changes })
    }

    pub async fn in_memory() -> Result<Self, Error> {
        Self::open("sqlite::memory:").await
    }

    pub async fn check_integrity(&mut self) -> Result<bool, Error> {
        Ok(check_db_integrity(&mut self.sql).await?)
    }

    /// Receives every change made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    // documents

    pub async fn get_doc<T: DeserializeOwned>(
        &mut self,
        path: &DocPath,
    ) -> Result<Option<T>, Error> {
        match select_doc_data(&mut self.sql, path).await? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn doc_exists(&mut self, path: &DocPath) -> Result<bool, Error> {
        Ok(select_doc_data(&mut self.sql, path).await?.is_some())
    }

    /// Creates or replaces a whole document.
    pub async fn set_doc<T: Serialize>(&mut self, path: &DocPath, data: &T) -> Result<(), Error> {
        let data = serde_json::to_string(data)?;
        let created = upsert_doc(&mut self.sql, path, &data).await?;

        self.publish(if created {
            Change::DocCreated(path.clone())
        } else {
            Change::DocUpdated(path.clone())
        });

        Ok(())
    }

    /// Returns whether the document existed.
    pub async fn delete_doc(&mut self, path: &DocPath) -> Result<bool, Error> {
        let deleted = delete_docs(&mut self.sql, std::slice::from_ref(path)).await?;
        let existed = !deleted.is_empty();

        if existed {
            self.publish(Change::DocDeleted(path.clone()));
        }

        Ok(existed)
    }

    pub async fn list_collection<T: DeserializeOwned>(
        &mut self,
        collection: &CollectionPath,
    ) -> Result<Vec<Doc<T>>, Error> {
        let rows = select_collection(&mut self.sql, collection).await?;
        let mut docs = Vec::with_capacity(rows.len());
        for (path, data) in rows {
            docs.push(Doc {
                path: DocPath::from_string(path)?,
                data: serde_json::from_str(&data)?,
            });
        }
        Ok(docs)
    }

    pub async fn count_collection(&mut self, collection: &CollectionPath) -> Result<u64, Error> {
        let count = select_collection_count(&mut self.sql, collection).await?;
        Ok(count as u64)
    }

    /// Sets or removes one key of a map-valued field, leaving the rest of the
    /// document untouched. Returns whether the document changed.
    pub async fn update_map_entry(
        &mut self,
        path: &DocPath,
        field: &str,
        key: &str,
        update: MapUpdate,
    ) -> Result<bool, Error> {
        let mut tx = self.sql.begin().await?;
        let changed = apply_map_update(&mut tx, path, field, key, &update)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        tx.commit().await?;

        if changed {
            self.publish(Change::DocUpdated(path.clone()));
        }

        Ok(changed)
    }

    /// Applies every write in the batch in one transaction.
    ///
    /// Returns the changes made, which are published once the transaction
    /// has committed. On error nothing is written.
    pub async fn commit(&mut self, batch: WriteBatch) -> Result<Vec<Change>, Error> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        trace!("Start batch commit of {} writes", batch.len());

        let mut changes = Vec::new();
        let mut tx = self.sql.begin().await?;

        for (is_delete, run) in runs_of_deletes(batch.into_ops()) {
            if is_delete {
                let paths: Vec<DocPath> = run
                    .into_iter()
                    .filter_map(|op| match op {
                        WriteOp::Delete(path) => Some(path),
                        _ => None,
                    })
                    .collect();
                for deleted in delete_docs(&mut tx, &paths).await? {
                    changes.push(Change::DocDeleted(DocPath::from_string(deleted)?));
                }
                continue;
            }

            for op in run {
                match op {
                    WriteOp::Set { path, data } => {
                        let created = upsert_doc(&mut tx, &path, &data.to_string()).await?;
                        changes.push(if created {
                            Change::DocCreated(path)
                        } else {
                            Change::DocUpdated(path)
                        });
                    }
                    WriteOp::UpdateMap {
                        path,
                        field,
                        key,
                        update,
                    } => match apply_map_update(&mut tx, &path, &field, &key, &update).await {
                        Ok(Some(true)) => changes.push(Change::DocUpdated(path)),
                        Ok(Some(false)) => {}
                        Ok(None) => debug!("skipping map update of missing doc {}", path),
                        // Nothing was written for it, the rest of the batch stands.
                        Err(Error::NotAMap { .. }) => {
                            warn!("skipping map update of {}: {:?} is not a map", path, field)
                        }
                        Err(err) => return Err(err),
                    },
                    WriteOp::Delete(_) => unreachable!("deletes are grouped into runs"),
                }
            }
        }

        tx.commit().await?;

        trace!("Committed batch with {} changes", changes.len());
        for change in changes.iter() {
            self.publish(change.clone());
        }

        Ok(changes)
    }

    // blobs

    pub async fn put_blob(
        &mut self,
        path: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), Error> {
        let prefix = MediaPath::parent_of(path)?;
        insert_or_replace_blob(&mut self.sql, path, &prefix, bytes, content_type).await?;
        self.publish(Change::BlobPut(path.to_string()));
        Ok(())
    }

    /// Blobs stored directly under the prefix.
    pub async fn list_blobs(&mut self, prefix: &MediaPath) -> Result<Vec<BlobEntry>, Error> {
        let rows = select_blobs_by_prefix(&mut self.sql, prefix).await?;
        Ok(rows
            .into_iter()
            .map(|(path, content_type, size)| BlobEntry {
                path,
                content_type,
                size: size as u64,
            })
            .collect())
    }

    pub async fn get_blob(&mut self, path: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(select_blob_data(&mut self.sql, path).await?)
    }

    /// Returns whether the blob existed.
    pub async fn delete_blob(&mut self, path: &str) -> Result<bool, Error> {
        let existed = sql::delete_blob(&mut self.sql, path).await?;
        if existed {
            self.publish(Change::BlobDeleted(path.to_string()));
        }
        Ok(existed)
    }

    fn publish(&self, change: Change) {
        trace!("publish {:?}", change);
        // Nobody listening is fine.
        let _ = self.changes.send(change);
    }
}

fn ensure_supported_version(found: i64) -> Result<(), Error> {
    if found > SCHEMA_VERSION {
        return Err(Error::UnsupportedVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(())
}

fn runs_of_deletes(ops: Vec<WriteOp>) -> Vec<(bool, Vec<WriteOp>)> {
    let mut runs = Vec::new();
    for (is_delete, run) in &ops
        .into_iter()
        .group_by(|op| matches!(op, WriteOp::Delete(_)))
    {
        runs.push((is_delete, run.collect()));
    }
    runs
}

// None when the document does not exist.
async fn apply_map_update(
    connection: &mut SqliteConnection,
    path: &DocPath,
    field: &str,
    key: &str,
    update: &MapUpdate,
) -> Result<Option<bool>, Error> {
    let data = match select_doc_data(connection, path).await? {
        Some(data) => data,
        None => return Ok(None),
    };

    let not_a_map = || Error::NotAMap {
        path: path.to_string(),
        field: field.to_string(),
    };

    let mut doc: Value = serde_json::from_str(&data)?;
    let entry = doc
        .as_object_mut()
        .ok_or_else(not_a_map)?
        .entry(field.to_string())
        .or_insert(Value::Null);
    if entry.is_null() {
        *entry = Value::Object(Map::new());
    }
    let map = entry.as_object_mut().ok_or_else(not_a_map)?;

    let changed = match update {
        MapUpdate::Set(value) => map.insert(key.to_string(), value.clone()).as_ref() != Some(value),
        MapUpdate::Remove => map.remove(key).is_some(),
    };

    if changed {
        trace!("update {} of {}", field, path);
        upsert_doc(connection, path, &doc.to_string()).await?;
    }

    Ok(Some(changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_ref::{CommentId, PostId, UserId};
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    fn post_path(id: &str) -> DocPath {
        DocPath::Post(PostId::from_string(id.to_string()).unwrap())
    }

    fn user_path(id: &str) -> DocPath {
        DocPath::User(UserId::from_string(id.to_string()).unwrap())
    }

    fn drain(changes: &mut broadcast::Receiver<Change>) -> Vec<Change> {
        let mut seen = Vec::new();
        loop {
            match changes.try_recv() {
                Ok(change) => seen.push(change),
                Err(TryRecvError::Empty) => return seen,
                Err(err) => panic!("change feed failed: {:?}", err),
            }
        }
    }

    #[tokio::test]
    async fn set_get_delete_doc() {
        let mut db = Database::in_memory().await.unwrap();
        let mut changes = db.subscribe();
        let path = post_path("p1");

        db.set_doc(&path, &json!({ "text": "hi" })).await.unwrap();
        db.set_doc(&path, &json!({ "text": "hello" })).await.unwrap();
        let doc: Option<Value> = db.get_doc(&path).await.unwrap();
        assert_eq!(doc, Some(json!({ "text": "hello" })));

        assert!(db.delete_doc(&path).await.unwrap());
        assert!(!db.delete_doc(&path).await.unwrap());
        assert!(!db.doc_exists(&path).await.unwrap());

        assert_eq!(
            drain(&mut changes),
            vec![
                Change::DocCreated(path.clone()),
                Change::DocUpdated(path.clone()),
                Change::DocDeleted(path),
            ]
        );
    }

    #[tokio::test]
    async fn lists_and_counts_one_collection() {
        let mut db = Database::in_memory().await.unwrap();
        let comments = CollectionPath::Comments(PostId::from_string("p1".to_string()).unwrap());
        let other = CollectionPath::Comments(PostId::from_string("p2".to_string()).unwrap());

        for id in ["c2", "c1", "c3"] {
            db.set_doc(&comments.doc(id).unwrap(), &json!({ "id": id }))
                .await
                .unwrap();
        }
        db.set_doc(&other.doc("c9").unwrap(), &json!({})).await.unwrap();

        let listed: Vec<Doc<Value>> = db.list_collection(&comments).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|doc| doc.path.id()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(db.count_collection(&comments).await.unwrap(), 3);
        assert_eq!(db.count_collection(&other).await.unwrap(), 1);
        assert_eq!(
            db.count_collection(&CollectionPath::Replies(
                PostId::from_string("p1".to_string()).unwrap(),
                CommentId::from_string("c1".to_string()).unwrap()
            ))
            .await
            .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn map_entry_updates_touch_one_key() {
        let mut db = Database::in_memory().await.unwrap();
        let path = user_path("u1");
        db.set_doc(&path, &json!({ "email": "a@b.c", "blockedUsers": { "u2": true } }))
            .await
            .unwrap();
        let mut changes = db.subscribe();

        assert!(db
            .update_map_entry(&path, "blockedUsers", "u3", MapUpdate::Set(json!(true)))
            .await
            .unwrap());
        assert!(!db
            .update_map_entry(&path, "blockedUsers", "u3", MapUpdate::Set(json!(true)))
            .await
            .unwrap());
        assert!(db
            .update_map_entry(&path, "blockedUsers", "u2", MapUpdate::Remove)
            .await
            .unwrap());
        assert!(!db
            .update_map_entry(&path, "posts", "p1", MapUpdate::Remove)
            .await
            .unwrap());

        let doc: Value = db.get_doc(&path).await.unwrap().unwrap();
        assert_eq!(doc, json!({ "email": "a@b.c", "blockedUsers": { "u3": true } }));
        assert_eq!(
            drain(&mut changes),
            vec![Change::DocUpdated(path.clone()), Change::DocUpdated(path)]
        );
    }

    #[tokio::test]
    async fn map_entry_update_errors() {
        let mut db = Database::in_memory().await.unwrap();
        let path = user_path("u1");

        let missing = db
            .update_map_entry(&path, "posts", "p1", MapUpdate::Remove)
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        db.set_doc(&path, &json!({ "posts": ["p1"] })).await.unwrap();
        let not_a_map = db
            .update_map_entry(&path, "posts", "p1", MapUpdate::Remove)
            .await;
        assert!(matches!(not_a_map, Err(Error::NotAMap { .. })));
    }

    #[tokio::test]
    async fn commit_applies_batch() {
        let mut db = Database::in_memory().await.unwrap();
        db.set_doc(&post_path("p1"), &json!({})).await.unwrap();
        db.set_doc(&post_path("p2"), &json!({})).await.unwrap();
        db.set_doc(&user_path("u1"), &json!({ "posts": { "p1": true, "p2": true } }))
            .await
            .unwrap();
        let mut changes = db.subscribe();

        let mut batch = WriteBatch::new();
        batch
            .delete(post_path("p1"))
            .delete(post_path("missing"))
            .update_map(user_path("u1"), "posts", "p1", MapUpdate::Remove)
            .update_map(user_path("nobody"), "posts", "p1", MapUpdate::Remove)
            .delete(post_path("p2"));
        batch.set(post_path("p3"), &json!({ "text": "new" })).unwrap();

        let applied = db.commit(batch).await.unwrap();
        assert_eq!(
            applied,
            vec![
                Change::DocDeleted(post_path("p1")),
                Change::DocUpdated(user_path("u1")),
                Change::DocDeleted(post_path("p2")),
                Change::DocCreated(post_path("p3")),
            ]
        );
        assert_eq!(drain(&mut changes), applied);
        assert_eq!(db.count_collection(&CollectionPath::Posts).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_skips_fields_that_are_not_maps() {
        let mut db = Database::in_memory().await.unwrap();
        db.set_doc(&post_path("p1"), &json!({})).await.unwrap();
        db.set_doc(&user_path("u1"), &json!({ "posts": { "p1": true } }))
            .await
            .unwrap();
        db.set_doc(&user_path("u2"), &json!({ "comments": ["c1"] }))
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch
            .delete(post_path("p1"))
            .update_map(user_path("u2"), "comments", "c1", MapUpdate::Remove)
            .update_map(user_path("u1"), "posts", "p1", MapUpdate::Remove);

        let applied = db.commit(batch).await.unwrap();
        assert_eq!(
            applied,
            vec![
                Change::DocDeleted(post_path("p1")),
                Change::DocUpdated(user_path("u1")),
            ]
        );
        let u2: Value = db.get_doc(&user_path("u2")).await.unwrap().unwrap();
        assert_eq!(u2, json!({ "comments": ["c1"] }));
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let mut db = Database::in_memory().await.unwrap();
        db.set_doc(&post_path("p1"), &json!({})).await.unwrap();
        sql::upsert_doc(&mut db.sql, &user_path("u1"), "{ not json")
            .await
            .unwrap();
        let mut changes = db.subscribe();

        let mut batch = WriteBatch::new();
        batch
            .delete(post_path("p1"))
            .update_map(user_path("u1"), "posts", "p1", MapUpdate::Remove);

        assert!(db.commit(batch).await.is_err());
        assert!(db.doc_exists(&post_path("p1")).await.unwrap());
        assert!(drain(&mut changes).is_empty());
    }

    #[tokio::test]
    async fn deletes_many_docs_in_chunks() {
        let mut db = Database::in_memory().await.unwrap();
        let mut batch = WriteBatch::new();
        for i in 0..(MAX_BOUND_PARAMS + 20) {
            let path = post_path(&format!("p{}", i));
            db.set_doc(&path, &json!({})).await.unwrap();
            batch.delete(path);
        }

        let applied = db.commit(batch).await.unwrap();
        assert_eq!(applied.len(), MAX_BOUND_PARAMS + 20);
        assert_eq!(db.count_collection(&CollectionPath::Posts).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blobs_are_listed_by_prefix() {
        let mut db = Database::in_memory().await.unwrap();
        let media = MediaPath::for_post(&PostId::from_string("p1".to_string()).unwrap());

        db.put_blob("posts/p1/a.png", b"png", Some("image/png"))
            .await
            .unwrap();
        db.put_blob("posts/p1/b.txt", b"text", None).await.unwrap();
        db.put_blob("posts/p10/c.png", b"other", None).await.unwrap();
        db.put_blob("posts/p1/thumbs/a.png", b"nested", None)
            .await
            .unwrap();

        let listed = db.list_blobs(&media).await.unwrap();
        assert_eq!(
            listed,
            vec![
                BlobEntry {
                    path: "posts/p1/a.png".to_string(),
                    content_type: Some("image/png".to_string()),
                    size: 3,
                },
                BlobEntry {
                    path: "posts/p1/b.txt".to_string(),
                    content_type: None,
                    size: 4,
                },
            ]
        );

        assert_eq!(db.get_blob("posts/p1/b.txt").await.unwrap(), Some(b"text".to_vec()));
        assert!(db.delete_blob("posts/p1/a.png").await.unwrap());
        assert!(!db.delete_blob("posts/p1/a.png").await.unwrap());
        assert!(db.put_blob("no-prefix", b"", None).await.is_err());
    }

    #[tokio::test]
    async fn fresh_db_passes_integrity_check() {
        let mut db = Database::in_memory().await.unwrap();
        assert!(db.check_integrity().await.unwrap());
        assert_eq!(get_db_version(&mut db.sql).await.unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn refuses_newer_schema() {
        assert!(ensure_supported_version(SCHEMA_VERSION).is_ok());
        assert!(matches!(
            ensure_supported_version(SCHEMA_VERSION + 1),
            Err(Error::UnsupportedVersion { .. })
        ));
    }
}
