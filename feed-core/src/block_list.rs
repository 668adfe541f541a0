use feed_db::{Database, MapUpdate};
use feed_msg::{UserRecord, BLOCKED_USERS_FIELD};
use feed_ref::UserId;
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::{Error, Viewer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockChange {
    Applied,
    /// Already in the requested state; nothing was written.
    Unchanged,
}

pub async fn is_blocked(
    db: &mut Database,
    viewer: &Viewer,
    author: &UserId,
) -> Result<bool, Error> {
    let record: Option<UserRecord> = db.get_doc(&viewer.record_path()).await?;
    Ok(record.map_or(false, |record| record.has_blocked(author)))
}

pub async fn blocked_users(
    db: &mut Database,
    viewer: &Viewer,
) -> Result<BTreeSet<UserId>, Error> {
    let record: Option<UserRecord> = db.get_doc(&viewer.record_path()).await?;
    Ok(record.map(|record| record.blocked()).unwrap_or_default())
}

pub async fn block_user(
    db: &mut Database,
    viewer: &Viewer,
    author: &UserId,
) -> Result<BlockChange, Error> {
    if viewer.is(author) {
        return Err(Error::SelfBlock);
    }
    set_blocked(db, viewer, author, true).await
}

pub async fn unblock_user(
    db: &mut Database,
    viewer: &Viewer,
    author: &UserId,
) -> Result<BlockChange, Error> {
    set_blocked(db, viewer, author, false).await
}

async fn set_blocked(
    db: &mut Database,
    viewer: &Viewer,
    author: &UserId,
    blocked: bool,
) -> Result<BlockChange, Error> {
    let path = viewer.record_path();
    let record: UserRecord = db
        .get_doc(&path)
        .await?
        .ok_or_else(|| Error::UserRecordMissing(viewer.uid.clone()))?;

    if record.has_blocked(author) == blocked {
        debug!("{} already has {} blocked: {}", viewer.uid, author, blocked);
        return Ok(BlockChange::Unchanged);
    }

    let update = if blocked {
        MapUpdate::Set(Value::Bool(true))
    } else {
        MapUpdate::Remove
    };
    db.update_map_entry(&path, BLOCKED_USERS_FIELD, author.as_str(), update)
        .await?;

    info!(
        "{} {} {}",
        viewer.uid,
        if blocked { "blocked" } else { "unblocked" },
        author
    );

    Ok(BlockChange::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use feed_ref::DocPath;
    use serde_json::json;

    async fn db_with_viewer(record: Value) -> (Database, Viewer) {
        let mut db = Database::in_memory().await.unwrap();
        add_user(&mut db, "me", record).await;
        (db, Viewer::new(uid("me")))
    }

    #[tokio::test]
    async fn blocks_and_unblocks() {
        let (mut db, me) = db_with_viewer(json!({ "blockedUsers": {} })).await;

        assert_eq!(
            block_user(&mut db, &me, &uid("troll")).await.unwrap(),
            BlockChange::Applied
        );
        assert!(is_blocked(&mut db, &me, &uid("troll")).await.unwrap());
        assert_eq!(
            blocked_users(&mut db, &me).await.unwrap().into_iter().collect::<Vec<_>>(),
            vec![uid("troll")]
        );

        assert_eq!(
            unblock_user(&mut db, &me, &uid("troll")).await.unwrap(),
            BlockChange::Applied
        );
        assert!(!is_blocked(&mut db, &me, &uid("troll")).await.unwrap());
    }

    #[tokio::test]
    async fn blocking_twice_writes_once() {
        let (mut db, me) = db_with_viewer(json!({ "blockedUsers": { "troll": true } })).await;
        let before: Value = db.get_doc(&me.record_path()).await.unwrap().unwrap();
        let mut changes = db.subscribe();

        assert_eq!(
            block_user(&mut db, &me, &uid("troll")).await.unwrap(),
            BlockChange::Unchanged
        );

        assert!(drain(&mut changes).is_empty());
        let after: Value = db.get_doc(&me.record_path()).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unblocking_stranger_writes_nothing() {
        let (mut db, me) = db_with_viewer(json!({ "blockedUsers": { "troll": true } })).await;
        let mut changes = db.subscribe();

        assert_eq!(
            unblock_user(&mut db, &me, &uid("friend")).await.unwrap(),
            BlockChange::Unchanged
        );
        assert!(drain(&mut changes).is_empty());
    }

    #[tokio::test]
    async fn block_then_unblock_restores_record() {
        let (mut db, me) = db_with_viewer(json!({
            "posts": { "p1": true },
            "blockedUsers": { "a": true, "b": true }
        }))
        .await;
        let before: Value = db.get_doc(&me.record_path()).await.unwrap().unwrap();

        block_user(&mut db, &me, &uid("c")).await.unwrap();
        unblock_user(&mut db, &me, &uid("c")).await.unwrap();

        let after: Value = db.get_doc(&me.record_path()).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn keeps_concurrent_edits_to_other_keys() {
        let (mut db, me) = db_with_viewer(json!({ "blockedUsers": {} })).await;

        // Another session indexes a new post between our read and our write.
        let record: UserRecord = db.get_doc(&me.record_path()).await.unwrap().unwrap();
        db.update_map_entry(&me.record_path(), "posts", "p9", MapUpdate::Set(json!(true)))
            .await
            .unwrap();
        assert!(!record.has_blocked(&uid("troll")));
        block_user(&mut db, &me, &uid("troll")).await.unwrap();

        let record: UserRecord = db.get_doc(&me.record_path()).await.unwrap().unwrap();
        assert!(record.posts.contains_key(&post_id("p9")));
        assert!(record.has_blocked(&uid("troll")));
    }

    #[tokio::test]
    async fn odd_flag_values_still_count_as_blocked() {
        let (mut db, me) = db_with_viewer(json!({
            "blockedUsers": { "a": 1, "b": true, "not/a/uid": true }
        }))
        .await;

        assert!(is_blocked(&mut db, &me, &uid("a")).await.unwrap());
        assert!(is_blocked(&mut db, &me, &uid("b")).await.unwrap());
        assert_eq!(
            unblock_user(&mut db, &me, &uid("a")).await.unwrap(),
            BlockChange::Applied
        );

        let record: Value = db.get_doc(&me.record_path()).await.unwrap().unwrap();
        assert_eq!(
            record,
            json!({ "blockedUsers": { "b": true, "not/a/uid": true } })
        );
    }

    #[tokio::test]
    async fn first_block_creates_the_map() {
        let (mut db, me) = db_with_viewer(json!({})).await;

        block_user(&mut db, &me, &uid("troll")).await.unwrap();

        let record: Value = db.get_doc(&me.record_path()).await.unwrap().unwrap();
        assert_eq!(record, json!({ "blockedUsers": { "troll": true } }));
    }

    #[tokio::test]
    async fn rejects_self_block_and_missing_record() {
        let (mut db, me) = db_with_viewer(json!({})).await;
        assert!(matches!(
            block_user(&mut db, &me, &uid("me")).await,
            Err(Error::SelfBlock)
        ));

        let ghost = Viewer::new(uid("ghost"));
        assert!(matches!(
            block_user(&mut db, &ghost, &uid("me")).await,
            Err(Error::UserRecordMissing(_))
        ));
        assert!(!is_blocked(&mut db, &ghost, &uid("me")).await.unwrap());
        assert!(!db.doc_exists(&DocPath::User(uid("ghost"))).await.unwrap());
    }
}
