use feed_db::{Change, Database, MapUpdate, WriteBatch};
use feed_msg::{Authored, Comment, Doc, Post, COMMENTS_FIELD, POSTS_FIELD};
use feed_ref::{CollectionPath, CommentId, DocPath, MediaPath, PostId, UserId, HOME_ROUTE};
use log::{debug, info, warn};
use serde_json::Value;

use crate::{Error, Viewer};

/// A post or comment to delete together with everything it owns.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeleteTarget {
    Post(PostId),
    Comment(PostId, CommentId),
}

impl DeleteTarget {
    pub fn doc_path(&self) -> DocPath {
        match self {
            DeleteTarget::Post(post_id) => DocPath::Post(post_id.clone()),
            DeleteTarget::Comment(post_id, comment_id) => {
                DocPath::Comment(post_id.clone(), comment_id.clone())
            }
        }
    }

    pub fn media_path(&self) -> MediaPath {
        match self {
            DeleteTarget::Post(post_id) => MediaPath::for_post(post_id),
            DeleteTarget::Comment(_, comment_id) => MediaPath::for_comment(comment_id),
        }
    }

    /// Field of the author's user record indexing this kind of content.
    pub fn index_field(&self) -> &'static str {
        match self {
            DeleteTarget::Post(_) => POSTS_FIELD,
            DeleteTarget::Comment(..) => COMMENTS_FIELD,
        }
    }

    /// Where to send the viewer once the target is gone.
    pub fn fallback_route(&self) -> String {
        match self {
            DeleteTarget::Post(_) => HOME_ROUTE.to_string(),
            DeleteTarget::Comment(post_id, _) => post_id.to_page_url(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CascadeReport {
    pub target: DocPath,
    /// Every document removed, the target included.
    pub deleted_docs: Vec<DocPath>,
    pub index_entries_removed: usize,
    pub blobs_deleted: Vec<String>,
    /// Blob paths (or prefixes) that could not be cleaned up, with the cause.
    pub blob_failures: Vec<(String, String)>,
}

/// Deletes a post or comment, its descendants, their index entries and media.
///
/// Documents and index entries go in a single batch: either all of them are
/// removed or none is. Media cleanup runs after the batch has committed; a
/// failure there is logged and recorded in the report.
pub async fn cascade_delete(
    db: &mut Database,
    viewer: &Viewer,
    target: &DeleteTarget,
) -> Result<CascadeReport, Error> {
    let path = target.doc_path();
    debug!("cascade delete of {} by {}", path, viewer.uid);

    let (author_uid, referenced_media) = load_target(db, target).await?;
    if !viewer.is(&author_uid) {
        return Err(Error::NotAuthor {
            viewer: viewer.uid.clone(),
            path,
        });
    }

    let mut batch = WriteBatch::new();
    let mut media = vec![target.media_path()];
    let mut comment_index: Vec<(UserId, CommentId)> = Vec::new();

    match target {
        DeleteTarget::Post(post_id) => {
            let comments: Vec<Doc<Value>> = db
                .list_collection(&CollectionPath::Comments(post_id.clone()))
                .await?;
            debug!("{} has {} comments", path, comments.len());

            for Doc { path: comment_path, data } in comments {
                let comment_id = match &comment_path {
                    DocPath::Comment(_, comment_id) => comment_id.clone(),
                    _ => continue,
                };
                queue_reply_deletes(db, &mut batch, post_id, &comment_id).await?;

                match serde_json::from_value::<Comment>(data) {
                    Ok(comment) => {
                        comment_index.push((comment.author_uid().clone(), comment_id.clone()))
                    }
                    Err(err) => warn!(
                        "Cannot read author of {}, leaving its index entry: {}",
                        comment_path, err
                    ),
                }
                media.push(MediaPath::for_comment(&comment_id));
                batch.delete(comment_path);
            }
        }
        DeleteTarget::Comment(post_id, comment_id) => {
            queue_reply_deletes(db, &mut batch, post_id, comment_id).await?;
        }
    }

    batch.delete(path.clone()).update_map(
        DocPath::User(author_uid.clone()),
        target.index_field(),
        path.id(),
        MapUpdate::Remove,
    );
    for (comment_author, comment_id) in comment_index.iter() {
        batch.update_map(
            DocPath::User(comment_author.clone()),
            COMMENTS_FIELD,
            comment_id.as_str(),
            MapUpdate::Remove,
        );
    }

    let changes = db.commit(batch).await?;

    let mut report = CascadeReport {
        target: path.clone(),
        deleted_docs: Vec::new(),
        index_entries_removed: 0,
        blobs_deleted: Vec::new(),
        blob_failures: Vec::new(),
    };
    for change in changes {
        match change {
            Change::DocDeleted(deleted) => report.deleted_docs.push(deleted),
            Change::DocUpdated(_) => report.index_entries_removed += 1,
            _ => {}
        }
    }

    for prefix in media.iter() {
        delete_media(db, prefix, &mut report).await;
    }
    for blob_path in referenced_media.iter() {
        let covered = MediaPath::parent_of(blob_path)
            .map(|parent| media.contains(&parent))
            .unwrap_or(false);
        if !covered {
            delete_blob(db, blob_path, &mut report).await;
        }
    }

    info!(
        "Deleted {} with {} descendants, {} index entries and {} blobs",
        path,
        report.deleted_docs.len().saturating_sub(1),
        report.index_entries_removed,
        report.blobs_deleted.len()
    );

    Ok(report)
}

// Author of the target and the media paths it references.
async fn load_target(
    db: &mut Database,
    target: &DeleteTarget,
) -> Result<(UserId, Vec<String>), Error> {
    let path = target.doc_path();
    match target {
        DeleteTarget::Post(_) => {
            let post: Post = db
                .get_doc(&path)
                .await?
                .ok_or_else(|| Error::NotFound(path.clone()))?;
            let media = post.media.iter().map(|media| media.path.clone()).collect();
            Ok((post.author_uid, media))
        }
        DeleteTarget::Comment(..) => {
            let comment: Comment = db
                .get_doc(&path)
                .await?
                .ok_or_else(|| Error::NotFound(path.clone()))?;
            Ok((comment.author_uid, Vec::new()))
        }
    }
}

async fn queue_reply_deletes(
    db: &mut Database,
    batch: &mut WriteBatch,
    post_id: &PostId,
    comment_id: &CommentId,
) -> Result<(), Error> {
    let replies: Vec<Doc<Value>> = db
        .list_collection(&CollectionPath::Replies(post_id.clone(), comment_id.clone()))
        .await?;
    for reply in replies {
        batch.delete(reply.path);
    }
    Ok(())
}

async fn delete_media(db: &mut Database, prefix: &MediaPath, report: &mut CascadeReport) {
    match db.list_blobs(prefix).await {
        Ok(blobs) => {
            for blob in blobs {
                delete_blob(db, &blob.path, report).await;
            }
        }
        Err(err) => {
            warn!("Cannot list media under {}: {}", prefix, err);
            report
                .blob_failures
                .push((prefix.to_string(), err.to_string()));
        }
    }
}

async fn delete_blob(db: &mut Database, blob_path: &str, report: &mut CascadeReport) {
    match db.delete_blob(blob_path).await {
        Ok(true) => report.blobs_deleted.push(blob_path.to_string()),
        Ok(false) => debug!("media {} already gone", blob_path),
        Err(err) => {
            warn!("Cannot delete media {}: {}", blob_path, err);
            report
                .blob_failures
                .push((blob_path.to_string(), err.to_string()));
        }
    }
}
