//! Fixtures for workflow tests.

use feed_db::{Change, Database};
use feed_ref::{CollectionPath, CommentId, DocPath, PostId, ReplyId, UserId};
use serde_json::{json, Value};
use tokio::sync::broadcast::{error::TryRecvError, Receiver};

pub fn uid(id: &str) -> UserId {
    UserId::from_string(id.to_string()).unwrap()
}

pub fn post_id(id: &str) -> PostId {
    PostId::from_string(id.to_string()).unwrap()
}

pub fn comment_id(id: &str) -> CommentId {
    CommentId::from_string(id.to_string()).unwrap()
}

pub fn comment_path(post: &str, comment: &str) -> DocPath {
    DocPath::Comment(post_id(post), comment_id(comment))
}

pub fn reply_path(post: &str, comment: &str, reply: &str) -> DocPath {
    DocPath::Reply(
        post_id(post),
        comment_id(comment),
        ReplyId::from_string(reply.to_string()).unwrap(),
    )
}

pub async fn add_user(db: &mut Database, id: &str, record: Value) {
    db.set_doc(&DocPath::User(uid(id)), &record).await.unwrap();
}

pub async fn add_post(db: &mut Database, id: &str, author: &str) {
    db.set_doc(
        &DocPath::Post(post_id(id)),
        &json!({ "authorUid": author, "name": author, "text": "a post" }),
    )
    .await
    .unwrap();
}

pub async fn add_comment(db: &mut Database, post: &str, id: &str, author: &str) {
    db.set_doc(
        &comment_path(post, id),
        &json!({ "authorUid": author, "email": format!("{}@example.com", author) }),
    )
    .await
    .unwrap();
}

pub async fn add_reply(db: &mut Database, post: &str, comment: &str, id: &str, author: &str) {
    db.set_doc(&reply_path(post, comment, id), &json!({ "authorUid": author }))
        .await
        .unwrap();
}

pub async fn count(db: &mut Database, collection: &CollectionPath) -> u64 {
    db.count_collection(collection).await.unwrap()
}

pub fn drain(changes: &mut Receiver<Change>) -> Vec<Change> {
    let mut seen = Vec::new();
    loop {
        match changes.try_recv() {
            Ok(change) => seen.push(change),
            Err(TryRecvError::Empty) => return seen,
            Err(err) => panic!("change feed failed: {:?}", err),
        }
    }
}
