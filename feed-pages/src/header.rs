use chrono::{DateTime, Utc};
use feed_core::{DeleteTarget, LiveCount, Viewer};
use feed_db::Database;
use feed_msg::{Authored, Comment, Post, Profile};
use feed_ref::{CollectionPath, CommentId, DocPath, PostId, UserId};
use log::warn;

use crate::{Error, OptionsMenu};

/// Who wrote the content, as shown in a header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorView {
    pub uid: UserId,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl AuthorView {
    pub fn initial(&self) -> String {
        self.display_name
            .chars()
            .next()
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_default()
    }
}

pub struct PostHeader {
    pub post_id: PostId,
    pub author: AuthorView,
    pub timestamp: Option<DateTime<Utc>>,
    pub comments: LiveCount,
    pub menu: OptionsMenu,
}

impl PostHeader {
    /// The author's profile username wins over the name stored on the post.
    pub async fn load(db: &mut Database, viewer: &Viewer, post_id: &PostId) -> Result<Self, Error> {
        let path = DocPath::Post(post_id.clone());
        let post: Post = db.get_doc(&path).await?.ok_or(Error::NotFound(path))?;
        let profile = load_profile(db, post.author_uid()).await;

        let author = AuthorView {
            uid: post.author_uid().clone(),
            display_name: profile
                .username()
                .map(str::to_string)
                .unwrap_or_else(|| post.display_name()),
            avatar: profile.avatar().map(str::to_string),
        };
        let comments = LiveCount::subscribe(db, CollectionPath::Comments(post_id.clone())).await?;
        let menu = OptionsMenu::load(
            db,
            viewer,
            DeleteTarget::Post(post_id.clone()),
            author.uid.clone(),
            author.display_name.clone(),
        )
        .await;

        Ok(Self {
            post_id: post_id.clone(),
            author,
            timestamp: post.timestamp(),
            comments,
            menu,
        })
    }

    pub fn comment_count(&self) -> u64 {
        self.comments.get()
    }

    /// Applies pending changes to the comment counter.
    pub fn refresh(&mut self) -> bool {
        self.comments.poll()
    }
}

pub struct CommentHeader {
    pub post_id: PostId,
    pub comment_id: CommentId,
    pub author: AuthorView,
    pub timestamp: Option<DateTime<Utc>>,
    pub replies: LiveCount,
    pub menu: OptionsMenu,
}

impl CommentHeader {
    pub async fn load(
        db: &mut Database,
        viewer: &Viewer,
        post_id: &PostId,
        comment_id: &CommentId,
    ) -> Result<Self, Error> {
        let path = DocPath::Comment(post_id.clone(), comment_id.clone());
        let comment: Comment = db.get_doc(&path).await?.ok_or(Error::NotFound(path))?;
        let profile = load_profile(db, comment.author_uid()).await;

        let author = AuthorView {
            uid: comment.author_uid().clone(),
            display_name: comment.display_name(),
            avatar: profile.avatar().map(str::to_string),
        };
        let replies = LiveCount::subscribe(
            db,
            CollectionPath::Replies(post_id.clone(), comment_id.clone()),
        )
        .await?;
        let menu = OptionsMenu::load(
            db,
            viewer,
            DeleteTarget::Comment(post_id.clone(), comment_id.clone()),
            author.uid.clone(),
            author.display_name.clone(),
        )
        .await;

        Ok(Self {
            post_id: post_id.clone(),
            comment_id: comment_id.clone(),
            author,
            timestamp: comment.timestamp(),
            replies,
            menu,
        })
    }

    pub fn reply_count(&self) -> u64 {
        self.replies.get()
    }

    pub fn refresh(&mut self) -> bool {
        self.replies.poll()
    }
}

// A missing or unreadable profile only costs the header its avatar.
async fn load_profile(db: &mut Database, uid: &UserId) -> Profile {
    match db.get_doc::<Profile>(&DocPath::Profile(uid.clone())).await {
        Ok(profile) => profile.unwrap_or_default(),
        Err(err) => {
            warn!("Cannot load profile of {}: {}", uid, err);
            Profile::default()
        }
    }
}
