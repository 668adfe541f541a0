use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;
use urlencoding::encode;

pub const USERS: &str = "users";
pub const PROFILES: &str = "profiles";
pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comments";
pub const REPLIES: &str = "replies";

/// Route of the main feed.
pub const HOME_ROUTE: &str = "/";

#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefError {
    #[error("Does not match as {ref_type}: {input}")]
    BadFormat {
        ref_type: &'static str,
        input: String,
    },
    #[error("Not a document path: {input}")]
    BadPath { input: String },
}

// Auto-generated document ids and auth uids share one alphabet.
fn id_regex() -> &'static Regex {
    lazy_static! {
        static ref RE: Regex = Regex::new("^[A-Za-z0-9_-]{1,128}$").unwrap();
    }
    &RE
}

macro_rules! id_ref {
    ($(#[$meta:meta])* $name:ident, $ref_type:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn from_string(string: String) -> Result<Self, RefError> {
                if !Self::is_match(string.as_str()) {
                    Err(RefError::BadFormat {
                        ref_type: $ref_type,
                        input: string,
                    })
                } else {
                    Ok(Self(string))
                }
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn single_regex() -> &'static Regex {
                id_regex()
            }

            pub fn is_match(string: &str) -> bool {
                let regex = Self::single_regex();
                regex.is_match(string)
            }
        }

        impl TryFrom<String> for $name {
            type Error = RefError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $name::from_string(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = RefError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                $name::from_string(value.to_string())
            }
        }

        impl FromStr for $name {
            type Err = RefError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::from_string(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl From<&$name> for String {
            fn from(value: &$name) -> String {
                value.0.clone()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_ref!(
    /// Auth uid of an account. Keys both `users/{uid}` and `profiles/{uid}`.
    UserId,
    "User"
);
id_ref!(PostId, "Post");
id_ref!(CommentId, "Comment");
id_ref!(ReplyId, "Reply");

impl UserId {
    pub fn to_page_url(&self) -> String {
        format!("/profile/{}", encode(self.as_str()))
    }
}

impl PostId {
    /// The page listing the post together with its comments.
    pub fn to_page_url(&self) -> String {
        format!("/{}/{}", COMMENTS, encode(self.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectionPath {
    Users,
    Profiles,
    Posts,
    Comments(PostId),
    Replies(PostId, CommentId),
}

impl CollectionPath {
    pub fn doc(&self, id: &str) -> Result<DocPath, RefError> {
        Ok(match self {
            CollectionPath::Users => DocPath::User(id.try_into()?),
            CollectionPath::Profiles => DocPath::Profile(id.try_into()?),
            CollectionPath::Posts => DocPath::Post(id.try_into()?),
            CollectionPath::Comments(post_id) => DocPath::Comment(post_id.clone(), id.try_into()?),
            CollectionPath::Replies(post_id, comment_id) => {
                DocPath::Reply(post_id.clone(), comment_id.clone(), id.try_into()?)
            }
        })
    }

    /// The document owning this collection, for sub-collections.
    pub fn owner(&self) -> Option<DocPath> {
        match self {
            CollectionPath::Comments(post_id) => Some(DocPath::Post(post_id.clone())),
            CollectionPath::Replies(post_id, comment_id) => {
                Some(DocPath::Comment(post_id.clone(), comment_id.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionPath::Users => f.write_str(USERS),
            CollectionPath::Profiles => f.write_str(PROFILES),
            CollectionPath::Posts => f.write_str(POSTS),
            CollectionPath::Comments(post_id) => write!(f, "{}/{}/{}", POSTS, post_id, COMMENTS),
            CollectionPath::Replies(post_id, comment_id) => write!(
                f,
                "{}/{}/{}/{}/{}",
                POSTS, post_id, COMMENTS, comment_id, REPLIES
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocPath {
    User(UserId),
    Profile(UserId),
    Post(PostId),
    Comment(PostId, CommentId),
    Reply(PostId, CommentId, ReplyId),
}

impl DocPath {
    // From a slash separated path such as `posts/{p}/comments/{c}`
    pub fn from_string(string: String) -> Result<Self, RefError> {
        let segments: Vec<&str> = string.split('/').collect();
        let parsed = match segments.as_slice() {
            [USERS, uid] => UserId::try_from(*uid).map(DocPath::User),
            [PROFILES, uid] => UserId::try_from(*uid).map(DocPath::Profile),
            [POSTS, post] => PostId::try_from(*post).map(DocPath::Post),
            [POSTS, post, COMMENTS, comment] => {
                CollectionPath::Comments(PostId::try_from(*post)?).doc(comment)
            }
            [POSTS, post, COMMENTS, comment, REPLIES, reply] => {
                CollectionPath::Replies(PostId::try_from(*post)?, CommentId::try_from(*comment)?)
                    .doc(reply)
            }
            _ => Err(RefError::BadPath {
                input: string.clone(),
            }),
        };
        parsed.map_err(|_| RefError::BadPath { input: string })
    }

    pub fn collection(&self) -> CollectionPath {
        match self {
            DocPath::User(_) => CollectionPath::Users,
            DocPath::Profile(_) => CollectionPath::Profiles,
            DocPath::Post(_) => CollectionPath::Posts,
            DocPath::Comment(post_id, _) => CollectionPath::Comments(post_id.clone()),
            DocPath::Reply(post_id, comment_id, _) => {
                CollectionPath::Replies(post_id.clone(), comment_id.clone())
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            DocPath::User(uid) | DocPath::Profile(uid) => uid.as_str(),
            DocPath::Post(post_id) => post_id.as_str(),
            DocPath::Comment(_, comment_id) => comment_id.as_str(),
            DocPath::Reply(_, _, reply_id) => reply_id.as_str(),
        }
    }

    /// The collection of documents owned by this one, if it can own any.
    pub fn sub_collection(&self) -> Option<CollectionPath> {
        match self {
            DocPath::Post(post_id) => Some(CollectionPath::Comments(post_id.clone())),
            DocPath::Comment(post_id, comment_id) => {
                Some(CollectionPath::Replies(post_id.clone(), comment_id.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection(), self.id())
    }
}

impl TryFrom<String> for DocPath {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DocPath::from_string(value)
    }
}

impl FromStr for DocPath {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocPath::from_string(s.to_string())
    }
}

impl From<&DocPath> for String {
    fn from(value: &DocPath) -> String {
        value.to_string()
    }
}

/// Prefix in the blob store under which a post's or comment's media live.
///
/// Comment media share the `posts/` prefix with post media.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaPath(String);

impl MediaPath {
    pub fn for_post(post_id: &PostId) -> Self {
        Self(format!("{}/{}", POSTS, post_id))
    }

    pub fn for_comment(comment_id: &CommentId) -> Self {
        Self(format!("{}/{}", POSTS, comment_id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn blob(&self, name: &str) -> Result<String, RefError> {
        if name.is_empty() || name.contains('/') {
            return Err(RefError::BadPath {
                input: name.to_string(),
            });
        }
        Ok(format!("{}/{}", self.0, name))
    }

    /// The prefix directly containing a blob path.
    pub fn parent_of(blob_path: &str) -> Result<Self, RefError> {
        match blob_path.rsplit_once('/') {
            Some((prefix, name)) if !prefix.is_empty() && !name.is_empty() => {
                Ok(Self(prefix.to_string()))
            }
            _ => Err(RefError::BadPath {
                input: blob_path.to_string(),
            }),
        }
    }
}

impl fmt::Display for MediaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
