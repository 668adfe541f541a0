use chrono::{DateTime, Utc};
use feed_ref::{CommentId, DocPath, PostId, RefError, UserId};
use serde::{
    de::{self, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

/// Field of a user record indexing the posts they authored.
pub const POSTS_FIELD: &str = "posts";
/// Field of a user record indexing the comments they authored.
pub const COMMENTS_FIELD: &str = "comments";
pub const BLOCKED_USERS_FIELD: &str = "blockedUsers";

/// A document read back from a collection, together with where it lives.
#[derive(Clone, Debug, PartialEq)]
pub struct Doc<T> {
    pub path: DocPath,
    pub data: T,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub author_uid: UserId,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub name: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub email: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub text: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub media: Vec<MediaRef>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author_uid: UserId,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub name: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub email: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub text: String,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub author_uid: UserId,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub name: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub email: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub text: String,
}

/// Stored media attached to a post, either a bare blob path or a described one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MediaRef {
    pub path: String,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Per-user document under `users/{uid}`.
///
/// `posts` and `comments` are maintained by hand alongside the content they
/// index; nothing derives them from the content collections.
///
/// Entries are read one at a time: a key that is not a valid id is dropped
/// without losing the rest of the map, and the stored value is kept as is.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "deserialize_lenient_map")]
    pub posts: BTreeMap<PostId, Value>,
    #[serde(default, deserialize_with = "deserialize_lenient_map")]
    pub comments: BTreeMap<CommentId, Value>,
    #[serde(
        default,
        rename = "blockedUsers",
        deserialize_with = "deserialize_lenient_map"
    )]
    pub blocked_users: BTreeMap<UserId, Value>,
}

impl UserRecord {
    // Membership is what counts, whatever flag is stored.
    pub fn has_blocked(&self, uid: &UserId) -> bool {
        self.blocked_users.contains_key(uid)
    }

    pub fn blocked(&self) -> BTreeSet<UserId> {
        self.blocked_users.keys().cloned().collect()
    }
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub username: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub profile_pic: Option<String>,
}

impl Profile {
    pub fn username(&self) -> Option<&str> {
        non_empty(self.username.as_deref())
    }

    pub fn avatar(&self) -> Option<&str> {
        non_empty(self.profile_pic.as_deref())
    }
}

pub trait Authored {
    fn author_uid(&self) -> &UserId;
    fn name(&self) -> Option<&str>;
    fn email(&self) -> Option<&str>;
    fn timestamp(&self) -> Option<DateTime<Utc>>;

    /// Name, falling back to email, falling back to the uid.
    fn display_name(&self) -> String {
        non_empty(self.name())
            .or_else(|| non_empty(self.email()))
            .map(str::to_string)
            .unwrap_or_else(|| self.author_uid().to_string())
    }
}

macro_rules! impl_authored {
    ($($ty:ty),*) => {
        $(
            impl Authored for $ty {
                fn author_uid(&self) -> &UserId {
                    &self.author_uid
                }

                fn name(&self) -> Option<&str> {
                    self.name.as_deref()
                }

                fn email(&self) -> Option<&str> {
                    self.email.as_deref()
                }

                fn timestamp(&self) -> Option<DateTime<Utc>> {
                    self.timestamp
                }
            }
        )*
    };
}

impl_authored!(Post, Comment, Reply);

fn deserialize_lenient_map<'de, D, K>(deserializer: D) -> Result<BTreeMap<K, Value>, D::Error>
where
    D: Deserializer<'de>,
    K: FromStr + Ord,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Object(entries) => entries,
        _ => return Ok(BTreeMap::new()),
    };

    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| key.parse().ok().map(|key| (key, value)))
        .collect())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

impl FromStr for MediaRef {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RefError::BadPath {
                input: s.to_string(),
            });
        }
        Ok(MediaRef {
            path: s.to_string(),
            content_type: None,
        })
    }
}

impl<'de> Deserialize<'de> for MediaRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_media_ref(deserializer)
    }
}

// Older posts store media as bare paths, newer ones as objects.
fn deserialize_media_ref<'de, D>(deserializer: D) -> Result<MediaRef, D::Error>
where
    D: Deserializer<'de>,
{
    struct DeserializeMediaRef;

    impl<'de> Visitor<'de> for DeserializeMediaRef {
        type Value = MediaRef;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("string or map")
        }

        fn visit_str<E>(self, value: &str) -> Result<MediaRef, E>
        where
            E: de::Error,
        {
            FromStr::from_str(value).map_err(|err| E::custom(format!("{}", err)))
        }

        fn visit_map<M>(self, map: M) -> Result<MediaRef, M::Error>
        where
            M: MapAccess<'de>,
        {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct Described {
                path: String,
                #[serde(alias = "type")]
                #[serde(default)]
                content_type: Option<String>,
            }

            let Described { path, content_type } =
                Deserialize::deserialize(de::value::MapAccessDeserializer::new(map))?;
            Ok(MediaRef { path, content_type })
        }
    }

    deserializer.deserialize_any(DeserializeMediaRef)
}
