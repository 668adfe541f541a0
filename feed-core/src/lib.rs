//! Workflows acting on posts, comments and user records.
//!
//! Every workflow takes the [`Viewer`] it acts for explicitly, together with
//! the [`Database`](feed_db::Database) it acts on.

use feed_ref::{DocPath, UserId};
use thiserror::Error as ThisError;

mod block_list;
mod cascade;
mod context;
mod counters;
pub use block_list::{block_user, blocked_users, is_blocked, unblock_user, BlockChange};
pub use cascade::{cascade_delete, CascadeReport, DeleteTarget};
pub use context::Viewer;
pub use counters::LiveCount;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Database error, cause: {0}")]
    Db(#[from] feed_db::Error),
    #[error("{0} not found")]
    NotFound(DocPath),
    #[error("{viewer} is not the author of {path}")]
    NotAuthor { viewer: UserId, path: DocPath },
    #[error("User record of {0} not found")]
    UserRecordMissing(UserId),
    #[error("Cannot block yourself")]
    SelfBlock,
}

#[cfg(test)]
mod test_utils;
