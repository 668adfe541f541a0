//! Post and comment headers: loading, the options menu, and HTML rendering.

use axohtml::dom::DOMTree;
use chrono::{DateTime, Utc};
use feed_ref::DocPath;
use std::{io, path::PathBuf};
use tokio::fs::{create_dir_all, write};

mod header;
mod menu;
mod render;
pub use header::{AuthorView, CommentHeader, PostHeader};
pub use menu::{MenuItem, MenuOutcome, OptionsMenu};
pub use render::{format_timestamp, render_comment_header, render_post_header};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to write to file: {0}")]
    WriteFile(#[source] io::Error),
    #[error("Failed to create directory: {0}")]
    CreateDir(#[source] io::Error),
    #[error("{0} not found")]
    NotFound(DocPath),
    #[error("Database error: {0}")]
    Db(#[from] feed_db::Error),
    #[error("{0}")]
    Core(#[from] feed_core::Error),
}

pub struct Config {
    pub base_dir: PathBuf,
}

impl Config {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

pub async fn write_post_header_html(
    config: &Config,
    header: &PostHeader,
    now: DateTime<Utc>,
) -> Result<PathBuf, Error> {
    let name = format!("post-{}", header.post_id);
    write_html(config, &name, render_post_header(header, now)).await
}

pub async fn write_comment_header_html(
    config: &Config,
    header: &CommentHeader,
    now: DateTime<Utc>,
) -> Result<PathBuf, Error> {
    let name = format!("comment-{}-{}", header.post_id, header.comment_id);
    write_html(config, &name, render_comment_header(header, now)).await
}

async fn write_html(config: &Config, name: &str, page: DOMTree<String>) -> Result<PathBuf, Error> {
    let Config { base_dir } = config;
    let page_path = base_dir.join(name).with_extension("html");
    let page_bytes = page.to_string();

    create_dir_all(base_dir).await.map_err(Error::CreateDir)?;
    write(&page_path, page_bytes)
        .await
        .map_err(Error::WriteFile)?;

    Ok(page_path)
}
