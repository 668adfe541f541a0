//! Command-line front end over a feed database: seed it, run the delete and
//! block workflows for a viewer, and render headers to HTML.

use chrono::Utc;
use clap::{Parser, Subcommand};
use feed_core::{
    block_user, blocked_users, cascade_delete, unblock_user, BlockChange, DeleteTarget, Viewer,
};
use feed_db::Database;
use feed_pages::{
    write_comment_header_html, write_post_header_html, CommentHeader, Config, PostHeader,
};
use feed_ref::{CommentId, PostId, RefError, UserId};
use log::info;
use std::{io, path::PathBuf, process::ExitCode};

mod import;
use import::{import_dump, Dump};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create directory: {0}")]
    CreateDir(#[source] io::Error),
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid reference: {0}")]
    Ref(#[from] RefError),
    #[error("Database error: {0}")]
    Db(#[from] feed_db::Error),
    #[error("{0}")]
    Core(#[from] feed_core::Error),
    #[error("{0}")]
    Pages(#[from] feed_pages::Error),
    #[error("No home directory, pass --db")]
    NoHomeDir,
    #[error("This command acts for a user, pass --viewer")]
    NoViewer,
    #[error("Database integrity check failed")]
    Integrity,
}

#[derive(Parser, Debug)]
#[command(name = "feed-admin")]
#[command(about = "Maintain a feed database from the command line")]
struct Args {
    /// SQLite database, defaults to ~/.feed/feed.sqlite3
    #[arg(long, env = "FEED_DB")]
    db: Option<PathBuf>,

    /// User the workflows act for
    #[arg(long, env = "FEED_VIEWER")]
    viewer: Option<UserId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load documents and blobs from a JSON dump
    Import { file: PathBuf },
    /// Delete a post with its comments, replies and media
    DeletePost { post: PostId },
    /// Delete a comment with its replies
    DeleteComment { post: PostId, comment: CommentId },
    Block { user: UserId },
    Unblock { user: UserId },
    /// List the users the viewer has blocked
    Blocked,
    RenderPost {
        post: PostId,
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    RenderComment {
        post: PostId,
        comment: CommentId,
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Run the SQLite integrity check
    Check,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let db_path = match args.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(Error::CreateDir)?;
    }
    info!("using database {}", db_path.display());
    let mut db = Database::open(&db_path.to_string_lossy()).await?;
    let viewer = args.viewer.map(Viewer::new);

    match args.command {
        Command::Import { file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .map_err(|source| Error::ReadFile { path: file, source })?;
            let dump: Dump = serde_json::from_str(&json)?;
            let summary = import_dump(&mut db, dump).await?;
            println!(
                "Imported {} documents and {} blobs",
                summary.documents, summary.blobs
            );
        }
        Command::DeletePost { post } => {
            delete(&mut db, viewer, DeleteTarget::Post(post)).await?;
        }
        Command::DeleteComment { post, comment } => {
            delete(&mut db, viewer, DeleteTarget::Comment(post, comment)).await?;
        }
        Command::Block { user } => {
            let viewer = viewer.ok_or(Error::NoViewer)?;
            match block_user(&mut db, &viewer, &user).await? {
                BlockChange::Applied => println!("Blocked {}", user),
                BlockChange::Unchanged => println!("{} was already blocked", user),
            }
        }
        Command::Unblock { user } => {
            let viewer = viewer.ok_or(Error::NoViewer)?;
            match unblock_user(&mut db, &viewer, &user).await? {
                BlockChange::Applied => println!("Unblocked {}", user),
                BlockChange::Unchanged => println!("{} was not blocked", user),
            }
        }
        Command::Blocked => {
            let viewer = viewer.ok_or(Error::NoViewer)?;
            for uid in blocked_users(&mut db, &viewer).await? {
                println!("{}", uid);
            }
        }
        Command::RenderPost { post, out } => {
            let viewer = viewer.ok_or(Error::NoViewer)?;
            let header = PostHeader::load(&mut db, &viewer, &post).await?;
            let path = write_post_header_html(&Config::new(out), &header, Utc::now()).await?;
            println!("Wrote {}", path.display());
        }
        Command::RenderComment { post, comment, out } => {
            let viewer = viewer.ok_or(Error::NoViewer)?;
            let header = CommentHeader::load(&mut db, &viewer, &post, &comment).await?;
            let path = write_comment_header_html(&Config::new(out), &header, Utc::now()).await?;
            println!("Wrote {}", path.display());
        }
        Command::Check => {
            if !db.check_integrity().await? {
                return Err(Error::Integrity);
            }
            println!("ok");
        }
    }

    Ok(())
}

async fn delete(
    db: &mut Database,
    viewer: Option<Viewer>,
    target: DeleteTarget,
) -> Result<(), Error> {
    let viewer = viewer.ok_or(Error::NoViewer)?;
    let report = cascade_delete(db, &viewer, &target).await?;

    println!(
        "Deleted {} documents and {} media files, removed {} index entries",
        report.deleted_docs.len(),
        report.blobs_deleted.len(),
        report.index_entries_removed
    );
    for (path, cause) in &report.blob_failures {
        eprintln!("Could not delete media {}: {}", path, cause);
    }
    Ok(())
}

fn default_db_path() -> Result<PathBuf, Error> {
    let home = simple_home_dir::home_dir().ok_or(Error::NoHomeDir)?;
    Ok(home.join(".feed").join("feed.sqlite3"))
}
