use feed_db::{Database, WriteBatch};
use feed_ref::{DocPath, MediaPath};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Error;

/// Seed file: documents keyed by path, blobs keyed by storage path.
#[derive(Debug, Default, Deserialize)]
pub struct Dump {
    #[serde(default)]
    pub documents: BTreeMap<String, Value>,
    #[serde(default)]
    pub blobs: BTreeMap<String, BlobSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BlobSeed {
    Text(String),
    Typed {
        #[serde(rename = "contentType")]
        content_type: String,
        text: String,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub documents: usize,
    pub blobs: usize,
}

pub async fn import_dump(db: &mut Database, dump: Dump) -> Result<ImportSummary, Error> {
    // Check every path up front so a bad file writes nothing.
    let mut batch = WriteBatch::new();
    for (path, data) in dump.documents.iter() {
        batch.set(path.parse::<DocPath>()?, data)?;
    }
    for path in dump.blobs.keys() {
        MediaPath::parent_of(path)?;
    }

    let summary = ImportSummary {
        documents: batch.len(),
        blobs: dump.blobs.len(),
    };

    debug!("importing {} documents", summary.documents);
    db.commit(batch).await?;

    for (path, blob) in dump.blobs {
        let (content_type, text) = match blob {
            BlobSeed::Text(text) => (None, text),
            BlobSeed::Typed { content_type, text } => (Some(content_type), text),
        };
        db.put_blob(&path, text.as_bytes(), content_type.as_deref())
            .await?;
    }

    info!(
        "imported {} documents and {} blobs",
        summary.documents, summary.blobs
    );
    Ok(summary)
}
