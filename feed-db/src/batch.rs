use feed_ref::DocPath;
use serde::Serialize;
use serde_json::Value;

use crate::Error;

/// Change to a single key of a map-valued field.
#[derive(Clone, Debug, PartialEq)]
pub enum MapUpdate {
    Set(Value),
    Remove,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Set {
        path: DocPath,
        data: Value,
    },
    Delete(DocPath),
    /// Skipped when the document does not exist or the field holds
    /// something other than a map.
    UpdateMap {
        path: DocPath,
        field: String,
        key: String,
        update: MapUpdate,
    },
}

/// Writes applied together by [`crate::Database::commit`]: all of them or none.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&mut self, path: DocPath, data: &T) -> Result<&mut Self, Error> {
        let data = serde_json::to_value(data)?;
        self.ops.push(WriteOp::Set { path, data });
        Ok(self)
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.ops.push(WriteOp::Delete(path));
        self
    }

    pub fn update_map(
        &mut self,
        path: DocPath,
        field: &str,
        key: &str,
        update: MapUpdate,
    ) -> &mut Self {
        self.ops.push(WriteOp::UpdateMap {
            path,
            field: field.to_string(),
            key: key.to_string(),
            update,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
