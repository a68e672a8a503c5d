//! Table schema: the attribute list, primary key, and per-attribute index kind.

use crate::error::{RelError, RelResult};
use crate::value::DataType;
use serde::{Deserialize, Serialize};

/// Which on-disk secondary index structure backs an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Hash,
    Avl,
    Rtree,
}

impl IndexKind {
    pub fn parse(token: &str) -> RelResult<Self> {
        match token.trim().to_lowercase().as_str() {
            "hash" => Ok(IndexKind::Hash),
            "avl" => Ok(IndexKind::Avl),
            "rtree" => Ok(IndexKind::Rtree),
            other => Err(RelError::Parse(format!("unknown index kind '{other}'"))),
        }
    }

    pub fn file_suffix(self) -> &'static str {
        match self {
            IndexKind::Hash => "hash",
            IndexKind::Avl => "avl",
            IndexKind::Rtree => "rtree",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub attributes: Vec<Attribute>,
    pub primary_key: Option<String>,
}

impl TableSchema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Total packed record size: sum of attribute widths plus the 4-byte `next`
    /// free-list pointer.
    pub fn record_size(&self) -> usize {
        self.attributes.iter().map(|a| a.data_type.byte_width()).sum::<usize>() + 4
    }

    /// Byte offset of `attr` within a packed record (not counting the 4-byte
    /// store header, only the offset within the record itself).
    pub fn attribute_offset(&self, name: &str) -> RelResult<usize> {
        let mut offset = 0;
        for attr in &self.attributes {
            if attr.name == name {
                return Ok(offset);
            }
            offset += attr.data_type.byte_width();
        }
        Err(RelError::Schema(format!("unknown attribute '{name}'")))
    }

    pub fn indexed_attributes(&self) -> impl Iterator<Item = (&Attribute, IndexKind)> {
        self.attributes.iter().filter_map(|a| a.index.map(|k| (a, k)))
    }
}
