//! Pluggable secondary index structures and the dispatch layer over them.

pub mod avl;
pub mod hash;
pub mod rtree;

pub use avl::AvlIndex;
pub use hash::HashIndex;
pub use rtree::{RTreeIndex, RTreeStats};

use crate::error::{RelError, RelResult};
use crate::point::Point;
use crate::schema::IndexKind;
use crate::value::Value;
use std::path::Path;

/// One secondary index on one attribute, of whichever kind the schema chose.
pub enum TableIndex {
    Hash(HashIndex),
    Avl(AvlIndex),
    Rtree(RTreeIndex),
}

impl TableIndex {
    pub fn open(
        kind: IndexKind,
        base_path: impl AsRef<Path>,
        key_type: crate::value::DataType,
        is_key: bool,
    ) -> RelResult<Self> {
        let base_path = base_path.as_ref();
        match kind {
            IndexKind::Hash => {
                let dir = base_path.with_extension("dir.bin");
                let buckets = base_path.with_extension("buckets.bin");
                Ok(TableIndex::Hash(HashIndex::open(dir, buckets, is_key)?))
            }
            IndexKind::Avl => Ok(TableIndex::Avl(AvlIndex::open(base_path.with_extension("bin"), key_type, is_key)?)),
            IndexKind::Rtree => Ok(TableIndex::Rtree(RTreeIndex::open(base_path.with_extension("json"), is_key)?)),
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            TableIndex::Hash(_) => IndexKind::Hash,
            TableIndex::Avl(_) => IndexKind::Avl,
            TableIndex::Rtree(_) => IndexKind::Rtree,
        }
    }

    pub fn insert(&mut self, key: &Value, record_number: u32, lookup: &mut dyn FnMut(u32) -> RelResult<Value>) -> RelResult<()> {
        match self {
            TableIndex::Hash(h) => h.insert(key, record_number, lookup),
            TableIndex::Avl(a) => a.insert(key, record_number),
            TableIndex::Rtree(r) => r.insert(key.as_point()?, record_number),
        }
    }

    pub fn delete(&mut self, key: &Value, record_number: u32) -> RelResult<Option<u32>> {
        match self {
            TableIndex::Hash(h) => h.delete(key, record_number),
            TableIndex::Avl(a) => a.delete(key, record_number),
            TableIndex::Rtree(r) => r.delete(key.as_point()?, record_number),
        }
    }

    pub fn search_exact(&mut self, key: &Value, lookup: &mut dyn FnMut(u32) -> RelResult<Value>) -> RelResult<Vec<u32>> {
        match self {
            TableIndex::Hash(h) => h.search_exact(key, lookup),
            TableIndex::Avl(a) => a.search_exact(key),
            TableIndex::Rtree(r) => Ok(r.search_exact(key.as_point()?)),
        }
    }

    pub fn search_range(&mut self, lo: &Value, hi: &Value) -> RelResult<Vec<u32>> {
        match self {
            TableIndex::Hash(h) => h.search_range(lo, hi),
            TableIndex::Avl(a) => a.range_search(lo, hi),
            TableIndex::Rtree(r) => Ok(r.search_range(lo.as_point()?, hi.as_point()?)),
        }
    }

    pub fn search_radius(&self, center: Point, r: f64) -> RelResult<Vec<u32>> {
        match self {
            TableIndex::Rtree(idx) => Ok(idx.search_radius(center, r)),
            _ => Err(RelError::Schema("RADIUS requires an rtree index".into())),
        }
    }

    pub fn search_knn(&self, center: Point, k: usize) -> RelResult<Vec<u32>> {
        match self {
            TableIndex::Rtree(idx) => Ok(idx.search_knn(center, k)),
            _ => Err(RelError::Schema("KNN requires an rtree index".into())),
        }
    }

    pub fn rebuild(&mut self, records: &[(u32, Value)]) -> RelResult<()> {
        match self {
            TableIndex::Rtree(idx) => {
                let points = records
                    .iter()
                    .map(|(n, v)| Ok((*n, v.as_point()?)))
                    .collect::<RelResult<Vec<_>>>()?;
                idx.rebuild(&points)
            }
            TableIndex::Hash(_) | TableIndex::Avl(_) => Ok(()),
        }
    }

    pub fn stats(&self) -> Option<RTreeStats> {
        match self {
            TableIndex::Rtree(idx) => Some(idx.stats()),
            _ => None,
        }
    }
}
