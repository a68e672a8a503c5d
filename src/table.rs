//! Table manager: owns one table's record store and secondary indices, and
//! plans SELECT/DELETE across whichever indices exist (spec.md §4.6).

use crate::error::{RelError, RelResult};
use crate::index::TableIndex;
use crate::point::Point;
use crate::schema::TableSchema;
use crate::store::RecordStore;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// `attr = value`.
#[derive(Debug, Clone)]
pub struct ExactFilter {
    pub attr: String,
    pub value: Value,
}

/// `attr BETWEEN lo AND hi` (inclusive), or a `<`/`<=`/`>`/`>=` comparison
/// already rewritten to a range by the SQL front end.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    pub attr: String,
    pub lo: Value,
    pub hi: Value,
}

#[derive(Debug, Clone)]
pub enum SpatialFilter {
    Radius { attr: String, center: Point, radius: f64 },
    Knn { attr: String, center: Point, k: usize },
}

/// A decoded row together with the record number it lives at.
pub type Row = (u32, Vec<Value>);

pub struct TableManager {
    pub schema: TableSchema,
    store: RecordStore,
    indices: HashMap<usize, TableIndex>,
}

impl TableManager {
    /// Opens (creating if absent) the data file and every attribute's index file
    /// under `base_dir`.
    pub fn open(base_dir: &Path, schema: TableSchema) -> RelResult<Self> {
        let data_path = base_dir.join(format!("{}.bin", schema.table_name));
        let store = RecordStore::open(&data_path, &schema)?;

        let mut indices = HashMap::new();
        for (attr, kind) in schema.indexed_attributes() {
            let attr_idx = schema
                .attribute_index(&attr.name)
                .ok_or_else(|| RelError::Internal(format!("attribute '{}' missing from its own schema", attr.name)))?;
            let base = base_dir.join(format!("{}_{}_{}", schema.table_name, attr.name, kind.file_suffix()));
            let index = TableIndex::open(kind, &base, attr.data_type, attr.is_key)?;
            indices.insert(attr_idx, index);
        }

        Ok(Self { schema, store, indices })
    }

    fn attribute_value(&mut self, record_number: u32, attr_idx: usize) -> RelResult<Value> {
        self.store
            .get_attribute(record_number, attr_idx)?
            .ok_or_else(|| RelError::Internal(format!("record {record_number} vanished mid-operation")))
    }

    fn is_duplicate(&mut self, attr_idx: usize, value: &Value) -> RelResult<bool> {
        if self.indices.contains_key(&attr_idx) {
            let store = &mut self.store;
            let index = self.indices.get_mut(&attr_idx).unwrap();
            let found = index.search_exact(value, &mut |rn| {
                store
                    .get_attribute(rn, attr_idx)?
                    .ok_or_else(|| RelError::Internal(format!("record {rn} vanished mid-lookup")))
            })?;
            Ok(!found.is_empty())
        } else {
            for rn in self.store.get_active_record_numbers()? {
                if self.store.get_attribute(rn, attr_idx)?.as_ref() == Some(value) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }

    /// Inserts one row. `values[i] = None` uses attribute `i`'s type default.
    /// Fails if any `is_key` attribute's value is already active elsewhere.
    pub fn insert(&mut self, values: &[Option<Value>]) -> RelResult<u32> {
        for attr in self.schema.attributes.clone() {
            if !attr.is_key {
                continue;
            }
            let attr_idx = self.schema.attribute_index(&attr.name).unwrap();
            let candidate = values[attr_idx].clone().unwrap_or_else(|| attr.data_type.default_value());
            if self.is_duplicate(attr_idx, &candidate)? {
                return Err(RelError::Schema(format!(
                    "duplicate value '{candidate}' for key attribute '{}'",
                    attr.name
                )));
            }
        }

        let record_number = self.store.insert(values)?;

        for (&attr_idx, index) in self.indices.iter_mut() {
            let value = self
                .store
                .get_attribute(record_number, attr_idx)?
                .ok_or_else(|| RelError::Internal("just-inserted record missing".into()))?;
            let store = &mut self.store;
            index.insert(&value, record_number, &mut |rn| {
                store
                    .get_attribute(rn, attr_idx)?
                    .ok_or_else(|| RelError::Internal(format!("record {rn} vanished mid-insert")))
            })?;
        }

        tracing::info!(table = %self.schema.table_name, record_number, "row inserted");
        Ok(record_number)
    }

    fn exact_candidates(&mut self, filter: &ExactFilter) -> RelResult<HashSet<u32>> {
        let attr_idx = self
            .schema
            .attribute_index(&filter.attr)
            .ok_or_else(|| RelError::Schema(format!("unknown attribute '{}'", filter.attr)))?;
        if let Some(index) = self.indices.get_mut(&attr_idx) {
            let store = &mut self.store;
            let found = index.search_exact(&filter.value, &mut |rn| {
                store
                    .get_attribute(rn, attr_idx)?
                    .ok_or_else(|| RelError::Internal(format!("record {rn} vanished mid-search")))
            })?;
            Ok(found.into_iter().collect())
        } else {
            let mut out = HashSet::new();
            for rn in self.store.get_active_record_numbers()? {
                if self.store.get_attribute(rn, attr_idx)?.as_ref() == Some(&filter.value) {
                    out.insert(rn);
                }
            }
            Ok(out)
        }
    }

    fn range_candidates(&mut self, filter: &RangeFilter) -> RelResult<HashSet<u32>> {
        let attr_idx = self
            .schema
            .attribute_index(&filter.attr)
            .ok_or_else(|| RelError::Schema(format!("unknown attribute '{}'", filter.attr)))?;
        if let Some(index) = self.indices.get_mut(&attr_idx) {
            Ok(index.search_range(&filter.lo, &filter.hi)?.into_iter().collect())
        } else {
            let mut out = HashSet::new();
            for rn in self.store.get_active_record_numbers()? {
                let v = self.attribute_value(rn, attr_idx)?;
                let in_range = v.partial_cmp(&filter.lo).map(|o| o != std::cmp::Ordering::Less).unwrap_or(false)
                    && v.partial_cmp(&filter.hi).map(|o| o != std::cmp::Ordering::Greater).unwrap_or(false);
                if in_range {
                    out.insert(rn);
                }
            }
            Ok(out)
        }
    }

    fn spatial_candidates(&mut self, filter: &SpatialFilter) -> RelResult<HashSet<u32>> {
        let (attr, center, out) = match filter {
            SpatialFilter::Radius { attr, center, radius } => {
                let attr_idx = self
                    .schema
                    .attribute_index(attr)
                    .ok_or_else(|| RelError::Schema(format!("unknown attribute '{attr}'")))?;
                let index = self
                    .indices
                    .get(&attr_idx)
                    .ok_or_else(|| RelError::Schema(format!("RADIUS requires an rtree index on '{attr}'")))?;
                (attr, *center, index.search_radius(*center, *radius)?)
            }
            SpatialFilter::Knn { attr, center, k } => {
                let attr_idx = self
                    .schema
                    .attribute_index(attr)
                    .ok_or_else(|| RelError::Schema(format!("unknown attribute '{attr}'")))?;
                let index = self
                    .indices
                    .get(&attr_idx)
                    .ok_or_else(|| RelError::Schema(format!("KNN requires an rtree index on '{attr}'")))?;
                (attr, *center, index.search_knn(*center, *k)?)
            }
        };
        let _ = (attr, center);
        Ok(out.into_iter().collect())
    }

    fn intersect(acc: Option<HashSet<u32>>, set: HashSet<u32>) -> Option<HashSet<u32>> {
        match acc {
            None => Some(set),
            Some(current) => Some(current.intersection(&set).copied().collect()),
        }
    }

    /// Record numbers matching every filter, ANDed together. With no filters at
    /// all, returns every active record number (spec.md §4.6).
    pub fn select(
        &mut self,
        exact: &[ExactFilter],
        ranges: &[RangeFilter],
        spatial: &[SpatialFilter],
    ) -> RelResult<Vec<u32>> {
        if exact.is_empty() && ranges.is_empty() && spatial.is_empty() {
            return self.store.get_active_record_numbers();
        }
        let mut candidate: Option<HashSet<u32>> = None;
        for f in exact {
            candidate = Self::intersect(candidate, self.exact_candidates(f)?);
        }
        for f in ranges {
            candidate = Self::intersect(candidate, self.range_candidates(f)?);
        }
        for f in spatial {
            candidate = Self::intersect(candidate, self.spatial_candidates(f)?);
        }
        let mut out: Vec<u32> = candidate.unwrap_or_default().into_iter().collect();
        out.sort_unstable();
        Ok(out)
    }

    /// `select()` plus decoding, for SELECT statement execution.
    pub fn select_rows(
        &mut self,
        exact: &[ExactFilter],
        ranges: &[RangeFilter],
        spatial: &[SpatialFilter],
    ) -> RelResult<Vec<Row>> {
        let record_numbers = self.select(exact, ranges, spatial)?;
        let mut rows = Vec::with_capacity(record_numbers.len());
        for rn in record_numbers {
            if let Some(values) = self.store.get(rn)? {
                rows.push((rn, values));
            }
        }
        Ok(rows)
    }

    /// Deletes every record matching the given filters. At least one filter
    /// must be supplied — spec.md §4.6 rejects an unconditional DELETE.
    pub fn delete(
        &mut self,
        exact: &[ExactFilter],
        ranges: &[RangeFilter],
        spatial: &[SpatialFilter],
    ) -> RelResult<Vec<u32>> {
        if exact.is_empty() && ranges.is_empty() && spatial.is_empty() {
            return Err(RelError::Schema("DELETE without WHERE is not allowed".into()));
        }
        let mut record_numbers = self.select(exact, ranges, spatial)?;
        record_numbers.sort_unstable();

        let mut deleted = Vec::with_capacity(record_numbers.len());
        for rn in record_numbers {
            let Some(values) = self.store.get(rn)? else { continue };
            for (&attr_idx, index) in self.indices.iter_mut() {
                index.delete(&values[attr_idx], rn)?;
            }
            if self.store.delete(rn)? {
                deleted.push(rn);
            }
        }
        tracing::info!(table = %self.schema.table_name, count = deleted.len(), "rows deleted");
        Ok(deleted)
    }

    /// Rebuilds every R-tree index on this table from the record store's active
    /// records (spec.md §4.5).
    pub fn rebuild_spatial_indices(&mut self) -> RelResult<()> {
        let active = self.store.get_all_records()?;
        for (&attr_idx, index) in self.indices.iter_mut() {
            if matches!(index, TableIndex::Rtree(_)) {
                let records: Vec<(u32, Value)> =
                    active.iter().map(|(rn, row)| (*rn, row[attr_idx].clone())).collect();
                index.rebuild(&records)?;
            }
        }
        Ok(())
    }

    pub fn rtree_stats(&self, attr: &str) -> RelResult<crate::index::RTreeStats> {
        let attr_idx = self
            .schema
            .attribute_index(attr)
            .ok_or_else(|| RelError::Schema(format!("unknown attribute '{attr}'")))?;
        self.indices
            .get(&attr_idx)
            .and_then(TableIndex::stats)
            .ok_or_else(|| RelError::Schema(format!("'{attr}' is not backed by an rtree index")))
    }
}
