//! Fixed-width record store: one data file per table, free-list–based deletion.
//!
//! Physical layout: a 4-byte signed free-list head (`-1` when empty), followed by
//! `record_size`-byte slots. Record numbers are 1-based; slot `n` lives at byte
//! offset `4 + (n - 1) * record_size`. A slot's trailing 4 bytes are its `next`
//! field: [`RECORD_NORMAL`] when the slot is active, otherwise the next free slot
//! (or `-1` at the end of the chain).

use crate::error::{RelError, RelResult};
use crate::point::Point;
use crate::schema::TableSchema;
use crate::value::{DataType, Value};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Sentinel distinguishing an active slot from a free-list entry. Chosen far from
/// any value a free-list chain could hold (`-1` or a positive record number).
pub const RECORD_NORMAL: i32 = i32::MIN;

const HEADER_SIZE: u64 = 4;

pub type Record = Vec<Value>;

/// A table's packed, free-list-managed data file.
pub struct RecordStore {
    path: PathBuf,
    file: File,
    record_size: usize,
    attribute_widths: Vec<usize>,
    attribute_types: Vec<DataType>,
}

impl RecordStore {
    /// Opens `path`, creating an empty store (header `-1`, zero slots) if absent.
    pub fn open(path: impl AsRef<Path>, schema: &TableSchema) -> RelResult<Self> {
        let path = path.as_ref().to_path_buf();
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        if is_new {
            file.write_all(&(-1i32).to_le_bytes())?;
            file.flush()?;
        }
        Ok(Self {
            path,
            file,
            record_size: schema.record_size(),
            attribute_widths: schema.attributes.iter().map(|a| a.data_type.byte_width()).collect(),
            attribute_types: schema.attributes.iter().map(|a| a.data_type).collect(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn slot_offset(&self, n: u32) -> u64 {
        HEADER_SIZE + (n as u64 - 1) * self.record_size as u64
    }

    fn slot_count(&self) -> RelResult<u32> {
        let len = self.file.metadata()?.len();
        if len < HEADER_SIZE {
            return Ok(0);
        }
        Ok(((len - HEADER_SIZE) / self.record_size as u64) as u32)
    }

    fn read_header(&mut self) -> RelResult<i32> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn write_header(&mut self, head: i32) -> RelResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&head.to_le_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    fn read_slot(&mut self, n: u32) -> RelResult<Vec<u8>> {
        let mut buf = vec![0u8; self.record_size];
        self.file.seek(SeekFrom::Start(self.slot_offset(n)))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_slot(&mut self, n: u32, bytes: &[u8]) -> RelResult<()> {
        self.file.seek(SeekFrom::Start(self.slot_offset(n)))?;
        self.file.write_all(bytes)?;
        self.file.flush()?;
        Ok(())
    }

    fn pack(&self, values: &[Value], next: i32) -> RelResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.record_size);
        for (data_type, value) in self.attribute_types.iter().zip(values) {
            pack_value(&mut buf, *data_type, value)?;
        }
        buf.extend_from_slice(&next.to_le_bytes());
        Ok(buf)
    }

    fn unpack(&self, bytes: &[u8]) -> RelResult<(Vec<Value>, i32)> {
        let mut offset = 0;
        let mut values = Vec::with_capacity(self.attribute_types.len());
        for (data_type, width) in self.attribute_types.iter().zip(&self.attribute_widths) {
            let field = &bytes[offset..offset + width];
            values.push(unpack_value(*data_type, field)?);
            offset += width;
        }
        let next = i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        Ok((values, next))
    }

    /// Inserts a row. `values[i] = None` uses the type default for attribute `i`,
    /// per spec.md §4.2's packing rules. Returns the assigned 1-based record number.
    ///
    /// Does not check primary-key or `is_key` uniqueness — that requires the
    /// relevant index, which `TableManager` owns, not this store.
    pub fn insert(&mut self, values: &[Option<Value>]) -> RelResult<u32> {
        if values.len() != self.attribute_types.len() {
            return Err(RelError::Schema(format!(
                "expected {} values, got {}",
                self.attribute_types.len(),
                values.len()
            )));
        }
        let mut filled = Vec::with_capacity(values.len());
        for (slot, data_type) in values.iter().zip(&self.attribute_types) {
            match slot {
                Some(v) if v.matches_type(*data_type) => filled.push(v.clone()),
                Some(v) => {
                    return Err(RelError::TypeMismatch {
                        expected: data_type.to_string(),
                        actual: v.data_type().to_string(),
                    })
                }
                None => filled.push(data_type.default_value()),
            }
        }

        let head = self.read_header()?;
        let bytes = self.pack(&filled, RECORD_NORMAL)?;
        let record_number = if head != -1 {
            let n = head as u32;
            let old = self.read_slot(n)?;
            let (_, old_next) = self.unpack(&old)?;
            self.write_slot(n, &bytes)?;
            self.write_header(old_next)?;
            n
        } else {
            let n = self.slot_count()? + 1;
            self.write_slot(n, &bytes)?;
            n
        };
        tracing::debug!(record_number, "inserted record");
        Ok(record_number)
    }

    /// Returns the decoded row at `n` if active; `None` if deleted or out of range.
    pub fn get(&mut self, n: u32) -> RelResult<Option<Record>> {
        if n == 0 || n > self.slot_count()? {
            return Ok(None);
        }
        let bytes = self.read_slot(n)?;
        let (values, next) = self.unpack(&bytes)?;
        if next == RECORD_NORMAL {
            Ok(Some(values))
        } else {
            Ok(None)
        }
    }

    /// Reads a single attribute of an active record without decoding the rest.
    pub fn get_attribute(&mut self, n: u32, attr_index: usize) -> RelResult<Option<Value>> {
        Ok(self.get(n)?.map(|mut r| r.swap_remove(attr_index)))
    }

    /// Logically deletes slot `n`. Returns `true` if it was active.
    pub fn delete(&mut self, n: u32) -> RelResult<bool> {
        if n == 0 || n > self.slot_count()? {
            return Ok(false);
        }
        let bytes = self.read_slot(n)?;
        let (values, next) = self.unpack(&bytes)?;
        if next != RECORD_NORMAL {
            return Ok(false);
        }
        let head = self.read_header()?;
        let freed = self.pack(&values, head)?;
        self.write_slot(n, &freed)?;
        self.write_header(n as i32)?;
        tracing::debug!(record_number = n, "deleted record");
        Ok(true)
    }

    pub fn get_active_record_numbers(&mut self) -> RelResult<Vec<u32>> {
        let count = self.slot_count()?;
        let mut out = Vec::new();
        for n in 1..=count {
            let bytes = self.read_slot(n)?;
            let (_, next) = self.unpack(&bytes)?;
            if next == RECORD_NORMAL {
                out.push(n);
            }
        }
        Ok(out)
    }

    pub fn get_all_records(&mut self) -> RelResult<Vec<(u32, Record)>> {
        let count = self.slot_count()?;
        let mut out = Vec::new();
        for n in 1..=count {
            let bytes = self.read_slot(n)?;
            let (values, next) = self.unpack(&bytes)?;
            if next == RECORD_NORMAL {
                out.push((n, values));
            }
        }
        Ok(out)
    }

    /// True record numbers reachable from the free-list header; used by property
    /// tests to check the free list matches deleted slots exactly.
    pub fn free_list_chain(&mut self) -> RelResult<Vec<u32>> {
        let mut out = Vec::new();
        let mut cur = self.read_header()?;
        while cur != -1 {
            let n = cur as u32;
            out.push(n);
            let bytes = self.read_slot(n)?;
            let (_, next) = self.unpack(&bytes)?;
            cur = next;
        }
        Ok(out)
    }
}

pub(crate) fn pack_value(buf: &mut Vec<u8>, data_type: DataType, value: &Value) -> RelResult<()> {
    match (data_type, value) {
        (DataType::Int, Value::Int(i)) => buf.extend_from_slice(&i.to_le_bytes()),
        (DataType::Date, Value::Date(d)) => buf.extend_from_slice(&d.to_le_bytes()),
        (DataType::Float, Value::Float(f)) => buf.extend_from_slice(&f.to_le_bytes()),
        (DataType::Bool, Value::Bool(b)) => buf.push(if *b { 1 } else { 0 }),
        (DataType::Varchar(n) | DataType::Char(n), Value::Str(s)) => {
            let bytes = s.as_bytes();
            let take = bytes.len().min(n);
            buf.extend_from_slice(&bytes[..take]);
            buf.resize(buf.len() + (n - take), 0);
        }
        (DataType::Point, Value::Point(p)) => {
            buf.extend_from_slice(&p.x.to_le_bytes());
            buf.extend_from_slice(&p.y.to_le_bytes());
        }
        (expected, actual) => {
            return Err(RelError::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.data_type().to_string(),
            })
        }
    }
    Ok(())
}

pub(crate) fn unpack_value(data_type: DataType, field: &[u8]) -> RelResult<Value> {
    match data_type {
        DataType::Int => Ok(Value::Int(i32::from_le_bytes(field.try_into().unwrap()))),
        DataType::Date => Ok(Value::Date(i32::from_le_bytes(field.try_into().unwrap()))),
        DataType::Float => Ok(Value::Float(f64::from_le_bytes(field.try_into().unwrap()))),
        DataType::Bool => Ok(Value::Bool(field[0] != 0)),
        DataType::Varchar(_) | DataType::Char(_) => {
            let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
            Ok(Value::Str(String::from_utf8_lossy(&field[..end]).into_owned()))
        }
        DataType::Point => {
            let x = f64::from_le_bytes(field[0..8].try_into().unwrap());
            let y = f64::from_le_bytes(field[8..16].try_into().unwrap());
            Ok(Value::Point(Point::new(x, y)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use tempfile::tempdir;

    fn schema() -> TableSchema {
        TableSchema {
            table_name: "t".into(),
            attributes: vec![
                Attribute { name: "id".into(), data_type: DataType::Int, is_key: true, index: None },
                Attribute { name: "name".into(), data_type: DataType::Varchar(8), is_key: false, index: None },
            ],
            primary_key: Some("id".into()),
        }
    }

    #[test]
    fn insert_get_roundtrip() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let n = store
            .insert(&[Some(Value::Int(1)), Some(Value::Str("mango".into()))])
            .unwrap();
        assert_eq!(n, 1);
        let record = store.get(n).unwrap().unwrap();
        assert_eq!(record[0], Value::Int(1));
        assert_eq!(record[1], Value::Str("mango".into()));
    }

    #[test]
    fn missing_attribute_uses_default() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let n = store.insert(&[Some(Value::Int(5)), None]).unwrap();
        let record = store.get(n).unwrap().unwrap();
        assert_eq!(record[1], Value::Str(" ".into()));
    }

    #[test]
    fn delete_then_reinsert_reuses_slot() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let a = store.insert(&[Some(Value::Int(1)), Some(Value::Str("a".into()))]).unwrap();
        let b = store.insert(&[Some(Value::Int(2)), Some(Value::Str("b".into()))]).unwrap();
        assert!(store.delete(a).unwrap());
        assert!(store.get(a).unwrap().is_none());
        let c = store.insert(&[Some(Value::Int(3)), Some(Value::Str("c".into()))]).unwrap();
        assert_eq!(c, a, "reused the freed slot");
        assert!(store.get(b).unwrap().is_some());
        assert_eq!(store.free_list_chain().unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn delete_twice_returns_false() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let a = store.insert(&[Some(Value::Int(1)), Some(Value::Str("a".into()))]).unwrap();
        assert!(store.delete(a).unwrap());
        assert!(!store.delete(a).unwrap());
    }

    #[test]
    fn active_record_numbers_excludes_deleted() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let a = store.insert(&[Some(Value::Int(1)), Some(Value::Str("a".into()))]).unwrap();
        let b = store.insert(&[Some(Value::Int(2)), Some(Value::Str("b".into()))]).unwrap();
        store.delete(a).unwrap();
        assert_eq!(store.get_active_record_numbers().unwrap(), vec![b]);
    }

    #[test]
    fn varchar_is_truncated_and_padded() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let n = store
            .insert(&[Some(Value::Int(1)), Some(Value::Str("muchlonger".into()))])
            .unwrap();
        let record = store.get(n).unwrap().unwrap();
        assert_eq!(record[1], Value::Str("muchlong".into()));
    }
}
