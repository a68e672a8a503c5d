//! Extendible hash index: a directory of bucket pointers over a buckets file,
//! with overflow chaining when a split would not redistribute any entries.

use crate::error::{RelError, RelResult};
use crate::point::Point;
use crate::value::Value;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Bucket capacity. Chosen to match the collision scenario in spec.md §8 (S2),
/// which fills a bucket with six colliding values at `FB = 5`.
pub const FB: usize = 5;

const DIR_HEADER_SIZE: u64 = 4;
const POINTER_SIZE: u64 = 8;
const BUCKET_HEADER_SIZE: usize = 8; // local_depth (i32) + count (i32)
const BUCKET_SLOTS_SIZE: usize = FB * 4;
const BUCKET_NEXT_SIZE: usize = 8; // i64
const BUCKET_RECORD_SIZE: u64 = (BUCKET_HEADER_SIZE + BUCKET_SLOTS_SIZE + BUCKET_NEXT_SIZE) as u64;

#[derive(Debug, Clone)]
struct Bucket {
    local_depth: u32,
    slots: Vec<u32>,
    next: i64,
}

impl Bucket {
    fn empty(local_depth: u32) -> Self {
        Self { local_depth, slots: Vec::with_capacity(FB), next: -1 }
    }

    fn decode(bytes: &[u8]) -> Self {
        let local_depth = i32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u32;
        let count = i32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            let off = BUCKET_HEADER_SIZE + i * 4;
            slots.push(u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()));
        }
        let next_off = BUCKET_HEADER_SIZE + BUCKET_SLOTS_SIZE;
        let next = i64::from_le_bytes(bytes[next_off..next_off + 8].try_into().unwrap());
        Self { local_depth, slots, next }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; BUCKET_RECORD_SIZE as usize];
        buf[0..4].copy_from_slice(&(self.local_depth as i32).to_le_bytes());
        buf[4..8].copy_from_slice(&(self.slots.len() as i32).to_le_bytes());
        for (i, rn) in self.slots.iter().enumerate() {
            let off = BUCKET_HEADER_SIZE + i * 4;
            buf[off..off + 4].copy_from_slice(&rn.to_le_bytes());
        }
        let next_off = BUCKET_HEADER_SIZE + BUCKET_SLOTS_SIZE;
        buf[next_off..next_off + 8].copy_from_slice(&self.next.to_le_bytes());
        buf
    }

    fn has_space(&self) -> bool {
        self.slots.len() < FB
    }
}

/// Deterministic, stable-across-runs hash used to select directory slots. Must
/// not use `std::collections::hash_map::DefaultHasher`, whose algorithm is not
/// guaranteed stable across compiler versions and this index is persisted.
fn hash_value(value: &Value) -> u64 {
    let mut bytes = Vec::new();
    match value {
        Value::Int(i) => bytes.extend_from_slice(&i.to_le_bytes()),
        Value::Date(d) => bytes.extend_from_slice(&d.to_le_bytes()),
        Value::Float(f) => bytes.extend_from_slice(&f.to_le_bytes()),
        Value::Bool(b) => bytes.push(if *b { 1 } else { 0 }),
        Value::Str(s) => bytes.extend_from_slice(s.as_bytes()),
        Value::Point(Point { x, y }) => {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
        }
    }
    fnv1a(&bytes)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Extendible hash index over one attribute of one table.
pub struct HashIndex {
    dir_file: File,
    bucket_file: File,
    global_depth: u32,
    is_key: bool,
}

impl HashIndex {
    pub fn open(dir_path: impl AsRef<Path>, bucket_path: impl AsRef<Path>, is_key: bool) -> RelResult<Self> {
        let dir_path: PathBuf = dir_path.as_ref().to_path_buf();
        let bucket_path: PathBuf = bucket_path.as_ref().to_path_buf();
        let is_new = !dir_path.exists();

        let mut dir_file = OpenOptions::new().read(true).write(true).create(true).open(&dir_path)?;
        let mut bucket_file = OpenOptions::new().read(true).write(true).create(true).open(&bucket_path)?;

        if is_new {
            dir_file.write_all(&0i32.to_le_bytes())?;
            dir_file.write_all(&0u64.to_le_bytes())?; // single pointer at depth 0 -> bucket 0
            dir_file.flush()?;
            bucket_file.write_all(&Bucket::empty(0).encode())?;
            bucket_file.flush()?;
        }

        let mut index = Self { dir_file, bucket_file, global_depth: 0, is_key };
        index.global_depth = index.read_global_depth()?;
        Ok(index)
    }

    fn read_global_depth(&mut self) -> RelResult<u32> {
        self.dir_file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 4];
        self.dir_file.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf) as u32)
    }

    fn directory_size(&self) -> u64 {
        1u64 << self.global_depth
    }

    fn read_pointer(&mut self, slot: u64) -> RelResult<u64> {
        self.dir_file.seek(SeekFrom::Start(DIR_HEADER_SIZE + slot * POINTER_SIZE))?;
        let mut buf = [0u8; 8];
        self.dir_file.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_pointer(&mut self, slot: u64, bucket_id: u64) -> RelResult<()> {
        self.dir_file.seek(SeekFrom::Start(DIR_HEADER_SIZE + slot * POINTER_SIZE))?;
        self.dir_file.write_all(&bucket_id.to_le_bytes())?;
        Ok(())
    }

    fn double_directory(&mut self) -> RelResult<()> {
        let old_len = self.directory_size();
        let mut pointers = Vec::with_capacity((old_len * 2) as usize);
        for i in 0..old_len {
            pointers.push(self.read_pointer(i)?);
        }
        pointers.extend_from_within(..);
        self.global_depth += 1;

        self.dir_file.seek(SeekFrom::Start(0))?;
        self.dir_file.write_all(&(self.global_depth as i32).to_le_bytes())?;
        for p in &pointers {
            self.dir_file.write_all(&p.to_le_bytes())?;
        }
        self.dir_file.flush()?;
        tracing::debug!(global_depth = self.global_depth, "hash directory doubled");
        Ok(())
    }

    fn bucket_count(&mut self) -> RelResult<u64> {
        Ok(self.bucket_file.metadata()?.len() / BUCKET_RECORD_SIZE)
    }

    fn read_bucket(&mut self, id: u64) -> RelResult<Bucket> {
        let mut buf = vec![0u8; BUCKET_RECORD_SIZE as usize];
        self.bucket_file.seek(SeekFrom::Start(id * BUCKET_RECORD_SIZE))?;
        self.bucket_file.read_exact(&mut buf)?;
        Ok(Bucket::decode(&buf))
    }

    fn write_bucket(&mut self, id: u64, bucket: &Bucket) -> RelResult<()> {
        self.bucket_file.seek(SeekFrom::Start(id * BUCKET_RECORD_SIZE))?;
        self.bucket_file.write_all(&bucket.encode())?;
        self.bucket_file.flush()?;
        Ok(())
    }

    fn append_bucket(&mut self, bucket: &Bucket) -> RelResult<u64> {
        let id = self.bucket_count()?;
        self.write_bucket(id, bucket)?;
        Ok(id)
    }

    /// All record numbers reachable from the directory slot for `key`, walking
    /// the base bucket's overflow chain.
    fn chain_members(&mut self, dir_slot: u64) -> RelResult<Vec<u32>> {
        let bucket_id = self.read_pointer(dir_slot)?;
        let mut out = Vec::new();
        let mut bucket = self.read_bucket(bucket_id)?;
        out.extend_from_slice(&bucket.slots);
        while bucket.next != -1 {
            bucket = self.read_bucket(bucket.next as u64)?;
            out.extend_from_slice(&bucket.slots);
        }
        Ok(out)
    }

    /// Inserts `record_number` under `key`. `lookup` resolves a candidate record
    /// number's current attribute value, used only to enforce `is_key` uniqueness.
    pub fn insert(
        &mut self,
        key: &Value,
        record_number: u32,
        lookup: &mut dyn FnMut(u32) -> RelResult<Value>,
    ) -> RelResult<()> {
        if self.is_key {
            let existing = self.search_exact(key, lookup)?;
            if !existing.is_empty() {
                return Err(RelError::Schema(format!("duplicate key '{key}'")));
            }
        }
        self.insert_unchecked(key, record_number, lookup)
    }

    fn insert_unchecked(
        &mut self,
        key: &Value,
        record_number: u32,
        lookup: &mut dyn FnMut(u32) -> RelResult<Value>,
    ) -> RelResult<()> {
        let hash = hash_value(key);
        loop {
            let dir_slot = hash & (self.directory_size() - 1);
            let bucket_id = self.read_pointer(dir_slot)?;
            let mut bucket = self.read_bucket(bucket_id)?;

            if bucket.has_space() {
                bucket.slots.push(record_number);
                self.write_bucket(bucket_id, &bucket)?;
                return Ok(());
            }

            // Base bucket full: look for room in the overflow chain first.
            let mut chain_id = bucket_id;
            let mut chain = bucket.clone();
            while chain.next != -1 {
                chain_id = chain.next as u64;
                chain = self.read_bucket(chain_id)?;
                if chain.has_space() {
                    chain.slots.push(record_number);
                    self.write_bucket(chain_id, &chain)?;
                    return Ok(());
                }
            }

            if bucket.local_depth < self.global_depth {
                if self.split_bucket(dir_slot, bucket_id, &bucket, lookup)? {
                    continue;
                }
                self.attach_overflow(bucket_id, record_number)?;
                return Ok(());
            }
            self.double_directory()?;
        }
    }

    /// Splits the bucket at `bucket_id` on the bit introduced by incrementing its
    /// local depth. Returns `false` (and makes no change) if every entry would
    /// still land on the same side, since that split wouldn't make room.
    fn split_bucket(
        &mut self,
        dir_slot: u64,
        bucket_id: u64,
        bucket: &Bucket,
        lookup: &mut dyn FnMut(u32) -> RelResult<Value>,
    ) -> RelResult<bool> {
        let new_local = bucket.local_depth + 1;
        let bit_pos = bucket.local_depth;

        let mut group0 = Vec::new();
        let mut group1 = Vec::new();
        for &rn in &bucket.slots {
            let h = hash_value(&lookup(rn)?);
            if (h >> bit_pos) & 1 == 0 {
                group0.push(rn);
            } else {
                group1.push(rn);
            }
        }

        if group0.is_empty() || group1.is_empty() {
            return Ok(false);
        }

        let bucket_a = Bucket { local_depth: new_local, slots: group0, next: -1 };
        let bucket_b = Bucket { local_depth: new_local, slots: group1, next: -1 };
        self.write_bucket(bucket_id, &bucket_a)?;
        let new_id = self.append_bucket(&bucket_b)?;

        for slot in 0..self.directory_size() {
            if self.read_pointer(slot)? == bucket_id && (slot >> bit_pos) & 1 == 1 {
                self.write_pointer(slot, new_id)?;
            }
        }
        let _ = dir_slot;
        tracing::debug!(bucket_id, new_id, "hash bucket split");
        Ok(true)
    }

    fn attach_overflow(&mut self, bucket_id: u64, record_number: u32) -> RelResult<()> {
        let mut last_id = bucket_id;
        let mut last = self.read_bucket(last_id)?;
        while last.next != -1 {
            last_id = last.next as u64;
            last = self.read_bucket(last_id)?;
        }
        let mut overflow = Bucket::empty(last.local_depth);
        overflow.slots.push(record_number);
        let overflow_id = self.append_bucket(&overflow)?;
        last.next = overflow_id as i64;
        self.write_bucket(last_id, &last)?;
        tracing::debug!(bucket_id, overflow_id, "hash overflow bucket allocated");
        Ok(())
    }

    pub fn search_exact(
        &mut self,
        key: &Value,
        lookup: &mut dyn FnMut(u32) -> RelResult<Value>,
    ) -> RelResult<Vec<u32>> {
        let hash = hash_value(key);
        let dir_slot = hash & (self.directory_size() - 1);
        let candidates = self.chain_members(dir_slot)?;
        let mut matches = Vec::new();
        for rn in candidates {
            if &lookup(rn)? == key {
                matches.push(rn);
            }
        }
        Ok(matches)
    }

    pub fn search_range(&self, _lo: &Value, _hi: &Value) -> RelResult<Vec<u32>> {
        Err(RelError::Schema("range search is not supported on a hash index".into()))
    }

    /// Removes `record_number` from the bucket chain addressed by `key`. Returns
    /// `Some(record_number)` if it was present.
    pub fn delete(&mut self, key: &Value, record_number: u32) -> RelResult<Option<u32>> {
        let hash = hash_value(key);
        let dir_slot = hash & (self.directory_size() - 1);
        let bucket_id = self.read_pointer(dir_slot)?;

        let mut chain_id = bucket_id;
        let mut chain = self.read_bucket(chain_id)?;
        loop {
            if let Some(pos) = chain.slots.iter().position(|&rn| rn == record_number) {
                chain.slots.remove(pos);
                self.write_bucket(chain_id, &chain)?;
                if chain_id != bucket_id && chain.slots.is_empty() {
                    self.unlink_overflow(bucket_id, chain_id)?;
                }
                return Ok(Some(record_number));
            }
            if chain.next == -1 {
                return Ok(None);
            }
            chain_id = chain.next as u64;
            chain = self.read_bucket(chain_id)?;
        }
    }

    fn unlink_overflow(&mut self, base_id: u64, empty_id: u64) -> RelResult<()> {
        let mut prev_id = base_id;
        let mut prev = self.read_bucket(prev_id)?;
        while prev.next != empty_id as i64 {
            prev_id = prev.next as u64;
            prev = self.read_bucket(prev_id)?;
        }
        let empty = self.read_bucket(empty_id)?;
        prev.next = empty.next;
        self.write_bucket(prev_id, &prev)?;
        tracing::debug!(empty_id, "unlinked empty overflow bucket");
        Ok(())
    }

    /// Current global depth, used by property tests to check the directory only
    /// ever grows by doubling (always a power of two).
    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Local depth of every distinct bucket reachable from the directory, used
    /// by property tests to check no bucket's local depth exceeds the global
    /// depth.
    pub fn local_depths(&mut self) -> RelResult<Vec<u32>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for slot in 0..self.directory_size() {
            let bucket_id = self.read_pointer(slot)?;
            if seen.insert(bucket_id) {
                out.push(self.read_bucket(bucket_id)?.local_depth);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_lookup(_: u32) -> RelResult<Value> {
        unreachable!("lookup should not be needed for a non-key attribute")
    }

    #[test]
    fn insert_and_search_exact() {
        let dir = tempdir().unwrap();
        let mut idx = HashIndex::open(dir.path().join("d.bin"), dir.path().join("b.bin"), false).unwrap();
        idx.insert(&Value::Str("mango".into()), 1, &mut no_lookup).unwrap();
        idx.insert(&Value::Str("banana".into()), 2, &mut no_lookup).unwrap();
        let found = idx.search_exact(&Value::Str("banana".into()), &mut no_lookup).unwrap();
        assert_eq!(found, vec![2]);
    }

    #[test]
    fn range_search_is_unsupported() {
        let dir = tempdir().unwrap();
        let idx = HashIndex::open(dir.path().join("d.bin"), dir.path().join("b.bin"), false).unwrap();
        assert!(idx.search_range(&Value::Int(0), &Value::Int(10)).is_err());
    }

    #[test]
    fn overflow_on_colliding_inserts_past_capacity() {
        let dir = tempdir().unwrap();
        let mut idx = HashIndex::open(dir.path().join("d.bin"), dir.path().join("b.bin"), false).unwrap();
        let values: Vec<Value> = (1..=6).map(|_| Value::Str("COLLIDE".into())).collect();
        for (i, v) in values.iter().enumerate() {
            idx.insert(v, (i + 1) as u32, &mut no_lookup).unwrap();
        }
        let mut found = idx.search_exact(&Value::Str("COLLIDE".into()), &mut no_lookup).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2, 3, 4, 5, 6]);

        assert_eq!(idx.delete(&Value::Str("COLLIDE".into()), 3).unwrap(), Some(3));
        let mut remaining = idx.search_exact(&Value::Str("COLLIDE".into()), &mut no_lookup).unwrap();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn duplicate_key_rejected_when_is_key() {
        let dir = tempdir().unwrap();
        let mut idx = HashIndex::open(dir.path().join("d.bin"), dir.path().join("b.bin"), true).unwrap();
        let mut values = std::collections::HashMap::new();
        values.insert(1u32, Value::Int(7));
        let mut lookup = |rn: u32| Ok(values.get(&rn).cloned().unwrap());
        idx.insert(&Value::Int(7), 1, &mut lookup).unwrap();
        let err = idx.insert(&Value::Int(7), 2, &mut lookup);
        assert!(err.is_err());
    }

    #[test]
    fn many_distinct_keys_trigger_directory_growth() {
        let dir = tempdir().unwrap();
        let mut idx = HashIndex::open(dir.path().join("d.bin"), dir.path().join("b.bin"), false).unwrap();
        for i in 0..64 {
            idx.insert(&Value::Int(i), i as u32 + 1, &mut no_lookup).unwrap();
        }
        for i in 0..64 {
            let found = idx.search_exact(&Value::Int(i), &mut no_lookup).unwrap();
            assert_eq!(found, vec![i as u32 + 1]);
        }
    }
}
