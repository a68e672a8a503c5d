//! AVL index: a balanced BST persisted as an array of fixed-size node slots in a
//! file, with a free list reusing slots vacated by deletion.

use crate::error::{RelError, RelResult};
use crate::store::{pack_value, unpack_value};
use crate::value::{DataType, Value};
use std::cmp::Ordering;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const ROOT_HEADER_SIZE: u64 = 4;
const FREE_HEADER_SIZE: u64 = 4;
const HEADER_SIZE: u64 = ROOT_HEADER_SIZE + FREE_HEADER_SIZE;

struct AvlNode {
    key: Value,
    record_number: u32,
    left: i32,
    right: i32,
    height: i32,
}

/// Orders AVL keys: numbers and strings use their natural order, points use
/// distance-to-origin (spec.md §4.4) — distinct from the componentwise ordering
/// `Value`'s own `PartialOrd` uses for SQL `>`/`<`.
fn avl_cmp(a: &Value, b: &Value) -> RelResult<Ordering> {
    if let (Value::Point(pa), Value::Point(pb)) = (a, b) {
        return pa
            .partial_cmp(pb)
            .ok_or_else(|| RelError::Internal("incomparable points in AVL key".into()));
    }
    a.partial_cmp(b)
        .ok_or_else(|| RelError::Internal("incomparable values in AVL key".into()))
}

/// AVL index over one attribute of one table.
pub struct AvlIndex {
    file: File,
    key_type: DataType,
    key_width: usize,
    node_size: usize,
    is_key: bool,
    root: i32,
}

impl AvlIndex {
    pub fn open(path: impl AsRef<Path>, key_type: DataType, is_key: bool) -> RelResult<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        if is_new {
            file.write_all(&(-1i32).to_le_bytes())?; // root
            file.write_all(&(-1i32).to_le_bytes())?; // free list head
            file.flush()?;
        }
        let key_width = key_type.byte_width();
        let node_size = key_width + 4 + 4 + 4 + 4; // key, record_number, left, right, height
        let mut index = Self { file, key_type, key_width, node_size, is_key, root: -1 };
        index.root = index.read_i32(0)?;
        Ok(index)
    }

    fn read_i32(&mut self, offset: u64) -> RelResult<i32> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn write_i32(&mut self, offset: u64, value: i32) -> RelResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_header(&mut self, root: i32) -> RelResult<()> {
        self.write_i32(0, root)?;
        self.file.flush()?;
        Ok(())
    }

    fn read_free_head(&mut self) -> RelResult<i32> {
        self.read_i32(ROOT_HEADER_SIZE)
    }

    fn write_free_head(&mut self, head: i32) -> RelResult<()> {
        self.write_i32(ROOT_HEADER_SIZE, head)?;
        self.file.flush()?;
        Ok(())
    }

    fn slot_offset(&self, id: u32) -> u64 {
        HEADER_SIZE + (id as u64 - 1) * self.node_size as u64
    }

    fn slot_count(&mut self) -> RelResult<u32> {
        let len = self.file.metadata()?.len();
        Ok(((len - HEADER_SIZE) / self.node_size as u64) as u32)
    }

    fn read_node(&mut self, id: u32) -> RelResult<AvlNode> {
        let mut buf = vec![0u8; self.node_size];
        self.file.seek(SeekFrom::Start(self.slot_offset(id)))?;
        self.file.read_exact(&mut buf)?;
        let key = unpack_value(self.key_type, &buf[0..self.key_width])?;
        let mut off = self.key_width;
        let record_number = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let left = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let right = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let height = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Ok(AvlNode { key, record_number, left, right, height })
    }

    fn write_node(&mut self, id: u32, node: &AvlNode) -> RelResult<()> {
        let mut buf = Vec::with_capacity(self.node_size);
        pack_value(&mut buf, self.key_type, &node.key)?;
        buf.extend_from_slice(&node.record_number.to_le_bytes());
        buf.extend_from_slice(&node.left.to_le_bytes());
        buf.extend_from_slice(&node.right.to_le_bytes());
        buf.extend_from_slice(&node.height.to_le_bytes());
        self.file.seek(SeekFrom::Start(self.slot_offset(id)))?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        Ok(())
    }

    /// The next-free pointer of a freed slot, stored in the `left` field.
    fn read_next_free(&mut self, id: u32) -> RelResult<i32> {
        let off = self.slot_offset(id) + self.key_width as u64 + 4;
        self.file.seek(SeekFrom::Start(off))?;
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn free_node(&mut self, id: u32) -> RelResult<()> {
        let head = self.read_free_head()?;
        let off = self.slot_offset(id) + self.key_width as u64 + 4;
        self.file.seek(SeekFrom::Start(off))?;
        self.file.write_all(&head.to_le_bytes())?;
        self.file.flush()?;
        self.write_free_head(id as i32)?;
        Ok(())
    }

    fn allocate_node(&mut self, key: &Value, record_number: u32) -> RelResult<u32> {
        let node = AvlNode { key: key.clone(), record_number, left: -1, right: -1, height: 1 };
        let free_head = self.read_free_head()?;
        let id = if free_head != -1 {
            let id = free_head as u32;
            let next_free = self.read_next_free(id)?;
            self.write_free_head(next_free)?;
            id
        } else {
            self.slot_count()? + 1
        };
        self.write_node(id, &node)?;
        Ok(id)
    }

    fn height_of(&mut self, id: i32) -> RelResult<i32> {
        if id == -1 {
            Ok(0)
        } else {
            Ok(self.read_node(id as u32)?.height)
        }
    }

    fn balance_factor(&mut self, node: &AvlNode) -> RelResult<i32> {
        Ok(self.height_of(node.left)? - self.height_of(node.right)?)
    }

    fn update_height(&mut self, node: &mut AvlNode) -> RelResult<()> {
        node.height = 1 + self.height_of(node.left)?.max(self.height_of(node.right)?);
        Ok(())
    }

    fn rotate_right(&mut self, y_id: u32) -> RelResult<u32> {
        let mut y = self.read_node(y_id)?;
        let x_id = y.left as u32;
        let mut x = self.read_node(x_id)?;
        y.left = x.right;
        x.right = y_id as i32;
        self.update_height(&mut y)?;
        self.write_node(y_id, &y)?;
        self.update_height(&mut x)?;
        self.write_node(x_id, &x)?;
        Ok(x_id)
    }

    fn rotate_left(&mut self, x_id: u32) -> RelResult<u32> {
        let mut x = self.read_node(x_id)?;
        let y_id = x.right as u32;
        let mut y = self.read_node(y_id)?;
        x.right = y.left;
        y.left = x_id as i32;
        self.update_height(&mut x)?;
        self.write_node(x_id, &x)?;
        self.update_height(&mut y)?;
        self.write_node(y_id, &y)?;
        Ok(y_id)
    }

    /// Recomputes height, writes the node, and applies LL/RR/LR/RL rotations if
    /// its balance factor fell outside `{-1, 0, 1}`.
    fn balance(&mut self, node_id: u32) -> RelResult<u32> {
        let mut node = self.read_node(node_id)?;
        self.update_height(&mut node)?;
        self.write_node(node_id, &node)?;
        let bf = self.balance_factor(&node)?;

        if bf > 1 {
            let left = self.read_node(node.left as u32)?;
            if self.balance_factor(&left)? < 0 {
                let new_left = self.rotate_left(node.left as u32)?;
                node.left = new_left as i32;
                self.write_node(node_id, &node)?;
            }
            return self.rotate_right(node_id);
        }
        if bf < -1 {
            let right = self.read_node(node.right as u32)?;
            if self.balance_factor(&right)? > 0 {
                let new_right = self.rotate_right(node.right as u32)?;
                node.right = new_right as i32;
                self.write_node(node_id, &node)?;
            }
            return self.rotate_left(node_id);
        }
        Ok(node_id)
    }

    fn insert_rec(&mut self, node_id: i32, key: &Value, record_number: u32) -> RelResult<i32> {
        if node_id == -1 {
            return Ok(self.allocate_node(key, record_number)? as i32);
        }
        let mut node = self.read_node(node_id as u32)?;
        if avl_cmp(key, &node.key)? == Ordering::Less {
            node.left = self.insert_rec(node.left, key, record_number)?;
        } else {
            // Equal or greater: duplicates are placed consistently on the right.
            node.right = self.insert_rec(node.right, key, record_number)?;
        }
        self.write_node(node_id as u32, &node)?;
        Ok(self.balance(node_id as u32)? as i32)
    }

    /// Inserts `record_number` under `key`. Duplicate keys are allowed unless
    /// this index backs an `is_key` attribute.
    pub fn insert(&mut self, key: &Value, record_number: u32) -> RelResult<()> {
        if self.is_key && !self.search_exact(key)?.is_empty() {
            return Err(RelError::Schema(format!("duplicate key '{key}'")));
        }
        self.root = self.insert_rec(self.root, key, record_number)?;
        self.write_header(self.root)?;
        tracing::debug!(record_number, "avl insert");
        Ok(())
    }

    fn search_exact_rec(&mut self, node_id: i32, key: &Value, out: &mut Vec<u32>) -> RelResult<()> {
        if node_id == -1 {
            return Ok(());
        }
        let node = self.read_node(node_id as u32)?;
        match avl_cmp(key, &node.key)? {
            Ordering::Less => self.search_exact_rec(node.left, key, out),
            Ordering::Greater => self.search_exact_rec(node.right, key, out),
            Ordering::Equal => {
                out.push(node.record_number);
                self.search_exact_rec(node.right, key, out)
            }
        }
    }

    pub fn search_exact(&mut self, key: &Value) -> RelResult<Vec<u32>> {
        let mut out = Vec::new();
        self.search_exact_rec(self.root, key, &mut out)?;
        Ok(out)
    }

    fn range_rec(&mut self, node_id: i32, lo: &Value, hi: &Value, out: &mut Vec<u32>) -> RelResult<()> {
        if node_id == -1 {
            return Ok(());
        }
        let node = self.read_node(node_id as u32)?;
        if avl_cmp(&node.key, lo)? == Ordering::Greater {
            self.range_rec(node.left, lo, hi, out)?;
        }
        if avl_cmp(&node.key, lo)? != Ordering::Less && avl_cmp(&node.key, hi)? != Ordering::Greater {
            out.push(node.record_number);
        }
        if avl_cmp(&node.key, hi)? == Ordering::Less {
            self.range_rec(node.right, lo, hi, out)?;
        }
        Ok(())
    }

    /// For POINT keys, pruning by the tree's distance-to-origin order would not
    /// be sound for a componentwise rectangle, so every node is visited and
    /// tested against the rectangle directly.
    fn range_rec_point(&mut self, node_id: i32, lo: &Value, hi: &Value, out: &mut Vec<u32>) -> RelResult<()> {
        if node_id == -1 {
            return Ok(());
        }
        let node = self.read_node(node_id as u32)?;
        let p = node.key.as_point()?;
        if p.is_in_range(lo.as_point()?, hi.as_point()?) {
            out.push(node.record_number);
        }
        self.range_rec_point(node.left, lo, hi, out)?;
        self.range_rec_point(node.right, lo, hi, out)?;
        Ok(())
    }

    pub fn range_search(&mut self, lo: &Value, hi: &Value) -> RelResult<Vec<u32>> {
        let mut out = Vec::new();
        if self.key_type == DataType::Point {
            self.range_rec_point(self.root, lo, hi, &mut out)?;
        } else {
            self.range_rec(self.root, lo, hi, &mut out)?;
        }
        Ok(out)
    }

    fn remove_min(&mut self, node_id: i32) -> RelResult<(Value, u32, i32)> {
        let node = self.read_node(node_id as u32)?;
        if node.left == -1 {
            self.free_node(node_id as u32)?;
            return Ok((node.key, node.record_number, node.right));
        }
        let (k, rn, new_left) = self.remove_min(node.left)?;
        let mut node = node;
        node.left = new_left;
        self.write_node(node_id as u32, &node)?;
        Ok((k, rn, self.balance(node_id as u32)? as i32))
    }

    fn delete_rec(&mut self, node_id: i32, key: &Value, record_number: u32) -> RelResult<(i32, bool)> {
        if node_id == -1 {
            return Ok((-1, false));
        }
        let mut node = self.read_node(node_id as u32)?;
        match avl_cmp(key, &node.key)? {
            Ordering::Less => {
                let (new_left, found) = self.delete_rec(node.left, key, record_number)?;
                if !found {
                    return Ok((node_id, false));
                }
                node.left = new_left;
                self.write_node(node_id as u32, &node)?;
                Ok((self.balance(node_id as u32)? as i32, true))
            }
            Ordering::Greater => {
                let (new_right, found) = self.delete_rec(node.right, key, record_number)?;
                if !found {
                    return Ok((node_id, false));
                }
                node.right = new_right;
                self.write_node(node_id as u32, &node)?;
                Ok((self.balance(node_id as u32)? as i32, true))
            }
            Ordering::Equal => {
                if node.record_number == record_number {
                    if node.left == -1 && node.right == -1 {
                        self.free_node(node_id as u32)?;
                        return Ok((-1, true));
                    }
                    if node.left == -1 {
                        self.free_node(node_id as u32)?;
                        return Ok((node.right, true));
                    }
                    if node.right == -1 {
                        self.free_node(node_id as u32)?;
                        return Ok((node.left, true));
                    }
                    let (succ_key, succ_rn, new_right) = self.remove_min(node.right)?;
                    node.key = succ_key;
                    node.record_number = succ_rn;
                    node.right = new_right;
                    self.write_node(node_id as u32, &node)?;
                    return Ok((self.balance(node_id as u32)? as i32, true));
                }
                // Same key, different payload: duplicates live to the right.
                let (new_right, found) = self.delete_rec(node.right, key, record_number)?;
                if found {
                    node.right = new_right;
                    self.write_node(node_id as u32, &node)?;
                    return Ok((self.balance(node_id as u32)? as i32, true));
                }
                let (new_left, found) = self.delete_rec(node.left, key, record_number)?;
                if !found {
                    return Ok((node_id, false));
                }
                node.left = new_left;
                self.write_node(node_id as u32, &node)?;
                Ok((self.balance(node_id as u32)? as i32, true))
            }
        }
    }

    pub fn delete(&mut self, key: &Value, record_number: u32) -> RelResult<Option<u32>> {
        let (new_root, found) = self.delete_rec(self.root, key, record_number)?;
        if !found {
            return Ok(None);
        }
        self.root = new_root;
        self.write_header(self.root)?;
        tracing::debug!(record_number, "avl delete");
        Ok(Some(record_number))
    }

    /// In-order traversal of keys, used by property tests to check sortedness.
    pub fn in_order_keys(&mut self) -> RelResult<Vec<Value>> {
        let mut out = Vec::new();
        self.in_order_rec(self.root, &mut out)?;
        Ok(out)
    }

    fn in_order_rec(&mut self, node_id: i32, out: &mut Vec<Value>) -> RelResult<()> {
        if node_id == -1 {
            return Ok(());
        }
        let node = self.read_node(node_id as u32)?;
        self.in_order_rec(node.left, out)?;
        out.push(node.key.clone());
        self.in_order_rec(node.right, out)?;
        Ok(())
    }

    /// Balance factor of every node, used by property tests.
    pub fn balance_factors(&mut self) -> RelResult<Vec<i32>> {
        let mut out = Vec::new();
        self.collect_balance_factors(self.root, &mut out)?;
        Ok(out)
    }

    fn collect_balance_factors(&mut self, node_id: i32, out: &mut Vec<i32>) -> RelResult<()> {
        if node_id == -1 {
            return Ok(());
        }
        let node = self.read_node(node_id as u32)?;
        out.push(self.balance_factor(&node)?);
        self.collect_balance_factors(node.left, out)?;
        self.collect_balance_factors(node.right, out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn insert_search_and_ordering() {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Float, false).unwrap();
        for (v, rn) in [(3.0, 1u32), (7.0, 2), (11.0, 3), (13.5, 4)] {
            idx.insert(&Value::Float(v), rn).unwrap();
        }
        let keys = idx.in_order_keys().unwrap();
        let floats: Vec<f64> = keys.into_iter().map(|v| v.as_f64().unwrap()).collect();
        assert_eq!(floats, vec![3.0, 7.0, 11.0, 13.5]);
        for bf in idx.balance_factors().unwrap() {
            assert!((-1..=1).contains(&bf));
        }
    }

    #[test]
    fn range_search_matches_bounds() {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Float, false).unwrap();
        for (v, rn) in [(3.0, 1u32), (7.0, 2), (11.0, 3), (13.5, 4)] {
            idx.insert(&Value::Float(v), rn).unwrap();
        }
        let mut found = idx.range_search(&Value::Float(5.0), &Value::Float(12.0)).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![2, 3]);
    }

    #[test]
    fn duplicates_allowed_when_not_key() {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Int, false).unwrap();
        idx.insert(&Value::Int(5), 1).unwrap();
        idx.insert(&Value::Int(5), 2).unwrap();
        let mut found = idx.search_exact(&Value::Int(5)).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn duplicate_key_rejected_when_is_key() {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Int, true).unwrap();
        idx.insert(&Value::Int(5), 1).unwrap();
        assert!(idx.insert(&Value::Int(5), 2).is_err());
    }

    #[test]
    fn delete_removes_from_index_and_rebalances() {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Int, false).unwrap();
        for (v, rn) in [(5, 1u32), (3, 2), (8, 3), (1, 4), (4, 5)] {
            idx.insert(&Value::Int(v), rn).unwrap();
        }
        assert_eq!(idx.delete(&Value::Int(3), 2).unwrap(), Some(2));
        assert!(idx.search_exact(&Value::Int(3)).unwrap().is_empty());
        for bf in idx.balance_factors().unwrap() {
            assert!((-1..=1).contains(&bf));
        }
    }

    #[test]
    fn point_keys_order_by_distance_but_range_is_componentwise() {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Point, false).unwrap();
        idx.insert(&Value::Point(crate::point::Point::new(1.0, 1.0)), 1).unwrap();
        idx.insert(&Value::Point(crate::point::Point::new(10.0, 0.0)), 2).unwrap();
        idx.insert(&Value::Point(crate::point::Point::new(0.0, 2.0)), 3).unwrap();
        let found = idx
            .range_search(
                &Value::Point(crate::point::Point::new(0.0, 0.0)),
                &Value::Point(crate::point::Point::new(2.0, 2.0)),
            )
            .unwrap();
        let mut found = found;
        found.sort_unstable();
        assert_eq!(found, vec![1, 3]);
    }
}
