//! A persistent key/value map backed by [`HashEngine`].
//!
//! Payloads are encoded as `[key_len: u32 little-endian][key bytes][value
//! bytes]`; the hash code and bucket-chain equality checks only ever look
//! at the key prefix, so two entries with the same key and different
//! values are never mistaken for distinct elements the way a plain Set
//! would treat them.

use crate::error::Result;
use crate::hash_util::hash32;
use crate::segment::Offset;

use super::{Bucket, HashEngine};

const DEFAULT_BUCKET_COUNT: u32 = 1024;
const KEY_LEN_PREFIX: usize = 4;

fn encode(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(KEY_LEN_PREFIX + key.len() + value.len());
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    out
}

fn split(payload: &[u8]) -> (&[u8], &[u8]) {
    let key_len = u32::from_le_bytes(payload[..KEY_LEN_PREFIX].try_into().unwrap()) as usize;
    let rest = &payload[KEY_LEN_PREFIX..];
    rest.split_at(key_len)
}

fn key_of(payload: &[u8]) -> &[u8] {
    split(payload).0
}

fn value_of(payload: &[u8]) -> &[u8] {
    split(payload).1
}

pub struct PersistentMap {
    engine: HashEngine,
}

impl PersistentMap {
    pub fn create_or_open(
        path: impl AsRef<std::path::Path>,
        initial_size_bytes: u64,
        create_new: bool,
    ) -> Result<Self> {
        Ok(PersistentMap {
            engine: HashEngine::create_or_open(
                path,
                initial_size_bytes,
                create_new,
                DEFAULT_BUCKET_COUNT,
                "map_header",
                "map_buckets",
            )?,
        })
    }

    fn find_live(&self, bucket: &Bucket, hash_code: u32, key: &[u8]) -> Option<Offset> {
        match self
            .engine
            .find_in_bucket(bucket, hash_code, |payload| key_of(payload) == key)
        {
            Some(offset) if self.engine.node_is_alive(offset) => Some(offset),
            _ => None,
        }
    }

    fn find_any(&self, bucket: &Bucket, hash_code: u32, key: &[u8]) -> Option<Offset> {
        self.engine
            .find_in_bucket(bucket, hash_code, |payload| key_of(payload) == key)
    }

    /// Insert or overwrite `key`'s value. Returns the previous live value,
    /// if any — matching the conventional `Map::put` shape the Open
    /// Question deferred to implementers.
    pub fn put(&self, key: &[u8], value: &[u8], ttl_secs: i64) -> Result<Option<Vec<u8>>> {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);
        let payload = encode(key, value);
        self.engine.record_write();

        match self.find_any(bucket, hash_code, key) {
            Some(offset) if self.engine.node_is_alive(offset) => {
                let previous = value_of(self.engine.node_payload(offset)).to_vec();
                self.engine
                    .node_overwrite(bucket, offset, hash_code, &payload, ttl_secs)?;
                Ok(Some(previous))
            }
            Some(offset) => {
                self.engine
                    .node_revive_with_payload(offset, hash_code, &payload, ttl_secs);
                Ok(None)
            }
            None => {
                let offset = self.engine.alloc_node(hash_code, &payload, ttl_secs)?;
                self.engine.link_bucket_head(bucket, offset);
                Ok(None)
            }
        }
    }

    /// Insert only if `key` is not currently live. Returns `true` if the
    /// entry was inserted (or an expired slot revived), `false` if `key`
    /// already had a live value.
    pub fn put_if_absent(&self, key: &[u8], value: &[u8], ttl_secs: i64) -> Result<bool> {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);
        let payload = encode(key, value);

        match self.find_any(bucket, hash_code, key) {
            Some(offset) if self.engine.node_is_alive(offset) => Ok(false),
            Some(offset) => {
                self.engine
                    .node_revive_with_payload(offset, hash_code, &payload, ttl_secs);
                Ok(true)
            }
            None => {
                let offset = self.engine.alloc_node(hash_code, &payload, ttl_secs)?;
                self.engine.link_bucket_head(bucket, offset);
                Ok(true)
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);
        let value = self
            .find_live(bucket, hash_code, key)
            .map(|offset| value_of(self.engine.node_payload(offset)).to_vec());
        self.engine.record_read(value.is_some());
        value
    }

    pub fn get_or_default(&self, key: &[u8], default: &[u8]) -> Vec<u8> {
        self.get(key).unwrap_or_else(|| default.to_vec())
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);
        self.find_live(bucket, hash_code, key).is_some()
    }

    /// Remove `key`, returning its value if it was live.
    pub fn remove(&self, key: &[u8]) -> Option<Vec<u8>> {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);

        let offset = self.find_live(bucket, hash_code, key)?;
        let value = value_of(self.engine.node_payload(offset)).to_vec();
        self.engine.remove_node(bucket, offset);
        self.engine.record_write();
        Some(value)
    }

    /// Overwrite `key`'s value only if it is currently live. Returns the
    /// previous value, or `None` if `key` was absent — the map never gains
    /// an entry as a side effect of `replace`.
    pub fn replace(&self, key: &[u8], value: &[u8], ttl_secs: i64) -> Result<Option<Vec<u8>>> {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);

        match self.find_live(bucket, hash_code, key) {
            Some(offset) => {
                let previous = value_of(self.engine.node_payload(offset)).to_vec();
                let payload = encode(key, value);
                self.engine
                    .node_overwrite(bucket, offset, hash_code, &payload, ttl_secs)?;
                Ok(Some(previous))
            }
            None => Ok(None),
        }
    }

    pub fn get_ttl(&self, key: &[u8]) -> Option<i64> {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);
        self.find_live(bucket, hash_code, key)
            .map(|offset| self.engine.node_remaining_ttl(offset))
    }

    pub fn set_ttl(&self, key: &[u8], ttl_secs: i64) -> bool {
        let hash_code = hash32(key);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);
        match self.find_live(bucket, hash_code, key) {
            Some(offset) => {
                self.engine.node_set_ttl(offset, ttl_secs);
                true
            }
            None => false,
        }
    }

    pub fn remove_expired(&self) -> usize {
        self.engine.remove_expired()
    }

    /// Apply `predicate` to every live `(key, value)` pair, removing those
    /// for which it returns `false`. Runs with the owning bucket's mutex
    /// held, same caveat as [`crate::hash::set::PersistentSet::retain_if`].
    pub fn retain_if(&self, mut predicate: impl FnMut(&[u8], &[u8]) -> bool) -> usize {
        self.engine
            .retain_if(|payload| predicate(key_of(payload), value_of(payload)))
    }

    pub fn for_each(&self, mut cb: impl FnMut(&[u8], &[u8]) -> bool) {
        self.engine
            .for_each(|payload| cb(key_of(payload), value_of(payload)))
    }

    pub fn for_each_with_ttl(&self, mut cb: impl FnMut(&[u8], &[u8], i64) -> bool) {
        self.engine
            .for_each_with_ttl(|payload, ttl| cb(key_of(payload), value_of(payload), ttl))
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.for_each(|k, _v| {
            out.push(k.to_vec());
            true
        });
        out
    }

    pub fn clear(&self) {
        self.engine.clear()
    }

    pub fn size(&self) -> usize {
        self.engine.size()
    }

    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.engine.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn put_get_remove_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let m = PersistentMap::create_or_open(tmp.path().join("m.bin"), 1 << 20, true).unwrap();

        assert_eq!(m.put(b"name", b"fastcollection", -1).unwrap(), None);
        assert_eq!(m.get(b"name").unwrap(), b"fastcollection");
        assert_eq!(
            m.put(b"name", b"renamed", -1).unwrap().unwrap(),
            b"fastcollection"
        );
        assert_eq!(m.get(b"name").unwrap(), b"renamed");

        assert_eq!(m.remove(b"name").unwrap(), b"renamed");
        assert_eq!(m.get(b"name"), None);
    }

    #[test]
    fn map_ttl_scenario_matches_literal() {
        let tmp = tempfile::tempdir().unwrap();
        let m = PersistentMap::create_or_open(tmp.path().join("m.bin"), 1 << 20, true).unwrap();

        m.put(b"temp", b"value", 1).unwrap();
        assert_eq!(m.size(), 1);
        sleep(Duration::from_millis(1100));
        assert_eq!(m.size(), 0);
        assert_eq!(m.get(b"temp"), None);
    }

    #[test]
    fn mixed_ttl_cache_scenario_matches_literal() {
        let tmp = tempfile::tempdir().unwrap();
        let m = PersistentMap::create_or_open(tmp.path().join("m.bin"), 1 << 20, true).unwrap();

        m.put(b"short", b"1", 10).unwrap();
        m.put(b"long", b"2", 30).unwrap();
        m.put(b"forever", b"3", -1).unwrap();

        assert_eq!(m.size(), 3);
        assert!(m.get(b"short").is_some());
        assert!(m.get(b"long").is_some());
        assert!(m.get(b"forever").is_some());
    }

    #[test]
    fn put_if_absent_and_replace_never_insert() {
        let tmp = tempfile::tempdir().unwrap();
        let m = PersistentMap::create_or_open(tmp.path().join("m.bin"), 1 << 20, true).unwrap();

        assert!(m.put_if_absent(b"k", b"v1", -1).unwrap());
        assert!(!m.put_if_absent(b"k", b"v2", -1).unwrap());
        assert_eq!(m.get(b"k").unwrap(), b"v1");

        assert_eq!(m.replace(b"missing", b"v", -1).unwrap(), None);
        assert!(!m.contains_key(b"missing"));

        assert_eq!(m.replace(b"k", b"v3", -1).unwrap().unwrap(), b"v1");
        assert_eq!(m.get(b"k").unwrap(), b"v3");
    }

    #[test]
    fn reopen_round_trips_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("m.bin");
        {
            let m = PersistentMap::create_or_open(&path, 1 << 20, true).unwrap();
            m.put(b"a", b"1", -1).unwrap();
            m.put(b"b", b"2", -1).unwrap();
            m.flush().unwrap();
        }
        let m = PersistentMap::create_or_open(&path, 1 << 20, false).unwrap();
        assert_eq!(m.get(b"a").unwrap(), b"1");
        assert_eq!(m.get(b"b").unwrap(), b"2");
    }
}
