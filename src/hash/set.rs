//! A persistent set of opaque byte elements backed by [`HashEngine`].

use crate::error::Result;
use crate::hash_util::hash32;
use crate::segment::Offset;

use super::HashEngine;

const DEFAULT_BUCKET_COUNT: u32 = 1024;

pub struct PersistentSet {
    engine: HashEngine,
}

impl PersistentSet {
    pub fn create_or_open(
        path: impl AsRef<std::path::Path>,
        initial_size_bytes: u64,
        create_new: bool,
    ) -> Result<Self> {
        Ok(PersistentSet {
            engine: HashEngine::create_or_open(
                path,
                initial_size_bytes,
                create_new,
                DEFAULT_BUCKET_COUNT,
                "set_header",
                "set_buckets",
            )?,
        })
    }

    /// Add `element`, reviving an expired slot in place if one with the
    /// same bytes is found (§4.4's add algorithm). Returns `true` if the
    /// element is newly present (added or revived), `false` if it was
    /// already live.
    pub fn add(&self, element: &[u8], ttl_secs: i64) -> Result<bool> {
        let hash_code = hash32(element);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);

        self.engine.record_write();
        if let Some(offset) = self
            .engine
            .find_in_bucket(bucket, hash_code, |payload| payload == element)
        {
            if self.engine.node_is_alive(offset) {
                return Ok(false);
            }
            self.engine
                .node_revive_with_payload(offset, hash_code, element, ttl_secs);
            return Ok(true);
        }

        let offset = self.engine.alloc_node(hash_code, element, ttl_secs)?;
        self.engine.link_bucket_head(bucket, offset);
        Ok(true)
    }

    pub fn remove(&self, element: &[u8]) -> bool {
        let hash_code = hash32(element);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);

        let removed = match self
            .engine
            .find_in_bucket(bucket, hash_code, |payload| payload == element)
        {
            Some(offset) if self.engine.node_is_alive(offset) => {
                self.engine.remove_node(bucket, offset);
                true
            }
            _ => false,
        };
        self.engine.record_write();
        removed
    }

    pub fn contains(&self, element: &[u8]) -> bool {
        let hash_code = hash32(element);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);

        let hit = matches!(
            self.engine.find_in_bucket(bucket, hash_code, |payload| payload == element),
            Some(offset) if self.engine.node_is_alive(offset)
        );
        self.engine.record_read(hit);
        hit
    }

    /// Remaining TTL in whole seconds, `-1` if never-expiring, `None` if
    /// absent.
    pub fn get_ttl(&self, element: &[u8]) -> Option<i64> {
        let hash_code = hash32(element);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);

        let offset = self.find_live(bucket, hash_code, element)?;
        Some(self.engine.node_remaining_ttl(offset))
    }

    pub fn set_ttl(&self, element: &[u8], ttl_secs: i64) -> bool {
        let hash_code = hash32(element);
        let idx = self.engine.bucket_index(hash_code);
        let bucket = self.engine.bucket(idx);
        let _guard = self.engine.lock_bucket(idx);

        match self.find_live(bucket, hash_code, element) {
            Some(offset) => {
                self.engine.node_set_ttl(offset, ttl_secs);
                true
            }
            None => false,
        }
    }

    fn find_live(&self, bucket: &super::Bucket, hash_code: u32, element: &[u8]) -> Option<Offset> {
        match self
            .engine
            .find_in_bucket(bucket, hash_code, |payload| payload == element)
        {
            Some(offset) if self.engine.node_is_alive(offset) => Some(offset),
            _ => None,
        }
    }

    pub fn add_all(&self, elements: &[&[u8]], ttl_secs: i64) -> Result<usize> {
        let mut added = 0;
        for element in elements {
            if self.add(element, ttl_secs)? {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn remove_all(&self, elements: &[&[u8]]) -> usize {
        elements.iter().filter(|e| self.remove(e)).count()
    }

    /// Apply `predicate` to every live element, removing those for which
    /// it returns `false`. The predicate runs with the owning bucket's
    /// mutex held — it must not call back into this set.
    pub fn retain_if(&self, predicate: impl FnMut(&[u8]) -> bool) -> usize {
        self.engine.retain_if(predicate)
    }

    pub fn remove_expired(&self) -> usize {
        self.engine.remove_expired()
    }

    pub fn for_each(&self, cb: impl FnMut(&[u8]) -> bool) {
        self.engine.for_each(cb)
    }

    pub fn for_each_with_ttl(&self, cb: impl FnMut(&[u8], i64) -> bool) {
        self.engine.for_each_with_ttl(cb)
    }

    pub fn to_array(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.engine.for_each(|payload| {
            out.push(payload.to_vec());
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

    #[test]
    fn add_contains_remove_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let set = PersistentSet::create_or_open(tmp.path().join("s.bin"), 1 << 20, true).unwrap();

        assert!(set.add(b"alpha", -1).unwrap());
        assert!(!set.add(b"alpha", -1).unwrap());
        assert!(set.contains(b"alpha"));
        assert!(!set.contains(b"beta"));

        assert!(set.remove(b"alpha"));
        assert!(!set.contains(b"alpha"));
        assert!(!set.remove(b"alpha"));
    }

    #[test]
    fn ttl_expiry_makes_element_invisible_then_reclaimable() {
        let tmp = tempfile::tempdir().unwrap();
        let set = PersistentSet::create_or_open(tmp.path().join("s.bin"), 1 << 20, true).unwrap();

        set.add(b"temp", 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(!set.contains(b"temp"));
        assert_eq!(set.size(), 0);

        let removed = set.remove_expired();
        assert_eq!(removed, 1);
    }

    #[test]
    fn add_revives_expired_slot_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let set = PersistentSet::create_or_open(tmp.path().join("s.bin"), 1 << 20, true).unwrap();

        set.add(b"x", 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(!set.contains(b"x"));

        assert!(set.add(b"x", -1).unwrap());
        assert!(set.contains(b"x"));
        assert_eq!(set.size(), 1);
    }

    #[test]
    fn reopen_round_trips_live_elements() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.bin");
        {
            let set = PersistentSet::create_or_open(&path, 1 << 20, true).unwrap();
            set.add(b"a", -1).unwrap();
            set.add(b"b", -1).unwrap();
            set.flush().unwrap();
        }
        let set = PersistentSet::create_or_open(&path, 1 << 20, false).unwrap();
        assert!(set.contains(b"a"));
        assert!(set.contains(b"b"));
        assert_eq!(set.size(), 2);
    }
}
