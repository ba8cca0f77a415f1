//! LIFO stack: the list layout with `push`/`pop`/`peek` plus a
//! top-relative [`PersistentStack::search`], layered over
//! [`PersistentList`] exactly the way `offer`/`poll` layer the queue.

use crate::error::Result;
use crate::list::PersistentList;

pub struct PersistentStack {
    list: PersistentList,
}

impl PersistentStack {
    pub fn create_or_open(
        path: impl AsRef<std::path::Path>,
        initial_size_bytes: u64,
        create_new: bool,
    ) -> Result<Self> {
        Ok(PersistentStack {
            list: PersistentList::create_or_open(path, initial_size_bytes, create_new)?,
        })
    }

    pub fn push(&self, payload: &[u8], ttl_secs: i64) -> Result<()> {
        self.list.add_first(payload, ttl_secs)
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.list.remove_first()
    }

    pub fn peek(&self) -> Option<Vec<u8>> {
        self.list.get_first()
    }

    /// 1-based position from the top, or `-1` if not found — the Stack
    /// surface's one addition over the shared List contract.
    pub fn search(&self, payload: &[u8]) -> i64 {
        match self.list.index_of(payload) {
            Some(idx) => idx as i64 + 1,
            None => -1,
        }
    }

    pub fn remove_expired(&self) -> usize {
        self.list.remove_expired()
    }

    pub fn clear(&self) {
        self.list.clear()
    }

    pub fn size(&self) -> usize {
        self.list.size()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn for_each(&self, cb: impl FnMut(&[u8]) -> bool) {
        self.list.for_each(cb)
    }

    pub fn for_each_with_ttl(&self, cb: impl FnMut(&[u8], i64) -> bool) {
        self.list.for_each_with_ttl(cb)
    }

    pub fn flush(&self) -> Result<()> {
        self.list.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_scenario_matches_literal() {
        let tmp = tempfile::tempdir().unwrap();
        let s = PersistentStack::create_or_open(tmp.path().join("s.bin"), 1 << 20, true).unwrap();
        s.push(b"a", -1).unwrap();
        s.push(b"b", -1).unwrap();
        s.push(b"c", -1).unwrap();

        assert_eq!(s.search(b"c"), 1);
        assert_eq!(s.search(b"b"), 2);
        assert_eq!(s.search(b"a"), 3);
        assert_eq!(s.search(b"x"), -1);
    }

    #[test]
    fn pop_is_lifo() {
        let tmp = tempfile::tempdir().unwrap();
        let s = PersistentStack::create_or_open(tmp.path().join("s.bin"), 1 << 20, true).unwrap();
        s.push(b"a", -1).unwrap();
        s.push(b"b", -1).unwrap();
        assert_eq!(s.pop().unwrap(), b"b");
        assert_eq!(s.pop().unwrap(), b"a");
        assert_eq!(s.pop(), None);
    }
}
