//! FIFO/deque queue: the list layout with a restricted, deque-shaped
//! surface. §4.3: "priority is collapsed to zero=front at the caller
//! layer" — this crate has no priority concept at all, so the surface is
//! simply `offer`/`poll` plus the deque endpoints, layered directly over
//! [`PersistentList`].

use crate::error::Result;
use crate::list::PersistentList;

pub struct PersistentQueue {
    list: PersistentList,
}

impl PersistentQueue {
    pub fn create_or_open(
        path: impl AsRef<std::path::Path>,
        initial_size_bytes: u64,
        create_new: bool,
    ) -> Result<Self> {
        Ok(PersistentQueue {
            list: PersistentList::create_or_open(path, initial_size_bytes, create_new)?,
        })
    }

    pub fn offer(&self, payload: &[u8], ttl_secs: i64) -> Result<()> {
        self.list.add(payload, ttl_secs)
    }

    pub fn offer_first(&self, payload: &[u8], ttl_secs: i64) -> Result<()> {
        self.list.add_first(payload, ttl_secs)
    }

    pub fn poll(&self) -> Option<Vec<u8>> {
        self.list.remove_first()
    }

    pub fn poll_last(&self) -> Option<Vec<u8>> {
        self.list.remove_last()
    }

    pub fn peek(&self) -> Option<Vec<u8>> {
        self.list.get_first()
    }

    pub fn peek_last(&self) -> Option<Vec<u8>> {
        self.list.get_last()
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
    fn deque_scenario_matches_literal() {
        let tmp = tempfile::tempdir().unwrap();
        let q = PersistentQueue::create_or_open(tmp.path().join("q.bin"), 1 << 20, true).unwrap();

        q.offer_first(b"middle", -1).unwrap();
        q.offer_first(b"first", -1).unwrap();
        q.offer(b"last", -1).unwrap();

        assert_eq!(q.poll().unwrap(), b"first");
        assert_eq!(q.poll_last().unwrap(), b"last");
        assert_eq!(q.poll().unwrap(), b"middle");
        assert_eq!(q.poll(), None);
    }

    #[test]
    fn peek_does_not_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let q = PersistentQueue::create_or_open(tmp.path().join("q.bin"), 1 << 20, true).unwrap();
        q.offer(b"a", -1).unwrap();
        assert_eq!(q.peek().unwrap(), b"a");
        assert_eq!(q.size(), 1);
    }
}
