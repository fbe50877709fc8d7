//! # Keyspace
//!
//! The mapping from keys to value records with optional expiry, shared by
//! every connection.
//!
//! A plain `create`/`read`/`update`/`delete` abstraction over a
//! `HashMap<String, String>` doesn't generalize to entries that carry a
//! deadline and to the conditional (`NX`/`XX`/`KEEPTTL`) semantics `SET`
//! needs, so this module exposes a dedicated [`Keyspace`] type with
//! exactly the operations the command engine needs.
//!
//! Eviction is lazy only: an expired entry is removed the moment a read or
//! delete path observes it, never by a background sweep. There is no
//! active/background expiry thread in this system — that's an explicitly
//! out-of-scope feature, not an oversight.

use crate::expiry::Deadline;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;

/// A single stored entry: an opaque byte string and an optional absolute
/// expiry deadline.
#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expiry: Option<Deadline>,
}

impl Entry {
    fn is_expired(&self, now_ms: Deadline) -> bool {
        matches!(self.expiry, Some(deadline) if now_ms >= deadline)
    }
}

/// The shared, mutex-guarded in-memory keyspace.
///
/// A single `std::sync::Mutex` (not `tokio::sync::Mutex`) guards the whole
/// map: every operation here is pure CPU and never suspends, so there is
/// never an `.await` held across the lock, and the synchronous mutex is
/// both simpler and cheaper than an async one.
#[derive(Debug, Default)]
pub struct Keyspace {
    inner: Mutex<HashMap<Bytes, Entry>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Unconditional write. Clears any previous expiry unless `expiry` is
    /// `Some`.
    pub fn set(&self, key: Bytes, value: Bytes, expiry: Option<Deadline>) {
        let mut map = self.inner.lock().expect("keyspace mutex poisoned");
        map.insert(key, Entry { value, expiry });
    }

    /// Writes only if `key` is absent or expired. Returns `true` iff written.
    pub fn set_if_absent(&self, key: Bytes, value: Bytes, expiry: Option<Deadline>) -> bool {
        let now = crate::expiry::now_ms();
        let mut map = self.inner.lock().expect("keyspace mutex poisoned");
        if let Some(existing) = map.get(&key) {
            if !existing.is_expired(now) {
                return false;
            }
        }
        map.insert(key, Entry { value, expiry });
        true
    }

    /// Writes only if `key` is present and unexpired. Returns `true` iff written.
    pub fn set_if_present(&self, key: Bytes, value: Bytes, expiry: Option<Deadline>) -> bool {
        let now = crate::expiry::now_ms();
        let mut map = self.inner.lock().expect("keyspace mutex poisoned");
        match map.get(&key) {
            Some(existing) if !existing.is_expired(now) => {
                map.insert(key, Entry { value, expiry });
                true
            }
            Some(_) => {
                map.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Reads a key's value, evicting it first if its deadline has passed.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = crate::expiry::now_ms();
        let mut map = self.inner.lock().expect("keyspace mutex poisoned");
        match map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Reads a key's expiry deadline (used by `KEEPTTL`), evicting it
    /// first if already expired.
    pub fn get_expiry(&self, key: &[u8]) -> Option<Deadline> {
        let now = crate::expiry::now_ms();
        let mut map = self.inner.lock().expect("keyspace mutex poisoned");
        match map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(key);
                None
            }
            Some(entry) => entry.expiry,
            None => None,
        }
    }

    /// Deletes each of `keys`, returning the count that were present and
    /// unexpired at the time of the call. Expired-but-still-mapped entries
    /// are evicted and not counted.
    pub fn delete(&self, keys: &[Bytes]) -> u64 {
        let now = crate::expiry::now_ms();
        let mut map = self.inner.lock().expect("keyspace mutex poisoned");
        let mut count = 0u64;
        for key in keys {
            match map.remove(key) {
                Some(entry) if !entry.is_expired(now) => count += 1,
                _ => {}
            }
        }
        count
    }

    /// Runs the full `SET` option matrix atomically under a single lock
    /// acquisition, so a concurrent command can never observe a torn
    /// check-then-write. See [`crate::command`] for the option semantics.
    pub fn execute_set(&self, key: Bytes, value: Bytes, opts: &SetPlan) -> SetOutcome {
        let now = crate::expiry::now_ms();
        let mut map = self.inner.lock().expect("keyspace mutex poisoned");

        let existing = map.get(&key).filter(|e| !e.is_expired(now));
        let old_value = existing.map(|e| e.value.clone());
        let present = existing.is_some();

        if opts.nx && present {
            return SetOutcome::no_op(old_value, opts.get);
        }
        if opts.xx && !present {
            return SetOutcome::no_op(old_value, opts.get);
        }
        if opts.keepttl && !present {
            return SetOutcome::no_op(old_value, opts.get);
        }

        let expiry = if opts.keepttl {
            existing.and_then(|e| e.expiry)
        } else {
            opts.expire.map(|e| e.resolve(now))
        };

        map.insert(key, Entry { value, expiry });
        SetOutcome::wrote(old_value, opts.get)
    }
}

/// The fully-validated option set for one `SET` invocation, as parsed by
/// [`crate::command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SetPlan {
    pub nx: bool,
    pub xx: bool,
    pub keepttl: bool,
    pub get: bool,
    pub expire: Option<crate::expiry::ExpireOption>,
}

/// What `execute_set` did, and what the caller should reply with.
pub struct SetOutcome {
    pub wrote: bool,
    pub old_value: Option<Bytes>,
    pub reply_get: bool,
}

impl SetOutcome {
    fn no_op(old_value: Option<Bytes>, reply_get: bool) -> Self {
        Self {
            wrote: false,
            old_value,
            reply_get,
        }
    }

    fn wrote(old_value: Option<Bytes>, reply_get: bool) -> Self {
        Self {
            wrote: true,
            old_value,
            reply_get,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let ks = Keyspace::new();
        ks.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), None);
        assert_eq!(ks.get(b"k"), Some(Bytes::from_static(b"v")));
    }

    #[test]
    fn get_on_missing_key_is_none() {
        let ks = Keyspace::new();
        assert_eq!(ks.get(b"absent"), None);
    }

    #[test]
    fn expired_key_reads_as_absent_and_is_evicted() {
        let ks = Keyspace::new();
        ks.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), Some(1));
        assert_eq!(ks.get(b"k"), None);
        assert_eq!(ks.get_expiry(b"k"), None);
    }

    #[test]
    fn set_if_absent_respects_existing_unexpired_key() {
        let ks = Keyspace::new();
        ks.set(Bytes::from_static(b"k"), Bytes::from_static(b"v1"), None);
        assert!(!ks.set_if_absent(Bytes::from_static(b"k"), Bytes::from_static(b"v2"), None));
        assert_eq!(ks.get(b"k"), Some(Bytes::from_static(b"v1")));
    }

    #[test]
    fn set_if_absent_writes_when_expired() {
        let ks = Keyspace::new();
        ks.set(Bytes::from_static(b"k"), Bytes::from_static(b"v1"), Some(1));
        assert!(ks.set_if_absent(Bytes::from_static(b"k"), Bytes::from_static(b"v2"), None));
        assert_eq!(ks.get(b"k"), Some(Bytes::from_static(b"v2")));
    }

    #[test]
    fn set_if_present_respects_absence() {
        let ks = Keyspace::new();
        assert!(!ks.set_if_present(Bytes::from_static(b"k"), Bytes::from_static(b"v"), None));
        assert_eq!(ks.get(b"k"), None);
    }

    #[test]
    fn delete_counts_only_present_unexpired_keys() {
        let ks = Keyspace::new();
        ks.set(Bytes::from_static(b"a"), Bytes::from_static(b"1"), None);
        ks.set(Bytes::from_static(b"b"), Bytes::from_static(b"1"), Some(1));
        let count = ks.delete(&[
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
            Bytes::from_static(b"c"),
        ]);
        assert_eq!(count, 1);
        assert_eq!(ks.get(b"a"), None);
    }

    #[test]
    fn keepttl_preserves_expiry_exactly() {
        let ks = Keyspace::new();
        let far_future = crate::expiry::now_ms() + 60_000;
        ks.set(
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v1"),
            Some(far_future),
        );
        let plan = SetPlan {
            keepttl: true,
            ..Default::default()
        };
        let outcome = ks.execute_set(Bytes::from_static(b"k"), Bytes::from_static(b"v2"), &plan);
        assert!(outcome.wrote);
        assert_eq!(ks.get_expiry(b"k"), Some(far_future));
        assert_eq!(ks.get(b"k"), Some(Bytes::from_static(b"v2")));
    }
}
