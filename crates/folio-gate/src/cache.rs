//! Bounded caches for ACL lookup, parsing and evaluation.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::acl::AccessControlList;
use crate::rights::Right;

pub const LOOKUP_CAPACITY: usize = 200;
pub const PARSE_CAPACITY: usize = 100;
pub const EVAL_CAPACITY: usize = 300;

/// Raw ACL alternatives of one item; `None` stands for the namespace default.
pub type AclAlternatives = Arc<Vec<Option<String>>>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct EvalKey {
    acl: String,
    default: String,
    user: String,
    right: Right,
}

/// Caches owned by one protecting context.
///
/// Parse and eval entries are keyed by ACL text and never go stale. Lookup
/// entries depend on stored items and are dropped by [`clear_lookup`](Self::clear_lookup)
/// after every write.
pub struct AclCache {
    lookup: Mutex<LruCache<String, AclAlternatives>>,
    parse: Mutex<LruCache<(String, String), Arc<AccessControlList>>>,
    eval: Mutex<LruCache<EvalKey, Option<bool>>>,
}

const fn capacity(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => panic!("cache capacity must be non-zero"),
    }
}

impl AclCache {
    pub fn new() -> Self {
        Self {
            lookup: Mutex::new(LruCache::new(capacity(LOOKUP_CAPACITY))),
            parse: Mutex::new(LruCache::new(capacity(PARSE_CAPACITY))),
            eval: Mutex::new(LruCache::new(capacity(EVAL_CAPACITY))),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<AclAlternatives> {
        self.lookup.lock().get(key).cloned()
    }

    pub fn store_lookup(&self, key: String, alternatives: AclAlternatives) {
        self.lookup.lock().put(key, alternatives);
    }

    pub fn clear_lookup(&self) {
        self.lookup.lock().clear();
    }

    /// Parsed form of `acl` with `Default` expanded to `default`.
    pub fn parsed(&self, acl: &str, default: &str) -> Arc<AccessControlList> {
        let key = (acl.to_string(), default.to_string());
        let mut parse = self.parse.lock();
        if let Some(parsed) = parse.get(&key) {
            return Arc::clone(parsed);
        }
        let parsed = Arc::new(AccessControlList::parse(acl, default));
        parse.put(key, Arc::clone(&parsed));
        parsed
    }

    /// Verdict of `acl` for `user` and `right`, computing it on a miss.
    pub fn verdict(
        &self,
        acl: &str,
        default: &str,
        user: &str,
        right: Right,
        compute: impl FnOnce() -> Option<bool>,
    ) -> Option<bool> {
        let key = EvalKey {
            acl: acl.to_string(),
            default: default.to_string(),
            user: user.to_string(),
            right,
        };
        if let Some(verdict) = self.eval.lock().get(&key) {
            return *verdict;
        }
        let verdict = compute();
        self.eval.lock().put(key, verdict);
        verdict
    }

    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.lookup.lock().len(), self.parse.lock().len(), self.eval.lock().len())
    }
}

impl Default for AclCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AclCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (lookup, parse, eval) = self.sizes();
        f.debug_struct("AclCache")
            .field("lookup", &lookup)
            .field("parse", &parse)
            .field("eval", &eval)
            .finish()
    }
}
