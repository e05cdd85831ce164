use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    InFlight,
    Acquired,
}

/// URLs handled in this run, shared by every worker. Claiming is a single
/// check-and-set under the lock.
#[derive(Debug, Default)]
pub struct DedupSet {
    urls: Mutex<HashMap<String, State>>,
}

pub enum Claim {
    Claimed(ClaimGuard),
    AlreadyAcquired,
    InFlight,
}

impl DedupSet {
    pub fn new() -> Arc<Self> {
        Arc::new(DedupSet::default())
    }

    /// Pre-seeds URLs already present in the persisted store.
    pub fn with_acquired<I: IntoIterator<Item = String>>(urls: I) -> Arc<Self> {
        let set = DedupSet::default();
        {
            let mut map = set.lock();
            for url in urls {
                map.insert(url, State::Acquired);
            }
        }
        Arc::new(set)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, State>> {
        // A poisoned map only ever holds complete entries.
        self.urls.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn try_claim(self: &Arc<Self>, url: &str) -> Claim {
        let mut map = self.lock();
        match map.get(url) {
            Some(State::Acquired) => Claim::AlreadyAcquired,
            Some(State::InFlight) => Claim::InFlight,
            None => {
                map.insert(url.to_string(), State::InFlight);
                Claim::Claimed(ClaimGuard {
                    set: Arc::clone(self),
                    url: url.to_string(),
                    committed: false,
                })
            }
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().get(url) == Some(&State::Acquired)
    }

    pub fn mark(&self, url: &str) {
        self.lock().insert(url.to_string(), State::Acquired);
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|s| **s == State::Acquired).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive right to acquire one URL. Dropping it without `commit` releases the URL.
pub struct ClaimGuard {
    set: Arc<DedupSet>,
    url: String,
    committed: bool,
}

impl ClaimGuard {
    pub fn commit(mut self) {
        self.set.mark(&self.url);
        self.committed = true;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.committed {
            let mut map = self.set.lock();
            if map.get(&self.url) == Some(&State::InFlight) {
                map.remove(&self.url);
            }
        }
    }
}
