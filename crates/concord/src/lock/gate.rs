use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// In-process mutexes, one per store key, that queue local contenders in
/// pessimistic mode.
///
/// A gate lives as long as someone holds or waits on it; the map only keeps
/// weak references and drops an entry when its last user leaves.
#[derive(Debug, Default)]
pub(crate) struct Gates {
    map: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

/// Exclusive passage through the gate of one key. Leaves it on drop.
pub(crate) struct GatePass<'a> {
    gates: &'a Gates,
    key: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Gates {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits for the gate of `key`, giving up at `deadline` if one is set.
    pub(crate) fn enter(&self, key: &str, deadline: Option<Instant>) -> Option<GatePass<'_>> {
        let gate = self.checkout(key);
        let guard = match deadline {
            None => Some(gate.lock_arc()),
            Some(deadline) => gate.try_lock_arc_until(deadline),
        };
        drop(gate);

        match guard {
            Some(guard) => Some(GatePass {
                gates: self,
                key: key.to_owned(),
                guard: Some(guard),
            }),
            None => {
                self.prune(key);
                None
            }
        }
    }

    /// Number of keys with a live gate.
    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }

    fn checkout(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.map.lock();
        if let Some(gate) = map.get(key).and_then(Weak::upgrade) {
            return gate;
        }
        let gate = Arc::new(Mutex::new(()));
        map.insert(key.to_owned(), Arc::downgrade(&gate));
        gate
    }

    fn prune(&self, key: &str) {
        let mut map = self.map.lock();
        if map.get(key).is_some_and(|gate| gate.strong_count() == 0) {
            map.remove(key);
        }
    }
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        // Unlock and release our reference before checking for other users.
        drop(self.guard.take());
        self.gates.prune(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_key_is_exclusive() {
        let gates = Gates::new();
        let pass = gates.enter("a", None).unwrap();
        let soon = Instant::now() + Duration::from_millis(50);
        assert!(gates.enter("a", Some(soon)).is_none());
        drop(pass);
        assert!(gates.enter("a", Some(Instant::now())).is_some());
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let gates = Gates::new();
        let _a = gates.enter("a", None).unwrap();
        assert!(gates.enter("b", Some(Instant::now())).is_some());
    }

    #[test]
    fn entries_are_pruned_when_unused() {
        let gates = Gates::new();
        for i in 0..100 {
            let _pass = gates.enter(&format!("key-{i}"), None).unwrap();
        }
        assert_eq!(gates.len(), 0);

        let held = gates.enter("held", None).unwrap();
        assert!(gates.enter("held", Some(Instant::now())).is_none());
        assert_eq!(gates.len(), 1);
        drop(held);
        assert_eq!(gates.len(), 0);
    }

    #[test]
    fn waiter_inherits_the_gate() {
        let gates = Gates::new();
        let first = gates.enter("k", None).unwrap();
        thread::scope(|s| {
            let waiter = s.spawn(|| gates.enter("k", None).is_some());
            thread::sleep(Duration::from_millis(20));
            drop(first);
            assert!(waiter.join().unwrap());
        });
        assert_eq!(gates.len(), 0);
    }
}
