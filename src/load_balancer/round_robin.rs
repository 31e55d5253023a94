//! Round-robin rotation over reachable backends.

use std::sync::Arc;
use crate::load_balancer::backend::Backend;

/// Round-robin selector.
/// Holds the rotation cursor; callers serialize access through the pool lock.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Scan at most `backends.len()` positions starting at the cursor and
    /// return the first reachable backend. The cursor moves to the slot after
    /// the returned backend; when nothing is reachable it stays put.
    pub fn next_server(&mut self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let len = backends.len();
        if len == 0 {
            self.cursor = 0;
            return None;
        }
        let start = self.cursor % len;

        for offset in 0..len {
            let index = (start + offset) % len;
            let backend = &backends[index];
            if backend.is_reachable() {
                self.cursor = (index + 1) % len;
                return Some(backend.clone());
            }
        }
        self.cursor = start;
        None
    }

    /// Move the cursor to `index` in a pool of `len` entries.
    pub fn point_at(&mut self, index: usize, len: usize) {
        self.cursor = if len == 0 { 0 } else { index % len };
    }

    /// Keep the cursor pointing at the same successor after the slot at
    /// `removed` disappeared from a pool that now has `new_len` entries.
    pub fn on_removed(&mut self, removed: usize, new_len: usize) {
        if removed < self.cursor {
            self.cursor -= 1;
        }
        if new_len == 0 {
            self.cursor = 0;
        } else {
            self.cursor %= new_len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::test_support::*;

    fn pool(n: usize) -> Vec<Arc<Backend>> {
        (0..n)
            .map(|i| backend(&format!("http://127.0.0.1:{}", 8080 + i), ScriptedForwarder::ok("")))
            .collect()
    }

    #[test]
    fn test_round_robin() {
        let mut lb = RoundRobin::new();
        let backends = pool(2);

        let s1 = lb.next_server(&backends).unwrap();
        assert_eq!(s1.url(), backends[0].url());

        let s2 = lb.next_server(&backends).unwrap();
        assert_eq!(s2.url(), backends[1].url());

        let s3 = lb.next_server(&backends).unwrap();
        assert_eq!(s3.url(), backends[0].url());
    }

    #[test]
    fn test_visits_each_once_per_cycle() {
        for n in 1..=6 {
            let mut lb = RoundRobin::new();
            let backends = pool(n);
            for cycle in 0..3 {
                for expected in &backends {
                    let got = lb.next_server(&backends).unwrap();
                    assert_eq!(got.url(), expected.url(), "pool size {} cycle {}", n, cycle);
                }
            }
        }
    }

    #[test]
    fn test_skips_unreachable() {
        let mut lb = RoundRobin::new();
        let backends = pool(3);
        backends[1].set_reachable(false);

        assert_eq!(lb.next_server(&backends).unwrap().url(), backends[0].url());
        assert_eq!(lb.cursor(), 1);

        assert_eq!(lb.next_server(&backends).unwrap().url(), backends[2].url());
        assert_eq!(lb.cursor(), 0);

        assert_eq!(lb.next_server(&backends).unwrap().url(), backends[0].url());
    }

    #[test]
    fn test_unreachable_first_in_rotation() {
        let mut lb = RoundRobin::new();
        let backends = pool(3);
        backends[0].set_reachable(false);

        assert_eq!(lb.next_server(&backends).unwrap().url(), backends[1].url());
        assert_eq!(lb.next_server(&backends).unwrap().url(), backends[2].url());
        assert_eq!(lb.next_server(&backends).unwrap().url(), backends[1].url());
    }

    #[test]
    fn test_all_unreachable() {
        let mut lb = RoundRobin::new();
        let backends = pool(3);
        lb.next_server(&backends);
        for b in &backends {
            b.set_reachable(false);
        }

        for _ in 0..5 {
            assert!(lb.next_server(&backends).is_none());
            assert_eq!(lb.cursor(), 1);
        }
    }

    #[test]
    fn test_empty() {
        let mut lb = RoundRobin::new();
        assert!(lb.next_server(&[]).is_none());
        assert_eq!(lb.cursor(), 0);
    }

    #[test]
    fn test_on_removed_keeps_successor() {
        let mut lb = RoundRobin { cursor: 2 };
        // slot 0 removed: old slot 2 is now slot 1
        lb.on_removed(0, 3);
        assert_eq!(lb.cursor(), 1);

        // removing the cursor slot itself: successor shifts into it
        lb.on_removed(1, 2);
        assert_eq!(lb.cursor(), 1);

        // removing the last slot wraps
        let mut lb = RoundRobin { cursor: 2 };
        lb.on_removed(2, 2);
        assert_eq!(lb.cursor(), 0);

        lb.on_removed(0, 0);
        assert_eq!(lb.cursor(), 0);
    }
}
