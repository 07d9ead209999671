//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::LoadBalancer;

/// Pure rotation step: the upstream at `current` and the index to use next time.
///
/// `current` is reduced modulo the list length, so a stale index can never point
/// past the end.
pub fn select_next<T>(upstreams: &[T], current: usize) -> Option<(&T, usize)> {
    if upstreams.is_empty() {
        return None;
    }
    let len = upstreams.len();
    let index = current % len;
    Some((&upstreams[index], (index + 1) % len))
}

/// Round-robin selector.
/// Stores the rotation index; after the first pick it stays within `[0, len)`.
#[derive(Debug, Default)]
pub struct RoundRobin {
    index: AtomicUsize,
}

impl RoundRobin {
    /// Start the rotation at `index`.
    pub fn starting_at(index: usize) -> Self {
        Self {
            index: AtomicUsize::new(index),
        }
    }
}

impl LoadBalancer for RoundRobin {
    fn select<'a, T>(&self, upstreams: &'a [T]) -> Option<(usize, &'a T)> {
        let mut picked = None;
        // the closure may rerun under contention; only the stored attempt's pick survives
        self.index
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                let (upstream, next) = select_next(upstreams, current)?;
                picked = Some((current % upstreams.len(), upstream));
                Some(next)
            })
            .ok()?;
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_next_visits_each_once_then_wraps() {
        let upstreams = ["a", "b", "c", "d"];
        let mut index = 0;
        let mut seen = Vec::new();
        for _ in 0..upstreams.len() {
            let (chosen, next) = select_next(&upstreams, index).unwrap();
            seen.push(*chosen);
            index = next;
        }
        assert_eq!(seen, upstreams);

        let (wrapped, _) = select_next(&upstreams, index).unwrap();
        assert_eq!(*wrapped, "a");
    }

    #[test]
    fn select_next_on_empty_list() {
        let empty: [&str; 0] = [];
        assert!(select_next(&empty, 0).is_none());
    }

    #[test]
    fn stateful_rotation_visits_each_once_then_wraps() {
        let upstreams = ["a", "b", "c"];
        let lb = RoundRobin::starting_at(1);
        let picks: Vec<_> = (0..5).map(|_| *lb.select(&upstreams).unwrap().1).collect();
        assert_eq!(picks, vec!["b", "c", "a", "b", "c"]);
    }

    #[test]
    fn out_of_range_start_is_reduced() {
        let upstreams = ["a", "b", "c"];
        let lb = RoundRobin::starting_at(7);
        assert_eq!(lb.select(&upstreams), Some((1, &"b")));
        assert_eq!(lb.select(&upstreams), Some((2, &"c")));

        let empty: [&str; 0] = [];
        assert_eq!(lb.select(&empty), None);
        assert_eq!(lb.select(&upstreams), Some((0, &"a")));
    }
}
