use std::sync::atomic::{AtomicI32, Ordering};

// ============================================================================
// Version Generator - Local Version Stamps
// ============================================================================

/// Source of local version stamps for heartbeats and application states.
///
/// One instance is owned by a gossiper and handed out by reference; there is
/// no process-global counter. Versions start at 1 and never repeat.
#[derive(Debug)]
pub struct VersionGenerator {
    counter: AtomicI32,
}

impl VersionGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicI32::new(0),
        }
    }

    /// Increment and return the new version.
    ///
    /// # Panics
    /// On `i32` overflow. Versions order merges, so wrapping would silently
    /// invert every comparison made afterwards.
    pub fn next(&self) -> i32 {
        match self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
        {
            Ok(previous) => previous + 1,
            Err(_) => panic!("gossip version counter exhausted"),
        }
    }

    /// Last version handed out, 0 if none.
    pub fn current(&self) -> i32 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for VersionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_starts_at_one_and_increases() {
        let generator = VersionGenerator::new();
        assert_eq!(generator.current(), 0);
        let mut last = 0;
        for _ in 0..1000 {
            let v = generator.next();
            assert!(v > last);
            last = v;
        }
        assert_eq!(last, 1000);
    }

    #[test]
    fn test_concurrent_callers_never_collide() {
        let generator = Arc::new(VersionGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = generator.clone();
                thread::spawn(move || (0..500).map(|_| generator.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<i32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(*all.last().unwrap(), 4000);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_overflow_is_fatal() {
        let generator = VersionGenerator {
            counter: AtomicI32::new(i32::MAX),
        };
        generator.next();
    }
}
