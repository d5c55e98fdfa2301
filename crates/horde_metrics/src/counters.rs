//! Per-frame counters that parallel passes can bump through `&self`

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct PassCounters {
    slots: Vec<(&'static str, AtomicUsize)>,
}

impl PassCounters {
    /// Counter names are fixed up front so `add` never allocates.
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            slots: names.iter().map(|name| (*name, AtomicUsize::new(0))).collect(),
        }
    }

    /// Unknown names are ignored.
    pub fn add(&self, name: &str, value: usize) {
        if let Some((_, slot)) = self.slots.iter().find(|(slot, _)| *slot == name) {
            slot.fetch_add(value, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> usize {
        self.slots
            .iter()
            .find(|(slot, _)| *slot == name)
            .map(|(_, slot)| slot.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        for (_, slot) in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.slots
            .iter()
            .map(|(name, slot)| (*name, slot.load(Ordering::Relaxed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_many_threads() {
        let counters = PassCounters::new(&["entries"]);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        counters.add("entries", 1);
                    }
                });
            }
        });
        assert_eq!(counters.get("entries"), 400);
        counters.add("unknown", 5);
        assert_eq!(counters.get("unknown"), 0);
    }
}
