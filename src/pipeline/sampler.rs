use rand::Rng;
use rand_pcg::Pcg64Mcg;

/// Uniform sample without replacement over a stream of unknown length
/// (Algorithm R). Holds at most `capacity` items at any time.
pub struct Reservoir<T> {
    capacity: usize,
    seen: u64,
    items: Vec<T>,
    rng: Pcg64Mcg,
}

impl<T: Clone> Reservoir<T> {
    pub fn new(capacity: usize, rng: Pcg64Mcg) -> Self {
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity.min(1024)),
            rng,
        }
    }

    /// Consider one more item. It is cloned only if it enters the sample.
    pub fn offer(&mut self, item: &T) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item.clone());
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let j = self.rng.gen_range(0..self.seen);
        if (j as usize) < self.capacity {
            self.items[j as usize] = item.clone();
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}
