//! Bounded sample reservoir backing the `stat4` admission rule (§4.2.1).
//!
//! Every candidate row is offered to [`Reservoir::push`], which decides
//! admission via the periodic-stride rule first, then the high-`sumEq`
//! rule with hash tiebreak. Evicted/rejected candidates are simply
//! dropped; admitted ones are stored as an owned [`Sample`].

#[derive(Debug, Clone)]
pub(crate) struct Sample {
    pub(crate) key: Vec<u8>,
    pub(crate) eq: Vec<u64>,
    pub(crate) lt: Vec<u64>,
    pub(crate) dlt: Vec<u64>,
    pub(crate) sum_eq: u64,
    pub(crate) hash: u32,
    pub(crate) is_periodic: bool,
}

/// Linear-congruential constants from §4.2.1: `h <- h*1103515245 + 12345`.
const LCG_MUL: u32 = 1_103_515_245;
const LCG_ADD: u32 = 12_345;

/// Hard ceiling on how many periodic occupants can accumulate beyond
/// `capacity` before the oldest one is evicted FIFO. With a realistic
/// periodicity `P` (§4.2.1's `P = ceil(rowcount / (S/3 + 1)) + 1`) the
/// periodic rule almost never crosses this; it only matters for a
/// pathologically small `P` (e.g. a caller-supplied `row_count_hint` far
/// below the true rowcount), where it keeps the reservoir from growing
/// without bound over a long scan.
const MAX_PERIODIC_SLACK: usize = 64;

pub(crate) struct Reservoir {
    capacity: usize,
    period: u64,
    hash: u32,
    /// Cumulative `sumEq` admitted across all candidates seen so far,
    /// i.e. the running `nLt`-equivalent the periodic rule strides over.
    prev_lt: u64,
    samples: Vec<Sample>,
}

impl Reservoir {
    /// `seed` is the analyzer's PRNG seed (§6.3); only its first 4 bytes
    /// feed the 32-bit hash state, matching the reference LCG's width.
    pub(crate) fn new(capacity: usize, period: u64, seed: &[u8; 32]) -> Self {
        let hash = u32::from_le_bytes([seed[0], seed[1], seed[2], seed[3]]);
        Self {
            capacity,
            period: period.max(1),
            hash,
            prev_lt: 0,
            samples: Vec::new(),
        }
    }

    /// Offers one candidate for admission. `eq`/`lt`/`dlt` are the
    /// analyzer's running per-column arrays *as of this row*; ownership
    /// only transfers in when the candidate is actually admitted.
    pub(crate) fn push(&mut self, key: Vec<u8>, eq: Vec<u64>, lt: Vec<u64>, dlt: Vec<u64>) {
        let sum_eq: u64 = eq.iter().sum();
        if sum_eq == 0 {
            // All-NULL prefix (§4.2.1): never a useful sample.
            return;
        }

        self.hash = self.hash.wrapping_mul(LCG_MUL).wrapping_add(LCG_ADD);

        let np = sum_eq + self.prev_lt;
        let is_periodic = self.prev_lt / self.period != np / self.period;
        self.prev_lt = np;

        if is_periodic {
            let periodic_count = self.samples.iter().filter(|s| s.is_periodic).count();
            if periodic_count >= self.capacity.saturating_add(MAX_PERIODIC_SLACK)
                && let Some(oldest) = self.samples.iter().position(|s| s.is_periodic)
            {
                self.samples.remove(oldest);
            }
            self.samples.push(Sample {
                key,
                eq,
                lt,
                dlt,
                sum_eq,
                hash: self.hash,
                is_periodic: true,
            });
            return;
        }

        if self.samples.len() < self.capacity {
            self.samples.push(Sample {
                key,
                eq,
                lt,
                dlt,
                sum_eq,
                hash: self.hash,
                is_periodic: false,
            });
            return;
        }

        let weakest = self
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_periodic)
            .map(|(i, s)| (i, s.sum_eq, s.hash))
            .min_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let Some((evict_idx, evict_sum, evict_hash)) = weakest else {
            // Every occupant is periodic; a non-periodic candidate can
            // never evict one (§4.2.1: "periodic occupants are never
            // evicted by the non-periodic rule").
            return;
        };

        let admit = sum_eq > evict_sum || (sum_eq == evict_sum && self.hash > evict_hash);
        if admit {
            self.samples[evict_idx] = Sample {
                key,
                eq,
                lt,
                dlt,
                sum_eq,
                hash: self.hash,
                is_periodic: false,
            };
        }
    }

    pub(crate) fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_eq(r: &mut Reservoir, n: u64) {
        r.push(vec![n as u8], vec![n], vec![0], vec![1]);
    }

    #[test]
    fn skips_all_null_prefix_candidates() {
        let mut r = Reservoir::new(4, 100, &[0u8; 32]);
        r.push(vec![1], vec![0, 0], vec![0, 0], vec![0, 0]);
        assert!(r.into_samples().is_empty());
    }

    #[test]
    fn fills_up_to_capacity_unconditionally() {
        let mut r = Reservoir::new(4, 1_000_000, &[1u8; 32]);
        for n in 1..=4 {
            push_eq(&mut r, n);
        }
        assert_eq!(r.into_samples().len(), 4);
    }

    #[test]
    fn high_eq_law_keeps_the_largest_sumeq_occupants() {
        let mut r = Reservoir::new(2, 1_000_000, &[2u8; 32]);
        for n in 1..=10u64 {
            push_eq(&mut r, n);
        }
        let samples = r.into_samples();
        assert_eq!(samples.len(), 2);
        let mut sums: Vec<u64> = samples.iter().map(|s| s.sum_eq).collect();
        sums.sort_unstable();
        assert_eq!(sums, vec![9, 10]);
    }

    #[test]
    fn periodic_candidates_bypass_capacity() {
        // period = 1 makes every candidate cross a stride boundary.
        let mut r = Reservoir::new(1, 1, &[3u8; 32]);
        for n in 1..=5u64 {
            push_eq(&mut r, n);
        }
        let samples = r.into_samples();
        assert!(samples.len() >= 5);
        assert!(samples.iter().all(|s| s.is_periodic));
    }
}
