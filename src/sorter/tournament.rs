//! Tournament (winner) tree used to drive an N-way merge in O(log N)
//! comparisons per advance.
//!
//! The tree itself is agnostic to what a "slot" represents — it only
//! orchestrates the pairing structure described in the design: slots
//! `0..active` are real, slots `active..n` (where `n` is the next power
//! of two `>= active`) are virtual and always lose. Callers supply a
//! `pick(a, b) -> winner` closure that knows how to compare two slot
//! indices (including recognizing virtual ones); the tree never looks
//! at key bytes itself.

/// A winner tree over `active` real slots, padded to the next power of
/// two. `tree[i]` for `i >= n/2` holds the winner of leaf pair
/// `(2i-n, 2i-n+1)`; for `0 < i < n/2` it holds the winner of
/// `(tree[2i], tree[2i+1])`. Index 0 is unused. When `active <= 1` the
/// tree degenerates to a single slot with no internal nodes.
pub(crate) struct Tournament {
    tree: Vec<usize>,
    n: usize,
}

impl Tournament {
    /// Builds a fresh tree over `active` real slots. `pick(a, b)` must
    /// return whichever of slot `a` or slot `b` currently wins.
    ///
    /// Fallible: the tree array is the one tournament-side allocation
    /// the design calls out as an explicit OOM surface (§4.1's "OOM on
    /// tournament array growth").
    pub(crate) fn try_build(
        active: usize,
        mut pick: impl FnMut(usize, usize) -> usize,
    ) -> Result<Self, std::collections::TryReserveError> {
        let n = active.max(1).next_power_of_two();
        let mut tree = Vec::new();
        tree.try_reserve_exact(n)?;
        tree.resize(n, 0usize);
        for i in (1..n).rev() {
            let (a, b) = if i >= n / 2 {
                (2 * i - n, 2 * i - n + 1)
            } else {
                (tree[2 * i], tree[2 * i + 1])
            };
            tree[i] = pick(a, b);
        }
        Ok(Self { tree, n })
    }

    #[cfg(test)]
    pub(crate) fn build(active: usize, pick: impl FnMut(usize, usize) -> usize) -> Self {
        Self::try_build(active, pick).expect("test allocation")
    }

    /// The slot currently holding the global minimum (or the sole slot,
    /// when there is only one).
    pub(crate) fn winner(&self) -> usize {
        if self.n <= 1 { 0 } else { self.tree[1] }
    }

    /// Recomputes every ancestor of `leaf`'s tree node, from the leaf
    /// level up to the root — `ceil(log2(n))` calls to `pick`.
    pub(crate) fn advance(&mut self, leaf: usize, mut pick: impl FnMut(usize, usize) -> usize) {
        if self.n <= 1 {
            return;
        }
        let mut i = self.n / 2 + leaf / 2;
        loop {
            let (a, b) = if i >= self.n / 2 {
                (2 * i - self.n, 2 * i - self.n + 1)
            } else {
                (self.tree[2 * i], self.tree[2 * i + 1])
            };
            self.tree[i] = pick(a, b);
            if i == 1 {
                break;
            }
            i /= 2;
        }
    }
}
