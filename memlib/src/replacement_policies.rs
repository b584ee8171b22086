use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// A trait for choosing which slot of a set is evicted when a new line is installed. Used to
/// parameterise a Cache.
pub trait ReplacementPolicy {
    /// Used by the cache to get a slot index when a new line needs added to the cache.
    ///
    /// Implementations may assume the returned slot is overwritten straight after
    ///
    /// # Arguments
    ///
    /// * `set_lower_bound_index`: The index of the first slot of the set. This is equal to
    /// set * slots_per_set, but it is already known by the cache
    /// * `slots_per_set`: The number of slots (ways) in each set
    ///
    /// returns: usize, an index in `set_lower_bound_index..set_lower_bound_index + slots_per_set`
    fn get_new_line(&mut self, set_lower_bound_index: usize, slots_per_set: usize) -> usize;
}

#[derive(Debug, Default)]
/// NoPolicy is used for direct mapped caches. Each set holds a single slot, so the victim is
/// forced and the set lower bound index is returned as is
///
/// As the generic cache implementation is monomorphised, the compiler can completely optimise this
/// away, removing the need for a separate implementation
pub struct NoPolicy;

impl ReplacementPolicy for NoPolicy {
    fn get_new_line(&mut self, set_lower_bound_index: usize, _slots_per_set: usize) -> usize {
        set_lower_bound_index
    }
}

/// Picks a victim uniformly at random among the ways of a set
///
/// The generator is injected so that eviction is reproducible for a given seed
#[derive(Debug)]
pub struct RandomPolicy {
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self { rng }
    }
}

impl ReplacementPolicy for RandomPolicy {
    fn get_new_line(&mut self, set_lower_bound_index: usize, slots_per_set: usize) -> usize {
        set_lower_bound_index + self.rng.gen_range(0..slots_per_set)
    }
}
