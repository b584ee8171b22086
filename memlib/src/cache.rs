use log::trace;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use crate::error::MemError;
use crate::line::CacheLine;
use crate::memory::MainMemory;
use crate::replacement_policies::{NoPolicy, RandomPolicy, ReplacementPolicy};

/// Hit and miss counters kept by every level
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCounters {
    pub read_hit: u64,
    pub read_miss: u64,
    pub write_hit: u64,
    pub write_miss: u64,
}

impl LevelCounters {
    pub fn reads(&self) -> u64 {
        self.read_hit + self.read_miss
    }

    pub fn writes(&self) -> u64 {
        self.write_hit + self.write_miss
    }

    /// Adds another set of counters into this one
    pub fn accumulate(&mut self, other: &LevelCounters) {
        self.read_hit += other.read_hit;
        self.read_miss += other.read_miss;
        self.write_hit += other.write_hit;
        self.write_miss += other.write_miss;
    }
}

/// A level of the memory hierarchy
///
/// Levels don't own the levels below them. A level which needs to forward a request is handed the
/// rest of the chain as `below`, where `below[0]` is its next level, `below[1]` the one after that
/// and so on. The last level of any valid chain is a [`MainMemory`], which never forwards.
///
/// Every call to `read_line` or `write_line` increments exactly one of the matching hit or miss
/// counters, unless it fails
pub trait Level {
    /// Reads the line at a line aligned address, fetching it from the next level on a miss and
    /// installing it locally before returning it
    ///
    /// # Arguments
    ///
    /// * `address`: A line aligned address
    /// * `below`: The levels below this one, nearest first
    ///
    /// returns: Result<CacheLine, MemError>, a copy of the line
    fn read_line(&mut self, address: u64, below: &mut [GenericLevel]) -> Result<CacheLine, MemError>;

    /// Writes a whole line at a line aligned address. The line's tag must equal
    /// `address / line_size`
    ///
    /// On a miss the line is installed locally, writing back whichever line it displaces if that
    /// line is dirty
    fn write_line(&mut self, address: u64, line: CacheLine, below: &mut [GenericLevel]) -> Result<(), MemError>;

    fn counters(&self) -> &LevelCounters;

    fn reset_counters(&mut self);

    fn line_size(&self) -> u64;

    /// The number of line sized slots held by the level
    fn slot_count(&self) -> usize;

    /// Returns a copy of the line in a slot without touching any counter or line state. Intended
    /// for visualisation and reporting
    fn peek_slot(&self, slot: usize) -> Option<CacheLine>;

    /// Gets the number of slots which have never been filled. Useful for analysing cache
    /// performance or debugging
    fn get_uninitialised_line_count(&self) -> usize;
}

/// Checks the preconditions shared by every level's `write_line`
pub(crate) fn check_write(address: u64, line: &CacheLine, line_size: u64) -> Result<(), MemError> {
    check_alignment(address, line_size)?;
    if line.width() as u64 != line_size {
        return Err(MemError::LineWidthMismatch {
            expected: line_size as usize,
            actual: line.width(),
        });
    }
    let expected = address / line_size;
    if line.tag != expected {
        return Err(MemError::TagMismatch {
            address,
            tag: line.tag,
            expected,
        });
    }
    Ok(())
}

pub(crate) fn check_alignment(address: u64, line_size: u64) -> Result<(), MemError> {
    if address & (line_size - 1) != 0 {
        return Err(MemError::AlignmentViolation {
            address,
            alignment: line_size,
        });
    }
    Ok(())
}

fn next_level(below: &mut [GenericLevel]) -> Result<(&mut GenericLevel, &mut [GenericLevel]), MemError> {
    below.split_first_mut().ok_or(MemError::MissingNextLevel)
}

/// A generic cache implementation, parameterised by a replacement policy
///
/// Fully associative, direct mapped, and N-way set associative caches differ only in how many
/// slots make up a set, so they share this one implementation. A direct mapped cache has sets of
/// one slot, a fully associative cache a single set holding every slot, and an N-way cache sets of
/// N slots. Sets are contiguous runs of slots, and a tag maps to the set given by its low bits.
///
/// We rely on monomorphisation to inline the replacement policy, so the direct mapped case pays
/// nothing for the policy it doesn't need
#[derive(Debug)]
pub struct Cache<R: ReplacementPolicy> {
    line_size: u64,
    cache_alignment_bits: u32,
    set_selection_bit_mask: u64,
    set_size: usize,
    slots: Vec<CacheLine>,
    replacement_policy: R,
    counters: LevelCounters,
}

impl<R: ReplacementPolicy> Cache<R> {
    /// Creates an empty cache
    ///
    /// # Arguments
    ///
    /// * `size`: Capacity in bytes, a positive multiple of the line size
    /// * `line_size`: A power of two
    /// * `set_size`: Slots per set. Must divide the slot count, leaving a power of two number of
    /// sets
    /// * `policy`: Picks victims within a set
    ///
    /// returns: Result<Cache<R>, MemError>
    pub fn new(size: u64, line_size: u64, set_size: u64, policy: R) -> Result<Self, MemError> {
        if !line_size.is_power_of_two() {
            return Err(MemError::InvalidConfiguration(format!("line size {line_size} is not a power of two")));
        }
        if size == 0 || size % line_size != 0 {
            return Err(MemError::InvalidConfiguration(format!(
                "cache size {size} is not a positive multiple of the line size {line_size}"
            )));
        }
        let cache_lines = size / line_size;
        if set_size == 0 || cache_lines % set_size != 0 || !(cache_lines / set_size).is_power_of_two() {
            return Err(MemError::InvalidConfiguration(format!(
                "{cache_lines} slots can't be split into a power of two number of sets of {set_size}"
            )));
        }
        let num_sets = cache_lines / set_size;
        Ok(Self {
            line_size,
            cache_alignment_bits: line_size.trailing_zeros(),
            set_selection_bit_mask: num_sets - 1,
            set_size: set_size as usize,
            slots: vec![CacheLine::empty(line_size); cache_lines as usize],
            replacement_policy: policy,
            counters: LevelCounters::default(),
        })
    }

    /// Converts a line aligned address into the index of the first slot of its set, and a tag
    ///
    /// # Arguments
    ///
    /// * `input`: A line aligned address
    ///
    /// returns: (usize, u64)
    pub fn address_to_set_and_tag(&self, input: u64) -> (usize, u64) {
        let tag = input >> self.cache_alignment_bits;
        let set = (tag & self.set_selection_bit_mask) as usize;
        (set * self.set_size, tag)
    }

    /// Slots per set
    pub fn ways(&self) -> usize {
        self.set_size
    }

    fn find(&self, set_inclusive_lower_bound: usize, tag: u64) -> Option<usize> {
        // Only search the relevant set
        let set = &self.slots[set_inclusive_lower_bound..set_inclusive_lower_bound + self.set_size];
        set.iter()
            .position(|line| line.valid && line.tag == tag)
            .map(|index| set_inclusive_lower_bound + index)
    }

    /// Places a line in its set, evicting whichever line the replacement policy picks. A dirty
    /// victim is written to the next level before it is overwritten
    fn install(
        &mut self,
        set_inclusive_lower_bound: usize,
        mut line: CacheLine,
        below: &mut [GenericLevel],
    ) -> Result<(), MemError> {
        let victim = self.replacement_policy.get_new_line(set_inclusive_lower_bound, self.set_size);
        let evicted = &self.slots[victim];
        if evicted.valid {
            trace!("evicting line {:#x} from slot {victim}", evicted.tag * self.line_size);
        }
        if evicted.needs_write_back() {
            let address = evicted.tag * self.line_size;
            trace!("writing back dirty line {address:#x} from slot {victim}");
            let (next, rest) = next_level(below)?;
            next.write_line(address, evicted.clone(), rest)?;
        }
        line.valid = true;
        self.slots[victim] = line;
        Ok(())
    }
}

impl<R: ReplacementPolicy> Level for Cache<R> {
    fn read_line(&mut self, address: u64, below: &mut [GenericLevel]) -> Result<CacheLine, MemError> {
        check_alignment(address, self.line_size)?;
        let (set, tag) = self.address_to_set_and_tag(address);
        if let Some(slot) = self.find(set, tag) {
            self.counters.read_hit += 1;
            return Ok(self.slots[slot].clone());
        }
        trace!("read miss for line {address:#x}");
        let (next, rest) = next_level(below)?;
        let line = next.read_line(address, rest)?;
        self.install(set, line.clone(), below)?;
        self.counters.read_miss += 1;
        Ok(line)
    }

    fn write_line(&mut self, address: u64, line: CacheLine, below: &mut [GenericLevel]) -> Result<(), MemError> {
        check_write(address, &line, self.line_size)?;
        let (set, tag) = self.address_to_set_and_tag(address);
        if let Some(slot) = self.find(set, tag) {
            // Already resident, overwrite in place
            let mut line = line;
            line.valid = true;
            self.slots[slot] = line;
            self.counters.write_hit += 1;
            return Ok(());
        }
        trace!("write miss for line {address:#x}");
        self.install(set, line, below)?;
        self.counters.write_miss += 1;
        Ok(())
    }

    fn counters(&self) -> &LevelCounters {
        &self.counters
    }

    fn reset_counters(&mut self) {
        self.counters = LevelCounters::default();
    }

    fn line_size(&self) -> u64 {
        self.line_size
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn peek_slot(&self, slot: usize) -> Option<CacheLine> {
        self.slots.get(slot).cloned()
    }

    fn get_uninitialised_line_count(&self) -> usize {
        self.slots.iter().filter(|a| !a.valid).count()
    }
}

/// Enum for every kind of level provided by the library
///
/// Trait objects would save some boilerplate, but every access walks the chain through this type,
/// and branching on the concrete types lets the compiler inline each implementation
#[derive(Debug)]
pub enum GenericLevel {
    FullyAssociative(Cache<RandomPolicy>),
    DirectMapped(Cache<NoPolicy>),
    SetAssociative(Cache<RandomPolicy>),
    Memory(MainMemory),
}

impl GenericLevel {
    /// A single set holding every slot, with random eviction
    pub fn fully_associative(size: u64, line_size: u64, rng: ChaCha8Rng) -> Result<Self, MemError> {
        let slots = Self::slots_for(size, line_size)?;
        Ok(Self::FullyAssociative(Cache::new(size, line_size, slots, RandomPolicy::new(rng))?))
    }

    /// One slot per set, the slot count must be a power of two
    pub fn direct_mapped(size: u64, line_size: u64) -> Result<Self, MemError> {
        Self::require_power_of_two_slots(size, line_size)?;
        Ok(Self::DirectMapped(Cache::new(size, line_size, 1, NoPolicy)?))
    }

    /// Sets of `ways` slots with random eviction within a set. Both the slot count and `ways`
    /// must be powers of two
    pub fn set_associative(size: u64, line_size: u64, ways: u64, rng: ChaCha8Rng) -> Result<Self, MemError> {
        let slots = Self::require_power_of_two_slots(size, line_size)?;
        if !ways.is_power_of_two() || ways > slots {
            return Err(MemError::InvalidConfiguration(format!(
                "{ways} ways doesn't fit a cache of {slots} slots"
            )));
        }
        Ok(Self::SetAssociative(Cache::new(size, line_size, ways, RandomPolicy::new(rng))?))
    }

    pub fn memory(size: u64, line_size: u64) -> Result<Self, MemError> {
        Ok(Self::Memory(MainMemory::new(size, line_size)?))
    }

    /// A short name for the kind of level, used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            GenericLevel::FullyAssociative(_) => "fully associative",
            GenericLevel::DirectMapped(_) => "direct mapped",
            GenericLevel::SetAssociative(_) => "set associative",
            GenericLevel::Memory(_) => "memory",
        }
    }

    /// Slots per set, or None for the backing store
    pub fn ways(&self) -> Option<usize> {
        match self {
            GenericLevel::FullyAssociative(c) => Some(c.ways()),
            GenericLevel::DirectMapped(c) => Some(c.ways()),
            GenericLevel::SetAssociative(c) => Some(c.ways()),
            GenericLevel::Memory(_) => None,
        }
    }

    fn slots_for(size: u64, line_size: u64) -> Result<u64, MemError> {
        if line_size == 0 || size == 0 || size % line_size != 0 {
            return Err(MemError::InvalidConfiguration(format!(
                "cache size {size} is not a positive multiple of the line size {line_size}"
            )));
        }
        Ok(size / line_size)
    }

    fn require_power_of_two_slots(size: u64, line_size: u64) -> Result<u64, MemError> {
        let slots = Self::slots_for(size, line_size)?;
        if !slots.is_power_of_two() {
            return Err(MemError::InvalidConfiguration(format!(
                "a cache of {size} bytes has {slots} slots, which is not a power of two"
            )));
        }
        Ok(slots)
    }
}

impl From<MainMemory> for GenericLevel {
    fn from(value: MainMemory) -> Self {
        Self::Memory(value)
    }
}

impl Level for GenericLevel {
    fn read_line(&mut self, address: u64, below: &mut [GenericLevel]) -> Result<CacheLine, MemError> {
        match self {
            GenericLevel::FullyAssociative(c) => c.read_line(address, below),
            GenericLevel::DirectMapped(c) => c.read_line(address, below),
            GenericLevel::SetAssociative(c) => c.read_line(address, below),
            GenericLevel::Memory(m) => m.read_line(address, below),
        }
    }

    fn write_line(&mut self, address: u64, line: CacheLine, below: &mut [GenericLevel]) -> Result<(), MemError> {
        match self {
            GenericLevel::FullyAssociative(c) => c.write_line(address, line, below),
            GenericLevel::DirectMapped(c) => c.write_line(address, line, below),
            GenericLevel::SetAssociative(c) => c.write_line(address, line, below),
            GenericLevel::Memory(m) => m.write_line(address, line, below),
        }
    }

    fn counters(&self) -> &LevelCounters {
        match self {
            GenericLevel::FullyAssociative(c) => c.counters(),
            GenericLevel::DirectMapped(c) => c.counters(),
            GenericLevel::SetAssociative(c) => c.counters(),
            GenericLevel::Memory(m) => m.counters(),
        }
    }

    fn reset_counters(&mut self) {
        match self {
            GenericLevel::FullyAssociative(c) => c.reset_counters(),
            GenericLevel::DirectMapped(c) => c.reset_counters(),
            GenericLevel::SetAssociative(c) => c.reset_counters(),
            GenericLevel::Memory(m) => m.reset_counters(),
        }
    }

    fn line_size(&self) -> u64 {
        match self {
            GenericLevel::FullyAssociative(c) => c.line_size(),
            GenericLevel::DirectMapped(c) => c.line_size(),
            GenericLevel::SetAssociative(c) => c.line_size(),
            GenericLevel::Memory(m) => m.line_size(),
        }
    }

    fn slot_count(&self) -> usize {
        match self {
            GenericLevel::FullyAssociative(c) => c.slot_count(),
            GenericLevel::DirectMapped(c) => c.slot_count(),
            GenericLevel::SetAssociative(c) => c.slot_count(),
            GenericLevel::Memory(m) => m.slot_count(),
        }
    }

    fn peek_slot(&self, slot: usize) -> Option<CacheLine> {
        match self {
            GenericLevel::FullyAssociative(c) => c.peek_slot(slot),
            GenericLevel::DirectMapped(c) => c.peek_slot(slot),
            GenericLevel::SetAssociative(c) => c.peek_slot(slot),
            GenericLevel::Memory(m) => m.peek_slot(slot),
        }
    }

    fn get_uninitialised_line_count(&self) -> usize {
        match self {
            GenericLevel::FullyAssociative(c) => c.get_uninitialised_line_count(),
            GenericLevel::DirectMapped(c) => c.get_uninitialised_line_count(),
            GenericLevel::SetAssociative(c) => c.get_uninitialised_line_count(),
            GenericLevel::Memory(m) => m.get_uninitialised_line_count(),
        }
    }
}
