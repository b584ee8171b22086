use log::{debug, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use crate::cache::{GenericLevel, Level, LevelCounters};
use crate::config::{CacheConfig, CacheKindConfig, HierarchyConfig};
use crate::error::MemError;
use crate::line::CacheLine;

/// Name given to the terminal store in reports
pub const MEMORY_LEVEL_NAME: &str = "memory";

const WORD_SIZE: u64 = 4;

/// A chain of cache levels ending in main memory, with byte and word access built on the line
/// operations of the first level
///
/// The hierarchy owns every level for its whole lifetime. Only the first level is ever called
/// directly, each level forwards its own misses and write-backs to the level below it
#[derive(Debug)]
pub struct MemoryHierarchy {
    levels: Vec<GenericLevel>,
    names: Vec<String>,
    line_size: u64,
    memory_size: u64,
}

/// Counters for a single level. Can be serialised to the output format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelReport {
    pub name: String,
    #[serde(flatten)]
    pub counters: LevelCounters,
}

/// Counters for every level, nearest first, memory last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyReport {
    pub levels: Vec<LevelReport>,
}

impl MemoryHierarchy {
    /// Builds and links every level of a configuration
    ///
    /// # Arguments
    ///
    /// * `config`: A hierarchy configuration, usually resulting from parsing JSON
    ///
    /// returns: Result<MemoryHierarchy, MemError>, failing if any level is invalid
    pub fn new(config: &HierarchyConfig) -> Result<Self, MemError> {
        let line_size = config.line_size;
        if !line_size.is_power_of_two() || line_size < WORD_SIZE {
            return Err(MemError::InvalidConfiguration(format!(
                "line size {line_size} must be a power of two of at least {WORD_SIZE} bytes"
            )));
        }
        let mut levels = Vec::with_capacity(config.caches.len() + 1);
        let mut names = Vec::with_capacity(config.caches.len() + 1);
        for (index, cache) in config.caches.iter().enumerate() {
            let level = Self::config_to_level(cache, line_size, config.seed.wrapping_add(index as u64))?;
            debug!(
                "{}: {} bytes, {} slots, {} ({} ways)",
                cache.name,
                cache.size,
                level.slot_count(),
                level.kind(),
                level.ways().unwrap_or_default()
            );
            levels.push(level);
            names.push(cache.name.clone());
        }
        if config.caches.windows(2).any(|pair| pair[0].size >= pair[1].size) {
            warn!("cache sizes don't strictly increase from one level to the next");
        }
        levels.push(GenericLevel::memory(config.memory_size, line_size)?);
        names.push(MEMORY_LEVEL_NAME.to_string());
        debug!("{MEMORY_LEVEL_NAME}: {} bytes", config.memory_size);
        Ok(Self {
            levels,
            names,
            line_size,
            memory_size: config.memory_size,
        })
    }

    /// Creates a cache level from a cache configuration
    fn config_to_level(config: &CacheConfig, line_size: u64, seed: u64) -> Result<GenericLevel, MemError> {
        let rng = ChaCha8Rng::seed_from_u64(seed);
        let level = match config.kind {
            CacheKindConfig::Direct => GenericLevel::direct_mapped(config.size, line_size),
            CacheKindConfig::Full => GenericLevel::fully_associative(config.size, line_size, rng),
            kind => {
                let ways = kind.ways().unwrap_or(1);
                GenericLevel::set_associative(config.size, line_size, ways, rng)
            }
        };
        level.map_err(|e| match e {
            MemError::InvalidConfiguration(reason) => {
                MemError::InvalidConfiguration(format!("{}: {reason}", config.name))
            }
            e => e,
        })
    }

    pub fn read_byte(&mut self, address: u64) -> Result<u8, MemError> {
        self.check_range(address, 1)?;
        let (line_address, offset) = self.split_address(address);
        let line = self.read_line(line_address)?;
        Ok(line.bytes()[offset])
    }

    pub fn write_byte(&mut self, address: u64, value: u8) -> Result<(), MemError> {
        self.check_range(address, 1)?;
        let (line_address, offset) = self.split_address(address);
        let mut line = self.read_line(line_address)?;
        line.bytes_mut()[offset] = value;
        line.dirty = true;
        self.write_line(line_address, line)
    }

    /// Reads a little endian word. The address must be 4 byte aligned
    pub fn read_word(&mut self, address: u64) -> Result<u32, MemError> {
        let offset = self.check_word(address)?;
        let line = self.read_line(address - offset as u64)?;
        line.read_word(offset)
    }

    /// Writes a little endian word. The address must be 4 byte aligned
    pub fn write_word(&mut self, address: u64, value: u32) -> Result<(), MemError> {
        let offset = self.check_word(address)?;
        let line_address = address - offset as u64;
        let mut line = self.read_line(line_address)?;
        line.write_word(offset, value)?;
        line.dirty = true;
        self.write_line(line_address, line)
    }

    /// Zeroes the counters of every level. Stored lines are left as they are
    pub fn reset_counters(&mut self) {
        debug!("counters reset on {} levels", self.levels.len());
        for level in &mut self.levels {
            level.reset_counters();
        }
    }

    /// Returns a copy of a slot's line without affecting any counter or line. For memory, slot `i`
    /// is the line at address `i * line_size`
    pub fn peek_slot(&self, level: usize, slot: usize) -> Result<CacheLine, MemError> {
        let target = self.level(level)?;
        target.peek_slot(slot).ok_or(MemError::SlotOutOfRange {
            level,
            slot,
            count: target.slot_count(),
        })
    }

    /// Raw bytes of main memory, bypassing every cache and counter. Lines still dirty in a cache
    /// aren't reflected
    pub fn peek_memory(&self, address: u64, len: u64) -> Result<&[u8], MemError> {
        self.check_range(address, len)?;
        match self.levels.last() {
            Some(GenericLevel::Memory(memory)) => {
                Ok(&memory.backdoor()[address as usize..(address + len) as usize])
            }
            _ => Err(MemError::MissingNextLevel),
        }
    }

    pub fn counters(&self, level: usize) -> Result<&LevelCounters, MemError> {
        Ok(self.level(level)?.counters())
    }

    pub fn level_name(&self, level: usize) -> Result<&str, MemError> {
        self.level(level)?;
        Ok(&self.names[level])
    }

    pub fn slot_count(&self, level: usize) -> Result<usize, MemError> {
        Ok(self.level(level)?.slot_count())
    }

    /// Read only view of the chain, nearest level first
    pub fn levels(&self) -> &[GenericLevel] {
        &self.levels
    }

    /// Number of levels including memory
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn line_size(&self) -> u64 {
        self.line_size
    }

    pub fn memory_size(&self) -> u64 {
        self.memory_size
    }

    /// Snapshot of every level's counters
    pub fn report(&self) -> HierarchyReport {
        HierarchyReport {
            levels: self
                .names
                .iter()
                .zip(&self.levels)
                .map(|(name, level)| LevelReport {
                    name: name.clone(),
                    counters: *level.counters(),
                })
                .collect(),
        }
    }

    /// Gets the number of never filled slots for each level
    pub fn get_uninitialised_line_counts(&self) -> Vec<u64> {
        self.levels.iter().map(|x| x.get_uninitialised_line_count() as u64).collect()
    }

    fn level(&self, level: usize) -> Result<&GenericLevel, MemError> {
        self.levels.get(level).ok_or(MemError::LevelOutOfRange {
            level,
            count: self.levels.len(),
        })
    }

    fn read_line(&mut self, line_address: u64) -> Result<CacheLine, MemError> {
        let (first, rest) = self.levels.split_first_mut().ok_or(MemError::MissingNextLevel)?;
        first.read_line(line_address, rest)
    }

    fn write_line(&mut self, line_address: u64, line: CacheLine) -> Result<(), MemError> {
        let (first, rest) = self.levels.split_first_mut().ok_or(MemError::MissingNextLevel)?;
        first.write_line(line_address, line, rest)
    }

    /// Splits an address into the address of its line and the offset within that line
    fn split_address(&self, address: u64) -> (u64, usize) {
        let offset = address & (self.line_size - 1);
        (address - offset, offset as usize)
    }

    fn check_range(&self, address: u64, len: u64) -> Result<(), MemError> {
        if address.checked_add(len).map_or(true, |end| end > self.memory_size) {
            return Err(MemError::AddressOutOfRange {
                address,
                limit: self.memory_size,
            });
        }
        Ok(())
    }

    /// Checks a word access, returning its offset within the line
    fn check_word(&self, address: u64) -> Result<usize, MemError> {
        let (_, offset) = self.split_address(address);
        // Words which would straddle two lines are rejected, never split
        if address % WORD_SIZE != 0 || offset as u64 + WORD_SIZE > self.line_size {
            return Err(MemError::AlignmentViolation {
                address,
                alignment: WORD_SIZE,
            });
        }
        self.check_range(address, WORD_SIZE)?;
        Ok(offset)
    }
}
