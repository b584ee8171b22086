use crate::cache::{check_alignment, check_write, GenericLevel, Level, LevelCounters};
use crate::error::MemError;
use crate::line::CacheLine;

/// The terminal store at the bottom of every hierarchy
///
/// Backs the whole simulated address space with a flat byte array, so every access is a hit and
/// nothing is ever forwarded
#[derive(Debug)]
pub struct MainMemory {
    bytes: Vec<u8>,
    line_size: u64,
    counters: LevelCounters,
}

impl MainMemory {
    /// Creates a zeroed store of `size` bytes, a positive multiple of the line size
    pub fn new(size: u64, line_size: u64) -> Result<Self, MemError> {
        if !line_size.is_power_of_two() {
            return Err(MemError::InvalidConfiguration(format!("line size {line_size} is not a power of two")));
        }
        if size == 0 || size % line_size != 0 {
            return Err(MemError::InvalidConfiguration(format!(
                "memory size {size} is not a positive multiple of the line size {line_size}"
            )));
        }
        Ok(Self {
            bytes: vec![0; size as usize],
            line_size,
            counters: LevelCounters::default(),
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Raw contents, bypassing the counters
    pub fn backdoor(&self) -> &[u8] {
        &self.bytes
    }

    fn line_range(&self, address: u64) -> Result<std::ops::Range<usize>, MemError> {
        if address.checked_add(self.line_size).map_or(true, |end| end > self.size()) {
            return Err(MemError::AddressOutOfRange {
                address,
                limit: self.size(),
            });
        }
        let start = address as usize;
        Ok(start..start + self.line_size as usize)
    }
}

impl Level for MainMemory {
    fn read_line(&mut self, address: u64, _below: &mut [GenericLevel]) -> Result<CacheLine, MemError> {
        check_alignment(address, self.line_size)?;
        let range = self.line_range(address)?;
        let line = CacheLine::from_bytes(&self.bytes[range], address / self.line_size);
        // Reads from memory always hit
        self.counters.read_hit += 1;
        Ok(line)
    }

    fn write_line(&mut self, address: u64, line: CacheLine, _below: &mut [GenericLevel]) -> Result<(), MemError> {
        check_write(address, &line, self.line_size)?;
        let range = self.line_range(address)?;
        self.bytes[range].copy_from_slice(line.bytes());
        self.counters.write_hit += 1;
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
        (self.size() / self.line_size) as usize
    }

    fn peek_slot(&self, slot: usize) -> Option<CacheLine> {
        let address = (slot as u64).checked_mul(self.line_size)?;
        let range = self.line_range(address).ok()?;
        Some(CacheLine::from_bytes(&self.bytes[range], slot as u64))
    }

    fn get_uninitialised_line_count(&self) -> usize {
        // Every line of memory exists from the start
        0
    }
}
