use crate::error::MemError;

/// A single cache line, the unit of transfer between levels
///
/// Lines are plain values. Moving a line between levels copies it, so no two levels ever share a
/// line's storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLine {
    bytes: Box<[u8]>,
    /// The line aligned address divided by the line width
    pub tag: u64,
    /// Modified since it was last written to the next level
    pub dirty: bool,
    /// Slots start out empty. An empty slot never hits, whatever its tag
    pub valid: bool,
}

impl CacheLine {
    /// Creates a zeroed, clean line holding the given tag
    pub fn new(line_size: u64, tag: u64) -> Self {
        Self {
            bytes: vec![0; line_size as usize].into_boxed_slice(),
            tag,
            dirty: false,
            valid: true,
        }
    }

    /// Creates a clean line from existing bytes. The width of the line is the length of the slice
    pub fn from_bytes(bytes: &[u8], tag: u64) -> Self {
        Self {
            bytes: bytes.into(),
            tag,
            dirty: false,
            valid: true,
        }
    }

    /// An unoccupied slot, as found in a freshly constructed cache
    pub(crate) fn empty(line_size: u64) -> Self {
        Self {
            valid: false,
            ..Self::new(line_size, 0)
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn width(&self) -> usize {
        self.bytes.len()
    }

    /// Whether evicting this line requires writing it to the next level
    pub fn needs_write_back(&self) -> bool {
        self.valid && self.dirty
    }

    /// Reads a little endian word at the given offset within the line
    ///
    /// # Examples
    ///
    /// ```
    /// use memlib::line::CacheLine;
    /// let mut line = CacheLine::new(64, 0);
    /// line.write_word(8, 0xDEADBEEF).unwrap();
    /// assert_eq!(line.bytes()[8], 0xEF);
    /// assert_eq!(line.read_word(8).unwrap(), 0xDEADBEEF);
    /// ```
    pub fn read_word(&self, offset: usize) -> Result<u32, MemError> {
        let word = self.word_slice(offset)?;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    /// Writes a little endian word at the given offset within the line. Doesn't mark the line
    /// dirty, that is left to the caller
    pub fn write_word(&mut self, offset: usize, value: u32) -> Result<(), MemError> {
        self.word_slice(offset)?;
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn word_slice(&self, offset: usize) -> Result<&[u8], MemError> {
        // Straddling words are never split across lines
        if offset % 4 != 0 || offset + 4 > self.bytes.len() {
            return Err(MemError::AlignmentViolation {
                address: offset as u64,
                alignment: 4,
            });
        }
        Ok(&self.bytes[offset..offset + 4])
    }
}
