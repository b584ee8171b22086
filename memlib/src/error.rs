use thiserror::Error;

/// Errors raised by the memory hierarchy
///
/// Every variant is a caller contract violation. Nothing is retried or corrected, the offending
/// call returns the error and leaves the hierarchy as it was before the call wherever possible
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemError {
    /// A line operation on an address which isn't line aligned, or a word access which isn't 4
    /// byte aligned or would cross a line boundary
    #[error("address {address:#x} is not aligned to {alignment} bytes")]
    AlignmentViolation { address: u64, alignment: u64 },

    /// A line written at an address whose tag doesn't match the tag carried by the line
    #[error("line tagged {tag:#x} written at address {address:#x}, expected tag {expected:#x}")]
    TagMismatch { address: u64, tag: u64, expected: u64 },

    /// A line whose width doesn't match the hierarchy's line width
    #[error("line is {actual} bytes wide, expected {expected}")]
    LineWidthMismatch { expected: usize, actual: usize },

    /// Rejected at construction
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An access past the end of the backing store
    #[error("address {address:#x} is outside the simulated address space of {limit:#x} bytes")]
    AddressOutOfRange { address: u64, limit: u64 },

    #[error("level {level} does not exist, the hierarchy has {count} levels")]
    LevelOutOfRange { level: usize, count: usize },

    #[error("slot {slot} does not exist in level {level}, which has {count} slots")]
    SlotOutOfRange { level: usize, slot: usize, count: usize },

    /// A cache level missed but had nothing below it to forward to
    #[error("cache level has no next level to forward a miss to")]
    MissingNextLevel,
}

/// Errors raised while replaying a trace
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("couldn't parse trace line {line}: {content:?}")]
    Parse { line: usize, content: String },

    #[error("trace line {line}: {source}")]
    Memory {
        line: usize,
        #[source]
        source: MemError,
    },
}
