//! # MemLib
//!
//! Memlib is a library for simulating a multi-level memory hierarchy
//!
//! It provides a generic cache implementation covering fully associative, direct mapped, and N-way
//! set associative mapping, a terminal main memory, and a hierarchy which chains them and exposes
//! byte and word access on top of whole line transfers. Write-back happens only when a dirty line
//! is evicted, and every level keeps its own read and write hit/miss counters.
//!
//! A simulator replays access traces against a hierarchy built from a JSON configuration

/// Contains the cache line value type
pub mod line;

/// Contains the level trait, the generic cache implementation, and a utility enum for the existing
/// level types
pub mod cache;

/// Contains the main memory at the bottom of every hierarchy
pub mod memory;

/// Contains the hierarchy which links levels together and provides byte and word access
pub mod hierarchy;

/// Contains definitions for the JSON configuration format
pub mod config;

/// Contains the provided replacement policies, with a trait for implementing custom replacement
/// policies
pub mod replacement_policies;

/// Contains the simulator used to replay a trace against a hierarchy
pub mod simulator;

/// Error types shared by the hierarchy and the simulator
pub mod error;

/// Trace file loading
pub mod io;

#[cfg(test)]
mod test;
