use std::time::{Duration, Instant};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::config::HierarchyConfig;
use crate::error::{MemError, SimulationError};
use crate::hierarchy::{LevelReport, MemoryHierarchy};

lazy_static! {
    static ref TRACE_LINE: Regex = Regex::new(
        r"^(?P<op>[RrWw])\s+(?:0[xX])?(?P<address>[0-9a-fA-F]+)\s+(?P<size>[14])(?:\s+(?:0[xX])?(?P<value>[0-9a-fA-F]+))?$"
    )
    .expect("trace line pattern is valid");
}

/// A single access from a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadByte(u64),
    WriteByte(u64, u8),
    ReadWord(u64),
    WriteWord(u64, u32),
}

impl Access {
    /// Performs the access against a hierarchy, discarding any value read
    pub fn apply(&self, hierarchy: &mut MemoryHierarchy) -> Result<(), MemError> {
        match *self {
            Access::ReadByte(address) => hierarchy.read_byte(address).map(|_| ()),
            Access::WriteByte(address, value) => hierarchy.write_byte(address, value),
            Access::ReadWord(address) => hierarchy.read_word(address).map(|_| ()),
            Access::WriteWord(address, value) => hierarchy.write_word(address, value),
        }
    }
}

/// Parses one trace line of the form `R <address> <size>` or `W <address> <size> <value>`
///
/// Addresses and values are hexadecimal, optionally prefixed with `0x`. Size is 1 for a byte or 4
/// for a word. Returns None if the line doesn't follow the format
///
/// # Examples
///
/// ```
/// use memlib::simulator::{parse_access, Access};
/// assert_eq!(parse_access("W 0x1000 4 ffff77"), Some(Access::WriteWord(0x1000, 0xffff77)));
/// assert_eq!(parse_access("R 40 1"), Some(Access::ReadByte(0x40)));
/// assert_eq!(parse_access("R 40 1 ff"), None);
/// ```
pub fn parse_access(line: &str) -> Option<Access> {
    let captures = TRACE_LINE.captures(line)?;
    let address = u64::from_str_radix(&captures["address"], 16).ok()?;
    let word = &captures["size"] == "4";
    let value = captures.name("value").map(|v| v.as_str());
    match (&captures["op"], value) {
        ("R" | "r", None) => Some(if word { Access::ReadWord(address) } else { Access::ReadByte(address) }),
        ("W" | "w", Some(value)) => Some(if word {
            Access::WriteWord(address, u32::from_str_radix(value, 16).ok()?)
        } else {
            Access::WriteByte(address, u8::from_str_radix(value, 16).ok()?)
        }),
        _ => None,
    }
}

/// The simulator replays traces against a hierarchy and collects results.
///
/// Accesses are grouped into steps. At the end of each step the per level counters are sampled,
/// added to the running totals, and reset, the way a host loop would sample the hierarchy once per
/// frame. Without a step size the whole trace is a single step.
///
/// It supports calling simulate multiple times, and will update the time taken to simulate and the
/// results accordingly
#[derive(Debug)]
pub struct Simulator {
    hierarchy: MemoryHierarchy,
    step_size: Option<u64>,
    pending: u64,
    result: SimulationResult,
    simulation_time: Duration,
}

/// The result of a simulation. Can be serialised to the output format
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SimulationResult {
    pub accesses: u64,
    pub steps: u64,
    /// Totals over every completed step, nearest level first
    pub levels: Vec<LevelReport>,
}

impl Simulator {
    /// Creates a new simulator for a given configuration
    pub fn new(config: &HierarchyConfig) -> Result<Self, MemError> {
        let hierarchy = MemoryHierarchy::new(config)?;
        let result = SimulationResult {
            accesses: 0,
            steps: 0,
            levels: hierarchy.report().levels,
        };
        Ok(Self {
            hierarchy,
            step_size: None,
            pending: 0,
            result,
            simulation_time: Duration::new(0, 0),
        })
    }

    /// Ends a step after every `step_size` accesses. Zero means the whole trace is one step
    pub fn with_step(mut self, step_size: u64) -> Self {
        self.step_size = (step_size > 0).then_some(step_size);
        self
    }

    /// Simulates a trace held in a byte array, one access per line
    ///
    /// Blank lines and lines starting with `#` are skipped. Lines are read strictly in order, so
    /// a memory mapped file can be advised for sequential access
    ///
    /// # Arguments
    ///
    /// * `bytes`: The trace
    ///
    /// returns: Result<&SimulationResult, SimulationError>
    pub fn simulate(&mut self, bytes: &[u8]) -> Result<&SimulationResult, SimulationError> {
        self.simulate_with(bytes, |_| {})
    }

    /// Same as simulate, calling `on_step` with the hierarchy at the end of every step, before its
    /// counters are reset. Observers get a shared reference, so they can't disturb the counters
    pub fn simulate_with<F: FnMut(&MemoryHierarchy)>(
        &mut self,
        bytes: &[u8],
        mut on_step: F,
    ) -> Result<&SimulationResult, SimulationError> {
        let start = Instant::now();
        for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
            let line = index + 1;
            let text = std::str::from_utf8(raw).map_err(|_| SimulationError::Parse {
                line,
                content: String::from_utf8_lossy(raw).into_owned(),
            })?;
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let access = parse_access(text).ok_or_else(|| SimulationError::Parse {
                line,
                content: text.to_string(),
            })?;
            access
                .apply(&mut self.hierarchy)
                .map_err(|source| SimulationError::Memory { line, source })?;
            self.result.accesses += 1;
            self.pending += 1;
            if self.step_size == Some(self.pending) {
                self.end_step(&mut on_step);
            }
        }
        if self.pending > 0 {
            self.end_step(&mut on_step);
        }
        self.simulation_time += start.elapsed();
        Ok(&self.result)
    }

    fn end_step<F: FnMut(&MemoryHierarchy)>(&mut self, on_step: &mut F) {
        on_step(&self.hierarchy);
        for (total, sample) in self.result.levels.iter_mut().zip(self.hierarchy.report().levels) {
            total.counters.accumulate(&sample.counters);
        }
        self.result.steps += 1;
        debug!("step {} done after {} accesses", self.result.steps, self.pending);
        self.pending = 0;
        self.hierarchy.reset_counters();
    }

    pub fn hierarchy(&self) -> &MemoryHierarchy {
        &self.hierarchy
    }

    /// Gets the wall-clock execution time for processing
    pub fn get_execution_time(&self) -> &Duration {
        &self.simulation_time
    }

    /// Gets the number of uninitialised lines for each level
    pub fn get_uninitialised_line_counts(&self) -> Vec<u64> {
        self.hierarchy.get_uninitialised_line_counts()
    }
}
