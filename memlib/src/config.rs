use std::io::Read;
use serde::{Deserialize, Serialize};

/// Line width used when the configuration doesn't give one
pub const DEFAULT_LINE_SIZE: u64 = 64;
/// A 1024x800 frame of 4 byte pixels
pub const DEFAULT_MEMORY_SIZE: u64 = 3_276_800;
pub const DEFAULT_SEED: u64 = 2019;

/// A memory hierarchy configuration: the cache levels, nearest first, on top of main memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "default_line_size")]
    pub line_size: u64,
    #[serde(default = "default_memory_size")]
    pub memory_size: u64,
    /// Seeds the eviction generators of every randomly replaced level
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub caches: Vec<CacheConfig>,
}

/// A configuration for a single cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    pub size: u64,
    pub kind: CacheKindConfig,
}

/// The kind of cache - direct, full, 2way, 4way, 8way, or any power of two number of ways
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheKindConfig {
    #[serde(alias = "direct")]
    Direct,
    #[serde(alias = "full")]
    Full,
    #[serde(alias = "2way")]
    TwoWay,
    #[serde(alias = "4way")]
    FourWay,
    #[serde(alias = "8way")]
    EightWay,
    #[serde(alias = "ways")]
    Ways(u64),
}

impl CacheKindConfig {
    /// Ways per set for the set associative kinds, None for direct and fully associative caches
    pub fn ways(&self) -> Option<u64> {
        match self {
            CacheKindConfig::Direct | CacheKindConfig::Full => None,
            CacheKindConfig::TwoWay => Some(2),
            CacheKindConfig::FourWay => Some(4),
            CacheKindConfig::EightWay => Some(8),
            CacheKindConfig::Ways(ways) => Some(*ways),
        }
    }
}

fn default_line_size() -> u64 {
    DEFAULT_LINE_SIZE
}

fn default_memory_size() -> u64 {
    DEFAULT_MEMORY_SIZE
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl HierarchyConfig {
    /// Parses a JSON configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use memlib::config::{CacheKindConfig, HierarchyConfig};
    /// let json = r#"{ "caches": [ { "name": "L1", "size": 4096, "kind": "direct" } ] }"#;
    /// let config = HierarchyConfig::from_reader(json.as_bytes()).unwrap();
    /// assert_eq!(config.line_size, 64);
    /// assert_eq!(config.caches[0].kind, CacheKindConfig::Direct);
    /// ```
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    /// The three level hierarchy the simulator was first built around: 4 KB, 64 KB, and 256 KB of
    /// cache with 64 byte lines over 3.125 MB of memory, every level of the given kind
    pub fn reference(kind: CacheKindConfig) -> Self {
        let levels = [("L1", 6), ("L2", 10), ("L3", 12)];
        Self {
            line_size: DEFAULT_LINE_SIZE,
            memory_size: DEFAULT_MEMORY_SIZE,
            seed: DEFAULT_SEED,
            caches: levels
                .iter()
                .map(|(name, log_lines)| CacheConfig {
                    name: name.to_string(),
                    size: DEFAULT_LINE_SIZE << log_lines,
                    kind,
                })
                .collect(),
        }
    }
}
