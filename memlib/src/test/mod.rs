use std::sync::{Mutex, Once};
use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use crate::cache::GenericLevel;
use crate::config::{CacheConfig, CacheKindConfig, HierarchyConfig};
use crate::line::CacheLine;

mod levels;

pub const LINE_SIZE: u64 = 64;

pub fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

pub fn memory(size: u64) -> GenericLevel {
    GenericLevel::memory(size, LINE_SIZE).unwrap()
}

/// A line for the given tag with every byte set to `fill`
pub fn filled_line(tag: u64, fill: u8) -> CacheLine {
    let mut line = CacheLine::new(LINE_SIZE, tag);
    line.bytes_mut().fill(fill);
    line
}

pub fn cache(name: &str, size: u64, kind: CacheKindConfig) -> CacheConfig {
    CacheConfig {
        name: name.to_string(),
        size,
        kind,
    }
}

pub fn hierarchy_config(memory_size: u64, caches: Vec<CacheConfig>) -> HierarchyConfig {
    HierarchyConfig {
        line_size: LINE_SIZE,
        memory_size,
        seed: 7,
        caches,
    }
}

lazy_static! {
    static ref RECORDED: Mutex<Vec<String>> = Mutex::new(Vec::new());
}

/// Keeps every log message so tests can check what the library reports
struct Recorder;

impl Log for Recorder {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDED.lock().unwrap().push(format!("{} {}", record.level(), record.args()));
    }

    fn flush(&self) {}
}

static RECORDER: Recorder = Recorder;

/// Installs the recording logger. Tests share it, so messages from other tests show up too
pub fn record_logs() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        log::set_logger(&RECORDER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Whether any message recorded so far is exactly `message`, prefixed by its level
pub fn logged(message: &str) -> bool {
    RECORDED.lock().unwrap().iter().any(|recorded| recorded == message)
}
