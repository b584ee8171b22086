use std::error::Error;
use rand::Rng;
use crate::cache::{Cache, GenericLevel, Level, LevelCounters};
use crate::error::MemError;
use crate::replacement_policies::NoPolicy;
use super::{filled_line, memory, rng, LINE_SIZE};

const MEMORY_SIZE: u64 = 1 << 16;

fn all_kinds() -> Vec<GenericLevel> {
    vec![
        GenericLevel::direct_mapped(4096, LINE_SIZE).unwrap(),
        GenericLevel::fully_associative(4096, LINE_SIZE, rng(1)).unwrap(),
        GenericLevel::set_associative(4096, LINE_SIZE, 4, rng(1)).unwrap(),
        memory(MEMORY_SIZE),
    ]
}

#[test]
fn write_then_read_hits_with_same_bytes() -> Result<(), Box<dyn Error>> {
    for mut level in all_kinds() {
        let mut below = vec![memory(MEMORY_SIZE)];
        let written = filled_line(0x40, 0xAB);
        level.write_line(0x40 * LINE_SIZE, written.clone(), &mut below)?;
        let before = *level.counters();
        let read = level.read_line(0x40 * LINE_SIZE, &mut below)?;
        assert_eq!(read.bytes(), written.bytes(), "{}", level.kind());
        assert_eq!(read.tag, 0x40);
        assert_eq!(level.counters().read_hit, before.read_hit + 1, "{}", level.kind());
        assert_eq!(level.counters().read_miss, before.read_miss, "{}", level.kind());
    }
    Ok(())
}

#[test]
fn empty_cache_misses_on_address_zero() -> Result<(), Box<dyn Error>> {
    let mut level = GenericLevel::direct_mapped(4096, LINE_SIZE)?;
    let mut below = vec![memory(MEMORY_SIZE)];
    level.read_line(0, &mut below)?;
    assert_eq!(level.counters().read_miss, 1);
    assert_eq!(level.counters().read_hit, 0);
    assert_eq!(below[0].counters().read_hit, 1);
    Ok(())
}

#[test]
fn direct_mapped_collision_evicts() -> Result<(), Box<dyn Error>> {
    // 64 slots, so tags 1 and 65 share slot 1
    let mut level = GenericLevel::direct_mapped(4096, LINE_SIZE)?;
    let mut below = vec![memory(MEMORY_SIZE)];
    level.write_line(LINE_SIZE, filled_line(1, 1), &mut below)?;
    level.write_line(65 * LINE_SIZE, filled_line(65, 2), &mut below)?;
    assert_eq!(level.peek_slot(1).unwrap().tag, 65);
    level.reset_counters();
    level.read_line(LINE_SIZE, &mut below)?;
    assert_eq!(level.counters().read_miss, 1);
    Ok(())
}

#[test]
fn dirty_eviction_writes_back_once() -> Result<(), Box<dyn Error>> {
    let mut level = GenericLevel::direct_mapped(4096, LINE_SIZE)?;
    let mut below = vec![memory(MEMORY_SIZE)];
    let mut dirty = filled_line(1, 0x11);
    dirty.dirty = true;
    level.write_line(LINE_SIZE, dirty, &mut below)?;
    // Installing into an empty slot doesn't touch memory
    assert_eq!(below[0].counters().writes(), 0);

    level.write_line(65 * LINE_SIZE, filled_line(65, 0x22), &mut below)?;
    assert_eq!(below[0].counters().writes(), 1);
    let written_back = below[0].peek_slot(1).unwrap();
    assert_eq!(written_back.tag, 1);
    assert!(written_back.bytes().iter().all(|b| *b == 0x11));

    // Evicting the clean line leaves memory alone
    level.write_line(129 * LINE_SIZE, filled_line(129, 0x33), &mut below)?;
    assert_eq!(below[0].counters().writes(), 1);
    assert!(below[0].peek_slot(65).unwrap().bytes().iter().all(|b| *b == 0));
    Ok(())
}

fn holds(level: &GenericLevel, tag: u64) -> bool {
    (0..level.slot_count()).any(|slot| level.peek_slot(slot).map_or(false, |line| line.valid && line.tag == tag))
}

/// Installs one dirty line followed by clean lines of the same set until the dirty one is evicted.
/// Memory must see exactly one write, carrying the dirty line, and nothing from the clean victims
fn check_single_write_back(mut level: GenericLevel, dirty_tag: u64, clean_tags: Vec<u64>) -> Result<(), Box<dyn Error>> {
    let mut below = vec![memory(MEMORY_SIZE)];
    let mut dirty = filled_line(dirty_tag, 0x11);
    dirty.dirty = true;
    level.write_line(dirty_tag * LINE_SIZE, dirty, &mut below)?;
    for &tag in &clean_tags {
        level.write_line(tag * LINE_SIZE, filled_line(tag, 0x22), &mut below)?;
        let expected = if holds(&level, dirty_tag) { 0 } else { 1 };
        assert_eq!(below[0].counters().writes(), expected, "{}", level.kind());
    }
    assert!(!holds(&level, dirty_tag), "{}", level.kind());
    let written_back = below[0].peek_slot(dirty_tag as usize).unwrap();
    assert_eq!(written_back.tag, dirty_tag);
    assert!(written_back.bytes().iter().all(|b| *b == 0x11));
    for tag in clean_tags {
        assert!(below[0].peek_slot(tag as usize).unwrap().bytes().iter().all(|b| *b == 0));
    }
    Ok(())
}

#[test]
fn fully_associative_dirty_eviction_writes_back_once() -> Result<(), Box<dyn Error>> {
    let level = GenericLevel::fully_associative(4 * LINE_SIZE, LINE_SIZE, rng(13))?;
    check_single_write_back(level, 1, (2..202).collect())
}

#[test]
fn set_associative_dirty_eviction_writes_back_once() -> Result<(), Box<dyn Error>> {
    // 16 slots in 4 sets of 4, tags 1, 5, 9... all land in set 1
    let level = GenericLevel::set_associative(16 * LINE_SIZE, LINE_SIZE, 4, rng(13))?;
    check_single_write_back(level, 1, (1..201).map(|i| 1 + 4 * i).collect())
}

#[test]
fn memory_always_hits() -> Result<(), Box<dyn Error>> {
    let mut level = memory(MEMORY_SIZE);
    let mut generator = rng(3);
    for _ in 0..500 {
        let tag = generator.gen_range(0..MEMORY_SIZE / LINE_SIZE);
        if generator.gen_bool(0.5) {
            level.write_line(tag * LINE_SIZE, filled_line(tag, tag as u8), &mut [])?;
        } else {
            level.read_line(tag * LINE_SIZE, &mut [])?;
        }
    }
    assert_eq!(level.counters().read_miss, 0);
    assert_eq!(level.counters().write_miss, 0);
    assert_eq!(level.counters().reads() + level.counters().writes(), 500);
    Ok(())
}

#[test]
fn memory_rejects_lines_past_the_end() {
    let mut level = memory(MEMORY_SIZE);
    assert_eq!(
        level.read_line(MEMORY_SIZE, &mut []),
        Err(MemError::AddressOutOfRange { address: MEMORY_SIZE, limit: MEMORY_SIZE })
    );
    assert!(level.peek_slot((MEMORY_SIZE / LINE_SIZE) as usize).is_none());
    assert!(level.peek_slot(usize::MAX).is_none());
}

#[test]
fn misaligned_line_operations_fail() {
    for mut level in all_kinds() {
        let mut below = vec![memory(MEMORY_SIZE)];
        assert_eq!(
            level.read_line(3, &mut below),
            Err(MemError::AlignmentViolation { address: 3, alignment: LINE_SIZE })
        );
        assert!(matches!(
            level.write_line(LINE_SIZE + 8, filled_line(1, 0), &mut below),
            Err(MemError::AlignmentViolation { .. })
        ));
        assert_eq!(*level.counters(), LevelCounters::default());
    }
}

#[test]
fn tag_mismatch_fails() {
    for mut level in all_kinds() {
        let mut below = vec![memory(MEMORY_SIZE)];
        assert_eq!(
            level.write_line(LINE_SIZE, filled_line(2, 0), &mut below),
            Err(MemError::TagMismatch { address: LINE_SIZE, tag: 2, expected: 1 })
        );
        assert_eq!(*level.counters(), LevelCounters::default());
    }
}

#[test]
fn wrong_width_line_fails() {
    let mut level = GenericLevel::direct_mapped(4096, LINE_SIZE).unwrap();
    let mut below = vec![memory(MEMORY_SIZE)];
    let narrow = crate::line::CacheLine::new(32, 1);
    assert_eq!(
        level.write_line(LINE_SIZE, narrow, &mut below),
        Err(MemError::LineWidthMismatch { expected: 64, actual: 32 })
    );
}

#[test]
fn cache_without_next_level_cannot_miss() {
    let mut level = GenericLevel::fully_associative(4096, LINE_SIZE, rng(1)).unwrap();
    assert_eq!(level.read_line(0, &mut []), Err(MemError::MissingNextLevel));
    assert_eq!(level.counters().read_miss, 0);
}

#[test]
fn set_associative_stays_within_its_set() -> Result<(), Box<dyn Error>> {
    // 16 slots in 4 sets of 4, set 0 holds tags with low bits 00
    let mut level = GenericLevel::set_associative(1024, LINE_SIZE, 4, rng(5))?;
    let mut below = vec![memory(MEMORY_SIZE)];
    for tag in [0, 4, 8, 12, 16, 20, 24] {
        level.write_line(tag * LINE_SIZE, filled_line(tag, 0), &mut below)?;
    }
    for slot in 0..4 {
        assert_eq!(level.peek_slot(slot).unwrap().tag % 4, 0);
    }
    for slot in 4..16 {
        assert!(!level.peek_slot(slot).unwrap().valid);
    }
    assert!(level.get_uninitialised_line_count() >= 12);
    assert_eq!(level.counters().write_miss, 7);
    Ok(())
}

/// Runs the same sequence of reads and writes against a level, returning whether each was a hit
fn hit_pattern(level: &mut GenericLevel, seed: u64) -> Result<Vec<bool>, MemError> {
    let mut below = vec![memory(MEMORY_SIZE)];
    let mut generator = rng(seed);
    let mut hits = Vec::new();
    for _ in 0..2000 {
        let tag = generator.gen_range(0..256);
        let before = *level.counters();
        if generator.gen_bool(0.3) {
            let mut line = filled_line(tag, tag as u8);
            line.dirty = true;
            level.write_line(tag * LINE_SIZE, line, &mut below)?;
            hits.push(level.counters().write_hit > before.write_hit);
        } else {
            level.read_line(tag * LINE_SIZE, &mut below)?;
            hits.push(level.counters().read_hit > before.read_hit);
        }
    }
    Ok(hits)
}

#[test]
fn one_way_matches_direct_mapped() -> Result<(), Box<dyn Error>> {
    let mut direct = GenericLevel::direct_mapped(4096, LINE_SIZE)?;
    let mut one_way = GenericLevel::set_associative(4096, LINE_SIZE, 1, rng(9))?;
    assert_eq!(hit_pattern(&mut direct, 11)?, hit_pattern(&mut one_way, 11)?);
    Ok(())
}

#[test]
fn all_way_matches_fully_associative() -> Result<(), Box<dyn Error>> {
    // Same generator seed, so both pick the same victims
    let mut full = GenericLevel::fully_associative(4096, LINE_SIZE, rng(9))?;
    let mut all_way = GenericLevel::set_associative(4096, LINE_SIZE, 64, rng(9))?;
    let pattern = hit_pattern(&mut full, 12)?;
    assert_eq!(pattern, hit_pattern(&mut all_way, 12)?);
    assert!(pattern.iter().any(|hit| *hit));
    assert!(pattern.iter().any(|hit| !*hit));
    Ok(())
}

#[test]
fn eviction_is_reproducible_for_a_seed() -> Result<(), Box<dyn Error>> {
    let mut first = GenericLevel::fully_associative(1024, LINE_SIZE, rng(21))?;
    let mut second = GenericLevel::fully_associative(1024, LINE_SIZE, rng(21))?;
    hit_pattern(&mut first, 4)?;
    hit_pattern(&mut second, 4)?;
    for slot in 0..first.slot_count() {
        assert_eq!(first.peek_slot(slot), second.peek_slot(slot));
    }
    Ok(())
}

#[test]
fn peek_leaves_counters_alone() -> Result<(), Box<dyn Error>> {
    let mut level = GenericLevel::set_associative(1024, LINE_SIZE, 2, rng(2))?;
    hit_pattern(&mut level, 8)?;
    let counters = *level.counters();
    let slots: Vec<_> = (0..level.slot_count()).map(|slot| level.peek_slot(slot)).collect();
    let again: Vec<_> = (0..level.slot_count()).map(|slot| level.peek_slot(slot)).collect();
    assert_eq!(slots, again);
    assert_eq!(*level.counters(), counters);
    Ok(())
}

#[test]
fn invalid_geometries_are_rejected() {
    let invalid = [
        GenericLevel::direct_mapped(3 * LINE_SIZE, LINE_SIZE),
        GenericLevel::direct_mapped(0, LINE_SIZE),
        GenericLevel::direct_mapped(4096 + 1, LINE_SIZE),
        GenericLevel::set_associative(4096, LINE_SIZE, 3, rng(0)),
        GenericLevel::set_associative(4096, LINE_SIZE, 128, rng(0)),
        GenericLevel::set_associative(6 * LINE_SIZE, LINE_SIZE, 2, rng(0)),
        GenericLevel::fully_associative(100, LINE_SIZE, rng(0)),
        GenericLevel::memory(100, LINE_SIZE),
    ];
    for level in invalid {
        assert!(matches!(level, Err(MemError::InvalidConfiguration(_))), "{level:?}");
    }
    assert!(Cache::new(4096, 48, 1, NoPolicy).is_err());
    // Fully associative caches don't need a power of two slot count
    assert_eq!(GenericLevel::fully_associative(3 * LINE_SIZE, LINE_SIZE, rng(0)).unwrap().slot_count(), 3);
}

#[test]
fn address_to_set_and_tag_uses_low_tag_bits() -> Result<(), Box<dyn Error>> {
    // 64 slots in 16 sets of 4
    let cache = Cache::new(4096, LINE_SIZE, 4, NoPolicy)?;
    assert_eq!(cache.address_to_set_and_tag(0), (0, 0));
    assert_eq!(cache.address_to_set_and_tag(5 * LINE_SIZE), (20, 5));
    assert_eq!(cache.address_to_set_and_tag(21 * LINE_SIZE), (20, 21));
    Ok(())
}
