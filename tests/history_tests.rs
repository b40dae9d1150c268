//! History & Classification Buffer Tests
//!
//! Tests for:
//! - HistoryStore ring indexing (current / previous, wrap-around)
//! - HistoryStore reallocation on resize
//! - ClassificationBuffer sizing, publication and reset
//! - TemporalTransform roll-over

use glam::{Mat4, Vec3};

use temporal_vrs::errors::{Result, VrsError};
use temporal_vrs::rate::RateClass;
use temporal_vrs::resources::{ClassificationBuffer, Extent, HistoryStore, TemporalTransform, TileSize};

/// Slot payload that remembers which allocation produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tagged {
    slot: usize,
    extent: Extent,
}

fn store(slots: u32, extent: Extent) -> Result<HistoryStore<Tagged, Extent>> {
    HistoryStore::allocate(slots, extent, |slot, extent| Ok(Tagged { slot, extent }), Ok)
}

// ============================================================================
// HistoryStore: Ring Indexing
// ============================================================================

#[test]
fn fresh_store_starts_at_slot_zero() {
    let history = store(3, Extent::new(64, 32)).unwrap();
    assert_eq!(history.slot_count(), 3);
    assert_eq!(history.current_index(), 0);
    assert_eq!(history.previous_index(), 2);
    assert_eq!(history.generation(), 0);
}

#[test]
fn after_k_advances_current_is_k_mod_n() {
    for slots in 2..=5u32 {
        let mut history = store(slots, Extent::new(8, 8)).unwrap();
        for k in 0..(slots as usize * 3 + 1) {
            assert_eq!(history.current_index(), k % slots as usize, "N = {slots}, k = {k}");
            history.advance();
        }
    }
}

#[test]
fn previous_is_always_one_behind_current() {
    let mut history = store(3, Extent::new(8, 8)).unwrap();
    for _ in 0..10 {
        let n = history.slot_count();
        assert_eq!(history.previous_index(), (history.current_index() + n - 1) % n);
        assert_ne!(history.previous_index(), history.current_index());
        history.advance();
    }
}

#[test]
fn slot_accessors_follow_the_cursor() {
    let mut history = store(3, Extent::new(8, 8)).unwrap();
    history.advance();
    assert_eq!(history.current_depth_slot().slot, 1);
    assert_eq!(history.previous_depth_slot().slot, 0);
    assert_eq!(history.depth_slot(2).slot, 2);
}

#[test]
fn fewer_than_two_slots_is_rejected() {
    let err = store(1, Extent::new(8, 8)).unwrap_err();
    assert!(matches!(err, VrsError::InvalidSettings(_)), "got {err:?}");
}

#[test]
fn allocation_failure_propagates() {
    let result: Result<HistoryStore<u8, u8>> = HistoryStore::allocate(
        3,
        Extent::new(8, 8),
        |slot, _| {
            if slot == 2 {
                Err(VrsError::AllocationFailed {
                    resource: "depth history",
                    reason: "out of memory".into(),
                })
            } else {
                Ok(0)
            }
        },
        |_| Ok(0),
    );
    assert!(matches!(result, Err(VrsError::AllocationFailed { .. })));
}

// ============================================================================
// HistoryStore: Reallocation
// ============================================================================

#[test]
fn reallocate_resets_cursor_and_resizes_every_slot() {
    let mut history = store(3, Extent::new(64, 32)).unwrap();
    history.advance();
    history.advance();

    let extent = Extent::new(128, 96);
    history
        .reallocate(extent, |slot, extent| Ok(Tagged { slot, extent }), Ok)
        .unwrap();

    assert_eq!(history.current_index(), 0);
    assert_eq!(history.slot_count(), 3);
    assert_eq!(history.extent(), extent);
    assert_eq!(history.generation(), 1);
    for i in 0..3 {
        assert_eq!(history.depth_slot(i).extent, extent);
    }
    assert_eq!(*history.color_slot(), extent);
}

#[test]
fn failed_reallocate_keeps_previous_slots() {
    let old = Extent::new(64, 32);
    let mut history = store(3, old).unwrap();
    history.advance();

    let result = history.reallocate(
        Extent::new(128, 96),
        |slot, extent| {
            if slot == 1 {
                Err(VrsError::AllocationFailed {
                    resource: "depth history",
                    reason: "out of memory".into(),
                })
            } else {
                Ok(Tagged { slot, extent })
            }
        },
        Ok,
    );

    assert!(matches!(result, Err(VrsError::AllocationFailed { .. })));
    assert_eq!(history.slot_count(), 3);
    assert_eq!(history.current_index(), 1);
    assert_eq!(history.previous_index(), 0);
    assert_eq!(history.extent(), old);
    assert_eq!(history.generation(), 0);
    for i in 0..3 {
        assert_eq!(history.depth_slot(i).extent, old);
    }
    assert_eq!(*history.color_slot(), old);
}

// ============================================================================
// ClassificationBuffer
// ============================================================================

#[test]
fn grid_rounds_partial_tiles_up() {
    let buffer = ClassificationBuffer::new(Extent::new(100, 50), TileSize::square(16)).unwrap();
    assert_eq!(buffer.grid_extent(), Extent::new(7, 4));
    assert_eq!(buffer.tile_count(), 28);
}

#[test]
fn fresh_buffer_holds_finest_rate() {
    let buffer = ClassificationBuffer::new(Extent::new(64, 64), TileSize::square(16)).unwrap();
    assert!(buffer.snapshot().all(RateClass::FINEST));
    assert!(buffer.target().read().all(RateClass::FINEST));
}

#[test]
fn publish_exposes_the_target_grid() {
    let mut buffer = ClassificationBuffer::new(Extent::new(32, 32), TileSize::square(16)).unwrap();
    buffer.target().write().fill(RateClass::PerFourByFour);
    assert!(buffer.snapshot().all(RateClass::FINEST), "unpublished output must not be bound");

    buffer.publish();
    assert!(buffer.snapshot().all(RateClass::PerFourByFour));
    assert!(buffer.target().read().all(RateClass::FINEST));
}

#[test]
fn resize_restores_finest_rate_and_new_grid() {
    let mut buffer = ClassificationBuffer::new(Extent::new(32, 32), TileSize::square(16)).unwrap();
    buffer.target().write().fill(RateClass::PerTwoByTwo);
    buffer.publish();

    buffer.resize(Extent::new(64, 48)).unwrap();
    assert_eq!(buffer.grid_extent(), Extent::new(4, 3));
    assert!(buffer.snapshot().all(RateClass::FINEST));
}

#[test]
fn histogram_counts_every_tile() {
    let mut buffer = ClassificationBuffer::new(Extent::new(64, 32), TileSize::square(16)).unwrap();
    {
        let target = buffer.target();
        let mut grid = target.write();
        grid.set(0, 0, RateClass::PerFourByFour);
        grid.set(3, 1, RateClass::PerFourByFour);
    }
    buffer.publish();
    let histogram = buffer.snapshot().histogram();
    assert_eq!(histogram[RateClass::PerFourByFour.index() as usize], 2);
    assert_eq!(histogram[RateClass::FINEST.index() as usize], 6);
    assert_eq!(histogram.iter().sum::<u32>(), 8);
}

// ============================================================================
// TemporalTransform
// ============================================================================

#[test]
fn advance_rolls_current_into_previous() {
    let a = Mat4::from_translation(Vec3::X);
    let b = Mat4::from_translation(Vec3::Y);
    let mut transform = TemporalTransform::new(a);
    assert!(transform.is_static());

    transform.advance(b);
    assert_eq!(transform.previous(), a);
    assert_eq!(transform.current(), b);
    assert!(!transform.is_static());

    transform.advance(b);
    assert!(transform.is_static(), "static camera must converge after one roll");
}
