//! Rate Model Tests
//!
//! Tests for:
//! - RateClass palette indices, densities and byte decoding
//! - ThresholdTable monotonic mapping and tie handling
//! - ThresholdTable validation and the skip bucket
//! - Serde round trip of tables and settings

use temporal_vrs::errors::VrsError;
use temporal_vrs::rate::{RateClass, ThresholdTable};
use temporal_vrs::settings::PipelineSettings;

const EPSILON: f32 = 1e-6;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

// ============================================================================
// RateClass
// ============================================================================

#[test]
fn finest_class_is_full_rate() {
    assert_eq!(RateClass::FINEST, RateClass::X1PerPixel);
    assert_eq!(RateClass::FINEST.index(), 5);
    assert!(approx(RateClass::FINEST.invocation_density(), 1.0));
    assert_eq!(RateClass::default(), RateClass::FINEST);
}

#[test]
fn coarse_blocks_cover_expected_pixels() {
    assert_eq!(RateClass::PerTwoByOne.coarse_block(), (2, 1));
    assert_eq!(RateClass::PerOneByTwo.coarse_block(), (1, 2));
    assert_eq!(RateClass::PerFourByFour.coarse_block(), (4, 4));
    assert_eq!(RateClass::X8PerPixel.coarse_block(), (1, 1));
    assert_eq!(RateClass::X8PerPixel.samples(), 8);
}

#[test]
fn byte_decoding_rejects_out_of_palette_values() {
    assert_eq!(RateClass::try_from(11u8), Ok(RateClass::PerFourByFour));
    assert_eq!(RateClass::try_from(12u8), Err(12));
    assert_eq!(RateClass::try_from(255u8), Err(255));
}

// ============================================================================
// ThresholdTable: Mapping
// ============================================================================

#[test]
fn default_table_maps_zero_to_coarsest_and_one_to_finest() {
    let table = ThresholdTable::default();
    assert_eq!(table.classify(0.0), RateClass::PerFourByFour);
    assert_eq!(table.classify(1.0), RateClass::X1PerPixel);
    assert_eq!(table.coarsest(), RateClass::PerFourByFour);
    assert_eq!(table.finest(), RateClass::X1PerPixel);
}

#[test]
fn mapping_is_monotonic_in_discrepancy() {
    let table = ThresholdTable::default();
    let mut last = 0.0f32;
    for step in 0..=1000 {
        let d = step as f32 / 1000.0;
        let density = table.classify(d).invocation_density();
        assert!(
            density >= last,
            "density dropped from {last} to {density} at d = {d}"
        );
        last = density;
    }
}

#[test]
fn value_on_threshold_stays_in_coarser_bucket() {
    let table = ThresholdTable::default();
    assert_eq!(table.classify(0.02), RateClass::PerFourByFour);
    assert_eq!(table.classify(0.020_001), RateClass::PerFourByTwo);
    assert_eq!(table.classify(0.10), RateClass::PerTwoByTwo);
    assert_eq!(table.classify(0.20), RateClass::PerTwoByOne);
}

#[test]
fn nan_discrepancy_maps_to_coarsest() {
    let table = ThresholdTable::default();
    assert_eq!(table.classify(f32::NAN), table.coarsest());
}

// ============================================================================
// ThresholdTable: Validation
// ============================================================================

#[test]
fn ladder_length_must_match_thresholds() {
    let err = ThresholdTable::new(vec![0.1], vec![RateClass::PerTwoByTwo]).unwrap_err();
    assert!(matches!(err, VrsError::InvalidThresholds(_)), "got {err:?}");
}

#[test]
fn thresholds_must_strictly_increase() {
    let err = ThresholdTable::new(
        vec![0.1, 0.1],
        vec![
            RateClass::PerFourByFour,
            RateClass::PerTwoByTwo,
            RateClass::X1PerPixel,
        ],
    )
    .unwrap_err();
    assert!(matches!(err, VrsError::InvalidThresholds(_)));
}

#[test]
fn ladder_must_go_coarse_to_fine() {
    let err = ThresholdTable::new(
        vec![0.1],
        vec![RateClass::X1PerPixel, RateClass::PerTwoByTwo],
    )
    .unwrap_err();
    assert!(matches!(err, VrsError::InvalidThresholds(_)));
}

#[test]
fn non_finite_threshold_is_rejected() {
    assert!(
        ThresholdTable::new(
            vec![f32::INFINITY],
            vec![RateClass::PerTwoByTwo, RateClass::X1PerPixel]
        )
        .is_err()
    );
    assert!(
        ThresholdTable::new(
            vec![-0.5],
            vec![RateClass::PerTwoByTwo, RateClass::X1PerPixel]
        )
        .is_err()
    );
}

// ============================================================================
// Skip Bucket
// ============================================================================

#[test]
fn skip_bucket_catches_near_zero_discrepancy() {
    let table = ThresholdTable::default().with_skip(1e-3).unwrap();
    assert_eq!(table.classify(0.0), RateClass::NoInvocations);
    assert_eq!(table.classify(1e-3), RateClass::NoInvocations);
    assert_eq!(table.classify(0.01), RateClass::PerFourByFour);
    assert_eq!(table.coarsest_shaded(), RateClass::PerFourByFour);
}

#[test]
fn skip_bucket_cannot_be_added_twice() {
    let table = ThresholdTable::default().with_skip(1e-3).unwrap();
    assert!(table.with_skip(1e-4).is_err());
}

#[test]
fn skip_epsilon_above_first_threshold_is_rejected() {
    assert!(ThresholdTable::default().with_skip(0.5).is_err());
}

// ============================================================================
// Serde
// ============================================================================

#[test]
fn table_round_trips_through_json() {
    let table = ThresholdTable::default().with_skip(1e-3).unwrap();
    let json = serde_json::to_string(&table).unwrap();
    let back: ThresholdTable = serde_json::from_str(&json).unwrap();
    assert_eq!(back, table);
}

#[test]
fn invalid_table_fails_to_deserialize() {
    let json = r#"{"thresholds":[0.2,0.1],"ladder":["PerFourByFour","PerTwoByTwo","X1PerPixel"]}"#;
    assert!(serde_json::from_str::<ThresholdTable>(json).is_err());
}

#[test]
fn partial_settings_fill_in_defaults() {
    let settings: PipelineSettings =
        serde_json::from_str(r#"{"history_slots":4,"rate_adaptive":false}"#).unwrap();
    assert_eq!(settings.history_slots, 4);
    assert!(!settings.rate_adaptive);
    assert_eq!(settings.thresholds, ThresholdTable::default());
    assert!(settings.validate().is_ok());
}

#[test]
fn single_history_slot_fails_validation() {
    let settings = PipelineSettings {
        history_slots: 1,
        ..Default::default()
    };
    assert!(matches!(
        settings.validate(),
        Err(VrsError::InvalidSettings(_))
    ));
}
