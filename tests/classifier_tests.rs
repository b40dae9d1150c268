//! Rate Classifier Tests
//!
//! Tests for:
//! - Static camera convergence to the coarsest bucket
//! - Disocclusion (behind camera, background/geometry mismatch) → finest
//! - Weighting of the discrepancy terms
//! - Input validation (extent mismatches)

use glam::{Mat4, Vec3};

use temporal_vrs::errors::VrsError;
use temporal_vrs::rate::{ClassifierInputs, DiscrepancyWeights, RateClass, RateClassifier, ThresholdTable};
use temporal_vrs::resources::{
    ColorImage, DepthImage, Extent, ImageLayout, TemporalTransform, TileGrid, TileSize,
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn view_projection(eye: Vec3, forward: Vec3) -> Mat4 {
    let projection = Mat4::perspective_rh(60f32.to_radians(), WIDTH as f32 / HEIGHT as f32, 0.1, 256.0);
    projection * Mat4::look_to_rh(eye, forward, Vec3::Y)
}

fn depth(value: f32) -> DepthImage {
    DepthImage::new("depth", Extent::new(WIDTH, HEIGHT), value, ImageLayout::ShaderRead).unwrap()
}

fn color(texel: [u8; 4]) -> ColorImage {
    ColorImage::new("color", Extent::new(WIDTH, HEIGHT), texel, ImageLayout::General).unwrap()
}

fn classifier() -> RateClassifier {
    RateClassifier::new(
        ThresholdTable::default(),
        DiscrepancyWeights::default(),
        TileSize::square(16),
    )
}

fn grid() -> TileGrid {
    TileGrid::new(TileSize::square(16).grid_for(Extent::new(WIDTH, HEIGHT)), RateClass::FINEST).unwrap()
}

fn classify(
    classifier: &RateClassifier,
    previous_depth: &DepthImage,
    current_depth: &DepthImage,
    previous_color: &ColorImage,
    transform: &TemporalTransform,
) -> TileGrid {
    let mut out = grid();
    classifier
        .classify(
            &ClassifierInputs {
                previous_depth,
                current_depth,
                previous_color,
                transform,
            },
            &mut out,
        )
        .unwrap();
    out
}

// ============================================================================
// Static Scene
// ============================================================================

#[test]
fn static_camera_converges_to_coarsest() {
    let vp = view_projection(Vec3::ZERO, Vec3::NEG_Z);
    let transform = TemporalTransform::new(vp);
    let d = depth(0.98);
    let out = classify(&classifier(), &d, &d, &color([128, 128, 128, 255]), &transform);
    assert!(
        out.all(RateClass::PerFourByFour),
        "static frame should be coarsest everywhere: {:?}",
        out.histogram()
    );
}

#[test]
fn static_background_is_coarsest() {
    let transform = TemporalTransform::new(view_projection(Vec3::ZERO, Vec3::NEG_Z));
    let d = depth(1.0);
    let out = classify(&classifier(), &d, &d, &color([0, 0, 0, 255]), &transform);
    assert!(out.all(RateClass::PerFourByFour));
}

// ============================================================================
// Disocclusion
// ============================================================================

#[test]
fn half_turn_marks_every_tile_finest() {
    let mut transform = TemporalTransform::new(view_projection(Vec3::ZERO, Vec3::NEG_Z));
    transform.advance(view_projection(Vec3::ZERO, Vec3::Z));
    let d = depth(0.98);
    let out = classify(&classifier(), &d, &d, &color([128, 128, 128, 255]), &transform);
    assert!(
        out.all(RateClass::X1PerPixel),
        "everything behind the previous camera must be finest: {:?}",
        out.histogram()
    );
}

#[test]
fn geometry_appearing_over_background_is_finest() {
    let transform = TemporalTransform::new(view_projection(Vec3::ZERO, Vec3::NEG_Z));
    let out = classify(
        &classifier(),
        &depth(1.0),
        &depth(0.98),
        &color([0, 0, 0, 255]),
        &transform,
    );
    assert!(out.all(RateClass::X1PerPixel));
}

#[test]
fn single_disoccluded_pixel_promotes_its_tile_only() {
    let transform = TemporalTransform::new(view_projection(Vec3::ZERO, Vec3::NEG_Z));
    let previous = depth(0.98);
    let mut current = depth(0.98);
    current.set(20, 5, 1.0);

    let out = classify(&classifier(), &previous, &current, &color([64, 64, 64, 255]), &transform);
    assert_eq!(out.get(1, 0), RateClass::X1PerPixel, "tile holding the pixel");
    assert_eq!(out.get(0, 0), RateClass::PerFourByFour);
    assert_eq!(out.get(3, 2), RateClass::PerFourByFour);
}

// ============================================================================
// Weights
// ============================================================================

#[test]
fn zero_weights_ignore_geometric_change() {
    let mut transform = TemporalTransform::new(view_projection(Vec3::new(0.0, 0.0, 0.1), Vec3::NEG_Z));
    transform.advance(view_projection(Vec3::ZERO, Vec3::NEG_Z));
    let quiet = RateClassifier::new(
        ThresholdTable::default(),
        DiscrepancyWeights {
            depth: 0.0,
            color: 0.0,
            motion: 0.0,
        },
        TileSize::square(16),
    );
    let d = depth(0.98);
    let out = classify(&quiet, &d, &d, &color([128, 128, 128, 255]), &transform);
    assert!(out.all(RateClass::PerFourByFour), "{:?}", out.histogram());
}

#[test]
fn pixel_discrepancy_stays_in_unit_range() {
    let mut transform = TemporalTransform::new(view_projection(Vec3::ZERO, Vec3::NEG_Z));
    transform.advance(view_projection(Vec3::new(0.3, 0.1, 0.0), Vec3::new(0.2, 0.0, -1.0)));
    let classifier = classifier();
    let previous = depth(0.9);
    let current = depth(0.99);
    let color = color([200, 10, 10, 255]);
    let inputs = ClassifierInputs {
        previous_depth: &previous,
        current_depth: &current,
        previous_color: &color,
        transform: &transform,
    };
    for y in (0..HEIGHT).step_by(7) {
        for x in (0..WIDTH).step_by(5) {
            let d = classifier.pixel_discrepancy(&inputs, x, y);
            assert!((0.0..=1.0).contains(&d), "d = {d} at ({x}, {y})");
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn mismatched_history_extent_is_rejected() {
    let transform = TemporalTransform::default();
    let previous = DepthImage::new("previous depth", Extent::new(32, 32), 1.0, ImageLayout::ShaderRead).unwrap();
    let current = depth(1.0);
    let color = color([0; 4]);
    let mut out = grid();
    let err = classifier()
        .classify(
            &ClassifierInputs {
                previous_depth: &previous,
                current_depth: &current,
                previous_color: &color,
                transform: &transform,
            },
            &mut out,
        )
        .unwrap_err();
    assert!(
        matches!(err, VrsError::ExtentMismatch { image: "previous depth", .. }),
        "got {err:?}"
    );
}

#[test]
fn mismatched_output_grid_is_rejected() {
    let transform = TemporalTransform::default();
    let d = depth(1.0);
    let color = color([0; 4]);
    let mut out = TileGrid::new(Extent::new(1, 1), RateClass::FINEST).unwrap();
    let result = classifier().classify(
        &ClassifierInputs {
            previous_depth: &d,
            current_depth: &d,
            previous_color: &color,
            transform: &transform,
        },
        &mut out,
    );
    assert!(matches!(result, Err(VrsError::ExtentMismatch { .. })));
}
