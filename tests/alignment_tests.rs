use approx::assert_relative_eq;
use disc_alignment::alignment::{place_inspections, reposition_dependent_region, AnchorContext, ImgPoint};
use disc_alignment::roi::{Roi, RoiRole, RoiShape};

fn anchors(
    baseline_m1: (f64, f64),
    baseline_m2: (f64, f64),
    current_m1: (f64, f64),
    current_m2: (f64, f64),
) -> AnchorContext {
    AnchorContext {
        baseline_m1: Some(ImgPoint::new(baseline_m1.0, baseline_m1.1)),
        baseline_m2: Some(ImgPoint::new(baseline_m2.0, baseline_m2.1)),
        current_m1: ImgPoint::new(current_m1.0, current_m1.1),
        current_m2: ImgPoint::new(current_m2.0, current_m2.1),
    }
}

#[test]
fn identity_anchors_leave_every_shape_unchanged() {
    let shapes = [
        Roi::rect("r", RoiRole::Inspection, 200.0, 150.0, 60.0, 40.0),
        Roi::circle("c", RoiRole::Inspection, 210.0, 140.0, 25.0),
        Roi::annulus("a", RoiRole::Inspection, 190.0, 160.0, 30.0, 12.0),
    ];

    let ctx = anchors((100.0, 100.0), (300.0, 100.0), (100.0, 100.0), (300.0, 100.0));
    for original in shapes {
        let mut target = original.clone();
        let mut baseline = Some(original.clone());
        reposition_dependent_region(&mut target, &mut baseline, &ctx);
        assert_eq!(target, original);
    }
}

#[test]
fn pure_translation_shifts_the_center_only() {
    let mut target = Roi::rect("r", RoiRole::Inspection, 200.0, 150.0, 60.0, 40.0);
    target.angle_deg = 12.5;
    let mut baseline = Some(target.clone());

    let ctx = anchors((100.0, 100.0), (300.0, 100.0), (110.0, 100.0), (310.0, 100.0));
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert_relative_eq!(target.cx, 210.0, epsilon = 1e-9);
    assert_relative_eq!(target.cy, 150.0, epsilon = 1e-9);
    assert_relative_eq!(target.angle_deg, 12.5, epsilon = 1e-9);
    match target.shape {
        RoiShape::Rect { width, height } => {
            assert_relative_eq!(width, 60.0, epsilon = 1e-9);
            assert_relative_eq!(height, 40.0, epsilon = 1e-9);
        }
        other => panic!("shape changed to {other:?}"),
    }
}

#[test]
fn rotation_and_scale_propagate_to_rectangles() {
    let mut target = Roi::rect("r", RoiRole::Inspection, 150.0, 100.0, 40.0, 20.0);
    let mut baseline = Some(target.clone());

    // Master vector turns 90 degrees and doubles in length.
    let ctx = anchors((100.0, 100.0), (200.0, 100.0), (100.0, 100.0), (100.0, 300.0));
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert_relative_eq!(target.cx, 100.0, epsilon = 1e-6);
    assert_relative_eq!(target.cy, 200.0, epsilon = 1e-6);
    assert_relative_eq!(target.angle_deg, 90.0, epsilon = 1e-6);
    match target.shape {
        RoiShape::Rect { width, height } => {
            assert_relative_eq!(width, 80.0, epsilon = 1e-6);
            assert_relative_eq!(height, 40.0, epsilon = 1e-6);
        }
        other => panic!("shape changed to {other:?}"),
    }
}

#[test]
fn circle_angle_is_copied_not_rotated() {
    let mut target = Roi::circle("c", RoiRole::Inspection, 150.0, 100.0, 20.0);
    target.angle_deg = 5.0;
    let mut baseline = Some(target.clone());

    let ctx = anchors((100.0, 100.0), (200.0, 100.0), (100.0, 100.0), (100.0, 200.0));
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert_relative_eq!(target.angle_deg, 5.0, epsilon = 1e-9);
    match target.shape {
        RoiShape::Circle { radius } => assert_relative_eq!(radius, 20.0, epsilon = 1e-6),
        other => panic!("shape changed to {other:?}"),
    }
}

#[test]
fn coincident_baseline_masters_use_the_midpoint_fallback() {
    let mut target = Roi::rect("r", RoiRole::Inspection, 500.0, 500.0, 30.0, 30.0);
    target.angle_deg = 7.0;
    let mut baseline = Some(target.clone());

    let ctx = anchors((100.0, 100.0), (100.0, 100.0), (120.0, 80.0), (180.0, 80.0));
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert_relative_eq!(target.cx, 150.0, epsilon = 1e-9);
    assert_relative_eq!(target.cy, 80.0, epsilon = 1e-9);
    assert_relative_eq!(target.angle_deg, 7.0, epsilon = 1e-9);
    assert!(target.cx.is_finite() && target.cy.is_finite());
    match target.shape {
        RoiShape::Rect { width, height } => {
            assert_relative_eq!(width, 30.0, epsilon = 1e-9);
            assert_relative_eq!(height, 30.0, epsilon = 1e-9);
        }
        other => panic!("shape changed to {other:?}"),
    }
}

#[test]
fn missing_baseline_masters_use_the_midpoint_fallback() {
    let mut target = Roi::circle("c", RoiRole::Inspection, 10.0, 10.0, 15.0);
    let mut baseline = Some(target.clone());

    let ctx = AnchorContext {
        baseline_m1: None,
        baseline_m2: None,
        current_m1: ImgPoint::new(40.0, 60.0),
        current_m2: ImgPoint::new(60.0, 100.0),
    };
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert_relative_eq!(target.cx, 50.0, epsilon = 1e-9);
    assert_relative_eq!(target.cy, 80.0, epsilon = 1e-9);
}

#[test]
fn first_call_bootstraps_the_baseline_from_the_target() {
    let target_initial = Roi::annulus("a", RoiRole::Inspection, 250.0, 250.0, 40.0, 18.0);
    let mut target = target_initial.clone();
    let mut baseline = None;

    let ctx = anchors((100.0, 100.0), (300.0, 100.0), (100.0, 100.0), (300.0, 100.0));
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert_eq!(baseline, Some(target_initial.clone()));
    assert_eq!(target, target_initial);
}

#[test]
fn annulus_radii_keep_their_invariant_across_scales() {
    for scale in [0.05, 0.1, 0.4, 1.0, 2.5, 10.0] {
        let mut target = Roi::annulus("a", RoiRole::Inspection, 150.0, 100.0, 20.0, 19.0);
        let mut baseline = Some(target.clone());

        let ctx = anchors(
            (0.0, 0.0),
            (100.0, 0.0),
            (0.0, 0.0),
            (100.0 * scale, 0.0),
        );
        reposition_dependent_region(&mut target, &mut baseline, &ctx);

        match target.shape {
            RoiShape::Annulus { radius, inner_radius } => {
                assert!(
                    inner_radius < radius,
                    "scale {scale}: inner {inner_radius} !< outer {radius}"
                );
                assert!(radius >= 1.0);
                assert!(inner_radius >= 0.0);
            }
            other => panic!("shape changed to {other:?}"),
        }
    }
}

#[test]
fn fallback_never_produces_nan() {
    let mut target = Roi::rect("r", RoiRole::Inspection, 0.0, 0.0, 10.0, 10.0);
    let mut baseline = Some(target.clone());

    // Degenerate: coincident current masters as well.
    let ctx = anchors((50.0, 50.0), (50.0, 50.0), (70.0, 70.0), (70.0, 70.0));
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert!(target.cx.is_finite());
    assert!(target.cy.is_finite());
    assert!(target.angle_deg.is_finite());
}

#[test]
fn batch_placement_applies_the_same_transform_to_each_roi() {
    let baselines = vec![
        Roi::rect("Inspection_1", RoiRole::Inspection, 200.0, 150.0, 60.0, 40.0),
        Roi::circle("Inspection_2", RoiRole::Inspection, 240.0, 180.0, 20.0),
    ];
    let mut targets = baselines.clone();

    let ctx = anchors((100.0, 100.0), (300.0, 100.0), (110.0, 100.0), (310.0, 100.0));
    place_inspections(&mut targets, &baselines, &ctx);

    assert_relative_eq!(targets[0].cx, 210.0, epsilon = 1e-9);
    assert_relative_eq!(targets[0].cy, 150.0, epsilon = 1e-9);
    assert_relative_eq!(targets[1].cx, 250.0, epsilon = 1e-9);
    assert_relative_eq!(targets[1].cy, 180.0, epsilon = 1e-9);
}

#[test]
fn baseline_inputs_are_never_mutated() {
    let baseline_roi = Roi::rect("r", RoiRole::Inspection, 200.0, 150.0, 60.0, 40.0);
    let mut target = baseline_roi.clone();
    let mut baseline = Some(baseline_roi.clone());

    let ctx = anchors((100.0, 100.0), (300.0, 100.0), (140.0, 120.0), (320.0, 90.0));
    reposition_dependent_region(&mut target, &mut baseline, &ctx);

    assert_eq!(baseline, Some(baseline_roi));
}
