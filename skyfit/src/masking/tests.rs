use glam::DVec2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::*;
use crate::geometry::Ellipse;
use crate::testing::uniform_noise;

fn circular(radius: f64, annulus_width: f64) -> ApertureGeometry {
    ApertureGeometry::new(Ellipse::circle(radius), annulus_width)
}

fn single_trial_config() -> MaskingConfig {
    MaskingConfig {
        dither: DitherGrid::single(),
        ..Default::default()
    }
}

#[test]
fn test_sector_value_fills_matching_aperture_pixels() {
    let center = DVec2::new(50.0, 50.0);
    let geometry = circular(5.0, 3.0);
    let config = single_trial_config();

    let mut data = Frame::new_filled(100, 100, 0.0);
    for y in 0..100 {
        for x in 0..100 {
            let pixel = DVec2::new(x as f64, y as f64);
            if geometry.classify(pixel - center) == Region::Annulus {
                let (_, angle) = to_polar(center, pixel);
                if angular_sector(angle, config.sectors) == 0 {
                    data[(x, y)] = 10.0;
                }
            }
        }
    }

    let masked = mask_source(&data, None, center, &geometry, &config).unwrap();
    assert_eq!(masked.trials_used, 1);

    let mut in_sector = 0;
    for y in 40..=60 {
        for x in 40..=60 {
            let pixel = DVec2::new(x as f64, y as f64);
            if geometry.classify(pixel - center) != Region::Aperture {
                continue;
            }
            assert!(masked.mask[(x, y)]);
            let (_, angle) = to_polar(center, pixel);
            let expected = if angular_sector(angle, config.sectors) == 0 {
                in_sector += 1;
                10.0
            } else {
                0.0
            };
            assert_eq!(masked.frame[(x, y)], expected, "pixel ({x}, {y})");
        }
    }
    assert!(in_sector > 0);
}

#[test]
fn test_pixels_outside_apertures_are_unchanged() {
    let data = uniform_noise(60, 60, 5.0, 7);
    let center = DVec2::new(30.3, 29.7);
    let geometry = circular(4.0, 3.0);
    let config = MaskingConfig::default();

    let masked = mask_source(&data, None, center, &geometry, &config).unwrap();
    assert_eq!(masked.trials_used, 8);

    // Canonical offsets reach at most sqrt(2) px.
    let reach = 4.0 + std::f64::consts::SQRT_2;
    for y in 0..60 {
        for x in 0..60 {
            let d = (DVec2::new(x as f64, y as f64) - center).length();
            if !masked.mask[(x, y)] {
                assert_eq!(masked.frame[(x, y)].to_bits(), data[(x, y)].to_bits());
            }
            if d > reach {
                assert!(!masked.mask[(x, y)], "pixel ({x}, {y}) flagged");
            }
        }
    }
    assert!(masked.replaced_pixels() > 0);
}

#[test]
fn test_dither_order_does_not_change_output() {
    let data = uniform_noise(48, 48, 3.0, 11);
    let center = DVec2::new(23.6, 24.2);
    let geometry = circular(5.0, 4.0);
    let config = MaskingConfig::default();
    let reference = mask_source(&data, None, center, &geometry, &config).unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..5 {
        let mut offsets = config.dither.offsets().to_vec();
        offsets.shuffle(&mut rng);
        let shuffled = MaskingConfig {
            dither: DitherGrid::new(offsets),
            ..config.clone()
        };
        let masked = mask_source(&data, None, center, &geometry, &shuffled).unwrap();
        assert_eq!(masked.mask, reference.mask);
        for (a, b) in masked.frame.iter().zip(reference.frame.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}

#[test]
fn test_aperture_off_frame_is_geometry_error() {
    let data = Frame::new_filled(20, 20, 1.0);
    let result = mask_source(
        &data,
        None,
        DVec2::new(-40.0, 10.0),
        &circular(3.0, 2.0),
        &MaskingConfig::default(),
    );
    assert!(matches!(result, Err(SliceError::Geometry { width: 20, .. })));
}

#[test]
fn test_partially_off_frame_dither_uses_valid_trials() {
    let data = Frame::new_filled(20, 20, 2.0);
    // Only the trials shifted by +1 px in x reach column 0.
    let masked = mask_source(
        &data,
        None,
        DVec2::new(-4.5, 10.0),
        &circular(4.0, 3.0),
        &MaskingConfig::default(),
    )
    .unwrap();
    assert_eq!(masked.trials_total, 8);
    assert_eq!(masked.trials_used, 3);
    assert!(masked.mask[(0, 10)]);
    assert!(masked.frame.iter().all(|&v| v == 2.0));
}

#[test]
fn test_invalid_annulus_pixels_are_ignored() {
    let center = DVec2::new(30.0, 30.0);
    let geometry = circular(4.0, 3.0);
    let config = single_trial_config();

    let mut data = Frame::new_filled(60, 60, 0.0);
    let mut valid = Mask::new_filled(60, 60, true);
    for y in 0..60 {
        for x in 0..60 {
            let pixel = DVec2::new(x as f64, y as f64);
            if geometry.classify(pixel - center) == Region::Annulus {
                let (_, angle) = to_polar(center, pixel);
                if angular_sector(angle, config.sectors) == 0 {
                    data[(x, y)] = 1000.0;
                    valid[(x, y)] = false;
                }
            }
        }
    }

    let masked = mask_source(&data, Some(&valid), center, &geometry, &config).unwrap();
    assert_eq!(masked.frame[(30, 30)], 0.0);
    assert_eq!(masked.frame[(32, 30)], 0.0);

    let unmasked = mask_source(&data, None, center, &geometry, &config).unwrap();
    assert_eq!(unmasked.frame[(32, 30)], 1000.0);
}

#[test]
fn test_sparse_sectors_fall_back_to_ring_median() {
    let center = DVec2::new(50.0, 50.0);
    let data = Frame::from_fn(100, 100, |x, _| x as f32);
    let config = MaskingConfig {
        min_sector_pixels: 10_000,
        dither: DitherGrid::single(),
        ..Default::default()
    };

    let masked = mask_source(&data, None, center, &circular(5.0, 3.0), &config).unwrap();
    for y in 45..=55 {
        for x in 45..=55 {
            if masked.mask[(x, y)] {
                assert_eq!(masked.frame[(x, y)], 50.0);
            }
        }
    }
    assert_eq!(masked.mask.count_set(), masked.replaced_pixels());
}

#[test]
fn test_valid_mask_shape_is_checked() {
    let data = Frame::new_filled(10, 10, 0.0);
    let valid = Mask::new_filled(9, 10, true);
    let result = mask_source(
        &data,
        Some(&valid),
        DVec2::new(5.0, 5.0),
        &circular(2.0, 1.0),
        &MaskingConfig::default(),
    );
    assert!(matches!(result, Err(SliceError::ShapeMismatch { .. })));
}

#[test]
fn test_dither_grid_validation() {
    assert_eq!(DitherGrid::default().len(), 8);
    assert!(DitherGrid::canonical(2.0).validate().is_ok());
    assert_eq!(
        DitherGrid::new(Vec::new()).validate(),
        Err(crate::error::ConfigError::EmptyDitherGrid)
    );
    assert!(DitherGrid::new(vec![DVec2::new(f64::NAN, 0.0)])
        .validate()
        .is_err());
}
