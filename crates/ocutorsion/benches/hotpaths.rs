use std::f64::consts::TAU;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ocutorsion::{
    build_polar, correlate, unwrap_iris, AngularRange, EyelidBoundary, GeometryConfig,
    Interpolation, MaskedPolar, PupilEstimate, SearchConfig, UnwrapConfig,
};

const CENTER: [f64; 2] = [160.0, 120.0];
const PUPIL_R: f64 = 22.0;
const IRIS_R: f64 = 90.0;

/// Seeded harmonic iris texture rotated counter-clockwise by `rotation_deg`.
fn make_iris_fixture(rotation_deg: f64, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let comps: Vec<(f64, f64, f64)> = (1..=24)
        .map(|k| (k as f64, rng.gen_range(0.2..1.0), rng.gen_range(0.0..TAU)))
        .collect();
    let norm: f64 = comps.iter().map(|c| c.1).sum();

    let mut img = GrayImage::new(320, 240);
    for y in 0..240u32 {
        for x in 0..320u32 {
            let dx = x as f64 - CENTER[0];
            let dy = CENTER[1] - y as f64;
            let r = dx.hypot(dy);
            let theta = dy.atan2(dx) - rotation_deg.to_radians();
            let v = if r < PUPIL_R {
                15.0
            } else if r > IRIS_R {
                220.0
            } else {
                let s: f64 = comps.iter().map(|(k, a, p)| a * (k * theta + p).sin()).sum();
                120.0 + 90.0 * s / norm
            };
            img.put_pixel(x, y, Luma([v.round().clamp(0.0, 255.0) as u8]));
        }
    }
    img
}

fn pupil() -> PupilEstimate {
    PupilEstimate::circle(CENTER[0], CENTER[1], PUPIL_R).with_iris_radius(IRIS_R - 5.0)
}

fn bench_unwrap(c: &mut Criterion) {
    let img = make_iris_fixture(0.0, 5);
    let p = pupil();
    let bilinear = UnwrapConfig::default();
    let bicubic = UnwrapConfig {
        interpolation: Interpolation::Bicubic,
        ..Default::default()
    };

    c.bench_function("unwrap_24r_720t_bilinear", |b| {
        b.iter(|| {
            let polar = unwrap_iris(black_box(&img), black_box(&p), black_box(&bilinear));
            black_box(polar.map(|p| p.valid_fraction()).unwrap_or(0.0))
        })
    });

    c.bench_function("unwrap_24r_720t_bicubic", |b| {
        b.iter(|| {
            let polar = unwrap_iris(black_box(&img), black_box(&p), black_box(&bicubic));
            black_box(polar.map(|p| p.valid_fraction()).unwrap_or(0.0))
        })
    });
}

fn bench_mask_and_correlate(c: &mut Criterion) {
    let geometry = GeometryConfig::default();
    let lids = EyelidBoundary::new(
        Some(AngularRange::centered(90.0, 35.0)),
        Some(AngularRange::centered(270.0, 25.0)),
    );
    let reference_img = make_iris_fixture(0.0, 5);
    let target_img = make_iris_fixture(4.3, 5);
    let reference = build_polar(&reference_img, &pupil(), &EyelidBoundary::open(), &geometry)
        .expect("fixture reference should unwrap");
    let target: MaskedPolar =
        build_polar(&target_img, &pupil(), &lids, &geometry).expect("fixture target should unwrap");

    c.bench_function("build_polar_masked_24r_720t", |b| {
        b.iter(|| {
            let m = build_polar(black_box(&target_img), &pupil(), black_box(&lids), &geometry);
            black_box(m.map(|m| m.mask().occluded_count()).unwrap_or(0))
        })
    });

    let search = SearchConfig::default();
    c.bench_function("correlate_24r_720t_25deg", |b| {
        b.iter(|| {
            let outcome = correlate(black_box(&reference), black_box(&target), &search, None);
            black_box(outcome.ok().and_then(|o| o.peak().map(|p| p.angle_deg)))
        })
    });

    let radial = SearchConfig {
        radial_window: 2,
        ..Default::default()
    };
    c.bench_function("correlate_24r_720t_25deg_radial2", |b| {
        b.iter(|| {
            let outcome = correlate(black_box(&reference), black_box(&target), &radial, None);
            black_box(outcome.ok().and_then(|o| o.peak().map(|p| p.angle_deg)))
        })
    });
}

criterion_group!(hotpaths, bench_unwrap, bench_mask_and_correlate);
criterion_main!(hotpaths);
