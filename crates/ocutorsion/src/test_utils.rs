//! Shared synthetic scenes for unit tests.
//!
//! Iris texture is a seeded sum of angular harmonics with a radial twist, so
//! every rotation produces a distinct, exactly known polar pattern.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geometry::PupilEstimate;
use crate::unwrap::PolarImage;

/// Seeded angular texture in [0, 1].
pub(crate) struct IrisTexture {
    /// (angular frequency, amplitude, phase, radial twist)
    comps: Vec<(f64, f64, f64, f64)>,
    amp_sum: f64,
}

impl IrisTexture {
    pub(crate) fn new(seed: u64, max_freq: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let comps: Vec<_> = (1..=max_freq)
            .map(|k| {
                let amp = rng.gen_range(0.2..1.0) / (1.0 + 0.05 * k as f64);
                let phase = rng.gen_range(0.0..std::f64::consts::TAU);
                let twist = rng.gen_range(-1.5..1.5);
                (k as f64, amp, phase, twist)
            })
            .collect();
        let amp_sum = comps.iter().map(|c| c.1).sum();
        Self { comps, amp_sum }
    }

    /// Texture value at normalized radius `rho` in [0, 1] and angle `theta_deg`.
    pub(crate) fn value(&self, rho: f64, theta_deg: f64) -> f64 {
        let t = theta_deg.to_radians();
        let s: f64 = self
            .comps
            .iter()
            .map(|(k, a, p, tw)| a * (k * t + p + tw * rho).sin())
            .sum();
        0.5 + 0.45 * s / self.amp_sum
    }
}

/// Synthetic eye: dark pupil, textured iris, bright sclera.
pub(crate) struct IrisScene {
    pub width: u32,
    pub height: u32,
    pub center: [f64; 2],
    pub pupil_radius: f64,
    pub iris_radius: f64,
    pub seed: u64,
}

impl Default for IrisScene {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            center: [100.0, 100.0],
            pupil_radius: 15.0,
            iris_radius: 70.0,
            seed: 7,
        }
    }
}

impl IrisScene {
    pub(crate) fn pupil(&self) -> PupilEstimate {
        PupilEstimate::circle(self.center[0], self.center[1], self.pupil_radius)
    }

    pub(crate) fn texture(&self) -> IrisTexture {
        IrisTexture::new(self.seed, 24)
    }
}

/// Render `scene` with the iris rotated counter-clockwise by `rotation_deg`.
pub(crate) fn render_iris(scene: &IrisScene, rotation_deg: f64) -> GrayImage {
    let tex = scene.texture();
    let pupil = scene.pupil();
    let mut img = GrayImage::new(scene.width, scene.height);
    for y in 0..scene.height {
        for x in 0..scene.width {
            let (r, theta) = pupil.polar_of([x as f64, y as f64]);
            let v = if r < scene.pupil_radius {
                15.0
            } else if r > scene.iris_radius {
                230.0
            } else {
                let rho = (r - scene.pupil_radius) / (scene.iris_radius - scene.pupil_radius);
                40.0 + 170.0 * tex.value(rho, theta - rotation_deg).clamp(0.0, 1.0)
            };
            img.put_pixel(x, y, Luma([v.round() as u8]));
        }
    }
    img
}

/// Render a bright radial wedge of half-width `half_width_deg` at `theta_deg`.
pub(crate) fn draw_wedge_image(
    w: u32,
    h: u32,
    center: [f64; 2],
    theta_deg: f64,
    half_width_deg: f64,
) -> GrayImage {
    let pupil = PupilEstimate::circle(center[0], center[1], 1.0);
    let mut img = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let (_, t) = pupil.polar_of([x as f64, y as f64]);
            let d = crate::geometry::angle_diff_deg(t, theta_deg).abs();
            let pix = if d <= half_width_deg { 250 } else { 40 };
            img.put_pixel(x, y, Luma([pix]));
        }
    }
    img
}

/// Fully valid textured polar image.
pub(crate) fn textured_polar(n_radius: usize, n_theta: usize, seed: u64) -> PolarImage {
    let tex = IrisTexture::new(seed, 24);
    PolarImage::from_fn(n_radius, n_theta, |i, j| {
        let rho = i as f64 / n_radius as f64;
        let theta = j as f64 * 360.0 / n_theta as f64;
        tex.value(rho, theta) as f32
    })
}

/// Smooth polar image with only low angular harmonics.
pub(crate) fn smooth_polar(n_radius: usize, n_theta: usize, seed: u64) -> PolarImage {
    let tex = IrisTexture::new(seed, 3);
    PolarImage::from_fn(n_radius, n_theta, |i, j| {
        let rho = i as f64 / n_radius as f64;
        let theta = j as f64 * 360.0 / n_theta as f64;
        tex.value(rho, theta) as f32
    })
}
