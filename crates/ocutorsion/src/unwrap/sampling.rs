//! Sub-pixel frame sampling primitives used by the polar unwrap.

use image::GrayImage;

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    /// Catmull-Rom bicubic.
    Bicubic,
}

/// Behaviour for kernel taps that fall outside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderMode {
    /// Sample is marked invalid.
    #[default]
    Invalid,
    /// Clamp to the nearest edge pixel.
    Replicate,
    /// Use a constant intensity in [0, 1].
    Constant(f32),
}

impl BorderMode {
    /// Whether this mode samples beyond the physical frame.
    pub fn is_extension(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// Frame sampler returning intensities in [0, 1].
#[derive(Clone, Copy)]
pub struct FrameSampler<'a> {
    img: &'a GrayImage,
    interpolation: Interpolation,
    border: BorderMode,
}

const INV_255: f32 = 1.0 / 255.0;

impl<'a> FrameSampler<'a> {
    pub fn new(img: &'a GrayImage, interpolation: Interpolation, border: BorderMode) -> Self {
        Self {
            img,
            interpolation,
            border,
        }
    }

    /// Pixel fetch with border handling.
    #[inline]
    fn fetch(&self, ix: i64, iy: i64) -> Option<f32> {
        let (w, h) = self.img.dimensions();
        let (w, h) = (w as i64, h as i64);
        let inside = ix >= 0 && iy >= 0 && ix < w && iy < h;
        let (x, y) = if inside {
            (ix, iy)
        } else {
            match self.border {
                BorderMode::Invalid => return None,
                BorderMode::Constant(v) => return Some(v),
                BorderMode::Replicate => (ix.clamp(0, w - 1), iy.clamp(0, h - 1)),
            }
        };
        let raw = self.img.as_raw();
        Some(raw[(y * w + x) as usize] as f32 * INV_255)
    }

    /// Sample at a sub-pixel position, or `None` when any contributing tap
    /// is unavailable.
    #[inline]
    pub fn sample(&self, x: f64, y: f64) -> Option<f32> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (w, h) = self.img.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        match self.interpolation {
            Interpolation::Nearest => self.fetch(x.round() as i64, y.round() as i64),
            Interpolation::Bilinear => self.bilinear(x, y),
            Interpolation::Bicubic => self.bicubic(x, y),
        }
    }

    fn bilinear(&self, x: f64, y: f64) -> Option<f32> {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = (x - x0) as f32;
        let fy = (y - y0) as f32;
        let (ix, iy) = (x0 as i64, y0 as i64);

        let mut acc = 0.0f32;
        for (dy, wy) in [(0, 1.0 - fy), (1, fy)] {
            if wy == 0.0 {
                continue;
            }
            for (dx, wx) in [(0, 1.0 - fx), (1, fx)] {
                if wx == 0.0 {
                    continue;
                }
                acc += wx * wy * self.fetch(ix + dx, iy + dy)?;
            }
        }
        Some(acc)
    }

    fn bicubic(&self, x: f64, y: f64) -> Option<f32> {
        let x0 = x.floor();
        let y0 = y.floor();
        let wxs = catmull_rom_weights((x - x0) as f32);
        let wys = catmull_rom_weights((y - y0) as f32);
        let (ix, iy) = (x0 as i64, y0 as i64);

        let mut acc = 0.0f32;
        for (ky, wy) in wys.iter().enumerate() {
            if *wy == 0.0 {
                continue;
            }
            for (kx, wx) in wxs.iter().enumerate() {
                if *wx == 0.0 {
                    continue;
                }
                acc += wx * wy * self.fetch(ix + kx as i64 - 1, iy + ky as i64 - 1)?;
            }
        }
        Some(acc.clamp(0.0, 1.0))
    }
}

/// Catmull-Rom weights for taps at offsets -1, 0, 1, 2.
#[inline]
fn catmull_rom_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}
