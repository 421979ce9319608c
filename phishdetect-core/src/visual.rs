// Perceptual screenshot similarity (structural similarity index)

use crate::error::ScoreError;
use crate::model::clamp_unit;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use std::path::Path;
use tracing::{debug, warn};

/// Side length of the sliding window.
pub const WINDOW: u32 = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

/// Score two screenshots on disk. Missing or undecodable images yield `0.0`.
pub fn score_files(a: &Path, b: &Path) -> f64 {
    if !a.is_file() || !b.is_file() {
        warn!("Images missing: {}, {}", a.display(), b.display());
        return 0.0;
    }

    let loaded = image::open(a).and_then(|first| Ok((first, image::open(b)?)));
    match loaded {
        Ok((first, second)) => score_images(&first, &second),
        Err(e) => {
            warn!("Failed to load images {} / {}: {}", a.display(), b.display(), e);
            0.0
        }
    }
}

/// Convert both images to grayscale, bring the second to the first's size
/// and return their SSIM clamped into `[0, 1]`.
pub fn score_images(a: &DynamicImage, b: &DynamicImage) -> f64 {
    let gray_a = a.to_luma8();
    let mut gray_b = b.to_luma8();

    if gray_a.dimensions() != gray_b.dimensions() {
        let (width, height) = gray_a.dimensions();
        debug!(
            "Resizing second image from {:?} to {}x{}",
            gray_b.dimensions(),
            width,
            height
        );
        if width == 0 || height == 0 {
            return 0.0;
        }
        gray_b = imageops::resize(&gray_b, width, height, FilterType::Triangle);
    }

    match ssim(&gray_a, &gray_b) {
        Ok(value) => {
            let score = clamp_unit(value);
            debug!("SSIM={:.4} (clamped {:.4})", value, score);
            score
        }
        Err(e) => {
            warn!("Visual scoring failed: {}", e);
            0.0
        }
    }
}

/// Mean structural similarity of two equally sized grayscale images.
///
/// Uniform `WINDOW`x`WINDOW` window, sample covariance, averaged over every
/// window that fits entirely inside the image. Images narrower than the
/// window use the largest odd window that fits. The raw value lies in
/// `[-1, 1]`.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> Result<f64, ScoreError> {
    if a.dimensions() != b.dimensions() {
        return Err(ScoreError::DimensionMismatch(a.dimensions(), b.dimensions()));
    }

    let (width, height) = a.dimensions();
    if width == 0 || height == 0 {
        return Err(ScoreError::EmptyImage { width, height });
    }

    let win = window_size(width, height) as usize;
    let (width, height) = (width as usize, height as usize);
    let xs = a.as_raw();
    let ys = b.as_raw();

    let np = (win * win) as f64;
    let cov_norm = if np > 1.0 { np / (np - 1.0) } else { 1.0 };
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    // Per-column sums over the current band of `win` rows. Pixel values are
    // integers, so the running sums stay exact.
    let mut columns = vec![WindowSums::default(); width];
    for row in 0..win {
        for (x, column) in columns.iter_mut().enumerate() {
            let i = row * width + x;
            column.add(xs[i], ys[i]);
        }
    }

    let mut total = 0.0;
    let mut count = 0usize;

    for top in 0..=(height - win) {
        if top > 0 {
            let leaving = (top - 1) * width;
            let entering = (top + win - 1) * width;
            for (x, column) in columns.iter_mut().enumerate() {
                column.remove(xs[leaving + x], ys[leaving + x]);
                column.add(xs[entering + x], ys[entering + x]);
            }
        }

        let mut window = WindowSums::default();
        for column in &columns[..win] {
            window.merge(column);
        }

        for left in 0..=(width - win) {
            if left > 0 {
                window.unmerge(&columns[left - 1]);
                window.merge(&columns[left + win - 1]);
            }
            total += window.ssim(np, cov_norm, c1, c2);
            count += 1;
        }
    }

    Ok(total / count as f64)
}

fn window_size(width: u32, height: u32) -> u32 {
    let fit = width.min(height).min(WINDOW);
    if fit % 2 == 0 { fit - 1 } else { fit }
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowSums {
    x: u64,
    y: u64,
    xx: u64,
    yy: u64,
    xy: u64,
}

impl WindowSums {
    fn add(&mut self, x: u8, y: u8) {
        let (x, y) = (u64::from(x), u64::from(y));
        self.x += x;
        self.y += y;
        self.xx += x * x;
        self.yy += y * y;
        self.xy += x * y;
    }

    fn remove(&mut self, x: u8, y: u8) {
        let (x, y) = (u64::from(x), u64::from(y));
        self.x -= x;
        self.y -= y;
        self.xx -= x * x;
        self.yy -= y * y;
        self.xy -= x * y;
    }

    fn merge(&mut self, other: &WindowSums) {
        self.x += other.x;
        self.y += other.y;
        self.xx += other.xx;
        self.yy += other.yy;
        self.xy += other.xy;
    }

    fn unmerge(&mut self, other: &WindowSums) {
        self.x -= other.x;
        self.y -= other.y;
        self.xx -= other.xx;
        self.yy -= other.yy;
        self.xy -= other.xy;
    }

    fn ssim(&self, np: f64, cov_norm: f64, c1: f64, c2: f64) -> f64 {
        let ux = self.x as f64 / np;
        let uy = self.y as f64 / np;
        let uxx = self.xx as f64 / np;
        let uyy = self.yy as f64 / np;
        let uxy = self.xy as f64 / np;

        let vx = cov_norm * (uxx - ux * ux);
        let vy = cov_norm * (uyy - uy * uy);
        let vxy = cov_norm * (uxy - ux * uy);

        let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
        let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
        numerator / denominator
    }
}
