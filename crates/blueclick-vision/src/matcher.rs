//! Template matching by zero-mean normalized cross-correlation.
//!
//! For every placement of a template inside a frame the score is
//!
//! ```text
//!            Σ (T - mean T) (I - mean I)
//! score = ---------------------------------
//!          sqrt(Σ (T - mean T)² Σ (I - mean I)²)
//! ```
//!
//! summed over the window and, for color matching, over all three channels.
//! Window sums come from integral images so each placement costs one pass over
//! the template for the numerator only. Rows are scored in parallel.
//!
//! Large searches with a template that survives downscaling run coarse to
//! fine: every placement is scored on a shrunken copy of both images, and only
//! the neighbourhood of each coarse peak is rescored at full resolution.

use blueclick_types::{Match, Point};
use image::{GrayImage, ImageBuffer, Luma, Pixel, imageops};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};
use rayon::prelude::*;
use tracing::trace;

use crate::capture::Frame;
use crate::template::Template;

/// Variances below this are treated as a flat patch
const FLAT_EPSILON: f64 = 1e-3;

/// Exhaustive searches cheaper than this many multiply-adds skip the coarse pass
const PYRAMID_MIN_WORK: u64 = 1 << 24;

/// Downscale factors tried for the coarse pass, largest first
const PYRAMID_SCALES: [u32; 2] = [4, 2];

/// Smallest template side worth correlating at the coarse level
const MIN_COARSE_SIDE: u32 = 8;

/// How closely a shrunken template must still resemble the original
const MIN_RETAINED_DETAIL: f64 = 0.95;

/// Coarse scores may fall this far below the threshold and still be refined
const COARSE_SLACK: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Color,
    Grayscale,
}

impl ColorSpace {
    pub fn from_grayscale(grayscale: bool) -> Self {
        if grayscale {
            ColorSpace::Grayscale
        } else {
            ColorSpace::Color
        }
    }
}

fn split_channels<P>(image: &ImageBuffer<P, Vec<u8>>) -> Vec<GrayImage>
where
    P: Pixel<Subpixel = u8>,
{
    (0..3)
        .map(|c| {
            GrayImage::from_fn(image.width(), image.height(), |x, y| {
                Luma([image.get_pixel(x, y).channels()[c]])
            })
        })
        .collect()
}

fn frame_planes(frame: &Frame, space: ColorSpace) -> Vec<GrayImage> {
    match space {
        ColorSpace::Color => split_channels(&frame.image),
        ColorSpace::Grayscale => vec![imageops::grayscale(&frame.image)],
    }
}

fn template_planes(template: &Template, space: ColorSpace) -> Vec<GrayImage> {
    match space {
        ColorSpace::Color => split_channels(template.color()),
        ColorSpace::Grayscale => vec![template.gray().clone()],
    }
}

/// Sum over the `w`x`h` window at (`x`, `y`) of a padded integral image
fn window_sum(table: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let at = |x, y| table.get_pixel(x, y).0[0];
    (at(x + w, y + h) + at(x, y)) - (at(x + w, y) + at(x, y + h))
}

/// Average `scale`x`scale` blocks, dropping any partial block at the edges
fn shrink(plane: &GrayImage, scale: u32) -> GrayImage {
    let sums = integral_image::<_, u64>(plane);
    let area = (scale * scale) as u64;
    GrayImage::from_fn(plane.width() / scale, plane.height() / scale, |x, y| {
        let total = window_sum(&sums, x * scale, y * scale, scale, scale);
        Luma([((total + area / 2) / area) as u8])
    })
}

/// Correlation between a template and its block-averaged reconstruction
///
/// Near 1.0 when the template has no detail finer than `scale` pixels.
fn retained_detail(planes: &[GrayImage], scale: u32) -> f64 {
    let (mut cross, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for plane in planes {
        let small = shrink(plane, scale);
        let (w, h) = (small.width() * scale, small.height() * scale);
        if w == 0 || h == 0 {
            return 0.0;
        }
        let n = (w * h) as f64;
        let pairs: Vec<(f64, f64)> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| {
                (
                    plane.get_pixel(x, y).0[0] as f64,
                    small.get_pixel(x / scale, y / scale).0[0] as f64,
                )
            })
            .collect();
        let (sum_a, sum_b) = pairs.iter().fold((0.0, 0.0), |(sa, sb), (a, b)| (sa + a, sb + b));
        let (mean_a, mean_b) = (sum_a / n, sum_b / n);
        for (a, b) in pairs {
            cross += (a - mean_a) * (b - mean_b);
            var_a += (a - mean_a) * (a - mean_a);
            var_b += (b - mean_b) * (b - mean_b);
        }
    }
    if var_a < FLAT_EPSILON || var_b < FLAT_EPSILON {
        return 0.0;
    }
    cross / (var_a * var_b).sqrt()
}

/// Dot product with independent lanes so the loop vectorizes
fn dot(a: &[f32], b: &[f32]) -> f32 {
    let (chunks_a, chunks_b) = (a.chunks_exact(8), b.chunks_exact(8));
    let tail: f32 = chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(x, y)| x * y)
        .sum();
    let mut lanes = [0.0f32; 8];
    for (ca, cb) in chunks_a.zip(chunks_b) {
        for ((lane, x), y) in lanes.iter_mut().zip(ca).zip(cb) {
            *lane += x * y;
        }
    }
    lanes.iter().sum::<f32>() + tail
}

/// One 8-bit plane with its summed-area tables
struct Channel {
    width: usize,
    values: Vec<f32>,
    sum: Image<Luma<u64>>,
    sq: Image<Luma<u64>>,
}

impl Channel {
    fn new(plane: &GrayImage) -> Self {
        Self {
            width: plane.width() as usize,
            values: plane.as_raw().iter().map(|&v| v as f32).collect(),
            sum: integral_image::<_, u64>(plane),
            sq: integral_squared_image::<_, u64>(plane),
        }
    }

    /// Sum and sum of squares over the `w`x`h` window at (`x`, `y`)
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        (
            window_sum(&self.sum, x, y, w, h) as f64,
            window_sum(&self.sq, x, y, w, h) as f64,
        )
    }
}

/// Template with its mean removed, ready for correlation
struct Prepared {
    width: u32,
    height: u32,
    centered: Vec<Vec<f32>>,
    means: Vec<f64>,
    variance: f64,
}

impl Prepared {
    fn new(planes: &[GrayImage]) -> Self {
        let (width, height) = planes.first().map_or((0, 0), |p| p.dimensions());
        let n = (width * height).max(1) as f64;
        let mut means = Vec::with_capacity(planes.len());
        let mut centered = Vec::with_capacity(planes.len());
        let mut variance = 0.0;

        for plane in planes {
            let mean = plane.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
            let zero_mean: Vec<f32> = plane
                .as_raw()
                .iter()
                .map(|&v| (v as f64 - mean) as f32)
                .collect();
            variance += zero_mean.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>();
            means.push(mean);
            centered.push(zero_mean);
        }

        Self {
            width,
            height,
            centered,
            means,
            variance,
        }
    }

    fn is_flat(&self) -> bool {
        self.variance < FLAT_EPSILON
    }
}

/// A frame, or a shrunken copy of one, ready to be searched
struct Layer {
    width: u32,
    height: u32,
    planes: Vec<GrayImage>,
    channels: Vec<Channel>,
}

impl Layer {
    fn new(planes: Vec<GrayImage>) -> Self {
        let (width, height) = planes.first().map_or((0, 0), |p| p.dimensions());
        let channels = planes.iter().map(Channel::new).collect();
        Self {
            width,
            height,
            planes,
            channels,
        }
    }

    fn shrink(&self, scale: u32) -> Self {
        Self::new(self.planes.iter().map(|p| shrink(p, scale)).collect())
    }

    fn fits(&self, tpl: &Prepared) -> bool {
        tpl.width > 0 && tpl.width <= self.width && tpl.height > 0 && tpl.height <= self.height
    }

    /// Last valid placement in each direction; only meaningful when `tpl` fits
    fn max_origin(&self, tpl: &Prepared) -> (u32, u32) {
        (self.width - tpl.width, self.height - tpl.height)
    }

    fn score(&self, tpl: &Prepared, x: u32, y: u32) -> f32 {
        let n = (tpl.width * tpl.height) as f64;
        let mut window_var = 0.0;
        let mut means_equal = true;

        for (c, channel) in self.channels.iter().enumerate() {
            let (s, s2) = channel.window(x, y, tpl.width, tpl.height);
            window_var += (s2 - s * s / n).max(0.0);
            if (s / n - tpl.means[c]).abs() >= 0.5 {
                means_equal = false;
            }
        }

        let window_flat = window_var < FLAT_EPSILON;
        if tpl.is_flat() || window_flat {
            return if tpl.is_flat() && window_flat && means_equal {
                1.0
            } else {
                0.0
            };
        }

        // Σ T' I equals Σ T' (I - mean I) because T' sums to zero
        let (x, y, w) = (x as usize, y as usize, tpl.width as usize);
        let mut numerator = 0.0f64;
        for (c, channel) in self.channels.iter().enumerate() {
            let centered = &tpl.centered[c];
            for row in 0..tpl.height as usize {
                let start = (y + row) * channel.width + x;
                let img_row = &channel.values[start..start + w];
                let tpl_row = &centered[row * w..(row + 1) * w];
                numerator += dot(img_row, tpl_row) as f64;
            }
        }

        (numerator / (tpl.variance * window_var).sqrt()).clamp(-1.0, 1.0) as f32
    }

    /// Every placement scoring at least `threshold`, in row-major order
    fn scan(&self, tpl: &Prepared, threshold: f32) -> Vec<(u32, u32, f32)> {
        if !self.fits(tpl) {
            return Vec::new();
        }
        let (max_x, max_y) = self.max_origin(tpl);
        (0..=max_y)
            .into_par_iter()
            .map(|y| {
                (0..=max_x)
                    .filter_map(|x| {
                        let score = self.score(tpl, x, y);
                        (score >= threshold).then_some((x, y, score))
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Highest-scoring placement, earliest in row-major order on ties
    fn best(&self, tpl: &Prepared) -> Option<(u32, u32, f32)> {
        if !self.fits(tpl) {
            return None;
        }
        let (max_x, max_y) = self.max_origin(tpl);
        (0..=max_y)
            .into_par_iter()
            .filter_map(|y| self.best_within(tpl, 0..=max_x, y..=y))
            .reduce_with(later_if_better)
    }

    fn best_within(
        &self,
        tpl: &Prepared,
        xs: std::ops::RangeInclusive<u32>,
        ys: std::ops::RangeInclusive<u32>,
    ) -> Option<(u32, u32, f32)> {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .map(|(x, y)| (x, y, self.score(tpl, x, y)))
            .reduce(later_if_better)
    }

    /// Placements scoring at least `min_score` that no neighbour beats
    fn peaks(&self, tpl: &Prepared, min_score: f32) -> Vec<(u32, u32)> {
        if !self.fits(tpl) {
            return Vec::new();
        }
        let (max_x, max_y) = self.max_origin(tpl);
        let grid: Vec<Vec<f32>> = (0..=max_y)
            .into_par_iter()
            .map(|y| (0..=max_x).map(|x| self.score(tpl, x, y)).collect())
            .collect();

        let mut peaks = Vec::new();
        for (y, row) in grid.iter().enumerate() {
            for (x, &score) in row.iter().enumerate() {
                if score < min_score {
                    continue;
                }
                let ys = y.saturating_sub(1)..=(y + 1).min(grid.len() - 1);
                let highest = ys.into_iter().all(|ny| {
                    let xs = x.saturating_sub(1)..=(x + 1).min(row.len() - 1);
                    xs.into_iter().all(|nx| grid[ny][nx] <= score)
                });
                if highest {
                    peaks.push((x as u32, y as u32));
                }
            }
        }
        peaks
    }

    /// Rescore the full-resolution neighbourhood of each coarse peak
    fn refine(
        &self,
        tpl: &Prepared,
        peaks: &[(u32, u32)],
        scale: u32,
        threshold: f32,
    ) -> Vec<(u32, u32, f32)> {
        if !self.fits(tpl) {
            return Vec::new();
        }
        let (max_x, max_y) = self.max_origin(tpl);
        let reach = 2 * scale;
        peaks
            .par_iter()
            .filter_map(|&(cx, cy)| {
                let (x, y) = ((cx * scale).min(max_x), (cy * scale).min(max_y));
                let xs = x.saturating_sub(reach)..=(x + reach).min(max_x);
                let ys = y.saturating_sub(reach)..=(y + reach).min(max_y);
                self.best_within(tpl, xs, ys)
            })
            .filter(|&(_, _, score)| score >= threshold)
            .collect()
    }
}

fn later_if_better(a: (u32, u32, f32), b: (u32, u32, f32)) -> (u32, u32, f32) {
    if b.2 > a.2 { b } else { a }
}

/// Downscale factor for a coarse pass, if the search is big enough to need
/// one and the template keeps its shape at that scale
fn coarse_scale(layer: &Layer, tpl: &Prepared, planes: &[GrayImage]) -> Option<u32> {
    if tpl.is_flat() || !layer.fits(tpl) {
        return None;
    }
    let (max_x, max_y) = layer.max_origin(tpl);
    let work = (max_x as u64 + 1) * (max_y as u64 + 1) * (tpl.width * tpl.height) as u64;
    if work < PYRAMID_MIN_WORK {
        return None;
    }
    PYRAMID_SCALES.into_iter().find(|&scale| {
        tpl.width / scale >= MIN_COARSE_SIDE
            && tpl.height / scale >= MIN_COARSE_SIDE
            && retained_detail(planes, scale) >= MIN_RETAINED_DETAIL
    })
}

fn make_match(frame: &Frame, template: &Template, index: usize, x: u32, y: u32, score: f32) -> Match {
    let (w, h) = (template.width(), template.height());
    Match {
        pos: Point::new(
            frame.origin.x + x as i32 + (w / 2) as i32,
            frame.origin.y + y as i32 + (h / 2) as i32,
        ),
        score,
        template_index: index,
        template_width: w,
        template_height: h,
    }
}

/// All deduplicated hits of `templates` in `frame` scoring at least `threshold`
///
/// Positions are template centers in screen coordinates, ordered by score.
/// Templates larger than the frame are skipped.
pub fn find_matches(
    frame: &Frame,
    templates: &[Template],
    threshold: f32,
    space: ColorSpace,
) -> Vec<Match> {
    if templates.is_empty() || frame.region().is_empty() {
        return Vec::new();
    }

    let image = Layer::new(frame_planes(frame, space));
    let mut coarse_layers: Vec<(u32, Layer)> = Vec::new();

    let mut candidates = Vec::new();
    for (index, template) in templates.iter().enumerate() {
        if template.width() > frame.width() || template.height() > frame.height() {
            trace!(
                "Template {} larger than {}x{} frame, skipped",
                template.name(),
                frame.width(),
                frame.height()
            );
            continue;
        }
        let planes = template_planes(template, space);
        let prepared = Prepared::new(&planes);

        let hits = match coarse_scale(&image, &prepared, &planes) {
            Some(scale) => {
                let slot = match coarse_layers.iter().position(|(s, _)| *s == scale) {
                    Some(slot) => slot,
                    None => {
                        coarse_layers.push((scale, image.shrink(scale)));
                        coarse_layers.len() - 1
                    }
                };
                let small: Vec<GrayImage> = planes.iter().map(|p| shrink(p, scale)).collect();
                let peaks = coarse_layers[slot]
                    .1
                    .peaks(&Prepared::new(&small), threshold - COARSE_SLACK);
                trace!(
                    "Template {}: {} coarse peaks at 1/{}",
                    template.name(),
                    peaks.len(),
                    scale
                );
                image.refine(&prepared, &peaks, scale, threshold)
            }
            None => image.scan(&prepared, threshold),
        };
        candidates.extend(
            hits.into_iter()
                .map(|(x, y, score)| make_match(frame, template, index, x, y, score)),
        );
    }

    let raw = candidates.len();
    let kept = suppress_duplicates(candidates);
    trace!("{} raw candidates, {} after dedup", raw, kept.len());
    kept
}

/// Highest-scoring placement of one template, regardless of threshold
pub fn best_match(frame: &Frame, template: &Template, space: ColorSpace) -> Option<Match> {
    if template.width() > frame.width() || template.height() > frame.height() {
        return None;
    }

    let image = Layer::new(frame_planes(frame, space));
    let prepared = Prepared::new(&template_planes(template, space));
    image
        .best(&prepared)
        .map(|(x, y, score)| make_match(frame, template, 0, x, y, score))
}

/// Greedy non-maximum suppression, strongest hit first
///
/// A candidate survives only if it is farther than the dedup radius of both
/// itself and every hit already kept.
pub fn suppress_duplicates(mut candidates: Vec<Match>) -> Vec<Match> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Match> = Vec::new();
    for candidate in candidates {
        let separate = kept.iter().all(|k| {
            candidate.pos.distance(k.pos) > candidate.dedup_radius().max(k.dedup_radius())
        });
        if separate {
            kept.push(candidate);
        }
    }
    kept
}
