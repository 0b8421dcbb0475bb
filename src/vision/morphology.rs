//! Binary morphology on `GrayImage` masks (0 = background, 255 = foreground).
//!
//! Rectangular structuring elements are separable, so erosion and dilation run
//! as a horizontal pass followed by a vertical pass, each a sliding-window
//! count over the row or column. Outside the image, erosion sees foreground
//! and dilation sees background, so borders neither shrink nor grow.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Erode,
    Dilate,
}

/// Window offsets covered by a kernel of `len` anchored at `len / 2`.
/// Erosion uses the reflected element so that closing and opening with an
/// even-sized kernel do not shift lines.
fn window(len: u32, op: Op) -> (i64, i64) {
    let len = len.max(1) as i64;
    let anchor = len / 2;
    match op {
        Op::Dilate => (-anchor, len - 1 - anchor),
        Op::Erode => (anchor + 1 - len, anchor),
    }
}

fn run_1d(line: &[bool], len: u32, op: Op, out: &mut [bool]) {
    let n = line.len() as i64;
    if n == 0 {
        return;
    }
    let (lo, hi) = window(len, op);

    // prefix[i] = number of foreground samples in line[..i]
    let mut prefix = Vec::with_capacity(line.len() + 1);
    prefix.push(0usize);
    for &value in line {
        let last = *prefix.last().unwrap_or(&0);
        prefix.push(last + usize::from(value));
    }

    for i in 0..n {
        let start = (i + lo).clamp(0, n);
        let end = (i + hi + 1).clamp(0, n);
        let count = prefix[end as usize] - prefix[start as usize];
        let span = (end - start) as usize;
        out[i as usize] = match op {
            Op::Erode => count == span,
            Op::Dilate => count > 0,
        };
    }
}

fn apply(mask: &GrayImage, kernel_w: u32, kernel_h: u32, op: Op) -> GrayImage {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }
    let (w, h) = (width as usize, height as usize);

    let mut bits: Vec<bool> = mask.pixels().map(|p| p[0] > 0).collect();

    if kernel_w > 1 {
        let mut row_out = vec![false; w];
        for y in 0..h {
            let row = &bits[y * w..(y + 1) * w];
            run_1d(row, kernel_w, op, &mut row_out);
            bits[y * w..(y + 1) * w].copy_from_slice(&row_out);
        }
    }

    if kernel_h > 1 {
        let mut column = vec![false; h];
        let mut col_out = vec![false; h];
        for x in 0..w {
            for y in 0..h {
                column[y] = bits[y * w + x];
            }
            run_1d(&column, kernel_h, op, &mut col_out);
            for y in 0..h {
                bits[y * w + x] = col_out[y];
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        if bits[y as usize * w + x as usize] {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

pub fn erode_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    apply(mask, kernel_w, kernel_h, Op::Erode)
}

pub fn dilate_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    apply(mask, kernel_w, kernel_h, Op::Dilate)
}

/// Dilation followed by erosion; fills gaps narrower than the kernel.
pub fn close_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    erode_rect(&dilate_rect(mask, kernel_w, kernel_h), kernel_w, kernel_h)
}

/// Erosion followed by dilation; keeps only runs at least as long as the kernel.
pub fn open_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    dilate_rect(&erode_rect(mask, kernel_w, kernel_h), kernel_w, kernel_h)
}

/// Pixel-wise OR of two masks of the same shape.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (width, height) = a.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let on = a.get_pixel(x, y)[0] > 0
            || (x < b.width() && y < b.height() && b.get_pixel(x, y)[0] > 0);
        Luma([if on { FOREGROUND } else { BACKGROUND }])
    })
}

/// Inverted adaptive threshold against a Gaussian-weighted local mean.
///
/// A pixel becomes foreground when it is at most `local_mean - offset`, so
/// dark strokes on a light page come out white. `block_size` is the odd
/// window side; sigma follows the usual `0.3 * ((block - 1) / 2 - 1) + 0.8`.
pub fn adaptive_threshold_gaussian_inv(gray: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }
    let block = block_size.max(3) | 1;
    let sigma = 0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let mean = gaussian_blur_f32(gray, sigma);

    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0] as i16;
        let threshold = mean.get_pixel(x, y)[0] as i16 - offset;
        if value > threshold {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

pub fn foreground_count(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > 0).count()
}
