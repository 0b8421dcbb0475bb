//! Pre-OCR cleanup for pages that carry ruled tables: deskew, histogram
//! equalization, non-local-means denoising, then a 3x3 sharpen.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{GrayImage, Luma};
use imageproc::contrast::{equalize_histogram, otsu_level};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::geometry::{min_area_rect, Point};

const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];
const MIN_DESKEW_POINTS: usize = 100;

static SEQUENCE: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Filter strength `h` of the non-local-means denoiser.
    pub denoise_strength: f32,
    pub patch_radius: u32,
    pub search_radius: u32,
    /// Skew below this magnitude is treated as noise.
    pub min_skew: f32,
    /// Skew at or above this magnitude is assumed to be a false positive.
    pub max_skew: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            denoise_strength: 10.0,
            patch_radius: 1,
            search_radius: 3,
            min_skew: 0.5,
            max_skew: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Enhanced {
    pub image: GrayImage,
    /// Page after deskew only, in the same coordinate space as `image`.
    pub deskewed: GrayImage,
    /// Correction applied by the deskew step, if any.
    pub deskew_angle: Option<f32>,
}

/// What `enhance_file` hands to the OCR and layout stages.
#[derive(Debug, Clone)]
pub struct EnhancedFile {
    /// Image to recognize: the enhanced copy, or the input on failure.
    pub path: PathBuf,
    /// Page for layout analysis, aligned with `path`.
    pub layout: GrayImage,
    pub deskew_angle: Option<f32>,
    /// False when nothing was written and `path` is the input.
    pub written: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    config: EnhanceConfig,
}

impl ImageEnhancer {
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    pub fn enhance(&self, gray: &GrayImage) -> Enhanced {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Enhanced {
                image: gray.clone(),
                deskewed: gray.clone(),
                deskew_angle: None,
            };
        }

        let (deskewed, deskew_angle) = self.deskew(gray);
        let equalized = equalize_histogram(&deskewed);
        let denoised = self.denoise(&equalized);
        let sharpened = image::imageops::filter3x3(&denoised, &SHARPEN_KERNEL);

        Enhanced {
            image: sharpened,
            deskewed,
            deskew_angle,
        }
    }

    /// Enhances `gray` and writes it into `work_dir` under a name unique to
    /// this call, so concurrent documents never share the file. Any failure
    /// falls back to the untouched input path and page.
    pub fn enhance_file(&self, gray: &GrayImage, input: &Path, work_dir: &Path) -> EnhancedFile {
        let enhanced = self.enhance(gray);
        let output = intermediate_path(input, work_dir);

        let saved = std::fs::create_dir_all(work_dir)
            .map_err(|err| err.to_string())
            .and_then(|_| enhanced.image.save(&output).map_err(|err| err.to_string()));
        match saved {
            Ok(()) => {
                info!(path = %output.display(), "enhanced table image saved");
                EnhancedFile {
                    path: output,
                    layout: enhanced.deskewed,
                    deskew_angle: enhanced.deskew_angle,
                    written: true,
                }
            }
            Err(err) => {
                warn!(error = %err, "image enhancement failed, using original");
                EnhancedFile {
                    path: input.to_path_buf(),
                    layout: gray.clone(),
                    deskew_angle: None,
                    written: false,
                }
            }
        }
    }

    /// Rotates small tilts out of the page. Returns the image untouched when
    /// the estimated skew is outside `(min_skew, max_skew)`.
    pub fn deskew(&self, gray: &GrayImage) -> (GrayImage, Option<f32>) {
        let Some(angle) = estimate_skew(gray) else {
            return (gray.clone(), None);
        };

        let magnitude = angle.abs();
        if magnitude <= self.config.min_skew {
            return (gray.clone(), None);
        }
        if magnitude >= self.config.max_skew {
            info!(angle, "skipping deskew: angle too large");
            return (gray.clone(), None);
        }

        let rotated = rotate_about_center(
            gray,
            -angle.to_radians(),
            Interpolation::Bicubic,
            Luma([255]),
        );
        info!(angle = -angle, "image deskewed");
        (rotated, Some(-angle))
    }

    fn denoise(&self, gray: &GrayImage) -> GrayImage {
        non_local_means(
            gray,
            self.config.denoise_strength,
            self.config.patch_radius,
            self.config.search_radius,
        )
    }
}

/// `<stem>_<pid>_<seq>_enhanced.png`; the sequence is process-wide.
fn intermediate_path(input: &Path, work_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    work_dir.join(format!("{stem}_{}_{seq}_enhanced.png", std::process::id()))
}

/// Tilt of the dark foreground in degrees, folded into (-45, 45].
///
/// Foreground is everything at or below the Otsu level. Only the leftmost
/// and rightmost pixel of each row feed the hull, which spans the same
/// polygon as the full point set.
pub fn estimate_skew(gray: &GrayImage) -> Option<f32> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let level = otsu_level(gray);

    let mut count = 0usize;
    let mut extremes: Vec<Point> = Vec::new();
    for y in 0..height {
        let mut first = None;
        let mut last = None;
        for x in 0..width {
            if gray.get_pixel(x, y)[0] <= level {
                count += 1;
                first.get_or_insert(x);
                last = Some(x);
            }
        }
        if let (Some(first), Some(last)) = (first, last) {
            extremes.push(Point::new(first as f32, y as f32));
            if last != first {
                extremes.push(Point::new(last as f32, y as f32));
            }
        }
    }

    // a uniform page thresholds to all-foreground
    if count < MIN_DESKEW_POINTS || count == (width * height) as usize {
        return None;
    }

    min_area_rect(&extremes).map(|rect| rect.skew_angle())
}

/// Non-local-means denoising over a square search window.
pub fn non_local_means(gray: &GrayImage, strength: f32, patch_radius: u32, search_radius: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || strength <= 0.0 {
        return gray.clone();
    }

    let (w, h) = (width as i64, height as i64);
    let pr = patch_radius as i64;
    let sr = search_radius as i64;
    let patch_size = ((2 * pr + 1) * (2 * pr + 1)) as f32;
    let h2 = strength * strength;
    let src: Vec<f32> = gray.pixels().map(|p| p[0] as f32).collect();
    let sample = |x: i64, y: i64| -> f32 {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        src[(y * w + x) as usize]
    };

    let rows: Vec<Vec<u8>> = (0..h)
        .into_par_iter()
        .map(|y| {
            (0..w)
                .map(|x| {
                    let mut weight_sum = 0.0f32;
                    let mut value_sum = 0.0f32;
                    for sy in (y - sr)..=(y + sr) {
                        for sx in (x - sr)..=(x + sr) {
                            let mut distance = 0.0f32;
                            for py in -pr..=pr {
                                for px in -pr..=pr {
                                    let diff = sample(x + px, y + py) - sample(sx + px, sy + py);
                                    distance += diff * diff;
                                }
                            }
                            let weight = (-(distance / patch_size) / h2).exp();
                            weight_sum += weight;
                            value_sum += weight * sample(sx, sy);
                        }
                    }
                    (value_sum / weight_sum).round().clamp(0.0, 255.0) as u8
                })
                .collect()
        })
        .collect();

    GrayImage::from_fn(width, height, |x, y| Luma([rows[y as usize][x as usize]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::regions::tests::ruled_grid;
    use pretty_assertions::assert_eq;

    fn tilted_grid(degrees: f32) -> GrayImage {
        let gray = ruled_grid((500, 400), (110, 110), (70, 45), 4, 4, 3);
        rotate_about_center(
            &gray,
            degrees.to_radians(),
            Interpolation::Bicubic,
            Luma([255]),
        )
    }

    #[test]
    fn estimates_tilt_of_rotated_grid() {
        let angle = estimate_skew(&tilted_grid(2.0)).expect("foreground present");
        assert!((angle - 2.0).abs() < 0.3, "estimated {angle}");
    }

    #[test]
    fn corrects_small_skew() {
        let enhancer = ImageEnhancer::default();
        let (corrected, applied) = enhancer.deskew(&tilted_grid(2.0));
        let applied = applied.expect("2 degree tilt is corrected");
        assert!((applied + 2.0).abs() < 0.3);

        let residual = estimate_skew(&corrected).expect("foreground present");
        assert!(residual.abs() < 0.5, "residual {residual}");
    }

    #[test]
    fn leaves_large_skew_alone() {
        let enhancer = ImageEnhancer::default();
        let tilted = tilted_grid(10.0);
        let (output, applied) = enhancer.deskew(&tilted);
        assert_eq!(applied, None);
        assert!(output == tilted);
    }

    #[test]
    fn blank_page_is_not_rotated() {
        let blank = GrayImage::from_pixel(100, 100, Luma([255]));
        assert_eq!(estimate_skew(&blank), None);
        let enhanced = ImageEnhancer::default().enhance(&blank);
        assert_eq!(enhanced.deskew_angle, None);
        assert_eq!(enhanced.image.dimensions(), (100, 100));
    }

    #[test]
    fn deskewed_page_is_returned_for_layout() {
        let enhanced = ImageEnhancer::default().enhance(&tilted_grid(2.0));
        assert!(enhanced.deskew_angle.is_some());
        let residual = estimate_skew(&enhanced.deskewed).expect("foreground present");
        assert!(residual.abs() < 0.5, "residual {residual}");
    }

    #[test]
    fn unwritable_work_dir_falls_back_to_input() {
        let blocker = std::env::temp_dir().join(format!("scanstruct-blocker-{}", std::process::id()));
        std::fs::write(&blocker, b"a file, not a directory").expect("write blocker");
        let gray = tilted_grid(2.0);
        let input = Path::new("/scans/page.png");

        let result = ImageEnhancer::default().enhance_file(&gray, input, &blocker);
        assert_eq!(result.path, input.to_path_buf());
        assert_eq!(result.deskew_angle, None);
        assert!(!result.written);
        assert!(result.layout == gray);
        let _ = std::fs::remove_file(&blocker);
    }

    #[test]
    fn each_call_writes_its_own_file() {
        let work_dir = std::env::temp_dir().join(format!("scanstruct-enhance-{}", std::process::id()));
        let gray = GrayImage::from_pixel(40, 40, Luma([255]));
        let enhancer = ImageEnhancer::default();

        let first = enhancer.enhance_file(&gray, Path::new("a/page.png"), &work_dir);
        let second = enhancer.enhance_file(&gray, Path::new("b/page.png"), &work_dir);
        assert!(first.written && second.written);
        assert!(first.path != second.path);
        assert!(first.path.exists() && second.path.exists());
        let _ = std::fs::remove_dir_all(&work_dir);
    }

    #[test]
    fn denoising_smooths_isolated_speckle() {
        let mut gray = GrayImage::from_pixel(20, 20, Luma([200]));
        gray.put_pixel(10, 10, Luma([190]));
        let denoised = non_local_means(&gray, 10.0, 1, 3);
        let centre = denoised.get_pixel(10, 10)[0];
        assert!(centre > 190 && centre <= 200, "centre {centre}");
        assert_eq!(denoised.get_pixel(2, 2)[0], 200);
    }
}
