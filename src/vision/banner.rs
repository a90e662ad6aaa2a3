//! Banner template matching
//!
//! Race cards carry a banner thumbnail. Each known race can register a
//! banner template; a crop from the screen is compared against templates
//! with a fused score built from a perceptual hash, a color histogram and
//! the raw aspect ratio.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbaImage};
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

use super::VisionError;
use crate::config::settings::BannerSettings;
use crate::game::entity::canonicalize;

/// Compact visual signature of a banner image
#[derive(Debug, Clone)]
pub struct BannerDescriptor {
    /// Perceptual hash
    pub hash: ImageHash,
    /// Per-channel RGB histogram, each channel normalized to sum 1
    pub histogram: Vec<f32>,
    /// Raw pixel size of the source image
    pub raw_size: (u32, u32),
}

/// A registered banner for one race
#[derive(Debug, Clone)]
pub struct BannerTemplate {
    /// Display name the template was registered under
    pub name: String,
    pub canonical_key: String,
    pub descriptor: BannerDescriptor,
    /// File the template was loaded from, if any
    pub source_path: Option<PathBuf>,
}

/// Similarity of a crop against all templates of one race
#[derive(Debug, Clone, PartialEq)]
pub struct BannerScore {
    pub canonical_key: String,
    pub score: f32,
}

/// Computes descriptors and fused similarity scores
pub struct BannerMatcher {
    hasher: Hasher,
    settings: BannerSettings,
}

impl BannerMatcher {
    /// Create a matcher with the given fusion settings
    pub fn new(settings: BannerSettings) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(8, 8)
            .to_hasher();
        Self { hasher, settings }
    }

    /// Compute the descriptor of an image
    pub fn describe(&self, image: &RgbaImage) -> BannerDescriptor {
        let dynamic = DynamicImage::ImageRgba8(image.clone());
        let hash = self.hasher.hash_image(&dynamic);
        let histogram = color_histogram(&dynamic, self.settings.histogram_bins);

        BannerDescriptor {
            hash,
            histogram,
            raw_size: image.dimensions(),
        }
    }

    /// Build a template from an in-memory image
    pub fn template_from_image(&self, name: &str, image: &RgbaImage) -> BannerTemplate {
        BannerTemplate {
            name: name.to_string(),
            canonical_key: canonicalize(name),
            descriptor: self.describe(image),
            source_path: None,
        }
    }

    /// Build a template from an image file
    pub fn template_from_path(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<BannerTemplate, VisionError> {
        let image = image::open(path)
            .map_err(|source| VisionError::ImageLoad {
                path: path.display().to_string(),
                source,
            })?
            .to_rgba8();

        let mut template = self.template_from_image(name, &image);
        template.source_path = Some(path.to_path_buf());
        Ok(template)
    }

    /// Fused similarity of two descriptors in [0, 1]
    pub fn similarity(&self, a: &BannerDescriptor, b: &BannerDescriptor) -> f32 {
        let s = &self.settings;
        let total_weight = s.hash_weight + s.histogram_weight + s.size_weight;
        if total_weight <= 0.0 {
            return 0.0;
        }

        let fused = s.hash_weight * hash_similarity(&a.hash, &b.hash)
            + s.histogram_weight * histogram_intersection(&a.histogram, &b.histogram)
            + s.size_weight * aspect_similarity(a.raw_size, b.raw_size);

        (fused / total_weight).clamp(0.0, 1.0)
    }

    /// Score a crop against templates, best score per race, highest first
    pub fn score_against(
        &self,
        crop: &RgbaImage,
        templates: &[BannerTemplate],
    ) -> Vec<BannerScore> {
        if templates.is_empty() {
            return Vec::new();
        }

        let descriptor = self.describe(crop);
        let mut scores: Vec<BannerScore> = Vec::new();

        for template in templates {
            let score = self.similarity(&descriptor, &template.descriptor);
            match scores
                .iter_mut()
                .find(|s| s.canonical_key == template.canonical_key)
            {
                Some(existing) => existing.score = existing.score.max(score),
                None => scores.push(BannerScore {
                    canonical_key: template.canonical_key.clone(),
                    score,
                }),
            }
        }

        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        scores
    }
}

impl Default for BannerMatcher {
    fn default() -> Self {
        Self::new(BannerSettings::default())
    }
}

fn hash_similarity(a: &ImageHash, b: &ImageHash) -> f32 {
    let bits = a.as_bytes().len() * 8;
    if bits == 0 || a.as_bytes().len() != b.as_bytes().len() {
        return 0.0;
    }
    1.0 - (a.dist(b) as f32 / bits as f32)
}

fn color_histogram(image: &DynamicImage, bins: usize) -> Vec<f32> {
    let bins = bins.clamp(1, 256);
    let rgb = image.to_rgb8();
    let raw = imageproc::stats::histogram(&rgb);

    let mut out = Vec::with_capacity(bins * raw.channels.len());
    for channel in &raw.channels {
        let mut folded = vec![0u64; bins];
        for (value, count) in channel.iter().enumerate() {
            folded[value * bins / 256] += u64::from(*count);
        }
        let total: u64 = folded.iter().sum();
        out.extend(folded.iter().map(|&c| {
            if total == 0 {
                0.0
            } else {
                c as f32 / total as f32
            }
        }));
    }
    out
}

fn histogram_intersection(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let shared: f32 = a.iter().zip(b).map(|(x, y)| x.min(*y)).sum();
    // Each channel sums to 1, three channels
    (shared / 3.0).clamp(0.0, 1.0)
}

fn aspect_similarity(a: (u32, u32), b: (u32, u32)) -> f32 {
    if a.1 == 0 || b.1 == 0 {
        return 0.0;
    }
    let ra = a.0 as f32 / a.1 as f32;
    let rb = b.0 as f32 / b.1 as f32;
    let max = ra.max(rb);
    if max <= 0.0 {
        return 0.0;
    }
    1.0 - (ra - rb).abs() / max
}
