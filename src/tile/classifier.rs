//! Heuristics deciding whether a tile carries useful signal.
//!
//! Two independent predicates run on the buffer that would be saved (after
//! downsampling and optional normalization). A tile is dropped as soon as
//! either fires; background is checked first.
//!
//! An optional third pass keeps only tiles that look like stained tissue:
//! mostly pink or white in HSV and with enough color variation to not be a
//! flat smear.

use serde::{Deserialize, Serialize};

use super::ops::{count_above_threshold, split_channels, to_grayscale};
use super::TileBuffer;

/// Luminance above which a pixel counts as background.
pub const DEFAULT_BACKGROUND_THRESHOLD: u8 = 230;

/// Fraction of background pixels above which a tile is dropped.
pub const DEFAULT_BACKGROUND_RATIO: f64 = 0.5;

/// Channel intensity above which a pixel can count as stain-colored.
pub const DEFAULT_STAIN_THRESHOLD: u8 = 100;

/// Fraction of stain-colored pixels above which a tile is dropped.
pub const DEFAULT_STAIN_RATIO: f64 = 0.5;

/// How far the dominant channel must exceed the other two.
pub const DEFAULT_STAIN_MARGIN: u8 = 10;

/// Fraction of pink-or-white pixels a tissue tile must exceed.
pub const DEFAULT_TISSUE_RATIO: f64 = 0.5;

/// Mean per-channel standard deviation a tissue tile must exceed.
pub const DEFAULT_TISSUE_VARIATION: f64 = 20.0;

/// Pink hue band, on the 0..180 hue scale, with minimum S and V.
const PINK_HUE: (u8, u8) = (150, 180);
const PINK_MIN_SATURATION: u8 = 50;
const PINK_MIN_VALUE: u8 = 50;

/// White: any hue, low saturation, high value.
const WHITE_MAX_SATURATION: u8 = 55;
const WHITE_MIN_VALUE: u8 = 200;

/// Parameters for the background predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundParams {
    pub threshold: u8,
    pub ratio: f64,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BACKGROUND_THRESHOLD,
            ratio: DEFAULT_BACKGROUND_RATIO,
        }
    }
}

/// Parameters for the green/blue stain predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StainParams {
    pub threshold: u8,
    pub ratio: f64,
    pub margin: u8,
}

impl Default for StainParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_STAIN_THRESHOLD,
            ratio: DEFAULT_STAIN_RATIO,
            margin: DEFAULT_STAIN_MARGIN,
        }
    }
}

/// Parameters for the tissue predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TissueParams {
    pub ratio: f64,
    pub variation: f64,
}

impl Default for TissueParams {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_TISSUE_RATIO,
            variation: DEFAULT_TISSUE_VARIATION,
        }
    }
}

/// Why a tile was kept or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileVerdict {
    Keep,
    Background,
    Stain,
    /// Failed the optional tissue check
    NoTissue,
}

impl TileVerdict {
    pub fn is_keep(self) -> bool {
        self == TileVerdict::Keep
    }
}

/// Combined classifier over the drop predicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TileClassifier {
    pub background: BackgroundParams,
    pub stain: StainParams,
    /// Tissue check, off when `None`
    pub tissue: Option<TissueParams>,
}

impl TileClassifier {
    pub fn new(background: BackgroundParams, stain: StainParams) -> Self {
        Self {
            background,
            stain,
            tissue: None,
        }
    }

    /// Also require tiles to pass [`is_tissue_with_variation`].
    pub fn with_tissue_filter(mut self, params: TissueParams) -> Self {
        self.tissue = Some(params);
        self
    }

    pub fn classify(&self, tile: &TileBuffer) -> TileVerdict {
        if is_mostly_background(tile, self.background) {
            TileVerdict::Background
        } else if is_mostly_stain_color(tile, self.stain) {
            TileVerdict::Stain
        } else if self
            .tissue
            .is_some_and(|params| !is_tissue_with_variation(tile, params))
        {
            TileVerdict::NoTissue
        } else {
            TileVerdict::Keep
        }
    }
}

/// True when more than `ratio` of the pixels have luminance strictly above
/// `threshold`.
pub fn is_mostly_background(tile: &TileBuffer, params: BackgroundParams) -> bool {
    let gray = to_grayscale(tile);
    let light = count_above_threshold(&gray, params.threshold);
    light as f64 > params.ratio * tile.pixel_count() as f64
}

/// True when more than `ratio` of the pixels are dominated by green or blue.
///
/// A pixel is green when `G > threshold`, `G > R + margin` and
/// `G > B + margin`; blue symmetrically. Channels are read in R, G, B order.
pub fn is_mostly_stain_color(tile: &TileBuffer, params: StainParams) -> bool {
    let [red, green, blue] = split_channels(tile);
    let threshold = params.threshold as u16;
    let margin = params.margin as u16;

    let colored = red
        .as_raw()
        .iter()
        .zip(green.as_raw())
        .zip(blue.as_raw())
        .filter(|&((&r, &g), &b)| {
            let (r, g, b) = (r as u16, g as u16, b as u16);
            let green_mask = g > threshold && g > r + margin && g > b + margin;
            let blue_mask = b > threshold && b > r + margin && b > g + margin;
            green_mask || blue_mask
        })
        .count();

    colored as f64 > params.ratio * tile.pixel_count() as f64
}

/// True when more than `ratio` of the pixels are pink or white in HSV and
/// the mean R, G, B standard deviation exceeds `variation`.
pub fn is_tissue_with_variation(tile: &TileBuffer, params: TissueParams) -> bool {
    let rgb = tile.as_image().to_rgb8();
    let total = tile.pixel_count() as f64;
    if total == 0.0 {
        return false;
    }

    let mut pink_or_white = 0u64;
    let mut sums = [0f64; 3];
    let mut squares = [0f64; 3];
    for pixel in rgb.pixels() {
        let (h, s, v) = hsv(pixel.0);
        let pink = (PINK_HUE.0..=PINK_HUE.1).contains(&h)
            && s >= PINK_MIN_SATURATION
            && v >= PINK_MIN_VALUE;
        let white = s <= WHITE_MAX_SATURATION && v >= WHITE_MIN_VALUE;
        if pink || white {
            pink_or_white += 1;
        }

        for (channel, &value) in pixel.0.iter().enumerate() {
            let value = value as f64;
            sums[channel] += value;
            squares[channel] += value * value;
        }
    }

    let mean_stddev = (0..3)
        .map(|c| {
            let mean = sums[c] / total;
            (squares[c] / total - mean * mean).max(0.0).sqrt()
        })
        .sum::<f64>()
        / 3.0;

    pink_or_white as f64 / total > params.ratio && mean_stddev > params.variation
}

/// 8-bit HSV with hue halved to 0..180.
fn hsv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = (max - min) as f32;

    let saturation = if max == 0 {
        0.0
    } else {
        255.0 * delta / max as f32
    };

    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let mut hue = if max == min {
        0.0
    } else if max == r {
        60.0 * (gf - bf) / delta
    } else if max == g {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    ((hue / 2.0).round() as u8, saturation.round() as u8, max)
}
