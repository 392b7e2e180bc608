//! Slide properties parsed from the ImageDescription tag.
//!
//! Aperio SVS files store metadata as a pipe-separated string:
//!
//! ```text
//! Aperio Image Library v10.0.51
//! 46920x33014 [0,100 46000x32914] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990
//! ```
//!
//! The first segment identifies the scanner, the following segments are
//! `key = value` pairs. Other vendors' descriptions parse to an empty map.

use serde::Serialize;
use std::collections::BTreeMap;

/// Marker string for Aperio SVS slides.
const APERIO_MARKER: &str = "Aperio";

/// Detected slide flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SlideFormat {
    /// Aperio SVS format
    AperioSvs,

    /// Generic pyramidal TIFF
    #[default]
    GenericTiff,
}

impl SlideFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }
}

/// Parsed slide properties.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SlideProperties {
    pub format: SlideFormat,

    /// Microns per pixel (resolution)
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// Scanner vendor name
    pub vendor: Option<String>,

    /// Additional key-value pairs from ImageDescription
    pub properties: BTreeMap<String, String>,
}

impl SlideProperties {
    /// Parse properties from an ImageDescription string.
    pub fn parse(description: &str) -> Self {
        let mut parsed = SlideProperties::default();

        if description.contains(APERIO_MARKER) {
            parsed.format = SlideFormat::AperioSvs;
            parsed.vendor = Some(APERIO_MARKER.to_string());
        }

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "MPP" => parsed.mpp = value.parse().ok(),
                "AppMag" => parsed.magnification = value.parse().ok(),
                _ => {}
            }

            parsed.properties.insert(key.to_string(), value.to_string());
        }

        parsed
    }
}
