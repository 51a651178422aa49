//! Size-bounded JPEG encoding of captured frames.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;

use super::CaptureError;

const KIB: usize = 1024;

/// Bounds applied to every outgoing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG qualities tried in order while the payload exceeds `soft_limit`
    pub qualities: Vec<u8>,
    /// Payload size that triggers recompression and an advisory
    pub soft_limit: usize,
    /// Payload size that is never sent
    pub hard_limit: usize,
    /// Smallest edge length resolution halving may produce
    pub min_dimension: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_width: 640,
            max_height: 480,
            qualities: vec![60, 50, 40],
            soft_limit: 1024 * KIB,
            hard_limit: 2048 * KIB,
            min_dimension: 32,
        }
    }
}

/// Non-blocking notice that a frame needed extra shrinking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeAdvisory {
    /// Quality was lowered to approach the soft limit
    Compressed { bytes: usize },
    /// Resolution was halved to get under the hard limit
    Reduced { bytes: usize, width: u32, height: u32 },
}

impl SizeAdvisory {
    pub fn message(&self) -> String {
        match self {
            SizeAdvisory::Compressed { bytes } => {
                format!("Frame compressed: {}KB", bytes / KIB)
            }
            SizeAdvisory::Reduced {
                bytes,
                width,
                height,
            } => format!(
                "Frame resolution reduced to {}x{}: {}KB",
                width,
                height,
                bytes / KIB
            ),
        }
    }
}

/// A frame ready to submit.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// `data:image/jpeg;base64,...`
    pub data_uri: String,
    /// JPEG size in bytes
    pub bytes: usize,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub advisory: Option<SizeAdvisory>,
}

/// Encodes decoded frames into size-bounded JPEG data URIs.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder {
    limits: FrameLimits,
}

impl FrameEncoder {
    pub fn new(limits: FrameLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &FrameLimits {
        &self.limits
    }

    /// Fit, encode and shrink until the payload is under the hard limit.
    pub fn encode(&self, image: &DynamicImage) -> Result<EncodedFrame, CaptureError> {
        let limits = &self.limits;
        let mut frame = if image.width() > limits.max_width || image.height() > limits.max_height {
            image.resize(limits.max_width, limits.max_height, FilterType::Triangle)
        } else {
            image.clone()
        };

        let qualities: &[u8] = if limits.qualities.is_empty() {
            &[60]
        } else {
            &limits.qualities
        };

        let mut quality = qualities[0];
        let mut jpeg = encode_jpeg(&frame, quality)?;
        let mut advisory = None;

        for &next in &qualities[1..] {
            if jpeg.len() <= limits.soft_limit {
                break;
            }
            tracing::debug!(bytes = jpeg.len(), quality = next, "Frame above soft limit, recompressing");
            quality = next;
            jpeg = encode_jpeg(&frame, quality)?;
            advisory = Some(SizeAdvisory::Compressed { bytes: jpeg.len() });
        }
        if jpeg.len() > limits.soft_limit && advisory.is_none() {
            advisory = Some(SizeAdvisory::Compressed { bytes: jpeg.len() });
        }

        while jpeg.len() > limits.hard_limit {
            let (width, height) = (frame.width() / 2, frame.height() / 2);
            if width < limits.min_dimension || height < limits.min_dimension {
                return Err(CaptureError::TooLarge {
                    bytes: jpeg.len(),
                    limit: limits.hard_limit,
                });
            }
            tracing::warn!(
                bytes = jpeg.len(),
                width,
                height,
                "Frame above hard limit, halving resolution"
            );
            frame = frame.resize_exact(width, height, FilterType::Triangle);
            jpeg = encode_jpeg(&frame, quality)?;
            advisory = Some(SizeAdvisory::Reduced {
                bytes: jpeg.len(),
                width,
                height,
            });
        }

        if let Some(SizeAdvisory::Compressed { bytes }) = &mut advisory {
            *bytes = jpeg.len();
        }

        let data_uri = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&jpeg)
        );

        Ok(EncodedFrame {
            data_uri,
            bytes: jpeg.len(),
            width: frame.width(),
            height: frame.height(),
            quality,
            advisory,
        })
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn noisy(width: u32, height: u32) -> DynamicImage {
        // Deterministic high-frequency pattern; compresses poorly.
        let image = RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2_654_435_761).wrapping_add(y.wrapping_mul(40_503)) ^ (x * y);
            Rgb([(v & 0xFF) as u8, ((v >> 8) & 0xFF) as u8, ((v >> 16) & 0xFF) as u8])
        });
        DynamicImage::ImageRgb8(image)
    }

    fn flat(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 150])))
    }

    #[test]
    fn test_small_frame_untouched() {
        let frame = FrameEncoder::default().encode(&flat(320, 240)).unwrap();
        assert_eq!((frame.width, frame.height), (320, 240));
        assert_eq!(frame.quality, 60);
        assert!(frame.advisory.is_none());
        assert!(frame.data_uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_landscape_fits_bounds() {
        let frame = FrameEncoder::default().encode(&flat(1920, 1080)).unwrap();
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 360);
    }

    #[test]
    fn test_portrait_fits_bounds() {
        let frame = FrameEncoder::default().encode(&flat(480, 960)).unwrap();
        assert_eq!(frame.width, 240);
        assert_eq!(frame.height, 480);
    }

    #[test]
    fn test_soft_limit_lowers_quality() {
        let encoder = FrameEncoder::new(FrameLimits {
            soft_limit: 1,
            ..Default::default()
        });
        let frame = encoder.encode(&flat(64, 64)).unwrap();
        assert_eq!(frame.quality, 40);
        assert_eq!(
            frame.advisory,
            Some(SizeAdvisory::Compressed { bytes: frame.bytes })
        );
    }

    #[test]
    fn test_hard_limit_halves_resolution() {
        let image = noisy(640, 480);
        let full = encode_jpeg(&image, 40).unwrap().len();

        let encoder = FrameEncoder::new(FrameLimits {
            soft_limit: 1,
            hard_limit: full - 1,
            ..Default::default()
        });
        let frame = encoder.encode(&image).unwrap();

        assert!(frame.bytes < full);
        assert!(frame.width <= 320 && frame.height <= 240);
        assert!(matches!(frame.advisory, Some(SizeAdvisory::Reduced { .. })));
    }

    #[test]
    fn test_unreachable_hard_limit_errors() {
        let encoder = FrameEncoder::new(FrameLimits {
            hard_limit: 16,
            ..Default::default()
        });
        let result = encoder.encode(&flat(128, 128));
        assert!(matches!(result, Err(CaptureError::TooLarge { limit: 16, .. })));
    }

    #[test]
    fn test_advisory_messages() {
        let compressed = SizeAdvisory::Compressed { bytes: 1_200_000 };
        assert_eq!(compressed.message(), "Frame compressed: 1171KB");
        let json = serde_json::to_value(&compressed).unwrap();
        assert_eq!(json["kind"], "compressed");
    }
}
