//! Frame type and pixel conversion — YUYV to RGB, luma, dark detection.

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let pixels = self.data.len() / 3;
        if pixels == 0 {
            return 0.0;
        }
        self.data
            .chunks_exact(3)
            .map(|px| luma(px[0], px[1], px[2]) as f32)
            .sum::<f32>()
            / pixels as f32
    }
}

/// BT.601 luma of one RGB pixel.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Convert packed YUYV (4:2:2) to packed RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Check if an RGB frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(rgb: &[u8], threshold_pct: f32) -> bool {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return true;
    }
    let dark_count = rgb
        .chunks_exact(3)
        .filter(|px| luma(px[0], px[1], px[2]) < 32)
        .count();
    (dark_count as f32 / pixels as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_gray() {
        // Neutral chroma: Y passes straight through to all channels.
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_to_rgb_red_bias() {
        // High V pushes red up and green down.
        let yuyv = vec![128, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb[0], 255);
        assert!(rgb[1] < 128);
        assert_eq!(rgb[2], 128);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128];
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&vec![0u8; 300], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&vec![128u8; 300], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → should NOT be dark
        let mut rgb = vec![10u8; 940 * 3];
        rgb.extend(vec![128u8; 60 * 3]);
        assert!(!is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame {
            data: vec![200u8; 12],
            width: 2,
            height: 2,
            timestamp: std::time::Instant::now(),
            sequence: 0,
            is_dark: false,
        };
        assert!((frame.avg_brightness() - 200.0).abs() < 1.0);
    }
}
