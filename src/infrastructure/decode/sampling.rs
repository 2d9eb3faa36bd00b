//! Sample size and crop rectangle computation.

use crate::domain::entities::{Dimensions, Rect, SampleStrategy};

/// Ratio between source and destination along the less constrained axis.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn scale_ratio(source: Dimensions, dest: Dimensions) -> f32 {
    if dest.is_empty() || source.is_empty() {
        return 1.0;
    }
    let horizontal = source.width as f32 / dest.width as f32;
    let vertical = source.height as f32 / dest.height as f32;
    horizontal.min(vertical)
}

/// Integer downsampling factor for decoding `source` toward `dest`.
#[must_use]
pub fn sample_size(source: Dimensions, dest: Dimensions, strategy: SampleStrategy) -> u32 {
    strategy.sample_size(scale_ratio(source, dest))
}

/// Largest rectangle with the destination's aspect ratio that fits inside
/// `source`, centered on the given fractions and clamped to the source.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn crop_rect(
    source: Dimensions,
    dest: Dimensions,
    horizontal_center: f32,
    vertical_center: f32,
) -> Rect {
    if dest.is_empty() || source.is_empty() {
        return Rect::from_size(source);
    }
    let scale = f64::from(scale_ratio(source, dest));
    let crop_w = ((f64::from(dest.width) * scale).round() as u32).clamp(1, source.width);
    let crop_h = ((f64::from(dest.height) * scale).round() as u32).clamp(1, source.height);

    let left = centered_offset(source.width, crop_w, horizontal_center);
    let top = centered_offset(source.height, crop_h, vertical_center);
    Rect::new(left, top, left + crop_w, top + crop_h)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn centered_offset(total: u32, span: u32, center: f32) -> u32 {
    let max_offset = f64::from(total - span);
    let wanted = f64::from(center.clamp(0.0, 1.0)) * f64::from(total) - f64::from(span) / 2.0;
    wanted.round().clamp(0.0, max_offset) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1600, 1200, 100, 100, SampleStrategy::RoundNearest, 16 ; "nearest_ratio_twelve")]
    #[test_case(4000, 3000, 100, 100, SampleStrategy::RoundNearest, 32 ; "nearest_ratio_thirty")]
    #[test_case(1600, 1200, 100, 100, SampleStrategy::Truncate, 12 ; "truncate_ratio_twelve")]
    #[test_case(1650, 1250, 100, 100, SampleStrategy::RoundUp, 13 ; "round_up_ratio")]
    #[test_case(50, 50, 100, 100, SampleStrategy::RoundNearest, 1 ; "small_source")]
    #[test_case(100, 100, 0, 0, SampleStrategy::RoundNearest, 1 ; "empty_destination")]
    fn test_sample_size(sw: u32, sh: u32, dw: u32, dh: u32, strategy: SampleStrategy, expected: u32) {
        let source = Dimensions::new(sw, sh);
        let dest = Dimensions::new(dw, dh);
        assert_eq!(sample_size(source, dest, strategy), expected);
    }

    #[test]
    fn test_round_nearest_matches_power_of_two_formula() {
        for (sw, sh, dw, dh) in [(4000, 3000, 100, 100), (640, 480, 64, 64), (999, 333, 10, 20)] {
            let source = Dimensions::new(sw, sh);
            let dest = Dimensions::new(dw, dh);
            let ratio = (sw as f32 / dw as f32).min(sh as f32 / dh as f32);
            let expected = (2f32.powf(ratio.log2().round()).round() as u32).max(1);
            assert_eq!(sample_size(source, dest, SampleStrategy::RoundNearest), expected);
        }
    }

    #[test]
    fn test_center_crop_of_landscape_source() {
        let rect = crop_rect(Dimensions::new(1600, 1200), Dimensions::new(100, 100), 0.5, 0.5);
        assert_eq!(rect, Rect::new(200, 0, 1400, 1200));
    }

    #[test]
    fn test_crop_edges() {
        let source = Dimensions::new(1600, 1200);
        let dest = Dimensions::new(100, 100);
        assert_eq!(crop_rect(source, dest, 0.0, 0.0), Rect::new(0, 0, 1200, 1200));
        assert_eq!(crop_rect(source, dest, 1.0, 1.0), Rect::new(400, 0, 1600, 1200));
    }

    #[test]
    fn test_crop_keeps_destination_aspect() {
        let rect = crop_rect(Dimensions::new(1000, 1000), Dimensions::new(200, 100), 0.5, 0.25);
        assert_eq!(rect.size(), Dimensions::new(1000, 500));
        assert_eq!(rect.top, 0);
    }

    #[test]
    fn test_matching_aspect_uses_whole_source() {
        let source = Dimensions::new(800, 600);
        let rect = crop_rect(source, Dimensions::new(400, 300), 0.5, 0.5);
        assert_eq!(rect, Rect::from_size(source));
    }
}
