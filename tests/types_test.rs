//! Tests for framegrab core types
//!
//! Covers the capture mode data model, rational frame rates, and
//! resolution negotiation.

use framegrab::types::{best_mode_for, Codec, FrameRate, Mode, PixelFormat};

fn mode(w: u32, h: u32, fps: u32) -> Mode {
    Mode::new(
        w,
        h,
        FrameRate::new(fps, 1),
        Codec::Uncompressed,
        PixelFormat::Yuy2,
    )
}

#[cfg(test)]
mod frame_rate_tests {
    use super::*;

    #[test]
    fn test_rational_equality_ignores_scale() {
        assert_eq!(FrameRate::new(30, 1), FrameRate::new(60, 2));
        assert_eq!(FrameRate::new(30000, 1001), FrameRate::new(60000, 2002));
        assert_ne!(FrameRate::new(30000, 1001), FrameRate::new(30, 1));
    }

    #[test]
    fn test_ordering_is_by_value() {
        assert!(FrameRate::new(24, 1) < FrameRate::new(30000, 1001));
        assert!(FrameRate::new(30000, 1001) < FrameRate::new(30, 1));
        assert!(FrameRate::new(60, 1) > FrameRate::new(30, 1));
    }

    #[test]
    fn test_zero_denominator_is_clamped() {
        let rate = FrameRate::new(30, 0);
        assert_eq!(rate.den, 1);
        assert_eq!(rate.as_f64(), 30.0);
    }

    #[test]
    fn test_display_rounds_ntsc_rates() {
        assert_eq!(FrameRate::new(30, 1).to_string(), "30");
        assert_eq!(FrameRate::new(30000, 1001).to_string(), "29.97");
    }
}

#[cfg(test)]
mod mode_tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        let m = Mode::new(
            1280,
            720,
            FrameRate::new(30, 1),
            Codec::Jpeg,
            PixelFormat::Unknown,
        );
        assert_eq!(m.to_string(), "1280x720 @30fps JPEG Unknown");
    }

    #[test]
    fn test_mode_serialization() {
        let m = mode(640, 480, 30).with_platform_data("YUYV");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("YUYV"));

        let back: Mode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.platform_data.as_deref(), Some("YUYV"));
    }

    #[test]
    fn test_mode_ordering_key() {
        // Pixel count dominates, then frame rate, then codec cost.
        let mut modes = vec![
            Mode::new(640, 480, FrameRate::new(30, 1), Codec::Jpeg, PixelFormat::Unknown),
            mode(1920, 1080, 30),
            mode(640, 480, 60),
            mode(640, 480, 30),
        ];
        modes.sort();

        assert_eq!(modes[0].codec, Codec::Uncompressed);
        assert_eq!(modes[0].frame_rate, FrameRate::new(30, 1));
        assert_eq!(modes[1].codec, Codec::Jpeg);
        assert_eq!(modes[2].frame_rate, FrameRate::new(60, 1));
        assert_eq!(modes[3].pixel_count(), 1920 * 1080);
    }

    #[test]
    fn test_compression_flag() {
        assert!(!mode(640, 480, 30).is_compressed());
        for codec in [Codec::Jpeg, Codec::H264, Codec::Hevc] {
            let m = Mode::new(640, 480, FrameRate::new(30, 1), codec, PixelFormat::Unknown);
            assert!(m.is_compressed(), "{} should be compressed", codec);
        }
    }

}

#[cfg(test)]
mod negotiation_tests {
    use super::*;

    #[test]
    fn test_exact_match_wins() {
        let modes = vec![mode(320, 240, 30), mode(640, 480, 30), mode(1280, 720, 30)];
        let best = best_mode_for(&modes, 640, 480).unwrap();
        assert_eq!((best.width, best.height), (640, 480));
    }

    #[test]
    fn test_nearest_pixel_count_wins() {
        let modes = vec![mode(320, 240, 30), mode(1920, 1080, 30)];
        // 800x600 = 480000 px; 320x240 is 403200 away, 1080p is 1593600.
        let best = best_mode_for(&modes, 800, 600).unwrap();
        assert_eq!((best.width, best.height), (320, 240));
    }

    #[test]
    fn test_tie_goes_to_enumeration_order() {
        let modes = vec![mode(480, 640, 30), mode(640, 480, 30)];
        let best = best_mode_for(&modes, 640, 480).unwrap();
        assert_eq!((best.width, best.height), (480, 640));
    }

    #[test]
    fn test_empty_list_yields_none() {
        assert!(best_mode_for(&[], 640, 480).is_none());
    }

    #[test]
    fn test_single_mode_always_wins() {
        let modes = vec![mode(160, 120, 15)];
        let best = best_mode_for(&modes, 3840, 2160).unwrap();
        assert_eq!((best.width, best.height), (160, 120));
    }
}
