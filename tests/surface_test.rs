//! Tests for surface pooling and pixel conversion
//!
//! Exercises the pool from the consumer's point of view: buffers come
//! back when frames are released, overflow never blocks, and conversion
//! output lands in tightly packed RGB.

use framegrab::convert::convert_to_rgb;
use framegrab::{CaptureError, ChannelOrder, PixelFormat, Surface, SurfaceCache};
use std::sync::Arc;

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn test_pool_reuses_released_buffers() {
        let cache = SurfaceCache::new(16, 16, ChannelOrder::Rgb, 2);

        let first = cache.get_new_surface();
        assert!(first.is_pooled());
        drop(first);

        // One in, one out, repeatedly; never exceeds the pool.
        for _ in 0..10 {
            let surface = cache.get_new_surface();
            assert!(surface.is_pooled());
            assert_eq!(cache.outstanding(), 1);
        }
        assert_eq!(cache.outstanding(), 0);
    }

    #[test]
    fn test_overflow_beyond_capacity_allocates() {
        let capacity = 3;
        let cache = SurfaceCache::new(8, 8, ChannelOrder::Rgb, capacity);

        let held: Vec<_> = (0..capacity).map(|_| cache.get_new_surface()).collect();
        assert!(held.iter().all(|s| s.is_pooled()));

        // Request capacity + 1: the extra surface is unpooled but usable.
        let extra = cache.get_new_surface();
        assert!(!extra.is_pooled());
        assert_eq!(extra.data().len(), 8 * 8 * 3);
    }

    #[test]
    fn test_handed_out_surfaces_are_zeroed() {
        let cache = SurfaceCache::new(4, 4, ChannelOrder::Rgb, 1);

        let mut surface = cache.get_new_surface();
        surface.data_mut().fill(0xFF);
        drop(surface);

        let recycled = cache.get_new_surface();
        assert!(recycled.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_shared_frame_returns_after_last_clone() {
        let cache = SurfaceCache::new(4, 4, ChannelOrder::Rgb, 1);
        let frame = Arc::new(cache.get_new_surface());
        let reader = Arc::clone(&frame);

        drop(frame);
        assert_eq!(cache.outstanding(), 1);
        drop(reader);
        assert_eq!(cache.outstanding(), 0);
    }

    #[test]
    fn test_pool_outlives_nothing_surfaces_outlive_pool() {
        let surface = {
            let cache = SurfaceCache::new(4, 4, ChannelOrder::Rgb, 2);
            cache.get_new_surface()
        };
        // Pool is gone; dropping the surface must not panic.
        assert_eq!(surface.data().len(), 4 * 4 * 3);
        drop(surface);
    }
}

#[cfg(test)]
mod conversion_tests {
    use super::*;

    #[test]
    fn test_rgb_passthrough_is_lossless() {
        let (w, h) = (8u32, 4u32);
        let src: Vec<u8> = (0..w * h * 3).map(|i| (i % 251) as u8).collect();

        let mut dst = Surface::new(w, h, ChannelOrder::Rgb);
        convert_to_rgb(&src, PixelFormat::Rgb24, &mut dst).unwrap();
        assert_eq!(dst.data(), src.as_slice());
    }

    #[test]
    fn test_bgra_drops_alpha_and_swizzles() {
        let src = [1u8, 2, 3, 255, 4, 5, 6, 0];
        let mut dst = Surface::new(2, 1, ChannelOrder::Rgb);
        convert_to_rgb(&src, PixelFormat::Bgra32, &mut dst).unwrap();
        assert_eq!(dst.data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_yuy2_white_and_black() {
        // Two pixel pairs: full luma then zero luma, neutral chroma.
        let src = [235u8, 128, 235, 128, 16, 128, 16, 128];
        let mut dst = Surface::new(4, 1, ChannelOrder::Rgb);
        convert_to_rgb(&src, PixelFormat::Yuy2, &mut dst).unwrap();

        let data = dst.data();
        assert!(data[..6].iter().all(|&b| b > 220), "bright pixels: {:?}", &data[..6]);
        assert!(data[6..].iter().all(|&b| b < 30), "dark pixels: {:?}", &data[6..]);
    }

    #[test]
    fn test_i420_and_yv12_swap_chroma_planes() {
        let (w, h) = (2usize, 2usize);
        // Y full, U=255, V=0 for I420; same bytes read as YV12 swap U/V.
        let mut src = vec![128u8; w * h];
        src.push(255); // first chroma plane
        src.push(0); // second chroma plane

        let mut i420 = Surface::new(w as u32, h as u32, ChannelOrder::Rgb);
        convert_to_rgb(&src, PixelFormat::I420, &mut i420).unwrap();
        let mut yv12 = Surface::new(w as u32, h as u32, ChannelOrder::Rgb);
        convert_to_rgb(&src, PixelFormat::Yv12, &mut yv12).unwrap();

        // U=255,V=0 pushes blue up; swapped planes push red up.
        assert!(i420.data()[2] > i420.data()[0], "I420 should lean blue");
        assert!(yv12.data()[0] > yv12.data()[2], "YV12 should lean red");
    }

    #[test]
    fn test_conversion_requires_rgb_destination() {
        let mut dst = Surface::new(1, 1, ChannelOrder::Bgra);
        let err = convert_to_rgb(&[0; 4], PixelFormat::Rgb24, &mut dst).unwrap_err();
        assert!(err.to_string().contains("channel order"));
    }

    #[test]
    fn test_truncated_nv12_is_an_error_not_a_panic() {
        // 16x16 NV12 needs 384 bytes; a short read from the driver must
        // come back as an error the capture loop can log and skip.
        let mut dst = Surface::new(16, 16, ChannelOrder::Rgb);
        let err = convert_to_rgb(&[0u8; 100], PixelFormat::Nv12, &mut dst).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceFailure(_)));
    }

    #[test]
    fn test_truncated_yv12_is_rejected() {
        // Y plane only, chroma planes missing entirely.
        let mut dst = Surface::new(4, 4, ChannelOrder::Rgb);
        let err = convert_to_rgb(&[128u8; 16], PixelFormat::Yv12, &mut dst).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceFailure(_)));
    }

    #[test]
    fn test_odd_width_i420_rounds_chroma_up() {
        // 5x4 I420 carries 3x2 chroma planes: 20 + 2 * 6 = 32 bytes.
        let src = vec![128u8; 32];
        let mut dst = Surface::new(5, 4, ChannelOrder::Rgb);
        convert_to_rgb(&src, PixelFormat::I420, &mut dst).unwrap();
        // Mid luma with neutral chroma is grey across every pixel.
        assert!(dst.data().iter().all(|&b| (125..=131).contains(&b)));
    }

    #[test]
    fn test_odd_size_nv12_converts_in_bounds() {
        // 3x3 NV12: 2x2 chroma pairs, 9 + 8 = 17 bytes exactly.
        let mut src = vec![16u8; 9];
        src.extend_from_slice(&[128; 8]);
        let mut dst = Surface::new(3, 3, ChannelOrder::Rgb);
        convert_to_rgb(&src, PixelFormat::Nv12, &mut dst).unwrap();
        assert!(dst.data().iter().all(|&b| b < 30));
    }
}
