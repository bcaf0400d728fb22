//! Pixel-format conversion into the capture output channel order.
//!
//! Backends that receive raw frames in a native layout convert them once
//! per frame, at publish time, into tightly packed RGB24. YUV conversion
//! uses BT.601 coefficients.

use crate::errors::CaptureError;
use crate::surface::{ChannelOrder, Surface};
use crate::types::PixelFormat;

#[inline]
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> (u8, u8, u8) {
    let u = u - 128.0;
    let v = v - 128.0;
    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
    (r, g, b)
}

/// Convert one frame of `src` in `format` into `dst` (which must be an
/// RGB24 surface of the frame's dimensions).
///
/// Fails with `InvalidChannelOrder` when the source layout has no
/// mapping to the output order.
pub fn convert_to_rgb(
    src: &[u8],
    format: PixelFormat,
    dst: &mut Surface,
) -> Result<(), CaptureError> {
    if dst.channel_order() != ChannelOrder::Rgb {
        return Err(CaptureError::InvalidChannelOrder(format!(
            "destination surface is {:?}, expected Rgb",
            dst.channel_order()
        )));
    }

    let width = dst.width() as usize;
    let height = dst.height() as usize;

    match format {
        PixelFormat::Rgb24 => {
            let len = dst.data().len().min(src.len());
            dst.data_mut()[..len].copy_from_slice(&src[..len]);
            Ok(())
        }
        PixelFormat::Bgr24 => {
            let out = dst.data_mut();
            for (o, i) in out.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                o[0] = i[2];
                o[1] = i[1];
                o[2] = i[0];
            }
            Ok(())
        }
        PixelFormat::Argb32 => {
            let out = dst.data_mut();
            for (o, i) in out.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                o[0] = i[1];
                o[1] = i[2];
                o[2] = i[3];
            }
            Ok(())
        }
        PixelFormat::Bgra32 => {
            let out = dst.data_mut();
            for (o, i) in out.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                o[0] = i[2];
                o[1] = i[1];
                o[2] = i[0];
            }
            Ok(())
        }
        PixelFormat::Yuy2 => {
            // Y0 U Y1 V, 4 bytes per 2 pixels.
            let out = dst.data_mut();
            for (o, i) in out.chunks_exact_mut(6).zip(src.chunks_exact(4)) {
                let (u, v) = (i[1] as f32, i[3] as f32);
                let (r0, g0, b0) = yuv_to_rgb(i[0] as f32, u, v);
                let (r1, g1, b1) = yuv_to_rgb(i[2] as f32, u, v);
                o[0] = r0;
                o[1] = g0;
                o[2] = b0;
                o[3] = r1;
                o[4] = g1;
                o[5] = b1;
            }
            Ok(())
        }
        PixelFormat::Uyvy => {
            // U Y0 V Y1, 4 bytes per 2 pixels.
            let out = dst.data_mut();
            for (o, i) in out.chunks_exact_mut(6).zip(src.chunks_exact(4)) {
                let (u, v) = (i[0] as f32, i[2] as f32);
                let (r0, g0, b0) = yuv_to_rgb(i[1] as f32, u, v);
                let (r1, g1, b1) = yuv_to_rgb(i[3] as f32, u, v);
                o[0] = r0;
                o[1] = g0;
                o[2] = b0;
                o[3] = r1;
                o[4] = g1;
                o[5] = b1;
            }
            Ok(())
        }
        PixelFormat::Nv12 => {
            // Y plane then interleaved UV at half resolution. Odd
            // dimensions round the chroma plane up.
            let (cw, ch) = chroma_plane_dims(width, height);
            check_planar_len(src.len(), width, height, cw, ch, format)?;
            let y_plane = &src[..width * height];
            let uv_plane = &src[width * height..];
            planar_420_to_rgb(dst, width, height, y_plane, |cx, cy| {
                let off = (cy * cw + cx) * 2;
                (uv_plane[off] as f32, uv_plane[off + 1] as f32)
            });
            Ok(())
        }
        PixelFormat::I420 | PixelFormat::Yuv420p => {
            // Y plane, then U plane, then V plane at quarter size.
            let (cw, ch) = chroma_plane_dims(width, height);
            check_planar_len(src.len(), width, height, cw, ch, format)?;
            let y_plane = &src[..width * height];
            let u_plane = &src[width * height..width * height + cw * ch];
            let v_plane = &src[width * height + cw * ch..];
            planar_420_to_rgb(dst, width, height, y_plane, |cx, cy| {
                (u_plane[cy * cw + cx] as f32, v_plane[cy * cw + cx] as f32)
            });
            Ok(())
        }
        PixelFormat::Yv12 => {
            // Like I420 with V before U.
            let (cw, ch) = chroma_plane_dims(width, height);
            check_planar_len(src.len(), width, height, cw, ch, format)?;
            let y_plane = &src[..width * height];
            let v_plane = &src[width * height..width * height + cw * ch];
            let u_plane = &src[width * height + cw * ch..];
            planar_420_to_rgb(dst, width, height, y_plane, |cx, cy| {
                (u_plane[cy * cw + cx] as f32, v_plane[cy * cw + cx] as f32)
            });
            Ok(())
        }
        PixelFormat::Unknown => Err(CaptureError::InvalidChannelOrder(
            "unknown source pixel format".into(),
        )),
    }
}

/// 4:2:0 chroma plane dimensions, rounded up for odd frame sizes.
fn chroma_plane_dims(width: usize, height: usize) -> (usize, usize) {
    ((width + 1) / 2, (height + 1) / 2)
}

/// A truncated buffer from a misbehaving driver must drop the frame, not
/// take the capture thread down with an out-of-bounds index.
fn check_planar_len(
    len: usize,
    width: usize,
    height: usize,
    cw: usize,
    ch: usize,
    format: PixelFormat,
) -> Result<(), CaptureError> {
    let needed = width * height + 2 * cw * ch;
    if len < needed {
        return Err(CaptureError::DeviceFailure(format!(
            "{} frame is {} bytes, {}x{} needs {}",
            format, len, width, height, needed
        )));
    }
    Ok(())
}

fn planar_420_to_rgb<F>(dst: &mut Surface, width: usize, height: usize, y_plane: &[u8], chroma: F)
where
    F: Fn(usize, usize) -> (f32, f32),
{
    let out = dst.data_mut();
    for row in 0..height {
        for col in 0..width {
            let y = y_plane[row * width + col] as f32;
            let (u, v) = chroma(col / 2, row / 2);
            let (r, g, b) = yuv_to_rgb(y, u, v);
            let off = (row * width + col) * 3;
            out[off] = r;
            out[off + 1] = g;
            out[off + 2] = b;
        }
    }
}
