//! Pixel buffers and the fixed-size surface pool.
//!
//! A [`Surface`] owns one contiguous row-major pixel buffer of fixed
//! dimensions. The [`SurfaceCache`] pre-allocates a small number of
//! buffers so the capture producer does not hit the heap on every frame;
//! a pooled surface hands its buffer back to the cache when the last
//! reference to it drops.

use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Channel order of a surface's pixel data.
///
/// Capture output is delivered as `Rgb`; the other orders exist for
/// surfaces wrapping buffers a backend produced natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    Rgb,
    Rgba,
    Bgr,
    Bgra,
}

impl ChannelOrder {
    /// Bytes per pixel for this order.
    pub fn channels(&self) -> usize {
        match self {
            ChannelOrder::Rgb | ChannelOrder::Bgr => 3,
            ChannelOrder::Rgba | ChannelOrder::Bgra => 4,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, ChannelOrder::Rgba | ChannelOrder::Bgra)
    }
}

/// An owned pixel buffer of fixed width, height, and channel order.
/// Never resized in place.
pub struct Surface {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
    // Set for pooled surfaces; Drop returns the buffer through it.
    pool: Option<Weak<PoolInner>>,
}

/// Shared reference to a published frame. Cloned by the consumer; the
/// underlying buffer is reclaimed by its pool once every clone drops.
pub type SurfaceRef = Arc<Surface>;

impl Surface {
    /// Allocate a standalone (unpooled) surface, zero-filled.
    pub fn new(width: u32, height: u32, order: ChannelOrder) -> Self {
        let len = width as usize * height as usize * order.channels();
        Self {
            width,
            height,
            order,
            data: vec![0; len],
            pool: None,
        }
    }

    fn pooled(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>, pool: Weak<PoolInner>) -> Self {
        Self {
            width,
            height,
            order,
            data,
            pool: Some(pool),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    /// Bytes per row; rows are tightly packed.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.order.channels()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `src` rows into this surface, clipping each row to the
    /// shorter of the two strides. Used by producers whose native
    /// buffers carry driver padding.
    pub fn copy_rows(&mut self, src: &[u8], src_stride: usize) {
        let dst_stride = self.row_bytes();
        let rows = self.height as usize;
        let copy = dst_stride.min(src_stride);
        for row in 0..rows {
            let src_off = row * src_stride;
            if src_off + copy > src.len() {
                break;
            }
            let dst_off = row * dst_stride;
            self.data[dst_off..dst_off + copy].copy_from_slice(&src[src_off..src_off + copy]);
        }
    }

    /// True when this surface's buffer came from a pool.
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            if let Some(inner) = pool.upgrade() {
                inner.reclaim(mem::take(&mut self.data));
            }
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

struct PoolInner {
    width: u32,
    height: u32,
    order: ChannelOrder,
    free: Mutex<Vec<Vec<u8>>>,
    // Pooled buffers currently checked out; diagnostics only.
    outstanding: AtomicUsize,
}

impl PoolInner {
    fn reclaim(&self, data: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        if let Ok(mut free) = self.free.lock() {
            free.push(data);
        }
    }
}

/// A small fixed pool of reusable pixel buffers.
///
/// `get_new_surface` pops a free buffer, or allocates an unpooled
/// overflow surface when every slot is outstanding. The overflow path
/// keeps the producer from ever blocking on the consumer; it only
/// sacrifices the no-allocation guarantee, which is the expected cost
/// when a caller retains more than `capacity` frames at once.
pub struct SurfaceCache {
    inner: Arc<PoolInner>,
    capacity: usize,
}

/// Pool depth used by the backends. Two frames may legitimately be alive
/// at once (one being written, one held by the consumer); four leaves
/// headroom for a consumer that holds a frame across a tick.
pub const DEFAULT_POOL_SURFACES: usize = 4;

impl SurfaceCache {
    pub fn new(width: u32, height: u32, order: ChannelOrder, capacity: usize) -> Self {
        let len = width as usize * height as usize * order.channels();
        let free = (0..capacity).map(|_| vec![0u8; len]).collect();
        Self {
            inner: Arc::new(PoolInner {
                width,
                height,
                order,
                free: Mutex::new(free),
                outstanding: AtomicUsize::new(0),
            }),
            capacity,
        }
    }

    /// Hand out a writable surface of the pool's dimensions.
    pub fn get_new_surface(&self) -> Surface {
        let recycled = self
            .inner
            .free
            .lock()
            .map(|mut free| free.pop())
            .unwrap_or(None);

        match recycled {
            Some(mut data) => {
                // A recycled buffer always has the right length; pools are
                // never resized in place.
                debug_assert_eq!(
                    data.len(),
                    self.inner.width as usize
                        * self.inner.height as usize
                        * self.inner.order.channels()
                );
                data.as_mut_slice().fill(0);
                self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
                Surface::pooled(
                    self.inner.width,
                    self.inner.height,
                    self.inner.order,
                    data,
                    Arc::downgrade(&self.inner),
                )
            }
            None => {
                log::trace!(
                    "surface pool exhausted ({} outstanding), allocating overflow surface",
                    self.inner.outstanding.load(Ordering::Relaxed)
                );
                Surface::new(self.inner.width, self.inner.height, self.inner.order)
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.inner.order
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pooled buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Relaxed)
    }
}
