//! Boundaries to the buffer queue and its consumer.
//!
//! The queue owns the slot state machine and any blocking on free buffers;
//! this crate only calls into it. Implementations are provided by the
//! compositor.

use novade_buffer_manager::{SharedSurfaceBuffer, SurfaceBuffer, SurfaceError};

/// A queue of surface buffers shared by a producer and a consumer.
pub trait BufferQueue: Send {
    /// Hands out a free buffer, or `None` if none is available.
    ///
    /// `wait` is passed through unchanged from the producer's request.
    fn request_buffer(&mut self, wait: u8) -> Option<SharedSurfaceBuffer>;

    /// Publishes a filled buffer to the consumer.
    fn flush_buffer(&mut self, buffer: &SurfaceBuffer) -> Result<(), SurfaceError>;

    /// Returns a requested buffer unused.
    fn cancel_buffer(&mut self, buffer: &SurfaceBuffer);

    fn set_queue_size(&mut self, queue_size: u32);
    fn queue_size(&self) -> u32;

    fn set_width_and_height(&mut self, width: u32, height: u32);
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn set_format(&mut self, format: u32);
    fn format(&self) -> u32;

    fn set_stride_alignment(&mut self, alignment: u32);
    fn stride_alignment(&self) -> u32;

    /// Row stride derived from the current width, format and alignment.
    fn stride(&self) -> u32;

    fn set_size(&mut self, size: u32);
    fn size(&self) -> u32;

    fn set_usage(&mut self, usage: u32);
    fn usage(&self) -> u32;

    fn set_user_data(&mut self, key: &str, value: &str);

    /// Value stored under `key`, or an empty string.
    fn user_data(&self, key: &str) -> String;
}

/// Notified by the producer endpoint when a buffer has been published.
pub trait ConsumerListener: Send + Sync {
    fn on_buffer_available(&self);
}
