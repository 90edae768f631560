//! Producer side of a buffer queue.

use std::sync::Arc;

use novade_buffer_manager::{
    ConsumerUsage, Parcel, ParcelReader, SharedAllocator, SharedSurfaceBuffer, SurfaceBuffer, SurfaceError,
};
use tracing::{debug, warn};

use crate::dispatcher;
use crate::queue::{BufferQueue, ConsumerListener};

/// Producer endpoint of one buffer queue.
///
/// Serves local producers directly and remote ones through
/// [`on_ipc_msg`](Self::on_ipc_msg).
pub struct BufferQueueProducer {
    queue: Box<dyn BufferQueue>,
    listener: Option<Arc<dyn ConsumerListener>>,
    allocator: SharedAllocator,
}

impl BufferQueueProducer {
    pub fn new(queue: Box<dyn BufferQueue>, allocator: SharedAllocator) -> Self {
        Self {
            queue,
            listener: None,
            allocator,
        }
    }

    pub fn request_buffer(&mut self, wait: u8) -> Option<SharedSurfaceBuffer> {
        self.queue.request_buffer(wait)
    }

    /// Hands `buffer` to the queue and, on success, tells the listener.
    pub fn enqueue_buffer(&mut self, buffer: &SurfaceBuffer) -> Result<(), SurfaceError> {
        self.queue.flush_buffer(buffer)?;
        if let Some(listener) = &self.listener {
            listener.on_buffer_available();
        }
        Ok(())
    }

    /// Flushes CPU caches where the usage needs it, then enqueues.
    pub fn flush_buffer(&mut self, buffer: &SurfaceBuffer) -> Result<(), SurfaceError> {
        if buffer.usage() == ConsumerUsage::HardwareConsumerCache as u32 {
            if let Err(e) = self.allocator.lock().flush_cache(buffer) {
                warn!("Flush buffer failed, ret={}", e.code());
                return Err(e);
            }
        }
        self.enqueue_buffer(buffer)
    }

    pub fn cancel_buffer(&mut self, buffer: &SurfaceBuffer) {
        self.queue.cancel_buffer(buffer);
    }

    pub fn set_queue_size(&mut self, queue_size: u32) {
        self.queue.set_queue_size(queue_size);
    }

    pub fn queue_size(&self) -> u32 {
        self.queue.queue_size()
    }

    pub fn set_width_and_height(&mut self, width: u32, height: u32) {
        self.queue.set_width_and_height(width, height);
    }

    pub fn width(&self) -> u32 {
        self.queue.width()
    }

    pub fn height(&self) -> u32 {
        self.queue.height()
    }

    pub fn set_format(&mut self, format: u32) {
        self.queue.set_format(format);
    }

    pub fn format(&self) -> u32 {
        self.queue.format()
    }

    pub fn set_stride_alignment(&mut self, alignment: u32) {
        self.queue.set_stride_alignment(alignment);
    }

    pub fn stride_alignment(&self) -> u32 {
        self.queue.stride_alignment()
    }

    pub fn stride(&self) -> u32 {
        self.queue.stride()
    }

    pub fn set_size(&mut self, size: u32) {
        self.queue.set_size(size);
    }

    pub fn size(&self) -> u32 {
        self.queue.size()
    }

    pub fn set_usage(&mut self, usage: u32) {
        self.queue.set_usage(usage);
    }

    pub fn usage(&self) -> u32 {
        self.queue.usage()
    }

    pub fn set_user_data(&mut self, key: &str, value: &str) {
        self.queue.set_user_data(key, value);
    }

    pub fn user_data(&self, key: &str) -> String {
        self.queue.user_data(key)
    }

    /// Replaces the listener notified after each successful enqueue.
    pub fn register_consumer_listener(&mut self, listener: Arc<dyn ConsumerListener>) {
        self.listener = Some(listener);
    }

    pub fn unregister_consumer_listener(&mut self) {
        self.listener = None;
    }

    /// Handles one request from a remote producer.
    ///
    /// Writes the reply into `reply` and returns the dispatch status. A
    /// request whose arguments cannot be decoded fails with
    /// [`SurfaceError::InvalidParam`]; the reply may then be empty.
    pub fn on_ipc_msg(&mut self, code: u32, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
        debug!("Producer request code {}", code);
        dispatcher::dispatch(self, code, data, reply)
    }
}
