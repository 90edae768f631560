use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use novade_buffer_manager::hal::{AllocInfo, BufferHandle, Gralloc, HalResult, SoftwareGralloc};
use novade_buffer_manager::{
    BestEffort, BufferAllocator, ConsumerUsage, Parcel, ParcelReader, PixelFormat, SharedAllocator,
    SharedSurfaceBuffer, SurfaceBuffer, SurfaceError,
};
use novade_buffer_queue::{
    BufferQueue, BufferQueueProducer, ConsumerListener, ProducerProxy, RequestCode, Transport, MAX_REQUEST_CODE,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

/// Software backend that counts cache flushes.
struct CountingGralloc {
    inner: SoftwareGralloc,
    flushes: Arc<AtomicUsize>,
}

impl Gralloc for CountingGralloc {
    fn alloc_mem(&self, info: &AllocInfo) -> HalResult<BufferHandle> {
        self.inner.alloc_mem(info)
    }
    fn free_mem(&self, handle: &BufferHandle) -> HalResult<()> {
        self.inner.free_mem(handle)
    }
    fn mmap(&self, handle: &BufferHandle) -> HalResult<usize> {
        self.inner.mmap(handle)
    }
    fn mmap_cache(&self, handle: &BufferHandle) -> HalResult<usize> {
        self.inner.mmap_cache(handle)
    }
    fn unmap(&self, handle: &BufferHandle) -> HalResult<()> {
        self.inner.unmap(handle)
    }
    fn flush_cache(&self, handle: &BufferHandle) -> HalResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.inner.flush_cache(handle)
    }
    fn flush_m_cache(&self, handle: &BufferHandle) -> HalResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.inner.flush_m_cache(handle)
    }
}

fn counting_allocator() -> (SharedAllocator, Arc<AtomicUsize>) {
    let flushes = Arc::new(AtomicUsize::new(0));
    let gralloc = CountingGralloc {
        inner: SoftwareGralloc::new(64 << 20, 16),
        flushes: flushes.clone(),
    };
    (Arc::new(Mutex::new(BufferAllocator::with_gralloc(Box::new(gralloc)))), flushes)
}

/// Minimal queue: allocates lazily up to `queue_size` buffers.
struct SimpleQueue {
    allocator: SharedAllocator,
    free: VecDeque<SharedSurfaceBuffer>,
    dequeued: Vec<SharedSurfaceBuffer>,
    published: Arc<Mutex<Vec<SharedSurfaceBuffer>>>,
    allocated: u32,
    queue_size: u32,
    width: u32,
    height: u32,
    format: u32,
    stride_alignment: u32,
    size: u32,
    usage: u32,
    user_data: HashMap<String, String>,
}

impl SimpleQueue {
    fn new(allocator: SharedAllocator, published: Arc<Mutex<Vec<SharedSurfaceBuffer>>>) -> Self {
        Self {
            allocator,
            free: VecDeque::new(),
            dequeued: Vec::new(),
            published,
            allocated: 0,
            queue_size: 1,
            width: 0,
            height: 0,
            format: PixelFormat::Rgb565.into(),
            stride_alignment: 4,
            size: 0,
            usage: ConsumerUsage::Software.into(),
            user_data: HashMap::new(),
        }
    }

    fn take_dequeued(&mut self, buffer: &SurfaceBuffer) -> Option<SharedSurfaceBuffer> {
        let index = self.dequeued.iter().position(|b| {
            let b = b.lock();
            b.key() == buffer.key() && b.phy_addr() == buffer.phy_addr()
        })?;
        Some(self.dequeued.remove(index))
    }
}

impl BufferQueue for SimpleQueue {
    fn request_buffer(&mut self, _wait: u8) -> Option<SharedSurfaceBuffer> {
        let buffer = match self.free.pop_front() {
            Some(buffer) => buffer,
            None if self.allocated < self.queue_size => {
                let mut allocator = self.allocator.lock();
                let buffer = if self.size > 0 {
                    allocator.alloc_buffer_with_size(self.size, self.usage)
                } else {
                    allocator.alloc_buffer(self.width, self.height, self.format, self.usage)
                }
                .ok()?;
                self.allocated += 1;
                Arc::new(Mutex::new(buffer))
            }
            None => return None,
        };
        self.dequeued.push(buffer.clone());
        Some(buffer)
    }

    fn flush_buffer(&mut self, buffer: &SurfaceBuffer) -> Result<(), SurfaceError> {
        let target = self.take_dequeued(buffer).ok_or(SurfaceError::InvalidParam)?;
        target.lock().copy_extra_data(&mut buffer.clone());
        self.published.lock().push(target);
        Ok(())
    }

    fn cancel_buffer(&mut self, buffer: &SurfaceBuffer) {
        if let Some(target) = self.take_dequeued(buffer) {
            self.free.push_back(target);
        }
    }

    fn set_queue_size(&mut self, queue_size: u32) {
        self.queue_size = queue_size;
    }
    fn queue_size(&self) -> u32 {
        self.queue_size
    }
    fn set_width_and_height(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn set_format(&mut self, format: u32) {
        self.format = format;
    }
    fn format(&self) -> u32 {
        self.format
    }
    fn set_stride_alignment(&mut self, alignment: u32) {
        self.stride_alignment = alignment;
    }
    fn stride_alignment(&self) -> u32 {
        self.stride_alignment
    }
    fn stride(&self) -> u32 {
        let bpp = PixelFormat::try_from(self.format)
            .ok()
            .and_then(PixelFormat::bytes_per_pixel)
            .unwrap_or(0);
        let row = self.width * u32::from(bpp);
        let align = self.stride_alignment.max(1);
        (row + align - 1) / align * align
    }
    fn set_size(&mut self, size: u32) {
        self.size = size;
    }
    fn size(&self) -> u32 {
        self.size
    }
    fn set_usage(&mut self, usage: u32) {
        self.usage = usage;
    }
    fn usage(&self) -> u32 {
        self.usage
    }
    fn set_user_data(&mut self, key: &str, value: &str) {
        self.user_data.insert(key.to_string(), value.to_string());
    }
    fn user_data(&self, key: &str) -> String {
        self.user_data.get(key).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
struct CountingListener(AtomicUsize);

impl ConsumerListener for CountingListener {
    fn on_buffer_available(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingListener {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Delivers requests to an in-process producer.
struct Loopback(Arc<Mutex<BufferQueueProducer>>);

impl Transport for Loopback {
    fn transact(&mut self, code: u32, data: &[u8]) -> Result<Vec<u8>, SurfaceError> {
        let mut reply = Parcel::new();
        let status = self.0.lock().on_ipc_msg(code, &mut ParcelReader::new(data), &mut reply);
        if reply.is_empty() {
            status?;
        }
        Ok(reply.into_bytes())
    }
}

struct Fixture {
    producer: Arc<Mutex<BufferQueueProducer>>,
    allocator: SharedAllocator,
    published: Arc<Mutex<Vec<SharedSurfaceBuffer>>>,
    listener: Arc<CountingListener>,
    flushes: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        let (allocator, flushes) = counting_allocator();
        let published = Arc::new(Mutex::new(Vec::new()));
        let queue = SimpleQueue::new(allocator.clone(), published.clone());
        let mut producer = BufferQueueProducer::new(Box::new(queue), allocator.clone());
        let listener = Arc::new(CountingListener::default());
        producer.register_consumer_listener(listener.clone());
        Self {
            producer: Arc::new(Mutex::new(producer)),
            allocator,
            published,
            listener,
            flushes,
        }
    }

    fn proxy(&self) -> ProducerProxy<Loopback> {
        ProducerProxy::new(Loopback(self.producer.clone()))
    }

    fn raw(&self, code: u32, data: &Parcel) -> (Result<(), SurfaceError>, Parcel) {
        let mut reply = Parcel::new();
        let status = self
            .producer
            .lock()
            .on_ipc_msg(code, &mut ParcelReader::new(data.as_bytes()), &mut reply);
        (status, reply)
    }
}

#[test]
fn test_allocate_map_flush_free_lifecycle() {
    let (allocator, flushes) = counting_allocator();
    let mut allocator = allocator.lock();

    let mut buffer = allocator
        .alloc_buffer(64, 64, PixelFormat::Argb8888.into(), ConsumerUsage::Software.into())
        .unwrap();
    assert!(buffer.size() > 0);
    allocator.map_buffer(&mut buffer).unwrap();
    assert!(buffer.vir_addr().is_some());

    assert_eq!(allocator.flush_cache(&buffer), Ok(BestEffort::Skipped));
    assert_eq!(flushes.load(Ordering::SeqCst), 0);

    let (key, phy_addr) = (buffer.key(), buffer.phy_addr());
    assert!(allocator.is_registered(key, phy_addr));
    let mut slot = Some(buffer);
    assert_eq!(allocator.free_buffer(&mut slot), BestEffort::Done);
    assert!(slot.is_none());
    assert!(!allocator.is_registered(key, phy_addr));
    assert_eq!(allocator.live_buffers(), 0);
}

#[test]
fn test_request_without_free_buffer_replies_status_only() {
    let fixture = Fixture::new();
    fixture.producer.lock().set_queue_size(0);

    let mut data = Parcel::new();
    data.write_u8(0);
    let (status, reply) = fixture.raw(RequestCode::RequestBuffer.into(), &data);
    assert_eq!(status, Err(SurfaceError::NoBuffer));
    assert_eq!(reply.len(), 4);
    assert!(reply.reader().read_i32().unwrap() < 0);

    assert_eq!(fixture.proxy().request_buffer(0), Err(SurfaceError::NoBuffer));
}

#[test]
fn test_request_then_flush_notifies_listener_once() {
    let fixture = Fixture::new();
    let mut proxy = fixture.proxy();
    proxy.set_width_and_height(32, 16).unwrap();
    proxy.set_format(PixelFormat::Rgb888.into()).unwrap();

    let mut buffer = proxy.request_buffer(1).unwrap();
    assert!(buffer.size() > 0);
    assert!(fixture.allocator.lock().is_registered(buffer.key(), buffer.phy_addr()));

    buffer.set_data_len(1024);
    buffer.set_int32(1, 90).unwrap();
    buffer.set_int64(2, 1_700_000_000_000).unwrap();
    proxy.flush_buffer(&buffer).unwrap();

    assert_eq!(fixture.listener.count(), 1);
    let published = fixture.published.lock();
    assert_eq!(published.len(), 1);
    let shown = published[0].lock();
    assert_eq!(shown.key(), buffer.key());
    assert_eq!(shown.data_len(), 1024);
    assert_eq!(shown.get_int32(1), Ok(90));
    assert_eq!(shown.get_int64(2), Ok(1_700_000_000_000));
}

#[test]
fn test_flush_of_unknown_buffer_reports_status_without_notifying() {
    let fixture = Fixture::new();
    let mut data = Parcel::new();
    SurfaceBuffer::empty().write_to_parcel(&mut data);
    let (status, reply) = fixture.raw(RequestCode::FlushBuffer.into(), &data);
    assert_eq!(status, Ok(()));
    assert_eq!(reply.reader().read_i32(), Ok(SurfaceError::InvalidParam.code()));
    assert_eq!(fixture.listener.count(), 0);
}

#[test]
fn test_consumer_cache_buffers_are_flushed_before_publishing() {
    let fixture = Fixture::new();
    let mut proxy = fixture.proxy();
    proxy.set_size(4096).unwrap();
    proxy.set_usage(ConsumerUsage::HardwareConsumerCache.into()).unwrap();

    let buffer = proxy.request_buffer(0).unwrap();
    proxy.flush_buffer(&buffer).unwrap();
    assert_eq!(fixture.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.listener.count(), 1);

    // Software buffers skip the cache flush.
    proxy.set_usage(ConsumerUsage::Software.into()).unwrap();
    proxy.set_queue_size(2).unwrap();
    let buffer = proxy.request_buffer(0).unwrap();
    proxy.flush_buffer(&buffer).unwrap();
    assert_eq!(fixture.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.listener.count(), 2);
}

#[test]
fn test_cancel_returns_buffer_to_the_queue() {
    let fixture = Fixture::new();
    let mut proxy = fixture.proxy();
    proxy.set_width_and_height(8, 8).unwrap();
    let first = proxy.request_buffer(0).unwrap();
    assert_eq!(proxy.request_buffer(0), Err(SurfaceError::NoBuffer));
    proxy.cancel_buffer(&first).unwrap();
    let again = proxy.request_buffer(0).unwrap();
    assert_eq!(again.key(), first.key());
    assert_eq!(fixture.allocator.lock().live_buffers(), 1);
}

#[test]
fn test_attributes_round_trip_through_the_proxy() {
    let fixture = Fixture::new();
    let mut proxy = fixture.proxy();
    proxy.set_queue_size(3).unwrap();
    proxy.set_width_and_height(100, 50).unwrap();
    proxy.set_format(PixelFormat::Argb8888.into()).unwrap();
    proxy.set_stride_alignment(64).unwrap();
    proxy.set_size(8192).unwrap();
    proxy.set_usage(ConsumerUsage::Hardware.into()).unwrap();

    assert_eq!(proxy.queue_size(), Ok(3));
    assert_eq!(proxy.width(), Ok(100));
    assert_eq!(proxy.height(), Ok(50));
    assert_eq!(proxy.format(), Ok(PixelFormat::Argb8888 as u32));
    assert_eq!(proxy.stride_alignment(), Ok(64));
    assert_eq!(proxy.stride(), Ok(448));
    assert_eq!(proxy.size(), Ok(8192));
    assert_eq!(proxy.usage(), Ok(ConsumerUsage::Hardware as u32));
}

#[test]
fn test_user_data_requests() {
    let fixture = Fixture::new();
    let mut proxy = fixture.proxy();
    proxy.set_user_data("app", "clock").unwrap();
    assert_eq!(proxy.user_data("app").as_deref(), Ok("clock"));
    assert_eq!(proxy.user_data("other").as_deref(), Ok(""));

    let mut data = Parcel::new();
    data.write_string("");
    data.write_string("value");
    let (status, reply) = fixture.raw(RequestCode::SetUserData.into(), &data);
    assert_eq!(status, Err(SurfaceError::InvalidParam));
    assert!(reply.is_empty());
    assert_eq!(proxy.set_user_data("key", ""), Err(SurfaceError::InvalidParam));
    assert_eq!(fixture.producer.lock().user_data("key"), "");
}

#[test]
fn test_local_user_data_with_nul_stays_readable_remotely() {
    let fixture = Fixture::new();
    fixture.producer.lock().set_user_data("tag", "left\0right");
    let mut proxy = fixture.proxy();
    assert_eq!(proxy.user_data("tag").as_deref(), Ok("left"));
}

#[test]
fn test_flush_with_oversized_reserved_slots_is_rejected() {
    let fixture = Fixture::new();
    let mut data = Parcel::new();
    data.write_i32(1);
    data.write_u64(0x1000);
    data.write_u32(0x1000_0000);
    data.write_u32(0x1000_0000);
    data.write_u32(4096);
    data.write_u32(ConsumerUsage::HardwareConsumerCache.into());
    data.write_u32(0);
    data.write_u32(0);
    let (status, reply) = fixture.raw(RequestCode::FlushBuffer.into(), &data);
    assert_eq!(status, Err(SurfaceError::InvalidParam));
    assert!(reply.is_empty());
    assert_eq!(fixture.flushes.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.listener.count(), 0);
}

#[test]
fn test_unknown_request_code_is_rejected() {
    let fixture = Fixture::new();
    let (status, reply) = fixture.raw(MAX_REQUEST_CODE, &Parcel::new());
    assert_eq!(status, Err(SurfaceError::InvalidRequest(MAX_REQUEST_CODE)));
    assert!(reply.is_empty());
}

#[test]
fn test_truncated_arguments_are_invalid_param() {
    let fixture = Fixture::new();
    let mut data = Parcel::new();
    data.write_u32(640);
    let (status, reply) = fixture.raw(RequestCode::SetWidthAndHeight.into(), &data);
    assert_eq!(status, Err(SurfaceError::InvalidParam));
    assert!(reply.is_empty());
    assert_eq!(fixture.producer.lock().width(), 0);
}
