//! Client side of the producer protocol.
//!
//! [`ProducerProxy`] encodes each call as a request parcel, hands it to a
//! [`Transport`] and decodes the reply written by the dispatcher.

use novade_buffer_manager::{Parcel, ParcelReader, SurfaceBuffer, SurfaceError};
use tracing::trace;

use crate::dispatcher::RequestCode;

/// Carries one request to a producer endpoint and returns its reply.
pub trait Transport {
    /// Sends `data` under `code` and returns the reply bytes.
    ///
    /// An error means no reply was produced, either because delivery failed
    /// or because the endpoint rejected the request outright.
    fn transact(&mut self, code: u32, data: &[u8]) -> Result<Vec<u8>, SurfaceError>;
}

/// Remote handle on a [`BufferQueueProducer`](crate::BufferQueueProducer).
pub struct ProducerProxy<T: Transport> {
    transport: T,
}

impl<T: Transport> ProducerProxy<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn call<R>(
        &mut self,
        code: RequestCode,
        data: Parcel,
        read: impl FnOnce(&mut ParcelReader<'_>) -> Result<R, SurfaceError>,
    ) -> Result<R, SurfaceError> {
        trace!("Sending {:?} ({} bytes)", code, data.len());
        let reply = self.transport.transact(code.into(), data.as_bytes())?;
        let mut reader = ParcelReader::new(&reply);
        SurfaceError::from_code(reader.read_i32()?)?;
        read(&mut reader)
    }

    fn set(&mut self, code: RequestCode, values: &[u32]) -> Result<(), SurfaceError> {
        let mut data = Parcel::new();
        for value in values {
            data.write_u32(*value);
        }
        self.call(code, data, |_| Ok(()))
    }

    fn get(&mut self, code: RequestCode) -> Result<u32, SurfaceError> {
        self.call(code, Parcel::new(), |reply| Ok(reply.read_u32()?))
    }

    /// Requests a free buffer; fails with [`SurfaceError::NoBuffer`] if none is available.
    pub fn request_buffer(&mut self, wait: u8) -> Result<SurfaceBuffer, SurfaceError> {
        let mut data = Parcel::new();
        data.write_u8(wait);
        self.call(RequestCode::RequestBuffer, data, |reply| {
            Ok(SurfaceBuffer::read_from_parcel(reply)?)
        })
    }

    pub fn flush_buffer(&mut self, buffer: &SurfaceBuffer) -> Result<(), SurfaceError> {
        let mut data = Parcel::new();
        buffer.write_to_parcel(&mut data);
        self.call(RequestCode::FlushBuffer, data, |_| Ok(()))
    }

    pub fn cancel_buffer(&mut self, buffer: &SurfaceBuffer) -> Result<(), SurfaceError> {
        let mut data = Parcel::new();
        buffer.write_to_parcel(&mut data);
        self.call(RequestCode::CancelBuffer, data, |_| Ok(()))
    }

    pub fn set_queue_size(&mut self, queue_size: u32) -> Result<(), SurfaceError> {
        self.set(RequestCode::SetQueueSize, &[queue_size])
    }

    pub fn queue_size(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetQueueSize)
    }

    pub fn set_width_and_height(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.set(RequestCode::SetWidthAndHeight, &[width, height])
    }

    pub fn width(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetWidth)
    }

    pub fn height(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetHeight)
    }

    pub fn set_format(&mut self, format: u32) -> Result<(), SurfaceError> {
        self.set(RequestCode::SetFormat, &[format])
    }

    pub fn format(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetFormat)
    }

    pub fn set_stride_alignment(&mut self, alignment: u32) -> Result<(), SurfaceError> {
        self.set(RequestCode::SetStrideAlignment, &[alignment])
    }

    pub fn stride_alignment(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetStrideAlignment)
    }

    pub fn stride(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetStride)
    }

    pub fn set_size(&mut self, size: u32) -> Result<(), SurfaceError> {
        self.set(RequestCode::SetSize, &[size])
    }

    pub fn size(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetSize)
    }

    pub fn set_usage(&mut self, usage: u32) -> Result<(), SurfaceError> {
        self.set(RequestCode::SetUsage, &[usage])
    }

    pub fn usage(&mut self) -> Result<u32, SurfaceError> {
        self.get(RequestCode::GetUsage)
    }

    pub fn set_user_data(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
        let mut data = Parcel::new();
        data.write_string(key);
        data.write_string(value);
        self.call(RequestCode::SetUserData, data, |_| Ok(()))
    }

    pub fn user_data(&mut self, key: &str) -> Result<String, SurfaceError> {
        let mut data = Parcel::new();
        data.write_string(key);
        self.call(RequestCode::GetUserData, data, |reply| Ok(reply.read_string()?))
    }
}
