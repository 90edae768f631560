//! Request codes and the handler table behind
//! [`BufferQueueProducer::on_ipc_msg`].
//!
//! Each handler reads its arguments in a fixed order, makes one call on the
//! producer and writes an `i32` status followed by any result value. The
//! exceptions are noted on the handlers.

use novade_buffer_manager::{Parcel, ParcelReader, SurfaceBuffer, SurfaceError, SURFACE_ERROR_OK};
use tracing::warn;

use crate::producer::BufferQueueProducer;

/// Number of request codes; codes at or above this are rejected.
pub const MAX_REQUEST_CODE: u32 = 19;

/// Requests a remote producer can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RequestCode {
    RequestBuffer = 0,
    FlushBuffer,
    CancelBuffer,
    SetQueueSize,
    GetQueueSize,
    SetWidthAndHeight,
    GetWidth,
    GetHeight,
    SetFormat,
    GetFormat,
    SetStrideAlignment,
    GetStrideAlignment,
    GetStride,
    SetSize,
    GetSize,
    SetUsage,
    GetUsage,
    SetUserData,
    GetUserData,
}

impl RequestCode {
    pub const ALL: [RequestCode; MAX_REQUEST_CODE as usize] = [
        RequestCode::RequestBuffer,
        RequestCode::FlushBuffer,
        RequestCode::CancelBuffer,
        RequestCode::SetQueueSize,
        RequestCode::GetQueueSize,
        RequestCode::SetWidthAndHeight,
        RequestCode::GetWidth,
        RequestCode::GetHeight,
        RequestCode::SetFormat,
        RequestCode::GetFormat,
        RequestCode::SetStrideAlignment,
        RequestCode::GetStrideAlignment,
        RequestCode::GetStride,
        RequestCode::SetSize,
        RequestCode::GetSize,
        RequestCode::SetUsage,
        RequestCode::GetUsage,
        RequestCode::SetUserData,
        RequestCode::GetUserData,
    ];
}

impl From<RequestCode> for u32 {
    fn from(code: RequestCode) -> Self {
        code as u32
    }
}

impl TryFrom<u32> for RequestCode {
    type Error = SurfaceError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        RequestCode::ALL
            .get(code as usize)
            .copied()
            .ok_or(SurfaceError::InvalidRequest(code))
    }
}

type Handler = fn(&mut BufferQueueProducer, &mut ParcelReader<'_>, &mut Parcel) -> Result<(), SurfaceError>;

/// Indexed by request code.
const HANDLERS: [Handler; MAX_REQUEST_CODE as usize] = [
    on_request_buffer,
    on_flush_buffer,
    on_cancel_buffer,
    on_set_queue_size,
    on_get_queue_size,
    on_set_width_and_height,
    on_get_width,
    on_get_height,
    on_set_format,
    on_get_format,
    on_set_stride_alignment,
    on_get_stride_alignment,
    on_get_stride,
    on_set_size,
    on_get_size,
    on_set_usage,
    on_get_usage,
    on_set_user_data,
    on_get_user_data,
];

/// Routes `code` to its handler.
pub fn dispatch(
    producer: &mut BufferQueueProducer,
    code: u32,
    data: &mut ParcelReader<'_>,
    reply: &mut Parcel,
) -> Result<(), SurfaceError> {
    match HANDLERS.get(code as usize) {
        Some(handler) => handler(producer, data, reply),
        None => {
            warn!("Request code {} is not supported", code);
            Err(SurfaceError::InvalidRequest(code))
        }
    }
}

fn send_reply(reply: &mut Parcel) -> Result<(), SurfaceError> {
    reply.write_i32(SURFACE_ERROR_OK);
    Ok(())
}

fn send_attr(value: u32, reply: &mut Parcel) -> Result<(), SurfaceError> {
    reply.write_i32(SURFACE_ERROR_OK);
    reply.write_u32(value);
    Ok(())
}

/// Replies with the descriptor on success. With no buffer available the
/// reply is only the `NoBuffer` status.
fn on_request_buffer(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    let wait = data.read_u8()?;
    match producer.request_buffer(wait) {
        Some(buffer) => {
            reply.write_i32(SURFACE_ERROR_OK);
            buffer.lock().write_to_parcel(reply);
            Ok(())
        }
        None => {
            warn!("No buffer available for request");
            reply.write_i32(SurfaceError::NoBuffer.code());
            Err(SurfaceError::NoBuffer)
        }
    }
}

/// The status of the flush is the reply; the dispatch itself succeeds.
fn on_flush_buffer(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    let buffer = SurfaceBuffer::read_from_parcel(data)?;
    reply.write_i32(novade_buffer_manager::status_of(producer.flush_buffer(&buffer)));
    Ok(())
}

fn on_cancel_buffer(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    let buffer = SurfaceBuffer::read_from_parcel(data)?;
    producer.cancel_buffer(&buffer);
    send_reply(reply)
}

fn on_set_queue_size(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    producer.set_queue_size(data.read_u32()?);
    send_reply(reply)
}

fn on_get_queue_size(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.queue_size(), reply)
}

fn on_set_width_and_height(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    let width = data.read_u32()?;
    let height = data.read_u32()?;
    producer.set_width_and_height(width, height);
    send_reply(reply)
}

fn on_get_width(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.width(), reply)
}

fn on_get_height(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.height(), reply)
}

fn on_set_format(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    producer.set_format(data.read_u32()?);
    send_reply(reply)
}

fn on_get_format(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.format(), reply)
}

fn on_set_stride_alignment(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    producer.set_stride_alignment(data.read_u32()?);
    send_reply(reply)
}

fn on_get_stride_alignment(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.stride_alignment(), reply)
}

fn on_get_stride(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.stride(), reply)
}

fn on_set_size(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    producer.set_size(data.read_u32()?);
    send_reply(reply)
}

fn on_get_size(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.size(), reply)
}

fn on_set_usage(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    producer.set_usage(data.read_u32()?);
    send_reply(reply)
}

fn on_get_usage(producer: &mut BufferQueueProducer, _data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    send_attr(producer.usage(), reply)
}

fn read_non_empty(data: &mut ParcelReader<'_>, what: &str) -> Result<String, SurfaceError> {
    match data.read_string() {
        Ok(s) if !s.is_empty() => Ok(s),
        _ => {
            warn!("Failed to read user data {}", what);
            Err(SurfaceError::InvalidParam)
        }
    }
}

/// An empty key or value fails the dispatch and writes no reply.
fn on_set_user_data(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    let key = read_non_empty(data, "key")?;
    let value = read_non_empty(data, "value")?;
    producer.set_user_data(&key, &value);
    send_reply(reply)
}

fn on_get_user_data(producer: &mut BufferQueueProducer, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<(), SurfaceError> {
    let key = read_non_empty(data, "key")?;
    reply.write_i32(SURFACE_ERROR_OK);
    reply.write_string(&producer.user_data(&key));
    Ok(())
}
