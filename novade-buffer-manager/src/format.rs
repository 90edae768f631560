//! Pixel format and usage translation.
//!
//! Producers describe buffers with portable values ([`PixelFormat`],
//! [`ConsumerUsage`]); the vendor allocator only understands its own codes
//! ([`HalPixelFormat`], [`HardwareUsage`]). The tables here are static. Any
//! portable value without an allocator counterpart is rejected with
//! [`SurfaceError::Unsupported`]; the packed and planar YUV variants other
//! than NV12/NV21/YUV420/YVU420 are deliberately left out.

use bitflags::bitflags;
use serde::Deserialize;
use tracing::warn;

use crate::error::SurfaceError;

/// Portable image pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
    None = 0,
    Rgb565 = 101,
    Argb1555 = 102,
    Rgb888 = 103,
    Argb8888 = 104,
    Yuyv = 201,
    Yvyu = 202,
    Uyvy = 203,
    Vyuy = 204,
    Ayuv = 205,
    Yuv410 = 206,
    Yvu410 = 207,
    Yuv411 = 208,
    Yvu411 = 209,
    Yuv420 = 210,
    Yvu420 = 211,
    Yuv422 = 212,
    Yvu422 = 213,
    Yuv444 = 214,
    Yvu444 = 215,
    Nv12 = 301,
    Nv21 = 302,
    Nv16 = 303,
    Nv61 = 304,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 24] = [
        PixelFormat::None,
        PixelFormat::Rgb565,
        PixelFormat::Argb1555,
        PixelFormat::Rgb888,
        PixelFormat::Argb8888,
        PixelFormat::Yuyv,
        PixelFormat::Yvyu,
        PixelFormat::Uyvy,
        PixelFormat::Vyuy,
        PixelFormat::Ayuv,
        PixelFormat::Yuv410,
        PixelFormat::Yvu410,
        PixelFormat::Yuv411,
        PixelFormat::Yvu411,
        PixelFormat::Yuv420,
        PixelFormat::Yvu420,
        PixelFormat::Yuv422,
        PixelFormat::Yvu422,
        PixelFormat::Yuv444,
        PixelFormat::Yvu444,
        PixelFormat::Nv12,
        PixelFormat::Nv21,
        PixelFormat::Nv16,
        PixelFormat::Nv61,
    ];

    /// Bytes per pixel for the packed RGB formats; `None` for everything else.
    pub fn bytes_per_pixel(self) -> Option<u8> {
        match self {
            PixelFormat::Rgb565 | PixelFormat::Argb1555 => Some(2),
            PixelFormat::Rgb888 => Some(3),
            PixelFormat::Argb8888 => Some(4),
            _ => None,
        }
    }
}

impl From<PixelFormat> for u32 {
    fn from(format: PixelFormat) -> Self {
        format as u32
    }
}

impl TryFrom<u32> for PixelFormat {
    type Error = SurfaceError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|f| *f as u32 == value)
            .ok_or(SurfaceError::Unsupported)
    }
}

/// How the consumer intends to access a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ConsumerUsage {
    Software = 0,
    Hardware = 1,
    HardwareConsumerCache = 2,
    HardwareProducerCache = 3,
}

impl From<ConsumerUsage> for u32 {
    fn from(usage: ConsumerUsage) -> Self {
        usage as u32
    }
}

impl TryFrom<u32> for ConsumerUsage {
    type Error = SurfaceError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConsumerUsage::Software),
            1 => Ok(ConsumerUsage::Hardware),
            2 => Ok(ConsumerUsage::HardwareConsumerCache),
            3 => Ok(ConsumerUsage::HardwareProducerCache),
            _ => Err(SurfaceError::Unsupported),
        }
    }
}

/// Allocator-specific pixel format codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum HalPixelFormat {
    Rgb565 = 3,
    Rgba5551 = 9,
    Rgba8888 = 12,
    Rgb888 = 13,
    Ycbcr420Sp = 24,
    Ycrcb420Sp = 25,
    Ycbcr420P = 28,
    Ycrcb420P = 29,
    /// "No format"; only valid for size-based requests.
    Butt = 0x7FFF_FFFF,
}

impl HalPixelFormat {
    /// Bits per pixel of the first plane, or `None` for [`HalPixelFormat::Butt`].
    pub fn bits_per_pixel(self) -> Option<u32> {
        match self {
            HalPixelFormat::Rgb565 | HalPixelFormat::Rgba5551 => Some(16),
            HalPixelFormat::Rgb888 => Some(24),
            HalPixelFormat::Rgba8888 => Some(32),
            HalPixelFormat::Ycbcr420Sp
            | HalPixelFormat::Ycrcb420Sp
            | HalPixelFormat::Ycbcr420P
            | HalPixelFormat::Ycrcb420P => Some(8),
            HalPixelFormat::Butt => None,
        }
    }

    /// Whether the format carries 4:2:0 chroma planes after the luma plane.
    pub fn is_yuv420(self) -> bool {
        matches!(
            self,
            HalPixelFormat::Ycbcr420Sp
                | HalPixelFormat::Ycrcb420Sp
                | HalPixelFormat::Ycbcr420P
                | HalPixelFormat::Ycrcb420P
        )
    }
}

bitflags! {
    /// Allocator-specific usage hints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HardwareUsage: u64 {
        const CPU_READ = 1 << 0;
        const CPU_WRITE = 1 << 1;
        /// Physically contiguous media memory.
        const MEM_MMZ = 1 << 2;
        const MEM_DMA = 1 << 3;
        /// Kernel shared memory segment.
        const MEM_SHARE = 1 << 4;
        /// Cacheable physically contiguous memory.
        const MEM_MMZ_CACHE = 1 << 5;
        const MEM_FB = 1 << 6;
        /// The request carries an explicit byte size instead of a geometry.
        const ASSIGN_SIZE = 1 << 7;
    }
}

/// Translates a portable consumer usage into the allocator's usage hint.
pub fn convert_usage(usage: u32) -> Result<HardwareUsage, SurfaceError> {
    match ConsumerUsage::try_from(usage) {
        Ok(ConsumerUsage::Software) => Ok(HardwareUsage::MEM_SHARE),
        Ok(ConsumerUsage::Hardware) | Ok(ConsumerUsage::HardwareProducerCache) => Ok(HardwareUsage::MEM_MMZ),
        Ok(ConsumerUsage::HardwareConsumerCache) => Ok(HardwareUsage::MEM_MMZ_CACHE),
        Err(e) => {
            warn!("Conversion usage failed for usage {}", usage);
            Err(e)
        }
    }
}

/// Translates a portable pixel format into the allocator's format code.
pub fn convert_format(format: u32) -> Result<HalPixelFormat, SurfaceError> {
    let hal_format = match PixelFormat::try_from(format) {
        Ok(PixelFormat::None) => Some(HalPixelFormat::Butt),
        Ok(PixelFormat::Rgb565) => Some(HalPixelFormat::Rgb565),
        Ok(PixelFormat::Argb1555) => Some(HalPixelFormat::Rgba5551),
        Ok(PixelFormat::Rgb888) => Some(HalPixelFormat::Rgb888),
        Ok(PixelFormat::Argb8888) => Some(HalPixelFormat::Rgba8888),
        Ok(PixelFormat::Nv12) => Some(HalPixelFormat::Ycbcr420Sp),
        Ok(PixelFormat::Nv21) => Some(HalPixelFormat::Ycrcb420Sp),
        Ok(PixelFormat::Yuv420) => Some(HalPixelFormat::Ycbcr420P),
        Ok(PixelFormat::Yvu420) => Some(HalPixelFormat::Ycrcb420P),
        Ok(_) | Err(_) => None,
    };
    hal_format.ok_or_else(|| {
        warn!("Conversion format failed for format {}", format);
        SurfaceError::Unsupported
    })
}
