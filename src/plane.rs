use std::fmt;

/// Sample type of a decoded plane.
///
/// Every variant converts to `f64` without loss, which is what lets the
/// engine work on a single array type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl PixelType {
    /// Name used for the OME `Type` attribute.
    pub fn ome_name(&self) -> &'static str {
        match self {
            PixelType::U8 => "uint8",
            PixelType::U16 => "uint16",
            PixelType::U32 => "uint32",
            PixelType::I8 => "int8",
            PixelType::I16 => "int16",
            PixelType::I32 => "int32",
            PixelType::F32 => "float",
            PixelType::F64 => "double",
        }
    }

    pub fn from_ome_name(name: &str) -> Option<Self> {
        match name {
            "uint8" => Some(PixelType::U8),
            "uint16" => Some(PixelType::U16),
            "uint32" => Some(PixelType::U32),
            "int8" => Some(PixelType::I8),
            "int16" => Some(PixelType::I16),
            "int32" => Some(PixelType::I32),
            "float" => Some(PixelType::F32),
            "double" => Some(PixelType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ome_name())
    }
}

/// Row-major samples of a single-channel plane.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl PixelBuffer {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelBuffer::U8(_) => PixelType::U8,
            PixelBuffer::U16(_) => PixelType::U16,
            PixelBuffer::U32(_) => PixelType::U32,
            PixelBuffer::I8(_) => PixelType::I8,
            PixelBuffer::I16(_) => PixelType::I16,
            PixelBuffer::I32(_) => PixelType::I32,
            PixelBuffer::F32(_) => PixelType::F32,
            PixelBuffer::F64(_) => PixelType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
            PixelBuffer::U32(v) => v.len(),
            PixelBuffer::I8(v) => v.len(),
            PixelBuffer::I16(v) => v.len(),
            PixelBuffer::I32(v) => v.len(),
            PixelBuffer::F32(v) => v.len(),
            PixelBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            PixelBuffer::U8(v) => v.iter().map(|&x| x.into()).collect(),
            PixelBuffer::U16(v) => v.iter().map(|&x| x.into()).collect(),
            PixelBuffer::U32(v) => v.iter().map(|&x| x.into()).collect(),
            PixelBuffer::I8(v) => v.iter().map(|&x| x.into()).collect(),
            PixelBuffer::I16(v) => v.iter().map(|&x| x.into()).collect(),
            PixelBuffer::I32(v) => v.iter().map(|&x| x.into()).collect(),
            PixelBuffer::F32(v) => v.iter().map(|&x| x.into()).collect(),
            PixelBuffer::F64(v) => v.clone(),
        }
    }

    /// Cast `f64` samples into `pixel_type`.
    ///
    /// Integer targets are rounded and saturated, NaN maps to zero.
    pub fn from_f64(values: impl Iterator<Item = f64>, pixel_type: PixelType) -> Self {
        match pixel_type {
            PixelType::U8 => PixelBuffer::U8(values.map(|x| x.round() as u8).collect()),
            PixelType::U16 => PixelBuffer::U16(values.map(|x| x.round() as u16).collect()),
            PixelType::U32 => PixelBuffer::U32(values.map(|x| x.round() as u32).collect()),
            PixelType::I8 => PixelBuffer::I8(values.map(|x| x.round() as i8).collect()),
            PixelType::I16 => PixelBuffer::I16(values.map(|x| x.round() as i16).collect()),
            PixelType::I32 => PixelBuffer::I32(values.map(|x| x.round() as i32).collect()),
            PixelType::F32 => PixelBuffer::F32(values.map(|x| x as f32).collect()),
            PixelType::F64 => PixelBuffer::F64(values.collect()),
        }
    }

    /// Keep every `stride`th sample starting at `offset`.
    ///
    /// Used to pull the first channel out of interleaved samples.
    pub fn deinterleave(self, stride: usize, offset: usize) -> Self {
        fn pick<T: Copy>(v: Vec<T>, stride: usize, offset: usize) -> Vec<T> {
            v.into_iter().skip(offset).step_by(stride).collect()
        }

        if stride <= 1 {
            return self;
        }

        match self {
            PixelBuffer::U8(v) => PixelBuffer::U8(pick(v, stride, offset)),
            PixelBuffer::U16(v) => PixelBuffer::U16(pick(v, stride, offset)),
            PixelBuffer::U32(v) => PixelBuffer::U32(pick(v, stride, offset)),
            PixelBuffer::I8(v) => PixelBuffer::I8(pick(v, stride, offset)),
            PixelBuffer::I16(v) => PixelBuffer::I16(pick(v, stride, offset)),
            PixelBuffer::I32(v) => PixelBuffer::I32(pick(v, stride, offset)),
            PixelBuffer::F32(v) => PixelBuffer::F32(pick(v, stride, offset)),
            PixelBuffer::F64(v) => PixelBuffer::F64(pick(v, stride, offset)),
        }
    }
}

/// A single 2-D slice: one Z, one timepoint, one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    pixels: PixelBuffer,
}

impl Plane {
    /// Returns `None` if the buffer does not hold `width * height` samples.
    pub fn new(width: usize, height: usize, pixels: PixelBuffer) -> Option<Self> {
        if pixels.len() != width * height {
            return None;
        }

        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixels.pixel_type()
    }
}
