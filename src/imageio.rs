//! Reading one plane plus metadata, writing one plane with metadata.
//!
//! TIFF (and OME-TIFF) goes through the `tiff` crate so the first page and
//! the `ImageDescription` tag can be handled directly. Anything else the
//! `image` crate can decode is accepted on input; PNG is the only non-TIFF
//! output.

use crate::metadata::ImageMetadata;
use crate::plane::PixelBuffer;
use crate::plane::PixelType;
use crate::plane::Plane;
use image::ColorType as ImageColorType;
use image::ImageBuffer;
use image::ImageFormat;
use image::ImageReader;
use image::Luma;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Seek;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;
use tiff::decoder::Decoder;
use tiff::decoder::DecodingResult;
use tiff::encoder::TiffEncoder;
use tiff::encoder::TiffValue;
use tiff::encoder::colortype;
use tiff::tags::Tag;

#[derive(Debug, Error)]
pub enum ImageIoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tiff error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unsupported sample type {0}")]
    UnsupportedSamples(&'static str),

    #[error("cannot write {pixel_type} samples as {extension:?}")]
    UnsupportedOutput {
        pixel_type: PixelType,
        extension: String,
    },

    #[error("invalid layout: {0}")]
    Layout(String),
}

pub type Result<T> = std::result::Result<T, ImageIoError>;

/// One decoded input image.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub file_name: OsString,
    pub plane: Plane,
    pub metadata: ImageMetadata,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OutputFormat {
    Tiff,
    Png,
}

impl OutputFormat {
    fn for_path(path: &Path, pixel_type: PixelType) -> Option<Self> {
        match lowercase_extension(path).as_deref() {
            Some("tif" | "tiff") => Some(OutputFormat::Tiff),
            Some("png") if matches!(pixel_type, PixelType::U8 | PixelType::U16) => {
                Some(OutputFormat::Png)
            }
            _ => None,
        }
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
}

/// Load the first Z, first timepoint, first channel of `path`.
pub fn read_image(path: &Path) -> Result<ImageRecord> {
    let format = ImageReader::open(path)?.with_guessed_format()?.format();

    let (plane, metadata) = match format {
        Some(ImageFormat::Tiff) => read_tiff(path)?,
        _ => read_other(path)?,
    };

    let file_name = path
        .file_name()
        .map(OsStr::to_os_string)
        .ok_or_else(|| ImageIoError::Layout(format!("{} has no file name", path.display())))?;

    Ok(ImageRecord {
        path: path.to_path_buf(),
        file_name,
        plane,
        metadata,
    })
}

fn read_tiff(path: &Path) -> Result<(Plane, ImageMetadata)> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();

    let samples = match decoder.read_image()? {
        DecodingResult::U8(v) => PixelBuffer::U8(v),
        DecodingResult::U16(v) => PixelBuffer::U16(v),
        DecodingResult::U32(v) => PixelBuffer::U32(v),
        DecodingResult::I8(v) => PixelBuffer::I8(v),
        DecodingResult::I16(v) => PixelBuffer::I16(v),
        DecodingResult::I32(v) => PixelBuffer::I32(v),
        DecodingResult::F32(v) => PixelBuffer::F32(v),
        DecodingResult::F64(v) => PixelBuffer::F64(v),
        DecodingResult::U64(_) => return Err(ImageIoError::UnsupportedSamples("uint64")),
        DecodingResult::I64(_) => return Err(ImageIoError::UnsupportedSamples("int64")),
        #[allow(unreachable_patterns)]
        _ => return Err(ImageIoError::UnsupportedSamples("unknown")),
    };
    let plane = first_channel(width, height, samples)?;

    // every remaining IFD is another plane of the stack
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image()?;
        pages += 1;
    }

    let metadata = match description.as_deref().and_then(ImageMetadata::from_ome_xml) {
        Some(ome) => ImageMetadata {
            pixel_type: plane.pixel_type(),
            ..ome
        },
        None => ImageMetadata {
            size_z: pages,
            ..ImageMetadata::for_plane(&plane)
        },
    };

    Ok((plane, metadata))
}

fn read_other(path: &Path) -> Result<(Plane, ImageMetadata)> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let (width, height) = (image.width() as usize, image.height() as usize);

    let samples = match image.color() {
        ImageColorType::L8 | ImageColorType::La8 | ImageColorType::Rgb8 | ImageColorType::Rgba8 => {
            PixelBuffer::U8(image.into_rgba8().into_raw())
        }
        ImageColorType::L16
        | ImageColorType::La16
        | ImageColorType::Rgb16
        | ImageColorType::Rgba16 => PixelBuffer::U16(image.into_rgba16().into_raw()),
        _ => PixelBuffer::F32(image.into_rgba32f().into_raw()),
    };
    let plane = first_channel(width, height, samples)?;
    let metadata = ImageMetadata::for_plane(&plane);

    Ok((plane, metadata))
}

fn first_channel(width: usize, height: usize, samples: PixelBuffer) -> Result<Plane> {
    let pixels = width * height;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(ImageIoError::Layout(format!(
            "{} samples do not tile a {width}x{height} plane",
            samples.len()
        )));
    }

    let stride = samples.len() / pixels;
    Plane::new(width, height, samples.deinterleave(stride, 0))
        .ok_or_else(|| ImageIoError::Layout(format!("cannot build a {width}x{height} plane")))
}

/// Where the result for `file_name` lands inside `out_dir`.
///
/// The input name is kept whenever its extension can carry `pixel_type`;
/// otherwise the stem gets `fallback_extension`.
pub fn output_path(
    out_dir: &Path,
    file_name: &OsStr,
    pixel_type: PixelType,
    fallback_extension: &str,
) -> PathBuf {
    let name = Path::new(file_name);
    if OutputFormat::for_path(name, pixel_type).is_some() {
        return out_dir.join(name);
    }

    let mut renamed = name
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| file_name.to_os_string());
    renamed.push(fallback_extension);
    out_dir.join(renamed)
}

/// Write `plane` to `path`, picking the encoder from the extension.
pub fn write_plane(path: &Path, plane: &Plane, metadata: &ImageMetadata) -> Result<()> {
    match OutputFormat::for_path(path, plane.pixel_type()) {
        Some(OutputFormat::Tiff) => write_tiff(path, plane, metadata),
        Some(OutputFormat::Png) => write_png(path, plane),
        None => Err(ImageIoError::UnsupportedOutput {
            pixel_type: plane.pixel_type(),
            extension: lowercase_extension(path).unwrap_or_default(),
        }),
    }
}

fn dimensions(plane: &Plane) -> Result<(u32, u32)> {
    let width = u32::try_from(plane.width())
        .map_err(|_| ImageIoError::Layout(format!("width {} too large", plane.width())))?;
    let height = u32::try_from(plane.height())
        .map_err(|_| ImageIoError::Layout(format!("height {} too large", plane.height())))?;
    Ok((width, height))
}

fn write_tiff(path: &Path, plane: &Plane, metadata: &ImageMetadata) -> Result<()> {
    let (width, height) = dimensions(plane)?;
    let description = metadata.to_ome_xml();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;

    match plane.pixels() {
        PixelBuffer::U8(v) => {
            encode::<colortype::Gray8, _>(&mut encoder, width, height, v, &description)
        }
        PixelBuffer::U16(v) => {
            encode::<colortype::Gray16, _>(&mut encoder, width, height, v, &description)
        }
        PixelBuffer::U32(v) => {
            encode::<colortype::Gray32, _>(&mut encoder, width, height, v, &description)
        }
        PixelBuffer::I8(v) => {
            encode::<colortype::GrayI8, _>(&mut encoder, width, height, v, &description)
        }
        PixelBuffer::I16(v) => {
            encode::<colortype::GrayI16, _>(&mut encoder, width, height, v, &description)
        }
        PixelBuffer::I32(v) => {
            encode::<colortype::GrayI32, _>(&mut encoder, width, height, v, &description)
        }
        PixelBuffer::F32(v) => {
            encode::<colortype::Gray32Float, _>(&mut encoder, width, height, v, &description)
        }
        PixelBuffer::F64(v) => {
            encode::<colortype::Gray64Float, _>(&mut encoder, width, height, v, &description)
        }
    }
}

fn encode<C, W>(
    encoder: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    data: &[C::Inner],
    description: &str,
) -> Result<()>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let mut image = encoder.new_image::<C>(width, height)?;
    image.encoder().write_tag(Tag::ImageDescription, description)?;
    image.write_data(data)?;
    Ok(())
}

fn write_png(path: &Path, plane: &Plane) -> Result<()> {
    let (width, height) = dimensions(plane)?;
    let mismatch = || ImageIoError::Layout(format!("cannot build a {width}x{height} png"));

    match plane.pixels() {
        PixelBuffer::U8(v) => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, v.clone())
            .ok_or_else(mismatch)?
            .save_with_format(path, ImageFormat::Png)?,
        PixelBuffer::U16(v) => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, v.clone())
            .ok_or_else(mismatch)?
            .save_with_format(path, ImageFormat::Png)?,
        _ => {
            return Err(ImageIoError::UnsupportedOutput {
                pixel_type: plane.pixel_type(),
                extension: "png".to_string(),
            });
        }
    }

    Ok(())
}
