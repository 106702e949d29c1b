use crate::plane::Plane;
use crate::plane::PixelType;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::LazyLock;
use uom::si::f64::Length;
use uom::si::length::{centimeter, meter, micrometer, millimeter, nanometer};

static PIXELS_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z][\w.-]*:)?Pixels\b([^>]*)>").expect("valid Pixels pattern")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z][\w.-]*)\s*=\s*"([^"]*)""#).expect("valid attribute pattern")
});

const DEFAULT_DIMENSION_ORDER: &str = "XYZCT";

/// Calibration and layout of an image, as carried in an OME `Pixels` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub dimension_order: String,
    pub pixel_type: PixelType,
    pub physical_size_x: Option<Length>,
    pub physical_size_y: Option<Length>,
    pub physical_size_z: Option<Length>,
}

impl ImageMetadata {
    /// Uncalibrated metadata describing a lone plane.
    pub fn for_plane(plane: &Plane) -> Self {
        Self {
            size_x: plane.width(),
            size_y: plane.height(),
            size_z: 1,
            size_c: 1,
            size_t: 1,
            dimension_order: DEFAULT_DIMENSION_ORDER.to_string(),
            pixel_type: plane.pixel_type(),
            physical_size_x: None,
            physical_size_y: None,
            physical_size_z: None,
        }
    }

    /// Metadata for writing `plane` in place of the image this was read from.
    ///
    /// Only the first Z-plane is ever written, so the depth collapses to 1.
    /// Everything else is inherited.
    pub fn for_output(&self, plane: &Plane) -> Self {
        Self {
            size_x: plane.width(),
            size_y: plane.height(),
            size_z: 1,
            pixel_type: plane.pixel_type(),
            ..self.clone()
        }
    }

    /// Parse the first `Pixels` element of an OME-XML document.
    ///
    /// Returns `None` if there is no such element or a size is missing.
    /// Attributes that are present but unusable fall back to defaults.
    pub fn from_ome_xml(xml: &str) -> Option<Self> {
        let element = PIXELS_ELEMENT.captures(xml)?;
        let attrs: HashMap<&str, &str> = ATTRIBUTE
            .captures_iter(element.get(1)?.as_str())
            .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
            .collect();

        let size = |name: &str| attrs.get(name).and_then(|v| v.trim().parse::<usize>().ok());
        let physical = |name: &str| {
            let value = attrs.get(name)?.trim().parse::<f64>().ok()?;
            let unit = attrs
                .get(format!("{name}Unit").as_str())
                .copied()
                .unwrap_or("µm");
            length_in(value, unit)
        };

        let dimension_order = attrs
            .get("DimensionOrder")
            .filter(|order| is_dimension_order(order))
            .map(|order| order.to_string())
            .unwrap_or_else(|| DEFAULT_DIMENSION_ORDER.to_string());

        Some(Self {
            size_x: size("SizeX")?,
            size_y: size("SizeY")?,
            size_z: size("SizeZ").unwrap_or(1),
            size_c: size("SizeC").unwrap_or(1),
            size_t: size("SizeT").unwrap_or(1),
            dimension_order,
            pixel_type: attrs
                .get("Type")
                .and_then(|t| PixelType::from_ome_name(t))
                .unwrap_or(PixelType::U8),
            physical_size_x: physical("PhysicalSizeX"),
            physical_size_y: physical("PhysicalSizeY"),
            physical_size_z: physical("PhysicalSizeZ"),
        })
    }

    /// A minimal OME-XML document describing a single-IFD image.
    pub fn to_ome_xml(&self) -> String {
        let mut pixels = format!(
            r#"<Pixels ID="Pixels:0" DimensionOrder="{}" Type="{}" SizeX="{}" SizeY="{}" SizeZ="{}" SizeC="{}" SizeT="{}""#,
            self.dimension_order,
            self.pixel_type.ome_name(),
            self.size_x,
            self.size_y,
            self.size_z,
            self.size_c,
            self.size_t,
        );

        for (name, length) in [
            ("PhysicalSizeX", self.physical_size_x),
            ("PhysicalSizeY", self.physical_size_y),
            ("PhysicalSizeZ", self.physical_size_z),
        ] {
            if let Some(length) = length {
                let _ = write!(
                    pixels,
                    r#" {name}="{}" {name}Unit="µm""#,
                    length.get::<micrometer>()
                );
            }
        }

        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">"#,
                r#"<Image ID="Image:0">{}><TiffData IFD="0" PlaneCount="1"/></Pixels></Image></OME>"#,
            ),
            pixels
        )
    }
}

fn is_dimension_order(order: &str) -> bool {
    let mut chars: Vec<char> = order.chars().collect();
    chars.sort_unstable();
    chars.len() == 5 && order.starts_with("XY") && chars == ['C', 'T', 'X', 'Y', 'Z']
}

fn length_in(value: f64, unit: &str) -> Option<Length> {
    match unit {
        "µm" | "um" | "micron" => Some(Length::new::<micrometer>(value)),
        "nm" => Some(Length::new::<nanometer>(value)),
        "mm" => Some(Length::new::<millimeter>(value)),
        "cm" => Some(Length::new::<centimeter>(value)),
        "m" => Some(Length::new::<meter>(value)),
        _ => {
            log::debug!("ignoring physical size in unsupported unit {unit:?}");
            None
        }
    }
}
