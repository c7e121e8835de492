//! Pixel layout descriptors
//!
//! A [`Colorspace`] is a closed value carrying the color family, packing,
//! chroma plane order and chroma subsampling directly. Engine-specific
//! bitmask encodings are decoded once at the engine boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Plane;

/// Color family of the samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFamily {
    Rgb,
    Yuv,
    /// Opaque samples with no color interpretation
    Raw,
}

/// How samples are laid out in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Packing {
    /// All components in one buffer, `bytes_per_pixel` bytes per pixel
    Interleaved { bytes_per_pixel: u8 },
    /// One buffer per component, one byte per sample
    Planar,
}

/// Which chroma plane is stored first in the frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneOrder {
    VFirst,
    UFirst,
}

/// Chroma plane size divisors relative to the luma plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subsampling {
    pub horizontal: u8,
    pub vertical: u8,
}

/// Chroma layout of a planar format that carries chroma planes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chroma {
    pub order: PlaneOrder,
    pub subsampling: Subsampling,
}

/// Pixel layout of a frame
///
/// Two frames are only comparable when their colorspaces are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colorspace {
    pub family: ColorFamily,
    pub packing: Packing,
    /// `None` for interleaved formats and luma-only planar formats
    pub chroma: Option<Chroma>,
}

const fn planar_yuv(order: PlaneOrder, horizontal: u8, vertical: u8) -> Colorspace {
    Colorspace {
        family: ColorFamily::Yuv,
        packing: Packing::Planar,
        chroma: Some(Chroma {
            order,
            subsampling: Subsampling {
                horizontal,
                vertical,
            },
        }),
    }
}

const fn interleaved(family: ColorFamily, bytes_per_pixel: u8) -> Colorspace {
    Colorspace {
        family,
        packing: Packing::Interleaved { bytes_per_pixel },
        chroma: None,
    }
}

impl Colorspace {
    pub const BGR24: Self = interleaved(ColorFamily::Rgb, 3);
    pub const BGR32: Self = interleaved(ColorFamily::Rgb, 4);
    pub const YUY2: Self = interleaved(ColorFamily::Yuv, 2);
    pub const RAW32: Self = interleaved(ColorFamily::Raw, 4);

    /// YUV 4:4:4 planar
    pub const YV24: Self = planar_yuv(PlaneOrder::VFirst, 1, 1);
    /// YUV 4:2:2 planar
    pub const YV16: Self = planar_yuv(PlaneOrder::VFirst, 2, 1);
    /// YUV 4:2:0 planar, V before U
    pub const YV12: Self = planar_yuv(PlaneOrder::VFirst, 2, 2);
    /// YUV 4:2:0 planar, U before V
    pub const I420: Self = planar_yuv(PlaneOrder::UFirst, 2, 2);
    /// YUV 4:1:0 planar
    pub const YUV9: Self = planar_yuv(PlaneOrder::VFirst, 4, 4);
    /// YUV 4:1:1 planar
    pub const YV411: Self = planar_yuv(PlaneOrder::VFirst, 4, 1);
    /// Luma only
    pub const Y8: Self = Colorspace {
        family: ColorFamily::Yuv,
        packing: Packing::Planar,
        chroma: None,
    };

    const NAMED: [(&'static str, Colorspace); 11] = [
        ("BGR24", Self::BGR24),
        ("BGR32", Self::BGR32),
        ("YUY2", Self::YUY2),
        ("RAW32", Self::RAW32),
        ("YV24", Self::YV24),
        ("YV16", Self::YV16),
        ("YV12", Self::YV12),
        ("I420", Self::I420),
        ("YUV9", Self::YUV9),
        ("YV411", Self::YV411),
        ("Y8", Self::Y8),
    ];

    /// Look up a well-known format by name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, cs)| *cs)
    }

    /// Name of the well-known format this layout matches, if any
    pub fn name(&self) -> Option<&'static str> {
        Self::NAMED.iter().find(|(_, cs)| cs == self).map(|(n, _)| *n)
    }

    /// Planes carried by this layout, luma first, chroma in storage order
    ///
    /// Interleaved formats report a single nominal plane.
    pub fn planes(&self) -> &'static [Plane] {
        match self.chroma {
            None => &[Plane::Y],
            Some(Chroma {
                order: PlaneOrder::VFirst,
                ..
            }) => &[Plane::Y, Plane::V, Plane::U],
            Some(Chroma {
                order: PlaneOrder::UFirst,
                ..
            }) => &[Plane::Y, Plane::U, Plane::V],
        }
    }

    /// Whether the layout stores `plane` at all
    pub fn has_plane(&self, plane: Plane) -> bool {
        plane == Plane::Y || self.chroma.is_some()
    }

    /// Dimensions of `plane` for a frame with the given luma dimensions
    ///
    /// Absent planes are `(0, 0)`.
    pub fn plane_dimensions(&self, plane: Plane, luma_width: usize, luma_height: usize) -> (usize, usize) {
        match (plane, self.chroma) {
            (Plane::Y, _) => (luma_width, luma_height),
            (_, Some(chroma)) => (
                luma_width / chroma.subsampling.horizontal as usize,
                luma_height / chroma.subsampling.vertical as usize,
            ),
            (_, None) => (0, 0),
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        write!(f, "{:?}/{:?}", self.family, self.packing)?;
        if let Some(chroma) = self.chroma {
            write!(
                f,
                "/{:?} {}x{}",
                chroma.order, chroma.subsampling.horizontal, chroma.subsampling.vertical
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_formats_have_one_plane() {
        assert_eq!(Colorspace::BGR32.planes(), &[Plane::Y]);
        assert_eq!(Colorspace::YUY2.planes(), &[Plane::Y]);
        assert!(!Colorspace::BGR24.has_plane(Plane::U));
    }

    #[test]
    fn test_plane_order_is_an_attribute() {
        assert_eq!(Colorspace::YV12.planes(), &[Plane::Y, Plane::V, Plane::U]);
        assert_eq!(Colorspace::I420.planes(), &[Plane::Y, Plane::U, Plane::V]);
        assert_ne!(Colorspace::YV12, Colorspace::I420);
    }

    #[test]
    fn test_same_family_different_packing_is_not_equal() {
        assert_ne!(Colorspace::BGR24, Colorspace::BGR32);
        assert_ne!(Colorspace::YV16, Colorspace::YV24);
    }

    #[test]
    fn test_chroma_dimensions_follow_subsampling() {
        assert_eq!(Colorspace::YV12.plane_dimensions(Plane::U, 640, 480), (320, 240));
        assert_eq!(Colorspace::YV411.plane_dimensions(Plane::V, 640, 480), (160, 480));
        assert_eq!(Colorspace::YV24.plane_dimensions(Plane::U, 640, 480), (640, 480));
        assert_eq!(Colorspace::Y8.plane_dimensions(Plane::U, 640, 480), (0, 0));
    }

    #[test]
    fn test_names_round_trip() {
        for name in ["BGR24", "yv12", "I420", "Y8"] {
            let cs = Colorspace::from_name(name).unwrap();
            assert!(cs.name().unwrap().eq_ignore_ascii_case(name));
        }
        assert!(Colorspace::from_name("NV12").is_none());
    }
}
