//! In-memory representation of decoded video frames
//!
//! Frames are accessed through the [`Frame`] capability trait. Engine
//! bindings hand out live frames that borrow engine memory; the worker turns
//! the requested one into a [`CapturedFrame`], which owns its bytes and is
//! the only frame type that can be serialized across the process boundary.

mod captured;
mod colorspace;

pub use captured::{CapturedFrame, PlaneBuffer};
pub use colorspace::{Chroma, ColorFamily, Colorspace, Packing, PlaneOrder, Subsampling};

use serde::{Deserialize, Serialize};
use std::fmt;

/// One rectangular channel of a frame, identified by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plane {
    /// Luma, or the only plane of an interleaved format
    Y,
    U,
    V,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Y, Plane::U, Plane::V];
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Plane::Y => "Y",
            Plane::U => "U",
            Plane::V => "V",
        };
        f.write_str(name)
    }
}

/// Read access to one frame's pixel data
///
/// Widths are row sizes in bytes. A plane absent from the colorspace reports
/// zero for every dimension and an empty buffer.
pub trait Frame {
    fn colorspace(&self) -> Colorspace;

    fn width(&self, plane: Plane) -> usize;

    fn height(&self, plane: Plane) -> usize;

    /// Byte distance between the starts of consecutive rows
    fn stride(&self, plane: Plane) -> usize;

    /// Raw plane bytes, starting at the first row
    fn plane_data(&self, plane: Plane) -> &[u8];

    fn colorspace_matches(&self, other: &dyn Frame) -> bool {
        self.colorspace() == other.colorspace()
    }

    /// Width and height of every plane agree
    fn dimensions_match(&self, other: &dyn Frame) -> bool {
        Plane::ALL.iter().all(|&plane| {
            self.width(plane) == other.width(plane) && self.height(plane) == other.height(plane)
        })
    }
}

/// Number of bytes a plane buffer must hold to cover `height` rows
pub(crate) fn required_len(width: usize, height: usize, stride: usize) -> usize {
    if height == 0 || width == 0 {
        0
    } else {
        (height - 1) * stride + width
    }
}
