//! Frames that own copies of their plane data

use serde::{Deserialize, Serialize};

use super::{required_len, Colorspace, Frame, Plane};
use crate::common::{Error, Result};

/// One plane's bytes plus its geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneBuffer {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    #[serde(with = "plane_bytes")]
    pub data: Vec<u8>,
}

impl PlaneBuffer {
    pub fn new(width: usize, height: usize, stride: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride,
            data,
        }
    }

    /// Copy a plane out of any frame
    fn copy_from(frame: &dyn Frame, plane: Plane) -> Self {
        let width = frame.width(plane);
        let height = frame.height(plane);
        let stride = frame.stride(plane);
        let data = frame.plane_data(plane);
        let len = required_len(width, height, stride).min(data.len());
        Self::new(width, height, stride, data[..len].to_vec())
    }

    fn check(&self, plane: Plane) -> Result<()> {
        if self.stride < self.width {
            return Err(Error::Protocol(format!(
                "plane {} stride {} is smaller than its width {}",
                plane, self.stride, self.width
            )));
        }
        let needed = required_len(self.width, self.height, self.stride);
        if self.data.len() < needed {
            return Err(Error::Protocol(format!(
                "plane {} holds {} bytes, {}x{} with stride {} needs {}",
                plane,
                self.data.len(),
                self.width,
                self.height,
                self.stride,
                needed
            )));
        }
        Ok(())
    }
}

/// A frame that owns independent copies of every plane
///
/// Outlives the engine and the worker process that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedFrame {
    colorspace: Colorspace,
    luma: PlaneBuffer,
    /// `(U, V)`, present iff the colorspace carries chroma planes
    chroma: Option<(PlaneBuffer, PlaneBuffer)>,
}

impl CapturedFrame {
    /// Build a frame from owned planes, checking them against the colorspace
    pub fn from_planes(
        colorspace: Colorspace,
        luma: PlaneBuffer,
        chroma: Option<(PlaneBuffer, PlaneBuffer)>,
    ) -> Result<Self> {
        let frame = Self {
            colorspace,
            luma,
            chroma,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Copy every plane of a live frame
    pub fn capture(frame: &dyn Frame) -> Result<Self> {
        let colorspace = frame.colorspace();
        let luma = PlaneBuffer::copy_from(frame, Plane::Y);
        let chroma = colorspace.chroma.map(|_| {
            (
                PlaneBuffer::copy_from(frame, Plane::U),
                PlaneBuffer::copy_from(frame, Plane::V),
            )
        });
        Self::from_planes(colorspace, luma, chroma)
    }

    /// Check buffer sizes and that chroma geometry follows the subsampling
    pub fn validate(&self) -> Result<()> {
        if self.colorspace.chroma.is_some() != self.chroma.is_some() {
            return Err(Error::Protocol(format!(
                "colorspace {} does not match the planes present",
                self.colorspace
            )));
        }
        self.luma.check(Plane::Y)?;
        if let Some((u, v)) = &self.chroma {
            let expected =
                self.colorspace
                    .plane_dimensions(Plane::U, self.luma.width, self.luma.height);
            for (plane, buffer) in [(Plane::U, u), (Plane::V, v)] {
                if (buffer.width, buffer.height) != expected {
                    return Err(Error::Protocol(format!(
                        "plane {} is {}x{}, {} at {}x{} luma implies {}x{}",
                        plane,
                        buffer.width,
                        buffer.height,
                        self.colorspace,
                        self.luma.width,
                        self.luma.height,
                        expected.0,
                        expected.1
                    )));
                }
                buffer.check(plane)?;
            }
        }
        Ok(())
    }

    fn buffer(&self, plane: Plane) -> Option<&PlaneBuffer> {
        match (plane, &self.chroma) {
            (Plane::Y, _) => Some(&self.luma),
            (Plane::U, Some((u, _))) => Some(u),
            (Plane::V, Some((_, v))) => Some(v),
            _ => None,
        }
    }
}

impl Frame for CapturedFrame {
    fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    fn width(&self, plane: Plane) -> usize {
        self.buffer(plane).map_or(0, |b| b.width)
    }

    fn height(&self, plane: Plane) -> usize {
        self.buffer(plane).map_or(0, |b| b.height)
    }

    fn stride(&self, plane: Plane) -> usize {
        self.buffer(plane).map_or(0, |b| b.stride)
    }

    fn plane_data(&self, plane: Plane) -> &[u8] {
        self.buffer(plane).map(|b| b.data.as_slice()).unwrap_or(&[])
    }
}

/// Serialize plane data as a byte string instead of a sequence of integers
mod plane_bytes {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(data)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_byte_buf(BytesVisitor)
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte string")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                out.push(byte);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yv12(width: usize, height: usize, stride: usize, fill: u8) -> CapturedFrame {
        let (cw, ch) = (width / 2, height / 2);
        CapturedFrame::from_planes(
            Colorspace::YV12,
            PlaneBuffer::new(width, height, stride, vec![fill; stride * height]),
            Some((
                PlaneBuffer::new(cw, ch, stride / 2, vec![fill; stride / 2 * ch]),
                PlaneBuffer::new(cw, ch, stride / 2, vec![fill; stride / 2 * ch]),
            )),
        )
        .unwrap()
    }

    #[test]
    fn test_absent_planes_report_zero() {
        let frame = CapturedFrame::from_planes(
            Colorspace::BGR32,
            PlaneBuffer::new(16, 2, 16, vec![0; 32]),
            None,
        )
        .unwrap();
        assert_eq!(frame.stride(Plane::U), 0);
        assert_eq!(frame.width(Plane::V), 0);
        assert!(frame.plane_data(Plane::U).is_empty());
    }

    #[test]
    fn test_chroma_must_follow_subsampling() {
        let err = CapturedFrame::from_planes(
            Colorspace::YV12,
            PlaneBuffer::new(8, 4, 8, vec![0; 32]),
            Some((
                PlaneBuffer::new(8, 4, 8, vec![0; 32]),
                PlaneBuffer::new(8, 4, 8, vec![0; 32]),
            )),
        )
        .unwrap_err();
        assert!(err.to_string().contains("implies 4x2"));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let err = CapturedFrame::from_planes(
            Colorspace::Y8,
            PlaneBuffer::new(8, 4, 16, vec![0; 40]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_capture_copies_only_covered_bytes() {
        let source = yv12(8, 4, 16, 7);
        let copy = CapturedFrame::capture(&source).unwrap();
        assert_eq!(copy.plane_data(Plane::Y).len(), 3 * 16 + 8);
        assert_eq!(copy.stride(Plane::Y), 16);
        assert_eq!(copy.width(Plane::U), 4);
        assert!(copy.dimensions_match(&source));
    }

    #[test]
    fn test_plane_bytes_encode_compactly() {
        let frame = yv12(64, 32, 64, 200);
        let encoded = rmp_serde::to_vec(&frame).unwrap();
        // msgpack would spend two bytes per sample >= 128 without the bin encoding
        assert!(encoded.len() < 64 * 32 * 3 / 2 + 128);
        let decoded: CapturedFrame = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }
}
