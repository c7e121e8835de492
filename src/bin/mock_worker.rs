//! Mock worker backed by a synthetic engine, for integration testing
//!
//! Scripts are `key=value` lines:
//!
//! ```text
//! width=16
//! height=8
//! colorspace=YV12
//! frames=100
//! value=128
//! ```
//!
//! A line `error=<message>` makes evaluation fail, `abort` kills the worker
//! before it writes a result and `hang` sleeps until the driver gives up.
//! The engine path selects the build's behaviour: `missing` fails to load,
//! `bias` shifts every sample by one and `padded` widens every stride.

use std::path::Path;
use std::time::Duration;

use framecheck::common::{Error, Result};
use framecheck::engine::{Clip, ClipInfo, EngineLoader, ScriptEnvironment};
use framecheck::frame::{Colorspace, Frame, Packing, Plane};
use framecheck::ipc::worker;

#[derive(Debug, Clone, Copy)]
struct Build {
    bias: u8,
    padding: usize,
}

struct SyntheticLoader;

impl EngineLoader for SyntheticLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ScriptEnvironment>> {
        let name = path.to_string_lossy();
        if name.contains("missing") {
            return Err(Error::engine_load(&name, "cannot open shared object file"));
        }
        Ok(Box::new(SyntheticEnvironment {
            build: Build {
                bias: u8::from(name.contains("bias")),
                padding: if name.contains("padded") { 32 } else { 0 },
            },
        }))
    }
}

struct SyntheticEnvironment {
    build: Build,
}

impl ScriptEnvironment for SyntheticEnvironment {
    fn evaluate(&mut self, script: &str) -> Result<Box<dyn Clip + '_>> {
        let mut info = ClipInfo {
            width: 16,
            height: 8,
            frame_count: 100,
            colorspace: Colorspace::YV12,
        };
        let mut value = 128u8;

        for line in script.lines().map(str::trim) {
            match line {
                "abort" => std::process::abort(),
                "hang" => std::thread::sleep(Duration::from_secs(3600)),
                _ => {}
            }
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let (key, val) = (key.trim().to_ascii_lowercase(), val.trim());
            let number = || {
                val.parse::<u32>()
                    .map_err(|_| Error::EngineEvaluation(format!("invalid {} '{}'", key, val)))
            };
            match key.as_str() {
                "error" => return Err(Error::EngineEvaluation(val.to_string())),
                "width" => info.width = number()?,
                "height" => info.height = number()?,
                "frames" => info.frame_count = number()?,
                "value" => value = number()? as u8,
                "colorspace" => {
                    info.colorspace = Colorspace::from_name(val).ok_or_else(|| {
                        Error::EngineEvaluation(format!("unknown colorspace '{}'", val))
                    })?
                }
                _ => {}
            }
        }

        Ok(Box::new(SyntheticClip {
            info,
            value,
            build: self.build,
        }))
    }
}

struct SyntheticClip {
    info: ClipInfo,
    value: u8,
    build: Build,
}

impl Clip for SyntheticClip {
    fn info(&self) -> ClipInfo {
        self.info
    }

    fn get_frame(&mut self, index: u32) -> Result<Box<dyn Frame + '_>> {
        if index >= self.info.frame_count {
            return Err(Error::frame_access(index, "index past the end of the clip"));
        }
        Ok(Box::new(SyntheticFrame::render(&self.info, self.value, self.build)))
    }
}

struct PlaneData {
    width: usize,
    height: usize,
    stride: usize,
    bytes: Vec<u8>,
}

struct SyntheticFrame {
    colorspace: Colorspace,
    planes: Vec<(Plane, PlaneData)>,
}

impl SyntheticFrame {
    fn render(info: &ClipInfo, value: u8, build: Build) -> Self {
        let colorspace = info.colorspace;
        let (luma_width, luma_height) = (info.width as usize, info.height as usize);
        let planes = colorspace
            .planes()
            .iter()
            .map(|&plane| {
                let (mut width, height) = colorspace.plane_dimensions(plane, luma_width, luma_height);
                if let Packing::Interleaved { bytes_per_pixel } = colorspace.packing {
                    width *= usize::from(bytes_per_pixel);
                }
                let stride = width + build.padding;
                let mut bytes = vec![0xEE; stride * height];
                for row in 0..height {
                    for col in 0..width {
                        let sample = value.wrapping_add((row + col) as u8);
                        bytes[row * stride + col] = sample.wrapping_add(build.bias);
                    }
                }
                (
                    plane,
                    PlaneData {
                        width,
                        height,
                        stride,
                        bytes,
                    },
                )
            })
            .collect();

        Self { colorspace, planes }
    }

    fn plane(&self, plane: Plane) -> Option<&PlaneData> {
        self.planes.iter().find(|(p, _)| *p == plane).map(|(_, data)| data)
    }
}

impl Frame for SyntheticFrame {
    fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    fn width(&self, plane: Plane) -> usize {
        self.plane(plane).map_or(0, |p| p.width)
    }

    fn height(&self, plane: Plane) -> usize {
        self.plane(plane).map_or(0, |p| p.height)
    }

    fn stride(&self, plane: Plane) -> usize {
        self.plane(plane).map_or(0, |p| p.stride)
    }

    fn plane_data(&self, plane: Plane) -> &[u8] {
        self.plane(plane).map(|p| p.bytes.as_slice()).unwrap_or(&[])
    }
}

fn main() {
    let Some(region) = std::env::args().nth(1) else {
        eprintln!("Usage: mock_worker <region-name>");
        std::process::exit(2);
    };

    if let Err(e) = worker::serve(&region, &SyntheticLoader) {
        eprintln!("mock_worker: {}", e);
        std::process::exit(1);
    }
}
