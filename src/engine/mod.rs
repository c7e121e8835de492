//! Boundary to the native video engine under test
//!
//! Worker-side logic depends only on these traits. Handles borrow their
//! parent (environment → clip → frame), so release happens in reverse
//! acquisition order when each one goes out of scope.

pub mod avisynth;

use std::path::Path;

use crate::common::Result;
use crate::frame::{Colorspace, Frame};

/// Metadata of an evaluated clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub colorspace: Colorspace,
}

/// Loads one engine build from disk
pub trait EngineLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ScriptEnvironment>>;
}

/// A loaded engine build able to evaluate scripts
pub trait ScriptEnvironment {
    /// Evaluate script text into a playable clip
    ///
    /// Script-language errors reported by the engine surface as
    /// [`Error::EngineEvaluation`](crate::common::Error::EngineEvaluation).
    fn evaluate(&mut self, script: &str) -> Result<Box<dyn Clip + '_>>;
}

/// A playable clip produced by a script
pub trait Clip {
    fn info(&self) -> ClipInfo;

    /// Fetch a live frame; fails for indices outside the clip
    fn get_frame(&mut self, index: u32) -> Result<Box<dyn Frame + '_>>;
}
