//! AviSynth C API binding loaded with `dlopen`
//!
//! Every entry point is resolved when the library is loaded, so a build
//! missing one fails with an engine dispatch error before any script runs.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::{Clip, ClipInfo, EngineLoader, ScriptEnvironment};
use crate::common::{Error, Result};
use crate::frame::{
    required_len, Chroma, ColorFamily, Colorspace, Frame, Packing, Plane, PlaneOrder, Subsampling,
};

/// Interface version requested from `avs_create_script_environment`
const AVS_INTERFACE_VERSION: c_int = 3;

const AVS_PLANAR_Y: c_int = 1 << 0;
const AVS_PLANAR_U: c_int = 1 << 1;
const AVS_PLANAR_V: c_int = 1 << 2;

// Pixel type bits from avisynth_c.h
const CS_BGR: u32 = 1 << 28;
const CS_YUV: u32 = 1 << 29;
const CS_INTERLEAVED: u32 = 1 << 30;
const CS_PLANAR: u32 = 1 << 31;
const CS_VPLANEFIRST: u32 = 1 << 3;
const CS_UPLANEFIRST: u32 = 1 << 4;
const CS_SUB_WIDTH_MASK: u32 = 3;
const CS_SUB_HEIGHT_SHIFT: u32 = 8;
const CS_SUB_HEIGHT_MASK: u32 = 3 << CS_SUB_HEIGHT_SHIFT;

const CS_BGR24: u32 = 1 << 0 | CS_BGR | CS_INTERLEAVED;
const CS_BGR32: u32 = 1 << 1 | CS_BGR | CS_INTERLEAVED;
const CS_YUY2: u32 = 1 << 2 | CS_YUV | CS_INTERLEAVED;
const CS_RAW32: u32 = 1 << 5 | CS_INTERLEAVED;
const CS_Y8: u32 = CS_PLANAR | CS_INTERLEAVED | CS_YUV;

/// Decode an AviSynth pixel type into a colorspace
///
/// Only 8-bit formats are understood; anything else yields `None`.
pub fn decode_pixel_type(pixel_type: i32) -> Option<Colorspace> {
    let bits = pixel_type as u32;
    match bits {
        CS_BGR24 => return Some(Colorspace::BGR24),
        CS_BGR32 => return Some(Colorspace::BGR32),
        CS_YUY2 => return Some(Colorspace::YUY2),
        CS_RAW32 => return Some(Colorspace::RAW32),
        CS_Y8 => return Some(Colorspace::Y8),
        _ => {}
    }

    let known = CS_PLANAR
        | CS_YUV
        | CS_VPLANEFIRST
        | CS_UPLANEFIRST
        | CS_SUB_WIDTH_MASK
        | CS_SUB_HEIGHT_MASK;
    if bits & (CS_PLANAR | CS_YUV) != CS_PLANAR | CS_YUV || bits & !known != 0 {
        return None;
    }

    let divisor = |code: u32| match code {
        3 => Some(1),
        0 => Some(2),
        1 => Some(4),
        _ => None,
    };
    let order = match (bits & CS_VPLANEFIRST != 0, bits & CS_UPLANEFIRST != 0) {
        (true, false) => PlaneOrder::VFirst,
        (false, true) => PlaneOrder::UFirst,
        _ => return None,
    };

    Some(Colorspace {
        family: ColorFamily::Yuv,
        packing: Packing::Planar,
        chroma: Some(Chroma {
            order,
            subsampling: Subsampling {
                horizontal: divisor(bits & CS_SUB_WIDTH_MASK)?,
                vertical: divisor((bits & CS_SUB_HEIGHT_MASK) >> CS_SUB_HEIGHT_SHIFT)?,
            },
        }),
    })
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
union AvsValueData {
    clip: *mut c_void,
    boolean: c_char,
    integer: c_int,
    floating_pt: f32,
    string: *const c_char,
    array: *const AvsValue,
    longlong: i64,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct AvsValue {
    kind: i16,
    array_size: i16,
    d: AvsValueData,
}

/// Leading fields of `AVS_VideoInfo`
#[repr(C)]
#[allow(dead_code)]
struct AvsVideoInfo {
    width: c_int,
    height: c_int,
    fps_numerator: u32,
    fps_denominator: u32,
    num_frames: c_int,
    pixel_type: c_int,
}

type CreateEnvFn = unsafe extern "C" fn(c_int) -> *mut c_void;
type DeleteEnvFn = unsafe extern "C" fn(*mut c_void);
type InvokeFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, AvsValue, *const *const c_char) -> AvsValue;
type ReleaseValueFn = unsafe extern "C" fn(AvsValue);
type TakeClipFn = unsafe extern "C" fn(AvsValue, *mut c_void) -> *mut c_void;
type ReleaseClipFn = unsafe extern "C" fn(*mut c_void);
type ClipErrorFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type VideoInfoFn = unsafe extern "C" fn(*mut c_void) -> *const AvsVideoInfo;
type GetFrameFn = unsafe extern "C" fn(*mut c_void, c_int) -> *mut c_void;
type ReleaseFrameFn = unsafe extern "C" fn(*mut c_void);
type PlaneIntFn = unsafe extern "C" fn(*const c_void, c_int) -> c_int;
type ReadPtrFn = unsafe extern "C" fn(*const c_void, c_int) -> *const u8;

/// A `dlopen`ed shared library, closed on drop
struct Library {
    handle: *mut c_void,
}

impl Library {
    fn open(path: &Path) -> Result<Self> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::engine_load(&path.display().to_string(), "path contains NUL"))?;
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(Error::engine_load(&path.display().to_string(), &last_dl_error()));
        }
        Ok(Self { handle })
    }

    /// Resolve a function pointer
    ///
    /// # Safety
    ///
    /// `T` must be the function pointer type matching the symbol's C signature.
    unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T> {
        let c_name = CString::new(name).map_err(|_| Error::engine_dispatch(name, "invalid name"))?;
        libc::dlerror();
        let ptr = libc::dlsym(self.handle, c_name.as_ptr());
        if ptr.is_null() {
            return Err(Error::engine_dispatch(name, &last_dl_error()));
        }
        Ok(std::mem::transmute_copy::<*mut c_void, T>(&ptr))
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe { libc::dlclose(self.handle) };
    }
}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown error".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    }
}

unsafe fn lossy_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Entry points of one loaded build
struct Api {
    create_env: CreateEnvFn,
    delete_env: DeleteEnvFn,
    invoke: InvokeFn,
    release_value: ReleaseValueFn,
    take_clip: TakeClipFn,
    release_clip: ReleaseClipFn,
    clip_get_error: ClipErrorFn,
    get_video_info: VideoInfoFn,
    get_frame: GetFrameFn,
    release_frame: ReleaseFrameFn,
    get_pitch_p: PlaneIntFn,
    get_row_size_p: PlaneIntFn,
    get_height_p: PlaneIntFn,
    get_read_ptr_p: ReadPtrFn,
}

impl Api {
    unsafe fn resolve(library: &Library) -> Result<Self> {
        Ok(Self {
            create_env: library.symbol("avs_create_script_environment")?,
            delete_env: library.symbol("avs_delete_script_environment")?,
            invoke: library.symbol("avs_invoke")?,
            release_value: library.symbol("avs_release_value")?,
            take_clip: library.symbol("avs_take_clip")?,
            release_clip: library.symbol("avs_release_clip")?,
            clip_get_error: library.symbol("avs_clip_get_error")?,
            get_video_info: library.symbol("avs_get_video_info")?,
            get_frame: library.symbol("avs_get_frame")?,
            release_frame: library.symbol("avs_release_video_frame")?,
            get_pitch_p: library.symbol("avs_get_pitch_p")?,
            get_row_size_p: library.symbol("avs_get_row_size_p")?,
            get_height_p: library.symbol("avs_get_height_p")?,
            get_read_ptr_p: library.symbol("avs_get_read_ptr_p")?,
        })
    }
}

/// Loads AviSynth builds through the C API
#[derive(Debug, Default, Clone, Copy)]
pub struct AvisynthLoader;

impl EngineLoader for AvisynthLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ScriptEnvironment>> {
        let library = Library::open(path)?;
        let api = unsafe { Api::resolve(&library)? };
        let env = unsafe { (api.create_env)(AVS_INTERFACE_VERSION) };
        if env.is_null() {
            return Err(Error::engine_load(
                &path.display().to_string(),
                "avs_create_script_environment returned null",
            ));
        }
        tracing::debug!(path = %path.display(), "Loaded engine build");

        Ok(Box::new(AvisynthEnvironment {
            env,
            api,
            _library: library,
        }))
    }
}

struct AvisynthEnvironment {
    env: *mut c_void,
    api: Api,
    // Dropped after the environment is deleted
    _library: Library,
}

impl Drop for AvisynthEnvironment {
    fn drop(&mut self) {
        unsafe { (self.api.delete_env)(self.env) };
    }
}

impl ScriptEnvironment for AvisynthEnvironment {
    fn evaluate(&mut self, script: &str) -> Result<Box<dyn Clip + '_>> {
        let text = CString::new(script)
            .map_err(|_| Error::EngineEvaluation("script contains a NUL byte".to_string()))?;
        let arg = AvsValue {
            kind: b's' as i16,
            array_size: 0,
            d: AvsValueData {
                string: text.as_ptr(),
            },
        };

        let value = unsafe {
            (self.api.invoke)(self.env, c"Eval".as_ptr(), arg, std::ptr::null())
        };
        let clip = match value.kind as u8 {
            b'c' => Ok(unsafe { (self.api.take_clip)(value, self.env) }),
            b'e' => Err(Error::EngineEvaluation(unsafe { lossy_string(value.d.string) })),
            other => Err(Error::EngineEvaluation(format!(
                "script returned a value of type '{}' instead of a clip",
                other as char
            ))),
        };
        unsafe { (self.api.release_value)(value) };

        let clip = clip?;
        if clip.is_null() {
            return Err(Error::EngineEvaluation("engine returned a null clip".to_string()));
        }
        let info = match unsafe { read_info(&self.api, clip) } {
            Ok(info) => info,
            Err(e) => {
                unsafe { (self.api.release_clip)(clip) };
                return Err(e);
            }
        };
        Ok(Box::new(AvisynthClip {
            clip,
            api: &self.api,
            info,
        }))
    }
}

struct AvisynthClip<'env> {
    clip: *mut c_void,
    api: &'env Api,
    info: ClipInfo,
}

unsafe fn read_info(api: &Api, clip: *mut c_void) -> Result<ClipInfo> {
    let vi = (api.get_video_info)(clip);
    if vi.is_null() {
        return Err(Error::EngineEvaluation("clip has no video info".to_string()));
    }
    let vi = &*vi;
    let colorspace = decode_pixel_type(vi.pixel_type).ok_or_else(|| {
        Error::EngineEvaluation(format!("unsupported pixel type {:#x}", vi.pixel_type))
    })?;
    Ok(ClipInfo {
        width: vi.width.max(0) as u32,
        height: vi.height.max(0) as u32,
        frame_count: vi.num_frames.max(0) as u32,
        colorspace,
    })
}

impl Drop for AvisynthClip<'_> {
    fn drop(&mut self) {
        unsafe { (self.api.release_clip)(self.clip) };
    }
}

impl Clip for AvisynthClip<'_> {
    fn info(&self) -> ClipInfo {
        self.info
    }

    fn get_frame(&mut self, index: u32) -> Result<Box<dyn Frame + '_>> {
        let info = self.info();
        if index >= info.frame_count {
            return Err(Error::frame_access(
                index,
                &format!("clip has {} frames", info.frame_count),
            ));
        }

        let frame = unsafe { (self.api.get_frame)(self.clip, index as c_int) };
        if frame.is_null() {
            let reason = unsafe { lossy_string((self.api.clip_get_error)(self.clip)) };
            return Err(Error::frame_access(index, &reason));
        }

        Ok(Box::new(AvisynthFrame {
            frame,
            api: self.api,
            colorspace: info.colorspace,
        }))
    }
}

/// A live frame owned by the engine, released on drop
struct AvisynthFrame<'clip> {
    frame: *mut c_void,
    api: &'clip Api,
    colorspace: Colorspace,
}

impl AvisynthFrame<'_> {
    fn plane_id(&self, plane: Plane) -> Option<c_int> {
        if !self.colorspace.has_plane(plane) {
            return None;
        }
        Some(match (plane, self.colorspace.packing) {
            // Interleaved formats ignore the plane argument
            (Plane::Y, Packing::Interleaved { .. }) => 0,
            (Plane::Y, Packing::Planar) => AVS_PLANAR_Y,
            (Plane::U, _) => AVS_PLANAR_U,
            (Plane::V, _) => AVS_PLANAR_V,
        })
    }

    fn query(&self, plane: Plane, f: PlaneIntFn) -> usize {
        self.plane_id(plane)
            .map(|id| unsafe { f(self.frame, id) }.max(0) as usize)
            .unwrap_or(0)
    }
}

impl Drop for AvisynthFrame<'_> {
    fn drop(&mut self) {
        unsafe { (self.api.release_frame)(self.frame) };
    }
}

impl Frame for AvisynthFrame<'_> {
    fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    fn width(&self, plane: Plane) -> usize {
        self.query(plane, self.api.get_row_size_p)
    }

    fn height(&self, plane: Plane) -> usize {
        self.query(plane, self.api.get_height_p)
    }

    fn stride(&self, plane: Plane) -> usize {
        self.query(plane, self.api.get_pitch_p)
    }

    fn plane_data(&self, plane: Plane) -> &[u8] {
        let Some(id) = self.plane_id(plane) else {
            return &[];
        };
        let len = required_len(self.width(plane), self.height(plane), self.stride(plane));
        let ptr = unsafe { (self.api.get_read_ptr_p)(self.frame, id) };
        if ptr.is_null() || len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(ptr, len) }
    }
}
