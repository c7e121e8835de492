//! POSIX shared memory regions
//!
//! The driver creates a region per worker invocation and unlinks it on drop.
//! The worker opens the same region by name and only unmaps it on drop.

use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

/// A mapped shared memory region
pub struct SharedRegion {
    name: String,
    ptr: NonNull<u8>,
    len: usize,
    owner: bool,
}

// The mapping is plain memory; access goes through &self / &mut self.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create a new zeroed region of `len` bytes; fails if the name exists
    pub fn create(name: &str, len: usize) -> io::Result<Self> {
        let c_name = c_name(name)?;
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600 as libc::c_uint,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let sized = unsafe { libc::ftruncate(fd, len as libc::off_t) };
        if sized != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(err);
        }

        match map(fd, len) {
            Ok(ptr) => Ok(Self {
                name: name.to_string(),
                ptr,
                len,
                owner: true,
            }),
            Err(err) => {
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                Err(err)
            }
        }
    }

    /// Open a region created by another process
    pub fn open(name: &str) -> io::Result<Self> {
        let c_name = c_name(name)?;
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
        if unsafe { libc::fstat(fd, stat.as_mut_ptr()) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let len = unsafe { stat.assume_init() }.st_size as usize;

        let ptr = map(fd, len)?;
        Ok(Self {
            name: name.to_string(),
            ptr,
            len,
            owner: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Pointer to the start of the mapping, for atomic header access
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        if self.owner {
            if let Ok(c_name) = c_name(&self.name) {
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
            }
            tracing::trace!(region = %self.name, "Released shared memory region");
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("owner", &self.owner)
            .finish()
    }
}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Region name contains NUL"))
}

/// Map `len` bytes of `fd` shared and read-write, closing `fd` either way
fn map(fd: libc::c_int, len: usize) -> io::Result<NonNull<u8>> {
    if len == 0 {
        unsafe { libc::close(fd) };
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Region is empty"));
    }
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    let err = io::Error::last_os_error();
    unsafe { libc::close(fd) };

    if addr == libc::MAP_FAILED {
        return Err(err);
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
}
