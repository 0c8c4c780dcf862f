//! Caller-owned byte buffers
//!
//! Every buffer handed to the host is allocated here and must come back
//! through [`release_buffer`] exactly once. The bytes are NUL-terminated so
//! the host may read them as a C string; `len` excludes the terminator.

use std::ptr;

#[repr(C)]
#[derive(Debug)]
pub struct OwnedBuffer {
    pub ptr: *mut u8,
    pub len: usize,
}

impl OwnedBuffer {
    pub fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    /// Move `text` into a new NUL-terminated allocation.
    pub fn from_string(text: String) -> Self {
        let mut bytes = text.into_bytes();
        // serde_json escapes NUL, so JSON never contains one; other text is
        // cut at the first NUL so the C-string view matches `len`.
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        let len = bytes.len();
        bytes.push(0);
        let ptr = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;

        #[cfg(test)]
        tracker::created(ptr);

        Self { ptr, len }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// View the contents.
    ///
    /// # Safety
    /// The buffer must come from [`OwnedBuffer::from_string`] and not have
    /// been released.
    pub unsafe fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).ok()
    }
}

/// Release a buffer returned by any `tickcast` function.
///
/// A null buffer is ignored.
///
/// # Safety
/// `buffer` must have been returned by this library and must not have been
/// released before. The host must not touch its memory afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn release_buffer(buffer: OwnedBuffer) {
    if buffer.ptr.is_null() {
        return;
    }

    #[cfg(test)]
    if !tracker::released(buffer.ptr) {
        log::error!("release_buffer: {:p} is not a live buffer (double free?)", buffer.ptr);
        return;
    }

    let slice = ptr::slice_from_raw_parts_mut(buffer.ptr, buffer.len + 1);
    drop(unsafe { Box::from_raw(slice) });
}
