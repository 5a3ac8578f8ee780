use std::ffi::c_void;
use std::fs::File;
use std::io;
use std::mem;
use std::os::windows::fs::FileExt;
use std::os::windows::io::AsRawHandle;
use std::ptr;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::IO::DeviceIoControl;
use windows_sys::Win32::System::Ioctl::{GET_LENGTH_INFORMATION, IOCTL_DISK_GET_LENGTH_INFO};

/// Reads into `buf` starting at `offset` until the buffer is full or the
/// source reaches EOF, returning the number of bytes read.
///
/// `seek_read` takes the offset explicitly, so workers sharing a handle do
/// not depend on where the cursor was left.
pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.seek_read(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Returns the size in bytes of a regular file or raw disk.
///
/// Disk and volume handles (`\\.\PhysicalDriveN`) have no meaningful file
/// length, so their size is queried with `IOCTL_DISK_GET_LENGTH_INFO`.
pub fn source_size(file: &File) -> io::Result<u64> {
    let metadata = file.metadata()?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let mut info = GET_LENGTH_INFORMATION { Length: 0 };
    let mut returned: u32 = 0;
    // SAFETY: the handle is owned by `file` for the duration of the call and
    // the output buffer is a valid GET_LENGTH_INFORMATION.
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as HANDLE,
            IOCTL_DISK_GET_LENGTH_INFO,
            ptr::null(),
            0,
            (&mut info as *mut GET_LENGTH_INFORMATION).cast::<c_void>(),
            mem::size_of::<GET_LENGTH_INFORMATION>() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    u64::try_from(info.Length)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative disk length"))
}
