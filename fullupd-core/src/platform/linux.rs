use nix::errno::Errno;
use nix::ioctl_read;
use nix::sys::uio::pread;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;

ioctl_read!(blkgetsize64, 0x12, 114, u64);

/// Reads into `buf` starting at `offset` until the buffer is full or the
/// source reaches EOF, returning the number of bytes read.
///
/// Uses `pread(2)`, so the file cursor is left untouched and concurrent
/// callers sharing one handle never race.
pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let pos = offset + filled as u64;
        let pos = libc::off_t::try_from(pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        match pread(file, &mut buf[filled..], pos) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Returns the size in bytes of a regular file or block device.
///
/// Block devices report a zero length through `stat`, so their size is
/// queried with the `BLKGETSIZE64` ioctl instead.
pub fn source_size(file: &File) -> io::Result<u64> {
    let metadata = file.metadata()?;
    if !metadata.file_type().is_block_device() {
        return Ok(metadata.len());
    }

    let mut size_bytes: u64 = 0;
    // SAFETY: the fd is owned by `file` for the duration of the call and
    // `size_bytes` is a valid u64 out-pointer.
    unsafe {
        blkgetsize64(file.as_raw_fd(), &mut size_bytes)?;
    }
    Ok(size_bytes)
}
