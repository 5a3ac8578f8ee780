//! Provides platform-specific I/O.
//!
//! Chunk workers read the same source handle concurrently, so every read goes
//! through an explicit offset and never through the shared file cursor. The
//! submodules also know how to size a source that is a block device rather
//! than a regular file.
//!
//! It uses conditional compilation (`#[cfg]`) to expose the correct implementation
//! for the target OS (e.g., Linux, Windows). Each submodule exposes the same
//! public API, so that the rest of the library can use it without worrying
//! about the underlying platform.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::*;
