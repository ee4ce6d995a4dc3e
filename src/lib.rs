#![doc = include_str!("../README.md")]

pub mod buffer;
mod builder;
pub mod frame;
pub mod histogram;
pub mod memory;
pub mod mode;
pub mod partition;
pub mod platform;
pub mod profile;
pub mod report;
pub mod tester;
#[cfg(test)]
mod tests;
pub mod timing;

pub use crate::builder::{RunError, TestBuilder};
pub use crate::frame::{Frame, FrameError};
pub use crate::mode::{AccessMode, FileLayout, TestKind};
pub use crate::platform::{OsPlatform, Platform};
pub use crate::profile::{Profile, ProfileKind};
pub use crate::tester::{TestCompletion, TestResult};

/// Create a new [TestBuilder] for configuring a benchmark run.
///
/// ## Example
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::path::Path;
///
/// use framebench::memory::MemoryPlatform;
/// use framebench::{AccessMode, Frame, FileLayout, profile};
///
/// let platform = MemoryPlatform::new();
/// let frame = Frame::generate(&platform, profile::get_by_name("HD-24bit"))?;
///
/// let written = framebench::builder()
///     .with_threads(4)
///     .with_frames(8)
///     .with_layout(FileLayout::Single)
///     .try_run_write(&platform, &frame, Path::new("/bench/frames.bin"))?;
///
/// let read = framebench::builder()
///     .with_threads(4)
///     .with_frames(8)
///     .with_layout(FileLayout::Single)
///     .with_access_mode(AccessMode::Reverse)
///     .try_run_read(&platform, &frame, Path::new("/bench/frames.bin"))?;
///
/// assert_eq!(written.bytes_transferred, read.bytes_transferred);
/// # Ok(())
/// # }
/// ```
pub const fn builder() -> TestBuilder {
    TestBuilder::const_default()
}
