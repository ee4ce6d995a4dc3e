//! Synthetic frame payloads.

use std::io;
use std::path::Path;

use crate::buffer::{AlignedBuffer, AllocError};
use crate::platform::{Platform, PlatformFile};
use crate::profile::{self, FRAME_ALIGNMENT, Profile};

/// The byte freshly generated frames are filled with.
pub const FILLER: u8 = b't';

#[derive(Debug, thiserror::Error)]
/// A frame could not be created.
pub enum FrameError {
    #[error("{0}")]
    /// The frame buffer could not be allocated.
    Alloc(#[from] AllocError),
    #[error("{0}")]
    /// The backing file could not be inspected.
    Io(#[from] io::Error),
}

/// A fixed size, direct IO aligned payload buffer shaped by a [Profile].
///
/// The buffer is exclusively owned and released when the frame is dropped.
#[derive(Debug)]
pub struct Frame {
    profile: Profile,
    buffer: AlignedBuffer,
}

impl Frame {
    /// Allocate a frame for `profile` and fill it with [FILLER].
    pub fn generate(platform: &dyn Platform, profile: Profile) -> Result<Self, FrameError> {
        let size = profile::size_of(&profile);
        let buffer = platform.alloc_aligned(FRAME_ALIGNMENT, size)?;

        let mut frame = Self { profile, buffer };
        frame.fill(FILLER);

        tracing::debug!(profile = profile.name, size = size, "generated frame");

        Ok(frame)
    }

    /// Create a zeroed frame sized after an existing file.
    ///
    /// The profile is recovered from the catalog when the aligned file size
    /// matches one exactly, otherwise a custom profile describing the raw span
    /// is used. An empty file produces an empty frame without allocating.
    pub fn load_from_existing(
        platform: &dyn Platform,
        path: &Path,
        header_size: usize,
    ) -> Result<Self, FrameError> {
        let stat = platform.stat(path)?;
        let file_size = usize::try_from(stat.size).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file size {} does not fit in memory", stat.size),
            )
        })?;

        if file_size == 0 {
            return Ok(Self {
                profile: profile::EMPTY,
                buffer: AlignedBuffer::zeroed(FRAME_ALIGNMENT, 0)?,
            });
        }

        // A header can never be larger than the file it belongs to.
        let header_size = header_size.min(file_size);
        let size = file_size.next_multiple_of(FRAME_ALIGNMENT);
        let mut profile = profile::get_by_frame_size(header_size, size);
        if !profile.is_valid() {
            profile = Profile::custom(file_size - header_size, header_size);
        }

        let buffer = platform.alloc_aligned(FRAME_ALIGNMENT, size)?;
        let mut frame = Self { profile, buffer };
        frame.fill(0);

        tracing::debug!(
            path = %path.display(),
            profile = profile.name,
            size = size,
            "loaded frame from existing file"
        );

        Ok(frame)
    }

    /// Allocate a zeroed frame with the same profile and size as `other`.
    ///
    /// Used to give every read worker its own destination buffer.
    pub fn zeroed_like(platform: &dyn Platform, other: &Frame) -> Result<Self, FrameError> {
        let buffer = if other.is_empty() {
            AlignedBuffer::zeroed(FRAME_ALIGNMENT, 0)?
        } else {
            platform.alloc_aligned(FRAME_ALIGNMENT, other.size())?
        };

        Ok(Self {
            profile: other.profile,
            buffer,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The size of the frame in bytes, always a multiple of [FRAME_ALIGNMENT].
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Overwrite every byte of the frame with `value`.
    ///
    /// Returns the number of bytes written.
    pub fn fill(&mut self, value: u8) -> usize {
        self.buffer.fill(value);
        self.buffer.len()
    }

    /// Write the whole frame to `file`.
    ///
    /// Stops early if the file accepts zero bytes, returning the number of
    /// bytes transferred so far.
    pub fn write(&self, file: &mut dyn PlatformFile) -> io::Result<usize> {
        let mut written = 0;
        while written < self.buffer.len() {
            let n = file.write(&self.buffer[written..])?;
            if n == 0 {
                break;
            }
            written += n;
        }
        Ok(written)
    }

    /// Fill the whole frame from `file`.
    ///
    /// Stops early on end of file, returning the number of bytes transferred so far.
    pub fn read(&mut self, file: &mut dyn PlatformFile) -> io::Result<usize> {
        let mut read = 0;
        while read < self.buffer.len() {
            let n = file.read(&mut self.buffer[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::memory::MemoryPlatform;
    use crate::platform::OpenFlags;
    use crate::profile::ProfileKind;

    fn default_profile() -> Profile {
        profile::get_by_name("SD-32bit-cmp")
    }

    fn write_file(platform: &MemoryPlatform, path: &Path, frame: Option<&Frame>) {
        let mut file = platform
            .open(path, OpenFlags::write_create().with_direct(true))
            .unwrap();
        if let Some(frame) = frame {
            assert_eq!(frame.write(file.as_mut()).unwrap(), frame.size());
        }
        file.close().unwrap();
    }

    #[test]
    fn test_frame_generate() {
        let platform = MemoryPlatform::new();
        let frame = Frame::generate(&platform, default_profile()).unwrap();

        assert_eq!(frame.size(), 1_384_448);
        assert_eq!(frame.size() % FRAME_ALIGNMENT, 0);
        assert_eq!(frame.data().as_ptr() as usize % FRAME_ALIGNMENT, 0);
        assert_eq!(frame.profile(), &default_profile());
        assert_eq!(platform.live_allocations(), 1);

        drop(frame);
        assert_eq!(platform.live_allocations(), 0);
    }

    #[test]
    fn test_frame_generate_sd_24bit() {
        let platform = MemoryPlatform::new();
        let frame = Frame::generate(&platform, profile::get_by_name("SD-24bit")).unwrap();
        assert_eq!(frame.size(), 1_040_384);
    }

    #[test]
    fn test_frame_generate_alloc_failure() {
        let platform = MemoryPlatform::new().with_alloc_limit(0);
        let err = Frame::generate(&platform, default_profile()).unwrap_err();
        assert!(matches!(err, FrameError::Alloc(AllocError::OutOfMemory { .. })));
        assert_eq!(platform.live_allocations(), 0);
    }

    #[test]
    fn test_frame_fill() {
        let platform = MemoryPlatform::new();
        let mut frame = Frame::generate(&platform, default_profile()).unwrap();

        assert!(frame.data().iter().all(|b| *b == FILLER));
        assert_eq!(frame.fill(0x42), frame.size());
        assert!(frame.data().iter().all(|b| *b == 0x42));
    }

    #[test]
    fn test_frame_fill_empty() {
        let platform = MemoryPlatform::new();
        let mut frame = Frame::generate(&platform, profile::EMPTY).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.fill(0x42), 0);
    }

    #[test]
    fn test_frame_write_read() {
        let platform = MemoryPlatform::new();
        let mut frame = Frame::generate(&platform, default_profile()).unwrap();
        let mut frame_read = Frame::generate(&platform, default_profile()).unwrap();

        assert_eq!(frame.fill(0x42), frame.size());
        assert_eq!(frame_read.data()[0], FILLER);

        write_file(&platform, Path::new("tst1"), Some(&frame));
        assert_eq!(frame_read.data()[0], FILLER);

        let mut file = platform
            .open(Path::new("tst1"), OpenFlags::read_only().with_direct(true))
            .unwrap();
        assert_eq!(frame_read.read(file.as_mut()).unwrap(), frame.size());
        file.close().unwrap();

        assert_eq!(frame.data(), frame_read.data());
    }

    #[test]
    fn test_frame_read_short_file() {
        let platform = MemoryPlatform::new();
        platform.insert_file("short", vec![7; 4096]);

        let mut frame = Frame::generate(&platform, default_profile()).unwrap();
        let mut file = platform
            .open(Path::new("short"), OpenFlags::read_only())
            .unwrap();
        assert_eq!(frame.read(file.as_mut()).unwrap(), 4096);
        assert!(frame.data()[..4096].iter().all(|b| *b == 7));
        assert!(frame.data()[4096..].iter().all(|b| *b == FILLER));
    }

    #[test]
    fn test_frame_write_read_empty_is_noop() {
        let platform = MemoryPlatform::new();
        let mut frame = Frame::generate(&platform, profile::EMPTY).unwrap();

        let mut file = platform
            .open(Path::new("empty"), OpenFlags::write_create())
            .unwrap();
        assert_eq!(frame.write(file.as_mut()).unwrap(), 0);
        assert_eq!(frame.read(file.as_mut()).unwrap(), 0);
        file.close().unwrap();
    }

    #[test]
    fn test_frame_write_read_round_trip_random() {
        let platform = MemoryPlatform::new();
        let mut rng = fastrand::Rng::with_seed(42);

        for round in 0..32 {
            let profile = Profile {
                name: "random",
                kind: ProfileKind::Custom,
                width: rng.usize(1..256),
                height: rng.usize(1..128),
                bytes_per_pixel: rng.usize(1..=4),
                header_size: rng.usize(0..8192),
            };
            let fill = rng.u8(..);
            let path = format!("round-{round}");

            let mut frame = Frame::generate(&platform, profile).unwrap();
            frame.fill(fill);
            write_file(&platform, Path::new(&path), Some(&frame));

            let mut frame_read = Frame::generate(&platform, profile).unwrap();
            frame_read.fill(fill.wrapping_add(1));
            let mut file = platform
                .open(Path::new(&path), OpenFlags::read_only())
                .unwrap();
            assert_eq!(frame_read.read(file.as_mut()).unwrap(), frame.size());
            file.close().unwrap();

            assert_eq!(frame.data(), frame_read.data(), "round: {round}");
        }
    }

    #[test]
    fn test_frame_load_from_existing() {
        let platform = MemoryPlatform::new();

        let err = Frame::load_from_existing(&platform, Path::new("tst1"), 0).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));

        let frame = Frame::generate(&platform, default_profile()).unwrap();
        write_file(&platform, Path::new("tst2"), Some(&frame));
        drop(frame);

        let frame = Frame::load_from_existing(&platform, Path::new("tst2"), 0).unwrap();
        assert_eq!(frame.profile().name, "SD-32bit-cmp");
        assert_eq!(frame.size(), 1_384_448);
        assert!(frame.data().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_frame_load_from_empty_file() {
        let platform = MemoryPlatform::new();
        write_file(&platform, Path::new("tst3"), None);

        let frame = Frame::load_from_existing(&platform, Path::new("tst3"), 0).unwrap();
        assert_eq!(frame.profile(), &profile::EMPTY);
        assert!(frame.is_empty());
        assert_eq!(platform.live_allocations(), 0);
    }

    #[test]
    fn test_frame_load_custom_size() {
        let platform = MemoryPlatform::new();
        platform.insert_file("odd", vec![1; 10_000]);

        let frame = Frame::load_from_existing(&platform, Path::new("odd"), 0).unwrap();
        assert_eq!(frame.profile().kind, ProfileKind::Custom);
        assert_eq!(frame.profile().name, "custom");
        assert_eq!(frame.profile().raw_size(), 10_000);
        assert_eq!(frame.size(), 12_288);
    }

    #[test]
    fn test_frame_load_header_larger_than_file() {
        let platform = MemoryPlatform::new();
        platform.insert_file("short", vec![1; 100]);

        let frame = Frame::load_from_existing(&platform, Path::new("short"), 8192).unwrap();
        assert_eq!(frame.profile().kind, ProfileKind::Custom);
        assert_eq!(frame.profile().header_size, 100);
        assert_eq!(frame.profile().raw_size(), 100);
        assert_eq!(profile::size_of(frame.profile()), frame.size());
        assert_eq!(frame.size(), 4096);
    }

    #[test]
    fn test_frame_zeroed_like() {
        let platform = MemoryPlatform::new();
        let frame = Frame::generate(&platform, default_profile()).unwrap();

        let copy = Frame::zeroed_like(&platform, &frame).unwrap();
        assert_eq!(copy.profile(), frame.profile());
        assert_eq!(copy.size(), frame.size());
        assert!(copy.data().iter().all(|b| *b == 0));
        assert_eq!(platform.live_allocations(), 2);

        let empty = Frame::generate(&platform, profile::EMPTY).unwrap();
        let copy = Frame::zeroed_like(&platform, &empty).unwrap();
        assert!(copy.is_empty());
    }

    #[test]
    fn test_frame_load_sd_24bit_by_size() {
        let platform = MemoryPlatform::new();
        platform.insert_file("sd", vec![0; 1_040_384]);

        let frame = Frame::load_from_existing(&platform, Path::new("sd"), 0).unwrap();
        assert_eq!(frame.profile().name, "SD-24bit");
    }
}
