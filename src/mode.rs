use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
/// The order in which a worker visits the physical frame indices of its range.
pub enum AccessMode {
    #[default]
    /// `start, start + 1, ..., end - 1`.
    Sequential,
    /// `end - 1, end - 2, ..., start`.
    Reverse,
    /// A Fisher-Yates shuffle of the range, generated once per worker.
    Random,
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::Sequential => write!(f, "sequential"),
            AccessMode::Reverse => write!(f, "reverse"),
            AccessMode::Random => write!(f, "random"),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
/// How frames are laid out on disk.
pub enum FileLayout {
    #[default]
    /// One `frameNNNNNN.tst` file per physical frame index inside a directory.
    Multiple,
    /// A single file, frame `i` lives at byte offset `i * frame_size`.
    Single,
}

impl FileLayout {
    /// The file a physical frame index maps to.
    ///
    /// `base` is the target directory for [FileLayout::Multiple] and the
    /// target file itself for [FileLayout::Single].
    pub fn frame_path(&self, base: &Path, frame_idx: usize) -> PathBuf {
        match self {
            FileLayout::Multiple => base.join(frame_file_name(frame_idx)),
            FileLayout::Single => base.to_path_buf(),
        }
    }

    /// The byte offset a physical frame index is stored at within its file.
    pub fn frame_offset(&self, frame_idx: usize, frame_size: usize) -> u64 {
        match self {
            FileLayout::Multiple => 0,
            FileLayout::Single => frame_idx as u64 * frame_size as u64,
        }
    }
}

/// The file name of a frame in the [FileLayout::Multiple] layout.
pub fn frame_file_name(frame_idx: usize) -> String {
    format!("frame{frame_idx:06}.tst")
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// The direction of a test run.
pub enum TestKind {
    Write,
    Read,
}

impl Display for TestKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TestKind::Write => write!(f, "write"),
            TestKind::Read => write!(f, "read"),
        }
    }
}
