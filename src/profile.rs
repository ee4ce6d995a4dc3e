//! The catalog of named frame shapes.
//!
//! Every lookup is total: a miss returns the `invalid` sentinel stored at
//! index `0` rather than an error, callers are expected to check
//! [Profile::is_valid] before using the result.

/// The alignment every materialized frame size is rounded up to.
///
/// Direct IO requires both the buffer address and the transfer length to be
/// a multiple of the logical block size, `4096` covers every device we care about.
pub const FRAME_ALIGNMENT: usize = 4096;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// The broad class of a [Profile].
pub enum ProfileKind {
    /// The lookup sentinel, never a usable shape.
    Invalid,
    /// A shape that was not taken from the catalog, i.e. inferred from a file.
    Custom,
    /// Standard definition.
    Sd,
    /// 720p.
    Hd,
    /// 1080p.
    FullHd,
    /// DCI 2K.
    TwoK,
    /// 4K, both DCI and UHD variants.
    FourK,
    /// 8K UHD.
    EightK,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// A named frame shape.
///
/// Profiles are plain values, they are looked up and copied but never mutated
/// in place.
pub struct Profile {
    pub name: &'static str,
    pub kind: ProfileKind,
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub header_size: usize,
}

impl Profile {
    const fn new(
        name: &'static str,
        kind: ProfileKind,
        width: usize,
        height: usize,
        bytes_per_pixel: usize,
    ) -> Self {
        Self {
            name,
            kind,
            width,
            height,
            bytes_per_pixel,
            header_size: 0,
        }
    }

    /// Describe a raw byte span that does not match anything in the catalog.
    ///
    /// The span is modelled as a single row of one byte pixels so that
    /// [size_of] reproduces `header_size + payload` before alignment.
    pub const fn custom(payload: usize, header_size: usize) -> Self {
        Self {
            name: "custom",
            kind: ProfileKind::Custom,
            width: payload,
            height: 1,
            bytes_per_pixel: 1,
            header_size,
        }
    }

    /// Returns a copy of the profile with the given header size.
    pub const fn with_header_size(mut self, header_size: usize) -> Self {
        self.header_size = header_size;
        self
    }

    /// Returns `false` for the lookup sentinel.
    pub fn is_valid(&self) -> bool {
        self.kind != ProfileKind::Invalid
    }

    /// The unaligned payload size, pixels plus header.
    pub const fn raw_size(&self) -> usize {
        self.width * self.height * self.bytes_per_pixel + self.header_size
    }

    /// The aligned byte size of a frame using this profile.
    pub const fn size(&self) -> usize {
        self.raw_size().next_multiple_of(FRAME_ALIGNMENT)
    }
}

/// The profile returned for every lookup miss.
pub const INVALID: Profile = Profile::new("invalid", ProfileKind::Invalid, 0, 0, 0);

/// The profile describing a zero byte frame.
pub const EMPTY: Profile = Profile::new("empty", ProfileKind::Custom, 0, 0, 0);

// The "cmp" shapes follow the classic frametest tool, which uses a 4:3 ratio
// for 2K and 4K with 32 bit pixels.
static PROFILES: [Profile; 14] = [
    INVALID,
    Profile::new("SD-32bit-cmp", ProfileKind::Sd, 720, 480, 4),
    Profile::new("SD-24bit", ProfileKind::Sd, 720, 480, 3),
    Profile::new("FULLHD-32bit-cmp", ProfileKind::Hd, 1920, 1080, 4),
    Profile::new("HD-24bit", ProfileKind::Hd, 1280, 720, 3),
    Profile::new("FULLHD-24bit", ProfileKind::FullHd, 1920, 1080, 3),
    Profile::new("2K-32bit-cmp", ProfileKind::TwoK, 2048, 1556, 4),
    Profile::new("2K-24bit", ProfileKind::TwoK, 2048, 1080, 3),
    Profile::new("4K-32bit-cmp", ProfileKind::FourK, 4096, 3112, 4),
    Profile::new("4K-24bit", ProfileKind::FourK, 3840, 2160, 3),
    Profile::new("4K-16bit", ProfileKind::FourK, 3840, 2160, 2),
    Profile::new("4K-32bit", ProfileKind::FourK, 3840, 2160, 4),
    Profile::new("8K-24bit", ProfileKind::EightK, 7680, 4320, 3),
    EMPTY,
];

/// The number of catalog entries, including the sentinel.
pub fn count() -> usize {
    PROFILES.len()
}

/// The aligned byte size of a frame built from `profile`.
pub const fn size_of(profile: &Profile) -> usize {
    profile.size()
}

/// Find a profile by its exact name.
pub fn get_by_name(name: &str) -> Profile {
    PROFILES[1..]
        .iter()
        .find(|profile| profile.name == name)
        .copied()
        .unwrap_or(INVALID)
}

/// Find the first profile of the given kind.
pub fn get_by_type(kind: ProfileKind) -> Profile {
    PROFILES[1..]
        .iter()
        .find(|profile| profile.kind == kind)
        .copied()
        .unwrap_or(INVALID)
}

/// Get the profile at `idx`.
pub fn get_by_index(idx: usize) -> Profile {
    PROFILES.get(idx).copied().unwrap_or(INVALID)
}

/// Reverse lookup of a profile from a materialized frame size.
///
/// Each catalog shape is sized with the provided `header_size` and the first
/// exact match is returned with that header size applied.
pub fn get_by_frame_size(header_size: usize, size: usize) -> Profile {
    PROFILES[1..]
        .iter()
        .map(|profile| profile.with_header_size(header_size))
        .find(|candidate| size_of(candidate) == size)
        .unwrap_or(INVALID)
}

/// Iterate over all catalog entries except the sentinel.
pub fn iter() -> impl Iterator<Item = &'static Profile> {
    PROFILES[1..].iter()
}
