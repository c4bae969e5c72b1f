use serde::{Deserialize, Serialize};

/// Snapshot of one remote object, keyed relative to the remote base directory.
///
/// Directory keys always end with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteItem {
    pub key: String,
    /// Milliseconds since the Unix epoch (0 when the server omits it)
    pub last_modified: i64,
    pub size: u64,
    pub etag: Option<String>,
}

impl RemoteItem {
    pub fn is_dir(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// What the server allows for recursive PROPFIND.
///
/// Starts `Unknown` and moves once, on the first successful probe, to one of
/// the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportCapability {
    Unknown,
    InfinitySupported,
    DepthOneOnly,
}

impl TransportCapability {
    pub fn is_resolved(self) -> bool {
        self != TransportCapability::Unknown
    }

    /// Listing must walk the tree one level at a time.
    pub fn needs_manual_recursion(self) -> bool {
        self == TransportCapability::DepthOneOnly
    }
}

/// Value of the WebDAV `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    pub fn header_value(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header_value())
    }
}

/// Half-open byte range `[start, end)` used for ranged GETs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "BlockRange start past end");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `Range` header value; HTTP byte ranges are inclusive on both ends.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }

    /// Number of `block_size` blocks needed to cover `total` bytes.
    pub fn block_count(total: u64, block_size: u64) -> u64 {
        total.div_ceil(block_size.max(1))
    }

    /// Consecutive ranges covering `[0, total)`; only the last may be short.
    pub fn split(total: u64, block_size: u64) -> Vec<BlockRange> {
        let block_size = block_size.max(1);
        (0..Self::block_count(total, block_size))
            .map(|i| {
                let start = i * block_size;
                BlockRange::new(start, (start + block_size).min(total))
            })
            .collect()
    }
}

/// Inclusive plaintext size bracket recovered from a ciphertext size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min_size: u64,
    pub max_size: u64,
}

impl SizeRange {
    pub fn contains(&self, n: u64) -> bool {
        self.min_size <= n && n <= self.max_size
    }
}
