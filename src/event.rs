//! Events produced by the framing parser.

use crate::block::BlockDescriptor;
use crate::stream::Mark;

/// One event in the framing parser's output sequence.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// Sentinel marking the start of parsing.
    Begin,
    /// The `#ASDF <version>` header line.
    AsdfVersion(String),
    /// The `#ASDF_STANDARD <version>` header line.
    StandardVersion(String),
    /// A `#`-prefixed comment line preceding the `%YAML` directive.
    Comment(String),
    /// The offset of the `%YAML` directive; the tree follows.
    TreeStart { offset: u64 },
    /// The tree has been fully consumed (and, if buffering was requested,
    /// captured). `buffer` holds the raw YAML bytes when buffering is on.
    TreeEnd {
        start: u64,
        end: u64,
        buffer: Option<Vec<u8>>,
    },
    /// A binary block was discovered.
    Block(BlockDescriptor),
    /// Padding bytes between blocks (or between the tree and the first
    /// block) that are not block magic.
    Padding { start: u64, len: u64 },
    /// The trailing `#ASDF BLOCK INDEX` section, if present.
    BlockIndex(Vec<u64>),
    /// Sentinel marking the end of parsing.
    End,
}

/// An event with its source location.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub mark: Mark,
}

impl Event {
    pub fn new(kind: EventKind, mark: Mark) -> Event {
        Event { kind, mark }
    }
}
