//! A reader for ASDF (Advanced Scientific Data Format) files: a YAML
//! metadata tree followed by zero or more appended binary blocks holding
//! N-dimensional array payloads.
//!
//! The entry point is [`File`]. Opening a file only recognizes the two
//! header lines; the tree and the block catalog are built lazily as
//! [`File::tree`], [`File::block_count`], and [`File::block_open`] are
//! called.
//!
//! ```no_run
//! # fn main() -> Result<(), asdf_rs::AsdfError> {
//! let file = asdf_rs::File::open("observation.asdf")?;
//! let tree = file.tree()?;
//! let name = tree.path("/asdf_library/name")?.as_str()?;
//! println!("written by {name}");
//! # Ok(())
//! # }
//! ```

mod block;
mod block_handle;
mod catalog;
mod compression;
mod context;
mod error;
mod event;
mod extension;
mod file;
mod framing;
mod log;
mod ndarray;
mod stream;
mod tile;
mod value;
mod yaml_adapter;

pub use block::{BlockDescriptor, BlockFlags, BlockHeader, BLOCK_HEADER_MIN_SIZE};
pub use block_handle::BlockHandle;
pub use compression::{CodecTable, Decompressor};
pub use context::Context;
pub use error::{AsdfError, FramingError, Result, StreamError, ValueError};
pub use event::{Event, EventKind};
pub use extension::{registry, Registry, SoftwareInfo};
pub use file::File;
pub use framing::ParserOptions;
pub use log::{LogLevel, LogSink};
pub use ndarray::{ByteOrder, NdarrayMetadata, ScalarType};
pub use stream::{FileStream, MemoryStream, Stream};
pub use tile::NumericType;
pub use value::{ContainerItem, ContainerIter, FindItem, MappingIter, NodeKind, ScalarKind, SequenceIter, TraversalOrder, Value};
