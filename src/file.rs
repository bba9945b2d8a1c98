//! The public entry point: composes the stream, framing parser, block
//! catalog, tree document, and typed value layer into one facade.

use std::cell::{OnceCell, RefCell};
use std::fs::File as StdFile;
use std::path::Path;
use std::rc::Rc;

use libyaml_safer::Document;

use crate::block::BlockDescriptor;
use crate::block_handle::BlockHandle;
use crate::catalog::BlockCatalog;
use crate::compression::Decompressor;
use crate::context::Context;
use crate::error::AsdfError;
use crate::event::EventKind;
use crate::framing::{FramingParser, ParserOptions};
use crate::log::LogLevel;
use crate::ndarray::NdarrayMetadata;
use crate::stream::{FileStream, MemoryStream};
use crate::tile;
use crate::value::Value;
use crate::yaml_adapter::{self, NodeRef};

enum Source {
    File(StdFile),
    Memory(Rc<[u8]>),
}

/// An open ASDF file.
///
/// Parsing is lazy and incremental: opening a file only recognizes the
/// two header lines. The tree is materialized on first access to [`Self::tree`];
/// blocks are discovered on demand by [`Self::block_count`] and
/// [`Self::block_open`], which drive the framing parser exactly as far as
/// they need to.
pub struct File {
    ctx: Context,
    source: Source,
    parser: RefCell<Option<FramingParser>>,
    catalog: RefCell<BlockCatalog>,
    tree: OnceCell<Document>,
    block_index: RefCell<Option<Vec<u64>>>,
}

impl File {
    fn new(stream: Box<dyn crate::stream::Stream>, source: Source) -> File {
        let ctx = Context::new();
        let parser = FramingParser::new(stream, ParserOptions::BUFFER_TREE);
        File {
            ctx,
            source,
            parser: RefCell::new(Some(parser)),
            catalog: RefCell::new(BlockCatalog::new()),
            tree: OnceCell::new(),
            block_index: RefCell::new(None),
        }
    }

    /// Open an ASDF file from the filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<File, AsdfError> {
        let path = path.as_ref();
        let std_file = StdFile::open(path).map_err(|e| {
            AsdfError::Stream(crate::error::StreamError::Io { offset: 0, source: e })
        })?;
        let clone = std_file.try_clone().map_err(|e| {
            AsdfError::Stream(crate::error::StreamError::Io { offset: 0, source: e })
        })?;
        let stream = Box::new(FileStream::new(clone));
        Ok(File::new(stream, Source::File(std_file)))
    }

    /// Open an ASDF file already held in memory.
    pub fn open_memory(bytes: Vec<u8>) -> File {
        let shared: Rc<[u8]> = Rc::from(bytes.clone().into_boxed_slice());
        let stream = Box::new(MemoryStream::new(bytes));
        File::new(stream, Source::Memory(shared))
    }

    /// The most recent error recorded on this file, if any.
    pub fn last_error(&self) -> Option<String> {
        self.ctx.last_error()
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.ctx.set_log_level(level);
    }

    /// Drive the framing parser one step. Returns `false` once `End` has
    /// been reached (including after an error has latched).
    fn advance(&self) -> Result<bool, AsdfError> {
        let mut guard = self.parser.borrow_mut();
        let Some(parser) = guard.as_mut() else {
            return Ok(false);
        };
        let event = parser.next_event(&self.ctx)?;
        match event.kind {
            EventKind::TreeEnd { buffer: Some(bytes), .. } => {
                if self.tree.get().is_none() {
                    match yaml_adapter::parse_from_bytes(&bytes) {
                        Ok(doc) => {
                            let _ = self.tree.set(doc);
                        }
                        Err(e) => {
                            self.ctx.set_error(&e);
                            return Err(e.into());
                        }
                    }
                }
                Ok(true)
            }
            EventKind::Block(descriptor) => {
                self.catalog.borrow_mut().push(descriptor);
                Ok(true)
            }
            EventKind::BlockIndex(offsets) => {
                *self.block_index.borrow_mut() = Some(offsets);
                Ok(true)
            }
            EventKind::End => {
                *guard = None;
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    fn drive_until(&self, mut done: impl FnMut(&Self) -> bool) -> Result<(), AsdfError> {
        while !done(self) {
            if !self.advance()? {
                break;
            }
        }
        Ok(())
    }

    /// The root of the parsed tree, driving the parser to completion of
    /// the YAML region if it hasn't been reached yet.
    pub fn tree(&self) -> Result<Value<'_>, AsdfError> {
        self.drive_until(|f| f.tree.get().is_some())?;
        let doc = self.tree.get().ok_or_else(|| AsdfError::Other("file has no tree".to_string()))?;
        let root = NodeRef::root(doc).ok_or_else(|| AsdfError::Other("tree is empty".to_string()))?;
        Ok(Value::new(root))
    }

    /// The number of blocks discovered so far, driving the parser to
    /// completion if necessary (the advisory block index, when present,
    /// is not consulted to short-circuit this).
    pub fn block_count(&self) -> Result<usize, AsdfError> {
        self.drive_until(|f| f.parser.borrow().is_none())?;
        Ok(self.catalog.borrow().len())
    }

    fn descriptor(&self, index: usize) -> Result<BlockDescriptor, AsdfError> {
        self.drive_until(|f| f.catalog.borrow().len() > index || f.parser.borrow().is_none())?;
        self.catalog
            .borrow()
            .get(index)
            .cloned()
            .ok_or(AsdfError::NoSuchBlock(index))
    }

    /// Open a handle onto block `index`, driving the parser further if it
    /// hasn't been discovered yet.
    pub fn block_open(&self, index: usize) -> Result<BlockHandle, AsdfError> {
        let descriptor = self.descriptor(index)?;
        match &self.source {
            Source::File(f) => BlockHandle::from_file(f, descriptor),
            Source::Memory(bytes) => Ok(BlockHandle::from_bytes(descriptor, bytes.clone())),
        }
    }

    /// Parse `core/ndarray` metadata out of `value` (which must be a
    /// tagged mapping matching that schema).
    pub fn ndarray_metadata(&self, value: &Value<'_>) -> Result<NdarrayMetadata, AsdfError> {
        crate::ndarray::parse(value, &self.ctx)
    }

    /// Read a tile out of the block referenced by `meta.source`,
    /// converting it to `dst_type`.
    pub fn read_tile(
        &self,
        meta: &NdarrayMetadata,
        origin: &[u64],
        shape: &[u64],
        dst_type: crate::ndarray::ScalarType,
    ) -> Result<(Vec<u8>, bool), AsdfError> {
        let handle = self.block_open(meta.source as usize)?;
        if handle.descriptor().header.compression_name().is_some() {
            return Err(AsdfError::Other(
                "block is compressed; decompress via a Decompressor before reading tiles".to_string(),
            ));
        }
        tile::read_tile(meta, handle.data(), origin, shape, dst_type)
    }

    /// Read a tile out of a block that may be compressed, using
    /// `decompressor` to inflate it first. The decompressed bytes are not
    /// cached; repeated tile reads against the same compressed block each
    /// pay the decompression cost again.
    pub fn read_tile_compressed(
        &self,
        meta: &NdarrayMetadata,
        origin: &[u64],
        shape: &[u64],
        dst_type: crate::ndarray::ScalarType,
        decompressor: &dyn Decompressor,
    ) -> Result<(Vec<u8>, bool), AsdfError> {
        let handle = self.block_open(meta.source as usize)?;
        let header = &handle.descriptor().header;
        let bytes = match header.compression_name() {
            Some(name) => decompressor.decompress(name, handle.data(), header.data_size as usize)?,
            None => handle.data().to_vec(),
        };
        tile::read_tile(meta, &bytes, origin, shape, dst_type)
    }

    /// Close the file. Safe to call on a file that errored partway
    /// through parsing; subsequent calls are no-ops.
    pub fn close(&self) {
        *self.parser.borrow_mut() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_HEADER_MIN_SIZE;
    use crate::ndarray::ScalarType;

    fn basic_asdf() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n%YAML 1.1\n---\nasdf_library:\n  name: asdf\n...\n");
        let payload: Vec<u8> = (0u8..16).collect();
        buf.extend_from_slice(&crate::block::BLOCK_MAGIC);
        buf.extend_from_slice(&BLOCK_HEADER_MIN_SIZE.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(b"\0\0\0\0");
        buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn reads_tree_and_blocks() {
        let file = File::open_memory(basic_asdf());
        let tree = file.tree().unwrap();
        let name = tree.path("/asdf_library/name").unwrap().as_str().unwrap();
        assert_eq!(name, "asdf");
        assert_eq!(file.block_count().unwrap(), 1);
        let handle = file.block_open(0).unwrap();
        assert_eq!(handle.data(), &(0u8..16).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn tile_read_through_facade() {
        let mut data = basic_asdf();
        let _ = &mut data;
        let file = File::open_memory(basic_asdf());
        let meta = NdarrayMetadata {
            source: 0,
            shape: vec![16],
            datatype: ScalarType::UInt8,
            byteorder: crate::ndarray::ByteOrder::Little,
            offset: 0,
            strides: None,
        };
        let (out, overflow) = file.read_tile(&meta, &[0], &[16], ScalarType::UInt8).unwrap();
        assert!(!overflow);
        assert_eq!(out, (0u8..16).collect::<Vec<u8>>());
    }
}
