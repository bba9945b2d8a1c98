//! Open views over a single block's payload bytes.

use std::fs::File as StdFile;
use std::rc::Rc;

use memmap2::Mmap;

use crate::block::BlockDescriptor;
use crate::error::{AsdfError, StreamError};

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// A view over one block's bytes, mapped into memory where possible.
///
/// Borrows the file descriptor (or an owned copy of the bytes, for
/// memory-backed files) for as long as the handle is alive; dropping it
/// releases the mapping.
pub struct BlockHandle {
    descriptor: BlockDescriptor,
    backing: Backing,
}

impl BlockHandle {
    /// Build a handle by mapping `used_size` bytes starting at
    /// `descriptor.data_pos` out of `file`.
    pub fn from_file(file: &StdFile, descriptor: BlockDescriptor) -> Result<BlockHandle, AsdfError> {
        let mapping = unsafe {
            memmap2::MmapOptions::new()
                .offset(descriptor.data_pos)
                .len(descriptor.header.used_size as usize)
                .map(file)
        };
        match mapping {
            Ok(mmap) => Ok(BlockHandle {
                descriptor,
                backing: Backing::Mapped(mmap),
            }),
            Err(_) => {
                // Fall back to a heap copy (e.g. the file isn't
                // mmap-capable on this platform/filesystem).
                use std::io::{Read, Seek, SeekFrom};
                let mut file = file.try_clone().map_err(|e| {
                    AsdfError::Stream(StreamError::Io {
                        offset: descriptor.data_pos,
                        source: e,
                    })
                })?;
                file.seek(SeekFrom::Start(descriptor.data_pos))
                    .map_err(|e| AsdfError::Stream(StreamError::Io { offset: descriptor.data_pos, source: e }))?;
                let mut buf = vec![0u8; descriptor.header.used_size as usize];
                file.read_exact(&mut buf)
                    .map_err(|e| AsdfError::Stream(StreamError::Io { offset: descriptor.data_pos, source: e }))?;
                Ok(BlockHandle {
                    descriptor,
                    backing: Backing::Owned(buf),
                })
            }
        }
    }

    /// Build a handle directly over bytes already held in memory.
    pub fn from_bytes(descriptor: BlockDescriptor, bytes: Rc<[u8]>) -> BlockHandle {
        let start = descriptor.data_pos as usize;
        let end = start + descriptor.header.used_size as usize;
        BlockHandle {
            descriptor,
            backing: Backing::Owned(bytes[start..end].to_vec()),
        }
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        &self.descriptor
    }

    /// The block's (possibly compressed) payload bytes.
    pub fn data(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(m) => &m[..],
            Backing::Owned(v) => &v[..],
        }
    }
}
