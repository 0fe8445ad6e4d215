// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Seekable byte-stream abstraction used by the codec, the file envelope and
//! external-block locators.
//!
//! `ByteStream` narrows the std io traits to the surface the codec needs and
//! adds position/size queries. `MemoryStream` backs tests and in-memory
//! round trips; `FileStream` backs the file envelope. Shared handles
//! (`StreamRef`) let several external-block locators point into one stream.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

/// Random-access byte stream.
pub trait ByteStream: Read + Write + Seek {
    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn size(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    fn is_eof(&mut self) -> io::Result<bool> {
        Ok(self.tell()? >= self.size()?)
    }
}

/// Shared, lockable handle to a stream, used by external-block locators.
pub type StreamRef = Arc<Mutex<dyn ByteStream + Send>>;

/// Wraps a stream into a shared [`StreamRef`] handle.
pub fn share<S: ByteStream + Send + 'static>(stream: S) -> StreamRef {
    Arc::new(Mutex::new(stream))
}

/// Growable in-memory stream.
#[derive(Debug, Default)]
pub struct MemoryStream {
    inner: Cursor<Vec<u8>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing bytes; the cursor starts at offset zero.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.get_ref()
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl ByteStream for MemoryStream {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.inner.get_ref().len() as u64)
    }
}

/// File-backed stream opened read-only or read-write.
#[derive(Debug)]
pub struct FileStream {
    file: File,
}

impl FileStream {
    /// Opens an existing file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    /// Creates (or truncates) a file for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self {
            file: OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        })
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ByteStream for FileStream {}
