// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed record envelope over a byte stream.
//!
//! Each record is a u32 payload size followed by one encoded object graph.
//! The size is written as a placeholder and backpatched after encoding, so
//! graphs stream out without a sizing pre-pass. Records concatenate; a
//! reader consumes them in order and can peek or skip without decoding.

use std::any::Any;
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::rtti::{InstanceId, InstancePool, TypeRegistry};
use crate::ser::{BinaryDecoder, BinaryEncoder, DecodeOptions, EncodeOptions};
use crate::stream::{ByteStream, FileStream};

pub struct EnvelopeWriter {
    stream: Box<dyn ByteStream + Send>,
}

impl EnvelopeWriter {
    /// Creates (or truncates) the file at `path`, missing directories
    /// included.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self::new(FileStream::create(path)?))
    }

    /// Writer over an arbitrary stream, appending at its current position.
    pub fn new<S: ByteStream + Send + 'static>(stream: S) -> Self {
        Self {
            stream: Box::new(stream),
        }
    }

    /// Appends one record, returning its total size (prefix included).
    pub fn write(
        &mut self,
        registry: &TypeRegistry,
        pool: &InstancePool,
        root: InstanceId,
        options: &EncodeOptions<'_>,
    ) -> Result<u64> {
        let prefix_pos = self.stream.tell()?;
        self.stream.write_u32::<LittleEndian>(0)?;

        let mut encoder = BinaryEncoder::new(registry);
        let payload = encoder.encode(pool, root, self.stream.as_mut(), options)?;
        let size = u32::try_from(payload).map_err(|_| Error::SizeLimit(payload))?;

        let end = self.stream.tell()?;
        self.stream.seek(SeekFrom::Start(prefix_pos))?;
        self.stream.write_u32::<LittleEndian>(size)?;
        self.stream.seek(SeekFrom::Start(end))?;
        self.stream.flush()?;
        Ok(payload + 4)
    }

    pub fn into_stream(self) -> Box<dyn ByteStream + Send> {
        self.stream
    }
}

pub struct EnvelopeReader<'r> {
    registry: &'r TypeRegistry,
    stream: Box<dyn ByteStream + Send>,
}

impl<'r> EnvelopeReader<'r> {
    pub fn open<P: AsRef<Path>>(registry: &'r TypeRegistry, path: P) -> Result<Self> {
        Ok(Self::new(registry, FileStream::open(path)?))
    }

    pub fn new<S: ByteStream + Send + 'static>(registry: &'r TypeRegistry, stream: S) -> Self {
        Self {
            registry,
            stream: Box::new(stream),
        }
    }

    /// Decodes the next record, or `None` at end of stream.
    pub fn read(
        &mut self,
        context: Option<&dyn Any>,
    ) -> Result<Option<(InstancePool, InstanceId)>> {
        let options = DecodeOptions {
            context,
            blocks: None,
        };
        self.read_with(&options)
    }

    /// Decodes the next record with full decode options.
    pub fn read_with(
        &mut self,
        options: &DecodeOptions<'_>,
    ) -> Result<Option<(InstancePool, InstanceId)>> {
        let Some(size) = self.next_size()? else {
            return Ok(None);
        };
        let decoder = BinaryDecoder::new(self.registry);
        let decoded = decoder.decode(self.stream.as_mut(), size, options)?;
        Ok(Some(decoded))
    }

    /// Payload size of the next record without consuming it.
    pub fn peek_size(&mut self) -> Result<Option<u32>> {
        let Some(size) = self.next_size()? else {
            return Ok(None);
        };
        self.stream.seek(SeekFrom::Current(-4))?;
        Ok(Some(size))
    }

    /// Skips one record; `false` at end of stream.
    pub fn skip(&mut self) -> Result<bool> {
        let Some(size) = self.next_size()? else {
            return Ok(false);
        };
        self.stream.seek(SeekFrom::Current(i64::from(size)))?;
        Ok(true)
    }

    fn next_size(&mut self) -> Result<Option<u32>> {
        if self.stream.is_eof()? {
            return Ok(None);
        }
        match self.stream.read_u32::<LittleEndian>() {
            Ok(size) => Ok(Some(size)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::Truncated {
                what: "record size prefix",
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_reflectable;
    use crate::rtti::{FieldDescriptor, Reflectable, TypeDescriptorBuilder};
    use crate::stream::MemoryStream;

    #[derive(Default)]
    struct Note {
        text: String,
        stars: u32,
    }

    impl_reflectable!(Note, 970);

    fn registry_with_note() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry
            .register(
                TypeDescriptorBuilder::new(970, "Note", || Box::new(Note::default()))
                    .field(FieldDescriptor::plain::<Note, String, _, _>(
                        0,
                        "text",
                        |n| &n.text,
                        |n, v| n.text = v,
                    ))
                    .field(FieldDescriptor::plain::<Note, u32, _, _>(
                        1,
                        "stars",
                        |n| &n.stars,
                        |n, v| n.stars = v,
                    ))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    fn note_pool(text: &str, stars: u32) -> (InstancePool, InstanceId) {
        let mut pool = InstancePool::new();
        let id = pool.insert(Box::new(Note {
            text: text.to_owned(),
            stars,
        }));
        (pool, id)
    }

    #[test]
    fn file_records_read_back_in_order() {
        let registry = registry_with_note();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notes.bin");

        let mut writer = EnvelopeWriter::create(&path).unwrap();
        for (text, stars) in [("alpha", 1), ("beta", 2), ("gamma", 3)] {
            let (pool, id) = note_pool(text, stars);
            writer
                .write(&registry, &pool, id, &EncodeOptions::default())
                .unwrap();
        }
        drop(writer);

        let mut reader = EnvelopeReader::open(&registry, &path).unwrap();
        for (text, stars) in [("alpha", 1u32), ("beta", 2), ("gamma", 3)] {
            let (pool, root) = reader.read(None).unwrap().unwrap();
            let note = pool.get_as::<Note>(root).unwrap();
            assert_eq!(note.text, text);
            assert_eq!(note.stars, stars);
        }
        assert!(reader.read(None).unwrap().is_none());
    }

    #[test]
    fn peek_does_not_consume_and_skip_advances() {
        let registry = registry_with_note();
        let mut stream = MemoryStream::new();
        {
            let mut writer = EnvelopeWriter::new(MemoryStream::new());
            for text in ["one", "two"] {
                let (pool, id) = note_pool(text, 0);
                writer
                    .write(&registry, &pool, id, &EncodeOptions::default())
                    .unwrap();
            }
            let mut done = writer.into_stream();
            done.seek(SeekFrom::Start(0)).unwrap();
            std::io::copy(&mut done, &mut stream).unwrap();
        }
        stream.seek(SeekFrom::Start(0)).unwrap();

        let mut reader = EnvelopeReader::new(&registry, stream);
        let size = reader.peek_size().unwrap().unwrap();
        assert!(size > 0);

        // Peek left the record in place; read consumes exactly it.
        let (pool, root) = reader.read(None).unwrap().unwrap();
        assert_eq!(pool.get_as::<Note>(root).unwrap().text, "one");

        assert!(reader.skip().unwrap());
        assert!(reader.peek_size().unwrap().is_none());
        assert!(!reader.skip().unwrap());
    }

    #[test]
    fn trailing_size_fragment_is_corrupt_data() {
        let registry = registry_with_note();
        let stream = MemoryStream::from_vec(vec![0x02, 0x00]);
        let mut reader = EnvelopeReader::new(&registry, stream);
        let err = reader.read(None).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
        assert!(err.is_corrupt_data());
    }

    #[test]
    fn record_size_matches_payload() {
        let registry = registry_with_note();
        let (pool, id) = note_pool("tick", 4);

        let mut writer = EnvelopeWriter::new(MemoryStream::new());
        let total = writer
            .write(&registry, &pool, id, &EncodeOptions::default())
            .unwrap();

        let mut stream = writer.into_stream();
        assert_eq!(stream.size().unwrap(), total);
        stream.seek(SeekFrom::Start(0)).unwrap();
        let prefix = stream.read_u32::<LittleEndian>().unwrap();
        assert_eq!(u64::from(prefix) + 4, total);
    }
}
