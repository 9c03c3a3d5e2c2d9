/*
unsparse, to decode Android sparse images: block reconstruction module
Copyright (C) 2024-present Guoxin "7Ji" Pu

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as
published by the Free Software Foundation, either version 3 of the
License, or (at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::{fmt::Display, io::{Read, Seek, SeekFrom, Write}};

use serde::Serialize;

use crate::{
    error::DecodeError,
    report::{ChunkEvent, Reporter},
    sha1sum::{Sha1Hasher, Sha1sum},
    sparse::{ChunkHeader, ChunkType, FileHeader, BLOCK_SIZE, SIZE_CHUNK_WORD, SIZE_FILE_HEADER},
    stream::read_full,
};

type DecodeResult<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum Mode {
    Sparse,
    Raw,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            Mode::Sparse => "sparse",
            Mode::Raw => "raw",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Summary {
    pub(crate) mode: Mode,
    pub(crate) chunks: u64,
    /// Final output cursor
    pub(crate) output_size: u64,
    pub(crate) sha1sum: Option<Sha1sum>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DecodeOptions {
    /// Walk the whole input but never touch the sink
    pub(crate) info_only: bool,
    /// SHA1 the materialized bytes
    pub(crate) digest: bool,
}

/// Running state of one decode, owned by the decode loop
struct Session<'a, R: Read, W: Write + Seek> {
    source: R,
    sink: Option<W>,
    info_only: bool,
    /// Output byte offset of the next chunk
    cursor: u64,
    chunks: u64,
    /// One block, reused by every chunk
    block: Box<[u8]>,
    hasher: Option<Sha1Hasher>,
    reporter: &'a mut dyn Reporter,
}

/// Decode `source` into `sink`, falling back to a verbatim copy when the
/// input does not start with a valid sparse header.
///
/// Output written before a failure is left in place.
pub(crate) fn decode<R, W>(
    source: R, sink: Option<W>, options: DecodeOptions,
    reporter: &mut dyn Reporter
) -> DecodeResult<Summary>
where
    R: Read,
    W: Write + Seek,
{
    Session {
        source,
        sink,
        info_only: options.info_only,
        cursor: 0,
        chunks: 0,
        block: vec![0; BLOCK_SIZE].into_boxed_slice(),
        hasher: options.digest.then(Sha1Hasher::default),
        reporter,
    }.run()
}

impl<'a, R: Read, W: Write + Seek> Session<'a, R, W> {
    fn run(mut self) -> DecodeResult<Summary> {
        let mut lookahead = [0; SIZE_FILE_HEADER];
        let seen = read_full(&mut self.source, &mut lookahead)
            .map_err(|source| DecodeError::Read { offset: 0, source })?;
        if seen == SIZE_FILE_HEADER {
            let header = FileHeader::parse(&lookahead);
            if header.is_valid() {
                return self.sparse(header)
            }
            tracing::debug!("Rejected sparse header: {:?}", header);
        } else {
            tracing::debug!("Input ended after {} bytes while reading header", seen);
        }
        self.raw(&lookahead[..seen])
    }

    fn writing(&self) -> bool {
        !self.info_only && self.sink.is_some()
    }

    fn read_error(&self, source: std::io::Error) -> DecodeError {
        DecodeError::Read { offset: self.cursor, source }
    }

    fn seek(&mut self, offset: u64) -> DecodeResult<()> {
        if self.info_only {
            return Ok(())
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.seek(SeekFrom::Start(offset))
                .map_err(|source| DecodeError::Write { offset, source })?;
        }
        Ok(())
    }

    /// Emit the first `len` bytes of the block buffer `count` times, the
    /// sink already sits at output `offset`
    fn emit(&mut self, offset: u64, len: usize, count: u64) -> DecodeResult<()> {
        let data = &self.block[..len];
        let sink = match self.sink.as_mut() {
            Some(sink) if !self.info_only => sink,
            _ => {
                if let Some(hasher) = self.hasher.as_mut() {
                    hasher.update_repeated(data, count)
                }
                self.reporter.progress(len as u64 * count);
                return Ok(())
            }
        };
        for id in 0..count {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(data)
            }
            sink.write_all(data).map_err(|source| DecodeError::Write {
                offset: offset + id * len as u64, source })?;
            self.reporter.progress(len as u64);
        }
        Ok(())
    }

    fn read_word(&mut self) -> DecodeResult<[u8; SIZE_CHUNK_WORD]> {
        let mut word = [0; SIZE_CHUNK_WORD];
        self.source.read_exact(&mut word).map_err(|e| self.read_error(e))?;
        Ok(word)
    }

    fn flush(&mut self) -> DecodeResult<()> {
        if !self.writing() {
            return Ok(())
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.flush().map_err(|source| DecodeError::Write {
                offset: self.cursor, source })?;
        }
        Ok(())
    }

    fn summary(&mut self, mode: Mode) -> Summary {
        Summary {
            mode,
            chunks: self.chunks,
            output_size: self.cursor,
            sha1sum: self.hasher.take().map(Sha1Hasher::finalize),
        }
    }

    fn sparse(mut self, header: FileHeader) -> DecodeResult<Summary> {
        tracing::info!("Sparse image v{}.{}, {} blocks of {} bytes in {} chunks",
            header.major_version, header.minor_version, header.total_blocks,
            header.block_size, header.total_chunks);
        self.reporter.header(&header);
        while let Some(chunk) = ChunkHeader::read_from(&mut self.source)
            .map_err(|e| self.read_error(e))?
        {
            if !chunk.is_valid() {
                return Err(DecodeError::Format {
                    offset: self.cursor, index: self.chunks, chunk })
            }
            let end = self.cursor.checked_add(chunk.output_size())
                .ok_or(DecodeError::CursorOverflow {
                    offset: self.cursor, index: self.chunks, chunk })?;
            self.materialize(&chunk)?;
            self.cursor = end;
            self.chunks += 1;
        }
        self.flush()?;
        if self.chunks != header.total_chunks as u64 {
            tracing::warn!("Header declares {} chunks but {} were decoded",
                header.total_chunks, self.chunks);
        }
        if self.cursor != header.declared_output_size() {
            tracing::warn!("Header declares 0x{:x} output bytes but 0x{:x} were \
                decoded", header.declared_output_size(), self.cursor);
        }
        Ok(self.summary(Mode::Sparse))
    }

    fn materialize(&mut self, chunk: &ChunkHeader) -> DecodeResult<()> {
        let filler = match chunk.chunk_type {
            ChunkType::Fill => {
                let word = self.read_word()?;
                for tile in self.block.chunks_exact_mut(SIZE_CHUNK_WORD) {
                    tile.copy_from_slice(&word)
                }
                Some(u32::from_le_bytes(word))
            }
            _ => None,
        };
        let event = ChunkEvent {
            index: self.chunks,
            offset: self.cursor,
            header: *chunk,
            filler,
        };
        tracing::debug!("Chunk #{} at 0x{:x}: {}", event.index, event.offset, chunk);
        self.reporter.chunk(&event);
        self.seek(self.cursor)?;
        let count = chunk.chunk_size as u64;
        match chunk.chunk_type {
            ChunkType::Raw => for id in 0..count {
                let offset = self.cursor + id * BLOCK_SIZE as u64;
                self.source.read_exact(&mut self.block)
                    .map_err(|source| DecodeError::Read { offset, source })?;
                self.emit(offset, BLOCK_SIZE, 1)?;
            }
            ChunkType::Fill => self.emit(self.cursor, BLOCK_SIZE, count)?,
            ChunkType::DontCare => {
                self.block.fill(0);
                self.emit(self.cursor, BLOCK_SIZE, count)?
            }
            ChunkType::Crc32 => {
                let crc32 = u32::from_le_bytes(self.read_word()?);
                tracing::debug!("Skipping CRC32 checkpoint 0x{:08x}", crc32);
            }
            ChunkType::Unknown(_) => return Err(DecodeError::Format {
                offset: self.cursor, index: self.chunks, chunk: *chunk }),
        }
        Ok(())
    }

    fn raw(mut self, lookahead: &[u8]) -> DecodeResult<Summary> {
        tracing::info!("No valid sparse header, copying input as a raw image");
        self.reporter.raw_fallback(lookahead.len());
        self.seek(0)?;
        self.block[..lookahead.len()].copy_from_slice(lookahead);
        self.emit(0, lookahead.len(), 1)?;
        self.cursor += lookahead.len() as u64;
        loop {
            let size = read_full(&mut self.source, &mut self.block)
                .map_err(|e| self.read_error(e))?;
            if size == 0 {
                break
            }
            self.emit(self.cursor, size, 1)?;
            self.cursor += size as u64;
        }
        self.flush()?;
        Ok(self.summary(Mode::Raw))
    }
}
