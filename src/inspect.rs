/*
unsparse, to decode Android sparse images: structure inspection module
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

use std::io::{Read, Seek, SeekFrom};

use crate::{
    decode::{Mode, Summary},
    error::DecodeError,
    report::{ChunkEvent, Reporter},
    sparse::{ChunkHeader, ChunkType, FileHeader, SIZE_CHUNK_WORD, SIZE_FILE_HEADER},
    stream::read_full,
};

/// List the chunks of a seekable sparse image without materializing it,
/// seeking over payloads instead of reading them.
///
/// Input without a valid sparse header is reported as a raw image as large
/// as the whole input.
pub(crate) fn inspect<R: Read + Seek>(mut source: R, reporter: &mut dyn Reporter)
    -> Result<Summary, DecodeError>
{
    let mut offset = 0;
    let mut buffer = [0; SIZE_FILE_HEADER];
    let size = read_full(&mut source, &mut buffer)
        .map_err(|source| DecodeError::Read { offset, source })?;
    let header = FileHeader::parse(&buffer);
    if size != SIZE_FILE_HEADER || !header.is_valid() {
        reporter.raw_fallback(size);
        let output_size = source.seek(SeekFrom::End(0))
            .map_err(|source| DecodeError::Read { offset, source })?;
        return Ok(Summary {
            mode: Mode::Raw,
            chunks: 0,
            output_size,
            sha1sum: None,
        })
    }
    reporter.header(&header);
    let mut index = 0;
    while let Some(chunk) = ChunkHeader::read_from(&mut source)
        .map_err(|source| DecodeError::Read { offset, source })?
    {
        if !chunk.is_valid() {
            return Err(DecodeError::Format { offset, index, chunk })
        }
        let end = offset.checked_add(chunk.output_size())
            .ok_or(DecodeError::CursorOverflow { offset, index, chunk })?;
        let filler = match chunk.chunk_type {
            ChunkType::Fill => {
                let mut word = [0; SIZE_CHUNK_WORD];
                source.read_exact(&mut word)
                    .map_err(|source| DecodeError::Read { offset, source })?;
                Some(u32::from_le_bytes(word))
            },
            _ => {
                let skip = chunk.payload_size() as i64;
                if skip > 0 {
                    source.seek(SeekFrom::Current(skip))
                        .map_err(|source| DecodeError::Read { offset, source })?;
                }
                None
            }
        };
        reporter.chunk(&ChunkEvent { index, offset, header: chunk, filler });
        offset = end;
        index += 1;
    }
    Ok(Summary {
        mode: Mode::Sparse,
        chunks: index,
        output_size: offset,
        sha1sum: None,
    })
}
