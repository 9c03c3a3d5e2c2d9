/*
unsparse, to decode Android sparse images: stream helpers module
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

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

/// Fill `buffer` as far as the source allows, retrying short reads.
///
/// Returns the number of bytes read, less than `buffer.len()` only at end of
/// stream.
pub(crate) fn read_full<R: Read + ?Sized>(source: &mut R, buffer: &mut [u8])
    -> std::io::Result<usize>
{
    let mut size = 0;
    while size < buffer.len() {
        match source.read(&mut buffer[size..]) {
            Ok(0) => break,
            Ok(count) => size += count,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(size)
}

/// Forward-only seekable adapter over a plain writer (e.g. stdout).
///
/// Seeking forward pads with zeros, seeking backward is unsupported.
pub(crate) struct Sequential<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> Sequential<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for Sequential<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.position += size as u64;
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Seek for Sequential<W> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(_) => None,
        };
        let target = match target {
            Some(target) if target >= self.position => target,
            _ => return Err(std::io::Error::new(ErrorKind::Unsupported,
                format!("cannot seek backwards or from end on a sequential \
                    stream at offset {}", self.position))),
        };
        const ZEROS: [u8; 0x1000] = [0; 0x1000];
        while self.position < target {
            let size = (target - self.position).min(ZEROS.len() as u64);
            self.write_all(&ZEROS[..size as usize])?;
        }
        Ok(self.position)
    }

    fn stream_position(&mut self) -> std::io::Result<u64> {
        Ok(self.position)
    }
}
