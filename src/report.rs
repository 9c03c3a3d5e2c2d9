/*
unsparse, to decode Android sparse images: reporting module
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

use std::io::Write;

use cli_table::{format::Justify, Cell, CellStruct, Style, Table};
use serde::Serialize;

use crate::{decode::Summary, pretty::size_string, sparse::{ChunkHeader, ChunkType, FileHeader, BLOCK_SIZE}, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ChunkEvent {
    pub(crate) index: u64,
    /// Output byte offset the chunk starts at
    pub(crate) offset: u64,
    pub(crate) header: ChunkHeader,
    pub(crate) filler: Option<u32>,
}

/// Observer of a decode session. Purely informational: nothing a reporter
/// does changes what gets decoded.
pub(crate) trait Reporter {
    fn header(&mut self, _header: &FileHeader) {}

    fn chunk(&mut self, _event: &ChunkEvent) {}

    /// The input had no valid sparse header, `replayed` bytes are copied first
    fn raw_fallback(&mut self, _replayed: usize) {}

    /// `bytes` more output bytes were materialized
    fn progress(&mut self, _bytes: u64) {}

    /// Called once at the end, `summary` is `None` when decoding failed
    fn finish(&mut self, _summary: Option<&Summary>) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct Silent;

impl Reporter for Silent {}

impl Reporter for Vec<Box<dyn Reporter>> {
    fn header(&mut self, header: &FileHeader) {
        self.iter_mut().for_each(|reporter|reporter.header(header))
    }

    fn chunk(&mut self, event: &ChunkEvent) {
        self.iter_mut().for_each(|reporter|reporter.chunk(event))
    }

    fn raw_fallback(&mut self, replayed: usize) {
        self.iter_mut().for_each(|reporter|reporter.raw_fallback(replayed))
    }

    fn progress(&mut self, bytes: u64) {
        self.iter_mut().for_each(|reporter|reporter.progress(bytes))
    }

    fn finish(&mut self, summary: Option<&Summary>) -> Result<()> {
        for reporter in self.iter_mut() {
            reporter.finish(summary)?
        }
        Ok(())
    }
}

macro_rules! cell_right {
    ($raw: expr) => {
        $raw.cell().justify(Justify::Right)
    };
}

macro_rules! cell_bold_center {
    ($raw: expr) => {
        $raw.cell().bold(true).justify(Justify::Center)
    };
}

/// Human-readable tables, printed the moment the header is seen and when
/// decoding ends
pub(crate) struct TableReport<W: Write> {
    out: W,
    rows: Vec<[CellStruct; 7]>,
    /// A sparse header was seen, so a chunk table is due
    sparse: bool,
}

impl<W: Write> TableReport<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out, rows: Vec::new(), sparse: false }
    }

    fn print_header(&mut self, header: &FileHeader) -> Result<()> {
        let rows = vec![
            ["Magic".cell(), cell_right!(format!("0x{:08X}", header.magic))],
            ["Major Version".cell(), cell_right!(header.major_version)],
            ["Minor Version".cell(), cell_right!(header.minor_version)],
            ["Header Size".cell(), cell_right!(header.file_header_size)],
            ["Chunk Header Size".cell(), cell_right!(header.chunk_header_size)],
            ["Block Size".cell(), cell_right!(header.block_size)],
            ["Total Blocks".cell(), cell_right!(header.total_blocks)],
            ["Total Chunks".cell(), cell_right!(header.total_chunks)],
            ["Checksum".cell(), cell_right!(format!("0x{:08X}", header.image_checksum))],
        ];
        let table = rows.table().title([
            cell_bold_center!("field"),
            cell_bold_center!("value"),
        ]).bold(true);
        writeln!(self.out, "Sparse image header:")?;
        writeln!(self.out, "{}", table.display()?)?;
        Ok(())
    }

    fn print_chunks(&mut self) -> Result<()> {
        let rows = std::mem::take(&mut self.rows);
        let table = rows.table().title([
            cell_bold_center!("#"),
            cell_bold_center!("block"),
            cell_bold_center!("type"),
            cell_bold_center!("reserved"),
            cell_bold_center!("blocks"),
            cell_bold_center!("total size"),
            cell_bold_center!("filler"),
        ]).bold(true);
        writeln!(self.out, "Chunks:")?;
        writeln!(self.out, "{}", table.display()?)?;
        Ok(())
    }

    fn print_summary(&mut self, summary: &Summary) -> Result<()> {
        let mut rows = vec![
            ["Mode".cell(), cell_right!(summary.mode)],
            ["Chunks".cell(), cell_right!(summary.chunks)],
            ["Output".cell(), cell_right!(format!("0x{:x} bytes ({})",
                summary.output_size, size_string(summary.output_size)))],
        ];
        if let Some(sha1sum) = &summary.sha1sum {
            rows.push(["SHA1".cell(), cell_right!(sha1sum)])
        }
        writeln!(self.out, "{}", rows.table().display()?)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TableReport<W> {
    fn header(&mut self, header: &FileHeader) {
        self.sparse = true;
        if let Err(e) = self.print_header(header) {
            tracing::warn!("Failed to print sparse header: {}", e)
        }
    }

    fn chunk(&mut self, event: &ChunkEvent) {
        let header = &event.header;
        let filler = match (header.chunk_type, event.filler) {
            (ChunkType::Fill, Some(filler)) => format!("0x{:08X}", filler),
            _ => String::new(),
        };
        self.rows.push([
            cell_right!(event.index),
            cell_right!(format!("+{:08}", event.offset / BLOCK_SIZE as u64)),
            cell_right!(header.chunk_type),
            cell_right!(format!("0x{:04X}", header.reserved)),
            cell_right!(header.chunk_size),
            cell_right!(header.total_size),
            cell_right!(filler),
        ]);
    }

    fn raw_fallback(&mut self, replayed: usize) {
        if let Err(e) = writeln!(self.out,
            "No valid sparse header found in the first {} bytes, \
            treating input as a raw image", replayed)
        {
            tracing::warn!("Failed to print raw fallback notice: {}", e)
        }
    }

    fn finish(&mut self, summary: Option<&Summary>) -> Result<()> {
        if self.sparse {
            self.print_chunks()?
        }
        if let Some(summary) = summary {
            self.print_summary(summary)?
        }
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Default, Serialize)]
struct Document {
    header: Option<FileHeader>,
    raw_fallback: Option<usize>,
    chunks: Vec<ChunkEvent>,
    summary: Option<Summary>,
}

/// Machine-readable structure dump, written as one YAML document at the end
pub(crate) struct YamlReport<W: Write> {
    out: W,
    document: Document,
}

impl<W: Write> YamlReport<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out, document: Document::default() }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for YamlReport<W> {
    fn header(&mut self, header: &FileHeader) {
        self.document.header = Some(*header)
    }

    fn chunk(&mut self, event: &ChunkEvent) {
        self.document.chunks.push(*event)
    }

    fn raw_fallback(&mut self, replayed: usize) {
        self.document.raw_fallback = Some(replayed)
    }

    fn finish(&mut self, summary: Option<&Summary>) -> Result<()> {
        self.document.summary = summary.cloned();
        serde_yaml::to_writer(&mut self.out, &self.document)?;
        self.out.flush()?;
        Ok(())
    }
}
