// Logic to interact with Android Sparse Image
// # Android sparse img format
// # From https://android.googlesource.com/\
// # platform/system/core/+/master/libsparse/sparse_format.h
// 0		lelong	0xed26ff3a		Android sparse image
// >4		leshort	x			\b, version: %d
// >6		leshort	x			\b.%d
// >16		lelong	x			\b, Total of %d
// >12		lelong	x			\b %d-byte output blocks in
// >20		lelong	x			\b %d input chunks.

use std::{fmt::Display, io::Read};

use serde::Serialize;

use crate::stream::read_full;

pub(crate) const MAGIC: u32 = 0xed26ff3a;
pub(crate) const MAJOR_VERSION: u16 = 1;
/// The only block size accepted, every chunk size is a multiple of it
pub(crate) const BLOCK_SIZE: usize = 4096;

const CHUNK_TYPE_RAW: u16 = 0xcac1;
const CHUNK_TYPE_FILL: u16 = 0xcac2;
const CHUNK_TYPE_DONT_CARE: u16 = 0xcac3;
const CHUNK_TYPE_CRC32: u16 = 0xcac4;

/// Fill pattern and CRC32 payloads are both one little-endian u32
pub(crate) const SIZE_CHUNK_WORD: usize = 4;

crate::le_record! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
    pub(crate) struct FileHeader {
        magic: u32,
        major_version: u16,
        /// Not checked, newer minor versions stay readable
        minor_version: u16,
        file_header_size: u16,
        chunk_header_size: u16,
        block_size: u32,
        /// Advisory only
        total_blocks: u32,
        /// Advisory only, never bounds the chunk loop
        total_chunks: u32,
        /// Recorded but never verified
        image_checksum: u32,
    }
}

crate::le_record! {
    #[derive(Debug, Clone, Copy)]
    struct RawChunkHeader {
        chunk_type: u16,
        reserved: u16,
        chunk_size: u32,
        total_size: u32,
    }
}

pub(crate) const SIZE_FILE_HEADER: usize = FileHeader::SIZE;
pub(crate) const SIZE_CHUNK_HEADER: usize = RawChunkHeader::SIZE;

impl FileHeader {
    pub(crate) fn parse(bytes: &[u8; SIZE_FILE_HEADER]) -> Self {
        Self::from_le_bytes(bytes)
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.magic == MAGIC &&
            self.major_version == MAJOR_VERSION &&
            self.block_size as usize == BLOCK_SIZE &&
            self.file_header_size as usize == SIZE_FILE_HEADER &&
            self.chunk_header_size as usize == SIZE_CHUNK_HEADER
    }

    /// Output size the header claims, only used for progress and warnings
    pub(crate) fn declared_output_size(&self) -> u64 {
        self.total_blocks as u64 * self.block_size as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum ChunkType {
    Raw,
    Fill,
    DontCare,
    Crc32,
    Unknown(u16),
}

impl From<u16> for ChunkType {
    fn from(value: u16) -> Self {
        match value {
            CHUNK_TYPE_RAW => Self::Raw,
            CHUNK_TYPE_FILL => Self::Fill,
            CHUNK_TYPE_DONT_CARE => Self::DontCare,
            CHUNK_TYPE_CRC32 => Self::Crc32,
            _ => Self::Unknown(value),
        }
    }
}

impl Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkType::Raw => write!(f, "Raw"),
            ChunkType::Fill => write!(f, "Fill"),
            ChunkType::DontCare => write!(f, "Don't Care"),
            ChunkType::Crc32 => write!(f, "CRC32"),
            ChunkType::Unknown(code) => write!(f, "Unknown (0x{:04X})", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ChunkHeader {
    pub(crate) chunk_type: ChunkType,
    pub(crate) reserved: u16,
    /// Output blocks this chunk stands for
    pub(crate) chunk_size: u32,
    /// Input bytes of this chunk, including this header
    pub(crate) total_size: u32,
}

impl From<RawChunkHeader> for ChunkHeader {
    fn from(value: RawChunkHeader) -> Self {
        Self {
            chunk_type: value.chunk_type.into(),
            reserved: value.reserved,
            chunk_size: value.chunk_size,
            total_size: value.total_size,
        }
    }
}

impl Display for ChunkHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ {}, reserved 0x{:04X}, {} blocks, {} bytes total }}",
            self.chunk_type, self.reserved, self.chunk_size, self.total_size)
    }
}

impl ChunkHeader {
    pub(crate) fn parse(bytes: &[u8; SIZE_CHUNK_HEADER]) -> Self {
        RawChunkHeader::from_le_bytes(bytes).into()
    }

    /// Read the next chunk header, `None` on a clean end of stream.
    ///
    /// A partial header is an `UnexpectedEof` error.
    pub(crate) fn read_from<R: Read>(source: &mut R) -> std::io::Result<Option<Self>> {
        let mut buffer = [0; SIZE_CHUNK_HEADER];
        match read_full(source, &mut buffer)? {
            0 => Ok(None),
            SIZE_CHUNK_HEADER => Ok(Some(Self::parse(&buffer))),
            size => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("chunk header truncated to {} of {} bytes",
                    size, SIZE_CHUNK_HEADER))),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        let total_size = self.total_size as u64;
        match self.chunk_type {
            ChunkType::Raw => total_size ==
                SIZE_CHUNK_HEADER as u64 + self.output_size(),
            ChunkType::DontCare => total_size == SIZE_CHUNK_HEADER as u64,
            ChunkType::Fill | ChunkType::Crc32 => total_size ==
                (SIZE_CHUNK_HEADER + SIZE_CHUNK_WORD) as u64,
            ChunkType::Unknown(_) => false,
        }
    }

    /// Bytes following this header in the input
    pub(crate) fn payload_size(&self) -> u64 {
        (self.total_size as u64).saturating_sub(SIZE_CHUNK_HEADER as u64)
    }

    /// Bytes this chunk advances the output by
    pub(crate) fn output_size(&self) -> u64 {
        self.chunk_size as u64 * BLOCK_SIZE as u64
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    pub(crate) fn valid_header() -> FileHeader {
        FileHeader {
            magic: MAGIC,
            major_version: 1,
            minor_version: 0,
            file_header_size: 28,
            chunk_header_size: 12,
            block_size: 4096,
            total_blocks: 0,
            total_chunks: 0,
            image_checksum: 0,
        }
    }

    pub(crate) fn chunk_bytes(chunk_type: u16, chunk_size: u32, total_size: u32) -> [u8; SIZE_CHUNK_HEADER] {
        RawChunkHeader { chunk_type, reserved: 0, chunk_size, total_size }.to_le_bytes()
    }

    pub(crate) fn chunk(chunk_type: u16, chunk_size: u32, total_size: u32) -> ChunkHeader {
        ChunkHeader::parse(&chunk_bytes(chunk_type, chunk_size, total_size))
    }

    #[test]
    fn record_sizes() {
        assert_eq!(SIZE_FILE_HEADER, 28);
        assert_eq!(SIZE_CHUNK_HEADER, 12);
    }

    #[test]
    fn header_layout_is_little_endian() {
        let bytes = valid_header().to_le_bytes();
        assert_eq!(&bytes[0..4], &[0x3a, 0xff, 0x26, 0xed]);
        assert_eq!(FileHeader::parse(&bytes), valid_header());
        assert!(FileHeader::parse(&bytes).is_valid());
    }

    #[test]
    fn header_rejects_each_checked_field() {
        let mut header = valid_header();
        header.magic = 0xed26ff3b;
        assert!(!header.is_valid());
        let mut header = valid_header();
        header.major_version = 2;
        assert!(!header.is_valid());
        let mut header = valid_header();
        header.block_size = 512;
        assert!(!header.is_valid());
        let mut header = valid_header();
        header.file_header_size = 32;
        assert!(!header.is_valid());
        let mut header = valid_header();
        header.chunk_header_size = 16;
        assert!(!header.is_valid());
    }

    #[test]
    fn chunk_type_codes() {
        assert_eq!(ChunkType::from(0xcac1), ChunkType::Raw);
        assert_eq!(ChunkType::from(0xcac2), ChunkType::Fill);
        assert_eq!(ChunkType::from(0xcac3), ChunkType::DontCare);
        assert_eq!(ChunkType::from(0xcac4), ChunkType::Crc32);
        assert_eq!(ChunkType::from(0xcac5), ChunkType::Unknown(0xcac5));
    }

    #[test]
    fn raw_chunk_total_size_must_match_blocks() {
        assert!(chunk(CHUNK_TYPE_RAW, 2, 8204).is_valid());
        assert!(!chunk(CHUNK_TYPE_RAW, 2, 8203).is_valid());
        assert!(chunk(CHUNK_TYPE_RAW, 0, 12).is_valid());
    }

    #[test]
    fn raw_chunk_size_does_not_wrap() {
        // 0x100000 * 4096 wraps to 0 in u32 arithmetic
        assert!(!chunk(CHUNK_TYPE_RAW, 0x100000, 12).is_valid());
    }

    #[test]
    fn fixed_size_chunks() {
        assert!(chunk(CHUNK_TYPE_DONT_CARE, 100, 12).is_valid());
        assert!(!chunk(CHUNK_TYPE_DONT_CARE, 100, 16).is_valid());
        assert!(chunk(CHUNK_TYPE_FILL, 100, 16).is_valid());
        assert!(!chunk(CHUNK_TYPE_FILL, 100, 12).is_valid());
        assert!(chunk(CHUNK_TYPE_CRC32, 0, 16).is_valid());
        assert!(!chunk(CHUNK_TYPE_CRC32, 0, 20).is_valid());
        assert!(!chunk(0xcac5, 0, 12).is_valid());
    }

    #[test]
    fn read_chunk_header_end_of_stream() {
        let mut source = Cursor::new(Vec::new());
        assert!(ChunkHeader::read_from(&mut source).unwrap().is_none());
    }

    #[test]
    fn read_chunk_header_truncated() {
        let mut source = Cursor::new(chunk_bytes(CHUNK_TYPE_RAW, 1, 4108)[..7].to_vec());
        let error = ChunkHeader::read_from(&mut source).unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn read_chunk_header_whole() {
        let mut source = Cursor::new(chunk_bytes(CHUNK_TYPE_FILL, 3, 16).to_vec());
        let chunk = ChunkHeader::read_from(&mut source).unwrap().unwrap();
        assert_eq!(chunk.chunk_type, ChunkType::Fill);
        assert_eq!(chunk.chunk_size, 3);
        assert_eq!(chunk.payload_size(), 4);
        assert_eq!(chunk.output_size(), 3 * 4096);
    }

    proptest! {
        #[test]
        fn header_validity_ignores_advisory_fields(
            minor_version: u16,
            total_blocks: u32,
            total_chunks: u32,
            image_checksum: u32,
        ) {
            let header = FileHeader {
                minor_version,
                total_blocks,
                total_chunks,
                image_checksum,
                ..valid_header()
            };
            prop_assert!(header.is_valid());
        }

        #[test]
        fn header_validity_formula(
            magic in prop_oneof![Just(MAGIC), any::<u32>()],
            major_version in 0u16..3,
            block_size in prop_oneof![Just(4096u32), any::<u32>()],
            file_header_size in 26u16..30,
            chunk_header_size in 10u16..14,
        ) {
            let header = FileHeader {
                magic,
                major_version,
                file_header_size,
                chunk_header_size,
                block_size,
                ..valid_header()
            };
            let expected = magic == MAGIC && major_version == 1 &&
                block_size == 4096 && file_header_size == 28 &&
                chunk_header_size == 12;
            prop_assert_eq!(header.is_valid(), expected);
        }

        #[test]
        fn chunk_validity_formula(
            chunk_type in 0xcac0u16..0xcac6,
            chunk_size: u32,
            total_size: u32,
        ) {
            let chunk = chunk(chunk_type, chunk_size, total_size);
            let expected = match chunk_type {
                0xcac1 => total_size as u64 == 12 + chunk_size as u64 * 4096,
                0xcac2 | 0xcac4 => total_size == 16,
                0xcac3 => total_size == 12,
                _ => false,
            };
            prop_assert_eq!(chunk.is_valid(), expected);
        }
    }
}
