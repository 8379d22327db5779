//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) workbooks.
//! The same container wraps password protected Office Open XML packages.

use crate::error::RosterError;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::ops::Range;
use thiserror::Error;

/// Leading bytes of every compound file
pub(crate) const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const HEADER_SIZE: usize = 512;
const DIRECTORY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
// Streams shorter than this live in the mini stream
const MINI_STREAM_CUTOFF: usize = 4096;
// Larger sector ids are markers (free, end of chain, FAT, DIFAT)
const MAX_REG_SECT: usize = 0xFFFF_FFFA;

// Directory entry object types
const STREAM: u8 = 2;
const ROOT_STORAGE: u8 = 5;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Expected {0} double indirect file allocation table sectors, found {1}")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("Expected {0} file allocation table sectors, found {1}")]
    FileAllocationTableError(usize, usize),

    #[error("Sector chain starting at {0} is broken")]
    SectorChainError(usize),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// An opened compound file: its streams by name plus both allocation tables.
pub(crate) struct Cfb {
    /// Stream entries by name; the first entry wins on duplicates
    streams: HashMap<String, Directory>,
    /// File allocation table for regular sectors
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    /// Mini file allocation table for streams below the cutoff
    mini_file_allocation_table: Vec<usize>,
    /// The mini stream, carried by the root entry
    mini_sectors: Sectors,
}

impl Cfb {
    /// Loads the whole container and parses its header, tables and directory.
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, RosterError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?
        }

        let header = Header::new(&data[..HEADER_SIZE])?;
        let sector_size = header.sector_size()?;
        let sectors = Sectors { data, offset: sector_size, size: sector_size };
        let file_allocation_table = load_file_allocation_table(&sectors, &header)?;
        let (root, streams) = load_directories(&file_allocation_table, &sectors, &header)?;
        let mini_file_allocation_table = if header.mini_file_allocation_table_count > 0 {
            let bytes = read_chain(&file_allocation_table, &sectors, header.mini_file_allocation_table_start)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        };
        let mut mini_stream = read_chain(&file_allocation_table, &sectors, root.start)?;
        mini_stream.truncate(root.size);

        Ok(Cfb {
            streams,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors: Sectors { data: mini_stream, offset: 0, size: MINI_SECTOR_SIZE },
        })
    }

    /// Checks if a stream exists
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    /// Reads a whole stream by name
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, RosterError> {
        let Some(directory) = self.streams.get(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.size < MINI_STREAM_CUTOFF {
            read_chain(&self.mini_file_allocation_table, &self.mini_sectors, directory.start)?
        } else {
            read_chain(&self.file_allocation_table, &self.sectors, directory.start)?
        };
        if bytes.len() < directory.size {
            Err(CfbError::SectorChainError(directory.start))?
        }
        bytes.truncate(directory.size);
        Ok(Some(bytes))
    }
}

/// Loads the file allocation table through the double indirect table
fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, RosterError> {
    let mut double_indirect_file_allocation_table = header.double_indirect_file_allocation_table.clone();
    let mut count = 0usize;
    let mut index = header.double_indirect_file_allocation_table_start;
    while index <= MAX_REG_SECT {
        if count >= header.double_indirect_file_allocation_table_count || count > sectors.count() {
            Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count + 1))?
        }
        let mut entries: Vec<usize> = to_usize_iter(sectors.get(index)?).collect();
        // The last entry links to the next sector of the table
        index = entries.pop().ok_or(CfbError::FileFormatError)?;
        double_indirect_file_allocation_table.extend(entries);
        count += 1;
    }
    if count != header.double_indirect_file_allocation_table_count {
        Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?
    }

    let mut file_allocation_table = Vec::new();
    let mut count = 0usize;
    for index in double_indirect_file_allocation_table.into_iter().filter(|index| *index <= MAX_REG_SECT) {
        file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
        count += 1;
    }
    if count != header.file_allocation_table_count {
        Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
    }
    Ok(file_allocation_table)
}

/// Loads the root entry and the stream entries
fn load_directories(
    file_allocation_table: &[usize],
    sectors: &Sectors,
    header: &Header,
) -> Result<(Directory, HashMap<String, Directory>), RosterError> {
    let bytes = read_chain(file_allocation_table, sectors, header.directory_start)?;
    let mut root = None;
    let mut streams = HashMap::new();
    for chunk in bytes.chunks_exact(DIRECTORY_SIZE) {
        match Directory::new(chunk, header.major_version) {
            Some((_, directory)) if directory.kind == ROOT_STORAGE && root.is_none() => root = Some(directory),
            Some((name, directory)) if directory.kind == STREAM => {
                streams.entry(name).or_insert(directory);
            }
            _ => (),
        }
    }
    let root = root.ok_or(CfbError::RootDirectoryError)?;
    Ok((root, streams))
}

/// Reads the content of a chain by following the allocation table
fn read_chain(table: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, RosterError> {
    let mut content = Vec::new();
    let mut index = start;
    let mut steps = 0usize;
    while index <= MAX_REG_SECT {
        // A chain can visit each sector once
        if steps > table.len() {
            Err(CfbError::SectorChainError(start))?
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *table.get(index).ok_or(CfbError::SectorChainError(start))?;
        steps += 1;
    }
    Ok(content)
}

/// Fixed-size sectors laid out after `offset` bytes of data
#[derive(Debug)]
struct Sectors {
    data: Vec<u8>,
    offset: usize,
    size: usize,
}

impl Sectors {
    /// Gets the sector at `index`; the last sector of the data may be short
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let lower = index
            .checked_mul(self.size)
            .and_then(|position| position.checked_add(self.offset))
            .filter(|position| *position < self.data.len())
            .ok_or(CfbError::FileFormatError)?;
        let upper = self.data.len().min(lower + self.size);
        Ok(&self.data[lower..upper])
    }

    /// Number of sectors present in the data
    fn count(&self) -> usize {
        self.data.len().saturating_sub(self.offset).div_ceil(self.size)
    }
}

/// CFB file header
#[derive(Debug)]
struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_start: usize,
    mini_file_allocation_table_start: usize,
    mini_file_allocation_table_count: usize,
    double_indirect_file_allocation_table_start: usize,
    double_indirect_file_allocation_table_count: usize,
    /// The first 109 entries, kept in the header itself
    double_indirect_file_allocation_table: Vec<usize>,
}

impl Header {
    /// Parses the first 512 bytes
    fn new(data: &[u8]) -> Result<Self, RosterError> {
        if data.get(..8) != Some(&SIGNATURE[..]) {
            Err(CfbError::OleSignatureError)?
        }
        let u16_at = |range: Range<usize>| data.get(range).and_then(to_u16).ok_or(CfbError::FileFormatError);
        let usize_at = |range: Range<usize>| data.get(range).and_then(to_usize).ok_or(CfbError::FileFormatError);
        Ok(Header {
            major_version: u16_at(26..28)?,
            sector_shift: u16_at(30..32)?,
            file_allocation_table_count: usize_at(44..48)?,
            directory_start: usize_at(48..52)?,
            mini_file_allocation_table_start: usize_at(60..64)?,
            mini_file_allocation_table_count: usize_at(64..68)?,
            double_indirect_file_allocation_table_start: usize_at(68..72)?,
            double_indirect_file_allocation_table_count: usize_at(72..76)?,
            double_indirect_file_allocation_table: to_usize_iter(data.get(76..HEADER_SIZE).unwrap_or_default()).collect(),
        })
    }

    /// Sector size implied by the major version
    fn sector_size(&self) -> Result<usize, CfbError> {
        match (self.major_version, self.sector_shift) {
            (3, 0x0009) => Ok(512),
            // Version 4 pads the header out to a whole 4096-byte sector
            (4, 0x000C) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift)),
        }
    }
}

/// Directory entry of a stream or storage
#[derive(Debug)]
struct Directory {
    kind: u8,
    start: usize,
    size: usize,
}

impl Directory {
    /// Parses a 128-byte directory entry
    fn new(bytes: &[u8], major_version: u16) -> Option<(String, Directory)> {
        let length = usize::from(to_u16(bytes.get(64..66)?)?).min(64);
        let (name, _) = UTF_16LE.decode_without_bom_handling(bytes.get(..length)?);
        let name = name.split('\0').next().unwrap_or_default().to_owned();
        let kind = *bytes.get(66)?;
        let start = to_usize(bytes.get(116..120)?)?;
        let size = to_u64(bytes.get(120..128)?)?;
        // Version 3 files may leave garbage in the high half
        let size = if major_version == 3 { size & 0xFFFF_FFFF } else { size };
        let size = usize::try_from(size).ok()?;
        Some((name, Directory { kind, start, size }))
    }
}

/// Builds a version 3 compound file holding `streams`, for tests.
/// Streams below the cutoff go to the mini stream.
#[cfg(test)]
pub(crate) fn compound_file(streams: &[(&str, &[u8])]) -> Vec<u8> {
    const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
    const FAT_SECT: u32 = 0xFFFF_FFFD;
    const FREE_SECT: u32 = 0xFFFF_FFFF;
    const NO_STREAM: u32 = 0xFFFF_FFFF;

    fn append_chain(data: &mut Vec<u8>, table: &mut Vec<u32>, bytes: &[u8], size: usize) -> u32 {
        if bytes.is_empty() {
            return END_OF_CHAIN;
        }
        let first = table.len() as u32;
        let count = bytes.len().div_ceil(size) as u32;
        table.extend((1..=count).map(|n| if n == count { END_OF_CHAIN } else { first + n }));
        data.extend_from_slice(bytes);
        data.resize(table.len() * size, 0);
        first
    }

    fn entry(name: &str, kind: u8, child: u32, right: u32, start: u32, size: usize) -> Vec<u8> {
        let mut entry = vec![0u8; DIRECTORY_SIZE];
        let encoded: Vec<u8> = name.encode_utf16().chain([0]).flat_map(u16::to_le_bytes).collect();
        entry[..encoded.len()].copy_from_slice(&encoded);
        entry[64..66].copy_from_slice(&(encoded.len() as u16).to_le_bytes());
        entry[66] = kind;
        entry[67] = 1;
        entry[68..72].copy_from_slice(&NO_STREAM.to_le_bytes());
        entry[72..76].copy_from_slice(&right.to_le_bytes());
        entry[76..80].copy_from_slice(&child.to_le_bytes());
        entry[116..120].copy_from_slice(&start.to_le_bytes());
        entry[120..128].copy_from_slice(&(size as u64).to_le_bytes());
        entry
    }

    // Sector 0 holds the only FAT sector
    let mut data = vec![0u8; HEADER_SIZE];
    let mut fat = vec![FAT_SECT];
    let mut mini_stream = Vec::new();
    let mut mini_fat = Vec::new();
    let mut starts = Vec::new();
    for (_, bytes) in streams {
        starts.push(if bytes.len() < MINI_STREAM_CUTOFF {
            append_chain(&mut mini_stream, &mut mini_fat, bytes, MINI_SECTOR_SIZE)
        } else {
            append_chain(&mut data, &mut fat, bytes, HEADER_SIZE)
        });
    }
    let root_start = append_chain(&mut data, &mut fat, &mini_stream, HEADER_SIZE);
    let mini_fat_bytes: Vec<u8> = mini_fat.iter().flat_map(|next| next.to_le_bytes()).collect();
    let mini_fat_start = append_chain(&mut data, &mut fat, &mini_fat_bytes, HEADER_SIZE);

    let mut directory = entry("Root Entry", ROOT_STORAGE, if streams.is_empty() { NO_STREAM } else { 1 }, NO_STREAM, root_start, mini_stream.len());
    for (id, ((name, bytes), start)) in streams.iter().zip(&starts).enumerate() {
        let right = if id + 1 < streams.len() { id as u32 + 2 } else { NO_STREAM };
        directory.extend(entry(name, STREAM, NO_STREAM, right, *start, bytes.len()));
    }
    let directory_start = append_chain(&mut data, &mut fat, &directory, HEADER_SIZE);

    assert!(fat.len() <= HEADER_SIZE / 4, "test container too large for one FAT sector");
    fat.resize(HEADER_SIZE / 4, FREE_SECT);
    let fat_bytes: Vec<u8> = fat.iter().flat_map(|next| next.to_le_bytes()).collect();
    data[..HEADER_SIZE].copy_from_slice(&fat_bytes);

    let mut header = vec![0u8; HEADER_SIZE];
    header[..8].copy_from_slice(&SIGNATURE);
    header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    header[26..28].copy_from_slice(&3u16.to_le_bytes());
    header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    header[30..32].copy_from_slice(&9u16.to_le_bytes());
    header[32..34].copy_from_slice(&6u16.to_le_bytes());
    header[44..48].copy_from_slice(&1u32.to_le_bytes());
    header[48..52].copy_from_slice(&directory_start.to_le_bytes());
    header[56..60].copy_from_slice(&(MINI_STREAM_CUTOFF as u32).to_le_bytes());
    header[60..64].copy_from_slice(&mini_fat_start.to_le_bytes());
    header[64..68].copy_from_slice(&(mini_fat_bytes.len().div_ceil(HEADER_SIZE) as u32).to_le_bytes());
    header[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    header[76..80].copy_from_slice(&0u32.to_le_bytes());
    for slot in header[80..].chunks_exact_mut(4) {
        slot.copy_from_slice(&FREE_SECT.to_le_bytes());
    }

    header.extend(data);
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn open(bytes: Vec<u8>) -> Result<Cfb, RosterError> {
        Cfb::new(&mut Cursor::new(bytes))
    }

    #[test]
    fn reads_regular_and_mini_streams() {
        let large: Vec<u8> = (0..5000u32).map(|n| (n % 251) as u8).collect();
        let cfb = open(compound_file(&[("Workbook", large.as_slice()), ("Small", &b"tiny stream"[..])])).unwrap();
        assert_eq!(cfb.read("Workbook").unwrap().unwrap(), large);
        assert_eq!(cfb.read("Small").unwrap().unwrap(), b"tiny stream");
        assert!(cfb.exists("Small"));
        assert!(!cfb.exists("Book"));
        assert!(cfb.read("Book").unwrap().is_none());
    }

    #[test]
    fn several_mini_streams() {
        let cfb = open(compound_file(&[("A", &[1u8; 100][..]), ("B", &[2u8; 70][..])])).unwrap();
        assert_eq!(cfb.read("A").unwrap().unwrap(), vec![1u8; 100]);
        assert_eq!(cfb.read("B").unwrap().unwrap(), vec![2u8; 70]);
    }

    #[test]
    fn wrong_signature() {
        let mut bytes = compound_file(&[("Workbook", &b"x"[..])]);
        bytes[0] = 0;
        assert!(matches!(open(bytes), Err(RosterError::CfbHelperError(CfbError::OleSignatureError))));
    }

    #[test]
    fn short_file() {
        assert!(matches!(open(SIGNATURE.to_vec()), Err(RosterError::CfbHelperError(CfbError::FileFormatError))));
    }

    #[test]
    fn cyclic_chain_is_an_error() {
        let large = vec![7u8; 5000];
        let mut bytes = compound_file(&[("Workbook", large.as_slice())]);
        // The stream starts at sector 1; point that FAT entry back at itself
        bytes[HEADER_SIZE + 4..HEADER_SIZE + 8].copy_from_slice(&1u32.to_le_bytes());
        let cfb = open(bytes).unwrap();
        assert!(matches!(cfb.read("Workbook"), Err(RosterError::CfbHelperError(CfbError::SectorChainError(1)))));
    }

    #[test]
    fn truncated_file_is_an_error() {
        let large = vec![7u8; 5000];
        let bytes = compound_file(&[("Workbook", large.as_slice())]);
        // Header, FAT and the first stream sectors survive; the directory does not
        assert!(open(bytes[..HEADER_SIZE * 4].to_vec()).is_err());
    }
}
