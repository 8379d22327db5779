//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Reader for the record stream of Excel 97-2003 workbooks (.xls)

use crate::error::RosterError;
use crate::helpers::bytes::to_u16;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use encoding_rs::WINDOWS_1252;
use thiserror::Error;

const CONTINUE: u16 = 60;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in the record")]
    NoEnoughDataError(usize),
}

/// Reader for BIFF8 records, joining each record with its CONTINUE records
pub(crate) struct Biff8Reader {
    /// Encoding of compressed (8-bit) strings
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    pointer: usize,              // Start of the next record
    chunks: Vec<(usize, usize)>, // Current record chunks (start, end)
    index: usize,                // Current chunk
    offset: usize,               // Offset within the current chunk
}

impl Biff8Reader {
    /// Creates a reader over a whole workbook stream
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: WINDOWS_1252,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, or None at the end of the stream
    pub(crate) fn next(&mut self) -> Result<Option<u16>, RosterError> {
        let Some((kind, _)) = self.record_header(self.pointer) else {
            return Ok(None);
        };
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();
        self.push_chunk();
        while self.record_header(self.pointer).map(|(kind, _)| kind) == Some(CONTINUE) {
            self.push_chunk();
        }
        Ok(Some(kind))
    }

    /// Type and size of the record starting at `pointer`
    fn record_header(&self, pointer: usize) -> Option<(u16, usize)> {
        let kind = to_u16(self.buffer.get(pointer..)?)?;
        let size = to_u16(self.buffer.get(pointer + 2..)?)?;
        Some((kind, usize::from(size)))
    }

    /// Appends the record at the pointer to the current chunks; the body is clipped to the stream
    fn push_chunk(&mut self) {
        if let Some((_, size)) = self.record_header(self.pointer) {
            let lower = (self.pointer + 4).min(self.buffer.len());
            let upper = (lower + size).min(self.buffer.len());
            self.chunks.push((lower, upper));
            self.pointer = lower + size;
        }
    }

    /// Repositions the reader on a record boundary
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    /// Bytes left in the current record, across its CONTINUE records
    pub(crate) fn remaining(&self) -> usize {
        self.chunks
            .iter()
            .enumerate()
            .skip(self.index)
            .map(|(index, (lower, upper))| {
                let consumed = if index == self.index { self.offset } else { 0 };
                (upper - lower).saturating_sub(consumed)
            })
            .sum()
    }

    /// Reads up to `length` bytes of the current chunk; empty once the chunk is exhausted
    fn read(&mut self, length: usize) -> &[u8] {
        match self.chunks.get(self.index) {
            Some(&(lower, upper)) => {
                let source = upper.min(lower + self.offset);
                let target = upper.min(source + length);
                self.offset += target - source;
                &self.buffer[source..target]
            }
            None => &[],
        }
    }

    /// Moves to the next CONTINUE chunk; false when the record has none left
    fn next_chunk(&mut self) -> bool {
        if self.index + 1 < self.chunks.len() {
            self.index += 1;
            self.offset = 0;
            true
        } else {
            false
        }
    }

    /// Reads exactly N bytes, crossing chunk boundaries when needed
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], RosterError> {
        let mut array = [0u8; N];
        let mut filled = 0;
        while filled < N {
            let size = {
                let bytes = self.read(N - filled);
                array[filled..filled + bytes.len()].copy_from_slice(bytes);
                bytes.len()
            };
            if size == 0 && !self.next_chunk() {
                Err(Biff8Error::NoEnoughDataError(N))?
            }
            filled += size;
        }
        Ok(array)
    }

    /// Skips `length` bytes of the current record
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), RosterError> {
        let mut skipped = 0;
        while skipped < length {
            let size = self.read(length - skipped).len();
            if size == 0 && !self.next_chunk() {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            skipped += size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, RosterError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, RosterError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, RosterError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, RosterError> {
        Ok(self.read_u32()? as usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, RosterError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, RosterError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads an RK number, the compressed numeric form of integers and floats
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, RosterError> {
        Ok(rk_to_f64(self.read_u32()?))
    }

    /// Reads a ShortXLUnicodeString (1-byte length prefix)
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, RosterError> {
        let chars = self.read_u8()? as usize;
        let flag = self.read_u8()?;
        let mut string = String::new();
        self.read_characters(chars, flag & 0x1 != 0, &mut string)?;
        Ok(string)
    }

    /// Reads an XLUnicodeString (2-byte length prefix)
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, RosterError> {
        let chars = self.read_u16()? as usize;
        let flag = self.read_u8()?;
        let mut string = String::new();
        self.read_characters(chars, flag & 0x1 != 0, &mut string)?;
        Ok(string)
    }

    /// Reads an XLUnicodeRichExtendedString, dropping its formatting runs and phonetic data
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, RosterError> {
        let chars = self.read_u16()? as usize;
        let flag = self.read_u8()?;
        let rich_string_count = if flag & 0x8 != 0 { self.read_u16()? as usize } else { 0 };
        let phonetic_size = if flag & 0x4 != 0 { self.read_usize()? } else { 0 };
        let mut string = String::new();
        self.read_characters(chars, flag & 0x1 != 0, &mut string)?;
        // rgRun, then ExtRst
        self.skip(4 * rich_string_count)?;
        self.skip(phonetic_size)?;
        Ok(string)
    }

    /// Reads `chars` characters. A CONTINUE record inside the characters
    /// starts with a fresh flag byte that may switch the width.
    fn read_characters(&mut self, chars: usize, is_high_byte: bool, content: &mut String) -> Result<(), RosterError> {
        let mut remaining = chars;
        let mut is_high_byte = is_high_byte;
        while remaining > 0 {
            let encoding = if is_high_byte { UTF_16LE } else { self.encoding };
            let bytes = self.read(chars_to_bytes(is_high_byte, remaining));
            if !bytes.is_empty() {
                let (string, _) = encoding.decode_without_bom_handling(bytes);
                content.push_str(&string);
                remaining -= bytes_to_chars(is_high_byte, bytes.len()).min(remaining);
            } else if self.next_chunk() {
                is_high_byte = self.read_u8()? & 0x1 != 0;
            } else {
                Err(Biff8Error::NoEnoughDataError(chars))?
            }
        }
        Ok(())
    }
}

/// Decodes an RK value: a 30-bit integer or the high bits of a double, optionally divided by 100
fn rk_to_f64(value: u32) -> f64 {
    let is_percentage = (value & 0x01) != 0;
    let is_integer = (value & 0x02) != 0;
    let number = if is_integer {
        ((value as i32) >> 2) as f64
    } else {
        f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
    };
    if is_percentage { number / 100.0 } else { number }
}

#[inline]
fn chars_to_bytes(is_high_byte: bool, chars: usize) -> usize {
    if is_high_byte { chars << 1 } else { chars }
}

#[inline]
fn bytes_to_chars(is_high_byte: bool, bytes: usize) -> usize {
    if is_high_byte { bytes >> 1 } else { bytes }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encodes one record with its header
    pub(crate) fn record(kind: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = kind.to_le_bytes().to_vec();
        bytes.extend((body.len() as u16).to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    /// Encodes characters after the flag byte: UTF-16 when any character is outside Latin-1
    pub(crate) fn characters(text: &str) -> Vec<u8> {
        if text.chars().all(|c| (c as u32) < 0x80) {
            let mut bytes = vec![0u8];
            bytes.extend(text.bytes());
            bytes
        } else {
            let mut bytes = vec![1u8];
            bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
            bytes
        }
    }

    /// Encodes an XLUnicodeString
    pub(crate) fn xl_unicode_string(text: &str) -> Vec<u8> {
        let mut bytes = (text.encode_utf16().count() as u16).to_le_bytes().to_vec();
        bytes.extend(characters(text));
        bytes
    }

    #[test]
    fn records_and_integers() {
        let mut stream = record(0x0203, &[1, 0, 2, 0, 0x0F, 0]);
        stream.extend(record(0x000A, &[]));
        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next().unwrap(), Some(0x0203));
        assert_eq!(reader.remaining(), 6);
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert_eq!(reader.read_u32().unwrap(), 0x000F_0002);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next().unwrap(), Some(0x000A));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn fields_span_continue_records() {
        let mut stream = record(0x00FC, &[1, 2]);
        stream.extend(record(CONTINUE, &[3, 4]));
        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next().unwrap(), Some(0x00FC));
        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.read_u32().unwrap(), 0x0403_0201);
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn strings() {
        let mut body = xl_unicode_string("Ana");
        body.extend(xl_unicode_string("Łukasz"));
        body.push(3);
        body.extend(characters("Lee"));
        let mut reader = Biff8Reader::new(record(0x0204, &body));
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "Ana");
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "Łukasz");
        assert_eq!(reader.read_short_xl_unicode_string().unwrap(), "Lee");
    }

    #[test]
    fn rich_string_continued_with_a_new_width() {
        // "Zoë" split after "Zo": compressed first half, UTF-16 second half, then one formatting run
        let mut body = vec![3, 0, 0x08, 1, 0];
        body.extend(b"Zo");
        let mut stream = record(0x00FC, &body);
        let mut rest = vec![1u8];
        rest.extend("ë".encode_utf16().flat_map(u16::to_le_bytes));
        rest.extend([0, 0, 0, 0]);
        stream.extend(record(CONTINUE, &rest));
        let mut reader = Biff8Reader::new(stream);
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_rich_extended_string().unwrap(), "Zoë");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn compressed_strings_use_the_code_page() {
        let mut reader = Biff8Reader::new(record(0x0204, &[2, 0, 0, 0xE9, 0x80]));
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "é€");
    }

    #[test]
    fn truncated_string_is_an_error() {
        let mut reader = Biff8Reader::new(record(0x0204, &[5, 0, 0, b'A']));
        reader.next().unwrap();
        assert!(reader.read_xl_unicode_string().is_err());
    }

    #[test]
    fn rk_numbers() {
        assert_eq!(rk_to_f64((95 << 2) | 0x2), 95.0);
        assert_eq!(rk_to_f64(((-7i32 << 2) | 0x2) as u32), -7.0);
        assert_eq!(rk_to_f64((1234 << 2) | 0x3), 12.34);
        assert_eq!(rk_to_f64((1.5f64.to_bits() >> 32) as u32), 1.5);
    }

    #[test]
    fn record_body_is_clipped_to_the_stream() {
        let mut stream = record(0x0203, &[1, 2, 3, 4]);
        stream.truncate(6);
        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next().unwrap(), Some(0x0203));
        assert_eq!(reader.remaining(), 2);
        assert!(reader.read_u32().is_err());
        assert_eq!(reader.next().unwrap(), None);
    }
}
