use crate::error::RosterError;
use std::fs::File;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use std::path::PathBuf;

/// Where spreadsheet bytes come from: a file on disk or an uploaded buffer.
#[derive(Clone, Debug)]
pub enum Source {
    /// Local file path
    File(PathBuf),
    /// In-memory upload with its original file name
    Memory { name: String, bytes: Vec<u8> },
}

impl Source {
    /// Creates a source for a local file.
    pub fn file<P: AsRef<Path>>(path: P) -> Source {
        Source::File(path.as_ref().to_path_buf())
    }

    /// Creates a source for an uploaded buffer.
    pub fn memory(name: &str, bytes: Vec<u8>) -> Source {
        Source::Memory { name: name.to_owned(), bytes }
    }

    /// Display name used in log lines and error messages.
    pub fn name(&self) -> String {
        match self {
            Source::File(path) => path.display().to_string(),
            Source::Memory { name, .. } => name.to_owned(),
        }
    }

    /// Lowercase file extension, if the name carries one.
    pub(crate) fn extension(&self) -> Option<String> {
        let name = match self {
            Source::File(path) => path.to_owned(),
            Source::Memory { name, .. } => PathBuf::from(name),
        };
        name.extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_ascii_lowercase())
    }
}

/// A unified reader over local files and in-memory buffers
pub(crate) enum UnifiedReader {
    /// Local file reader
    Local(BufReader<File>),
    /// Uploaded buffer
    Memory(Cursor<Vec<u8>>),
}

impl UnifiedReader {
    /// Opens the source for reading.
    pub(crate) fn new(source: Source) -> Result<UnifiedReader, RosterError> {
        match source {
            Source::File(path) => {
                let file = File::open(path)?;
                Ok(UnifiedReader::Local(BufReader::new(file)))
            }
            Source::Memory { bytes, .. } => Ok(UnifiedReader::Memory(Cursor::new(bytes))),
        }
    }
}

impl Read for UnifiedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            UnifiedReader::Local(reader) => reader.read(buf),
            UnifiedReader::Memory(reader) => reader.read(buf),
        }
    }
}

impl Seek for UnifiedReader {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        match self {
            UnifiedReader::Local(reader) => reader.seek(pos),
            UnifiedReader::Memory(reader) => reader.seek(pos),
        }
    }
}
