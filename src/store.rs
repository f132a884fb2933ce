//! Append-only container of named, gzip compressed arrays.
//!
//! Layout: the magic `CHESSPOS`, followed by entries of
//! `name_len: u32, name, dtype: u8, rank: u8, dims: [u64; rank], payload_len: u64, payload`
//! where the payload is a gzip stream of the raw elements (bools as one byte,
//! i32 little endian). Entries are never rewritten; a failed append is truncated away.
//! A chunk is complete once both its `encoding_<i>` and `game_id_<i>` entries are present.

use crate::codec::Encoding;
use crate::error::{CodecError, StoreError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"CHESSPOS";

pub fn encoding_name(chunk: usize) -> String {
    format!("encoding_{}", chunk)
}

pub fn game_id_name(chunk: usize) -> String {
    format!("game_id_{}", chunk)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Bool,
    I32,
}

impl Dtype {
    fn code(self) -> u8 {
        match self {
            Dtype::Bool => 0,
            Dtype::I32 => 1,
        }
    }

    fn from_code(code: u8) -> Option<Dtype> {
        match code {
            0 => Some(Dtype::Bool),
            1 => Some(Dtype::I32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    I32(Vec<i32>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(data) => data.len(),
            ArrayData::I32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            ArrayData::Bool(_) => Dtype::Bool,
            ArrayData::I32(_) => Dtype::I32,
        }
    }
}

/// A row-major n-dimensional array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

impl Array {
    /// Number of records along the first axis
    pub fn records(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// The i-th record of a boolean batch as an encoding
    pub fn encoding(&self, i: usize) -> Option<Result<Encoding, CodecError>> {
        let ArrayData::Bool(bits) = &self.data else {
            return None;
        };
        if i >= self.records() {
            return None;
        }

        let record_shape = self.shape[1..].to_vec();
        let record_len: usize = record_shape.iter().product();
        let bits = bits.get(i * record_len..(i + 1) * record_len)?;

        Some(Encoding::new(record_shape, bits.to_vec()))
    }
}

/// Location and description of an entry in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    /// Where the entry header starts
    start: u64,
    /// Where the payload starts
    offset: u64,
    payload_len: u64,
}

/// An open container. Only one writer may use a file at a time.
pub struct ChunkStore {
    path: PathBuf,
    file: File,
    entries: Vec<EntryInfo>,
    index: HashMap<String, usize>,

    /// Length of the valid part of the file
    len: u64,
}

impl ChunkStore {
    /// Creates an empty container, replacing any existing file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(MAGIC)?;
        file.sync_data()?;

        Ok(ChunkStore {
            path,
            file,
            entries: Vec::new(),
            index: HashMap::new(),
            len: MAGIC.len() as u64,
        })
    }

    /// Opens an existing container and indexes its entries
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(&file);
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| StoreError::Corrupt("missing header".to_string()))?;
        if &magic != MAGIC {
            return Err(StoreError::Corrupt("bad magic".to_string()));
        }

        let mut entries = Vec::new();
        let mut pos = MAGIC.len() as u64;

        while pos < file_len {
            let (mut entry, header_len) = read_entry_header(&mut reader, file_len - pos)
                .map_err(|e| StoreError::Corrupt(format!("entry at offset {}: {}", pos, e)))?;

            entry.start = pos;
            entry.offset = pos + header_len;
            let payload_end = entry
                .offset
                .checked_add(entry.payload_len)
                .filter(|&end| end <= file_len)
                .ok_or_else(|| {
                    StoreError::Corrupt(format!("entry {} ends past the end of file", entry.name))
                })?;

            reader.seek_relative(entry.payload_len as i64)?;
            entries.push(entry);
            pos = payload_end;
        }
        drop(reader);

        // an interrupted write_chunk leaves an encoding without its game ids
        if let Some(orphan) = entries.last().filter(|entry| is_orphan(entry, &entries)) {
            log::warn!(
                "{}: removing {}, its chunk was not completely written",
                path.display(),
                orphan.name
            );
            pos = orphan.start;
            file.set_len(pos)?;
            file.sync_data()?;
            entries.pop();
        }

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.name.clone(), i))
            .collect();

        Ok(ChunkStore {
            path,
            file,
            entries,
            index,
            len: pos,
        })
    }

    /// Opens the container if the file exists, creates it otherwise
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of complete chunks
    pub fn chunk_count(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|entry| entry.name.strip_prefix("encoding_"))
            .filter(|chunk| self.contains(&format!("game_id_{}", chunk)))
            .count()
    }

    /// Appends a single entry
    pub fn append(&mut self, name: &str, array: &Array) -> Result<(), StoreError> {
        let start = self.len;
        let result = self.append_unsynced(name, array);
        self.finish(start, result)
    }

    /// Appends the encodings and game ids of a chunk. Either both entries are written or none.
    pub fn write_chunk(
        &mut self,
        chunk: usize,
        encodings: &Array,
        game_ids: &Array,
    ) -> Result<(), StoreError> {
        let start = self.len;
        let result = self
            .append_unsynced(&encoding_name(chunk), encodings)
            .and_then(|_| self.append_unsynced(&game_id_name(chunk), game_ids));
        self.finish(start, result)
    }

    pub fn read(&mut self, name: &str) -> Result<Array, StoreError> {
        let entry = self
            .index
            .get(name)
            .map(|&i| self.entries[i].clone())
            .ok_or_else(|| StoreError::MissingEntry(name.to_string()))?;

        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut raw = Vec::new();
        GzDecoder::new((&self.file).take(entry.payload_len))
            .read_to_end(&mut raw)
            .map_err(|e| StoreError::Corrupt(format!("entry {}: {}", name, e)))?;

        let count: usize = entry.shape.iter().product();
        let data = match entry.dtype {
            Dtype::Bool => ArrayData::Bool(raw.iter().map(|&b| b != 0).collect()),
            Dtype::I32 => {
                if raw.len() % 4 != 0 {
                    return Err(StoreError::Corrupt(format!("entry {}: partial i32", name)));
                }
                let mut values = vec![0i32; raw.len() / 4];
                raw.as_slice().read_i32_into::<LittleEndian>(&mut values)?;
                ArrayData::I32(values)
            }
        };

        if data.len() != count {
            return Err(StoreError::Corrupt(format!(
                "entry {}: {} elements for shape {:?}",
                name,
                data.len(),
                entry.shape
            )));
        }

        Ok(Array {
            shape: entry.shape,
            data,
        })
    }

    fn append_unsynced(&mut self, name: &str, array: &Array) -> Result<(), StoreError> {
        if self.contains(name) {
            return Err(StoreError::DuplicateEntry(name.to_string()));
        }
        if array.shape.iter().product::<usize>() != array.data.len() {
            return Err(StoreError::InvalidArray(format!(
                "{} elements for shape {:?}",
                array.data.len(),
                array.shape
            )));
        }

        let payload = compress(&array.data)?;

        let mut header = Vec::new();
        header.write_u32::<LittleEndian>(name.len() as u32)?;
        header.write_all(name.as_bytes())?;
        header.write_u8(array.data.dtype().code())?;
        header.write_u8(array.shape.len() as u8)?;
        for &dim in &array.shape {
            header.write_u64::<LittleEndian>(dim as u64)?;
        }
        header.write_u64::<LittleEndian>(payload.len() as u64)?;

        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(&header)?;
        self.file.write_all(&payload)?;

        let offset = self.len + header.len() as u64;
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(EntryInfo {
            name: name.to_string(),
            dtype: array.data.dtype(),
            shape: array.shape.clone(),
            start: self.len,
            offset,
            payload_len: payload.len() as u64,
        });
        self.len = offset + payload.len() as u64;

        Ok(())
    }

    /// Makes a successful append durable, or rolls the file back to `start`
    fn finish(&mut self, start: u64, result: Result<(), StoreError>) -> Result<(), StoreError> {
        match result.and_then(|_| self.file.sync_data().map_err(StoreError::from)) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.rollback(start);
                Err(err)
            }
        }
    }

    fn rollback(&mut self, start: u64) {
        while let Some(entry) = self.entries.last() {
            if entry.start < start {
                break;
            }
            self.index.remove(&entry.name);
            self.entries.pop();
        }
        self.len = start;

        if let Err(err) = self.file.set_len(start) {
            log::error!(
                "could not truncate {} after a failed write: {}",
                self.path.display(),
                err
            );
        }
    }
}

fn is_orphan(entry: &EntryInfo, entries: &[EntryInfo]) -> bool {
    entry.name.strip_prefix("encoding_").is_some_and(|chunk| {
        let game_ids = format!("game_id_{}", chunk);
        !entries.iter().any(|other| other.name == game_ids)
    })
}

/// Reads the fixed part of an entry, returning it with the size of the header in bytes.
/// `remaining` is the number of bytes left in the file; lengths pointing past it are rejected.
/// The positions are left for the caller to fill.
fn read_entry_header<R: Read>(reader: &mut R, remaining: u64) -> io::Result<(EntryInfo, u64)> {
    let past_end = || io::Error::new(io::ErrorKind::UnexpectedEof, "header past end of file");

    let name_len = reader.read_u32::<LittleEndian>()? as u64;
    // name length, name, dtype, rank and payload length
    if 4 + name_len + 1 + 1 + 8 > remaining {
        return Err(past_end());
    }
    let mut name = vec![0u8; name_len as usize];
    reader.read_exact(&mut name)?;
    let name = String::from_utf8(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "entry name is not utf-8"))?;

    let dtype = Dtype::from_code(reader.read_u8()?)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown dtype"))?;

    let rank = reader.read_u8()? as u64;
    let header_len = 4 + name_len + 1 + 1 + 8 * rank + 8;
    if header_len > remaining {
        return Err(past_end());
    }

    let mut shape = Vec::with_capacity(rank as usize);
    for _ in 0..rank {
        shape.push(reader.read_u64::<LittleEndian>()? as usize);
    }

    let payload_len = reader.read_u64::<LittleEndian>()?;

    let info = EntryInfo {
        name,
        dtype,
        shape,
        start: 0,
        offset: 0,
        payload_len,
    };
    Ok((info, header_len))
}

fn compress(data: &ArrayData) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());

    match data {
        ArrayData::Bool(bits) => {
            let bytes: Vec<u8> = bits.iter().map(|&b| b as u8).collect();
            encoder.write_all(&bytes)?;
        }
        ArrayData::I32(values) => {
            for &value in values {
                encoder.write_i32::<LittleEndian>(value)?;
            }
        }
    }

    encoder.finish()
}
