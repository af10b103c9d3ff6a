//! Recording file format
//!
//! Recording files hold the tags and the channel samples acquired during one
//! run of the data server. Tags are stored in their own section so that the
//! catalog builder can index a file without decoding its samples.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "STRP"               │
//! │   version: u16                          │
//! │   compression: u8                       │
//! │   reserved: u8                          │
//! │   first_sample: f64 (MJD)               │
//! │   last_sample: f64 (MJD)                │
//! │   tags_len: u32                         │
//! │   tags_checksum: u32                    │
//! │   channels_len: u64                     │
//! │   channels_checksum: u32                │
//! │   reserved: [u8; 16]                    │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ TAGS (bincode, never compressed)        │
//! ├─────────────────────────────────────────┤
//! │ CHANNELS (bincode, optionally LZ4)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A writer that crashes before closing a file leaves `first_sample` and
//! `last_sample` at -1; such files get their range computed from the samples.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::channel::Channel;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::reader::{has_suffix, DataHandle, FileMetadataReader};
use crate::storage::types::{Mjd, TagRecord, TimeRange, TimeSeries, EARLIEST_ACCEPTABLE_MJD};

/// Magic bytes for recording file identification
const RECORDING_MAGIC: [u8; 4] = *b"STRP";

/// Current recording format version
const RECORDING_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 64;

/// Bound written by a writer that never closed the file
const UNSET_SAMPLE: Mjd = -1.0;

/// File suffixes of recording files
pub const RECORDING_SUFFIXES: &[&str] = &[".rec", ".rec.lz4"];

/// Compression applied to the channel section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(StorageError::InvalidFile(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

/// Recording file header
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingHeader {
    pub version: u16,
    pub compression: CompressionType,
    pub first_sample: Mjd,
    pub last_sample: Mjd,
    pub tags_len: u32,
    pub tags_checksum: u32,
    pub channels_len: u64,
    pub channels_checksum: u32,
}

fn le_bytes<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

impl RecordingHeader {
    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&RECORDING_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.compression as u8;
        buf[8..16].copy_from_slice(&self.first_sample.to_le_bytes());
        buf[16..24].copy_from_slice(&self.last_sample.to_le_bytes());
        buf[24..28].copy_from_slice(&self.tags_len.to_le_bytes());
        buf[28..32].copy_from_slice(&self.tags_checksum.to_le_bytes());
        buf[32..40].copy_from_slice(&self.channels_len.to_le_bytes());
        buf[40..44].copy_from_slice(&self.channels_checksum.to_le_bytes());

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        let stored_checksum = u32::from_le_bytes(le_bytes(buf, 60));
        let computed_checksum = crc32fast::hash(&buf[0..60]);

        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        if buf[0..4] != RECORDING_MAGIC {
            return Err(StorageError::InvalidFile(format!(
                "Invalid magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes(le_bytes(buf, 4));
        if version > RECORDING_VERSION {
            return Err(StorageError::InvalidFile(format!(
                "Unsupported version: {}",
                version
            )));
        }

        Ok(Self {
            version,
            compression: CompressionType::try_from(buf[6])?,
            first_sample: f64::from_le_bytes(le_bytes(buf, 8)),
            last_sample: f64::from_le_bytes(le_bytes(buf, 16)),
            tags_len: u32::from_le_bytes(le_bytes(buf, 24)),
            tags_checksum: u32::from_le_bytes(le_bytes(buf, 28)),
            channels_len: u64::from_le_bytes(le_bytes(buf, 32)),
            channels_checksum: u32::from_le_bytes(le_bytes(buf, 40)),
        })
    }
}

/// Samples of one channel as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChannelSamples {
    times: Vec<Mjd>,
    values: Vec<f64>,
}

type ChannelMap = BTreeMap<String, ChannelSamples>;

/// Builds recording files
pub struct RecordingWriter {
    compression: CompressionType,
    tags: Vec<TagRecord>,
    channels: ChannelMap,
    unclosed: bool,
}

impl RecordingWriter {
    pub fn new(compression: CompressionType) -> Self {
        Self {
            compression,
            tags: Vec::new(),
            channels: BTreeMap::new(),
            unclosed: false,
        }
    }

    /// Builder method: add a tag
    pub fn tag(mut self, tag: TagRecord) -> Self {
        self.tags.push(tag);
        self
    }

    /// Builder method: add the samples of a channel
    pub fn channel(self, channel: &Channel, series: TimeSeries) -> Self {
        self.raw_channel(&channel.key(), series)
    }

    /// Builder method: add samples under an arbitrary key
    pub fn raw_channel(mut self, key: &str, series: TimeSeries) -> Self {
        self.channels.insert(
            key.to_string(),
            ChannelSamples {
                times: series.times,
                values: series.values,
            },
        );
        self
    }

    /// Builder method: leave the first/last sample unset in the header
    pub fn unclosed(mut self) -> Self {
        self.unclosed = true;
        self
    }

    /// Write the file, returning its size in bytes
    pub fn write(&self, path: impl AsRef<Path>) -> StorageResult<u64> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tags = bincode::serialize(&self.tags)?;
        let serialized = bincode::serialize(&self.channels)?;
        let channels = match self.compression {
            CompressionType::None => serialized,
            CompressionType::Lz4 => lz4_flex::compress_prepend_size(&serialized),
        };

        let (first_sample, last_sample) = if self.unclosed {
            (UNSET_SAMPLE, UNSET_SAMPLE)
        } else {
            sample_bounds(&self.channels, f64::NEG_INFINITY)
                .unwrap_or((UNSET_SAMPLE, UNSET_SAMPLE))
        };

        let header = RecordingHeader {
            version: RECORDING_VERSION,
            compression: self.compression,
            first_sample,
            last_sample,
            tags_len: tags.len() as u32,
            tags_checksum: crc32fast::hash(&tags),
            channels_len: channels.len() as u64,
            channels_checksum: crc32fast::hash(&channels),
        };

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(&header.to_bytes())?;
        file.write_all(&tags)?;
        file.write_all(&channels)?;
        file.flush()?;

        Ok((HEADER_SIZE + tags.len() + channels.len()) as u64)
    }
}

/// Smallest and largest timestamp at or after `earliest` across all channels
fn sample_bounds(channels: &ChannelMap, earliest: Mjd) -> Option<(Mjd, Mjd)> {
    channels
        .values()
        .flat_map(|samples| samples.times.iter().copied())
        .filter(|t| *t >= earliest)
        .fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((min, max)) => Some((min.min(t), max.max(t))),
        })
}

/// An open recording file
pub struct RecordingFile {
    path: PathBuf,
    header: RecordingHeader,
    time_range: TimeRange,
    range_computed: bool,
    tags: Vec<TagRecord>,
    /// Decoded lazily on the first channel access
    channels: Option<ChannelMap>,
    reader: BufReader<File>,
}

impl RecordingFile {
    /// Open a recording file, reading its header and tags
    ///
    /// If the header carries no valid range, the range is computed from the
    /// samples, ignoring those before `earliest` (slow: decodes every channel).
    pub fn open(path: impl AsRef<Path>, earliest: Mjd) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut header_buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_buf)?;
        let header = RecordingHeader::from_bytes(&header_buf)?;

        let mut tags_buf = vec![0u8; header.tags_len as usize];
        reader.read_exact(&mut tags_buf)?;
        if crc32fast::hash(&tags_buf) != header.tags_checksum {
            return Err(StorageError::Corruption(format!(
                "Tag section checksum mismatch in {:?}",
                path
            )));
        }
        let tags: Vec<TagRecord> = bincode::deserialize(&tags_buf)?;

        let mut file = Self {
            path,
            time_range: TimeRange {
                start: header.first_sample,
                end: header.last_sample,
            },
            header,
            range_computed: false,
            tags,
            channels: None,
            reader,
        };

        if !file.time_range.is_after(earliest) {
            let bounds = sample_bounds(file.channels()?, earliest);
            let (start, end) = bounds.ok_or_else(|| {
                StorageError::InvalidFile(format!(
                    "{:?} has no sample after MJD {}",
                    file.path, earliest
                ))
            })?;
            file.time_range = TimeRange::new(start, end)?;
            file.range_computed = true;
        }

        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    /// Whether the range had to be computed from the samples
    pub fn range_computed(&self) -> bool {
        self.range_computed
    }

    /// Keys of all the channels in the file
    pub fn channel_keys(&mut self) -> StorageResult<Vec<String>> {
        Ok(self.channels()?.keys().cloned().collect())
    }

    fn channels(&mut self) -> StorageResult<&ChannelMap> {
        if self.channels.is_none() {
            let decoded = self.read_channels()?;
            self.channels = Some(decoded);
        }

        match &self.channels {
            Some(channels) => Ok(channels),
            None => Err(StorageError::InvalidFile("channel section not loaded".into())),
        }
    }

    fn read_channels(&mut self) -> StorageResult<ChannelMap> {
        let offset = HEADER_SIZE as u64 + self.header.tags_len as u64;
        self.reader.seek(SeekFrom::Start(offset))?;

        let mut data = vec![0u8; self.header.channels_len as usize];
        self.reader.read_exact(&mut data)?;

        if crc32fast::hash(&data) != self.header.channels_checksum {
            return Err(StorageError::Corruption(format!(
                "Channel section checksum mismatch in {:?}",
                self.path
            )));
        }

        let decompressed = match self.header.compression {
            CompressionType::None => data,
            CompressionType::Lz4 => lz4_flex::decompress_size_prepended(&data).map_err(|e| {
                StorageError::Compression(format!("LZ4 decompression failed: {}", e))
            })?,
        };

        Ok(bincode::deserialize(&decompressed)?)
    }
}

impl DataHandle for RecordingFile {
    fn time_range(&self) -> TimeRange {
        self.time_range
    }

    fn tags(&self) -> &[TagRecord] {
        &self.tags
    }

    fn load_channel(&mut self, channel: &Channel) -> StorageResult<TimeSeries> {
        let key = channel.key();
        let path = self.path.clone();
        let samples = self
            .channels()?
            .get(&key)
            .ok_or(StorageError::ChannelNotFound { path, channel: key })?;

        TimeSeries::new(samples.times.clone(), samples.values.clone())
    }
}

/// Opens recording files
#[derive(Debug, Clone)]
pub struct RecordingReader {
    suffixes: Vec<String>,
    earliest: Mjd,
}

impl RecordingReader {
    pub fn new(suffixes: Vec<String>, earliest: Mjd) -> Self {
        Self { suffixes, earliest }
    }
}

impl Default for RecordingReader {
    fn default() -> Self {
        Self::new(
            RECORDING_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            EARLIEST_ACCEPTABLE_MJD,
        )
    }
}

impl FileMetadataReader for RecordingReader {
    fn accepts(&self, path: &Path) -> bool {
        has_suffix(path, &self.suffixes)
    }

    fn open(&self, path: &Path) -> StorageResult<Box<dyn DataHandle>> {
        if !self.accepts(path) {
            return Err(StorageError::UnsupportedFile(path.to_path_buf()));
        }
        Ok(Box::new(RecordingFile::open(path, self.earliest)?))
    }
}
