//! Binary cosave record
//!
//! Little-endian layout. The header may sit anywhere inside a larger blob.
//!
//! ```text
//!   Header (44 bytes)
//!   ┌──────────────────────────────────┬──────────┬───────┬───────────────┐
//!   │ magic "MAINTAINEDMAGICNEWGEN..." │ checksum │ count │ reserved (7)  │
//!   │ 32 bytes                         │ u32      │ u8    │ all zero      │
//!   └──────────────────────────────────┴──────────┴───────┴───────────────┘
//!   Entry (repeated `count` times)
//!   ┌──────────┬──────────────────┬──────────┬───────────┬──────────┐
//!   │ name len │ source file name │ base id  │ converted │ debuff   │
//!   │ u32      │ name len bytes   │ u32      │ u32       │ u32      │
//!   └──────────┴──────────────────┴──────────┴───────────┴──────────┘
//! ```
//!
//! `base id` is file-local unless the source is [`VIRTUAL_SOURCE`], in which
//! case it is the full form id.

use memchr::memmem;
use serde::Serialize;
use thiserror::Error;

use crate::host::{FormId, VIRTUAL_SOURCE};

pub const MAGIC: &[u8; 32] = b"MAINTAINEDMAGICNEWGENCOOKIESAVE:";
pub const HEADER_LEN: usize = 44;
pub const MAX_ENTRIES: usize = 32;
const RESERVED_LEN: usize = 7;
const ENTRY_TAIL_LEN: usize = 12;
const SALT: u32 = 0x4D41_494E;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("no valid header found")]
    HeaderNotFound,
    #[error("malformed header at offset {offset}")]
    MalformedHeader { offset: usize },
    #[error("{0} entries exceed the limit of 32")]
    TooManyEntries(usize),
    #[error("entry {entry} is truncated")]
    Truncated { entry: usize },
}

/// One maintained pair as stored in the cosave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedEntry {
    /// Plugin file name, or [`VIRTUAL_SOURCE`]
    pub source: String,
    pub base_id: u32,
    pub converted: FormId,
    pub debuff: FormId,
}

impl PersistedEntry {
    pub fn is_virtual(&self) -> bool {
        self.source == VIRTUAL_SOURCE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub checksum: u32,
    pub entry_count: u8,
    pub reserved: [u8; RESERVED_LEN],
}

impl Header {
    pub fn new(entry_count: u8) -> Self {
        let reserved = [0u8; RESERVED_LEN];
        Self {
            checksum: checksum(entry_count, &reserved),
            entry_count,
            reserved,
        }
    }

    pub fn is_valid(&self) -> bool {
        usize::from(self.entry_count) <= MAX_ENTRIES
            && self.reserved.iter().all(|b| *b == 0)
            && self.checksum == checksum(self.entry_count, &self.reserved)
    }

    /// Parse the header at the start of `bytes` (magic included).
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..HEADER_LEN)?;
        if &bytes[..MAGIC.len()] != MAGIC {
            return None;
        }
        let checksum = u32::from_le_bytes(bytes[32..36].try_into().ok()?);
        let entry_count = bytes[36];
        let reserved = bytes[37..HEADER_LEN].try_into().ok()?;
        Some(Self {
            checksum,
            entry_count,
            reserved,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out.push(self.entry_count);
        out.extend_from_slice(&self.reserved);
    }
}

/// Salted djb2 over the entry count and the reserved bytes.
pub fn checksum(entry_count: u8, reserved: &[u8; RESERVED_LEN]) -> u32 {
    std::iter::once(entry_count)
        .chain(reserved.iter().copied())
        .fold(5381u32 ^ SALT, |sum, b| {
            (sum << 5).wrapping_add(sum) ^ u32::from(b)
        })
}

/// Offset of the first magic match whose header validates.
///
/// Fails with [`CodecError::HeaderNotFound`] when the magic never occurs and
/// with [`CodecError::MalformedHeader`] (last rejected offset) when every
/// match is rejected.
pub fn find_header(data: &[u8]) -> Result<usize, CodecError> {
    let mut rejected = None;
    for offset in memmem::find_iter(data, MAGIC) {
        match Header::parse(&data[offset..]) {
            Some(header) if header.is_valid() => {
                tracing::debug!(offset, entries = header.entry_count, checksum = header.checksum, "Valid header found");
                return Ok(offset);
            }
            _ => {
                tracing::warn!(offset, "Magic cookie match rejected (invalid header)");
                rejected = Some(offset);
            }
        }
    }
    match rejected {
        Some(offset) => Err(CodecError::MalformedHeader { offset }),
        None => Err(CodecError::HeaderNotFound),
    }
}

pub fn encode(entries: &[PersistedEntry]) -> Result<Vec<u8>, CodecError> {
    if entries.len() > MAX_ENTRIES {
        return Err(CodecError::TooManyEntries(entries.len()));
    }
    let body: usize = entries
        .iter()
        .map(|e| 4 + e.source.len() + ENTRY_TAIL_LEN)
        .sum();
    let mut out = Vec::with_capacity(HEADER_LEN + body);

    // Bounded by MAX_ENTRIES above.
    Header::new(entries.len() as u8).write(&mut out);
    for entry in entries {
        out.extend_from_slice(&(entry.source.len() as u32).to_le_bytes());
        out.extend_from_slice(entry.source.as_bytes());
        out.extend_from_slice(&entry.base_id.to_le_bytes());
        out.extend_from_slice(&entry.converted.0.to_le_bytes());
        out.extend_from_slice(&entry.debuff.0.to_le_bytes());
    }
    Ok(out)
}

/// Locate the header anywhere in `data` and decode every entry after it.
pub fn decode(data: &[u8]) -> Result<Vec<PersistedEntry>, CodecError> {
    let offset = find_header(data)?;
    decode_at(data, offset)
}

pub fn decode_at(data: &[u8], offset: usize) -> Result<Vec<PersistedEntry>, CodecError> {
    let header = data
        .get(offset..)
        .and_then(Header::parse)
        .filter(Header::is_valid)
        .ok_or(CodecError::MalformedHeader { offset })?;

    let mut reader = Reader {
        data,
        pos: offset + HEADER_LEN,
    };
    let count = usize::from(header.entry_count);
    let mut entries = Vec::with_capacity(count);
    for entry in 0..count {
        let truncated = CodecError::Truncated { entry };
        let name_len = reader.u32().ok_or(truncated.clone())? as usize;
        let name = reader.bytes(name_len).ok_or(truncated.clone())?;
        let source = String::from_utf8_lossy(name).into_owned();
        let base_id = reader.u32().ok_or(truncated.clone())?;
        let converted = FormId(reader.u32().ok_or(truncated.clone())?);
        let debuff = FormId(reader.u32().ok_or(truncated)?);

        tracing::debug!(entry, source = %source, base_id, %converted, %debuff, "Decoded entry");
        entries.push(PersistedEntry {
            source,
            base_id,
            converted,
            debuff,
        });
    }
    Ok(entries)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4)?.try_into().ok().map(u32::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entries(n: u32) -> Vec<PersistedEntry> {
        (0..n)
            .map(|i| PersistedEntry {
                source: if i % 3 == 0 {
                    VIRTUAL_SOURCE.to_string()
                } else {
                    format!("Plugin{i}.esp")
                },
                base_id: 0x800 + i,
                converted: FormId(0xFF03_F800 + 2 * i),
                debuff: FormId(0xFF03_F801 + 2 * i),
            })
            .collect()
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&[]).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[..32], MAGIC);
        assert_eq!(bytes[36], 0);
        assert!(bytes[37..].iter().all(|b| *b == 0));

        let expected = checksum(0, &[0; 7]);
        assert_eq!(u32::from_le_bytes(bytes[32..36].try_into().unwrap()), expected);
    }

    #[test]
    fn test_checksum_reference_value() {
        // djb2 with salt over [count=1, 0 x 7]
        let mut sum: u32 = 5381 ^ 0x4D41_494E;
        for b in [1u8, 0, 0, 0, 0, 0, 0, 0] {
            sum = (sum << 5).wrapping_add(sum) ^ u32::from(b);
        }
        assert_eq!(checksum(1, &[0; 7]), sum);
    }

    #[test]
    fn test_entries_survive_encoding() {
        for n in [1, 7, 32] {
            let entries = make_entries(n);
            let bytes = encode(&entries).unwrap();
            assert_eq!(decode(&bytes).unwrap(), entries, "{n} entries");
        }
    }

    #[test]
    fn test_too_many_entries_rejected() {
        assert_eq!(encode(&make_entries(33)), Err(CodecError::TooManyEntries(33)));
    }

    #[test]
    fn test_header_found_inside_foreign_blob() {
        let entries = make_entries(3);
        let mut blob = b"SKSE\x01\x00\x00\x00 unrelated plugin data ....".to_vec();
        let offset = blob.len();
        blob.extend(encode(&entries).unwrap());
        blob.extend_from_slice(&[0xAB; 100]);

        assert_eq!(find_header(&blob), Ok(offset));
        assert_eq!(decode(&blob).unwrap(), entries);
    }

    #[test]
    fn test_near_miss_skipped_for_later_valid_header() {
        let mut near_miss = encode(&make_entries(0)).unwrap();
        near_miss[32] ^= 0xFF;
        let mut blob = near_miss.clone();
        let offset = blob.len();
        blob.extend(encode(&make_entries(2)).unwrap());

        assert_eq!(
            find_header(&near_miss),
            Err(CodecError::MalformedHeader { offset: 0 }),
            "Bad checksum must not match"
        );
        assert_eq!(find_header(&blob), Ok(offset));
    }

    #[test]
    fn test_any_corrupted_checksum_or_reserved_byte_rejected() {
        let bytes = encode(&make_entries(4)).unwrap();
        for index in (32..36).chain(37..HEADER_LEN) {
            for flip in [0x01u8, 0x80, 0xFF] {
                let mut corrupted = bytes.clone();
                corrupted[index] ^= flip;
                assert_eq!(
                    decode(&corrupted),
                    Err(CodecError::MalformedHeader { offset: 0 }),
                    "byte {index} flipped with {flip:#04x}"
                );
            }
        }
    }

    #[test]
    fn test_count_above_limit_rejected_even_with_matching_checksum() {
        let mut bytes = Vec::new();
        let reserved = [0u8; 7];
        let header = Header {
            checksum: checksum(33, &reserved),
            entry_count: 33,
            reserved,
        };
        header.write(&mut bytes);
        assert!(!header.is_valid());
        assert_eq!(find_header(&bytes), Err(CodecError::MalformedHeader { offset: 0 }));
    }

    #[test]
    fn test_truncated_entry_rejects_blob() {
        let bytes = encode(&make_entries(2)).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert_eq!(decode(cut), Err(CodecError::Truncated { entry: 1 }));
    }

    #[test]
    fn test_no_magic_is_distinct_from_rejected_magic() {
        assert_eq!(find_header(b"some other plugin's record"), Err(CodecError::HeaderNotFound));
        assert_eq!(find_header(&[]), Err(CodecError::HeaderNotFound));

        let mut blob = b"prefix".to_vec();
        blob.extend(encode(&make_entries(1)).unwrap());
        blob[6 + 36] = 40;
        assert_eq!(find_header(&blob), Err(CodecError::MalformedHeader { offset: 6 }));
    }

    #[test]
    fn test_header_at_end_of_buffer_is_not_read_past() {
        let bytes = encode(&[]).unwrap();
        assert_eq!(
            find_header(&bytes[..HEADER_LEN - 1]),
            Err(CodecError::MalformedHeader { offset: 0 })
        );
    }
}
