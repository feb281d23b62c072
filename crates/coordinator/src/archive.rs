//! The backup archive wire format: a fixed header followed by a
//! sequence of CRC-32-checked blocks.
//!
//! ```text
//! Header (little-endian, packed):
//! offset  size  field
//! 0       4     magic            = "TAOS" (4 significant bytes of "TAOSZ")
//! 4       2     version          = 8 (0o10 octal in the source this was distilled from)
//! 6      40     api_commit_id    (ASCII, NUL-padded)
//! 46     40     server_commit_id (ASCII, NUL-padded)
//! 86      1     obj_name_len     (<= 255, the field's own width)
//! 87      L     obj_name         (ASCII, L = obj_name_len)
//! 87+L    8     timestamp_ms
//! 95+L    1     vg_id
//! 96+L    4     file_seq
//!
//! Body: sequence of blocks, each:
//! 1 byte   block_type  in {1, 2, 3}
//! 4 bytes  msg_len     (length of payload, after optional compression)
//! 2 bytes  msg_type
//! msg_len  bytes       payload
//! 4 bytes  body_crc32  (CRC-32 of payload, as stored on disk)
//! ```
//!
//! `version` is kept as the literal value `8` the source encodes, not
//! "fixed" to read `1` or `"1.0"` — see DESIGN.md.

use backup_core::{Error, Result};
use crc32fast::Hasher;

/// The archive magic, 4 significant bytes of the source's 5-character
/// `"TAOSZ"` constant.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"TAOS";

/// The literal version field value this format has always used.
pub const ARCHIVE_VERSION: u16 = 8;

const COMMIT_ID_LEN: usize = 40;
// obj_name_len is a single on-wire byte, so 255 is the largest length that
// round-trips; 256 would wrap to 0 when narrowed to u8 in `to_bytes`.
const MAX_OBJ_NAME_LEN: usize = 255;

/// The archive header (fixed-size prefix of every archive file, up to
/// the variable-length `obj_name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Commit id of the API server that produced this archive.
    pub api_commit_id: String,
    /// Commit id of the storage server that produced this archive.
    pub server_commit_id: String,
    /// Name of the backed-up object (table, shard, etc).
    pub obj_name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Volume group id.
    pub vg_id: u8,
    /// Monotonically increasing file sequence number.
    pub file_seq: u32,
}

impl ArchiveHeader {
    /// Serialize the header to its on-wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.obj_name.len() > MAX_OBJ_NAME_LEN {
            return Err(Error::InvalidParam(format!(
                "obj_name length {} exceeds {MAX_OBJ_NAME_LEN}",
                self.obj_name.len()
            )));
        }
        if !self.api_commit_id.is_ascii() || self.api_commit_id.len() > COMMIT_ID_LEN {
            return Err(Error::InvalidParam("api_commit_id must be <= 40 ASCII bytes".to_string()));
        }
        if !self.server_commit_id.is_ascii() || self.server_commit_id.len() > COMMIT_ID_LEN {
            return Err(Error::InvalidParam("server_commit_id must be <= 40 ASCII bytes".to_string()));
        }

        let mut out = Vec::with_capacity(96 + self.obj_name.len());
        out.extend_from_slice(&ARCHIVE_MAGIC);
        out.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        out.extend_from_slice(&pad_ascii(&self.api_commit_id, COMMIT_ID_LEN));
        out.extend_from_slice(&pad_ascii(&self.server_commit_id, COMMIT_ID_LEN));
        out.push(self.obj_name.len() as u8);
        out.extend_from_slice(self.obj_name.as_bytes());
        out.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        out.push(self.vg_id);
        out.extend_from_slice(&self.file_seq.to_le_bytes());
        Ok(out)
    }

    /// Parse a header from the front of `bytes`. Returns the header and
    /// the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 87 {
            return Err(Error::DataCorruption("archive too short for header".to_string()));
        }
        if bytes[0..4] != ARCHIVE_MAGIC {
            return Err(Error::DataCorruption("bad archive magic".to_string()));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != ARCHIVE_VERSION {
            return Err(Error::DataCorruption(format!("unsupported archive version {version}")));
        }
        let api_commit_id = ascii_trim(&bytes[6..46]);
        let server_commit_id = ascii_trim(&bytes[46..86]);
        let obj_name_len = bytes[86] as usize;
        if obj_name_len > MAX_OBJ_NAME_LEN {
            return Err(Error::DataCorruption("obj_name_len exceeds limit".to_string()));
        }
        let name_start = 87;
        let name_end = name_start + obj_name_len;
        if bytes.len() < name_end + 13 {
            return Err(Error::DataCorruption("archive too short for variable header tail".to_string()));
        }
        let obj_name = String::from_utf8_lossy(&bytes[name_start..name_end]).into_owned();
        let timestamp_ms = u64::from_le_bytes(bytes[name_end..name_end + 8].try_into().unwrap());
        let vg_id = bytes[name_end + 8];
        let file_seq = u32::from_le_bytes(bytes[name_end + 9..name_end + 13].try_into().unwrap());

        Ok((
            ArchiveHeader {
                api_commit_id,
                server_commit_id,
                obj_name,
                timestamp_ms,
                vg_id,
                file_seq,
            },
            name_end + 13,
        ))
    }
}

fn pad_ascii(s: &str, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

fn ascii_trim(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// A single body block: `block_type`, `msg_type`, and a payload that is
/// CRC-32 checked as written to disk (i.e. post-compression, if the
/// coordinator is configured to compress).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBlock {
    /// Block kind, one of `{1, 2, 3}` per the source format (metadata,
    /// index, data — exact numbering is opaque to this crate; callers
    /// pick the value).
    pub block_type: u8,
    /// Application-defined message type tag.
    pub msg_type: u16,
    /// Payload bytes, exactly as they should land on disk.
    pub payload: Vec<u8>,
}

impl ArchiveBlock {
    /// Serialize this block, computing its CRC-32 over `payload`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.payload.len() + 4);
        out.push(self.block_type);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.msg_type.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&compute_crc32(&self.payload).to_le_bytes());
        out
    }

    /// Parse one block from the front of `bytes`, verifying its CRC.
    /// Returns the block and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 7 {
            return Err(Error::DataCorruption("archive block too short for prefix".to_string()));
        }
        let block_type = bytes[0];
        let msg_len = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
        let msg_type = u16::from_le_bytes(bytes[5..7].try_into().unwrap());
        let payload_start = 7;
        let payload_end = payload_start + msg_len;
        if bytes.len() < payload_end + 4 {
            return Err(Error::DataCorruption("archive block too short for payload+crc".to_string()));
        }
        let payload = bytes[payload_start..payload_end].to_vec();
        let stored_crc = u32::from_le_bytes(bytes[payload_end..payload_end + 4].try_into().unwrap());
        let computed_crc = compute_crc32(&payload);
        if computed_crc != stored_crc {
            return Err(Error::DataCorruption(format!(
                "block CRC mismatch: stored {stored_crc:08x}, computed {computed_crc:08x}"
            )));
        }
        Ok((
            ArchiveBlock {
                block_type,
                msg_type,
                payload,
            },
            payload_end + 4,
        ))
    }
}

fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Compress `payload` with zstd at `level` before it's wrapped in an
/// [`ArchiveBlock`], so the block's CRC covers the bytes actually
/// written to disk.
pub fn compress_payload(payload: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::encode_all(payload, level).map_err(|e| Error::FileIo(e.to_string()))
}

/// Decompress a payload previously produced by [`compress_payload`].
pub fn decompress_payload(payload: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(payload).map_err(|e| Error::DataCorruption(e.to_string()))
}
