//! A compressed set of 64-bit block-ids.
//!
//! [`Bitmap`] wraps [`roaring::RoaringTreemap`] (the 64-bit Roaring
//! variant) behind the narrower API the bitmap engine actually needs:
//! membership, set algebra, bounded materialization, and portable
//! serialization. Not thread-safe on its own — callers hold the owning
//! engine's write lock (see `backup-engine::BitmapEngine`).

#![warn(missing_docs)]

use backup_core::BlockId;
use roaring::RoaringTreemap;
use std::io;

/// A compressed set of 64-bit block-ids.
///
/// Efficient for both sparse and dense sets at the 10^9-element scale the
/// block-id space can reach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    inner: RoaringTreemap,
}

impl Bitmap {
    /// An empty bitmap.
    pub fn new() -> Self {
        Bitmap::default()
    }

    /// Insert `id`. Returns `true` if it was not already present.
    pub fn add(&mut self, id: BlockId) -> bool {
        self.inner.insert(id.get())
    }

    /// Remove `id`. Returns `true` if it was present.
    pub fn remove(&mut self, id: BlockId) -> bool {
        self.inner.remove(id.get())
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: BlockId) -> bool {
        self.inner.contains(id.get())
    }

    /// Remove every member.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Number of members.
    pub fn cardinality(&self) -> u64 {
        self.inner.len()
    }

    /// Whether the bitmap has no members.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// In-place union with `other`.
    pub fn union_with(&mut self, other: &Bitmap) {
        self.inner |= &other.inner;
    }

    /// In-place intersection with `other`.
    pub fn intersect_with(&mut self, other: &Bitmap) {
        self.inner &= &other.inner;
    }

    /// In-place difference: remove every member also present in `other`.
    pub fn difference_with(&mut self, other: &Bitmap) {
        self.inner -= &other.inner;
    }

    /// Union of `self` and `other`, without mutating either.
    pub fn union(&self, other: &Bitmap) -> Bitmap {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    /// Intersection of `self` and `other`, without mutating either.
    pub fn intersection(&self, other: &Bitmap) -> Bitmap {
        let mut out = self.clone();
        out.intersect_with(other);
        out
    }

    /// Write up to `max` ascending members into a fresh `Vec`.
    pub fn to_array(&self, max: usize) -> Vec<BlockId> {
        self.inner.iter().take(max).map(BlockId::new).collect()
    }

    /// Serialize to the Roaring "portable" format: stable across machines
    /// of identical endianness, the format callers should use for
    /// archival or cross-process transfer.
    pub fn portable_serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.inner.serialized_size());
        // RoaringTreemap's own serialize format IS the portable format;
        // unwrap is safe because writing to a Vec cannot fail.
        self.inner
            .serialize_into(&mut buf)
            .expect("writing to an in-memory Vec cannot fail");
        buf
    }

    /// Inverse of [`Bitmap::portable_serialize`].
    pub fn portable_deserialize(bytes: &[u8]) -> Result<Bitmap, BitmapError> {
        let inner = RoaringTreemap::deserialize_from(bytes).map_err(|e| {
            BitmapError::InvalidEncoding(format!("malformed roaring treemap: {e}"))
        })?;
        Ok(Bitmap { inner })
    }

    /// Size in bytes of [`Bitmap::portable_serialize`]'s output, without
    /// actually serializing.
    pub fn serialized_size(&self) -> usize {
        self.inner.serialized_size()
    }

    /// Approximate heap footprint of this bitmap, for the engine's memory
    /// accounting (see `EngineConfig::memory_limit_mb`).
    pub fn memory_bytes(&self) -> usize {
        self.inner.serialized_size()
    }

    /// Smallest member, if any.
    pub fn min(&self) -> Option<BlockId> {
        self.inner.min().map(BlockId::new)
    }

    /// Largest member, if any.
    pub fn max(&self) -> Option<BlockId> {
        self.inner.max().map(BlockId::new)
    }
}

impl FromIterator<BlockId> for Bitmap {
    fn from_iter<T: IntoIterator<Item = BlockId>>(iter: T) -> Self {
        let mut b = Bitmap::new();
        for id in iter {
            b.add(id);
        }
        b
    }
}

/// Errors produced while decoding a [`Bitmap`] from bytes.
#[derive(Debug, thiserror::Error)]
pub enum BitmapError {
    /// The byte buffer is not a well-formed portable bitmap encoding.
    #[error("invalid bitmap encoding: {0}")]
    InvalidEncoding(String),
    /// Underlying I/O failure while reading the buffer.
    #[error("I/O error reading bitmap: {0}")]
    Io(#[from] io::Error),
}
