//! Constant-database engine: a build-once, read-many on-disk hash table.
//!
//! Layout, all integers little-endian u32:
//! - bytes `[0, 2048)`: 256 `(table_pos, table_nslots)` pairs indexed by
//!   `hash & 0xff`
//! - bytes `[2048, data_end)`: records, each `klen, vlen, key, value`
//! - bytes `[data_end, EOF)`: 256 open-addressed hash tables of
//!   `(hash, record_pos)` slots; `(0, 0)` marks an empty slot
//!
//! Every table is sized at twice its bucket's entry count, so load factor
//! never exceeds 50% and lookup of an absent key always reaches an empty
//! slot within `nslots` probes.
//!
//! The file is immutable once built; an update means rebuilding the whole
//! file. This module has no opinions about what the keys and values mean.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::Mmap;

/// Size of the bucket-pointer header.
pub const HEADER_LEN: u32 = 2048;

const HASH_START: u32 = 5381;

/// The djb hash: `h = h + (h << 5); h ^= byte`, mod 2^32, seeded with 5381.
pub fn cdb_hash(key: &[u8]) -> u32 {
    let mut h = HASH_START;
    for &b in key {
        h = h.wrapping_add(h << 5);
        h ^= u32::from(b);
    }
    h
}

/// Bulk builder. Records are streamed to the writer as they are added;
/// `finish` appends the 256 hash tables and backfills the header.
pub struct CdbWriter<W: Write + Seek> {
    out: W,
    pos: u32,
    buckets: Vec<Vec<(u32, u32)>>,
}

impl<W: Write + Seek> CdbWriter<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        out.seek(SeekFrom::Start(u64::from(HEADER_LEN)))?;
        Ok(Self {
            out,
            pos: HEADER_LEN,
            buckets: vec![Vec::new(); 256],
        })
    }

    /// Append one record. Keys are not checked for uniqueness; duplicate
    /// keys are all stored and lookup returns the first inserted.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> io::Result<()> {
        let klen = len_u32(key.len())?;
        let vlen = len_u32(value.len())?;
        self.out.write_all(&klen.to_le_bytes())?;
        self.out.write_all(&vlen.to_le_bytes())?;
        self.out.write_all(key)?;
        self.out.write_all(value)?;

        let h = cdb_hash(key);
        self.buckets[(h & 0xff) as usize].push((h, self.pos));
        self.pos = checked_pos(self.pos, 8 + u64::from(klen) + u64::from(vlen))?;
        Ok(())
    }

    /// Write the hash tables and the header, returning the underlying
    /// writer with its contents flushed.
    pub fn finish(mut self) -> io::Result<W> {
        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        for bucket in &self.buckets {
            let nslots = 2 * bucket.len() as u32;
            header.extend_from_slice(&self.pos.to_le_bytes());
            header.extend_from_slice(&nslots.to_le_bytes());

            let mut table = vec![(0u32, 0u32); nslots as usize];
            for &(h, p) in bucket {
                let mut n = ((h >> 8) % nslots) as usize;
                // Linear probe to the first empty slot. Terminates: the
                // table has twice as many slots as entries.
                while table[n] != (0, 0) {
                    n = (n + 1) % nslots as usize;
                }
                table[n] = (h, p);
            }
            for (h, p) in table {
                self.out.write_all(&h.to_le_bytes())?;
                self.out.write_all(&p.to_le_bytes())?;
                self.pos = checked_pos(self.pos, 8)?;
            }
        }

        self.out.flush()?;
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&header)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

fn len_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "CDB field longer than u32"))
}

fn checked_pos(pos: u32, add: u64) -> io::Result<u32> {
    u64::from(pos)
        .checked_add(add)
        .and_then(|p| u32::try_from(p).ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "CDB file would exceed 4 GiB"))
}

/// Read-only view of a built file. The whole file is memory-mapped for the
/// lifetime of this value; lookups and iteration borrow from the map.
pub struct Cdb {
    map: Mmap,
}

impl Cdb {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        // Safety: the format is build-once; writers replace the file via
        // rename rather than mutating it in place.
        let map = unsafe { Mmap::map(&file)? };
        if map.len() < HEADER_LEN as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "CDB file shorter than its header",
            ));
        }
        Ok(Self { map })
    }

    fn u32_at(&self, pos: usize) -> Option<u32> {
        let bytes = self.map.get(pos..pos.checked_add(4)?)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Point lookup. `None` is ordinary absence, not an error.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let h = cdb_hash(key);
        let header_slot = ((h & 0xff) as usize) * 8;
        let table_pos = self.u32_at(header_slot)? as usize;
        let nslots = self.u32_at(header_slot + 4)? as usize;
        if nslots == 0 {
            return None;
        }

        let start = ((h >> 8) as usize) % nslots;
        for i in 0..nslots {
            let slot_pos = table_pos + ((start + i) % nslots) * 8;
            let stored_hash = self.u32_at(slot_pos)?;
            let record_pos = self.u32_at(slot_pos + 4)? as usize;
            if record_pos == 0 {
                // Empty slot before any match: the key is absent. The 50%
                // load factor guarantees absent keys reach one of these.
                return None;
            }
            if stored_hash != h {
                continue;
            }
            let klen = self.u32_at(record_pos)? as usize;
            if klen != key.len() {
                continue;
            }
            let vlen = self.u32_at(record_pos + 4)? as usize;
            let key_start = record_pos + 8;
            if self.map.get(key_start..key_start + klen)? != key {
                continue;
            }
            let value_start = key_start + klen;
            return self.map.get(value_start..value_start + vlen);
        }
        None
    }

    /// Iterate `(key, value)` records in insertion order.
    pub fn iter(&self) -> CdbIter<'_> {
        let data_end = self.u32_at(0).unwrap_or(HEADER_LEN) as usize;
        CdbIter {
            map: &self.map,
            pos: HEADER_LEN as usize,
            data_end,
        }
    }
}

pub struct CdbIter<'a> {
    map: &'a [u8],
    pos: usize,
    data_end: usize,
}

impl<'a> Iterator for CdbIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data_end {
            return None;
        }
        let klen = read_u32(self.map, self.pos)? as usize;
        let vlen = read_u32(self.map, self.pos + 4)? as usize;
        let key_start = self.pos + 8;
        let key = self.map.get(key_start..key_start + klen)?;
        let value = self.map.get(key_start + klen..key_start + klen + vlen)?;
        self.pos = key_start + klen + vlen;
        Some((key, value))
    }
}

fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}
