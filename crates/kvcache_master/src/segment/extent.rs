//! Free-extent bookkeeping inside one segment.

use std::collections::BTreeMap;

/// Free byte ranges of a segment, keyed by start offset.
///
/// Adjacent free ranges are always coalesced, so the map never holds two
/// ranges that touch. `free_bytes` is the sum of all range lengths.
#[derive(Debug, Clone)]
pub(crate) struct ExtentMap {
    capacity: u64,
    free: BTreeMap<u64, u64>,
    free_bytes: u64,
}

impl ExtentMap {
    pub(crate) fn new(capacity: u64) -> Self {
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }
        Self {
            capacity,
            free,
            free_bytes: capacity,
        }
    }

    pub(crate) fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// Carves `len` bytes from the lowest-offset range that fits.
    pub(crate) fn allocate(&mut self, len: u64) -> Option<u64> {
        if len == 0 || len > self.free_bytes {
            return None;
        }
        let (&offset, &extent) = self.free.iter().find(|&(_, &extent)| extent >= len)?;
        self.free.remove(&offset);
        if extent > len {
            self.free.insert(offset + len, extent - len);
        }
        self.free_bytes -= len;
        Some(offset)
    }

    /// Returns `[offset, offset + len)` to the free map.
    ///
    /// Returns false, changing nothing, if the range lies outside the segment
    /// or overlaps bytes that are already free.
    pub(crate) fn release(&mut self, offset: u64, len: u64) -> bool {
        let Some(end) = offset.checked_add(len) else {
            return false;
        };
        if len == 0 || end > self.capacity {
            return false;
        }

        let prev = self
            .free
            .range(..=offset)
            .next_back()
            .map(|(&o, &l)| (o, l));
        if let Some((p_off, p_len)) = prev {
            if p_off + p_len > offset {
                return false;
            }
        }
        let next = self.free.range(offset..).next().map(|(&o, &l)| (o, l));
        if let Some((n_off, _)) = next {
            if n_off < end {
                return false;
            }
        }

        let mut start = offset;
        let mut length = len;
        if let Some((p_off, p_len)) = prev {
            if p_off + p_len == offset {
                self.free.remove(&p_off);
                start = p_off;
                length += p_len;
            }
        }
        if let Some((n_off, n_len)) = next {
            if n_off == end {
                self.free.remove(&n_off);
                length += n_len;
            }
        }
        self.free.insert(start, length);
        self.free_bytes += len;
        true
    }

    #[cfg(test)]
    pub(crate) fn extent_count(&self) -> usize {
        self.free.len()
    }
}
