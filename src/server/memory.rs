use crate::debugger::trap::ADDRESS_SPACE;
use crate::debugger::Error;
use crate::server::target::DebugTarget;

/// Serves byte ranges of emulated memory. Range is re-read from the target only when
/// forced, when it differs from the last served one or after [`MemorySegmentCache::invalidate`].
pub struct MemorySegmentCache {
    /// Whole address space sized buffer, reused between reads.
    data: Vec<u8>,
    start: u16,
    valid: bool,
}

impl Default for MemorySegmentCache {
    fn default() -> Self {
        Self {
            data: Vec::with_capacity(ADDRESS_SPACE),
            start: 0,
            valid: false,
        }
    }
}

impl MemorySegmentCache {
    /// Return encoded segment: 2-byte big-endian start followed by the raw bytes.
    /// Range is clamped to the address space.
    ///
    /// # Arguments
    ///
    /// * `target`: memory source
    /// * `start`: first address
    /// * `length`: requested number of bytes
    /// * `force`: ignore cached bytes
    pub fn segment(
        &mut self,
        target: &dyn DebugTarget,
        start: u32,
        length: u32,
        force: bool,
    ) -> Result<Vec<u8>, Error> {
        let (start, length) = clamp(start, length)?;

        let hit = !force && self.valid && self.start == start && self.data.len() == length;
        if !hit {
            self.valid = false;
            if self.data.capacity() < ADDRESS_SPACE {
                self.data.reserve_exact(ADDRESS_SPACE - self.data.len());
            }
            self.data.resize(length, 0);
            target.read_memory(start, &mut self.data)?;
            self.start = start;
            self.valid = true;
        }

        let mut frame = Vec::with_capacity(2 + self.data.len());
        frame.extend_from_slice(&self.start.to_be_bytes());
        frame.extend_from_slice(&self.data);
        Ok(frame)
    }

    /// Drop cached bytes, next request reads memory again.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

fn clamp(start: u32, length: u32) -> Result<(u16, usize), Error> {
    let first = u16::try_from(start).map_err(|_| Error::InvalidMemoryRange { start, length })?;
    let length = (length as usize).min(ADDRESS_SPACE - start as usize);
    Ok((first, length))
}
