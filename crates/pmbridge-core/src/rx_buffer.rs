//! Software receive buffer between the UART and the scheduler.
//!
//! A reader task pushes bytes as they arrive; the scheduler drains them once
//! per tick through [`RxReader`]. When the buffer is full the oldest bytes
//! are dropped, so the newest frames always survive a long gap between
//! drains. A frame cut by the drop is discarded by the parser's resync.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady};

pub struct RxBuffer<const N: usize> {
    pipe: Pipe<CriticalSectionRawMutex, N>,
}

impl<const N: usize> RxBuffer<N> {
    pub const fn new() -> Self {
        Self { pipe: Pipe::new() }
    }

    /// Append received bytes, evicting the oldest ones if needed.
    ///
    /// Returns the number of bytes evicted.
    pub fn push(&self, bytes: &[u8]) -> usize {
        // Only the newest N bytes can ever be kept
        let bytes = &bytes[bytes.len().saturating_sub(N)..];

        let mut evicted = 0;
        let mut pending = bytes;
        let mut scratch = [0u8; 16];
        while !pending.is_empty() {
            match self.pipe.try_write(pending) {
                Ok(written) => pending = &pending[written..],
                Err(_) => {
                    let room = pending.len().min(scratch.len());
                    evicted += self.pipe.try_read(&mut scratch[..room]).unwrap_or(0);
                }
            }
        }
        evicted
    }

    /// Bytes waiting to be drained.
    pub fn len(&self) -> usize {
        self.pipe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipe.is_empty()
    }

    pub fn clear(&self) {
        self.pipe.clear();
    }

    /// Non-blocking reader for the scheduler's drain step.
    pub fn reader(&self) -> RxReader<'_, N> {
        RxReader { buffer: self }
    }
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RxReader<'a, const N: usize> {
    buffer: &'a RxBuffer<N>,
}

impl<const N: usize> ErrorType for RxReader<'_, N> {
    type Error = ErrorKind;
}

impl<const N: usize> ReadReady for RxReader<'_, N> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.buffer.is_empty())
    }
}

impl<const N: usize> Read for RxReader<'_, N> {
    /// Returns 0 when nothing is buffered instead of waiting.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        Ok(self.buffer.pipe.try_read(buf).unwrap_or(0))
    }
}
