use std::sync::Mutex;

use log::warn;

use crate::digitizer::SampleBlock;

#[derive(Debug, Default)]
struct StreamInner {
    analog: Vec<i16>,
    digital: Vec<u8>,
    overflow_blocks: usize,
}

/// Accumulates the raw sample stream for one scan.
///
/// Written only by the acquisition-poll activity and read only by the
/// orchestrator after both activities have joined. The lock exists for the
/// append itself, since device notifications may arrive on a driver-owned
/// thread; there is no reader on the hot path.
#[derive(Debug, Default)]
pub struct SampleStream {
    inner: Mutex<StreamInner>,
}

impl SampleStream {
    pub fn new() -> SampleStream {
        SampleStream::default()
    }

    /// Appends one block. Overflowed blocks are counted and kept; the
    /// stream keeps recording and downstream analysis deals with gaps.
    pub fn push_block(&self, block: &SampleBlock) {
        debug_assert_eq!(block.analog.len(), block.digital.len());
        let mut inner = self.inner.lock().unwrap();
        inner.analog.extend_from_slice(&block.analog);
        inner.digital.extend_from_slice(&block.digital);
        if block.overflow {
            inner.overflow_blocks += 1;
            warn!("digitizer reported overflow, stream may have gaps");
        }
    }

    /// Number of sample pairs accumulated so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().analog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks that arrived with the device's data-loss flag set.
    pub fn overflow_blocks(&self) -> usize {
        self.inner.lock().unwrap().overflow_blocks
    }

    /// Consumes the stream, yielding the aligned analog and digital
    /// sequences.
    pub fn into_samples(self) -> (Vec<i16>, Vec<u8>) {
        let inner = self.inner.into_inner().unwrap();
        (inner.analog, inner.digital)
    }

    /// Copies the sequences out without consuming. Fallback for when a
    /// clone of the stream handle is still alive.
    pub fn snapshot(&self) -> (Vec<i16>, Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        (inner.analog.clone(), inner.digital.clone())
    }
}
