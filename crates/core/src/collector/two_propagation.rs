//! Full-frame checkpointing
//!
//! Frames accumulate in a chunk of `max_nt` frames. When the whole history
//! fits the memory budget the chunk never fills and nothing touches the disk.
//! Otherwise every full chunk is spilled through the [`ChunkStore`] and read
//! back chunk by chunk while fetching.

use tracing::{debug, info, warn};

use super::checkpoint::ChunkStore;
use super::ForwardCollector;
use crate::error::{ConfigurationError, Result};
use crate::grid::GridBox;

const NAME: &str = "TwoPropagation";

/// Stores every forward frame, spilling to disk beyond the memory budget
#[derive(Debug)]
pub struct TwoPropagation {
    store: ChunkStore,
    memory_budget: Option<u64>,
    frame_len: usize,
    max_nt: usize,
    mem_fit: bool,
    /// Frames of the chunk being filled (forward) or read (backward)
    chunk: Vec<f32>,
    /// Chunk index held in `chunk` during the backward pass
    resident: Option<usize>,
    spilled: usize,
    saved: usize,
    fetched: usize,
    grid: Option<GridBox>,
}

impl TwoPropagation {
    /// Collector writing spilled chunks through `store`
    pub fn new(store: ChunkStore, memory_budget: Option<u64>) -> Self {
        Self {
            store,
            memory_budget,
            frame_len: 0,
            max_nt: 0,
            mem_fit: true,
            chunk: Vec::new(),
            resident: None,
            spilled: 0,
            saved: 0,
            fetched: 0,
            grid: None,
        }
    }

    /// Frames per chunk for the last forward pass
    pub fn frames_per_chunk(&self) -> usize {
        self.max_nt
    }

    /// True when the last forward pass kept every frame in memory
    pub fn fits_in_memory(&self) -> bool {
        self.mem_fit
    }

    /// Chunks written to disk during the last forward pass
    pub fn spilled_chunks(&self) -> usize {
        self.spilled
    }

    /// Largest chunk that fits the budget: halve from `frames` until it does
    fn chunk_frames(&self, frames: usize) -> usize {
        let frame_bytes = (self.frame_len * std::mem::size_of::<f32>()) as u64;
        let Some(budget) = self.memory_budget else {
            return frames;
        };
        let mut max_nt = frames.max(1);
        while max_nt > 1 && max_nt as u64 * frame_bytes > budget {
            max_nt = max_nt.div_ceil(2);
        }
        if max_nt as u64 * frame_bytes > budget {
            warn!(
                budget,
                frame_bytes, "Memory budget is smaller than one frame, keeping one frame resident"
            );
        }
        max_nt
    }

    fn push_frame(&mut self, frame: &[f32]) -> Result<()> {
        self.chunk.extend_from_slice(frame);
        self.saved += 1;
        if !self.mem_fit && self.chunk.len() == self.max_nt * self.frame_len {
            self.store
                .write_chunk(self.spilled, &self.chunk, self.frame_len)?;
            self.spilled += 1;
            self.chunk.clear();
        }
        Ok(())
    }
}

impl ForwardCollector for TwoPropagation {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reset_grid(&mut self, main: &mut GridBox, forward_run: bool) -> Result<()> {
        if forward_run {
            self.frame_len = main.window_size().cells();
            self.max_nt = self.chunk_frames(main.nt);
            self.mem_fit = self.max_nt >= main.nt;
            self.chunk = Vec::with_capacity(self.max_nt * self.frame_len);
            self.resident = None;
            self.spilled = 0;
            self.saved = 0;
            self.grid = None;
            info!(
                nt = main.nt,
                max_nt = self.max_nt,
                mem_fit = self.mem_fit,
                codec = ?self.store.codec(),
                "Forward frames storage prepared"
            );
        } else {
            let frame = main.pressure_current().data.clone();
            self.push_frame(&frame)?;
            self.resident = (!self.chunk.is_empty()).then_some(self.spilled);
            let mut grid = main.clone();
            grid.reset_wavefields();
            self.grid = Some(grid);
        }
        self.fetched = 0;
        main.reset_wavefields();
        Ok(())
    }

    fn save_forward(&mut self, main: &GridBox) -> Result<()> {
        if main.pressure_current().len() != self.frame_len {
            return Err(ConfigurationError::InvalidGeometry(format!(
                "frame of {} cells does not match the prepared {} cells",
                main.pressure_current().len(),
                self.frame_len
            ))
            .into());
        }
        self.push_frame(&main.pressure_current().data)
    }

    fn fetch_forward(&mut self) -> Result<()> {
        if self.grid.is_none() {
            return Err(ConfigurationError::MissingGrid("two propagation grid").into());
        }
        let fetched = self.fetched + 1;
        let frame = self
            .saved
            .checked_sub(fetched)
            .ok_or(ConfigurationError::MissingGrid("forward frame"))?;
        let (chunk_index, offset) = if self.mem_fit {
            (0, frame)
        } else {
            (frame / self.max_nt, frame % self.max_nt)
        };
        if !self.mem_fit && self.resident != Some(chunk_index) {
            // a failed read leaves the previous chunk and frame in place
            let chunk = self
                .store
                .read_chunk(chunk_index, self.max_nt, self.frame_len)?;
            self.chunk = chunk;
            self.resident = Some(chunk_index);
            debug!(chunk = chunk_index, "Checkpoint chunk loaded");
        }
        let start = offset * self.frame_len;
        let source = self
            .chunk
            .get(start..start + self.frame_len)
            .ok_or(ConfigurationError::MissingGrid("forward frame"))?;
        if let Some(grid) = self.grid.as_mut() {
            grid.pressure_current_mut().data.copy_from_slice(source);
        }
        self.fetched = fetched;
        Ok(())
    }

    fn forward_grid(&self) -> Option<&GridBox> {
        self.grid.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ChunkCodec;
    use crate::error::{RtmError, StorageError};
    use crate::model::ModelBuilder;
    use crate::parameters::{ComputationParameters, HalfLength};

    fn grid() -> GridBox {
        let params = ComputationParameters::new(HalfLength::O2, 1);
        ModelBuilder::homogeneous(6, 1, 6, 10.0, 1500.0)
            .total_time(0.01)
            .build(&params)
            .unwrap()
    }

    fn run(collector: &mut TwoPropagation, main: &mut GridBox, frames: usize) -> Vec<f32> {
        collector.reset_grid(main, true).unwrap();
        let mut expected = Vec::new();
        for j in 0..frames {
            main.pressure_current_mut().fill(j as f32);
            expected.push(j as f32);
            if j + 1 < frames {
                collector.save_forward(main).unwrap();
            }
        }
        collector.reset_grid(main, false).unwrap();
        expected
    }

    #[test]
    fn test_in_memory_frames_come_back_reversed() {
        let mut main = grid();
        let nt = main.nt;
        let mut collector = TwoPropagation::new(
            ChunkStore::new(std::path::Path::new("unused"), ChunkCodec::Raw),
            None,
        );
        let expected = run(&mut collector, &mut main, nt);
        assert!(collector.fits_in_memory());
        for k in 1..nt {
            collector.fetch_forward().unwrap();
            let p = collector.forward_grid().unwrap().pressure_current();
            assert!(p.data.iter().all(|&v| v == expected[nt - k]));
        }
    }

    #[test]
    fn test_spilled_frames_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut main = grid();
        let nt = main.nt;
        let frame_bytes = (main.window_size().cells() * 4) as u64;
        let mut collector = TwoPropagation::new(
            ChunkStore::new(dir.path(), ChunkCodec::Raw),
            Some(frame_bytes * 3),
        );
        let expected = run(&mut collector, &mut main, nt);
        assert!(!collector.fits_in_memory());
        assert!(collector.frames_per_chunk() <= 3);
        assert!(collector.spilled_chunks() > 0);
        for k in 1..nt {
            collector.fetch_forward().unwrap();
            let p = collector.forward_grid().unwrap().pressure_current();
            assert!(p.data.iter().all(|&v| v == expected[nt - k]), "fetch {k}");
        }
    }

    #[test]
    fn test_missing_spill_file_surfaces_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut main = grid();
        let nt = main.nt;
        let frame_bytes = (main.window_size().cells() * 4) as u64;
        let mut collector = TwoPropagation::new(
            ChunkStore::new(dir.path(), ChunkCodec::Raw),
            Some(frame_bytes),
        );
        run(&mut collector, &mut main, nt);
        assert_eq!(collector.frames_per_chunk(), 1);
        std::fs::remove_dir_all(dir.path().join("two_prop")).unwrap();
        // every frame lives on disk, so the first fetch already needs a read
        let before = collector.forward_grid().unwrap().pressure_current().clone();
        let err = collector.fetch_forward().unwrap_err();
        assert!(matches!(err, RtmError::Storage(StorageError::Read { .. })));
        assert_eq!(collector.forward_grid().unwrap().pressure_current(), &before);
    }
}
