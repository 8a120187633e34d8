//! Spill files for full-frame checkpoints
//!
//! A chunk is `frames * frame_len` floats written to
//! `<write_path>/two_prop/temp_<chunk>`. Raw chunks are the native-endian
//! float dump. Quantized chunks hold one record per frame:
//!
//! ```text
//! [u64 LE payload length][f32 LE step][zstd(i32 LE quantized values)]
//! ```
//!
//! where `value ≈ quantized * step` and `|error| <= step / 2`. A frame whose
//! peak spans more than [`MAX_LEVELS`] steps is stored lossless instead: its
//! record carries step `0` and the payload holds the f32 values.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::error::StorageError;

const ZSTD_LEVEL: i32 = 3;
const RECORD_HEADER: usize = 12;

/// Largest `peak / step` that is quantized. Keeps `quantized` far inside
/// `i32` and exact as an f32, so the decoded value only adds f32 rounding.
pub const MAX_LEVELS: f32 = 1_048_576.0;

/// How chunks are encoded on disk
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkCodec {
    /// Native float dump
    Raw,
    /// Uniform quantization followed by zstd
    Quantized {
        /// Absolute error bound, or precision bits when `relative`
        tolerance: f32,
        /// Error bound is `max|frame| * 2^-tolerance`
        relative: bool,
        /// Encode and decode frames in parallel
        parallel: bool,
    },
}

impl ChunkCodec {
    /// Quantization step for one frame; error is bounded by half of it.
    ///
    /// `0` means the frame is kept lossless, either because the codec is raw
    /// or because the tolerance is finer than the frame can be quantized at.
    fn step(&self, frame: &[f32]) -> f32 {
        let ChunkCodec::Quantized {
            tolerance,
            relative,
            ..
        } = *self
        else {
            return 0.0;
        };
        let peak = frame.iter().fold(0.0_f32, |m, v| m.max(v.abs()));
        let step = if relative {
            let step = 2.0 * peak * (-tolerance).exp2();
            if step > 0.0 {
                step
            } else {
                1.0
            }
        } else {
            2.0 * tolerance
        };
        // a relative step can underflow to zero on tiny peaks
        if step > 0.0 && peak <= step * MAX_LEVELS {
            step
        } else {
            trace!(peak, step, "Frame too fine to quantize, stored lossless");
            0.0
        }
    }

    fn parallel(&self) -> bool {
        matches!(self, ChunkCodec::Quantized { parallel: true, .. })
    }
}

/// Directory of spilled chunks and the codec they use
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
    codec: ChunkCodec,
}

impl ChunkStore {
    /// Store under `<write_path>/two_prop`
    pub fn new(write_path: &Path, codec: ChunkCodec) -> Self {
        Self {
            dir: write_path.join("two_prop"),
            codec,
        }
    }

    /// Chunk encoding
    pub fn codec(&self) -> ChunkCodec {
        self.codec
    }

    /// File holding chunk `index`
    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("temp_{index}"))
    }

    /// Encode and write one chunk.
    ///
    /// # Errors
    ///
    /// [`StorageError::CreateDirectory`] or [`StorageError::Write`].
    pub fn write_chunk(
        &self,
        index: usize,
        frames: &[f32],
        frame_len: usize,
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::CreateDirectory {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;
        let path = self.chunk_path(index);
        let write_err = |e: io::Error| StorageError::Write {
            path: path.clone(),
            message: e.to_string(),
        };
        let bytes = match self.codec {
            ChunkCodec::Raw => bytemuck::cast_slice::<f32, u8>(frames).to_vec(),
            ChunkCodec::Quantized { .. } => self.encode(frames, frame_len).map_err(write_err)?,
        };
        fs::write(&path, &bytes).map_err(write_err)?;
        debug!(
            path = %path.display(),
            frames = frames.len() / frame_len.max(1),
            bytes = bytes.len(),
            "Checkpoint chunk written"
        );
        Ok(())
    }

    /// Read and decode one chunk of `frames * frame_len` values.
    ///
    /// # Errors
    ///
    /// [`StorageError::Read`] when the file cannot be read and
    /// [`StorageError::Corrupt`] when its content does not hold the expected
    /// frames.
    pub fn read_chunk(
        &self,
        index: usize,
        frames: usize,
        frame_len: usize,
    ) -> Result<Vec<f32>, StorageError> {
        let path = self.chunk_path(index);
        let bytes = fs::read(&path).map_err(|e| StorageError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let corrupt = |message: String| StorageError::Corrupt {
            path: path.clone(),
            message,
        };
        match self.codec {
            ChunkCodec::Raw => {
                let expected = frames * frame_len * std::mem::size_of::<f32>();
                if bytes.len() != expected {
                    return Err(corrupt(format!(
                        "expected {expected} bytes, found {}",
                        bytes.len()
                    )));
                }
                let mut out = vec![0.0_f32; frames * frame_len];
                bytemuck::cast_slice_mut::<f32, u8>(&mut out).copy_from_slice(&bytes);
                Ok(out)
            }
            ChunkCodec::Quantized { .. } => self.decode(&bytes, frames, frame_len).map_err(corrupt),
        }
    }

    fn encode(&self, frames: &[f32], frame_len: usize) -> io::Result<Vec<u8>> {
        let encode_frame = |frame: &[f32]| -> io::Result<Vec<u8>> {
            let step = self.codec.step(frame);
            let payload = if step > 0.0 {
                let quantized: Vec<i32> =
                    frame.iter().map(|v| (v / step).round() as i32).collect();
                zstd::encode_all(bytemuck::cast_slice::<i32, u8>(&quantized), ZSTD_LEVEL)?
            } else {
                zstd::encode_all(bytemuck::cast_slice::<f32, u8>(frame), ZSTD_LEVEL)?
            };
            let mut record = Vec::with_capacity(RECORD_HEADER + payload.len());
            record.extend_from_slice(&(payload.len() as u64).to_le_bytes());
            record.extend_from_slice(&step.to_le_bytes());
            record.extend_from_slice(&payload);
            Ok(record)
        };
        let records: Vec<Vec<u8>> = if self.codec.parallel() {
            frames
                .par_chunks(frame_len)
                .map(encode_frame)
                .collect::<io::Result<_>>()?
        } else {
            frames
                .chunks(frame_len)
                .map(encode_frame)
                .collect::<io::Result<_>>()?
        };
        Ok(records.concat())
    }

    fn decode(&self, bytes: &[u8], frames: usize, frame_len: usize) -> Result<Vec<f32>, String> {
        let mut records = Vec::with_capacity(frames);
        let mut cursor = 0;
        while cursor < bytes.len() {
            let header = bytes
                .get(cursor..cursor + RECORD_HEADER)
                .ok_or_else(|| format!("truncated record header at byte {cursor}"))?;
            let mut len = [0u8; 8];
            len.copy_from_slice(&header[..8]);
            let mut step = [0u8; 4];
            step.copy_from_slice(&header[8..]);
            let len = u64::from_le_bytes(len) as usize;
            let start = cursor + RECORD_HEADER;
            let end = start
                .checked_add(len)
                .filter(|&end| end <= bytes.len())
                .ok_or_else(|| format!("truncated payload at byte {start}"))?;
            records.push((f32::from_le_bytes(step), &bytes[start..end]));
            cursor = end;
        }
        if records.len() != frames {
            return Err(format!("expected {frames} frames, found {}", records.len()));
        }

        let decode_frame = |(step, payload): &(f32, &[u8])| -> Result<Vec<f32>, String> {
            let raw = zstd::decode_all(*payload).map_err(|e| e.to_string())?;
            if raw.len() != frame_len * std::mem::size_of::<i32>() {
                return Err(format!(
                    "frame holds {} bytes, expected {}",
                    raw.len(),
                    frame_len * std::mem::size_of::<i32>()
                ));
            }
            if *step == 0.0 {
                let mut values = vec![0.0_f32; frame_len];
                bytemuck::cast_slice_mut::<f32, u8>(&mut values).copy_from_slice(&raw);
                return Ok(values);
            }
            if !(step.is_finite() && *step > 0.0) {
                return Err(format!("invalid quantization step {step}"));
            }
            let mut quantized = vec![0_i32; frame_len];
            bytemuck::cast_slice_mut::<i32, u8>(&mut quantized).copy_from_slice(&raw);
            Ok(quantized.iter().map(|&q| q as f32 * step).collect())
        };
        let decoded: Vec<Vec<f32>> = if self.codec.parallel() {
            records
                .par_iter()
                .map(decode_frame)
                .collect::<Result<_, _>>()?
        } else {
            records.iter().map(decode_frame).collect::<Result<_, _>>()?
        };
        Ok(decoded.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(count: usize, len: usize) -> Vec<f32> {
        (0..count * len)
            .map(|i| ((i as f32) * 0.173).sin() * (1.0 + i as f32 * 0.01))
            .collect()
    }

    #[test]
    fn test_raw_chunk_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), ChunkCodec::Raw);
        let data = frames(3, 50);
        store.write_chunk(0, &data, 50).unwrap();
        assert!(dir.path().join("two_prop").join("temp_0").exists());
        let back = store.read_chunk(0, 3, 50).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_quantized_chunk_respects_absolute_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        for parallel in [false, true] {
            let codec = ChunkCodec::Quantized {
                tolerance: 1e-3,
                relative: false,
                parallel,
            };
            let store = ChunkStore::new(dir.path(), codec);
            let data = frames(4, 64);
            store.write_chunk(1, &data, 64).unwrap();
            let back = store.read_chunk(1, 4, 64).unwrap();
            for (a, b) in data.iter().zip(&back) {
                assert!((a - b).abs() <= 1e-3 + 1e-6, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_quantized_chunk_relative_mode() {
        let dir = tempfile::tempdir().unwrap();
        let codec = ChunkCodec::Quantized {
            tolerance: 10.0,
            relative: true,
            parallel: false,
        };
        let store = ChunkStore::new(dir.path(), codec);
        let mut data = frames(2, 32);
        // all-zero frame keeps a usable step
        data[32..].fill(0.0);
        store.write_chunk(0, &data, 32).unwrap();
        let back = store.read_chunk(0, 2, 32).unwrap();
        let peak = data[..32].iter().fold(0.0_f32, |m, v| m.max(v.abs()));
        for (a, b) in data[..32].iter().zip(&back[..32]) {
            assert!((a - b).abs() <= peak * 2.0_f32.powi(-10) + 1e-6);
        }
        assert!(back[32..].iter().all(|&v| v == 0.0));
    }

    /// Frames that need more levels than quantization allows come back
    /// exactly instead of saturating
    #[test]
    fn test_fine_tolerance_on_large_amplitudes_stays_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![5000.0, -0.25, 1.0, 0.0, -3210.5, 0.125, 2.0e4, -7.75];
        let cases = [
            (1e-6, false),
            (1e-3, false),
            (0.5, false),
            (40.0, true),
            (24.0, true),
            (12.0, true),
        ];
        for (index, (tolerance, relative)) in cases.into_iter().enumerate() {
            let codec = ChunkCodec::Quantized {
                tolerance,
                relative,
                parallel: index % 2 == 0,
            };
            let store = ChunkStore::new(dir.path(), codec);
            store.write_chunk(index, &data, 4).unwrap();
            let back = store.read_chunk(index, 2, 4).unwrap();
            for (frame, decoded) in data.chunks(4).zip(back.chunks(4)) {
                let peak = frame.iter().fold(0.0_f32, |m, v| m.max(v.abs()));
                let bound = if relative {
                    peak * (-tolerance).exp2()
                } else {
                    tolerance
                };
                for (a, b) in frame.iter().zip(decoded) {
                    assert!(
                        (a - b).abs() <= bound,
                        "tolerance {tolerance} relative {relative}: {a} vs {b}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_coarse_tolerance_still_quantizes_large_amplitudes() {
        let codec = ChunkCodec::Quantized {
            tolerance: 0.5,
            relative: false,
            parallel: false,
        };
        assert_eq!(codec.step(&[5000.0, -1.0]), 1.0);
        // 2e6 / 1.0 levels is past the quantization range
        assert_eq!(codec.step(&[2.0e6, -1.0]), 0.0);
    }

    #[test]
    fn test_missing_chunk_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), ChunkCodec::Raw);
        assert!(matches!(
            store.read_chunk(7, 1, 10),
            Err(StorageError::Read { .. })
        ));
    }

    #[test]
    fn test_truncated_chunk_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), ChunkCodec::Raw);
        store.write_chunk(0, &frames(2, 10), 10).unwrap();
        assert!(matches!(
            store.read_chunk(0, 3, 10),
            Err(StorageError::Corrupt { .. })
        ));

        let codec = ChunkCodec::Quantized {
            tolerance: 0.1,
            relative: false,
            parallel: false,
        };
        let store = ChunkStore::new(dir.path(), codec);
        store.write_chunk(2, &frames(2, 10), 10).unwrap();
        let path = store.chunk_path(2);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(
            store.read_chunk(2, 2, 10),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
