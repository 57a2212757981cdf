// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! WAV recording of the receiver audio.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to write recording: {0}")]
    Wav(#[from] hound::Error),
}

/// `krx_<UTC start>UTC.wav`
pub fn file_name(started: DateTime<Utc>) -> String {
    format!("krx_{}UTC.wav", started.format("%Y-%m-%dT%H_%M_%S"))
}

/// Collects mono samples in memory and writes them out on [`finish`].
///
/// [`finish`]: RecordingSink::finish
#[derive(Debug)]
pub struct RecordingSink {
    path: PathBuf,
    started: DateTime<Utc>,
    sample_rate: u32,
    samples: Vec<i16>,
}

impl RecordingSink {
    pub fn start(dir: &Path, sample_rate: u32) -> Self {
        Self::started_at(dir, sample_rate, Utc::now())
    }

    pub fn started_at(dir: &Path, sample_rate: u32, started: DateTime<Utc>) -> Self {
        let path = dir.join(file_name(started));
        info!("Recording started: {}", path.display());
        Self {
            path,
            started,
            sample_rate,
            samples: Vec::new(),
        }
    }

    pub fn append(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Write a single-channel 16-bit file and return its path.
    pub fn finish(self) -> Result<PathBuf, RecordingError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&self.path, spec)?;
        for sample in &self.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        info!(
            "Recording saved: {} ({:.1} s)",
            self.path.display(),
            self.duration_secs()
        );
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_format() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(file_name(t), "krx_2024-03-09T07_05_01UTC.wav");
    }

    #[test]
    fn test_finish_writes_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut sink = RecordingSink::started_at(dir.path(), 48_000, t);
        sink.append(&[1, -2, 3]);
        sink.append(&[i16::MAX, i16::MIN]);
        assert_eq!(sink.len(), 5);

        let path = sink.finish().unwrap();
        assert_eq!(path, dir.path().join("krx_2024-01-01T00_00_00UTC.wav"));

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -2, 3, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::started_at(&dir.path().join("absent"), 12_000, Utc::now());
        assert!(sink.finish().is_err());
    }
}
