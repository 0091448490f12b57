//! 16-bit PCM RIFF/WAVE output.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{ensure, Context};

const HEADER_LEN: u32 = 44;

pub struct WavWriter {
    out: BufWriter<File>,
    channels: u16,
    sample_rate: u32,
    data_bytes: u32,
}

impl WavWriter {
    /// Create the file and write a header with placeholder sizes; the sizes
    /// are patched in [`WavWriter::finish`].
    pub fn create(path: &Path, channels: u16, sample_rate: u32) -> anyhow::Result<Self> {
        ensure!(channels > 0, "audio has no channels");
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut w = Self { out: BufWriter::new(file), channels, sample_rate, data_bytes: 0 };
        w.write_header()?;
        Ok(w)
    }

    /// Append interleaved samples.
    pub fn write_samples(&mut self, samples: &[i16]) -> anyhow::Result<()> {
        for s in samples {
            self.out.write_all(&s.to_le_bytes())?;
        }
        let added = u32::try_from(samples.len() * 2).context("WAV data too large")?;
        self.data_bytes = self
            .data_bytes
            .checked_add(added)
            .context("WAV data exceeds 4 GiB")?;
        Ok(())
    }

    pub fn finish(mut self) -> anyhow::Result<()> {
        self.out.seek(SeekFrom::Start(0))?;
        self.write_header()?;
        self.out.flush()?;
        Ok(())
    }

    fn write_header(&mut self) -> std::io::Result<()> {
        let block_align = self.channels * 2;
        let byte_rate = self.sample_rate * u32::from(block_align);
        let out = &mut self.out;
        out.write_all(b"RIFF")?;
        out.write_all(&(HEADER_LEN - 8 + self.data_bytes).to_le_bytes())?;
        out.write_all(b"WAVE")?;
        out.write_all(b"fmt ")?;
        out.write_all(&16u32.to_le_bytes())?;
        out.write_all(&1u16.to_le_bytes())?; // PCM
        out.write_all(&self.channels.to_le_bytes())?;
        out.write_all(&self.sample_rate.to_le_bytes())?;
        out.write_all(&byte_rate.to_le_bytes())?;
        out.write_all(&block_align.to_le_bytes())?;
        out.write_all(&16u16.to_le_bytes())?;
        out.write_all(b"data")?;
        out.write_all(&self.data_bytes.to_le_bytes())?;
        Ok(())
    }
}
