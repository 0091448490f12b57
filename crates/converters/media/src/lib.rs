mod wav;

use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::wav::WavWriter;

static FFMPEG_PATH: OnceLock<String> = OnceLock::new();

/// Set the ffmpeg binary used by [`mp4_to_mp3`].  The first call wins;
/// without a call, `ffmpeg` is looked up on `PATH`.
pub fn set_ffmpeg_path(path: impl Into<String>) {
    let _ = FFMPEG_PATH.set(path.into());
}

fn ffmpeg_path() -> &'static str {
    FFMPEG_PATH.get().map(String::as_str).unwrap_or("ffmpeg")
}

/// Check if a file is audio or video we convert, based on extension.
pub fn accepts(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_lowercase();
        is_audio_ext(&ext) || is_video_ext(&ext)
    } else {
        false
    }
}

pub fn is_audio_ext(ext: &str) -> bool {
    ext == "mp3"
}

pub fn is_video_ext(ext: &str) -> bool {
    ext == "mp4"
}

// ============================================================================
// MP4 → MP3
// ============================================================================

/// Extract the audio track of an MP4 and encode it as MP3 with ffmpeg.
pub fn mp4_to_mp3(input: &Path, output: &Path) -> anyhow::Result<()> {
    // Only a definite "no audio" verdict stops us here; containers symphonia
    // cannot parse are left for ffmpeg to judge.
    match open_format(input, "mp4") {
        Ok(format) if !has_audio_track(format.as_ref()) => bail!("MP4 has no audio track"),
        Ok(_) => {}
        Err(e) => tracing::debug!("symphonia could not probe {}: {e:#}", input.display()),
    }

    let args = [
        OsStr::new("-hide_banner"),
        OsStr::new("-nostdin"),
        OsStr::new("-y"),
        OsStr::new("-i"),
        input.as_os_str(),
        OsStr::new("-vn"),
        OsStr::new("-codec:a"),
        OsStr::new("libmp3lame"),
        OsStr::new("-q:a"),
        OsStr::new("2"),
        output.as_os_str(),
    ];
    run_ffmpeg(ffmpeg_path(), &args)
}

fn run_ffmpeg(bin: &str, args: &[&OsStr]) -> anyhow::Result<()> {
    tracing::debug!("running {bin} {:?}", args);
    let out = match Command::new(bin).args(args).output() {
        Ok(out) => out,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            bail!("ffmpeg not found (looked for '{bin}')")
        }
        Err(e) => return Err(e).context("running ffmpeg"),
    };
    if out.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&out.stderr);
    Err(anyhow!("ffmpeg failed ({}): {}", out.status, stderr_tail(&stderr, 5)))
}

/// Last `n` non-empty lines of ffmpeg's stderr; the banner and stream dump
/// come first and the actual error last.
fn stderr_tail(stderr: &str, n: usize) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("; ")
}

// ============================================================================
// MP3 → WAV
// ============================================================================

/// Decode an MP3 and write it as 16-bit PCM WAV at the source rate and
/// channel count.
pub fn mp3_to_wav(input: &Path, output: &Path) -> anyhow::Result<()> {
    let mut format = open_format(input, "mp3")?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("no audio track")?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("unsupported audio codec")?;

    let mut wav: Option<WavWriter> = None;
    let mut sample_buf: Option<SampleBuffer<i16>> = None;
    let mut bad_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("reading MP3 stream"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                bad_packets += 1;
                tracing::debug!("skipping undecodable MP3 frame: {e}");
                continue;
            }
            Err(e) => return Err(e).context("decoding MP3"),
        };

        let spec = *decoded.spec();
        if wav.is_none() {
            let channels = u16::try_from(spec.channels.count()).context("too many channels")?;
            wav = Some(WavWriter::create(output, channels, spec.rate)?);
        }
        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<i16>::new(decoded.capacity() as u64, spec)
        });
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        if let Some(w) = wav.as_mut() {
            w.write_samples(buf.samples())?;
        }
    }

    if bad_packets > 0 {
        tracing::warn!("{}: skipped {bad_packets} undecodable frames", input.display());
    }
    match wav {
        Some(w) => w.finish(),
        None => bail!("no audio could be decoded"),
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn open_format(path: &Path, ext: &str) -> anyhow::Result<Box<dyn FormatReader>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(ext);
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("unrecognised {} file", ext.to_uppercase()))?;
    Ok(probed.format)
}

fn has_audio_track(format: &dyn FormatReader) -> bool {
    format
        .tracks()
        .iter()
        .any(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
}
