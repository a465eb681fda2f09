//! In-memory WAV encoding of captured buffers.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{AudioBuffer, Result};

/// Encode buffers as a 32-bit float WAV file. The format of the first buffer
/// is used for the header. Returns `None` when there is no audio.
pub fn encode_wav(buffers: &[AudioBuffer]) -> Result<Option<Vec<u8>>> {
    let Some(first) = buffers.first() else {
        return Ok(None);
    };

    let spec = WavSpec {
        channels: first.channels.max(1),
        sample_rate: first.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let total: usize = buffers.iter().map(|b| b.samples.len()).sum();
    let mut cursor = Cursor::new(Vec::with_capacity(44 + total * 4));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for buffer in buffers {
            for &sample in &buffer.samples {
                writer.write_sample(sample)?;
            }
        }
        // Finalize the writer so it writes the proper framing information.
        writer.finalize()?;
    }

    Ok(Some(cursor.into_inner()))
}
