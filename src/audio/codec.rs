//! # Audio Container Codec
//!
//! Encodes captured mono PCM into the canonical 44-byte WAV container that the
//! client uploads, and sniffs the container type of synthesized audio so the
//! player can pick a media type.
//!
//! ## WAV Layout (little-endian):
//! - **RIFF header**: `RIFF`, file size - 8, `WAVE`
//! - **fmt chunk**: size 16, PCM (1), 1 channel, sample rate, byte rate, block align 2, 16 bits
//! - **data chunk**: `data`, sample count * 2, then signed 16-bit samples

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Size of the canonical PCM WAV header produced by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

/// Payloads shorter than this are not sniffed and default to WAV.
const MIN_SNIFF_LEN: usize = 20;

/// Container type of an opaque audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    Wav,
    Mpeg,
}

impl AudioContainer {
    /// Media type handed to the playback layer.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioContainer::Wav => "audio/wav",
            AudioContainer::Mpeg => "audio/mpeg",
        }
    }

    /// File extension used when a player needs the payload on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioContainer::Wav => "wav",
            AudioContainer::Mpeg => "mp3",
        }
    }
}

/// Encode mono float samples in `[-1.0, 1.0]` as a 16-bit PCM WAV file.
///
/// Samples outside the range are clamped. Non-negative samples are scaled by
/// 32767 and negative ones by 32768 so both extremes map onto the full i16 range.
///
/// Fails when the sizes do not fit the 32-bit header fields.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, String> {
    let data_len = samples
        .len()
        .checked_mul(2)
        .and_then(|len| u32::try_from(len).ok())
        .filter(|len| *len <= u32::MAX - 36)
        .ok_or_else(|| format!("{} samples do not fit in a WAV file", samples.len()))?;
    let byte_rate = sample_rate
        .checked_mul(2)
        .ok_or_else(|| format!("sample rate {} is too high", sample_rate))?;
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);

    // Writes into a Vec<u8> cannot fail.
    out.extend_from_slice(b"RIFF");
    let _ = out.write_u32::<LittleEndian>(36 + data_len);
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    let _ = out.write_u32::<LittleEndian>(16);
    let _ = out.write_u16::<LittleEndian>(1); // PCM
    let _ = out.write_u16::<LittleEndian>(1); // mono
    let _ = out.write_u32::<LittleEndian>(sample_rate);
    let _ = out.write_u32::<LittleEndian>(byte_rate);
    let _ = out.write_u16::<LittleEndian>(2);
    let _ = out.write_u16::<LittleEndian>(16);

    out.extend_from_slice(b"data");
    let _ = out.write_u32::<LittleEndian>(data_len);

    for &sample in samples {
        let _ = out.write_i16::<LittleEndian>(quantize(sample));
    }

    Ok(out)
}

fn quantize(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// A decoded mono PCM16 WAV payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedWav {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedWav {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a canonical mono 16-bit PCM WAV file back into float samples.
///
/// Only the layout written by [`encode_wav`] is accepted; anything else is
/// reported as an error string rather than guessed at.
pub fn decode_pcm16_wav(bytes: &[u8]) -> Result<DecodedWav, String> {
    if bytes.len() < WAV_HEADER_LEN {
        return Err(format!("WAV payload too short: {} bytes", bytes.len()));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("Missing RIFF/WAVE signature".to_string());
    }
    if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return Err("Unsupported chunk layout".to_string());
    }

    let mut cursor = Cursor::new(&bytes[20..36]);
    let read = |e: std::io::Error| format!("Malformed fmt chunk: {}", e);
    let format = cursor.read_u16::<LittleEndian>().map_err(read)?;
    let channels = cursor.read_u16::<LittleEndian>().map_err(read)?;
    let sample_rate = cursor.read_u32::<LittleEndian>().map_err(read)?;
    let _byte_rate = cursor.read_u32::<LittleEndian>().map_err(read)?;
    let _block_align = cursor.read_u16::<LittleEndian>().map_err(read)?;
    let bits = cursor.read_u16::<LittleEndian>().map_err(read)?;

    if format != 1 || channels != 1 || bits != 16 {
        return Err(format!(
            "Expected mono 16-bit PCM, got format {} with {} channels at {} bits",
            format, channels, bits
        ));
    }

    let declared = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]) as usize;
    let body = &bytes[WAV_HEADER_LEN..];
    let body = &body[..declared.min(body.len()) & !1];

    let mut cursor = Cursor::new(body);
    let mut samples = Vec::with_capacity(body.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        let scale = if sample < 0 { 32768.0 } else { 32767.0 };
        samples.push(sample as f32 / scale);
    }

    Ok(DecodedWav { sample_rate, samples })
}

/// Classify a payload's container from its leading bytes.
///
/// Never inspects sample data, so a wrong guess only makes the chunk
/// unplayable; it cannot corrupt the audio.
pub fn classify(bytes: &[u8]) -> AudioContainer {
    if bytes.len() < MIN_SNIFF_LEN {
        return AudioContainer::Wav;
    }
    if &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return AudioContainer::Wav;
    }
    if bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 {
        return AudioContainer::Mpeg;
    }
    if &bytes[0..3] == b"ID3" {
        return AudioContainer::Mpeg;
    }
    AudioContainer::Wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let wav = encode_wav(&[0.0; 10], 16000).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN + 20);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 36 + 20);
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 1);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16000);
        assert_eq!(u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]), 32000);
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 2);
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 20);
    }

    #[test]
    fn test_rejects_unrepresentable_sample_rate() {
        assert!(encode_wav(&[0.0; 4], u32::MAX).is_err());
        assert!(encode_wav(&[0.0; 4], u32::MAX / 2).is_ok());
    }

    #[test]
    fn test_sample_scaling_and_clamping() {
        let wav = encode_wav(&[1.0, -1.0, 2.5, -7.0, 0.5], 8000).unwrap();
        let body: Vec<i16> = wav[WAV_HEADER_LEN..]
            .chunks(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(body, vec![32767, -32768, 32767, -32768, 16383]);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let original: Vec<f32> = (0..480)
            .map(|i| (i as f32 * 0.05).sin() * 0.8)
            .collect();
        let decoded = decode_pcm16_wav(&encode_wav(&original, 24000).unwrap()).unwrap();

        assert_eq!(decoded.sample_rate, 24000);
        assert_eq!(decoded.samples.len(), original.len());
        for (a, b) in original.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() <= 1.0 / 32767.0, "{} vs {}", a, b);
        }
        assert!((decoded.duration_seconds() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_stereo() {
        let mut wav = encode_wav(&[0.1; 4], 16000).unwrap();
        wav[22] = 2;
        assert!(decode_pcm16_wav(&wav).is_err());
        assert!(decode_pcm16_wav(b"RIFF").is_err());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&encode_wav(&[0.0; 32], 16000).unwrap()), AudioContainer::Wav);

        let mut mp3 = vec![0xFF, 0xFB, 0x90, 0x64];
        mp3.resize(64, 0);
        assert_eq!(classify(&mp3), AudioContainer::Mpeg);

        let mut tagged = b"ID3\x04\x00".to_vec();
        tagged.resize(64, 0);
        assert_eq!(classify(&tagged), AudioContainer::Mpeg);

        // Too short to sniff, even with a frame sync.
        assert_eq!(classify(&[0xFF, 0xFB, 0x01, 0x02]), AudioContainer::Wav);
        assert_eq!(classify(&[0x42; 19]), AudioContainer::Wav);
        assert_eq!(classify(&[0x42; 64]), AudioContainer::Wav);
    }
}
