//! Local audio playback.

use std::io::Cursor;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tracing::debug;

use crate::error::SpeechError;

/// Plays encoded audio to completion. Called from a blocking thread.
pub trait Playback: Send + Sync {
    fn play(&self, audio: Vec<u8>) -> Result<(), SpeechError>;
}

/// Decodes MP3 in memory and plays it through the default output device.
///
/// The output stream is opened once and kept for the process lifetime, so
/// turns don't reopen the device or log a stream drop after every reply.
pub struct RodioPlayback {
    // rodio 0.21: the stream is the handle, and must outlive every sink
    stream: OutputStream,
}

impl RodioPlayback {
    pub fn open() -> Result<Self, SpeechError> {
        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| SpeechError::Playback(format!("Failed to open audio output: {e}")))?;
        debug!("Opened default audio output");
        Ok(Self { stream })
    }
}

impl Playback for RodioPlayback {
    fn play(&self, audio: Vec<u8>) -> Result<(), SpeechError> {
        let source = Decoder::new(Cursor::new(audio))
            .map_err(|e| SpeechError::Playback(format!("Failed to decode audio: {e}")))?;

        let sink = Sink::connect_new(self.stream.mixer());
        sink.append(source);
        sink.sleep_until_end();

        debug!("Playback finished");
        Ok(())
    }
}

/// Skips playback (`--mute` or `speech.playback: false`).
pub struct SilentPlayback;

impl Playback for SilentPlayback {
    fn play(&self, audio: Vec<u8>) -> Result<(), SpeechError> {
        debug!("Playback muted ({} bytes)", audio.len());
        Ok(())
    }
}
