//! Audio playback seam.
//!
//! Speech synthesis produces an [`AudioClip`]; where it goes is the host's
//! concern. One sink exists per engine lifetime, shared by all sessions.

use thiserror::Error;
use tracing::debug;

/// Decoded audio ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Errors from audio output.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio output failed: {0}")]
    Output(String),
}

/// Destination for synthesized speech.
pub trait AudioSink: Send + Sync {
    fn play(&self, clip: AudioClip) -> Result<(), AudioError>;
}

/// Sink that discards audio; used when no output device is wired up.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&self, clip: AudioClip) -> Result<(), AudioError> {
        debug!(bytes = clip.data.len(), mime_type = %clip.mime_type, "discarding audio clip");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_accepts_anything() {
        let sink = NullSink;
        let clip = AudioClip {
            mime_type: "audio/wav".to_string(),
            data: vec![0, 1, 2],
        };
        assert!(sink.play(clip).is_ok());
    }
}
