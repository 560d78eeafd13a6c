//! # Format Detection
//!
//! Probe hints and codec labels for the symphonia backend.

use std::path::Path;
use symphonia::core::codecs::CodecType;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

pub struct FormatDetector;

impl FormatDetector {
    /// Create a probe hint from a file path's extension.
    ///
    /// ```rust
    /// use core_playback::decoder::FormatDetector;
    /// use std::path::Path;
    ///
    /// let _hint = FormatDetector::hint_from_path(Path::new("/music/song.mp3"));
    /// ```
    pub fn hint_from_path(path: &Path) -> Hint {
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            debug!(extension, "Setting probe hint extension");
            hint.with_extension(extension);
        } else {
            debug!("No file extension found, probe will auto-detect");
        }
        hint
    }

    /// Create a probe hint from a `Content-Type` value such as `audio/mpeg`.
    ///
    /// Parameters after `;` are ignored.
    pub fn hint_from_content_type(content_type: &str) -> Hint {
        let mut hint = Hint::new();
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        if !mime.is_empty() {
            debug!(mime, "Setting probe hint MIME type");
            hint.mime_type(mime);
        }
        hint
    }

    /// Label published as the `format` tag.
    pub fn codec_label(codec_type: CodecType) -> &'static str {
        use symphonia::core::codecs::*;

        if codec_type == CODEC_TYPE_MP3 {
            "MP3"
        } else if codec_type == CODEC_TYPE_MP2 {
            "MP2"
        } else if codec_type == CODEC_TYPE_MP1 {
            "MP1"
        } else if codec_type == CODEC_TYPE_AAC {
            "AAC"
        } else if codec_type == CODEC_TYPE_FLAC {
            "FLAC"
        } else if codec_type == CODEC_TYPE_VORBIS {
            "Vorbis"
        } else if codec_type == CODEC_TYPE_OPUS {
            "Opus"
        } else if codec_type == CODEC_TYPE_ALAC {
            "ALAC"
        } else if codec_type == CODEC_TYPE_PCM_S16LE
            || codec_type == CODEC_TYPE_PCM_S16BE
            || codec_type == CODEC_TYPE_PCM_S24LE
            || codec_type == CODEC_TYPE_PCM_S24BE
            || codec_type == CODEC_TYPE_PCM_S32LE
            || codec_type == CODEC_TYPE_PCM_S32BE
            || codec_type == CODEC_TYPE_PCM_F32LE
            || codec_type == CODEC_TYPE_PCM_F32BE
            || codec_type == CODEC_TYPE_PCM_F64LE
            || codec_type == CODEC_TYPE_PCM_F64BE
            || codec_type == CODEC_TYPE_PCM_U8
            || codec_type == CODEC_TYPE_PCM_S8
        {
            "PCM"
        } else {
            warn!(?codec_type, "Unknown codec type");
            "unknown"
        }
    }
}
