use base64::{engine::general_purpose, Engine as _};
use pool_core::ReferenceAudio;

use crate::error::ApiError;

/// Maximum length of a `character:preset` voice string
const MAX_VOICE_LENGTH: usize = 64;
const DEFAULT_REFERENCE_FILENAME: &str = "reference.wav";

/// Validate TTS request text and voice. Lengths are counted in characters.
pub fn validate_tts_request(
    text: &str,
    voice: Option<&str>,
    max_text_length: usize,
) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    let len = text.chars().count();
    if len > max_text_length {
        return Err(ApiError::InvalidInput(format!(
            "Text too long ({} characters, max {})",
            len, max_text_length
        )));
    }

    if let Some(voice) = voice {
        if voice.chars().count() > MAX_VOICE_LENGTH {
            return Err(ApiError::InvalidInput(format!(
                "Voice too long (max {} characters)",
                MAX_VOICE_LENGTH
            )));
        }
        if voice.chars().any(char::is_control) {
            return Err(ApiError::InvalidInput(
                "Voice contains control characters".to_string(),
            ));
        }
    }

    Ok(())
}

/// Decode the optional reference sample. Audio and reference text come as a
/// pair; either both or neither.
pub fn decode_reference(
    audio_base64: Option<&str>,
    filename: Option<&str>,
    text: Option<&str>,
) -> Result<Option<ReferenceAudio>, ApiError> {
    let audio_base64 = audio_base64.map(str::trim).filter(|s| !s.is_empty());
    let text = text.map(str::trim).filter(|s| !s.is_empty());

    match (audio_base64, text) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ApiError::InvalidInput(
            "reference_text is required with reference_audio_base64".to_string(),
        )),
        (None, Some(_)) => Err(ApiError::InvalidInput(
            "reference_audio_base64 is required with reference_text".to_string(),
        )),
        (Some(encoded), Some(text)) => {
            let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
                ApiError::InvalidInput(format!("reference_audio_base64 is not valid base64: {e}"))
            })?;
            if bytes.is_empty() {
                return Err(ApiError::InvalidInput("Reference audio is empty".to_string()));
            }
            let filename = filename
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .unwrap_or(DEFAULT_REFERENCE_FILENAME);
            Ok(Some(ReferenceAudio {
                bytes,
                filename: filename.to_string(),
                text: text.to_string(),
            }))
        }
    }
}
