//! Voice selection: `character:preset` parsing plus emotion-driven preset
//! overrides, tried as an ordered chain of resolvers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const BUILTIN_CHARACTER: &str = "mika";
pub const BUILTIN_PRESET: &str = "普通";

/// Emotion label -> preset name. Accepts `{"伤心": "sad"}` or
/// `[{"emotion": "伤心", "preset": "sad"}]` in config files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "EmotionMapRepr")]
pub struct EmotionMap(HashMap<String, String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum EmotionMapRepr {
    Map(HashMap<String, String>),
    List(Vec<EmotionEntry>),
}

#[derive(Deserialize)]
struct EmotionEntry {
    #[serde(default)]
    emotion: String,
    #[serde(default)]
    preset: String,
}

impl From<EmotionMapRepr> for EmotionMap {
    fn from(repr: EmotionMapRepr) -> Self {
        let pairs: Vec<(String, String)> = match repr {
            EmotionMapRepr::Map(map) => map.into_iter().collect(),
            EmotionMapRepr::List(list) => list.into_iter().map(|e| (e.emotion, e.preset)).collect(),
        };
        pairs.into_iter().collect()
    }
}

impl FromIterator<(String, String)> for EmotionMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect(),
        )
    }
}

impl EmotionMap {
    pub fn get(&self, emotion: &str) -> Option<&str> {
        self.0.get(emotion).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    #[serde(default)]
    pub emotion_preset_map: EmotionMap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub default_character: String,
    pub default_preset: String,
    pub emotion_preset_map: EmotionMap,
    pub characters: Vec<CharacterProfile>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            default_character: BUILTIN_CHARACTER.to_string(),
            default_preset: BUILTIN_PRESET.to_string(),
            emotion_preset_map: EmotionMap::default(),
            characters: Vec::new(),
        }
    }
}

/// Final (character, preset) pair sent to the endpoint. Both always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceSelector {
    pub character: String,
    pub preset: String,
}

impl VoiceSelector {
    pub fn label(&self) -> String {
        format!("{}:{}", self.character, self.preset)
    }
}

/// Everything a resolver may look at.
pub struct PresetQuery<'a> {
    pub settings: &'a VoiceSettings,
    pub character: &'a str,
    pub preset: &'a str,
    pub emotion: &'a str,
    pub explicit_preset: bool,
}

pub type PresetResolver = fn(&PresetQuery<'_>) -> Option<String>;

/// Highest priority first. The first `Some` wins; if every resolver passes,
/// the parsed preset stands.
pub const PRESET_RESOLVERS: &[PresetResolver] = &[
    unchanged_preset,
    character_emotion,
    global_emotion,
    synonym_fallback,
];

// An explicit preset, or no emotion to act on, ends the chain early.
fn unchanged_preset(q: &PresetQuery<'_>) -> Option<String> {
    (q.explicit_preset || q.emotion.is_empty()).then(|| q.preset.to_string())
}

fn character_emotion(q: &PresetQuery<'_>) -> Option<String> {
    q.settings
        .characters
        .iter()
        .find(|c| c.name.trim() == q.character)
        .and_then(|c| c.emotion_preset_map.get(q.emotion))
        .map(str::to_string)
}

fn global_emotion(q: &PresetQuery<'_>) -> Option<String> {
    q.settings.emotion_preset_map.get(q.emotion).map(str::to_string)
}

// Last resort for a few common Chinese synonyms, only when the global map
// already knows the canonical emotion.
fn synonym_fallback(q: &PresetQuery<'_>) -> Option<String> {
    const SYNONYMS: &[(&str, &[&str])] = &[("伤心", &["难过", "悲伤"]), ("开心", &["高兴", "兴奋"])];
    SYNONYMS
        .iter()
        .find(|(_, words)| words.contains(&q.emotion))
        .and_then(|(canonical, _)| q.settings.emotion_preset_map.get(canonical))
        .map(str::to_string)
}

impl VoiceSettings {
    fn fallback_character(&self) -> &str {
        non_empty(&self.default_character).unwrap_or(BUILTIN_CHARACTER)
    }

    fn fallback_preset(&self) -> &str {
        non_empty(&self.default_preset).unwrap_or(BUILTIN_PRESET)
    }

    /// Resolve the caller's voice string and optional emotion label.
    ///
    /// `voice` is `character:preset`, `character`, or empty. Only the first
    /// form counts as an explicit preset, which disables emotion overrides.
    pub fn resolve(&self, voice: Option<&str>, emotion: Option<&str>) -> VoiceSelector {
        let raw = voice.map(str::trim).unwrap_or("");
        let (character, preset, explicit_preset) = match raw.split_once(':') {
            Some((c, p)) => (
                non_empty(c).unwrap_or(self.fallback_character()),
                non_empty(p).unwrap_or(self.fallback_preset()),
                true,
            ),
            None => (
                non_empty(raw).unwrap_or(self.fallback_character()),
                self.fallback_preset(),
                false,
            ),
        };

        let query = PresetQuery {
            settings: self,
            character,
            preset,
            emotion: emotion.map(str::trim).unwrap_or(""),
            explicit_preset,
        };
        let preset = PRESET_RESOLVERS
            .iter()
            .find_map(|resolve| resolve(&query))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| preset.to_string());

        VoiceSelector {
            character: character.to_string(),
            preset,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}
