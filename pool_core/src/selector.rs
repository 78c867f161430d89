//! Picks the audio artifact out of a multi-candidate `output.data` list and
//! turns it into a downloadable address.

use serde_json::Value;

/// Marker in file names the synthesis app gives its final output.
const GENERATED_MARKER: &str = "genie_";
const TEMP_DIR_MARKER: &str = "/tmp/gradio";

/// What one `output.data` item looks like to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactCandidate {
    File {
        path: Option<String>,
        url: Option<String>,
        orig_name: Option<String>,
    },
    Url(String),
    /// Numbers, nulls, nested lists: never audio.
    Opaque,
}

impl ArtifactCandidate {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(obj) => {
                let field = |name: &str| {
                    obj.get(name)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                ArtifactCandidate::File {
                    path: field("path"),
                    url: field("url"),
                    orig_name: field("orig_name"),
                }
            }
            Value::String(s) => ArtifactCandidate::Url(s.clone()),
            _ => ArtifactCandidate::Opaque,
        }
    }

    /// Evidence that this is the final audio file. `None` for opaque items.
    pub fn score(&self) -> Option<u32> {
        let text = match self {
            ArtifactCandidate::File { path, url, orig_name } => [orig_name, path, url]
                .iter()
                .map(|f| f.as_deref().unwrap_or(""))
                .collect::<Vec<_>>()
                .join(" "),
            ArtifactCandidate::Url(s) => s.clone(),
            ArtifactCandidate::Opaque => return None,
        };

        let mut score = 0;
        if text.contains(GENERATED_MARKER) {
            score += 10;
        }
        if text.to_lowercase().contains(".wav") {
            score += 2;
        }
        if text.contains(TEMP_DIR_MARKER) {
            score += 1;
        }
        Some(score)
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            ArtifactCandidate::File { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    pub fn orig_name(&self) -> Option<&str> {
        match self {
            ArtifactCandidate::File { orig_name, .. } => orig_name.as_deref(),
            _ => None,
        }
    }
}

/// Highest score wins, later index on ties. With no inspectable item at all
/// the last item is returned. `None` only for an empty list.
pub fn select_artifact(items: &[Value]) -> Option<ArtifactCandidate> {
    let best = items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let candidate = ArtifactCandidate::from_value(item);
            candidate.score().map(|score| (score, idx, candidate))
        })
        // idx in the key makes the later item win a tie
        .max_by_key(|(score, idx, _)| (*score, *idx));

    match best {
        Some((_, _, candidate)) => Some(candidate),
        None => items.last().map(ArtifactCandidate::from_value),
    }
}

/// Absolute URL for the artifact on `base_url`, if one can be derived.
pub fn resolve_download_url(candidate: &ArtifactCandidate, base_url: &str) -> Option<String> {
    let address = match candidate {
        ArtifactCandidate::File { url: Some(url), .. } => url.clone(),
        ArtifactCandidate::File { path: Some(path), .. } | ArtifactCandidate::Url(path)
            if path.starts_with("/tmp/") =>
        {
            format!("{base_url}/gradio_api/file={path}")
        }
        ArtifactCandidate::File { path: Some(path), .. } if path.starts_with('/') => path.clone(),
        ArtifactCandidate::Url(s) if !s.is_empty() => s.clone(),
        _ => return None,
    };

    if address.starts_with('/') {
        Some(format!("{base_url}{address}"))
    } else {
        Some(address)
    }
}
