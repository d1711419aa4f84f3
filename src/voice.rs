//! Voice profiles and request-time voice resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::TtsError;
use crate::language::Language;

/// Style-vector table for one voice.
///
/// Kokoro voices carry one style row per possible phoneme count; the row
/// matching the utterance length is fed to the model. The core never looks
/// inside the rows.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceEmbedding {
    dim: usize,
    data: Vec<f32>,
}

impl VoiceEmbedding {
    /// Build from row-major data. `data.len()` must be a non-zero multiple of `dim`.
    pub fn new(dim: usize, data: Vec<f32>) -> Option<Self> {
        (dim > 0 && !data.is_empty() && data.len() % dim == 0).then_some(Self { dim, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dim
    }

    /// Style row `idx`, clamped to the last row.
    pub fn style(&self, idx: usize) -> &[f32] {
        let row = idx.min(self.rows() - 1);
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// Element-wise mean of several embeddings, truncated to the shortest.
    fn mean(parts: &[&VoiceEmbedding]) -> Option<Self> {
        let first = parts.first()?;
        if parts.iter().any(|p| p.dim != first.dim) {
            return None;
        }
        let len = parts.iter().map(|p| p.data.len()).min()?;
        let scale = 1.0 / parts.len() as f32;
        let data = (0..len)
            .map(|i| parts.iter().map(|p| p.data[i]).sum::<f32>() * scale)
            .collect();
        Self::new(first.dim, data)
    }
}

/// A loaded voice. Shared read-only between requests.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    pub id: String,
    pub languages: Vec<Language>,
    pub embedding: VoiceEmbedding,
}

impl VoiceProfile {
    /// A voice whose language follows its name prefix (`bf_emma` -> British English).
    pub fn from_name(id: impl Into<String>, embedding: VoiceEmbedding) -> Self {
        let id = id.into();
        let languages = Language::from_voice_name(&id).into_iter().collect();
        Self {
            id,
            languages,
            embedding,
        }
    }

    pub fn speaks(&self, language: Language) -> bool {
        self.languages.contains(&language)
    }
}

/// Every voice available to the process, loaded once at startup.
#[derive(Debug, Default)]
pub struct VoiceSet {
    voices: BTreeMap<String, Arc<VoiceProfile>>,
}

impl VoiceSet {
    pub fn insert(&mut self, profile: VoiceProfile) {
        if profile.languages.is_empty() {
            log::warn!(
                "Voice '{}' has no recognizable language prefix and cannot be selected",
                profile.id
            );
        }
        self.voices.insert(profile.id.clone(), Arc::new(profile));
    }

    pub fn get(&self, id: &str) -> Option<&Arc<VoiceProfile>> {
        self.voices.get(id)
    }

    /// Voice ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.voices.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

impl FromIterator<VoiceProfile> for VoiceSet {
    fn from_iter<T: IntoIterator<Item = VoiceProfile>>(iter: T) -> Self {
        let mut set = VoiceSet::default();
        for profile in iter {
            set.insert(profile);
        }
        set
    }
}

/// Maps a requested voice (or blend) and language onto a loaded profile.
pub struct VoiceResolver {
    voices: Arc<VoiceSet>,
    default_voice: String,
}

impl VoiceResolver {
    pub fn new(voices: Arc<VoiceSet>, default_voice: impl Into<String>) -> Self {
        Self {
            voices,
            default_voice: default_voice.into(),
        }
    }

    pub fn voices(&self) -> &VoiceSet {
        &self.voices
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    /// Resolve `voice_id` (default voice when `None`) for `language`.
    ///
    /// `a,b` requests the average of voices `a` and `b`; every part must
    /// exist and speak `language`. Never substitutes another voice.
    pub fn resolve(
        &self,
        voice_id: Option<&str>,
        language: Language,
    ) -> Result<Arc<VoiceProfile>, TtsError> {
        let requested = voice_id.map(str::trim).unwrap_or(&self.default_voice);
        let names: Vec<&str> = requested
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Err(TtsError::VoiceNotFound(requested.to_string()));
        }

        let mut parts = Vec::with_capacity(names.len());
        for name in &names {
            let profile = self
                .voices
                .get(name)
                .ok_or_else(|| TtsError::VoiceNotFound(name.to_string()))?;
            if !profile.speaks(language) {
                return Err(TtsError::VoiceLanguageMismatch {
                    voice: name.to_string(),
                    language,
                });
            }
            parts.push(profile);
        }

        if let [single] = parts.as_slice() {
            return Ok(Arc::clone(single));
        }

        let embeddings: Vec<&VoiceEmbedding> = parts.iter().map(|p| &p.embedding).collect();
        let embedding = VoiceEmbedding::mean(&embeddings).ok_or_else(|| {
            TtsError::InvalidInput(format!("voices in blend '{requested}' are not compatible"))
        })?;
        Ok(Arc::new(VoiceProfile {
            id: names.join(","),
            languages: vec![language],
            embedding,
        }))
    }
}
