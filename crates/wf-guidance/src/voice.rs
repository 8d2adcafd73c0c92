//! Single-flight speech output.

use tracing::debug;

use wf_core::SpeechProfile;

/// One voice offered by a synthesis engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Human-readable descriptor, e.g. `"Samantha (Female)"`.
    pub name: String,
    /// BCP-47 tag, e.g. `"en-US"`.
    pub lang: String,
}

impl VoiceInfo {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self { name: name.into(), lang: lang.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text:   String,
    pub voice:  Option<VoiceInfo>,
    pub rate:   f32,
    pub pitch:  f32,
    pub volume: f32,
}

/// The platform synthesis boundary.  Fire-and-forget: `speak` returns
/// immediately and nothing is acknowledged.
pub trait SpeechEngine {
    fn voices(&self) -> Vec<VoiceInfo>;

    fn speak(&mut self, utterance: Utterance);

    /// Drop whatever is queued or playing.
    fn cancel(&mut self);

    fn is_speaking(&self) -> bool;
}

/// Prefer an English voice described as female, else the first voice.
pub fn select_voice(voices: &[VoiceInfo]) -> Option<VoiceInfo> {
    voices
        .iter()
        .find(|v| {
            v.lang.to_ascii_lowercase().starts_with("en")
                && v.name.to_ascii_lowercase().contains("female")
        })
        .or_else(|| voices.first())
        .cloned()
}

/// At most one utterance queued or playing at a time.
///
/// Without an engine every call is a silent no-op.
pub struct VoiceOutput<E: SpeechEngine> {
    engine:  Option<E>,
    profile: SpeechProfile,
    voice:   Option<VoiceInfo>,
}

impl<E: SpeechEngine> VoiceOutput<E> {
    pub fn new(engine: Option<E>, profile: SpeechProfile) -> Self {
        let voice = engine.as_ref().and_then(|e| select_voice(&e.voices()));
        if let Some(v) = &voice {
            debug!(voice = %v.name, lang = %v.lang, "selected speech voice");
        }
        Self { engine, profile, voice }
    }

    pub fn silent(profile: SpeechProfile) -> Self {
        Self { engine: None, profile, voice: None }
    }

    /// Cancel anything in flight, then speak `text`.  Returns `false` when
    /// there is no engine or nothing to say.
    pub fn speak(&mut self, text: &str) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };
        if text.trim().is_empty() {
            return false;
        }
        engine.cancel();
        engine.speak(Utterance {
            text:   text.to_string(),
            voice:  self.voice.clone(),
            rate:   self.profile.rate,
            pitch:  self.profile.pitch,
            volume: self.profile.volume,
        });
        true
    }

    pub fn cancel(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.cancel();
        }
    }

    pub fn voice(&self) -> Option<&VoiceInfo> {
        self.voice.as_ref()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }
}

// ── RecordingSpeech ───────────────────────────────────────────────────────────

/// An engine that records every utterance instead of playing it.
///
/// The last utterance counts as playing until [`finish`](Self::finish) or
/// `cancel`.  Used by tests and by the demo's text-only mode.
#[derive(Debug, Default, Clone)]
pub struct RecordingSpeech {
    pub voices:  Vec<VoiceInfo>,
    pub spoken:  Vec<Utterance>,
    pub cancels: usize,
    playing:     bool,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: Vec<VoiceInfo>) -> Self {
        Self { voices, ..Self::default() }
    }

    /// Texts spoken so far, oldest first.
    pub fn texts(&self) -> Vec<&str> {
        self.spoken.iter().map(|u| u.text.as_str()).collect()
    }

    pub fn last_text(&self) -> Option<&str> {
        self.spoken.last().map(|u| u.text.as_str())
    }

    /// The current utterance ran to completion.
    pub fn finish(&mut self) {
        self.playing = false;
    }
}

impl SpeechEngine for RecordingSpeech {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    fn speak(&mut self, utterance: Utterance) {
        self.spoken.push(utterance);
        self.playing = true;
    }

    fn cancel(&mut self) {
        self.cancels += 1;
        self.playing = false;
    }

    fn is_speaking(&self) -> bool {
        self.playing
    }
}
