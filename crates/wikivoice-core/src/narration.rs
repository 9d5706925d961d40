//! Article narration state machine.
//!
//! The controller never talks to a speech engine. Every operation returns a
//! [`Narration`] directive telling the caller what to do with speech output;
//! autoplay advances only when the caller reports a completed utterance
//! through [`NarrationController::on_speech_complete`].
//!
//! ```text
//! Idle ─start→ Title ─done→ SectionTitle(0) ─done→ Text(0,0) ─done→ … ─done→ Finished
//!                 ╰──────────── stop → Paused ── start → (same cue) ────╯
//! ```

use crate::types::{Article, HighlightTarget, NarrationState, PlaybackPosition, Utterance};

/// What the caller must do with speech output after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Narration {
    /// Cancel any in-flight utterance, then speak this one.
    Speak(Utterance),
    /// Cancel any in-flight utterance; nothing follows.
    Silence,
    /// Nothing changed. Leave in-flight speech alone.
    Unchanged,
}

/// Which element at the current position is being narrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    Title,
    SectionTitle,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Playing,
    Paused,
    Finished,
}

/// Owns one article's playback position and state.
#[derive(Debug, Clone)]
pub struct NarrationController {
    article: Article,
    position: PlaybackPosition,
    cue: Cue,
    phase: Phase,
}

impl NarrationController {
    /// Fresh narration at `(0,0)` in `Idle`; `(0,0)` first reads the article title.
    pub fn new(article: Article) -> Self {
        Self {
            article,
            position: PlaybackPosition::START,
            cue: Cue::Title,
            phase: Phase::Idle,
        }
    }

    pub fn article(&self) -> &Article {
        &self.article
    }

    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    pub fn state(&self) -> NarrationState {
        match (self.phase, self.cue) {
            (Phase::Idle, _) => NarrationState::Idle,
            (Phase::Paused, _) => NarrationState::Paused,
            (Phase::Finished, _) => NarrationState::Finished,
            (Phase::Playing, Cue::Title) => NarrationState::PlayingTitle,
            (Phase::Playing, Cue::SectionTitle) => NarrationState::PlayingSectionTitle,
            (Phase::Playing, Cue::Text) => NarrationState::PlayingText,
        }
    }

    /// The element currently marked on screen, if narration has begun.
    pub fn highlighted(&self) -> Option<HighlightTarget> {
        match self.phase {
            Phase::Idle => None,
            _ => Some(self.target()),
        }
    }

    // ─── Operations ────────────────────────────────────────────────────────

    /// Begin or resume. A resumed fragment restarts from its beginning.
    pub fn start(&mut self) -> Narration {
        match self.phase {
            Phase::Playing => Narration::Unchanged,
            Phase::Idle | Phase::Paused | Phase::Finished => self.play_current(),
        }
    }

    pub fn stop(&mut self) -> Narration {
        self.phase = Phase::Paused;
        Narration::Silence
    }

    /// Re-speak the current element without advancing.
    pub fn repeat(&mut self) -> Narration {
        self.play_current()
    }

    pub fn next_text(&mut self) -> Narration {
        if self.phase == Phase::Finished {
            return Narration::Unchanged;
        }
        let next = match self.cue {
            // From a heading, the next fragment is the first one under it.
            Cue::Title | Cue::SectionTitle => self.article.first_text_from(self.position.section),
            Cue::Text => self.following_text(),
        };
        match next {
            Some(pos) => self.play_at(pos, Cue::Text),
            None => self.finish(),
        }
    }

    pub fn previous_text(&mut self) -> Narration {
        if self.phase == Phase::Finished {
            // Back onto the last fragment, even if the article ended on an empty section.
            return match self.article.last_text_before(self.article.sections.len()) {
                Some(pos) => self.play_at(pos, Cue::Text),
                None => self.play_current(),
            };
        }
        let previous = match self.cue {
            Cue::Title => None,
            Cue::SectionTitle => self.article.last_text_before(self.position.section),
            Cue::Text if self.position.text > 0 => Some(PlaybackPosition::new(
                self.position.section,
                self.position.text - 1,
            )),
            Cue::Text => self.article.last_text_before(self.position.section),
        };
        match previous {
            Some(pos) => self.play_at(pos, Cue::Text),
            None => Narration::Unchanged,
        }
    }

    pub fn next_section(&mut self) -> Narration {
        let target = self.position.section + 1;
        if target >= self.article.sections.len() {
            return Narration::Unchanged;
        }
        self.play_at(PlaybackPosition::new(target, 0), Cue::SectionTitle)
    }

    pub fn previous_section(&mut self) -> Narration {
        if self.position.section == 0 || self.article.sections.is_empty() {
            return Narration::Unchanged;
        }
        let target = self.position.section - 1;
        self.play_at(PlaybackPosition::new(target, 0), Cue::SectionTitle)
    }

    /// Autoplay step, driven by the speech-output completion signal.
    pub fn on_speech_complete(&mut self) -> Narration {
        if self.phase != Phase::Playing {
            return Narration::Unchanged;
        }
        let section = self.position.section;
        match self.cue {
            Cue::Title if self.article.sections.is_empty() => self.finish(),
            Cue::Title => self.play_at(PlaybackPosition::START, Cue::SectionTitle),
            Cue::SectionTitle if self.section_len(section) > 0 => {
                self.play_at(PlaybackPosition::new(section, 0), Cue::Text)
            }
            Cue::SectionTitle => self.advance_section(),
            Cue::Text if self.position.text + 1 < self.section_len(section) => {
                self.play_at(PlaybackPosition::new(section, self.position.text + 1), Cue::Text)
            }
            Cue::Text => self.advance_section(),
        }
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    fn section_len(&self, section: usize) -> usize {
        self.article
            .sections
            .get(section)
            .map_or(0, |s| s.texts.len())
    }

    fn following_text(&self) -> Option<PlaybackPosition> {
        let PlaybackPosition { section, text } = self.position;
        if text + 1 < self.section_len(section) {
            Some(PlaybackPosition::new(section, text + 1))
        } else {
            self.article.first_text_from(section + 1)
        }
    }

    fn advance_section(&mut self) -> Narration {
        let next = self.position.section + 1;
        if next < self.article.sections.len() {
            self.play_at(PlaybackPosition::new(next, 0), Cue::SectionTitle)
        } else {
            self.finish()
        }
    }

    fn finish(&mut self) -> Narration {
        self.phase = Phase::Finished;
        Narration::Silence
    }

    fn play_at(&mut self, position: PlaybackPosition, cue: Cue) -> Narration {
        self.position = position;
        self.cue = cue;
        self.play_current()
    }

    fn play_current(&mut self) -> Narration {
        let target = self.target();
        let text = match target {
            HighlightTarget::Title => Some(self.article.title.as_str()),
            HighlightTarget::SectionTitle { section } => {
                self.article.sections.get(section).map(|s| s.title.as_str())
            }
            HighlightTarget::Text { position } => self.article.text_at(position),
            HighlightTarget::Result { .. } => None,
        };
        match text {
            Some(text) => {
                self.phase = Phase::Playing;
                Narration::Speak(Utterance::new(text, target))
            }
            None => self.finish(),
        }
    }

    fn target(&self) -> HighlightTarget {
        match self.cue {
            Cue::Title => HighlightTarget::Title,
            Cue::SectionTitle => HighlightTarget::SectionTitle {
                section: self.position.section,
            },
            Cue::Text => HighlightTarget::Text {
                position: self.position,
            },
        }
    }
}
