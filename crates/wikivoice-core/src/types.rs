//! Shared types for the wikivoice narration engine.
//!
//! These types are used by wikivoice-lib, wikivoice-cli, and the tests.
//! Keeping them in wikivoice-core means consumers can depend on the data
//! model without pulling in tokio, rodio, or reqwest.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Article types ─────────────────────────────────────────────────────────

/// A fetched article. Immutable for the lifetime of one narration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Article {
    pub title: String,
    pub sections: Vec<Section>,
}

/// One article section: a heading plus narration-sized text fragments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    pub title: String,
    pub texts: Vec<String>,
}

impl Section {
    pub fn new(title: impl Into<String>, texts: Vec<String>) -> Self {
        Self {
            title: title.into(),
            texts,
        }
    }

    /// Legacy sections carry a single `content` string instead of `texts`.
    pub fn from_content(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            texts: vec![content.into()],
        }
    }
}

impl Article {
    pub fn new(title: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            title: title.into(),
            sections,
        }
    }

    /// Text fragment at `pos`, if the position is in range.
    pub fn text_at(&self, pos: PlaybackPosition) -> Option<&str> {
        self.sections
            .get(pos.section)
            .and_then(|s| s.texts.get(pos.text))
            .map(String::as_str)
    }

    /// First text position in section `from` or any later section.
    pub fn first_text_from(&self, from: usize) -> Option<PlaybackPosition> {
        self.sections
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, s)| !s.texts.is_empty())
            .map(|(section, _)| PlaybackPosition::new(section, 0))
    }

    /// Last text position in any section strictly before `before`.
    pub fn last_text_before(&self, before: usize) -> Option<PlaybackPosition> {
        self.sections
            .iter()
            .enumerate()
            .take(before)
            .rev()
            .find(|(_, s)| !s.texts.is_empty())
            .map(|(section, s)| PlaybackPosition::new(section, s.texts.len() - 1))
    }

    /// Every text position in reading order.
    pub fn text_positions(&self) -> Vec<PlaybackPosition> {
        self.sections
            .iter()
            .enumerate()
            .flat_map(|(s, section)| {
                (0..section.texts.len()).map(move |t| PlaybackPosition::new(s, t))
            })
            .collect()
    }
}

/// `(sectionIndex, textIndex)`, both zero-based. Orders lexicographically.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPosition {
    pub section: usize,
    pub text: usize,
}

impl PlaybackPosition {
    pub const START: PlaybackPosition = PlaybackPosition {
        section: 0,
        text: 0,
    };

    pub const fn new(section: usize, text: usize) -> Self {
        Self { section, text }
    }
}

impl fmt::Display for PlaybackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.section, self.text)
    }
}

/// Observable narration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationState {
    Idle,
    PlayingTitle,
    PlayingSectionTitle,
    PlayingText,
    Paused,
    Finished,
}

impl NarrationState {
    pub fn is_playing(self) -> bool {
        matches!(
            self,
            Self::PlayingTitle | Self::PlayingSectionTitle | Self::PlayingText
        )
    }
}

// ─── Search types ──────────────────────────────────────────────────────────

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub id: u64,
    pub title: String,
    pub snippet: String,
}

/// Which backend search endpoint to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Title,
    Lexical,
    Semantic,
}

/// Endpoint naming scheme of the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    #[default]
    Current,
    /// Older servers name the endpoints `title`, `content` and `vectors`.
    Legacy,
}

impl SearchKind {
    /// Path segment under `/api/search/`.
    pub fn path(self, flavor: ApiFlavor) -> &'static str {
        match (self, flavor) {
            (Self::Title, _) => "title",
            (Self::Lexical, ApiFlavor::Current) => "lexical",
            (Self::Lexical, ApiFlavor::Legacy) => "content",
            (Self::Semantic, ApiFlavor::Current) => "semantic",
            (Self::Semantic, ApiFlavor::Legacy) => "vectors",
        }
    }
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(Self::Title),
            "lexical" | "content" => Ok(Self::Lexical),
            "semantic" | "vectors" => Ok(Self::Semantic),
            other => Err(format!(
                "unknown search kind '{other}'; expected title, lexical or semantic"
            )),
        }
    }
}

impl FromStr for ApiFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(Self::Current),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown api flavor '{other}'; expected current or legacy")),
        }
    }
}

// ─── Interaction types ─────────────────────────────────────────────────────

/// Top-level interaction context; selects the command table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Search,
    ResultList,
    Article,
}

/// The single on-screen element marked as "current".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HighlightTarget {
    Title,
    SectionTitle { section: usize },
    Text { position: PlaybackPosition },
    Result { index: usize },
}

impl HighlightTarget {
    /// Headings are followed by a short pause before the next fragment.
    pub fn is_heading(self) -> bool {
        matches!(self, Self::Title | Self::SectionTitle { .. })
    }
}

/// One thing to say, and what to highlight while saying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub target: Option<HighlightTarget>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, target: HighlightTarget) -> Self {
        Self {
            text: text.into(),
            target: Some(target),
        }
    }

    /// A prompt or help sentence that does not move the highlight.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: None,
        }
    }
}

/// Voice session snapshot, published after every handled event.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub mode: Mode,
    pub article_title: Option<String>,
    pub narration: Option<NarrationState>,
    pub position: Option<PlaybackPosition>,
    pub results: Vec<SearchResult>,
    pub result_index: Option<usize>,
    pub reading_results: bool,
    pub highlighted: Option<HighlightTarget>,
    pub speaking: bool,
    pub listening: bool,
    pub loading: bool,
    pub last_error: Option<String>,
}

// ─── Configuration ─────────────────────────────────────────────────────────

/// Voice session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Language tag used for speech and command tables.
    pub language: String,
    /// Locale used when `language` has no command table.
    pub fallback_language: String,
    pub search_kinds: Vec<SearchKind>,
    pub search_limit: u32,
    /// Upper bound on one recognition session. Must cover the listener's
    /// recognition window.
    pub listen_timeout_ms: u64,
    /// Silence after a title or section title before the next fragment.
    pub heading_pause_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            fallback_language: "en".into(),
            search_kinds: vec![SearchKind::Title, SearchKind::Lexical],
            search_limit: 10,
            // Whisper's longest capture plus its transcription timeout.
            listen_timeout_ms: 20_000,
            heading_pause_ms: 1_500,
        }
    }
}

impl SessionConfig {
    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    pub fn heading_pause(&self) -> Duration {
        Duration::from_millis(self.heading_pause_ms)
    }
}
