//! Spoken walk through a ranked result list.
//!
//! For each result: speak its title, speak the "open this?" prompt, then
//! listen once. `Confirm` opens the result, `Back` steps to the previous one,
//! anything else (silence included) moves on. The walk is circular and only
//! ends on `Confirm` or [`ResultNarrator::stop`].

use crate::router::Command;
use crate::types::{HighlightTarget, SearchResult, Utterance};

/// What the caller must do after a result-narration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultStep {
    /// Cancel any in-flight utterance, then speak this one.
    Speak(Utterance),
    /// Open one recognition session and report the routed command.
    Listen,
    /// The user picked this result; reading has ended.
    Open(SearchResult),
    /// Nothing to do.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Title,
    Prompt,
    Listening,
}

/// Result set plus the narration cursor over it.
#[derive(Debug, Clone, Default)]
pub struct ResultNarrator {
    results: Vec<SearchResult>,
    index: usize,
    active: bool,
    stage: Option<Stage>,
    prompt: String,
}

impl ResultNarrator {
    /// Hold a result set without reading it (manual search).
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_listening(&self) -> bool {
        self.active && self.stage == Some(Stage::Listening)
    }

    pub fn current(&self) -> Option<&SearchResult> {
        self.results.get(self.index)
    }

    /// The result marked as "currently speaking", while reading.
    pub fn highlighted(&self) -> Option<HighlightTarget> {
        self.active
            .then_some(HighlightTarget::Result { index: self.index })
    }

    /// Reset the cursor to the first result and start reading.
    pub fn start_reading(&mut self, prompt: impl Into<String>) -> ResultStep {
        self.index = 0;
        self.resume_reading(prompt)
    }

    /// Start reading from the current cursor.
    pub fn resume_reading(&mut self, prompt: impl Into<String>) -> ResultStep {
        if self.results.is_empty() {
            return ResultStep::Unchanged;
        }
        self.prompt = prompt.into();
        self.active = true;
        self.read_current()
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.stage = None;
    }

    /// Pick a result directly, bypassing the voice walk.
    pub fn select(&mut self, index: usize) -> Option<SearchResult> {
        let picked = self.results.get(index).cloned()?;
        self.index = index;
        self.stop();
        Some(picked)
    }

    pub fn on_speech_complete(&mut self) -> ResultStep {
        if !self.active {
            return ResultStep::Unchanged;
        }
        match self.stage {
            Some(Stage::Title) => {
                self.stage = Some(Stage::Prompt);
                ResultStep::Speak(Utterance::new(
                    self.prompt.clone(),
                    HighlightTarget::Result { index: self.index },
                ))
            }
            Some(Stage::Prompt) => {
                self.stage = Some(Stage::Listening);
                ResultStep::Listen
            }
            Some(Stage::Listening) | None => ResultStep::Unchanged,
        }
    }

    /// Apply the routed command from the recognition session.
    pub fn on_command(&mut self, command: Command) -> ResultStep {
        if !self.is_listening() {
            return ResultStep::Unchanged;
        }
        let n = self.results.len();
        match command {
            Command::Confirm => match self.results.get(self.index).cloned() {
                Some(result) => {
                    self.stop();
                    ResultStep::Open(result)
                }
                None => ResultStep::Unchanged,
            },
            Command::Back => {
                self.index = (self.index + n - 1) % n;
                self.read_current()
            }
            _ => {
                self.index = (self.index + 1) % n;
                self.read_current()
            }
        }
    }

    fn read_current(&mut self) -> ResultStep {
        match self.results.get(self.index) {
            Some(result) => {
                self.stage = Some(Stage::Title);
                ResultStep::Speak(Utterance::new(
                    result.title.clone(),
                    HighlightTarget::Result { index: self.index },
                ))
            }
            None => {
                self.stop();
                ResultStep::Unchanged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn results(n: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| SearchResult {
                id: 100 + i as u64,
                title: format!("Result {i}"),
                snippet: String::new(),
            })
            .collect()
    }

    /// Drive title + prompt to the listening stage.
    fn to_listen(r: &mut ResultNarrator) {
        assert!(matches!(r.on_speech_complete(), ResultStep::Speak(_)));
        assert_eq!(r.on_speech_complete(), ResultStep::Listen);
    }

    #[test]
    fn reads_title_then_prompt_then_listens() {
        let mut r = ResultNarrator::new(results(3));
        match r.start_reading("Open?") {
            ResultStep::Speak(u) => {
                assert_eq!(u.text, "Result 0");
                assert_eq!(u.target, Some(HighlightTarget::Result { index: 0 }));
            }
            other => panic!("unexpected {other:?}"),
        }
        match r.on_speech_complete() {
            ResultStep::Speak(u) => assert_eq!(u.text, "Open?"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.on_speech_complete(), ResultStep::Listen);
        assert!(r.is_listening());
        assert_eq!(r.on_speech_complete(), ResultStep::Unchanged);
    }

    #[test]
    fn back_wraps_around() {
        let mut r = ResultNarrator::new(results(3));
        r.start_reading("?");
        to_listen(&mut r);
        r.on_command(Command::Help); // skip → 1
        assert_eq!(r.index(), 1);
        to_listen(&mut r);
        r.on_command(Command::Back);
        assert_eq!(r.index(), 0);
        to_listen(&mut r);
        r.on_command(Command::Back);
        assert_eq!(r.index(), 2);
    }

    #[test]
    fn confirm_opens_current_and_ends_reading() {
        let mut r = ResultNarrator::new(results(3));
        r.start_reading("?");
        to_listen(&mut r);
        r.on_command(Command::Help);
        to_listen(&mut r);
        match r.on_command(Command::Confirm) {
            ResultStep::Open(result) => assert_eq!(result.id, 101),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!r.is_active());
        assert_eq!(r.highlighted(), None);
    }

    #[test]
    fn commands_outside_listening_are_ignored() {
        let mut r = ResultNarrator::new(results(2));
        assert_eq!(r.on_command(Command::Confirm), ResultStep::Unchanged);
        r.start_reading("?");
        assert_eq!(r.on_command(Command::Confirm), ResultStep::Unchanged);
        r.stop();
        assert_eq!(r.on_speech_complete(), ResultStep::Unchanged);
    }

    #[test]
    fn empty_results_never_start() {
        let mut r = ResultNarrator::new(Vec::new());
        assert_eq!(r.start_reading("?"), ResultStep::Unchanged);
        assert!(!r.is_active());
    }

    #[test]
    fn resume_keeps_cursor() {
        let mut r = ResultNarrator::new(results(3));
        r.start_reading("?");
        to_listen(&mut r);
        r.on_command(Command::Next);
        r.stop();
        match r.resume_reading("?") {
            ResultStep::Speak(u) => assert_eq!(u.text, "Result 1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn select_picks_by_index() {
        let mut r = ResultNarrator::new(results(3));
        assert_eq!(r.select(2).map(|x| x.id), Some(102));
        assert_eq!(r.select(9), None);
    }

    proptest! {
        #[test]
        fn skipping_cycles_with_period_n(n in 1usize..8, rounds in 1usize..4) {
            let mut r = ResultNarrator::new(results(n));
            r.start_reading("?");
            let mut seen = Vec::new();
            for _ in 0..n * rounds {
                seen.push(r.index());
                to_listen(&mut r);
                r.on_command(Command::Help);
            }
            let expected: Vec<usize> = (0..n * rounds).map(|i| i % n).collect();
            prop_assert_eq!(seen, expected);
            prop_assert!(r.is_active());
        }

        #[test]
        fn back_decrements_mod_n(n in 1usize..8, start in 0usize..8) {
            let mut r = ResultNarrator::new(results(n));
            r.start_reading("?");
            for _ in 0..start % n {
                to_listen(&mut r);
                r.on_command(Command::Help);
            }
            let before = r.index();
            to_listen(&mut r);
            r.on_command(Command::Back);
            prop_assert_eq!(r.index(), (before + n - 1) % n);
        }
    }
}
