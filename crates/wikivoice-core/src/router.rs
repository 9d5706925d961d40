//! Transcript → semantic command classification.
//!
//! Matching is exact string membership against the active locale's phrase
//! sets for the active mode. The transcript is expected to be lowercased
//! already; no trimming or punctuation stripping happens here.

use serde::{Deserialize, Serialize};

use crate::locale::{LocaleCatalog, TableError};
use crate::types::Mode;

/// Semantic voice command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Home,
    Play,
    Stop,
    Repeat,
    Next,
    Previous,
    NextSection,
    PreviousSection,
    Confirm,
    Back,
    /// Nothing matched; speak the mode's help sentence.
    Help,
}

const SEARCH_COMMANDS: &[Command] = &[Command::Home];

const RESULT_LIST_COMMANDS: &[Command] = &[Command::Confirm, Command::Back, Command::Home];

const ARTICLE_COMMANDS: &[Command] = &[
    Command::Play,
    Command::Stop,
    Command::Repeat,
    Command::Next,
    Command::Previous,
    Command::NextSection,
    Command::PreviousSection,
    Command::Home,
];

/// Commands recognised in `mode`, in match order.
pub fn commands_for(mode: Mode) -> &'static [Command] {
    match mode {
        Mode::Search => SEARCH_COMMANDS,
        Mode::ResultList => RESULT_LIST_COMMANDS,
        Mode::Article => ARTICLE_COMMANDS,
    }
}

/// Maps one transcript to a [`Command`] under a locale and mode.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    catalog: LocaleCatalog,
}

impl CommandRouter {
    pub fn new(catalog: LocaleCatalog) -> Self {
        Self { catalog }
    }

    /// Route unknown languages to `fallback` instead of the catalog's own.
    pub fn with_fallback(self, fallback: &str) -> Result<Self, TableError> {
        Ok(Self::new(self.catalog.with_fallback(fallback)?))
    }

    pub fn catalog(&self) -> &LocaleCatalog {
        &self.catalog
    }

    pub fn route(&self, transcript: &str, locale: &str, mode: Mode) -> Command {
        let table = self.catalog.table(locale);
        commands_for(mode)
            .iter()
            .copied()
            .find(|&command| table.phrases(command).iter().any(|p| p == transcript))
            .unwrap_or(Command::Help)
    }

    /// Sentence to speak for [`Command::Help`] in `mode`.
    pub fn help_sentence(&self, locale: &str, mode: Mode) -> &str {
        self.catalog.table(locale).help(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn router() -> CommandRouter {
        CommandRouter::new(LocaleCatalog::builtin().unwrap())
    }

    #[test]
    fn italian_article_commands() {
        let r = router();
        assert_eq!(r.route("leggi", "it", Mode::Article), Command::Play);
        assert_eq!(r.route("continua", "it", Mode::Article), Command::Play);
        assert_eq!(r.route("pausa", "it", Mode::Article), Command::Stop);
        assert_eq!(r.route("indietro", "it", Mode::Article), Command::Previous);
        assert_eq!(
            r.route("sezione successiva", "it", Mode::Article),
            Command::NextSection
        );
        assert_eq!(r.route("ricarica", "it", Mode::Article), Command::Home);
        assert_eq!(r.route("boh", "it", Mode::Article), Command::Help);
    }

    #[test]
    fn same_phrase_means_different_things_per_mode() {
        let r = router();
        assert_eq!(r.route("leggi", "it", Mode::ResultList), Command::Confirm);
        assert_eq!(r.route("indietro", "it", Mode::ResultList), Command::Back);
        assert_eq!(r.route("leggi", "it", Mode::Search), Command::Help);
    }

    #[test]
    fn home_is_global() {
        let r = router();
        for mode in [Mode::Search, Mode::ResultList, Mode::Article] {
            assert_eq!(r.route("home", "en", mode), Command::Home);
        }
    }

    #[test]
    fn matching_is_exact() {
        let r = router();
        assert_eq!(r.route("play.", "en", Mode::Article), Command::Help);
        assert_eq!(r.route(" play", "en", Mode::Article), Command::Help);
        assert_eq!(r.route("Play", "en", Mode::Article), Command::Help);
        assert_eq!(r.route("", "en", Mode::Article), Command::Help);
    }

    #[test]
    fn unknown_locale_falls_back() {
        let r = router();
        assert_eq!(r.route("next", "fr-FR", Mode::Article), Command::Next);
        assert_eq!(r.route("weiter", "de-CH", Mode::Article), Command::Play);
    }

    #[test]
    fn configured_fallback_replaces_builtin_one() {
        let r = router().with_fallback("it").unwrap();
        assert_eq!(r.route("leggi", "fr", Mode::Article), Command::Play);
        assert_eq!(r.route("play", "fr", Mode::Article), Command::Help);
        assert!(router().with_fallback("xx").is_err());
    }

    #[test]
    fn help_sentence_per_mode() {
        let r = router();
        assert_eq!(r.help_sentence("en", Mode::Search), "What do you want to search?");
        assert_eq!(
            r.help_sentence("es", Mode::ResultList),
            "¿Quieres abrir esto?"
        );
    }

    #[test]
    fn every_phrase_routes_to_its_command() {
        let r = router();
        for locale in ["en", "it", "es", "de"] {
            let table = r.catalog().table(locale);
            for mode in [Mode::Search, Mode::ResultList, Mode::Article] {
                for &command in commands_for(mode) {
                    for phrase in table.phrases(command) {
                        assert_eq!(r.route(phrase, locale, mode), command, "{locale} {phrase}");
                    }
                }
            }
        }
    }

    proptest! {
        #[test]
        fn unknown_transcripts_route_to_help(transcript in "[a-z]{1,12}( [a-z]{1,12})?") {
            let r = router();
            let table = r.catalog().table("en");
            let known = commands_for(Mode::Article)
                .iter()
                .any(|&c| table.phrases(c).iter().any(|p| *p == transcript));
            let routed = r.route(&transcript, "en", Mode::Article);
            if known {
                prop_assert_ne!(routed, Command::Help);
            } else {
                prop_assert_eq!(routed, Command::Help);
            }
        }
    }
}
