//! Per-language command tables and prompt sentences.
//!
//! A [`LocaleCatalog`] can only be obtained through [`LocaleCatalog::from_json`]
//! or [`LocaleCatalog::builtin`], both of which validate the whole table:
//! every locale carries every command with a non-empty, lowercase phrase set,
//! phrase sets inside one mode are disjoint, and the fallback locale exists.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::router::{Command, commands_for};
use crate::types::Mode;

const BUILTIN_TABLE: &str = include_str!("locales.json");

const ALL_MODES: [Mode; 3] = [Mode::Search, Mode::ResultList, Mode::Article];

/// Command-table validation failures.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("invalid command table JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("fallback locale '{0}' has no command table")]
    MissingFallback(String),
    #[error("locale '{locale}' has no phrases for command {command:?}")]
    MissingCommand { locale: String, command: Command },
    #[error("locale '{locale}' has an empty phrase for command {command:?}")]
    EmptyPhrase { locale: String, command: Command },
    #[error("locale '{locale}' phrase '{phrase}' is not lowercase")]
    NotLowercase { locale: String, phrase: String },
    #[error("locale '{locale}' phrase '{phrase}' is claimed by two commands in {mode:?} mode")]
    Overlap {
        locale: String,
        mode: Mode,
        phrase: String,
    },
    #[error("locale '{locale}' sentence '{field}' is empty")]
    EmptySentence { locale: String, field: &'static str },
}

/// Canonical prompt and help strings for one language.
#[derive(Debug, Clone, Deserialize)]
pub struct Sentences {
    pub search_prompt: String,
    pub searching: String,
    pub search_no_results: String,
    pub search_open: String,
    pub article_help: String,
    pub article_prompt: String,
}

impl Sentences {
    fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("search_prompt", &self.search_prompt),
            ("searching", &self.searching),
            ("search_no_results", &self.search_no_results),
            ("search_open", &self.search_open),
            ("article_help", &self.article_help),
            ("article_prompt", &self.article_prompt),
        ]
    }
}

/// Command phrases and sentences for one language.
#[derive(Debug, Clone, Deserialize)]
pub struct LocaleTable {
    pub sentences: Sentences,
    commands: BTreeMap<Command, Vec<String>>,
}

impl LocaleTable {
    /// Accepted phrases for `command`. Empty for `Help`.
    pub fn phrases(&self, command: Command) -> &[String] {
        self.commands
            .get(&command)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The sentence spoken when a transcript matches nothing in `mode`.
    pub fn help(&self, mode: Mode) -> &str {
        match mode {
            Mode::Search => &self.sentences.search_prompt,
            Mode::ResultList => &self.sentences.search_open,
            Mode::Article => &self.sentences.article_help,
        }
    }

    fn validate(&self, locale: &str) -> Result<(), TableError> {
        for (field, value) in self.sentences.fields() {
            if value.trim().is_empty() {
                return Err(TableError::EmptySentence {
                    locale: locale.to_string(),
                    field,
                });
            }
        }

        for mode in ALL_MODES {
            let mut owner: BTreeMap<&str, Command> = BTreeMap::new();
            for &command in commands_for(mode) {
                let phrases = self.phrases(command);
                if phrases.is_empty() {
                    return Err(TableError::MissingCommand {
                        locale: locale.to_string(),
                        command,
                    });
                }
                for phrase in phrases {
                    if phrase.trim().is_empty() {
                        return Err(TableError::EmptyPhrase {
                            locale: locale.to_string(),
                            command,
                        });
                    }
                    // Transcripts arrive lowercased and are matched verbatim.
                    if phrase.to_lowercase() != *phrase {
                        return Err(TableError::NotLowercase {
                            locale: locale.to_string(),
                            phrase: phrase.clone(),
                        });
                    }
                    if let Some(&other) = owner.get(phrase.as_str()) {
                        if other != command {
                            return Err(TableError::Overlap {
                                locale: locale.to_string(),
                                mode,
                                phrase: phrase.clone(),
                            });
                        }
                    }
                    owner.insert(phrase, command);
                }
            }
        }
        Ok(())
    }
}

/// Lowercased language part of a tag: `it-IT` and `it_it` both give `it`.
pub fn primary_subtag(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
        .to_lowercase()
}

/// Validated set of locale tables plus the fallback locale.
#[derive(Debug, Clone, Deserialize)]
pub struct LocaleCatalog {
    fallback: String,
    locales: BTreeMap<String, LocaleTable>,
}

impl LocaleCatalog {
    /// The tables compiled into the binary (`en`, `it`, `es`, `de`).
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_json(BUILTIN_TABLE)
    }

    /// Parse and validate a catalog.
    pub fn from_json(json: &str) -> Result<Self, TableError> {
        let catalog: LocaleCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Replace the fallback locale. It must already have a table.
    pub fn with_fallback(mut self, fallback: &str) -> Result<Self, TableError> {
        if !self.locales.contains_key(fallback) {
            return Err(TableError::MissingFallback(fallback.to_string()));
        }
        self.fallback = fallback.to_string();
        Ok(self)
    }

    fn validate(&self) -> Result<(), TableError> {
        if !self.locales.contains_key(&self.fallback) {
            return Err(TableError::MissingFallback(self.fallback.clone()));
        }
        for (locale, table) in &self.locales {
            table.validate(locale)?;
        }
        Ok(())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.locales.keys().map(String::as_str)
    }

    /// Resolve a language tag: exact match, then primary subtag
    /// (`it-IT` → `it`), then the fallback locale.
    pub fn resolve<'a>(&'a self, locale: &'a str) -> &'a str {
        if self.locales.contains_key(locale) {
            return locale;
        }
        let primary = primary_subtag(locale);
        match self.locales.get_key_value(primary.as_str()) {
            Some((key, _)) => key.as_str(),
            None => self.fallback.as_str(),
        }
    }

    /// Table for `locale`, after fallback resolution.
    pub fn table(&self, locale: &str) -> &LocaleTable {
        let resolved = self.resolve(locale);
        match self.locales.get(resolved) {
            Some(table) => table,
            // Validation guarantees the fallback exists.
            None => &self.locales[&self.fallback],
        }
    }
}
