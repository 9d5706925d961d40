//! wikivoice-core — Pure narration state machines and data model.
//!
//! No async runtime, no I/O, no platform dependencies. Speech engines and the
//! backend API live in wikivoice-lib.

pub mod locale;
pub mod narration;
pub mod results;
pub mod router;
pub mod text_prep;
pub mod types;
pub mod wav;
