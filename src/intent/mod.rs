//! Intent parsing for recognized utterances

mod parser;

pub use parser::{normalize, CommandVocabulary, Intent};
