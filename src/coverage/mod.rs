//! Coverage accounting that steers the fuzzing loops.
//!
//! Two trackers live here: [`GrammarCoverage`] counts which productions have
//! been exercised and derives the priority scores consumed by the generator,
//! and [`ResponseCoverage`] fingerprints HTTP responses to judge whether an
//! input reached new behaviour.

mod grammar;
mod response;

pub use grammar::*;
pub use response::*;
