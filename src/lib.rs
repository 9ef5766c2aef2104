//! This library contains everything you need to set up a coverage-guided
//! grammar fuzzer for HTTP endpoints.
//!
//! It consists of
//! - __frontend__: Load a grammar from JSON files or synthesise one from form
//!   field descriptors. See the [`grammar`] module.
//! - __core__: Depth-bounded derivation-tree generation steered by grammar
//!   coverage, response-coverage tracking and energy-scheduled mutation. See
//!   [`generator`], [`coverage`] and [`mutation`].
//! - __sessions__: Ready-made fuzzing loops that tie the core to an HTTP
//!   executor. See the [`fuzzer`] module.
//!
//! ## Getting Started
//! The first step always is to load a grammar. Use the
//! [`Grammar::builder()`](grammar::Grammar::builder) method for that:
//! ```no_run
//! use magpie_fuzz::fuzzer::{self, Config, Mode, StopToken};
//! use magpie_fuzz::grammar::Grammar;
//!
//! let grammar = Grammar::builder()
//!     .json_grammar("form-grammar.json").unwrap()
//!     .build().unwrap();
//!
//! let mut config = Config::new("http://localhost:8000/search");
//! config.mode = Mode::GrammarCoverage;
//! config.num_requests = 500;
//!
//! let mut session = fuzzer::create(config, Some(grammar), StopToken::new()).unwrap();
//! let report = session.run().unwrap();
//! println!("{} requests sent", report.requests);
//! ```
//! If you write your own session loop instead, the pieces compose the same
//! way: a [`generator::GrammarGenerator`] turns the grammar into derivation
//! trees while recording each chosen expansion in a shared
//! [`coverage::GrammarCoverage`], the trees flatten to request inputs, and a
//! [`coverage::ResponseCoverage`] or [`mutation::MutationScheduler`] decides
//! which inputs were interesting enough to keep.

pub(crate) mod parser;

pub mod coverage;
pub mod error;
pub mod fuzzer;
pub mod generator;
pub mod grammar;
pub mod http;
pub mod mutation;
pub mod tree;
