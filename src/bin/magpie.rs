use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use magpie_fuzz::{
    fuzzer::{self, Config, Mode, StopToken},
    grammar::Grammar,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FuzzMode {
    Payload,
    Grammar,
    Systematic,
    Mutation,
    MutationCoverage,
}

impl std::fmt::Display for FuzzMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuzzMode::Payload => write!(f, "payload"),
            FuzzMode::Grammar => write!(f, "grammar"),
            FuzzMode::Systematic => write!(f, "systematic"),
            FuzzMode::Mutation => write!(f, "mutation"),
            FuzzMode::MutationCoverage => write!(f, "mutation-coverage"),
        }
    }
}

impl From<FuzzMode> for Mode {
    fn from(mode: FuzzMode) -> Self {
        match mode {
            FuzzMode::Payload => Mode::Payload,
            FuzzMode::Grammar => Mode::GrammarCoverage,
            FuzzMode::Systematic => Mode::Systematic,
            FuzzMode::Mutation => Mode::Mutation,
            FuzzMode::MutationCoverage => Mode::MutationCoverage,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target URL to fuzz
    #[arg(long, value_name = "URL")]
    url: String,

    /// Grammar file in JSON format
    #[arg(short, long)]
    grammar: Vec<PathBuf>,

    #[arg(long, default_value_t = FuzzMode::Grammar)]
    mode: FuzzMode,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 20)]
    concurrency: u32,

    /// Number of requests to send
    #[arg(short, long, default_value_t = 2000)]
    num_requests: u32,

    /// Timeout per request in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Maximum depth for derivation trees
    #[arg(long, default_value_t = 10)]
    max_depth: u32,

    /// Maximum size of the mutation corpus (0 = unlimited)
    #[arg(long, default_value_t = 2000)]
    max_corpus: u32,

    /// Minimum mutations per input
    #[arg(long, default_value_t = 1)]
    min_mutations: u32,

    /// Maximum mutations per input
    #[arg(long, default_value_t = 5)]
    max_mutations: u32,

    /// Initial seed input for the mutation loops (repeatable)
    #[arg(long = "seed-input")]
    seed_inputs: Vec<String>,

    /// Path to a wordlist with extra payloads
    #[arg(short, long)]
    wordlist: Option<PathBuf>,

    /// RNG seed for reproducible sessions
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for the session report
    #[arg(short, long, default_value = "./results")]
    output: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn mkdir(dir: &Path) {
    match std::fs::create_dir_all(dir) {
        Ok(()) => {},
        Err(err) => panic!("Could not create directory {}: {}", dir.display(), err),
    }
}

fn load_grammar(paths: &[PathBuf]) -> Option<Grammar> {
    if paths.is_empty() {
        return None;
    }

    let mut builder = Grammar::builder();
    for path in paths {
        builder = builder.json_grammar(path).expect("Could not parse grammar");
    }

    Some(builder.build().expect("Invalid grammar"))
}

fn build_config(args: &Args) -> Config {
    let mut config = Config::new(&args.url);
    config.mode = args.mode.into();
    config.concurrency = args.concurrency;
    config.num_requests = args.num_requests;
    config.timeout = Duration::from_secs(args.timeout);
    config.max_depth = args.max_depth;
    config.max_corpus = args.max_corpus;
    config.min_mutations = args.min_mutations;
    config.max_mutations = args.max_mutations;
    config.seed_inputs = args.seed_inputs.clone();
    config.wordlist = args.wordlist.clone();
    config.rng_seed = args.seed;
    config
}

pub fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("magpie_fuzz=debug,magpie=debug,info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let grammar = load_grammar(&args.grammar);
    let config = build_config(&args);

    let mut session =
        fuzzer::create(config, grammar, StopToken::new()).expect("Could not create fuzzer");
    let report = session.run().expect("Fuzzing session failed");

    mkdir(&args.output);
    let report_path = args.output.join("report.json");
    let file = std::fs::File::create(&report_path).expect("Could not create report file");
    serde_json::to_writer_pretty(file, &report).expect("Could not write report");

    println!(
        "{} requests, {} transport errors, {} interesting inputs",
        report.requests,
        report.transport_errors,
        report.interesting.len()
    );
    if let Some(stats) = &report.grammar_coverage {
        println!(
            "grammar coverage: {}/{} expansions ({:.1}%)",
            stats.covered_expansions, stats.total_expansions, stats.coverage_percentage
        );
    }
    println!("report written to {}", report_path.display());
}
