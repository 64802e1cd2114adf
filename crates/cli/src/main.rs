//! PCIe exerciser conformance suite CLI.
//!
//! This binary runs the exerciser tests against the simulated platform. It provides:
//! 1. **Run:** Load a platform description (JSON), run all or selected tests, print the summary.
//! 2. **List:** Print the registered tests.
//!
//! The exit code follows the overall verdict: 0 for PASS or SKIP, 1 for FAIL, 2 for ERROR,
//! and 3 when the command line or configuration is unusable.

use clap::{ArgAction, Parser, Subcommand};
use std::{fs, process};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use exerciser_avs_core::config::Config;
use exerciser_avs_core::suite::{self, EXERCISER_TESTS, SuiteReport, TestDescriptor};
use exerciser_avs_core::{AvsStatus, SimPlatform, TestContext};

const EXIT_FAIL: i32 = 1;
const EXIT_ERROR: i32 = 2;
const EXIT_USAGE: i32 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "avs",
    author,
    version,
    about = "PCIe exerciser conformance tests",
    long_about = "Run the exerciser tests (806 legacy interrupts, 807 No-Snoop I/O coherency) against a simulated platform.\n\nThe platform is described by a JSON file; every field has a default, so an empty object is a healthy single-exerciser system.\n\nExamples:\n  avs run\n  avs run -c platform.json -t 807\n  avs run -c cacheable.json --json report.json -v\n  avs list"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run tests against the simulated platform.
    Run {
        /// Platform description (JSON). Defaults to one healthy exerciser.
        #[arg(short, long)]
        config: Option<String>,

        /// Test number to run; repeat to select several. Defaults to all.
        #[arg(short, long = "test")]
        tests: Vec<u32>,

        /// Also write the report as JSON to this path.
        #[arg(long)]
        json: Option<String>,
    },

    /// List the registered tests.
    List,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Run {
            config,
            tests,
            json,
        }) => cmd_run(config.as_deref(), &tests, json.as_deref()),
        Some(Commands::List) => cmd_list(),
        None => {
            eprintln!("PCIe exerciser conformance tests: pass a subcommand");
            eprintln!();
            eprintln!("  avs run [-c platform.json] [-t N]...   Run tests");
            eprintln!("  avs list                               List tests");
            eprintln!();
            eprintln!("  avs --help  for full options");
            process::exit(EXIT_USAGE);
        }
    }
}

/// Installs the log subscriber on stderr so the summary on stdout stays clean.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_list() {
    for test in EXERCISER_TESTS {
        println!("{:>4}  {}", test.num, test.desc);
    }
}

/// Loads the platform, runs the selected tests, prints the summary, and exits with the
/// overall verdict.
fn cmd_run(config_path: Option<&str>, test_nums: &[u32], json_path: Option<&str>) {
    let config = match config_path {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            error!("{path}: {e}");
            process::exit(EXIT_USAGE);
        }),
        None => Config::default(),
    };
    let tests = select_tests(test_nums).unwrap_or_else(|num| {
        error!("unknown test {num}; see `avs list`");
        process::exit(EXIT_USAGE);
    });

    info!(
        exercisers = config.pcie.exercisers.len(),
        attribute = ?config.memory.attribute,
        honor_no_snoop = config.interconnect.honor_no_snoop,
        "platform"
    );
    let mut platform = SimPlatform::new(&config);
    let mut ctx = TestContext::new(&config.general, config.pe.num_pe);
    let report = suite::run_suite(&mut ctx, &mut platform, &tests);

    println!("{report}");
    if let Some(path) = json_path {
        write_json(&report, path);
    }

    process::exit(match report.overall() {
        AvsStatus::Pass | AvsStatus::Skip => 0,
        AvsStatus::Fail => EXIT_FAIL,
        AvsStatus::Error => EXIT_ERROR,
    });
}

/// Resolves test numbers; an empty selection means every registered test.
///
/// # Errors
///
/// Returns the first number that names no registered test.
fn select_tests(nums: &[u32]) -> Result<Vec<TestDescriptor>, u32> {
    if nums.is_empty() {
        return Ok(EXERCISER_TESTS.to_vec());
    }
    nums.iter()
        .map(|&num| suite::find_test(num).copied().ok_or(num))
        .collect()
}

fn write_json(report: &SuiteReport, path: &str) {
    let written = report
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
    if let Err(e) = written {
        error!("cannot write {path}: {e}");
        process::exit(EXIT_ERROR);
    }
    info!("report written to {path}");
}
