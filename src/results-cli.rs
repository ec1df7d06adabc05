//! A simple CLI tool for checking the result of an association vote.
//! This reuses the server's own tabulation, and so reads exactly what
//! `GET /votes/<vote_id>/dump` returns.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use assoc_voting_backend::engine::{ledger, Discrepancy, VoteDump};
use assoc_voting_backend::model::Outcome;

const PROGRAM_NAME: &str = "results-cli";

const ABOUT_TEXT: &str = "Check that a vote's recorded result matches its ballots.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const DUMP_PATH: &str = "DUMP_PATH";

const DUMP_PATH_HELP: &str = "The path to a JSON dump of a specific vote,\n\
as returned by `GET /votes/<vote_id>/dump`";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).arg(
        Arg::new(DUMP_PATH)
            .help(DUMP_PATH_HELP)
            .action(ArgAction::Set)
            .required(true),
    )
}

/// Errors that this program may produce.
#[derive(Debug, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// The dump contradicts itself in the listed ways.
    Verification(Vec<Discrepancy>),
}

/// The ballots for one option, in a form fit for printing.
#[derive(Debug, Eq, PartialEq)]
struct FriendlyResults {
    pub option: String,
    pub count: u64,
    pub total: u64,
}

impl Display for FriendlyResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} vote{}",
            self.option,
            self.count,
            if self.count != 1 { "s" } else { "" }
        )?;
        if self.total > 0 {
            write!(f, " ({:.1}%)", self.count as f64 * 100.0 / self.total as f64)?;
        }
        Ok(())
    }
}

/// What a dump says once checked.
#[derive(Debug, PartialEq)]
struct Summary {
    pub title: String,
    /// `None` while the vote is still open.
    pub outcome: Option<Outcome>,
    pub results: Vec<FriendlyResults>,
}

/// Run verification.
fn verify(path: &str) -> Result<Summary, Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let dump: VoteDump =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;

    // Run verification.
    dump.verify().map_err(Error::Verification)?;

    // Recorded counts for a closed vote, the live tally otherwise.
    let counts = match &dump.vote.result {
        Some(result) => result.counts.clone(),
        None => ledger::tally(&dump.vote.options, &dump.ballots),
    };
    let total = counts.iter().map(|c| c.count).sum();
    let mut results = counts
        .into_iter()
        .map(|c| FriendlyResults {
            option: c.option,
            count: c.count,
            total,
        })
        .collect::<Vec<_>>();
    // Most votes first, keeping definition order among equals.
    results.sort_by(|a, b| b.count.cmp(&a.count));

    Ok(Summary {
        title: dump.vote.title,
        outcome: dump.vote.result.map(|result| result.outcome),
        results,
    })
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(DUMP_PATH).unwrap(); // Required argument is guaranteed to be present.
    match verify(path) {
        Ok(summary) => {
            println!("Verification succeeded.");
            println!("{}", summary.title);
            match summary.outcome {
                Some(outcome) => println!("Outcome: {outcome}"),
                None => println!("Vote still open; counts are not final."),
            }
            for result in summary.results {
                println!("{result}");
            }
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {msg}");
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {msg}");
            1
        }
        Err(Error::Verification(problems)) => {
            println!("Verification failed:");
            for problem in problems {
                println!("  {problem}");
            }
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
