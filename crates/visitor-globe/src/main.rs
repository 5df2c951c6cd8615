//! Visitor Globe - command-line driver for the cluster engine
//!
//! Loads a snapshot of visitor rows, clusters it and prints the report the
//! rendering layer consumes.

mod logging;
mod report;
mod settings;

use std::io::Read;
use std::process::ExitCode;
use visitor_cluster_lib::{ClusterEngine, VisitorLog};

use report::Report;
use settings::Settings;

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::from_cli();

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> visitor_cluster_lib::Result<()> {
    let engine = ClusterEngine::new(settings.config())?;
    let log = match &settings.input {
        Some(path) => VisitorLog::load_from_file(path)?,
        None => {
            let mut json = String::new();
            std::io::stdin().read_to_string(&mut json)?;
            VisitorLog::from_json_str(&json)?
        }
    };

    let report = Report::build(&engine, &log, settings);
    println!("{}", report.to_json(settings.pretty)?);
    Ok(())
}
