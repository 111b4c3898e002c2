#![forbid(unsafe_code)]

use std::fs;

use mq_conformance::{run_analysis, run_fixture_analysis};
use mq_types::PipelineConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut domestic_path: Option<String> = None;
    let mut global_path: Option<String> = None;
    let mut config_path: Option<String> = None;
    let mut pretty = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--domestic" => {
                let value = args.next().ok_or("--domestic requires a CSV path")?;
                domestic_path = Some(value);
            }
            "--global" => {
                let value = args.next().ok_or("--global requires a CSV path")?;
                global_path = Some(value);
            }
            "--config" => {
                let value = args.next().ok_or("--config requires a JSON path")?;
                config_path = Some(value);
            }
            "--pretty" => {
                pretty = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let config = match config_path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };

    let report = match (domestic_path, global_path) {
        (Some(domestic), Some(global)) => {
            let domestic_csv = fs::read_to_string(domestic)?;
            let global_csv = fs::read_to_string(global)?;
            run_analysis(&domestic_csv, &global_csv, &config)?
        }
        (None, None) => run_fixture_analysis(&config)?,
        _ => return Err("--domestic and --global must be given together".into()),
    };

    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

fn print_help() {
    println!(
        "mq-report: run the movie analytics pipeline and print the structured report as JSON

USAGE:
    mq-report [--domestic <csv> --global <csv>] [--config <json>] [--pretty]

With no source arguments the built-in fixture corpora are analyzed."
    );
}
