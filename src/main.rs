use avr_oracle::config::{Config, ConfigError};
use avr_oracle::report::{error_chain, RunReport};
use avr_oracle::{run_opcodes, ExecutionDriver};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const USAGE: &str = "usage: avr-oracle [--config FILE] [MNEMONIC ...]";

#[derive(Debug, Default, PartialEq)]
struct Cli {
    config: Option<PathBuf>,
    opcodes: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args.next().ok_or("--config needs a file")?;
                cli.config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') => return Err(format!("unknown option {}", flag)),
            _ => cli.opcodes.push(arg),
        }
    }
    Ok(cli)
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if !cli.opcodes.is_empty() {
        config.run.opcodes = cli.opcodes.clone();
        config.validate()?;
    }
    Ok(config)
}

fn write_reports(path: &Path, reports: &[RunReport]) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(reports)?;
    std::fs::write(path, json)
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            return ExitCode::from(2);
        }
    };
    // validated above
    let specs = config.run.selected_specs().unwrap_or_default();

    let mut driver = match ExecutionDriver::connect(&config.target) {
        Ok(driver) => driver,
        Err(e) => {
            error!("{}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };
    info!(
        "connected to {}:{}, {} opcode(s)",
        config.target.host,
        config.target.port,
        specs.len()
    );

    let campaign = run_opcodes(&mut driver, specs, &config.run);
    for report in &campaign.reports {
        print!("{}", report);
    }
    for e in &campaign.rejected {
        println!("SKIPPED {}", e);
    }
    println!("total: {}", campaign.total);

    if let Some(path) = &config.run.report_path {
        match write_reports(path, &campaign.reports) {
            Ok(()) => info!("report written to {}", path.display()),
            Err(e) => error!("cannot write report to {}: {}", path.display(), e),
        }
    }

    if !campaign.aborted {
        if let Err(e) = driver.close() {
            error!("{}", error_chain(&e));
        }
    }

    if campaign.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
