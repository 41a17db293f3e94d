use std::io;
use std::path::PathBuf;
use structopt::StructOpt;

use failscan::app::analyze_path;
use failscan::config::Config;
use failscan::{IpLocator, LogScanner, OutputFormat, Report, ScanError};

/// Flag IP addresses with repeated failed logins in a log file
#[derive(StructOpt, Debug)]
#[structopt(name = "failscan", about = "Failed-login scanner with IP geolocation")]
struct Cli {
    /// Path to the log file
    #[structopt(parse(from_os_str))]
    logfile: PathBuf,

    /// Minimum failed attempts for an IP to be reported
    #[structopt(short, long, default_value = "5")]
    threshold: u32,

    /// Export to a file instead of printing: csv or json
    #[structopt(short, long)]
    output: Option<OutputFormat>,

    /// Optional configuration file (geolocation and export paths)
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::from_args();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if !cli.logfile.exists() {
        eprintln!("Log file not found: {:?}", cli.logfile);
        std::process::exit(1);
    }

    let threshold = i64::from(cli.threshold);
    let scanner = LogScanner::new(&config.scanner)?;
    let locator = IpLocator::from_config(&config.geolocation)?;

    let results = match analyze_path(&scanner, &locator, &cli.logfile, threshold).await {
        Ok(results) => results,
        Err(e @ ScanError::Io { .. }) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let report = Report::with_paths(
        cli.output.unwrap_or(OutputFormat::Console),
        config.output.csv_path,
        config.output.json_path,
    );
    if let Some(path) = report.emit(&results, threshold, &mut io::stdout())? {
        println!("Results exported to {}", path.display());
    }

    Ok(())
}
