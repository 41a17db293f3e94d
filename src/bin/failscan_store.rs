use std::fs::File;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

use failscan::config::Config;
use failscan::output::render_table;
use failscan::{AppContext, AppError, UploadRecord};

/// Store-backed front end: ingest uploads and browse past results
#[derive(StructOpt, Debug)]
#[structopt(name = "failscan_store", about = "Failed-login scanner with upload history")]
struct Cli {
    /// Path to configuration file
    #[structopt(short, long, default_value = "config.toml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Upload a log file, analyze it and store the results
    Ingest {
        /// Path to log file
        #[structopt(short, long, parse(from_os_str))]
        file: PathBuf,
        /// Minimum failed attempts (defaults to detection.threshold)
        #[structopt(short, long)]
        threshold: Option<u32>,
    },
    /// List past uploads with their suspicious IPs
    History,
    /// Show one past upload
    Show {
        /// Upload id
        id: i64,
    },
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml", parse(from_os_str))]
        output: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::from_args();

    match cli.command {
        Command::Config { output } => {
            Config::default().to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Command::Ingest { file, threshold } => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = match File::open(&file) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Failed to open log file {:?}: {}", file, e);
                    std::process::exit(1);
                }
            };

            let app = load_app(&cli.config)?;
            let threshold = threshold.map(i64::from).unwrap_or_else(|| app.default_threshold());
            let outcome = app.ingest_upload(&name, source, threshold).await?;
            println!(
                "Upload #{} stored as {} (threshold {})\n",
                outcome.upload_id, outcome.stored_filename, threshold
            );
            print!("{}", render_table(&outcome.results));
        }
        Command::History => {
            let uploads = load_app(&cli.config)?.history()?;
            if uploads.is_empty() {
                println!("No uploads yet.");
            }
            for upload in &uploads {
                print_upload(upload);
            }
        }
        Command::Show { id } => match load_app(&cli.config)?.upload_detail(id) {
            Ok(upload) => print_upload(&upload),
            Err(AppError::UploadNotFound(id)) => {
                eprintln!("Upload {} not found", id);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}

fn load_app(config_path: &Path) -> Result<AppContext, AppError> {
    let config = if config_path.exists() {
        Config::from_file(config_path)?
    } else {
        log::warn!("Config file {:?} not found, using defaults", config_path);
        Config::default()
    };
    AppContext::new(config)
}

fn print_upload(upload: &UploadRecord) {
    println!(
        "#{} {} (uploaded {})",
        upload.id,
        upload.filename,
        upload.upload_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if upload.ips.is_empty() {
        println!("  no suspicious IPs\n");
    } else {
        println!("{}", render_table(&upload.ips));
    }
}
