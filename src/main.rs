use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use gastos::commands::{self, App, Command};
use gastos::settings::Settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "gastos.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
    /// Keep everything in memory; nothing is written to disk.
    #[arg(long)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log4rs) {
        eprintln!("[ERROR] Failed to initialize logging: {}", e);
    }

    match start(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn start(args: Args) -> Result<()> {
    let settings = Settings::load(&args.config)?;
    log::debug!("Backend at {}", settings.api.url);

    let app = App::new(settings, args.ephemeral).await?;
    let result = commands::run(&app, args.command).await;
    app.session.teardown();
    result
}

fn init_logging(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new("{h({l})} {t} - {m}{n}")))
            .build();
        let config = Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .build(Root::builder().appender("stderr").build(LevelFilter::Warn))?;
        log4rs::init_config(config)?;
        return Ok(());
    }

    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }
    log4rs::init_file(path, Default::default())?;
    Ok(())
}
