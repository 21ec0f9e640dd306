use clap::{Arg, Command};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("Star Schema ETL")
        .version("1.0")
        .about("Loads song catalog and event logs into partitioned parquet tables")
        .subcommand(
            Command::new("run")
                .about("Run the ETL pipeline")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let config_path = run_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/etl.toml");
            println!("Starting ETL pipeline with config: {}", config_path);

            if let Err(e) = etl::run_etl_pipeline(config_path).await {
                eprintln!("ETL pipeline error: {}", e);
                process::exit(1);
            }
        }

        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
