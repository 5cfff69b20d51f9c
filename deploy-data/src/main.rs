//! Deploy Data - Entry Point
//!
//! Runs one pipeline stage against the deployment record in the workspace.
//! Usage: `deploy-data --operation=<stage>` (or `OPERATION=<stage>`).

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use deploy_data::app::env::EnvVars;
use deploy_data::app::options::AppOptions;
use deploy_data::app::run::run;
use deploy_data::logs::{init_logging, log_failure, LogOptions};
use deploy_data::utils::version_info;

use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to render version: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    let env = EnvVars::from_process();

    // Initialize logging
    if let Err(e) = init_logging(LogOptions::from_env(&env)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let options = match AppOptions::from_env(&env, cli_args.get("operation").map(String::as_str)) {
        Ok(options) => options,
        Err(e) => {
            log_failure(&format!("Unable to read pipeline inputs: {e}"));
            return ExitCode::FAILURE;
        }
    };

    info!("deploy-data {} ({})", version.version, version.git_hash);
    match run(&options).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
