mod config;
mod plugins;

use clap::Parser;
use kernel_core::diagnostics::init_tracing;
use kernel_core::{KernelBuilder, KernelConfig};
use std::path::PathBuf;

/// Boots the plugin kernel with the bundled `math`/`logger` demo plugins.
#[derive(Parser, Debug)]
#[command(name = "kernel-cli", about = "Plugin orchestration kernel demo")]
struct Cli {
    /// Optional TOML config file overlaying KernelConfig defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Value to pass to `math.add`, repeated to sum more than two numbers.
    #[arg(long, default_value = "3.0,4.0")]
    add: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let kernel_config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("config error: {message}");
            return std::process::ExitCode::FAILURE;
        }
    };

    init_tracing(&kernel_config.log_level);

    if let Err(err) = run(kernel_config, &cli.add).await {
        eprintln!("kernel error: {err}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn run(kernel_config: KernelConfig, add_arg: &str) -> Result<(), kernel_core::KernelError> {
    let args: Vec<serde_json::Value> = add_arg
        .split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .map(serde_json::Value::from)
        .collect();

    let mut kernel = KernelBuilder::new()
        .with_config(kernel_config)
        .plugin(plugins::math_plugin())
        .plugin(plugins::logger_plugin())
        .build()
        .await?;

    kernel.start().await?;
    println!("kernel started: math, logger loaded");

    if let Some(math) = kernel.get("math").await {
        if let Some(add) = math.api.method("add") {
            let result = add(args).await?;
            println!("math.add -> {result}");
        }
    }

    kernel.shutdown().await?;
    println!("kernel shut down");
    Ok(())
}
