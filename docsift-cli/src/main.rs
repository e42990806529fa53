use clap::Parser;

use docsift_cli::{execute, init_tracing, resolve_config, Cli};

fn main() {
    dotenvy::dotenv().ok(); // loads variables from .env if present
    let cli = Cli::parse();

    let verbose_env = std::env::var("VERBOSE_OUTPUT")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    init_tracing(cli.verbose || verbose_env);

    println!("🦀 Docsift Document Pipeline");

    let config = match resolve_config(&cli, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(config_path) = &cli.config {
        println!("📋 Loaded config from: {}", config_path);
    } else {
        println!("📋 Using default config");
    }

    if let Err(e) = execute(&cli, &config) {
        eprintln!("❌ Processing failed: {e:#}");
        std::process::exit(1);
    }
}
