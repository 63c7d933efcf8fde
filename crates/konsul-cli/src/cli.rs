use clap::{Parser, Subcommand};

/// Konsul — service discovery and KV coordination.
#[derive(Debug, Parser)]
#[command(name = "konsul", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the authority server (default when no subcommand is given).
    Serve {
        /// Path to the server config file.
        #[arg(long, default_value = "konsul.toml")]
        config: String,
    },
    /// Start a local agent runtime.
    Agent {
        /// Path to the agent config file.
        #[arg(long, default_value = "konsul-agent.toml")]
        config: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the server config file and report any errors.
    Validate {
        #[arg(long, default_value = "konsul.toml")]
        config: String,
    },
    /// Dump the resolved server config (with defaults) as TOML.
    Show {
        #[arg(long, default_value = "konsul.toml")]
        config: String,
    },
}

/// Load the server config from `path`, falling back to defaults when the
/// file doesn't exist (mirrors the grounding repo's `load_config`).
pub fn load_server_config(path: &str) -> anyhow::Result<konsul_core::config::Config> {
    if std::path::Path::new(path).exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
    } else {
        Ok(konsul_core::config::Config::default())
    }
}

pub fn load_agent_config(path: &str) -> anyhow::Result<konsul_core::config::AgentConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
}

pub fn validate_server_config(config: &konsul_core::config::Config, path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK ({path})");
        return true;
    }
    let error_count = issues.iter().filter(|i| i.severity == konsul_core::config::ConfigSeverity::Error).count();
    let warning_count = issues.len() - error_count;
    for issue in &issues {
        println!("{issue}");
    }
    println!("\n{error_count} error(s), {warning_count} warning(s) in {path}");
    error_count == 0
}

pub fn show_server_config(config: &konsul_core::config::Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
