use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// RADAR-base Load Testing Tool
#[derive(Parser, Debug)]
#[command(name = "load-test")]
#[command(about = "Multi-phase ingestion load test for the RADAR-base platform")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Run setup, registration, discovery and ingestion against the platform
    Run(RunArgs),

    /// Print the injection plan of every phase without sending requests
    Plan(PlanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Run configuration file (TOML)
    #[arg(short, long, env = "LOADTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the platform, overrides the configuration file
    #[arg(long, env = "RADAR_BASE_URL")]
    pub base_url: Option<String>,

    /// Number of participants to register
    #[arg(long)]
    pub participants: Option<usize>,

    /// Named ingestion profile: smoke, ramp, stress, constant-rate
    #[arg(long)]
    pub ingestion_profile: Option<String>,

    /// Gateway payload format
    #[arg(long, value_parser = ["json", "binary"])]
    pub format: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Secret of the management portal client
    #[arg(long, env = "MP_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Management portal admin user
    #[arg(long, env = "MP_ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Management portal admin password
    #[arg(long, env = "MP_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Secret of the app client subjects are paired with
    #[arg(long, env = "PAIRING_CLIENT_SECRET", hide_env_values = true)]
    pub pairing_client_secret: Option<String>,

    /// Metrics reporting interval in seconds, 0 disables the live view
    #[arg(long, default_value = "5")]
    pub report_interval: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}
