pub mod injection_profiles;
pub mod run_config;

pub use injection_profiles::{get_ingestion_profile, profile_names, DEFAULT_INGESTION_PROFILE};
pub use run_config::*;
