mod args;

pub use args::*;

use anyhow::{bail, Context, Result};

use loadtest_core::WireFormat;

use crate::config::{get_ingestion_profile, profile_names, RunConfig};

impl ConfigArgs {
    /// Configuration file values with the command line applied on top.
    pub fn load(&self) -> Result<RunConfig> {
        let mut config = RunConfig::load(self.config.as_deref()).context("loading run configuration")?;
        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut RunConfig) -> Result<()> {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(participants) = self.participants {
            config.participants = participants;
        }
        if let Some(name) = &self.ingestion_profile {
            if !profile_names().contains(&name.as_str()) {
                bail!("unknown ingestion profile '{}', expected one of {:?}", name, profile_names());
            }
            config.phases.ingestion.injection = Some(get_ingestion_profile(name));
        }
        match self.format.as_deref() {
            Some("json") => config.data.format = WireFormat::Json,
            Some("binary") => config.data.format = WireFormat::Binary,
            Some(other) => bail!("unknown format '{}'", other),
            None => {}
        }
        Ok(())
    }
}

impl RunArgs {
    pub fn load(&self) -> Result<RunConfig> {
        let mut config = self.config.load()?;
        let credentials = &mut config.credentials;
        if let Some(secret) = &self.client_secret {
            credentials.client_secret = secret.clone();
        }
        if let Some(username) = &self.admin_username {
            credentials.admin_username = username.clone();
        }
        if let Some(password) = &self.admin_password {
            credentials.admin_password = password.clone();
        }
        if let Some(secret) = &self.pairing_client_secret {
            credentials.pairing_client_secret = secret.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::InjectionProfile;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("load-test").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_line_overrides_configuration() {
        let cli = parse(&[
            "run",
            "--base-url",
            "https://radar.example.org",
            "--participants",
            "4",
            "--format",
            "binary",
            "--ingestion-profile",
            "smoke",
            "--admin-password",
            "pw",
            "--report-interval",
            "0",
        ]);
        let Mode::Run(args) = cli.mode else {
            panic!("expected run mode");
        };
        assert_eq!(args.report_interval, 0);

        let config = args.load().unwrap();
        assert_eq!(config.base_url, "https://radar.example.org");
        assert_eq!(config.participants, 4);
        assert_eq!(config.data.format, WireFormat::Binary);
        assert_eq!(config.credentials.admin_password, "pw");
        assert_eq!(config.phases()[1].injection, InjectionProfile::at_once(4));
        assert_eq!(config.phases()[3].injection, get_ingestion_profile("smoke"));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let Mode::Plan(args) = parse(&["plan", "--ingestion-profile", "warp"]).mode else {
            panic!("expected plan mode");
        };
        assert!(args.config.load().is_err());
    }

    #[test]
    fn unknown_format_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["load-test", "plan", "--format", "xml"]).is_err());
    }
}
