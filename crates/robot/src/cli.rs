use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use dataaftaler_core::Config;

#[derive(Parser, Debug)]
#[command(
    name = "dataaftaler",
    version,
    about = "Review and apply status changes to STIL data-processing agreements"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "DATAAFTALER_CONFIG",
        default_value = "config.toml",
        help = "Configuration file"
    )]
    pub config: PathBuf,
    #[arg(long, global = true, help = "Base directory for artifacts, overrides base_dir")]
    pub base_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Address notified when a stage fails")]
    pub notification_mail: Option<String>,
    #[arg(long, global = true, action = ArgAction::Set, help = "Include institutions in the overview")]
    pub institutions: Option<bool>,
    #[arg(long, global = true, action = ArgAction::Set, help = "Include daycare facilities in the overview")]
    pub daycare: Option<bool>,
    #[arg(long, global = true, help = "Log as JSON lines")]
    pub json_logs: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Snapshot every agreement into the overview artifact
    CreateOverview {
        #[arg(long, default_value_t = false)]
        replace_existing: bool,
    },
    /// Enqueue the status changes entered in the overview
    UploadQueue,
    /// Apply queued status changes to the registry
    HandleQueue,
}

impl Command {
    pub fn stage(&self) -> &'static str {
        match self {
            Command::CreateOverview { .. } => "create_overview",
            Command::UploadQueue => "upload_queue",
            Command::HandleQueue => "handle_queue",
        }
    }
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(mail) = &self.notification_mail {
            config.notification_mail = Some(mail.clone());
        }
        if let Some(include) = self.institutions {
            config.extraction.include_institutions = include;
        }
        if let Some(include) = self.daycare {
            config.extraction.include_daycare = include;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_overview() {
        let cli = Cli::parse_from([
            "dataaftaler",
            "--base-dir",
            "/robot",
            "--daycare",
            "false",
            "create-overview",
            "--replace-existing",
        ]);

        assert_eq!(
            cli.command,
            Command::CreateOverview {
                replace_existing: true
            }
        );
        assert_eq!(cli.base_dir, Some(PathBuf::from("/robot")));
        assert_eq!(cli.daycare, Some(false));
        assert_eq!(cli.institutions, None);
        assert_eq!(cli.command.stage(), "create_overview");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "dataaftaler",
            "handle-queue",
            "--json-logs",
            "--notification-mail",
            "drift@aarhus.dk",
        ]);

        assert_eq!(cli.command, Command::HandleQueue);
        assert!(cli.json_logs);
        assert_eq!(cli.notification_mail.as_deref(), Some("drift@aarhus.dk"));
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!(Cli::try_parse_from(["dataaftaler", "delete-everything"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "dataaftaler",
            "--base-dir",
            "/other",
            "--institutions",
            "false",
            "--notification-mail",
            "drift@aarhus.dk",
            "upload-queue",
        ]);
        let mut config = Config::new(PathBuf::from("/robot"));
        cli.apply_overrides(&mut config);

        assert_eq!(config.base_dir, PathBuf::from("/other"));
        assert!(!config.extraction.include_institutions);
        assert!(config.extraction.include_daycare);
        assert_eq!(config.notification_mail.as_deref(), Some("drift@aarhus.dk"));
    }
}
