//! Command-line arguments
//!
//! ```text
//! bling-token [--config PATH] authorize [--save-text] [--save-env]
//! bling-token [--config PATH] refresh [TOKEN] [--save-text] [--save-env]
//! ```

use bling_auth::PersistTargets;
use clap::{Args, Parser, Subcommand};

/// Bling API v3 OAuth token tool
#[derive(Parser, Debug)]
#[command(name = "bling-token", version, about = "Obtain and refresh Bling API v3 OAuth tokens")]
pub struct Cli {
    /// Config file (defaults to $CONFIG_PATH, then bling-token.toml)
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Log in through the browser and exchange the authorization code
    Authorize {
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Trade a refresh token for a new token pair
    Refresh {
        /// Refresh token; read from the text file or env store when omitted
        token: Option<String>,

        #[command(flatten)]
        save: SaveArgs,
    },
}

/// Where the issued credential is written.
#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveArgs {
    /// Overwrite the credential text file
    #[arg(long)]
    pub save_text: bool,

    /// Upsert the OAUTH_* keys in the env store
    #[arg(long)]
    pub save_env: bool,
}

impl From<SaveArgs> for PersistTargets {
    fn from(args: SaveArgs) -> Self {
        Self {
            text: args.save_text,
            env: args.save_env,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("bling-token").chain(line.split_whitespace()))
    }

    #[test]
    fn authorize_with_both_targets() {
        let cli = parse("authorize --save-text --save-env").unwrap();
        assert_eq!(cli.config_path, None);
        let Command::Authorize { save } = cli.command else {
            panic!("expected authorize, got {:?}", cli.command);
        };
        assert_eq!(
            PersistTargets::from(save),
            PersistTargets { text: true, env: true }
        );
    }

    #[test]
    fn refresh_with_token_and_config() {
        let cli = parse("--config /etc/bling.toml refresh R1 --save-env").unwrap();
        assert_eq!(cli.config_path.as_deref(), Some("/etc/bling.toml"));
        assert_eq!(
            cli.command,
            Command::Refresh {
                token: Some("R1".into()),
                save: SaveArgs {
                    save_text: false,
                    save_env: true,
                },
            }
        );
    }

    #[test]
    fn config_is_accepted_after_the_subcommand() {
        let cli = parse("refresh --config bling.toml").unwrap();
        assert_eq!(cli.config_path.as_deref(), Some("bling.toml"));
    }

    #[test]
    fn refresh_without_token_reads_stored_one() {
        let cli = parse("refresh").unwrap();
        assert_eq!(
            cli.command,
            Command::Refresh {
                token: None,
                save: SaveArgs::default(),
            }
        );
        assert_eq!(PersistTargets::from(SaveArgs::default()), PersistTargets::default());
    }

    #[test]
    fn errors() {
        assert!(parse("").is_err());
        assert_eq!(
            parse("revoke").unwrap_err().kind(),
            clap::error::ErrorKind::InvalidSubcommand
        );
        assert_eq!(
            parse("authorize --verbose").unwrap_err().kind(),
            clap::error::ErrorKind::UnknownArgument
        );
        assert!(parse("refresh R1 R2").is_err());
        assert!(parse("refresh --config").is_err());
    }
}
