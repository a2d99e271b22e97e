use clap::{Parser, Subcommand};

pub const EXIT_OK: u8 = 0;
pub const EXIT_USAGE: u8 = 1;
pub const EXIT_MASTER_UNREACHABLE: u8 = 2;
pub const EXIT_FAILED: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "sfs", version, about = "Client for the chunked distributed file system")]
pub struct Cli {
    /// master endpoint, `ip:port`; the configuration file is used when absent
    #[arg(long, env = "SFS_MASTER")]
    pub master: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a directory, its parent must exist
    Mkdir { path: String },
    /// Remove an empty directory
    Rmdir { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Move a file or a directory
    Mv { old_path: String, new_path: String },
    /// Upload a local file
    Put { local: String, remote: String },
    /// Download a remote file
    Get { remote: String, local: String },
    /// Delete a remote file
    Rm { remote: String },
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn parses_commands() {
        let cli = Cli::try_parse_from(["sfs", "--master", "10.0.0.1:1338", "put", "a.txt", "/a"])
            .unwrap();
        assert_eq!(cli.master.as_deref(), Some("10.0.0.1:1338"));
        assert_eq!(
            cli.command,
            Command::Put {
                local: "a.txt".to_owned(),
                remote: "/a".to_owned()
            }
        );
        let cli = Cli::try_parse_from(["sfs", "ls"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Ls {
                path: "/".to_owned()
            }
        );
    }

    #[test]
    fn bad_usage_is_an_error() {
        let missing = Cli::try_parse_from(["sfs", "mv", "/a"]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);
        assert!(missing.use_stderr());
        let unknown = Cli::try_parse_from(["sfs", "cat", "/a"]).unwrap_err();
        assert!(unknown.use_stderr());
        let help = Cli::try_parse_from(["sfs", "--help"]).unwrap_err();
        assert!(!help.use_stderr());
    }
}
