//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// imgmount - attach disk images for the automounter
///
/// Without a key, prints the configured images that exist. With a key,
/// attaches that image and prints its map entry.
#[derive(Parser, Debug)]
#[command(name = "imgmount")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Map key of the image to attach
    pub key: Option<String>,

    /// Configuration file (defaults to <config dir>/imgmount/config.json)
    #[arg(short, long, env = "IMGMOUNT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_mode() {
        let cli = Cli::try_parse_from(["imgmount"]).unwrap();
        assert!(cli.key.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_key_and_flags() {
        let cli =
            Cli::try_parse_from(["imgmount", "-vv", "--config", "/etc/imgmount.json", "vm"]).unwrap();
        assert_eq!(cli.key.as_deref(), Some("vm"));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/imgmount.json")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_extra_positional_is_rejected() {
        assert!(Cli::try_parse_from(["imgmount", "vm", "other"]).is_err());
    }
}
