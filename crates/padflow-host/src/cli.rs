//! Command-line arguments

use std::path::PathBuf;

use crate::constants::{flags, USAGE};
use crate::error::{HostError, Result};

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    /// Snapshot to load before running or editing
    pub snapshot: Option<PathBuf>,
    pub editor: bool,
    pub help: bool,
}

impl Args {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        for arg in args {
            match arg.as_str() {
                flags::EDITOR => parsed.editor = true,
                flags::HELP | "-h" => parsed.help = true,
                other if other.starts_with('-') => {
                    return Err(HostError::Usage(format!("unknown flag '{}'\n{}", other, USAGE)));
                }
                _ if parsed.snapshot.is_some() => {
                    return Err(HostError::Usage(format!("only one snapshot may be given\n{}", USAGE)));
                }
                path => parsed.snapshot = Some(PathBuf::from(path)),
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_snapshot_and_editor() {
        let args = assert_ok!(parse(&["graph.json", "--editor"]));
        assert_eq!(args.snapshot, Some(PathBuf::from("graph.json")));
        assert!(args.editor);
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(assert_ok!(parse(&[])), Args::default());
    }

    #[test]
    fn test_rejects_unknown_flag_and_extra_paths() {
        assert_err!(parse(&["--fast"]));
        assert_err!(parse(&["a.json", "b.json"]));
    }
}
