use std::path::PathBuf;

use arbor_store::KeySpace;
use arbor_types::Hash;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: inspect and maintain a content-addressed object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store directory (log backend)
    #[arg(long, global = true, conflicts_with = "config")]
    pub store: Option<PathBuf>,

    /// Store configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file as a blob under its git blob id
    PutBlob(PutBlobArgs),
    /// Write a blob's contents to stdout
    CatBlob(HashArgs),
    /// Show a blob's size and content hash
    BlobMeta(HashArgs),
    /// List the entries of a tree
    LsTree(HashArgs),
    /// Check whether a key exists in a keyspace
    Has(HasArgs),
    /// Drop every cache keyspace
    ClearCaches(ClearCachesArgs),
    /// Compact every keyspace
    Compact,
}

#[derive(Args)]
pub struct PutBlobArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct HashArgs {
    pub hash: Hash,
}

#[derive(Args)]
pub struct HasArgs {
    pub keyspace: KeySpace,
    pub hash: Hash,
}

#[derive(Args)]
pub struct ClearCachesArgs {
    /// Compact every keyspace afterwards
    #[arg(long)]
    pub compact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_has() {
        let cli = Cli::try_parse_from([
            "arbor",
            "has",
            "blob_metadata",
            "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0",
        ])
        .unwrap();
        match cli.command {
            Command::Has(args) => {
                assert_eq!(args.keyspace, KeySpace::BlobMetadata);
                assert_eq!(args.hash.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
            }
            _ => panic!("expected has"),
        }
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn rejects_bad_hash_and_keyspace() {
        assert!(Cli::try_parse_from(["arbor", "cat-blob", "xyz"]).is_err());
        assert!(Cli::try_parse_from([
            "arbor",
            "has",
            "blobs",
            "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0"
        ])
        .is_err());
    }

    #[test]
    fn store_and_config_conflict() {
        assert!(Cli::try_parse_from([
            "arbor", "--store", "a", "--config", "b.toml", "compact"
        ])
        .is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "arbor", "clear-caches", "--compact", "--format", "json", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::ClearCaches(ClearCachesArgs { compact: true })));
    }
}
