use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use arbor_codec::ContentHasher;
use arbor_store::{KeySpace, LocalStore, MaintenanceReport, StoreConfig};
use arbor_types::{Blob, Hash, TreeEntry};
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

/// Store directory used when neither `--store` nor `--config` is given.
pub const DEFAULT_STORE_DIR: &str = ".arbor";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let store = open_store(cli.store.as_deref(), cli.config.as_deref())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&store, cli.command, cli.format, &mut out).await?;
    out.flush()?;
    Ok(())
}

pub fn open_store(store: Option<&Path>, config: Option<&Path>) -> anyhow::Result<LocalStore> {
    let config = match (config, store) {
        (Some(path), _) => StoreConfig::load(path)
            .with_context(|| format!("failed to load store config {}", path.display()))?,
        (None, dir) => StoreConfig {
            defer_reads: true,
            ..StoreConfig::log(dir.map_or_else(|| PathBuf::from(DEFAULT_STORE_DIR), Path::to_path_buf))
        },
    };
    debug!(?config, "opening store");
    config.open().context("failed to open store")
}

pub async fn execute(
    store: &LocalStore,
    command: Command,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::PutBlob(args) => cmd_put_blob(store, args, format, out),
        Command::CatBlob(args) => cmd_cat_blob(store, args, out).await,
        Command::BlobMeta(args) => cmd_blob_meta(store, args, format, out).await,
        Command::LsTree(args) => cmd_ls_tree(store, args, format, out).await,
        Command::Has(args) => cmd_has(store, args, format, out),
        Command::ClearCaches(args) => {
            let report = if args.compact {
                store.clear_caches_and_compact_all()?
            } else {
                store.clear_caches()?
            };
            print_report(&report, format, out)
        }
        Command::Compact => {
            let report = store.compact_storage()?;
            print_report(&report, format, out)
        }
    }
}

fn cmd_put_blob(
    store: &LocalStore,
    args: PutBlobArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let contents = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let id = ContentHasher::BLOB.hash(&contents);
    let metadata = store.put_blob(&id, &Blob::new(id, contents))?;

    match format {
        OutputFormat::Json => writeln!(
            out,
            "{}",
            json!({
                "id": id.to_hex(),
                "size": metadata.size,
                "content_hash": metadata.content_hash.to_hex(),
            })
        )?,
        OutputFormat::Text => {
            writeln!(out, "{} Stored blob {}", "✓".green().bold(), id.to_hex().yellow())?;
            writeln!(out, "  Size: {}", metadata.size)?;
            writeln!(out, "  SHA-1: {}", metadata.content_hash.to_hex().cyan())?;
        }
    }
    Ok(())
}

async fn cmd_cat_blob(store: &LocalStore, args: HashArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let Some(blob) = store.get_blob(&args.hash).await? else {
        bail!("blob {} not found", args.hash);
    };
    for chunk in blob.ranges() {
        out.write_all(chunk)?;
    }
    Ok(())
}

async fn cmd_blob_meta(
    store: &LocalStore,
    args: HashArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let Some(metadata) = store.get_blob_metadata(&args.hash).await? else {
        bail!("no metadata for blob {}", args.hash);
    };
    match format {
        OutputFormat::Json => writeln!(
            out,
            "{}",
            json!({
                "id": args.hash.to_hex(),
                "size": metadata.size,
                "content_hash": metadata.content_hash.to_hex(),
            })
        )?,
        OutputFormat::Text => {
            writeln!(out, "Blob {}", args.hash.to_hex().yellow().bold())?;
            writeln!(out, "  Size: {}", metadata.size)?;
            writeln!(out, "  SHA-1: {}", metadata.content_hash.to_hex().cyan())?;
        }
    }
    Ok(())
}

fn entry_kind(entry: &TreeEntry) -> &'static str {
    if entry.mode.is_tree() {
        "tree"
    } else {
        "blob"
    }
}

async fn cmd_ls_tree(
    store: &LocalStore,
    args: HashArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let Some(tree) = store.get_tree(&args.hash).await? else {
        bail!("tree {} not found", args.hash);
    };
    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = tree
                .entries()
                .iter()
                .map(|entry| {
                    json!({
                        "mode": entry.mode.to_string(),
                        "kind": entry_kind(entry),
                        "hash": entry.hash.to_hex(),
                        "name": entry.name,
                    })
                })
                .collect();
            writeln!(out, "{}", json!({ "id": args.hash.to_hex(), "entries": entries }))?;
        }
        OutputFormat::Text => {
            for entry in tree.entries() {
                let name = if entry.mode.is_tree() {
                    entry.name.blue().bold()
                } else {
                    entry.name.normal()
                };
                writeln!(
                    out,
                    "{} {} {}\t{}",
                    entry.mode,
                    entry_kind(entry),
                    entry.hash.to_hex().dimmed(),
                    name
                )?;
            }
        }
    }
    Ok(())
}

fn cmd_has(
    store: &LocalStore,
    args: HasArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let present = store.has_key(args.keyspace, &args.hash)?;
    match format {
        OutputFormat::Json => writeln!(
            out,
            "{}",
            json!({
                "keyspace": args.keyspace.name(),
                "hash": args.hash.to_hex(),
                "present": present,
            })
        )?,
        OutputFormat::Text => {
            let answer = if present { "present".green() } else { "absent".red() };
            writeln!(out, "{} {}: {}", args.keyspace, args.hash.short_hex().yellow(), answer)?;
        }
    }
    Ok(())
}

fn names(key_spaces: &[KeySpace]) -> String {
    key_spaces
        .iter()
        .map(|ks| ks.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_report(report: &MaintenanceReport, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(report)?)?,
        OutputFormat::Text => {
            if !report.cleared.is_empty() {
                writeln!(out, "{} Cleared: {}", "✓".green().bold(), names(&report.cleared))?;
            }
            if !report.compacted.is_empty() {
                writeln!(out, "{} Compacted: {}", "✓".green().bold(), names(&report.compacted))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::{EntryMode, Tree};

    async fn run(store: &LocalStore, args: &[&str]) -> anyhow::Result<String> {
        use clap::Parser;
        let cli = Cli::try_parse_from(std::iter::once("arbor").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        execute(store, cli.command, cli.format, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    fn json(output: &str) -> serde_json::Value {
        serde_json::from_str(output.trim()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Blobs
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_blob_uses_git_blob_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("greeting.txt");
        std::fs::write(&file, b"hello").unwrap();
        let store = open_store(Some(dir.path().join("store").as_path()), None).unwrap();

        let out = run(&store, &["put-blob", file.to_str().unwrap(), "--format", "json"])
            .await
            .unwrap();
        let value = json(&out);
        assert_eq!(value["id"], "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert_eq!(value["size"], 5);
        assert_eq!(value["content_hash"], Hash::sha1(b"hello").to_hex());

        let id = "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0";
        assert_eq!(run(&store, &["cat-blob", id]).await.unwrap(), "hello");
        let meta = json(&run(&store, &["blob-meta", id, "--format", "json"]).await.unwrap());
        assert_eq!(meta["size"], 5);
    }

    #[tokio::test]
    async fn missing_blob_is_an_error() {
        let store = LocalStore::in_memory();
        let id = Hash::sha1(b"nope").to_hex();
        let err = run(&store, &["cat-blob", id.as_str()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    // -----------------------------------------------------------------------
    // Trees and keys
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn ls_tree_lists_entries() {
        let store = LocalStore::in_memory();
        let id = store
            .put_tree(&Tree::new(vec![
                TreeEntry::new(EntryMode::Directory, "src", Hash::sha1(b"src")),
                TreeEntry::new(EntryMode::Regular, "Cargo.toml", Hash::sha1(b"manifest")),
            ]))
            .unwrap()
            .to_hex();

        let out = run(&store, &["ls-tree", id.as_str()]).await.unwrap();
        assert!(out.contains("040000 tree"));
        assert!(out.contains("100644 blob"));

        let value = json(&run(&store, &["ls-tree", id.as_str(), "--format", "json"]).await.unwrap());
        let entries = value["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "Cargo.toml");
        assert_eq!(entries[1]["kind"], "tree");
    }

    #[tokio::test]
    async fn has_reports_presence() {
        let store = LocalStore::in_memory();
        let id = Hash::sha1(b"proxy");
        store.put(KeySpace::ProxyHash, &id, b"upstream").unwrap();
        let hex = id.to_hex();

        let present = json(
            &run(&store, &["has", "proxy_hash", hex.as_str(), "--format", "json"])
                .await
                .unwrap(),
        );
        assert_eq!(present["present"], true);
        let absent = json(&run(&store, &["has", "tree", hex.as_str(), "--format", "json"]).await.unwrap());
        assert_eq!(absent["present"], false);
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn clear_caches_with_compaction() {
        let store = LocalStore::in_memory();
        let id = Hash::sha1(b"b");
        store.put_blob(&id, &Blob::new(id, b"data".to_vec())).unwrap();

        let value = json(
            &run(&store, &["clear-caches", "--compact", "--format", "json"])
                .await
                .unwrap(),
        );
        assert_eq!(value["cleared"].as_array().unwrap().len(), 3);
        assert_eq!(value["compacted"].as_array().unwrap().len(), 5);
        assert!(!store.has_key(KeySpace::Blob, &id).unwrap());

        let text = run(&store, &["compact"]).await.unwrap();
        assert!(text.contains("Compacted"));
        assert!(!text.contains("Cleared"));
    }

    #[tokio::test]
    async fn open_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("arbor.toml");
        std::fs::write(&config, "defer_reads = false\n\n[backend]\nkind = \"memory\"\n").unwrap();
        let store = open_store(None, Some(config.as_path())).unwrap();
        assert!(store.get_future(KeySpace::Blob, &Hash::zero()).is_ready());

        assert!(open_store(None, Some(dir.path().join("missing.toml").as_path())).is_err());
    }
}
