#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use hashindex::config::{PrepareConfig, check_order};
use hashindex::key::{parse_hex, to_hex};
use hashindex::prepare::prepare;
use hashindex::storage::btree::{Key, Tree, TreeStats};
use hashindex::storage::{FileStorage, Storage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

/// Exit code when every queried hash is present or a command succeeded.
const EXIT_OK: i32 = 0;
/// Exit code when at least one queried hash is missing.
const EXIT_MISSING: i32 = 1;
/// Exit code for errors.
const EXIT_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hashindex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{e:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Prepare {
            input,
            output,
            work_dir,
            order,
        } => {
            let config = PrepareConfig::from_env().context("loading configuration")?;
            let config = apply_overrides(config, work_dir, order)?;

            let summary = prepare(&input, &output, &config)
                .await
                .with_context(|| format!("preparing {}", output.display()))?;
            println!(
                "{} keys ({} duplicates dropped), height {}, {} nodes",
                summary.keys, summary.duplicates, summary.height, summary.nodes
            );
            Ok(EXIT_OK)
        }
        Commands::Exists { index, hashes } => {
            let mut tree = open(&index)?;
            exists(&mut tree, &hashes, &mut std::io::stdout().lock())
        }
        Commands::Verify { index } => {
            let mut tree = open(&index)?;
            let stats = tree
                .verify()
                .with_context(|| format!("verifying {}", index.display()))?;
            println!("ok: {} keys in {} nodes", stats.keys, stats.nodes);
            Ok(EXIT_OK)
        }
        Commands::Stats { index } => {
            let mut tree = open(&index)?;
            let stats = tree.inspect()?;
            print_stats(&stats);
            Ok(EXIT_OK)
        }
    }
}

/// Command-line flags take precedence over the environment.
fn apply_overrides(
    mut config: PrepareConfig,
    work_dir: Option<PathBuf>,
    order: Option<u32>,
) -> Result<PrepareConfig> {
    if let Some(work_dir) = work_dir {
        config.work_directory = work_dir;
    }
    if let Some(order) = order {
        config.order = check_order("--order", order)?;
    }
    Ok(config)
}

/// Look up every hash, writing `<HASH> 1|0` per line. All hashes are parsed
/// before any lookup, so a malformed one produces no output.
fn exists<S: Storage>(
    tree: &mut Tree<S>,
    hashes: &[String],
    out: &mut impl Write,
) -> Result<i32> {
    let keys = hashes
        .iter()
        .map(|hash| parse_hex(hash).with_context(|| format!("parsing hash '{hash}'")))
        .collect::<Result<Vec<Key>>>()?;

    let mut all_found = true;
    for key in &keys {
        let found = tree.contains(key)?;
        all_found &= found;
        writeln!(out, "{} {}", to_hex(key), u8::from(found))?;
    }
    Ok(if all_found { EXIT_OK } else { EXIT_MISSING })
}

fn open(path: &Path) -> Result<Tree<FileStorage>> {
    let storage = FileStorage::open_read_only(path)
        .with_context(|| format!("opening {}", path.display()))?;
    Tree::open_for_lookup(storage).with_context(|| format!("reading header of {}", path.display()))
}

fn print_stats(stats: &TreeStats) {
    println!("order:     {}", stats.order);
    println!("root:      {}", stats.root);
    println!("height:    {}", stats.height);
    println!("nodes:     {}", stats.nodes);
    println!("leaves:    {}", stats.leaves);
    println!("keys:      {}", stats.keys);
    println!("min keys:  {}", stats.min_keys);
    match stats.min_fill {
        Some(fill) => println!("min fill:  {fill}"),
        None => println!("min fill:  -"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashindex::storage::MemoryStorage;
    use hashindex::storage::btree::BulkBuilder;
    use tempfile::tempdir;

    const PRESENT_A: &str = "0A00000000000000000000000000000000000001";
    const PRESENT_B: &str = "F000000000000000000000000000000000000000";
    const ABSENT: &str = "0B00000000000000000000000000000000000000";

    fn memory_tree() -> Tree<MemoryStorage> {
        let mut builder =
            BulkBuilder::create_for_bulk_load(MemoryStorage::new(), 3).expect("create builder");
        for i in 0u8..40 {
            let mut key = [0u8; 20];
            key[0] = i;
            key[19] = 1;
            builder.insert_sorted(key).expect("insert");
        }
        builder
            .insert_sorted(parse_hex(PRESENT_B).expect("parse"))
            .expect("insert");
        builder.finalize().expect("finalize");
        Tree::open_for_lookup(builder.into_store().into_inner()).expect("open tree")
    }

    fn hashes(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_exists_all_found() {
        let mut tree = memory_tree();
        let mut out = Vec::new();
        let lowercase = PRESENT_A.to_lowercase();

        let code = exists(&mut tree, &hashes(&[lowercase.as_str(), PRESENT_B]), &mut out)
            .expect("exists");

        assert_eq!(code, EXIT_OK);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            format!("{PRESENT_A} 1\n{PRESENT_B} 1\n")
        );
    }

    #[test]
    fn test_exists_one_missing() {
        let mut tree = memory_tree();
        let mut out = Vec::new();

        let code = exists(&mut tree, &hashes(&[PRESENT_A, ABSENT, PRESENT_B]), &mut out)
            .expect("exists");

        assert_eq!(code, EXIT_MISSING);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            format!("{PRESENT_A} 1\n{ABSENT} 0\n{PRESENT_B} 1\n")
        );
    }

    #[test]
    fn test_exists_rejects_bad_hash() {
        let mut tree = memory_tree();
        let mut out = Vec::new();

        let result = exists(&mut tree, &hashes(&[PRESENT_A, "XYZ"]), &mut out);

        let error = result.expect_err("bad hash should fail");
        assert!(format!("{error:#}").contains("parsing hash 'XYZ'"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_flags_override_config() {
        let config = PrepareConfig::default();

        let unchanged = apply_overrides(config.clone(), None, None).expect("no overrides");
        assert_eq!(unchanged, config);

        let changed = apply_overrides(config, Some(PathBuf::from("/scratch")), Some(16))
            .expect("overrides");
        assert_eq!(changed.work_directory, PathBuf::from("/scratch"));
        assert_eq!(changed.order, 16);
    }

    #[test]
    fn test_order_flag_is_validated() {
        let error = apply_overrides(PrepareConfig::default(), None, Some(0))
            .expect_err("order 0 should fail");
        assert!(error.to_string().contains("--order"));
    }

    #[tokio::test]
    async fn test_prepare_then_query_through_cli() {
        let dir = tempdir().expect("create temp dir");
        let input = dir.path().join("hashes.txt");
        let output = dir.path().join("hashes.idx");
        let work = dir.path().join("work");
        std::fs::write(&input, format!("{PRESENT_B}:3\n{PRESENT_A}:1\n")).expect("write input");

        let path = |p: &Path| p.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "hashindex".to_string(),
            "prepare".to_string(),
            "--input".to_string(),
            path(&input),
            "--output".to_string(),
            path(&output),
            "--work-dir".to_string(),
            path(&work),
            "--order".to_string(),
            "2".to_string(),
        ])
        .expect("parse prepare args");
        assert_eq!(run(cli).await.expect("prepare"), EXIT_OK);

        let query = |list: &[&str]| {
            let mut args = vec![
                "hashindex".to_string(),
                "exists".to_string(),
                "--index".to_string(),
                path(&output),
            ];
            args.extend(list.iter().map(ToString::to_string));
            Cli::try_parse_from(args).expect("parse exists args")
        };
        assert_eq!(run(query(&[PRESENT_A, PRESENT_B])).await.expect("exists"), EXIT_OK);
        assert_eq!(run(query(&[PRESENT_A, ABSENT])).await.expect("exists"), EXIT_MISSING);
        assert!(run(query(&["not-a-hash"])).await.is_err());

        let verify = Cli::try_parse_from(["hashindex", "verify", "--index", path(&output).as_str()])
            .expect("parse verify args");
        assert_eq!(run(verify).await.expect("verify"), EXIT_OK);
    }

    #[tokio::test]
    async fn test_missing_index_is_an_error() {
        let dir = tempdir().expect("create temp dir");
        let missing = dir.path().join("missing.idx");
        let cli = Cli::try_parse_from([
            "hashindex",
            "stats",
            "--index",
            &*missing.to_string_lossy(),
        ])
        .expect("parse stats args");

        let error = run(cli).await.expect_err("missing index should fail");
        assert!(format!("{error:#}").contains("opening"));
    }
}
