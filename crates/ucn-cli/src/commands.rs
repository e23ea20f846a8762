use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;
use ucn_crypto::ContentHasher;
use ucn_ledger::{
    BlockReader, BlockWriter, ChainStore, ChainValidator, ValidationReport, Violation,
};
use ucn_store::{AnyBackend, BlockBackend};
use ucn_types::{BlockPosition, BlockRecord};

use crate::cli::*;
use crate::config::CliConfig;

type Store = ChainStore<AnyBackend>;

pub fn run_command(cli: Cli, config: CliConfig) -> anyhow::Result<()> {
    let backend = AnyBackend::open(&config.store).with_context(|| {
        format!("opening store at {}", config.store.data_dir.display())
    })?;
    debug!(chain = %config.chain, backend = ?backend.kind(), "store opened");
    let backend = Arc::new(backend);
    let store = ChainStore::open(Arc::clone(&backend), config.chain.clone());
    let format = cli.format;

    match cli.command {
        Command::Append(args) => cmd_append(&store, args, format),
        Command::Show(args) => cmd_show(&store, &args.hash, format),
        Command::Get(args) => cmd_get(&store, args.index, format),
        Command::Count => cmd_count(&store, format),
        Command::Log(args) => cmd_log(&store, args.limit, format),
        Command::Remove(args) => {
            let removed = store.remove_block(&args.hash)?;
            print_removed(&store, &removed, format)
        }
        Command::RemoveIndex(args) => {
            let removed = store.remove_block_by_index(position(args.index)?)?;
            print_removed(&store, &removed, format)
        }
        Command::Verify(args) => cmd_verify(&store, args, format),
        Command::Chains => cmd_chains(&backend, format),
        Command::Compact => cmd_compact(&store, format),
    }
}

/// JSON rendering of a block; the payload is hex-encoded.
#[derive(Debug, Serialize)]
struct BlockView {
    hash: String,
    index: u64,
    protocol: String,
    previous_hash: String,
    data_hex: String,
}

impl From<&BlockRecord> for BlockView {
    fn from(block: &BlockRecord) -> Self {
        Self {
            hash: ContentHasher::block_hash(block).to_string(),
            index: block.index,
            protocol: block.protocol.clone(),
            previous_hash: block.previous_hash.clone(),
            data_hex: hex::encode(&block.data),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportView<'a> {
    chain: &'a str,
    block_count: u64,
    tip: Option<String>,
    valid: bool,
    violations: Vec<ViolationView<'a>>,
}

#[derive(Debug, Serialize)]
struct ViolationView<'a> {
    position: u64,
    kind: String,
    description: &'a str,
}

impl<'a> From<&'a ValidationReport> for ReportView<'a> {
    fn from(report: &'a ValidationReport) -> Self {
        Self {
            chain: report.chain.as_str(),
            block_count: report.block_count,
            tip: report.tip.map(|h| h.to_string()),
            valid: report.is_valid(),
            violations: report
                .violations
                .iter()
                .map(|v: &'a Violation| ViolationView {
                    position: v.position,
                    kind: format!("{:?}", v.kind),
                    description: &v.description,
                })
                .collect(),
        }
    }
}

fn cmd_append(store: &Store, args: AppendArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = read_payload(&args.payload)?;
    let hash = store.append(&args.protocol, &data, args.previous.as_deref())?;
    let block = store
        .get_block(&hash.to_string())?
        .ok_or_else(|| anyhow!("appended block {hash} not readable"))?;

    match format {
        OutputFormat::Json => print_json(&BlockView::from(&block)),
        OutputFormat::Text => {
            println!(
                "{} Appended block {} to {}",
                "✓".green().bold(),
                format!("#{}", block.index).yellow(),
                store.chain().to_string().bold()
            );
            println!("  Hash: {}", hash.to_string().cyan());
            Ok(())
        }
    }
}

fn cmd_show(store: &Store, hash: &str, format: OutputFormat) -> anyhow::Result<()> {
    let block = store
        .get_block(hash)?
        .ok_or_else(|| anyhow!("no block {hash} in chain {}", store.chain()))?;
    print_block(&block, format)
}

fn cmd_get(store: &Store, index: i64, format: OutputFormat) -> anyhow::Result<()> {
    let position = position(index)?;
    let block = store
        .get_block_by_index(position)?
        .ok_or_else(|| anyhow!("no block at {position} in chain {}", store.chain()))?;
    print_block(&block, format)
}

fn cmd_count(store: &Store, format: OutputFormat) -> anyhow::Result<()> {
    let count = store.get_block_count()?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "chain": store.chain().as_str(),
            "count": count,
        })),
        OutputFormat::Text => {
            println!("{count}");
            Ok(())
        }
    }
}

fn cmd_log(store: &Store, limit: usize, format: OutputFormat) -> anyhow::Result<()> {
    let blocks = store.read_all()?;
    let newest: Vec<&BlockRecord> = blocks.iter().rev().take(limit).collect();

    match format {
        OutputFormat::Json => {
            let views: Vec<BlockView> = newest.into_iter().map(BlockView::from).collect();
            print_json(&views)
        }
        OutputFormat::Text => {
            if newest.is_empty() {
                println!("Chain {} is empty.", store.chain().to_string().bold());
            }
            for block in newest {
                let hash = ContentHasher::block_hash(block);
                println!(
                    "{}  {}  {}  {}",
                    format!("#{}", block.index).yellow().bold(),
                    hash.short_hex().dimmed(),
                    block.protocol.cyan(),
                    render_data(&block.data)
                );
            }
            Ok(())
        }
    }
}

fn print_removed(
    store: &Store,
    removed: &[BlockRecord],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let views: Vec<BlockView> = removed.iter().map(BlockView::from).collect();
            print_json(&views)
        }
        OutputFormat::Text => {
            if removed.is_empty() {
                println!("Nothing removed.");
                return Ok(());
            }
            println!(
                "{} Removed {} block(s) from {}",
                "✓".green().bold(),
                removed.len().to_string().bold(),
                store.chain().to_string().bold()
            );
            for block in removed {
                println!(
                    "  {} {}",
                    format!("#{}", block.index).yellow(),
                    ContentHasher::block_hash(block).to_string().dimmed()
                );
            }
            Ok(())
        }
    }
}

fn cmd_verify(store: &Store, args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let reports = if args.all {
        ChainValidator::validate_all(store.backend())?
    } else {
        vec![store.verify()?]
    };

    match format {
        OutputFormat::Json => {
            let views: Vec<ReportView> = reports.iter().map(ReportView::from).collect();
            print_json(&views)?;
        }
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.is_valid()).count();
    if failed > 0 {
        bail!("{failed} chain(s) failed verification");
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    if report.is_valid() {
        println!(
            "{} Chain {} verified: {} block(s)",
            "✓".green().bold(),
            report.chain.to_string().bold(),
            report.block_count
        );
        if let Some(tip) = &report.tip {
            println!("  Tip: {}", tip.to_string().cyan());
        }
        return;
    }
    println!(
        "{} Chain {} has {} violation(s)",
        "✗".red().bold(),
        report.chain.to_string().bold(),
        report.violations.len()
    );
    for violation in &report.violations {
        println!(
            "  {} {:?}: {}",
            format!("#{}", violation.position).yellow(),
            violation.kind,
            violation.description
        );
    }
}

fn cmd_chains(backend: &AnyBackend, format: OutputFormat) -> anyhow::Result<()> {
    let chains = backend.chains()?;
    match format {
        OutputFormat::Json => {
            let names: Vec<&str> = chains.iter().map(|c| c.as_str()).collect();
            print_json(&names)
        }
        OutputFormat::Text => {
            if chains.is_empty() {
                println!("No chains.");
            }
            for chain in &chains {
                println!("{}", chain.to_string().bold());
            }
            Ok(())
        }
    }
}

fn cmd_compact(store: &Store, format: OutputFormat) -> anyhow::Result<()> {
    let compacted = store.backend().compact(store.chain())?;
    match (format, compacted) {
        (OutputFormat::Json, blocks) => print_json(&serde_json::json!({
            "chain": store.chain().as_str(),
            "compacted": blocks.is_some(),
            "blocks": blocks,
        })),
        (OutputFormat::Text, Some(blocks)) => {
            println!(
                "{} Compacted {}: {} live block(s)",
                "✓".green().bold(),
                store.chain().to_string().bold(),
                blocks
            );
            Ok(())
        }
        (OutputFormat::Text, None) => {
            println!("Backend {:?} keeps no log; nothing to compact.", store.backend().kind());
            Ok(())
        }
    }
}

fn print_block(block: &BlockRecord, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&BlockView::from(block)),
        OutputFormat::Text => {
            let hash = ContentHasher::block_hash(block);
            println!(
                "Block {} {}",
                format!("#{}", block.index).yellow().bold(),
                hash.to_string().cyan()
            );
            println!("  Protocol: {}", block.protocol);
            if block.previous_hash.is_empty() {
                println!("  Previous: {}", "(genesis)".dimmed());
            } else {
                println!("  Previous: {}", block.previous_hash);
            }
            println!("  Data:     {}", render_data(&block.data));
            Ok(())
        }
    }
}

fn position(index: i64) -> anyhow::Result<BlockPosition> {
    BlockPosition::from_signed(index)
        .ok_or_else(|| anyhow!("invalid index {index}: use a non-negative index or -1 for the tip"))
}

fn read_payload(payload: &PayloadArgs) -> anyhow::Result<Vec<u8>> {
    if let Some(text) = &payload.data {
        return Ok(text.as_bytes().to_vec());
    }
    if let Some(encoded) = &payload.data_hex {
        return hex::decode(encoded.trim()).context("--data-hex is not valid hex");
    }
    if let Some(path) = &payload.data_file {
        return fs::read(path).with_context(|| format!("reading {}", path.display()));
    }
    bail!("one of --data, --data-hex or --data-file is required")
}

/// Printable UTF-8 as-is, anything else as `0x`-prefixed hex.
fn render_data(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("0x{}", hex::encode(data)),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;

    use super::*;

    fn config_for(dir: &Path, args: &[&str]) -> (Cli, CliConfig) {
        let mut argv = vec!["ucn", "--data-dir", dir.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        let mut config = CliConfig::default();
        config.apply_overrides(&cli).unwrap();
        (cli, config)
    }

    fn run(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
        let (cli, config) = config_for(dir, args);
        run_command(cli, config)
    }

    fn open(dir: &Path) -> Store {
        let (_, config) = config_for(dir, &["count"]);
        ChainStore::open(Arc::new(AnyBackend::open(&config.store).unwrap()), config.chain)
    }

    #[test]
    fn append_and_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["append", "-p", "transfer", "--data", "first"]).unwrap();
        run(dir.path(), &["append", "-p", "transfer", "--data-hex", "00ff"]).unwrap();

        let store = open(dir.path());
        assert_eq!(store.get_block_count().unwrap(), 2);
        let tip = store.tip().unwrap().unwrap();
        assert_eq!(tip.data, vec![0x00, 0xff]);
        let tip_hash = store.tip_hash().unwrap().unwrap().to_string();
        drop(store);

        run(dir.path(), &["show", &tip_hash]).unwrap();
        run(dir.path(), &["--format", "json", "get", "-1"]).unwrap();
        run(dir.path(), &["log", "-n", "1"]).unwrap();
        run(dir.path(), &["verify"]).unwrap();
        run(dir.path(), &["chains"]).unwrap();
    }

    #[test]
    fn stale_previous_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["append", "-p", "p", "--data", "a"]).unwrap();
        let err = run(
            dir.path(),
            &["append", "-p", "p", "--data", "b", "--previous", "sha256:stale"],
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid previous block hash"));
    }

    #[test]
    fn remove_index_cascades() {
        let dir = tempfile::tempdir().unwrap();
        for data in ["a", "b", "c"] {
            run(dir.path(), &["append", "-p", "p", "--data", data]).unwrap();
        }
        run(dir.path(), &["remove-index", "1"]).unwrap();
        assert_eq!(open(dir.path()).get_block_count().unwrap(), 1);

        run(dir.path(), &["compact"]).unwrap();
        assert_eq!(open(dir.path()).get_block_count().unwrap(), 1);
    }

    #[test]
    fn missing_blocks_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), &["show", "sha256:unknown"]).is_err());
        assert!(run(dir.path(), &["get", "0"]).is_err());
        assert!(run(dir.path(), &["get", "-2"]).is_err());
        // Removing an absent block is not a failure.
        run(dir.path(), &["remove", "sha256:unknown"]).unwrap();
    }

    #[test]
    fn chain_flag_selects_partition() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["--chain", "accounts", "append", "-p", "p", "--data", "a"]).unwrap();
        assert_eq!(open(dir.path()).get_block_count().unwrap(), 0);
        assert!(dir.path().join("accounts.chain").is_file());
    }

    #[test]
    fn payload_sources() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("payload.bin");
        fs::write(&file, [1u8, 2, 3]).unwrap();

        let from_file = PayloadArgs { data: None, data_hex: None, data_file: Some(file) };
        assert_eq!(read_payload(&from_file).unwrap(), vec![1, 2, 3]);

        let from_hex = PayloadArgs { data: None, data_hex: Some("0a0B".into()), data_file: None };
        assert_eq!(read_payload(&from_hex).unwrap(), vec![0x0a, 0x0b]);

        let bad_hex = PayloadArgs { data: None, data_hex: Some("xyz".into()), data_file: None };
        assert!(read_payload(&bad_hex).is_err());
    }

    #[test]
    fn render_data_falls_back_to_hex() {
        assert_eq!(render_data(b"hello"), "hello");
        assert_eq!(render_data(&[0xff, 0x00]), "0xff00");
        assert_eq!(render_data(b"a\nb"), "0x610a62");
    }

    #[test]
    fn block_view_hex_encodes_payload() {
        let record = BlockRecord::new("test_protocol", b"test_data".to_vec(), "", 0);
        let view = BlockView::from(&record);
        assert_eq!(
            view.hash,
            "sha256:d0c7f548d3117670fbe890fe72e891851affcdea0b8f0b95444e7b2596296847"
        );
        assert_eq!(view.data_hex, hex::encode(b"test_data"));
    }
}
