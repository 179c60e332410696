// ReportSeal CLI - Command-line interface for report integrity

mod client;
mod files;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reportseal_crypto::ReportDigest;
use serde_json::Value;

use client::ApiClient;

/// ReportSeal - SEO report digests, IPFS pinning and on-chain anchoring
#[derive(Parser)]
#[command(name = "reportseal")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Base URL of the ReportSeal server
    #[arg(long, env = "REPORTSEAL_SERVER", default_value = "http://localhost:8080", global = true)]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 120, global = true)]
    timeout: u64,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a report digest locally
    Digest {
        /// Path to the report file
        path: PathBuf,

        /// Hash the canonical (RFC 8785) form of a JSON report
        #[arg(long)]
        canonical_json: bool,
    },
    /// Check whether a report file is anchored
    Verify {
        /// Path to the report file
        path: PathBuf,
    },
    /// Look up the ledger record for a digest
    Lookup {
        /// Report digest (0x + 64 hex characters)
        digest: String,
    },
    /// Pin, anchor and register a report file
    Publish {
        /// Path to the report file
        path: PathBuf,

        /// Owner identity, usually a wallet address
        #[arg(long, env = "REPORTSEAL_OWNER")]
        owner: String,
    },
    /// Anchor a report digest, e.g. to repair a failed publish
    Anchor {
        /// Report file to digest locally
        #[arg(required_unless_present = "digest", conflicts_with = "digest")]
        path: Option<PathBuf>,

        /// Digest to anchor instead of a file
        #[arg(long)]
        digest: Option<String>,

        /// Record a registry entry for this owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// List an owner's published reports, newest first
    Reports {
        /// Owner identity
        owner: String,
    },
    /// Download a pinned report by CID
    Download {
        /// Content identifier
        cid: String,

        /// Output path (defaults to report-<cid>.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Refuse to save unless the bytes match this digest
        #[arg(long, value_name = "DIGEST")]
        expect_digest: Option<String>,
    },
    /// Show ledger, storage and registry status
    Diag,
}

fn main() {
    let cli = Cli::parse();
    let client = match ApiClient::new(&cli.server, Duration::from_secs(cli.timeout)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let json = cli.json;

    let result = match cli.command {
        Commands::Digest { path, canonical_json } => handle_digest(&path, canonical_json),
        Commands::Verify { path } => handle_verify(&client, &path, json),
        Commands::Lookup { digest } => handle_lookup(&client, &digest, json),
        Commands::Publish { path, owner } => handle_publish(&client, &path, &owner, json),
        Commands::Anchor { path, digest, owner } => handle_anchor(&client, path, digest, owner.as_deref(), json),
        Commands::Reports { owner } => handle_reports(&client, &owner, json),
        Commands::Download {
            cid,
            output,
            expect_digest,
        } => handle_download(&client, &cid, output, expect_digest.as_deref()),
        Commands::Diag => handle_diag(&client, json),
    };

    match result {
        Ok(true) => {}
        // Negative result (e.g. report not anchored), already reported
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn parse_digest(raw: &str) -> Result<ReportDigest> {
    raw.parse::<ReportDigest>()
        .map_err(|e| anyhow!("Invalid digest '{}': {}", raw, e))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Seconds since epoch as RFC 3339, or the raw number when out of range.
fn format_timestamp(value: &Value) -> String {
    match value.as_u64() {
        Some(secs) => i64::try_from(secs)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| secs.to_string()),
        None => "-".to_string(),
    }
}

/// Renders an optional string field, `-` when absent.
fn field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn handle_digest(path: &std::path::Path, canonical_json: bool) -> Result<bool> {
    let digest = files::digest_file(path, canonical_json)?;
    println!("{}", digest);
    Ok(true)
}

fn handle_verify(client: &ApiClient, path: &std::path::Path, json: bool) -> Result<bool> {
    let bytes = files::read_file(path)?;
    let result = client.verify(&files::upload_name(path), &bytes)?;
    if json {
        print_json(&result)?;
        return Ok(result["valid"] == true);
    }

    if result["valid"] == true {
        println!("{} {}", "✓".green().bold(), "Report verified on chain".green());
        println!();
        println!("  Digest:    {}", field(&result["digest"]));
        println!("  Anchored:  {}", format_timestamp(&result["timestamp"]));
        println!("  Tx:        {}", field(&result["record"]["transactionRef"]));
        if let Some(cid) = result["entry"]["storageReceipt"]["cid"].as_str() {
            println!("  CID:       {}", cid);
        }
        Ok(true)
    } else {
        eprintln!(
            "{} {}",
            "✗".red().bold(),
            result["message"].as_str().unwrap_or("Report not found on blockchain").red()
        );
        eprintln!();
        eprintln!("  Digest:    {}", field(&result["digest"]));
        Ok(false)
    }
}

fn handle_lookup(client: &ApiClient, raw: &str, json: bool) -> Result<bool> {
    let digest = parse_digest(raw)?;
    let result = client.lookup(&digest.to_string())?;
    if json {
        print_json(&result)?;
        return Ok(result["found"] == true);
    }

    if result["found"] == true {
        let record = &result["record"];
        println!("{} {}", "✓".green().bold(), "Record found".green());
        println!();
        println!("  Digest:    {}", digest);
        println!("  Anchored:  {}", format_timestamp(&record["timestamp"]));
        println!("  Tx:        {}", field(&record["transactionRef"]));
        println!("  Block:     {}", field(&record["blockNumber"]));
        println!("  Network:   {}", field(&record["networkId"]));
        Ok(true)
    } else {
        eprintln!("{} No ledger record for {}", "✗".red().bold(), digest);
        Ok(false)
    }
}

fn handle_publish(client: &ApiClient, path: &std::path::Path, owner: &str, json: bool) -> Result<bool> {
    let bytes = files::read_file(path)?;
    let result = client.upload(&files::upload_name(path), &bytes, owner)?;
    if json {
        print_json(&result)?;
        return Ok(true);
    }

    let headline = if result["alreadyAnchored"] == true {
        "Report published (already anchored)"
    } else {
        "Report published"
    };
    println!("{} {}", "✓".green().bold(), headline.green());
    println!();
    println!("  Digest:    {}", field(&result["digest"]));
    println!("  CID:       {}", field(&result["cid"]));
    println!("  URL:       {}", field(&result["retrievalUrl"]));
    println!("  Tx:        {}", field(&result["transactionRef"]));
    println!("  Network:   {}", field(&result["network"]["name"]));
    if result["store"]["success"] != true {
        println!(
            "  {} registry entry not recorded: {}",
            "!".yellow().bold(),
            field(&result["store"]["error"])
        );
    }
    Ok(true)
}

fn handle_anchor(
    client: &ApiClient,
    path: Option<PathBuf>,
    digest: Option<String>,
    owner: Option<&str>,
    json: bool,
) -> Result<bool> {
    let digest = match (path, digest) {
        (_, Some(raw)) => parse_digest(&raw)?,
        (Some(path), None) => files::digest_file(&path, false)?,
        (None, None) => return Err(anyhow!("Provide a file or --digest")),
    };

    let result = client.anchor(&digest.to_string(), owner)?;
    if json {
        print_json(&result)?;
        return Ok(true);
    }

    if result["alreadyAnchored"] == true {
        println!("{} {}", "✓".green().bold(), "Already anchored".green());
    } else {
        println!("{} {}", "✓".green().bold(), "Anchored".green());
    }
    println!();
    println!("  Digest:    {}", digest);
    println!("  Tx:        {}", field(&result["transactionRef"]));
    println!("  Block:     {}", field(&result["blockNumber"]));
    println!("  Network:   {}", field(&result["network"]["name"]));
    Ok(true)
}

fn handle_reports(client: &ApiClient, owner: &str, json: bool) -> Result<bool> {
    let result = client.reports(owner)?;
    if json {
        print_json(&result)?;
        return Ok(true);
    }

    let reports = result["reports"].as_array().cloned().unwrap_or_default();
    if reports.is_empty() {
        println!("No reports for {}", owner);
        return Ok(true);
    }

    println!("{} report(s) for {}", reports.len(), owner.cyan());
    println!();
    for report in &reports {
        let status = if report["network"].is_null() {
            "pinned".yellow()
        } else {
            "anchored".green()
        };
        println!("  {} [{}]", field(&report["digest"]), status);
        println!("    Created: {}", field(&report["createdAt"]));
        println!("    CID:     {}", field(&report["storageReceipt"]["cid"]));
        println!("    Tx:      {}", field(&report["transactionRef"]));
    }
    Ok(true)
}

fn handle_download(
    client: &ApiClient,
    cid: &str,
    output: Option<PathBuf>,
    expect_digest: Option<&str>,
) -> Result<bool> {
    let expected = expect_digest.map(parse_digest).transpose()?;
    let output = output.unwrap_or_else(|| files::default_download_path(cid));

    let bytes = client.download(cid)?;
    let actual = files::save_download(&bytes, &output, expected.as_ref())?;

    println!("{} Saved {} ({} bytes)", "✓".green().bold(), output.display(), bytes.len());
    println!("  Digest:    {}", actual);
    if expected.is_some() {
        println!("  {}", "Digest matches".green());
    }
    Ok(true)
}

fn handle_diag(client: &ApiClient, json: bool) -> Result<bool> {
    let result = client.diagnostics()?;
    if json {
        print_json(&result)?;
        return Ok(result["success"] == true);
    }

    let mark = |ok: bool| if ok { "✓".green().bold() } else { "✗".red().bold() };

    let ledger = &result["ledger"];
    println!("{} Ledger", mark(ledger["ok"] == true));
    if ledger["ok"] == true {
        let status = &ledger["status"];
        println!(
            "    Network:  {} ({})",
            field(&status["network"]["name"]),
            field(&status["network"]["chainId"])
        );
        println!("    RPC:      {}", field(&status["rpcUrl"]));
        println!("    Block:    {}", field(&status["latestBlock"]));
        println!(
            "    Contract: {} ({} bytes of code)",
            field(&status["contractAddress"]),
            field(&status["contractCodeSize"])
        );
        println!(
            "    Signer:   {} ({})",
            field(&status["signerAddress"]),
            field(&status["balance"])
        );
    } else {
        println!("    {}", field(&ledger["error"]["error"]));
    }

    let storage = &result["storage"];
    println!("{} Storage", mark(storage["ok"] == true));
    if storage["ok"] != true {
        println!("    {}", field(&storage["error"]["error"]));
    }

    println!("{} Registry ({})", mark(true), field(&result["registry"]["backend"]));
    Ok(result["success"] == true)
}
