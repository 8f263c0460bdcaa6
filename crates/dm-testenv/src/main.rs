// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(name = "dm-testenv", version, about = "Generate a randomized discovery test environment")]
struct Args {
    /// Seed for reproducible output. Defaults to the current unix time.
    #[arg(long)]
    seed: Option<u64>,

    /// Directory the compose and manifest files are written into.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Compose file name.
    #[arg(long, default_value = "docker-compose.generated.yml")]
    compose_file: String,

    /// Manifest file name.
    #[arg(long, default_value = "testenv-manifest.json")]
    manifest_file: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    });
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let env = dm_testenv::generate(seed, generated_at);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("create {}", args.output_dir.display()))?;
    let compose_path = args.output_dir.join(&args.compose_file);
    let manifest_path = args.output_dir.join(&args.manifest_file);
    std::fs::write(&compose_path, env.compose_yaml())
        .with_context(|| format!("write {}", compose_path.display()))?;
    std::fs::write(&manifest_path, env.manifest_json())
        .with_context(|| format!("write {}", manifest_path.display()))?;

    println!("seed: {seed}");
    println!("services: {}", env.manifest.services.len());
    for service in &env.manifest.services {
        println!(
            "  {} ({}) {} [{}]",
            service.name,
            service.service_type,
            service.ip,
            service.ports.join(", ")
        );
    }
    println!("compose:  {}", compose_path.display());
    println!("manifest: {}", manifest_path.display());
    Ok(())
}
