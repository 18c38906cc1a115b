use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use cx_ranking::{RankingPipeline, StdinConfirm};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("rank") => run_rank(&args[2..]),
        Some("clear-cache") => run_clear_cache(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("cx-ranking {}", cx_ranking::VERSION);
    println!();
    println!("Usage:");
    println!("  cx-ranking rank <contest-folder> [options]");
    println!("  cx-ranking clear-cache [--cache-dir DIR]");
    println!();
    println!("Options:");
    println!("  --cache-dir DIR    Cache directory (default: ./cache)");
    println!("  --baseline FILE    Previous ranking file; enables incremental mode");
    println!("  --min-races N      Minimum races to appear in the ranking (default: 1)");
    println!("  --weight W         Contest weight passed to the rating system (default: 1.0)");
    println!("  --out FILE         Write the ranking as CSV instead of printing it");
    println!("  --interactive      Ask on stdin about ambiguous name pairs");
}

struct RankArgs {
    folder: PathBuf,
    cache_dir: PathBuf,
    baseline: Option<PathBuf>,
    min_races: usize,
    weight: f64,
    out: Option<PathBuf>,
    interactive: bool,
}

fn parse_rank_args(args: &[String]) -> Result<RankArgs> {
    let mut folder = None;
    let mut parsed = RankArgs {
        folder: PathBuf::new(),
        cache_dir: PathBuf::from("cache"),
        baseline: None,
        min_races: 1,
        weight: 1.0,
        out: None,
        interactive: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--cache-dir" => {
                parsed.cache_dir = PathBuf::from(expect_value(&mut iter, "--cache-dir")?)
            }
            "--baseline" => {
                parsed.baseline = Some(PathBuf::from(expect_value(&mut iter, "--baseline")?))
            }
            "--min-races" => {
                parsed.min_races = expect_value(&mut iter, "--min-races")?
                    .parse()
                    .context("--min-races expects a number")?
            }
            "--weight" => {
                parsed.weight = expect_value(&mut iter, "--weight")?
                    .parse()
                    .context("--weight expects a number")?
            }
            "--out" => parsed.out = Some(PathBuf::from(expect_value(&mut iter, "--out")?)),
            "--interactive" => parsed.interactive = true,
            other if folder.is_none() && !other.starts_with("--") => {
                folder = Some(PathBuf::from(other))
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    parsed.folder = folder.context("missing <contest-folder> argument")?;
    Ok(parsed)
}

fn expect_value<'a>(iter: &mut std::slice::Iter<'a, String>, flag: &str) -> Result<&'a String> {
    iter.next().with_context(|| format!("{} expects a value", flag))
}

fn run_rank(args: &[String]) -> Result<()> {
    let args = parse_rank_args(args)?;

    println!("🚴 CX Ranking");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut pipeline = RankingPipeline::open(&args.cache_dir);
    pipeline.contest_weight = args.weight;
    if args.interactive {
        pipeline = pipeline.with_decision(Box::new(StdinConfirm));
    }

    if let Some(baseline) = &args.baseline {
        let seeded = pipeline.seed_baseline(baseline)?;
        println!("✓ Seeded {} participants from {}", seeded, baseline.display());
    }

    println!("\n📂 Processing contests in {}...", args.folder.display());
    let report = pipeline.run(&args.folder)?;
    println!("✓ {}", report.summary());

    for (file, error) in &report.failed {
        eprintln!("  ✗ {}: {}", file, error);
    }

    let rankings = pipeline.rankings(args.min_races);
    match &args.out {
        Some(path) => {
            pipeline.export_rankings(path, args.min_races)?;
            println!("\n💾 Ranking written to {}", path.display());
        }
        None => {
            println!("\n🏆 Ranking (min {} races):", args.min_races);
            println!("{:<5} {:<30} {:>8} {:>8} {:>6}", "Rank", "Name", "Rating", "±", "Races");
            for row in &rankings {
                println!(
                    "{:<5} {:<30} {:>8.1} {:>8.1} {:>6}",
                    row.rank, row.name, row.rating, row.uncertainty, row.races
                );
            }
        }
    }

    Ok(())
}

fn run_clear_cache(args: &[String]) -> Result<()> {
    let mut cache_dir = PathBuf::from("cache");
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--cache-dir" => cache_dir = PathBuf::from(expect_value(&mut iter, "--cache-dir")?),
            other => bail!("unknown argument: {}", other),
        }
    }

    let mut pipeline = RankingPipeline::open(&cache_dir);
    pipeline.clear_cache()?;
    println!("✓ All caches cleared in {}", cache_dir.display());
    println!("  The next run will reprocess every contest file.");
    Ok(())
}
