//! powertail CLI: bench, demo, and drive the streaming power-law filter.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_powertail::{kernel, power_law_taps, StreamConvolver};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "powertail")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure streaming throughput
    Bench {
        /// Samples per block
        #[arg(short = 'n', long, default_value = "2048")]
        block_len: usize,

        /// Decay exponent
        #[arg(short = 's', long, default_value = "0.1")]
        decay: f64,

        /// Blocks to process per filter
        #[arg(short, long, default_value = "5000")]
        blocks: usize,

        /// Independent filters driven in parallel
        #[arg(short, long, default_value = "1")]
        contexts: usize,
    },

    /// Show how an impulse is remembered across block boundaries
    Retention {
        /// Samples per block
        #[arg(short = 'n', long, default_value = "2048")]
        block_len: usize,

        /// Decay exponent
        #[arg(short = 's', long, default_value = "0.5")]
        decay: f64,

        /// Extra silent blocks to observe after the tail block
        #[arg(short, long, default_value = "3")]
        blocks: usize,

        /// Impulse amplitude
        #[arg(short, long, default_value = "1.0")]
        amplitude: f64,
    },

    /// Stream a CSV of samples through the filter
    Filter {
        /// Input CSV (one sample per line, optional header)
        input: PathBuf,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file (TOML or JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Samples per block
        #[arg(short = 'n', long)]
        block_len: Option<usize>,

        /// Decay exponent
        #[arg(short = 's', long)]
        decay: Option<f64>,
    },

    /// Print the kernel's magnitude response
    Response {
        /// Samples per block (also the kernel length)
        #[arg(short = 'n', long, default_value = "64")]
        block_len: usize,

        /// Decay exponent
        #[arg(short = 's', long, default_value = "0.5")]
        decay: f64,

        /// Response points from DC to Nyquist
        #[arg(short, long, default_value = "33")]
        points: usize,
    },

    /// Solve for the exponent hitting a target kernel weight at a horizon
    Tune {
        /// Lag (in samples) at which the kernel should reach the target
        #[arg(long, default_value = "1000")]
        half_life: f64,

        /// Kernel weight at the horizon
        #[arg(long, default_value = "0.5")]
        target: f64,

        /// Write the resulting configuration here (TOML or JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Block length recorded in the written configuration
        #[arg(short = 'n', long, default_value = "2048")]
        block_len: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Bench {
            block_len,
            decay,
            blocks,
            contexts,
        } => {
            run_bench(block_len, decay, blocks, contexts, cli.format)?;
        }
        Commands::Retention {
            block_len,
            decay,
            blocks,
            amplitude,
        } => {
            run_retention(block_len, decay, blocks, amplitude, cli.format)?;
        }
        Commands::Filter {
            input,
            output,
            config,
            block_len,
            decay,
        } => {
            run_filter(&input, &output, config, block_len, decay, cli.format)?;
        }
        Commands::Response {
            block_len,
            decay,
            points,
        } => {
            run_response(block_len, decay, points, cli.format)?;
        }
        Commands::Tune {
            half_life,
            target,
            output,
            block_len,
        } => {
            run_tune(half_life, target, output, block_len, cli.format)?;
        }
    }

    Ok(())
}

fn run_bench(
    block_len: usize,
    decay: f64,
    blocks: usize,
    contexts: usize,
    format: OutputFormat,
) -> Result<()> {
    anyhow::ensure!(contexts > 0, "contexts must be at least 1");

    tracing::info!(
        "Benchmarking: block_len={}, decay={}, blocks={}, contexts={}",
        block_len,
        decay,
        blocks,
        contexts
    );

    let input: Vec<f64> = (0..block_len)
        .map(|i| i as f64 / block_len as f64)
        .collect();

    let mut filters = Vec::with_capacity(contexts);
    for _ in 0..contexts {
        filters.push(StreamConvolver::new(block_len, decay)?);
    }
    let mut outputs = vec![vec![0.0; block_len]; contexts];

    // One warmup block per filter, outside the timed region.
    for (f, out) in filters.iter_mut().zip(outputs.iter_mut()) {
        f.process(&input, out)?;
    }

    let start = Instant::now();
    filters
        .par_iter_mut()
        .zip(outputs.par_iter_mut())
        .try_for_each(|(f, out)| {
            for _ in 0..blocks {
                f.process(&input, out)?;
            }
            Ok::<(), lib_powertail::FilterError>(())
        })?;
    let elapsed = start.elapsed().as_secs_f64();

    let total_samples = (block_len * blocks * contexts) as f64;
    let msamples_per_sec = total_samples / elapsed / 1e6;
    let avg_latency_ms = elapsed / (blocks * contexts) as f64 * 1e3;

    match format {
        OutputFormat::Text => {
            println!("=== powertail bench ===");
            println!("Block length:   {}", block_len);
            println!("Decay exponent: {}", decay);
            println!("Blocks:         {}", blocks);
            println!("Contexts:       {}", contexts);
            println!("Total samples:  {}", block_len * blocks * contexts);
            println!();
            println!("Time:           {:.4} s", elapsed);
            println!("Avg latency:    {:.4} ms per block", avg_latency_ms);
            println!("Throughput:     {:.2} Msamples/sec", msamples_per_sec);
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "block_len": block_len,
                "decay": decay,
                "blocks": blocks,
                "contexts": contexts,
                "seconds": elapsed,
                "avg_latency_ms": avg_latency_ms,
                "msamples_per_sec": msamples_per_sec,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv => {
            println!("block_len,decay,blocks,contexts,seconds,avg_latency_ms,msamples_per_sec");
            println!(
                "{},{},{},{},{:.6},{:.6},{:.3}",
                block_len, decay, blocks, contexts, elapsed, avg_latency_ms, msamples_per_sec
            );
        }
    }

    Ok(())
}

fn run_retention(
    block_len: usize,
    decay: f64,
    blocks: usize,
    amplitude: f64,
    format: OutputFormat,
) -> Result<()> {
    tracing::info!(
        "Retention demo: block_len={}, decay={}, amplitude={}",
        block_len,
        decay,
        amplitude
    );

    let mut filter = StreamConvolver::new(block_len, decay)?;
    let mut out = vec![0.0; block_len];
    let silence = vec![0.0; block_len];

    // Impulse on the LAST sample of the first block, so the entire decay
    // curve crosses the block boundary and arrives via the carried tail.
    let mut impulse = vec![0.0; block_len];
    impulse[block_len - 1] = amplitude;

    filter.process(&impulse, &mut out)?;
    let impulse_max = max_abs(&out);

    filter.process(&silence, &mut out)?;
    let checkpoints = log_checkpoints(block_len);
    let curve: Vec<(usize, f64)> = checkpoints
        .iter()
        .map(|&t| (t + 1, out[t].abs()))
        .collect();

    let mut silent_max = Vec::with_capacity(blocks);
    for _ in 0..blocks {
        filter.process(&silence, &mut out)?;
        silent_max.push(max_abs(&out));
    }

    // Reset check: build a fresh pending tail, drop it, verify silence.
    filter.process(&impulse, &mut out)?;
    filter.reset();
    filter.process(&silence, &mut out)?;
    let reset_max = max_abs(&out);

    let decayed = curve.windows(2).all(|w| w[1].1 <= w[0].1 + 1e-12);

    match format {
        OutputFormat::Text => {
            println!(
                "=== powertail retention (N={}, s={}) ===",
                block_len, decay
            );
            println!("Impulse block: max |out| = {:.4}", impulse_max);
            println!();
            println!("Tail block (memory carried across the boundary):");
            for &(lag, value) in &curve {
                let bar_len = (value / amplitude * 20.0).round() as usize;
                let bar = "#".repeat(bar_len);
                println!("  lag {:>6}: {:.6} |{}", lag, value, bar);
            }
            println!();
            for (i, max) in silent_max.iter().enumerate() {
                let bar_len = (max / amplitude * 20.0).round() as usize;
                let bar = "#".repeat(bar_len);
                println!("  Silent block {}: max = {:.2e} |{}", i + 2, max, bar);
            }
            println!();
            if decayed {
                println!("[SUCCESS] Memory decay confirmed.");
                if let (Some(first), Some(last)) = (curve.first(), curve.last()) {
                    println!(
                        "Signal decayed from {:.4} to {:.4} across the tail block.",
                        first.1, last.1
                    );
                }
            } else {
                println!("[WARNING] Tail did not decay monotonically.");
            }
            if reset_max < 1e-9 {
                println!("[SUCCESS] Reset verified (output is ~zero).");
            } else {
                println!("[FAILURE] Reset failed (max = {:.2e}).", reset_max);
            }
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "block_len": block_len,
                "decay": decay,
                "amplitude": amplitude,
                "impulse_block_max": impulse_max,
                "tail_curve": curve
                    .iter()
                    .map(|&(lag, value)| serde_json::json!({"lag": lag, "value": value}))
                    .collect::<Vec<_>>(),
                "silent_block_max": silent_max,
                "monotone_decay": decayed,
                "reset_max": reset_max,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv => {
            println!("lag,value");
            for &(lag, value) in &curve {
                println!("{},{}", lag, value);
            }
        }
    }

    Ok(())
}

fn run_filter(
    input: &Path,
    output: &Path,
    config_path: Option<PathBuf>,
    block_len: Option<usize>,
    decay: Option<f64>,
    format: OutputFormat,
) -> Result<()> {
    let mut cfg = match config_path {
        Some(ref path) => config::load_config(path)?,
        None => config::FilterConfig::default(),
    };
    if let Some(n) = block_len {
        cfg.block_len = n;
    }
    if let Some(s) = decay {
        cfg.decay = s;
    }

    tracing::info!(
        "Filtering {:?}: block_len={}, decay={}",
        input,
        cfg.block_len,
        cfg.decay
    );

    let samples = read_samples(input)?;
    anyhow::ensure!(!samples.is_empty(), "No samples found in {:?}", input);

    let mut filter = StreamConvolver::new(cfg.block_len, cfg.decay)?;
    let mut filtered = Vec::with_capacity(samples.len());
    let mut block = vec![0.0; cfg.block_len];
    let mut out = vec![0.0; cfg.block_len];

    // The last partial block is zero-padded; output past the end of the
    // input (including the final tail) is dropped.
    for chunk in samples.chunks(cfg.block_len) {
        block[..chunk.len()].copy_from_slice(chunk);
        block[chunk.len()..].fill(0.0);
        filter.process(&block, &mut out)?;
        filtered.extend_from_slice(&out[..chunk.len()]);
    }

    let blocks = samples.len().div_ceil(cfg.block_len);

    // Write as CSV
    let mut writer = std::fs::File::create(output)
        .with_context(|| format!("Failed to create output file: {:?}", output))?;
    use std::io::Write;
    writeln!(writer, "sample,value")?;
    for (i, &v) in filtered.iter().enumerate() {
        writeln!(writer, "{},{}", i, v)?;
    }

    match format {
        OutputFormat::Text => {
            println!("Filtered {} samples in {} blocks.", samples.len(), blocks);
            println!("Block length:   {}", cfg.block_len);
            println!("Decay exponent: {}", cfg.decay);
            println!("Written to:     {:?}", output);
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "samples": samples.len(),
                "blocks": blocks,
                "block_len": cfg.block_len,
                "decay": cfg.decay,
                "output": output.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv => {
            println!("samples,blocks,block_len,decay");
            println!("{},{},{},{}", samples.len(), blocks, cfg.block_len, cfg.decay);
        }
    }

    Ok(())
}

fn run_response(block_len: usize, decay: f64, points: usize, format: OutputFormat) -> Result<()> {
    anyhow::ensure!(points >= 2, "points must be at least 2");

    tracing::info!(
        "Magnitude response: block_len={}, decay={}, points={}",
        block_len,
        decay,
        points
    );

    let taps = power_law_taps(block_len, decay);
    let fft_len = (2 * (points - 1)).max(block_len);
    let mags = kernel::magnitude_response(&taps, fft_len)?;

    // Downsample the bins to exactly `points` rows from DC to Nyquist.
    let bins = mags.len();
    let rows: Vec<(f64, f64, f64)> = (0..points)
        .map(|i| {
            let idx = i * (bins - 1) / (points - 1);
            let freq = idx as f64 / (bins - 1) as f64 * 0.5;
            let mag = mags[idx];
            let db = 20.0 * mag.max(1e-12).log10();
            (freq, mag, db)
        })
        .collect();

    match format {
        OutputFormat::Text => {
            println!(
                "Magnitude response: block_len={}, decay={}",
                block_len, decay
            );
            println!("{:>10}  {:>12}  {:>10}", "freq", "magnitude", "dB");
            for (freq, mag, db) in &rows {
                println!("{:>10.4}  {:>12.6}  {:>10.2}", freq, mag, db);
            }
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "block_len": block_len,
                "decay": decay,
                "response": rows
                    .iter()
                    .map(|(freq, mag, db)| {
                        serde_json::json!({"freq": freq, "magnitude": mag, "db": db})
                    })
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv => {
            println!("freq,magnitude,db");
            for (freq, mag, db) in &rows {
                println!("{},{},{}", freq, mag, db);
            }
        }
    }

    Ok(())
}

fn run_tune(
    half_life: f64,
    target: f64,
    output: Option<PathBuf>,
    block_len: usize,
    format: OutputFormat,
) -> Result<()> {
    anyhow::ensure!(half_life > 0.0, "half-life must be positive");
    anyhow::ensure!(
        target > 0.0 && target < 1.0,
        "target must be in (0, 1), got {}",
        target
    );

    // Solve (1 + t)^(-s) = target at t = half_life in closed form.
    let s = -target.ln() / (1.0 + half_life).ln();
    let check = (1.0 + half_life).powf(-s);

    tracing::info!("Solved decay exponent: {}", s);

    match format {
        OutputFormat::Text => {
            println!("--- powertail tuning ---");
            println!("Objective: kernel weight {} at lag {}", target, half_life);
            println!("Decay exponent (s): {:.4}", s);
            println!("Check: (1 + {})^(-{:.4}) = {:.6}", half_life, s, check);
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "half_life": half_life,
                "target": target,
                "decay": s,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv => {
            println!("half_life,target,decay");
            println!("{},{},{}", half_life, target, s);
        }
    }

    if let Some(path) = output {
        let cfg = config::FilterConfig {
            block_len,
            decay: s,
        };
        config::save_config(&cfg, &path)?;
        println!("Configuration written to {:?}", path);
    }

    Ok(())
}

/// Read samples from a CSV or plain-text file.
fn read_samples(path: &Path) -> Result<Vec<f64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {:?}", path))?;
    parse_samples(&content)
}

/// Parse one sample per line; in comma-separated rows, the last field is
/// the sample. A non-numeric first line is treated as a header.
fn parse_samples(content: &str) -> Result<Vec<f64>> {
    let mut samples = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let field = line.rsplit(',').next().unwrap_or(line).trim();
        match field.parse::<f64>() {
            Ok(v) => samples.push(v),
            Err(_) if lineno == 0 => continue,
            Err(e) => {
                anyhow::bail!("Line {}: failed to parse {:?}: {}", lineno + 1, field, e);
            }
        }
    }
    Ok(samples)
}

/// Log2-spaced sample indices: 0, 1, 2, 4, ... plus the final index.
fn log_checkpoints(len: usize) -> Vec<usize> {
    let mut points = vec![0];
    let mut step = 1;
    while step < len {
        points.push(step);
        step *= 2;
    }
    if len > 1 && points.last() != Some(&(len - 1)) {
        points.push(len - 1);
    }
    points
}

fn max_abs(xs: &[f64]) -> f64 {
    xs.iter().fold(0.0, |m, &x| m.max(x.abs()))
}
