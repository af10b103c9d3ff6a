//! stripdb CLI
//!
//! Command-line interface for archive operations:
//! - Build or refresh the catalog of a data directory
//! - List the indexed files
//! - Dump tags as TSV, CSV or JSON
//! - Export the samples of a channel as CSV

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stripdb::storage::{datetime_from_mjd, CompressionType, RecordingWriter};
use stripdb::{
    generate_default_config, parse_mjd, Archive, Catalog, Channel, Config, DataType, Detector,
    HkGroup, LoggingConfig, Mjd, TagRecord, TimeRange, TimeSeries,
};

#[derive(Parser)]
#[command(name = "stripdb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Catalog and query archives of instrument recording files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: search the usual locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update the catalog of a data directory
    Build {
        /// Data directory
        path: PathBuf,
        /// Name of the catalog database
        #[arg(long)]
        database_name: Option<String>,
        /// Delete the catalog and index every file again
        #[arg(long)]
        start_from_scratch: bool,
    },

    /// List the indexed files in time order
    Files {
        /// Data directory
        path: PathBuf,
    },

    /// Dump the tags within a time range, or a single tag
    #[command(group(ArgGroup::new("selection").required(true).args(["start", "tag_id"])))]
    Tags {
        /// Data directory
        path: PathBuf,
        /// Start of the range (MJD or date)
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// End of the range (MJD or date)
        #[arg(long, requires = "start")]
        end: Option<String>,
        /// Identifier of the tag
        #[arg(long, conflicts_with_all = ["start", "end"])]
        tag_id: Option<i64>,
        #[arg(short, long, value_enum, default_value_t = TagFormat::Tsv)]
        format: TagFormat,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the samples of a channel as CSV
    #[command(group(ArgGroup::new("channel").required(true).args(["science", "hk"])))]
    Load {
        /// Data directory
        path: PathBuf,
        /// Start of the range (MJD or date)
        #[arg(long)]
        start: String,
        /// End of the range (MJD or date)
        #[arg(long)]
        end: String,
        /// Scientific channel as POLARIMETER/TYPE/DETECTOR, e.g. R0/DEM/Q1
        #[arg(long)]
        science: Option<String>,
        /// Housekeeping channel as GROUP/SUBGROUP/PARAMETER, e.g. BIAS/POL_R0/VD1_HK
        #[arg(long)]
        hk: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a few synthetic recording files
    Demo {
        /// Directory to create the files in
        path: PathBuf,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TagFormat {
    Tsv,
    Csv,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Build {
            path,
            database_name,
            start_from_scratch,
        } => {
            let mut archive_config = config.archive.clone();
            archive_config.data_dir = path.to_string_lossy().to_string();
            if let Some(name) = database_name {
                archive_config.database_name = name;
            }
            archive_config.update_database = true;

            if start_from_scratch
                && Catalog::remove(&archive_config.data_path(), &archive_config.database_name)?
            {
                tracing::info!("Removed the old catalog");
            }

            let archive = Archive::open(&archive_config)
                .with_context(|| format!("Cannot open archive {:?}", path))?;
            let report = archive.report();

            println!("Catalog: {:?}", archive.catalog().path().unwrap_or(path.as_path()));
            println!("  Files scanned: {}", report.scanned);
            println!("  Already indexed: {}", report.reused);
            println!("  Newly indexed: {}", report.indexed);
            if report.skipped > 0 {
                println!("  Unreadable: {}", report.skipped);
            }
            if report.stale > 0 {
                println!("  Missing from disk: {}", report.stale);
            }
            println!("  Tags: {}", archive.catalog().tag_count()?);
            archive.close()?;
        }

        Commands::Files { path } => {
            let archive = open_archive(&config, &path)?;

            if archive.files().is_empty() {
                println!("No recording files in {:?}", path);
            } else {
                println!(
                    "{:<5} {:<24} {:<24} {:>12} {}",
                    "#", "First sample", "Last sample", "Size", "Path"
                );
                println!("{}", "-".repeat(100));

                for (i, file) in archive.files().iter().enumerate() {
                    println!(
                        "{:<5} {:<24} {:<24} {:>12} {}",
                        i,
                        format_mjd(file.start()),
                        format_mjd(file.end()),
                        format_size(file.size_bytes),
                        file.path.display()
                    );
                }
            }
        }

        Commands::Tags {
            path,
            start,
            end,
            tag_id,
            format,
            output,
        } => {
            let archive = open_archive(&config, &path)?;

            let tags = match (tag_id, start, end) {
                (Some(id), _, _) => match archive.tag(id)? {
                    Some(tag) => vec![tag],
                    None => bail!("No tag with id {}", id),
                },
                (None, Some(start), Some(end)) => archive.tags(parse_range(&start, &end)?)?,
                _ => bail!("Either --tag-id or both --start and --end are required"),
            };

            let mut out = open_output(output.as_deref())?;
            write_tags(&tags, format, &mut out)?;
            out.flush()?;
            tracing::info!("{} tags written", tags.len());
        }

        Commands::Load {
            path,
            start,
            end,
            science,
            hk,
            output,
        } => {
            let channel = match (science, hk) {
                (Some(spec), _) => parse_science(&spec)?,
                (None, Some(spec)) => parse_housekeeping(&spec)?,
                (None, None) => bail!("Either --science or --hk is required"),
            };
            let range = parse_range(&start, &end)?;

            let mut archive = open_archive(&config, &path)?;
            let series = archive.load(range, &channel)?.unwrap_or_default();

            let mut out = open_output(output.as_deref())?;
            write_series(&series, &mut out)?;
            out.flush()?;
            tracing::info!("{} samples of {} written", series.len(), channel);
        }

        Commands::Demo { path } => {
            let written = write_demo_files(&path)?;
            for file in &written {
                println!("Wrote {:?}", file);
            }
            println!();
            println!("Index them with:");
            println!("  stripdb build {}", path.display());
        }

        Commands::Config { output } => {
            let content = generate_default_config();

            if let Some(path) = output {
                std::fs::write(&path, &content)?;
                println!("Config written to {:?}", path);
            } else {
                print!("{}", content);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stripdb={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Open an existing archive as configured, for reading
fn open_archive(config: &Config, path: &Path) -> anyhow::Result<Archive> {
    let mut archive_config = config.archive.clone();
    archive_config.data_dir = path.to_string_lossy().to_string();
    Archive::open(&archive_config).with_context(|| format!("Cannot open archive {:?}", path))
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("Cannot create {:?}", path))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    })
}

fn parse_range(start: &str, end: &str) -> anyhow::Result<TimeRange> {
    Ok(TimeRange::new(parse_mjd(start)?, parse_mjd(end)?)?)
}

/// `POLARIMETER/TYPE/DETECTOR`
fn parse_science(spec: &str) -> anyhow::Result<Channel> {
    let parts: Vec<&str> = spec.split('/').collect();
    let [polarimeter, data_type, detector] = parts.as_slice() else {
        bail!("Invalid scientific channel {:?}, expected e.g. R0/DEM/Q1", spec);
    };
    Ok(Channel::science(
        polarimeter,
        data_type.parse()?,
        detector.parse()?,
    ))
}

/// `GROUP/SUBGROUP/PARAMETER`
fn parse_housekeeping(spec: &str) -> anyhow::Result<Channel> {
    let parts: Vec<&str> = spec.split('/').collect();
    let [group, subgroup, parameter] = parts.as_slice() else {
        bail!(
            "Invalid housekeeping channel {:?}, expected e.g. BIAS/POL_R0/VD1_HK",
            spec
        );
    };
    Ok(Channel::housekeeping(group.parse()?, subgroup, parameter))
}

#[derive(Serialize)]
struct TagDump<'a> {
    tags: &'a [TagRecord],
}

fn write_tags(tags: &[TagRecord], format: TagFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    match format {
        TagFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &TagDump { tags })?;
            writeln!(out)?;
        }
        TagFormat::Csv | TagFormat::Tsv => {
            let delimiter = if format == TagFormat::Tsv { b'\t' } else { b',' };
            let mut writer = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .from_writer(out);
            for tag in tags {
                writer.serialize(tag)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn write_series(series: &TimeSeries, out: &mut dyn Write) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["mjd", "time", "value"])?;
    for (t, v) in series.iter() {
        writer.write_record([format!("{:.9}", t), format_mjd(t), v.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn format_mjd(mjd: Mjd) -> String {
    datetime_from_mjd(mjd)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| format!("{:.6}", mjd))
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Three one-hour files starting on 2021-12-10, with a gap before the last
/// one and a tag left open across the first two
fn write_demo_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    const HOUR: f64 = 1.0 / 24.0;
    const SAMPLES: usize = 360;
    let day = parse_mjd("2021-12-10")?;

    let hours = [10u32, 11, 13];
    let starts = hours.map(|h| day + f64::from(h) * HOUR);
    let vd1 = Channel::housekeeping(HkGroup::Bias, "POL_R0", "VD1_HK");

    let mut written = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        // Samples never reach the start of the next hour
        let times: Vec<Mjd> = (0..SAMPLES)
            .map(|k| start + k as f64 * HOUR / SAMPLES as f64)
            .collect();

        let mut writer = RecordingWriter::new(CompressionType::Lz4);
        for detector in Detector::all() {
            let values = times
                .iter()
                .map(|t| ((t - day) * 1440.0).sin() + i as f64)
                .collect();
            writer = writer.channel(
                &Channel::science("R0", DataType::Dem, *detector),
                TimeSeries::new(times.clone(), values)?,
            );
        }
        let bias = times.iter().map(|_| 1200.0 + 100.0 * i as f64).collect();
        writer = writer.channel(&vd1, TimeSeries::new(times.clone(), bias)?);

        writer = match i {
            0 => writer
                .tag(TagRecord::new(1, "TURNON", start + 0.1 * HOUR, start + 0.2 * HOUR))
                .tag(
                    TagRecord::new(2, "BIAS_SWEEP", start + 0.5 * HOUR, -1.0)
                        .comments("Sweep VD1", ""),
                ),
            1 => writer.tag(
                TagRecord::new(2, "BIAS_SWEEP", starts[0] + 0.5 * HOUR, start + 0.3 * HOUR)
                    .comments("Sweep VD1", "Done"),
            ),
            _ => writer.tag(TagRecord::new(3, "STABILITY", start, start + 0.9 * HOUR)),
        };

        let path = dir.join(format!("2021_12_10_{:02}-00-00.rec.lz4", hours[i]));
        writer
            .write(&path)
            .with_context(|| format!("Cannot write {:?}", path))?;
        written.push(path);
    }

    Ok(written)
}
