//! annojoin: annotate a sorted VCF with values from sorted annotation files.
//!
//! Usage: annojoin [OPTIONS] <CONFIG> <INPUT>

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use annojoin::annotate::{Annotator, EndpointMode, PostRule};
use annojoin::config::{Config, JoinConfig};
use annojoin::error::{AnnoError, Result};
use annojoin::genome::{ChromOrder, Genome};
use annojoin::io::{open_input, open_output};
use annojoin::join::JoinEngine;
use annojoin::source::AnnotationSource;
use annojoin::vcf::{VcfReader, VcfWriter};

#[derive(Parser)]
#[command(name = "annojoin")]
#[command(version)]
#[command(about = "Annotate a sorted VCF with values from sorted VCF and BED files", long_about = None)]
struct Cli {
    /// TOML file describing the annotation sources
    config: PathBuf,

    /// Query VCF, plain or gzipped (use - for stdin)
    input: PathBuf,

    /// Also annotate the start and end of each variant, writing
    /// <name>_left and <name>_right
    #[arg(long)]
    ends: bool,

    /// Match VCF sources by overlap only, ignoring REF and ALT
    #[arg(long)]
    permissive_overlap: bool,

    /// Script file providing functions for lua: ops
    #[arg(long)]
    lua: Option<PathBuf>,

    /// Prefix for relative annotation paths in the config
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Number of annotation worker threads
    #[arg(short = 'p', long, default_value_t = annojoin::config::DEFAULT_THREADS)]
    procs: usize,

    /// Largest gap between consecutive variant starts within one chunk
    /// (default: $ANNOJOIN_MAX_GAP or 20000)
    #[arg(long)]
    max_gap: Option<u64>,

    /// Largest number of variants per chunk
    /// (default: $ANNOJOIN_MAX_CHUNK or 8000)
    #[arg(long)]
    max_chunk: Option<usize>,

    /// Genome file giving the chromosome order of all inputs
    /// (default: the query's ##contig lines, then the query's own order)
    #[arg(short = 'g', long)]
    genome: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_path(&cli.config)?;
    config.base = cli.base_path.clone();

    if let Some(lua) = &cli.lua {
        if !lua.is_file() {
            return Err(AnnoError::Configuration(format!(
                "script file {} not found",
                lua.display()
            )));
        }
    }
    config.check(cli.lua.is_some())?;

    let strict = !cli.permissive_overlap;
    let mut sources = Vec::with_capacity(config.annotation.len());
    for annotation in &config.annotation {
        let path = config.resolve(annotation);
        sources.push(AnnotationSource::from_config(
            annotation,
            &path,
            strict,
            cli.lua.is_some(),
        )?);
    }
    let rules: usize = config.annotation.iter().map(|a| a.rule_count()).sum();
    log::info!(
        "found {} sources from {} files",
        rules,
        config.annotation.len()
    );

    let post = config
        .post_annotation
        .iter()
        .map(PostRule::from_config)
        .collect::<Result<Vec<_>>>()?;

    let reader = VcfReader::new(open_input(&cli.input)?)?;
    let mut header = reader.header().clone();

    let order = match &cli.genome {
        Some(path) => ChromOrder::from_genome(Genome::from_file(path)?),
        None => ChromOrder::from_names(header.contigs()),
    };
    if order.is_empty() {
        log::debug!("no genome file or ##contig lines; using the query's chromosome order");
    }

    // No script backend ships with the binary; setup rejects lua: ops.
    let mut annotator = Annotator::new(post).with_chrom_order(order);
    let cursors = annotator.setup(&header.schema(), sources)?;

    let mut join = JoinConfig::from_env();
    join.threads = cli.procs;
    if let Some(gap) = cli.max_gap {
        join.max_gap = gap;
    }
    if let Some(chunk) = cli.max_chunk {
        join.max_chunk = chunk;
    }
    if cli.ends {
        join.ends = EndpointMode::Both;
    }

    for field in annotator.output_fields(join.ends) {
        header.add_info(&field.name, &field.meta);
    }
    header.add_meta(format!("##annojoin={}", annojoin::VERSION));

    let mut writer = VcfWriter::new(open_output(cli.output.as_ref())?);
    writer.write_header(&header)?;

    let engine = JoinEngine::new(join);
    let start = Instant::now();
    let mut stream = engine.run(reader.records(), cursors, Arc::new(annotator))?;

    let mut outcome = Ok(());
    for annotated in stream.by_ref() {
        match annotated {
            Ok(a) => {
                if let Err(e) = writer.write_record(&a.record) {
                    outcome = Err(e);
                    break;
                }
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    let written = stream.emitted();
    drop(stream);
    let flushed = writer.flush();

    let secs = start.elapsed().as_secs_f64();
    log::info!(
        "annotated {} variants in {:.2} seconds ({:.0} / second)",
        written,
        secs,
        written as f64 / secs.max(f64::EPSILON)
    );
    let suppressed = engine.reporter().suppressed();
    if suppressed > 0 {
        log::info!(
            "{} repeated warnings were suppressed ({} distinct logged)",
            suppressed,
            engine.reporter().logged()
        );
    }
    outcome?;
    flushed?;
    Ok(())
}
