use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use easyarg_rs::tools::{run_annotation_tools, Databases};
use easyarg_rs::{
    run_merge, AlignmentInput, AnnotationCategory, ClassifierFormat, Delimiter, MergeConfig,
    MergeInputs, MergeResults, SourceFormat, TaxonomyInput,
};

#[derive(Parser)]
#[command(name = "easyarg-rs", version)]
#[command(about = "Merge ARG, plasmid, MGE and host taxonomy annotations of long metagenomic reads")]
struct Cli {
    /// Suppress spinners and set logging level to WARN
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge existing aligner and classifier outputs
    Merge(MergeArgs),
    /// Run minimap2, LAST and centrifuge on a read file, then merge
    Run(RunArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// JSON settings file (thresholds, malformed-line budget, delimiter)
    #[arg(short = 'c', long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Number of threads
    #[arg(short = 't', long, default_value_t = 4)]
    threads: usize,

    /// Write the merged table comma-separated instead of tab-separated
    #[arg(long)]
    csv: bool,

    /// Largest share of malformed lines tolerated per input file
    #[arg(long, value_name = "FRACTION")]
    max_malformed_fraction: Option<f64>,
}

#[derive(Args)]
struct MergeArgs {
    /// Sample name used for output file names
    #[arg(short = 's', long)]
    sample: String,

    #[arg(long = "arg", value_name = "FILE", help_heading = "Input")]
    arg_file: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", default_value = "paf", help_heading = "Input")]
    arg_format: SourceFormat,

    #[arg(long = "plasmid", value_name = "FILE", help_heading = "Input")]
    plasmid_file: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", default_value = "paf", help_heading = "Input")]
    plasmid_format: SourceFormat,

    #[arg(long = "mge", value_name = "FILE", help_heading = "Input")]
    mge_file: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", default_value = "psl", help_heading = "Input")]
    mge_format: SourceFormat,

    /// Classifier output
    #[arg(long = "taxonomy", value_name = "FILE", help_heading = "Input")]
    taxonomy_file: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", default_value = "centrifuge", help_heading = "Input")]
    taxonomy_format: ClassifierFormat,

    /// taxDB (`taxid<TAB>parent<TAB>name<TAB>rank`) for taxid-based classifiers
    #[arg(long, value_name = "FILE", help_heading = "Input")]
    taxdb: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct RunArgs {
    /// Input reads (FASTA, or FASTQ which is converted with seqtk)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Sample name (default: input file name without extensions)
    #[arg(short = 's', long)]
    sample: Option<String>,

    #[arg(long, value_name = "FASTA", help_heading = "Database")]
    card: PathBuf,

    #[arg(long, value_name = "FASTA", help_heading = "Database")]
    plsdb: PathBuf,

    #[arg(long = "mge-db", value_name = "FASTA", help_heading = "Database")]
    mge_db: PathBuf,

    #[arg(long = "centrifuge-index", value_name = "PREFIX", help_heading = "Database")]
    centrifuge_index: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help_heading = "Database")]
    taxdb: Option<PathBuf>,

    /// Skip taxonomic classification
    #[arg(long)]
    skip_centrifuge: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn spinner(quiet: bool, color: &str, msg: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(msg.to_string());
    spinner
}

fn load_config(common: &CommonArgs) -> Result<MergeConfig, Box<dyn Error>> {
    let mut config = match &common.config {
        Some(path) => MergeConfig::load(path)?,
        None => MergeConfig::default(),
    };
    if common.csv {
        config.delimiter = Delimiter::Comma;
    }
    if let Some(fraction) = common.max_malformed_fraction {
        config.max_malformed_fraction = fraction;
    }
    config.validate()?;
    Ok(config)
}

fn sample_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string());
    let mut stem = name.as_str();
    for ext in [".gz", ".fastq", ".fq", ".fasta", ".fa", ".fna"] {
        stem = stem.strip_suffix(ext).unwrap_or(stem);
    }
    stem.to_string()
}

fn merge_and_write(
    inputs: &MergeInputs,
    config: &MergeConfig,
    output: &Path,
    quiet: bool,
) -> Result<MergeResults, Box<dyn Error>> {
    let sp = spinner(quiet, "green", "Merging annotations...");
    let results = run_merge(inputs, config)?;
    sp.finish_with_message(format!("Merged {} queries.", results.merged.len()));

    let sp = spinner(quiet, "yellow", "Writing output files...");
    let written = results.write_outputs(output)?;
    sp.finish_with_message(format!("Wrote {} files to {}.", written.len(), output.display()));
    Ok(results)
}

fn merge_command(args: MergeArgs, quiet: bool) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.common)?;
    let alignment = |path: Option<PathBuf>, format| path.map(|path| AlignmentInput { path, format });

    let inputs = MergeInputs {
        sample: args.sample,
        arg: alignment(args.arg_file, args.arg_format),
        plasmid: alignment(args.plasmid_file, args.plasmid_format),
        mge: alignment(args.mge_file, args.mge_format),
        taxonomy: args.taxonomy_file.map(|path| TaxonomyInput {
            path,
            format: args.taxonomy_format,
            taxdb: args.taxdb,
        }),
    };
    let results = merge_and_write(&inputs, &config, &args.common.output, quiet)?;
    report(&results);
    Ok(())
}

fn run_command(args: RunArgs, quiet: bool) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.common)?;
    let sample = args
        .sample
        .clone()
        .unwrap_or_else(|| sample_from_path(&args.input));
    let dbs = Databases {
        card: args.card,
        plsdb: args.plsdb,
        mge: args.mge_db,
        centrifuge: if args.skip_centrifuge {
            None
        } else {
            args.centrifuge_index
        },
    };

    let workdir = args.common.output.join("work");
    let sp = spinner(quiet, "blue", "Running aligners and classifier...");
    let outputs = run_annotation_tools(&args.input, &sample, &dbs, &workdir, args.common.threads)?;
    sp.finish_with_message("External tools finished.");

    let inputs = MergeInputs::from_tool_outputs(&sample, &outputs, args.taxdb);
    let results = merge_and_write(&inputs, &config, &args.common.output, quiet)?;
    report(&results);
    Ok(())
}

fn report(results: &MergeResults) {
    let s = &results.summary.sample;
    log::info!(
        "{}: {} queries ({} classified), hits ARG={} Plasmid={} MGE={}, {} warnings",
        s.sample,
        s.total_queries,
        s.classified,
        s.hits(AnnotationCategory::Arg),
        s.hits(AnnotationCategory::Plasmid),
        s.hits(AnnotationCategory::Mge),
        results.warnings.len()
    );
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let threads = match &cli.command {
        Commands::Merge(args) => args.common.threads,
        Commands::Run(args) => args.common.threads,
    };
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        log::warn!("Could not size the thread pool: {e}");
    }

    match cli.command {
        Commands::Merge(args) => merge_command(args, cli.quiet),
        Commands::Run(args) => run_command(args, cli.quiet),
    }
}
