use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mathfinder::core::model::{MathExpressionFinderResults, RunMode};
use mathfinder::features::ExtractorRegistry;
use mathfinder::finder::{FinderInfo, MathExpressionFinder, TrainingPaths};
use mathfinder::ocr::{CommandPageSource, JsonPageSource, PageSource};
use mathfinder::pipeline::export_results;
use mathfinder::samples::write_samples;

#[derive(Parser, Debug)]
#[command(name = "mathfinder")]
#[command(version, about = "Math expression detection and segmentation over OCR blob grids", long_about = None)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct BatchArgs {
    /// Page inputs (JSON, or images with --ocr-command)
    pages: Vec<PathBuf>,

    /// Finder info file
    #[arg(short, long)]
    info: PathBuf,

    /// Output directory (default: ./mathfinder_output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// External OCR program that prints page JSON for an image
    #[arg(long)]
    ocr_command: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Label math blobs without grouping them
    Detect(BatchArgs),

    /// Detect math blobs and merge them into expressions
    Find(BatchArgs),

    /// Dump per-blob feature vectors of a page as sample lines
    Features {
        /// Page input
        page: PathBuf,

        /// Finder info file
        #[arg(short, long)]
        info: PathBuf,

        /// Sample file to write (default: stdout)
        #[arg(short, long)]
        samples: Option<PathBuf>,
    },

    /// Train the configured detector on groundtruth-labelled pages
    Train {
        /// Labelled page inputs
        pages: Vec<PathBuf>,

        /// Finder info file
        #[arg(short, long)]
        info: PathBuf,

        /// Also write the gathered samples here
        #[arg(short, long)]
        samples: Option<PathBuf>,
    },

    /// List registered feature extractors and their flags
    List {
        /// Resource directory
        #[arg(long, default_value = "training")]
        resources: PathBuf,
    },

    /// Show a finder info file
    Info {
        /// Finder info file
        input: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Detect(args) => run_batch(args, RunMode::Detect),
        Commands::Find(args) => run_batch(args, RunMode::Find),
        Commands::Features {
            page,
            info,
            samples,
        } => dump_features(page, info, samples),
        Commands::Train {
            pages,
            info,
            samples,
        } => train(pages, info, samples),
        Commands::List { resources } => list_extractors(resources),
        Commands::Info { input } => show_info(input),
    }
}

fn load_finder(info: &Path) -> Result<MathExpressionFinder> {
    let info = FinderInfo::read(info)?;
    MathExpressionFinder::new(info).context("Invalid finder configuration")
}

fn page_source(ocr_command: Option<PathBuf>) -> Box<dyn PageSource> {
    match ocr_command {
        Some(program) => Box::new(CommandPageSource::new(program)),
        None => Box::new(JsonPageSource::new()),
    }
}

fn run_batch(args: BatchArgs, mode: RunMode) -> Result<()> {
    if args.pages.is_empty() {
        anyhow::bail!("No page inputs specified");
    }

    let output_dir = args
        .output
        .unwrap_or_else(|| PathBuf::from("mathfinder_output"));
    let mut finder = load_finder(&args.info)?;
    finder.initialize()?;
    let source = page_source(args.ocr_command);

    println!("[*] Finder: {}", finder.info().finder_name);
    println!("[*] Processing {} page(s)", args.pages.len());
    println!("[*] Output: {}\n", output_dir.display());

    let mut results: Vec<MathExpressionFinderResults> = Vec::with_capacity(args.pages.len());
    let mut success = 0;
    let mut failed = 0;

    for (i, page) in args.pages.iter().enumerate() {
        println!("[{}/{}] Processing: {}", i + 1, args.pages.len(), page.display());

        match finder.process_page(source.as_ref(), page, mode) {
            Ok(page_results) => {
                println!("  [✓] {} segment(s)", page_results.segments.len());
                results.push(page_results);
                success += 1;
            }
            Err(e) => {
                eprintln!("  [✗] Failed: {:#}", e);
                results.push(finder.empty_results(page, mode));
                failed += 1;
            }
        }
    }

    println!("\n[+] Exporting results...");
    export_results(&results, &output_dir)
        .with_context(|| format!("Failed to export to: {}", output_dir.display()))?;

    println!("\n[*] Summary: {} succeeded, {} failed", success, failed);
    println!("[✓] Done! Results saved to: {}", output_dir.display());

    Ok(())
}

fn dump_features(page: PathBuf, info: PathBuf, samples: Option<PathBuf>) -> Result<()> {
    let mut finder = load_finder(&info)?;
    let mut grid = JsonPageSource::new()
        .load_page(&page)
        .with_context(|| format!("Failed to load page: {}", page.display()))?;
    let page_samples = finder.extract_samples(&mut grid)?;

    match samples {
        Some(path) => {
            write_samples(&path, &page_samples)?;
            println!("[✓] Wrote {} sample(s) to {}", page_samples.len(), path.display());
        }
        None => {
            for s in &page_samples {
                println!("{}", s.to_line());
            }
        }
    }
    Ok(())
}

fn train(pages: Vec<PathBuf>, info: PathBuf, samples: Option<PathBuf>) -> Result<()> {
    if pages.is_empty() {
        anyhow::bail!("No page inputs specified");
    }
    let mut finder = load_finder(&info)?;

    println!("[*] Training {} on {} page(s)", finder.info().detector_name, pages.len());
    let gathered = finder.train(&JsonPageSource::new(), &pages)?;

    if let Some(path) = samples {
        write_samples(&path, &gathered)?;
        println!("[+] Samples: {}", path.display());
    }
    if let Some(model) = finder.detector_path() {
        println!("[+] Model: {}", model.display());
    }
    println!("[✓] Trained on {} sample(s)", gathered.len());
    Ok(())
}

fn list_extractors(resources: PathBuf) -> Result<()> {
    let registry = ExtractorRegistry::new(&TrainingPaths::new(resources));

    println!("Feature Extractors");
    println!("==================");
    for desc in registry.all() {
        println!("{}", desc.determine_unique_name());
        println!("    {}", desc.description);
        for flag in desc.flags {
            println!("    - {}: {}", flag.name, flag.description);
        }
    }
    Ok(())
}

fn show_info(input: PathBuf) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Info file does not exist: {}", input.display());
    }

    let info = FinderInfo::read(&input)
        .with_context(|| format!("Failed to read finder info: {}", input.display()))?;

    println!("Finder Information");
    println!("==================");
    println!("File: {}", input.display());
    println!("Finder: {}", info.finder_name);
    println!("Detector: {}", info.detector_name);
    println!("Segmentor: {}", info.segmentor_name);
    println!("Resources: {}", info.resource_dir.display());
    println!("Extractors:");
    for e in &info.extractors {
        if e.flags.is_empty() {
            println!("  {}", e.unique_name);
        } else {
            println!("  {} [{}]", e.unique_name, e.flags.join(", "));
        }
    }

    Ok(())
}
