use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use scanstruct::export::ExportFormat;
use scanstruct::{init_tracing, PipelineError};
use scanstruct::pipeline::{
    batch_output_dirs, export_document, inspect_tables, process_batch, process_image, PipelineConfig,
};

#[derive(Parser, Debug)]
#[command(name = "scanstruct")]
#[command(version, about = "Document structure recovery from scanned page images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a page image to structured formats
    Convert {
        /// Input image path (PNG or JPEG)
        input: PathBuf,

        /// Output directory (default: ./<input_name>_output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: ConvertOptions,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Convert multiple page images
    Batch {
        /// Input image files
        inputs: Vec<PathBuf>,

        /// Output directory for all results
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: ConvertOptions,

        /// Documents processed concurrently
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show detected table regions and grids without running OCR
    Tables {
        /// Input image path
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct ConvertOptions {
    /// Output format(s): markdown, json, text, latex
    #[arg(short, long, value_delimiter = ',', default_values_t = vec![ExportFormat::Markdown, ExportFormat::Json])]
    format: Vec<ExportFormat>,

    /// Tesseract language(s), e.g. "eng" or "tur+eng"
    #[arg(long)]
    lang: Option<String>,

    /// Disable table detection
    #[arg(long)]
    no_tables: bool,

    /// Disable code block detection
    #[arg(long)]
    no_code: bool,

    /// Enable math formula recognition
    #[arg(long)]
    math: bool,

    /// Path to the tesseract executable
    #[arg(long, env = "TESSERACT_CMD")]
    tesseract: Option<PathBuf>,

    /// OCR timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ConvertOptions {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(lang) = &self.lang {
            config.ocr.language = lang.clone();
        }
        if let Some(binary) = &self.tesseract {
            config.ocr.binary = binary.clone();
        }
        if let Some(timeout) = self.timeout {
            config.ocr.timeout_secs = timeout;
        }
        if self.no_tables {
            config.detection.detect_tables = false;
        }
        if self.no_code {
            config.detection.detect_code = false;
        }
        if self.math {
            config.detection.detect_math = true;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            options,
            quiet,
        } => convert_single(&input, output, &options, quiet),
        Commands::Batch {
            inputs,
            output,
            options,
            workers,
        } => convert_batch(&inputs, output, &options, workers),
        Commands::Tables { input, json } => show_tables(&input, json),
    }
}

fn check_input(input: &Path) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    if !input.is_file() {
        anyhow::bail!("Input is not a file: {}", input.display());
    }
    Ok(())
}

fn stem_of(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn convert_single(input: &Path, output: Option<PathBuf>, options: &ConvertOptions, quiet: bool) -> Result<()> {
    check_input(input)?;
    let output_dir = output.unwrap_or_else(|| PathBuf::from(format!("{}_output", stem_of(input))));
    let config = options.pipeline_config()?;
    let engine = config.tesseract();

    if !quiet {
        println!("[*] Processing: {}", input.display());
        println!("[*] Output: {}", output_dir.display());
        println!("[*] Language: {}", config.ocr.language);
        println!("[*] OCR engine: {}", engine.binary().display());
        println!("\n[+] Recognizing document...");
    }

    let document = process_image(input, &config, &engine)
        .with_context(|| format!("Failed to process image: {}", input.display()))?;

    if !quiet {
        for warning in &document.warnings {
            eprintln!("  [!] {}", warning);
        }
        println!("[+] Exporting results...");
    }

    let written = export_document(&document, &options.format, &output_dir)
        .with_context(|| format!("Failed to export to: {}", output_dir.display()))?;

    if !quiet {
        for path in &written {
            println!("  - {}", path.display());
        }
        println!("\n[✓] Done! Results saved to: {}", output_dir.display());
    }

    Ok(())
}

fn convert_batch(
    inputs: &[PathBuf],
    output: Option<PathBuf>,
    options: &ConvertOptions,
    workers: Option<usize>,
) -> Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("No input files specified");
    }

    let base_output = output.unwrap_or_else(|| PathBuf::from("batch_output"));
    let mut config = options.pipeline_config()?;
    if let Some(workers) = workers {
        config.workers = workers.max(1);
    }
    let engine = config.tesseract();

    println!("[*] Batch processing {} file(s) with {} worker(s)", inputs.len(), config.workers);
    println!("[*] Base output: {}\n", base_output.display());

    let results = process_batch(inputs, &config, &engine)?;
    let output_dirs = batch_output_dirs(&base_output, inputs);

    let mut success = 0;
    let mut failed = 0;
    for (i, ((input, result), output_dir)) in results.into_iter().zip(&output_dirs).enumerate() {
        println!("[{}/{}] {} -> {}", i + 1, inputs.len(), input.display(), output_dir.display());
        let exported = result.and_then(|document| export_document(&document, &options.format, output_dir));
        match exported {
            Ok(_) => {
                println!("  [✓] Success");
                success += 1;
            }
            Err(e) => {
                eprintln!("  [✗] Failed: {:#}", e);
                failed += 1;
            }
        }
    }

    println!("\n[*] Summary: {} succeeded, {} failed", success, failed);

    if failed > 0 {
        anyhow::bail!("{} file(s) failed to process", failed);
    }

    Ok(())
}

fn show_tables(input: &Path, json: bool) -> Result<()> {
    check_input(input)?;
    let reports = match inspect_tables(input) {
        Ok(reports) => reports,
        Err(PipelineError::NoRegionFound) => {
            println!("[!] No table regions found in {}", input.display());
            return Ok(());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to inspect image: {}", input.display()));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("Table Regions");
    println!("=============");
    println!("File: {}", input.display());
    for (i, report) in reports.iter().enumerate() {
        let region = &report.region;
        println!(
            "[{}] x={} y={} {}x{} aspect={:.2}",
            i + 1,
            region.x,
            region.y,
            region.width,
            region.height,
            region.aspect_ratio
        );
        match &report.grid {
            Some(grid) => println!("    grid: {} rows x {} columns", grid.rows(), grid.columns()),
            None => println!("    grid: not enough ruling lines"),
        }
    }

    Ok(())
}
