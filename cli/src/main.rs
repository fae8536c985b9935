//! anymd CLI - convert documents and images to Markdown

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use anymd::parser::OcrOptions;
use anymd::{
    ConversionReport, ConvertOptions, ConvertResult, Converter, FailureKind, OutputFormat,
    RenderStats, SourceKind,
};

#[derive(Parser)]
#[command(name = "anymd")]
#[command(author = "iyulab")]
#[command(version)]
#[command(
    about = "Convert DOCX, PPTX, PDF and images to Markdown with extracted images",
    long_about = None
)]
struct Cli {
    /// Input files
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Output directory (images go to <DIR>/images)
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    output: PathBuf,

    /// Treat every input as this kind instead of detecting it
    #[arg(long, value_parser = parse_kind)]
    kind: Option<SourceKind>,

    /// Output format
    #[arg(long, value_enum, default_value = "markdown")]
    format: FormatArg,

    /// Print the result instead of writing an output file
    #[arg(long)]
    stdout: bool,

    /// Tesseract executable
    #[arg(long, env = "ANYMD_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// OCR language(s), e.g. "eng" or "eng+deu"
    #[arg(long, default_value = "eng")]
    lang: String,

    /// Seconds allowed for one OCR call
    #[arg(long, value_name = "SECS", default_value = "120")]
    ocr_timeout: u64,

    /// OCR table regions one at a time
    #[arg(long)]
    no_parallel: bool,

    /// Keep slides without a `---` separator after each one
    #[arg(long)]
    no_separators: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Markdown (.md)
    Markdown,
    /// JSON block sequence (.json)
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Markdown => OutputFormat::Markdown,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn parse_kind(value: &str) -> Result<SourceKind, String> {
    value.parse::<SourceKind>().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut options = ConvertOptions::new()
        .with_output_dir(&cli.output)
        .with_format(cli.format.into())
        .with_parallel_ocr(!cli.no_parallel)
        .with_slide_separators(!cli.no_separators)
        .with_write_output(!cli.stdout)
        .with_ocr(
            OcrOptions::new()
                .with_executable(&cli.tesseract)
                .with_language(&cli.lang)
                .with_timeout(Duration::from_secs(cli.ocr_timeout)),
        );
    if let Some(kind) = cli.kind {
        options = options.with_kind(kind);
    }

    log::debug!(
        "Converting {} files into {}",
        cli.files.len(),
        cli.output.display()
    );
    let converter = Converter::new(options);
    let outputs = unique_outputs(
        cli.files
            .iter()
            .map(|file| converter.output_path_for(file))
            .collect(),
    );
    if !cli.stdout {
        for (file, output) in cli.files.iter().zip(&outputs) {
            if *output != converter.output_path_for(file) {
                eprintln!(
                    "{} {} shares an output name; writing {}",
                    "!".yellow(),
                    file.display(),
                    output.display().to_string().yellow()
                );
            }
        }
    }

    let pb = ProgressBar::new(cli.files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut converted: Vec<ConvertResult> = Vec::new();
    let mut failed = 0usize;

    for (file, output) in cli.files.iter().zip(outputs) {
        pb.set_message(file.display().to_string());
        match converter.convert_to(file, output) {
            Ok(result) => {
                if let Some(path) = &result.output_path {
                    pb.println(format!(
                        "{} {} {} {}",
                        "✓".green(),
                        file.display(),
                        "->".dimmed(),
                        path.display()
                    ));
                }
                converted.push(result);
            }
            Err(e) => {
                failed += 1;
                pb.println(format!("{} {}: {}", "✗".red(), file.display(), e.to_string().red()));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if cli.stdout {
        for result in &converted {
            println!("{}", result.content);
        }
    }

    print_summary(&converted, failed);

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Make output paths distinct: a repeated path gets `_2`, `_3`, ... before
/// its extension, in input order.
fn unique_outputs(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut taken: HashSet<PathBuf> = paths.iter().cloned().collect();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    paths
        .into_iter()
        .map(|path| {
            if seen.insert(path.clone()) {
                return path;
            }
            let renamed = (2..)
                .map(|n| numbered(&path, n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| path.clone());
            taken.insert(renamed.clone());
            seen.insert(renamed.clone());
            renamed
        })
        .collect()
}

fn numbered(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    path.with_file_name(name)
}

fn print_summary(results: &[ConvertResult], failed: usize) {
    let mut stats = RenderStats::new();
    let mut report = ConversionReport::new();
    for result in results {
        stats.merge(&result.stats);
        report.merge(result.report.clone());
    }

    eprintln!();
    eprintln!("{}", "Summary".cyan().bold());
    eprintln!("{}", "─".repeat(40).dimmed());
    eprintln!("{}: {}", "Converted".bold(), results.len().to_string().green());
    if failed > 0 {
        eprintln!("{}: {}", "Failed".bold(), failed.to_string().red());
    }
    eprintln!("{}: {}", "Tables".bold(), stats.table_count);
    eprintln!("{}: {}", "Images".bold(), stats.image_count);

    let degraded: Vec<(FailureKind, usize)> = [
        FailureKind::TableExtraction,
        FailureKind::Ocr,
        FailureKind::AssetWrite,
        FailureKind::Timeout,
    ]
    .into_iter()
    .map(|kind| (kind, report.count(kind)))
    .filter(|(_, n)| *n > 0)
    .collect();

    if !degraded.is_empty() {
        eprintln!("{}", "Degraded blocks".yellow().bold());
        for (kind, n) in degraded {
            eprintln!("  {} {}: {}", "├─".dimmed(), kind, n.to_string().yellow());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "anymd",
            "a.docx",
            "b.pdf",
            "-o",
            "out",
            "--kind",
            "slide",
            "--format",
            "json",
            "--no-parallel",
        ])
        .unwrap();
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.output, PathBuf::from("out"));
        assert_eq!(cli.kind, Some(SourceKind::Slide));
        assert!(matches!(cli.format, FormatArg::Json));
        assert!(cli.no_parallel);
        assert!(!cli.stdout);
    }

    #[test]
    fn test_colliding_outputs_renamed() {
        let outputs = unique_outputs(vec![
            PathBuf::from("out/report.md"),
            PathBuf::from("out/slides.md"),
            PathBuf::from("out/report.md"),
            PathBuf::from("out/report_2.md"),
            PathBuf::from("out/report.md"),
        ]);
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("out/report.md"),
                PathBuf::from("out/slides.md"),
                PathBuf::from("out/report_3.md"),
                PathBuf::from("out/report_2.md"),
                PathBuf::from("out/report_4.md"),
            ]
        );
    }

    #[test]
    fn test_same_stem_inputs_get_distinct_files() {
        let converter = Converter::new(ConvertOptions::new().with_output_dir("out")).without_ocr();
        let files = [PathBuf::from("a/notes.png"), PathBuf::from("b/notes.pdf")];
        let outputs = unique_outputs(files.iter().map(|f| converter.output_path_for(f)).collect());

        assert_eq!(
            outputs,
            vec![
                PathBuf::from("out").join("notes.md"),
                PathBuf::from("out").join("notes_2.md"),
            ]
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(Cli::try_parse_from(["anymd", "a.bin", "--kind", "spreadsheet"]).is_err());
    }
}
