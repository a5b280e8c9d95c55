//! Lecture-to-notebook CLI
//!
//! Analyze lecture PDFs with a vision LLM and generate paired
//! instructor/student Jupyter notebooks.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lectern::{
    analysis,
    models::{
        bedrock::{BedrockClient, ClaudeModel},
        client::LlmClient,
        openai::{OpenAIClient, OpenAIModel},
    },
    notebook, LectureAnalysis, PdfRenderer,
};
use tracing::info;

/// Available LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
enum Provider {
    /// `OpenAI` GPT-4o family
    Openai,
    /// Claude via AWS Bedrock
    Claude,
}

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Turn lecture PDFs into paired Jupyter notebooks")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Phase 1: analyze a lecture PDF into a structured section graph
    Analyze {
        /// Path to the lecture PDF
        pdf: PathBuf,

        /// Output path for the analysis JSON (default: <pdf>.analysis.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pages per analysis chunk
        #[arg(long, default_value = "10")]
        chunk_size: usize,

        /// DPI for page rendering
        #[arg(long, default_value = "150")]
        dpi: u32,

        /// Concurrent chunk calls in flight
        #[arg(long, default_value = "4")]
        fanout: usize,

        /// LLM provider
        #[arg(long, value_enum, default_value = "openai")]
        provider: Provider,

        /// Model name (provider default if omitted)
        #[arg(long)]
        model: Option<String>,
    },

    /// Phase 2: generate notebooks from a saved analysis
    Generate {
        /// Path to an analysis JSON produced by `analyze`
        analysis: PathBuf,

        /// Directory for the generated notebooks
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Minimum section priority to include
        #[arg(long, default_value = "5")]
        min_priority: u8,

        /// Only include sections that present runnable code
        #[arg(long)]
        code_only: bool,

        /// LLM provider
        #[arg(long, value_enum, default_value = "openai")]
        provider: Provider,

        /// Model name (provider default if omitted)
        #[arg(long)]
        model: Option<String>,
    },

    /// Run both phases, reusing a persisted analysis when one exists
    Process {
        /// Path to the lecture PDF
        pdf: PathBuf,

        /// Directory for the generated notebooks
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Pages per analysis chunk
        #[arg(long, default_value = "10")]
        chunk_size: usize,

        /// DPI for page rendering
        #[arg(long, default_value = "150")]
        dpi: u32,

        /// Concurrent chunk calls in flight
        #[arg(long, default_value = "4")]
        fanout: usize,

        /// Minimum section priority to include
        #[arg(long, default_value = "5")]
        min_priority: u8,

        /// Only include sections that present runnable code
        #[arg(long)]
        code_only: bool,

        /// Re-run analysis even if a persisted artifact exists
        #[arg(long)]
        force: bool,

        /// LLM provider
        #[arg(long, value_enum, default_value = "openai")]
        provider: Provider,

        /// Model name (provider default if omitted)
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "lectern=info"
                    .parse()
                    .expect("directive is compile-time constant"),
            ),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Analyze {
            pdf,
            output,
            chunk_size,
            dpi,
            fanout,
            provider,
            model,
        } => {
            let client = build_client(provider, model.as_deref()).await?;
            let lecture = analyze_pdf(&client, &pdf, chunk_size, dpi, fanout).await?;
            let output = output.unwrap_or_else(|| analysis::analysis_path(&pdf));
            analysis::save_analysis(&lecture, &output)?;
            println!(
                "Analyzed {} pages into {} sections: {}",
                lecture.total_pages,
                lecture.sections.len(),
                output.display()
            );
        }

        Command::Generate {
            analysis: analysis_file,
            output_dir,
            min_priority,
            code_only,
            provider,
            model,
        } => {
            let client = build_client(provider, model.as_deref()).await?;
            let lecture = analysis::load_analysis(&analysis_file)?;
            let stem = file_stem(&analysis_file);
            generate(&client, &lecture, &output_dir, &stem, min_priority, code_only).await?;
        }

        Command::Process {
            pdf,
            output_dir,
            chunk_size,
            dpi,
            fanout,
            min_priority,
            code_only,
            force,
            provider,
            model,
        } => {
            let client = build_client(provider, model.as_deref()).await?;

            let cached = if force {
                None
            } else {
                analysis::load_cached_analysis(&pdf)
            };
            let lecture = match cached {
                Some(lecture) => lecture,
                None => {
                    let lecture = analyze_pdf(&client, &pdf, chunk_size, dpi, fanout).await?;
                    analysis::save_analysis(&lecture, &analysis::analysis_path(&pdf))?;
                    lecture
                }
            };

            let stem = file_stem(&pdf);
            generate(&client, &lecture, &output_dir, &stem, min_priority, code_only).await?;
        }
    }

    Ok(())
}

async fn build_client(provider: Provider, model: Option<&str>) -> Result<LlmClient> {
    match provider {
        Provider::Openai => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY environment variable not set")?;
            let model = match model {
                Some(name) => name
                    .parse::<OpenAIModel>()
                    .map_err(|e| anyhow::anyhow!(e))?,
                None => OpenAIModel::default(),
            };
            info!(model = %model, "using OpenAI");
            Ok(LlmClient::OpenAI(OpenAIClient::new(api_key, model)))
        }
        Provider::Claude => {
            let model = match model {
                Some(name) => name
                    .parse::<ClaudeModel>()
                    .map_err(|e| anyhow::anyhow!(e))?,
                None => ClaudeModel::default(),
            };
            info!(model = %model, "using Claude via Bedrock");
            Ok(LlmClient::Bedrock(BedrockClient::new(model).await))
        }
    }
}

async fn analyze_pdf(
    client: &LlmClient,
    pdf: &Path,
    chunk_size: usize,
    dpi: u32,
    fanout: usize,
) -> Result<LectureAnalysis> {
    anyhow::ensure!(pdf.exists(), "PDF not found: {}", pdf.display());

    let renderer = PdfRenderer::new();
    let chunks = renderer.render_chunks(pdf, chunk_size, dpi)?;
    let total_pages: u32 = chunks
        .iter()
        .map(|c| u32::try_from(c.pages.len()).unwrap_or(0))
        .sum();

    let lecture = analysis::analyze_chunks(client, &chunks, total_pages, fanout).await?;
    Ok(lecture)
}

async fn generate(
    client: &LlmClient,
    lecture: &LectureAnalysis,
    output_dir: &Path,
    stem: &str,
    min_priority: u8,
    code_only: bool,
) -> Result<()> {
    let pair = notebook::generate_notebooks(client, lecture, min_priority, code_only).await?;
    let (instructor, student) = pair.save(output_dir, stem)?;
    println!("Instructor notebook: {}", instructor.display());
    println!("Student notebook:    {}", student.display());
    Ok(())
}

/// Base name for output files, derived from the input path.
fn file_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "notebook".to_string());
    // `lecture.analysis.json` should yield `lecture`, not `lecture.analysis`
    stem.strip_suffix(".analysis")
        .map_or(stem.clone(), ToString::to_string)
}
