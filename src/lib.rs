//! # lectern
//!
//! Turn lecture PDFs into paired Jupyter notebooks with a vision LLM.
//!
//! The pipeline has two phases:
//! 1. **Analysis** - render the PDF into bounded page chunks, send each
//!    chunk to a vision model, validate and merge the partial section
//!    extractions into one document graph
//! 2. **Generation** - order the sections by their declared conceptual
//!    dependencies, filter by priority, generate percent-formatted cells
//!    per section, and emit a parity-preserving instructor/student
//!    notebook pair
//!
//! ## Supported LLM Providers
//!
//! - **`OpenAI`**: GPT-4o, GPT-4o mini
//! - **AWS Bedrock**: Claude Opus 4.5, Claude Sonnet 3.5 v2
//!
//! ## Example Usage
//!
//! ```no_run
//! use lectern::{
//!     analysis, graph, notebook, pdf::PdfRenderer,
//!     models::client::LlmClient,
//!     models::openai::{OpenAIClient, OpenAIModel},
//! };
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! // 1. Render and chunk the PDF
//! let renderer = PdfRenderer::new();
//! let chunks = renderer.render_chunks(Path::new("lecture.pdf"), 10, 150)?;
//! let total_pages: u32 = chunks.iter().map(|c| c.pages.len() as u32).sum();
//!
//! // 2. Analyze chunks into one document
//! let client = LlmClient::OpenAI(OpenAIClient::new(
//!     std::env::var("OPENAI_API_KEY")?,
//!     OpenAIModel::Gpt4o,
//! ));
//! let lecture = analysis::analyze_chunks(&client, &chunks, total_pages, 4).await?;
//!
//! // 3. Generate the notebook pair
//! let pair = notebook::generate_notebooks(&client, &lecture, 5, false).await?;
//! pair.save(Path::new("out"), "lecture")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`analysis`] - chunk analysis, aggregation, and artifact persistence
//! - [`graph`] - dependency resolution and priority filtering
//! - [`models`] - data types, validation, and LLM clients
//! - [`notebook`] - cell generation, parity checks, ipynb emission
//! - [`pdf`] - PDF rendering to chunked PNG images using pdfium
//! - [`percent`] - percent-format cell parsing and rendering
//! - [`prompts`] - prompt templates and section context rendering

pub mod analysis;
pub mod error;
pub mod graph;
pub mod models;
pub mod notebook;
pub mod pdf;
pub mod percent;
pub mod prompts;

pub use error::{LecternError, Result, Violation, Violations};
pub use graph::{filter_sections, resolve_order, DroppedEdge};
pub use models::{Cell, CellKind, CodeSnippet, Equation, LectureAnalysis, Section};
pub use notebook::{assemble_pair, save_notebook, NotebookPair};
pub use pdf::{PageChunk, PageImage, PdfRenderer};
pub use percent::{imports::consolidate_imports, parse_cells, render_cells};
