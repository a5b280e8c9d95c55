//! Phase 2: cell generation, parity enforcement, and ipynb emission.
//!
//! For each filtered section the instructor notebook gets one generation
//! call whose reply is parsed into cells. The student notebook is derived
//! from the instructor cells by a per-code-cell redaction pass, which keeps
//! the two notebooks structurally identical by construction; the assembler
//! still verifies the parity invariant before anything is written.
//!
//! Emission follows the nbformat 4.5 shape: markdown and code cells with
//! multi-line `source` arrays and a python3 kernelspec.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{LecternError, Result};
use crate::graph::{filter_sections, resolve_order};
use crate::models::client::{GenerateRequest, LlmClient, DEFAULT_MAX_ATTEMPTS};
use crate::models::{Cell, CellKind, LectureAnalysis};
use crate::percent::imports::consolidate_imports;
use crate::percent::parse_cells;
use crate::prompts;

/// Token budget for one section's generated cells.
const GENERATION_MAX_TOKENS: u32 = 4000;

/// Token budget for redacting one code cell.
const REDACTION_MAX_TOKENS: u32 = 1500;

/// The two parity-preserving notebooks produced for one lecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookPair {
    /// Complete, solved cells
    pub instructor: Vec<Cell>,
    /// Same structure with code bodies redacted into scaffolding
    pub student: Vec<Cell>,
}

impl NotebookPair {
    /// Write both notebooks as `<stem>_instructor.ipynb` and
    /// `<stem>_student.ipynb` under `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails.
    pub fn save(&self, output_dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(output_dir)?;
        let instructor_path = output_dir.join(format!("{stem}_instructor.ipynb"));
        let student_path = output_dir.join(format!("{stem}_student.ipynb"));
        save_notebook(&self.instructor, &instructor_path)?;
        save_notebook(&self.student, &student_path)?;
        Ok((instructor_path, student_path))
    }
}

/// Validate and pair two candidate cell sequences.
///
/// # Errors
///
/// Returns [`LecternError::EmptyNotebook`] for an empty instructor sequence
/// and [`LecternError::Parity`] when the pair diverges in cell count, kind
/// sequence, or markdown content.
pub fn assemble_pair(instructor: Vec<Cell>, student: Vec<Cell>) -> Result<NotebookPair> {
    if instructor.is_empty() {
        return Err(LecternError::EmptyNotebook);
    }
    if instructor.len() != student.len() {
        return Err(LecternError::Parity(format!(
            "cell count mismatch: instructor {} vs student {}",
            instructor.len(),
            student.len()
        )));
    }
    for (i, (a, b)) in instructor.iter().zip(&student).enumerate() {
        if a.kind != b.kind {
            return Err(LecternError::Parity(format!(
                "cell {i} kind mismatch: {} vs {}",
                a.kind, b.kind
            )));
        }
        if a.kind == CellKind::Markdown && a.content != b.content {
            return Err(LecternError::Parity(format!(
                "cell {i} markdown content diverges"
            )));
        }
    }
    Ok(NotebookPair {
        instructor,
        student,
    })
}

/// Generate the instructor/student notebook pair for an analysis.
///
/// Sections are taken in dependency order, filtered by priority (and
/// optionally to code-bearing sections only). A section whose generation
/// fails non-fatally is skipped with a diagnostic; a persistent provider
/// error aborts the run.
///
/// # Errors
///
/// Returns [`LecternError::NoSections`] when nothing passes the filter,
/// [`LecternError::EmptyNotebook`] when every section fails, and any
/// persistent provider error.
pub async fn generate_notebooks(
    client: &LlmClient,
    analysis: &LectureAnalysis,
    min_priority: u8,
    code_only: bool,
) -> Result<NotebookPair> {
    let (order, dropped) = resolve_order(&analysis.sections);
    for edge in &dropped {
        warn!(edge = %edge, "cycle repair dropped a dependency");
    }
    let sections = filter_sections(&order, &analysis.sections, min_priority, code_only);
    if sections.is_empty() {
        return Err(LecternError::NoSections(min_priority));
    }
    info!(
        sections = sections.len(),
        min_priority, "generating notebook cells"
    );

    let mut instructor = vec![title_cell(analysis)];
    let mut generated_any = false;

    for (i, section) in sections.iter().enumerate() {
        let prompt = prompts::generation_prompt(section, analysis, true);
        let request = GenerateRequest::text(prompt, GENERATION_MAX_TOKENS);
        match client.generate_with_retry(&request, DEFAULT_MAX_ATTEMPTS).await {
            Ok(response) => {
                let cells = parse_cells(&response.content);
                info!(
                    section = %section.section_id,
                    progress = format!("{}/{}", i + 1, sections.len()),
                    cells = cells.len(),
                    "section generated"
                );
                instructor.extend(cells);
                generated_any = true;
            }
            Err(e @ LecternError::PersistentProvider(_)) => return Err(e),
            Err(e) => {
                warn!(section = %section.section_id, error = %e, "section generation failed, skipping");
            }
        }
    }

    if !generated_any {
        return Err(LecternError::EmptyNotebook);
    }

    let instructor = consolidate_imports(&instructor);
    let student = redact_cells(client, &instructor).await?;
    assemble_pair(instructor, student)
}

fn title_cell(analysis: &LectureAnalysis) -> Cell {
    Cell::markdown(format!(
        "# {}\n\nThis notebook contains code-focused examples from the lecture.\n\
         Run each cell in order to explore the concepts.",
        analysis.lecture_title
    ))
}

/// Derive the student cell sequence from the instructor one.
///
/// Markdown cells are copied verbatim, so parity can only hold. Each code
/// cell gets its own redaction call; if that call fails non-fatally, the
/// deterministic local redaction keeps the run alive.
///
/// # Errors
///
/// Returns persistent provider errors; everything else degrades to the
/// local fallback.
pub async fn redact_cells(client: &LlmClient, instructor: &[Cell]) -> Result<Vec<Cell>> {
    let mut student = Vec::with_capacity(instructor.len());
    for cell in instructor {
        if cell.kind != CellKind::Code || is_imports_only(&cell.content) {
            student.push(cell.clone());
            continue;
        }

        let request =
            GenerateRequest::text(prompts::redaction_prompt(&cell.content), REDACTION_MAX_TOKENS);
        match client.generate_with_retry(&request, DEFAULT_MAX_ATTEMPTS).await {
            Ok(response) => {
                student.push(Cell::code(strip_reply_fence(&response.content)));
            }
            Err(e @ LecternError::PersistentProvider(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "redaction call failed, using local redaction");
                student.push(Cell::code(redact_locally(&cell.content)));
            }
        }
    }
    Ok(student)
}

fn is_imports_only(code: &str) -> bool {
    code.lines().all(|l| {
        let t = l.trim_end();
        t.is_empty() || t.starts_with("import ") || (t.starts_with("from ") && t.contains(" import "))
    })
}

/// Deterministic fallback redaction: imports, comments, and blank lines
/// survive; each run of solution lines collapses into one TODO marker.
#[must_use]
pub fn redact_locally(code: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_solution_run = false;

    for line in code.lines() {
        let trimmed = line.trim_start();
        let keep = trimmed.is_empty()
            || trimmed.starts_with('#')
            || line.starts_with("import ")
            || (line.starts_with("from ") && line.contains(" import "));
        if keep {
            out.push(line.to_string());
            in_solution_run = false;
        } else if !in_solution_run {
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            out.push(format!("{indent}# TODO: implement this step"));
            in_solution_run = true;
        }
    }
    out.join("\n")
}

fn strip_reply_fence(reply: &str) -> String {
    let text = reply.trim();
    if let Some(rest) = text.strip_prefix("```") {
        if let Some(newline) = rest.find('\n') {
            let inner = &rest[newline + 1..];
            if let Some(body) = inner.trim_end().strip_suffix("```") {
                return body.trim_end().to_string();
            }
        }
    }
    text.to_string()
}

#[derive(Debug, Serialize)]
struct IpynbCell {
    cell_type: &'static str,
    metadata: serde_json::Map<String, serde_json::Value>,
    source: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_count: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct Ipynb {
    cells: Vec<IpynbCell>,
    metadata: serde_json::Value,
    nbformat: u32,
    nbformat_minor: u32,
}

/// Render cells as an nbformat 4.5 document.
#[must_use]
pub fn to_ipynb(cells: &[Cell]) -> serde_json::Value {
    let ipynb = Ipynb {
        cells: cells
            .iter()
            .map(|cell| {
                let (cell_type, execution_count, outputs) = match cell.kind {
                    CellKind::Markdown => ("markdown", None, None),
                    CellKind::Code => ("code", Some(serde_json::Value::Null), Some(Vec::new())),
                };
                IpynbCell {
                    cell_type,
                    metadata: serde_json::Map::new(),
                    source: split_source(&cell.content),
                    execution_count,
                    outputs,
                }
            })
            .collect(),
        metadata: json!({
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3",
            },
            "language_info": {
                "name": "python",
                "version": "3.11.0",
            },
        }),
        nbformat: 4,
        nbformat_minor: 5,
    };
    serde_json::to_value(ipynb).unwrap_or_default()
}

/// nbformat stores sources as a line array with embedded newlines on every
/// line but the last.
fn split_source(content: &str) -> Vec<String> {
    let lines: Vec<&str> = content.lines().collect();
    let last = lines.len().saturating_sub(1);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i < last {
                format!("{line}\n")
            } else {
                (*line).to_string()
            }
        })
        .collect()
}

/// Write one cell sequence to disk as an ipynb file.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_notebook(cells: &[Cell], path: &Path) -> Result<()> {
    let document = to_ipynb(cells);
    std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
    info!(path = %path.display(), cells = cells.len(), "saved notebook");
    Ok(())
}
