//! Prompt assembly for both pipeline phases.
//!
//! All prompt fragments are compiled into the binary. The interesting part
//! is [`section_context`], which renders one section (plus the titles of its
//! dependencies) into the context block the generation prompt is built
//! around.

use crate::models::{LectureAnalysis, Section};

/// Instructions for the page-analysis phase.
pub const ANALYSIS_INSTRUCTIONS: &str = "\
Examine each page image and identify the teachable sections it contains. \
For every section, capture:
- a short stable identifier (lowercase, words joined by underscores)
- the section title as presented
- the page numbers the section spans
- whether the section presents runnable code
- every code snippet, with its language and the page line it starts on if visible
- every displayed equation, in LaTeX, with a one-line description when the \
slide provides one
- the key concepts the section teaches
- the identifiers of earlier sections this section builds on
- a priority from 1 (skippable aside) to 10 (core material)";

/// JSON output schema for the page-analysis phase.
pub const ANALYSIS_OUTPUT_FORMAT: &str = r#"Output a single JSON object with this shape:

{
  "lecture_title": "title of the lecture",
  "total_pages": 0,
  "sections": [
    {
      "section_id": "short_stable_id",
      "title": "Section Title",
      "pages": [1, 2],
      "has_code": true,
      "code_snippets": [
        {"code": "x = 1", "language": "python", "line_number": 12}
      ],
      "equations": [
        {"latex": "e = mc^2", "description": "mass-energy equivalence"}
      ],
      "concepts": ["short phrase"],
      "dependencies": ["earlier_section_id"],
      "priority": 7
    }
  ],
  "metadata": {}
}"#;

/// Shared instructions for the cell-generation phase.
pub const GENERATION_INSTRUCTIONS: &str = "\
Produce notebook cells that teach this section. Alternate between a short \
markdown explanation and a runnable code cell demonstrating it. Ground the \
code in the snippets and equations supplied below; do not invent unrelated \
material. Keep each code cell focused on one idea.";

/// Percent-format protocol description appended to every generation prompt.
pub const OUTPUT_FORMAT: &str = "\
Emit the cells in percent format:
- a markdown cell starts with the line `# %% [markdown]`, and every content \
line inside it is prefixed with `# `
- a code cell starts with the line `# %%`, followed by plain Python
Do not wrap the output in a code fence.";

/// Instructor-notebook fragment: complete, working solutions.
pub const INSTRUCTOR_FRAGMENT: &str = "\
This is the INSTRUCTOR notebook. Every code cell must contain the complete, \
working solution, runnable top to bottom.";

/// Student-notebook fragment: scaffolding with gaps to fill in.
pub const STUDENT_FRAGMENT: &str = "\
This is the STUDENT notebook. Keep imports and explanatory comments, but \
replace solution bodies with `# TODO` scaffolding for the learner to \
complete.";

/// Prompt for redacting one instructor code cell into its student form.
pub const REDACTION_PROMPT: &str = "\
Rewrite the following solved code cell as a student exercise. Keep all \
import lines and comments verbatim, replace the solution body with `# TODO` \
guidance naming what the student should implement, and keep the cell \
syntactically valid Python. Reply with the rewritten cell only, no fences, \
no commentary.";

/// Build the phase-1 prompt for one chunk of pages.
#[must_use]
pub fn analysis_prompt(chunk_index: usize, total_chunks: usize, first_page: u32, last_page: u32) -> String {
    format!(
        "You are analyzing pages from a lecture PDF to extract structured \
         information about code-worthy content.\n\n\
         This is chunk {} of {total_chunks}.\n\
         Pages in this chunk: {first_page} to {last_page}\n\n\
         {ANALYSIS_INSTRUCTIONS}\n\n\
         {ANALYSIS_OUTPUT_FORMAT}\n\n\
         Analyze the images provided and output ONLY valid JSON matching the \
         schema above.",
        chunk_index + 1,
    )
}

/// Build the phase-2 prompt for one section.
#[must_use]
pub fn generation_prompt(section: &Section, analysis: &LectureAnalysis, instructor: bool) -> String {
    let fragment = if instructor {
        INSTRUCTOR_FRAGMENT
    } else {
        STUDENT_FRAGMENT
    };
    format!(
        "You are generating cells for a Jupyter notebook.\n\n\
         {GENERATION_INSTRUCTIONS}\n\n\
         {fragment}\n\n\
         {OUTPUT_FORMAT}\n\n\
         ---\n\n\
         {}\n\n\
         ---\n\n\
         Generate ONLY the cells for this section using the percent format.\n\
         Include both markdown and code cells as appropriate.",
        section_context(section, analysis),
    )
}

/// Render one section and its dependency titles as a prompt context block.
#[must_use]
pub fn section_context(section: &Section, analysis: &LectureAnalysis) -> String {
    let mut parts = vec![
        format!("## Section: {}", section.title),
        format!("Section ID: {}", section.section_id),
        format!("Priority: {}", section.priority),
        format!("Pages: {:?}", section.pages),
    ];

    if !section.dependencies.is_empty() {
        parts.push("\n### Dependencies:".to_string());
        for dep_id in &section.dependencies {
            if let Some(dep) = analysis.section(dep_id) {
                parts.push(format!("- {} (builds on this concept)", dep.title));
            }
        }
    }

    if !section.code_snippets.is_empty() {
        parts.push("\n### Code Snippets:".to_string());
        for (i, snippet) in section.code_snippets.iter().enumerate() {
            parts.push(format!("\nSnippet {} ({}):", i + 1, snippet.language));
            parts.push(format!("```{}", snippet.language));
            parts.push(snippet.code.clone());
            parts.push("```".to_string());
        }
    }

    if !section.equations.is_empty() {
        parts.push("\n### Equations:".to_string());
        for eq in &section.equations {
            match &eq.description {
                Some(desc) => parts.push(format!("- ${}$: {desc}", eq.latex)),
                None => parts.push(format!("- ${}$", eq.latex)),
            }
        }
    }

    if !section.concepts.is_empty() {
        parts.push(format!("\n### Key Concepts: {}", section.concepts.join(", ")));
    }

    parts.join("\n")
}

/// Build the redaction prompt for one instructor code cell.
#[must_use]
pub fn redaction_prompt(code: &str) -> String {
    format!("{REDACTION_PROMPT}\n\n```python\n{code}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CodeSnippet, Equation};

    fn sample_analysis() -> LectureAnalysis {
        LectureAnalysis {
            lecture_title: "Gradient Descent".into(),
            total_pages: 12,
            sections: vec![
                Section {
                    section_id: "intro".into(),
                    title: "Introduction".into(),
                    pages: vec![1, 2],
                    priority: 6,
                    ..Section::default()
                },
                Section {
                    section_id: "gd".into(),
                    title: "The Update Rule".into(),
                    pages: vec![3, 4],
                    has_code: true,
                    code_snippets: vec![CodeSnippet {
                        code: "w -= lr * grad".into(),
                        language: "python".into(),
                        line_number: None,
                    }],
                    equations: vec![Equation {
                        latex: r"w_{t+1} = w_t - \eta \nabla L".into(),
                        description: Some("gradient step".into()),
                    }],
                    concepts: vec!["learning rate".into()],
                    dependencies: vec!["intro".into()],
                    priority: 9,
                    ..Section::default()
                },
            ],
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_section_context_includes_dependency_titles() {
        let analysis = sample_analysis();
        let ctx = section_context(analysis.section("gd").unwrap(), &analysis);
        assert!(ctx.contains("## Section: The Update Rule"));
        assert!(ctx.contains("- Introduction (builds on this concept)"));
        assert!(ctx.contains("```python"));
        assert!(ctx.contains("gradient step"));
        assert!(ctx.contains("Key Concepts: learning rate"));
    }

    #[test]
    fn test_section_context_skips_unknown_dependency() {
        let mut analysis = sample_analysis();
        analysis.sections[1].dependencies = vec!["missing".into()];
        let ctx = section_context(&analysis.sections[1].clone(), &analysis);
        assert!(!ctx.contains("missing"));
    }

    #[test]
    fn test_analysis_prompt_mentions_page_range() {
        let prompt = analysis_prompt(1, 3, 11, 20);
        assert!(prompt.contains("chunk 2 of 3"));
        assert!(prompt.contains("Pages in this chunk: 11 to 20"));
        assert!(prompt.contains("lecture_title"));
    }

    #[test]
    fn test_generation_prompt_varies_by_notebook_kind() {
        let analysis = sample_analysis();
        let section = analysis.section("gd").unwrap();
        let instructor = generation_prompt(section, &analysis, true);
        let student = generation_prompt(section, &analysis, false);
        assert!(instructor.contains("INSTRUCTOR"));
        assert!(student.contains("STUDENT"));
        assert!(instructor.contains("# %% [markdown]"));
    }
}
