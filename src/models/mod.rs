//! Data models for lecture analysis and notebook generation.
//!
//! This module defines the core data structures used throughout the crate:
//!
//! - [`Section`] - A teachable unit of lecture content with priority and dependencies
//! - [`CodeSnippet`] / [`Equation`] - Content extracted alongside a section
//! - [`LectureAnalysis`] - The validated, merged document-level analysis artifact
//! - [`Cell`] / [`CellKind`] - An atomic notebook unit (markdown or code)
//!
//! Validation is centralized here: a raw chunk reply is deserialized leniently
//! and then checked field-by-field, producing a structured [`Violations`] list
//! rather than failing at the first bad field.
//!
//! ## LLM Client Submodules
//!
//! - [`client`] - Provider-neutral request/response types and bounded retry
//! - [`openai`] - `OpenAI` chat-completions client for GPT-4o vision models
//! - [`bedrock`] - AWS Bedrock client for Claude models

pub mod bedrock;
pub mod client;
pub mod openai;

use serde::{Deserialize, Serialize};

use crate::error::{Violation, Violations};

/// Lowest accepted section priority.
pub const PRIORITY_MIN: u8 = 1;
/// Highest accepted section priority.
pub const PRIORITY_MAX: u8 = 10;

/// A code snippet extracted from lecture materials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnippet {
    /// The complete code snippet text
    pub code: String,
    /// Programming language tag (default: python)
    #[serde(default = "default_language")]
    pub language: String,
    /// Approximate line/position in the source material, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

fn default_language() -> String {
    "python".to_string()
}

/// A mathematical equation in LaTeX form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equation {
    /// LaTeX representation of the equation
    pub latex: String,
    /// Brief description of what the equation represents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A section of lecture content identified during analysis.
///
/// Sections are the atomic presentable units of a document: each carries an
/// editorial `priority` (1-10) controlling inclusion and a set of
/// `dependencies` naming sections whose concepts must precede it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Unique identifier for this section (snake_case)
    pub section_id: String,
    /// Human-readable section title
    pub title: String,
    /// 1-based page numbers where this section appears (sorted, deduplicated)
    pub pages: Vec<u32>,
    /// True if the section contains executable code examples
    #[serde(default)]
    pub has_code: bool,
    /// Code snippets found in this section
    #[serde(default)]
    pub code_snippets: Vec<CodeSnippet>,
    /// Equations found in this section
    #[serde(default)]
    pub equations: Vec<Equation>,
    /// Key concepts covered
    #[serde(default)]
    pub concepts: Vec<String>,
    /// Section ids that should come before this section
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Priority for inclusion (1 = low, 10 = critical)
    #[serde(default = "default_priority")]
    pub priority: u8,
}

const fn default_priority() -> u8 {
    5
}

impl Section {
    /// First page this section appears on, or `u32::MAX` if pages are unknown.
    ///
    /// Used by the dependency resolver's tie-break; sections without pages
    /// sort after everything else.
    #[inline]
    #[must_use]
    pub fn first_page(&self) -> u32 {
        self.pages.iter().copied().min().unwrap_or(u32::MAX)
    }

    /// Merge another partial record for the same `section_id` into this one.
    ///
    /// Policy: union `pages`, concatenate-then-deduplicate snippets and
    /// equations by exact content, union `concepts` and `dependencies`
    /// preserving first-seen order, OR `has_code`, keep the maximum
    /// `priority`, keep the first-seen `title`. The operation is commutative
    /// and associative over content, so partials can be folded in any
    /// grouping.
    pub fn merge(&mut self, other: Section) {
        debug_assert_eq!(self.section_id, other.section_id);

        self.pages.extend(other.pages);
        self.pages.sort_unstable();
        self.pages.dedup();

        for snippet in other.code_snippets {
            if !self.code_snippets.contains(&snippet) {
                self.code_snippets.push(snippet);
            }
        }
        for equation in other.equations {
            if !self.equations.contains(&equation) {
                self.equations.push(equation);
            }
        }
        for concept in other.concepts {
            if !self.concepts.contains(&concept) {
                self.concepts.push(concept);
            }
        }
        for dep in other.dependencies {
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }

        self.has_code |= other.has_code;
        self.priority = self.priority.max(other.priority);
        if self.title.is_empty() {
            self.title = other.title;
        }
    }
}

/// Complete document-level analysis: the merged, validated output of the
/// chunk analysis phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LectureAnalysis {
    /// Title of the lecture
    pub lecture_title: String,
    /// Total number of pages processed
    pub total_pages: u32,
    /// All sections identified in the lecture; `section_id`s are unique
    pub sections: Vec<Section>,
    /// Additional free-form metadata (author, course, run timestamp, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LectureAnalysis {
    /// Look up a section by id.
    #[must_use]
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.section_id == id)
    }
}

/// Kind of notebook cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// Markdown documentation cell
    #[default]
    Markdown,
    /// Executable code cell
    Code,
}

impl std::fmt::Display for CellKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Markdown => "markdown",
            Self::Code => "code",
        };
        write!(f, "{s}")
    }
}

/// An atomic notebook unit: a typed block of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell kind (markdown or code)
    pub kind: CellKind,
    /// Cell text content
    pub content: String,
}

impl Cell {
    /// Construct a markdown cell.
    #[must_use]
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Markdown,
            content: content.into(),
        }
    }

    /// Construct a code cell.
    #[must_use]
    pub fn code(content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            content: content.into(),
        }
    }
}

/// Validate a deserialized section against the schema, normalizing it on
/// success.
///
/// All field checks run; the result is either the cleaned section or the
/// full list of violations, never a partial of both.
///
/// # Errors
///
/// Returns every violation found: empty `section_id`, empty `title`,
/// zero page numbers (pages are 1-based), or `priority` outside
/// [`PRIORITY_MIN`]..=[`PRIORITY_MAX`].
pub fn validate_section(mut section: Section) -> Result<Section, Vec<Violation>> {
    let mut violations = Vec::new();
    let id = if section.section_id.is_empty() {
        None
    } else {
        Some(section.section_id.clone())
    };

    if section.section_id.is_empty() {
        violations.push(Violation {
            section_id: id.clone(),
            field: "section_id".into(),
            message: "must not be empty".into(),
        });
    }
    if section.title.is_empty() {
        violations.push(Violation {
            section_id: id.clone(),
            field: "title".into(),
            message: "must not be empty".into(),
        });
    }
    if section.pages.contains(&0) {
        violations.push(Violation {
            section_id: id.clone(),
            field: "pages".into(),
            message: "page numbers are 1-based; 0 is not a valid page".into(),
        });
    }
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&section.priority) {
        violations.push(Violation {
            section_id: id,
            field: "priority".into(),
            message: format!(
                "must be between {PRIORITY_MIN} and {PRIORITY_MAX}, got {}",
                section.priority
            ),
        });
    }

    if violations.is_empty() {
        section.pages.sort_unstable();
        section.pages.dedup();
        Ok(section)
    } else {
        Err(violations)
    }
}

/// Validate every section of a chunk reply, failing the chunk as a whole if
/// any section violates the schema.
///
/// # Errors
///
/// Returns the combined [`Violations`] list covering all invalid sections.
pub fn validate_sections(sections: Vec<Section>) -> Result<Vec<Section>, Violations> {
    let mut valid = Vec::with_capacity(sections.len());
    let mut violations = Vec::new();

    for section in sections {
        match validate_section(section) {
            Ok(s) => valid.push(s),
            Err(mut v) => violations.append(&mut v),
        }
    }

    if violations.is_empty() {
        Ok(valid)
    } else {
        Err(Violations(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str) -> Section {
        Section {
            section_id: id.into(),
            title: format!("Section {id}"),
            pages: vec![1],
            priority: 5,
            ..Section::default()
        }
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        let mut s = section("a");
        s.priority = 15;
        let violations = validate_section(s).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "priority");

        let mut s = section("b");
        s.priority = 0;
        assert!(validate_section(s).is_err());
    }

    #[test]
    fn test_validate_normalizes_pages() {
        let mut s = section("a");
        s.pages = vec![3, 1, 3, 2];
        let s = validate_section(s).unwrap();
        assert_eq!(s.pages, vec![1, 2, 3]);
    }

    #[test]
    fn test_validate_collects_all_violations() {
        let s = Section {
            section_id: String::new(),
            title: String::new(),
            pages: vec![0],
            priority: 11,
            ..Section::default()
        };
        let violations = validate_section(s).unwrap_err();
        assert_eq!(violations.len(), 4);
    }

    #[test]
    fn test_merge_unions_and_keeps_max_priority() {
        let mut a = section("a");
        a.pages = vec![1, 2];
        a.priority = 3;
        a.concepts = vec!["loops".into()];
        a.code_snippets = vec![CodeSnippet {
            code: "x = 1".into(),
            language: "python".into(),
            line_number: None,
        }];

        let mut b = section("a");
        b.pages = vec![2, 3];
        b.priority = 8;
        b.has_code = true;
        b.concepts = vec!["loops".into(), "recursion".into()];
        b.code_snippets = vec![CodeSnippet {
            code: "x = 1".into(),
            language: "python".into(),
            line_number: None,
        }];
        b.dependencies = vec!["intro".into()];

        a.merge(b);
        assert_eq!(a.pages, vec![1, 2, 3]);
        assert_eq!(a.priority, 8);
        assert!(a.has_code);
        assert_eq!(a.concepts, vec!["loops".to_string(), "recursion".to_string()]);
        assert_eq!(a.code_snippets.len(), 1, "exact duplicates deduplicated");
        assert_eq!(a.dependencies, vec!["intro".to_string()]);
    }

    #[test]
    fn test_merge_commutative_over_content() {
        let mut x = section("s");
        x.pages = vec![1];
        x.priority = 4;
        x.concepts = vec!["a".into(), "b".into()];

        let mut y = section("s");
        y.pages = vec![5];
        y.priority = 9;
        y.concepts = vec!["b".into(), "c".into()];

        let mut xy = x.clone();
        xy.merge(y.clone());
        let mut yx = y;
        yx.merge(x);

        assert_eq!(xy.pages, yx.pages);
        assert_eq!(xy.priority, yx.priority);
        // Concept order depends on fold order, membership does not.
        let mut c1 = xy.concepts;
        let mut c2 = yx.concepts;
        c1.sort();
        c2.sort();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_analysis_roundtrip_json() {
        let analysis = LectureAnalysis {
            lecture_title: "Hypothesis Testing".into(),
            total_pages: 42,
            sections: vec![section("t_tests")],
            metadata: serde_json::Map::new(),
        };
        let json = serde_json::to_string(&analysis).unwrap();
        let back: LectureAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, analysis);
        assert!(back.section("t_tests").is_some());
    }

    #[test]
    fn test_snippet_language_defaults_to_python() {
        let snippet: CodeSnippet = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(snippet.language, "python");
    }
}
