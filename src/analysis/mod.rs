//! Phase 1: chunked vision analysis of lecture pages.
//!
//! Each page chunk gets one generation call; the reply is parsed and
//! validated into a [`ChunkAnalysis`], and all partials are folded by the
//! [`Aggregator`] into one [`LectureAnalysis`]. A chunk that fails schema
//! validation or exhausts its transient retries contributes nothing and
//! never aborts its siblings; only a persistent provider failure ends the
//! run.
//!
//! The finished analysis is persisted next to the source PDF as
//! `<stem>.analysis.json`, and a later run against the same source reuses
//! it instead of repeating the expensive vision calls.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{LecternError, Result};
use crate::models::client::{extract_json, GenerateRequest, LlmClient, DEFAULT_MAX_ATTEMPTS};
use crate::models::{validate_sections, LectureAnalysis, Section};
use crate::pdf::PageChunk;
use crate::prompts;

/// Default number of chunk calls in flight at once.
pub const DEFAULT_FANOUT: usize = 4;

/// Token budget for one chunk extraction reply.
const ANALYSIS_MAX_TOKENS: u32 = 2000;

/// Validated partial analysis extracted from one chunk reply.
#[derive(Debug, Clone, Default)]
pub struct ChunkAnalysis {
    /// 0-based index of the source chunk
    pub chunk_index: usize,
    /// Lecture title as seen by this chunk, if any
    pub lecture_title: Option<String>,
    /// Validated partial sections found in this chunk
    pub sections: Vec<Section>,
    /// Free-form metadata supplied by this chunk
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Wire form of a chunk reply, before validation.
#[derive(Debug, Deserialize)]
struct ChunkReply {
    #[serde(default)]
    lecture_title: Option<String>,
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Parse and validate one raw chunk reply.
///
/// Pure function over the reply text, so malformed-response handling is
/// testable without any I/O. Tolerates a fenced JSON wrapper and leading
/// prose around the payload.
///
/// # Errors
///
/// Returns [`LecternError::Json`] if no JSON object can be decoded and
/// [`LecternError::Validation`] if any section fails schema checks.
pub fn parse_chunk_reply(reply: &str, chunk_index: usize) -> Result<ChunkAnalysis> {
    let payload = extract_json(reply);
    let wire: ChunkReply = serde_json::from_str(&payload)?;
    let sections = validate_sections(wire.sections).map_err(LecternError::Validation)?;

    Ok(ChunkAnalysis {
        chunk_index,
        lecture_title: wire.lecture_title,
        sections,
        metadata: wire.metadata,
    })
}

/// Analyze one page chunk with a single retried generation call.
///
/// # Errors
///
/// Propagates provider errors (after retry exhaustion for transient ones)
/// and parse/validation failures; the caller decides whether the failure is
/// chunk-local or fatal.
pub async fn analyze_chunk(
    client: &LlmClient,
    chunk: &PageChunk,
    total_chunks: usize,
) -> Result<ChunkAnalysis> {
    info!(
        chunk = chunk.chunk_index + 1,
        total_chunks,
        pages = chunk.pages.len(),
        "analyzing chunk"
    );

    let prompt = prompts::analysis_prompt(
        chunk.chunk_index,
        total_chunks,
        chunk.first_page,
        chunk.last_page,
    );
    let request =
        GenerateRequest::text(prompt, ANALYSIS_MAX_TOKENS).with_images(chunk.png_payloads());

    let response = client
        .generate_with_retry(&request, DEFAULT_MAX_ATTEMPTS)
        .await?;
    debug!(
        chunk = chunk.chunk_index + 1,
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        "chunk reply received"
    );

    let analysis = parse_chunk_reply(&response.content, chunk.chunk_index)?;
    info!(
        chunk = chunk.chunk_index + 1,
        sections = analysis.sections.len(),
        "chunk parsed"
    );
    Ok(analysis)
}

/// Run all chunk analyses with bounded concurrency and fold the results.
///
/// Chunk calls run through a buffered stream with at most `fanout` in
/// flight. A chunk-local failure (validation, exhausted transient retries,
/// malformed JSON) is logged and skipped; a persistent provider failure is
/// fatal. Partials are sorted by chunk index before folding, so arrival
/// interleaving cannot change the output.
///
/// # Errors
///
/// Returns the first persistent provider error encountered.
pub async fn analyze_chunks(
    client: &LlmClient,
    chunks: &[PageChunk],
    total_pages: u32,
    fanout: usize,
) -> Result<LectureAnalysis> {
    let total_chunks = chunks.len();
    let mut results: Vec<(usize, Result<ChunkAnalysis>)> = stream::iter(chunks)
        .map(|chunk| async move {
            (
                chunk.chunk_index,
                analyze_chunk(client, chunk, total_chunks).await,
            )
        })
        .buffer_unordered(fanout.max(1))
        .collect()
        .await;
    results.sort_by_key(|(index, _)| *index);

    let mut aggregator = Aggregator::new();
    for (index, result) in results {
        match result {
            Ok(analysis) => aggregator.fold(analysis),
            Err(e @ LecternError::PersistentProvider(_)) => return Err(e),
            Err(e) => {
                warn!(chunk = index + 1, error = %e, "chunk failed, skipping");
            }
        }
    }

    Ok(aggregator.finish(total_pages))
}

/// Merges per-chunk partial sections into one document.
///
/// Sections are keyed by id in first-seen order; a repeated id signals a
/// section spanning a chunk boundary and is merged field-by-field. The
/// title and metadata come from the first chunk that supplies them.
#[derive(Debug, Default)]
pub struct Aggregator {
    sections: IndexMap<String, Section>,
    lecture_title: Option<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl Aggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk's partial sections into the document.
    pub fn fold(&mut self, chunk: ChunkAnalysis) {
        if self.lecture_title.is_none() {
            self.lecture_title = chunk.lecture_title;
        }
        if self.metadata.is_empty() {
            self.metadata = chunk.metadata;
        }

        for section in chunk.sections {
            match self.sections.get_mut(&section.section_id) {
                Some(existing) => {
                    debug!(
                        section_id = %section.section_id,
                        "merging section that spans a chunk boundary"
                    );
                    existing.merge(section);
                }
                None => {
                    self.sections.insert(section.section_id.clone(), section);
                }
            }
        }
    }

    /// Finalize the document: prune dangling dependency edges and emit the
    /// sections in first-seen order.
    #[must_use]
    pub fn finish(self, total_pages: u32) -> LectureAnalysis {
        let ids: Vec<String> = self.sections.keys().cloned().collect();
        let mut sections: Vec<Section> = self.sections.into_values().collect();

        for section in &mut sections {
            section.dependencies.retain(|dep| {
                let known = ids.iter().any(|id| id == dep);
                if !known {
                    warn!(
                        section_id = %section.section_id,
                        dependency = %dep,
                        "pruning dependency on unknown section"
                    );
                }
                known
            });
        }

        info!(sections = sections.len(), total_pages, "aggregation complete");
        LectureAnalysis {
            lecture_title: self
                .lecture_title
                .unwrap_or_else(|| "Unknown Lecture".to_string()),
            total_pages,
            sections,
            metadata: self.metadata,
        }
    }
}

/// Default persistence path for a source PDF's analysis artifact.
#[must_use]
pub fn analysis_path(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension("analysis.json")
}

/// Persist an analysis as pretty-printed JSON, stamping the write time into
/// its metadata.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_analysis(analysis: &LectureAnalysis, path: &Path) -> Result<()> {
    let mut stamped = analysis.clone();
    stamped.metadata.insert(
        "analyzed_at".to_string(),
        serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
    );
    std::fs::write(path, serde_json::to_string_pretty(&stamped)?)?;
    info!(path = %path.display(), "saved analysis");
    Ok(())
}

/// Load a previously persisted analysis.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, or not a valid
/// analysis document.
pub fn load_analysis(path: &Path) -> Result<LectureAnalysis> {
    let text = std::fs::read_to_string(path)?;
    let analysis: LectureAnalysis = serde_json::from_str(&text)?;
    info!(
        path = %path.display(),
        sections = analysis.sections.len(),
        "loaded analysis"
    );
    Ok(analysis)
}

/// Try to reuse a persisted analysis for the given source PDF.
///
/// Returns `None` when no artifact exists or the artifact fails to parse,
/// in which case phase 1 runs from scratch.
#[must_use]
pub fn load_cached_analysis(pdf_path: &Path) -> Option<LectureAnalysis> {
    let path = analysis_path(pdf_path);
    if !path.exists() {
        return None;
    }
    match load_analysis(&path) {
        Ok(analysis) => {
            info!(path = %path.display(), "reusing persisted analysis");
            Some(analysis)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable analysis artifact");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, pages: &[u32], priority: u8) -> Section {
        Section {
            section_id: id.to_string(),
            title: format!("Title of {id}"),
            pages: pages.to_vec(),
            priority,
            ..Section::default()
        }
    }

    fn chunk_with(index: usize, sections: Vec<Section>) -> ChunkAnalysis {
        ChunkAnalysis {
            chunk_index: index,
            lecture_title: Some(format!("Title from chunk {index}")),
            sections,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_parse_chunk_reply_fenced() {
        let reply = r#"Here you go:
```json
{"lecture_title": "Sorting", "sections": [{"section_id": "intro", "title": "Intro", "pages": [1], "priority": 6}]}
```"#;
        let analysis = parse_chunk_reply(reply, 0).unwrap();
        assert_eq!(analysis.lecture_title.as_deref(), Some("Sorting"));
        assert_eq!(analysis.sections.len(), 1);
        assert_eq!(analysis.sections[0].section_id, "intro");
    }

    #[test]
    fn test_parse_chunk_reply_rejects_bad_priority() {
        let reply = r#"{"sections": [{"section_id": "a", "title": "A", "pages": [1], "priority": 15}]}"#;
        let err = parse_chunk_reply(reply, 0).unwrap_err();
        assert!(matches!(err, LecternError::Validation(_)));
    }

    #[test]
    fn test_parse_chunk_reply_invalid_json() {
        assert!(parse_chunk_reply("no json here", 0).is_err());
    }

    #[test]
    fn test_fold_keeps_first_seen_title() {
        let mut agg = Aggregator::new();
        agg.fold(chunk_with(0, vec![section("a", &[1], 5)]));
        agg.fold(chunk_with(1, vec![section("b", &[11], 5)]));
        let doc = agg.finish(20);
        assert_eq!(doc.lecture_title, "Title from chunk 0");
        assert_eq!(doc.total_pages, 20);
    }

    #[test]
    fn test_fold_merges_boundary_spanning_section() {
        let mut agg = Aggregator::new();
        agg.fold(chunk_with(0, vec![section("span", &[9, 10], 4)]));
        agg.fold(chunk_with(1, vec![section("span", &[11], 8)]));
        let doc = agg.finish(20);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].pages, vec![9, 10, 11]);
        assert_eq!(doc.sections[0].priority, 8);
    }

    #[test]
    fn test_fold_order_independent_over_content() {
        let a = chunk_with(0, vec![section("x", &[1], 3), section("y", &[2], 6)]);
        let b = chunk_with(1, vec![section("x", &[3], 7)]);
        let c = chunk_with(2, vec![section("z", &[4], 5)]);

        let mut incremental = Aggregator::new();
        incremental.fold(a.clone());
        incremental.fold(b.clone());
        incremental.fold(c.clone());

        let mut batched = Aggregator::new();
        batched.fold(a);
        let mut rest = Aggregator::new();
        rest.fold(b);
        rest.fold(c);
        for s in rest.finish(10).sections {
            batched.fold(chunk_with(9, vec![s]));
        }

        let left = incremental.finish(10);
        let right = batched.finish(10);
        assert_eq!(left.sections, right.sections);
    }

    #[test]
    fn test_finish_prunes_dangling_dependencies() {
        let mut agg = Aggregator::new();
        let mut s = section("a", &[1], 5);
        s.dependencies = vec!["ghost".to_string(), "b".to_string()];
        agg.fold(chunk_with(0, vec![s, section("b", &[2], 5)]));
        let doc = agg.finish(5);
        assert_eq!(doc.section("a").unwrap().dependencies, vec!["b"]);
    }

    #[test]
    fn test_analysis_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lecture.analysis.json");

        let mut agg = Aggregator::new();
        agg.fold(chunk_with(0, vec![section("a", &[1], 5)]));
        let analysis = agg.finish(3);

        save_analysis(&analysis, &path).unwrap();
        let loaded = load_analysis(&path).unwrap();
        assert_eq!(loaded.lecture_title, analysis.lecture_title);
        assert_eq!(loaded.sections, analysis.sections);
        assert!(loaded.metadata.contains_key("analyzed_at"));
    }

    #[test]
    fn test_cached_analysis_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("lecture.pdf");
        std::fs::write(analysis_path(&pdf), "not json").unwrap();
        assert!(load_cached_analysis(&pdf).is_none());
    }

    #[test]
    fn test_analysis_path_extension() {
        assert_eq!(
            analysis_path(Path::new("/tmp/week3.pdf")),
            PathBuf::from("/tmp/week3.analysis.json")
        );
    }
}
