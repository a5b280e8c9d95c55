//! Percent-format cell protocol: parsing and rendering.
//!
//! Generation replies arrive as percent-formatted text: an alternating
//! sequence of blocks, each introduced by a marker line (`# %% [markdown]`
//! or `# %%`, case-insensitive, trailing whitespace tolerated). Markdown
//! content lines carry a `# ` prefix that is stripped on parse; a bare `#`
//! stands for an empty line. The whole reply may be wrapped once in an
//! outer code fence, which is stripped before scanning.
//!
//! The scanner is a small finite-state machine over line classes, with the
//! transition function ([`transition`]) separated from I/O so it can be
//! tested directly. Parsing never fails: a reply with no recognizable
//! marker yields a single diagnostic markdown cell so one malformed
//! response cannot block a whole run.

pub mod imports;

use crate::models::{Cell, CellKind};

const MARKDOWN_MARKER: &str = "# %% [markdown]";
const CODE_MARKER: &str = "# %%";

/// Diagnostic cell substituted when a reply contains no recognizable
/// markers.
const UNPARSEABLE_NOTICE: &str = "# Error\n\nFailed to parse notebook content.\n\n\
Expected percent-formatted Python with `# %%` markers.";

/// Scanner state: what kind of block the cursor is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Before the first marker; content lines are discarded
    Seeking,
    /// Inside a markdown block
    InMarkdown,
    /// Inside a code block
    InCode,
}

/// Classification of one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// `# %% [markdown]`
    MarkdownMarker,
    /// `# %%`
    CodeMarker,
    /// Anything else
    Content,
}

/// What the scanner does with the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Flush the pending buffer as a completed cell, then start a new block
    Flush,
    /// Append the line to the pending buffer
    Append,
    /// Drop the line (content before any marker)
    Discard,
}

/// Classify one line. Markers tolerate case variation and surrounding
/// whitespace but nothing else.
#[must_use]
pub fn classify(line: &str) -> LineClass {
    let trimmed = line.trim().to_lowercase();
    if trimmed == MARKDOWN_MARKER {
        LineClass::MarkdownMarker
    } else if trimmed == CODE_MARKER {
        LineClass::CodeMarker
    } else {
        LineClass::Content
    }
}

/// The scanner's transition function: next state plus the action to take.
#[must_use]
pub const fn transition(state: State, class: LineClass) -> (State, Action) {
    match (state, class) {
        (_, LineClass::MarkdownMarker) => (State::InMarkdown, Action::Flush),
        (_, LineClass::CodeMarker) => (State::InCode, Action::Flush),
        (State::Seeking, LineClass::Content) => (State::Seeking, Action::Discard),
        (state, LineClass::Content) => (state, Action::Append),
    }
}

/// Parse a generation reply into an ordered cell list.
///
/// Never fails; marker-free input produces exactly one diagnostic markdown
/// cell.
#[must_use]
pub fn parse_cells(reply: &str) -> Vec<Cell> {
    let body = strip_outer_fence(reply.trim());

    let mut state = State::Seeking;
    let mut buffer: Vec<String> = Vec::new();
    let mut cells: Vec<Cell> = Vec::new();

    for line in body.lines() {
        let class = classify(line);
        let (next, action) = transition(state, class);
        match action {
            Action::Flush => {
                flush(state, &mut buffer, &mut cells);
                state = next;
            }
            Action::Append => buffer.push(content_line(state, line)),
            Action::Discard => {}
        }
    }
    flush(state, &mut buffer, &mut cells);

    if cells.is_empty() {
        cells.push(Cell::markdown(UNPARSEABLE_NOTICE));
    }
    cells
}

/// Render cells back into percent-format text. Inverse of [`parse_cells`]
/// for well-formed cell lists.
#[must_use]
pub fn render_cells(cells: &[Cell]) -> String {
    let mut blocks = Vec::with_capacity(cells.len());
    for cell in cells {
        let mut lines = Vec::new();
        match cell.kind {
            CellKind::Markdown => {
                lines.push(MARKDOWN_MARKER.to_string());
                for line in cell.content.lines() {
                    if line.is_empty() {
                        lines.push("#".to_string());
                    } else {
                        lines.push(format!("# {line}"));
                    }
                }
            }
            CellKind::Code => {
                lines.push(CODE_MARKER.to_string());
                lines.extend(cell.content.lines().map(ToString::to_string));
            }
        }
        blocks.push(lines.join("\n"));
    }
    blocks.join("\n\n")
}

fn flush(state: State, buffer: &mut Vec<String>, cells: &mut Vec<Cell>) {
    // Blank padding around a block is formatting noise, not content.
    let start = buffer.iter().position(|l| !l.trim().is_empty());
    let Some(start) = start else {
        buffer.clear();
        return;
    };
    let end = buffer.iter().rposition(|l| !l.trim().is_empty()).unwrap_or(start);
    let content = buffer[start..=end].join("\n");
    buffer.clear();

    match state {
        State::Seeking => {}
        State::InMarkdown => cells.push(Cell::markdown(content)),
        State::InCode => cells.push(Cell::code(content)),
    }
}

fn content_line(state: State, line: &str) -> String {
    if state == State::InMarkdown {
        if let Some(stripped) = line.strip_prefix("# ") {
            return stripped.to_string();
        }
        if line.trim_end() == "#" {
            return String::new();
        }
    }
    line.to_string()
}

/// Strip one outer code fence wrapping the cells, if present.
///
/// The fence does not have to open the reply: leading prose before it is
/// part of the wrapper and goes too. A closing fence that is not the last
/// thing in the reply is treated as content, not a wrapper.
fn strip_outer_fence(text: &str) -> &str {
    // Only fences opening a line can be wrappers; a ``` embedded in cell
    // content stays where it is.
    let mut fences = text
        .match_indices("```")
        .map(|(i, _)| i)
        .filter(|&i| i == 0 || text.as_bytes()[i - 1] == b'\n');
    let Some(open) = fences.next() else {
        return text;
    };
    let Some(close) = fences.last() else {
        return text;
    };
    let Some(rel_newline) = text[open..].find('\n') else {
        return text;
    };
    let body_start = open + rel_newline + 1;
    if close < body_start || !text[close + 3..].trim().is_empty() {
        return text;
    }
    text[body_start..close].trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(
            transition(State::Seeking, LineClass::MarkdownMarker),
            (State::InMarkdown, Action::Flush)
        );
        assert_eq!(
            transition(State::InMarkdown, LineClass::CodeMarker),
            (State::InCode, Action::Flush)
        );
        assert_eq!(
            transition(State::Seeking, LineClass::Content),
            (State::Seeking, Action::Discard)
        );
        assert_eq!(
            transition(State::InCode, LineClass::Content),
            (State::InCode, Action::Append)
        );
    }

    #[test]
    fn test_classify_tolerates_case_and_whitespace() {
        assert_eq!(classify("# %% [markdown]"), LineClass::MarkdownMarker);
        assert_eq!(classify("# %% [MARKDOWN]  "), LineClass::MarkdownMarker);
        assert_eq!(classify("# %%"), LineClass::CodeMarker);
        assert_eq!(classify("# %%   "), LineClass::CodeMarker);
        assert_eq!(classify("  # %%"), LineClass::CodeMarker);
        assert_eq!(classify("\t# %% [markdown]"), LineClass::MarkdownMarker);
        assert_eq!(classify("# %% something"), LineClass::Content);
        assert_eq!(classify("x = 1"), LineClass::Content);
    }

    #[test]
    fn test_indented_marker_opens_a_cell() {
        let cells = parse_cells("  # %%\nx = 1");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0], Cell::code("x = 1"));
    }

    #[test]
    fn test_parse_alternating_blocks() {
        let reply = "\
# %% [markdown]
# ## Gradient Descent
#
# The update rule in one line.

# %%
w = w - lr * grad
print(w)
";
        let cells = parse_cells(reply);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].kind, CellKind::Markdown);
        assert_eq!(
            cells[0].content,
            "## Gradient Descent\n\nThe update rule in one line."
        );
        assert_eq!(cells[1].kind, CellKind::Code);
        assert_eq!(cells[1].content, "w = w - lr * grad\nprint(w)");
    }

    #[test]
    fn test_parse_strips_outer_fence() {
        let reply = "```python\n# %%\nx = 1\n```";
        let cells = parse_cells(reply);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].content, "x = 1");
    }

    #[test]
    fn test_parse_strips_fence_after_preamble_prose() {
        let reply = "Sure, here's the notebook:\n```python\n# %%\nx = 1\n```";
        let cells = parse_cells(reply);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0], Cell::code("x = 1"));
    }

    #[test]
    fn test_embedded_fence_is_not_a_wrapper() {
        let reply = "# %% [markdown]\n# An example:\n# ```\n# code\n# ```";
        let cells = parse_cells(reply);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].content, "An example:\n```\ncode\n```");
    }

    #[test]
    fn test_parse_discards_preamble_prose() {
        let reply = "Sure! Here are the cells:\n\n# %%\nx = 1";
        let cells = parse_cells(reply);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].kind, CellKind::Code);
    }

    #[test]
    fn test_no_markers_yields_single_diagnostic_cell() {
        let cells = parse_cells("just some prose without any markers");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].kind, CellKind::Markdown);
        assert!(cells[0].content.contains("Failed to parse"));
    }

    #[test]
    fn test_empty_blocks_are_skipped() {
        let reply = "# %%\n\n# %% [markdown]\n# real content";
        let cells = parse_cells(reply);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].content, "real content");
    }

    #[test]
    fn test_round_trip() {
        let cells = vec![
            Cell::markdown("## Title\n\nSome prose."),
            Cell::code("import math\n\nprint(math.pi)"),
            Cell::markdown("Closing note."),
        ];
        let rendered = render_cells(&cells);
        assert_eq!(parse_cells(&rendered), cells);
    }

    #[test]
    fn test_render_prefixes_markdown_lines() {
        let rendered = render_cells(&[Cell::markdown("a\n\nb")]);
        assert_eq!(rendered, "# %% [markdown]\n# a\n#\n# b");
    }
}
