//! Import consolidation for generated code cells.
//!
//! Generated sections each tend to re-import what they need. This pass
//! hoists every top-level import into one leading code cell so the notebook
//! reads like a human wrote it. Only unindented `import ...` / `from ...
//! import ...` lines qualify; an indented import inside a function body is
//! scoped on purpose and stays put.

use crate::models::{Cell, CellKind};

/// True for an import statement at column zero.
fn is_import_line(line: &str) -> bool {
    line.starts_with("import ")
        || (line.starts_with("from ") && line.contains(" import "))
}

/// Hoist top-level imports out of code cells into one cell at position
/// zero: deduplicated by exact text, sorted lexicographically. Cells left
/// empty by the extraction are dropped. Idempotent, and a no-op when no
/// imports exist.
#[must_use]
pub fn consolidate_imports(cells: &[Cell]) -> Vec<Cell> {
    let mut imports: Vec<String> = Vec::new();
    let mut out: Vec<Cell> = Vec::new();

    for cell in cells {
        if cell.kind != CellKind::Code {
            out.push(cell.clone());
            continue;
        }

        let mut kept: Vec<&str> = Vec::new();
        for line in cell.content.lines() {
            if is_import_line(line) {
                if !imports.iter().any(|i| i == line) {
                    imports.push(line.to_string());
                }
            } else {
                kept.push(line);
            }
        }

        // Removing a leading import block leaves blank padding behind.
        while kept.first().is_some_and(|l| l.trim().is_empty()) {
            kept.remove(0);
        }
        if kept.iter().any(|l| !l.trim().is_empty()) {
            out.push(Cell::code(kept.join("\n")));
        }
    }

    if imports.is_empty() {
        return cells.to_vec();
    }

    imports.sort();
    out.insert(0, Cell::code(imports.join("\n")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imports_hoisted_sorted_and_deduped() {
        let cells = vec![
            Cell::markdown("intro"),
            Cell::code("import numpy as np\n\nx = np.zeros(3)"),
            Cell::code("import math\nimport numpy as np\ny = math.pi"),
        ];
        let out = consolidate_imports(&cells);
        assert_eq!(out[0], Cell::code("import math\nimport numpy as np"));
        assert_eq!(out[1], Cell::markdown("intro"));
        assert_eq!(out[2], Cell::code("x = np.zeros(3)"));
        assert_eq!(out[3], Cell::code("y = math.pi"));
    }

    #[test]
    fn test_from_imports_qualify() {
        let cells = vec![Cell::code("from pathlib import Path\np = Path('.')")];
        let out = consolidate_imports(&cells);
        assert_eq!(out[0], Cell::code("from pathlib import Path"));
        assert_eq!(out[1], Cell::code("p = Path('.')"));
    }

    #[test]
    fn test_indented_imports_stay_put() {
        let body = "def lazy():\n    import json\n    return json";
        let cells = vec![Cell::code(body)];
        let out = consolidate_imports(&cells);
        assert_eq!(out, cells);
    }

    #[test]
    fn test_cell_emptied_by_extraction_is_dropped() {
        let cells = vec![
            Cell::code("import os\nimport sys"),
            Cell::code("print(os.name)"),
        ];
        let out = consolidate_imports(&cells);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Cell::code("import os\nimport sys"));
        assert_eq!(out[1], Cell::code("print(os.name)"));
    }

    #[test]
    fn test_no_imports_returns_input_unchanged() {
        let cells = vec![Cell::markdown("note"), Cell::code("x = 1")];
        assert_eq!(consolidate_imports(&cells), cells);
    }

    #[test]
    fn test_idempotent() {
        let cells = vec![
            Cell::markdown("intro"),
            Cell::code("import b\nimport a\n\nwork(a, b)"),
        ];
        let once = consolidate_imports(&cells);
        let twice = consolidate_imports(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_import_order_preserved() {
        let cells = vec![Cell::code("import z\nfirst()\nsecond()")];
        let out = consolidate_imports(&cells);
        assert_eq!(out[1], Cell::code("first()\nsecond()"));
    }
}
