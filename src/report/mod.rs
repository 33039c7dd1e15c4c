//! In-memory workbook assembled by the coordinator and persisted as one
//! CSV artifact, one `#`-titled section per concurrency level.

mod sheet;

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;

use crate::Result;

pub use sheet::add_level_sheet;

/// A sparse grid of string cells. Rows and columns grow on demand;
/// untouched cells render as empty fields.
#[derive(Debug, Default)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize_with(col + 1, String::new);
        }
        cells[col] = value.into();
    }

    pub fn get(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Ordered collection of named sheets plus artifact metadata.
pub struct Workbook {
    title: String,
    sheets: IndexMap<String, Sheet>,
}

impl Workbook {
    pub fn new(title: impl Into<String>) -> Self {
        Workbook {
            title: title.into(),
            sheets: IndexMap::new(),
        }
    }

    /// Create (or reopen) a named sheet and hand out the grid to fill in.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut Sheet {
        self.sheets.entry(name.into()).or_default()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    /// Render the whole workbook to CSV text: a comment header, then each
    /// sheet as a `# {name}` section.
    pub fn render_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("# {}\n", self.title));
        output.push_str(&format!(
            "# Generated: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push('\n');

        for (name, sheet) in &self.sheets {
            output.push_str(&format!("# {}\n", name));
            for row in sheet.rows() {
                let line: Vec<Cow<str>> = row.iter().map(|cell| escape_cell(cell)).collect();
                output.push_str(&line.join(","));
                output.push('\n');
            }
            output.push('\n');
        }

        output
    }

    /// Persist the rendered artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render_csv())?;
        Ok(())
    }
}

/// Quote a cell only when CSV needs it, doubling embedded quotes.
fn escape_cell(s: &str) -> Cow<str> {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}
