use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use topline_core::{Period, PeriodRange};

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid workbook {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Duplicate page name: {0}")]
    DuplicatePage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Number(Decimal),
    Text(String),
    Date(NaiveDate),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => write!(f, "<empty>"),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "'{s}'"),
            CellValue::Date(d) => write!(f, "{d}"),
        }
    }
}

impl CellValue {
    /// The numeric reading of the cell: numbers, and text that parses as one.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => Decimal::from_str(s.trim().replace(',', "").as_str()).ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The month a header cell stands for: a date, or text such as `Aug 2017`.
    pub fn as_period(&self) -> Option<Period> {
        match self {
            CellValue::Date(d) => Some(Period::of(*d)),
            CellValue::Text(s) => NaiveDate::parse_from_str(&format!("01 {}", s.trim()), "%d %b %Y")
                .ok()
                .map(Period::of),
            _ => None,
        }
    }

    /// Empty, zero, whitespace or one of the `placeholders`.
    pub fn is_blank(&self, placeholders: &[String]) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => n.is_zero(),
            CellValue::Text(s) => {
                let s = s.trim();
                s.is_empty()
                    || placeholders.iter().any(|p| p.trim() == s)
                    || self.as_number().is_some_and(|n| n.is_zero())
            }
            CellValue::Date(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: CellValue,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

/// One named grid of cells. Period pages declare the months they cover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PageFile", into = "PageFile")]
pub struct Page {
    pub name: String,
    pub coverage: Option<PeriodRange>,
    cells: BTreeMap<(u32, u32), Cell>,
}

static EMPTY: CellValue = CellValue::Empty;

impl Page {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_coverage(mut self, coverage: PeriodRange) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn value(&self, row: u32, col: u32) -> &CellValue {
        self.cell(row, col).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    pub fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        self.cells.entry((row, col)).or_default()
    }

    pub fn set(&mut self, row: u32, col: u32, value: CellValue) -> &mut Self {
        self.cell_mut(row, col).value = value;
        self
    }

    pub fn lock(&mut self, row: u32, col: u32) -> &mut Self {
        self.cell_mut(row, col).locked = true;
        self
    }

    /// Populated cells of one row, left to right.
    pub fn row(&self, row: u32) -> impl Iterator<Item = (u32, &Cell)> {
        self.cells
            .range((row, 0)..=(row, u32::MAX))
            .map(|(&(_, col), cell)| (col, cell))
    }
}

#[derive(Serialize, Deserialize)]
struct PageFile {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coverage: Option<PeriodRange>,
    #[serde(default)]
    cells: Vec<CellEntry>,
}

#[derive(Serialize, Deserialize)]
struct CellEntry {
    row: u32,
    col: u32,
    #[serde(default)]
    value: CellValue,
    #[serde(default)]
    locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotation: Option<String>,
}

impl From<PageFile> for Page {
    fn from(file: PageFile) -> Self {
        Page {
            name: file.name,
            coverage: file.coverage,
            cells: file
                .cells
                .into_iter()
                .map(|e| {
                    let cell = Cell {
                        value: e.value,
                        locked: e.locked,
                        annotation: e.annotation,
                    };
                    ((e.row, e.col), cell)
                })
                .collect(),
        }
    }
}

impl From<Page> for PageFile {
    fn from(page: Page) -> Self {
        PageFile {
            name: page.name,
            coverage: page.coverage,
            cells: page
                .cells
                .into_iter()
                .filter(|(_, cell)| *cell != Cell::default())
                .map(|((row, col), cell)| CellEntry {
                    row,
                    col,
                    value: cell.value,
                    locked: cell.locked,
                    annotation: cell.annotation,
                })
                .collect(),
        }
    }
}

/// The tabular report, held in memory for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pages: Vec<Page>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        let content = std::fs::read_to_string(path).map_err(|source| WorkbookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let workbook: Workbook =
            serde_json::from_str(&content).map_err(|source| WorkbookError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = workbook.pages.iter().find(|p| !seen.insert(p.name.as_str())) {
            return Err(WorkbookError::DuplicatePage(dup.name.clone()));
        }
        tracing::debug!("Opened workbook {} ({} pages)", path.display(), workbook.pages.len());
        Ok(workbook)
    }

    pub fn add_page(&mut self, page: Page) -> Result<&mut Page, WorkbookError> {
        if self.page(&page.name).is_some() {
            return Err(WorkbookError::DuplicatePage(page.name));
        }
        self.pages.push(page);
        let last = self.pages.len() - 1;
        Ok(&mut self.pages[last])
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, name: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.name == name)
    }

    pub fn page_mut(&mut self, name: &str) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.name == name)
    }

    pub fn save(&self, path: &Path) -> Result<(), WorkbookError> {
        let io = |source| WorkbookError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| WorkbookError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, path).map_err(io)
    }

    /// Saves to `output`, or drops the run's changes when there is none.
    pub fn close(self, output: Option<&Path>) -> Result<(), WorkbookError> {
        match output {
            Some(path) => {
                self.save(path)?;
                tracing::info!("Report saved to {}", path.display());
            }
            None => tracing::info!("No report output configured, changes discarded"),
        }
        Ok(())
    }
}
