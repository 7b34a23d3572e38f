pub mod locator;
pub mod workbook;

pub use locator::{CellRef, Location, ReportWriter, WriteError, WriteMode};
pub use workbook::{Cell, CellValue, Page, Workbook, WorkbookError};
