use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;
use topline_core::{
    normalize_handle, AccountNumber, ContributorDirectory, Money, Period, ReportLayout,
    ResolvedTransaction, TransactionType,
};

use crate::workbook::{CellValue, Page, Workbook};

/// How a write treats a cell that already holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail on any populated cell.
    Strict,
    /// Sum onto a numeric value and append to its annotation.
    Additive,
    /// Replace the value. Only used for account balances.
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRef {
    pub page: String,
    pub row: u32,
    pub col: u32,
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'!R{}C{}", self.page, self.row, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("No report page covers {0}")]
    NoMatchingReportPage(Period),
    #[error("Several report pages cover {period}: {}", .pages.join(", "))]
    AmbiguousReportPage { period: Period, pages: Vec<String> },
    #[error("Page '{page}' has no column for {period}")]
    NoMatchingColumn { page: String, period: Period },
    #[error("Handle {0} is not on the report roster")]
    NotInRoster(String),
    #[error("No free row for account {account} on page '{page}'")]
    NoFreeRow { page: String, account: AccountNumber },
    #[error("Cell {0} is locked")]
    CellLocked(CellRef),
    #[error("Cell {cell} already holds {existing}")]
    CellConflict { cell: CellRef, existing: CellValue },
    #[error("Report has no page named '{0}'")]
    MissingPage(String),
    #[error("{0} transactions have no place in the report")]
    NotReportable(TransactionType),
}

/// Where a transaction lands, plus the row label to fill in when the row
/// was newly claimed for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub cell: CellRef,
    pub label: Option<(u32, CellValue)>,
}

/// Maps reconciled transactions to report cells and writes them.
#[derive(Debug, Clone, Default)]
pub struct ReportWriter {
    layout: ReportLayout,
}

impl ReportWriter {
    pub fn new(layout: ReportLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    pub fn locate(
        &self,
        workbook: &Workbook,
        resolved: &ResolvedTransaction,
        directory: &ContributorDirectory,
    ) -> Result<Location, WriteError> {
        let period = match (resolved.kind, resolved.period) {
            (TransactionType::Unknown, _) | (_, None) => {
                return Err(WriteError::NotReportable(resolved.kind))
            }
            (_, Some(period)) => period,
        };

        let page = self.page_for(workbook, period)?;
        let col = self.column_for(page, period)?;
        let layout = &self.layout;

        let (row, label) = match resolved.kind {
            TransactionType::Contribution => {
                let attribution = resolved
                    .attribution
                    .as_ref()
                    .ok_or(WriteError::NotReportable(resolved.kind))?;
                let handles: Vec<String> = match directory.get(attribution.contributor) {
                    Some(c) => c.handles().map(normalize_handle).collect(),
                    None => vec![normalize_handle(&attribution.handle)],
                };
                let ordinal = self
                    .roster(workbook)?
                    .iter()
                    .position(|h| !h.is_empty() && handles.contains(h))
                    .ok_or_else(|| WriteError::NotInRoster(attribution.handle.clone()))?;
                (layout.contribution_base_row + ordinal as u32 + 1, None)
            }
            TransactionType::Roi => self.account_row(
                page,
                layout.roi_label_column,
                layout.roi_rows,
                resolved.raw.account,
            )?,
            TransactionType::Expense => (layout.expense_row, None),
            TransactionType::Unknown => return Err(WriteError::NotReportable(resolved.kind)),
        };

        Ok(Location {
            cell: CellRef {
                page: page.name.clone(),
                row,
                col,
            },
            label,
        })
    }

    /// Locates the transaction's cell and writes its amount there.
    pub fn locate_and_write(
        &self,
        workbook: &mut Workbook,
        resolved: &ResolvedTransaction,
        directory: &ContributorDirectory,
        mode: WriteMode,
    ) -> Result<CellRef, WriteError> {
        let location = self.locate(workbook, resolved, directory)?;
        self.write_cell(
            workbook,
            &location.cell,
            resolved.raw.amount.as_decimal(),
            Some(&resolved.annotation()),
            mode,
        )?;
        if let Some((col, label)) = location.label {
            self.page_mut(workbook, &location.cell.page)?
                .set(location.cell.row, col, label);
        }
        Ok(location.cell)
    }

    /// Applies the write policy to one cell. A failed write leaves the cell
    /// exactly as it was.
    pub fn write_cell(
        &self,
        workbook: &mut Workbook,
        target: &CellRef,
        amount: Decimal,
        annotation: Option<&str>,
        mode: WriteMode,
    ) -> Result<(), WriteError> {
        let placeholders = &self.layout.placeholders;
        let cell = self.page_mut(workbook, &target.page)?.cell_mut(target.row, target.col);

        if cell.locked {
            return Err(WriteError::CellLocked(target.clone()));
        }

        let conflict = |existing: &CellValue| WriteError::CellConflict {
            cell: target.clone(),
            existing: existing.clone(),
        };

        if cell.value.is_blank(placeholders) || mode == WriteMode::Overwrite {
            cell.value = CellValue::Number(amount);
            if let Some(note) = annotation {
                cell.annotation = Some(note.to_string());
            }
        } else if mode == WriteMode::Additive {
            let existing = cell.value.as_number().ok_or_else(|| conflict(&cell.value))?;
            cell.value = CellValue::Number(existing + amount);
            if let Some(note) = annotation {
                cell.annotation = Some(match cell.annotation.take() {
                    Some(previous) if !previous.is_empty() => format!("{previous}\n{note}"),
                    _ => note.to_string(),
                });
            }
        } else {
            return Err(conflict(&cell.value));
        }

        tracing::debug!(cell = %target, value = %cell.value, ?mode, "report cell written");
        Ok(())
    }

    /// Writes an account's balance into the summary page's balance section.
    pub fn update_account_balance(
        &self,
        workbook: &mut Workbook,
        account: AccountNumber,
        balance: Money,
    ) -> Result<CellRef, WriteError> {
        let layout = &self.layout;
        let summary = self.summary(workbook)?;
        let (row, label) = self.account_row(
            summary,
            layout.balance_label_column,
            layout.balance_rows,
            account,
        )?;
        let target = CellRef {
            page: summary.name.clone(),
            row,
            col: layout.balance_value_column,
        };

        self.write_cell(workbook, &target, balance.as_decimal(), None, WriteMode::Overwrite)?;
        if let Some((col, label)) = label {
            self.page_mut(workbook, &target.page)?.set(row, col, label);
        }
        Ok(target)
    }

    fn page_for<'w>(&self, workbook: &'w Workbook, period: Period) -> Result<&'w Page, WriteError> {
        let mut matching = workbook
            .pages()
            .iter()
            .filter(|p| p.coverage.is_some_and(|c| c.contains(period)));
        match (matching.next(), matching.next()) {
            (Some(page), None) => Ok(page),
            (None, _) => Err(WriteError::NoMatchingReportPage(period)),
            (Some(first), Some(second)) => {
                let mut pages = vec![first.name.clone(), second.name.clone()];
                pages.extend(matching.map(|p| p.name.clone()));
                Err(WriteError::AmbiguousReportPage { period, pages })
            }
        }
    }

    fn column_for(&self, page: &Page, period: Period) -> Result<u32, WriteError> {
        page.row(self.layout.header_row)
            .find(|(_, cell)| cell.value.as_period() == Some(period))
            .map(|(col, _)| col)
            .ok_or_else(|| WriteError::NoMatchingColumn {
                page: page.name.clone(),
                period,
            })
    }

    /// Normalized handles of the summary roster, one per roster row. Empty
    /// rows keep their place so positions stay aligned with period pages.
    pub fn roster(&self, workbook: &Workbook) -> Result<Vec<String>, WriteError> {
        let layout = &self.layout;
        let summary = self.summary(workbook)?;
        let [first, last] = layout.roster_rows;
        Ok((first..=last)
            .map(|row| match summary.value(row, layout.roster_column) {
                CellValue::Text(s) => normalize_handle(s),
                _ => String::new(),
            })
            .collect())
    }

    /// The row in `rows` labelled with `account`, or the first blank one
    /// together with the label it needs.
    fn account_row(
        &self,
        page: &Page,
        label_col: u32,
        [first, last]: [u32; 2],
        account: AccountNumber,
    ) -> Result<(u32, Option<(u32, CellValue)>), WriteError> {
        let is_account = |value: &CellValue| match value {
            CellValue::Number(n) => *n == Decimal::from(account.0),
            CellValue::Text(s) => s.trim() == account.to_string(),
            _ => false,
        };

        if let Some(row) = (first..=last).find(|&r| is_account(page.value(r, label_col))) {
            return Ok((row, None));
        }
        (first..=last)
            .find(|&r| page.value(r, label_col).is_blank(&self.layout.placeholders))
            .map(|row| (row, Some((label_col, CellValue::Number(Decimal::from(account.0))))))
            .ok_or_else(|| WriteError::NoFreeRow {
                page: page.name.clone(),
                account,
            })
    }

    fn summary<'w>(&self, workbook: &'w Workbook) -> Result<&'w Page, WriteError> {
        let name = &self.layout.summary_page;
        workbook
            .page(name)
            .ok_or_else(|| WriteError::MissingPage(name.clone()))
    }

    fn page_mut<'w>(&self, workbook: &'w mut Workbook, name: &str) -> Result<&'w mut Page, WriteError> {
        workbook
            .page_mut(name)
            .ok_or_else(|| WriteError::MissingPage(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use topline_core::{
        Attribution, Contributor, ContributorId, PeriodRange, RawTransaction,
    };

    const ACCOUNT: AccountNumber = AccountNumber(62000000001);

    fn period(month: u32, year: i32) -> Period {
        Period::new(month, year).unwrap()
    }

    fn directory() -> ContributorDirectory {
        ContributorDirectory::new(vec![
            Contributor::new(1, "Topline", "TIG").house(),
            Contributor::new(2, "Anna Adams", "AA"),
            Contributor::new(3, "Ben Botha", "BB").with_alternate("BEN"),
        ])
    }

    /// Summary roster AA, BB; one page per financial year Aug-Jul with
    /// the month header on row 1 starting at column 2.
    fn workbook() -> Workbook {
        let mut workbook = Workbook::new();
        let summary = workbook.add_page(Page::new("Summary")).unwrap();
        summary
            .set(3, 1, CellValue::Text("AA".into()))
            .set(4, 1, CellValue::Text("BB".into()));

        for start in [2017, 2018] {
            let coverage = PeriodRange::new(period(8, start), period(7, start + 1));
            let page = workbook
                .add_page(Page::new(&format!("FY{}", start + 1)).with_coverage(coverage))
                .unwrap();
            for i in 0..12u32 {
                let month = (7 + i) % 12 + 1;
                let year = if month >= 8 { start } else { start + 1 };
                let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
                page.set(1, 2 + i, CellValue::Date(first));
            }
        }
        workbook
    }

    fn transaction(kind: TransactionType, handle: Option<(i64, &str)>, p: Period, cents: i64) -> ResolvedTransaction {
        ResolvedTransaction {
            raw: RawTransaction {
                account: ACCOUNT,
                date: p.first_day().unwrap(),
                description: "FNB APP PAYMENT".to_string(),
                reference: "REF".to_string(),
                fee: String::new(),
                amount: Money::from_cents(cents),
                balance: Money::zero(),
            },
            kind,
            attribution: handle.map(|(id, h)| Attribution {
                contributor: ContributorId(id),
                handle: h.to_string(),
            }),
            period: Some(p),
            rejection: None,
        }
    }

    fn writer() -> ReportWriter {
        ReportWriter::new(ReportLayout::default())
    }

    #[test]
    fn contribution_lands_on_roster_row_and_month_column() {
        let workbook = workbook();
        let t = transaction(TransactionType::Contribution, Some((3, "BB")), period(9, 2017), 100000);
        let location = writer().locate(&workbook, &t, &directory()).unwrap();
        assert_eq!(location.cell.page, "FY2018");
        assert_eq!(location.cell.row, 4);
        assert_eq!(location.cell.col, 3);
        assert!(location.label.is_none());
    }

    #[test]
    fn alternate_handle_on_roster_is_found() {
        let mut workbook = workbook();
        workbook
            .page_mut("Summary")
            .unwrap()
            .set(4, 1, CellValue::Text("ben".into()));
        let t = transaction(TransactionType::Contribution, Some((3, "BB")), period(9, 2017), 100000);
        assert_eq!(writer().locate(&workbook, &t, &directory()).unwrap().cell.row, 4);
    }

    #[test]
    fn period_outside_every_page_fails() {
        let t = transaction(TransactionType::Contribution, Some((2, "AA")), period(1, 2030), 1);
        assert_eq!(
            writer().locate(&workbook(), &t, &directory()).unwrap_err(),
            WriteError::NoMatchingReportPage(period(1, 2030))
        );
    }

    #[test]
    fn overlapping_pages_are_ambiguous() {
        let mut workbook = workbook();
        workbook
            .add_page(Page::new("Extra").with_coverage(PeriodRange::new(period(1, 2018), period(12, 2018))))
            .unwrap();
        let t = transaction(TransactionType::Contribution, Some((2, "AA")), period(3, 2018), 1);
        assert!(matches!(
            writer().locate(&workbook, &t, &directory()),
            Err(WriteError::AmbiguousReportPage { .. })
        ));
    }

    #[test]
    fn missing_header_column_fails() {
        let mut workbook = workbook();
        workbook.page_mut("FY2018").unwrap().set(1, 3, CellValue::Empty);
        let t = transaction(TransactionType::Contribution, Some((2, "AA")), period(9, 2017), 1);
        assert!(matches!(
            writer().locate(&workbook, &t, &directory()),
            Err(WriteError::NoMatchingColumn { .. })
        ));
    }

    #[test]
    fn contributor_missing_from_roster_fails() {
        let directory = ContributorDirectory::new(vec![Contributor::new(9, "Cara Cole", "CC")]);
        let t = transaction(TransactionType::Contribution, Some((9, "CC")), period(9, 2017), 1);
        assert_eq!(
            writer().locate(&workbook(), &t, &directory).unwrap_err(),
            WriteError::NotInRoster("CC".to_string())
        );
    }

    #[test]
    fn roi_claims_first_free_row_then_reuses_it() {
        let mut workbook = workbook();
        let w = writer();
        let t = transaction(TransactionType::Roi, Some((1, "TIG")), period(9, 2017), 4512);

        let first = w
            .locate_and_write(&mut workbook, &t, &directory(), WriteMode::Additive)
            .unwrap();
        assert_eq!(first.row, 40);
        let page = workbook.page("FY2018").unwrap();
        assert_eq!(page.value(40, 1), &CellValue::Number(Decimal::from(ACCOUNT.0)));

        let t = transaction(TransactionType::Roi, Some((1, "TIG")), period(10, 2017), 3000);
        let second = w
            .locate_and_write(&mut workbook, &t, &directory(), WriteMode::Additive)
            .unwrap();
        assert_eq!(second.row, 40);
        assert_eq!(second.col, 4);
    }

    #[test]
    fn roi_section_full_fails() {
        let mut workbook = workbook();
        let page = workbook.page_mut("FY2018").unwrap();
        for row in 40..=45 {
            page.set(row, 1, CellValue::Text(format!("{row}")));
        }
        let t = transaction(TransactionType::Roi, Some((1, "TIG")), period(9, 2017), 1);
        assert!(matches!(
            writer().locate(&workbook, &t, &directory()),
            Err(WriteError::NoFreeRow { .. })
        ));
    }

    #[test]
    fn expense_uses_fixed_row() {
        let t = transaction(TransactionType::Expense, Some((1, "TIG")), period(7, 2019), -6900);
        let location = writer().locate(&workbook(), &t, &directory()).unwrap();
        assert_eq!(location.cell.page, "FY2019");
        assert_eq!(location.cell.row, 48);
        assert_eq!(location.cell.col, 13);
    }

    #[test]
    fn unknown_is_not_reportable() {
        let t = transaction(TransactionType::Unknown, None, period(9, 2017), 1);
        assert!(matches!(
            writer().locate(&workbook(), &t, &directory()),
            Err(WriteError::NotReportable(TransactionType::Unknown))
        ));
    }

    // ── write policy ─────────────────────────────────────────────────────────

    fn target() -> CellRef {
        CellRef {
            page: "FY2018".to_string(),
            row: 3,
            col: 2,
        }
    }

    fn populated() -> Workbook {
        let mut workbook = workbook();
        let cell = workbook.page_mut("FY2018").unwrap().cell_mut(3, 2);
        cell.value = CellValue::Number(Decimal::from(1000));
        cell.annotation = Some("first".to_string());
        workbook
    }

    #[test]
    fn strict_write_to_populated_cell_changes_nothing() {
        let mut workbook = populated();
        let before = workbook.clone();
        let err = writer()
            .write_cell(&mut workbook, &target(), Decimal::from(500), Some("second"), WriteMode::Strict)
            .unwrap_err();
        assert!(matches!(err, WriteError::CellConflict { .. }));
        assert_eq!(workbook, before);
    }

    #[test]
    fn additive_write_sums_and_appends_annotation() {
        let mut workbook = populated();
        writer()
            .write_cell(&mut workbook, &target(), Decimal::from(500), Some("second"), WriteMode::Additive)
            .unwrap();
        let cell = workbook.page("FY2018").unwrap().cell(3, 2).unwrap();
        assert_eq!(cell.value, CellValue::Number(Decimal::from(1500)));
        assert_eq!(cell.annotation.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn placeholder_is_overwritten_in_any_mode() {
        let mut workbook = workbook();
        workbook.page_mut("FY2018").unwrap().set(3, 2, CellValue::Text("-".into()));
        writer()
            .write_cell(&mut workbook, &target(), Decimal::from(250), Some("note"), WriteMode::Strict)
            .unwrap();
        let cell = workbook.page("FY2018").unwrap().cell(3, 2).unwrap();
        assert_eq!(cell.value, CellValue::Number(Decimal::from(250)));
        assert_eq!(cell.annotation.as_deref(), Some("note"));
    }

    #[test]
    fn locked_cell_is_never_written() {
        let mut workbook = workbook();
        workbook.page_mut("FY2018").unwrap().lock(3, 2);
        let before = workbook.clone();
        for mode in [WriteMode::Strict, WriteMode::Additive, WriteMode::Overwrite] {
            let err = writer()
                .write_cell(&mut workbook, &target(), Decimal::ONE, None, mode)
                .unwrap_err();
            assert_eq!(err, WriteError::CellLocked(target()));
        }
        assert_eq!(workbook, before);
    }

    #[test]
    fn additive_onto_text_conflicts() {
        let mut workbook = workbook();
        workbook.page_mut("FY2018").unwrap().set(3, 2, CellValue::Text("paid cash".into()));
        let err = writer()
            .write_cell(&mut workbook, &target(), Decimal::ONE, None, WriteMode::Additive)
            .unwrap_err();
        assert!(matches!(err, WriteError::CellConflict { .. }));
    }

    #[test]
    fn failed_roi_write_does_not_claim_a_row() {
        let mut workbook = workbook();
        workbook.page_mut("FY2018").unwrap().lock(40, 2);
        let t = transaction(TransactionType::Roi, Some((1, "TIG")), period(8, 2017), 100);
        assert!(writer()
            .locate_and_write(&mut workbook, &t, &directory(), WriteMode::Additive)
            .is_err());
        assert_eq!(workbook.page("FY2018").unwrap().value(40, 1), &CellValue::Empty);
    }

    #[test]
    fn balance_overwrites_previous_value() {
        let mut workbook = workbook();
        let w = writer();
        let first = w
            .update_account_balance(&mut workbook, ACCOUNT, Money::from_cents(100000))
            .unwrap();
        let second = w
            .update_account_balance(&mut workbook, ACCOUNT, Money::from_cents(250000))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.row, 35);
        let summary = workbook.page("Summary").unwrap();
        assert_eq!(summary.value(35, 2).as_number(), Some(Decimal::new(250000, 2)));
        assert_eq!(summary.value(35, 1), &CellValue::Number(Decimal::from(ACCOUNT.0)));
    }
}
