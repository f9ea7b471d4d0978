use rust_decimal::Decimal;
use submission_model::{FormElement, SubmissionKey};
use time::{Date, OffsetDateTime, Time};

use crate::value::{BlobValue, GeoPoint, RepeatValue};

/// Row sink filled by an [`ElementFormatter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRow {
    pub key: SubmissionKey,
    pub cells: Vec<String>,
}

impl FormattedRow {
    pub fn new(key: SubmissionKey) -> Self {
        Self {
            key,
            cells: Vec::new(),
        }
    }

    pub fn push(&mut self, cell: impl Into<String>) {
        self.cells.push(cell.into());
    }
}

/// Renders one value kind at a time into a [`FormattedRow`].
///
/// `ordinal` is empty for top-level values and the repeat ordinal otherwise.
pub trait ElementFormatter {
    /// Emits the row key of the enclosing set together with that set's element name.
    fn format_uid(&mut self, uid: &str, property: &str, row: &mut FormattedRow);

    fn format_string(
        &mut self,
        value: Option<&str>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_long(
        &mut self,
        value: Option<i64>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_decimal(
        &mut self,
        value: Option<Decimal>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_boolean(
        &mut self,
        value: Option<bool>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_choices(
        &mut self,
        values: &[String],
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_geopoint(
        &mut self,
        value: Option<&GeoPoint>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_date(
        &mut self,
        value: Option<Date>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_time(
        &mut self,
        value: Option<Time>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_date_time(
        &mut self,
        value: Option<OffsetDateTime>,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_binary(
        &mut self,
        value: &BlobValue,
        element: &FormElement,
        ordinal: &str,
        row: &mut FormattedRow,
    );

    fn format_repeats(&mut self, value: &RepeatValue, element: &FormElement, row: &mut FormattedRow);
}
