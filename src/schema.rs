//! Logical field resolution against the columns present in a source file.

use std::fmt;

/// A stable concept the pipeline extracts, independent of source naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalField {
    Identifier,
    IngredientText,
    DisplayName,
}

impl LogicalField {
    /// Resolution and output order.
    pub const ALL: [LogicalField; 3] = [
        LogicalField::Identifier,
        LogicalField::IngredientText,
        LogicalField::DisplayName,
    ];

    /// Acceptable source columns, most preferred first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            LogicalField::Identifier => &["code", "_id"],
            LogicalField::IngredientText => &["ingredients_text", "ingredients_text_en"],
            LogicalField::DisplayName => &["product_name", "product_name_en"],
        }
    }

    /// Column name used in the extracted CSV header.
    pub fn output_name(self) -> &'static str {
        match self {
            LogicalField::Identifier => "code",
            LogicalField::IngredientText => "ingredients_text",
            LogicalField::DisplayName => "product_name",
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.output_name())
    }
}

/// Logical field -> chosen source column, in `LogicalField::ALL` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    entries: Vec<(LogicalField, String)>,
}

impl ColumnMapping {
    pub fn source_for(&self, field: LogicalField) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, col)| col.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = LogicalField> + '_ {
        self.entries.iter().map(|(f, _)| *f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalField, &str)> + '_ {
        self.entries.iter().map(|(f, c)| (*f, c.as_str()))
    }

    /// Source columns to project when reading.
    pub fn source_columns(&self) -> Vec<String> {
        self.entries.iter().map(|(_, c)| c.clone()).collect()
    }

    /// CSV header for the extracted file.
    pub fn header(&self) -> Vec<&'static str> {
        self.fields().map(LogicalField::output_name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Pick, for every logical field, the first alias present in `available`.
///
/// Fields with no matching column are left out of the mapping; a missing
/// identifier means every row will be skipped downstream.
pub fn resolve_columns<S: AsRef<str>>(available: &[S]) -> ColumnMapping {
    let entries = LogicalField::ALL
        .iter()
        .filter_map(|&field| {
            field
                .aliases()
                .iter()
                .find(|alias| available.iter().any(|c| c.as_ref() == **alias))
                .map(|alias| (field, (*alias).to_string()))
        })
        .collect();
    ColumnMapping { entries }
}
