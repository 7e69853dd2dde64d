//! Field extraction from result pages
//!
//! The dispatcher only depends on the [`FieldExtractor`] signature and on the
//! completeness rule of [`ExtractedRecord`]. The stock implementation,
//! [`ResultPageExtractor`], reads the labelled cells of the mirrors' result page.

mod fields;

pub use fields::{is_challenge, ResultPageExtractor};

use std::collections::BTreeMap;
use std::fmt;

/// Placeholder written for optional fields that were not found
pub const MISSING_FIELD: &str = "N/A";

/// The fixed set of fields read from a result page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldName {
    SeatingNo,
    Name,
    Status,
    EducationType,
    Division,
}

impl FieldName {
    /// All fields, in results-file column order
    pub const ALL: [FieldName; 5] = [
        Self::SeatingNo,
        Self::Name,
        Self::Status,
        Self::EducationType,
        Self::Division,
    ];

    /// Fields a record must carry to count as a success
    pub const MANDATORY: [FieldName; 2] = [Self::SeatingNo, Self::Name];

    /// Column name used in the results header
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeatingNo => "seating_no",
            Self::Name => "name",
            Self::Status => "status",
            Self::EducationType => "education_type",
            Self::Division => "division",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping from field name to extracted value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRecord {
    fields: BTreeMap<FieldName, String>,
}

impl ExtractedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value
    pub fn insert(&mut self, field: FieldName, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    pub fn get(&self, field: FieldName) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: FieldName) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First mandatory field that is absent or blank
    pub fn missing_mandatory(&self) -> Option<FieldName> {
        FieldName::MANDATORY
            .into_iter()
            .find(|field| self.get(*field).map_or(true, |v| v.trim().is_empty()))
    }

    /// A record is complete when both the seating number and the name are present
    pub fn is_complete(&self) -> bool {
        self.missing_mandatory().is_none()
    }

    /// Values in column order, with [`MISSING_FIELD`] for absent fields
    pub fn to_row(&self) -> Vec<&str> {
        FieldName::ALL
            .iter()
            .map(|field| self.get(*field).unwrap_or(MISSING_FIELD))
            .collect()
    }
}

/// Turns a response body into the fields it contains
///
/// Implementations must be pure: no I/O and no shared mutable state. A field
/// that cannot be located is simply left out of the returned record.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, body: &str) -> ExtractedRecord;
}

impl<F> FieldExtractor for F
where
    F: Fn(&str) -> ExtractedRecord + Send + Sync,
{
    fn extract(&self, body: &str) -> ExtractedRecord {
        self(body)
    }
}
