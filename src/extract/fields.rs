//! Result page parser
//!
//! The mirrors render each field as a labelled cell:
//!
//! ```html
//! <span class="formatt3">رقم الجلوس</span><h1>123456</h1>
//! <span class="formatt2">الأسم: </span><span>...</span>
//! ```
//!
//! The label identifies the field and the next element holds its value.

use crate::extract::{ExtractedRecord, FieldExtractor, FieldName};
use scraper::{ElementRef, Html, Selector};

/// Extractor for the mirrors' result page markup
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultPageExtractor;

impl ResultPageExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FieldExtractor for ResultPageExtractor {
    fn extract(&self, body: &str) -> ExtractedRecord {
        let document = Html::parse_document(body);
        let mut record = ExtractedRecord::new();

        let Ok(label_selector) = Selector::parse(r#"span[class^="formatt"]"#) else {
            return record;
        };

        for label in document.select(&label_selector) {
            let Some(field) = field_for_label(&element_text(&label)) else {
                continue;
            };

            // First occurrence wins
            if record.contains(field) {
                continue;
            }

            if let Some(value) = value_after(&label, field) {
                record.insert(field, value);
            }
        }

        record
    }
}

/// Maps a cell label to its field
///
/// Trailing colons and whitespace are ignored. Both spellings of the name
/// label appear across mirrors.
fn field_for_label(label: &str) -> Option<FieldName> {
    let label = label.trim().trim_end_matches(':').trim();
    match label {
        "رقم الجلوس" => Some(FieldName::SeatingNo),
        "الأسم" | "الاسم" => Some(FieldName::Name),
        "حالة الطالب" => Some(FieldName::Status),
        "نوعية التعليم" => Some(FieldName::EducationType),
        "الشعبة" => Some(FieldName::Division),
        _ => None,
    }
}

/// Reads the value element that follows a label
///
/// The seating number sits in an `<h1>` and must be numeric; every other
/// field sits in a plain `<span>`.
fn value_after(label: &ElementRef<'_>, field: FieldName) -> Option<String> {
    let next = label.next_siblings().find_map(ElementRef::wrap)?;
    let tag = next.value().name();

    let value = element_text(&next);
    if value.is_empty() {
        return None;
    }

    match field {
        FieldName::SeatingNo => {
            (tag == "h1" && value.chars().all(|c| c.is_ascii_digit())).then_some(value)
        }
        _ => (tag == "span").then_some(value),
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Returns true if a body looks like an anti-automation challenge page
pub fn is_challenge(body: &str) -> bool {
    // "recaptcha" contains "captcha"
    body.to_lowercase().contains("captcha")
}
