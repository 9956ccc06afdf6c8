//! Content field formatting.
//!
//! Turns the typed fields of one [`Record`](crate::content::Record) into a
//! flat list of `{%= prefix_field %}` tokens and the text each one stands
//! for. Substitution itself lives in [`crate::substitute`].
//!
//! | Input type | Tokens | Value |
//! |------------|--------|-------|
//! | text, image | `prefix_id` | backslash-escaped, then HTML-escaped |
//! | number | `prefix_id` | plain number |
//! | rich_text | `prefix_id` | backslash-escaped, markup kept |
//! | calendar | `prefix_id`, `prefix_id_#date_only` | date formatter output |
//! | tags | `prefix_id` | joined with `,`, then escaped as text |
//! | map | `prefix_id_#address`, `_#address_decoded`, `_#latitude`, `_#longitude` | present parts only |
//! | content_type | nested `prefix_id_field` tokens | recursion, capped at depth 3 |
//!
//! Null values produce no tokens.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;

use crate::content::{Field, FieldValue, parse_timestamp};

/// Nested reference depth at which formatting stops producing tokens.
pub const MAX_REFERENCE_DEPTH: usize = 3;

/// Prefix of a calendar value the date formatter could not convert.
pub const DATE_FAILURE_PREFIX: &str = "[Fail to convert time]";

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {0:?} to a date")]
pub struct DateError(pub String);

/// Formats record timestamps and calendar fields for output.
pub trait DateFormatter: Send + Sync {
    fn format(&self, raw: &str, date_only: bool) -> Result<String, DateError>;
}

/// Substitutes `YYYY MM DD hh mm ss` (zero padded) into fixed patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternDateFormatter {
    pub date_format: String,
    pub date_only_format: String,
}

impl Default for PatternDateFormatter {
    fn default() -> Self {
        Self {
            date_format: "YYYY年MM月DD日 hh時mm分ss秒".into(),
            date_only_format: "YYYY年MM月DD日".into(),
        }
    }
}

impl DateFormatter for PatternDateFormatter {
    fn format(&self, raw: &str, date_only: bool) -> Result<String, DateError> {
        use chrono::{Datelike, Timelike};
        let at = parse_timestamp(raw).ok_or_else(|| DateError(raw.to_string()))?;
        let pattern = if date_only {
            &self.date_only_format
        } else {
            &self.date_format
        };
        Ok(pattern
            .replace("YYYY", &at.year().to_string())
            .replace("MM", &format!("{:02}", at.month()))
            .replace("DD", &format!("{:02}", at.day()))
            .replace("hh", &format!("{:02}", at.hour()))
            .replace("mm", &format!("{:02}", at.minute()))
            .replace("ss", &format!("{:02}", at.second())))
    }
}

/// Format `raw`, degrading to a marked raw string instead of failing.
pub fn format_date(formatter: &dyn DateFormatter, raw: &str, date_only: bool) -> String {
    formatter
        .format(raw, date_only)
        .unwrap_or_else(|_| format!("{DATE_FAILURE_PREFIX}{raw}"))
}

/// One token and the text it is replaced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub token: String,
    pub text: String,
    /// Source field, used for debug markers.
    pub field_id: Option<String>,
}

impl Replacement {
    pub fn new(token: String, text: String, field_id: Option<&str>) -> Self {
        Self {
            token,
            text,
            field_id: field_id.map(str::to_string),
        }
    }
}

/// The literal token for a name, e.g. `{%= blog_title %}`.
pub fn token(name: &str) -> String {
    format!("{{%= {name} %}}")
}

/// Build the replacement list for `fields`.
///
/// `suppress_references` skips `content_type` fields entirely; list
/// expansion handles those through sub-loops instead.
pub fn format_fields(
    fields: &[Field],
    prefix: &str,
    depth: usize,
    suppress_references: bool,
    formatter: &dyn DateFormatter,
) -> Vec<Replacement> {
    if depth >= MAX_REFERENCE_DEPTH {
        return Vec::new();
    }
    let mut out = Vec::new();
    for field in fields {
        let id = field.identifier.as_str();
        let name = format!("{prefix}_{id}");
        let mut push = |suffix: &str, text: String| {
            out.push(Replacement::new(token(&format!("{name}{suffix}")), text, Some(id)));
        };
        match &field.value {
            FieldValue::Text(Some(v)) | FieldValue::Image(Some(v)) => push("", escape_text(v)),
            FieldValue::Number(Some(n)) => push("", n.to_string()),
            FieldValue::RichText(Some(v)) => push("", escape_rich_text(v)),
            FieldValue::Calendar(Some(raw)) => {
                push("", format_date(formatter, raw, false));
                push("_#date_only", format_date(formatter, raw, true));
            }
            FieldValue::Tags(Some(tags)) => push("", escape_text(&tags.join(","))),
            FieldValue::Map(Some(map)) => {
                if let Some(address) = &map.address {
                    let escaped = escape_text(address);
                    push(
                        "_#address",
                        utf8_percent_encode(&escaped, URI_COMPONENT).to_string(),
                    );
                    push("_#address_decoded", escaped);
                }
                if let Some(lat) = map.latitude {
                    push("_#latitude", lat.to_string());
                }
                if let Some(lng) = map.longitude {
                    push("_#longitude", lng.to_string());
                }
            }
            FieldValue::ContentType(Some(records)) => {
                if suppress_references {
                    continue;
                }
                for record in records {
                    out.extend(format_fields(
                        &record.fields,
                        &name,
                        depth + 1,
                        suppress_references,
                        formatter,
                    ));
                }
            }
            FieldValue::Text(None)
            | FieldValue::Image(None)
            | FieldValue::Number(None)
            | FieldValue::RichText(None)
            | FieldValue::Calendar(None)
            | FieldValue::Tags(None)
            | FieldValue::Map(None)
            | FieldValue::ContentType(None) => {}
        }
    }
    out
}

/// Backslash-escape `\ $ ' "` and line breaks.
fn escape_backslashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '$' | '\'' | '"' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaping for plain text: backslashes first, then HTML entities.
pub fn escape_text(value: &str) -> String {
    escape_backslashes(value)
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// Escaping for rich text: markup survives and double quotes stay bare.
pub fn escape_rich_text(value: &str) -> String {
    escape_backslashes(value).replace("\\\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{MapValue, Record};

    fn format(fields: &[Field]) -> Vec<Replacement> {
        format_fields(fields, "blog", 0, false, &PatternDateFormatter::default())
    }

    fn pairs(replacements: &[Replacement]) -> Vec<(&str, &str)> {
        replacements
            .iter()
            .map(|r| (r.token.as_str(), r.text.as_str()))
            .collect()
    }

    // =========================================================================
    // Escaping
    // =========================================================================

    #[test]
    fn text_is_html_escaped() {
        let out = format(&[Field::new("title", FieldValue::text("<html>"))]);
        assert_eq!(pairs(&out), vec![("{%= blog_title %}", "&lt;html&gt;")]);
        assert_eq!(out[0].field_id.as_deref(), Some("title"));
    }

    #[test]
    fn text_escapes_quotes_and_dollars() {
        assert_eq!(escape_text(r#"a "b" $c"#), r#"a \&quot;b\&quot; \$c"#);
        assert_eq!(escape_text("it's"), "it\\&#039;s");
        assert_eq!(escape_text("a\nb"), "a\\nb");
    }

    #[test]
    fn rich_text_keeps_markup_and_quotes() {
        let out = format(&[Field::new(
            "body",
            FieldValue::RichText(Some("<p class=\"x\">a\r\nb\\</p>".into())),
        )]);
        assert_eq!(out[0].text, "<p class=\"x\">a\\r\\nb\\\\</p>");
    }

    #[test]
    fn tags_are_joined_then_escaped() {
        let out = format(&[Field::new("tags", FieldValue::tags(&["a", "b&c"]))]);
        assert_eq!(out[0].text, "a,b&amp;c");
    }

    #[test]
    fn numbers_are_plain() {
        let out = format(&[
            Field::new("count", FieldValue::Number(Some(3.0))),
            Field::new("ratio", FieldValue::Number(Some(0.25))),
        ]);
        assert_eq!(out[0].text, "3");
        assert_eq!(out[1].text, "0.25");
    }

    // =========================================================================
    // Calendar and map
    // =========================================================================

    #[test]
    fn calendar_produces_full_and_date_only_tokens() {
        let out = format(&[Field::new(
            "date",
            FieldValue::Calendar(Some("2022-12-05 11:22:33".into())),
        )]);
        assert_eq!(
            pairs(&out),
            vec![
                ("{%= blog_date %}", "2022年12月05日 11時22分33秒"),
                ("{%= blog_date_#date_only %}", "2022年12月05日"),
            ]
        );
    }

    #[test]
    fn unparseable_calendar_degrades() {
        let out = format(&[Field::new("date", FieldValue::Calendar(Some("soon".into())))]);
        assert_eq!(out[0].text, "[Fail to convert time]soon");
        assert_eq!(out[1].text, "[Fail to convert time]soon");
    }

    #[test]
    fn custom_patterns_are_used() {
        let formatter = PatternDateFormatter {
            date_format: "DD/MM/YYYY hh:mm".into(),
            date_only_format: "YYYY.MM.DD".into(),
        };
        assert_eq!(formatter.format("2023-04-09T08:07:06", false).unwrap(), "09/04/2023 08:07");
        assert_eq!(formatter.format("2023-04-09", true).unwrap(), "2023.04.09");
    }

    #[test]
    fn map_emits_present_parts_only() {
        let out = format(&[Field::new(
            "place",
            FieldValue::Map(Some(MapValue {
                address: Some("東京 1-2".into()),
                latitude: Some(35.5),
                longitude: None,
            })),
        )]);
        let tokens: Vec<&str> = out.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(
            tokens,
            vec![
                "{%= blog_place_#address %}",
                "{%= blog_place_#address_decoded %}",
                "{%= blog_place_#latitude %}",
            ]
        );
        assert_eq!(out[0].text, "%E6%9D%B1%E4%BA%AC%201-2");
        assert_eq!(out[1].text, "東京 1-2");
        assert_eq!(out[2].text, "35.5");
    }

    // =========================================================================
    // Nulls and references
    // =========================================================================

    #[test]
    fn null_values_are_skipped() {
        let out = format(&[
            Field::new("title", FieldValue::Text(None)),
            Field::new("place", FieldValue::Map(None)),
            Field::new("refs", FieldValue::ContentType(None)),
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn references_recurse_with_extended_prefix() {
        let author = Record::new("author", "jo").with_field("name", FieldValue::text("Jo"));
        let out = format(&[Field::new("author", FieldValue::ContentType(Some(vec![author])))]);
        assert_eq!(pairs(&out), vec![("{%= blog_author_name %}", "Jo")]);
    }

    #[test]
    fn references_are_suppressed_on_request() {
        let author = Record::new("author", "jo").with_field("name", FieldValue::text("Jo"));
        let fields = [Field::new("author", FieldValue::ContentType(Some(vec![author])))];
        let out = format_fields(&fields, "blog", 0, true, &PatternDateFormatter::default());
        assert!(out.is_empty());
    }

    #[test]
    fn nesting_stops_at_depth_cap() {
        let leaf = Record::new("c", "c").with_field("title", FieldValue::text("deep"));
        let ref3 = Record::new("b", "b").with_field("ref3", FieldValue::ContentType(Some(vec![leaf])));
        let ref2 = Record::new("a", "a").with_field("ref2", FieldValue::ContentType(Some(vec![ref3])));
        let fields = [Field::new("ref1", FieldValue::ContentType(Some(vec![ref2])))];
        let formatter = PatternDateFormatter::default();

        assert!(format_fields(&fields, "blog", 0, false, &formatter).is_empty());
        assert!(format_fields(&fields, "blog", MAX_REFERENCE_DEPTH, false, &formatter).is_empty());

        let shallow = [Field::new("title", FieldValue::text("x"))];
        assert!(format_fields(&shallow, "blog", 3, false, &formatter).is_empty());
        assert_eq!(format_fields(&shallow, "blog", 2, false, &formatter).len(), 1);
    }
}
