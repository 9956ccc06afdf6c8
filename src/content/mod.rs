//! Content records and the sources that provide them.
//!
//! The build never talks to a CMS directly. Everything it needs goes through
//! the [`ContentSource`] trait, which hands back typed [`Record`]s:
//!
//! ```text
//! ContentSource ──get_list / get_content──▶ Record
//!                                            ├── alias, public_uid, content_type
//!                                            ├── created_at / published_at / updated_at
//!                                            └── fields: [Field { identifier, value: FieldValue }]
//! ```
//!
//! Three sources ship with the crate:
//!
//! | Source | Backing data |
//! |--------|--------------|
//! | [`StaticSource`] | Records held in memory (embedding, tests) |
//! | [`FixtureSource`] | `{data_dir}/{content_type}/*.json`, one record per file |
//! | [`MarkdownSource`] | `{data_dir}/{content_type}/*.mdx`, YAML front matter + markdown body |
//!
//! All of them apply [`QueryOptions`] the same way through
//! [`QueryOptions::apply`], so a template behaves identically whichever
//! local source backs it.

mod fixture;
mod markdown;
mod memory;

pub use fixture::FixtureSource;
pub use markdown::MarkdownSource;
pub use memory::StaticSource;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use thiserror::Error;

use crate::fs::FsError;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("content type '{0}' not found")]
    UnknownContentType(String),
    #[error("content '{id}' of type '{content_type}' not found")]
    NotFound { content_type: String, id: String },
    #[error("{0} is not supported by this content source")]
    Unsupported(String),
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),
    #[error("invalid record in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid front matter in {path}: {message}")]
    FrontMatter { path: PathBuf, message: String },
}

/// A query option attribute whose value could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value {value:?} for cms-option-{name}")]
pub struct InvalidOption {
    pub name: String,
    pub value: String,
}

// ============================================================================
// Records
// ============================================================================

/// One content entry as returned by a [`ContentSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub public_uid: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Record {
    /// A record with the given alias doubling as its public UID.
    pub fn new(content_type: &str, alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            public_uid: alias.to_string(),
            content_type: content_type.to_string(),
            created_at: None,
            published_at: None,
            updated_at: None,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, identifier: &str, value: FieldValue) -> Self {
        self.fields.push(Field::new(identifier, value));
        self
    }

    pub fn published(mut self, at: &str) -> Self {
        self.published_at = Some(at.to_string());
        self.updated_at = Some(at.to_string());
        self
    }

    pub fn field(&self, identifier: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.identifier == identifier)
    }

    /// Values of a `tags` field, or nothing if the field is absent or null.
    pub fn tags(&self, identifier: &str) -> Vec<String> {
        match self.field(identifier).map(|f| &f.value) {
            Some(FieldValue::Tags(Some(tags))) => tags.clone(),
            _ => Vec::new(),
        }
    }

    /// Records nested in a `content_type` field.
    pub fn nested(&self, identifier: &str) -> &[Record] {
        match self.field(identifier).map(|f| &f.value) {
            Some(FieldValue::ContentType(Some(records))) => records,
            _ => &[],
        }
    }

    /// The identity used in generated file names: the alias, or the public
    /// UID for records without one.
    pub fn route_alias(&self) -> &str {
        if self.alias.is_empty() {
            &self.public_uid
        } else {
            &self.alias
        }
    }

    fn published_timestamp(&self) -> Option<NaiveDateTime> {
        self.published_at.as_deref().and_then(parse_timestamp)
    }
}

/// A typed field of a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawField", into = "RawField")]
pub struct Field {
    pub identifier: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(identifier: &str, value: FieldValue) -> Self {
        Self {
            identifier: identifier.to_string(),
            value,
        }
    }

    /// Whether this field satisfies a `filterValue` entry.
    fn matches(&self, wanted: &str) -> bool {
        match &self.value {
            FieldValue::Text(Some(v))
            | FieldValue::RichText(Some(v))
            | FieldValue::Image(Some(v))
            | FieldValue::Calendar(Some(v)) => v == wanted,
            FieldValue::Number(Some(n)) => n.to_string() == wanted,
            FieldValue::Tags(Some(tags)) => tags.iter().any(|t| t == wanted),
            FieldValue::ContentType(Some(records)) => {
                records.iter().any(|r| r.route_alias() == wanted)
            }
            _ => false,
        }
    }

    fn sort_key(&self) -> Option<String> {
        match &self.value {
            FieldValue::Text(Some(v))
            | FieldValue::RichText(Some(v))
            | FieldValue::Image(Some(v))
            | FieldValue::Calendar(Some(v)) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Field payload, one variant per CMS input type. `None` is a null value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Number(Option<f64>),
    RichText(Option<String>),
    Image(Option<String>),
    Calendar(Option<String>),
    Map(Option<MapValue>),
    Tags(Option<Vec<String>>),
    ContentType(Option<Vec<Record>>),
}

impl FieldValue {
    pub fn text(value: &str) -> Self {
        FieldValue::Text(Some(value.to_string()))
    }

    pub fn tags(values: &[&str]) -> Self {
        FieldValue::Tags(Some(values.iter().map(|v| v.to_string()).collect()))
    }

    pub fn input_type(&self) -> InputType {
        match self {
            FieldValue::Text(_) => InputType::Text,
            FieldValue::Number(_) => InputType::Number,
            FieldValue::RichText(_) => InputType::RichText,
            FieldValue::Image(_) => InputType::Image,
            FieldValue::Calendar(_) => InputType::Calendar,
            FieldValue::Map(_) => InputType::Map,
            FieldValue::Tags(_) => InputType::Tags,
            FieldValue::ContentType(_) => InputType::ContentType,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Number,
    RichText,
    Image,
    Calendar,
    Map,
    Tags,
    ContentType,
}

/// Wire form of a field: `{"identifier", "input_type", "value"}`.
#[derive(Serialize, Deserialize)]
struct RawField {
    identifier: String,
    input_type: InputType,
    #[serde(default)]
    value: serde_json::Value,
}

impl TryFrom<RawField> for Field {
    type Error = serde_json::Error;

    fn try_from(raw: RawField) -> Result<Self, Self::Error> {
        use serde_json::from_value;
        let v = raw.value;
        let value = match raw.input_type {
            InputType::Text => FieldValue::Text(from_value(v)?),
            InputType::Number => FieldValue::Number(from_value(v)?),
            InputType::RichText => FieldValue::RichText(from_value(v)?),
            InputType::Image => FieldValue::Image(from_value(v)?),
            InputType::Calendar => FieldValue::Calendar(from_value(v)?),
            InputType::Map => FieldValue::Map(from_value(v)?),
            InputType::Tags => FieldValue::Tags(from_value(v)?),
            InputType::ContentType => FieldValue::ContentType(from_value(v)?),
        };
        Ok(Field {
            identifier: raw.identifier,
            value,
        })
    }
}

impl From<Field> for RawField {
    fn from(field: Field) -> Self {
        use serde_json::{Value, to_value};
        let input_type = field.value.input_type();
        let value = match field.value {
            FieldValue::Text(v)
            | FieldValue::RichText(v)
            | FieldValue::Image(v)
            | FieldValue::Calendar(v) => to_value(v),
            FieldValue::Number(v) => to_value(v),
            FieldValue::Map(v) => to_value(v),
            FieldValue::Tags(v) => to_value(v),
            FieldValue::ContentType(v) => to_value(v),
        }
        .unwrap_or(Value::Null);
        RawField {
            identifier: field.identifier,
            input_type,
            value,
        }
    }
}

/// Parse the timestamp shapes records carry: RFC 3339, `YYYY-MM-DD hh:mm:ss`,
/// `YYYY-MM-DDThh:mm:ss`, or a bare `YYYY-MM-DD` (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ============================================================================
// Queries
// ============================================================================

/// Typed API query options, parsed from `cms-option-*` attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order: Option<String>,
    pub order_direction: Option<String>,
    pub order_by: Option<String>,
    pub filter_by: Option<String>,
    pub filter_ref: Option<String>,
    pub filter_mode: Option<String>,
    pub filter_value: Vec<String>,
    pub range_from: Option<NaiveDateTime>,
    pub range_to: Option<NaiveDateTime>,
}

impl QueryOptions {
    /// Set an option by its attribute suffix (`limit`, `orderBy`, …).
    ///
    /// Returns `Ok(false)` for names that are not query options, so the
    /// caller can leave those attributes alone.
    pub fn set(&mut self, name: &str, value: &str) -> Result<bool, InvalidOption> {
        let invalid = || InvalidOption {
            name: name.to_string(),
            value: value.to_string(),
        };
        let text = || Some(value.to_string());
        match name.to_ascii_lowercase().as_str() {
            "limit" => self.limit = Some(value.trim().parse().map_err(|_| invalid())?),
            "offset" => self.offset = Some(value.trim().parse().map_err(|_| invalid())?),
            "order" => self.order = text(),
            "orderdirection" => self.order_direction = text(),
            "orderby" => self.order_by = text(),
            "filterby" => self.filter_by = text(),
            "filterref" => self.filter_ref = text(),
            "filtermode" => self.filter_mode = text(),
            "filtervalue" => {
                self.filter_value = value.split(',').map(|v| v.to_string()).collect();
            }
            "rangefrom" => self.range_from = Some(parse_timestamp(value).ok_or_else(invalid)?),
            "rangeto" => self.range_to = Some(parse_timestamp(value).ok_or_else(invalid)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Filter, order and window `records` the way a CMS list query would.
    pub fn apply(&self, records: Vec<Record>) -> ContentList {
        let mut data: Vec<Record> = records
            .into_iter()
            .filter(|r| self.passes_filter(r) && self.in_range(r))
            .collect();

        if let Some(descending) = self.direction() {
            data.sort_by(|a, b| {
                let ordering = self.compare(a, b);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let total = data.len();
        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(total);
        let data: Vec<Record> = data.into_iter().skip(offset).take(limit).collect();
        ContentList {
            data,
            total,
            limit,
            offset,
        }
    }

    fn passes_filter(&self, record: &Record) -> bool {
        let Some(field_name) = self.filter_ref.as_ref().or(self.filter_by.as_ref()) else {
            return true;
        };
        if self.filter_value.is_empty() {
            return true;
        }
        let Some(field) = record.field(field_name) else {
            return false;
        };
        let all = self
            .filter_mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("and"));
        if all {
            self.filter_value.iter().all(|v| field.matches(v))
        } else {
            self.filter_value.iter().any(|v| field.matches(v))
        }
    }

    fn in_range(&self, record: &Record) -> bool {
        if self.range_from.is_none() && self.range_to.is_none() {
            return true;
        }
        let Some(at) = record.published_timestamp() else {
            return false;
        };
        self.range_from.is_none_or(|from| at >= from) && self.range_to.is_none_or(|to| at <= to)
    }

    /// `Some(descending)` when the query asks for an ordering.
    fn direction(&self) -> Option<bool> {
        let direction = self.order_direction.as_ref().or(self.order.as_ref());
        match direction {
            Some(d) => Some(d.eq_ignore_ascii_case("desc")),
            None if self.order_by.is_some() => Some(false),
            None => None,
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self.order_by.as_deref() {
            None | Some("published_at") | Some("publishedAt") => {
                a.published_timestamp().cmp(&b.published_timestamp())
            }
            Some(field) => {
                let key = |r: &Record| r.field(field).and_then(Field::sort_key);
                let numeric = |r: &Record| match r.field(field).map(|f| &f.value) {
                    Some(FieldValue::Number(Some(n))) => Some(*n),
                    _ => None,
                };
                match (numeric(a), numeric(b)) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    _ => key(a).cmp(&key(b)),
                }
            }
        }
    }
}

/// A page of list results.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentList {
    pub data: Vec<Record>,
    /// Number of records matching the query before `offset`/`limit`.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Analytics event reported through [`ContentSource::page_view`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub content_type: String,
    pub content_id: String,
}

/// Read-only access to content records.
///
/// `Sync` because pages are expanded in parallel and share one source.
pub trait ContentSource: Sync {
    /// A single record by alias or public UID.
    fn get_content(
        &self,
        content_type: &str,
        id: &str,
        options: &QueryOptions,
    ) -> Result<Record, FetchError>;

    /// A draft record addressed by a preview token.
    fn get_content_preview(
        &self,
        _content_type: &str,
        _id: &str,
        _token: &str,
    ) -> Result<Record, FetchError> {
        Err(FetchError::Unsupported("content preview".into()))
    }

    fn get_list(&self, content_type: &str, options: &QueryOptions)
    -> Result<ContentList, FetchError>;

    fn page_view(&self, _event: &PageView) -> Result<(), FetchError> {
        Ok(())
    }
}

/// Find a record by alias first, then by public UID.
pub(crate) fn find_record(records: &[Record], id: &str) -> Option<Record> {
    records
        .iter()
        .find(|r| r.alias == id)
        .or_else(|| records.iter().find(|r| r.public_uid == id))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog(alias: &str, published: &str, tags: &[&str]) -> Record {
        Record::new("blog", alias)
            .published(published)
            .with_field("title", FieldValue::text(&format!("title {alias}")))
            .with_field("tags", FieldValue::tags(tags))
    }

    // =========================================================================
    // Wire format
    // =========================================================================

    #[test]
    fn field_json_uses_input_type_tag() {
        let json = r#"{
            "alias": "a",
            "public_uid": "uid-a",
            "content_type": "blog",
            "fields": [
                {"identifier": "title", "input_type": "text", "value": "Hello"},
                {"identifier": "count", "input_type": "number", "value": 3},
                {"identifier": "missing", "input_type": "image", "value": null},
                {"identifier": "where", "input_type": "map", "value": {"address": "Tokyo", "latitude": 35.6}},
                {"identifier": "ref", "input_type": "content_type", "value": [
                    {"alias": "n", "fields": [{"identifier": "title", "input_type": "text", "value": "Nested"}]}
                ]}
            ]
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.field("title").unwrap().value, FieldValue::text("Hello"));
        assert_eq!(record.field("count").unwrap().value, FieldValue::Number(Some(3.0)));
        assert_eq!(record.field("missing").unwrap().value, FieldValue::Image(None));
        assert_eq!(record.nested("ref")[0].alias, "n");
        match &record.field("where").unwrap().value {
            FieldValue::Map(Some(map)) => {
                assert_eq!(map.address.as_deref(), Some("Tokyo"));
                assert_eq!(map.longitude, None);
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn field_json_serializes_back_to_wire_form() {
        let field = Field::new("tags", FieldValue::tags(&["a", "b"]));
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["input_type"], "tags");
        assert_eq!(json["value"][1], "b");
    }

    #[test]
    fn route_alias_falls_back_to_uid() {
        let mut record = Record::new("blog", "");
        record.public_uid = "uid-1".into();
        assert_eq!(record.route_alias(), "uid-1");
    }

    #[test]
    fn parse_timestamp_accepts_common_shapes() {
        let expected = NaiveDate::from_ymd_opt(2022, 12, 5)
            .unwrap()
            .and_hms_opt(11, 22, 33)
            .unwrap();
        assert_eq!(parse_timestamp("2022-12-05 11:22:33"), Some(expected));
        assert_eq!(parse_timestamp("2022-12-05T11:22:33"), Some(expected));
        assert_eq!(parse_timestamp("2022-12-05T11:22:33+09:00"), Some(expected));
        assert!(parse_timestamp("2022-12-05").is_some());
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    // =========================================================================
    // QueryOptions
    // =========================================================================

    #[test]
    fn set_parses_typed_options() {
        let mut options = QueryOptions::default();
        assert!(options.set("limit", "5").unwrap());
        assert!(options.set("orderDirection", "desc").unwrap());
        assert!(options.set("filterValue", "a,b").unwrap());
        assert!(options.set("rangeFrom", "2023-01-01").unwrap());
        assert!(!options.set("pagination-size", "3").unwrap());
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.order_direction.as_deref(), Some("desc"));
        assert_eq!(options.filter_value, vec!["a", "b"]);
        assert!(options.range_from.is_some());
    }

    #[test]
    fn set_rejects_non_numeric_limit() {
        let mut options = QueryOptions::default();
        let err = options.set("limit", "ten").unwrap_err();
        assert_eq!(err.name, "limit");
        assert_eq!(err.to_string(), r#"invalid value "ten" for cms-option-limit"#);
    }

    #[test]
    fn apply_orders_filters_and_windows() {
        let records = vec![
            blog("a", "2023-01-01", &["rust"]),
            blog("b", "2023-03-01", &["go"]),
            blog("c", "2023-02-01", &["rust", "go"]),
        ];
        let options = QueryOptions {
            order_direction: Some("desc".into()),
            filter_by: Some("tags".into()),
            filter_value: vec!["rust".into()],
            ..Default::default()
        };
        let list = options.apply(records.clone());
        let aliases: Vec<&str> = list.data.iter().map(|r| r.alias.as_str()).collect();
        assert_eq!(aliases, vec!["c", "a"]);
        assert_eq!(list.total, 2);

        let windowed = QueryOptions {
            offset: Some(1),
            limit: Some(1),
            ..Default::default()
        }
        .apply(records);
        assert_eq!(windowed.data.len(), 1);
        assert_eq!(windowed.data[0].alias, "b");
        assert_eq!(windowed.total, 3);
    }

    #[test]
    fn apply_and_mode_requires_every_value() {
        let records = vec![
            blog("a", "2023-01-01", &["rust"]),
            blog("c", "2023-02-01", &["rust", "go"]),
        ];
        let options = QueryOptions {
            filter_by: Some("tags".into()),
            filter_mode: Some("and".into()),
            filter_value: vec!["rust".into(), "go".into()],
            ..Default::default()
        };
        let list = options.apply(records);
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].alias, "c");
    }

    #[test]
    fn apply_range_uses_published_at() {
        let records = vec![
            blog("a", "2023-01-01", &[]),
            blog("b", "2023-03-01", &[]),
        ];
        let mut options = QueryOptions::default();
        options.set("rangeFrom", "2023-02-01").unwrap();
        let list = options.apply(records);
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].alias, "b");
    }

    #[test]
    fn apply_without_ordering_keeps_source_order() {
        let records = vec![
            blog("z", "2023-01-01", &[]),
            blog("a", "2023-03-01", &[]),
        ];
        let list = QueryOptions::default().apply(records);
        assert_eq!(list.data[0].alias, "z");
    }
}
