use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ContentList, ContentSource, FetchError, QueryOptions, Record, find_record};

/// Records held in memory, keyed by content type.
///
/// Every fetch is appended to a call log so callers can check how many
/// requests a build issued.
#[derive(Debug, Default)]
pub struct StaticSource {
    records: BTreeMap<String, Vec<Record>>,
    calls: Mutex<Vec<String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under its own `content_type`.
    pub fn insert(&mut self, record: Record) {
        self.records
            .entry(record.content_type.clone())
            .or_default()
            .push(record);
    }

    pub fn with(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        for record in records {
            self.insert(record);
        }
        self
    }

    /// Fetches issued so far, as `list:{type}` or `item:{type}/{id}`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn log(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn of_type(&self, content_type: &str) -> Result<&Vec<Record>, FetchError> {
        self.records
            .get(content_type)
            .ok_or_else(|| FetchError::UnknownContentType(content_type.to_string()))
    }
}

impl ContentSource for StaticSource {
    fn get_content(
        &self,
        content_type: &str,
        id: &str,
        _options: &QueryOptions,
    ) -> Result<Record, FetchError> {
        self.log(format!("item:{content_type}/{id}"));
        find_record(self.of_type(content_type)?, id).ok_or_else(|| FetchError::NotFound {
            content_type: content_type.to_string(),
            id: id.to_string(),
        })
    }

    fn get_list(
        &self,
        content_type: &str,
        options: &QueryOptions,
    ) -> Result<ContentList, FetchError> {
        self.log(format!("list:{content_type}"));
        Ok(options.apply(self.of_type(content_type)?.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FieldValue;

    fn source() -> StaticSource {
        let mut uid = Record::new("blog", "second");
        uid.public_uid = "uid-2".into();
        StaticSource::new().with([
            Record::new("blog", "first").with_field("title", FieldValue::text("One")),
            uid,
        ])
    }

    #[test]
    fn get_content_matches_alias_then_uid() {
        let source = source();
        let options = QueryOptions::default();
        assert_eq!(source.get_content("blog", "first", &options).unwrap().alias, "first");
        assert_eq!(source.get_content("blog", "uid-2", &options).unwrap().alias, "second");
    }

    #[test]
    fn missing_record_is_not_found() {
        let err = source()
            .get_content("blog", "nope", &QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn unknown_content_type_is_an_error() {
        let err = source().get_list("news", &QueryOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "content type 'news' not found");
    }

    #[test]
    fn calls_are_logged_in_order() {
        let source = source();
        let options = QueryOptions::default();
        source.get_list("blog", &options).unwrap();
        source.get_content("blog", "first", &options).unwrap();
        assert_eq!(source.calls(), vec!["list:blog", "item:blog/first"]);
    }

    #[test]
    fn preview_is_unsupported() {
        let err = source().get_content_preview("blog", "first", "token").unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(_)));
    }
}
