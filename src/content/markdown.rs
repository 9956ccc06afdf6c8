//! Markdown files with YAML front matter as a content source.
//!
//! ```text
//! ---
//! title: Hello
//! tags: [rust, web]
//! published_at: 2023-01-02 10:00:00
//! ---
//! Body in **markdown**.
//! ```
//!
//! Front-matter keys become fields in document order; the body becomes a
//! `body` rich_text field holding rendered HTML.

use gray_matter::Matter;
use gray_matter::engine::YAML;
use pulldown_cmark::{Parser, html as md_html};
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::fixture::{file_stem, files_with_extension};
use super::{
    ContentList, ContentSource, FetchError, FieldValue, MapValue, QueryOptions, Record,
    find_record,
};
use crate::fs::Filesystem;

/// Length of the hex digest prefix used as a record's public UID.
const UID_LEN: usize = 16;

pub struct MarkdownSource {
    fs: Arc<dyn Filesystem>,
    data_dir: PathBuf,
    extension: String,
}

impl MarkdownSource {
    pub fn new(fs: Arc<dyn Filesystem>, data_dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            fs,
            data_dir: data_dir.into(),
            extension: extension.to_string(),
        }
    }

    fn load(&self, content_type: &str) -> Result<Vec<Record>, FetchError> {
        let dir = self.data_dir.join(content_type);
        let files = files_with_extension(self.fs.as_ref(), &dir, content_type, &self.extension)?;
        files
            .iter()
            .map(|path| {
                let text = self.fs.read_text(path)?;
                parse_document(path, content_type, &text)
            })
            .collect()
    }
}

impl ContentSource for MarkdownSource {
    fn get_content(
        &self,
        content_type: &str,
        id: &str,
        _options: &QueryOptions,
    ) -> Result<Record, FetchError> {
        find_record(&self.load(content_type)?, id).ok_or_else(|| FetchError::NotFound {
            content_type: content_type.to_string(),
            id: id.to_string(),
        })
    }

    fn get_list(
        &self,
        content_type: &str,
        options: &QueryOptions,
    ) -> Result<ContentList, FetchError> {
        Ok(options.apply(self.load(content_type)?))
    }
}

fn parse_document(path: &Path, content_type: &str, text: &str) -> Result<Record, FetchError> {
    let matter = Matter::<YAML>::new();
    let parsed = matter
        .parse::<Value>(text)
        .map_err(|e| FetchError::FrontMatter {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let alias = file_stem(path);
    let mut record = Record::new(content_type, &alias);
    record.public_uid = public_uid(content_type, &alias);

    // Re-read the raw block with serde_yaml to keep key order.
    let front: Value = if parsed.matter.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(&parsed.matter).map_err(|e| FetchError::FrontMatter {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };
    if let Value::Mapping(map) = front {
        for (key, value) in map {
            let Some(key) = key.as_str() else { continue };
            match key {
                "published_at" => record.published_at = scalar_string(&value),
                "updated_at" => record.updated_at = scalar_string(&value),
                "created_at" => record.created_at = scalar_string(&value),
                _ => {
                    if let Some(value) = field_value(value) {
                        record = record.with_field(key, value);
                    }
                }
            }
        }
    }

    let mut body = String::new();
    md_html::push_html(&mut body, Parser::new(&parsed.content));
    Ok(record.with_field("body", FieldValue::RichText(Some(body.replace('\n', "")))))
}

fn public_uid(content_type: &str, alias: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(format!("{content_type}/{alias}")));
    digest[..UID_LEN].to_string()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Map a front-matter value onto the closest field type. Nested mappings
/// only count when they look like a map location.
fn field_value(value: Value) -> Option<FieldValue> {
    match value {
        Value::Null => Some(FieldValue::Text(None)),
        Value::Number(n) => Some(FieldValue::Number(n.as_f64())),
        Value::String(_) | Value::Bool(_) => Some(FieldValue::Text(scalar_string(&value))),
        Value::Sequence(items) => Some(FieldValue::Tags(Some(
            items.iter().filter_map(scalar_string).collect(),
        ))),
        Value::Mapping(ref map) => {
            let is_location = ["address", "latitude", "longitude"]
                .iter()
                .any(|k| map.contains_key(*k));
            if !is_location {
                return None;
            }
            serde_yaml::from_value::<MapValue>(value)
                .ok()
                .map(|m| FieldValue::Map(Some(m)))
        }
        Value::Tagged(tagged) => field_value(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    const POST: &str = "---\ntitle: Hello\nviews: 42\ntags:\n  - rust\n  - web\npublished_at: 2023-01-02 10:00:00\nplace:\n  address: Tokyo\n  latitude: 35.6\n---\n# Heading\n\nBody *text*.\n";

    fn source() -> MarkdownSource {
        let fs = InMemoryFs::new()
            .with_file("data/blog/hello.mdx", POST)
            .with_file("data/blog/plain.mdx", "No front matter here.")
            .with_file("data/blog/skip.md", "---\ntitle: Skipped\n---\n");
        MarkdownSource::new(Arc::new(fs), "data", ".mdx")
    }

    fn hello() -> Record {
        source()
            .get_content("blog", "hello", &QueryOptions::default())
            .unwrap()
    }

    #[test]
    fn front_matter_becomes_fields() {
        let record = hello();
        assert_eq!(record.field("title").unwrap().value, FieldValue::text("Hello"));
        assert_eq!(record.field("views").unwrap().value, FieldValue::Number(Some(42.0)));
        assert_eq!(record.tags("tags"), vec!["rust", "web"]);
        assert_eq!(record.published_at.as_deref(), Some("2023-01-02 10:00:00"));
        assert!(record.field("published_at").is_none());
    }

    #[test]
    fn location_mapping_becomes_map_field() {
        match &hello().field("place").unwrap().value {
            FieldValue::Map(Some(map)) => {
                assert_eq!(map.address.as_deref(), Some("Tokyo"));
                assert_eq!(map.latitude, Some(35.6));
            }
            other => panic!("expected map field, got {other:?}"),
        }
    }

    #[test]
    fn body_is_rendered_without_newlines() {
        let record = hello();
        match &record.field("body").unwrap().value {
            FieldValue::RichText(Some(html)) => {
                assert_eq!(html, "<h1>Heading</h1><p>Body <em>text</em>.</p>");
            }
            other => panic!("expected rich text body, got {other:?}"),
        }
    }

    #[test]
    fn uid_is_stable_digest_prefix() {
        let record = hello();
        assert_eq!(record.public_uid.len(), UID_LEN);
        assert_eq!(record.public_uid, public_uid("blog", "hello"));
        assert_ne!(record.public_uid, public_uid("news", "hello"));
        let again = source()
            .get_content("blog", &record.public_uid, &QueryOptions::default())
            .unwrap();
        assert_eq!(again.alias, "hello");
    }

    #[test]
    fn only_configured_extension_is_listed() {
        let list = source().get_list("blog", &QueryOptions::default()).unwrap();
        let aliases: Vec<&str> = list.data.iter().map(|r| r.alias.as_str()).collect();
        assert_eq!(aliases, vec!["hello", "plain"]);
    }

    #[test]
    fn document_without_front_matter_has_only_body() {
        let record = source()
            .get_content("blog", "plain", &QueryOptions::default())
            .unwrap();
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields[0].identifier, "body");
    }
}
