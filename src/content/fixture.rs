use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ContentList, ContentSource, FetchError, QueryOptions, Record, find_record};
use crate::fs::Filesystem;

/// JSON records on disk: `{data_dir}/{content_type}/{alias}.json`.
///
/// Missing `alias`, `public_uid` and `content_type` keys are filled in from
/// the file stem and directory name.
pub struct FixtureSource {
    fs: Arc<dyn Filesystem>,
    data_dir: PathBuf,
}

impl FixtureSource {
    pub fn new(fs: Arc<dyn Filesystem>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            data_dir: data_dir.into(),
        }
    }

    fn load(&self, content_type: &str) -> Result<Vec<Record>, FetchError> {
        let files = files_with_extension(
            self.fs.as_ref(),
            &self.data_dir.join(content_type),
            content_type,
            ".json",
        )?;
        let mut records = Vec::with_capacity(files.len());
        for path in files {
            let text = self.fs.read_text(&path)?;
            let mut record: Record = serde_json::from_str(&text)
                .map_err(|source| FetchError::Json { path: path.clone(), source })?;
            let stem = file_stem(&path);
            if record.alias.is_empty() {
                record.alias = stem.clone();
            }
            if record.public_uid.is_empty() {
                record.public_uid = stem;
            }
            if record.content_type.is_empty() {
                record.content_type = content_type.to_string();
            }
            records.push(record);
        }
        Ok(records)
    }
}

impl ContentSource for FixtureSource {
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

/// Files directly under `dir` ending in `extension`, in name order.
pub(super) fn files_with_extension(
    fs: &dyn Filesystem,
    dir: &Path,
    content_type: &str,
    extension: &str,
) -> Result<Vec<PathBuf>, FetchError> {
    if !fs.is_dir(dir) {
        return Err(FetchError::UnknownContentType(content_type.to_string()));
    }
    Ok(fs
        .list(dir)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(extension))
        })
        .collect())
}

pub(super) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
