use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, ReportResult};
use crate::models::{GroupedResult, Row};

/// Writes one CSV file per case under a fixed output directory.
#[derive(Debug, Clone)]
pub struct CsvSink {
    output_dir: PathBuf,
}

impl CsvSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.output_dir.join(destination)
    }

    /// Writes `header` (if any) and then one row per document, in order.
    /// Returns the number of data rows written once the file is flushed.
    pub fn write<I, F>(
        &self,
        destination: &str,
        header: Option<&[&str]>,
        documents: I,
        project: F,
    ) -> ReportResult<usize>
    where
        I: IntoIterator<Item = GroupedResult>,
        F: Fn(&GroupedResult) -> Row,
    {
        let path = self.path_for(destination);
        let documents = documents.into_iter();
        let (estimated, _) = documents.size_hint();
        tracing::info!(estimated_rows = estimated, file = %path.display(), "writing report");

        write_csv(&path, header, documents, project).map_err(|source| ReportError::SinkWrite {
            destination: path.clone(),
            source,
        })
    }
}

fn write_csv<I, F>(
    path: &Path,
    header: Option<&[&str]>,
    documents: I,
    project: F,
) -> Result<usize, csv::Error>
where
    I: Iterator<Item = GroupedResult>,
    F: Fn(&GroupedResult) -> Row,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new().delimiter(b',').from_path(path)?;

    if let Some(header) = header {
        writer.write_record(header)?;
    }

    let mut written = 0usize;
    for document in documents {
        let row = project(&document);
        writer.write_record(row.iter().map(ToString::to_string))?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, GroupKey};

    fn group(url: &str, count: u64) -> GroupedResult {
        let mut group = GroupedResult::new(GroupKey::Object(url.to_string()));
        group.count = Some(count);
        group
    }

    fn project(group: &GroupedResult) -> Row {
        vec![group.key.url().into(), group.count.into(), Cell::Empty]
    }

    #[test]
    fn writes_header_then_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("results"));
        let written = sink
            .write(
                "out.csv",
                Some(&["URL", "count", "note"]),
                vec![group("http://a,b", 5), group("http://c", 2)],
                project,
            )
            .unwrap();

        assert_eq!(written, 2);
        let contents = fs::read_to_string(sink.path_for("out.csv")).unwrap();
        assert_eq!(contents, "URL,count,note\n\"http://a,b\",5,\nhttp://c,2,\n");
    }

    #[test]
    fn header_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        sink.write("out.csv", None, vec![group("http://a", 1)], project)
            .unwrap();
        let contents = fs::read_to_string(sink.path_for("out.csv")).unwrap();
        assert_eq!(contents, "http://a,1,\n");
    }

    #[test]
    fn unwritable_destination_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let sink = CsvSink::new(&blocker);

        let err = sink
            .write("out.csv", None, vec![group("http://a", 1)], project)
            .unwrap_err();
        assert!(matches!(err, ReportError::SinkWrite { .. }));
    }
}
