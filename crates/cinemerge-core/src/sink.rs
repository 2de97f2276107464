use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use crate::error::SinkError;
use crate::model::{MergedRecord, ResolvedPair};

/// Destination for processed records. Sinks never see run counters.
pub trait RecordSink<T> {
    fn write(&mut self, record: &T) -> Result<(), SinkError>;

    /// Flush anything buffered; called once when the run ends.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<T: Clone> RecordSink<T> for Vec<T> {
    fn write(&mut self, record: &T) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }
}

/// A record that can be written as one CSV row under a fixed header.
pub trait CsvRow {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Result<Vec<String>, SinkError>;
}

impl CsvRow for MergedRecord {
    const HEADER: &'static [&'static str] = &["id", "imdb_id", "response"];

    fn fields(&self) -> Result<Vec<String>, SinkError> {
        Ok(vec![
            self.id.clone(),
            self.external_id.clone(),
            serde_json::to_string(self)?,
        ])
    }
}

impl CsvRow for ResolvedPair {
    const HEADER: &'static [&'static str] = &["imdb_id", "tmdb_id"];

    fn fields(&self) -> Result<Vec<String>, SinkError> {
        Ok(vec![self.external_id.clone(), self.internal_id.clone()])
    }
}

/// Append-only tabular stream. Each row is flushed as soon as it is written so an
/// interrupted run leaves a valid prefix.
pub struct CsvSink<W: Write, T> {
    writer: csv::Writer<W>,
    _row: PhantomData<fn(&T)>,
}

impl<W: Write, T: CsvRow> CsvSink<W, T> {
    /// Wrap `writer`, emitting the header first when `write_header` is set.
    pub fn new(writer: W, write_header: bool) -> Result<Self, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        if write_header {
            writer.write_record(T::HEADER)?;
            writer.flush()?;
        }
        Ok(Self {
            writer,
            _row: PhantomData,
        })
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|err| SinkError::Io(err.into_error()))
    }
}

impl<T: CsvRow> CsvSink<File, T> {
    /// Truncate or create `path` and start a fresh table.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let (file, write_header) = open_table_file(path, false)?;
        Self::new(file, write_header)
    }

    /// Continue an existing table; the header is only written into an empty file.
    pub fn append(path: &Path) -> Result<Self, SinkError> {
        let (file, write_header) = open_table_file(path, true)?;
        Self::new(file, write_header)
    }
}

impl<T: CsvRow> CsvSink<Box<dyn Write + Send>, T> {
    /// Table at `path`, or on stdout when no path is given.
    pub fn open(path: Option<&Path>, append: bool) -> Result<Self, SinkError> {
        match path {
            Some(path) => {
                let (file, write_header) = open_table_file(path, append)?;
                Self::new(Box::new(file), write_header)
            }
            None => Self::new(Box::new(io::stdout()), true),
        }
    }
}

fn open_table_file(path: &Path, append: bool) -> Result<(File, bool), SinkError> {
    ensure_parent_directory(path)?;
    if append {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        Ok((file, is_empty))
    } else {
        Ok((File::create(path)?, true))
    }
}

impl<W: Write, T: CsvRow> RecordSink<T> for CsvSink<W, T> {
    fn write(&mut self, record: &T) -> Result<(), SinkError> {
        self.writer.write_record(record.fields()?)?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// How [`JsonDirSink`] names its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNaming {
    /// `movie_{n}.json`, `n` increasing from `start` in processing order.
    Counter { start: u64 },
    /// `movie_{id}.json`, keyed by the record's internal id.
    RecordId,
}

impl Default for FileNaming {
    fn default() -> Self {
        FileNaming::Counter { start: 1 }
    }
}

#[derive(Serialize)]
struct StoredItem<'a> {
    tmdb: &'a Value,
    omdb: &'a Value,
}

/// One pretty-printed JSON document per record inside `dir`.
///
/// Existing files with the same name are overwritten.
#[derive(Debug)]
pub struct JsonDirSink {
    dir: PathBuf,
    naming: FileNaming,
    next_counter: u64,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>, naming: FileNaming) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let next_counter = match naming {
            FileNaming::Counter { start } => start,
            FileNaming::RecordId => 0,
        };
        Ok(Self {
            dir,
            naming,
            next_counter,
        })
    }

    fn file_name(&mut self, record: &MergedRecord) -> String {
        match self.naming {
            FileNaming::Counter { .. } => {
                let name = format!("movie_{}.json", self.next_counter);
                self.next_counter += 1;
                name
            }
            FileNaming::RecordId => format!("movie_{}.json", sanitize_file_stem(&record.id)),
        }
    }
}

impl RecordSink<MergedRecord> for JsonDirSink {
    fn write(&mut self, record: &MergedRecord) -> Result<(), SinkError> {
        let name = self.file_name(record);
        let path = self.dir.join(name);
        let stored = StoredItem {
            tmdb: record.raw_a.as_value(),
            omdb: record.raw_b.as_value(),
        };

        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        stored.serialize(&mut serializer)?;
        buffer.push(b'\n');

        let temp_path = build_temp_path(&path);
        fs::write(&temp_path, &buffer)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}

fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn ensure_parent_directory(path: &Path) -> Result<(), SinkError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
