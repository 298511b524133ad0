use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;

use super::ReportRow;

/// Where finished reports end up.
pub trait ReportSink: Send + Sync {
    fn write_text(&self, name: &str, text: &str) -> anyhow::Result<()>;
    fn write_records(&self, name: &str, rows: &[ReportRow]) -> anyhow::Result<()>;
}

/// `{directory}/{name}.txt` and `{directory}/{name}.json`.
pub struct FileSink {
    directory: PathBuf,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, name: &str, extension: &str) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.directory)
            .with_context(|| format!("creating {}", self.directory.display()))?;
        Ok(self.directory.join(format!("{name}.{extension}")))
    }
}

impl ReportSink for FileSink {
    fn write_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        let path = self.path(name, "txt")?;
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }

    fn write_records(&self, name: &str, rows: &[ReportRow]) -> anyhow::Result<()> {
        let path = self.path(name, "json")?;
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, rows)?;
        writer
            .flush()
            .with_context(|| format!("writing {}", path.display()))
    }
}
