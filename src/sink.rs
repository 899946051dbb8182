//! Warehouse sink collaborator.
//!
//! The pipeline writes one call per transformed page through the
//! [`TableSink`] trait. [`JsonlSink`] stages rows as append-only JSON Lines
//! files, one per dataset/table; [`MemorySink`] buffers pages in memory for
//! tests and dry runs. Append-only/idempotent semantics are assumed by the
//! pipeline, not enforced here.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::types::{Page, Row};

/// Consumer of fully projected row pages.
pub trait TableSink {
    fn write_page(&mut self, dataset: &str, table: &str, rows: &[Row]) -> Result<()>;
}

/// Writes each table to `<root>/<dataset>/<table>.jsonl`, appending one JSON
/// object per row. Files are opened lazily on first write.
pub struct JsonlSink {
    root: PathBuf,
    writers: HashMap<(String, String), BufWriter<File>>,
}

impl JsonlSink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create sink directory {}", root.display()))?;
        Ok(JsonlSink {
            root,
            writers: HashMap::new(),
        })
    }

    fn writer(&mut self, dataset: &str, table: &str) -> Result<&mut BufWriter<File>> {
        let key = (dataset.to_string(), table.to_string());
        if !self.writers.contains_key(&key) {
            let dir = self.root.join(dataset);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create dataset directory {}", dir.display()))?;
            let path = dir.join(format!("{table}.jsonl"));
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            self.writers.insert(key.clone(), BufWriter::new(file));
        }
        Ok(self.writers.get_mut(&key).unwrap())
    }

    pub fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush().context("failed to flush sink writer")?;
        }
        Ok(())
    }
}

impl TableSink for JsonlSink {
    fn write_page(&mut self, dataset: &str, table: &str, rows: &[Row]) -> Result<()> {
        let writer = self.writer(dataset, table)?;
        for row in rows {
            let line = serde_json::to_string(row).context("failed to serialize row")?;
            writeln!(writer, "{line}").context("failed to write row")?;
        }
        Ok(())
    }
}

/// Buffers every written page, preserving write order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub pages: Vec<(String, String, Page)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows written to one table, across pages.
    pub fn table_rows(&self, table: &str) -> Vec<&Row> {
        self.pages
            .iter()
            .filter(|(_, t, _)| t == table)
            .flat_map(|(_, _, page)| page.iter())
            .collect()
    }
}

impl TableSink for MemorySink {
    fn write_page(&mut self, dataset: &str, table: &str, rows: &[Row]) -> Result<()> {
        self.pages
            .push((dataset.to_string(), table.to_string(), rows.to_vec()));
        Ok(())
    }
}
