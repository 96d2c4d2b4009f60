
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::VideoId;

/// Current ledger file format version
const LEDGER_VERSION: u32 = 1;

/// Ledger filename inside the destination directory
pub const LEDGER_FILENAME: &str = ".toksave-failures.json";

const LEDGER_TEMP_FILENAME: &str = ".toksave-failures.tmp";

/// Videos the platform reported as unavailable, stored in .toksave-failures.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureLedger {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub ids: BTreeSet<VideoId>,
}

impl Default for FailureLedger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            ids: BTreeSet::new(),
        }
    }
}

impl FailureLedger {
    /// Load the ledger from a directory. A missing directory or file is an empty ledger.
    pub fn load(directory: &Path) -> anyhow::Result<Self> {
        let path = directory.join(LEDGER_FILENAME);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open ledger: {}", path.display()))
            }
        };

        let ledger: FailureLedger = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse ledger: {}", path.display()))?;

        if ledger.version != LEDGER_VERSION {
            tracing::warn!(
                path = %path.display(),
                version = ledger.version,
                "ignoring failure ledger with unknown version"
            );
            return Ok(Self::default());
        }

        Ok(ledger)
    }

    /// Save the ledger into a directory.
    pub fn save(&self, directory: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create directory: {}", directory.display()))?;
        let path = directory.join(LEDGER_FILENAME);
        let temp_path = directory.join(LEDGER_TEMP_FILENAME);

        // Write to temp file first, then rename for atomicity
        let file = File::create(&temp_path)
            .with_context(|| format!("Failed to create: {}", temp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        drop(writer);

        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to write ledger: {}", path.display()))?;
        Ok(())
    }

    pub fn contains(&self, id: &VideoId) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: VideoId) -> bool {
        let added = self.ids.insert(id);
        if added {
            self.updated_at = Utc::now();
        }
        added
    }

    /// Returns false if the id was absent.
    pub fn remove(&mut self, id: &VideoId) -> bool {
        let removed = self.ids.remove(id);
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
