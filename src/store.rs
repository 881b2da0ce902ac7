use crate::model::{dedupe_marks, CollectionUpdate, Snapshot};

/// Backing store for the school records. Collections are replaced whole.
pub trait DataSource {
    fn kind(&self) -> &'static str;

    /// Owned copy of every collection; later writes never alias it.
    fn fetch_all(&self) -> anyhow::Result<Snapshot>;

    fn update_collection(&mut self, update: CollectionUpdate) -> anyhow::Result<()>;

    /// Empties every collection and restores the default school config.
    fn reset(&mut self) -> anyhow::Result<()>;
}

/// Volatile in-process store used when no workspace is selected.
#[derive(Debug, Default)]
pub struct MemorySource {
    data: Snapshot,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataSource for MemorySource {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn fetch_all(&self) -> anyhow::Result<Snapshot> {
        Ok(self.data.clone())
    }

    fn update_collection(&mut self, update: CollectionUpdate) -> anyhow::Result<()> {
        update.check_ids()?;
        match update {
            CollectionUpdate::Students(rows) => self.data.students = rows,
            CollectionUpdate::Teachers(rows) => self.data.teachers = rows,
            CollectionUpdate::Subjects(rows) => self.data.subjects = rows,
            CollectionUpdate::Marks(rows) => self.data.marks = dedupe_marks(rows),
            CollectionUpdate::Config(cfg) => self.data.config = cfg,
        }
        Ok(())
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        self.data = Snapshot::default();
        Ok(())
    }
}
