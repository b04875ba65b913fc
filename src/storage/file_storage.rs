use crate::{
    domain::{BoardId, ColumnId, Item, ItemId, WriteBatch},
    error::{HlaviError, Result},
    storage::OrderedStore,
};
use async_trait::async_trait;
use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};

/// File-based storage implementation.
///
/// All items live in one JSON document that is replaced by rename on every batch,
/// so readers never see a half-applied reorder.
pub struct FileStorage {
    root_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    const HLAVI_DIR: &'static str = ".hlavi";
    const ITEMS_FILE: &'static str = "items.json";
    const STAGING_FILE: &'static str = "items.json.tmp";

    /// Creates a new FileStorage instance for the given project root
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::HLAVI_DIR),
            write_lock: Mutex::new(()),
        }
    }

    fn items_file(&self) -> PathBuf {
        self.root_path.join(Self::ITEMS_FILE)
    }

    fn staging_file(&self) -> PathBuf {
        self.root_path.join(Self::STAGING_FILE)
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)
                .await
                .map_err(|e| unavailable(path, e))?;
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<HashMap<ItemId, Item>> {
        let path = self.items_file();
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&path)
            .await
            .map_err(|e| unavailable(&path, e))?;
        decode(&contents)
    }

    /// Reads, applies and replaces the items file without yielding.
    ///
    /// Callers hold `write_lock`. With no await point inside, a commit that has
    /// started cannot be abandoned halfway by a dropped future.
    fn commit(&self, batch: &WriteBatch) -> Result<()> {
        let path = self.items_file();
        let mut items = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| unavailable(&path, e))?;
            decode(&contents)?
        } else {
            HashMap::new()
        };
        batch.apply_to(&mut items);

        let mut records: Vec<&Item> = items.values().collect();
        records.sort_by(|a, b| {
            a.board_id
                .cmp(&b.board_id)
                .then(a.column.cmp(&b.column))
                .then(a.position.cmp(&b.position))
        });
        let json = serde_json::to_string_pretty(&records)?;

        std::fs::create_dir_all(&self.root_path).map_err(|e| unavailable(&self.root_path, e))?;
        let staging = self.staging_file();
        std::fs::write(&staging, json).map_err(|e| unavailable(&staging, e))?;
        std::fs::rename(&staging, &path).map_err(|e| unavailable(&staging, e))?;
        Ok(())
    }
}

fn decode(contents: &str) -> Result<HashMap<ItemId, Item>> {
    let items: Vec<Item> = serde_json::from_str(contents)?;
    Ok(items.into_iter().map(|item| (item.id, item)).collect())
}

fn unavailable(path: &Path, err: std::io::Error) -> HlaviError {
    HlaviError::StoreUnavailable(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl OrderedStore for FileStorage {
    async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;

        if !self.items_file().exists() {
            self.apply(&WriteBatch::new()).await?;
        }

        let gitignore_path = self.root_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, "# Staging writes\n*.tmp\n")
                .await
                .map_err(|e| unavailable(&gitignore_path, e))?;
        }

        Ok(())
    }

    async fn load_item(&self, id: &ItemId) -> Result<Item> {
        self.load_all()
            .await?
            .remove(id)
            .ok_or(HlaviError::ItemNotFound(*id))
    }

    async fn list_partition(&self, board_id: &BoardId, column: &ColumnId) -> Result<Vec<Item>> {
        let mut partition: Vec<Item> = self
            .load_all()
            .await?
            .into_values()
            .filter(|item| &item.board_id == board_id && &item.column == column)
            .collect();
        partition.sort_by_key(|item| item.position);
        Ok(partition)
    }

    async fn list_board(&self, board_id: &BoardId) -> Result<Vec<Item>> {
        Ok(self
            .load_all()
            .await?
            .into_values()
            .filter(|item| &item.board_id == board_id)
            .collect())
    }

    async fn list_boards(&self) -> Result<Vec<BoardId>> {
        let boards: BTreeSet<BoardId> = self
            .load_all()
            .await?
            .into_values()
            .map(|item| item.board_id)
            .collect();
        Ok(boards.into_iter().collect())
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.commit(batch)
    }
}
