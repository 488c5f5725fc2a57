use std::path::{Path, PathBuf};

use subtag_annotation::{NewSense, Segment, SegmentUpdate, SenseId, SensePatch};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;

use super::{BoxFuture, Document, Persistence, PersistenceResult, Row};

/// Store of record kept as a single JSON document on disk.
///
/// Every mutation is a read-modify-write of the whole document under a write
/// lock, persisted with an atomic rename so readers never observe a torn file.
pub struct JsonFilePersistence {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_or_default(&self) -> PersistenceResult<Document> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read<T>(&self, query: impl FnOnce(&Document) -> T) -> PersistenceResult<T> {
        let _guard = self.lock.read().await;
        let doc = self.read_or_default().await?;
        Ok(query(&doc))
    }

    async fn write<T>(
        &self,
        apply: impl FnOnce(&mut Document) -> PersistenceResult<T>,
    ) -> PersistenceResult<T> {
        let _guard = self.lock.write().await;

        let mut doc = self.read_or_default().await?;
        let out = apply(&mut doc)?;
        let content = serde_json::to_string_pretty(&doc)?;
        atomic_write_async(&self.path, &content).await?;

        tracing::debug!(path = %self.path.display(), "store_document_written");
        Ok(out)
    }
}

async fn atomic_write_async(target: &Path, content: &str) -> std::io::Result<()> {
    let parent = target.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "target has no parent")
    })?;
    tokio::fs::create_dir_all(parent).await?;

    let temp = NamedTempFile::new_in(parent)?;
    tokio::fs::write(temp.path(), content).await?;
    temp.persist(target)?;
    Ok(())
}

impl Persistence for JsonFilePersistence {
    fn segments_by_media<'a>(
        &'a self,
        media_id: &'a str,
    ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(async move { self.read(|doc| doc.segments_by_media(media_id)).await? })
    }

    fn segment<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(async move { self.read(|doc| doc.segment(id)).await? })
    }

    fn upsert_segments<'a>(
        &'a self,
        segments: &'a [Segment],
    ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(self.write(move |doc| doc.upsert_segments(segments)))
    }

    fn update_segment<'a>(
        &'a self,
        id: &'a str,
        update: &'a SegmentUpdate,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write(move |doc| doc.update_segment(id, update)))
    }

    fn senses_by_word<'a>(&'a self, word: &'a str) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(async move { self.read(|doc| doc.senses_by_word(word)).await? })
    }

    fn senses<'a>(&'a self, ids: &'a [SenseId]) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(async move { self.read(|doc| doc.senses(ids)).await? })
    }

    fn create_sense<'a>(
        &'a self,
        sense: &'a NewSense,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write(move |doc| doc.create_sense(sense).map(Some)))
    }

    fn update_sense<'a>(
        &'a self,
        id: SenseId,
        patch: &'a SensePatch,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write(move |doc| doc.update_sense(id, patch)))
    }

    fn delete_sense<'a>(&'a self, id: SenseId) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write(move |doc| doc.delete_sense(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtag_annotation::SegmentId;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let temp = tempdir().unwrap();
        let store = JsonFilePersistence::new(temp.path().join("store.json"));
        assert!(store.segments_by_media("m").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_survive_a_new_handle() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("store.json");

        let segment = Segment::new(&SegmentId::new("m", 0), "hello", 0.0, 1.0);
        JsonFilePersistence::new(&path)
            .upsert_segments(std::slice::from_ref(&segment))
            .await
            .unwrap();

        let reopened = JsonFilePersistence::new(&path);
        let row = reopened.segment("m_0").await.unwrap().unwrap();
        assert_eq!(row["text"], "hello");
    }

    #[tokio::test]
    async fn sense_lifecycle() {
        let temp = tempdir().unwrap();
        let store = JsonFilePersistence::new(temp.path().join("store.json"));

        let created = store
            .create_sense(&NewSense {
                definition: "rice".into(),
                source: None,
                label: None,
                owner_word: "ข้าว".into(),
            })
            .await
            .unwrap()
            .unwrap();
        let id = created["id"].as_i64().unwrap();

        assert_eq!(store.senses_by_word("ข้าว").await.unwrap().len(), 1);
        assert!(store.delete_sense(id).await.unwrap().is_some());
        assert!(store.senses(&[id]).await.unwrap().is_empty());
    }
}
