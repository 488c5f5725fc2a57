use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use subtag_annotation::{NewSense, Segment, SegmentId, SegmentUpdate, Sense, SenseId, SensePatch};

use super::{PersistenceResult, Row};

/// Whole contents of a local store of record: every segment keyed by id and
/// every sense keyed by id.
///
/// Shared by the in-memory and JSON-file back ends. Segments are read back
/// through the normalizing deserializer, so documents written by older tools
/// with flat-string token lists load transparently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    segments: BTreeMap<String, Segment>,
    #[serde(default)]
    senses: BTreeMap<SenseId, Sense>,
    #[serde(default)]
    last_sense_id: SenseId,
}

fn row<T: Serialize>(value: &T) -> PersistenceResult<Row> {
    Ok(serde_json::to_value(value)?)
}

fn media_of(id: &str) -> Option<String> {
    SegmentId::parse(id).ok().map(|id| id.media_id)
}

impl Document {
    pub fn segments_by_media(&self, media_id: &str) -> PersistenceResult<Vec<Row>> {
        let mut matching: Vec<&Segment> = self
            .segments
            .values()
            .filter(|s| media_of(&s.id).as_deref() == Some(media_id))
            .collect();
        matching.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        matching.into_iter().map(row).collect()
    }

    pub fn segment(&self, id: &str) -> PersistenceResult<Option<Row>> {
        self.segments.get(id).map(row).transpose()
    }

    pub fn upsert_segments(&mut self, segments: &[Segment]) -> PersistenceResult<Vec<Row>> {
        segments
            .iter()
            .map(|s| {
                self.segments.insert(s.id.clone(), s.clone());
                row(s)
            })
            .collect()
    }

    pub fn update_segment(
        &mut self,
        id: &str,
        update: &SegmentUpdate,
    ) -> PersistenceResult<Option<Row>> {
        let Some(existing) = self.segments.get_mut(id) else {
            return Ok(None);
        };
        *existing = existing.apply_update(update);
        row(existing).map(Some)
    }

    pub fn senses_by_word(&self, word: &str) -> PersistenceResult<Vec<Row>> {
        self.senses
            .values()
            .filter(|s| s.owner_word == word)
            .map(row)
            .collect()
    }

    pub fn senses(&self, ids: &[SenseId]) -> PersistenceResult<Vec<Row>> {
        ids.iter()
            .filter_map(|id| self.senses.get(id))
            .map(row)
            .collect()
    }

    pub fn create_sense(&mut self, sense: &NewSense) -> PersistenceResult<Row> {
        self.last_sense_id += 1;
        let created = sense.clone().into_sense(self.last_sense_id);
        let out = row(&created)?;
        self.senses.insert(created.id, created);
        Ok(out)
    }

    pub fn update_sense(
        &mut self,
        id: SenseId,
        patch: &SensePatch,
    ) -> PersistenceResult<Option<Row>> {
        let Some(existing) = self.senses.get_mut(&id) else {
            return Ok(None);
        };
        *existing = existing.apply_patch(patch);
        row(existing).map(Some)
    }

    pub fn delete_sense(&mut self, id: SenseId) -> PersistenceResult<Option<Row>> {
        self.senses.remove(&id).as_ref().map(row).transpose()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn sense_count(&self) -> usize {
        self.senses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seg(media: &str, ordinal: u32, start: f64) -> Segment {
        Segment::new(&SegmentId::new(media, ordinal), "x", start, start + 1.0)
    }

    #[test]
    fn media_filter_uses_last_underscore() {
        let mut doc = Document::default();
        doc.upsert_segments(&[seg("a_b", 0, 2.0), seg("a_b", 1, 1.0), seg("a", 0, 0.0)])
            .unwrap();

        let rows = doc.segments_by_media("a_b").unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a_b_1"), json!("a_b_0")]);
        assert_eq!(doc.segments_by_media("a").unwrap().len(), 1);
    }

    #[test]
    fn loads_legacy_token_lists() {
        let doc: Document = serde_json::from_value(json!({
            "segments": {
                "m_0": {
                    "id": "m_0",
                    "text": "hi there",
                    "startTime": 0.0,
                    "endTime": 1.0,
                    "tokens": ["hi", "there"],
                },
            },
        }))
        .unwrap();

        let row = doc.segment("m_0").unwrap().unwrap();
        assert_eq!(row["tokens"], json!([{ "text": "hi" }, { "text": "there" }]));
    }

    #[test]
    fn sense_ids_are_assigned_sequentially() {
        let mut doc = Document::default();
        let new = NewSense {
            definition: "to go".into(),
            source: None,
            label: None,
            owner_word: "ไป".into(),
        };
        assert_eq!(doc.create_sense(&new).unwrap()["id"], json!(1));
        assert_eq!(doc.create_sense(&new).unwrap()["id"], json!(2));
        assert!(doc.delete_sense(1).unwrap().is_some());
        assert!(doc.delete_sense(1).unwrap().is_none());
        assert_eq!(doc.create_sense(&new).unwrap()["id"], json!(3));
    }

    #[test]
    fn update_of_unknown_segment_returns_no_row() {
        let mut doc = Document::default();
        let update = SegmentUpdate::Text { text: "y".into() };
        assert!(doc.update_segment("m_0", &update).unwrap().is_none());
    }
}
