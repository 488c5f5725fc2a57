use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;
use subtag_annotation::{Segment, SegmentId, WireToken, edit, normalize};
use subtag_annotation_sync::AnnotationStore;

#[derive(clap::Args)]
pub struct Args {
    #[arg(long)]
    pub media: String,
    /// JSON array of `{ text, startTime, endTime, tokens? }`.
    #[arg(long)]
    pub file: PathBuf,
}

/// One line as emitted by the subtitle parser. Token lists may use either
/// wire shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedLine {
    text: String,
    start_time: f64,
    end_time: f64,
    #[serde(default)]
    tokens: Option<Vec<WireToken>>,
}

/// Assign ids in start-time order and seed missing token lists.
fn into_segments(media_id: &str, mut lines: Vec<ParsedLine>) -> Vec<Segment> {
    lines.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    lines
        .into_iter()
        .enumerate()
        .map(|(ordinal, line)| {
            let id = SegmentId::new(media_id, ordinal as u32);
            let segment = Segment::new(&id, line.text.trim(), line.start_time, line.end_time);
            match line.tokens {
                Some(tokens) => segment.with_tokens(normalize(tokens)),
                None => edit::tokenize_whitespace(&segment),
            }
        })
        .collect()
}

pub async fn run(store: &AnnotationStore, args: Args) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let lines: Vec<ParsedLine> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", args.file.display()))?;

    let segments = into_segments(&args.media, lines);
    let written = store
        .replace_segments(&args.media, segments)
        .await?
        .confirmed()
        .await?;

    tracing::info!(media_id = %args.media, count = written.len(), "segments_imported");
    println!("imported {} segments for {}", written.len(), args.media);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use subtag_annotation::Token;
    use subtag_annotation_sync::persistence::JsonFilePersistence;
    use subtag_annotation_sync::{ChannelRuntime, SyncConfig};

    fn store_at(path: &std::path::Path) -> AnnotationStore {
        let (runtime, _events) = ChannelRuntime::new();
        AnnotationStore::new(
            Arc::new(JsonFilePersistence::new(path)),
            Arc::new(runtime),
            SyncConfig::default(),
        )
    }

    #[test]
    fn orders_lines_and_accepts_both_token_shapes() {
        let lines: Vec<ParsedLine> = serde_json::from_value(json!([
            { "text": "ไป โรงเรียน", "startTime": 4.0, "endTime": 6.0, "tokens": ["ไป", { "text": "โรงเรียน", "senseId": 2 }] },
            { "text": " กิน ข้าว ", "startTime": 0.5, "endTime": 2.0 },
        ]))
        .unwrap();

        let segments = into_segments("ep", lines);
        assert_eq!(segments[0].id, "ep_0");
        assert_eq!(segments[0].text, "กิน ข้าว");
        assert_eq!(
            segments[0].tokens(),
            &[Token::untagged("กิน"), Token::untagged("ข้าว")]
        );
        assert_eq!(segments[1].id, "ep_1");
        assert_eq!(
            segments[1].tokens(),
            &[Token::untagged("ไป"), Token::tagged("โรงเรียน", 2)]
        );
    }

    #[tokio::test]
    async fn import_persists_to_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("lines.json");
        std::fs::write(
            &input,
            r#"[{ "text": "กิน ข้าว", "startTime": 0.0, "endTime": 1.5 }]"#,
        )
        .unwrap();
        let store_path = dir.path().join("store.json");

        run(
            &store_at(&store_path),
            Args {
                media: "ep".into(),
                file: input,
            },
        )
        .await
        .unwrap();

        let segments = store_at(&store_path).segments("ep").await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].tokens().len(), 2);
    }
}
