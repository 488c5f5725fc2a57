use subtag_annotation::{Segment, first_untagged, tagged_count};
use subtag_annotation_sync::AnnotationStore;

#[derive(clap::Args)]
pub struct Args {
    #[arg(long)]
    pub media: String,
    /// Treat references to deleted senses as untagged.
    #[arg(long)]
    pub resolve: bool,
}

fn render_tokens(segment: &Segment) -> String {
    if !segment.is_tokenized() {
        return format!("(untokenized) {}", segment.text);
    }
    segment
        .tokens()
        .iter()
        .map(|t| match t.sense_id {
            Some(id) => format!("{}#{id}", t.text),
            None => t.text.clone(),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn render(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| {
            let tokens = s.tokens();
            let next = first_untagged(tokens)
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".into());
            format!(
                "{}  {:.2}-{:.2}  {}/{}  next={}  {}",
                s.id,
                s.start_time,
                s.end_time,
                tagged_count(tokens),
                tokens.len(),
                next,
                render_tokens(s)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run(store: &AnnotationStore, args: Args) -> anyhow::Result<()> {
    let mut segments = store.segments(&args.media).await?.to_vec();
    if args.resolve {
        for segment in segments.iter_mut() {
            *segment = store.resolve_senses(segment).await?;
        }
    }

    let complete = segments.iter().filter(|s| s.is_complete()).count();
    println!("{}", render(&segments));
    println!("{complete}/{} segments complete", segments.len());
    Ok(())
}
