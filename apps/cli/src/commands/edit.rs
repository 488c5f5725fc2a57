use subtag_annotation::{EditError, NewSense, Segment, SegmentId, SenseId, edit};
use subtag_annotation_sync::AnnotationStore;

use super::inspect;

#[derive(clap::Args)]
pub struct Args {
    #[arg(long)]
    pub media: String,
    #[arg(long)]
    pub ordinal: u32,
    #[command(subcommand)]
    pub op: Op,
}

#[derive(clap::Subcommand)]
pub enum Op {
    /// Split token INDEX after OFFSET characters.
    Split { index: usize, offset: usize },
    /// Merge tokens START..=END into one.
    Merge { start: usize, end: usize },
    /// Replace the text of token INDEX, keeping its sense.
    Rewrite { index: usize, text: String },
    /// Re-segment from a whitespace-separated string.
    Rebuild { input: String },
    /// Attach a sense to token INDEX, either an existing one or a new one
    /// created for the token's word with `--define`.
    Tag {
        index: usize,
        #[arg(required_unless_present = "define")]
        sense_id: Option<SenseId>,
        #[arg(long, conflicts_with = "sense_id")]
        define: Option<String>,
        #[arg(long, requires = "define")]
        label: Option<String>,
    },
    Untag { index: usize },
    /// Seed tokens from the line's words if it has none yet.
    Tokenize,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenEdit {
    Split { index: usize, offset: usize },
    Merge { start: usize, end: usize },
    Rewrite { index: usize, text: String },
    Rebuild { input: String },
    Tag { index: usize, sense_id: SenseId },
    Untag { index: usize },
    Tokenize,
}

impl TokenEdit {
    fn apply(&self, segment: &Segment) -> subtag_annotation::Result<Segment> {
        match self {
            Self::Split { index, offset } => edit::split_token(segment, *index, *offset),
            Self::Merge { start, end } => edit::merge_tokens(segment, *start, *end),
            Self::Rewrite { index, text } => edit::rewrite_token(segment, *index, text),
            Self::Rebuild { input } => edit::rebuild_from_delimited_string(segment, input),
            Self::Tag { index, sense_id } => edit::tag_token(segment, *index, *sense_id),
            Self::Untag { index } => edit::untag_token(segment, *index),
            Self::Tokenize => Ok(edit::tokenize_whitespace(segment)),
        }
    }
}

impl Op {
    /// Turn the command line into a concrete edit, creating a sense first
    /// when asked to.
    async fn resolve(self, store: &AnnotationStore, id: &str) -> anyhow::Result<TokenEdit> {
        Ok(match self {
            Self::Split { index, offset } => TokenEdit::Split { index, offset },
            Self::Merge { start, end } => TokenEdit::Merge { start, end },
            Self::Rewrite { index, text } => TokenEdit::Rewrite { index, text },
            Self::Rebuild { input } => TokenEdit::Rebuild { input },
            Self::Untag { index } => TokenEdit::Untag { index },
            Self::Tokenize => TokenEdit::Tokenize,
            Self::Tag {
                index,
                sense_id: Some(sense_id),
                ..
            } => TokenEdit::Tag { index, sense_id },
            Self::Tag {
                index,
                define,
                label,
                ..
            } => {
                let segment = store.segment(id).await?;
                let tokens = segment.tokens();
                let word = tokens
                    .get(index)
                    .map(|t| t.text.clone())
                    .ok_or(EditError::OutOfRange {
                        index,
                        len: tokens.len(),
                    })?;
                let sense = store
                    .create_sense(NewSense {
                        definition: define.unwrap_or_default(),
                        source: None,
                        label,
                        owner_word: word,
                    })
                    .await?;
                println!("created sense {} for {}", sense.id, sense.owner_word);
                TokenEdit::Tag {
                    index,
                    sense_id: sense.id,
                }
            }
        })
    }
}

pub async fn run(store: &AnnotationStore, args: Args) -> anyhow::Result<()> {
    let id = SegmentId::new(&args.media, args.ordinal).to_string();
    let token_edit = args.op.resolve(store, &id).await?;

    let (_, pending) = store.edit_segment(&id, |s| token_edit.apply(s)).await?;
    let confirmed = pending.confirmed().await?;

    tracing::info!(segment_id = %id, edit = ?token_edit, "segment_edited");
    println!("{}", inspect::render(std::slice::from_ref(&confirmed)));
    Ok(())
}
