//! Pure edits over a segment's token list.
//!
//! Every operation validates first and returns a fresh [`Segment`]; the input
//! is never modified, so a caller can hand the result to the store as one
//! atomic replacement. Offsets and lengths are counted in `char`s.

use std::collections::HashSet;

use crate::error::{EditError, Result};
use crate::types::{Segment, SenseId, Token};

fn checked_index(tokens: &[Token], index: usize) -> Result<()> {
    if index < tokens.len() {
        Ok(())
    } else {
        Err(EditError::OutOfRange {
            index,
            len: tokens.len(),
        })
    }
}

/// Replace the text of one token, keeping its sense. The text is stored as
/// given; surrounding whitespace only matters for the emptiness check.
pub fn rewrite_token(segment: &Segment, index: usize, new_text: &str) -> Result<Segment> {
    let tokens = segment.tokens();
    checked_index(tokens, index)?;

    if new_text.trim().is_empty() {
        return Err(EditError::EmptyText);
    }

    let mut next = tokens.to_vec();
    next[index].text = new_text.to_string();
    Ok(segment.with_tokens(next))
}

/// Split one token in two at `offset`. Both halves come out untagged.
pub fn split_token(segment: &Segment, index: usize, offset: usize) -> Result<Segment> {
    let tokens = segment.tokens();
    checked_index(tokens, index)?;

    let text = &tokens[index].text;
    let len = text.chars().count();
    if offset == 0 || offset >= len {
        return Err(EditError::InvalidOffset { offset, len });
    }

    let byte_offset = text
        .char_indices()
        .nth(offset)
        .map(|(i, _)| i)
        .ok_or(EditError::InvalidOffset { offset, len })?;
    let (head, tail) = text.split_at(byte_offset);

    let mut next = Vec::with_capacity(tokens.len() + 1);
    next.extend_from_slice(&tokens[..index]);
    next.push(Token::untagged(head));
    next.push(Token::untagged(tail));
    next.extend_from_slice(&tokens[index + 1..]);
    Ok(segment.with_tokens(next))
}

/// Merge `start..=end` into one token.
///
/// The merged token keeps a sense only when every token in the range carries
/// that same sense.
pub fn merge_tokens(segment: &Segment, start: usize, end: usize) -> Result<Segment> {
    let tokens = segment.tokens();
    if start > end || end >= tokens.len() {
        return Err(EditError::InvalidRange {
            start,
            end,
            len: tokens.len(),
        });
    }

    let range = &tokens[start..=end];
    let text: String = range.iter().map(|t| t.text.as_str()).collect();
    let sense_id = shared_sense(range);

    let mut next = Vec::with_capacity(tokens.len() - (end - start));
    next.extend_from_slice(&tokens[..start]);
    next.push(Token { text, sense_id });
    next.extend_from_slice(&tokens[end + 1..]);
    Ok(segment.with_tokens(next))
}

fn shared_sense(range: &[Token]) -> Option<SenseId> {
    let first = range.first()?.sense_id?;
    range
        .iter()
        .all(|t| t.sense_id == Some(first))
        .then_some(first)
}

/// Re-segment the token list from a whitespace-separated string.
///
/// Each new piece inherits the sense of the first not-yet-claimed old token
/// with identical text, wherever it sat. Unmatched pieces are untagged.
/// Sense records themselves are never touched.
pub fn rebuild_from_delimited_string(segment: &Segment, input: &str) -> Result<Segment> {
    let pieces: Vec<&str> = input.split_whitespace().collect();
    if pieces.is_empty() {
        return Err(EditError::EmptyResult);
    }

    let old = segment.tokens();
    let mut used = vec![false; old.len()];

    let next = pieces
        .into_iter()
        .map(|piece| {
            let matched = old
                .iter()
                .enumerate()
                .position(|(i, t)| !used[i] && t.text == piece);
            let sense_id = matched.and_then(|i| {
                used[i] = true;
                old[i].sense_id
            });
            Token {
                text: piece.to_string(),
                sense_id,
            }
        })
        .collect();

    Ok(segment.with_tokens(next))
}

pub fn tag_token(segment: &Segment, index: usize, sense_id: SenseId) -> Result<Segment> {
    set_sense(segment, index, Some(sense_id))
}

pub fn untag_token(segment: &Segment, index: usize) -> Result<Segment> {
    set_sense(segment, index, None)
}

fn set_sense(segment: &Segment, index: usize, sense_id: Option<SenseId>) -> Result<Segment> {
    let tokens = segment.tokens();
    checked_index(tokens, index)?;

    let mut next = tokens.to_vec();
    next[index].sense_id = sense_id;
    Ok(segment.with_tokens(next))
}

/// Clear every sense reference that is not in `known`.
///
/// A token pointing at a deleted sense reads as untagged. Untokenized
/// segments are returned as-is.
pub fn detach_senses(segment: &Segment, known: &HashSet<SenseId>) -> Segment {
    let Some(tokens) = segment.tokens.as_ref() else {
        return segment.clone();
    };

    let next = tokens
        .iter()
        .map(|t| Token {
            text: t.text.clone(),
            sense_id: t.sense_id.filter(|id| known.contains(id)),
        })
        .collect();
    segment.with_tokens(next)
}

/// Seed an untokenized segment with one untagged token per word of its
/// text. Already tokenized segments are returned unchanged.
pub fn tokenize_whitespace(segment: &Segment) -> Segment {
    if segment.is_tokenized() {
        return segment.clone();
    }
    segment.with_tokens(
        segment
            .text
            .split_whitespace()
            .map(Token::untagged)
            .collect(),
    )
}
