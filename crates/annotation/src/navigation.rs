use crate::types::Token;

pub fn first_untagged(tokens: &[Token]) -> Option<usize> {
    tokens.iter().position(|t| !t.is_tagged())
}

/// Next untagged token after `current`, wrapping around to the start.
///
/// The scan covers `current + 1..len`, then `0..current`, and finally
/// `current` itself, so `None` means every token is tagged.
pub fn next_untagged(tokens: &[Token], current: usize) -> Option<usize> {
    let len = tokens.len();
    if len == 0 {
        return None;
    }
    let current = current.min(len - 1);

    (current + 1..len)
        .chain(0..=current)
        .find(|&i| !tokens[i].is_tagged())
}

pub fn is_fully_tagged(tokens: &[Token]) -> bool {
    tokens.iter().all(Token::is_tagged)
}

pub fn tagged_count(tokens: &[Token]) -> usize {
    tokens.iter().filter(|t| t.is_tagged()).count()
}
