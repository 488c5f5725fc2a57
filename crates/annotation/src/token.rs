//! Boundary between the two token shapes found on the wire.
//!
//! Older rows store a segment's tokens as a flat list of strings; newer rows
//! store `{ text, senseId? }` records. Both are read through [`WireToken`]
//! and collapsed into [`Token`] exactly once, here. Nothing past this module
//! handles the legacy shape, and nothing ever writes it back.

use serde::{Deserialize, Deserializer};

use crate::types::Token;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum WireToken {
    Legacy(String),
    Annotated(Token),
}

impl From<Token> for WireToken {
    fn from(token: Token) -> Self {
        Self::Annotated(token)
    }
}

impl From<WireToken> for Token {
    fn from(token: WireToken) -> Self {
        match token {
            WireToken::Legacy(text) => Token::untagged(text),
            WireToken::Annotated(token) => token,
        }
    }
}

/// Collapse a mixed token sequence into annotated tokens.
///
/// Total and idempotent: annotated tokens pass through untouched (sense ids
/// included) and bare strings become untagged tokens.
pub fn normalize<I, T>(tokens: I) -> Vec<Token>
where
    I: IntoIterator<Item = T>,
    T: Into<WireToken>,
{
    tokens
        .into_iter()
        .map(|token| Token::from(token.into()))
        .collect()
}

impl From<&str> for WireToken {
    fn from(text: &str) -> Self {
        Self::Legacy(text.to_string())
    }
}

impl From<String> for WireToken {
    fn from(text: String) -> Self {
        Self::Legacy(text)
    }
}

pub(crate) fn deserialize_tokens<'de, D>(deserializer: D) -> Result<Option<Vec<Token>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<WireToken>>::deserialize(deserializer)?;
    Ok(raw.map(normalize))
}

pub(crate) fn deserialize_token_list<'de, D>(deserializer: D) -> Result<Vec<Token>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<WireToken>::deserialize(deserializer)?;
    Ok(normalize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::Arbitrary;
    use serde_json::json;

    #[test]
    fn keeps_sense_ids() {
        let raw: Vec<WireToken> =
            serde_json::from_value(json!(["a", { "text": "b", "senseId": 3 }, { "text": "c" }]))
                .unwrap();

        assert_eq!(
            normalize(raw),
            vec![
                Token::untagged("a"),
                Token::tagged("b", 3),
                Token::untagged("c"),
            ]
        );
    }

    #[test]
    fn rejects_unknown_shapes_at_deserialization() {
        let raw = serde_json::from_value::<Vec<WireToken>>(json!([42]));
        assert!(raw.is_err());
    }

    #[test]
    fn accepts_null_sense_id() {
        let raw: Vec<WireToken> =
            serde_json::from_value(json!([{ "text": "a", "senseId": null }])).unwrap();
        assert_eq!(normalize(raw), vec![Token::untagged("a")]);
    }

    #[derive(Debug, Clone)]
    struct Mixed(Vec<WireToken>);

    impl Arbitrary for Mixed {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let len = usize::arbitrary(g) % 8;
            let tokens = (0..len)
                .map(|_| {
                    let text = format!("w{}", u8::arbitrary(g));
                    if bool::arbitrary(g) {
                        WireToken::Legacy(text)
                    } else {
                        WireToken::Annotated(Token {
                            text,
                            sense_id: Option::<i8>::arbitrary(g).map(i64::from),
                        })
                    }
                })
                .collect();
            Mixed(tokens)
        }
    }

    #[quickcheck_macros::quickcheck]
    fn prop_normalize_idempotent(mixed: Mixed) -> bool {
        let once = normalize(mixed.0);
        normalize(once.clone()) == once
    }

    #[quickcheck_macros::quickcheck]
    fn prop_normalize_preserves_length_and_text(mixed: Mixed) -> bool {
        let texts: Vec<String> = mixed
            .0
            .iter()
            .map(|t| match t {
                WireToken::Legacy(text) => text.clone(),
                WireToken::Annotated(token) => token.text.clone(),
            })
            .collect();
        let normalized = normalize(mixed.0);
        normalized.iter().map(|t| t.text.clone()).collect::<Vec<_>>() == texts
    }
}
