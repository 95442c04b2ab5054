//! `%identifier_params%` token expansion

use super::registry::split_key;
use super::{PlaceholderResolver, ResolverRegistry};
use crate::bridge::TargetContext;
use futures::future::join_all;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    /// Token body without the surrounding `%`
    Token(&'a str),
}

/// Expands placeholder tokens in text.
///
/// Tokens are looked up in the local registry first. Anything the registry
/// cannot answer goes to the fallback resolver, typically a
/// [`BridgeResolver`](super::BridgeResolver), with the whole token body as its
/// params. Tokens nobody answers are left as written.
pub struct PlaceholderExpander {
    registry: Arc<ResolverRegistry>,
    fallback: Option<Arc<dyn PlaceholderResolver>>,
}

impl PlaceholderExpander {
    pub fn new(registry: Arc<ResolverRegistry>) -> Self {
        Self {
            registry,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn PlaceholderResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    /// Replace every token in `text`. Tokens resolve concurrently.
    pub async fn expand(&self, text: &str, target: &TargetContext) -> String {
        let segments = parse(text);
        let tokens = segments.iter().filter_map(|segment| match segment {
            Segment::Token(body) => Some(self.resolve_token(body, target)),
            Segment::Literal(_) => None,
        });
        let mut values = join_all(tokens).await.into_iter();

        let mut output = String::with_capacity(text.len());
        for segment in &segments {
            match segment {
                Segment::Literal(literal) => output.push_str(literal),
                Segment::Token(body) => match values.next().flatten() {
                    Some(value) => output.push_str(&value),
                    None => {
                        output.push('%');
                        output.push_str(body);
                        output.push('%');
                    }
                },
            }
        }

        output
    }

    async fn resolve_token(&self, body: &str, target: &TargetContext) -> Option<String> {
        let (identifier, params) = split_key(body);

        if let Some(resolver) = self.registry.get(identifier) {
            if let Some(value) = resolver.resolve(params, target).await {
                return Some(value);
            }
        }

        match &self.fallback {
            Some(fallback) => fallback.resolve(body, target).await,
            None => {
                tracing::trace!(token = body, "No resolver for placeholder");
                None
            }
        }
    }
}

/// Split `text` into literals and tokens.
///
/// A token body is non-empty and contains no whitespace; `%%` and stray `%`
/// stay literal.
fn parse(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('%') {
        let open = cursor + offset;
        let body_start = open + 1;

        let Some(length) = text[body_start..].find('%') else {
            break;
        };
        let close = body_start + length;
        let body = &text[body_start..close];

        if body.is_empty() || body.contains(char::is_whitespace) {
            // The closing `%` may open the next token
            cursor = close;
            continue;
        }

        if literal_start < open {
            segments.push(Segment::Literal(&text[literal_start..open]));
        }
        segments.push(Segment::Token(body));
        literal_start = close + 1;
        cursor = close + 1;
    }

    if literal_start < text.len() {
        segments.push(Segment::Literal(&text[literal_start..]));
    }

    segments
}
