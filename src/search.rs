//! Search query parsing.
//!
//! A query is whitespace-separated terms. `#tag` terms must each be a tag
//! of the record; every other term must appear somewhere in its content.
//! Both comparisons ignore case. An empty query matches everything.
use crate::has_tag;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    words: Vec<String>,
    tags: Vec<String>,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        let mut parsed = SearchQuery::default();
        for token in query.split_whitespace() {
            let lower = token.to_lowercase();
            match lower.strip_prefix('#') {
                Some(tag) if !tag.is_empty() && !tag.starts_with('#') => {
                    parsed.tags.push(tag.to_string())
                }
                _ => parsed.words.push(lower),
            }
        }
        parsed
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.tags.is_empty()
    }

    pub fn matches(&self, content: &str) -> bool {
        let lower = content.to_lowercase();
        if !self.words.iter().all(|word| lower.contains(word.as_str())) {
            return false;
        }
        self.tags.iter().all(|tag| has_tag(content, tag))
    }
}
