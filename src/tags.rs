//! Tag extraction and the derived tag index.
//!
//! A tag is a whitespace-bounded token starting with `#` whose next
//! character is neither `#` nor whitespace, so markdown headings never
//! count. Tags compare case-insensitively and keep the casing they were
//! first written with.
//!
//! The public index is always recomputed from every partition, never
//! merged into, so deleting the last record that mentions a tag removes
//! the tag too.
use std::collections::HashSet;

use log::{debug, info};

use crate::{PartitionStore, Record, Result, SidecarFile};

/// Tags in `content`, without the leading `#`, in order of appearance.
pub fn extract_tags(content: &str) -> Vec<&str> {
    content
        .split_whitespace()
        .filter_map(|token| token.strip_prefix('#'))
        .filter(|tag| !tag.is_empty() && !tag.starts_with('#'))
        .collect()
}

/// Whether `content` carries `tag`, ignoring case.
pub fn has_tag(content: &str, tag: &str) -> bool {
    let wanted = tag.to_lowercase();
    extract_tags(content)
        .into_iter()
        .any(|t| t.to_lowercase() == wanted)
}

/// Sorted, case-insensitively unique tags across `contents`.
pub fn collect_tags<'a>(contents: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for content in contents {
        for tag in extract_tags(content) {
            if seen.insert(tag.to_lowercase()) {
                tags.push(tag.to_string());
            }
        }
    }

    tags.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    tags
}

/// Tags of the private space, computed from decrypted records on demand.
pub fn private_tags(records: &[Record]) -> Vec<String> {
    // Records come newest first; capture casing from the oldest.
    collect_tags(records.iter().rev().map(|r| r.content.as_str()))
}

/// The persisted tag set of the public space.
#[derive(Debug, Clone)]
pub struct TagIndex {
    sidecar: SidecarFile,
}

impl TagIndex {
    pub fn new(sidecar: SidecarFile) -> Self {
        Self { sidecar }
    }

    /// Rescans every partition and persists the result.
    pub fn rebuild(&self, partitions: &PartitionStore) -> Result<Vec<String>> {
        let mut contents = Vec::new();
        // Oldest partition and oldest record first.
        for id in partitions.list_partition_ids()?.into_iter().rev() {
            let records = partitions.list(Some(&id))?;
            contents.extend(records.into_iter().rev().map(|r| r.content));
        }

        let tags = collect_tags(contents.iter().map(String::as_str));
        debug!("Tag rescan over {} records found {} tags", contents.len(), tags.len());

        let persisted = tags.clone();
        self.sidecar.update(move |sidecar| sidecar.tags = persisted)?;
        info!("Tag index rebuilt with {} tags", tags.len());
        Ok(tags)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.sidecar.load()?.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_follows_token_rules() {
        assert_eq!(
            extract_tags("#start mid#word ##heading # lone #end"),
            vec!["start", "end"]
        );
        assert_eq!(extract_tags("line one\n#tag1\ttab\n#tag2"), vec!["tag1", "tag2"]);
        assert_eq!(extract_tags("punctuated #todo, kept"), vec!["todo,"]);
        assert!(extract_tags("# Heading\n## Sub").is_empty());
    }

    #[test]
    fn collect_dedupes_case_insensitively_keeping_first_casing() {
        let tags = collect_tags(["#Work and #home", "#work again", "#alpha"]);
        assert_eq!(tags, vec!["alpha", "home", "Work"]);
    }

    #[test]
    fn has_tag_ignores_case_but_not_prefixes() {
        assert!(has_tag("Buy milk #TODO", "todo"));
        assert!(!has_tag("Buy milk #todos", "todo"));
        assert!(!has_tag("Buy milk todo", "todo"));
    }

    #[test]
    fn private_tags_use_oldest_casing() {
        let records = vec![
            Record::new("2026-10-02 00:00:00", "#Secret newer"),
            Record::new("2026-10-01 00:00:00", "#secret older"),
        ];
        assert_eq!(private_tags(&records), vec!["secret"]);
    }
}
