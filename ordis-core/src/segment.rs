//! Audience segmentation port.
//!
//! Segmentation rules are owned by the integrator's audience system; the
//! engine only consumes the contract. [`DirectorySegmenter`] is the stock
//! implementation: tag filtering over the posted recipient set, with opt-out
//! filtering that also consults the engine's own recipient snapshots (a
//! recipient may have opted out since the integrator assembled the set).

use std::sync::Arc;

use async_trait::async_trait;
use compact_str::CompactString;

use crate::entities::recipient::Recipient;
use crate::store::{RecipientDirectory, StoreError};

/// Tag-based audience filter. An empty tag list matches everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentFilter {
    pub include_tags: Vec<CompactString>,
}

/// Audience segmentation contract.
#[async_trait]
pub trait AudienceSegmenter: Send + Sync {
    /// Narrow `recipients` to those matching `filter`.
    async fn segment(
        &self,
        recipients: Vec<Recipient>,
        filter: &SegmentFilter,
    ) -> Result<Vec<Recipient>, StoreError>;

    /// Drop recipients that are opted out.
    async fn filter_opted_out(
        &self,
        recipients: Vec<Recipient>,
    ) -> Result<Vec<Recipient>, StoreError>;
}

/// Segmenter backed by the engine's recipient directory.
pub struct DirectorySegmenter {
    directory: Arc<dyn RecipientDirectory>,
}

impl DirectorySegmenter {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AudienceSegmenter for DirectorySegmenter {
    async fn segment(
        &self,
        mut recipients: Vec<Recipient>,
        filter: &SegmentFilter,
    ) -> Result<Vec<Recipient>, StoreError> {
        if filter.include_tags.is_empty() {
            return Ok(recipients);
        }
        recipients.retain(|r| r.tags.iter().any(|t| filter.include_tags.contains(t)));
        Ok(recipients)
    }

    async fn filter_opted_out(
        &self,
        recipients: Vec<Recipient>,
    ) -> Result<Vec<Recipient>, StoreError> {
        let mut kept = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            if recipient.opted_out {
                continue;
            }
            let known = self.directory.get(recipient.id.as_str()).await?;
            if known.is_some_and(|k| k.opted_out) {
                continue;
            }
            kept.push(recipient);
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn recipient(id: &str, tags: &[&str]) -> Recipient {
        Recipient {
            id: id.into(),
            opted_out: false,
            chat_id: None,
            phone: None,
            tags: tags.iter().map(|t| (*t).into()).collect(),
        }
    }

    #[tokio::test]
    async fn empty_filter_matches_everyone() {
        let store = Arc::new(MemoryStore::new());
        let segmenter = DirectorySegmenter::new(store);
        let out = segmenter
            .segment(
                vec![recipient("a", &[]), recipient("b", &["vip"])],
                &SegmentFilter::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn tag_filter_keeps_any_match() {
        let store = Arc::new(MemoryStore::new());
        let segmenter = DirectorySegmenter::new(store);
        let filter = SegmentFilter {
            include_tags: vec!["vip".into()],
        };
        let out = segmenter
            .segment(
                vec![recipient("a", &["trial"]), recipient("b", &["vip", "beta"])],
                &filter,
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "b");
    }

    #[tokio::test]
    async fn opted_out_recipients_are_dropped_even_if_snapshot_disagrees() {
        let store = Arc::new(MemoryStore::new());
        // The directory knows "b" opted out, even though the posted set says
        // otherwise.
        store
            .upsert(Recipient {
                opted_out: true,
                ..recipient("b", &[])
            })
            .await
            .unwrap();

        let segmenter = DirectorySegmenter::new(store);
        let mut posted_opt_out = recipient("c", &[]);
        posted_opt_out.opted_out = true;

        let out = segmenter
            .filter_opted_out(vec![recipient("a", &[]), recipient("b", &[]), posted_opt_out])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }
}
