//! Media catalog collaborator boundary.
//!
//! The streaming core only needs the probed technical description of a
//! library item and whether it is directly playable; library scanning,
//! metadata and persistence live elsewhere. [`InMemoryCatalog`] is the
//! reference implementation used by the binary and the tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use ph_core::media::{MediaSource, MediaType};
use ph_core::{Error, MediaId, Result};

/// One playable library item as the catalog describes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    pub media_type: MediaType,
    pub title: String,
    pub source: MediaSource,
}

/// Lookup interface the session engine consumes.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Resolve a media reference to its probed description.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the item does not exist or is not of the
    /// requested type.
    async fn lookup(&self, media_type: MediaType, id: MediaId) -> Result<MediaItem>;
}

/// Simple in-memory catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: DashMap<MediaId, MediaItem>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item, replacing any previous entry with the same id.
    pub fn insert(&self, item: MediaItem) {
        self.items.insert(item.id, item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl MediaCatalog for InMemoryCatalog {
    async fn lookup(&self, media_type: MediaType, id: MediaId) -> Result<MediaItem> {
        let item = self
            .items
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("media", id))?;

        if item.media_type != media_type {
            return Err(Error::not_found("media", id));
        }

        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ph_core::media::{AudioCodec, FieldOrder, HdrFormat, VideoCodec};
    use std::path::PathBuf;

    fn item(media_type: MediaType) -> MediaItem {
        MediaItem {
            id: MediaId::new(),
            media_type,
            title: "Example".into(),
            source: MediaSource {
                path: PathBuf::from("/media/example.mkv"),
                container: "matroska".into(),
                video_codec: VideoCodec::H264,
                audio_codec: AudioCodec::Aac,
                width: 1920,
                height: 1080,
                duration_secs: 5400.0,
                hdr: HdrFormat::Sdr,
                field_order: FieldOrder::Progressive,
                direct_playable: true,
            },
        }
    }

    #[tokio::test]
    async fn lookup_round_trip() {
        let catalog = InMemoryCatalog::new();
        let movie = item(MediaType::Movie);
        let id = movie.id;
        catalog.insert(movie);

        let found = catalog.lookup(MediaType::Movie, id).await.unwrap();
        assert_eq!(found.title, "Example");
    }

    #[tokio::test]
    async fn lookup_missing_is_not_found() {
        let catalog = InMemoryCatalog::new();
        let err = catalog
            .lookup(MediaType::Movie, MediaId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn lookup_wrong_type_is_not_found() {
        let catalog = InMemoryCatalog::new();
        let movie = item(MediaType::Movie);
        let id = movie.id;
        catalog.insert(movie);

        let err = catalog.lookup(MediaType::Episode, id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
