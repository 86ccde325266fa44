//! Read-only view of the song and album catalog.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Free,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub url_mp3: Option<String>,
    #[serde(default)]
    pub url_aac: Option<String>,
    #[serde(default)]
    pub url_wav: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cover: Option<String>,
    /// Id of the album this song belongs to
    #[serde(default)]
    pub album: Option<String>,
}

impl Song {
    /// Stored file paths in preference order: mp3, aac, wav
    pub fn candidate_paths(&self) -> Vec<&str> {
        [&self.url_mp3, &self.url_aac, &self.url_wav]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

/// Source of catalog records
pub trait Catalog: Send + Sync + 'static {
    fn songs(&self) -> Vec<Song>;
    fn song(&self, id: &str) -> Option<Song>;
    fn album(&self, id: &str) -> Option<Album>;
    /// Albums, newest release first, undated last
    fn albums(&self) -> Vec<Album>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    albums: Vec<Album>,
    #[serde(default)]
    songs: Vec<Song>,
}

/// Catalog snapshot loaded from a JSON document at startup
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    songs: Vec<Song>,
    albums: Vec<Album>,
    song_index: HashMap<String, usize>,
    album_index: HashMap<String, usize>,
}

impl JsonCatalog {
    pub fn new(mut albums: Vec<Album>, songs: Vec<Song>) -> Self {
        // newest first, None sorts last
        albums.sort_by(|a, b| b.release_date.cmp(&a.release_date));

        let song_index = songs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let album_index = albums
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();

        Self {
            songs,
            albums,
            song_index,
            album_index,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Ok(Self::new(file.albums, file.songs))
    }

    /// Load `path`; a missing file gives an empty catalog
    pub async fn load(path: &Path) -> Result<Self> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                warn!(?path, "Catalog file not found, starting with an empty catalog");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(error).with_context(|| format!("Failed to read catalog {path:?}"));
            }
        };

        let catalog =
            Self::from_json(&json).with_context(|| format!("Failed to parse catalog {path:?}"))?;
        info!(
            songs = catalog.songs.len(),
            albums = catalog.albums.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }
}

impl Catalog for JsonCatalog {
    fn songs(&self) -> Vec<Song> {
        self.songs.clone()
    }

    fn song(&self, id: &str) -> Option<Song> {
        self.song_index.get(id).map(|&i| self.songs[i].clone())
    }

    fn album(&self, id: &str) -> Option<Album> {
        self.album_index.get(id).map(|&i| self.albums[i].clone())
    }

    fn albums(&self) -> Vec<Album> {
        self.albums.clone()
    }
}
