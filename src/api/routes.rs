use crate::AppState;
use crate::catalog::{Access, Album, Song};
use crate::claim::unix_now;
use crate::delivery::deliver;
use crate::error::StreamError;
use crate::gate::Authorization;
use crate::locator::ResolvedAsset;
use crate::session::{CallerId, Session};
use axum::body::Body;
use axum::extract::{Extension, Path as AxumPath, Query};
use axum::http::{HeaderMap, HeaderValue, Response, header};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub sig: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    pub title: String,
    pub cover: Option<String>,
}

impl From<&Album> for AlbumRef {
    fn from(album: &Album) -> Self {
        Self {
            id: album.id.clone(),
            title: album.title.clone(),
            cover: album.cover.clone(),
        }
    }
}

/// One row of `GET /api/songs`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongListing {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub price: Option<f64>,
    pub access: Access,
    pub release_date: Option<DateTime<Utc>>,
    pub cover: Option<String>,
    pub album: Option<AlbumRef>,
    /// Signed stream URL, `None` when the song has no stored file
    pub url: Option<String>,
}

pub async fn stream_song(
    Extension(state): Extension<AppState>,
    Extension(Session(caller)): Extension<Session>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response<Body>, StreamError> {
    let range = headers.get(header::RANGE);

    serve_stream(&state, &id, query.sig.as_deref(), caller.as_ref(), range)
        .await
        .inspect_err(|err| {
            if let StreamError::Internal(error) = err {
                error!(resource_id = %id, ?range, ?error, "Stream request failed");
            }
        })
}

async fn serve_stream(
    state: &AppState,
    id: &str,
    sig: Option<&str>,
    caller: Option<&CallerId>,
    range: Option<&HeaderValue>,
) -> Result<Response<Body>, StreamError> {
    match state.gate.authorize(id, sig, caller) {
        Authorization::Unauthorized => {
            debug!(resource_id = id, has_token = sig.is_some(), "Unauthorized stream attempt");
            return Err(StreamError::Unauthorized);
        }
        Authorization::Token(claim) => {
            debug!(
                resource_id = id,
                caller_id = ?claim.caller_id,
                remaining_secs = claim.remaining(unix_now()),
                "Stream authorized by token"
            );
        }
        Authorization::Session(caller) => {
            debug!(resource_id = id, %caller, "Stream authorized by session");
        }
    }

    let song = state.catalog.song(id).ok_or(StreamError::SongNotFound)?;

    let candidates = song.candidate_paths();
    let (path, tried) = state.locator.resolve_with_trace(&candidates).await;
    let Some(path) = path else {
        debug!(resource_id = id, ?candidates, ?tried, "No candidate file resolved");
        return Err(StreamError::FileNotFound);
    };

    let asset = ResolvedAsset::probe(path)
        .await?
        .ok_or(StreamError::FileNotFound)?;

    deliver(id, &asset, range, state.stream_bucket()).await
}

pub async fn list_songs(
    Extension(state): Extension<AppState>,
    Extension(Session(caller)): Extension<Session>,
    headers: HeaderMap,
) -> Result<Json<Vec<SongListing>>, StreamError> {
    let base = request_base(state.public_base_url.as_deref(), &headers);

    let songs = state
        .catalog
        .songs()
        .into_iter()
        .map(|song| listing(&state, &base, caller.as_ref(), song))
        .collect::<anyhow::Result<Vec<_>>>()?;

    debug!(count = songs.len(), signed_for = ?caller, "Listed songs");
    Ok(Json(songs))
}

fn listing(
    state: &AppState,
    base: &str,
    caller: Option<&CallerId>,
    song: Song,
) -> anyhow::Result<SongListing> {
    let url = if song.candidate_paths().is_empty() {
        None
    } else {
        Some(state.stream_url(base, &song.id, caller)?)
    };
    let album = song
        .album
        .as_deref()
        .and_then(|id| state.catalog.album(id))
        .map(|album| AlbumRef::from(&album));

    Ok(SongListing {
        id: song.id,
        title: song.title,
        artist: song.artist,
        price: song.price,
        access: song.access,
        release_date: song.release_date,
        cover: song.cover,
        album,
        url,
    })
}

pub async fn list_albums(Extension(state): Extension<AppState>) -> Json<Vec<Album>> {
    Json(state.catalog.albums())
}

/// Origin for generated URLs: the configured base, else the request's `Host`
fn request_base(public_base_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(base) = public_base_url {
        return base.to_string();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    format!("http://{host}")
}
