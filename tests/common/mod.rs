#![allow(dead_code)]

use serde_json::json;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use stream_gate::Config;
use tokio::sync::OnceCell;
use tokio::time::sleep;

pub static SHARED_SERVER: OnceCell<TestServer> = OnceCell::const_new();

pub const STREAM_SECRET: &str = "integration-secret";
pub const RETIRED_SECRET: &str = "integration-secret-previous";
pub const SESSION_TOKEN: &str = "session-token-for-tests";
pub const SESSION_CALLER: &str = "tester";

/// Song id that needs escaping in a URL path
pub const ESCAPED_SONG_ID: &str = "rock/1 #x";

pub const SONG1_SIZE: usize = 1000;
pub const SONG2_SIZE: usize = 200;

/// Deterministic file content so ranges can be checked byte for byte
pub fn song_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Test harness that runs the server on its own runtime
pub struct TestServer {
    _handle: JoinHandle<()>,
    port: u16,
    workspace: PathBuf,
}

impl TestServer {
    /// Get or create shared test server instance
    pub async fn shared() -> &'static TestServer {
        SHARED_SERVER.get_or_init(|| async { Self::start().await }).await
    }

    async fn start() -> Self {
        // Only useful when debugging
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let port = portpicker::pick_unused_port().expect("No available port");
        let workspace = std::env::temp_dir().join(format!("stream-gate-test-{}", uuid::Uuid::new_v4()));
        let uploads = workspace.join("uploads");
        let catalog = workspace.join("catalog.json");
        seed_workspace(&workspace, &uploads, &catalog);

        let config = Config {
            listen_on_port: port,
            uploads_dir: uploads.to_string_lossy().into_owned(),
            catalog: catalog.to_string_lossy().into_owned(),
            stream_secret: STREAM_SECRET.to_string(),
            retired_stream_secrets: vec![RETIRED_SECRET.to_string()],
            session_tokens: vec![(SESSION_TOKEN.to_string(), SESSION_CALLER.to_string())],
            ..Default::default()
        };
        config.validate().expect("Invalid test configuration");

        // Spawn the server in a separate thread with its own runtime
        let handle = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                if let Err(error) = stream_gate::run(config).await {
                    panic!("Test server failed: {error:?}");
                }
            });
        });

        let server = TestServer {
            _handle: handle,
            port,
            workspace,
        };

        // Poll until server is ready
        let client = server.client();
        for _ in 0..200 {
            if let Ok(response) = client.get(server.url("/api/albums")).send().await
                && response.status().is_success()
            {
                break;
            }

            sleep(Duration::from_millis(10)).await;
        }

        server
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    /// Signed URL for `song_id` as handed out by the listing
    pub async fn listed_url(&self, client: &reqwest::Client, song_id: &str) -> String {
        let songs: serde_json::Value = client
            .get(self.url("/api/songs"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        songs
            .as_array()
            .unwrap()
            .iter()
            .find(|song| song["id"] == song_id)
            .and_then(|song| song["url"].as_str())
            .unwrap_or_else(|| panic!("No listed url for {song_id}"))
            .to_string()
    }
}

fn seed_workspace(workspace: &Path, uploads: &Path, catalog: &Path) {
    std::fs::create_dir_all(uploads).unwrap();
    std::fs::write(uploads.join("song1.mp3"), song_bytes(SONG1_SIZE)).unwrap();
    std::fs::write(uploads.join("empty.mp3"), b"").unwrap();
    // a directory where a file is expected is skipped, not served
    std::fs::create_dir_all(uploads.join("folder.mp3")).unwrap();

    // outside the uploads root, referenced by absolute path
    let wav = workspace.join("song2.wav");
    std::fs::write(&wav, song_bytes(SONG2_SIZE)).unwrap();

    let doc = json!({
        "albums": [
            { "id": "al-old", "title": "Old", "releaseDate": "2019-03-01T00:00:00Z" },
            { "id": "al-undated", "title": "Undated" },
            { "id": "al-new", "title": "New", "releaseDate": "2024-05-01T00:00:00Z", "cover": "covers/new.jpg" }
        ],
        "songs": [
            {
                "id": "song1",
                "title": "Song One",
                "artist": "The Testers",
                "urlMp3": "song1.mp3",
                "access": "paid",
                "price": 1.5,
                "album": "al-new"
            },
            {
                "id": "song2",
                "title": "Song Two",
                "urlMp3": "folder.mp3",
                "urlWav": wav.to_string_lossy()
            },
            { "id": "ghost", "title": "Ghost", "urlMp3": "never-uploaded.mp3" },
            { "id": ESCAPED_SONG_ID, "title": "Odd Id", "urlMp3": "song1.mp3" },
            { "id": "silent", "title": "Silent" },
            { "id": "empty", "title": "Empty", "urlMp3": "empty.mp3" }
        ]
    });
    std::fs::write(catalog, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
}
