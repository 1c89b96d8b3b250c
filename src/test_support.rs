//! Fakes for the HTTP and voice capabilities, shared by the unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio::sync::Notify;

use crate::{
    api::api_types::ChannelRef,
    config::JukeboxConfig,
    generation::http::{HttpClient, HttpRequest, HttpResponse, Method},
    playback::transport::{ConnectionHandle, PlaybackFinished, VoiceTransport},
    Error, Result,
};

pub(crate) const API_URL: &str = "http://provider.test/v1";

pub(crate) fn test_config(temp_dir: &Path) -> JukeboxConfig {
    JukeboxConfig {
        api_url: API_URL.to_string(),
        api_key: "test-key".to_string(),
        poll_interval: Duration::from_millis(1),
        temp_dir: temp_dir.to_path_buf(),
        ..JukeboxConfig::default()
    }
}

pub(crate) fn channel(channel_id: u64) -> ChannelRef {
    ChannelRef {
        channel_id,
        guild_id: channel_id / 10,
        user_id: 42,
        endpoint: "voice.test".to_string(),
        session_id: "voice-session".to_string(),
        voice_token: "voice-token".to_string(),
    }
}

#[derive(Clone, Debug)]
pub(crate) enum FakeResponse {
    Reply { status: u16, chunks: Vec<Vec<u8>> },
    /// Sends `chunks`, then the connection drops.
    BrokenBody { status: u16, chunks: Vec<Vec<u8>> },
    /// Sends `chunks`, then hangs without ever finishing.
    Stalled { status: u16, chunks: Vec<Vec<u8>> },
    NetworkDown,
}

impl FakeResponse {
    pub(crate) fn json(status: u16, value: serde_json::Value) -> Self {
        Self::Reply {
            status,
            chunks: vec![value.to_string().into_bytes()],
        }
    }

    pub(crate) fn text(status: u16, text: &str) -> Self {
        Self::Reply {
            status,
            chunks: vec![text.as_bytes().to_vec()],
        }
    }

    pub(crate) fn chunks(status: u16, chunks: Vec<Vec<u8>>) -> Self {
        Self::Reply { status, chunks }
    }
}

/// Serves scripted responses per method and url. Each request takes the
/// next scripted response; the last one repeats forever.
#[derive(Default)]
pub(crate) struct FakeHttpClient {
    routes: Mutex<HashMap<(Method, String), VecDeque<FakeResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttpClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_get(&self, url: &str, response: FakeResponse) {
        self.push(Method::Get, url, response);
    }

    pub(crate) fn push_post(&self, url: &str, response: FakeResponse) {
        self.push(Method::Post, url, response);
    }

    fn push(&self, method: Method, url: &str, response: FakeResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(response);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count_get(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == Method::Get && r.url == url)
            .count()
    }

    fn next_response(&self, method: Method, url: &str) -> Option<FakeResponse> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(method, url.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.next_response(request.method, &request.url);
        self.requests.lock().unwrap().push(request);

        let response = match response {
            Some(response) => response,
            None => FakeResponse::text(404, "no such route"),
        };
        match response {
            FakeResponse::Reply { status, chunks } => Ok(HttpResponse {
                status,
                body: stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed(),
            }),
            FakeResponse::BrokenBody { status, chunks } => {
                let mut items: Vec<io::Result<Bytes>> =
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                items.push(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
                Ok(HttpResponse {
                    status,
                    body: stream::iter(items).boxed(),
                })
            }
            FakeResponse::Stalled { status, chunks } => Ok(HttpResponse {
                status,
                body: stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
                    .chain(stream::pending())
                    .boxed(),
            }),
            FakeResponse::NetworkDown => Err(Error::NetworkFailure("connection refused".into())),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TransportCall {
    Connect(u64),
    Disconnect(ConnectionHandle),
    Start(PathBuf),
    Stop(ConnectionHandle),
}

/// Voice transport which plays nothing, but behaves like songbird: a
/// stopped track still reports that it finished.
#[derive(Default)]
pub(crate) struct FakeTransport {
    calls: Mutex<Vec<TransportCall>>,
    connect_gates: Mutex<HashMap<u64, Arc<Notify>>>,
    fail_connect: AtomicBool,
    fail_paths: Mutex<HashSet<PathBuf>>,
    next_handle: AtomicU64,
    overlapped: AtomicBool,
    playing: Mutex<HashMap<ConnectionHandle, PlaybackFinished>>,
    started: Mutex<Vec<PathBuf>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn started(&self) -> Vec<PathBuf> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn disconnect_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Disconnect(_)))
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Stop(_)))
    }

    /// 2 if a track was ever started over another one still playing.
    pub(crate) fn max_concurrent_playing(&self) -> usize {
        if self.overlapped.load(Ordering::SeqCst) {
            2
        } else if self.started.lock().unwrap().is_empty() {
            0
        } else {
            1
        }
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_start(&self, path: &Path) {
        self.fail_paths.lock().unwrap().insert(path.to_path_buf());
    }

    /// Makes connects to `channel_id` wait until the returned gate is notified.
    pub(crate) fn block_connect(&self, channel_id: u64) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.connect_gates
            .lock()
            .unwrap()
            .insert(channel_id, gate.clone());
        gate
    }

    /// Takes the finish notifier of whatever is playing, without firing it.
    pub(crate) fn take_notifier(&self) -> Option<PlaybackFinished> {
        let mut playing = self.playing.lock().unwrap();
        let handle = *playing.keys().next()?;
        playing.remove(&handle)
    }

    /// Pretends the playing track ran to its end.
    pub(crate) fn finish_current(&self, error: Option<String>) {
        let notifier = self.take_notifier().expect("nothing is playing");
        notifier.notify(error);
    }

    fn count<F: Fn(&TransportCall) -> bool>(&self, f: F) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| f(c)).count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(&self, channel: &ChannelRef) -> Result<ConnectionHandle> {
        self.record(TransportCall::Connect(channel.channel_id));
        let gate = self
            .connect_gates
            .lock()
            .unwrap()
            .get(&channel.channel_id)
            .cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Transport("voice server unreachable".into()));
        }
        Ok(ConnectionHandle(
            self.next_handle.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn disconnect(&self, handle: ConnectionHandle) {
        self.record(TransportCall::Disconnect(handle));
        self.playing.lock().unwrap().remove(&handle);
    }

    async fn start_playback(
        &self,
        handle: ConnectionHandle,
        path: &Path,
        on_finished: PlaybackFinished,
    ) -> Result<()> {
        self.record(TransportCall::Start(path.to_path_buf()));
        if self.fail_paths.lock().unwrap().contains(path) {
            return Err(Error::Transport("ffmpeg could not open file".into()));
        }
        let mut playing = self.playing.lock().unwrap();
        if playing.contains_key(&handle) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        playing.insert(handle, on_finished);
        self.started.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn stop_playback(&self, handle: ConnectionHandle) {
        self.record(TransportCall::Stop(handle));
        let notifier = self.playing.lock().unwrap().remove(&handle);
        if let Some(notifier) = notifier {
            notifier.notify(None);
        }
    }

    async fn is_playing(&self, handle: ConnectionHandle) -> bool {
        self.playing.lock().unwrap().contains_key(&handle)
    }
}
