//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs::{self, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures::future::BoxFuture;
use hcache::error;
use hcache::{CacheConfig, HttpTransport, Result};
use http::{HeaderMap, Request, Response};

/// One scripted transport answer
#[derive(Debug, Clone)]
pub enum Reply {
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Bytes,
        delay: Option<Duration>,
    },
    /// Connection-level failure
    Fail,
    /// Never completes
    Hang,
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Self::Respond {
            status: 200,
            headers: Vec::new(),
            body: Bytes::from_static(body.as_bytes()),
            delay: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            delay: None,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        if let Self::Respond { headers, .. } = &mut self {
            headers.push((name, value.into()));
        }
        self
    }

    pub fn delayed(mut self, by: Duration) -> Self {
        if let Self::Respond { delay, .. } = &mut self {
            *delay = Some(by);
        }
        self
    }

    fn build(status: u16, headers: &[(&'static str, String)], body: Bytes) -> Response<Bytes> {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        builder.body(body).expect("scripted response")
    }
}

/// Request as the transport saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub uri: String,
    pub headers: HeaderMap,
}

/// Transport answering from a script; once the script runs out `fallback` repeats
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::new();
        transport.push_all(replies);
        transport
    }

    pub fn always(reply: Reply) -> Self {
        let transport = Self::new();
        *transport.fallback.lock().expect("fallback lock") = Some(reply);
        transport
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().expect("script lock").push_back(reply);
    }

    pub fn push_all(&self, replies: impl IntoIterator<Item = Reply>) {
        self.script.lock().expect("script lock").extend(replies);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("at least one request")
    }

    fn next_reply(&self) -> Option<Reply> {
        let scripted = self.script.lock().expect("script lock").pop_front();
        scripted.or_else(|| self.fallback.lock().expect("fallback lock").clone())
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(RecordedRequest {
            uri: request.uri().to_string(),
            headers: request.headers().clone(),
        });
        let reply = self.next_reply();

        Box::pin(async move {
            match reply {
                Some(Reply::Respond {
                    status,
                    headers,
                    body,
                    delay,
                }) => {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(Reply::build(status, &headers, body))
                }
                Some(Reply::Fail) => Err(error::transport("connection refused")),
                Some(Reply::Hang) => std::future::pending().await,
                None => Err(error::transport("no scripted reply")),
            }
        })
    }
}

/// Configuration over `directory` with background eviction disabled
pub fn test_config(directory: &Path) -> CacheConfig {
    CacheConfig {
        auto_purge: false,
        ..CacheConfig::new(directory)
    }
}

pub fn files_with_extension(directory: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(directory)
        .expect("read cache directory")
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort();
    files
}

/// Move every entry's freshness deadline into the past
pub fn expire_all(directory: &Path) {
    let past = SystemTime::now() - Duration::from_secs(3600);
    for path in files_with_extension(directory, "bin") {
        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_times(FileTimes::new().set_modified(past)))
            .expect("set entry expiry");
    }
}

pub fn set_accessed(path: &Path, accessed: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_times(FileTimes::new().set_accessed(accessed)))
        .expect("set entry access time");
}
