//! Blocking facade over [`CacheEngine`]
//!
//! For callers on threads that cannot suspend. The facade owns a small tokio
//! runtime which drives the engine, its transport and background eviction.
//! It must not be created, used or dropped from inside an async context.

use std::io::{ErrorKind, Read};
use std::path::Path;

use bytes::Bytes;
use http::Response;
use tokio::runtime::Runtime;
use tokio_util::io::StreamReader;

use super::super::cache_config::CacheConfig;
use super::super::cache_stats::CacheStats;
use super::super::fetch_result::FetchResult;
use super::core::{CacheEngine, CacheEngineBuilder};
use super::operations::{FetchOptions, Fetched, ItemMetadata};
use super::super::metadata::MetadataRecord;
use crate::error::{self, Result};

/// Chunk size read from a caller's reader
const PUMP_CHUNK: usize = 64 * 1024;
/// Chunks buffered between the reader thread and the commit
const PUMP_DEPTH: usize = 4;

/// Synchronous cache handle
#[derive(Debug)]
pub struct BlockingCache {
    // Dropped before the runtime so the eviction task is aborted first
    engine: CacheEngine,
    runtime: Runtime,
}

impl BlockingCache {
    /// Cache with the default transport
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::from_builder(CacheEngine::builder(config))
    }

    /// Build the engine described by `builder` on a dedicated runtime
    pub fn from_builder(builder: CacheEngineBuilder) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("hcache-blocking")
            .enable_all()
            .build()
            .map_err(|err| error::configuration(format!("cannot start cache runtime: {err}")))?;

        let engine = {
            let _enter = runtime.enter();
            builder.build()?
        };

        Ok(Self { engine, runtime })
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    pub fn stats(&self) -> &CacheStats {
        self.engine.stats()
    }

    pub fn fetch(&self, uri: &str, options: FetchOptions) -> Result<FetchResult> {
        self.runtime.block_on(self.engine.fetch(uri, options))
    }

    pub fn fetch_bytes(&self, uri: &str, options: FetchOptions) -> Result<Fetched<Bytes>> {
        self.runtime.block_on(self.engine.fetch_bytes(uri, options))
    }

    pub fn fetch_string(&self, uri: &str, options: FetchOptions) -> Result<Fetched<String>> {
        self.runtime.block_on(self.engine.fetch_string(uri, options))
    }

    pub fn fetch_to_file(
        &self,
        uri: &str,
        destination: &Path,
        options: FetchOptions,
    ) -> Result<Fetched<u64>> {
        self.runtime
            .block_on(self.engine.fetch_to_file(uri, destination, options))
    }

    /// Body of `uri` as a synchronous reader
    pub fn fetch_stream(
        &self,
        uri: &str,
        options: FetchOptions,
    ) -> Result<Fetched<Box<dyn Read + Send>>> {
        let result = self.fetch(uri, options)?;
        let status = result.status();
        Ok(Fetched {
            value: self.open_reader(result)?,
            status,
        })
    }

    pub fn fetch_response(
        &self,
        uri: &str,
        options: FetchOptions,
    ) -> Result<Fetched<Response<Bytes>>> {
        self.runtime.block_on(self.engine.fetch_response(uri, options))
    }

    pub fn add_item(
        &self,
        uri: &str,
        body: impl Into<Bytes>,
        metadata: ItemMetadata,
    ) -> Result<FetchResult> {
        self.runtime.block_on(self.engine.add_item(uri, body, metadata))
    }

    pub fn add_response(&self, uri: &str, response: Response<Bytes>) -> Result<FetchResult> {
        self.runtime.block_on(self.engine.add_response(uri, response))
    }

    /// Stream `reader` into a new entry for `uri`.
    ///
    /// The reader is drained on the runtime's blocking pool. If it fails the
    /// staged files are dropped and nothing is committed.
    pub fn add_reader<R>(
        &self,
        uri: &str,
        mut reader: R,
        metadata: ItemMetadata,
    ) -> Result<FetchResult>
    where
        R: Read + Send + 'static,
    {
        self.runtime.block_on(async {
            let (sender, mut receiver) =
                tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(PUMP_DEPTH);
            let pump = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; PUMP_CHUNK];
                loop {
                    let chunk = match reader.read(&mut buf) {
                        Ok(0) => return,
                        Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                        Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                        Err(err) => Err(err),
                    };
                    let failed = chunk.is_err();
                    // A closed channel means the commit gave up already
                    if sender.blocking_send(chunk).is_err() || failed {
                        return;
                    }
                }
            });

            let mut body =
                StreamReader::new(futures::stream::poll_fn(move |cx| receiver.poll_recv(cx)));
            let stored = self.engine.add_reader(uri, &mut body, metadata).await;
            drop(body);
            pump.await.map_err(error::invalid_state)?;
            stored
        })
    }

    /// Read a result's body on the cache runtime
    pub fn read_bytes(&self, result: FetchResult) -> Result<Bytes> {
        self.runtime.block_on(result.bytes())
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn read_text(&self, result: FetchResult) -> Result<String> {
        self.runtime.block_on(result.text())
    }

    pub fn read_metadata(&self, result: &FetchResult) -> Result<MetadataRecord> {
        self.runtime.block_on(result.metadata())
    }

    /// Write a result's body to `destination`, returning the bytes written
    pub fn copy_to(&self, result: FetchResult, destination: &Path) -> Result<u64> {
        self.runtime.block_on(result.copy_to(destination))
    }

    pub fn read_response(&self, result: FetchResult) -> Result<Response<Bytes>> {
        self.runtime.block_on(result.into_response())
    }

    /// Body as a synchronous reader; stored entries are read straight from disk
    pub fn open_reader(&self, result: FetchResult) -> Result<Box<dyn Read + Send>> {
        match result {
            FetchResult::Stored { content_path, .. } => {
                Ok(Box::new(std::fs::File::open(content_path)?))
            }
            FetchResult::Live { response, .. } => {
                Ok(Box::new(std::io::Cursor::new(response.into_body())))
            }
        }
    }

    pub fn purge_old(&self) -> Result<usize> {
        self.runtime.block_on(self.engine.purge_old())
    }

    pub fn purge(&self) -> Result<usize> {
        self.runtime.block_on(self.engine.purge())
    }
}
