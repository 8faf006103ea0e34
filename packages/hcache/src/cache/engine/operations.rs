//! Fetch and insert operations
//!
//! Per request the engine is in one of three states: no stored candidate, a
//! fresh candidate, or a stale candidate that needs revalidation. Fresh
//! candidates are answered from disk; everything else goes to the origin and
//! the response is classified into a [`CacheStatus`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use http::header::{ETAG, EXPIRES, LAST_MODIFIED};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::super::entry_pair::{self, Committed};
use super::super::fetch_result::{CacheStatus, FetchResult, stale_if_error_override};
use super::super::http_date;
use super::super::metadata::MetadataRecord;
use super::super::fingerprint;
use super::super::timestamp::{EntryName, EntryTimestamp, response_validator};
use super::super::validator::Validator;
use super::core::{CacheEngine, EngineInner};
use crate::error::{self, Result};
use crate::http::cache_control::CacheControl;
use crate::telemetry::CacheEvent;

/// Callback adjusting an outgoing request, e.g. to add credentials
pub type RequestMutator = Arc<dyn Fn(&mut Request<Bytes>) + Send + Sync>;

/// Per-fetch options
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Overrides [`CacheConfig::stale_if_error`](super::super::cache_config::CacheConfig)
    pub stale_if_error: Option<bool>,
    pub request_mutator: Option<RequestMutator>,
    pub cancellation: Option<CancellationToken>,
}

impl FetchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying the per-request override an adapter received in
    /// [`STALE_IF_ERROR_HEADER`](super::super::fetch_result::STALE_IF_ERROR_HEADER)
    #[must_use]
    pub fn from_request_headers(headers: &HeaderMap) -> Self {
        Self {
            stale_if_error: stale_if_error_override(headers),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stale_if_error(mut self, enabled: bool) -> Self {
        self.stale_if_error = Some(enabled);
        self
    }

    #[must_use]
    pub fn mutate_request<F>(mut self, mutator: F) -> Self
    where
        F: Fn(&mut Request<Bytes>) + Send + Sync + 'static,
    {
        self.request_mutator = Some(Arc::new(mutator));
        self
    }

    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("stale_if_error", &self.stale_if_error)
            .field("request_mutator", &self.request_mutator.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

/// Caller-supplied metadata for manual insertion
#[derive(Debug, Clone, Default)]
pub struct ItemMetadata {
    pub expires: Option<SystemTime>,
    pub last_modified: Option<SystemTime>,
    pub etag: Option<String>,
    pub headers: HeaderMap,
}

/// A value read from a fetch together with how the fetch was answered
#[derive(Debug)]
pub struct Fetched<T> {
    pub value: T,
    pub status: CacheStatus,
}

/// How an origin response maps onto a cache outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    /// `304`, or `no-store` on a revalidation: keep using the stored entry
    NotModified,
    /// `no-cache`: hand the response over without persisting it
    PassThrough,
    /// Non-success status
    OriginFailure(StatusCode),
    /// Success body to commit
    Cacheable,
}

fn classify(response: &Response<Bytes>, conditional: bool) -> Classification {
    let status = response.status();
    let directives = CacheControl::from_headers(response.headers());

    if conditional && (status == StatusCode::NOT_MODIFIED || directives.no_store) {
        Classification::NotModified
    } else if directives.no_cache && (conditional || status.is_success()) {
        Classification::PassThrough
    } else if !status.is_success() {
        Classification::OriginFailure(status)
    } else {
        Classification::Cacheable
    }
}

impl CacheEngine {
    /// Fetch `uri` through the cache.
    pub async fn fetch(&self, uri: &str, options: FetchOptions) -> Result<FetchResult> {
        let result = self.inner.fetch(uri, &options).await;
        match &result {
            Ok(fetched) => {
                self.inner.stats.record(fetched.status());
                self.inner.emit(&CacheEvent::Fetched {
                    resource: uri,
                    status: fetched.status(),
                    path: fetched.content_path(),
                });
            }
            Err(err) => {
                self.inner.stats.record_error();
                self.inner.emit(&CacheEvent::FetchFailed {
                    resource: uri,
                    error: err,
                });
            }
        }
        result
    }

    pub async fn fetch_bytes(&self, uri: &str, options: FetchOptions) -> Result<Fetched<Bytes>> {
        let result = self.fetch(uri, options).await?;
        let status = result.status();
        Ok(Fetched {
            value: result.bytes().await?,
            status,
        })
    }

    pub async fn fetch_string(&self, uri: &str, options: FetchOptions) -> Result<Fetched<String>> {
        let result = self.fetch(uri, options).await?;
        let status = result.status();
        Ok(Fetched {
            value: result.text().await?,
            status,
        })
    }

    pub async fn fetch_stream(
        &self,
        uri: &str,
        options: FetchOptions,
    ) -> Result<Fetched<Box<dyn AsyncRead + Send + Unpin>>> {
        let result = self.fetch(uri, options).await?;
        let status = result.status();
        Ok(Fetched {
            value: result.into_reader().await?,
            status,
        })
    }

    /// Copy the body of `uri` to `destination`, returning the bytes written
    pub async fn fetch_to_file(
        &self,
        uri: &str,
        destination: &Path,
        options: FetchOptions,
    ) -> Result<Fetched<u64>> {
        let result = self.fetch(uri, options).await?;
        let status = result.status();
        Ok(Fetched {
            value: result.copy_to(destination).await?,
            status,
        })
    }

    pub async fn fetch_response(
        &self,
        uri: &str,
        options: FetchOptions,
    ) -> Result<Fetched<Response<Bytes>>> {
        let result = self.fetch(uri, options).await?;
        let status = result.status();
        Ok(Fetched {
            value: result.into_response().await?,
            status,
        })
    }

    /// Commit `body` as the entry for `uri` without contacting the origin.
    ///
    /// Any other entry stored for `uri` is purged so the new one is served.
    pub async fn add_item(
        &self,
        uri: &str,
        body: impl Into<Bytes>,
        metadata: ItemMetadata,
    ) -> Result<FetchResult> {
        let body: Bytes = body.into();
        self.add_reader(uri, &mut body.as_ref(), metadata).await
    }

    /// Commit a complete response as the entry for `uri`.
    pub async fn add_response(&self, uri: &str, response: Response<Bytes>) -> Result<FetchResult> {
        let fingerprint = fingerprint::compute(uri);
        let now = SystemTime::now();
        let timestamp = EntryTimestamp::from_response(response.headers(), now);
        let validator = response_validator(response.headers());
        let record = MetadataRecord::from_response(Some(uri), &response);

        let committed = self
            .inner
            .commit_reader(
                &fingerprint,
                &mut response.body().as_ref(),
                &record,
                &timestamp,
                &validator,
                now,
            )
            .await?;
        self.inner
            .supersede(&fingerprint, &committed.pair.content_path, None)
            .await;
        Ok(stored(committed, CacheStatus::Stored))
    }

    /// Stream `reader` into a new entry for `uri`.
    pub async fn add_reader<R>(
        &self,
        uri: &str,
        reader: &mut R,
        metadata: ItemMetadata,
    ) -> Result<FetchResult>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let fingerprint = fingerprint::compute(uri);
        let now = SystemTime::now();
        let headers = metadata.merged_headers()?;
        let timestamp = EntryTimestamp::from_response(&headers, now);
        let validator = response_validator(&headers);
        let record = MetadataRecord::from_headers(Some(uri), &headers);

        let committed = self
            .inner
            .commit_reader(&fingerprint, reader, &record, &timestamp, &validator, now)
            .await?;
        self.inner
            .supersede(&fingerprint, &committed.pair.content_path, None)
            .await;
        Ok(stored(committed, CacheStatus::Stored))
    }
}

impl ItemMetadata {
    /// Caller headers with the explicit fields written over them
    fn merged_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.headers.clone();
        if let Some(expires) = self.expires {
            headers.insert(EXPIRES, date_value(expires)?);
        }
        if let Some(last_modified) = self.last_modified {
            headers.insert(LAST_MODIFIED, date_value(last_modified)?);
        }
        // A blank tag means no validator
        let validator = Validator::from_header_value(self.etag.as_deref());
        if !validator.is_empty() {
            let wire = validator.wire_form()?;
            headers.insert(ETAG, HeaderValue::from_str(&wire).map_err(error::invalid_state)?);
        }
        Ok(headers)
    }
}

fn date_value(time: SystemTime) -> Result<HeaderValue> {
    HeaderValue::from_str(&http_date::fmt_http_date(time)).map_err(error::invalid_state)
}

fn stored(committed: Committed, status: CacheStatus) -> FetchResult {
    FetchResult::Stored {
        content_path: committed.pair.content_path,
        meta_path: committed.pair.meta_path,
        status,
    }
}

/// What the directory holds for a fingerprint
enum Lookup {
    Missing,
    Fresh(PathBuf),
    Stale(PathBuf, EntryTimestamp),
}

/// Find the candidate for `fingerprint` and decide its freshness; fresh hits are recorded.
fn lookup(directory: &Path, fingerprint: &str, now: SystemTime) -> Result<Lookup> {
    let Some(content_path) = entry_pair::find_candidate(directory, fingerprint)? else {
        return Ok(Lookup::Missing);
    };

    match EntryTimestamp::from_stored_entry(&content_path) {
        Ok(timestamp) if timestamp.is_fresh_at(now) => {
            touch_entry(&content_path);
            Ok(Lookup::Fresh(content_path))
        }
        Ok(timestamp) => Ok(Lookup::Stale(content_path, timestamp)),
        Err(err) => {
            tracing::debug!(
                target: "hcache::cache::engine",
                path = %content_path.display(),
                error = %err,
                "Candidate vanished before it could be read"
            );
            Ok(Lookup::Missing)
        }
    }
}

fn touch_entry(content_path: &Path) {
    if let Err(err) = entry_pair::touch(content_path) {
        tracing::debug!(
            target: "hcache::cache::engine",
            path = %content_path.display(),
            error = %err,
            "Failed to record entry access"
        );
    }
}

/// Run directory work on the blocking pool
async fn off_executor<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(error::invalid_state)?
}

fn stored_at(content_path: PathBuf, status: CacheStatus) -> FetchResult {
    let pair = entry_pair::EntryPair::for_content(content_path);
    FetchResult::Stored {
        content_path: pair.content_path,
        meta_path: pair.meta_path,
        status,
    }
}

impl EngineInner {
    async fn fetch(self: &Arc<Self>, uri: &str, options: &FetchOptions) -> Result<FetchResult> {
        if options
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(error::canceled(uri));
        }

        let fingerprint = fingerprint::compute(uri);
        let stale_if_error = options.stale_if_error.unwrap_or(self.config.stale_if_error);

        let found = {
            let directory = self.config.directory.clone();
            let fingerprint = fingerprint.clone();
            off_executor(move || lookup(&directory, &fingerprint, SystemTime::now())).await?
        };

        match found {
            Lookup::Missing => self.fetch_uncached(uri, &fingerprint, options).await,
            Lookup::Fresh(content_path) => {
                tracing::trace!(
                    target: "hcache::cache::engine",
                    resource = uri,
                    "Serving fresh entry"
                );
                Ok(stored_at(content_path, CacheStatus::Hit))
            }
            Lookup::Stale(content_path, timestamp) => {
                self.revalidate(uri, &fingerprint, content_path, &timestamp, stale_if_error, options)
                    .await
            }
        }
    }

    async fn fetch_uncached(
        &self,
        uri: &str,
        fingerprint: &str,
        options: &FetchOptions,
    ) -> Result<FetchResult> {
        let request = build_request(uri, options)?;
        let response = self.send(uri, request, options).await?;

        match classify(&response, false) {
            Classification::PassThrough => Ok(FetchResult::Live {
                response,
                status: CacheStatus::NoCache,
            }),
            Classification::OriginFailure(status) if status == StatusCode::NOT_MODIFIED => {
                Err(error::unexpected_response(uri, status))
            }
            Classification::OriginFailure(status) => Err(error::origin(uri, status)),
            Classification::Cacheable => {
                let committed = self.commit_response(uri, fingerprint, &response).await?;
                Ok(stored(committed, CacheStatus::Stored))
            }
            Classification::NotModified => Err(error::unexpected_response(uri, response.status())),
        }
    }

    async fn revalidate(
        self: &Arc<Self>,
        uri: &str,
        fingerprint: &str,
        content_path: PathBuf,
        timestamp: &EntryTimestamp,
        stale_if_error: bool,
        options: &FetchOptions,
    ) -> Result<FetchResult> {
        let mut validator = EntryName::from_path(&content_path)
            .map(|name| name.validator)
            .unwrap_or_default();
        if validator.is_empty() {
            validator = sidecar_validator(&content_path).await;
        }
        let mut request = build_request(uri, options)?;
        timestamp.apply_conditional_headers(&mut request, &validator)?;

        let response = match self.send(uri, request, options).await {
            Ok(response) => response,
            Err(err) if stale_if_error && err.allows_stale_fallback() => {
                return Ok(self.serve_stale(uri, content_path, &err).await);
            }
            Err(err) => return Err(err),
        };

        match classify(&response, true) {
            Classification::NotModified => {
                self.record_access(&content_path).await;
                Ok(stored_at(content_path, CacheStatus::Revalidate))
            }
            Classification::PassThrough => Ok(FetchResult::Live {
                response,
                status: CacheStatus::NoCache,
            }),
            Classification::OriginFailure(status) => {
                let err = error::origin(uri, status);
                if stale_if_error {
                    Ok(self.serve_stale(uri, content_path, &err).await)
                } else {
                    Err(err)
                }
            }
            Classification::Cacheable => {
                let committed = self.commit_response(uri, fingerprint, &response).await?;
                self.supersede(fingerprint, &committed.pair.content_path, Some(&content_path))
                    .await;
                Ok(stored(committed, CacheStatus::Stored))
            }
        }
    }

    async fn serve_stale(&self, uri: &str, content_path: PathBuf, err: &error::Error) -> FetchResult {
        tracing::warn!(
            target: "hcache::cache::engine",
            resource = uri,
            error = %err,
            "Origin failed, serving stale entry"
        );
        self.emit(&CacheEvent::StaleServed {
            resource: uri,
            error: err,
        });
        self.record_access(&content_path).await;
        stored_at(content_path, CacheStatus::UseStaleDueToError)
    }

    /// Send through the transport, applying the request timeout and caller cancellation.
    ///
    /// Once the caller's token is cancelled every failure is reported as
    /// cancellation so it can never be masked by a stale fallback.
    async fn send(
        &self,
        uri: &str,
        request: Request<Bytes>,
        options: &FetchOptions,
    ) -> Result<Response<Bytes>> {
        let timeout = self.config.request_timeout;
        let exchange = async {
            let send = self.transport.send(request);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, send).await {
                    Ok(result) => result,
                    Err(_) => Err(error::timeout()),
                },
                None => send.await,
            }
        };

        let result = match &options.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(error::canceled(uri)),
                result = exchange => result,
            },
            None => exchange.await,
        };

        let cancelled = options
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled);
        match result {
            Err(_) if cancelled => Err(error::canceled(uri)),
            Err(err) if err.resource().is_none() => Err(err.with_resource(uri)),
            other => other,
        }
    }

    async fn commit_response(
        &self,
        uri: &str,
        fingerprint: &str,
        response: &Response<Bytes>,
    ) -> Result<Committed> {
        let now = SystemTime::now();
        let timestamp = EntryTimestamp::from_response(response.headers(), now);
        let validator = response_validator(response.headers());
        let record = MetadataRecord::from_response(Some(uri), response);

        self.commit_reader(
            fingerprint,
            &mut response.body().as_ref(),
            &record,
            &timestamp,
            &validator,
            now,
        )
        .await
    }

    /// Stage body and metadata as temp files, then publish them atomically.
    pub(super) async fn commit_reader<R>(
        &self,
        fingerprint: &str,
        reader: &mut R,
        record: &MetadataRecord,
        timestamp: &EntryTimestamp,
        validator: &Validator,
        now: SystemTime,
    ) -> Result<Committed>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let directory = &self.config.directory;
        let temp_content = entry_pair::temp_path(directory, fingerprint);
        let temp_meta = entry_pair::temp_path(directory, fingerprint);

        let staged = async {
            let mut file = tokio::fs::File::create(&temp_content).await?;
            tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            drop(file);
            tokio::fs::write(&temp_meta, record.to_json()?).await?;
            Ok::<_, error::Error>(())
        }
        .await;

        if let Err(err) = staged {
            let _ = tokio::fs::remove_file(&temp_content).await;
            let _ = tokio::fs::remove_file(&temp_meta).await;
            return Err(err);
        }

        let committed = {
            let directory = directory.clone();
            let fingerprint = fingerprint.to_string();
            let validator = validator.clone();
            let timestamp = *timestamp;
            off_executor(move || {
                entry_pair::commit(
                    &directory,
                    &temp_content,
                    &temp_meta,
                    &fingerprint,
                    &validator,
                    &timestamp,
                    now,
                )
            })
            .await?
        };
        self.emit(&CacheEvent::Committed {
            path: &committed.pair.content_path,
            reused: committed.reused,
        });
        Ok(committed)
    }

    /// Purge entries replaced by the one at `keep`.
    ///
    /// With `only` set, just that entry is purged; otherwise every other entry
    /// for the fingerprint. Failures are logged and left for eviction.
    pub(super) async fn supersede(
        self: &Arc<Self>,
        fingerprint: &str,
        keep: &Path,
        only: Option<&Path>,
    ) {
        let inner = Arc::clone(self);
        let prefix = format!("{fingerprint}_");
        let keep = keep.to_path_buf();
        let only = only.map(Path::to_path_buf);

        let purged = tokio::task::spawn_blocking(move || {
            let replaced: Vec<PathBuf> = match only {
                Some(path) => vec![path],
                None => entry_pair::list_entries(&inner.config.directory)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|path| {
                        path.file_name()
                            .and_then(|name| name.to_str())
                            .is_some_and(|name| name.starts_with(&prefix))
                    })
                    .collect(),
            };

            for path in replaced.iter().filter(|path| **path != keep) {
                if let Err(err) = inner.purge_entry(path) {
                    tracing::warn!(
                        target: "hcache::cache::engine",
                        path = %path.display(),
                        error = %err,
                        "Failed to purge superseded entry"
                    );
                }
            }
        })
        .await;

        if let Err(join_err) = purged {
            tracing::error!(
                target: "hcache::cache::engine",
                error = %join_err,
                "Superseded entry purge panicked"
            );
        }
    }

    async fn record_access(&self, content_path: &Path) {
        let content_path = content_path.to_path_buf();
        let touched = tokio::task::spawn_blocking(move || touch_entry(&content_path)).await;
        if let Err(join_err) = touched {
            tracing::debug!(
                target: "hcache::cache::engine",
                error = %join_err,
                "Access recording task failed"
            );
        }
    }
}

/// Validator kept only in the sidecar because it was too long for the entry name
async fn sidecar_validator(content_path: &Path) -> Validator {
    let meta_path = entry_pair::EntryPair::for_content(content_path).meta_path;
    match MetadataRecord::read(&meta_path).await {
        Ok(record) => response_validator(&record.headers()),
        Err(err) => {
            tracing::debug!(
                target: "hcache::cache::engine",
                path = %meta_path.display(),
                error = %err,
                "Metadata unreadable, revalidating without a validator"
            );
            Validator::EMPTY
        }
    }
}

fn build_request(uri: &str, options: &FetchOptions) -> Result<Request<Bytes>> {
    let url = url::Url::parse(uri).map_err(|err| error::invalid_uri(uri, err))?;
    let mut request = Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .body(Bytes::new())
        .map_err(|err| error::invalid_uri(uri, err))?;

    if let Some(mutator) = &options.request_mutator {
        mutator(&mut request);
    }
    Ok(request)
}
