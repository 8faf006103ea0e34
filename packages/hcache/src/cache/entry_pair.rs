//! The two files making up one stored entry
//!
//! Every entry is a content blob (`.bin`) plus a JSON metadata sidecar
//! (`.json`) sharing the stem described in [`super::timestamp::EntryName`].
//! Files are staged under temporary names and only become visible complete.
//! The content file is published with an exclusive hard link, so exactly one
//! writer owns a name and only that writer moves the sidecar into place.
//! Lookups skip a content file whose sidecar has not appeared yet.

use std::fs::{self, FileTimes, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::timestamp::{
    CONTENT_EXTENSION, EntryName, EntryTimestamp, META_EXTENSION, NO_EXPIRY, TEMP_EXTENSION,
};
use super::validator::Validator;
use crate::error::{self, Result};

/// How long a losing writer waits for the winner's sidecar
const SIDECAR_WAIT: Duration = Duration::from_millis(250);
const SIDECAR_POLL: Duration = Duration::from_millis(2);

/// Paths of a content blob and its metadata sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPair {
    pub content_path: PathBuf,
    pub meta_path: PathBuf,
}

/// Outcome of [`commit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub pair: EntryPair,
    /// An entry with the same name already existed and was kept
    pub reused: bool,
}

impl EntryPair {
    #[must_use]
    pub fn for_content(content_path: impl Into<PathBuf>) -> Self {
        let content_path = content_path.into();
        let meta_path = content_path.with_extension(META_EXTENSION);
        Self {
            content_path,
            meta_path,
        }
    }

    #[must_use]
    pub fn in_dir(directory: &Path, name: &EntryName) -> Self {
        Self {
            content_path: directory.join(name.content_file_name()),
            meta_path: directory.join(name.meta_file_name()),
        }
    }
}

/// Fresh, unused temporary path in `directory`
#[must_use]
pub fn temp_path(directory: &Path, prefix: &str) -> PathBuf {
    directory.join(format!(
        "{prefix}.{:016x}.{TEMP_EXTENSION}",
        fastrand::u64(..)
    ))
}

/// Every committed content file in `directory`.
///
/// A missing directory has no entries.
pub fn list_entries(directory: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(directory) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut entries = Vec::new();
    for dir_entry in read_dir {
        let path = dir_entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(CONTENT_EXTENSION)
            && EntryName::from_path(&path).is_some()
        {
            entries.push(path);
        }
    }
    Ok(entries)
}

/// Content file stored for `fingerprint`, if any.
///
/// Several files only match while concurrent commits of different versions
/// race; the one with the earliest freshness deadline is chosen so the caller
/// revalidates rather than trusting an unresolved write.
pub fn find_candidate(directory: &Path, fingerprint: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{fingerprint}_");
    let mut best: Option<(SystemTime, PathBuf)> = None;

    for path in list_entries(directory)? {
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&prefix));
        if !matches {
            continue;
        }
        // Still being published
        if !EntryPair::for_content(&path).meta_path.exists() {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            // Purged between listing and stat
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };

        if best.as_ref().is_none_or(|(earliest, _)| modified < *earliest) {
            best = Some((modified, path));
        }
    }

    Ok(best.map(|(_, path)| path))
}

/// Publish staged files as the entry named by `fingerprint`, `validator` and `timestamp`.
///
/// The staged content file receives the entry's filesystem timestamps first.
/// When an entry with the same name already exists the staged files are
/// discarded and the existing entry is kept (first writer wins); its deadline
/// is only ever moved later.
pub fn commit(
    directory: &Path,
    temp_content: &Path,
    temp_meta: &Path,
    fingerprint: &str,
    validator: &Validator,
    timestamp: &EntryTimestamp,
    now: SystemTime,
) -> Result<Committed> {
    let result = set_entry_times(temp_content, timestamp, now).and_then(|()| {
        let name = timestamp.entry_name(fingerprint, validator, now);
        publish(
            EntryPair::in_dir(directory, &name),
            temp_content,
            temp_meta,
            timestamp,
        )
    });
    discard(temp_content);
    discard(temp_meta);
    result
}

fn publish(
    pair: EntryPair,
    temp_content: &Path,
    temp_meta: &Path,
    timestamp: &EntryTimestamp,
) -> Result<Committed> {
    let mut orphan_cleared = false;
    loop {
        match fs::hard_link(temp_content, &pair.content_path) {
            Ok(()) => break,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                if wait_for_sidecar(&pair.meta_path) {
                    extend_expiry(&pair.content_path, timestamp)?;
                    tracing::debug!(
                        target: "hcache::cache::entry_pair",
                        path = %pair.content_path.display(),
                        "Reusing existing entry"
                    );
                    return Ok(Committed { pair, reused: true });
                }
                if orphan_cleared {
                    return Err(error::locked_resource(format!(
                        "{} is held by a writer that never published its metadata",
                        pair.content_path.display()
                    )));
                }
                // The owning writer died between the two publication steps
                tracing::warn!(
                    target: "hcache::cache::entry_pair",
                    path = %pair.content_path.display(),
                    "Removing content file without metadata"
                );
                discard(&pair.content_path);
                orphan_cleared = true;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Err(err) = fs::rename(temp_meta, &pair.meta_path) {
        discard(&pair.content_path);
        return Err(err.into());
    }

    tracing::debug!(
        target: "hcache::cache::entry_pair",
        path = %pair.content_path.display(),
        expiry = ?timestamp.expiry,
        "Committed entry"
    );
    Ok(Committed {
        pair,
        reused: false,
    })
}

/// Wait until the owner of an existing content file has published its sidecar
fn wait_for_sidecar(meta_path: &Path) -> bool {
    let mut waited = Duration::ZERO;
    loop {
        if meta_path.exists() {
            return true;
        }
        if waited >= SIDECAR_WAIT {
            return false;
        }
        std::thread::sleep(SIDECAR_POLL);
        waited += SIDECAR_POLL;
    }
}

/// Remove one entry.
///
/// Both files are first renamed to temporary names and then deleted. If a
/// rename fails, for instance because a reader holds the file open, the
/// already-moved file is put back and a `LockedResource` error is returned. If
/// putting it back fails as well the entry is lost mid-flight and a
/// `StorageCorruption` error is returned.
pub fn purge_one(content_path: &Path) -> Result<()> {
    let pair = EntryPair::for_content(content_path);
    let directory = content_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = content_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("entry");
    let moved_content = temp_path(directory, stem);
    let moved_meta = temp_path(directory, stem);

    match fs::rename(&pair.content_path, &moved_content) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            // Already purged by someone else; drop an orphaned sidecar if one is left
            discard(&pair.meta_path);
            return Ok(());
        }
        Err(err) => return Err(error::locked_resource(err)),
    }

    match fs::rename(&pair.meta_path, &moved_meta) {
        Ok(()) => discard(&moved_meta),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            if let Err(restore_err) = fs::rename(&moved_content, &pair.content_path) {
                tracing::error!(
                    target: "hcache::cache::entry_pair",
                    path = %pair.content_path.display(),
                    error = %restore_err,
                    "Failed to restore entry after interrupted purge"
                );
                return Err(error::storage_corruption(format!(
                    "{} could not be restored from {}: {restore_err}",
                    pair.content_path.display(),
                    moved_content.display()
                )));
            }
            return Err(error::locked_resource(err));
        }
    }

    discard(&moved_content);
    Ok(())
}

/// Record a read of the entry for least-recently-used eviction.
pub fn touch(content_path: &Path) -> Result<()> {
    let file = OpenOptions::new().write(true).open(content_path)?;
    file.set_times(FileTimes::new().set_accessed(SystemTime::now()))?;
    Ok(())
}

fn set_entry_times(path: &Path, timestamp: &EntryTimestamp, now: SystemTime) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let times = FileTimes::new()
        .set_modified(timestamp.stored_expiry())
        .set_accessed(now);

    #[cfg(windows)]
    let times = {
        use std::os::windows::fs::FileTimesExt;
        times.set_created(timestamp.last_modified.unwrap_or(now))
    };

    file.set_times(times)?;
    Ok(())
}

fn extend_expiry(content_path: &Path, timestamp: &EntryTimestamp) -> Result<()> {
    let Some(expiry) = timestamp.expiry else {
        return Ok(());
    };

    let file = match OpenOptions::new().write(true).open(content_path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let current = file.metadata()?.modified()?;
    if current == NO_EXPIRY || current < expiry {
        file.set_times(FileTimes::new().set_modified(expiry))?;
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != ErrorKind::NotFound
    {
        tracing::warn!(
            target: "hcache::cache::entry_pair",
            path = %path.display(),
            error = %err,
            "Failed to remove file"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::cache::fingerprint;

    fn stage(directory: &Path, body: &[u8]) -> (PathBuf, PathBuf) {
        let content = temp_path(directory, "stage");
        let meta = temp_path(directory, "stage");
        fs::write(&content, body).unwrap_or_else(|e| panic!("write content: {e}"));
        fs::write(&meta, b"{}").unwrap_or_else(|e| panic!("write meta: {e}"));
        (content, meta)
    }

    fn expiring_at(secs: u64) -> EntryTimestamp {
        EntryTimestamp {
            last_modified: Some(UNIX_EPOCH + Duration::from_secs(784_111_777)),
            expiry: Some(UNIX_EPOCH + Duration::from_secs(secs)),
        }
    }

    fn dir_names(directory: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(directory)
            .unwrap_or_else(|e| panic!("read_dir: {e}"))
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_commit_publishes_pair() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let fp = fingerprint::compute("https://example/a");
        let (content, meta) = stage(dir.path(), b"body");
        let timestamp = expiring_at(4_000_000_000);

        let committed = commit(
            dir.path(),
            &content,
            &meta,
            &fp,
            &Validator::Strong("v1".to_string()),
            &timestamp,
            SystemTime::now(),
        )
        .unwrap_or_else(|e| panic!("commit: {e}"));

        assert!(!committed.reused);
        assert!(committed.pair.meta_path.exists());
        assert_eq!(
            fs::read(&committed.pair.content_path).ok().as_deref(),
            Some(&b"body"[..])
        );
        let stored = EntryTimestamp::from_stored_entry(&committed.pair.content_path)
            .unwrap_or_else(|e| panic!("decode: {e}"));
        assert_eq!(stored, timestamp);
        assert_eq!(dir_names(dir.path()).len(), 2);
    }

    #[test]
    fn test_second_identical_commit_reuses_first() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let fp = fingerprint::compute("https://example/a");
        let validator = Validator::Strong("v1".to_string());

        let (content, meta) = stage(dir.path(), b"first");
        let first = commit(dir.path(), &content, &meta, &fp, &validator, &expiring_at(4_000_000_000), SystemTime::now())
            .unwrap_or_else(|e| panic!("commit: {e}"));
        let (content, meta) = stage(dir.path(), b"second");
        let second = commit(dir.path(), &content, &meta, &fp, &validator, &expiring_at(4_100_000_000), SystemTime::now())
            .unwrap_or_else(|e| panic!("commit: {e}"));

        assert!(second.reused);
        assert_eq!(first.pair, second.pair);
        assert_eq!(
            fs::read(&second.pair.content_path).ok().as_deref(),
            Some(&b"first"[..])
        );
        let stored = EntryTimestamp::from_stored_entry(&second.pair.content_path)
            .unwrap_or_else(|e| panic!("decode: {e}"));
        assert_eq!(stored.expiry, Some(UNIX_EPOCH + Duration::from_secs(4_100_000_000)));
        assert_eq!(dir_names(dir.path()).len(), 2, "temp files must be discarded");
    }

    #[test]
    fn test_racing_writers_publish_one_consistent_pair() {
        use std::sync::Barrier;

        const WRITERS: usize = 8;
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let fp = fingerprint::compute("https://example/raced");
        let validator = Validator::Strong("v".to_string());
        let timestamp = expiring_at(4_000_000_000);

        for round in 0..50 {
            let barrier = Barrier::new(WRITERS);
            let outcomes: Vec<Committed> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..WRITERS)
                    .map(|writer| {
                        let (barrier, fp, validator) = (&barrier, &fp, &validator);
                        let directory = dir.path();
                        scope.spawn(move || {
                            let content = temp_path(directory, "stage");
                            let meta = temp_path(directory, "stage");
                            fs::write(&content, format!("body-{writer}"))
                                .unwrap_or_else(|e| panic!("write content: {e}"));
                            fs::write(&meta, format!("meta-{writer}"))
                                .unwrap_or_else(|e| panic!("write meta: {e}"));
                            barrier.wait();
                            commit(directory, &content, &meta, fp, validator, &timestamp, SystemTime::now())
                                .unwrap_or_else(|e| panic!("commit: {e}"))
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or_else(|_| panic!("writer panicked")))
                    .collect()
            });

            let published = outcomes.iter().filter(|outcome| !outcome.reused).count();
            assert_eq!(published, 1, "round {round}: exactly one writer publishes");

            let pair = &outcomes[0].pair;
            assert!(outcomes.iter().all(|outcome| &outcome.pair == pair));
            let body = fs::read_to_string(&pair.content_path)
                .unwrap_or_else(|e| panic!("read content: {e}"));
            let meta = fs::read_to_string(&pair.meta_path)
                .unwrap_or_else(|e| panic!("read meta: {e}"));
            assert_eq!(
                body.strip_prefix("body-"),
                meta.strip_prefix("meta-"),
                "round {round}: content and metadata come from the same writer"
            );
            assert_eq!(dir_names(dir.path()).len(), 2, "round {round}: no staged file left");

            purge_one(&pair.content_path).unwrap_or_else(|e| panic!("purge: {e}"));
        }
    }

    #[test]
    fn test_commit_replaces_content_without_metadata() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let fp = fingerprint::compute("https://example/a");
        let validator = Validator::Strong("v1".to_string());
        let timestamp = expiring_at(4_000_000_000);
        let name = timestamp.entry_name(&fp, &validator, SystemTime::now());
        let orphan = dir.path().join(name.content_file_name());
        fs::write(&orphan, b"orphan").unwrap_or_else(|e| panic!("write: {e}"));
        assert_eq!(find_candidate(dir.path(), &fp).ok().flatten(), None);

        let (content, meta) = stage(dir.path(), b"fresh");
        let committed = commit(dir.path(), &content, &meta, &fp, &validator, &timestamp, SystemTime::now())
            .unwrap_or_else(|e| panic!("commit: {e}"));

        assert!(!committed.reused);
        assert_eq!(committed.pair.content_path, orphan);
        assert_eq!(fs::read(&orphan).ok().as_deref(), Some(&b"fresh"[..]));
        assert!(committed.pair.meta_path.exists());
        assert_eq!(find_candidate(dir.path(), &fp).ok().flatten(), Some(orphan));
    }

    #[test]
    fn test_find_candidate_prefers_earliest_expiry() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let fp = fingerprint::compute("https://example/a");

        let (content, meta) = stage(dir.path(), b"late");
        commit(dir.path(), &content, &meta, &fp, &Validator::Strong("late".into()), &expiring_at(4_000_000_000), SystemTime::now())
            .unwrap_or_else(|e| panic!("commit: {e}"));
        let (content, meta) = stage(dir.path(), b"early");
        let early = commit(dir.path(), &content, &meta, &fp, &Validator::Strong("early".into()), &expiring_at(3_000_000_000), SystemTime::now())
            .unwrap_or_else(|e| panic!("commit: {e}"));

        let other = fingerprint::compute("https://example/b");
        let (content, meta) = stage(dir.path(), b"other");
        commit(dir.path(), &content, &meta, &other, &Validator::EMPTY, &expiring_at(1), SystemTime::now())
            .unwrap_or_else(|e| panic!("commit: {e}"));

        let candidate = find_candidate(dir.path(), &fp).unwrap_or_else(|e| panic!("find: {e}"));
        assert_eq!(candidate, Some(early.pair.content_path));
    }

    #[test]
    fn test_find_candidate_ignores_temp_files() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let fp = fingerprint::compute("https://example/a");
        fs::write(temp_path(dir.path(), &fp), b"staged").unwrap_or_else(|e| panic!("write: {e}"));

        assert_eq!(find_candidate(dir.path(), &fp).ok().flatten(), None);
        assert_eq!(
            find_candidate(&dir.path().join("missing"), &fp).ok().flatten(),
            None
        );
    }

    #[test]
    fn test_purge_one_removes_both_files() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let fp = fingerprint::compute("https://example/a");
        let (content, meta) = stage(dir.path(), b"body");
        let committed = commit(dir.path(), &content, &meta, &fp, &Validator::EMPTY, &EntryTimestamp::default(), SystemTime::now())
            .unwrap_or_else(|e| panic!("commit: {e}"));

        purge_one(&committed.pair.content_path).unwrap_or_else(|e| panic!("purge: {e}"));
        assert!(dir_names(dir.path()).is_empty());

        // Purging twice is not an error
        assert!(purge_one(&committed.pair.content_path).is_ok());
    }

    #[test]
    fn test_touch_updates_access_time() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let path = dir.path().join("file.bin");
        let file = fs::File::create(&path).unwrap_or_else(|e| panic!("create: {e}"));
        let old = UNIX_EPOCH + Duration::from_secs(1_000_000);
        file.set_times(FileTimes::new().set_accessed(old).set_modified(old))
            .unwrap_or_else(|e| panic!("set_times: {e}"));

        touch(&path).unwrap_or_else(|e| panic!("touch: {e}"));
        let meta = fs::metadata(&path).unwrap_or_else(|e| panic!("metadata: {e}"));
        assert!(meta.accessed().is_ok_and(|accessed| accessed > old));
        assert_eq!(meta.modified().ok(), Some(old));
    }
}
