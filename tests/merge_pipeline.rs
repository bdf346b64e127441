//! Integration tests for the audiobook merge pipeline
//!
//! Probing, concatenation and the fallback are replaced by in-process doubles;
//! no ffmpeg binary is spawned.

use bookmate_core::audio::fallback::FallbackMerger;
use bookmate_core::audio::merge::{AudiobookAssembler, BatchOptions, MergeRequest, MergeStage};
use bookmate_core::audio::metadata::TagSet;
use bookmate_core::audio::probe::DurationProber;
use bookmate_core::audio::transcoder::{ConcatRequest, Transcoder};
use bookmate_core::error::{DownloaderError, Result};
use bookmate_core::file::ResourcePaths;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Durations keyed by chapter file name; unknown files fail to probe
struct FakeProber {
    durations: HashMap<String, f64>,
}

impl FakeProber {
    fn new(durations: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            durations: durations
                .iter()
                .map(|(name, secs)| (name.to_string(), *secs))
                .collect(),
        })
    }
}

impl DurationProber for FakeProber {
    fn probe<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<f64>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = self
            .durations
            .get(&name)
            .copied()
            .ok_or_else(|| DownloaderError::probe_failed(path, "no duration"));
        async move { result }.boxed()
    }
}

/// What the transcoder saw while the descriptor files still existed
#[derive(Debug, Clone)]
struct SeenConcat {
    concat_list: String,
    ffmetadata: String,
    cover: Option<PathBuf>,
    tags: Vec<(String, String)>,
}

/// Writes a dummy output, or fails when `fail` is set
///
/// With `partial` it leaves a truncated output behind before failing.
#[derive(Default)]
struct FakeTranscoder {
    fail: bool,
    partial: bool,
    seen: Mutex<Vec<SeenConcat>>,
}

impl FakeTranscoder {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    fn seen(&self) -> Vec<SeenConcat> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transcoder for FakeTranscoder {
    fn concat<'a>(&'a self, request: &'a ConcatRequest) -> BoxFuture<'a, Result<()>> {
        async move {
            let seen = SeenConcat {
                concat_list: tokio::fs::read_to_string(&request.concat_list).await?,
                ffmetadata: tokio::fs::read_to_string(&request.ffmetadata).await?,
                cover: request.cover.clone(),
                tags: request
                    .tags
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            };
            self.seen.lock().unwrap().push(seen);

            if self.fail {
                if self.partial {
                    tokio::fs::write(&request.output, b"trunc").await?;
                }
                return Err(DownloaderError::TranscodeFailed("exit status 1".to_string()));
            }
            tokio::fs::write(&request.output, b"merged audio").await?;
            Ok(())
        }
        .boxed()
    }
}

/// Records the chapters it was given and writes the output
#[derive(Default)]
struct FakeFallback {
    fail: bool,
    calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl FallbackMerger for FakeFallback {
    fn merge<'a>(
        &'a self,
        chapters: &'a [PathBuf],
        _tags: &'a TagSet,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.calls.lock().unwrap().push(chapters.to_vec());
            if self.fail {
                return Err(DownloaderError::FallbackMergeFailed("ffmpeg exited with 1".to_string()));
            }
            tokio::fs::write(output, b"reencoded audio").await?;
            Ok(())
        }
        .boxed()
    }
}

fn standard_prober() -> Arc<FakeProber> {
    FakeProber::new(&[
        ("Глава_1.m4a", 100.0),
        ("Глава_2.m4a", 150.0),
        ("Глава_10.m4a", 200.0),
    ])
}

/// Audiobook directory named `name` with chapters 10, 2, 1 created in that order
fn audiobook_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for chapter in ["Глава_10.m4a", "Глава_2.m4a", "Глава_1.m4a"] {
        std::fs::write(dir.join(chapter), b"chapter").unwrap();
    }
    dir
}

fn chapter_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("Глава_"))
        .collect();
    names.sort();
    names
}

fn request(dir: &Path, name: &str, cleanup_chapters: bool) -> MergeRequest {
    let tags: TagSet = [("title", "T"), ("artist", "A")].into_iter().collect();
    MergeRequest {
        paths: ResourcePaths::new(dir, name),
        tags,
        cleanup_chapters,
    }
}

#[tokio::test]
async fn test_merge_with_cleanup() {
    let root = TempDir::new().unwrap();
    let dir = audiobook_dir(root.path(), "Book");
    std::fs::write(dir.join("Book.jpeg"), b"cover").unwrap();

    let transcoder = Arc::new(FakeTranscoder::default());
    let assembler = AudiobookAssembler::new(
        standard_prober(),
        transcoder.clone(),
        Arc::new(FakeFallback::default()),
    );

    let outcome = assembler.merge(&request(&dir, "Book", true)).await.unwrap();

    assert!(outcome.chapter_markers);
    assert_eq!(outcome.chapters, 3);
    assert_eq!(outcome.unprobed_chapters, 0);
    assert!(outcome.cover_embedded);
    assert_eq!(outcome.output.file_name().unwrap(), "Book_complete.m4a");
    assert!(outcome.output.exists());
    assert!(outcome.cleanup.as_ref().unwrap().is_complete());
    assert_eq!(
        outcome.stages,
        vec![
            MergeStage::Probing,
            MergeStage::Planning,
            MergeStage::Concatenating,
            MergeStage::Cleanup,
            MergeStage::Done,
        ]
    );

    assert!(chapter_files(&dir).is_empty());
    assert!(!dir.join("chapters_list.txt").exists());
    assert!(!dir.join("chapters_metadata.txt").exists());
    assert!(dir.join("Book.jpeg").exists());

    let seen = transcoder.seen();
    assert_eq!(seen.len(), 1);
    let lines: Vec<&str> = seen[0].concat_list.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("Глава_1.m4a'"));
    assert!(lines[1].ends_with("Глава_2.m4a'"));
    assert!(lines[2].ends_with("Глава_10.m4a'"));

    let meta = &seen[0].ffmetadata;
    assert!(meta.starts_with(";FFMETADATA1\n"));
    assert!(meta.contains("TITLE=T\n"));
    assert!(meta.contains("ARTIST=A\n"));
    assert!(meta.contains("START=0\nEND=100000\n"));
    assert!(meta.contains("START=100000\nEND=250000\n"));
    assert!(meta.contains("START=250000\nEND=450000\n"));
    assert!(meta.contains("title=Глава 3\n"));

    assert_eq!(seen[0].cover.as_ref().unwrap().file_name().unwrap(), "Book.jpeg");
    assert_eq!(
        seen[0].tags,
        vec![
            ("title".to_string(), "T".to_string()),
            ("artist".to_string(), "A".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_merge_keeps_chapters_without_cleanup() {
    let root = TempDir::new().unwrap();
    let dir = audiobook_dir(root.path(), "Book");

    let transcoder = Arc::new(FakeTranscoder::default());
    let assembler = AudiobookAssembler::new(
        standard_prober(),
        transcoder.clone(),
        Arc::new(FakeFallback::default()),
    );

    let outcome = assembler.merge(&request(&dir, "Book", false)).await.unwrap();

    assert!(outcome.cleanup.is_none());
    assert!(!outcome.cover_embedded);
    assert!(transcoder.seen()[0].cover.is_none());
    assert_eq!(chapter_files(&dir), vec!["Глава_1.m4a", "Глава_10.m4a", "Глава_2.m4a"]);
    assert!(dir.join("Book_complete.m4a").exists());
}

#[tokio::test]
async fn test_probe_failure_assumes_default_duration() {
    let root = TempDir::new().unwrap();
    let dir = audiobook_dir(root.path(), "Book");

    let prober = FakeProber::new(&[("Глава_1.m4a", 100.0), ("Глава_10.m4a", 200.0)]);
    let transcoder = Arc::new(FakeTranscoder::default());
    let assembler = AudiobookAssembler::new(prober, transcoder.clone(), Arc::new(FakeFallback::default()));

    let outcome = assembler.merge(&request(&dir, "Book", false)).await.unwrap();

    assert_eq!(outcome.unprobed_chapters, 1);
    let meta = &transcoder.seen()[0].ffmetadata;
    assert!(meta.contains("START=100000\nEND=280000\n"));
    assert!(meta.contains("START=280000\nEND=480000\n"));
}

#[tokio::test]
async fn test_transcode_failure_uses_fallback() {
    let root = TempDir::new().unwrap();
    let dir = audiobook_dir(root.path(), "Book");

    let fallback = Arc::new(FakeFallback::default());
    let assembler = AudiobookAssembler::new(standard_prober(), FakeTranscoder::failing(), fallback.clone());

    let outcome = assembler.merge(&request(&dir, "Book", true)).await.unwrap();

    assert!(!outcome.chapter_markers);
    assert_eq!(outcome.output.file_name().unwrap(), "Book.m4a");
    assert!(outcome.output.exists());
    assert!(outcome.stages.contains(&MergeStage::FallbackConcatenating));
    assert!(chapter_files(&dir).is_empty());
    assert!(!dir.join("chapters_list.txt").exists());

    let calls = fallback.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let names: Vec<_> = calls[0]
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["Глава_1.m4a", "Глава_2.m4a", "Глава_10.m4a"]);
}

#[tokio::test]
async fn test_fallback_removes_partial_primary_output() {
    let root = TempDir::new().unwrap();
    let dir = audiobook_dir(root.path(), "Book");

    let broken = Arc::new(FakeTranscoder {
        fail: true,
        partial: true,
        ..Default::default()
    });
    let assembler = AudiobookAssembler::new(standard_prober(), broken, Arc::new(FakeFallback::default()));

    let outcome = assembler.merge(&request(&dir, "Book", false)).await.unwrap();

    assert!(!outcome.chapter_markers);
    assert!(dir.join("Book.m4a").exists());
    assert!(!dir.join("Book_complete.m4a").exists());

    // A later batch run must not take the book for merged
    let assembler = AudiobookAssembler::new(
        standard_prober(),
        Arc::new(FakeTranscoder::default()),
        Arc::new(FakeFallback::default()),
    );
    let options = BatchOptions {
        force: false,
        cleanup_chapters: false,
        overrides: TagSet::new(),
    };
    let summary = assembler.merge_library(root.path(), &options).await.unwrap();

    assert!(summary.skipped.is_empty());
    assert_eq!(summary.merged.len(), 1);
    assert!(dir.join("Book_complete.m4a").exists());
}

#[tokio::test]
async fn test_fallback_failure_is_fatal_and_keeps_chapters() {
    let root = TempDir::new().unwrap();
    let dir = audiobook_dir(root.path(), "Book");

    let fallback = Arc::new(FakeFallback {
        fail: true,
        ..Default::default()
    });
    let assembler = AudiobookAssembler::new(standard_prober(), FakeTranscoder::failing(), fallback);

    let err = assembler.merge(&request(&dir, "Book", true)).await.unwrap_err();

    assert!(matches!(err, DownloaderError::FallbackMergeFailed(_)));
    assert!(err.is_fatal());
    assert_eq!(chapter_files(&dir).len(), 3);
    assert!(!dir.join("chapters_list.txt").exists());
    assert!(!dir.join("chapters_metadata.txt").exists());
}

#[tokio::test]
async fn test_missing_directory() {
    let root = TempDir::new().unwrap();
    let assembler = AudiobookAssembler::new(
        standard_prober(),
        Arc::new(FakeTranscoder::default()),
        Arc::new(FakeFallback::default()),
    );

    let err = assembler
        .merge(&request(&root.path().join("absent"), "absent", true))
        .await
        .unwrap_err();

    assert!(matches!(err, DownloaderError::DirectoryNotFound(_)));
}

#[tokio::test]
async fn test_merge_directory_reads_descriptor() {
    let root = TempDir::new().unwrap();
    let dir = audiobook_dir(root.path(), "Book");
    std::fs::write(
        dir.join("Book.json"),
        r#"{"audiobook":{"title":"Described","authors":[{"name":"Writer"}],"narrators":[{"name":"Voice"}]}}"#,
    )
    .unwrap();

    let transcoder = Arc::new(FakeTranscoder::default());
    let assembler = AudiobookAssembler::new(standard_prober(), transcoder.clone(), Arc::new(FakeFallback::default()));
    let overrides: TagSet = [("genre", "Fantasy")].into_iter().collect();

    let outcome = assembler.merge_directory(&dir, &overrides, false).await.unwrap();

    assert!(outcome.chapter_markers);
    let tags: HashMap<String, String> = transcoder.seen()[0].tags.iter().cloned().collect();
    assert_eq!(tags["title"], "Described");
    assert_eq!(tags["artist"], "Writer");
    assert_eq!(tags["performer"], "Voice");
    assert_eq!(tags["genre"], "Fantasy");
}

#[tokio::test]
async fn test_batch_merge_skips_merged_and_counts_failures() {
    let root = TempDir::new().unwrap();
    let library = root.path().join("audiobook");
    audiobook_dir(&library, "Alpha");
    let done = audiobook_dir(&library, "Beta");
    std::fs::write(done.join("Beta_complete.m4a"), b"already").unwrap();
    std::fs::create_dir_all(library.join("Empty")).unwrap();

    let assembler = AudiobookAssembler::new(
        standard_prober(),
        Arc::new(FakeTranscoder::default()),
        Arc::new(FakeFallback::default()),
    );
    let options = BatchOptions {
        force: false,
        cleanup_chapters: false,
        overrides: TagSet::new(),
    };

    let summary = assembler.merge_library(&library, &options).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.merged.len(), 1);
    assert_eq!(summary.skipped, vec![done.clone()]);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].0.ends_with("Empty"));
    assert!(library.join("Alpha").join("Alpha_complete.m4a").exists());

    let forced = BatchOptions {
        force: true,
        ..options
    };
    let summary = assembler.merge_library(&library, &forced).await.unwrap();
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.merged.len(), 2);
}
