use super::compression::{compress_into, decompress_in_place};
use super::error::TransferError;
use super::state::TransferState;
use crate::constants::CHUNK_SIZE;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tempfile::TempDir;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn entries(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_zero_length_upload_completes_on_announce() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.img");
    let mut state = TransferState::new();

    let done = state.begin_upload(path.clone(), 0).await.unwrap();
    assert_eq!(done, Some(path.clone()));
    assert!(state.upload_path().is_none());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

    assert!(matches!(
        state.write_chunk(b"late", None).await,
        Err(TransferError::NoUpload)
    ));
}

#[tokio::test]
async fn test_chunks_complete_upload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("overlay.bin");
    let mut state = TransferState::new();

    assert_eq!(state.begin_upload(path.clone(), 10).await.unwrap(), None);
    assert_eq!(state.write_chunk(b"01234", None).await.unwrap(), None);
    assert_eq!(
        state.write_chunk(b"56789", None).await.unwrap(),
        Some(path.clone())
    );
    assert!(state.upload_path().is_none());
    assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_explicit_offsets_place_chunks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offsets.bin");
    let mut state = TransferState::new();

    state.begin_upload(path.clone(), 6).await.unwrap();
    state.write_chunk(b"def", Some(3)).await.unwrap();
    state.write_chunk(b"abc", Some(0)).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
}

#[tokio::test]
async fn test_second_announce_is_rejected_without_disturbing_first() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.bin");
    let second = dir.path().join("second.bin");
    let mut state = TransferState::new();

    state.begin_upload(first.clone(), 4).await.unwrap();
    state.write_chunk(b"ab", None).await.unwrap();

    let err = state.begin_upload(second.clone(), 2).await.unwrap_err();
    assert!(matches!(err, TransferError::UploadInProgress(_)));
    assert!(!second.exists());
    assert_eq!(state.upload_path(), Some(first.as_path()));

    assert_eq!(
        state.write_chunk(b"cd", None).await.unwrap(),
        Some(first.clone())
    );
    assert_eq!(std::fs::read(&first).unwrap(), b"abcd");
}

#[tokio::test]
async fn test_overrun_fails_the_upload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.bin");
    let mut state = TransferState::new();

    state.begin_upload(path, 3).await.unwrap();
    let err = state.write_chunk(b"toolong", None).await.unwrap_err();
    assert!(matches!(err, TransferError::Overrun { remaining: 3, chunk: 7, .. }));
    assert!(state.upload_path().is_none());

    // The connection-level state is usable again.
    let next = state.begin_upload(dir.path().join("next.bin"), 1).await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_chunk_past_announced_size_is_overrun() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("far.bin");
    let mut state = TransferState::new();

    state.begin_upload(path.clone(), 4).await.unwrap();
    let err = state.write_chunk(b"ab", Some(100)).await.unwrap_err();
    assert!(matches!(err, TransferError::Overrun { remaining: 0, chunk: 2, .. }));
    assert!(state.upload_path().is_none());

    state.begin_upload(path.clone(), 4).await.unwrap();
    let err = state.write_chunk(b"abc", Some(2)).await.unwrap_err();
    assert!(matches!(err, TransferError::Overrun { remaining: 2, chunk: 3, .. }));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[tokio::test]
async fn test_resent_chunk_counts_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("resent.bin");
    let mut state = TransferState::new();

    state.begin_upload(path.clone(), 6).await.unwrap();
    assert_eq!(state.write_chunk(b"abc", Some(0)).await.unwrap(), None);
    assert_eq!(state.write_chunk(b"abc", Some(0)).await.unwrap(), None);
    assert_eq!(state.upload_path(), Some(path.as_path()));

    // Overlapping the covered range still only finishes once every byte is in.
    assert_eq!(state.write_chunk(b"bcd", Some(1)).await.unwrap(), None);
    assert_eq!(
        state.write_chunk(b"ef", None).await.unwrap(),
        Some(path.clone())
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
}

#[tokio::test]
async fn test_chunk_without_announce() {
    let mut state = TransferState::new();
    assert!(matches!(
        state.write_chunk(b"x", Some(0)).await,
        Err(TransferError::NoUpload)
    ));
}

#[tokio::test]
async fn test_missing_file_differs_from_empty_file() {
    let dir = TempDir::new().unwrap();
    let mut state = TransferState::new();

    let err = state
        .begin_download(dir.path().join("absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotFound(_)));

    let empty = dir.path().join("empty");
    std::fs::write(&empty, b"").unwrap();
    assert_eq!(state.begin_download(empty).await.unwrap(), 0);
    assert!(state.read_chunk(None).await.unwrap().is_empty());

    assert!(matches!(
        state.read_chunk(None).await,
        Err(TransferError::NoDownload)
    ));
}

#[tokio::test]
async fn test_download_is_chunked_and_single_flight() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.bin");
    let data: Vec<u8> = (0..CHUNK_SIZE + 17).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &data).unwrap();

    let mut state = TransferState::new();
    assert_eq!(
        state.begin_download(path.clone()).await.unwrap(),
        data.len() as u64
    );
    assert!(matches!(
        state.begin_download(path.clone()).await,
        Err(TransferError::DownloadInProgress(_))
    ));

    let first = state.read_chunk(None).await.unwrap();
    assert_eq!(first.len(), CHUNK_SIZE);
    let second = state.read_chunk(Some(CHUNK_SIZE as u64)).await.unwrap();
    assert_eq!(second.len(), 17);
    assert!(state.read_chunk(None).await.unwrap().is_empty());

    let mut joined = first;
    joined.extend_from_slice(&second);
    assert_eq!(joined, data);
}

#[tokio::test]
async fn test_decompress_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("floppy.img");
    std::fs::write(&path, gzip(b"persistent state!")).unwrap();

    decompress_in_place(&path).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"persistent state!");
    assert_eq!(entries(&dir), vec!["floppy.img".to_string()]);
}

#[tokio::test]
async fn test_corrupt_input_leaves_no_partial_output() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("floppy.img");
    std::fs::write(&path, b"0123456789").unwrap();

    let err = decompress_in_place(&path).await.unwrap_err();
    assert!(matches!(err, TransferError::Compression { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
    assert_eq!(entries(&dir), vec!["floppy.img".to_string()]);
}

#[tokio::test]
async fn test_decompress_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = decompress_in_place(&dir.path().join("absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotFound(_)));
}

#[tokio::test]
async fn test_compress_then_decompress() {
    let source_dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let source = source_dir.path().join("floppy.img");
    let data = vec![42u8; 64 * 1024];
    std::fs::write(&source, &data).unwrap();

    let compressed = compress_into(&source, scratch.path()).await.unwrap();
    assert_eq!(compressed, scratch.path().join("floppy.img"));
    assert!(std::fs::metadata(&compressed).unwrap().len() < data.len() as u64);

    decompress_in_place(&compressed).await.unwrap();
    assert_eq!(std::fs::read(&compressed).unwrap(), data);
}
