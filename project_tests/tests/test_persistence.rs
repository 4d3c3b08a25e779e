use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use lib_exchange::{
    read_columnar_file, BatchWriter, ColumnarFileWriter, EnqueueOutcome, ExchangeConfig, ExchangeCore, ExchangeError,
    ExchangeSocket, FileDescriptor, Message, OverflowPolicy, PersistenceBridge, PersistenceConfig, RingStore,
    WriteBatch,
};
use tempfile::tempdir;

fn msg(key: u64) -> Message {
    Message::publish(key, "sensors/a", format!("reading-{}", key))
}

struct FailingWriter;

impl BatchWriter for FailingWriter {
    fn write_batch(&self, _batch: &WriteBatch) -> io::Result<Vec<FileDescriptor>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "disk is read-only"))
    }
}

#[tokio::test]
async fn file_overflow_spills_batch_to_disk() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let writer = Arc::new(ColumnarFileWriter::new(dir.path(), "sensors", "col", 0));
    let store = RingStore::with_persistence(3, PersistenceBridge::new(writer, 4)).unwrap();

    for key in 101..=103 {
        store.enqueue(msg(key), 0).unwrap();
    }
    let outcome = store.enqueue(msg(104), 0).unwrap();
    let ticket = match outcome {
        EnqueueOutcome::Spilled { keys, ticket } => {
            assert_eq!(keys, vec![101, 102, 103]);
            ticket
        }
        other => panic!("expected Spilled, got {:?}", other),
    };

    // The store moved on without waiting for the write.
    assert_eq!(store.keys(), vec![104]);

    let files = ticket.wait().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, dir.path().join("sensors-101~103.col"));
    assert_eq!((files[0].start_index, files[0].end_index), (0, 2));

    let rows = read_columnar_file(&files[0].filename).unwrap();
    assert_eq!(rows.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![101, 102, 103]);
    assert_eq!(rows[1].1, "reading-102");
    assert_eq!(store.produced_files(), files);
}

#[tokio::test]
async fn file_window_deletes_oldest_files() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let writer = Arc::new(ColumnarFileWriter::new(dir.path(), "w", "col", 0));
    let store = RingStore::with_persistence(2, PersistenceBridge::new(writer, 2)).unwrap();

    let mut produced: Vec<PathBuf> = Vec::new();
    store.enqueue(msg(1), 0).unwrap();
    store.enqueue(msg(2), 0).unwrap();
    for key in 3..=8 {
        if let EnqueueOutcome::Spilled { ticket, .. } = store.enqueue(msg(key), 0).unwrap() {
            produced.extend(ticket.wait().await.unwrap().into_iter().map(|f| f.filename));
        }
    }

    // Batches [1,2], [3,4], [5,6] were spilled; only the last two files remain.
    assert_eq!(produced.len(), 3);
    assert!(!produced[0].exists());
    assert!(produced[1].exists());
    assert!(produced[2].exists());
    assert_eq!(store.produced_files().len(), 2);
}

#[tokio::test]
async fn large_batches_split_by_file_size() {
    let dir = tempdir().expect("Failed to create temporary directory");
    // Each payload is "reading-N" (9 bytes); 18 bytes per file means two rows each.
    let writer = Arc::new(ColumnarFileWriter::new(dir.path(), "split", "col", 18));
    let store = RingStore::with_persistence(4, PersistenceBridge::new(writer, 8)).unwrap();

    for key in 1..=4 {
        store.enqueue(msg(key), 0).unwrap();
    }
    let ticket = store.enqueue(msg(5), 0).unwrap();
    let files = match ticket {
        EnqueueOutcome::Spilled { ticket, .. } => ticket.wait().await.unwrap(),
        other => panic!("expected Spilled, got {:?}", other),
    };

    let names: Vec<PathBuf> = files.iter().map(|f| f.filename.clone()).collect();
    assert_eq!(
        names,
        vec![dir.path().join("split-1~2.col"), dir.path().join("split-3~4.col")]
    );
}

#[tokio::test]
async fn writer_failure_reaches_the_ticket() {
    let store = RingStore::with_persistence(1, PersistenceBridge::new(Arc::new(FailingWriter), 2)).unwrap();
    store.enqueue(msg(1), 0).unwrap();

    let ticket = match store.enqueue(msg(2), 0).unwrap() {
        EnqueueOutcome::Spilled { ticket, .. } => ticket,
        other => panic!("expected Spilled, got {:?}", other),
    };
    let err = ticket.wait().await.unwrap_err();
    assert!(matches!(err, ExchangeError::Persistence(ref m) if m.contains("read-only")));
    assert!(store.produced_files().is_empty());
}

#[test]
fn dispatch_failure_fails_the_overflowing_enqueue() {
    // No Tokio runtime here, so the bridge cannot start the write.
    let dir = tempdir().expect("Failed to create temporary directory");
    let writer = Arc::new(ColumnarFileWriter::new(dir.path(), "none", "col", 0));
    let store = RingStore::with_persistence(2, PersistenceBridge::new(writer, 2)).unwrap();
    store.enqueue(msg(1), 0).unwrap();
    store.enqueue(msg(2), 0).unwrap();

    let err = store.enqueue(msg(3), 0).unwrap_err();
    assert!(matches!(err, ExchangeError::PersistenceDispatchFailed(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn spilled_keys_leave_the_dedup_index() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let mut config = ExchangeConfig::default();
    config.ring.capacity = 2;
    config.ring.overflow = OverflowPolicy::File;
    config.persistence = Some(PersistenceConfig {
        dir: dir.path().to_path_buf(),
        prefix: "ex".to_string(),
        ..Default::default()
    });
    config.validate().unwrap();

    let socket = ExchangeSocket::from_config(&config.socket);
    socket.bind(ExchangeCore::from_config(&config).unwrap()).unwrap();

    socket.send(msg(1)).await.unwrap();
    socket.send(msg(2)).await.unwrap();
    let ack = socket.send(msg(3)).await.unwrap();
    let files = ack.into_spill().expect("publish should have spilled").wait().await.unwrap();

    assert_eq!(files[0].filename, dir.path().join("ex-1~2.col"));
    assert_eq!(socket.get_dedup_map().keys(), vec![3]);
    assert!(socket.get_msg_by_key(1).is_none());
}
