//! Concurrent appenders racing on one store.
//!
//! Every writer loops read-modify-conditional-write until it wins. The final
//! log must contain every writer's line exactly once.

use std::sync::Arc;
use std::thread;
use tickernotes_storage::{DirRemoteStore, InMemoryRemoteStore, RemoteLogStore, WriteOutcome};

fn append_line(store: &dyn RemoteLogStore, line: &str) -> usize {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let current = store.read_log_with_version().unwrap();
        let mut content = current.content;
        content.extend_from_slice(line.as_bytes());
        content.push(b'\n');
        match store
            .write_if_version_matches(&content, current.version.as_ref())
            .unwrap()
        {
            WriteOutcome::Written(_) => return attempts,
            WriteOutcome::Conflict => continue,
        }
    }
}

fn race(store: Arc<dyn RemoteLogStore>, writers: usize, lines_each: usize) {
    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..lines_each {
                    append_line(store.as_ref(), &format!("writer-{w}-{i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let content = String::from_utf8(store.read_log().unwrap()).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), writers * lines_each);
    lines.sort_unstable();
    lines.dedup();
    assert_eq!(lines.len(), writers * lines_each);
}

#[test]
fn memory_store_serializes_writers() {
    let store = Arc::new(InMemoryRemoteStore::new());
    race(store.clone(), 4, 25);
    assert_eq!(store.write_count(), 100);
}

#[test]
fn dir_store_serializes_writers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirRemoteStore::open(dir.path()).unwrap());
    race(store, 3, 10);
}

#[test]
fn dir_store_shared_between_handles() {
    let dir = tempfile::tempdir().unwrap();
    let a = DirRemoteStore::open(dir.path()).unwrap();
    let b = DirRemoteStore::open(dir.path()).unwrap();

    assert_eq!(append_line(&a, "from-a"), 1);
    assert_eq!(append_line(&b, "from-b"), 1);
    assert_eq!(a.read_log().unwrap(), b"from-a\nfrom-b\n");
}
