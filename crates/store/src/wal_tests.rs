// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum TestOp {
    Cmd(String),
    Shutdown,
}

fn cmd(s: &str) -> TestOp {
    TestOp::Cmd(s.to_string())
}

#[test]
fn test_open_creates_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    assert!(path.exists());
    assert_eq!(wal.write_seq(), 0);
    assert_eq!(wal.processed_seq(), 0);
}

#[test]
fn test_append_and_flush() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    let seq1 = wal.append(&cmd("cmd1")).unwrap();
    let seq2 = wal.append(&cmd("cmd2")).unwrap();

    assert_eq!(seq1, 1);
    assert_eq!(seq2, 2);

    wal.flush().unwrap();

    let metadata = std::fs::metadata(&path).unwrap();
    assert!(metadata.len() > 0);
}

#[test]
fn test_next_unprocessed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    wal.append(&cmd("cmd1")).unwrap();
    wal.append(&cmd("cmd2")).unwrap();

    let entry1 = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry1.seq, 1);
    assert_eq!(entry1.op, cmd("cmd1"));

    let entry2 = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry2.seq, 2);
    assert_eq!(entry2.op, cmd("cmd2"));

    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn test_mark_processed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    wal.append(&cmd("cmd1")).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    wal.mark_processed(entry.seq);

    assert_eq!(wal.processed_seq(), 1);
}

#[test]
fn test_reopen_with_processed_seq() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
        wal.append(&cmd("cmd1")).unwrap();
        wal.append(&cmd("cmd2")).unwrap();
        wal.append(&cmd("cmd3")).unwrap();
        wal.flush().unwrap();
    }

    let mut wal: Wal<TestOp> = Wal::open(&path, 2).unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 3);
    assert_eq!(entry.op, cmd("cmd3"));

    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn test_entries_after() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    wal.append(&cmd("cmd1")).unwrap();
    wal.append(&cmd("cmd2")).unwrap();
    wal.append(&cmd("cmd3")).unwrap();
    wal.flush().unwrap();

    let entries = wal.entries_after(1).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

#[test]
fn test_truncate_before() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    wal.append(&cmd("cmd1")).unwrap();
    wal.append(&cmd("cmd2")).unwrap();
    wal.append(&cmd("cmd3")).unwrap();
    wal.flush().unwrap();

    wal.truncate_before(2).unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

/// Regression: a Shutdown op persisted in the WAL must survive reopen so
/// the daemon can see and skip it instead of blocking recovery.
#[test]
fn test_shutdown_op_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
        wal.append(&cmd("cmd1")).unwrap();
        wal.append(&TestOp::Shutdown).unwrap();
        wal.flush().unwrap();
    }

    let mut wal: Wal<TestOp> = Wal::open(&path, 1).unwrap();

    let entries = wal.entries_after(1).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seq, 2);
    assert!(matches!(entries[0].op, TestOp::Shutdown));

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 2);
    assert!(matches!(entry.op, TestOp::Shutdown));

    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn test_needs_flush_threshold() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    assert!(!wal.needs_flush());

    for i in 0..50 {
        wal.append(&cmd(&format!("cmd{i}"))).unwrap();
    }
    // Threshold is 100; might also trip on elapsed time, so no negative assertion here.

    for i in 50..101 {
        wal.append(&cmd(&format!("cmd{i}"))).unwrap();
    }

    assert!(wal.needs_flush());
}

#[test]
fn test_open_corrupt_wal_creates_bak_and_preserves_valid_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
        wal.append(&cmd("cmd1")).unwrap();
        wal.append(&cmd("cmd2")).unwrap();
        wal.flush().unwrap();
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"not-valid-json\n").unwrap();
    }

    let wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    assert_eq!(wal.write_seq(), 2);

    let bak = path.with_extension("bak");
    assert!(bak.exists());

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
}

#[test]
fn test_open_corrupt_wal_rotates_bak_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    for i in 1..=4u8 {
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&[i; 8]).unwrap();
        }

        let wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
        assert_eq!(wal.write_seq(), 0);
    }

    let bak1 = path.with_extension("bak");
    assert!(bak1.exists());
    assert_eq!(std::fs::read(&bak1).unwrap(), vec![4u8; 8]);

    let bak2 = path.with_extension("bak.2");
    assert!(bak2.exists());
    assert_eq!(std::fs::read(&bak2).unwrap(), vec![3u8; 8]);

    let bak3 = path.with_extension("bak.3");
    assert!(bak3.exists());
    assert_eq!(std::fs::read(&bak3).unwrap(), vec![2u8; 8]);

    let bak4 = path.with_extension("bak.4");
    assert!(!bak4.exists());
}

#[test]
fn test_entries_after_stops_at_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
        wal.append(&cmd("cmd1")).unwrap();
        wal.append(&cmd("cmd2")).unwrap();
        wal.flush().unwrap();
    }

    let wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"post-open-corruption\n").unwrap();
    }

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
}

#[test]
fn test_next_unprocessed_skips_corrupt_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
    wal.append(&cmd("cmd1")).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 1);

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"corrupt-line\n").unwrap();
    }

    let result = wal.next_unprocessed().unwrap();
    assert!(result.is_none());

    wal.append(&cmd("cmd2")).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 2);
}

#[test]
fn test_open_with_binary_wal_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    std::fs::write(&path, b"\x80\x81\x82\xff\xfe\n").unwrap();

    let wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 0);

    let bak = path.with_extension("bak");
    assert!(bak.exists());
}

#[test]
fn test_open_with_valid_entries_then_binary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
        wal.append(&cmd("cmd1")).unwrap();
        wal.append(&cmd("cmd2")).unwrap();
        wal.flush().unwrap();
    }

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"\x80\x81\x82\xff\xfe\n").unwrap();
    }

    let wal: Wal<TestOp> = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);

    let bak = path.with_extension("bak");
    assert!(bak.exists());

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
}
