use std::fs::{self, OpenOptions};
use std::io::Write;
use tempfile::TempDir;
use tidekv::config::EngineConfig;
use tidekv::log::{Log, SEGMENT_FILE_PREFIX};
use tidekv::record::{Record, VALUE_OFFSET};
use tidekv::{Result, TideError};

#[test]
fn crash_between_flush_phases_truncates_on_reopen() -> Result<()> {
    let temp = TempDir::new()?;
    let config = EngineConfig::default();

    let (log, replayed) = Log::open(temp.path(), config.clone())?;
    assert!(replayed.is_empty());

    let mut committed = Vec::new();
    let mut valid_bytes = 0u64;
    for key in 0..3 {
        let record = Record::new(1000 + key as i64, key, Some(format!("committed-{key}")))?;
        let pointer = log.append(&record)?;
        valid_bytes += record.encoded_len() as u64;
        committed.push((record, pointer));
    }

    let interrupted = Record::new(2000, 99, Some("y".repeat(5000)))?;
    log.append_then_crash(&interrupted)?;
    drop(log);

    // Only the first flushed chunk of the interrupted record reached disk.
    let path = temp.path().join(format!("{SEGMENT_FILE_PREFIX}0"));
    assert_eq!(fs::metadata(&path)?.len(), valid_bytes + 4096);

    let (log, replayed) = Log::open(temp.path(), config)?;
    assert_eq!(replayed.len(), committed.len());
    assert!(replayed.iter().all(|(key, _)| *key != 99));
    assert_eq!(fs::metadata(&path)?.len(), valid_bytes);

    // Appends resume in the same segment, right after the last valid record.
    let resumed = Record::new(3000, 7, Some("resumed".into()))?;
    let pointer = log.append(&resumed)?;
    assert_eq!(pointer.segment_id, 0);
    assert_eq!(pointer.offset, valid_bytes + VALUE_OFFSET as u64);

    for (record, pointer) in &committed {
        assert_eq!(log.read(pointer)?, record.value.clone());
    }
    assert_eq!(log.read(&pointer)?, Some("resumed".into()));

    Ok(())
}

#[test]
fn interrupting_a_single_chunk_record_is_refused() -> Result<()> {
    let temp = TempDir::new()?;
    let (log, _) = Log::open(temp.path(), EngineConfig::default())?;

    let small = Record::new(1, 1, Some("small".into()))?;
    assert!(matches!(
        log.append_then_crash(&small),
        Err(TideError::Io(_))
    ));

    Ok(())
}

#[test]
fn rotation_starts_a_new_segment_after_threshold() -> Result<()> {
    let temp = TempDir::new()?;
    let config = EngineConfig::new(256, 4096, 2);
    let (log, _) = Log::open(temp.path(), config)?;

    // Each record is 66 bytes; the fourth append crosses 256 bytes and
    // retires segment 0.
    let mut pointers = Vec::new();
    for key in 0..4 {
        let record = Record::new(key as i64, key, Some("v".repeat(50)))?;
        let pointer = log.append(&record)?;
        pointers.push((record, pointer));
    }
    assert!(pointers.iter().all(|(_, pointer)| pointer.segment_id == 0));

    let record = Record::new(4, 4, Some("v".repeat(50)))?;
    let pointer = log.append(&record)?;
    assert_eq!(pointer.segment_id, 1);
    assert_eq!(pointer.offset, VALUE_OFFSET as u64);
    assert!(temp.path().join(format!("{SEGMENT_FILE_PREFIX}1")).exists());

    // Earlier records remain readable at their recorded offsets.
    for (record, pointer) in &pointers {
        assert_eq!(log.read(pointer)?, record.value.clone());
    }

    Ok(())
}

#[test]
fn reopen_resumes_an_underfull_segment() -> Result<()> {
    let temp = TempDir::new()?;
    let config = EngineConfig::new(256, 4096, 2);
    {
        let (log, _) = Log::open(temp.path(), config.clone())?;
        log.append(&Record::new(1, 1, Some("v".repeat(50)))?)?;
    }

    let (log, replayed) = Log::open(temp.path(), config)?;
    assert_eq!(replayed.len(), 1);

    let pointer = log.append(&Record::new(2, 2, Some("w".repeat(50)))?)?;
    assert_eq!(pointer.segment_id, 0);
    assert_eq!(pointer.offset, 66 + VALUE_OFFSET as u64);

    Ok(())
}

#[test]
fn reopen_rotates_a_full_segment() -> Result<()> {
    let temp = TempDir::new()?;
    let config = EngineConfig::new(100, 4096, 2);
    {
        let (log, _) = Log::open(temp.path(), config.clone())?;
        // 116 bytes, over the limit: the next append belongs to segment 1.
        log.append(&Record::new(1, 1, Some("z".repeat(100)))?)?;
    }

    let (log, replayed) = Log::open(temp.path(), config)?;
    assert_eq!(replayed.len(), 1);

    let pointer = log.append(&Record::new(2, 2, Some("next".into()))?)?;
    assert_eq!(pointer.segment_id, 1);
    assert_eq!(pointer.offset, VALUE_OFFSET as u64);

    Ok(())
}

#[test]
fn trailing_garbage_is_discarded() -> Result<()> {
    let temp = TempDir::new()?;
    let config = EngineConfig::default();
    let mut valid_bytes = 0u64;
    {
        let (log, _) = Log::open(temp.path(), config.clone())?;
        for key in 0..3 {
            let record = Record::new(key as i64, key, Some(format!("keep-{key}")))?;
            log.append(&record)?;
            valid_bytes += record.encoded_len() as u64;
        }
    }

    let path = temp.path().join(format!("{SEGMENT_FILE_PREFIX}0"));
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(&[0xAB; 10])?;
    drop(file);

    let (log, replayed) = Log::open(temp.path(), config)?;
    assert_eq!(replayed.len(), 3);
    assert_eq!(fs::metadata(&path)?.len(), valid_bytes);
    for (key, pointer) in &replayed {
        assert_eq!(log.read(pointer)?, Some(format!("keep-{key}")));
    }

    Ok(())
}

#[test]
fn corrupt_tail_record_is_dropped() -> Result<()> {
    let temp = TempDir::new()?;
    let config = EngineConfig::default();
    let mut lengths = Vec::new();
    {
        let (log, _) = Log::open(temp.path(), config.clone())?;
        for key in 0..3 {
            let record = Record::new(key as i64, key, Some(format!("record-{key}")))?;
            log.append(&record)?;
            lengths.push(record.encoded_len() as u64);
        }
    }

    // Flip one byte inside the last record's value.
    let path = temp.path().join(format!("{SEGMENT_FILE_PREFIX}0"));
    let mut bytes = fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, &bytes)?;

    let (log, replayed) = Log::open(temp.path(), config)?;
    assert_eq!(replayed.len(), 2);
    assert_eq!(fs::metadata(&path)?.len(), lengths[0] + lengths[1]);
    for (key, pointer) in &replayed {
        assert_eq!(log.read(pointer)?, Some(format!("record-{key}")));
    }

    Ok(())
}

#[test]
fn tombstone_pointer_reads_as_no_value() -> Result<()> {
    let temp = TempDir::new()?;
    let (log, _) = Log::open(temp.path(), EngineConfig::default())?;

    let pointer = log.append(&Record::new(1, 9, None)?)?;
    assert!(pointer.is_tombstone());
    assert_eq!(log.read(&pointer)?, None);

    Ok(())
}

#[test]
fn operations_after_close_fail() -> Result<()> {
    let temp = TempDir::new()?;
    let (log, _) = Log::open(temp.path(), EngineConfig::default())?;

    let record = Record::new(1, 1, Some("durable".into()))?;
    let pointer = log.append(&record)?;

    log.close();
    log.close(); // idempotent

    assert!(matches!(log.read(&pointer), Err(TideError::Closed)));
    assert!(matches!(log.append(&record), Err(TideError::Closed)));

    Ok(())
}
