use std::collections::HashMap;
use std::thread;
use tempfile::TempDir;
use tidekv::{Result, TideError, TideKv};

#[test]
fn disjoint_writers_never_observe_stale_values() -> Result<()> {
    let temp = TempDir::new()?;
    let engine = TideKv::open(temp.path())?;

    thread::scope(|scope| {
        for partition in 0..8 {
            let engine = engine.clone();
            scope.spawn(move || {
                let keys: Vec<i32> = (partition * 100..partition * 100 + 5).collect();
                for round in 0..20 {
                    for &key in &keys {
                        let value = format!("{partition}-{key}-{round}");
                        engine.put(key, value.clone()).unwrap();
                        // This thread is the key's only writer, so the read
                        // must return what it just wrote.
                        assert_eq!(engine.get(key).unwrap(), Some(value));
                    }
                }
            });
        }
    });

    // Every key holds its final round's value.
    for partition in 0..8 {
        for key in partition * 100..partition * 100 + 5 {
            assert_eq!(
                engine.get(key)?,
                Some(format!("{partition}-{key}-19"))
            );
        }
    }

    Ok(())
}

#[test]
fn contended_key_converges_and_survives_replay() -> Result<()> {
    let temp = TempDir::new()?;
    let engine = TideKv::open(temp.path())?;

    thread::scope(|scope| {
        for writer in 0..6 {
            let engine = engine.clone();
            scope.spawn(move || {
                for round in 0..25 {
                    engine.put(0, format!("w{writer}-r{round}")).unwrap();
                }
            });
        }
    });

    let settled = engine.get(0)?;
    assert!(settled.is_some());

    // The replayed index agrees with the in-memory one.
    drop(engine);
    let engine = TideKv::open(temp.path())?;
    assert_eq!(engine.get(0)?, settled);

    Ok(())
}

#[test]
fn parallel_readers_share_the_segment_pools() -> Result<()> {
    let temp = TempDir::new()?;
    let engine = TideKv::builder(temp.path())
        .segment_size_limit(2048)
        .build()?;

    let mut expected = HashMap::new();
    for key in 0..200 {
        let value = format!("pooled-value-{key}");
        engine.put(key, value.clone())?;
        expected.insert(key, value);
    }

    thread::scope(|scope| {
        for reader in 0..8 {
            let engine = engine.clone();
            let expected = &expected;
            scope.spawn(move || {
                for pass in 0..5 {
                    for key in 0..200 {
                        // Stagger so readers hit different segments at once.
                        let key = (key + reader * 25 + pass * 7) % 200;
                        assert_eq!(
                            engine.get(key).unwrap().as_ref(),
                            expected.get(&key),
                            "key {key}"
                        );
                    }
                }
            });
        }
    });

    Ok(())
}

#[test]
fn closed_engine_rejects_operations() -> Result<()> {
    let temp = TempDir::new()?;
    let engine = TideKv::open(temp.path())?;

    engine.put(1, "present".into())?;
    engine.close();

    assert!(matches!(engine.get(1), Err(TideError::Closed)));
    assert!(matches!(engine.put(2, "late".into()), Err(TideError::Closed)));
    assert!(matches!(engine.delete(1), Err(TideError::Closed)));

    Ok(())
}
