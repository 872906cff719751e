use eepcnt::{CntError, Engine, Handle, WriteOptions};
use std::path::Path;
use std::sync::Arc;
use std::thread;

const CHANNELS: usize = 4;

fn value(i: u64, c: usize) -> f32 {
    (i as f32) + (c as f32) / 10.0
}

fn block(from: u64, n: usize) -> Vec<f32> {
    (from..from + n as u64)
        .flat_map(|i| (0..CHANNELS).map(move |c| value(i, c)))
        .collect()
}

fn create(engine: &Engine, path: &Path, options: WriteOptions) -> Handle {
    let ch = engine.create_channel_info().unwrap();
    for c in 0..CHANNELS {
        engine.add_channel(ch, &format!("E{}", c + 1), "Cz", "uV").unwrap();
    }
    engine.write_cnt_with(path, 1000.0, ch, options).unwrap()
}

#[test]
fn test_streaming_reads_on_live_writer() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new();
    let options = WriteOptions { block_samples: 16, ..WriteOptions::default() };
    let fh = create(&engine, &dir.path().join("live.cnt"), options);

    // 每次追加后, 已刷新部分与缓冲部分都可读
    let mut total = 0u64;
    for n in [1usize, 15, 16, 17, 3, 40] {
        engine.add_samples(fh, &block(total, n), n).unwrap();
        total += n as u64;
        assert_eq!(engine.sample_count(fh).unwrap(), total);
        assert_eq!(engine.get_samples(fh, 0, total).unwrap(), block(0, total as usize));
    }
    engine.close(fh).unwrap();
}

#[test]
fn test_concurrent_readers_see_identical_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.cnt");
    let engine = Arc::new(Engine::new());

    let fh = create(&engine, &path, WriteOptions::default());
    engine.add_samples(fh, &block(0, 5000), 5000).unwrap();
    engine.close(fh).unwrap();

    let rh = engine.read_cnt(&path).unwrap();
    let workers: Vec<_> = (0..8u64)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for round in 0..50u64 {
                    let from = (t * 331 + round * 97) % 4900;
                    let to = from + 1 + (round % 100);
                    let got = engine.get_samples(rh, from, to).unwrap();
                    assert_eq!(got, block(from, (to - from) as usize));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    engine.close(rh).unwrap();
}

#[test]
fn test_concurrent_appends_on_one_writer_stay_whole() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new());
    let options = WriteOptions { block_samples: 7, ..WriteOptions::default() };
    let fh = create(&engine, &dir.path().join("append.cnt"), options);

    // 每个线程写入同值样本, 读取时每个样本的各通道必须来自同一次追加
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..100 {
                    let samples = vec![t as f32; CHANNELS * 3];
                    engine.add_samples(fh, &samples, 3).unwrap();
                }
            })
        })
        .collect();
    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..100 {
                let count = engine.sample_count(fh).unwrap();
                let got = engine.get_samples(fh, 0, count).unwrap();
                assert_eq!(got.len(), count as usize * CHANNELS);
                for sample in got.chunks(CHANNELS) {
                    assert!(sample.iter().all(|v| *v == sample[0]));
                }
            }
        })
    };
    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(engine.sample_count(fh).unwrap(), 4 * 100 * 3);
    engine.close(fh).unwrap();
}

#[test]
fn test_independent_writers_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new());

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let path = dir.path().join(format!("w{}.cnt", t));
            thread::spawn(move || {
                let large_file = t % 2 == 1;
                let options = WriteOptions {
                    large_file,
                    segment_capacity: 1024,
                    block_samples: 32,
                    ..WriteOptions::default()
                };
                let fh = create(&engine, &path, options);
                for k in 0..10u64 {
                    engine.add_samples(fh, &block(k * 50, 50), 50).unwrap();
                }
                engine.close(fh).unwrap();

                let rh = engine.read_cnt(&path).unwrap();
                assert_eq!(engine.get_samples(rh, 0, 500).unwrap(), block(0, 500));
                engine.close(rh).unwrap();
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(engine.open_handles(), 0);
}

#[test]
fn test_closed_handle_rejected_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new());
    let fh = create(&engine, &dir.path().join("closed.cnt"), WriteOptions::default());
    engine.close(fh).unwrap();

    let engine2 = Arc::clone(&engine);
    let result = thread::spawn(move || engine2.add_samples(fh, &block(0, 1), 1))
        .join()
        .unwrap();
    assert!(matches!(result, Err(CntError::InvalidHandle(_))));
}

#[test]
fn test_channels_added_during_write_cnt_are_kept_or_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new());
    let ch = engine.create_channel_info().unwrap();
    engine.add_channel(ch, "E1", "Cz", "uV").unwrap();

    let adders: Vec<_> = (0..3)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut accepted = 0usize;
                for i in 0..50 {
                    match engine.add_channel(ch, &format!("T{}_{}", t, i), "Cz", "uV") {
                        Ok(_) => accepted += 1,
                        Err(CntError::InvalidHandle(_)) => break,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                accepted
            })
        })
        .collect();
    let fh = engine
        .write_cnt_with(&dir.path().join("race.cnt"), 1000.0, ch, WriteOptions::default())
        .unwrap();
    let accepted: usize = adders.into_iter().map(|a| a.join().unwrap()).sum();

    // 每个成功添加的通道都在文件中
    assert_eq!(engine.channel_count(fh).unwrap(), 1 + accepted);
    assert!(matches!(engine.add_channel(ch, "late", "Cz", "uV"), Err(CntError::InvalidHandle(_))));
    engine.close(fh).unwrap();
}
