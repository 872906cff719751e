use eepcnt::{
    AverageInfo, ChannelInfo, ChannelInfoBuilder, CntError, CntReader, CntWriter, Engine,
    ReadOptions, RecordingField, RecordingInfoBuilder, WriteOptions,
};
use std::fs;
use std::path::Path;

// 创建测试通道表的辅助函数
fn scenario_channels() -> ChannelInfo {
    let mut builder = ChannelInfoBuilder::new();
    builder.add("Fp1", "A1", "uV").unwrap();
    builder.add("Fp2", "A1", "uV").unwrap();
    builder.finalize().unwrap()
}

// 样本 i 通道 c 的值
fn value(i: u64, c: usize) -> f32 {
    (i as f32) * 0.5 - (c as f32) * 1000.0 + 0.125
}

fn ramp(from: u64, to: u64, channels: usize) -> Vec<f32> {
    (from..to).flat_map(|i| (0..channels).map(move |c| value(i, c))).collect()
}

fn write_ramp(path: &Path, samples: u64, options: WriteOptions) {
    let mut writer = CntWriter::create(path, 512.0, scenario_channels(), options).unwrap();
    // 分批写入, 跨越块边界
    let mut written = 0;
    while written < samples {
        let n = (samples - written).min(37);
        writer.add_samples(&ramp(written, written + n, 2), n as usize).unwrap();
        written += n;
    }
    writer.finalize().unwrap();
}

#[test]
fn test_scenario_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.cnt");
    let engine = Engine::new();

    let ch = engine.create_channel_info().unwrap();
    engine.add_channel(ch, "Fp1", "A1", "uV").unwrap();
    engine.add_channel(ch, "Fp2", "A1", "uV").unwrap();
    let fh = engine.write_cnt(&path, 256.0, ch, false).unwrap();
    engine.add_samples(fh, &vec![0.0; 512], 256).unwrap();
    engine.close(fh).unwrap();

    let rh = engine.read_cnt(&path).unwrap();
    assert_eq!(engine.sample_count(rh).unwrap(), 256);
    assert_eq!(engine.sample_frequency(rh).unwrap(), 256.0);
    assert_eq!(engine.channel_count(rh).unwrap(), 2);
    assert_eq!(engine.channel_label(rh, 1).unwrap(), "Fp2");
    assert_eq!(engine.channel_reference(rh, 0).unwrap(), "A1");
    assert_eq!(engine.channel_unit(rh, 0).unwrap(), "uV");
    assert_eq!(engine.get_samples(rh, 0, 1).unwrap(), vec![0.0, 0.0]);
    assert!(matches!(engine.channel_label(rh, 2), Err(CntError::InvalidChannelIndex(2))));
    engine.close(rh).unwrap();
}

#[test]
fn test_basic_write_read_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycle.cnt");
    write_ramp(&path, 1000, WriteOptions { block_samples: 64, ..WriteOptions::default() });

    let reader = CntReader::open(&path).unwrap();
    assert_eq!(reader.sample_count(), 1000);
    assert_eq!(reader.sample_rate(), 512.0);
    assert_eq!(reader.channels(), &scenario_channels());
    assert!(!reader.is_large_file());

    // 逐位比较
    let all = reader.read_samples(0, 1000).unwrap();
    let expected = ramp(0, 1000, 2);
    assert_eq!(
        all.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        expected.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    );
    assert_eq!(reader.read_samples(63, 65).unwrap(), ramp(63, 65, 2));
    assert!(reader.read_samples(500, 500).unwrap().is_empty());
}

#[test]
fn test_special_float_values_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("floats.cnt");
    let values = [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -0.0, f32::MIN_POSITIVE, f32::MAX];

    let mut writer = CntWriter::create(&path, 100.0, scenario_channels(), WriteOptions::default()).unwrap();
    writer.add_samples(&values, 3).unwrap();
    writer.finalize().unwrap();

    let back = CntReader::open(&path).unwrap().read_samples(0, 3).unwrap();
    assert_eq!(
        back.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        values.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    );
}

#[test]
fn test_range_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("range.cnt");
    write_ramp(&path, 10, WriteOptions::default());

    let reader = CntReader::open(&path).unwrap();
    assert!(matches!(
        reader.read_samples(5, 4),
        Err(CntError::Range { from: 5, to: 4, sample_count: 10 })
    ));
    assert!(matches!(reader.read_samples(0, 11), Err(CntError::Range { .. })));
    assert_eq!(reader.read_samples(10, 10).unwrap(), Vec::<f32>::new());
}

#[test]
fn test_shape_rejection_leaves_count_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shape.cnt");
    let mut writer = CntWriter::create(&path, 100.0, scenario_channels(), WriteOptions::default()).unwrap();
    writer.add_samples(&ramp(0, 4, 2), 4).unwrap();

    let err = writer.add_samples(&[1.0, 2.0, 3.0], 2).unwrap_err();
    assert!(matches!(err, CntError::Shape { len: 3, count: 2, channels: 2 }));
    assert_eq!(writer.sample_count(), 4);
    assert!(writer.add_samples(&[1.0, 2.0], 2).is_err());
    assert_eq!(writer.sample_count(), 4);

    writer.finalize().unwrap();
    assert_eq!(CntReader::open(&path).unwrap().sample_count(), 4);
}

#[test]
fn test_recording_info_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("info.cnt");

    let mut info = RecordingInfoBuilder::new();
    info.set_start_time(1_600_000_000).unwrap();
    info.set_date_of_birth(1990, 1, 1).unwrap();
    info.set_patient_name("Jane Doe");
    info.set_patient_name("John Doe"); // 后写覆盖
    info.set_patient_sex('M');
    info.set_patient_handedness('R');
    info.set_field(RecordingField::Hospital, "St. Elsewhere");
    info.set_field(RecordingField::Comment, "eyes closed, ünïcödé");
    let info = info.build();

    let mut writer = CntWriter::create(&path, 256.0, scenario_channels(), WriteOptions::default()).unwrap();
    writer.add_samples(&ramp(0, 8, 2), 8).unwrap();
    writer.set_recording_info(info.clone()).unwrap();
    writer.finalize().unwrap();

    let reader = CntReader::open(&path).unwrap();
    let back = reader.recording_info().unwrap();
    assert_eq!(back, &info);
    assert_eq!(back.start_time.unwrap().timestamp(), 1_600_000_000);
    assert_eq!(back.date_of_birth.unwrap().to_string(), "1990-01-01");
    assert_eq!(back.patient_name.as_deref(), Some("John Doe"));
    assert_eq!(back.field(RecordingField::Hospital), Some("St. Elsewhere"));
    assert_eq!(back.field(RecordingField::Physician), None);
}

#[test]
fn test_file_without_recording_info() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bare.cnt");
    write_ramp(&path, 3, WriteOptions::default());

    let engine = Engine::new();
    let rh = engine.read_cnt(&path).unwrap();
    assert_eq!(engine.start_time(rh).unwrap(), None);
    assert_eq!(engine.patient_name(rh).unwrap(), None);
    assert_eq!(engine.recording_field(rh, RecordingField::TestName).unwrap(), None);
    assert_eq!(engine.trigger_count(rh).unwrap(), 0);
}

#[test]
fn test_average_sentinels_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.cnt");
    let avg = dir.path().join("avg.cnt");
    write_ramp(&plain, 5, WriteOptions::default());
    eepcnt::doctest_utils::create_average_test_file(&avg).unwrap();

    let engine = Engine::new();
    let p = engine.read_cnt(&plain).unwrap();
    assert_eq!(engine.zero_offset(p).unwrap(), 0);
    assert_eq!(engine.condition_label(p).unwrap(), "none");
    assert_eq!(engine.condition_color(p).unwrap(), "none");
    assert_eq!(engine.trials_total(p).unwrap(), 0);
    assert_eq!(engine.trials_averaged(p).unwrap(), 0);

    let a = engine.read_cnt(&avg).unwrap();
    assert_eq!(engine.zero_offset(a).unwrap(), 20);
    assert_eq!(engine.condition_label(a).unwrap(), "target");
    assert_eq!(engine.condition_color(a).unwrap(), "red");
    assert_eq!(engine.trials_total(a).unwrap(), 60);
    assert_eq!(engine.trials_averaged(a).unwrap(), 57);
    assert!(CntReader::open(&avg).unwrap().header().average);

    // 写会话返回哨兵值
    let ch = engine.create_channel_info().unwrap();
    engine.add_channel(ch, "Cz", "avg", "uV").unwrap();
    let w = engine.write_cnt(&dir.path().join("w.cnt"), 100.0, ch, false).unwrap();
    engine
        .set_average_info(
            w,
            AverageInfo {
                zero_offset: 1,
                condition_label: "x".to_string(),
                condition_color: "y".to_string(),
                trials_total: 2,
                trials_averaged: 2,
            },
        )
        .unwrap();
    assert_eq!(engine.condition_label(w).unwrap(), AverageInfo::NONE_LABEL);
    engine.close(w).unwrap();
}

#[test]
fn test_triggers_round_trip_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triggers.cnt");
    let engine = Engine::new();

    let ch = engine.create_channel_info().unwrap();
    engine.add_channel(ch, "Cz", "A1", "uV").unwrap();
    let fh = engine.write_cnt(&path, 100.0, ch, false).unwrap();
    engine.add_samples(fh, &[0.0; 50], 50).unwrap();
    engine.add_trigger(fh, 40, "late").unwrap();
    engine.add_trigger(fh, 5, "11").unwrap();
    engine.add_trigger(fh, 5, "12").unwrap();
    engine.close(fh).unwrap();

    let rh = engine.read_cnt(&path).unwrap();
    assert_eq!(engine.trigger_count(rh).unwrap(), 3);
    assert_eq!(engine.trigger(rh, 0).unwrap(), ("late".to_string(), 40));
    assert_eq!(engine.trigger(rh, 1).unwrap(), ("11".to_string(), 5));
    assert_eq!(engine.trigger(rh, 2).unwrap(), ("12".to_string(), 5));
    assert!(matches!(engine.trigger(rh, 3), Err(CntError::InvalidTriggerIndex(3))));
}

#[test]
fn test_large_file_spans_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.cnt");
    // 每段 10 个样本 (2 通道 x 4 字节)
    let options = WriteOptions {
        large_file: true,
        block_samples: 4,
        segment_capacity: 80,
        ..WriteOptions::default()
    };
    write_ramp(&path, 35, options);

    for id in 0..4 {
        assert!(dir.path().join(format!("large.cnt.{:03}", id)).exists());
    }
    assert!(!dir.path().join("large.cnt.004").exists());

    let reader = CntReader::open(&path).unwrap();
    assert!(reader.is_large_file());
    assert_eq!(reader.sample_count(), 35);
    assert_eq!(reader.read_samples(0, 35).unwrap(), ramp(0, 35, 2));
    assert_eq!(reader.read_samples(8, 23).unwrap(), ramp(8, 23, 2));
    assert_eq!(reader.read_samples(30, 31).unwrap(), ramp(30, 31, 2));
    drop(reader);

    fs::remove_file(dir.path().join("large.cnt.002")).unwrap();
    assert!(matches!(CntReader::open(&path), Err(CntError::Format(_))));
}

#[test]
fn test_large_file_segment_too_short() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short_seg.cnt");
    let options = WriteOptions { large_file: true, segment_capacity: 80, ..WriteOptions::default() };
    write_ramp(&path, 25, options);

    // 截断最后一段, 容器头声明的长度超过文件长度
    let last = dir.path().join("short_seg.cnt.002");
    let len = fs::metadata(&last).unwrap().len();
    fs::OpenOptions::new().write(true).open(&last).unwrap().set_len(len - 8).unwrap();
    assert!(matches!(CntReader::open(&path), Err(CntError::Format(_))));
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.cnt");
    assert!(matches!(CntReader::open(&path), Err(CntError::NotFound(_))));
    assert!(matches!(Engine::new().read_cnt(&path), Err(CntError::NotFound(_))));
}

#[test]
fn test_truncated_files_are_format_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.cnt");
    write_ramp(&path, 100, WriteOptions::default());
    let bytes = fs::read(&path).unwrap();

    let cut = dir.path().join("cut.cnt");
    for len in [0, 4, 11, 12, 30, 60, bytes.len() / 2, bytes.len() - 1] {
        fs::write(&cut, &bytes[..len]).unwrap();
        match CntReader::open(&cut) {
            Err(CntError::Format(_)) => {}
            other => panic!("length {}: expected format error, got {:?}", len, other),
        }
    }
}

#[test]
fn test_corrupt_magic_and_unfinished_writer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("magic.cnt");
    write_ramp(&path, 10, WriteOptions::default());
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();
    assert!(matches!(CntReader::open(&path), Err(CntError::Format(_))));

    let unfinished = dir.path().join("unfinished.cnt");
    {
        let mut writer =
            CntWriter::create(&unfinished, 100.0, scenario_channels(), WriteOptions::default()).unwrap();
        writer.add_samples(&ramp(0, 2000, 2), 2000).unwrap();
    }
    assert!(matches!(CntReader::open(&unfinished), Err(CntError::Format(_))));
}

#[test]
fn test_unknown_chunks_lenient_and_strict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.cnt");
    write_ramp(&path, 10, WriteOptions::default());

    // 追加一个未知块并修正 RIFF 长度
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(b"junk");
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&[1, 2, 3, 0]);
    let riff_len = (bytes.len() - 8) as u32;
    bytes[4..8].copy_from_slice(&riff_len.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let reader = CntReader::open(&path).unwrap();
    assert_eq!(reader.read_samples(0, 10).unwrap(), ramp(0, 10, 2));

    let strict = CntReader::open_with(&path, ReadOptions { strict: true });
    assert!(matches!(strict, Err(CntError::Format(_))));
}

#[test]
fn test_overwrite_option() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("over.cnt");
    write_ramp(&path, 10, WriteOptions::default());

    let again = CntWriter::create(&path, 100.0, scenario_channels(), WriteOptions::default());
    assert!(matches!(again, Err(CntError::AlreadyExists(_))));
    assert_eq!(CntReader::open(&path).unwrap().sample_count(), 10);

    write_ramp(&path, 3, WriteOptions { overwrite: true, ..WriteOptions::default() });
    assert_eq!(CntReader::open(&path).unwrap().sample_count(), 3);
}
