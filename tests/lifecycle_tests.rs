// 全局状态测试放在独立的测试二进制中, 避免与其他测试共享注册表
use eepcnt::api;
use eepcnt::{CntError, CntReader};

#[test]
fn test_init_shutdown_lifecycle() {
    // 未初始化时关闭无副作用
    api::shutdown().unwrap();
    api::init();
    api::init();
    assert_eq!(api::version(), eepcnt::version());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifecycle.cnt");

    let ch = api::create_channel_info().unwrap();
    api::add_channel(ch, "Fp1", "A1", "uV").unwrap();
    let fh = api::write_cnt(&path, 250.0, ch, false).unwrap();
    api::add_samples(fh, vec![1.0, 2.0, 3.0], 3).unwrap();
    let spare = api::create_channel_info().unwrap();

    // 关闭时完成写入并释放所有句柄
    api::shutdown().unwrap();
    api::shutdown().unwrap();

    let reader = CntReader::open(&path).unwrap();
    assert_eq!(reader.sample_count(), 3);
    assert_eq!(reader.read_samples(0, 3).unwrap(), vec![1.0, 2.0, 3.0]);

    // 之后的调用使用新的空注册表
    assert!(matches!(api::sample_count(fh), Err(CntError::InvalidHandle(_))));
    assert!(matches!(api::add_channel(spare, "Cz", "A1", "uV"), Err(CntError::InvalidHandle(_))));

    let rh = api::read_cnt(&path).unwrap();
    assert_eq!(api::sample_count(rh).unwrap(), 3);
    api::shutdown().unwrap();
}
