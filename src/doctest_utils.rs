// Internal utilities for documentation tests
// This file contains helper functions to generate test files for doctests

use crate::{AverageInfo, ChannelInfoBuilder, CntWriter, Result, WriteOptions};
use std::path::Path;

fn overwrite() -> WriteOptions {
    WriteOptions { overwrite: true, ..WriteOptions::default() }
}

/// Creates a simple two-channel CNT file for documentation examples
pub fn create_simple_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut channels = ChannelInfoBuilder::new();
    channels.add("Fp1", "A1", "uV")?;
    channels.add("Fp2", "A1", "uV")?;

    let mut writer = CntWriter::create(path, 256.0, channels.finalize()?, overwrite())?;

    // One second of 10Hz sine wave data
    let mut samples = Vec::with_capacity(2 * 256);
    for i in 0..256 {
        let t = i as f32 / 256.0;
        let value = 50.0 * (2.0 * std::f32::consts::PI * 10.0 * t).sin();
        samples.push(value);
        samples.push(-value);
    }

    writer.add_samples(&samples, 256)?;
    writer.add_trigger(0, "start")?;
    writer.finalize()
}

/// Creates an average file (one epoch of 100 samples) for documentation examples
pub fn create_average_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut channels = ChannelInfoBuilder::new();
    channels.add("Cz", "avg", "uV")?;

    let mut writer = CntWriter::create(path, 500.0, channels.finalize()?, overwrite())?;
    let samples: Vec<f32> = (0..100).map(|i| (i as f32 - 20.0) * 0.1).collect();
    writer.add_samples(&samples, 100)?;
    writer.set_average_info(AverageInfo {
        zero_offset: 20,
        condition_label: "target".to_string(),
        condition_color: "red".to_string(),
        trials_total: 60,
        trials_averaged: 57,
    })?;
    writer.finalize()
}
