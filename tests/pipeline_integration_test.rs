//! Integration tests for the data processing pipeline
//!
//! Exercises the processor from configuration through filtering, outlier
//! detection and statistics, and the monitor fed by a line-delimited capture.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scale_monitor::config::{AppConfig, FilterType, LowPassDesign, ProcessingConfig};
use scale_monitor::engine::{LineReaderSource, MonitorHandle};
use scale_monitor::error::{ErrorCode, ProcessingErrorCodes};
use scale_monitor::events::ProcessorEvent;
use scale_monitor::processing::{DataProcessor, RawSample, Trend};
use tokio::sync::broadcast;

fn drain(rx: &mut broadcast::Receiver<ProcessorEvent>) -> Vec<ProcessorEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[test]
fn test_butterworth_smooths_noisy_step() {
    let config = ProcessingConfig {
        filter_type: FilterType::Butterworth,
        butterworth_cutoff: 1.0,
        butterworth_order: 4,
        sampling_rate: 50.0,
        ..ProcessingConfig::default()
    };
    let mut processor = DataProcessor::new(config).unwrap();

    // 100 s of a 10 -> 20 step with +-0.5 alternating noise at 50 Hz
    let mut last = 0.0;
    for i in 0..5000 {
        let level = if i < 2500 { 10.0 } else { 20.0 };
        let noise = if i % 2 == 0 { 0.5 } else { -0.5 };
        let sample = processor
            .process_sample(RawSample::value(level + noise, i as f64 / 50.0))
            .unwrap();
        last = sample.filtered_value.unwrap();
    }
    // Nyquist-rate noise is strongly attenuated once settled
    assert!((last - 20.0).abs() < 0.05, "filtered value {}", last);
}

#[test]
fn test_rc_fallback_design_converges() {
    let config = ProcessingConfig {
        filter_type: FilterType::Butterworth,
        lowpass_design: LowPassDesign::FirstOrderRc,
        sampling_rate: 10.0,
        butterworth_cutoff: 1.0,
        ..ProcessingConfig::default()
    };
    let mut processor = DataProcessor::new(config).unwrap();
    processor.process_raw_data("0.0").unwrap();
    let mut value = 0.0;
    for _ in 0..200 {
        value = processor
            .process_raw_data("5.0")
            .unwrap()
            .filtered_value
            .unwrap();
    }
    assert!((value - 5.0).abs() < 1e-3);
}

#[test]
fn test_spike_is_reported_and_pipeline_continues() {
    let config = ProcessingConfig {
        filter_type: FilterType::Median,
        filter_window: 5,
        ..ProcessingConfig::default()
    };
    let mut processor = DataProcessor::new(config).unwrap();
    let (tx, mut rx) = broadcast::channel(256);
    processor.set_event_sender(tx);

    for i in 0..20 {
        let value = if i % 2 == 0 { 100.0 } else { 101.0 };
        processor.process_raw_data(&value.to_string()).unwrap();
    }
    // Median filtering swallows the spike, so the raw deviation stays internal
    let spike = processor.process_raw_data("500").unwrap();
    assert!(spike.filtered_value.unwrap() <= 101.0);

    let err = processor.process_raw_data("12.3.4").unwrap_err();
    assert_eq!(err.code(), ProcessingErrorCodes::PARSE);
    processor.process_raw_data("100.5").unwrap();

    let events = drain(&mut rx);
    let processed = events
        .iter()
        .filter(|e| matches!(e, ProcessorEvent::SampleProcessed(_)))
        .count();
    let errors = events
        .iter()
        .filter(|e| matches!(e, ProcessorEvent::ProcessingError { .. }))
        .count();
    assert_eq!(processed, 22);
    assert_eq!(errors, 1);
    assert_eq!(processor.get_all_data().len(), 22);
}

#[test]
fn test_unfiltered_spike_is_flagged() {
    let config = ProcessingConfig {
        filter_type: FilterType::None,
        ..ProcessingConfig::default()
    };
    let mut processor = DataProcessor::new(config).unwrap();
    let (tx, mut rx) = broadcast::channel(256);
    processor.set_event_sender(tx);

    for i in 0..20 {
        let value = if i % 2 == 0 { 100.0 } else { 101.0 };
        processor.process_raw_data(&value.to_string()).unwrap();
    }
    processor.process_raw_data("150").unwrap();

    let outliers: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ProcessorEvent::OutlierDetected(sample) => Some(sample.raw_value),
            _ => None,
        })
        .collect();
    assert_eq!(outliers, vec![150.0]);
}

#[test]
fn test_statistics_follow_rising_signal() {
    let config = ProcessingConfig {
        filter_type: FilterType::None,
        statistics_window: 100,
        ..ProcessingConfig::default()
    };
    let mut processor = DataProcessor::new(config).unwrap();
    for i in 0..200 {
        processor.process_raw_data(&format!("{}", i)).unwrap();
    }

    let stats = processor.update_statistics();
    assert_eq!(stats.count, 100);
    assert_eq!(stats.min, 100.0);
    assert_eq!(stats.max, 199.0);
    assert!((stats.mean - 149.5).abs() < 1e-9);
    assert!((stats.median - 149.5).abs() < 1e-9);
    assert_eq!(stats.trend, Trend::Increasing);
    assert_eq!(processor.get_statistics(), stats);
}

#[test]
fn test_config_file_drives_processor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"processing": {"filter_type": "median", "filter_window": 3, "max_buffer_size": 10}}"#,
    )
    .unwrap();

    let config = AppConfig::load_from_file(&path).unwrap();
    assert_eq!(config.processing.filter_type, FilterType::Median);
    assert_eq!(config.collection.min_samples, 150);

    let mut processor = DataProcessor::new(config.processing).unwrap();
    for i in 0..25 {
        processor.process_raw_data(&i.to_string()).unwrap();
    }
    let data = processor.get_all_data();
    assert_eq!(data.len(), 10);
    assert_eq!(data[0].raw_value, 15.0);
}

#[test]
fn test_monitor_replays_capture_file() {
    let mut capture = tempfile::NamedTempFile::new().unwrap();
    for i in 0..100 {
        writeln!(capture, "{:.3}", 1.0 + (i % 3) as f64 * 0.001).unwrap();
    }
    writeln!(capture, "ERR").unwrap();

    let config = AppConfig {
        processing: ProcessingConfig {
            statistics_interval_ms: 10,
            ..ProcessingConfig::default()
        },
        ..AppConfig::default()
    };
    let handle = MonitorHandle::new(config).unwrap();
    let mut events = handle.processor_receiver().unwrap();
    handle
        .start(Arc::new(LineReaderSource::from_path(capture.path())))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.is_source_active() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    // stop() drains whatever the worker has not processed yet
    handle.stop().unwrap();

    assert_eq!(handle.history().len(), 100);
    let stats = handle.update_statistics();
    assert_eq!(stats.count, 100);
    assert!((stats.mean - 1.001).abs() < 1e-3);

    let mut parse_errors = 0;
    loop {
        match events.try_recv() {
            Ok(ProcessorEvent::ProcessingError { .. }) => parse_errors += 1,
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    assert_eq!(parse_errors, 1);
}
