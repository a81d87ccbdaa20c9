use super::*;
use crate::calibration::CalibrationMethod;
use crate::config::FilterType;
use crate::error::ProcessingErrorCodes;

fn unfiltered_config() -> ProcessingConfig {
    ProcessingConfig {
        filter_type: FilterType::None,
        ..ProcessingConfig::default()
    }
}

fn linear_curve(slope: f64, intercept: f64) -> CalibrationResult {
    CalibrationResult {
        method: CalibrationMethod::Linear,
        coefficients: vec![slope, intercept],
        r_squared: 1.0,
        rmse: 0.0,
        points: Vec::new(),
        created_time: 0.0,
        validation_passed: true,
    }
}

fn drain(rx: &mut broadcast::Receiver<ProcessorEvent>) -> Vec<ProcessorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn feed_alternating(processor: &mut DataProcessor, count: usize) {
    for i in 0..count {
        let line = if i % 2 == 0 { "100" } else { "101" };
        processor.process_raw_data(line).unwrap();
    }
}

#[test]
fn test_parse_error_is_recoverable() {
    let mut processor = DataProcessor::new(ProcessingConfig::default()).unwrap();
    let (tx, mut rx) = broadcast::channel(16);
    processor.set_event_sender(tx);

    let err = processor.process_raw_data("12.5abc").unwrap_err();
    assert_eq!(err.code(), ProcessingErrorCodes::PARSE);
    assert!(processor.history().is_empty());

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [ProcessorEvent::ProcessingError { code: 1001, .. }]
    ));

    let sample = processor.process_raw_data(" 12.5\r\n").unwrap();
    assert_eq!(sample.raw_value, 12.5);
    assert_eq!(processor.history().len(), 1);
}

#[test]
fn test_non_finite_values_rejected() {
    let mut processor = DataProcessor::new(ProcessingConfig::default()).unwrap();
    assert!(processor.process_raw_data("NaN").is_err());
    assert!(processor.process_raw_data("inf").is_err());
    assert!(processor
        .process_sample(RawSample::value(f64::INFINITY, 0.0))
        .is_err());
    assert!(processor.history().is_empty());
}

#[test]
fn test_uncalibrated_sample_keeps_sensor_scale() {
    let mut processor = DataProcessor::new(unfiltered_config()).unwrap();
    let sample = processor.process_raw_data("42.0").unwrap();
    assert_eq!(sample.filtered_value, Some(42.0));
    assert_eq!(sample.calibrated_value, Some(42.0));
    assert_eq!(sample.value(), 42.0);
    assert_eq!(sample.quality_score, 1.0);
}

#[test]
fn test_moving_average_applied() {
    let config = ProcessingConfig {
        filter_window: 2,
        ..ProcessingConfig::default()
    };
    let mut processor = DataProcessor::new(config).unwrap();
    processor.process_raw_data("10").unwrap();
    let sample = processor.process_raw_data("20").unwrap();
    assert_eq!(sample.raw_value, 20.0);
    assert_eq!(sample.filtered_value, Some(15.0));
}

#[test]
fn test_low_quality_sample_bypasses_filter() {
    let mut processor = DataProcessor::new(ProcessingConfig::default()).unwrap();
    for _ in 0..3 {
        processor.process_raw_data("100").unwrap();
    }
    let sample = processor.process_raw_data("20000").unwrap();
    assert!(sample.quality_score < 0.5);
    assert_eq!(sample.filtered_value, Some(20000.0));
}

#[test]
fn test_active_calibration_converts_filtered_value() {
    let mut processor = DataProcessor::new(unfiltered_config()).unwrap();
    let (tx, mut rx) = broadcast::channel(16);
    processor.set_event_sender(tx);

    processor.set_calibration(Some(linear_curve(10.0, -10.0)));
    assert!(processor.is_calibrated());
    assert!(drain(&mut rx).contains(&ProcessorEvent::CalibrationStatusChanged { calibrated: true }));

    let sample = processor.process_raw_data("2").unwrap();
    assert_eq!(sample.filtered_value, Some(2.0));
    assert!((sample.value() - 10.0).abs() < 1e-12);

    let info = processor.get_calibration_info().unwrap();
    assert_eq!(info.method, CalibrationMethod::Linear);
    assert!(info.validation_passed);

    processor.set_calibration(None);
    assert!(!processor.is_calibrated());
    assert!(processor.get_calibration_info().is_none());
    assert!(drain(&mut rx).contains(&ProcessorEvent::CalibrationStatusChanged { calibrated: false }));
}

#[test]
fn test_outlier_flagged_but_kept() {
    let mut processor = DataProcessor::new(unfiltered_config()).unwrap();
    let (tx, mut rx) = broadcast::channel(64);
    processor.set_event_sender(tx);

    feed_alternating(&mut processor, 10);
    drain(&mut rx);

    let spike = processor.process_raw_data("200").unwrap();
    let events = drain(&mut rx);
    assert!(events.contains(&ProcessorEvent::OutlierDetected(spike.clone())));
    assert_eq!(processor.history().len(), 11);
}

#[test]
fn test_outlier_needs_ten_prior_samples() {
    let mut processor = DataProcessor::new(unfiltered_config()).unwrap();
    let (tx, mut rx) = broadcast::channel(64);
    processor.set_event_sender(tx);

    feed_alternating(&mut processor, 9);
    processor.process_raw_data("5000").unwrap();
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ProcessorEvent::OutlierDetected(_))));
}

#[test]
fn test_calibration_mode_suppresses_outliers() {
    let mut processor = DataProcessor::new(unfiltered_config()).unwrap();
    let (tx, mut rx) = broadcast::channel(64);
    processor.set_event_sender(tx);
    processor.set_calibration_mode(true);

    feed_alternating(&mut processor, 10);
    processor.process_raw_data("200").unwrap();
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ProcessorEvent::OutlierDetected(_))));
}

#[test]
fn test_statistics_use_recent_window() {
    let config = ProcessingConfig {
        filter_type: FilterType::None,
        statistics_window: 4,
        ..ProcessingConfig::default()
    };
    let mut processor = DataProcessor::new(config).unwrap();
    for v in ["1", "2", "3", "4", "5", "6"] {
        processor.process_raw_data(v).unwrap();
    }
    let stats = processor.update_statistics();
    assert_eq!(stats.count, 4);
    assert_eq!(stats.min, 3.0);
    assert_eq!(stats.max, 6.0);
    assert_eq!(processor.get_statistics(), stats);
}

#[test]
fn test_update_config_validates_and_rebuilds() {
    let mut processor = DataProcessor::new(ProcessingConfig::default()).unwrap();
    let bad = ProcessingConfig {
        filter_window: 0,
        ..ProcessingConfig::default()
    };
    assert!(processor.update_config(bad).is_err());
    assert_eq!(processor.config().filter_window, 5);

    let smaller = ProcessingConfig {
        max_buffer_size: 3,
        filter_type: FilterType::Median,
        ..ProcessingConfig::default()
    };
    for _ in 0..5 {
        processor.process_raw_data("1").unwrap();
    }
    processor.update_config(smaller).unwrap();
    assert_eq!(processor.history().len(), 3);
    assert_eq!(processor.history().capacity(), 3);
}

#[test]
fn test_update_butterworth_filter() {
    let mut processor = DataProcessor::new(ProcessingConfig::default()).unwrap();
    assert_eq!(
        processor.update_butterworth_filter(Some(2.0), None, Some(6)),
        Ok(false)
    );
    assert_eq!(processor.config().butterworth_cutoff, 1.0);
    assert_eq!(processor.config().butterworth_order, 2);

    let config = ProcessingConfig {
        filter_type: FilterType::Butterworth,
        ..ProcessingConfig::default()
    };
    processor.update_config(config).unwrap();
    assert_eq!(
        processor.update_butterworth_filter(None, Some(100.0), Some(4)),
        Ok(true)
    );
    assert_eq!(processor.config().butterworth_order, 4);
    assert!(processor
        .update_butterworth_filter(Some(-1.0), None, None)
        .is_err());
    assert_eq!(processor.config().butterworth_cutoff, 1.0);
}

#[test]
fn test_clear_buffer_and_cleanup() {
    let mut processor = DataProcessor::new(ProcessingConfig::default()).unwrap();
    for _ in 0..4 {
        processor.process_raw_data("7").unwrap();
    }
    processor.update_statistics();
    assert_eq!(processor.get_all_data().len(), 4);

    processor.clear_buffer();
    assert!(processor.get_all_data().is_empty());
    assert_eq!(processor.get_statistics().count, 0);

    processor.set_calibration(Some(linear_curve(10.0, 0.0)));
    processor.set_calibration_mode(true);
    processor.cleanup();
    assert!(!processor.is_calibration_mode());
    assert!(!processor.is_calibrated());
    assert!(processor.get_calibration_info().is_none());
}
