use super::*;
use crate::clock::ManualTimeSource;
use crate::config::{CollectionConfig, FilterType, ProcessingConfig};
use crate::engine::backend::{SimulatedConfig, SimulatedSource};
use crate::events::ProcessorEvent;

fn test_config() -> AppConfig {
    AppConfig {
        processing: ProcessingConfig {
            filter_type: FilterType::None,
            statistics_interval_ms: 20,
            ..ProcessingConfig::default()
        },
        collection: CollectionConfig {
            collection_duration: 0.2,
            min_samples: 5,
            stabilization_time: 0.1,
            tick_interval_ms: 10,
            ..CollectionConfig::default()
        },
        ..AppConfig::default()
    }
}

fn manual_handle() -> (MonitorHandle, Arc<ManualTimeSource>) {
    let clock = Arc::new(ManualTimeSource::new());
    let handle = MonitorHandle::with_time_source(test_config(), clock.clone()).unwrap();
    (handle, clock)
}

fn collect_point(handle: &MonitorHandle, clock: &ManualTimeSource, weight: f64, reading: f64) {
    handle.start_point_collection(weight).unwrap();
    for _ in 0..10 {
        handle.ingest_line(&reading.to_string()).unwrap();
    }
    clock.advance(Duration::from_millis(100));
    assert!(handle.calibration_tick().unwrap().is_none());

    for _ in 0..10 {
        handle.ingest_line(&reading.to_string()).unwrap();
    }
    clock.advance(Duration::from_millis(200));
    let point = handle.calibration_tick().unwrap().expect("point completes");
    assert_eq!(point.reference_weight, weight);
    assert_eq!(point.sensor_readings.len(), 10);
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn rejects_invalid_config() {
    let mut config = test_config();
    config.processing.filter_window = 1;
    assert!(MonitorHandle::new(config).is_err());
}

#[test]
fn ingest_line_keeps_going_after_parse_error() {
    let (handle, _clock) = manual_handle();
    handle.ingest_line("1.5").unwrap();
    assert!(handle.ingest_line("garbage").is_err());
    handle.ingest_line("1.7").unwrap();

    let data = handle.get_all_data();
    assert_eq!(data.len(), 2);
    assert_eq!(data[1].raw_value, 1.7);
    assert_eq!(handle.history().len(), 2);
}

#[test]
fn processor_events_reach_subscribers() {
    let (handle, _clock) = manual_handle();
    let mut rx = handle.processor_receiver().unwrap();

    handle.ingest_line("2.0").unwrap();
    let _ = handle.ingest_line("nope");

    assert!(matches!(
        rx.try_recv().unwrap(),
        ProcessorEvent::SampleProcessed(sample) if sample.raw_value == 2.0
    ));
    assert!(matches!(
        rx.try_recv().unwrap(),
        ProcessorEvent::ProcessingError { .. }
    ));
}

#[test]
fn forwarded_subscription_delivers_events() {
    let (handle, _clock) = manual_handle();
    let mut rx = handle.subscribe_processor();
    // Give the forwarding thread time to start listening
    std::thread::sleep(Duration::from_millis(50));

    handle.ingest_line("3.0").unwrap();
    let mut received = None;
    assert!(wait_for(|| {
        if let Ok(event) = rx.try_recv() {
            received = Some(event);
        }
        received.is_some()
    }));
    assert!(matches!(received, Some(ProcessorEvent::SampleProcessed(_))));
}

#[test]
fn calibration_through_the_handle() {
    let (handle, clock) = manual_handle();
    handle.start_calibration(&[0.0, 10.0]).unwrap();

    collect_point(&handle, &clock, 0.0, 0.5);
    collect_point(&handle, &clock, 10.0, 0.6);
    assert_eq!(handle.next_reference_weight().unwrap(), None);

    let result = handle
        .calculate_calibration(CalibrationMethod::Linear)
        .unwrap();
    assert!(result.validation_passed);
    assert_eq!(handle.calibration_state().unwrap(), CalibrationState::Completed);

    assert!(!handle.is_calibrated());
    handle.apply_calibration(Some(result));
    assert!(handle.is_calibrated());

    let sample = handle.ingest_line("0.55").unwrap();
    assert!((sample.calibrated_value.unwrap() - 5.0).abs() < 1e-6);
    assert_eq!(handle.get_calibration_info().unwrap().point_count, 2);
}

#[test]
fn calibration_collects_raw_readings_with_filter_active() {
    let mut config = test_config();
    config.processing.filter_type = FilterType::MovingAverage;
    config.processing.filter_window = 5;
    let clock = Arc::new(ManualTimeSource::new());
    let handle = MonitorHandle::with_time_source(config, clock.clone()).unwrap();

    handle.start_calibration(&[10.0]).unwrap();
    handle.start_point_collection(10.0).unwrap();
    let noisy = |i: usize| if i % 2 == 0 { "1.10" } else { "0.90" };
    for i in 0..10 {
        handle.ingest_line(noisy(i)).unwrap();
    }
    clock.advance(Duration::from_millis(100));
    assert!(handle.calibration_tick().unwrap().is_none());

    let mut smoothed = Vec::new();
    for i in 0..10 {
        let sample = handle.ingest_line(noisy(i)).unwrap();
        smoothed.push(sample.filtered_value.unwrap());
    }
    assert!(smoothed.iter().all(|v| (v - 1.0).abs() < 0.05));

    clock.advance(Duration::from_millis(200));
    let point = handle.calibration_tick().unwrap().expect("point completes");
    assert_eq!(point.sensor_readings.len(), 10);
    assert_eq!(point.sensor_readings[0], 1.10);
    assert_eq!(point.sensor_readings[1], 0.90);
    assert!((point.cv_percentage() - 10.0).abs() < 1e-9);
    // CV above the 5% limit halves the score
    assert!((point.quality_score - 0.5).abs() < 1e-12);
}

#[test]
fn readings_ignored_when_not_collecting() {
    let (handle, _clock) = manual_handle();
    handle.start_calibration(&[0.0]).unwrap();
    handle.ingest_line("0.5").unwrap();
    assert_eq!(handle.calibration_progress().unwrap().samples_collected, 0);
    assert_eq!(handle.calibration_state().unwrap(), CalibrationState::Idle);
}

#[test]
fn save_and_load_calibration() {
    let (handle, clock) = manual_handle();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.json");

    assert!(handle.save_calibration(&path).is_err());

    handle.start_calibration(&[0.0, 10.0]).unwrap();
    collect_point(&handle, &clock, 0.0, 1.0);
    collect_point(&handle, &clock, 10.0, 2.0);
    let result = handle.select_best_calibration().unwrap();
    handle.save_calibration(&path).unwrap();

    let (other, _clock) = manual_handle();
    let loaded = other.load_calibration(&path).unwrap();
    assert_eq!(loaded, result);
    assert!(other.is_calibrated());
}

#[test]
fn cancel_returns_engine_to_idle() {
    let (handle, _clock) = manual_handle();
    handle.start_calibration(&[0.0, 10.0]).unwrap();
    handle.start_point_collection(0.0).unwrap();
    handle.cancel_calibration().unwrap();

    assert_eq!(handle.calibration_state().unwrap(), CalibrationState::Idle);
    assert_eq!(
        handle.complete_current_point(),
        Err(CalibrationError::NotCollecting)
    );
}

#[test]
fn update_config_rejected_while_collecting() {
    let (handle, _clock) = manual_handle();
    handle.start_point_collection(5.0).unwrap();

    let mut config = test_config();
    config.collection.min_samples = 50;
    assert!(matches!(
        handle.update_config(config.clone()),
        Err(ConfigError::InvalidParameter { field: "collection", .. })
    ));

    handle.cancel_calibration().unwrap();
    handle.update_config(config).unwrap();
    assert_eq!(handle.config_snapshot().collection.min_samples, 50);
}

#[test]
fn butterworth_update_is_reflected_in_config() {
    let mut config = test_config();
    config.processing.filter_type = FilterType::Butterworth;
    let handle = MonitorHandle::new(config).unwrap();

    assert!(handle
        .update_butterworth_filter(Some(2.0), None, Some(4))
        .unwrap());
    let processing = handle.config_snapshot().processing;
    assert_eq!(processing.butterworth_cutoff, 2.0);
    assert_eq!(processing.butterworth_order, 4);

    assert!(handle.update_butterworth_filter(Some(-1.0), None, None).is_err());
}

#[test]
fn butterworth_update_ignored_when_filter_inactive() {
    let (handle, _clock) = manual_handle();

    assert!(!handle
        .update_butterworth_filter(Some(3.0), Some(50.0), Some(4))
        .unwrap());
    let snapshot = handle.config_snapshot().processing;
    let processor = handle.pipeline.processor().config().clone();
    assert_eq!(snapshot, processor);
    assert_eq!(processor.butterworth_cutoff, 1.0);
    assert_eq!(processor.butterworth_order, 2);
}

#[test]
fn uptime_follows_time_source() {
    let (handle, clock) = manual_handle();
    clock.advance_secs(1.5);
    assert_eq!(handle.uptime_ms(), 1500);
}

#[test]
fn worker_drains_simulated_source() {
    let handle = MonitorHandle::new(test_config()).unwrap();
    let source = Arc::new(SimulatedSource::new(SimulatedConfig {
        rate_hz: 1000.0,
        max_samples: Some(50),
        ..SimulatedConfig::default()
    }));

    handle.start(source.clone()).unwrap();
    assert!(handle.is_running());
    assert!(wait_for(|| handle.history().len() == 50));
    assert!(wait_for(|| !handle.is_source_active()));
    assert!(wait_for(|| handle.get_statistics().count == 50));

    let metrics = handle.source_metrics().unwrap();
    assert_eq!(metrics.packets_received, 50);

    handle.stop().unwrap();
    assert!(!handle.is_running());
    assert_eq!(handle.stop(), Err(SourceError::NotRunning));
}

#[test]
fn start_twice_is_rejected() {
    let handle = MonitorHandle::new(test_config()).unwrap();
    handle.start(Arc::new(SimulatedSource::default())).unwrap();
    assert_eq!(
        handle.start(Arc::new(SimulatedSource::default())),
        Err(SourceError::AlreadyRunning)
    );
    handle.stop().unwrap();
}

#[test]
fn cleanup_clears_history() {
    let (handle, _clock) = manual_handle();
    handle.ingest_line("1.0").unwrap();
    handle.cleanup();
    assert!(handle.history().is_empty());
}
