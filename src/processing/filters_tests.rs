use super::*;

fn run<F: SampleFilter>(filter: &mut F, input: &[f64]) -> Vec<f64> {
    input.iter().map(|&v| filter.filter(v)).collect()
}

fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "expected {} ~= {} (tol {})", a, b, tol);
}

const SEQUENCE: [f64; 8] = [1.0, 4.0, 2.0, 8.0, 5.0, 7.0, 3.0, 6.0];

#[test]
fn test_moving_average_warmup_and_window() {
    let mut filter = MovingAverageFilter::new(3);
    let out = run(&mut filter, &[1.0, 2.0, 3.0, 4.0]);
    assert_close(out[0], 1.0, 1e-12);
    assert_close(out[1], 1.5, 1e-12);
    assert_close(out[2], 2.0, 1e-12);
    assert_close(out[3], 3.0, 1e-12);
}

#[test]
fn test_median_rejects_spike() {
    let mut filter = MedianFilter::new(5);
    let out = run(&mut filter, &[10.0, 10.0, 10.0, 1000.0, 10.0]);
    assert_close(out[4], 10.0, 1e-12);
}

#[test]
fn test_median_even_window_interpolates() {
    let mut filter = MedianFilter::new(4);
    let out = run(&mut filter, &[1.0, 9.0, 3.0, 7.0]);
    assert_close(out[1], 5.0, 1e-12);
    assert_close(out[3], 5.0, 1e-12);
}

#[test]
fn test_reset_is_idempotent_for_every_filter() {
    let mut filters: Vec<SignalFilter> = vec![
        SignalFilter::MovingAverage(MovingAverageFilter::new(4)),
        SignalFilter::Median(MedianFilter::new(3)),
        SignalFilter::Butterworth(ButterworthFilter::new(1.0, 10.0, 2, LowPassDesign::Iir)),
        SignalFilter::Butterworth(ButterworthFilter::new(1.0, 10.0, 3, LowPassDesign::Iir)),
        SignalFilter::Butterworth(ButterworthFilter::new(
            1.0,
            10.0,
            2,
            LowPassDesign::FirstOrderRc,
        )),
    ];

    for filter in filters.iter_mut() {
        let fresh = run(&mut filter.clone(), &SEQUENCE);
        let _ = run(filter, &[100.0, -3.0, 42.0]);
        filter.reset();
        let after_reset = run(filter, &SEQUENCE);
        assert_eq!(fresh, after_reset, "reset diverged for {:?}", filter);
    }
}

#[test]
fn test_butterworth_passes_constant_without_transient() {
    for order in 1..=5 {
        let mut filter = ButterworthFilter::new(1.0, 10.0, order, LowPassDesign::Iir);
        for _ in 0..50 {
            assert_close(filter.filter(5.0), 5.0, 1e-9);
        }
    }
}

#[test]
fn test_butterworth_step_response_settles() {
    let mut filter = ButterworthFilter::new(1.0, 10.0, 2, LowPassDesign::Iir);
    filter.filter(0.0);

    let first = filter.filter(1.0);
    assert!(first > 0.0 && first < 0.5, "step should be smoothed, got {}", first);

    let mut last = first;
    for _ in 0..300 {
        last = filter.filter(1.0);
    }
    assert_close(last, 1.0, 1e-6);
}

#[test]
fn test_butterworth_attenuates_high_frequency() {
    let mut filter = ButterworthFilter::new(0.5, 20.0, 4, LowPassDesign::Iir);
    let mut peak: f64 = 0.0;
    for i in 0..400 {
        // Nyquist-rate alternation around zero
        let x = if i % 2 == 0 { 1.0 } else { -1.0 };
        let y = filter.filter(x);
        if i > 200 {
            peak = peak.max(y.abs());
        }
    }
    assert!(peak < 0.01, "high frequency leaked: {}", peak);
}

#[test]
fn test_butterworth_clamps_cutoff_at_nyquist() {
    let filter = ButterworthFilter::new(5.0, 10.0, 2, LowPassDesign::Iir);
    assert_close(filter.normalized_cutoff(), MAX_NORMALIZED_CUTOFF, 1e-12);

    let filter = ButterworthFilter::new(25.0, 10.0, 2, LowPassDesign::Iir);
    assert_close(filter.normalized_cutoff(), MAX_NORMALIZED_CUTOFF, 1e-12);

    let filter = ButterworthFilter::new(1.0, 10.0, 2, LowPassDesign::Iir);
    assert_close(filter.normalized_cutoff(), 0.2, 1e-12);
}

#[test]
fn test_clamped_butterworth_still_filters() {
    let mut filter = ButterworthFilter::new(50.0, 10.0, 2, LowPassDesign::Iir);
    let out = run(&mut filter, &SEQUENCE);
    assert!(out.iter().all(|v| v.is_finite()));
}

#[test]
fn test_update_parameters_reinitializes_state() {
    let mut filter = ButterworthFilter::new(1.0, 10.0, 2, LowPassDesign::Iir);
    run(&mut filter, &SEQUENCE);

    filter.update_parameters(2.0, 20.0, 4);
    assert_eq!(filter.order(), 4);
    assert_close(filter.cutoff_hz(), 2.0, 1e-12);
    assert_close(filter.filter(2.0), 2.0, 1e-9);
}

#[test]
fn test_rc_fallback_coefficient() {
    let rc = RcLowPass::new(1.0, 10.0);
    let dt = 0.1;
    let tau = 1.0 / (2.0 * PI);
    assert_close(rc.alpha(), dt / (tau + dt), 1e-12);

    let mut rc = rc;
    assert_close(rc.filter(3.0), 3.0, 1e-12);
    let y = rc.filter(4.0);
    assert_close(y, 3.0 + rc.alpha(), 1e-12);
}

#[test]
fn test_from_config_selects_filter() {
    let mut config = ProcessingConfig::default();
    config.filter_type = FilterType::None;
    assert!(SignalFilter::from_config(&config).is_none());

    config.filter_type = FilterType::Median;
    assert!(matches!(
        SignalFilter::from_config(&config),
        Some(SignalFilter::Median(_))
    ));

    config.filter_type = FilterType::Butterworth;
    let mut filter = SignalFilter::from_config(&config).unwrap();
    assert!(filter.as_butterworth_mut().is_some());
}
