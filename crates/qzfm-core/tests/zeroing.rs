mod common;

use common::{driver, status_chunk, MockSerial};
use pretty_assertions::assert_eq;
use qzfm_core::{
    AutoStartOptions, CalibrationOutcome, CancelToken, QzfmError, ZeroAxes, ZeroOutcome, ZeroPhase,
    ZeroThresholds,
};

#[test]
fn test_field_zero_converges_and_stops_once() {
    let mut sensor = driver(MockSerial::with_chunks([
        status_chunk(&["~07033768", "~08033268", "~09032868"]),
        status_chunk(&["~07032868", "~08032818", "~09032788"]),
        status_chunk(&["~07032868", "~08032818", "~09032788"]),
        status_chunk(&["|41"]),
    ]));

    let mut seen = Vec::new();
    let outcome = sensor
        .field_zero(
            ZeroAxes::Xyz,
            ZeroThresholds::fields(1.0),
            &CancelToken::new(),
            |p| seen.push((p.iteration, p.converged)),
        )
        .unwrap();

    assert_eq!(outcome, ZeroOutcome::Converged { iterations: 2 });
    assert_eq!(seen, vec![(1, false), (2, true)]);
    assert_eq!(sensor.transport().sent, b"iDE".to_vec());
    assert_eq!(sensor.transport().count(0x45), 1);
    assert!(sensor.state().is_field_zeroed);
    assert!(sensor.state().led.field_zeroed);
    assert_eq!(sensor.state().zero_phase, ZeroPhase::Converged);
}

#[test]
fn test_field_zero_yz_selects_axes() {
    let mut sensor = driver(MockSerial::with_chunks([
        status_chunk(&["~04008388608"]),
        status_chunk(&["~04008388608"]),
    ]));

    let outcome = sensor
        .field_zero(
            ZeroAxes::Yz,
            ZeroThresholds::default().with_t_error(0.001),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap();

    assert_eq!(outcome, ZeroOutcome::Converged { iterations: 1 });
    assert_eq!(sensor.transport().sent, b"hDE".to_vec());
    assert!(!sensor.state().is_xyz_zeroing);
}

#[test]
fn test_field_zero_without_thresholds_runs_until_cancelled() {
    let mut sensor = driver(MockSerial::with_chunks(
        (0..4).map(|_| status_chunk(&["~07032768", "~04008388608"])),
    ));
    let cancel = CancelToken::new();
    let stopper = cancel.clone();

    let outcome = sensor
        .field_zero(ZeroAxes::Xyz, ZeroThresholds::default(), &cancel, |p| {
            assert!(!p.converged);
            if p.iteration == 3 {
                stopper.cancel();
            }
        })
        .unwrap();

    assert_eq!(outcome, ZeroOutcome::Cancelled { iterations: 3 });
    assert_eq!(sensor.transport().sent, b"iDE".to_vec());
    assert!(!sensor.state().is_field_zeroed);
    assert_eq!(sensor.state().zero_phase, ZeroPhase::Cancelled);
}

#[test]
fn test_field_zero_ignores_reads_without_readings() {
    let mut sensor = driver(MockSerial::with_chunks([
        status_chunk(&["~07033768", "~08033268", "~09032868"]),
        status_chunk(&["~07032868", "~08032818", "~09032788"]),
        status_chunk(&["|11", "#Zeroing"]),
        status_chunk(&["~07033268", "~08032818", "~09032788"]),
        status_chunk(&["~07033268", "~08032818", "~09032788"]),
    ]));

    let mut seen = Vec::new();
    let outcome = sensor
        .field_zero(
            ZeroAxes::Xyz,
            ZeroThresholds::fields(1.0),
            &CancelToken::new(),
            |p| seen.push((p.iteration, p.reading.bz, p.converged)),
        )
        .unwrap();

    assert_eq!(outcome, ZeroOutcome::Converged { iterations: 3 });
    assert_eq!(
        seen,
        vec![(1, 100.0, false), (2, 500.0, false), (3, 500.0, true)]
    );
    assert_eq!(sensor.transport().count(0x45), 1);
}

#[test]
fn test_field_zero_cancelled_before_first_iteration() {
    let mut sensor = driver(MockSerial::new());
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = sensor
        .field_zero(ZeroAxes::Xyz, ZeroThresholds::fields(1.0), &cancel, |_| {
            panic!("no iteration expected")
        })
        .unwrap();

    assert_eq!(outcome, ZeroOutcome::Cancelled { iterations: 0 });
    assert_eq!(sensor.transport().count(0x45), 1);
}

#[test]
fn test_field_zero_off_holds_field() {
    let mut sensor = driver(MockSerial::with_chunks([status_chunk(&["|41"])]));
    sensor.field_zero_off().unwrap();

    assert_eq!(sensor.transport().sent, b"E".to_vec());
    assert!(sensor.state().is_field_zeroed);
    assert!(sensor.state().led.field_zeroed);
}

#[test]
fn test_calibrate_requires_field_zeroed_led() {
    let mut sensor = driver(MockSerial::with_chunks([status_chunk(&["|11", "|31"])]));

    let err = sensor.calibrate().unwrap_err();
    assert!(matches!(err, QzfmError::Precondition(_)));
    assert_eq!(sensor.transport().count(0x39), 0);
    assert!(!sensor.state().is_calibrated);
}

#[test]
fn test_calibrate_confirmed_with_report() {
    let mut sensor = driver(MockSerial::with_chunks([
        status_chunk(&["|41"]),
        status_chunk(&["#Calib X: 1.02, Y: 0.98, Z:1.01, (Bz)0.35"]),
    ]));

    let outcome = sensor.calibrate().unwrap();

    let CalibrationOutcome::Confirmed { message, report } = outcome else {
        panic!("expected a confirmed calibration");
    };
    assert_eq!(message, "Calib X: 1.02, Y: 0.98, Z:1.01, (Bz)0.35");
    let report = report.unwrap();
    assert_eq!((report.x, report.y, report.z), (1.02, 0.98, 1.01));
    assert_eq!(sensor.transport().sent, b"9".to_vec());
    assert!(sensor.state().is_calibrated);
    assert!(sensor.snapshot().calibration.is_some());
}

#[test]
fn test_calibrate_unconfirmed_leaves_flag_unset() {
    let mut sensor = driver(MockSerial::with_chunks([status_chunk(&["|41"])]));

    let outcome = sensor.calibrate().unwrap();

    assert_eq!(outcome, CalibrationOutcome::Unconfirmed);
    assert_eq!(sensor.transport().sent, b"9".to_vec());
    assert!(!sensor.state().is_calibrated);
}

#[test]
fn test_auto_start_locks_zeroes_and_calibrates() {
    let mut sensor = driver(MockSerial::with_chunks([
        status_chunk(&["|11", "|31"]),
        status_chunk(&["|11", "|21", "|31"]),
        status_chunk(&["~04008388608"]),
        status_chunk(&["~04008388608"]),
        status_chunk(&["|41"]),
        status_chunk(&["|41"]),
        status_chunk(&["#Calib X: 1.0, Y: 1.0, Z:1.0"]),
    ]));

    let mut updates = 0;
    let report = sensor
        .auto_start(AutoStartOptions::default(), &CancelToken::new(), |_| {
            updates += 1
        })
        .unwrap();

    assert_eq!(updates, 2);
    assert!(report.locked);
    assert_eq!(report.zero, Some(ZeroOutcome::Converged { iterations: 1 }));
    assert!(matches!(
        report.calibration,
        Some(CalibrationOutcome::Confirmed { report: Some(_), .. })
    ));
    assert_eq!(sensor.transport().sent, b">iDE9".to_vec());
    assert!(sensor.state().is_calibrated);
}

#[test]
fn test_auto_start_without_blocking() {
    let mut sensor = driver(MockSerial::with_chunks([status_chunk(&["|11"])]));
    let options = AutoStartOptions {
        block: false,
        zero_calibrate: false,
        ..Default::default()
    };

    let report = sensor.auto_start(options, &CancelToken::new(), |_| {}).unwrap();

    assert!(!report.locked);
    assert_eq!(report.zero, None);
    assert_eq!(report.calibration, None);
    assert_eq!(sensor.transport().sent, b">".to_vec());
}

#[test]
fn test_auto_start_cancelled_while_waiting_for_lock() {
    let mut sensor = driver(MockSerial::with_chunks([status_chunk(&["|11"])]));
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = sensor
        .auto_start(AutoStartOptions::default(), &cancel, |_| {})
        .unwrap();
    assert!(!report.locked);
    assert_eq!(report.zero, None);
    assert_eq!(report.calibration, None);
    assert_eq!(sensor.transport().sent, b">".to_vec());
}
