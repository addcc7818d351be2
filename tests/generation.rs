//! End-to-end properties of the synthetic generators and response curves.

use trainset_forge::generator::curves::adstock;
use trainset_forge::generator::{
    AnomalyDataGenerator, GeneratorConfig, GeneratorKind, HillCurve, SyntheticGenerator,
};
use trainset_forge::table::Value;

#[test]
fn test_same_seed_gives_identical_output_for_every_generator() {
    for kind in GeneratorKind::ALL {
        let config = GeneratorConfig::new(500)
            .with_seed(1234)
            .with_missing_rate(0.05)
            .with_outlier_rate(0.02);
        let first = kind.build(config.clone()).unwrap().generate().unwrap();
        let second = kind.build(config).unwrap().generate().unwrap();
        assert_eq!(first.to_json_lines(), second.to_json_lines(), "{kind}");
        assert_eq!(first.fingerprint(), second.fingerprint(), "{kind}");
    }
}

#[test]
fn test_different_seeds_differ() {
    let a = GeneratorKind::Churn
        .build(GeneratorConfig::new(200).with_seed(1))
        .unwrap()
        .generate()
        .unwrap();
    let b = GeneratorKind::Churn
        .build(GeneratorConfig::new(200).with_seed(2))
        .unwrap()
        .generate()
        .unwrap();
    assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn test_hill_saturation_properties() {
    for (vmax, k, n) in [(1.0, 1.0, 1.0), (1000.0, 50.0, 2.5), (3.0, 0.2, 0.5)] {
        let curve = HillCurve::new(vmax, k, n).unwrap();
        assert_eq!(curve.response(0.0), 0.0);
        assert!((curve.response(k) - vmax / 2.0).abs() < 1e-9 * vmax);
        let mut previous = 0.0;
        for step in 0..200 {
            let response = curve.response(step as f64 * k / 20.0);
            assert!(response >= previous);
            assert!(response < vmax);
            previous = response;
        }
    }
}

#[test]
fn test_adstock_recurrence() {
    let out = adstock(&[100.0, 0.0, 0.0], 0.7);
    assert_eq!(out.len(), 3);
    assert!((out[0] - 100.0).abs() < 1e-9);
    assert!((out[1] - 70.0).abs() < 1e-9);
    assert!((out[2] - 49.0).abs() < 1e-9);
}

#[test]
fn test_anomaly_rate_labels_exact_count() {
    let config = GeneratorConfig::new(10_000).with_param("anomaly_rate", 0.05);
    let mut generator = AnomalyDataGenerator::new(config).unwrap();
    let table = generator.generate().unwrap();
    assert_eq!(table.n_rows(), 10_000);

    let labels = table.column("is_anomaly").unwrap().values();
    assert_eq!(labels.iter().filter(|v| **v == Value::Int(1)).count(), 500);

    let types = table.column("anomaly_type").unwrap().to_strings();
    let scores = table.column("anomaly_score").unwrap().numeric_values();
    for ((label, kind), score) in labels.iter().zip(&types).zip(&scores) {
        if *label == Value::Int(1) {
            assert_ne!(kind.as_deref(), Some("normal"));
            assert!((0.0..=1.0).contains(score));
        } else {
            assert_eq!(kind.as_deref(), Some("normal"));
            assert_eq!(*score, 0.0);
        }
    }
}

#[test]
fn test_invalid_parameters_fail_at_construction() {
    assert!(GeneratorKind::Anomaly
        .build(GeneratorConfig::new(100).with_param("anomaly_rate", 1.5))
        .is_err());
    assert!(GeneratorKind::Budget
        .build(GeneratorConfig::new(100).with_noise_level(-0.1))
        .is_err());
    assert!(GeneratorKind::MediaMix
        .build(GeneratorConfig::new(100).with_param("base_sales", -5.0))
        .is_err());
}

#[test]
fn test_config_file_drives_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("propensity.yaml");
    std::fs::write(
        &path,
        "n_samples: 300\nseed: 5\nmissing_rate: 0.1\nparams:\n  base_rate: 0.2\n",
    )
    .unwrap();
    let config = GeneratorConfig::from_file(&path).unwrap();
    let table = GeneratorKind::Propensity.build(config).unwrap().generate().unwrap();
    assert_eq!(table.n_rows(), 300);
    assert_eq!(table.column("converted").unwrap().null_count(), 0);
    assert_eq!(table.column("income").unwrap().null_count(), 30);
}
