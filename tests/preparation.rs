//! End-to-end properties of transforms, validation, profiling and pipelines.

use trainset_forge::connector::{MemoryConnector, ReadRequest};
use trainset_forge::pipeline::{DataPipeline, Pipeline, PipelineConfig, PipelineStatus};
use trainset_forge::profiler::{compare_profiles, DataProfiler};
use trainset_forge::table::{Column, Table};
use trainset_forge::transform::{
    Imputer, ImputeStrategy, MinMaxScaler, StandardScaler, Transform, TransformPipeline,
};
use trainset_forge::validation::{RuleSet, Severity};

fn spend_table() -> Table {
    Table::new(vec![
        Column::from_f64("spend", vec![120.0, 80.5, 3000.25, 45.0, 999.9, 0.001]),
        Column::from_f64("clicks", vec![5.0, 5.0, 5.0, 5.0, 5.0, 5.0]),
        Column::from_strs("channel", &["tv", "search", "tv", "social", "search", "tv"]),
    ])
    .unwrap()
}

#[test]
fn test_standard_scaler_round_trip() {
    let table = spend_table();
    let mut scaler = StandardScaler::new("scale").with_columns(vec!["spend".to_string()]);
    let scaled = scaler.fit_transform(&table).unwrap();
    let restored = scaler.inverse_transform(&scaled).unwrap();

    let original = table.column("spend").unwrap().numeric_values();
    let back = restored.column("spend").unwrap().numeric_values();
    for (a, b) in original.iter().zip(&back) {
        assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
    }
}

#[test]
fn test_min_max_bounds() {
    let mut scaler = MinMaxScaler::new("minmax");
    let out = scaler.fit_transform(&spend_table()).unwrap();

    let spend = out.column("spend").unwrap().numeric_values();
    let min = spend.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = spend.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(min, 0.0);
    assert_eq!(max, 1.0);

    let clicks = out.column("clicks").unwrap().numeric_values();
    assert!(clicks.iter().all(|v| *v == 0.0));
}

#[test]
fn test_transform_before_fit_is_a_contract_violation() {
    let scaler = StandardScaler::new("scale");
    let err = scaler.transform(&spend_table()).unwrap_err();
    assert!(err.to_string().contains("not been fitted"));
}

#[test]
fn test_saved_chain_replays_identically() {
    let table = Table::new(vec![
        Column::float("spend", vec![Some(10.0), None, Some(30.0), Some(50.0)]),
    ])
    .unwrap();
    let mut chain = TransformPipeline::new("prep")
        .add(Imputer::new("fill", ImputeStrategy::Median))
        .add(StandardScaler::new("scale"));
    let fitted = chain.fit_transform(&table).unwrap();

    let mut restored = TransformPipeline::from_json("prep", &chain.to_json().unwrap()).unwrap();
    assert_eq!(restored.transform(&table).unwrap(), fitted);
    assert!(restored.history().iter().all(|step| step.success));
}

#[test]
fn test_warning_failures_do_not_block() {
    let table = spend_table();
    let rules = RuleSet::new("campaign")
        .add_required("spend", Severity::Error)
        .add_range("spend", Some(0.0), None, Severity::Error)
        .unwrap()
        .add_range("spend", None, Some(1000.0), Severity::Warning)
        .unwrap();
    assert!(rules.is_valid(&table));
    assert!(rules.validate(&table).iter().any(|r| !r.is_valid));

    let rules = rules.add_unique("channel", false, Severity::Error);
    assert!(!rules.is_valid(&table));
}

#[test]
fn test_missing_required_budget_column() {
    let rules = RuleSet::new("budget").add_required("budget", Severity::Error);
    let results = rules.validate(&spend_table());
    assert_eq!(results.len(), 1);
    assert!(!results[0].is_valid);
    assert_eq!(results[0].severity, Severity::Error);
    assert_eq!(results[0].column.as_deref(), Some("budget"));
}

#[test]
fn test_mean_shift_of_three_sigma_is_significant() {
    let half_spread = 50f64.sqrt();
    let reference = Table::new(vec![Column::from_f64(
        "budget",
        vec![100.0 - half_spread, 100.0 + half_spread],
    )])
    .unwrap();
    let current = Table::new(vec![Column::from_f64(
        "budget",
        vec![130.0 - half_spread, 130.0 + half_spread],
    )])
    .unwrap();

    let profiler = DataProfiler::new();
    let report = compare_profiles(&profiler.profile(&reference), &profiler.profile(&current));
    let shift = &report.mean_shifts[0];
    assert_eq!(shift.column, "budget");
    assert!((shift.z_score - 3.0).abs() < 1e-9);
    assert!(shift.significant);
    assert!(report.has_significant_drift());
}

#[test]
fn test_failed_extract_produces_terminal_result() {
    let connector = MemoryConnector::new().refusing_connections();
    let stages = DataPipeline::new(connector, ReadRequest::table("campaigns"));
    let config = PipelineConfig::new("campaigns").with_retry_count(1);
    let mut pipeline = Pipeline::new(config, stages).unwrap();

    let result = pipeline.run();
    assert_eq!(result.status, PipelineStatus::Failed);
    assert!(result.data.is_none());
    assert!(result.error_message.as_deref().is_some_and(|m| !m.is_empty()));
    assert!(result.completed_at.is_some());
    assert_eq!(result.metrics.extract_attempts, 2);
}

#[test]
fn test_pipeline_validates_and_transforms() {
    let connector = MemoryConnector::new().with_table("campaigns", spend_table());
    let stages = DataPipeline::new(connector, ReadRequest::table("campaigns"))
        .with_rules(RuleSet::new("campaign").add_required("spend", Severity::Error))
        .with_transforms(TransformPipeline::new("prep").add(MinMaxScaler::new("minmax")));
    let mut pipeline = Pipeline::new(PipelineConfig::new("campaigns"), stages).unwrap();

    let result = pipeline.run();
    assert_eq!(result.status, PipelineStatus::Completed);
    assert_eq!(result.row_count(), 6);
    assert_eq!(result.metrics.rows_transformed, 6);
    let spend = result.data.unwrap().column("spend").unwrap().numeric_values();
    assert!(spend.iter().all(|v| (0.0..=1.0).contains(v)));
}
