//! CLI command definitions for trainset-forge.
//!
//! Every command reads and writes JSON-lines tables; summaries and reports
//! are printed as pretty JSON on stdout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::connector::{MemoryConnector, ReadRequest};
use crate::generator::{GeneratorConfig, GeneratorKind};
use crate::pipeline::{DataPipeline, Pipeline, PipelineConfig};
use crate::profiler::{compare_profiles, DataProfile, DataProfiler};
use crate::table::Table;
use crate::transform::TransformPipeline;
use crate::validation::{QualityValidator, SchemaValidator, ValidationReport};

/// Name the `run` command registers its input under in the in-memory source.
const INPUT_TABLE: &str = "input";

/// Synthetic training data generation and data preparation.
#[derive(Parser)]
#[command(name = "trainset-forge")]
#[command(about = "Generate, profile and validate tabular training data")]
#[command(version)]
#[command(
    long_about = "trainset-forge generates seeded synthetic training tables and prepares tabular data for model training.\n\nTables are exchanged as JSON lines (one object per row).\n\nExample usage:\n  trainset-forge generate --kind churn -n 5000 --seed 7 -o churn.jsonl\n  trainset-forge profile churn.jsonl -o churn.profile.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a synthetic table.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Profile a table and print its statistics.
    Profile(ProfileArgs),

    /// Compare two tables or profiles for drift.
    Drift(DriftArgs),

    /// Validate a table against a schema and/or quality thresholds.
    Validate(ValidateArgs),

    /// Extract, validate and transform a table through a pipeline.
    Run(RunArgs),
}

/// Arguments for `trainset-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Generator kind (budget, anomaly, churn, propensity, lookalike, media_mix).
    #[arg(short, long)]
    pub kind: String,

    /// Generator config file (YAML or JSON). Flags below override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of rows.
    #[arg(short = 'n', long)]
    pub samples: Option<usize>,

    /// Random seed.
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Gaussian noise level in [0, 1].
    #[arg(long)]
    pub noise_level: Option<f64>,

    /// Fraction of feature cells set to null.
    #[arg(long)]
    pub missing_rate: Option<f64>,

    /// Fraction of values replaced by outliers.
    #[arg(long)]
    pub outlier_rate: Option<f64>,

    /// Generator parameter as key=value; the value is parsed as JSON when possible.
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Output JSON-lines file (stdout when omitted).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `trainset-forge profile`.
#[derive(Parser, Debug)]
pub struct ProfileArgs {
    /// Input JSON-lines file.
    pub input: PathBuf,

    /// Output file for the profile JSON (stdout when omitted).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of most frequent values kept per column.
    #[arg(long, default_value = "10")]
    pub top_n: usize,

    /// Skip pairwise correlations.
    #[arg(long)]
    pub no_correlations: bool,
}

/// Arguments for `trainset-forge drift`.
#[derive(Parser, Debug)]
pub struct DriftArgs {
    /// Reference table (.jsonl) or saved profile (.json).
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Current table (.jsonl) or saved profile (.json).
    #[arg(short, long)]
    pub current: PathBuf,

    /// Exit with an error when significant drift is found.
    #[arg(long)]
    pub fail_on_drift: bool,
}

/// Arguments for `trainset-forge validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Input JSON-lines file.
    pub input: PathBuf,

    /// Schema YAML file.
    #[arg(short, long, required_unless_present = "quality")]
    pub schema: Option<PathBuf>,

    /// Quality thresholds YAML file.
    #[arg(short, long)]
    pub quality: Option<PathBuf>,
}

/// Arguments for `trainset-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Input JSON-lines file.
    pub input: PathBuf,

    /// Pipeline config YAML (defaults when omitted).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Schema YAML used for the validate stage.
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Saved transform chain JSON applied in the transform stage.
    #[arg(short, long)]
    pub transforms: Option<PathBuf>,

    /// Output JSON-lines file for the prepared table.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// JSON summary printed by `generate` when writing to a file.
#[derive(Debug, Serialize)]
struct GenerateOutput {
    generator: String,
    seed: u64,
    rows: usize,
    columns: Vec<String>,
    fingerprint: String,
    output: String,
}

/// JSON summary printed by `validate`.
#[derive(Debug, Serialize)]
struct ValidateOutput {
    status: &'static str,
    input: String,
    rows: usize,
    schema: Option<ValidationReport>,
    quality: Option<ValidationReport>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli())
}

/// Run the CLI with the parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args),
        Commands::Profile(args) => run_profile_command(args),
        Commands::Drift(args) => run_drift_command(args),
        Commands::Validate(args) => run_validate_command(args),
        Commands::Run(args) => run_pipeline_command(args),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn read_table(path: &Path) -> anyhow::Result<Table> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Table::from_json_lines(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_text(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))
}

/// Splits `key=value`; the value is JSON when it parses, a string otherwise.
fn parse_param(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Parameter '{}' must be KEY=VALUE", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow::anyhow!("Parameter '{}' has an empty key", raw));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Loads a saved profile, or profiles a JSON-lines table.
fn load_profile(path: &Path) -> anyhow::Result<DataProfile> {
    if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        return Ok(DataProfiler::new().profile(&read_table(path)?));
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    DataProfile::from_json(&content).with_context(|| format!("Invalid profile JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let kind: GeneratorKind = args.kind.parse()?;

    let mut config = match &args.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(n) = args.samples {
        config.n_samples = n;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(level) = args.noise_level {
        config.noise_level = level;
    }
    if let Some(rate) = args.missing_rate {
        config.missing_rate = rate;
    }
    if let Some(rate) = args.outlier_rate {
        config.outlier_rate = rate;
    }
    for raw in &args.params {
        let (key, value) = parse_param(raw)?;
        config.params.insert(key, value);
    }

    let seed = config.seed;
    let mut generator = kind.build(config)?;
    let table = generator.generate()?;
    info!(
        generator = generator.name(),
        rows = table.n_rows(),
        columns = table.n_cols(),
        "Generated table"
    );

    let Some(output) = args.output else {
        println!("{}", table.to_json_lines());
        return Ok(());
    };
    write_text(&output, &table.to_json_lines())?;
    print_json(&GenerateOutput {
        generator: kind.to_string(),
        seed,
        rows: table.n_rows(),
        columns: table.column_names(),
        fingerprint: table.fingerprint(),
        output: output.display().to_string(),
    })
}

fn run_profile_command(args: ProfileArgs) -> anyhow::Result<()> {
    let table = read_table(&args.input)?;
    let profile = DataProfiler::new()
        .with_top_n(args.top_n)
        .with_correlations(!args.no_correlations)
        .profile(&table);
    for warning in &profile.warnings {
        warn!("{}", warning);
    }

    let json = profile
        .to_json()
        .map_err(|e| anyhow::anyhow!("Failed to serialize profile: {}", e))?;
    match args.output {
        Some(path) => {
            write_text(&path, &json)?;
            info!(path = %path.display(), rows = profile.n_rows, "Profile written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run_drift_command(args: DriftArgs) -> anyhow::Result<()> {
    let reference = load_profile(&args.reference)?;
    let current = load_profile(&args.current)?;
    let report = compare_profiles(&reference, &current);

    print_json(&report)?;
    if report.has_significant_drift() {
        warn!(
            mean_shifts = report.significant_mean_shifts().count(),
            "Significant drift detected"
        );
        if args.fail_on_drift {
            return Err(anyhow::anyhow!("Significant drift between reference and current data"));
        }
    }
    Ok(())
}

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let table = read_table(&args.input)?;

    let schema = match &args.schema {
        Some(path) => Some(read_yaml::<SchemaValidator>(path)?.report(&table)),
        None => None,
    };
    let quality = match &args.quality {
        Some(path) => {
            let validator: QualityValidator = read_yaml(path)?;
            Some(validator.report(&table)?)
        }
        None => None,
    };

    let valid = schema.iter().chain(quality.iter()).all(ValidationReport::is_valid);
    for message in schema
        .iter()
        .chain(quality.iter())
        .flat_map(ValidationReport::failure_messages)
    {
        warn!("{}", message);
    }

    print_json(&ValidateOutput {
        status: if valid { "valid" } else { "invalid" },
        input: args.input.display().to_string(),
        rows: table.n_rows(),
        schema,
        quality,
    })?;
    if !valid {
        return Err(anyhow::anyhow!("Validation failed with blocking errors"));
    }
    Ok(())
}

fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let table = read_table(&args.input)?;
    let config = match &args.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::new("cli"),
    };

    let connector = MemoryConnector::new().with_table(INPUT_TABLE, table);
    let mut stages = DataPipeline::new(connector, ReadRequest::table(INPUT_TABLE));
    if let Some(path) = &args.schema {
        let schema: SchemaValidator = read_yaml(path)?;
        stages = stages.with_rules(schema.to_rule_set("schema"));
    }
    if let Some(path) = &args.transforms {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        stages = stages.with_transforms(TransformPipeline::from_json("cli", &json)?);
    }

    let mut pipeline = Pipeline::new(config, stages)?;
    let result = pipeline.run();
    info!("{}", result.summary());

    if let (Some(path), Some(data)) = (&args.output, &result.data) {
        write_text(path, &data.to_json_lines())?;
    }
    print_json(&serde_json::json!({
        "pipeline_id": result.pipeline_id,
        "status": result.status,
        "rows": result.row_count(),
        "metrics": result.metrics,
        "error": result.error_message,
    }))?;
    if !result.is_success() {
        return Err(anyhow::anyhow!(
            "Pipeline {}: {}",
            result.status,
            result.error_message.unwrap_or_default()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("anomaly_rate=0.1").unwrap(),
            ("anomaly_rate".to_string(), serde_json::json!(0.1))
        );
        assert_eq!(
            parse_param("curve=hill").unwrap(),
            ("curve".to_string(), serde_json::json!("hill"))
        );
        assert_eq!(
            parse_param("channels=[\"tv\",\"search\"]").unwrap().1,
            serde_json::json!(["tv", "search"])
        );
        assert!(parse_param("no-equals").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "trainset-forge",
            "generate",
            "--kind",
            "churn",
            "-n",
            "100",
            "-p",
            "churn_rate=0.3",
        ])
        .unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.samples, Some(100));
        assert_eq!(args.params, vec!["churn_rate=0.3".to_string()]);
    }

    #[test]
    fn test_validate_requires_a_check() {
        assert!(Cli::try_parse_from(["trainset-forge", "validate", "data.jsonl"]).is_err());
    }

    #[test]
    fn test_generate_profile_and_validate_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("anomaly.jsonl");
        run_generate_command(GenerateArgs {
            kind: "anomaly".to_string(),
            config: None,
            samples: Some(200),
            seed: Some(3),
            noise_level: None,
            missing_rate: None,
            outlier_rate: None,
            params: vec![],
            output: Some(data.clone()),
        })
        .unwrap();
        assert_eq!(read_table(&data).unwrap().n_rows(), 200);

        let profile = dir.path().join("anomaly.profile.json");
        run_profile_command(ProfileArgs {
            input: data.clone(),
            output: Some(profile.clone()),
            top_n: 5,
            no_correlations: false,
        })
        .unwrap();
        assert_eq!(load_profile(&profile).unwrap().n_rows, 200);

        let schema = dir.path().join("schema.yaml");
        fs::write(
            &schema,
            "columns:\n  - name: value\n    type: numeric\n  - name: is_anomaly\n    type: integer\n    nullable: false\n",
        )
        .unwrap();
        run_validate_command(ValidateArgs {
            input: data.clone(),
            schema: Some(schema.clone()),
            quality: None,
        })
        .unwrap();

        let bad_schema = dir.path().join("bad.yaml");
        fs::write(&bad_schema, "columns:\n  - name: budget\n").unwrap();
        assert!(run_validate_command(ValidateArgs {
            input: data,
            schema: Some(bad_schema),
            quality: None,
        })
        .is_err());
    }
}
