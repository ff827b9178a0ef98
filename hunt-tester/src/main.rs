mod harness;
mod reports;
mod scenario;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use harness::{HarnessFactory, StoreBackend};
use scenario::{ScenarioResult, ScenarioRunner, get_scenario, list_scenarios};
use util::{load_config, split_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Console,
    Json,
    Markdown,
}

#[derive(Debug, Parser)]
#[command(name = "hunt-tester", version = "0.1.0")]
#[command(about = "Automated drills for the QR scavenger hunt engine")]
struct Args {
    /// Scenarios to run (comma-separated, or `all`)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Number of iterations per scenario
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Override the number of levels in the hunt
    #[arg(long)]
    levels: Option<u32>,

    /// Hunt configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Participant store backing the drills
    #[arg(long, value_enum, default_value_t = StoreBackend::Memory)]
    store: StoreBackend,

    /// Root directory for the file store
    #[arg(long, default_value = "target/hunt-data")]
    data_dir: PathBuf,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let config = load_config(args.config.as_deref(), args.levels)?;
    log::info!(
        "running drills against a {}-level hunt on the {:?} store",
        config.total_levels,
        args.store
    );
    let factory = HarnessFactory::load(config, args.store, args.data_dir.clone()).await?;
    let scenarios = expand_scenarios(&args.scenarios);

    let results = run_scenarios(&args, &scenarios, &factory).await;

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🔎 Hunt Engine Drill Runner".bright_cyan().bold());
    println!("{}", "============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for (key, _) in list_scenarios() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

async fn run_scenarios(
    args: &Args,
    scenarios: &[String],
    factory: &HarnessFactory,
) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Drills".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let runner = ScenarioRunner::new(factory, args.verbose);
    let mut results = Vec::new();
    for scenario_name in scenarios {
        let Some(drill) = get_scenario(scenario_name) else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
            continue;
        };
        results.push(
            runner
                .run(scenario_name, drill.as_ref(), args.iterations)
                .await,
        );
    }
    results
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report {
        ReportFormat::Json => {
            reports::generate_json_report(output_target.writer(), results)?;
        }
        ReportFormat::Markdown => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Hunt Drill Results\n\n_No scenarios executed._"
                )?;
            } else {
                reports::generate_markdown_report(output_target.writer(), results)?;
            }
        }
        ReportFormat::Console => {
            if results.is_empty() {
                writeln!(&mut output_target, "No drills executed.")?;
            } else {
                reports::generate_console_report(
                    output_target.writer(),
                    results,
                    start_time.elapsed(),
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(
                &mut output_target,
                "🏁 Total time: {:?}",
                start_time.elapsed()
            )?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hunt_engine::{HintCatalog, HuntConfig};
    use std::time::Duration;

    fn base_args() -> Args {
        Args {
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            iterations: 1,
            levels: None,
            config: None,
            store: StoreBackend::Memory,
            data_dir: std::env::temp_dir(),
            report: ReportFormat::Console,
            output: None,
            verbose: false,
        }
    }

    fn temp_output(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hunt-tester-{label}-{}", util::unique_suffix()))
    }

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Smoke Test".into(),
            passed,
            iterations_run: 1,
            successful_iterations: usize::from(passed),
            failures: if passed {
                Vec::new()
            } else {
                vec!["iteration 0: boom".into()]
            },
            average_duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("scan-stream,all");
        assert_eq!(expanded[0], "scan-stream");
        assert_eq!(expanded.len(), list_scenarios().len());
        assert!(expanded.contains(&"concurrent-race".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        assert_eq!(
            expand_scenarios("unregistered, smoke"),
            vec!["unregistered", "smoke"]
        );
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let path = temp_output("list");
        let mut args = base_args();
        args.list_scenarios = true;
        args.output = Some(path.clone());
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("completion-timing"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn write_reports_emits_json_for_results() {
        let path = temp_output("json");
        let mut args = base_args();
        args.report = ReportFormat::Json;
        args.output = Some(path.clone());
        write_reports(&args, &[sample_result(false)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed[0]["passed"], false);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let path = temp_output("md");
        let mut args = base_args();
        args.report = ReportFormat::Markdown;
        args.output = Some(path.clone());
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("_No scenarios executed._"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unknown_scenarios_are_skipped() {
        let factory = HarnessFactory::new(
            HuntConfig::with_levels(2),
            HintCatalog::empty(),
            StoreBackend::Memory,
            std::env::temp_dir(),
        );
        let args = base_args();
        let results = tokio_test::block_on(run_scenarios(
            &args,
            &["bogus".to_string(), "double-begin".to_string()],
            &factory,
        ));
        assert_eq!(results.len(), 1);
        assert!(results[0].passed, "{:?}", results[0].failures);
    }
}
