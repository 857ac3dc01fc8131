//! Scenario runner and dispatch-log inspector for the virtual-time scheduler.

#![deny(unsafe_code)]

mod scenario;

use clap::{Parser, Subcommand};
use dispatch_log::{trace_digest, JsonlDispatchLog};
use scenario::{RunSummary, Scenario};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "vtime-sim", about = "Drive scheduling scenarios on a virtual clock")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a YAML scenario and print a JSON summary
    Run {
        #[arg(short, long)]
        scenario: PathBuf,
        /// Also write the dispatch trace as JSONL
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show high-level stats for a dispatch log
    Inspect {
        #[arg(short, long)]
        log: PathBuf,
    },
    /// Print the trace digest of a dispatch log
    Digest {
        #[arg(short, long)]
        log: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_json_logging();
    let cli = Cli::parse();
    let out = match cli.cmd {
        Command::Run { scenario, out } => cmd_run(&scenario, out.as_deref())?,
        Command::Inspect { log } => cmd_inspect(&log)?,
        Command::Digest { log } => cmd_digest(&log)?,
    };
    println!("{out}");
    Ok(())
}

fn run_scenario(path: &Path, out: Option<&Path>) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let scenario = Scenario::from_yaml_path(path)?;
    let config = scenario.scheduler.clone().with_env_overrides()?;
    let summary = scenario.run_with(config)?;
    if let Some(path) = out {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        JsonlDispatchLog::open(path)?.append_all(&summary.trace)?;
        tracing::info!(path = %path.display(), records = summary.trace.len(), "wrote dispatch log");
    }
    Ok(summary)
}

fn cmd_run(path: &Path, out: Option<&Path>) -> Result<String, Box<dyn std::error::Error>> {
    let summary = run_scenario(path, out)?;
    Ok(serde_json::to_string_pretty(&summary)?)
}

fn cmd_inspect(log: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let recs = JsonlDispatchLog::open(log)?.read_all()?;
    let first = recs.first();
    let last = recs.last();
    let late = recs.iter().filter(|r| r.clock_ms > r.due_ms).count();
    let max_lateness_ms =
        recs.iter().map(|r| r.clock_ms.saturating_sub(r.due_ms).max(0)).max().unwrap_or(0);
    let out = json!({
        "total": recs.len(),
        "first_seq": first.map_or(0, |r| r.seq),
        "last_seq": last.map_or(0, |r| r.seq),
        "first_clock_ms": first.map_or(0, |r| r.clock_ms),
        "last_clock_ms": last.map_or(0, |r| r.clock_ms),
        "late": late,
        "max_lateness_ms": max_lateness_ms,
    });
    Ok(serde_json::to_string_pretty(&out)?)
}

fn cmd_digest(log: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let recs = JsonlDispatchLog::open(log)?.read_all()?;
    Ok(trace_digest(&recs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    const SCENARIO: &str = r#"
items:
  - label: late
    deadline: { at: 0 }
  - label: b
    at: 4
  - label: p
    every: 3
    runs: 3
"#;

    fn write_scenario(dir: &Path) -> PathBuf {
        let path = dir.join("scenario.yaml");
        std::fs::write(&path, SCENARIO).unwrap();
        path
    }

    #[test]
    fn run_writes_a_log_whose_digest_matches_the_summary() {
        let dir = tempdir().unwrap();
        let scenario = write_scenario(dir.path());
        let log = dir.path().join("trace.jsonl");

        let printed = cmd_run(&scenario, Some(&log)).unwrap();
        let summary: Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(summary["labels"], json!(["late", "p", "p", "b", "p"]));
        assert_eq!(summary["final_clock_ms"], json!(6));
        assert_eq!(summary["digest"].as_str().unwrap(), cmd_digest(&log).unwrap());
    }

    #[test]
    fn rerun_overwrites_the_log() {
        let dir = tempdir().unwrap();
        let scenario = write_scenario(dir.path());
        let log = dir.path().join("trace.jsonl");
        run_scenario(&scenario, Some(&log)).unwrap();
        let first = std::fs::read_to_string(&log).unwrap();
        run_scenario(&scenario, Some(&log)).unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap(), first);
    }

    #[test]
    fn inspect_reports_bounds() {
        let dir = tempdir().unwrap();
        let scenario = write_scenario(dir.path());
        let log = dir.path().join("trace.jsonl");
        run_scenario(&scenario, Some(&log)).unwrap();

        let stats: Value = serde_json::from_str(&cmd_inspect(&log).unwrap()).unwrap();
        assert_eq!(stats["total"], json!(5));
        assert_eq!(stats["first_seq"], json!(1));
        assert_eq!(stats["last_seq"], json!(5));
        assert_eq!(stats["last_clock_ms"], json!(6));
        assert_eq!(stats["late"], json!(0));
    }

    #[test]
    fn inspect_survives_extreme_readings() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("extreme.jsonl");
        let line = format!(
            "{{\"seq\":1,\"entry\":1,\"due_ms\":{},\"clock_ms\":{}}}\n",
            i64::MIN,
            i64::MAX
        );
        std::fs::write(&log, line).unwrap();

        let stats: Value = serde_json::from_str(&cmd_inspect(&log).unwrap()).unwrap();
        assert_eq!(stats["late"], json!(1));
        assert_eq!(stats["max_lateness_ms"], json!(i64::MAX));
    }

    #[test]
    fn bundled_scenario_runs() {
        let summary = run_scenario(Path::new("scenarios/mixed.yaml"), None).unwrap();
        assert_eq!(
            summary.labels,
            vec!["overdue", "heartbeat", "heartbeat", "report", "heartbeat", "heartbeat"]
        );
        assert_eq!(summary.purged, 1);
        assert_eq!(summary.final_clock_ms, 40);
    }

    #[test]
    fn missing_scenario_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(cmd_run(&dir.path().join("nope.yaml"), None).is_err());
    }
}
