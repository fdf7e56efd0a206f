use log::{debug, error, info, warn};

use consolidation::effects::TrustDispatcher;
use consolidation::scheduler::Scheduler;
use consolidation::store::{MemoryStore, SubmissionStore};
use consolidation::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::app::config_reader::*;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_json;

#[derive(Debug, Snafu)]
pub enum AppError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Invalid {field} {value:?} at line {lineno}"))]
    CsvValue {
        field: String,
        value: String,
        lineno: usize,
    },
    #[snafu(display("Error in the submission store"))]
    Store { source: ConsolidationError },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type AppResult<T> = Result<T, AppError>;

fn kind_label(kind: TallyKind) -> &'static str {
    match kind {
        TallyKind::Total => "total",
        TallyKind::Partial => "partial",
    }
}

fn build_summary_js<R: consolidation::scheduler::ErrorReporter>(
    scheduler: &Scheduler<Arc<MemoryStore>, R>,
) -> AppResult<JSValue> {
    let dispatcher = scheduler.dispatcher();
    let store = dispatcher.store();

    let mut witnesses: Vec<JSValue> = Vec::new();
    for (pair, kind, sid) in store.witnesses().context(StoreSnafu {})? {
        let agent = store
            .submission(sid)
            .context(StoreSnafu {})?
            .map(|s| s.agent.0);
        witnesses.push(json!({
            "table": pair.table.0,
            "category": pair.category.0,
            "kind": kind_label(kind),
            "submission": sid.0,
            "agent": agent,
        }));
    }

    let mut scores: Vec<JSValue> = Vec::new();
    for (agent, score) in dispatcher.ledger().scores() {
        let flagged = store.is_flagged(agent).context(StoreSnafu {})?;
        scores.push(json!({
            "agent": agent.0,
            "score": score,
            "events": dispatcher.ledger().events_for(agent).count(),
            "flagged": flagged,
        }));
    }

    let invalidated_submissions = store
        .all_submissions()
        .context(StoreSnafu {})?
        .iter()
        .filter(|s| s.invalidated)
        .count();
    let invalidated_identifications = store
        .all_identifications()
        .context(StoreSnafu {})?
        .iter()
        .filter(|i| i.invalidated)
        .count();

    let queue: Vec<JSValue> = scheduler
        .queue()
        .items()
        .iter()
        .map(|item| {
            json!({
                "table": item.pair.table.0,
                "category": item.pair.category.0,
                "priority": item.priority,
            })
        })
        .collect();

    Ok(json!({
        "cycles": scheduler.cycles(),
        "failedCycles": scheduler.failures(),
        "witnesses": witnesses,
        "scores": scores,
        "invalidated": {
            "submissions": invalidated_submissions,
            "identifications": invalidated_identifications,
        },
        "queue": queue,
    }))
}

fn load_data_source(
    root_path: &Path,
    source: &DataSource,
    store: &MemoryStore,
) -> AppResult<Vec<(AgentId, ProblemId)>> {
    let p: PathBuf = root_path.join(&source.file_path);
    let p2 = p.as_path().display().to_string();
    info!(
        "Attempting to read {} data source {:?}",
        source.provider,
        io_common::simplify_file_name(&p2)
    );
    match source.provider.as_str() {
        "json" => {
            let dataset = io_json::read_json_dataset(&p2)?;
            io_json::load_dataset(&dataset, store)
        }
        "csv" => {
            let builders = io_csv::read_csv_file(&p2)?;
            info!("Importing {} CSV submissions", builders.len());
            for b in builders {
                store.ingest(b).context(StoreSnafu {})?;
            }
            Ok(Vec::new())
        }
        x => {
            whatever!("Provider not implemented {:?}", x)
        }
    }
}

fn write_summary(out: &str, pretty: &str) -> AppResult<()> {
    if out == "stdout" || out.is_empty() {
        println!("{}", pretty);
        return Ok(());
    }
    fs::write(out, pretty).context(WritingFileSnafu {
        path: out.to_string(),
    })
}

/// Loads the data sources, runs the scheduler and checks the resulting summary.
///
/// Without `cycles`, the scheduler runs until the process is stopped.
pub fn run_consolidation(
    config_path: &str,
    cycles: Option<u64>,
    out: Option<String>,
    check_summary_path: Option<String>,
) -> AppResult<()> {
    let config = read_config(config_path)?;
    info!("config: {:?}", config);

    let scoring = validate_scoring(&config.scoring)?;
    let scheduler_config = validate_scheduler(&config.scheduler)?;

    if config.data_sources.is_empty() {
        warn!("No data sources in {}", config_path);
    }

    let store = Arc::new(MemoryStore::with_min_coincidences(
        config
            .min_coincidences
            .unwrap_or(MemoryStore::DEFAULT_MIN_COINCIDENCES),
    ));
    for agent in config.trusted_agents.clone().unwrap_or_default() {
        store.trust_agent(AgentId(agent)).context(StoreSnafu {})?;
    }

    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;
    let mut discarded: Vec<(AgentId, ProblemId)> = Vec::new();
    for source in config.data_sources.iter() {
        let mut d = load_data_source(root_p, source, &store)?;
        discarded.append(&mut d);
    }

    let mut dispatcher = TrustDispatcher::new(store, scoring);
    for (agent, problem) in discarded {
        debug!("Discarded problem {:?} of agent {:?}", problem, agent);
        dispatcher
            .on_problem_discarded(agent, problem)
            .context(StoreSnafu {})?;
    }

    let reporter = |description: &str| {
        error!("Reported to error tracking: {}", description);
    };
    let pause = scheduler_config.pause;
    let mut scheduler =
        Scheduler::new(dispatcher, scheduler_config, reporter).context(StoreSnafu {})?;

    match cycles {
        Some(n) => {
            for idx in 0..n {
                // Failures are logged and reported by the scheduler.
                if let Ok(report) = scheduler.run_cycle() {
                    info!("Cycle {}: {:?}", idx + 1, report);
                }
                if idx + 1 < n {
                    std::thread::sleep(pause);
                }
            }
        }
        None => {
            // The sender is kept alive: the loop only stops with the process.
            let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
            scheduler.run(&shutdown_rx);
        }
    }

    let result_js = build_summary_js(&scheduler)?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(WritingJsonSnafu {})?;
    if let Some(out_path) = out {
        write_summary(&out_path, &pretty_js_stats)?;
    } else {
        println!("summary:{}", pretty_js_stats);
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("consolidator-{}-{}", name, nanos));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_fixture(dir: &Path) -> String {
        let config = json!({
            "scoring": { "untrustworthyThreshold": 100 },
            "scheduler": { "batchSize": 10, "roundsBeforeRebuild": 2, "pauseSeconds": 0 },
            "trustedAgents": [50],
            "dataSources": [
                { "provider": "json", "filePath": "dataset.json" },
                { "provider": "csv", "filePath": "upload.csv" }
            ]
        });
        let dataset = json!({
            "tables": [
                { "table": 1, "categories": [ { "category": 1, "priority": 1 }, { "category": 2, "priority": 2 } ] },
                { "table": 2, "categories": [ { "category": 1 } ] }
            ],
            "submissions": [
                { "table": 1, "category": 1, "agent": 1, "kind": "total", "votes": { "1": 100, "2": 50 }, "timestamp": 1 },
                { "table": 1, "category": 1, "agent": 2, "kind": "total", "votes": { "1": 100, "2": 50 }, "timestamp": 2 },
                { "table": 1, "category": 1, "agent": 3, "kind": "total", "votes": { "1": 100, "2": 55 }, "timestamp": 3 },
                { "table": 1, "category": 1, "agent": 4, "kind": "total", "votes": { "1": 0, "2": 500 }, "timestamp": 4 },
                { "table": 1, "category": 2, "agent": 4, "kind": "problem", "timestamp": 5 }
            ],
            "identifications": [
                { "attachment": 1, "agent": 1, "status": "identified", "table": 1 },
                { "attachment": 1, "agent": 2, "status": "identified", "table": 1 },
                { "attachment": 2, "agent": 2, "status": "identified", "table": 2 },
                { "attachment": 2, "agent": 3, "status": "identified", "table": 2 }
            ],
            "discardedProblems": []
        });
        let csv = "table,category,agent,kind,option,votes\n\
                   2,1,50,total,1,10\n\
                   2,1,50,total,2,20\n";
        fs::write(dir.join("config.json"), config.to_string()).unwrap();
        fs::write(dir.join("dataset.json"), dataset.to_string()).unwrap();
        fs::write(dir.join("upload.csv"), csv).unwrap();
        dir.join("config.json").display().to_string()
    }

    #[test]
    fn end_to_end_run() {
        let dir = test_dir("e2e");
        let config = write_fixture(&dir);
        let out = dir.join("summary.json").display().to_string();
        run_consolidation(&config, Some(2), Some(out.clone()), None).unwrap();

        let summary: JSValue = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(summary["cycles"], json!(2));
        assert_eq!(summary["failedCycles"], json!(0));
        assert_eq!(summary["witnesses"].as_array().unwrap().len(), 2);

        let scores = summary["scores"].as_array().unwrap();
        let score_of = |agent: u32| {
            scores
                .iter()
                .find(|s| s["agent"] == json!(agent))
                .map(|s| (s["score"].clone(), s["flagged"].clone()))
        };
        // Agent 2 agrees on the tally and on both attachments.
        assert_eq!(score_of(2), Some((json!(-30), json!(false))));
        assert_eq!(score_of(3), Some((json!(-5), json!(false))));
        // Agent 4 is off by 550: flagged, its two submissions invalidated.
        assert_eq!(score_of(4), Some((json!(550), json!(true))));
        assert_eq!(summary["invalidated"]["submissions"], json!(2));

        // Only table 1 / category 2 still waits for a total.
        assert_eq!(
            summary["queue"],
            json!([{ "table": 1, "category": 2, "priority": 2 }])
        );
    }

    #[test]
    fn reference_summary_is_checked() {
        let dir = test_dir("reference");
        let config = write_fixture(&dir);
        let out = dir.join("summary.json").display().to_string();
        run_consolidation(&config, Some(1), Some(out.clone()), None).unwrap();
        assert!(run_consolidation(&config, Some(1), Some("stdout".to_string()), Some(out.clone())).is_ok());

        let mut altered: JSValue = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        altered["cycles"] = json!(7);
        let altered_p = dir.join("altered.json").display().to_string();
        fs::write(&altered_p, altered.to_string()).unwrap();
        assert!(run_consolidation(&config, Some(1), Some("stdout".to_string()), Some(altered_p)).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let dir = test_dir("provider");
        let config = json!({ "dataSources": [ { "provider": "xlsx", "filePath": "a.xlsx" } ] });
        let p = dir.join("config.json");
        fs::write(&p, config.to_string()).unwrap();
        let res = run_consolidation(&p.display().to_string(), Some(1), None, None);
        assert!(matches!(res, Err(AppError::Whatever { .. })));
    }
}
