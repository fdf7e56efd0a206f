use crate::app::*;

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSettings {
    #[serde(rename = "identificationMismatch")]
    pub identification_mismatch: Option<u64>,
    #[serde(rename = "correctActionDiscount")]
    pub correct_action_discount: Option<u64>,
    #[serde(rename = "problemOnConfirmed")]
    pub problem_on_confirmed: Option<u64>,
    #[serde(rename = "discardedProblem")]
    pub discarded_problem: Option<u64>,
    /// A number, or "none" to disable the automatic flagging.
    #[serde(rename = "untrustworthyThreshold")]
    pub untrustworthy_threshold: Option<JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(rename = "batchSize")]
    pub batch_size: Option<u64>,
    #[serde(rename = "roundsBeforeRebuild")]
    pub rounds_before_rebuild: Option<u32>,
    #[serde(rename = "pauseSeconds")]
    pub pause_seconds: Option<u64>,
    #[serde(rename = "runConsolidation")]
    pub run_consolidation: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatorConfig {
    pub scoring: Option<ScoringSettings>,
    pub scheduler: Option<SchedulerSettings>,
    #[serde(rename = "minCoincidences")]
    pub min_coincidences: Option<usize>,
    #[serde(rename = "trustedAgents")]
    pub trusted_agents: Option<Vec<u32>>,
    #[serde(rename = "dataSources", default)]
    pub data_sources: Vec<DataSource>,
}

pub fn read_config(path: &str) -> AppResult<ConsolidatorConfig> {
    let config_str = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: ConsolidatorConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })?;
    if config.min_coincidences == Some(0) {
        whatever!("minCoincidences must be at least 1");
    }
    Ok(config)
}

pub fn read_summary(path: &str) -> AppResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn read_threshold(x: &Option<JSValue>) -> AppResult<Option<i64>> {
    match x {
        None => Ok(ScoringConfig::DEFAULT_SCORING.untrustworthy_threshold),
        Some(JSValue::Null) => Ok(None),
        Some(JSValue::String(s)) if s == "none" => Ok(None),
        Some(JSValue::Number(n)) => match n.as_i64() {
            Some(t) if t > 0 => Ok(Some(t)),
            _ => whatever!("untrustworthyThreshold must be a positive integer, got {}", n),
        },
        Some(JSValue::String(s)) => match s.parse::<i64>() {
            Ok(t) if t > 0 => Ok(Some(t)),
            _ => whatever!("Failed to understand untrustworthyThreshold {:?}", s),
        },
        Some(x) => whatever!("Failed to understand untrustworthyThreshold {:?}", x),
    }
}

pub fn validate_scoring(settings: &Option<ScoringSettings>) -> AppResult<ScoringConfig> {
    let defaults = ScoringConfig::DEFAULT_SCORING;
    let res = match settings {
        None => defaults,
        Some(s) => ScoringConfig {
            identification_mismatch: s
                .identification_mismatch
                .unwrap_or(defaults.identification_mismatch),
            correct_action_discount: s
                .correct_action_discount
                .unwrap_or(defaults.correct_action_discount),
            problem_on_confirmed: s
                .problem_on_confirmed
                .unwrap_or(defaults.problem_on_confirmed),
            discarded_problem: s.discarded_problem.unwrap_or(defaults.discarded_problem),
            untrustworthy_threshold: read_threshold(&s.untrustworthy_threshold)?,
        },
    };
    debug!("validate_scoring: {:?}", res);
    Ok(res)
}

pub fn validate_scheduler(settings: &Option<SchedulerSettings>) -> AppResult<SchedulerConfig> {
    let defaults = SchedulerConfig::DEFAULT_SCHEDULER;
    let res = match settings {
        None => defaults,
        Some(s) => SchedulerConfig {
            batch_size: s
                .batch_size
                .map(|b| b as usize)
                .unwrap_or(defaults.batch_size),
            rounds_before_rebuild: s
                .rounds_before_rebuild
                .unwrap_or(defaults.rounds_before_rebuild),
            pause: s
                .pause_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.pause),
            run_consolidation: s.run_consolidation.unwrap_or(defaults.run_consolidation),
        },
    };
    if let Err(e) = res.validate() {
        whatever!("Invalid scheduler settings: {}", e);
    }
    Ok(res)
}
