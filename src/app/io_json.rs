// Reading the JSON datasets of submissions and identifications.

use std::collections::BTreeMap;

use consolidation::builder::SubmissionBuilder;
use serde::{Deserialize, Serialize};

use crate::app::io_common::{parse_kind, parse_status};
use crate::app::*;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonCategory {
    pub category: u32,
    pub priority: Option<u32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonTable {
    pub table: u32,
    pub categories: Vec<JsonCategory>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonSubmission {
    pub table: u32,
    pub category: u32,
    pub agent: u32,
    pub kind: String,
    /// Option id -> votes. JSON keys are strings.
    pub votes: Option<BTreeMap<String, u64>>,
    pub timestamp: Option<u64>,
    /// "manual" (default) or "csv".
    pub origin: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonIdentification {
    pub attachment: u64,
    pub agent: u32,
    pub status: String,
    pub table: Option<u32>,
    pub timestamp: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonDiscardedProblem {
    pub agent: u32,
    pub problem: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct Dataset {
    pub tables: Option<Vec<JsonTable>>,
    pub submissions: Option<Vec<JsonSubmission>>,
    pub identifications: Option<Vec<JsonIdentification>>,
    #[serde(rename = "discardedProblems")]
    pub discarded_problems: Option<Vec<JsonDiscardedProblem>>,
}

pub fn read_json_dataset(path: &str) -> AppResult<Dataset> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let dataset: Dataset =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(dataset)
}

fn submission_builder(js: &JsonSubmission) -> AppResult<SubmissionBuilder> {
    let pair = Pair::new(js.table, js.category);
    let kind = match parse_kind(&js.kind) {
        Some(k) => k,
        None => whatever!("Unknown kind {:?} for submission at {}", js.kind, pair),
    };
    let origin = match js.origin.as_deref() {
        None | Some("manual") => Origin::Manual,
        Some("csv") => Origin::Csv,
        Some(x) => whatever!("Unknown origin {:?} for submission at {}", x, pair),
    };
    let mut votes: Vec<(u32, u64)> = Vec::new();
    for (option, count) in js.votes.clone().unwrap_or_default() {
        match option.parse::<u32>() {
            Ok(o) => votes.push((o, count)),
            Err(_) => whatever!("Option {:?} of submission at {} is not a number", option, pair),
        }
    }
    if kind != SubmissionKind::Problem && votes.is_empty() {
        warn!("Tally at {} from agent {} has no votes", pair, js.agent);
    }
    Ok(SubmissionBuilder::new(pair, AgentId(js.agent))
        .kind(kind)
        .origin(origin)
        .timestamp(js.timestamp.unwrap_or(0))
        .votes(&votes))
}

/// Loads a dataset into the store, in file order.
///
/// Returns the discarded problem reports, to be scored once the dispatcher exists.
pub fn load_dataset(
    dataset: &Dataset,
    store: &MemoryStore,
) -> AppResult<Vec<(AgentId, ProblemId)>> {
    for table in dataset.tables.iter().flatten() {
        let categories: Vec<(CategoryId, u32)> = table
            .categories
            .iter()
            .map(|c| (CategoryId(c.category), c.priority.unwrap_or(0)))
            .collect();
        store
            .register_table(TableId(table.table), &categories)
            .context(StoreSnafu {})?;
    }

    let mut num_submissions = 0;
    for js in dataset.submissions.iter().flatten() {
        let builder = submission_builder(js)?;
        store.ingest(builder).context(StoreSnafu {})?;
        num_submissions += 1;
    }

    let mut num_identifications = 0;
    for js in dataset.identifications.iter().flatten() {
        let status = match parse_status(&js.status, js.table) {
            Some(s) => s,
            None => whatever!(
                "Invalid status {:?} (table {:?}) for attachment {}",
                js.status,
                js.table,
                js.attachment
            ),
        };
        store
            .ingest_identification(
                AttachmentId(js.attachment),
                AgentId(js.agent),
                status,
                js.timestamp.unwrap_or(0),
            )
            .context(StoreSnafu {})?;
        num_identifications += 1;
    }
    info!(
        "load_dataset: {} submissions, {} identifications",
        num_submissions, num_identifications
    );

    Ok(dataset
        .discarded_problems
        .iter()
        .flatten()
        .map(|d| (AgentId(d.agent), ProblemId(d.problem)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(js: JSValue) -> Dataset {
        serde_json::from_value(js).unwrap()
    }

    #[test]
    fn loads_tables_submissions_and_identifications() {
        let store = MemoryStore::new();
        let ds = dataset(json!({
            "tables": [ { "table": 3, "categories": [ { "category": 1, "priority": 5 } ] } ],
            "submissions": [
                { "table": 3, "category": 1, "agent": 1, "kind": "total", "votes": { "1": 10, "2": 4 } },
                { "table": 3, "category": 1, "agent": 2, "kind": "total", "votes": { "2": 4, "1": 10 } }
            ],
            "identifications": [
                { "attachment": 9, "agent": 1, "status": "identified", "table": 3 },
                { "attachment": 9, "agent": 2, "status": "identified", "table": 3 }
            ],
            "discardedProblems": [ { "agent": 7, "problem": 2 } ]
        }));
        let discarded = load_dataset(&ds, &store).unwrap();
        assert_eq!(discarded, vec![(AgentId(7), ProblemId(2))]);
        assert_eq!(store.all_submissions().unwrap().len(), 2);
        assert_eq!(store.witnesses().unwrap().len(), 1);
        assert_eq!(
            store.confirmed_table(AttachmentId(9)).unwrap(),
            Some(TableId(3))
        );
    }

    #[test]
    fn empty_dataset_is_fine() {
        let store = MemoryStore::new();
        let discarded = load_dataset(&dataset(json!({})), &store).unwrap();
        assert!(discarded.is_empty());
    }

    #[test]
    fn bad_records_are_rejected() {
        let store = MemoryStore::new();
        let bad_kind = dataset(json!({
            "submissions": [ { "table": 1, "category": 1, "agent": 1, "kind": "totals" } ]
        }));
        assert!(load_dataset(&bad_kind, &store).is_err());
        let bad_option = dataset(json!({
            "submissions": [ { "table": 1, "category": 1, "agent": 1, "kind": "total", "votes": { "a": 1 } } ]
        }));
        assert!(load_dataset(&bad_option, &store).is_err());
        let missing_table = dataset(json!({
            "identifications": [ { "attachment": 1, "agent": 1, "status": "identified" } ]
        }));
        assert!(load_dataset(&missing_table, &store).is_err());
    }
}
