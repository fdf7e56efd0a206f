// Reading tally uploads in CSV format.

use std::collections::HashMap;

use consolidation::builder::SubmissionBuilder;
use serde::Deserialize;

use crate::app::io_common::{parse_kind, simplify_file_name};
use crate::app::*;

#[derive(Debug, Deserialize)]
struct CsvRow {
    table: u32,
    category: u32,
    agent: u32,
    kind: String,
    option: Option<u32>,
    votes: Option<u64>,
    #[serde(default)]
    timestamp: Option<u64>,
}

type GroupKey = (u32, u32, u32, SubmissionKind);

pub fn read_csv_file(path: &str) -> AppResult<Vec<SubmissionBuilder>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    debug!("read_csv_file: reading {}", simplify_file_name(path));
    read_csv_submissions(rdr)
}

/// Groups the lines by table, category, agent and kind. Each group is one submission,
/// in the order of first appearance.
pub fn read_csv_submissions<R: std::io::Read>(
    mut rdr: csv::Reader<R>,
) -> AppResult<Vec<SubmissionBuilder>> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, SubmissionBuilder> = HashMap::new();
    for (idx, row_r) in rdr.deserialize::<CsvRow>().enumerate() {
        // Line 1 is the header.
        let lineno = idx + 2;
        let row = row_r.context(CsvLineParseSnafu { lineno })?;
        let kind = parse_kind(&row.kind).context(CsvValueSnafu {
            field: "kind",
            value: row.kind.clone(),
            lineno,
        })?;
        let key: GroupKey = (row.table, row.category, row.agent, kind);
        let builder = groups.entry(key).or_insert_with(|| {
            order.push(key);
            SubmissionBuilder::new(Pair::new(row.table, row.category), AgentId(row.agent))
                .kind(kind)
                .origin(Origin::Csv)
                .timestamp(row.timestamp.unwrap_or(0))
        });
        if kind == SubmissionKind::Problem {
            continue;
        }
        let option = row.option.context(CsvValueSnafu {
            field: "option",
            value: "",
            lineno,
        })?;
        let votes = row.votes.context(CsvValueSnafu {
            field: "votes",
            value: "",
            lineno,
        })?;
        builder.add_vote(OptionId(option), votes);
    }
    let mut res: Vec<SubmissionBuilder> = Vec::new();
    for key in order {
        if let Some(b) = groups.remove(&key) {
            res.push(b);
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(content: &str) -> AppResult<Vec<SubmissionBuilder>> {
        let rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        read_csv_submissions(rdr)
    }

    #[test]
    fn lines_are_grouped_per_submission() {
        let content = "table,category,agent,kind,option,votes\n\
                       1,1,7,total,1,120\n\
                       1,2,7,total,1,3\n\
                       1,1,7,total,2,80\n\
                       1,3,7,problem,,\n";
        let builders = read(content).unwrap();
        assert_eq!(builders.len(), 3);
        let subs: Vec<Submission> = builders
            .into_iter()
            .enumerate()
            .map(|(i, b)| b.build(SubmissionId(i as u64 + 1)))
            .collect();
        assert_eq!(subs[0].pair, Pair::new(1, 1));
        assert_eq!(subs[0].votes.len(), 2);
        assert_eq!(subs[0].origin, Origin::Csv);
        assert_eq!(subs[1].pair, Pair::new(1, 2));
        assert_eq!(subs[2].kind, SubmissionKind::Problem);
        assert!(subs[2].votes.is_empty());
    }

    #[test]
    fn bad_lines_report_their_number() {
        let content = "table,category,agent,kind,option,votes\n\
                       1,1,7,total,1,120\n\
                       1,1,7,sum,2,80\n";
        match read(content) {
            Err(AppError::CsvValue { lineno, field, .. }) => {
                assert_eq!(lineno, 3);
                assert_eq!(field, "kind");
            }
            x => panic!("unexpected result {:?}", x.map(|v| v.len())),
        }
        let content = "table,category,agent,kind,option,votes\n\
                       1,1,7,total,,120\n";
        assert!(matches!(
            read(content),
            Err(AppError::CsvValue { lineno: 2, .. })
        ));
        let content = "table,category,agent,kind,option,votes\n\
                       x,1,7,total,1,120\n";
        assert!(matches!(
            read(content),
            Err(AppError::CsvLineParse { lineno: 2, .. })
        ));
    }
}
