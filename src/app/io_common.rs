use std::path::Path;

use consolidation::{IdentificationStatus, SubmissionKind, TableId, TallyKind};

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

pub fn parse_kind(s: &str) -> Option<SubmissionKind> {
    match s.trim().to_lowercase().as_str() {
        "total" => Some(SubmissionKind::Tally(TallyKind::Total)),
        "partial" => Some(SubmissionKind::Tally(TallyKind::Partial)),
        "problem" => Some(SubmissionKind::Problem),
        _ => None,
    }
}

/// An `identified` status needs the table.
pub fn parse_status(s: &str, table: Option<u32>) -> Option<IdentificationStatus> {
    match (s.trim().to_lowercase().as_str(), table) {
        ("identified", Some(t)) => Some(IdentificationStatus::Identified(TableId(t))),
        ("pending", _) => Some(IdentificationStatus::Pending),
        ("problem", _) => Some(IdentificationStatus::Problem),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_statuses() {
        assert_eq!(simplify_file_name("/tmp/data/upload.csv"), "upload.csv");
        assert_eq!(parse_kind(" Total"), Some(SubmissionKind::Tally(TallyKind::Total)));
        assert_eq!(parse_kind("problem"), Some(SubmissionKind::Problem));
        assert_eq!(parse_kind("totals"), None);
        assert_eq!(
            parse_status("identified", Some(4)),
            Some(IdentificationStatus::Identified(TableId(4)))
        );
        assert_eq!(parse_status("identified", None), None);
        assert_eq!(parse_status("pending", Some(4)), Some(IdentificationStatus::Pending));
    }
}
