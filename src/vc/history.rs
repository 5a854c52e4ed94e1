//! Page history reconstruction across renames and deletions.
//!
//! The repository log of a path stops where the node at that path was born.
//! When it was born as a copy (the new half of a rename), the lineage
//! continues at the copy source, bounded by the revision it was copied from,
//! so nothing that later happened at the source path leaks in.

use crate::storage::{LogEntry, LogQuery, RepositoryOperations, Revision};
use crate::vc::error::PageStoreResult;
use crate::vc::tracker::DeletedRevisionTracker;
use crate::vc::types::{ChangeInfo, ChangeType};

/// the full lineage of `path`, newest first
///
/// A deleted path starts with its deletion and is read from just below it.
/// The tracker is only asked about the starting path: a copy source is
/// pinned to the revision it was copied at.
pub(crate) fn history(
    ops: &dyn RepositoryOperations,
    tracker: &dyn DeletedRevisionTracker,
    path: &str,
) -> PageStoreResult<Vec<ChangeInfo>> {
    let mut result = Vec::new();

    let upper = match tracker.change_that_deleted(path)? {
        Some(deletion) => {
            let below = deletion.revision.prev();
            result.push(deletion);
            match below {
                Some(below) => below,
                None => return Ok(result),
            }
        }
        None => ops.latest_revision()?,
    };

    let mut path = path.to_string();
    let mut upper = upper;
    loop {
        let entries = ops.log(&LogQuery::path(path.as_str()).to(upper))?;
        let source = copy_source_of_oldest(&entries, &path);
        tracing::debug!(path = %path, to = %upper, entries = entries.len(), "history segment");
        result.extend(entries.into_iter().map(ChangeInfo::from));

        match source {
            Some((source_path, source_revision)) => {
                path = source_path;
                upper = source_revision;
            }
            None => break,
        }
    }

    Ok(result)
}

/// where the oldest change to `path` copied it from, if it was a copy
fn copy_source_of_oldest(entries: &[LogEntry], path: &str) -> Option<(String, Revision)> {
    let oldest = entries.iter().rev().find(|entry| entry.path == path)?;
    match ChangeType::from(oldest.action.clone()) {
        ChangeType::Added {
            copied_from: Some(source),
        } => Some((source.path, source.revision)),
        ChangeType::Added { copied_from: None } | ChangeType::Modified | ChangeType::Deleted => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CopySource, LogFilter, PathAction};
    use crate::vc::testing::{log_entry, FixedTracker, ScriptedRepository};
    use crate::vc::types::StoreKind;

    fn revisions(history: &[ChangeInfo]) -> Vec<(String, u64)> {
        history
            .iter()
            .map(|change| (change.path.clone(), change.revision.get()))
            .collect()
    }

    #[test]
    fn test_history_to_head_without_deletion() {
        let repo = ScriptedRepository::new(Revision::new(4)).with_log(
            "ThePage",
            Revision::new(4),
            vec![
                log_entry("ThePage", 4, PathAction::Modified),
                log_entry("ThePage", 1, PathAction::Added { copied_from: None }),
            ],
        );
        let tracker = FixedTracker::default();

        let history = history(&repo, &tracker, "ThePage").unwrap();
        assert_eq!(revisions(&history), vec![("ThePage".into(), 4), ("ThePage".into(), 1)]);

        let queries = repo.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].to, Some(Revision::new(4)));
        assert_eq!(queries[0].filter, LogFilter::PathOnly);
        assert!(queries[0].stop_on_copy);
        assert_eq!(queries[0].from, Revision::ZERO);
    }

    #[test]
    fn test_history_bounded_by_deletion() {
        let repo = ScriptedRepository::new(Revision::new(9)).with_log(
            "ThePage",
            Revision::new(6),
            vec![log_entry("ThePage", 2, PathAction::Added { copied_from: None })],
        );
        let tracker = FixedTracker::default();
        tracker_record(&tracker, log_entry("ThePage", 7, PathAction::Deleted));

        let history = history(&repo, &tracker, "ThePage").unwrap();
        assert_eq!(revisions(&history), vec![("ThePage".into(), 7), ("ThePage".into(), 2)]);
        assert!(history[0].is_deletion());
        assert_eq!(repo.queries()[0].to, Some(Revision::new(6)));
    }

    #[test]
    fn test_history_steps_back_over_copies() {
        // A created at 1, renamed to B at 2, B edited at 3
        let repo = ScriptedRepository::new(Revision::new(3))
            .with_log(
                "B",
                Revision::new(3),
                vec![
                    log_entry("B", 3, PathAction::Modified),
                    log_entry(
                        "B",
                        2,
                        PathAction::Added {
                            copied_from: Some(CopySource::new("A", Revision::new(1))),
                        },
                    ),
                    log_entry("A", 2, PathAction::Deleted),
                ],
            )
            .with_log(
                "A",
                Revision::new(1),
                vec![log_entry("A", 1, PathAction::Added { copied_from: None })],
            );
        let tracker = FixedTracker::default();
        // the deletion of A must not be consulted when following the copy
        tracker_record(&tracker, log_entry("A", 2, PathAction::Deleted));

        let history = history(&repo, &tracker, "B").unwrap();
        assert_eq!(
            revisions(&history),
            vec![("B".into(), 3), ("B".into(), 2), ("A".into(), 2), ("A".into(), 1)]
        );
        assert!(history.iter().all(|change| change.kind == StoreKind::Page));
    }

    #[test]
    fn test_no_log_means_empty_history() {
        let repo = ScriptedRepository::new(Revision::new(3));
        let tracker = FixedTracker::default();
        assert!(history(&repo, &tracker, "Nothing").unwrap().is_empty());
    }

    fn tracker_record(tracker: &FixedTracker, entry: LogEntry) {
        tracker.record_deletion(ChangeInfo::from(entry));
    }
}
