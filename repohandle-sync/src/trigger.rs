//! Push-event change detection over the tracked manifest files.

use std::collections::HashSet;

use repohandle_core::{PushEvent, TrackedFile};

/// Indices of the tracked files a push touched, and whether any matched.
///
/// A file matches when the event comes from the file's `owner/repo`, the
/// event ref contains the file's ref (or `default_ref` when unset), and one
/// of the pushed commits added or modified the file's path.
pub fn select_changed_files(
    event: &PushEvent,
    files: &[TrackedFile],
    default_ref: &str,
) -> (Vec<usize>, bool) {
    let changed: HashSet<&str> = event
        .commits
        .iter()
        .flat_map(|c| c.added.iter().chain(c.modified.iter()))
        .map(String::as_str)
        .collect();
    if changed.is_empty() {
        return (Vec::new(), false);
    }

    let Some(event_ref) = event.git_ref.as_deref() else {
        return (Vec::new(), false);
    };

    let indices: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            f.owner == event.repository.namespace
                && f.repo == event.repository.name
                && event_ref.contains(f.effective_ref(default_ref))
                && changed.contains(f.path.as_str())
        })
        .map(|(idx, _)| idx)
        .collect();

    let found = !indices.is_empty();
    (indices, found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repohandle_core::{PushCommit, PushRepository};
    use rstest::rstest;

    fn event(git_ref: Option<&str>, commits: Vec<PushCommit>) -> PushEvent {
        PushEvent {
            git_ref: git_ref.map(str::to_string),
            repository: PushRepository {
                namespace: "openeuler".to_string(),
                name: "community".to_string(),
            },
            commits,
        }
    }

    fn commit(added: &[&str], modified: &[&str]) -> PushCommit {
        PushCommit {
            added: added.iter().map(|s| s.to_string()).collect(),
            modified: modified.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn tracked() -> Vec<TrackedFile> {
        vec![
            TrackedFile::new("openeuler", "community", "repository/openeuler.yaml", ""),
            TrackedFile::new("openeuler", "community", "sig/sigs.yaml", "release"),
            TrackedFile::new("src-openeuler", "community", "repository/openeuler.yaml", ""),
            TrackedFile::new("openeuler", "community", "repository/src.yaml", "master"),
        ]
    }

    #[test]
    fn no_changed_paths_short_circuits() {
        let e = event(Some("refs/heads/master"), vec![commit(&[], &[])]);
        assert_eq!(select_changed_files(&e, &tracked(), "master"), (vec![], false));
    }

    #[test]
    fn missing_ref_matches_nothing() {
        let e = event(None, vec![commit(&["repository/openeuler.yaml"], &[])]);
        assert_eq!(select_changed_files(&e, &tracked(), "master"), (vec![], false));
    }

    #[test]
    fn unrelated_paths_are_not_found() {
        let e = event(Some("refs/heads/master"), vec![commit(&["README.md"], &["docs/x.md"])]);
        let (idx, found) = select_changed_files(&e, &tracked(), "master");
        assert!(idx.is_empty());
        assert!(!found);
    }

    #[test]
    fn unions_added_and_modified_across_commits() {
        let e = event(
            Some("refs/heads/master"),
            vec![
                commit(&["repository/openeuler.yaml"], &[]),
                commit(&[], &["repository/src.yaml"]),
            ],
        );
        assert_eq!(
            select_changed_files(&e, &tracked(), "master"),
            (vec![0, 3], true)
        );
    }

    #[rstest]
    #[case::default_ref_applies("refs/heads/master", vec![0])]
    #[case::explicit_ref("refs/heads/release", vec![1])]
    #[case::other_branch("refs/heads/dev", vec![])]
    fn ref_is_matched_by_substring(#[case] git_ref: &str, #[case] expected: Vec<usize>) {
        let e = event(
            Some(git_ref),
            vec![commit(&["repository/openeuler.yaml"], &["sig/sigs.yaml"])],
        );
        let (idx, found) = select_changed_files(&e, &tracked(), "master");
        assert_eq!(found, !expected.is_empty());
        assert_eq!(idx, expected);
    }

    #[test]
    fn other_repository_is_skipped() {
        let mut e = event(Some("refs/heads/master"), vec![commit(&["repository/openeuler.yaml"], &[])]);
        e.repository.namespace = "src-openeuler".to_string();
        assert_eq!(
            select_changed_files(&e, &tracked(), "master"),
            (vec![2], true)
        );
    }
}
