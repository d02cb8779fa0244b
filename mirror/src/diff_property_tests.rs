//! Property tests for the diff computation using proptest

use std::collections::BTreeMap;
use std::path::Path;

use proptest::prelude::*;

use crate::diff::{self, ChangeItem};
use crate::indexer::{containing_dir, FileRecord, Snapshot};

/// Keys are drawn from a small pool so generated snapshots overlap.
fn tree_key() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "a.txt".to_string(),
        "b.cfg".to_string(),
        "notes/c.md".to_string(),
        "notes/d.md".to_string(),
        "deep/nested/e.json".to_string(),
    ])
}

/// Versions stay small so equal-version collisions actually happen.
fn version() -> impl Strategy<Value = i64> {
    0..6i64
}

fn records_for(files: &BTreeMap<String, i64>, root: &str) -> Snapshot {
    files
        .iter()
        .map(|(key, version)| {
            let record = FileRecord {
                version: *version,
                path: Path::new(root).join(key),
                dir: containing_dir(key),
            };
            (key.clone(), record)
        })
        .collect()
}

/// Strategy for one tree snapshot rooted at the given path.
fn tree(root: &'static str) -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map(tree_key(), version(), 0..5)
        .prop_map(move |files| records_for(&files, root))
}

/// Strategy for two snapshots holding the same keys at the same versions.
fn mirrored_pair() -> impl Strategy<Value = (Snapshot, Snapshot)> {
    prop::collection::btree_map(tree_key(), version(), 0..5)
        .prop_map(|files| (records_for(&files, "/src"), records_for(&files, "/dst")))
}

/// Replay a change list onto the dest snapshot and the baselines, the way the
/// executor records applied items.
fn apply_all(
    items: &[ChangeItem],
    source: &Snapshot,
    dest: &mut Snapshot,
    baseline_source: &mut Snapshot,
    baseline_dest: &mut Snapshot,
) {
    for item in items {
        match item {
            ChangeItem::Create { key, record } | ChangeItem::Modify { key, record } => {
                dest.insert(key.clone(), record.clone());
                baseline_source.insert(key.clone(), source[key].clone());
                baseline_dest.insert(key.clone(), record.clone());
            }
            ChangeItem::Delete { key } => {
                dest.remove(key);
                baseline_source.remove(key);
                baseline_dest.remove(key);
            }
        }
    }
}

proptest! {
    #[test]
    fn test_applying_a_diff_leaves_nothing_to_diff(
        source in tree("/src"),
        mut dest in tree("/dst"),
        mut baseline_source in tree("/src"),
        mut baseline_dest in tree("/dst"),
    ) {
        let items = diff::compute(&source, &dest, &baseline_source, &baseline_dest, false);
        apply_all(&items, &source, &mut dest, &mut baseline_source, &mut baseline_dest);

        let again = diff::compute(&source, &dest, &baseline_source, &baseline_dest, false);
        prop_assert!(again.is_empty(), "second diff was not empty: {again:?}");
    }

    #[test]
    fn test_no_key_is_both_deleted_and_copied_in_one_batch(
        source in tree("/src"),
        dest in tree("/dst"),
        baseline_source in tree("/src"),
        baseline_dest in tree("/dst"),
        overwrite in any::<bool>(),
    ) {
        let items = diff::compute(&source, &dest, &baseline_source, &baseline_dest, overwrite);

        let deletes: Vec<&str> = items
            .iter()
            .filter(|item| matches!(item, ChangeItem::Delete { .. }))
            .map(|item| item.key())
            .collect();
        for item in &items {
            if !matches!(item, ChangeItem::Delete { .. }) {
                prop_assert!(!deletes.contains(&item.key()));
            }
        }
    }

    #[test]
    fn test_deletes_only_target_files_the_dest_still_has(
        source in tree("/src"),
        dest in tree("/dst"),
        baseline_source in tree("/src"),
        baseline_dest in tree("/dst"),
        overwrite in any::<bool>(),
    ) {
        let items = diff::compute(&source, &dest, &baseline_source, &baseline_dest, overwrite);

        for item in &items {
            if let ChangeItem::Delete { key } = item {
                prop_assert!(dest.contains_key(key));
                prop_assert!(!source.contains_key(key));
                prop_assert!(baseline_source.contains_key(key));
            }
        }
    }

    #[test]
    fn test_empty_baselines_never_produce_deletes(
        source in tree("/src"),
        dest in tree("/dst"),
        overwrite in any::<bool>(),
    ) {
        let items = diff::compute(&source, &dest, &Snapshot::new(), &Snapshot::new(), overwrite);
        let no_deletes = !items.iter().any(|item| matches!(item, ChangeItem::Delete { .. }));
        prop_assert!(no_deletes);
    }

    #[test]
    fn test_overwrite_only_ever_adds_modifies(
        source in tree("/src"),
        dest in tree("/dst"),
        baseline_source in tree("/src"),
        baseline_dest in tree("/dst"),
    ) {
        let plain = diff::compute(&source, &dest, &baseline_source, &baseline_dest, false);
        let forced = diff::compute(&source, &dest, &baseline_source, &baseline_dest, true);

        let keys_of = |items: &[ChangeItem], want_delete: bool| -> Vec<String> {
            items
                .iter()
                .filter(|item| matches!(item, ChangeItem::Delete { .. }) == want_delete)
                .map(|item| item.key().to_string())
                .collect()
        };

        // Deletes and creates are unaffected by the overwrite flag
        prop_assert_eq!(keys_of(&plain, true), keys_of(&forced, true));
        for item in &plain {
            if matches!(item, ChangeItem::Create { .. }) {
                let created_in_forced = forced
                    .iter()
                    .any(|f| matches!(f, ChangeItem::Create { .. }) && f.key() == item.key());
                prop_assert!(created_in_forced);
            }
        }

        // Every plain item survives into the forced batch
        for item in &plain {
            prop_assert!(forced.iter().any(|f| f.key() == item.key()));
        }
    }

    #[test]
    fn test_already_mirrored_trees_diff_to_nothing(
        (source, dest) in mirrored_pair(),
        baseline_source in tree("/src"),
        baseline_dest in tree("/dst"),
    ) {
        // Whatever the baselines claim, identical trees need no work
        let items = diff::compute(&source, &dest, &baseline_source, &baseline_dest, false);
        prop_assert!(items.is_empty(), "diff of mirrored trees was not empty: {items:?}");
    }
}
