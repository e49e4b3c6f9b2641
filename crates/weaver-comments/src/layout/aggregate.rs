//! Small-screen clustering of threads anchored on the same line.

use super::Entry;

/// Merge consecutive entries whose anchors sit within `tolerance` of the
/// cluster's first member. Returns the clusters and the focus remapped to
/// the cluster containing the focused entry.
pub fn aggregate(
    entries: Vec<Entry>,
    focus: Option<usize>,
    tolerance: f64,
) -> (Vec<Entry>, Option<usize>) {
    let mut clusters: Vec<Entry> = Vec::with_capacity(entries.len());
    let mut cluster_focus = None;

    for (index, entry) in entries.into_iter().enumerate() {
        let same_line = clusters
            .last_mut()
            .filter(|last| (entry.anchor_top - last.anchor_top).abs() < tolerance);
        match same_line {
            Some(last) => {
                last.thread_ids.extend(entry.thread_ids);
                last.height = last.height.max(entry.height);
                last.unread_count += entry.unread_count;
                last.any_unread |= entry.any_unread;
            }
            None => clusters.push(entry),
        }
        if focus == Some(index) {
            cluster_focus = Some(clusters.len() - 1);
        }
    }

    (clusters, cluster_focus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, anchor_top: f64, height: f64, unread: usize) -> Entry {
        Entry {
            thread_ids: vec![id.into()],
            anchor_top,
            height,
            unread_count: unread,
            any_unread: unread > 0,
        }
    }

    #[test]
    fn test_same_line_entries_merge() {
        let (clusters, focus) = aggregate(
            vec![
                entry("a", 100.0, 30.0, 0),
                entry("b", 100.4, 45.0, 2),
                entry("c", 100.9, 20.0, 1),
                entry("d", 140.0, 30.0, 0),
            ],
            Some(2),
            1.0,
        );
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].thread_ids, vec!["a", "b", "c"]);
        assert_eq!(clusters[0].height, 45.0);
        assert_eq!(clusters[0].unread_count, 3);
        assert!(clusters[0].any_unread);
        assert!(!clusters[1].any_unread);
        assert_eq!(focus, Some(0));
    }

    #[test]
    fn test_tolerance_measured_from_first_member() {
        // b is within 1px of a, c is within 1px of b but not of a.
        let (clusters, focus) = aggregate(
            vec![
                entry("a", 100.0, 10.0, 0),
                entry("b", 100.8, 10.0, 0),
                entry("c", 101.6, 10.0, 0),
            ],
            Some(2),
            1.0,
        );
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[1].thread_ids, vec!["c"]);
        assert_eq!(focus, Some(1));
    }

    #[test]
    fn test_no_focus() {
        let (clusters, focus) = aggregate(vec![entry("a", 0.0, 10.0, 0)], None, 1.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(focus, None);
    }
}
