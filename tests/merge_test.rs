#[cfg(test)]
mod tests {
    use lexis::config::{FieldConfig, IndexConfig};
    use lexis::document::Document;
    use lexis::index::Index;
    use lexis::merge::policy::MergePolicyConfig;
    use lexis::query::{RankingMode, SearchRequest};
    use tempfile::TempDir;

    fn config(background_merge: bool) -> IndexConfig {
        IndexConfig {
            background_merge,
            merge: MergePolicyConfig {
                max_small_segments: 3,
                max_merge_width: 4,
                ..MergePolicyConfig::default()
            },
            ..IndexConfig::with_fields(vec![FieldConfig::text("body")])
        }
    }

    fn add_batch(index: &Index, ids: std::ops::Range<u64>) {
        let writer = index.writer();
        for id in ids {
            writer
                .add_document(
                    &Document::builder(id)
                        .add_text("body", format!("doc{id} batch shared"))
                        .build(),
                )
                .unwrap();
        }
        writer.flush().unwrap();
    }

    fn all_ids(index: &Index) -> Vec<u64> {
        let request = SearchRequest::new("shared")
            .with_ranking(RankingMode::None)
            .with_limit(1000);
        index.searcher().unwrap().search(&request).unwrap().doc_ids()
    }

    #[test]
    fn test_background_merge_compacts_small_segments() {
        let dir = TempDir::new().unwrap();
        let index = Index::create_in_dir(dir.path(), config(true)).unwrap();
        for batch in 0..8u64 {
            add_batch(&index, batch * 10..batch * 10 + 10);
        }
        index.writer().wait_for_merges().unwrap();

        let stats = index.stats();
        assert!(stats.segment_count < 8, "{} segments", stats.segment_count);
        assert_eq!(stats.live_doc_count, 80);
        assert_eq!(all_ids(&index), (0..80).collect::<Vec<_>>());
        index.close().unwrap();
    }

    #[test]
    fn test_synchronous_merge_follows_policy() {
        let dir = TempDir::new().unwrap();
        let index = Index::create_in_dir(dir.path(), config(false)).unwrap();
        for batch in 0..3u64 {
            add_batch(&index, batch * 5..batch * 5 + 5);
        }
        assert_eq!(index.writer().merge_now().unwrap(), 0);
        assert_eq!(index.stats().segment_count, 3);

        add_batch(&index, 15..20);
        assert!(index.writer().merge_now().unwrap() >= 1);
        assert!(index.stats().segment_count < 4);
        assert_eq!(all_ids(&index), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_force_merge_drops_deleted_documents() {
        let dir = TempDir::new().unwrap();
        let index = Index::create_in_dir(dir.path(), config(false)).unwrap();
        add_batch(&index, 0..10);
        add_batch(&index, 10..20);

        let writer = index.writer();
        assert_eq!(writer.delete_documents(&[0, 5, 15]).unwrap(), 3);
        let stats = index.stats();
        assert_eq!(stats.doc_count, 20);
        assert_eq!(stats.deleted_count, 3);

        let merged = writer.force_merge().unwrap().unwrap();
        assert_eq!(merged.segments_merged, 2);
        assert_eq!(merged.deleted_docs_removed, 3);
        assert_eq!(merged.docs_after, 17);

        let stats = index.stats();
        assert_eq!(stats.segment_count, 1);
        assert_eq!(stats.doc_count, 17);
        assert_eq!(stats.deleted_count, 0);

        let expected: Vec<u64> = (0..20).filter(|id| ![0, 5, 15].contains(id)).collect();
        assert_eq!(all_ids(&index), expected);

        let single = index
            .searcher()
            .unwrap()
            .search(&SearchRequest::new("doc15"))
            .unwrap();
        assert!(single.hits.is_empty());
    }

    #[test]
    fn test_merged_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let index = Index::create_in_dir(dir.path(), config(false)).unwrap();
            for batch in 0..4u64 {
                add_batch(&index, batch * 3..batch * 3 + 3);
            }
            index.writer().delete_document(4).unwrap();
            index.writer().force_merge().unwrap();
            index.close().unwrap();
        }

        let segment_files = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".lxs"))
            .count();
        assert_eq!(segment_files, 1);

        let index = Index::open_dir(dir.path()).unwrap();
        let expected: Vec<u64> = (0..12).filter(|&id| id != 4).collect();
        assert_eq!(all_ids(&index), expected);
    }
}
