#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use lexis::config::{FieldConfig, IndexConfig};
    use lexis::document::Document;
    use lexis::index::Index;
    use lexis::query::{RankingMode, SearchRequest};
    use lexis::storage::Storage;
    use lexis::storage::memory::MemoryStorage;
    use tempfile::TempDir;

    fn config() -> IndexConfig {
        IndexConfig {
            background_merge: false,
            ..IndexConfig::with_fields(vec![FieldConfig::text("body")])
        }
    }

    fn doc(id: u64) -> Document {
        Document::builder(id)
            .add_text("body", format!("item{id} stable text"))
            .build()
    }

    fn request() -> SearchRequest {
        SearchRequest::new("stable")
            .with_ranking(RankingMode::bm25())
            .with_limit(1000)
    }

    #[test]
    fn test_snapshot_survives_concurrent_merge() {
        let dir = TempDir::new().unwrap();
        let index = Index::create_in_dir(dir.path(), config()).unwrap();
        let writer = index.writer();
        for id in 0..120 {
            writer.add_document(&doc(id)).unwrap();
            if id % 20 == 19 {
                writer.flush().unwrap();
            }
        }

        let searcher = index.searcher().unwrap();
        let snapshot = index.snapshot();
        let before = searcher.search_snapshot(&snapshot, &request()).unwrap();
        assert_eq!(before.total_matched, 120);

        let done = AtomicBool::new(false);
        thread::scope(|scope| {
            scope.spawn(|| {
                writer.delete_documents(&[3, 50, 99]).unwrap();
                writer.force_merge().unwrap();
                done.store(true, Ordering::Release);
            });
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let during = searcher.search_snapshot(&snapshot, &request()).unwrap();
                    assert_eq!(during.hits, before.hits);
                }
            });
        });

        let after_merge = searcher.search_snapshot(&snapshot, &request()).unwrap();
        assert_eq!(after_merge.hits, before.hits);
        assert_eq!(after_merge.snapshot_version, before.snapshot_version);

        let current = searcher.search(&request()).unwrap();
        assert_eq!(current.total_matched, 117);
        assert_eq!(index.stats().segment_count, 1);
    }

    #[test]
    fn test_retired_files_outlive_snapshots() {
        let memory = Arc::new(MemoryStorage::new_default());
        let storage: Arc<dyn Storage> = memory.clone();
        let index = Index::create(Arc::clone(&storage), config()).unwrap();
        let writer = index.writer();
        for id in 0..4 {
            writer.add_document(&doc(id)).unwrap();
            writer.flush().unwrap();
        }

        let snapshot = index.snapshot();
        let old_files: Vec<String> = snapshot
            .segments()
            .iter()
            .map(|s| lexis::segment::segment_file_name(s.id()))
            .collect();
        writer.force_merge().unwrap();

        for name in &old_files {
            assert!(storage.file_exists(name), "{name} removed while in use");
        }
        let results = index
            .searcher()
            .unwrap()
            .search_snapshot(&snapshot, &request())
            .unwrap();
        assert_eq!(results.total_matched, 4);

        drop(results);
        drop(snapshot);
        for name in &old_files {
            assert!(!storage.file_exists(name), "{name} not removed");
        }
    }

    #[test]
    fn test_queries_run_while_indexing() {
        let dir = TempDir::new().unwrap();
        let index = Index::create_in_dir(dir.path(), config()).unwrap();
        let writer = index.writer();
        let searcher = index.searcher().unwrap();
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                for id in 0..300 {
                    writer.add_document(&doc(id)).unwrap();
                    if id % 30 == 29 {
                        writer.flush().unwrap();
                    }
                    if id % 90 == 89 {
                        writer.merge_now().unwrap();
                    }
                }
                done.store(true, Ordering::Release);
            });
            for _ in 0..2 {
                scope.spawn(|| {
                    let mut last = 0;
                    while !done.load(Ordering::Acquire) {
                        let results = searcher.search(&request()).unwrap();
                        assert!(results.total_matched >= last);
                        assert_eq!(results.total_matched % 30, 0);
                        last = results.total_matched;
                    }
                });
            }
        });

        assert_eq!(searcher.search(&request()).unwrap().total_matched, 300);
    }
}
