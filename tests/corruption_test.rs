#[cfg(test)]
mod tests {
    use std::fs;

    use lexis::config::{FieldConfig, IndexConfig};
    use lexis::document::Document;
    use lexis::index::Index;
    use lexis::query::{SearchRequest, SearchStatus};
    use lexis::segment::segment_file_name;
    use tempfile::TempDir;

    fn build(dir: &TempDir) -> (u64, u64) {
        let config = IndexConfig {
            background_merge: false,
            ..IndexConfig::with_fields(vec![FieldConfig::text("body")])
        };
        let index = Index::create_in_dir(dir.path(), config).unwrap();
        let writer = index.writer();

        writer.add_document(&Document::builder(1).add_text("body", "alpha common").build()).unwrap();
        let first = writer.flush().unwrap().unwrap().id;
        writer.add_document(&Document::builder(2).add_text("body", "beta common").build()).unwrap();
        let second = writer.flush().unwrap().unwrap().id;
        index.close().unwrap();
        (first, second)
    }

    #[test]
    fn test_flipped_byte_excludes_segment() {
        let dir = TempDir::new().unwrap();
        let (first, second) = build(&dir);

        let path = dir.path().join(segment_file_name(first));
        let mut bytes = fs::read(&path).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x5A;
        fs::write(&path, bytes).unwrap();

        let index = Index::open_dir(dir.path()).unwrap();
        let stats = index.stats();
        assert_eq!(stats.corrupt_segments, vec![first]);
        assert_eq!(stats.segment_count, 1);
        assert_eq!(stats.segments[0].id, second);

        let results = index
            .searcher()
            .unwrap()
            .search(&SearchRequest::new("common"))
            .unwrap();
        assert_eq!(results.status, SearchStatus::Partial);
        assert_eq!(results.doc_ids(), vec![2]);
        assert!(!results.warnings.is_empty());

        // The damaged file stays in place for inspection.
        assert!(path.exists());
    }

    #[test]
    fn test_truncated_segment_is_excluded() {
        let dir = TempDir::new().unwrap();
        let (_, second) = build(&dir);

        let path = dir.path().join(segment_file_name(second));
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 3]).unwrap();

        let index = Index::open_dir(dir.path()).unwrap();
        assert_eq!(index.stats().corrupt_segments, vec![second]);

        let results = index
            .searcher()
            .unwrap()
            .search(&SearchRequest::new("alpha | beta"))
            .unwrap();
        assert_eq!(results.status, SearchStatus::Partial);
        assert_eq!(results.doc_ids(), vec![1]);

        // Healthy segments keep accepting writes next to the damaged one.
        let writer = index.writer();
        writer.add_document(&Document::builder(3).add_text("body", "gamma").build()).unwrap();
        writer.flush().unwrap();
        assert_eq!(index.stats().segment_count, 2);
        assert_eq!(index.stats().corrupt_segments, vec![second]);
    }

    #[test]
    fn test_missing_segment_is_excluded() {
        let dir = TempDir::new().unwrap();
        let (first, _) = build(&dir);
        fs::remove_file(dir.path().join(segment_file_name(first))).unwrap();

        let index = Index::open_dir(dir.path()).unwrap();
        assert_eq!(index.stats().corrupt_segments, vec![first]);
        assert!(index.snapshot().is_partial());
    }

    #[test]
    fn test_damaged_config_fails_to_open() {
        let dir = TempDir::new().unwrap();
        build(&dir);
        fs::write(dir.path().join(lexis::index::CONFIG_FILE), b"{ not json").unwrap();
        assert!(Index::open_dir(dir.path()).is_err());
    }
}
