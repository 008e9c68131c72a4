#[cfg(test)]
mod tests {
    use lexis::analysis::stemmer::Language;
    use lexis::config::{FieldConfig, IndexConfig};
    use lexis::document::{AttributeValue, Document};
    use lexis::index::Index;
    use lexis::query::{CancellationToken, RankingMode, SearchRequest, SortMode};
    use lexis::error::LexisError;
    use tempfile::TempDir;

    fn config() -> IndexConfig {
        let mut config = IndexConfig::with_fields(vec![
            FieldConfig::text("title").with_weight(4),
            FieldConfig::text("body").with_stemming(Language::English),
        ]);
        config.background_merge = false;
        config.search.default_ranking = RankingMode::bm25();
        config.search.default_limit = 3;
        config
    }

    fn populate(index: &Index) {
        let writer = index.writer();
        for id in 1..=6u64 {
            writer
                .add_document(
                    &Document::builder(id)
                        .add_text("title", format!("volume {id}"))
                        .add_text("body", "collected running notes")
                        .add_attribute("pages", (id * 100) as i64)
                        .add_attribute("draft", id % 2 == 0)
                        .build(),
                )
                .unwrap();
            if id % 3 == 0 {
                writer.flush().unwrap();
            }
        }
        writer.commit().unwrap();
    }

    #[test]
    fn test_reopen_restores_config_and_documents() {
        let dir = TempDir::new().unwrap();
        let created_at = {
            let index = Index::create_in_dir(dir.path(), config()).unwrap();
            populate(&index);
            let created_at = index.stats().created_at;
            index.close().unwrap();
            created_at
        };

        let index = Index::open_dir(dir.path()).unwrap();
        assert_eq!(index.config(), &config());
        let stats = index.stats();
        assert_eq!(stats.created_at, created_at);
        assert_eq!(stats.segment_count, 2);
        assert_eq!(stats.live_doc_count, 6);

        let searcher = index.searcher().unwrap();
        let results = searcher
            .search(&SearchRequest::new("run").with_sort(SortMode::AttributeDesc("pages".into())))
            .unwrap();
        assert_eq!(results.doc_ids(), vec![6, 5, 4]);
        assert_eq!(results.total_matched, 6);
        assert_eq!(
            results.hits[0].attributes.get("draft"),
            Some(&AttributeValue::Bool(true))
        );
    }

    #[test]
    fn test_uncommitted_buffer_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        {
            let index = Index::create_in_dir(dir.path(), config()).unwrap();
            populate(&index);
            index
                .writer()
                .add_document(&Document::builder(99).add_text("body", "lost").build())
                .unwrap();
        }

        let index = Index::open_dir(dir.path()).unwrap();
        assert_eq!(index.stats().live_doc_count, 6);
        let results = index.searcher().unwrap().search(&SearchRequest::new("lost")).unwrap();
        assert!(results.hits.is_empty());
    }

    #[test]
    fn test_expired_deadline_cancels_search() {
        let dir = TempDir::new().unwrap();
        let index = Index::create_in_dir(dir.path(), config()).unwrap();
        populate(&index);

        let token = CancellationToken::with_timeout(std::time::Duration::ZERO);
        let request = SearchRequest::new("notes").with_cancellation(token);
        assert!(matches!(
            index.searcher().unwrap().search(&request),
            Err(LexisError::OperationCancelled(_))
        ));
    }
}
