use insight_guard::intent::{extract_intent, AnalysisType, MetricKind, TimeRange, TimeUnit};
use insight_guard::semantic::document::{DocumentKind, SemanticDocument};
use insight_guard::semantic::embedder::HashEmbedder;
use insight_guard::semantic::retriever::{SemanticRetriever, SemanticSearch};
use insight_guard::semantic::vector_store::InMemoryVectorStore;
use std::sync::Arc;

fn metric_doc(id: &str, roles: &[&str]) -> SemanticDocument {
    SemanticDocument {
        id: id.to_string(),
        kind: DocumentKind::Metric,
        database_name: "analytics".to_string(),
        table_name: "orders".to_string(),
        column_name: Some("revenue".to_string()),
        semantic_type: None,
        metric_name: Some(id.to_string()),
        allowed_roles: roles.iter().map(|r| r.to_string()).collect(),
        text: format!("Metric {} over analytics.orders revenue", id),
    }
}

async fn ids_for(retriever: &SemanticRetriever, role: &str) -> Vec<String> {
    retriever
        .search("org:org_demo:semantic:default_mysql", "revenue", 12, role)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect()
}

#[tokio::test]
async fn test_public_and_role_scoped_documents() {
    let retriever = SemanticRetriever::new(Arc::new(InMemoryVectorStore::new()), Arc::new(HashEmbedder::new()));
    retriever
        .index_documents(
            "org:org_demo:semantic:default_mysql",
            vec![metric_doc("orders_count", &[]), metric_doc("orders_revenue_sum", &["finance"])],
        )
        .await
        .unwrap();

    let sales = ids_for(&retriever, "sales").await;
    assert!(sales.contains(&"orders_count".to_string()));
    assert!(!sales.contains(&"orders_revenue_sum".to_string()));

    let finance = ids_for(&retriever, "finance").await;
    assert!(finance.contains(&"orders_count".to_string()));
    assert!(finance.contains(&"orders_revenue_sum".to_string()));
}

#[tokio::test]
async fn test_collections_are_isolated() {
    let retriever = SemanticRetriever::new(Arc::new(InMemoryVectorStore::new()), Arc::new(HashEmbedder::new()));
    retriever
        .index_documents("org:org_a:semantic:ds", vec![metric_doc("orders_count", &[])])
        .await
        .unwrap();

    let other = retriever.search("org:org_b:semantic:ds", "orders", 12, "admin").await.unwrap();
    assert!(other.is_empty());
}

#[test]
fn test_intent_for_revenue_trend_question() {
    let question = "show revenue trend last 3 months";
    let intent = extract_intent(question);
    assert_eq!(intent.analysis_type, AnalysisType::Trend);
    assert_eq!(intent.metric, MetricKind::Sum);
    assert_eq!(intent.time_range, TimeRange::Relative { value: 3, unit: TimeUnit::Month });
    assert_eq!(extract_intent(question), intent);
}
