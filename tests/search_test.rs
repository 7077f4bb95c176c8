//! End-to-end search behaviour through the query API

mod common;

use common::{account, article, comment, Harness};
use content_search::embedding::{EmbeddingService, HashEmbedder};
use content_search::metrics::{gather_metrics, init_metrics};
use content_search::models::{ContentObject, ObjectType, SearchContext};
use content_search::search::{
    IndexEntry, IndexStore, OrderBy, SearchConfig, SearchConfigBuilder, SearchRequest, TypeFilter,
};
use std::sync::Arc;

fn visitor() -> SearchContext {
    SearchContext::anonymous("192.0.2.10").with_user_agent("integration-test")
}

#[tokio::test]
async fn test_vue_tutorial_is_found() {
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(article(1, "Vue Tutorial", "<p>Setting up the router step by step.</p>")).await;
    h.publish(article(2, "Cooking", "Pasta all day.")).await;

    let response = h.api.search(&SearchRequest::new("vue"), &visitor()).await.unwrap();

    assert_eq!(response.query, "vue");
    assert_eq!(response.total, 1);
    assert_eq!(response.page, 1);
    assert_eq!(response.per_page, 10);

    let hit = &response.results[0];
    assert_eq!(hit.id, "content:1");
    assert_eq!(hit.object_type, ObjectType::Content);
    assert_eq!(hit.title, "Vue Tutorial");
    assert!(hit.relevance > 0.0);
}

#[tokio::test]
async fn test_words_inside_ideograph_runs_are_found() {
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(article(1, "笔记", "我喜欢学习编程")).await;
    h.publish(article(2, "Cooking", "今天吃面条")).await;
    h.publish(article(3, "プログラミング入門", "rust入門")).await;

    let response = h.api.search(&SearchRequest::new("编程"), &visitor()).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].object_id, 1);

    let response = h.api.search(&SearchRequest::new("学习编程"), &visitor()).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].object_id, 1);

    let response = h.api.search(&SearchRequest::new("入門"), &visitor()).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].object_id, 3);
}

#[tokio::test]
async fn test_unpublished_entries_never_returned() {
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(article(1, "Kotlin basics", "kotlin")).await;
    h.publish(ContentObject::new(2, ObjectType::Content, "Kotlin draft", "kotlin", "draft")).await;
    h.publish(ContentObject::new(3, ObjectType::Comment, "", "kotlin spam", "spam")).await;

    // Written around the indexer, still filtered at query time
    h.store
        .upsert(&IndexEntry::from_object(
            &ContentObject::new(4, ObjectType::Account, "Kotlin fan", "kotlin", "suspended"),
            200,
        ))
        .await
        .unwrap();

    let response = h.api.search(&SearchRequest::new("kotlin"), &visitor()).await.unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["content:1"]);
}

#[tokio::test]
async fn test_short_queries_rejected_without_history() {
    let h = Harness::new(SearchConfig::default()).await;

    for query in ["v", " v ", "a b"] {
        let err = h.api.search(&SearchRequest::new(query), &visitor()).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    assert!(h.history.is_empty());
    assert!(h.api.popular(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_result_query() {
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(article(1, "Something", "else entirely")).await;

    let response = h.api.search(&SearchRequest::new("zzzznotfound"), &visitor()).await.unwrap();
    assert_eq!(response.total, 0);
    assert!(response.results.is_empty());

    let report = h.api.analytics(1).await.unwrap();
    assert_eq!(report.zero_result_queries[0].query, "zzzznotfound");
    assert_eq!(report.daily_volume.len(), 1);
    assert_eq!(report.daily_volume[0].zero_results, 1);
}

#[tokio::test]
async fn test_mixed_types_and_type_filter() {
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(article(1, "Haskell monads", "functional programming")).await;
    h.publish(comment(2, 1, "I finally understand haskell")).await;
    h.publish(account(3, "Simon", "writes haskell")).await;

    let all = h.api.search(&SearchRequest::new("haskell"), &visitor()).await.unwrap();
    assert_eq!(all.total, 3);

    let comments = SearchRequest::parse("haskell", "comment", "relevance", 1, 10).unwrap();
    let response = h.api.search(&comments, &visitor()).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].object_type, ObjectType::Comment);

    assert!(SearchRequest::parse("haskell", "post", "relevance", 1, 10).is_err());
    assert!(SearchRequest::parse("haskell", "all", "popularity", 1, 10).is_err());
}

#[tokio::test]
async fn test_pagination() {
    let h = Harness::new(SearchConfig::default()).await;
    for id in 1..=7 {
        h.publish(article(id, &format!("Elixir note {}", id), "elixir")).await;
    }

    let second = SearchRequest::new("elixir").with_per_page(3).with_page(2);
    let response = h.api.search(&second, &visitor()).await.unwrap();
    assert_eq!(response.total, 7);
    assert_eq!(response.results.len(), 3);

    let past_end = SearchRequest::new("elixir").with_per_page(3).with_page(4);
    let response = h.api.search(&past_end, &visitor()).await.unwrap();
    assert_eq!(response.total, 7);
    assert!(response.results.is_empty());

    let invalid = SearchRequest::new("elixir").with_per_page(0);
    assert!(h.api.search(&invalid, &visitor()).await.is_err());
}

#[tokio::test]
async fn test_engagement_and_date_ordering() {
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(
        article(1, "Zig intro", "zig")
            .with_views(10)
            .with_created_at(chrono::Utc::now() - chrono::Duration::days(2)),
    )
    .await;
    h.publish(
        article(2, "Zig deep dive", "zig")
            .with_views(5000)
            .with_created_at(chrono::Utc::now() - chrono::Duration::days(40)),
    )
    .await;

    let by_engagement = SearchRequest::new("zig").with_order(OrderBy::Engagement);
    let response = h.api.search(&by_engagement, &visitor()).await.unwrap();
    assert_eq!(response.results[0].object_id, 2);

    let by_date = SearchRequest::new("zig").with_order(OrderBy::Date);
    let response = h.api.search(&by_date, &visitor()).await.unwrap();
    assert_eq!(response.results[0].object_id, 1);
}

#[tokio::test]
async fn test_synonym_expansion() {
    let config = SearchConfigBuilder::new()
        .synonym("js", vec!["javascript"])
        .build();
    let h = Harness::new(config).await;
    h.publish(article(1, "JavaScript closures", "scope and functions")).await;

    let response = h.api.search(&SearchRequest::new("js"), &visitor()).await.unwrap();
    assert_eq!(response.total, 1);

    let disabled = SearchConfigBuilder::new()
        .synonym("js", vec!["javascript"])
        .enable_synonyms(false)
        .build();
    let h = Harness::new(disabled).await;
    h.publish(article(1, "JavaScript closures", "scope and functions")).await;
    let response = h.api.search(&SearchRequest::new("js"), &visitor()).await.unwrap();
    assert_eq!(response.total, 0);
}

#[tokio::test]
async fn test_repeat_queries_hit_cache_but_are_recorded() {
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(article(1, "Erlang actors", "message passing")).await;

    let ctx = SearchContext::for_user(11);
    let first = h.api.search(&SearchRequest::new("erlang"), &ctx).await.unwrap();
    let second = h.api.search(&SearchRequest::new("Erlang"), &ctx).await.unwrap();
    let ids = |r: &content_search::search::SearchResponse| -> Vec<String> {
        r.results.iter().map(|hit| hit.id.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&second));

    let stats = h.api.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(h.api.history(11, 10).await.unwrap().len(), 2);

    // Index changes drop cached result sets
    h.publish(article(2, "More erlang", "otp")).await;
    let third = h.api.search(&SearchRequest::new("erlang"), &ctx).await.unwrap();
    assert_eq!(third.total, 2);
}

#[tokio::test]
async fn test_semantic_similarity_orders_results() {
    let embedder = HashEmbedder::new(64);
    let query_vector = embedder.embed_text("vue router");
    let opposite_vector: Vec<f32> = query_vector.iter().map(|x| -x).collect();

    let config = SearchConfigBuilder::new()
        .enable_semantic(true)
        .embedding_timeout_ms(1000)
        .build();
    let embeddings =
        EmbeddingService::new(Arc::new(embedder), config.embedding_timeout()).with_dimension(64);
    let h = Harness::with_embeddings(config, embeddings).await;

    h.publish(article(1, "Vue router", "vue router deep dive").with_embedding(opposite_vector))
        .await;
    h.publish(article(2, "Notes", "some vue router notes").with_embedding(query_vector))
        .await;
    h.publish(article(3, "Vue router tips", "vue router without a vector")).await;

    let response = h.api.search(&SearchRequest::new("vue router"), &visitor()).await.unwrap();
    assert_eq!(response.total, 3);
    assert_eq!(response.results[0].object_id, 2);
    assert!((response.results[0].similarity.unwrap() - 1.0).abs() < 1e-4);

    // Opposite and missing vectors both count as zero similarity and fall
    // back to lexical order
    let rest = &response.results[1..];
    assert!(rest[0].relevance >= rest[1].relevance);
    let vectorless = rest.iter().find(|hit| hit.object_id == 3).unwrap();
    assert!(vectorless.similarity.is_none());
    let opposite = rest.iter().find(|hit| hit.object_id == 1).unwrap();
    assert_eq!(opposite.similarity, Some(0.0));
}

#[tokio::test]
async fn test_urls_and_highlighting() {
    let config = SearchConfigBuilder::new().base_url("https://blog.example").build();
    let h = Harness::new(config).await;
    h.publish(article(1, "Scala implicits", "Intro text. Implicits in Scala are powerful. Outro.")).await;
    h.publish(comment(2, 1, "scala rocks")).await;
    h.publish(account(3, "Martin", "scala author")).await;

    let response = h
        .api
        .search(
            &SearchRequest::new("scala").with_type_filter(TypeFilter::All),
            &visitor(),
        )
        .await
        .unwrap();

    let url_of = |id: &str| {
        response
            .results
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.url.clone())
            .unwrap()
    };
    assert_eq!(url_of("content:1"), "https://blog.example/content/1");
    assert_eq!(url_of("comment:2"), "https://blog.example/content/1#comment-2");
    assert_eq!(url_of("account:3"), "https://blog.example/author/3");

    let article_hit = response.results.iter().find(|r| r.id == "content:1").unwrap();
    assert_eq!(
        article_hit.highlighted_excerpt,
        "Implicits in <mark>Scala</mark> are powerful."
    );
}

#[tokio::test]
async fn test_search_metrics_exported() {
    init_metrics().unwrap();
    let h = Harness::new(SearchConfig::default()).await;
    h.publish(article(1, "Prometheus", "metrics")).await;
    h.api.search(&SearchRequest::new("prometheus"), &visitor()).await.unwrap();

    let output = gather_metrics();
    assert!(output.contains("content_search_search_queries_total"));
    assert!(output.contains("content_search_search_duration_seconds"));
}
