//! Switchboard Core Integration Tests
//!
//! Exercise the embedding client and the full routing stack against a mock
//! Ollama-compatible server.

use std::sync::Arc;

use serde_json::{Value, json};
use switchboard_core::{
    Error,
    config::EmbeddingConfig,
    embedding::{CachedEmbedder, EmbeddingBackend, OllamaEmbeddingClient},
    routing::{
        AdaptiveConfig, AdaptiveStrategy, ExpertKind, Feedback, RoutingStrategy, StrategyKind,
        StrategyWeight, VectorConfig, VectorStrategy,
    },
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn embedding_config(dimension: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        dimension,
        max_retries: 3,
        backoff_base_ms: 10,
        timeout_secs: 5,
        ..EmbeddingConfig::default()
    }
}

fn embedder(server: &MockServer, config: &EmbeddingConfig) -> Arc<CachedEmbedder> {
    let client = OllamaEmbeddingClient::builder()
        .config(config.clone())
        .host(server.uri())
        .build()
        .unwrap();
    Arc::new(CachedEmbedder::with_backend(Arc::new(client), config))
}

/// Three-dimensional embeddings: options flow, risk, everything else
fn embed_by_topic(request: &Request) -> ResponseTemplate {
    let body: Value = request.body_json().unwrap_or(Value::Null);
    let prompt = body["prompt"].as_str().unwrap_or_default();

    let embedding = if prompt.contains("Expert Type: options_flow") {
        vec![1.0, 0.0, 0.0]
    } else if prompt.contains("Expert Type: risk") {
        vec![0.0, 1.0, 0.0]
    } else if prompt.contains("Expert Type:") {
        vec![0.0, 0.0, 1.0]
    } else if prompt.contains("put buying") {
        vec![0.9, 0.1, 0.0]
    } else if prompt.contains("position size") {
        vec![0.1, 0.9, 0.0]
    } else {
        vec![0.0, 0.0, -1.0]
    };

    ResponseTemplate::new(200).set_body_json(json!({ "embedding": embedding }))
}

async fn topic_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(embed_by_topic)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_client_sends_model_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_partial_json(json!({
            "model": "nomic-embed-text",
            "prompt": "hello"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.5, 0.25] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::builder()
        .host(server.uri())
        .build()
        .unwrap();
    let vector = client.embed("hello").await.unwrap();
    assert_eq!(vector, vec![0.5, 0.25]);
}

#[tokio::test]
async fn test_client_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::builder()
        .host(server.uri())
        .build()
        .unwrap();
    let err = client.embed("hello").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(ref msg) if msg.contains("404")));
    assert!(err.to_string().contains("model not found"));
}

#[tokio::test]
async fn test_client_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::builder()
        .host(server.uri())
        .build()
        .unwrap();
    assert!(matches!(
        client.embed("hello").await,
        Err(Error::EmbeddingUnavailable(_))
    ));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [1.0, 0.0, 0.0] })))
        .mount(&server)
        .await;

    let config = embedding_config(3);
    let embedder = embedder(&server, &config);

    let vector = embedder.embed("retry me").await.unwrap();
    assert_eq!(&*vector, &[1.0, 0.0, 0.0]);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    // Served from cache on the second call
    embedder.embed("retry me").await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(embedder.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = embedding_config(3);
    let embedder = embedder(&server, &config);

    let err = embedder.embed("doomed").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(embedder.cache().is_empty());
}

#[tokio::test]
async fn test_dimension_mismatch_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [1.0, 2.0] })))
        .mount(&server)
        .await;

    let config = embedding_config(3);
    let embedder = embedder(&server, &config);

    let err = embedder.embed("short").await.unwrap_err();
    assert!(matches!(
        err,
        Error::EmbeddingDimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_vector_strategy_routes_by_similarity() {
    let server = topic_server().await;
    let config = embedding_config(3);
    let strategy = VectorStrategy::new(embedder(&server, &config), VectorConfig::default());

    let decision = strategy.select_expert("Any put buying in SPY?", None).await.unwrap();
    assert_eq!(decision.expert, ExpertKind::OptionsFlow);
    assert!(decision.confidence > 0.99);
    assert_eq!(decision.metadata["selected_expert"], "options_flow");

    let decision = strategy
        .select_expert("What position size should I use?", None)
        .await
        .unwrap();
    assert_eq!(decision.expert, ExpertKind::Risk);

    let decision = strategy.select_expert("Will it rain?", None).await.unwrap();
    assert_eq!(decision.expert, ExpertKind::Orchestrator);
    assert!(
        decision
            .fallback_reason()
            .unwrap()
            .starts_with("similarity_below_threshold")
    );

    let state = strategy.strategy_state();
    assert_eq!(state["experts_initialized"], true);
    assert_eq!(state["num_experts"], 8);
    assert_eq!(state["zero_vector_profiles"], 0);
}

#[tokio::test]
async fn test_vector_strategy_survives_embedding_outage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = EmbeddingConfig {
        max_retries: 1,
        ..embedding_config(3)
    };
    let strategy = VectorStrategy::new(embedder(&server, &config), VectorConfig::default());

    let decision = strategy.select_expert("Any put buying?", None).await.unwrap();
    assert_eq!(decision.expert, ExpertKind::Orchestrator);
    assert_eq!(decision.confidence, 0.0);
    assert_eq!(decision.fallback_reason(), Some("embedding_failed"));
    assert_eq!(strategy.zero_vector_profiles(), 8);
}

#[tokio::test]
async fn test_adaptive_routing_end_to_end() {
    let server = topic_server().await;
    let config = embedding_config(3);
    let shared = embedder(&server, &config);

    let router = AdaptiveStrategy::builder()
        .config(AdaptiveConfig {
            strategies: vec![
                StrategyWeight::new(StrategyKind::Vector, 0.7),
                StrategyWeight::new(StrategyKind::Performance, 0.3),
            ],
            exploration_rate: 0.0,
            seed: Some(11),
            ..AdaptiveConfig::default()
        })
        .embedder(Arc::clone(&shared))
        .build()
        .unwrap();

    let decision = router
        .select_expert("Is there unusual put buying in SPY?", None)
        .await
        .unwrap();
    assert_eq!(decision.expert, ExpertKind::OptionsFlow);
    assert_eq!(decision.strategy_used, "adaptive");
    assert!(decision.confidence > 0.6);
    // Eight profiles plus the prompt
    assert_eq!(server.received_requests().await.unwrap().len(), 9);

    router
        .update_performance(
            decision.expert,
            true,
            1.2,
            &Feedback::for_decision(&decision),
        )
        .await
        .unwrap();

    let learned = router.learned_performance();
    assert!((learned["vector"] - 1.0).abs() > 1e-6);
    assert!((0.1..=2.0).contains(&learned["vector"]));

    let state = router.strategy_state();
    assert_eq!(
        state["strategies"]["performance"]["expert_stats"]["options_flow"]["successful_queries"],
        1
    );
    assert_eq!(state["strategies"]["vector"]["cache_stats"]["entries"], 9);

    // Same prompt again is served from cache
    router
        .select_expert("Is there unusual put buying in SPY?", None)
        .await
        .unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 9);

    router.shutdown().await.unwrap();
    assert_eq!(router.strategy_state()["strategies"]["vector"]["experts_initialized"], false);
}
