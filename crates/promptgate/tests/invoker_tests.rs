//! Integration tests for the OpenAI-compatible invoker (using wiremock)
//!
//! The mock server plays the completion backend, and in the proxied tests
//! it also plays the HTTP proxy: requests for an unresolvable upstream host
//! only reach it if they were routed through the proxy.

use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

use promptgate::completion::{
    CompletionInvoker, CompletionRequest, FailureKind, OpenAiInvoker,
};
use promptgate::config::UpstreamConfig;
use promptgate::proxy::{Proxy, ProxyScheme};

// =============================================================================
// Test Fixtures
// =============================================================================

fn upstream_config(api_url: &str) -> UpstreamConfig {
    UpstreamConfig {
        api_url: api_url.to_string(),
        api_key_env: "PROMPTGATE_TEST_UNSET_API_KEY".to_string(),
        default_model: "gpt-4o".to_string(),
        timeout_secs: 5,
    }
}

fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}
        ]
    })
}

fn proxy_at(server: &MockServer) -> Proxy {
    let address = server.address().to_string();
    Proxy::new(ProxyScheme::Http, &address).unwrap()
}

/// A proxy endpoint nothing listens on
fn dead_proxy() -> Proxy {
    Proxy::new(ProxyScheme::Http, "127.0.0.1:1").unwrap()
}

fn hi() -> CompletionRequest {
    CompletionRequest::from_prompt("gpt-4o", "hi")
}

// =============================================================================
// Direct Connection Tests
// =============================================================================

mod direct_tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/v1/chat/completions"))
            .and(matchers::body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello!")))
            .expect(1)
            .mount(&server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config(&format!("{}/v1/", server.uri()))).unwrap();
        let text = invoker.invoke(&hi(), None).await.unwrap();

        assert_eq!(text, "Hello!");
    }

    #[tokio::test]
    async fn test_empty_choices_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config(&server.uri())).unwrap();
        let err = invoker.invoke(&hi(), None).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Upstream);
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
            .mount(&server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config(&server.uri())).unwrap();
        let err = invoker.invoke(&hi(), None).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Upstream);
        assert!(err.to_string().contains("model overloaded"));
    }

    #[tokio::test]
    async fn test_rate_limit_without_proxy_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config(&server.uri())).unwrap();
        let err = invoker.invoke(&hi(), None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Upstream);
    }

    #[tokio::test]
    async fn test_proxy_auth_status_without_proxy_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(407))
            .mount(&server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config(&server.uri())).unwrap();
        let err = invoker.invoke(&hi(), None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Upstream);
    }

    #[tokio::test]
    async fn test_connection_refused_without_proxy_is_upstream_failure() {
        let invoker = OpenAiInvoker::new(&upstream_config("http://127.0.0.1:1/v1")).unwrap();
        let err = invoker.invoke(&hi(), None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Upstream);
    }

    #[tokio::test]
    async fn test_invalid_request_is_input_failure_without_io() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config(&server.uri())).unwrap();
        let err = invoker
            .invoke(&CompletionRequest::new("gpt-4o", vec![]), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Input);
    }
}

// =============================================================================
// Proxied Connection Tests
// =============================================================================

mod proxied_tests {
    use super::*;

    #[tokio::test]
    async fn test_request_is_routed_through_proxy() {
        let proxy_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("via proxy")))
            .expect(1)
            .mount(&proxy_server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config("http://upstream.invalid/v1")).unwrap();
        let text = invoker
            .invoke(&hi(), Some(&proxy_at(&proxy_server)))
            .await
            .unwrap();

        assert_eq!(text, "via proxy");
    }

    #[tokio::test]
    async fn test_dead_proxy_is_proxy_failure() {
        let invoker = OpenAiInvoker::new(&upstream_config("http://upstream.invalid/v1")).unwrap();
        let err = invoker
            .invoke(&hi(), Some(&dead_proxy()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Proxy);
    }

    #[tokio::test]
    async fn test_blocked_proxy_address_is_proxy_failure() {
        for status in [403, 407, 429] {
            let proxy_server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&proxy_server)
                .await;

            let invoker =
                OpenAiInvoker::new(&upstream_config("http://upstream.invalid/v1")).unwrap();
            let err = invoker
                .invoke(&hi(), Some(&proxy_at(&proxy_server)))
                .await
                .unwrap_err();

            assert_eq!(err.kind(), FailureKind::Proxy, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_injected_html_through_proxy_is_proxy_failure() {
        let proxy_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html>Access denied by proxy</html>"),
            )
            .mount(&proxy_server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config("http://upstream.invalid/v1")).unwrap();
        let err = invoker
            .invoke(&hi(), Some(&proxy_at(&proxy_server)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Proxy);
    }

    #[tokio::test]
    async fn test_null_choices_through_proxy_is_upstream_failure() {
        let proxy_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": null})),
            )
            .mount(&proxy_server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config("http://upstream.invalid/v1")).unwrap();
        let err = invoker
            .invoke(&hi(), Some(&proxy_at(&proxy_server)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Upstream);
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_backend_error_through_proxy_is_upstream_failure() {
        let proxy_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&proxy_server)
            .await;

        let invoker = OpenAiInvoker::new(&upstream_config("http://upstream.invalid/v1")).unwrap();
        let err = invoker
            .invoke(&hi(), Some(&proxy_at(&proxy_server)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Upstream);
    }
}
