//! Client surface: subscribe through the connection pool, the plain
//! request/response path and the introspection cache.

mod common;

use common::*;
use graphsockets::*;
use serde_json::{json, Value};

fn schema() -> Schema {
    Schema::new()
        .with_root(OperationKind::Query, "Query", &["pokemon", "pokemons"])
        .with_root(OperationKind::Subscription, "Subscription", &["messageAdded", "tick"])
}

fn introspection() -> Value {
    json!({
        "data": {
            "__schema": {
                "queryType": {"name": "Query"},
                "mutationType": null,
                "subscriptionType": {"name": "Subscription"},
                "types": [
                    {"kind": "OBJECT", "name": "Query", "fields": [{"name": "pokemon"}]},
                    {"kind": "OBJECT", "name": "Subscription", "fields": [{"name": "tick"}]}
                ]
            }
        }
    })
}

fn client_for(endpoint: String) -> GraphQLClient {
    GraphQLClient::builder()
        .endpoint(endpoint)
        .schema(schema())
        .build()
        .expect("client should build")
}

#[tokio::test]
async fn test_subscriptions_share_a_pooled_connection() {
    let server = MockGraphQLServer::start(&SubProtocol::DEFAULT_PREFERENCE, |mut conn| async move {
        conn.handshake().await;
        let first = conn.expect_start().await;
        let second = conn.expect_start().await;
        conn.send_data(&first, json!({"data": {"tick": 1}})).await;
        conn.send_data(&second, json!({"data": {"tick": 2}})).await;
        conn.send_complete(&first).await;
        conn.send_complete(&second).await;
        conn.drain().await;
    })
    .await;

    let client = client_for(format!("http://{}/graphql", server.addr));
    assert_eq!(client.ws_endpoint(), server.ws_url());

    let (first_events, _, first_log) = event_log();
    let first = within(
        "first subscribe",
        client.subscribe(
            &GraphQLRequest::new("subscription { tick }"),
            SubscribeOptions::new().callbacks(CallbackRegistry::new().on_any(first_log)),
        ),
    )
    .await
    .unwrap();
    let (second_events, _, second_log) = event_log();
    let second = within(
        "second subscribe",
        client.subscribe(
            &GraphQLRequest::new("subscription { tick }"),
            SubscribeOptions::new().callbacks(CallbackRegistry::new().on_any(second_log)),
        ),
    )
    .await
    .unwrap();

    assert!(within("first", first.wait()).await.is_terminal());
    assert!(within("second", second.wait()).await.is_terminal());
    assert_eq!(server.connections(), 1);

    let expected = vec![
        EventType::Connecting,
        EventType::ConnectionAck,
        EventType::Data,
        EventType::Complete,
    ];
    assert_eq!(kinds(&first_events), expected);
    assert_eq!(kinds(&second_events), expected);

    server.wait_finished(1).await;
    let start = &server.frames_of_type("subscribe")[0];
    assert_eq!(start["payload"]["query"], "subscription { tick }");
    client.close().await;
}

#[tokio::test]
async fn test_subscribe_and_wait() {
    let server = MockGraphQLServer::start(&[SubProtocol::GraphqlWs], |mut conn| async move {
        conn.handshake().await;
        let id = conn.expect_start().await;
        conn.send_data(&id, json!({"data": {"messageAdded": "hi"}})).await;
        conn.send_complete(&id).await;
        conn.drain().await;
    })
    .await;

    let client = GraphQLClient::builder()
        .endpoint(format!("http://{}/graphql", server.addr))
        .protocols(vec![SubProtocol::GraphqlWs])
        .schema(schema())
        .build()
        .unwrap();

    let (events, _, log) = event_log();
    let subscription = within(
        "subscribe",
        client.subscribe(
            &GraphQLRequest::new("subscription OnMessage($room: String) { messageAdded }"),
            SubscribeOptions::new()
                .overrides(RequestOverrides::new().variable("room", "general"))
                .on_data(log)
                .wait(true),
        ),
    )
    .await
    .unwrap();

    assert!(subscription.is_complete());
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data_value().unwrap()["messageAdded"], "hi");
    drop(events);

    server.wait_finished(1).await;
    let start = &server.frames_of_type("start")[0];
    assert_eq!(start["payload"]["variables"]["room"], "general");
}

#[tokio::test]
async fn test_invalid_subscription_never_connects() {
    let server = MockGraphQLServer::start(&SubProtocol::DEFAULT_PREFERENCE, |mut conn| async move {
        conn.drain().await;
    })
    .await;
    let client = client_for(format!("http://{}/graphql", server.addr));

    let result = client
        .subscribe(
            &GraphQLRequest::new("subscription { unknownField }"),
            SubscribeOptions::new(),
        )
        .await;

    match result {
        Err(GraphSocketError::Validation(errors)) => {
            assert!(errors.to_string().contains("unknownField"), "{}", errors)
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(server.connections(), 0);
    assert!(client.pool().is_empty());
}

#[tokio::test]
async fn test_post_query() {
    let http = MockHttpServer::start(200, json!({"data": {"pokemon": {"name": "Pikachu"}}})).await;
    let client = GraphQLClient::builder()
        .endpoint(http.url())
        .schema(schema())
        .header("X-Client", "tests")
        .build()
        .unwrap();

    let response = within(
        "post",
        client.post(
            &GraphQLRequest::new("query Find($name: String) { pokemon(name: $name) { name } }"),
            RequestOverrides::new().variable("name", "Pikachu"),
        ),
    )
    .await
    .unwrap();

    assert!(response.is_success());
    assert_eq!(response.data.as_ref().unwrap()["pokemon"]["name"], "Pikachu");

    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("POST /graphql"), "{}", requests[0]);
    assert!(requests[0].to_ascii_lowercase().contains("x-client: tests"));

    let body = request_body(&requests[0]);
    assert_eq!(body["variables"]["name"], "Pikachu");
    assert!(body["query"].as_str().unwrap().contains("pokemon"));
}

#[tokio::test]
async fn test_get_query() {
    let http = MockHttpServer::start(200, json!({"data": {"pokemons": []}})).await;
    let client = GraphQLClient::builder()
        .endpoint(http.url())
        .method(QueryMethod::Get)
        .schema(schema())
        .build()
        .unwrap();

    let response = within(
        "get",
        client.query(&GraphQLRequest::new("{ pokemons { name } }"), RequestOverrides::new()),
    )
    .await
    .unwrap();

    assert_eq!(response.data.unwrap()["pokemons"], json!([]));
    let requests = http.requests();
    assert!(requests[0].starts_with("GET /graphql?"), "{}", requests[0]);
    assert!(requests[0].contains("query="));
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let http = MockHttpServer::start(400, json!({"errors": [{"message": "bad request"}]})).await;
    let client = client_for(http.url());

    let result = within(
        "post",
        client.post(&GraphQLRequest::new("{ pokemons { name } }"), RequestOverrides::new()),
    )
    .await;

    match result {
        Err(GraphSocketError::Request { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body["errors"][0]["message"], "bad request");
        }
        other => panic!("expected request error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_introspection_is_cached_per_header_set() {
    let http = MockHttpServer::start(200, introspection()).await;
    let client = GraphQLClient::builder().endpoint(http.url()).build().unwrap();

    let anonymous = Headers::new();
    let mut authorized = Headers::new();
    authorized.insert("Authorization".into(), "Bearer t".into());

    let first = within("introspect", client.get_schema(false, &anonymous)).await.unwrap();
    let again = within("cached", client.get_schema(false, &anonymous)).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &again));
    assert_eq!(http.requests().len(), 1);

    within("other headers", client.get_schema(false, &authorized)).await.unwrap();
    assert_eq!(http.requests().len(), 2);

    within("refresh", client.get_schema(true, &anonymous)).await.unwrap();
    assert_eq!(http.requests().len(), 3);

    assert!(first.root_type(OperationKind::Subscription).unwrap().has_field("tick"));
    let bad = GraphQLRequest::new("subscription { tock }");
    assert!(client.validate(&bad, Some(&first), false).await.is_err());
}

#[tokio::test]
async fn test_validated_query_introspects_once() {
    let http = MockHttpServer::start(200, introspection()).await;
    let client = GraphQLClient::builder().endpoint(http.url()).build().unwrap();

    let request = GraphQLRequest::new("query { pokemon }");
    within("first query", client.query(&request, RequestOverrides::new()))
        .await
        .unwrap();
    within("second query", client.query(&request, RequestOverrides::new()))
        .await
        .unwrap();

    let bodies: Vec<Value> = http.requests().iter().map(|r| request_body(r)).collect();
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0]["query"].as_str().unwrap().contains("__schema"));
    assert_eq!(bodies[1]["query"], "query { pokemon }");
    assert_eq!(bodies[2]["query"], "query { pokemon }");
}

#[tokio::test]
async fn test_introspection_without_data_fails() {
    let http = MockHttpServer::start(200, json!({"data": null, "errors": [{"message": "introspection disabled"}]})).await;
    let client = GraphQLClient::builder().endpoint(http.url()).build().unwrap();

    match within("introspect", client.introspect(&Headers::new())).await {
        Err(GraphSocketError::Introspection(message)) => {
            assert!(message.contains("introspection disabled"), "{}", message)
        }
        other => panic!("expected introspection error, got {:?}", other),
    }
}
