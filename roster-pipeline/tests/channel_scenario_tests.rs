use std::sync::Arc;
use std::time::Duration;

use roster_core::{ErrorKind, Source, UsersPayload};
use roster_fetch::{RetryPolicy, RetryingFetcher};
use roster_pipeline::{
    ChannelConfig, Engine, ReplyMessage, RequestMessage, RequestPipeline, TaskKind,
};
use roster_storage::{CacheStore, CachedEnvelope};
use roster_test_utils::assertions::{assert_failure, assert_success};
use roster_test_utils::{
    fixtures, tokens, InstrumentedCacheStore, JwtClaimsDecoder, ScriptedTransport, Step,
};

fn engine(cache: Arc<InstrumentedCacheStore>, transport: Arc<ScriptedTransport>) -> Engine {
    let pipeline = RequestPipeline::new(
        cache,
        RetryingFetcher::new(transport, RetryPolicy::immediate()),
        Arc::new(JwtClaimsDecoder::new()),
    );
    Engine::new(fixtures::BASE_URL, pipeline, ChannelConfig::default())
}

fn users_message() -> RequestMessage {
    RequestMessage::get(fixtures::users_key().as_str(), "users", "caller")
}

fn usernames(payload: &UsersPayload) -> Vec<String> {
    payload.data.iter().map(|u| u.username.clone()).collect()
}

#[tokio::test]
async fn users_arrangement_shapes_reply_not_cache() {
    let cache = InstrumentedCacheStore::new();
    let transport = ScriptedTransport::with_steps([Step::Respond(fixtures::users_response(
        &tokens::mint("alice"),
    ))]);
    let engine = engine(cache.clone(), transport.clone());
    let mut channel = engine.users_channel();

    channel
        .submit(users_message().arrange_by("username", "ascending"))
        .await
        .unwrap();
    let reply = channel.recv().await.unwrap();
    assert_eq!(reply.task, TaskKind::UsersFetch);
    let sorted = assert_success(reply.outcome, Source::Network);
    assert_eq!(usernames(&sorted), ["alice", "bob", "carol"]);

    let (_, body) = cache.written().pop().expect("users cached");
    let cached: UsersPayload = serde_json::from_value(body).unwrap();
    assert_eq!(usernames(&cached), ["carol", "alice", "bob"]);

    channel
        .submit(users_message().arrange_by("createdAt", "descending"))
        .await
        .unwrap();
    let reply = channel.recv().await.unwrap();
    let by_created = assert_success(reply.outcome, Source::Cache);
    assert_eq!(usernames(&by_created), ["carol", "bob", "alice"]);

    channel.submit(users_message()).await.unwrap();
    let reply = channel.recv().await.unwrap();
    let unsorted = assert_success(reply.outcome, Source::Cache);
    assert_eq!(usernames(&unsorted), ["carol", "alice", "bob"]);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn unknown_sort_field_is_rejected() {
    let cache = InstrumentedCacheStore::new();
    let engine = engine(cache.clone(), ScriptedTransport::new());
    let mut channel = engine.users_channel();

    channel
        .submit(users_message().arrange_by("password", "ascending"))
        .await
        .unwrap();
    let reply = channel.recv().await.unwrap();
    let message = assert_failure(reply.outcome, ErrorKind::InvariantError);
    assert!(message.contains("password"));
    assert_eq!(cache.reads(), 0);
}

#[tokio::test]
async fn network_claims_are_delivered_with_payload() {
    let token = tokens::TestToken::new("dana")
        .roles(&["Manager", "Admin"])
        .mint();
    let transport =
        ScriptedTransport::with_steps([Step::Respond(fixtures::users_response(&token))]);
    let engine = engine(InstrumentedCacheStore::new(), transport.clone());
    let mut channel = engine.users_channel();

    channel.submit(users_message()).await.unwrap();
    let reply = channel.recv().await.unwrap();
    let success = reply.outcome.into_result().unwrap();
    let claims = success.decoded_token.expect("claims from network");
    assert_eq!(claims.username, "dana");
    assert!(claims.roles.contains("Admin"));
    assert_eq!(success.source, Source::Network);

    let request = transport.requests().pop().unwrap();
    assert_eq!(request.url, fixtures::users_key().as_str());
}

#[tokio::test]
async fn reply_serializes_to_wire_shape() {
    let transport = ScriptedTransport::with_steps([Step::Respond(fixtures::users_response(
        &tokens::mint("alice"),
    ))]);
    let engine = engine(InstrumentedCacheStore::new(), transport);
    let mut channel = engine.users_channel();

    let id = channel.submit(users_message()).await.unwrap();
    let reply = channel.recv().await.unwrap();
    let wire = serde_json::to_value(&reply).unwrap();
    assert_eq!(wire["requestId"], serde_json::json!(id.to_string()));
    assert_eq!(wire["task"], "usersFetch");

    let back: ReplyMessage<UsersPayload> = serde_json::from_value(wire).unwrap();
    assert_eq!(back.request_id, id);
    assert_eq!(back.outcome.source(), Some(Source::Network));
}

#[tokio::test(start_paused = true)]
async fn terminate_discards_reply_but_in_flight_run_completes() {
    let cache = InstrumentedCacheStore::new();
    let transport = ScriptedTransport::with_steps([
        Step::Respond(fixtures::users_response(&tokens::mint("alice"))),
        Step::Respond(fixtures::users_response(&tokens::mint("bob"))),
    ]);
    transport.set_delay(Duration::from_secs(1));
    let engine = engine(cache.clone(), transport.clone());
    let mut channel = engine.users_channel();

    channel.submit(users_message()).await.unwrap();
    channel
        .submit(RequestMessage::get(
            roster_core::UsersQuery::new(fixtures::BASE_URL, 50)
                .cache_key()
                .unwrap()
                .as_str(),
            "users",
            "caller",
        ))
        .await
        .unwrap();
    while transport.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    channel.terminate();
    assert!(channel.recv().await.is_none());
    channel.shutdown().await;

    // The in-flight fetch still wrote its result; the queued one never ran.
    assert_eq!(transport.calls(), 1);
    assert_eq!(cache.writes(), 1);
    let (key, body) = cache.written().pop().unwrap();
    assert_eq!(key, fixtures::users_key());
    let envelope: CachedEnvelope<UsersPayload> = CachedEnvelope::from_entry(
        cache
            .get(&key)
            .await
            .unwrap()
            .unwrap(),
    );
    assert_eq!(envelope.open(&key).unwrap(), fixtures::users_payload());
    assert!(body.get("accessToken").is_none());
}

#[tokio::test]
async fn dropping_one_channel_leaves_siblings_serving() {
    let transport = ScriptedTransport::with_steps([Step::Respond(
        fixtures::directory_response(&tokens::mint("alice")),
    )]);
    let engine = engine(InstrumentedCacheStore::new(), transport.clone());
    let dropped = engine.directory_channel();
    let mut sibling = engine.directory_channel();
    drop(dropped);

    sibling
        .submit(RequestMessage::get(
            fixtures::directory_key().as_str(),
            "directory",
            "caller",
        ))
        .await
        .unwrap();
    let reply = sibling.recv().await.unwrap();
    assert_success(reply.outcome, Source::Network);
    assert_eq!(transport.calls(), 1);
}
