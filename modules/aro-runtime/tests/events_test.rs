//! Event dispatch, observers, failure events and lifecycle through the
//! execution engine.

mod harness;

use std::time::Duration;

use aro_runtime::{
    AroStatement, EngineConfig, Expression, FeatureSet, Preposition, ResultDescriptor, Value,
    APPLICATION_END, APPLICATION_START, FEATURE_SET_FAILED,
};
use harness::{publish, stmt, Harness};
use serde_json::json;

fn emit(event_type: &str, source: Expression) -> AroStatement {
    stmt("Emit", event_type, Preposition::With, source)
}

fn throw(reason: &str) -> AroStatement {
    AroStatement::new(
        "Throw",
        ResultDescriptor::qualified(reason, "error"),
        Preposition::For,
        Expression::var("event"),
    )
}

// ---------------------------------------------------------------------------
// Guarded handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn only_handlers_whose_guards_match_run() {
    let h = Harness::new(vec![
        FeatureSet::new("Ship Order", "OrderUpdated Handler<status:shipped>")
            .with_statement(publish("shipped-tier", Expression::field("event", "tier"))),
        FeatureSet::new("Charge Order", "OrderUpdated Handler<status:paid>")
            .with_statement(publish("paid-tier", Expression::field("event", "tier"))),
    ]);

    let report = h
        .engine
        .publish(
            "OrderUpdated",
            Value::from(json!({"status": "shipped", "tier": "premium"})),
        )
        .await;

    assert_eq!(report.dispatched, 1);
    assert_eq!(h.symbol("shipped-tier"), Some(Value::from("premium")));
    assert_eq!(h.symbol("paid-tier"), None);
    assert!(h.journal.of_type(FEATURE_SET_FAILED).is_empty());
}

#[tokio::test]
async fn guards_fold_case_and_accept_any_listed_value() {
    let h = Harness::new(vec![FeatureSet::new(
        "Premium Fulfilment",
        "OrderUpdated Handler<status:paid,shipped;customer.tier:premium>",
    )
    .with_statement(publish("fulfilled", Expression::field("event", "id")))]);

    h.engine
        .publish(
            "OrderUpdated",
            Value::from(json!({"id": 1, "status": "PAID", "customer": {"tier": "Premium"}})),
        )
        .await;
    assert_eq!(h.symbol("fulfilled"), Some(Value::Int(1)));

    h.engine
        .publish(
            "OrderUpdated",
            Value::from(json!({"id": 2, "status": "paid", "customer": {}})),
        )
        .await;
    assert_eq!(h.symbol("fulfilled"), Some(Value::Int(1)));
}

#[tokio::test]
async fn handlers_get_independent_copies_of_the_payload() {
    let h = Harness::new(vec![
        FeatureSet::new("Rewrite", "OrderUpdated Handler")
            .with_statement(stmt(
                "Update",
                "event",
                Preposition::With,
                Expression::literal(Value::from(json!({"status": "rewritten"}))),
            ))
            .with_statement(publish("rewritten", Expression::field("event", "status"))),
        FeatureSet::new("Observe", "OrderUpdated Handler")
            .with_statement(publish("observed", Expression::field("event", "status"))),
    ]);

    h.engine
        .publish("OrderUpdated", Value::from(json!({"status": "paid"})))
        .await;

    assert_eq!(h.symbol("rewritten"), Some(Value::from("rewritten")));
    assert_eq!(h.symbol("observed"), Some(Value::from("paid")));
}

#[tokio::test]
async fn runtime_subscriptions_use_guard_expressions() {
    let h = Harness::new(vec![FeatureSet::new("Escalate", "Support")
        .with_statement(publish("escalated", Expression::field("event", "ticket")))]);

    h.engine
        .subscribe("TicketOpened", "priority:high", "Escalate")
        .unwrap();
    assert!(h.engine.subscribe("TicketOpened", "", "Nobody").is_err());
    assert!(h.engine.subscribe("TicketOpened", "priority", "Escalate").is_err());

    h.engine
        .publish("TicketOpened", Value::from(json!({"priority": "low", "ticket": 1})))
        .await;
    assert_eq!(h.symbol("escalated"), None);

    h.engine
        .publish("TicketOpened", Value::from(json!({"priority": "HIGH", "ticket": 2})))
        .await;
    assert_eq!(h.symbol("escalated"), Some(Value::Int(2)));
}

// ---------------------------------------------------------------------------
// Derived emissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn emitted_events_reach_their_handlers_with_a_causal_link() {
    let h = Harness::new(vec![
        FeatureSet::new("Confirm", "OrderPlaced Handler")
            .with_statement(emit("OrderConfirmed", Expression::var("event"))),
        FeatureSet::new("Notify", "OrderConfirmed Handler")
            .with_statement(publish("confirmed", Expression::field("event", "id"))),
    ]);

    let report = h
        .engine
        .publish("OrderPlaced", Value::from(json!({"id": "o-7"})))
        .await;

    assert_eq!(report.dispatched, 2);
    assert_eq!(h.symbol("confirmed"), Some(Value::from("o-7")));

    let placed = &h.journal.of_type("OrderPlaced")[0];
    let confirmed = &h.journal.of_type("OrderConfirmed")[0];
    assert_eq!(confirmed.caused_by, Some(placed.id));
}

#[tokio::test]
async fn runaway_cascades_are_cut_off() {
    let config = EngineConfig {
        max_cascade: 5,
        ..EngineConfig::default()
    };
    let h = Harness::try_build(
        vec![FeatureSet::new("Echo", "Ping Handler")
            .with_statement(emit("Ping", Expression::var("event")))],
        None,
        config,
    )
    .unwrap();

    let report = h.engine.publish("Ping", Value::Null).await;

    assert_eq!(report.dispatched, 6);
    assert_eq!(report.dropped, 1);
    assert_eq!(h.journal.of_type("Ping").len(), 6);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handler_failures_publish_one_failure_event() {
    let h = Harness::new(vec![
        FeatureSet::new("Charge Card", "PaymentRequested Handler")
            .with_statement(throw("Declined")),
        FeatureSet::new("Record Payment", "PaymentRequested Handler")
            .with_statement(publish("recorded", Expression::field("event", "amount"))),
        FeatureSet::new("Failure Monitor", "FeatureSetFailed Handler").with_statement(publish(
            "failed-feature-set",
            Expression::field("event", "featureSet"),
        )),
        FeatureSet::new("Broken Monitor", "FeatureSetFailed Handler").with_statement(throw("Oops")),
    ]);

    h.engine
        .publish("PaymentRequested", Value::from(json!({"amount": 12})))
        .await;

    // The sibling handler is unaffected.
    assert_eq!(h.symbol("recorded"), Some(Value::Int(12)));
    assert_eq!(h.symbol("failed-feature-set"), Some(Value::from("Charge Card")));

    let failures = h.journal.of_type(FEATURE_SET_FAILED);
    assert_eq!(failures.len(), 1);
    let payload = &failures[0].payload;
    assert_eq!(payload.field("triggerKind"), Some(&Value::from("event")));
    assert_eq!(payload.field("eventType"), Some(&Value::from("PaymentRequested")));
    assert!(payload
        .field("error")
        .and_then(Value::as_str)
        .is_some_and(|e| e.contains("Declined")));

    let requested = &h.journal.of_type("PaymentRequested")[0];
    assert_eq!(failures[0].caused_by, Some(requested.id));
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repository_observers_see_stores() {
    let h = Harness::new(vec![
        FeatureSet::new("registerUser", "User API")
            .with_statement(stmt(
                "Create",
                "user",
                Preposition::With,
                Expression::literal(Value::from(json!({"name": "Ada"}))),
            ))
            .with_statement(stmt(
                "Store",
                "user",
                Preposition::Into,
                Expression::var("user-repository"),
            )),
        FeatureSet::new("Audit Users", "user-repository Observer")
            .with_statement(publish("change", Expression::field("event", "changeType")))
            .with_statement(publish(
                "stored-name",
                Expression::field("event", "newValue.name"),
            )),
        FeatureSet::new("Audit Orders", "order-repository Observer")
            .with_statement(publish("order-change", Expression::field("event", "changeType"))),
    ]);

    let run = h.engine.invoke("registerUser", Value::Null).await.unwrap();
    assert!(run.result.is_ok());

    assert_eq!(h.symbol("change"), Some(Value::from("created")));
    assert_eq!(h.symbol("stored-name"), Some(Value::from("Ada")));
    assert_eq!(h.symbol("order-change"), None);
}

#[tokio::test]
async fn state_observers_filter_on_transition() {
    let h = Harness::new(vec![
        FeatureSet::new("placeOrder", "Order API")
            .with_statement(stmt(
                "Create",
                "order",
                Preposition::With,
                Expression::var("input"),
            ))
            .with_statement(AroStatement::new(
                "Accept",
                ResultDescriptor::qualified("transition", "draft_to_placed"),
                Preposition::On,
                Expression::field("order", "status"),
            )),
        FeatureSet::new("On Placed", "status StateObserver<draft_to_placed>")
            .with_statement(publish("placed", Expression::field("entity", "id"))),
        FeatureSet::new("On Any Status", "status StateObserver")
            .with_statement(publish("to-state", Expression::field("transition", "toState"))),
        FeatureSet::new("On Shipped", "status StateObserver<placed_to_shipped>")
            .with_statement(publish("shipped", Expression::field("entity", "id"))),
    ]);

    h.engine
        .invoke("placeOrder", Value::from(json!({"id": "o1", "status": "draft"})))
        .await
        .unwrap();

    assert_eq!(h.symbol("placed"), Some(Value::from("o1")));
    assert_eq!(h.symbol("to-state"), Some(Value::from("placed")));
    assert_eq!(h.symbol("shipped"), None);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_feature_sets_run_on_start_and_end() {
    let h = Harness::new(vec![
        FeatureSet::new(APPLICATION_START, "Greeting API")
            .with_statement(stmt(
                "Start",
                "http-server",
                Preposition::With,
                Expression::literal("contract"),
            ))
            .with_statement(publish(
                "app-config",
                Expression::literal(Value::from(json!({"greeting": "hi"}))),
            )),
        FeatureSet::new("greet", "Greeting API")
            .with_statement(stmt(
                "Extract",
                "greeting",
                Preposition::From,
                Expression::field("app-config", "greeting"),
            ))
            .with_statement(harness::ok(Expression::var("greeting"))),
        FeatureSet::new(APPLICATION_END, "Success")
            .with_statement(publish("ended", Expression::literal("success"))),
        FeatureSet::new(APPLICATION_END, "Error")
            .with_statement(publish("ended", Expression::literal("error"))),
    ]);

    h.engine.start().await.unwrap();
    let lifecycle = &h.engine.services().lifecycle;
    assert_eq!(lifecycle.running_servers(), vec!["http-server"]);

    // Published symbols are visible to every feature set.
    let run = h.engine.invoke("greet", Value::Null).await.unwrap();
    assert_eq!(run.result.unwrap().unwrap().body, Value::from("hi"));

    h.engine.shutdown(true).await.unwrap();
    assert!(lifecycle.is_shutting_down());
    assert_eq!(h.symbol("ended"), Some(Value::from("success")));
}

#[tokio::test]
async fn keepalive_holds_start_until_shutdown() {
    let h = Harness::new(vec![FeatureSet::new(APPLICATION_START, "Daemon")
        .with_statement(publish("started", Expression::literal(true)))
        .with_statement(stmt(
            "Keepalive",
            "application",
            Preposition::For,
            Expression::literal("events"),
        ))
        .with_statement(publish("released", Expression::literal(true)))]);

    let engine = h.engine.clone();
    let running = tokio::spawn(async move { engine.start().await });

    for _ in 0..200 {
        if h.symbol("started").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.symbol("started"), Some(Value::Bool(true)));
    assert_eq!(h.symbol("released"), None);

    h.engine.shutdown(true).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(h.symbol("released"), Some(Value::Bool(true)));
}
