use cone::handler::{Chain, middleware};
use cone::{ConeError, Event, Handler, HandlerMux, Response, ResponseState, handler_fn};
use cone_testing::{Outcome, ResponseRecorder, event};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn every_unregistered_subject_is_naked() {
    let mut mux = HandlerMux::new();
    mux.ignore("known").unwrap();

    for subject in ["a", "b.c", "known.child", "KNOWN"] {
        let recorder = ResponseRecorder::new();
        mux.serve(recorder.response(), event(subject, "")).await;
        assert_eq!(recorder.result(), Some(Outcome::Nak), "subject {subject}");
        assert_eq!(recorder.calls(), 1);
    }
}

#[tokio::test]
async fn tolerant_mux_acks_unregistered_subjects() {
    let mut mux = HandlerMux::new();
    mux.ack_unknown_subjects(true);

    let recorder = ResponseRecorder::new();
    mux.serve(recorder.response(), event("not.wanted", "")).await;
    assert_eq!(recorder.result(), Some(Outcome::Ack));
}

#[tokio::test]
async fn handler_ack_and_default_ack_produce_single_action() {
    let mut mux = HandlerMux::new();
    mux.handle_fn("is.wanted", |r: Response, _e: Event| async move {
        r.ack().await.unwrap();
        r.ack().await.unwrap();
    })
    .unwrap();

    let recorder = ResponseRecorder::new();
    mux.serve(recorder.response(), event("is.wanted", "")).await;

    assert_eq!(recorder.result(), Some(Outcome::Ack));
    assert_eq!(recorder.calls(), 1);
}

#[tokio::test]
async fn failed_ack_is_not_retried_as_nak() {
    let mut mux = HandlerMux::new();
    mux.ignore("is.wanted").unwrap();

    let recorder = ResponseRecorder::failing("connection reset");
    let response = recorder.response();
    mux.serve(response.clone(), event("is.wanted", "")).await;

    assert_eq!(recorder.calls(), 1);
    assert_eq!(recorder.result(), Some(Outcome::Ack));
    assert!(response.failed());
}

#[tokio::test]
async fn most_recent_registration_is_invoked() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut mux = HandlerMux::new();
    for name in ["first", "second", "third"] {
        let seen = seen.clone();
        mux.handle(
            "event.subject",
            handler_fn(move |_r, _e| {
                let seen = seen.clone();
                async move { seen.lock().unwrap().push(name) }
            }),
        )
        .unwrap();
    }

    mux.serve(ResponseRecorder::new().response(), event("event.subject", ""))
        .await;
    assert_eq!(*seen.lock().unwrap(), vec!["third"]);
}

#[test]
fn empty_subject_registration_fails_fast() {
    let mut mux = HandlerMux::new();
    mux.ignore("event.subject").unwrap();

    let err = mux.handle("", HandlerMux::new()).unwrap_err();
    assert!(matches!(err, ConeError::EmptySubject));
    assert!(mux.contains("event.subject"));
    assert_eq!(mux.subjects().count(), 1);
}

#[tokio::test]
async fn nested_mux_routes_through_middleware() -> anyhow::Result<()> {
    let mut orders = HandlerMux::new();
    orders
        .handle_fn("orders.placed", |r: Response, e: Event| async move {
            #[derive(serde::Deserialize)]
            struct Placed {
                amount: i64,
            }
            match e.decode_json::<Placed>() {
                Ok(placed) if placed.amount > 0 => {
                    let _ = r.ack().await;
                }
                _ => {
                    let _ = r.nak().await;
                }
            }
        })?;

    let handler = Chain::new(orders)
        .layer(middleware::filter_subjects(|s: &str| s.starts_with("orders.")))
        .layer(middleware::trace_events())
        .build();

    let good = ResponseRecorder::new();
    let event = Event::json("orders.placed", &serde_json::json!({ "amount": 5 }))?;
    handler.serve(good.response(), event).await;
    assert_eq!(good.result(), Some(Outcome::Ack));

    let bad = ResponseRecorder::new();
    let event = Event::json("orders.placed", &serde_json::json!({ "amount": -1 }))?;
    handler.serve(bad.response(), event).await;
    assert_eq!(bad.result(), Some(Outcome::Nak));

    let filtered = ResponseRecorder::new();
    let response = filtered.response();
    handler
        .serve(response.clone(), cone_testing::event("users.created", ""))
        .await;
    assert_eq!(filtered.calls(), 0);
    assert_eq!(response.state(), ResponseState::Pending);
    Ok(())
}
