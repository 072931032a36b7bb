//! 订单事件消费示例：内存事件源 + 路由 + 中间件 + 优雅关闭
//!
//! `RUST_LOG=debug cargo run -p demo` 可以看到每条事件的处理轨迹。
use cone::handler::{Chain, middleware};
use cone::{Consumer, ConsumerConfig, Event, HandlerMux, Response};
use cone_testing::MemorySource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: String,
    amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderCancelled {
    order_id: String,
    reason: String,
}

async fn on_placed(response: Response, event: Event) {
    match event.decode_json::<OrderPlaced>() {
        Ok(order) if order.amount > 0 => {
            info!(order_id = %order.order_id, amount = order.amount, "order placed");
        }
        Ok(order) => {
            warn!(order_id = %order.order_id, "rejecting order with non-positive amount");
            let _ = response.nak().await;
        }
        Err(err) => {
            warn!(error = %err, "malformed order payload");
            let _ = response.nak().await;
        }
    }
}

async fn on_cancelled(response: Response, event: Event) {
    match event.decode_json::<OrderCancelled>() {
        Ok(order) => {
            // 模拟较慢的下游调用，关闭时会等待它完成
            tokio::time::sleep(Duration::from_millis(200)).await;
            info!(order_id = %order.order_id, reason = %order.reason, "order cancelled");
            let _ = response.ack().await;
        }
        Err(err) => {
            warn!(error = %err, "malformed cancel payload");
            let _ = response.nak().await;
        }
    }
}

fn seed(source: &MemorySource) -> anyhow::Result<()> {
    let events = [
        Event::json(
            "orders.placed",
            &OrderPlaced {
                order_id: "o-1".into(),
                amount: 120,
            },
        )?,
        Event::json(
            "orders.placed",
            &OrderPlaced {
                order_id: "o-2".into(),
                amount: 0,
            },
        )?,
        Event::json(
            "orders.cancelled",
            &OrderCancelled {
                order_id: "o-1".into(),
                reason: "customer request".into(),
            },
        )?,
        Event::new("orders.audited", "{}")?,
        Event::new("users.created", "{}")?,
    ];

    for event in events {
        source.add_event(event);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let source = MemorySource::new();
    seed(&source)?;

    let mut mux = HandlerMux::new();
    mux.handle_fn("orders.placed", on_placed)?
        .handle_fn("orders.cancelled", on_cancelled)?
        .ignore("orders.audited")?;

    let handler = Chain::new(mux)
        .layer(middleware::filter_subjects(|subject: &str| {
            subject.starts_with("orders.")
        }))
        .layer(middleware::trace_events())
        .build();

    let consumer = Arc::new(
        Consumer::builder()
            .source(Arc::new(source.clone()))
            .handler(handler)
            .config(ConsumerConfig {
                idle_backoff: Duration::from_millis(20),
            })
            .build(),
    );

    let run = tokio::spawn({
        let consumer = consumer.clone();
        async move { consumer.run().await }
    });

    // 过滤掉的事件不会被应答，会一直留在队列里
    let drained = async {
        while source.num_acked() + source.num_naked() < 4 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };

    tokio::select! {
        _ = drained => info!("all routed events settled"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    consumer.shutdown_timeout(Duration::from_secs(5)).await?;
    match run.await? {
        Err(err) if err.is_stopped() => {}
        other => other?,
    }

    info!(
        acked = source.num_acked(),
        naked = source.num_naked(),
        unanswered = source.pending(),
        "consumer stopped"
    );
    Ok(())
}
