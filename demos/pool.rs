// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::HashSet;
use std::time::Duration;

use relay_pool::prelude::*;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter("info,relay_pool=trace")
        .init();

    let pool = RelayPool::new(RelayPoolOptions::default());
    let mut notifications = pool.notifications();

    let relay = RelayUrl::parse("wss://relay.damus.io")?;
    let relays: HashSet<RelayUrl> = [relay].into_iter().collect();

    let filters = vec![Filter::new().kinds(vec![3]).limit(1)];
    let sub_id = SubscriptionId::generate("demo");
    pool.subscribe(sub_id.clone(), filters, relays.clone(), None)?;

    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            if let RelayPoolNotification::Events { events, .. } = notification {
                for event in events {
                    println!("received event {:?}", event.id);
                }
            }
        }
    });

    let event: Event = serde_json::from_str(r#"{"content":"","created_at":1698412975,"id":"f55c30722f056e330d8a7a6a9ba1522f7522c0f1ced1c93d78ea833c78a3d6ec","kind":3,"pubkey":"f831caf722214748c72db4829986bd0cbb2bb8b3aeade1c959624a52a9629046","sig":"5092a9ffaecdae7d7794706f085ff5852befdf79df424cc3419bb797bf515ae05d4f19404cb8324b8b4380a4bd497763ac7b0f3b1b63ef4d3baa17e5f5901808","tags":[["p","4ddeb9109a8cd29ba279a637f5ec344f2479ee07df1f4043f3fe26d8948cfef9","",""]]}"#)?;
    let response = pool.publish(vec![event], relays).await?;
    println!(
        "publish response: {} relays accepted, {} relays rejected",
        response.accepted.len(),
        response.rejected.len()
    );

    tokio::time::sleep(Duration::from_secs(10)).await;

    pool.unsubscribe(sub_id)?;
    pool.dispose().await?;

    Ok(())
}
