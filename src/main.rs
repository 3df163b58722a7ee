//! Meta Batch demo
//!
//! Runs the batch machinery against a seeded in-memory node: indexes pool
//! members, subscribes metadata for one pool, applies a live identity
//! change, then switches network and shows everything being dropped.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use meta_batch::facet::standard::{identity_of_query, pool_members_query, super_of_query};
use meta_batch::utils::init_logging;
use meta_batch::{
    pool_member_facets, AccountNetwork, BatchController, BatchKey, ConnectionState, EventBus, InMemoryClient, InvalidationWatcher,
    MetaConfig, NetworkId, PoolMembers, RemoteQueryClient,
};

const CONFIG_FILE: &str = "meta_batch.yaml";
const SETTLE: Duration = Duration::from_millis(50);

fn seed(client: &InMemoryClient) {
    client.insert_all(
        &pool_members_query(),
        vec![
            ("X", json!({"poolId": 1, "points": "1,000"})),
            ("Y", json!({"poolId": 1, "points": "250"})),
            ("Z", json!({"poolId": 1, "points": 75})),
            ("W", json!({"poolId": 2, "points": 10})),
        ],
    );
    client.insert_all(
        &identity_of_query(),
        vec![
            ("Y", json!({"info": {"display": {"Raw": "Bob"}}, "judgements": [[0, "Reasonable"]]})),
            ("PA", json!({"info": {"display": {"Raw": "Alice"}}})),
        ],
    );
    client.insert(&super_of_query(), "X", json!(["PA", {"Raw": "alice-stash"}]));
}

async fn print_batch(controller: &BatchController, key: &BatchKey) -> Result<()> {
    match controller.get_batch(key).await {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("(no record for '{}')", key),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config = MetaConfig::load(CONFIG_FILE).await?.apply_env()?;
    init_logging(&config.log_filter);

    println!("\n{}", "═".repeat(60));
    println!("📦 Meta Batch v{}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", "═".repeat(60));

    let node = Arc::new(InMemoryClient::new());
    seed(&node);
    let client: Arc<dyn RemoteQueryClient> = node.clone();

    let bus = Arc::new(EventBus::new(config.event_bus_capacity));
    let connection = ConnectionState::new(NetworkId::new("polkadot"), bus.clone());
    let controller = Arc::new(
        BatchController::new(client.clone(), pool_member_facets(client.clone(), &config))
            .with_subscribe_timeout(config.subscribe_timeout()),
    );
    let members = Arc::new(PoolMembers::new());

    let watcher = InvalidationWatcher::new(controller.clone(), members.clone(), client.clone())
        .with_network(NetworkId::new("polkadot"))
        .spawn(bus.subscribe());

    let indexed = members.fetch_all(client.as_ref()).await?;
    println!("👥 Indexed {} pool members", indexed);

    let key = BatchKey::new("poolA");
    let addresses = members.members_of_pool(1).await;
    let outcome = controller.ensure_batch(key.clone(), addresses, false).await;
    info!("ensure_batch: {:?}", outcome);
    tokio::time::sleep(SETTLE).await;
    println!("\n🔎 Initial record:");
    print_batch(&controller, &key).await?;

    node.insert(&identity_of_query(), "Z", json!({"info": {"display": {"Raw": "Zed"}}}));
    tokio::time::sleep(SETTLE).await;
    println!("\n✏️  After identity update for Z:");
    print_batch(&controller, &key).await?;

    connection.connect_to_account("X");
    connection.switch_network(NetworkId::new("kusama"));
    tokio::time::sleep(SETTLE).await;
    println!("\n🌐 After switching to {}:", connection.current_network_id());
    print_batch(&controller, &key).await?;
    println!("Live remote subscriptions: {}", node.active_subscriptions());
    println!("Indexed pool members: {}", members.len().await);

    watcher.abort();
    Ok(())
}
