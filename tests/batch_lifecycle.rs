//! Batch Lifecycle Suite
//!
//! End-to-end behaviour of the controller over the in-memory node:
//! subscription reuse, refetch, dependent resolution, and teardown.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use meta_batch::facet::standard::{identities, identity_of_query, members, pool_members_query, super_identities, super_of_query};
use meta_batch::facet::{Identity, PoolMembership};
use meta_batch::{
    pool_member_facets, Address, BatchController, BatchKey, BatchRecord, ConnectionState, EnsureOutcome, EventBus,
    FacetValue, InMemoryClient, InvalidationWatcher, MetaConfig, NetworkId, PoolMembers, RemoteQueryClient,
};

fn controller(node: &Arc<InMemoryClient>) -> Arc<BatchController> {
    let client: Arc<dyn RemoteQueryClient> = node.clone();
    Arc::new(BatchController::new(client.clone(), pool_member_facets(client, &MetaConfig::default())))
}

fn xyz() -> Vec<Address> {
    vec!["X".into(), "Y".into(), "Z".into()]
}

fn seed_members(node: &InMemoryClient) {
    node.insert_all(
        &pool_members_query(),
        vec![
            ("X", json!({"poolId": 1, "points": 100})),
            ("Y", json!({"poolId": 1, "points": 200})),
            ("Z", json!({"poolId": 1, "points": 300})),
        ],
    );
}

/// Poll until the record for `key` satisfies `ready`
async fn wait_for<P>(controller: &BatchController, key: &BatchKey, ready: P) -> Option<BatchRecord>
where
    P: Fn(&BatchRecord) -> bool,
{
    for _ in 0..200 {
        if let Some(record) = controller.get_batch(key).await {
            if ready(&record) {
                return Some(record);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test]
async fn test_merged_record_keeps_positions() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    seed_members(&node);
    node.insert(&identity_of_query(), "Y", json!({"info": {"display": {"Raw": "Bob"}}}));
    let controller = controller(&node);
    let key = BatchKey::new("poolA");

    controller.ensure_batch(key.clone(), xyz(), false).await;
    let record = wait_for(&controller, &key, |r| r.has_delivered(&members()) && r.has_delivered(&identities()))
        .await
        .ok_or_else(|| anyhow::anyhow!("facets never delivered"))?;

    assert_eq!(record.addresses, xyz());
    assert_eq!(
        record.facet(&identities()).cloned(),
        Some(vec![None, Some(FacetValue::Identity(Identity::with_display("Bob"))), None])
    );
    assert_eq!(
        record.value_for(&members(), &"Z".into()),
        Some(&FacetValue::Member(PoolMembership { pool_id: 1, points: 300, last_recorded_reward_counter: None }))
    );
    Ok(())
}

#[tokio::test]
async fn test_live_update_replaces_facet() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    let controller = controller(&node);
    let key = BatchKey::new("poolA");
    controller.ensure_batch(key.clone(), xyz(), false).await;
    wait_for(&controller, &key, |r| r.has_delivered(&identities())).await;

    node.insert(&identity_of_query(), "X", json!({"info": {"display": "Xavier"}}));
    let record = wait_for(&controller, &key, |r| r.value_for(&identities(), &"X".into()).is_some()).await;

    let record = record.ok_or_else(|| anyhow::anyhow!("update never applied"))?;
    assert_eq!(
        record.facet_or_empty(&identities()),
        vec![Some(FacetValue::Identity(Identity::with_display("Xavier"))), None, None]
    );
    Ok(())
}

#[tokio::test]
async fn test_ensure_is_idempotent() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    let controller = controller(&node);

    assert!(matches!(controller.ensure_batch("poolA", xyz(), false).await, EnsureOutcome::Subscribed { handles: 3, .. }));
    assert_eq!(controller.ensure_batch("poolA", xyz(), false).await, EnsureOutcome::AlreadyPresent);
    assert_eq!(controller.ensure_batch("poolA", vec!["Q".into()], false).await, EnsureOutcome::AlreadyPresent);

    assert_eq!(node.subscribe_calls(&pool_members_query()).len(), 1);
    assert_eq!(controller.addresses_in(&"poolA".into()).await, xyz());
    Ok(())
}

#[tokio::test]
async fn test_forced_refetch_replaces_subscriptions() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    let controller = controller(&node);
    let key = BatchKey::new("poolA");

    controller.ensure_batch(key.clone(), xyz(), false).await;
    let first_epoch = controller.get_batch(&key).await.map(|r| r.epoch);

    let outcome = controller.ensure_batch(key.clone(), vec!["X".into(), "W".into()], true).await;
    assert_eq!(outcome, EnsureOutcome::Subscribed { handles: 3, failed: vec![] });
    assert_eq!(controller.live_handles(&key).await, 3);
    assert_eq!(node.active_subscriptions(), 3);
    assert_eq!(node.subscribe_calls(&super_of_query()).len(), 2);

    let record = controller.get_batch(&key).await.ok_or_else(|| anyhow::anyhow!("record missing"))?;
    assert_ne!(Some(record.epoch), first_epoch);
    assert_eq!(record.addresses, vec![Address::from("X"), Address::from("W")]);

    // Writes tagged with the superseded epoch are refused
    let stale = first_epoch.ok_or_else(|| anyhow::anyhow!("no first epoch"))?;
    assert!(!controller.store().apply(&key, stale, &identities(), vec![None, None]).await);
    Ok(())
}

#[tokio::test]
async fn test_dependent_facet_resolves_parents() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    node.insert(&super_of_query(), "A", json!(["PA", {"Raw": "a-sub"}]));
    node.insert(&super_of_query(), "B", json!(["PB", {"Raw": "b-sub"}]));
    node.insert(&identity_of_query(), "PA", json!({"info": {"display": {"Raw": "Alice"}}}));
    node.insert(&identity_of_query(), "PB", json!({"info": {"display": {"Raw": "Paul"}}}));
    let controller = controller(&node);
    let key = BatchKey::new("poolB");

    controller.ensure_batch(key.clone(), vec!["A".into(), "N".into(), "B".into()], false).await;
    let record = wait_for(&controller, &key, |r| {
        r.facet_or_empty(&super_identities()).iter().flatten().all(FacetValue::has_nested)
            && r.has_delivered(&super_identities())
    })
    .await
    .ok_or_else(|| anyhow::anyhow!("dependent facet never resolved"))?;

    let values = record.facet_or_empty(&super_identities());
    assert_eq!(values.len(), 3);
    assert!(values[1].is_none());
    match &values[0] {
        Some(FacetValue::SubIdentity(sub)) => {
            assert_eq!(sub.parent, Address::from("PA"));
            assert_eq!(sub.sub_name.as_deref(), Some("a-sub"));
            assert_eq!(sub.identity, Some(Identity::with_display("Alice")));
        }
        other => panic!("unexpected value {:?}", other),
    }
    match &values[2] {
        Some(FacetValue::SubIdentity(sub)) => assert_eq!(sub.identity, Some(Identity::with_display("Paul"))),
        other => panic!("unexpected value {:?}", other),
    }

    // Stage two looked up only the referenced parents and closed afterwards
    assert!(node.subscribe_calls(&identity_of_query()).contains(&vec![Address::from("PA"), Address::from("PB")]));
    assert_eq!(node.active_for(&identity_of_query()), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_batch_stays_silent() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    seed_members(&node);
    let controller = controller(&node);
    let key = BatchKey::new("poolA");
    controller.ensure_batch(key.clone(), xyz(), false).await;
    wait_for(&controller, &key, |r| r.has_delivered(&members())).await;

    assert_eq!(controller.cancel_and_clear(&key).await, 3);
    node.insert(&identity_of_query(), "Y", json!({"info": {"display": "Late"}}));
    node.insert(&pool_members_query(), "X", json!({"poolId": 7, "points": 1}));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(controller.get_batch(&key).await.is_none());
    assert!(controller.store().is_empty().await);
    assert_eq!(node.active_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_misaligned_snapshots_keep_positions() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    let controller = controller(&node);
    let key = BatchKey::new("poolA");
    controller.ensure_batch(key.clone(), xyz(), false).await;
    wait_for(&controller, &key, |r| r.has_delivered(&identities())).await;

    let short = Identity::with_display("Short");
    node.push_raw(&identity_of_query(), vec![Some(json!({"info": {"display": "Short"}}))]);
    let record = wait_for(&controller, &key, |r| {
        r.value_for(&identities(), &"X".into()) == Some(&FacetValue::Identity(short.clone()))
    })
    .await
    .ok_or_else(|| anyhow::anyhow!("short snapshot never applied"))?;
    assert_eq!(record.facet_or_empty(&identities()).len(), 3);

    node.push_raw(
        &identity_of_query(),
        vec![
            None,
            None,
            Some(json!({"info": {"display": "Zed"}})),
            Some(json!({"info": {"display": "Overflow"}})),
        ],
    );
    let record = wait_for(&controller, &key, |r| r.value_for(&identities(), &"Z".into()).is_some())
        .await
        .ok_or_else(|| anyhow::anyhow!("long snapshot never applied"))?;
    assert_eq!(
        record.facet_or_empty(&identities()),
        vec![None, None, Some(FacetValue::Identity(Identity::with_display("Zed")))]
    );
    Ok(())
}

/// Wait until no consumer is reading `identity.identityOf` feeds
async fn wait_for_closed_feeds(node: &InMemoryClient) {
    for _ in 0..200 {
        if node.open_feeds(&identity_of_query()) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_update_in_flight_after_removal_is_dropped() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    let controller = controller(&node);
    let key = BatchKey::new("poolA");
    controller.ensure_batch(key.clone(), xyz(), false).await;
    wait_for(&controller, &key, |r| r.has_delivered(&identities())).await;
    assert_eq!(node.open_feeds(&identity_of_query()), 1);

    // Record gone while the remote subscriptions still deliver
    controller.store().remove(&key).await;
    node.insert(&identity_of_query(), "Y", json!({"info": {"display": "Late"}}));
    wait_for_closed_feeds(&node).await;

    assert!(controller.get_batch(&key).await.is_none());
    assert_eq!(node.open_feeds(&identity_of_query()), 0);
    assert_eq!(node.active_for(&identity_of_query()), 1);

    assert_eq!(controller.cancel_and_clear(&key).await, 3);
    assert_eq!(node.active_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_update_from_superseded_epoch_is_dropped() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    let controller = controller(&node);
    let key = BatchKey::new("poolA");
    controller.ensure_batch(key.clone(), xyz(), false).await;
    wait_for(&controller, &key, |r| r.has_delivered(&identities())).await;

    // A newer epoch owns the key while the old feeds are still live
    let fresh = controller.store().begin(&key, xyz(), &[identities()]).await;
    node.insert(&identity_of_query(), "Y", json!({"info": {"display": "Stale"}}));
    wait_for_closed_feeds(&node).await;

    let record = controller.get_batch(&key).await.ok_or_else(|| anyhow::anyhow!("record missing"))?;
    assert_eq!(record.epoch, fresh);
    assert!(!record.has_delivered(&identities()));
    assert_eq!(record.facet(&identities()), Some(&vec![None, None, None]));
    assert_eq!(node.open_feeds(&identity_of_query()), 0);

    controller.cancel_and_clear(&key).await;
    Ok(())
}

#[tokio::test]
async fn test_stalled_subscription_fails_only_its_facet() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    node.stall(&pool_members_query(), true);
    let client: Arc<dyn RemoteQueryClient> = node.clone();
    let controller = Arc::new(
        BatchController::new(client.clone(), pool_member_facets(client, &MetaConfig::default()))
            .with_subscribe_timeout(Duration::from_millis(50)),
    );
    let key = BatchKey::new("poolA");

    let outcome = controller.ensure_batch(key.clone(), xyz(), false).await;
    assert_eq!(outcome, EnsureOutcome::Subscribed { handles: 2, failed: vec![members()] });

    let record = controller.get_batch(&key).await.ok_or_else(|| anyhow::anyhow!("record missing"))?;
    assert_eq!(record.facet(&members()), Some(&vec![None, None, None]));
    assert!(!record.has_delivered(&members()));

    tokio::time::timeout(Duration::from_secs(1), controller.reset_all()).await?;
    assert!(controller.store().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_reset_all_clears_every_batch() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    let controller = controller(&node);
    for key in ["poolA", "poolB", "poolC"] {
        controller.ensure_batch(key, xyz(), false).await;
    }
    assert_eq!(controller.registry().total().await, 9);

    controller.reset_all().await;
    assert!(controller.store().is_empty().await);
    assert!(controller.registry().is_empty().await);
    assert_eq!(node.active_subscriptions(), 0);

    // Keys are free to be used again
    assert!(matches!(controller.ensure_batch("poolA", xyz(), false).await, EnsureOutcome::Subscribed { .. }));
    Ok(())
}

#[tokio::test]
async fn test_not_ready_then_ready() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    node.set_ready(false);
    let controller = controller(&node);

    assert_eq!(controller.ensure_batch("poolA", xyz(), false).await, EnsureOutcome::NotReady);
    assert_eq!(controller.count_for(&"poolA".into()).await, 0);

    node.set_ready(true);
    assert!(matches!(controller.ensure_batch("poolA", xyz(), false).await, EnsureOutcome::Subscribed { .. }));
    assert_eq!(controller.count_for(&"poolA".into()).await, 3);
    Ok(())
}

#[tokio::test]
async fn test_network_switch_invalidates_everything() -> anyhow::Result<()> {
    let node = Arc::new(InMemoryClient::new());
    seed_members(&node);
    let client: Arc<dyn RemoteQueryClient> = node.clone();
    let controller = controller(&node);
    let pool_members = Arc::new(PoolMembers::new());
    let bus = Arc::new(EventBus::default());
    let connection = ConnectionState::new(NetworkId::new("polkadot"), bus.clone());

    let watcher = InvalidationWatcher::new(controller.clone(), pool_members.clone(), client.clone())
        .with_network(NetworkId::new("polkadot"))
        .spawn(bus.subscribe());

    pool_members.fetch_all(client.as_ref()).await?;
    controller.ensure_batch("poolA", pool_members.members_of_pool(1).await, false).await;
    assert_eq!(node.active_subscriptions(), 3);

    connection.switch_network(NetworkId::new("westend"));
    for _ in 0..200 {
        if controller.store().is_empty().await && pool_members.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(controller.store().is_empty().await);
    assert!(pool_members.is_empty().await);
    assert_eq!(node.active_subscriptions(), 0);
    watcher.abort();
    Ok(())
}
