use lyttleutils::bridge::{BridgeCoordinator, BridgeResponder, MemoryChannel, TargetContext};
use lyttleutils::config::{BridgeConfig, MessageConfig};
use lyttleutils::message::{MessageFormatter, Replacements};
use lyttleutils::placeholder::{BridgeResolver, FnResolver, PlaceholderExpander, ResolverRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Network {
    backend: Arc<BridgeCoordinator>,
    proxy: Arc<BridgeResponder>,
    lookups: Arc<AtomicUsize>,
    token: CancellationToken,
}

/// Wire a backend coordinator to a proxy responder in memory
fn network(config: BridgeConfig) -> Network {
    let lookups = Arc::new(AtomicUsize::new(0));
    let proxy_registry = ResolverRegistry::new();
    {
        let lookups = Arc::clone(&lookups);
        proxy_registry
            .register(Arc::new(FnResolver::new("luckperms", move |params, target| {
                lookups.fetch_add(1, Ordering::SeqCst);
                match (params, target.as_str()) {
                    ("prefix", "player-123") => Some("Gold".to_string()),
                    ("prefix", _) => Some("Default".to_string()),
                    _ => None,
                }
            })))
            .unwrap();
    }

    let (backend_end, proxy_end) = MemoryChannel::pair(64);
    let max_frame_size = config.max_frame_size;
    let backend = Arc::new(BridgeCoordinator::new(config, Arc::new(backend_end.channel)).unwrap());
    let proxy = Arc::new(BridgeResponder::new(
        Arc::new(proxy_registry),
        Arc::new(proxy_end.channel),
        max_frame_size,
    ));

    let token = CancellationToken::new();
    backend.spawn_inbound(backend_end.inbound, token.clone());
    proxy.spawn(proxy_end.inbound, token.clone());

    Network {
        backend,
        proxy,
        lookups,
        token,
    }
}

#[tokio::test]
async fn test_backend_resolves_through_proxy() {
    let network = network(BridgeConfig::default());
    let target = TargetContext::new("player-123");

    let value = network
        .backend
        .resolve("luckperms_prefix", &target, Duration::from_secs(2), "")
        .await;
    assert_eq!(value, "Gold");

    // Served from the cache, the proxy is not asked again
    let again = network
        .backend
        .resolve("luckperms_prefix", &target, Duration::from_secs(2), "")
        .await;
    assert_eq!(again, "Gold");
    assert_eq!(network.lookups.load(Ordering::SeqCst), 1);

    let stats = network.backend.stats();
    assert_eq!(stats.requests_dispatched, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(network.proxy.metrics().snapshot().responses_resolved, 1);

    network.token.cancel();
}

#[tokio::test]
async fn test_unknown_placeholder_falls_back() {
    let network = network(BridgeConfig {
        fallback: "N/A".to_string(),
        ..BridgeConfig::default()
    });

    let value = network
        .backend
        .resolve_default("vault_eco_balance", &TargetContext::new("player-123"))
        .await;
    assert_eq!(value, "N/A");
    assert!(network.backend.cache().is_empty());

    network.token.cancel();
}

#[tokio::test]
async fn test_targets_are_resolved_separately() {
    let network = network(BridgeConfig::default());

    let gold = network
        .backend
        .resolve_default("luckperms_prefix", &TargetContext::new("player-123"))
        .await;
    let other = network
        .backend
        .resolve_default("luckperms_prefix", &TargetContext::new("player-456"))
        .await;

    assert_eq!(gold, "Gold");
    assert_eq!(other, "Default");
    assert_eq!(network.backend.cache().len(), 2);

    assert_eq!(network.backend.invalidate_target(&TargetContext::new("player-456")), 1);
    assert_eq!(network.backend.cache().len(), 1);

    network.token.cancel();
}

#[tokio::test]
async fn test_cancelled_proxy_times_out() {
    let network = network(BridgeConfig::default());
    network.token.cancel();
    // Let the pump tasks observe the cancellation
    tokio::time::sleep(Duration::from_millis(20)).await;

    let value = network
        .backend
        .resolve("luckperms_prefix", &TargetContext::new("player-123"), Duration::from_millis(100), "?")
        .await;
    assert_eq!(value, "?");
    assert_eq!(network.backend.correlator().pending_count(), 0);
}

#[tokio::test]
async fn test_message_with_bridged_placeholders() {
    let network = network(BridgeConfig::default());

    let local = ResolverRegistry::new();
    local
        .register(Arc::new(FnResolver::new("player", |params, target| {
            (params == "name").then(|| target.as_str().to_string())
        })))
        .unwrap();

    let expander = PlaceholderExpander::new(Arc::new(local))
        .with_fallback(Arc::new(BridgeResolver::new("proxy", Arc::clone(&network.backend))));
    let formatter = MessageFormatter::new(Arc::new(expander), "[Lyttle] ");
    let replacements = Replacements::builder().add("AMOUNT", "3").unwrap().build();

    let message = formatter
        .format_prefixed(
            "%player_name% (%luckperms_prefix%) got AMOUNT votes\\n%unknown_token%!",
            &replacements,
            &TargetContext::new("player-123"),
        )
        .await;

    // The bridge answers every token it receives, unknown ones with the fallback
    assert_eq!(message, "[Lyttle] player-123 (Gold) got 3 votes\n!");

    network.token.cancel();
}

#[tokio::test]
async fn test_catalog_message_with_bridged_placeholders() {
    let network = network(BridgeConfig::default());
    let expander = PlaceholderExpander::new(Arc::new(ResolverRegistry::new()))
        .with_fallback(Arc::new(BridgeResolver::new("proxy", Arc::clone(&network.backend))));

    let mut config = MessageConfig {
        prefix: "[Lyttle] ".to_string(),
        ..MessageConfig::default()
    };
    config
        .messages
        .insert("rank".to_string(), "Your rank is %luckperms_prefix%".to_string());
    let formatter = MessageFormatter::from_config(Arc::new(expander), config);

    let message = formatter
        .message("rank", &Replacements::default(), &TargetContext::new("player-123"))
        .await;
    assert_eq!(message, "[Lyttle] Your rank is Gold");

    network.token.cancel();
}
