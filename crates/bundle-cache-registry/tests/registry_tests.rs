//! Integration tests for the dependency and version registry

use bundle_cache_registry::{
	BootGate, DocumentStore, FlushPolicy, JsonFileStore, MemoryStore, Propagation, Registry,
	RegistryOptions, UNKNOWN_VERSION,
};
use rstest::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[fixture]
fn registry() -> Registry {
	Registry::new(RegistryOptions::default())
}

fn grands(registry: &Registry) -> Vec<(String, i64)> {
	registry
		.snapshot()
		.urls
		.into_iter()
		.map(|(url, entry)| (url, entry.version.grand))
		.collect()
}

#[rstest]
fn test_grand_versions_never_decrease(registry: Registry) {
	registry.add_url("/p", "/srv/p.html", 100);
	registry.add_url("/a.js", "/srv/a.js", 200);
	registry.add_url("/b.js", "/srv/b.js", 300);

	let mut previous = grands(&registry);
	let steps: Vec<Box<dyn Fn(&Registry)>> = vec![
		Box::new(|r: &Registry| {
			r.link("/p", ["/a.js"]);
		}),
		Box::new(|r: &Registry| {
			r.link("/a.js", ["/b.js"]);
		}),
		Box::new(|r: &Registry| r.update_version("/b.js", "/srv/b.js", 301)),
		Box::new(|r: &Registry| r.add_url("/a.js", "/srv/a.js", 210)),
		Box::new(|r: &Registry| {
			r.link("/b.js", ["/p"]);
		}),
		Box::new(|r: &Registry| {
			r.remove_url("/b.js");
		}),
		Box::new(|r: &Registry| r.update_version("/p", "/srv/p.html", 90)),
	];

	for step in steps {
		step(&registry);
		let current = grands(&registry);
		for (url, grand) in &previous {
			if let Some((_, now)) = current.iter().find(|(u, _)| u == url) {
				assert!(now >= grand, "grand of {url} went from {grand} to {now}");
			}
		}
		for entry in registry.snapshot().urls.values() {
			assert!(entry.version.grand >= entry.version.empirical);
		}
		previous = current;
	}
}

#[rstest]
fn test_update_propagates_transitively(registry: Registry) {
	registry.add_url("/p", "/srv/p.html", 100);
	registry.add_url("/a.js", "/srv/a.js", 200);
	registry.add_url("/b.js", "/srv/b.js", 300);
	registry.link("/p", ["/a.js"]);
	registry.link("/a.js", ["/b.js"]);

	let before = registry.get_grand_version("/p");
	registry.update_version("/b.js", "/srv/b.js", 310);

	let changed = registry.entry("/b.js").unwrap().version.empirical;
	assert!(registry.get_grand_version("/p") > before);
	assert_eq!(registry.get_grand_version("/p"), changed);
	assert_eq!(registry.get_grand_version("/a.js"), changed);
}

#[rstest]
fn test_update_propagates_one_hop() {
	let registry =
		Registry::new(RegistryOptions::default().with_propagation(Propagation::OneHop));
	registry.add_url("/p", "/srv/p.html", 100);
	registry.add_url("/a.js", "/srv/a.js", 200);
	registry.add_url("/b.js", "/srv/b.js", 300);
	registry.link("/p", ["/a.js"]);
	registry.link("/a.js", ["/b.js"]);

	let before = registry.get_grand_version("/p");
	registry.update_version("/b.js", "/srv/b.js", 310);

	assert_eq!(registry.get_grand_version("/p"), before);
	assert!(registry.get_grand_version("/a.js") > before);
}

#[rstest]
fn test_get_related_excludes_self_oversized_and_duplicates(registry: Registry) {
	registry.add_url("/p", "/srv/p.html", 100);
	registry.add_url("/a.js", "/srv/a.js", 200);
	registry.add_url("/big.js", "/srv/big.js", 70 * 1024);
	registry.add_url("/c.js", "/srv/c.js", 50);
	registry.add_url("/d.css", "/srv/d.css", 10);
	registry.link("/p", ["/a.js", "/big.js", "/d.css"]);
	registry.link("/a.js", ["/c.js", "/d.css"]);
	registry.link("/big.js", ["/c.js"]);
	registry.link("/c.js", ["/p"]);

	let related = registry.get_related("/p");
	let urls: Vec<&str> = related.iter().map(|entry| entry.url.as_str()).collect();

	assert_eq!(urls, vec!["/a.js", "/c.js", "/d.css"]);
	assert!(!urls.contains(&"/p"));
	assert!(related.iter().all(|entry| entry.size <= 64 * 1024));
	let unique: HashSet<&str> = urls.iter().copied().collect();
	assert_eq!(unique.len(), urls.len());
}

#[rstest]
fn test_get_related_traverses_oversized_and_skips_unregistered(registry: Registry) {
	registry.add_url("/p", "/srv/p.html", 100);
	registry.add_url("/big.js", "/srv/big.js", 128 * 1024);
	registry.add_url("/small.js", "/srv/small.js", 10);
	registry.link("/p", ["/big.js", "/missing.js"]);
	registry.link("/big.js", ["/small.js"]);

	let urls: Vec<String> = registry
		.get_related("/p")
		.into_iter()
		.map(|entry| entry.url)
		.collect();
	assert_eq!(urls, vec!["/small.js".to_string()]);
	assert!(registry.get_related("/nowhere").is_empty());
}

#[rstest]
fn test_direct_cycle_rejected(registry: Registry) {
	registry.add_url("/a", "/srv/a.html", 10);
	registry.add_url("/b", "/srv/b.js", 10);

	let first = registry.link("/a", ["/b"]);
	assert_eq!(first.added, vec!["/b".to_string()]);

	let second = registry.link("/b", ["/a"]);
	assert!(second.added.is_empty());
	assert_eq!(second.rejected, vec!["/a".to_string()]);

	assert!(registry.entry("/a").unwrap().links.contains("/b"));
	assert!(registry.entry("/b").unwrap().links.is_empty());
}

#[rstest]
fn test_link_keeps_valid_candidates_and_rejects_self(registry: Registry) {
	registry.add_url("/a", "/srv/a.html", 10);
	registry.add_url("/b", "/srv/b.js", 10);
	registry.link("/b", ["/a"]);

	let outcome = registry.link("/a", ["/a", "/b", "/c"]);
	assert_eq!(outcome.added, vec!["/c".to_string()]);
	assert_eq!(outcome.rejected, vec!["/a".to_string(), "/b".to_string()]);
}

#[rstest]
fn test_link_bumps_source_grand_and_creates_link_only(registry: Registry) {
	registry.add_url("/a.js", "/srv/a.js", 10);
	registry.add_url("/p", "/srv/p.html", 10);
	let before = registry.get_grand_version("/p");

	registry.link("/p", ["/a.js"]);
	assert!(registry.get_grand_version("/p") > before);

	let again = registry.get_grand_version("/p");
	registry.link("/p", ["/a.js"]);
	assert_eq!(registry.get_grand_version("/p"), again);

	registry.link("/ghost", ["/a.js"]);
	assert!(registry.entry("/ghost").unwrap().is_link_only());
	registry.link("/q", ["/ghost"]);
	registry.add_url("/q", "/srv/q.html", 10);
	let related: Vec<String> = registry
		.get_related("/q")
		.into_iter()
		.map(|entry| entry.url)
		.collect();
	assert_eq!(related, vec!["/a.js".to_string()]);
}

#[rstest]
fn test_add_url_preserves_links(registry: Registry) {
	registry.add_url("/p", "/srv/p.html", 10);
	registry.add_url("/a.js", "/srv/a.js", 10);
	registry.link("/p", ["/a.js"]);

	registry.add_url("/p", "/srv/p2.html", 20);
	let entry = registry.entry("/p").unwrap();
	assert!(entry.links.contains("/a.js"));
	assert_eq!(entry.size, 20);
	assert_eq!(entry.version.empirical, entry.version.grand);
}

#[rstest]
fn test_remove_url_strips_links(registry: Registry) {
	registry.add_url("/p", "/srv/p.html", 10);
	registry.add_url("/a.js", "/srv/a.js", 10);
	registry.link("/p", ["/a.js"]);

	assert!(registry.remove_url("/a.js"));
	assert!(!registry.remove_url("/a.js"));
	assert_eq!(registry.get_grand_version("/a.js"), UNKNOWN_VERSION);
	assert!(registry.entry("/p").unwrap().links.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_persist_then_reload_is_identical() {
	let temp_dir = TempDir::new().unwrap();
	let store = JsonFileStore::new(temp_dir.path().join("registry.json"));

	let registry = Registry::default();
	registry.add_url("/p", "/srv/p.html", 100);
	registry.add_url("/a.js", "/srv/a.js", 200);
	registry.link("/p", ["/a.js", "/later.js"]);
	registry.flush_now(&store).await.unwrap();

	let reloaded = Registry::default();
	assert_eq!(reloaded.restore(&store).await.unwrap(), 2);
	assert_eq!(reloaded.snapshot(), registry.snapshot());

	let newest = registry.get_grand_version("/p");
	assert!(reloaded.now() > newest);
}

#[rstest]
#[tokio::test]
async fn test_restore_from_empty_store() {
	let store = MemoryStore::new();
	let registry = Registry::default();
	assert_eq!(registry.restore(&store).await.unwrap(), 0);
	assert!(registry.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_debounced_flush_coalesces_mutations() {
	let store = Arc::new(MemoryStore::new());
	let registry = Arc::new(Registry::default());
	let _flusher = registry.attach_store(
		store.clone(),
		FlushPolicy::new(Duration::from_millis(50), Duration::from_secs(2)),
	);

	for i in 0..20 {
		registry.add_url(&format!("/file-{i}.js"), format!("/srv/file-{i}.js"), 10);
	}
	tokio::time::sleep(Duration::from_millis(300)).await;

	assert_eq!(store.writes(), 1);
	assert_eq!(store.document().unwrap().urls.len(), 20);
}

#[rstest]
#[tokio::test]
async fn test_persistence_failure_is_not_fatal() {
	let store = Arc::new(MemoryStore::new());
	store.set_failing(true);
	let registry = Arc::new(Registry::default());
	let _flusher = registry.attach_store(
		store.clone(),
		FlushPolicy::new(Duration::from_millis(20), Duration::from_millis(200)),
	);

	registry.add_url("/a.js", "/srv/a.js", 10);
	tokio::time::sleep(Duration::from_millis(150)).await;
	assert_eq!(store.writes(), 0);
	assert!(registry.contains("/a.js"));

	store.set_failing(false);
	registry.add_url("/b.js", "/srv/b.js", 10);
	tokio::time::sleep(Duration::from_millis(150)).await;
	assert_eq!(store.writes(), 1);
	assert_eq!(store.document().unwrap().urls.len(), 2);
	assert!(store.find().await.unwrap().is_some());
}

#[rstest]
#[tokio::test]
async fn test_pruner_waits_for_boot_gate() {
	let store = MemoryStore::new();
	let seed = Registry::default();
	seed.add_url("/stale.js", "/srv/stale.js", 10);
	seed.add_url("/fresh.js", "/srv/fresh.js", 10);
	seed.flush_now(&store).await.unwrap();

	let registry = Arc::new(Registry::default());
	registry.restore(&store).await.unwrap();
	let gate = Arc::new(BootGate::new(registry.now()));
	let scan = gate.defer();

	let pruner = registry.spawn_pruner(gate.clone());
	registry.update_version("/fresh.js", "/srv/fresh.js", 11);
	gate.mark_booted();
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(!pruner.is_finished());
	assert!(registry.contains("/stale.js"));

	drop(scan);
	let removed = tokio::time::timeout(Duration::from_secs(1), pruner)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(removed, vec!["/stale.js".to_string()]);
	assert!(registry.contains("/fresh.js"));
}

#[rstest]
fn test_get_scripts_merges_configs(registry: Registry) {
	let temp_dir = TempDir::new().unwrap();
	let admin = temp_dir.path().join("admin-faculty.json");
	let shop = temp_dir.path().join("shop-faculty.json");
	std::fs::write(
		&admin,
		r#"{"autorun": ["/shared/boot.js"], "run": {"admin": ["/admin/panel.js"]}}"#,
	)
	.unwrap();
	std::fs::write(
		&shop,
		r#"{"autorun": ["/shared/boot.js", "/shop/cart.js"], "run": {"public": ["/shop/list.js"]}}"#,
	)
	.unwrap();

	registry.add_url("/admin/faculty.json", &admin, 80);
	registry.add_url("/shop/faculty.json", &shop, 90);
	registry.add_url("/admin/panel.js", "/srv/panel.js", 10);

	assert_eq!(
		registry.get_scripts("admin"),
		vec!["/shared/boot.js", "/admin/panel.js", "/shop/cart.js"]
	);
	assert_eq!(
		registry.get_scripts("public"),
		vec!["/shared/boot.js", "/shop/cart.js", "/shop/list.js"]
	);

	registry.remove_url("/shop/faculty.json");
	assert_eq!(
		registry.get_scripts("public"),
		vec!["/shared/boot.js".to_string()]
	);
	assert!(registry.config("/admin/faculty.json").is_some());
}
