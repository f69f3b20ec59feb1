//! End-to-end tests of the assembled service

use bundle_cache::{BundleCacheService, Settings};
use bundle_cache::http::{Handler, Request, Response};
use bytes::Bytes;
use rstest::*;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct Site {
	temp_dir: TempDir,
	settings: Settings,
}

#[fixture]
fn site() -> Site {
	let temp_dir = TempDir::new().unwrap();
	let root = temp_dir.path().join("shop");
	std::fs::create_dir_all(root.join("js")).unwrap();
	std::fs::write(
		root.join("index.html"),
		r#"<html><head><title>Shop</title></head><body><script src="/shop/js/cart.js"></script></body></html>"#,
	)
	.unwrap();
	std::fs::write(root.join("js/cart.js"), "window.cart = [];").unwrap();
	std::fs::write(
		root.join("faculty.json"),
		r#"{"autorun": ["/shop/js/cart.js"], "run": {"checkout": ["/shop/js/pay.js"]}}"#,
	)
	.unwrap();

	let public_dir = temp_dir.path().join("public");
	std::fs::create_dir_all(&public_dir).unwrap();
	std::fs::write(public_dir.join("bundle-cache-loader.js"), "/* loader */").unwrap();

	let mut settings = Settings {
		scratch_dir: temp_dir.path().join("scratch"),
		public_dir,
		store_path: temp_dir.path().join("registry.json"),
		watch: false,
		..Settings::default()
	};
	settings.roots.insert("/shop".to_string(), root);

	Site { temp_dir, settings }
}

async fn get(service: &BundleCacheService, uri: &str, headers: &[(&str, &str)]) -> Response {
	let request = headers
		.iter()
		.fold(Request::builder().uri(uri), |builder, (name, value)| {
			builder.header(name, value)
		})
		.build()
		.unwrap();
	service.handler().handle(request).await.unwrap()
}

#[rstest]
#[tokio::test]
async fn test_page_traffic_builds_a_bundle(site: Site) {
	let service = BundleCacheService::new(&site.settings);
	assert_eq!(service.scan().await.unwrap(), 3);

	let page = get(&service, "/shop/index.html", &[]).await;
	let html = std::str::from_utf8(&page.body).unwrap();
	assert!(html.contains("bundle-cache-loader.js"));
	assert!(html.contains(r#"data-bundle-cache-src="/shop/js/cart.js""#));

	get(
		&service,
		"/shop/js/cart.js",
		&[("referer", "http://localhost/shop/index.html")],
	)
	.await;
	assert!(
		service
			.registry()
			.entry("/shop/index.html")
			.unwrap()
			.links
			.contains("/shop/js/cart.js")
	);

	let version = get(
		&service,
		"/bundle-cache/getGrandVersion",
		&[("x-bundle-cache-path", "/shop/index.html")],
	)
	.await;
	let version: serde_json::Value = serde_json::from_slice(&version.body).unwrap();

	let bundle = get(
		&service,
		"/bundle-cache/grand",
		&[("x-bundle-cache-path", "/shop/index.html")],
	)
	.await;
	let header = bundle.headers["x-bundle-cache-version"].to_str().unwrap();
	assert_eq!(version["version"].as_i64().unwrap().to_string(), header);

	let mut archive = zip::ZipArchive::new(Cursor::new(Bytes::clone(&bundle.body))).unwrap();
	let mut cart = String::new();
	archive
		.by_name("shop/js/cart.js")
		.unwrap()
		.read_to_string(&mut cart)
		.unwrap();
	assert_eq!(cart, "window.cart = [];");
	assert_eq!(archive.len(), 1);
}

#[rstest]
#[tokio::test]
async fn test_scripts_come_from_config_files(site: Site) {
	let service = BundleCacheService::new(&site.settings);
	service.scan().await.unwrap();

	assert_eq!(
		*service.scripts().get_scripts("checkout"),
		vec!["/shop/js/cart.js".to_string(), "/shop/js/pay.js".to_string()]
	);
}

#[rstest]
#[tokio::test]
async fn test_serves_over_http(site: Site) {
	let port = std::net::TcpListener::bind("127.0.0.1:0")
		.unwrap()
		.local_addr()
		.unwrap()
		.port();
	let mut settings = site.settings.clone();
	settings.listen = ([127, 0, 0, 1], port).into();

	let service = Arc::new(BundleCacheService::new(&settings));
	service.scan().await.unwrap();

	let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
	let server = tokio::spawn(bundle_cache::http::serve(settings.listen, service.handler(), async {
		let _ = stopped.await;
	}));

	let mut stream = None;
	for _ in 0..50 {
		match tokio::net::TcpStream::connect(settings.listen).await {
			Ok(connected) => {
				stream = Some(connected);
				break;
			}
			Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
		}
	}
	let mut stream = stream.expect("server did not start");
	stream
		.write_all(
			b"GET /bundle-cache/getGrandVersion HTTP/1.1\r\nHost: localhost\r\nx-bundle-cache-path: /shop/js/cart.js\r\nConnection: close\r\n\r\n",
		)
		.await
		.unwrap();
	let mut raw = String::new();
	stream.read_to_string(&mut raw).await.unwrap();

	assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
	let expected = service.registry().get_grand_version("/shop/js/cart.js");
	assert!(raw.ends_with(&format!(r#"{{"version":{}}}"#, expected)), "{raw}");

	stop.send(()).unwrap();
	server.await.unwrap().unwrap();
	drop(site.temp_dir);
}
