use sd_thumbnail_orchestrator::{
	ImageServiceConfig, ImageThumbnailService, OwnerToken, RequestOptions, ThumbnailOrchestrator,
	ThumbnailService,
};

use std::{fs, path::Path, sync::Arc};

use image::{GenericImageView, Rgba, RgbaImage};
use tempfile::tempdir;
use tracing_test::traced_test;

fn write_png(path: &Path, width: u32, height: u32) {
	RgbaImage::from_pixel(width, height, Rgba([200, 30, 90, 255]))
		.save(path)
		.expect("failed to write test picture");
}

#[tokio::test]
#[traced_test]
async fn generates_and_caches_scaled_thumbnails() {
	let dir = tempdir().unwrap();
	let picture = dir.path().join("wide.png");
	write_png(&picture, 64, 32);
	let picture = picture.to_str().unwrap();

	let service = Arc::new(ImageThumbnailService::default());
	let orchestrator = ThumbnailOrchestrator::new(Arc::clone(&service) as _);
	let owner = OwnerToken::new("grid").unwrap();

	let thumbnail = orchestrator
		.request_thumbnail(
			picture,
			&owner,
			RequestOptions::default().with_target_width(16),
		)
		.await
		.expect("picture should be decoded");

	assert_eq!(thumbnail.dimensions(), (16, 8));

	let cached = orchestrator
		.try_get_cached(picture)
		.expect("thumbnail should be cached after loading");
	assert!(Arc::ptr_eq(&cached, &thumbnail));

	let stats = orchestrator.stats();
	assert_eq!(stats.entry_count, 1);
	assert_eq!(stats.hit_count, 1);
	assert_eq!(stats.approximate_bytes, 16 * 8 * 4);

	orchestrator.invalidate(picture);
	assert!(service.try_get_cached(picture).is_none());
	assert_eq!(orchestrator.stats().entry_count, 0);

	orchestrator.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn narrow_pictures_keep_their_size() {
	let dir = tempdir().unwrap();
	let picture = dir.path().join("narrow.png");
	write_png(&picture, 10, 40);

	let orchestrator = ThumbnailOrchestrator::new(Arc::new(ImageThumbnailService::default()));
	let owner = OwnerToken::new("list").unwrap();

	let thumbnail = orchestrator
		.request_thumbnail(
			picture.to_str().unwrap(),
			&owner,
			RequestOptions::default().with_target_width(64),
		)
		.await
		.unwrap();

	assert_eq!(thumbnail.dimensions(), (10, 40));

	orchestrator.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn unreadable_files_resolve_to_none() {
	let dir = tempdir().unwrap();
	let garbage = dir.path().join("garbage.png");
	fs::write(&garbage, b"definitely not a png").unwrap();
	let missing = dir.path().join("missing.png");

	let service = Arc::new(ImageThumbnailService::default());
	let orchestrator = ThumbnailOrchestrator::new(Arc::clone(&service) as _);
	let owner = OwnerToken::new("grid").unwrap();

	for path in [&garbage, &missing] {
		let result = orchestrator
			.request_thumbnail(path.to_str().unwrap(), &owner, RequestOptions::default())
			.await;
		assert!(result.is_none());
	}

	assert_eq!(service.stats().entry_count, 0);

	orchestrator.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn cache_is_bounded_and_clearable() {
	let dir = tempdir().unwrap();
	let mut config = ImageServiceConfig::default();
	config.set_max_entries(2);

	let service = Arc::new(ImageThumbnailService::new(config));
	let orchestrator = ThumbnailOrchestrator::new(Arc::clone(&service) as _);
	let owner = OwnerToken::new("grid").unwrap();

	let mut paths = Vec::new();
	for i in 0..3 {
		let picture = dir.path().join(format!("picture-{i}.png"));
		write_png(&picture, 8, 8);
		let path = picture.to_str().unwrap().to_string();

		assert!(orchestrator
			.request_thumbnail(&path, &owner, RequestOptions::default())
			.await
			.is_some());

		paths.push(path);
	}

	// Oldest entry was evicted to make room for the third one
	assert!(service.try_get_cached(&paths[0]).is_none());
	assert!(service.try_get_cached(&paths[2]).is_some());
	assert_eq!(orchestrator.stats().entry_count, 2);

	orchestrator.clear_cache();

	let stats = orchestrator.stats();
	assert_eq!(stats.entry_count, 0);
	assert_eq!(stats.approximate_bytes, 0);

	orchestrator.shutdown().await;
}
