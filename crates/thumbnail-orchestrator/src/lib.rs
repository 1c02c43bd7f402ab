//!
//! # Thumbnail Orchestrator
//!
//! Spacedrive's Thumbnail Orchestrator sits between the UI and a thumbnail decoding service,
//! coordinating the flood of small preview requests a grid or list view produces while scrolling.
//!
//! Bring your own [`ThumbnailService`] (or use the bundled [`ImageThumbnailService`]) and the
//! orchestrator will handle:
//! - Answering cache hits synchronously, without queueing or using a load slot;
//! - Bounding how many decodes run at once, through `max_concurrent_loads` slots;
//! - Dispatching the most urgent waiting request first, oldest first among equals;
//! - Boosting the requests of the view currently in the foreground, the "active owner";
//! - Cancelling requests per caller token or per owner, resolving them to `None` instead of erroring;
//! - Resolving every outstanding request to `None` when the orchestrator is shut down or dropped.
//!
//!
//! ## Basic example
//!
//! ```
//! use std::sync::Arc;
//!
//! use sd_thumbnail_orchestrator::{
//! 	ImageThumbnailService, OwnerToken, Priority, RequestOptions, ThumbnailOrchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//! 	let orchestrator = ThumbnailOrchestrator::new(Arc::new(ImageThumbnailService::default()));
//!
//! 	let grid = OwnerToken::new("grid view").expect("label is not empty");
//! 	orchestrator.set_active_owner(Some(&grid));
//!
//! 	let maybe_thumbnail = orchestrator
//! 		.request_thumbnail(
//! 			"/definitely/not/a/real/picture.png",
//! 			&grid,
//! 			RequestOptions::default().with_priority(Priority::High),
//! 		)
//! 		.await;
//!
//! 	// Missing files are not an error, there is just no thumbnail to show
//! 	assert!(maybe_thumbnail.is_none());
//!
//! 	orchestrator.shutdown().await;
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod error;
mod image_service;
mod orchestrator;
mod owner;
mod priority;
mod queue;
mod registry;
mod request;
mod service;
mod worker;

pub use config::{
	ImageServiceConfig, OrchestratorConfig, DEFAULT_MAX_CACHE_ENTRIES,
	DEFAULT_MAX_CONCURRENT_LOADS, DEFAULT_TARGET_WIDTH,
};
pub use error::{Error, ServiceError};
pub use image_service::ImageThumbnailService;
pub use orchestrator::ThumbnailOrchestrator;
pub use owner::OwnerToken;
pub use priority::{effective_priority, Priority};
pub use request::RequestOptions;
pub use service::{CacheStats, Thumbnail, ThumbnailService};

pub use tokio_util::sync::CancellationToken;
