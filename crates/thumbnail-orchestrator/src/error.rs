use std::{io, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("owner token label must not be empty")]
	EmptyOwnerLabel,
	#[error("invalid orchestrator configuration: {reason}")]
	InvalidConfig { reason: &'static str },
}

/// Errors a [`ThumbnailService`](crate::ThumbnailService) may report from a load.
///
/// The orchestrator never hands these to its callers, a failed load simply resolves to no
/// thumbnail, but they are logged so a broken decoder doesn't go unnoticed.
#[derive(Debug, Error)]
pub enum ServiceError {
	#[error("thumbnail load was cancelled")]
	Cancelled,
	#[error("failed to read image file <path='{}'>: {source}", .path.display())]
	FileIO {
		path: Box<Path>,
		#[source]
		source: io::Error,
	},
	#[error("failed to decode image <path='{}'>: {source}", .path.display())]
	Decode {
		path: Box<Path>,
		#[source]
		source: image::ImageError,
	},
	#[error("thumbnail decoding task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
	#[error("{0}")]
	Other(String),
}

impl ServiceError {
	pub fn file_io(path: impl AsRef<Path>, source: io::Error) -> Self {
		Self::FileIO {
			path: path.as_ref().into(),
			source,
		}
	}

	pub fn decode(path: impl AsRef<Path>, source: image::ImageError) -> Self {
		Self::Decode {
			path: path.as_ref().into(),
			source,
		}
	}

	#[must_use]
	pub const fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}
