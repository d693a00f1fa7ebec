//! Turning photos and albums into text with the inference service.

pub mod album;
pub mod compactor;
pub mod photo;

pub use album::{AlbumDescriber, AlbumError};
pub use compactor::{CompactionError, Compactor, DEFAULT_BATCH_SIZE};
pub use photo::{DescribeError, PhotoDescriber, PhotoOutcome};
