use std::sync::Arc;

use super::{CompletionReport, ErrorSummary, JobError, JobEvent, JobKind, ProgressUpdate, Stage};
use super::manager::Reporter;
use crate::describe::{AlbumDescriber, DescribeError, PhotoDescriber, PhotoOutcome};
use crate::models::{Album, Photo};
use crate::repository::{AlbumFilter, PhotoPool, Repository};

/// Failure for one item, in the form shown to users.
#[derive(Debug, thiserror::Error)]
enum ItemError {
    #[error(transparent)]
    Describe(#[from] DescribeError),
    #[error(transparent)]
    Album(#[from] crate::describe::AlbumError),
    #[error(transparent)]
    Repository(#[from] crate::repository::RepositoryError),
}

/// Executes one batch job over the repository.
pub struct JobRunner {
    repo: Arc<dyn Repository>,
    photos: PhotoDescriber,
    albums: AlbumDescriber,
}

#[derive(Default)]
struct Tally {
    current: usize,
    total: usize,
    photos_described: usize,
    albums_described: usize,
    skipped: usize,
    photo_errors: Vec<String>,
    album_errors: Vec<String>,
}

impl JobRunner {
    pub fn new(repo: Arc<dyn Repository>, photos: PhotoDescriber, albums: AlbumDescriber) -> Self {
        Self { repo, photos, albums }
    }

    /// Run a job to completion, emitting progress through `reporter`.
    /// Item failures are collected into the report; only enumerating the
    /// candidate pool can fail the job.
    pub fn run(&self, kind: JobKind, reporter: &Reporter) -> Result<CompletionReport, JobError> {
        let (photos, albums) = self.candidates(kind)?;
        tracing::info!(
            job = kind.command(),
            photos = photos.len(),
            albums = albums.len(),
            "Starting job"
        );

        if photos.is_empty() && albums.is_empty() {
            return Ok(CompletionReport::nothing_to_do(empty_message(kind)));
        }

        let mut tally = Tally {
            total: photos.len() + albums.len(),
            ..Tally::default()
        };

        for photo in &photos {
            tally.current += 1;
            reporter.send(JobEvent::Progress(ProgressUpdate {
                stage: Stage::Photos,
                current: tally.current,
                total: tally.total,
                description: format!("Processing photo: {}", photo.title),
            }));

            match self.describe_photo(photo) {
                Ok(PhotoOutcome::Described(_)) => tally.photos_described += 1,
                Ok(PhotoOutcome::Skipped(reason)) => {
                    tracing::info!(photo_id = %photo.id, %reason, "Skipped photo");
                    tally.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(photo_id = %photo.id, error = %e, "Photo description failed");
                    tally
                        .photo_errors
                        .push(format!("Photo {} ({}): {}", photo.id, photo.title, e));
                }
            }
        }

        for album in &albums {
            tally.current += 1;
            reporter.send(JobEvent::Progress(ProgressUpdate {
                stage: Stage::Albums,
                current: tally.current,
                total: tally.total,
                description: format!("Describing album: {}", album.title),
            }));

            match self.describe_album(album) {
                Ok(()) => tally.albums_described += 1,
                Err(e) => {
                    tracing::error!(album_id = %album.id, error = %e, "Album description failed");
                    tally
                        .album_errors
                        .push(format!("Album {} ({}): {}", album.id, album.title, e));
                }
            }
        }

        Ok(finish(kind, tally))
    }

    fn candidates(&self, kind: JobKind) -> Result<(Vec<Photo>, Vec<Album>), JobError> {
        let photos = |pool| {
            self.repo
                .photos_missing_description(pool)
                .map_err(|source| JobError::Enumerate { what: "photos", source })
        };
        let albums = |filter| {
            self.repo
                .top_level_albums(filter)
                .map_err(|source| JobError::Enumerate { what: "albums", source })
        };

        Ok(match kind {
            JobKind::Rescan => (photos(PhotoPool::All)?, albums(AlbumFilter::All)?),
            JobKind::DescribePhotos => (photos(PhotoPool::UnsortedOrTopLevel)?, Vec::new()),
            JobKind::DescribeAllAlbums => (Vec::new(), albums(AlbumFilter::All)?),
            JobKind::RetryAlbumFailures => (Vec::new(), albums(AlbumFilter::MissingDescription)?),
        })
    }

    fn describe_photo(&self, photo: &Photo) -> Result<PhotoOutcome, ItemError> {
        let variant = self
            .repo
            .best_size_variant(&photo.id)?
            .ok_or(DescribeError::NoSizeVariant)?;
        let outcome = self.photos.describe(photo, &variant)?;
        if let PhotoOutcome::Described(text) = &outcome {
            self.repo.save_photo_description(&photo.id, text)?;
        }
        Ok(outcome)
    }

    fn describe_album(&self, album: &Album) -> Result<(), ItemError> {
        let photos = self.repo.photos_in_album(&album.id)?;
        let description = self.albums.describe(album, &photos)?;
        self.repo.save_album_description(&album.id, &description)?;
        Ok(())
    }
}

fn empty_message(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Rescan => "No photos or albums to process",
        JobKind::DescribePhotos => "No photos need descriptions",
        JobKind::DescribeAllAlbums => "No albums to describe",
        JobKind::RetryAlbumFailures => "No albums need descriptions",
    }
}

fn finish(kind: JobKind, tally: Tally) -> CompletionReport {
    let message = match kind {
        JobKind::Rescan => format!(
            "Rescan complete: described {} photos and {} albums",
            tally.photos_described, tally.albums_described
        ),
        JobKind::DescribePhotos => format!("Described {} photos", tally.photos_described),
        JobKind::DescribeAllAlbums | JobKind::RetryAlbumFailures => {
            format!("Described {} albums", tally.albums_described)
        }
    };
    let errors = ErrorSummary::new(tally.photo_errors, tally.album_errors);
    tracing::info!(
        job = kind.command(),
        photos_described = tally.photos_described,
        albums_described = tally.albums_described,
        skipped = tally.skipped,
        errors = errors.total_errors,
        "Job finished"
    );

    CompletionReport {
        message,
        errors,
        photos_described: tally.photos_described,
        albums_described: tally.albums_described,
        skipped: tally.skipped,
    }
}
