use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::face::{FaceEncoder, Vector};
use crate::{scan, storage, Error, Result};

/// Known identities and their reference embeddings.
///
/// Identities iterate in lexicographic order. An identity is only present
/// while it owns at least one embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gallery {
    identities: BTreeMap<String, Vec<Vector>>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: impl Into<String>, embedding: Vector) {
        self.identities
            .entry(identity.into())
            .or_default()
            .push(embedding);
    }

    pub fn get(&self, identity: &str) -> Option<&[Vector]> {
        self.identities.get(identity).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Vector])> {
        self.identities
            .iter()
            .map(|(name, embeddings)| (name.as_str(), embeddings.as_slice()))
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.identities.keys().map(String::as_str)
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn embedding_count(&self) -> usize {
        self.identities.values().map(Vec::len).sum()
    }

    /// Length shared by every embedding, `None` for an empty gallery.
    ///
    /// Fails with [`Error::DimensionMismatch`] when lengths disagree.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let mut dim: Option<usize> = None;
        for embedding in self.identities.values().flatten() {
            match dim {
                None => dim = Some(embedding.len()),
                Some(expected) if expected != embedding.len() => {
                    return Err(Error::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(dim)
    }
}

/// Builds a [`Gallery`] from a folder holding one subfolder per identity.
pub struct GalleryBuilder<E> {
    encoder: E,
    extensions: Vec<String>,
    workers: usize,
}

impl<E: FaceEncoder> GalleryBuilder<E> {
    pub fn new(encoder: E, extensions: Vec<String>, workers: usize) -> Self {
        Self {
            encoder,
            extensions,
            workers: workers.max(1),
        }
    }

    /// Embed every reference image under `root` in parallel.
    ///
    /// Images without an embeddable face are skipped; identities left with
    /// nothing are absent from the result.
    pub fn build(&self, root: &Path) -> Result<Gallery> {
        let start = Instant::now();
        let mut jobs: Vec<(String, PathBuf)> = Vec::new();
        for dir in scan::list_subdirs(root)? {
            let identity = scan::file_name(&dir);
            for image in scan::list_images(&dir, &self.extensions, false)? {
                jobs.push((identity.clone(), image));
            }
        }
        info!(
            "Embedding {} reference image(s) from {} with {} worker(s)",
            jobs.len(),
            root.display(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;
        // collect() keeps job order, whatever order workers finish in
        let embeddings: Vec<Option<Vector>> = pool.install(|| {
            jobs.par_iter()
                .map(|(_, path)| self.embed_reference(path))
                .collect()
        });

        let mut gallery = Gallery::new();
        let mut skipped = 0usize;
        for ((identity, _), embedding) in jobs.into_iter().zip(embeddings) {
            match embedding {
                Some(v) => gallery.insert(identity, v),
                None => skipped += 1,
            }
        }
        gallery.dimension()?;

        info!(
            "Gallery built: {} identities, {} embedding(s), {} image(s) skipped in {:.2}s",
            gallery.len(),
            gallery.embedding_count(),
            skipped,
            start.elapsed().as_secs_f64()
        );
        Ok(gallery)
    }

    /// [`build`](Self::build), then write the snapshot.
    pub fn build_and_save(&self, root: &Path, snapshot: &Path) -> Result<Gallery> {
        let gallery = self.build(root)?;
        storage::save_gallery(&gallery, snapshot)?;
        Ok(gallery)
    }

    fn embed_reference(&self, path: &Path) -> Option<Vector> {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping unreadable image {}: {}", path.display(), e);
                return None;
            }
        };
        match self.encoder.encode(&img) {
            Ok(faces) => {
                let first = faces.into_iter().next();
                if first.is_none() {
                    debug!("{}", Error::NoFaceDetected(path.to_path_buf()));
                }
                first
            }
            Err(e) => {
                warn!("Failed to embed {}: {:#}", path.display(), e);
                None
            }
        }
    }
}
