use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};

use crate::face::Vector;
use crate::gallery::Gallery;
use crate::{Error, Result};

fn corrupt(path: &Path, reason: impl ToString) -> Error {
    Error::CorruptSnapshot {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Write the whole gallery as JSON (`{"identity": [[f32, ...], ...]}`).
///
/// The file is replaced in one rename, so readers never see a partial
/// snapshot.
pub fn save_gallery(gallery: &Gallery, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(gallery).map_err(std::io::Error::from)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    if let Err(e) = std::fs::write(&tmp, data).and_then(|()| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    info!(
        "Saved {} identities ({} embeddings) to {}",
        gallery.len(),
        gallery.embedding_count(),
        path.display()
    );
    Ok(())
}

/// Read a snapshot written by [`save_gallery`].
///
/// Anything that is not a map of identity to equal-length vectors is
/// [`Error::CorruptSnapshot`].
pub fn load_gallery(path: &Path) -> Result<Gallery> {
    let data = std::fs::read(path).map_err(|e| corrupt(path, e))?;
    let raw: BTreeMap<String, Vec<Vector>> =
        serde_json::from_slice(&data).map_err(|e| corrupt(path, e))?;

    let mut gallery = Gallery::new();
    for (identity, embeddings) in raw {
        for embedding in embeddings {
            if embedding.is_empty() {
                return Err(corrupt(path, format!("empty embedding for {}", identity)));
            }
            gallery.insert(identity.clone(), embedding);
        }
    }
    gallery.dimension().map_err(|e| corrupt(path, e))?;

    info!(
        "Loaded {} identities ({} embeddings) from {}",
        gallery.len(),
        gallery.embedding_count(),
        path.display()
    );
    if gallery.is_empty() {
        warn!("Snapshot {} holds no identities", path.display());
    }
    Ok(gallery)
}

/// Remove the snapshot, if any. Returns whether a file was removed.
pub fn purge(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchPolicy, Matcher};

    fn sample() -> Gallery {
        let mut g = Gallery::new();
        g.insert("alice", vec![0.1, -0.25, 0.333_333_34]);
        g.insert("alice", vec![1e-7, 0.5, 2.5e-3]);
        g.insert("bob", vec![0.9, 0.123_456_79, -0.75]);
        g
    }

    #[test]
    fn test_save_then_load_is_lossless() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faces.json");
        let gallery = sample();
        save_gallery(&gallery, &path)?;
        assert_eq!(load_gallery(&path)?, gallery);
        Ok(())
    }

    #[test]
    fn test_reloaded_gallery_classifies_identically() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faces.json");
        let gallery = sample();
        save_gallery(&gallery, &path)?;
        let reloaded = load_gallery(&path)?;

        let probes = [
            [0.1f32, -0.2, 0.3],
            [0.8, 0.1, -0.7],
            [5.0, 5.0, 5.0],
            [0.0, 0.5, 0.0],
        ];
        for threshold in [0.01f32, 0.1, 0.5, 2.0] {
            for policy in [MatchPolicy::FirstAcceptable, MatchPolicy::Best] {
                let m = Matcher::new(threshold, policy);
                for probe in &probes {
                    assert_eq!(
                        m.classify_one(probe, &gallery)?,
                        m.classify_one(probe, &reloaded)?
                    );
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_snapshot_is_plain_json() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faces.json");
        save_gallery(&sample(), &path)?;
        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(value["alice"].as_array().unwrap().len(), 2);
        assert_eq!(value["bob"][0].as_array().unwrap().len(), 3);
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshots() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cases = [
            ("garbage.json", "not json at all"),
            ("list.json", "[[0.1, 0.2]]"),
            ("strings.json", r#"{"alice": [["a", "b"]]}"#),
            ("ragged.json", r#"{"alice": [[0.1, 0.2]], "bob": [[0.1]]}"#),
            ("empty_vec.json", r#"{"alice": [[]]}"#),
        ];
        for (name, body) in cases {
            let path = dir.path().join(name);
            std::fs::write(&path, body)?;
            let err = load_gallery(&path).unwrap_err();
            assert!(
                matches!(err, Error::CorruptSnapshot { .. }),
                "{name}: {err:?}"
            );
        }

        let missing = load_gallery(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, Error::CorruptSnapshot { .. }));
        Ok(())
    }

    #[test]
    fn test_identity_without_embeddings_is_dropped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faces.json");
        std::fs::write(&path, r#"{"alice": [[0.1, 0.2]], "ghost": []}"#)?;
        let gallery = load_gallery(&path)?;
        let names: Vec<&str> = gallery.identities().collect();
        assert_eq!(names, vec!["alice"]);
        Ok(())
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // a non-empty directory where the snapshot should go makes the rename fail
        let path = dir.path().join("faces.json");
        std::fs::create_dir_all(path.join("occupied"))?;

        assert!(matches!(save_gallery(&sample(), &path), Err(Error::Io(_))));
        assert!(!dir.path().join("faces.json.tmp").exists());
        assert!(path.is_dir());
        Ok(())
    }

    #[test]
    fn test_purge() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faces.json");
        save_gallery(&sample(), &path)?;
        assert!(purge(&path)?);
        assert!(!path.exists());
        assert!(!purge(&path)?);
        Ok(())
    }
}
