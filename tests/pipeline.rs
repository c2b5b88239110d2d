mod common;

use std::path::Path;
use std::sync::Arc;

use common::{png, write_face, PixelEncoder};
use facepi::classifier::{apply_deletions, BatchClassifier, ClassifyOptions, DeletePolicy, Outcome};
use facepi::{storage, Error, GalleryBuilder, MatchPolicy, Report};
use rstest::rstest;

fn options(workers: usize, policy: MatchPolicy) -> ClassifyOptions {
    ClassifyOptions {
        threshold: 5.0,
        policy,
        workers,
        extensions: png(),
    }
}

fn render(report: &Report) -> anyhow::Result<String> {
    let mut out = Vec::new();
    report.render(&mut out, true)?;
    Ok(String::from_utf8(out)?)
}

fn known_faces(root: &Path) -> anyhow::Result<()> {
    write_face(&root.join("alice/a1.png"), Some(10))?;
    write_face(&root.join("alice/a2.png"), Some(14))?;
    write_face(&root.join("bob/b1.png"), Some(50))?;
    write_face(&root.join("carol/c1.png"), Some(90))?;
    write_face(&root.join("carol/c2.png"), None)?;
    Ok(())
}

/// Run build, save, load and classify; return the rendered report.
fn run(dir: &Path, workers: usize, policy: MatchPolicy) -> anyhow::Result<String> {
    let snapshot = dir.join(format!("faces-{workers}.json"));
    GalleryBuilder::new(PixelEncoder, png(), workers).build_and_save(&dir.join("known"), &snapshot)?;
    let gallery = storage::load_gallery(&snapshot)?;
    let results = BatchClassifier::new(PixelEncoder, Arc::new(gallery), options(workers, policy))
        .classify_dir(&dir.join("faces"))?;
    render(&Report::from_results(&results))
}

#[test]
fn test_build_save_load_classify_report() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    known_faces(&root.join("known"))?;
    write_face(&root.join("faces/p1.png"), Some(12))?;
    write_face(&root.join("faces/p3.png"), None)?;
    write_face(&root.join("faces/p4.png"), Some(200))?;
    write_face(&root.join("faces/clip/p2.png"), Some(52))?;

    let report = run(root, 2, MatchPolicy::FirstAcceptable)?;
    assert_eq!(
        report,
        "Matched faces:\n  alice:\n    p1.png (2.000)\n  bob:\n    p2.png (2.000)\n\
         Unmatched faces:\n  p3.png\n  p4.png\n"
    );
    Ok(())
}

#[test]
fn test_reference_without_face_is_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    known_faces(dir.path())?;
    let gallery = GalleryBuilder::new(PixelEncoder, png(), 3).build(dir.path())?;
    assert_eq!(gallery.get("carol").map(|e| e.len()), Some(1));
    assert_eq!(gallery.get("alice").map(|e| e.len()), Some(2));
    Ok(())
}

#[rstest]
#[case(2, MatchPolicy::FirstAcceptable)]
#[case(4, MatchPolicy::FirstAcceptable)]
#[case(16, MatchPolicy::FirstAcceptable)]
#[case(4, MatchPolicy::Best)]
#[case(16, MatchPolicy::Best)]
fn test_report_does_not_depend_on_worker_count(
    #[case] workers: usize,
    #[case] policy: MatchPolicy,
) -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    known_faces(&root.join("known"))?;
    for i in 0..60u8 {
        let face = if i % 7 == 0 { None } else { Some(i * 4) };
        write_face(&root.join(format!("faces/batch{}/{i:03}.png", i % 3)), face)?;
    }

    let baseline = run(root, 1, policy)?;
    assert_eq!(run(root, workers, policy)?, baseline);
    assert!(baseline.contains("alice:"));
    Ok(())
}

#[test]
fn test_deletion_only_when_enabled() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    known_faces(&root.join("known"))?;
    let faces = root.join("faces");
    write_face(&faces.join("match.png"), Some(11))?;
    write_face(&faces.join("noface.png"), None)?;
    write_face(&faces.join("stranger.png"), Some(250))?;

    let gallery = GalleryBuilder::new(PixelEncoder, png(), 2).build(&root.join("known"))?;
    let results = BatchClassifier::new(
        PixelEncoder,
        Arc::new(gallery),
        options(2, MatchPolicy::FirstAcceptable),
    )
    .classify_dir(&faces)?;
    let noface = results
        .iter()
        .find(|r| r.path.ends_with("noface.png"))
        .map(|r| r.outcome.clone());
    assert_eq!(noface, Some(Outcome::NoFace));

    assert_eq!(apply_deletions(&results, DeletePolicy::default()), 0);
    assert!(faces.join("noface.png").exists());

    let policy = DeletePolicy {
        no_face: true,
        unmatched: false,
    };
    assert_eq!(apply_deletions(&results, policy), 1);
    assert!(!faces.join("noface.png").exists());
    assert!(faces.join("stranger.png").exists());
    assert!(faces.join("match.png").exists());
    Ok(())
}

#[test]
fn test_corrupt_snapshot_is_reported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let snapshot = dir.path().join("faces.json");
    std::fs::write(&snapshot, "{\"alice\": 3}")?;
    assert!(matches!(
        storage::load_gallery(&snapshot),
        Err(Error::CorruptSnapshot { .. })
    ));
    Ok(())
}
