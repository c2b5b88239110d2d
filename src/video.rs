use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use log::{info, warn};
use walkdir::WalkDir;

use crate::config::ExtractConfig;
use crate::{scan, Error, Result};

pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mkv"];

/// ffmpeg sampling settings for one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSampling {
    pub fps: u32,
    pub start: String,
    pub duration: String,
    pub threads: usize,
}

impl FrameSampling {
    pub fn from_config(cfg: &ExtractConfig) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            fps: cfg.fps,
            start: cfg.start.clone(),
            duration: cfg.duration.clone(),
            threads: cpus.min(cfg.max_threads).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub videos: usize,
    pub failed: usize,
}

/// Arguments for `ffmpeg` writing `<output>/<stem>_%04d.png`.
pub fn ffmpeg_args(video: &Path, output: &Path, sampling: &FrameSampling) -> Vec<OsString> {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    vec![
        "-i".into(),
        video.as_os_str().to_owned(),
        "-r".into(),
        sampling.fps.to_string().into(),
        "-ss".into(),
        sampling.start.clone().into(),
        "-t".into(),
        sampling.duration.clone().into(),
        "-threads".into(),
        sampling.threads.to_string().into(),
        output.join(format!("{}_%04d.png", stem)).into_os_string(),
    ]
}

/// A single video file, or every video under a directory (recursively).
pub fn list_videos(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(Error::MissingDirectory(input.to_path_buf()));
    }
    let extensions = VIDEO_EXTENSIONS.map(String::from);
    let mut videos = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && scan::has_extension(entry.path(), &extensions) {
            videos.push(entry.into_path());
        }
    }
    Ok(videos)
}

/// Sample frames out of `input` into `output` with ffmpeg, one video at a time.
///
/// A failing ffmpeg run is logged and skipped; not being able to start
/// ffmpeg at all aborts.
pub fn extract_frames(input: &Path, output: &Path, sampling: &FrameSampling) -> Result<ExtractStats> {
    let videos = list_videos(input)?;
    std::fs::create_dir_all(output)?;
    info!(
        "Extracting frames from {} video(s) at {} fps using {} thread(s)",
        videos.len(),
        sampling.fps,
        sampling.threads
    );

    let mut stats = ExtractStats::default();
    for video in videos {
        let start = Instant::now();
        let status = Command::new("ffmpeg")
            .args(ffmpeg_args(&video, output, sampling))
            .status()?;
        stats.videos += 1;
        if status.success() {
            info!(
                "Extracted {} in {:.2}s",
                video.display(),
                start.elapsed().as_secs_f64()
            );
        } else {
            warn!("ffmpeg failed on {}: {}", video.display(), status);
            stats.failed += 1;
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling() -> FrameSampling {
        FrameSampling {
            fps: 2,
            start: "00:00:30".to_string(),
            duration: "00:02:30".to_string(),
            threads: 4,
        }
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = ffmpeg_args(Path::new("videos/my clip.mp4"), Path::new("images"), &sampling());
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-i",
                "videos/my clip.mp4",
                "-r",
                "2",
                "-ss",
                "00:00:30",
                "-t",
                "00:02:30",
                "-threads",
                "4",
                "images/my clip_%04d.png",
            ]
        );
    }

    #[test]
    fn test_threads_are_capped() {
        let cfg = ExtractConfig {
            max_threads: 1,
            ..ExtractConfig::default()
        };
        assert_eq!(FrameSampling::from_config(&cfg).threads, 1);
        let s = FrameSampling::from_config(&ExtractConfig::default());
        assert!(s.threads >= 1 && s.threads <= 6);
        assert_eq!(s.fps, 1);
    }

    #[test]
    fn test_list_videos() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        std::fs::create_dir_all(root.join("day2"))?;
        for name in ["b.MP4", "a.mkv", "notes.txt", "day2/c.avi"] {
            std::fs::write(root.join(name), b"")?;
        }
        let names: Vec<String> = list_videos(root)?.iter().map(|p| scan::file_name(p)).collect();
        assert_eq!(names, vec!["a.mkv", "b.MP4", "c.avi"]);

        let single = root.join("notes.txt");
        assert_eq!(list_videos(&single)?, vec![single]);
        Ok(())
    }

    #[test]
    fn test_missing_input() {
        assert!(matches!(
            list_videos(Path::new("/nonexistent/videos")),
            Err(Error::MissingDirectory(_))
        ));
    }
}
