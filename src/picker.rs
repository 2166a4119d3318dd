//! 動画ファイル選択
//!
//! ファイル指定ならそのまま、フォルダ指定なら直下の動画から選ぶ。

use crate::error::{CompressorError, Result};
use dialoguer::Select;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

impl VideoFile {
    fn from_path(path: &Path) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size,
        })
    }
}

/// video/* 相当の拡張子（小文字で比較）
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "webm", "avi", "3gp", "3g2", "ts", "mts", "flv", "wmv", "mpg",
    "mpeg",
];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

pub fn scan_folder(folder: &Path) -> Result<Vec<VideoFile>> {
    if !folder.exists() {
        return Err(CompressorError::FileNotFound(folder.display().to_string()));
    }

    let mut videos = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_video_file(path) {
            videos.push(VideoFile::from_path(path)?);
        }
    }

    // ファイル名でソート
    videos.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    Ok(videos)
}

/// 動画を1本選ぶ
///
/// 選択がキャンセルされた場合は `Ok(None)`。
/// `interactive` が false の場合、複数候補があれば先頭を選ぶ。
pub fn pick_video(source: &Path, interactive: bool) -> Result<Option<VideoFile>> {
    if !source.exists() {
        return Err(CompressorError::FileNotFound(source.display().to_string()));
    }

    if source.is_file() {
        if !is_video_file(source) {
            return Err(CompressorError::NotAVideo(source.display().to_string()));
        }
        return Ok(Some(VideoFile::from_path(source)?));
    }

    let mut videos = scan_folder(source)?;
    debug!(folder = %source.display(), count = videos.len(), "動画をスキャン");

    match videos.len() {
        0 => Err(CompressorError::NoVideosFound(source.display().to_string())),
        1 => Ok(videos.pop()),
        _ if !interactive => Ok(Some(videos.swap_remove(0))),
        _ => {
            let items: Vec<String> = videos
                .iter()
                .map(|v| {
                    format!(
                        "{} ({})",
                        v.file_name,
                        video_compressor_common::format_file_size(v.size)
                    )
                })
                .collect();

            let selection = Select::new()
                .with_prompt("圧縮する動画を選択してください")
                .items(&items)
                .default(0)
                .interact_opt()
                .map_err(|e| CompressorError::Prompt(e.to_string()))?;

            Ok(selection.map(|idx| videos.swap_remove(idx)))
        }
    }
}
