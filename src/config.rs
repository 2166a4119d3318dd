use crate::error::{CompressorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use video_compressor_common::DEFAULT_MAX_BITRATE_PERCENT;

const FFMPEG_ENV: &str = "VIDEO_COMPRESSOR_FFMPEG";
const FFPROBE_ENV: &str = "VIDEO_COMPRESSOR_FFPROBE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// 出力先のキャッシュディレクトリ（未設定ならOSのキャッシュディレクトリ）
    pub cache_dir: Option<PathBuf>,
    pub max_video_bitrate_percent: u8,
    pub audio_bitrate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default_config())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CompressorError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("video-compressor").join("config.json"))
    }

    fn default_config() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            cache_dir: None,
            max_video_bitrate_percent: DEFAULT_MAX_BITRATE_PERCENT,
            audio_bitrate: 64_000,
        }
    }

    /// ffmpegのパス（環境変数を優先）
    pub fn ffmpeg(&self) -> String {
        std::env::var(FFMPEG_ENV).unwrap_or_else(|_| self.ffmpeg_path.clone())
    }

    /// ffprobeのパス（環境変数を優先）
    pub fn ffprobe(&self) -> String {
        std::env::var(FFPROBE_ENV).unwrap_or_else(|_| self.ffprobe_path.clone())
    }

    /// キャッシュのルート（履歴ファイルを置く）
    pub fn cache_base_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::cache_dir()
                .map(|d| d.join("video-compressor"))
                .ok_or_else(|| {
                    CompressorError::Config("キャッシュディレクトリが見つかりません".into())
                }),
        }
    }

    /// 変換後の動画を置くディレクトリ（<cache>/video）
    pub fn video_cache_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_base_dir()?.join("video"))
    }

    pub fn set_max_video_bitrate_percent(&mut self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(CompressorError::Config(format!(
                "最大ビットレートは0-100で指定してください: {}",
                percent
            )));
        }
        self.max_video_bitrate_percent = percent;
        Ok(())
    }
}
