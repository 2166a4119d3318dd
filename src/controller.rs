//! 圧縮設定の作成と変換の実行
//!
//! メタデータ取得 → 設定計算 → コンバーター呼び出しをまとめ、
//! 進捗を呼び出し元のコールバックへ流す。

use crate::config::Config;
use crate::convertor::{ConvertJob, ConvertListener, FfmpegConvertor, VideoConvertor};
use crate::error::{CompressorError, Result};
use crate::probe::{FfprobeRetriever, MetadataRetriever};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;
use video_compressor_common::{create_compression_settings, CompressionReport, ConversionInfo};

const CACHE_FILE_PREFIX: &str = "Video_Compressor_";

/// 同一ミリ秒に複数の変換が始まってもファイル名が衝突しないようにする
static LAST_CACHE_STAMP: AtomicI64 = AtomicI64::new(0);

fn next_cache_stamp() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_CACHE_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_CACHE_STAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// 変換中の進捗
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionProgress {
    pub cache_file: PathBuf,
    pub available_size: u64,
    pub progress: f32,
}

/// トリム範囲を設定に反映
pub fn apply_trim(
    info: &mut ConversionInfo,
    start_time_ms: Option<u64>,
    end_time_ms: Option<u64>,
) -> Result<()> {
    if let (Some(start), Some(end)) = (start_time_ms, end_time_ms) {
        if start >= end {
            return Err(CompressorError::InvalidTrim(format!(
                "開始 {}ms が終了 {}ms 以降です",
                start, end
            )));
        }
    }
    if end_time_ms == Some(0) {
        return Err(CompressorError::InvalidTrim("終了 0ms は指定できません".into()));
    }
    if info.original_duration_ms > 0 {
        if let Some(start) = start_time_ms {
            if start >= info.original_duration_ms {
                return Err(CompressorError::InvalidTrim(format!(
                    "開始 {}ms が動画の長さ {}ms を超えています",
                    start, info.original_duration_ms
                )));
            }
        }
        if let Some(end) = end_time_ms {
            if end > info.original_duration_ms {
                return Err(CompressorError::InvalidTrim(format!(
                    "終了 {}ms が動画の長さ {}ms を超えています",
                    end, info.original_duration_ms
                )));
            }
        }
    }
    info.start_time_ms = start_time_ms;
    info.end_time_ms = end_time_ms;
    Ok(())
}

/// コンバーターからの通知を絞り込んで呼び出し元へ流す
struct ProgressFilter<'a> {
    cache_file: &'a Path,
    cancel: &'a AtomicBool,
    needs_update_progress: bool,
    last_available_size: i64,
    on_progress: &'a mut dyn FnMut(ConversionProgress),
}

impl ConvertListener for ProgressFilter<'_> {
    fn check_conversion_canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn did_write_data(&mut self, available_size: i64, progress: f32) {
        if self.check_conversion_canceled() {
            return;
        }
        let available_size = if available_size < 0 {
            file_len(self.cache_file) as i64
        } else {
            available_size
        };

        if !self.needs_update_progress && self.last_available_size == available_size {
            return;
        }
        self.last_available_size = available_size;

        debug!(
            file = %self.cache_file.display(),
            available_size,
            progress,
            "didWriteData"
        );
        (self.on_progress)(ConversionProgress {
            cache_file: self.cache_file.to_path_buf(),
            available_size: available_size as u64,
            progress,
        });
    }
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub struct MediaController {
    retriever: Arc<dyn MetadataRetriever>,
    convertor: Arc<dyn VideoConvertor>,
    video_cache_dir: PathBuf,
    audio_bitrate: u32,
    max_video_bitrate_percent: u8,
}

impl MediaController {
    pub fn new(
        config: &Config,
        retriever: Arc<dyn MetadataRetriever>,
        convertor: Arc<dyn VideoConvertor>,
    ) -> Result<Self> {
        Ok(Self {
            retriever,
            convertor,
            video_cache_dir: config.video_cache_dir()?,
            audio_bitrate: config.audio_bitrate,
            max_video_bitrate_percent: config.max_video_bitrate_percent,
        })
    }

    /// ffprobe / ffmpeg を使う標準構成
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config,
            Arc::new(FfprobeRetriever::new(config.ffprobe())),
            Arc::new(FfmpegConvertor::new(config.ffmpeg())),
        )
    }

    pub fn video_cache_dir(&self) -> &Path {
        &self.video_cache_dir
    }

    /// 出力先のキャッシュファイルパス
    pub fn cache_file_path(&self) -> PathBuf {
        self.video_cache_dir
            .join(format!("{}{}.mp4", CACHE_FILE_PREFIX, next_cache_stamp()))
    }

    /// 動画のメタデータから変換設定を作成
    pub fn create_compression_settings(&self, path: &Path) -> Result<ConversionInfo> {
        let metadata = self.retriever.retrieve(path)?;
        let info = create_compression_settings(
            &path.display().to_string(),
            &metadata,
            self.max_video_bitrate_percent,
        )?;
        debug!(?info, "圧縮設定を作成");
        Ok(info)
    }

    /// 変換を実行（ブロッキング）
    ///
    /// 進捗は `on_progress` に通知され、完了時は必ず progress=1.0 が最後に届く。
    /// キャンセル時は途中のファイルを削除して `Cancelled` を返す。
    pub fn convert_video(
        &self,
        info: &ConversionInfo,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(ConversionProgress),
    ) -> Result<CompressionReport> {
        let cache_file = self.cache_file_path();
        if cache_file.exists() {
            std::fs::remove_file(&cache_file)?;
        }
        std::fs::create_dir_all(&self.video_cache_dir)?;

        let (width, height) = info.oriented_result_size();
        let job = ConvertJob {
            input: PathBuf::from(&info.original_path),
            output: cache_file.clone(),
            width,
            height,
            framerate: info.effective_framerate(),
            bitrate: info.bitrate,
            audio_bitrate: self.audio_bitrate,
            start_time_ms: info.start_time_ms,
            end_time_ms: info.end_time_ms,
            duration_ms: info.output_duration_ms(),
            reencode: info.needs_reencode(),
        };

        debug!(
            path = %info.original_path,
            start = ?info.start_time_ms,
            end = ?info.end_time_ms,
            result_width = width,
            result_height = height,
            rotation = info.rotation,
            original_width = info.original_width,
            original_height = info.original_height,
            framerate = job.framerate,
            bitrate = info.bitrate,
            original_bitrate = info.original_bitrate,
            reencode = job.reencode,
            "begin convert"
        );

        let result = {
            let mut listener = ProgressFilter {
                cache_file: &cache_file,
                cancel,
                needs_update_progress: info.needs_update_progress,
                last_available_size: 0,
                on_progress: &mut *on_progress,
            };
            self.convertor.convert(&job, &mut listener)
        };

        let cancelled = cancel.load(Ordering::Relaxed);
        match result {
            Err(CompressorError::Cancelled) => {
                std::fs::remove_file(&cache_file).ok();
                return Err(CompressorError::Cancelled);
            }
            Err(e) => {
                std::fs::remove_file(&cache_file).ok();
                return Err(e);
            }
            Ok(()) if cancelled => {
                std::fs::remove_file(&cache_file).ok();
                return Err(CompressorError::Cancelled);
            }
            Ok(()) => {}
        }

        let result_size = file_len(&cache_file);
        on_progress(ConversionProgress {
            cache_file: cache_file.clone(),
            available_size: result_size,
            progress: 1.0,
        });

        Ok(CompressionReport {
            info: info.clone(),
            compress_path: cache_file.display().to_string(),
            original_size: file_len(Path::new(&info.original_path)),
            result_size,
            finished_at: chrono::Local::now().to_rfc3339(),
        })
    }
}
