//! Video Compressor Common Library
//!
//! CLIと変換ワーカーで共有される型・圧縮設定の計算・表示フォーマット

pub mod types;
pub mod settings;
pub mod format;
pub mod error;

pub use types::{CompressionReport, ConversionInfo, VideoMetadata};
pub use settings::{
    compressions_count, create_compression_settings, make_video_bitrate, scaled_dimensions,
    selected_compression, DEFAULT_MAX_BITRATE_PERCENT,
};
pub use format::{format_file_size, render_summary, SUMMARY_SEPARATOR};
pub use error::{Error, Result};
