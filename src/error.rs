use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressorError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("動画ファイルではありません: {0}")]
    NotAVideo(String),

    #[error("動画が見つかりません: {0}")]
    NoVideosFound(String),

    #[error("書き込み権限がありません: {0}")]
    PermissionDenied(String),

    #[error("メタデータ取得エラー: {0}")]
    Probe(String),

    #[error("映像トラックがありません: {0}")]
    NoVideoStream(String),

    #[error("トリム指定が不正です: {0}")]
    InvalidTrim(String),

    #[error("変換エラー: {0}")]
    Conversion(String),

    #[error("変換がキャンセルされました")]
    Cancelled,

    #[error("入力エラー: {0}")]
    Prompt(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Common(#[from] video_compressor_common::Error),
}

pub type Result<T> = std::result::Result<T, CompressorError>;
