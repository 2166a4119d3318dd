//! エラー型定義

use thiserror::Error;

/// 共通エラー型
///
/// 共通ライブラリはI/Oを持たないため、入力値の検証エラーのみ。
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Invalid video: {0}")]
    InvalidVideo(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_video() {
        let error = Error::InvalidVideo("解像度が0です".to_string());
        assert_eq!(format!("{}", error), "Invalid video: 解像度が0です");
    }
}
