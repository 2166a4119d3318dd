//! 出力先ディレクトリの書き込み権限チェック
//!
//! 権限が得られなければ動画選択に進まない。

use crate::error::{CompressorError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// 権限拒否時にユーザーへ表示するメッセージ
pub const PERMISSION_DENIED_MESSAGE: &str =
    "⚠ この動作確認にはキャッシュディレクトリへの書き込み権限が必要です";

const PROBE_FILE_NAME: &str = ".write-permission-check";

/// ログ相関用のリクエストコード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCode {
    WriteStorage = 2,
    CompressVideo = 3,
}

impl RequestCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied(String),
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// ディレクトリを作成し、実際に書き込めるかを確認
pub fn request_write_permission(dir: &Path) -> PermissionStatus {
    debug!(
        request_code = RequestCode::WriteStorage.code(),
        dir = %dir.display(),
        "書き込み権限を確認"
    );

    if let Err(e) = std::fs::create_dir_all(dir) {
        return PermissionStatus::Denied(e.to_string());
    }

    let probe = dir.join(PROBE_FILE_NAME);
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            std::fs::remove_file(&probe).ok();
            PermissionStatus::Granted
        }
        Err(e) => PermissionStatus::Denied(e.to_string()),
    }
}

/// 権限が得られた場合のみ `on_granted` を実行
///
/// 拒否された場合は再試行せず `PermissionDenied` を返す。
pub fn with_write_permission<T>(dir: &Path, on_granted: impl FnOnce() -> Result<T>) -> Result<T> {
    match request_write_permission(dir) {
        PermissionStatus::Granted => on_granted(),
        PermissionStatus::Denied(reason) => {
            warn!(dir = %dir.display(), %reason, "書き込み権限が拒否されました");
            Err(CompressorError::PermissionDenied(format!(
                "{} ({})",
                dir.display(),
                reason
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_request_codes() {
        assert_eq!(RequestCode::WriteStorage.code(), 2);
        assert_eq!(RequestCode::CompressVideo.code(), 3);
    }

    #[test]
    fn test_granted_creates_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("cache").join("video");

        let status = request_write_permission(&target);
        assert!(status.is_granted());
        assert!(target.is_dir());
        assert!(!target.join(PROBE_FILE_NAME).exists());
    }

    #[test]
    fn test_denied_when_parent_is_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a dir").unwrap();

        let status = request_write_permission(&blocker.join("video"));
        assert!(matches!(status, PermissionStatus::Denied(_)));
    }

    #[test]
    fn test_denied_does_not_run_picker() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a dir").unwrap();

        let mut picker_launched = false;
        let result = with_write_permission(&blocker.join("video"), || {
            picker_launched = true;
            Ok(())
        });

        assert!(matches!(result, Err(CompressorError::PermissionDenied(_))));
        assert!(!picker_launched);
    }

    #[test]
    fn test_granted_runs_picker() {
        let dir = tempdir().unwrap();
        let mut picker_launched = false;
        let result = with_write_permission(dir.path(), || {
            picker_launched = true;
            Ok(42)
        });

        assert_eq!(result.unwrap(), 42);
        assert!(picker_launched);
    }
}
