//! 変換履歴モジュール
//!
//! 元動画のSHA-256ハッシュをキーに変換結果を記録し、
//! 同じ動画の再変換をスキップできるようにする。
//! 前回の変換が成功したかどうかのフラグもここに保存する。

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use video_compressor_common::CompressionReport;

const HISTORY_FILE_NAME: &str = "videoconvert.json";

/// 履歴ファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionHistory {
    /// バージョン（互換性チェック用）
    version: u32,
    /// 前回の変換が成功したか
    #[serde(default)]
    is_previous_ok: bool,
    /// ファイルハッシュ → 変換結果のマップ
    #[serde(default)]
    entries: HashMap<String, HistoryEntry>,
}

/// 変換時に指定された設定（再利用の一致判定に使う）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedSettings {
    pub max_video_bitrate_percent: u8,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
}

/// 履歴エントリ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub file_name: String,
    pub file_size: u64,
    pub settings: RequestedSettings,
    pub report: CompressionReport,
}

impl ConversionHistory {
    const CURRENT_VERSION: u32 = 2;

    pub fn history_path(dir: &Path) -> PathBuf {
        dir.join(HISTORY_FILE_NAME)
    }

    /// 履歴ファイルを読み込み（無い・壊れている場合は空）
    pub fn load(dir: &Path) -> Self {
        let path = Self::history_path(dir);
        if !path.exists() {
            return Self::default();
        }

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        match serde_json::from_reader::<_, ConversionHistory>(BufReader::new(file)) {
            Ok(history) if history.version == Self::CURRENT_VERSION => history,
            Ok(_) => {
                warn!(path = %path.display(), "履歴バージョン不一致、再生成します");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "履歴ファイルを読めません");
                Self::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let file = File::create(Self::history_path(dir))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn is_previous_ok(&self) -> bool {
        self.is_previous_ok
    }

    pub fn get(&self, hash: &str) -> Option<&HistoryEntry> {
        self.entries.get(hash)
    }

    pub fn insert(&mut self, hash: String, entry: HistoryEntry) {
        self.entries.insert(hash, entry);
    }

    /// 変換成功を記録
    pub fn record_finished(
        &mut self,
        report: &CompressionReport,
        max_video_bitrate_percent: u8,
    ) -> Result<()> {
        let source = Path::new(&report.info.original_path);
        let hash = compute_file_hash(source)?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        debug!(%hash, %file_name, "変換履歴を記録");
        self.insert(
            hash,
            HistoryEntry {
                file_name,
                file_size: report.original_size,
                settings: RequestedSettings {
                    max_video_bitrate_percent,
                    start_time_ms: report.info.start_time_ms,
                    end_time_ms: report.info.end_time_ms,
                },
                report: report.clone(),
            },
        );
        self.is_previous_ok = true;
        Ok(())
    }

    /// 1回の実行分の結果を記録
    ///
    /// 1件でも失敗があれば成功フラグは false になる。記録できた件数を返す。
    pub fn record_batch(
        &mut self,
        finished: &[CompressionReport],
        failures: usize,
        max_video_bitrate_percent: u8,
    ) -> usize {
        let mut recorded = 0;
        for report in finished {
            match self.record_finished(report, max_video_bitrate_percent) {
                Ok(()) => recorded += 1,
                Err(e) => warn!(path = %report.info.original_path, error = %e, "履歴の記録に失敗"),
            }
        }
        if failures > 0 {
            self.mark_failed();
        }
        recorded
    }

    pub fn mark_failed(&mut self) {
        self.is_previous_ok = false;
    }

    /// 同じ動画を同じ設定で変換した結果があり、出力ファイルが残っていれば返す
    pub fn find_previous(
        &self,
        source: &Path,
        settings: &RequestedSettings,
    ) -> Option<&CompressionReport> {
        let hash = compute_file_hash(source).ok()?;
        self.get(&hash)
            .filter(|e| e.settings == *settings)
            .map(|e| &e.report)
            .filter(|r| Path::new(&r.compress_path).exists())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 履歴ファイルを削除（存在しなければ false）
    pub fn clear(dir: &Path) -> Result<bool> {
        let path = Self::history_path(dir);
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

impl Default for ConversionHistory {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            is_previous_ok: false,
            entries: HashMap::new(),
        }
    }
}

/// ファイル内容のSHA-256（16進）
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hash_is_stable_and_content_based() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();

        let ha = compute_file_hash(&a).unwrap();
        assert_eq!(ha, compute_file_hash(&b).unwrap());
        assert_eq!(ha.len(), 64);

        std::fs::write(&b, b"different").unwrap();
        assert_ne!(ha, compute_file_hash(&b).unwrap());
    }

    #[test]
    fn test_version_mismatch_resets() {
        let dir = tempdir().unwrap();
        std::fs::write(
            ConversionHistory::history_path(dir.path()),
            r#"{"version": 99, "is_previous_ok": true, "entries": {}}"#,
        )
        .unwrap();

        let history = ConversionHistory::load(dir.path());
        assert!(!history.is_previous_ok());
        assert!(history.is_empty());
    }

    #[test]
    fn test_broken_file_is_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(ConversionHistory::history_path(dir.path()), "{not json").unwrap();
        assert!(ConversionHistory::load(dir.path()).is_empty());
    }
}
