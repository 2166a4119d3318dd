//! 変換設定・メタデータ・レポートの型定義

use serde::{Deserialize, Serialize};

/// 変換前の動画から読み取ったメタデータ
///
/// 取得できなかった値は 0 のまま残る。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// ビットレート (bps)
    pub bitrate: u32,
    /// 長さ (ミリ秒)
    pub duration_ms: f32,
    pub framerate: u32,
    pub width: u32,
    pub height: u32,
    /// 回転角 (0/90/180/270)
    pub rotation: u32,
}

/// 変換設定兼結果レコード
///
/// `create_compression_settings` で一度だけ作られ、以降は読み取り専用で
/// 変換ワーカーと表示側に渡される。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionInfo {
    pub original_path: String,
    pub original_width: u32,
    pub original_height: u32,
    pub result_width: u32,
    pub result_height: u32,
    pub rotation: u32,
    pub framerate: u32,
    /// 目標ビットレート (bps)
    pub bitrate: u32,
    pub original_bitrate: u32,
    pub original_duration_ms: u64,
    pub estimated_duration_ms: u64,

    /// トリム開始 (ミリ秒)。None はトリムなし
    #[serde(default)]
    pub start_time_ms: Option<u64>,

    /// トリム終了 (ミリ秒)
    #[serde(default)]
    pub end_time_ms: Option<u64>,

    /// 書き込みサイズが変わらなくても進捗を通知する
    #[serde(default)]
    pub needs_update_progress: bool,
}

impl ConversionInfo {
    pub fn is_trimmed(&self) -> bool {
        self.start_time_ms.is_some() || self.end_time_ms.is_some()
    }

    /// 出力される区間の長さ (ミリ秒)
    pub fn output_duration_ms(&self) -> u64 {
        match (self.start_time_ms, self.end_time_ms) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            (None, Some(end)) => end,
            (Some(start), None) => self.original_duration_ms.saturating_sub(start),
            (None, None) => self.original_duration_ms,
        }
    }

    /// 回転を反映した出力解像度 (幅, 高さ)
    pub fn oriented_result_size(&self) -> (u32, u32) {
        if self.rotation == 90 || self.rotation == 270 {
            (self.result_height, self.result_width)
        } else {
            (self.result_width, self.result_height)
        }
    }

    /// 再エンコードが必要か
    ///
    /// false の場合はストリームコピーで済む。
    pub fn needs_reencode(&self) -> bool {
        let (width, height) = self.oriented_result_size();
        self.is_trimmed()
            || width != self.original_width
            || height != self.original_height
            || self.rotation != 0
    }

    /// 0 の場合は 25fps とみなす
    pub fn effective_framerate(&self) -> u32 {
        if self.framerate == 0 {
            25
        } else {
            self.framerate
        }
    }
}

/// 完了した変換のレポート (--report / 履歴用)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionReport {
    pub info: ConversionInfo,
    pub compress_path: String,
    pub original_size: u64,
    pub result_size: u64,
    #[serde(default)]
    pub finished_at: String,
}

impl CompressionReport {
    /// 元ファイルに対する圧縮後サイズの割合 (0.0-)
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            0.0
        } else {
            self.result_size as f64 / self.original_size as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_1080p() -> ConversionInfo {
        ConversionInfo {
            original_path: "/videos/a.mp4".into(),
            original_width: 1920,
            original_height: 1080,
            result_width: 1920,
            result_height: 1080,
            original_duration_ms: 10_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_output_duration_without_trim() {
        assert_eq!(info_1080p().output_duration_ms(), 10_000);
    }

    #[test]
    fn test_output_duration_with_trim() {
        let mut info = info_1080p();
        info.start_time_ms = Some(2_000);
        info.end_time_ms = Some(5_000);
        assert_eq!(info.output_duration_ms(), 3_000);

        info.start_time_ms = None;
        assert_eq!(info.output_duration_ms(), 5_000);

        info.start_time_ms = Some(4_000);
        info.end_time_ms = None;
        assert_eq!(info.output_duration_ms(), 6_000);
    }

    #[test]
    fn test_rotation_swaps_result_size() {
        let mut info = info_1080p();
        info.result_width = 1280;
        info.result_height = 720;
        info.rotation = 90;
        assert_eq!(info.oriented_result_size(), (720, 1280));
        info.rotation = 180;
        assert_eq!(info.oriented_result_size(), (1280, 720));
    }

    #[test]
    fn test_needs_reencode() {
        let mut info = info_1080p();
        assert!(!info.needs_reencode());

        info.start_time_ms = Some(1);
        assert!(info.needs_reencode());

        let mut info = info_1080p();
        info.result_width = 1280;
        info.result_height = 720;
        assert!(info.needs_reencode());

        let mut info = info_1080p();
        info.rotation = 180;
        assert!(info.needs_reencode());
    }

    #[test]
    fn test_effective_framerate_defaults_to_25() {
        let mut info = info_1080p();
        assert_eq!(info.effective_framerate(), 25);
        info.framerate = 60;
        assert_eq!(info.effective_framerate(), 60);
    }

    #[test]
    fn test_report_ratio() {
        let report = CompressionReport {
            original_size: 1000,
            result_size: 250,
            ..Default::default()
        };
        assert!((report.ratio() - 0.25).abs() < f64::EPSILON);
        assert_eq!(CompressionReport::default().ratio(), 0.0);
    }
}
