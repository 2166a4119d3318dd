//! 表示用フォーマット

use crate::types::ConversionInfo;

/// 元動画と変換結果の区切り線
pub const SUMMARY_SEPARATOR: &str =
    "-------------------------------------------------------------------";

/// ファイルサイズを人間向けに整形
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if size == 0 {
        "0 KB".to_string()
    } else if size < KB {
        format!("{} B", size)
    } else if size < MB {
        format!("{:.1} KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.1} MB", size as f64 / MB as f64)
    } else {
        format!("{:.2} GB", size as f64 / GB as f64)
    }
}

/// 変換状況のサマリーテキストを生成
///
/// `progress` は 0.0-1.0。表示は百分率で小数1桁。
pub fn render_summary(
    info: &ConversionInfo,
    original_size: u64,
    compress_path: &str,
    available_size: u64,
    progress: f32,
) -> String {
    let lines = [
        format!("originalPath:{}", info.original_path),
        format!("originalHeight:{}", info.original_height),
        format!("originalWidth:{}", info.original_width),
        format!("originalSize:{}", format_file_size(original_size)),
        String::new(),
        SUMMARY_SEPARATOR.to_string(),
        String::new(),
        format!("compressPath:{}", compress_path),
        format!("resultHeight:{}", info.result_height),
        format!("resultWidth:{}", info.result_width),
        format!("availableSize:{}", format_file_size(available_size)),
        format!("progress:{:.1}", progress * 100.0),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size_units() {
        assert_eq!(format_file_size(0), "0 KB");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_render_summary_progress_line() {
        let info = ConversionInfo {
            original_path: "/sdcard/DCIM/clip.mp4".into(),
            original_width: 1920,
            original_height: 1080,
            result_width: 1280,
            result_height: 720,
            ..Default::default()
        };
        let text = render_summary(&info, 2048, "/cache/video/out.mp4", 1024, 0.42);

        let progress_line = text.lines().last().unwrap();
        assert!(progress_line.starts_with("progress:"));
        assert!(progress_line.contains("42.0"));

        assert!(text.contains("originalPath:/sdcard/DCIM/clip.mp4"));
        assert!(text.contains("originalSize:2.0 KB"));
        assert!(text.contains("compressPath:/cache/video/out.mp4"));
        assert!(text.contains("resultHeight:720"));
        assert!(text.contains("resultWidth:1280"));
        assert!(text.contains("availableSize:1.0 KB"));
        assert!(text.contains(SUMMARY_SEPARATOR));
    }

    #[test]
    fn test_render_summary_complete() {
        let info = ConversionInfo::default();
        let text = render_summary(&info, 0, "", 0, 1.0);
        assert!(text.ends_with("progress:100.0"));
    }
}
