//! 圧縮設定の計算
//!
//! 元動画の解像度とビットレートから出力解像度・目標ビットレートを決める。
//! 計算は f32 で行い、整数への変換は切り捨て。

use crate::error::{Error, Result};
use crate::types::{ConversionInfo, VideoMetadata};

/// 最大ビットレート設定のデフォルト (%)
pub const DEFAULT_MAX_BITRATE_PERCENT: u8 = 100;

/// 長辺の長さから選択可能な圧縮段階数を返す
pub fn compressions_count(max_side: u32) -> u32 {
    if max_side > 1280 {
        4
    } else if max_side > 854 {
        3
    } else if max_side > 640 {
        2
    } else {
        1
    }
}

/// 最大ビットレート設定 (%) から圧縮段階を選ぶ (1..=count)
pub fn selected_compression(count: u32, max_bitrate_percent: u8) -> u32 {
    let count = count.max(1);
    let step = 100.0_f32 / count as f32;
    let selected = (f32::from(max_bitrate_percent.min(100)) / step).round() as u32;
    selected.clamp(1, count)
}

/// 圧縮段階ごとの長辺
fn target_long_side(selected: u32) -> f32 {
    match selected {
        1 => 432.0,
        2 => 640.0,
        3 => 848.0,
        _ => 1280.0,
    }
}

/// 長辺を `max_size` に合わせて縮小した解像度 (偶数に丸める)
pub fn scaled_dimensions(width: u32, height: u32, max_size: f32) -> (u32, u32) {
    let scale = if width > height {
        max_size / width as f32
    } else {
        max_size / height as f32
    };
    let scaled_width = (width as f32 * scale / 2.0).round() as u32 * 2;
    let scaled_height = (height as f32 * scale / 2.0).round() as u32 * 2;
    (scaled_width, scaled_height)
}

fn bitrate_with_factor(factor: f32) -> u32 {
    (factor * 2000.0 * 1000.0 * 1.13) as u32
}

/// 出力解像度に合わせた目標ビットレートを計算
pub fn make_video_bitrate(
    original_height: u32,
    original_width: u32,
    original_bitrate: u32,
    height: u32,
    width: u32,
) -> u32 {
    if height == 0 || width == 0 {
        return original_bitrate;
    }

    let min_side = height.min(width);
    let (max_bitrate, compress_factor, min_compress_factor) = if min_side >= 1080 {
        (6_800_000, 1.0_f32, 1.0_f32)
    } else if min_side >= 720 {
        (3_200_000, 1.0, 1.0)
    } else if min_side >= 480 {
        (1_000_000, 0.8, 0.9)
    } else {
        (750_000, 0.6, 0.7)
    };

    let ratio = (original_height as f32 / height as f32).min(original_width as f32 / width as f32);
    let remeasured = (original_bitrate as f32 / ratio) as u32;
    let remeasured = (remeasured as f32 * compress_factor) as u32;

    let pixels = (width as u64 * height as u64) as f32;
    let min_bitrate =
        (bitrate_with_factor(min_compress_factor) as f32 / (1280.0 * 720.0 / pixels)) as u32;

    if original_bitrate < min_bitrate {
        return remeasured;
    }
    if remeasured > max_bitrate {
        return max_bitrate;
    }
    remeasured.max(min_bitrate)
}

/// メタデータから変換設定を作成
///
/// `max_bitrate_percent` は最大ビットレート設定 (0-100)。100 で最高画質段階。
pub fn create_compression_settings(
    path: &str,
    metadata: &VideoMetadata,
    max_bitrate_percent: u8,
) -> Result<ConversionInfo> {
    if metadata.width == 0 || metadata.height == 0 {
        return Err(Error::InvalidVideo(format!(
            "{}: 解像度を取得できません ({}x{})",
            path, metadata.width, metadata.height
        )));
    }

    let mut info = ConversionInfo {
        original_path: path.to_string(),
        original_width: metadata.width,
        original_height: metadata.height,
        result_width: metadata.width,
        result_height: metadata.height,
        rotation: metadata.rotation,
        framerate: metadata.framerate,
        bitrate: metadata.bitrate,
        original_bitrate: metadata.bitrate,
        original_duration_ms: metadata.duration_ms.max(0.0) as u64,
        estimated_duration_ms: metadata.duration_ms.max(0.0).ceil() as u64,
        ..Default::default()
    };

    let max_side = metadata.width.max(metadata.height);
    let count = compressions_count(max_side);
    let selected = selected_compression(count, max_bitrate_percent);

    let needs_compress = selected != count - 1 || max_side > 1280;
    if needs_compress {
        let (width, height) =
            scaled_dimensions(metadata.width, metadata.height, target_long_side(selected));
        info.result_width = width;
        info.result_height = height;
    }

    info.bitrate = make_video_bitrate(
        info.original_height,
        info.original_width,
        metadata.bitrate,
        info.result_height,
        info.result_width,
    );

    Ok(info)
}
