//! ffprobe による動画メタデータ取得
//!
//! ビットレート・長さ・フレームレート・解像度・回転角を読む。
//! 個々の値が取れない場合は 0 として扱う。

use crate::error::{CompressorError, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::debug;
use video_compressor_common::VideoMetadata;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    tags: Option<StreamTags>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Deserialize)]
struct StreamTags {
    #[serde(default)]
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    #[serde(default)]
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
}

/// "30000/1001" 形式のフレームレートを丸めた整数にする
fn parse_frame_rate(value: &str) -> Option<u32> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (rate > 0.0).then(|| rate.round() as u32)
}

fn normalize_rotation(degrees: i64) -> u32 {
    degrees.rem_euclid(360) as u32
}

impl ProbeStream {
    fn rotation(&self) -> u32 {
        if let Some(rotate) = self.tags.as_ref().and_then(|t| t.rotate.as_deref()) {
            if let Ok(deg) = rotate.trim().parse::<i64>() {
                return normalize_rotation(deg);
            }
        }
        // Display Matrix の rotation は反時計回り
        self.side_data_list
            .iter()
            .find_map(|s| s.rotation)
            .map(|deg| normalize_rotation(-(deg.round() as i64)))
            .unwrap_or(0)
    }

    fn framerate(&self) -> u32 {
        self.r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| self.avg_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(0)
    }
}

/// ffprobe の JSON 出力をパース
pub fn parse_ffprobe_json(json: &str, source: &str) -> Result<VideoMetadata> {
    let output: ProbeOutput = serde_json::from_str(json)?;

    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| CompressorError::NoVideoStream(source.to_string()))?;

    let format = output.format.as_ref();

    let bitrate = stream
        .bit_rate
        .as_deref()
        .and_then(|b| b.parse::<u32>().ok())
        .or_else(|| {
            format
                .and_then(|f| f.bit_rate.as_deref())
                .and_then(|b| b.parse::<u32>().ok())
        })
        .unwrap_or(0);

    let duration_secs = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f32>().ok())
        .or_else(|| stream.duration.as_deref().and_then(|d| d.parse::<f32>().ok()))
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        bitrate,
        duration_ms: duration_secs * 1000.0,
        framerate: stream.framerate(),
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        rotation: stream.rotation(),
    })
}

/// ffprobe を実行してメタデータを取得
pub fn probe_video(ffprobe: &str, path: &Path) -> Result<VideoMetadata> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| CompressorError::Probe(format!("ffprobe実行エラー ({}): {}", ffprobe, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompressorError::Probe(format!(
            "ffprobe failed (code {:?}): {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    let metadata = parse_ffprobe_json(&json, &path.display().to_string())?;
    debug!(path = %path.display(), ?metadata, "メタデータ取得");
    Ok(metadata)
}

/// 動画メタデータの取得元
pub trait MetadataRetriever: Send + Sync {
    fn retrieve(&self, path: &Path) -> Result<VideoMetadata>;
}

#[derive(Debug, Clone)]
pub struct FfprobeRetriever {
    ffprobe: String,
}

impl FfprobeRetriever {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl MetadataRetriever for FfprobeRetriever {
    fn retrieve(&self, path: &Path) -> Result<VideoMetadata> {
        probe_video(&self.ffprobe, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_type": "audio",
                "bit_rate": "128000"
            },
            {
                "index": 1,
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "bit_rate": "9500000",
                "tags": { "rotate": "90" }
            }
        ],
        "format": {
            "duration": "12.500000",
            "bit_rate": "9700000"
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let meta = parse_ffprobe_json(SAMPLE, "sample.mp4").unwrap();
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.height, 1080);
        assert_eq!(meta.bitrate, 9_500_000);
        assert_eq!(meta.framerate, 30);
        assert_eq!(meta.rotation, 90);
        assert!((meta.duration_ms - 12_500.0).abs() < 0.5);
    }

    #[test]
    fn test_bitrate_falls_back_to_format() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 480, "r_frame_rate": "25/1"}],
            "format": {"duration": "3.0", "bit_rate": "800000"}
        }"#;
        let meta = parse_ffprobe_json(json, "a.mkv").unwrap();
        assert_eq!(meta.bitrate, 800_000);
        assert_eq!(meta.framerate, 25);
        assert_eq!(meta.rotation, 0);
    }

    #[test]
    fn test_rotation_from_display_matrix() {
        let json = r#"{
            "streams": [{
                "codec_type": "video", "width": 1280, "height": 720,
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]
            }]
        }"#;
        let meta = parse_ffprobe_json(json, "a.mov").unwrap();
        assert_eq!(meta.rotation, 90);
        assert_eq!(meta.framerate, 0);
        assert_eq!(meta.duration_ms, 0.0);
    }

    #[test]
    fn test_no_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        let result = parse_ffprobe_json(json, "song.m4a");
        assert!(matches!(result, Err(CompressorError::NoVideoStream(_))));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("60/1"), Some(60));
        assert_eq!(parse_frame_rate("24000/1001"), Some(24));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("29.97"), Some(30));
    }

    #[test]
    fn test_probe_missing_binary() {
        let result = probe_video("/nonexistent/ffprobe", Path::new("a.mp4"));
        assert!(matches!(result, Err(CompressorError::Probe(_))));
    }
}
