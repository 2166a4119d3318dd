//! 動画変換エンジン
//!
//! 変換処理そのものは `VideoConvertor` の実装に任せる。
//! 標準実装の `FfmpegConvertor` は ffmpeg を子プロセスとして起動し、
//! `-progress pipe:1` の出力から進捗を読む。

use crate::error::{CompressorError, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// 変換ジョブ（コンバーターに渡す確定済みパラメータ）
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// 回転反映後の出力幅
    pub width: u32,
    /// 回転反映後の出力高さ
    pub height: u32,
    pub framerate: u32,
    pub bitrate: u32,
    pub audio_bitrate: u32,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    /// 出力区間の長さ（進捗計算用）
    pub duration_ms: u64,
    /// false ならストリームコピー
    pub reencode: bool,
}

/// 変換中のコールバック
pub trait ConvertListener {
    fn check_conversion_canceled(&self) -> bool;

    /// `available_size` が負の場合は出力ファイルのサイズを使う
    fn did_write_data(&mut self, available_size: i64, progress: f32);
}

pub trait VideoConvertor: Send + Sync {
    fn convert(&self, job: &ConvertJob, listener: &mut dyn ConvertListener) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegConvertor {
    ffmpeg: String,
}

impl FfmpegConvertor {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// ffmpeg の引数を組み立てる
    pub fn build_args(job: &ConvertJob) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-v", "error", "-nostats", "-progress", "pipe:1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(start) = job.start_time_ms {
            args.push("-ss".into());
            args.push(format_seconds(start));
        }

        args.push("-i".into());
        args.push(job.input.display().to_string());

        if job.end_time_ms.is_some() {
            args.push("-t".into());
            args.push(format_seconds(job.duration_ms));
        }

        if job.reencode {
            let bitrate = job.bitrate.to_string();
            args.extend([
                "-c:v".to_string(),
                "libx264".into(),
                "-preset".into(),
                "medium".into(),
                "-b:v".into(),
                bitrate.clone(),
                "-maxrate".into(),
                bitrate,
                "-bufsize".into(),
                (u64::from(job.bitrate) * 2).to_string(),
                "-r".into(),
                job.framerate.to_string(),
                "-vf".into(),
                format!("scale={}:{}", job.width, job.height),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                job.audio_bitrate.to_string(),
            ]);
        } else {
            args.push("-c".into());
            args.push("copy".into());
        }

        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(job.output.display().to_string());
        args
    }
}

fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// `-progress` 出力の1ブロック分の結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub available_size: i64,
    pub progress: f32,
    pub finished: bool,
}

/// `-progress` の key=value 行を読み、ブロック終端で進捗を返す
#[derive(Debug)]
pub struct ProgressParser {
    duration_us: u64,
    out_time_us: u64,
    total_size: i64,
}

impl ProgressParser {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_us: duration_ms * 1000,
            out_time_us: 0,
            total_size: -1,
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<ProgressUpdate> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            // out_time_ms も実際はマイクロ秒
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time_us = us;
                }
                None
            }
            "total_size" => {
                self.total_size = value.parse::<i64>().unwrap_or(-1);
                None
            }
            "progress" => {
                let finished = value == "end";
                let progress = if finished {
                    1.0
                } else if self.duration_us == 0 {
                    0.0
                } else {
                    (self.out_time_us as f64 / self.duration_us as f64).clamp(0.0, 1.0) as f32
                };
                Some(ProgressUpdate {
                    available_size: self.total_size,
                    progress,
                    finished,
                })
            }
            _ => None,
        }
    }
}

const STDERR_TAIL_LINES: usize = 20;

impl VideoConvertor for FfmpegConvertor {
    fn convert(&self, job: &ConvertJob, listener: &mut dyn ConvertListener) -> Result<()> {
        let args = Self::build_args(job);
        debug!(ffmpeg = %self.ffmpeg, ?args, "ffmpeg起動");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CompressorError::Conversion(format!("ffmpeg実行エラー ({}): {}", self.ffmpeg, e))
            })?;

        // stderr は別スレッドで読み切る（パイプ詰まり防止）
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                stderr.read_to_string(&mut buf).ok();
                buf
            })
        });

        let mut parser = ProgressParser::new(job.duration_ms);
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(std::result::Result::ok) {
                if listener.check_conversion_canceled() {
                    child.kill().ok();
                    child.wait().ok();
                    return Err(CompressorError::Cancelled);
                }
                if let Some(update) = parser.feed(&line) {
                    listener.did_write_data(update.available_size, update.progress);
                }
            }
        }

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(CompressorError::Conversion(format!(
                "ffmpeg failed (code {:?}): {}",
                status.code(),
                tail.join("\n")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ConvertJob {
        ConvertJob {
            input: PathBuf::from("/in/clip.mov"),
            output: PathBuf::from("/cache/video/out.mp4"),
            width: 1280,
            height: 720,
            framerate: 30,
            bitrate: 3_200_000,
            audio_bitrate: 64_000,
            start_time_ms: None,
            end_time_ms: None,
            duration_ms: 10_000,
            reencode: true,
        }
    }

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_build_args_reencode() {
        let args = FfmpegConvertor::build_args(&job());
        let vf = position(&args, "-vf").unwrap();
        assert_eq!(args[vf + 1], "scale=1280:720");
        let bv = position(&args, "-b:v").unwrap();
        assert_eq!(args[bv + 1], "3200000");
        let bufsize = position(&args, "-bufsize").unwrap();
        assert_eq!(args[bufsize + 1], "6400000");
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().unwrap(), "/cache/video/out.mp4");
        assert!(position(&args, "-ss").is_none());
        assert!(position(&args, "-t").is_none());
    }

    #[test]
    fn test_build_args_stream_copy() {
        let mut job = job();
        job.reencode = false;
        let args = FfmpegConvertor::build_args(&job);
        let c = position(&args, "-c").unwrap();
        assert_eq!(args[c + 1], "copy");
        assert!(position(&args, "-vf").is_none());
    }

    #[test]
    fn test_build_args_trim() {
        let mut job = job();
        job.start_time_ms = Some(1_500);
        job.end_time_ms = Some(4_000);
        job.duration_ms = 2_500;
        let args = FfmpegConvertor::build_args(&job);

        let ss = position(&args, "-ss").unwrap();
        let input = position(&args, "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "1.500");
        let t = position(&args, "-t").unwrap();
        assert_eq!(args[t + 1], "2.500");
    }

    #[test]
    fn test_progress_parser_block() {
        let mut parser = ProgressParser::new(10_000);
        assert_eq!(parser.feed("frame=120"), None);
        assert_eq!(parser.feed("total_size=262144"), None);
        assert_eq!(parser.feed("out_time_us=4200000"), None);
        let update = parser.feed("progress=continue").unwrap();
        assert_eq!(update.available_size, 262_144);
        assert!((update.progress - 0.42).abs() < 1e-6);
        assert!(!update.finished);
    }

    #[test]
    fn test_progress_parser_end() {
        let mut parser = ProgressParser::new(10_000);
        parser.feed("total_size=N/A");
        let update = parser.feed("progress=end").unwrap();
        assert_eq!(update.available_size, -1);
        assert_eq!(update.progress, 1.0);
        assert!(update.finished);
    }

    #[test]
    fn test_progress_parser_clamps_and_handles_zero_duration() {
        let mut parser = ProgressParser::new(1_000);
        parser.feed("out_time_us=5000000");
        assert_eq!(parser.feed("progress=continue").unwrap().progress, 1.0);

        let mut parser = ProgressParser::new(0);
        parser.feed("out_time_us=5000000");
        assert_eq!(parser.feed("progress=continue").unwrap().progress, 0.0);
    }

    struct NullListener;

    impl ConvertListener for NullListener {
        fn check_conversion_canceled(&self) -> bool {
            false
        }
        fn did_write_data(&mut self, _available_size: i64, _progress: f32) {}
    }

    #[test]
    fn test_missing_ffmpeg_binary() {
        let convertor = FfmpegConvertor::new("/nonexistent/ffmpeg");
        let result = convertor.convert(&job(), &mut NullListener);
        assert!(matches!(result, Err(CompressorError::Conversion(_))));
    }
}
