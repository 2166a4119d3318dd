use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "video-compressor")]
#[command(about = "動画圧縮ツール（ffmpegバックエンド）", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 動画を圧縮（入力ごとに1タスク）
    Compress {
        /// 動画ファイルまたはフォルダ
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// 最大ビットレート割合（0-100、省略時は設定値）
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
        quality: Option<u8>,

        /// トリム開始（ミリ秒）
        #[arg(long)]
        start: Option<u64>,

        /// トリム終了（ミリ秒）
        #[arg(long)]
        end: Option<u64>,

        /// 完了した変換のレポートJSON
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// フォルダ指定時に確認せず先頭の動画を選ぶ
        #[arg(short, long)]
        yes: bool,

        /// 変換履歴を使用（同じ動画の再変換をスキップ）
        #[arg(long)]
        use_cache: bool,
    },

    /// 動画のメタデータと圧縮設定を表示
    Probe {
        /// 動画ファイル
        #[arg(required = true)]
        input: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// ffmpegのパスを設定
        #[arg(long)]
        set_ffmpeg: Option<String>,

        /// ffprobeのパスを設定
        #[arg(long)]
        set_ffprobe: Option<String>,

        /// キャッシュディレクトリを設定
        #[arg(long)]
        set_cache_dir: Option<PathBuf>,

        /// 最大ビットレート割合を設定（0-100）
        #[arg(long)]
        set_quality: Option<u8>,
    },

    /// 変換履歴・キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compress() {
        let cli = Cli::try_parse_from([
            "video-compressor",
            "compress",
            "a.mp4",
            "b.mov",
            "--quality",
            "50",
            "--start",
            "1000",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Compress {
                inputs,
                quality,
                start,
                end,
                yes,
                ..
            } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(quality, Some(50));
                assert_eq!(start, Some(1000));
                assert_eq!(end, None);
                assert!(!yes);
            }
            _ => panic!("compress expected"),
        }
    }

    #[test]
    fn test_quality_out_of_range() {
        let result =
            Cli::try_parse_from(["video-compressor", "compress", "a.mp4", "--quality", "150"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_compress_requires_input() {
        assert!(Cli::try_parse_from(["video-compressor", "compress"]).is_err());
    }
}
