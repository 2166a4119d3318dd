use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use video_compressor::{cli, config, controller, display, history, permission, picker, probe, relay};
use video_compressor_common::{create_compression_settings, format_file_size, CompressionReport};

use cli::{Cli, Commands};
use config::Config;
use controller::MediaController;
use display::{DisplayState, TaskOutcome};
use history::{ConversionHistory, RequestedSettings};
use relay::{ConversionRequest, Relay};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load().context("設定ファイルの読み込みに失敗しました")?;

    match cli.command {
        Commands::Compress { inputs, quality, start, end, report, yes, use_cache } => {
            println!("🎬 video-compressor - 動画圧縮\n");

            let mut config = config;
            if let Some(percent) = quality {
                config.set_max_video_bitrate_percent(percent)?;
            }
            let base_dir = config.cache_base_dir()?;
            let controller = Arc::new(MediaController::from_config(&config)?);

            // 1. 権限確認 → 動画選択
            println!("[1/3] 動画を選択中...");
            let picked = permission::with_write_permission(controller.video_cache_dir(), || {
                let mut picked = Vec::new();
                for input in &inputs {
                    match picker::pick_video(input, !yes)? {
                        Some(video) => picked.push(video),
                        None => println!("- 選択がキャンセルされました: {}", input.display()),
                    }
                }
                Ok(picked)
            });
            let picked = match picked {
                Ok(picked) => picked,
                Err(e @ video_compressor::error::CompressorError::PermissionDenied(_)) => {
                    println!("{}", permission::PERMISSION_DENIED_MESSAGE);
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };
            println!("✔ {}本の動画を選択\n", picked.len());

            let mut history = ConversionHistory::load(&base_dir);
            let mut reports: Vec<CompressionReport> = Vec::new();

            // 2. 変換（選択ごとに1タスク）
            println!("[2/3] 変換中...{}", if use_cache { " (履歴有効)" } else { "" });
            let (mut relay, receiver) = Relay::new(Arc::clone(&controller));
            let requested = RequestedSettings {
                max_video_bitrate_percent: config.max_video_bitrate_percent,
                start_time_ms: start,
                end_time_ms: end,
            };
            let mut handles = Vec::new();
            for video in picked {
                if use_cache {
                    if let Some(previous) = history.find_previous(&video.path, &requested) {
                        println!("- 変換済みのためスキップ: {} → {}", video.file_name, previous.compress_path);
                        reports.push(previous.clone());
                        continue;
                    }
                }
                handles.push(relay.spawn(ConversionRequest {
                    source: video.path,
                    start_time_ms: start,
                    end_time_ms: end,
                }));
            }
            drop(relay);

            let outcomes = display::run_display_loop(receiver, &handles, DisplayState::new()).await;
            for handle in handles {
                handle.join();
            }

            let mut failures = 0;
            let mut finished = Vec::new();
            for (_, outcome) in &outcomes {
                match outcome {
                    TaskOutcome::Finished(report) => {
                        println!(
                            "✔ {} → {} ({:.0}%)",
                            report.info.original_path,
                            format_file_size(report.result_size),
                            report.ratio() * 100.0
                        );
                        finished.push(report.clone());
                    }
                    TaskOutcome::Failed(_) | TaskOutcome::Cancelled => failures += 1,
                }
            }
            history.record_batch(&finished, failures, config.max_video_bitrate_percent);
            history.save(&base_dir)?;
            reports.extend(finished);
            println!("✔ 変換完了 ({}件成功, {}件失敗)\n", outcomes.len() - failures, failures);

            // 3. レポート保存
            if let Some(report_path) = report {
                println!("[3/3] レポートを保存中...");
                let json = serde_json::to_string_pretty(&reports)?;
                std::fs::write(&report_path, json)
                    .with_context(|| format!("レポートを書き込めません: {}", report_path.display()))?;
                println!("✔ レポートを保存: {}", report_path.display());
            }

            if failures > 0 {
                bail!("{}件の変換に失敗しました", failures);
            }
            println!("\n✅ 完了");
        }

        Commands::Probe { input } => {
            println!("🔍 video-compressor - メタデータ\n");

            if !picker::is_video_file(&input) {
                bail!("動画ファイルではありません: {}", input.display());
            }
            let metadata = probe::probe_video(&config.ffprobe(), &input)?;
            println!("メタデータ:");
            println!("  解像度: {}x{}", metadata.width, metadata.height);
            println!("  回転: {}°", metadata.rotation);
            println!("  フレームレート: {}", metadata.framerate);
            println!("  ビットレート: {} bps", metadata.bitrate);
            println!("  長さ: {:.1}秒", metadata.duration_ms / 1000.0);

            let info = create_compression_settings(
                &input.display().to_string(),
                &metadata,
                config.max_video_bitrate_percent,
            )?;
            println!("\n圧縮設定:");
            println!("  出力解像度: {}x{}", info.result_width, info.result_height);
            println!("  目標ビットレート: {} bps", info.bitrate);
            println!("  再エンコード: {}", if info.needs_reencode() { "あり" } else { "なし" });
        }

        Commands::Config { show, set_ffmpeg, set_ffprobe, set_cache_dir, set_quality } => {
            let mut config = config;
            let mut changed = false;

            if let Some(path) = set_ffmpeg {
                config.ffmpeg_path = path;
                changed = true;
            }
            if let Some(path) = set_ffprobe {
                config.ffprobe_path = path;
                changed = true;
            }
            if let Some(dir) = set_cache_dir {
                config.cache_dir = Some(dir);
                changed = true;
            }
            if let Some(percent) = set_quality {
                config.set_max_video_bitrate_percent(percent)?;
                changed = true;
            }

            if changed {
                config.save()?;
                println!("✔ 設定を保存しました");
            }

            if show || !changed {
                println!("設定:");
                println!("  ffmpeg: {}", config.ffmpeg());
                println!("  ffprobe: {}", config.ffprobe());
                println!("  キャッシュ: {}", config.cache_base_dir()?.display());
                println!("  最大ビットレート: {}%", config.max_video_bitrate_percent);
                println!("  音声ビットレート: {} bps", config.audio_bitrate);
            }
        }

        Commands::Cache { clear, info } => {
            let base_dir = config.cache_base_dir()?;
            let video_dir = config.video_cache_dir()?;

            if info || !clear {
                let history = ConversionHistory::load(&base_dir);
                let (count, total) = cached_videos(&video_dir);
                println!("キャッシュ情報:");
                println!("  パス: {}", base_dir.display());
                println!("  履歴件数: {}", history.len());
                println!("  前回の変換: {}", if history.is_previous_ok() { "成功" } else { "未完了" });
                println!("  変換済み動画: {}本 ({})", count, format_file_size(total));
            }

            if clear {
                let removed = clear_cached_videos(&video_dir)?;
                ConversionHistory::clear(&base_dir)?;
                println!("✔ キャッシュを削除しました ({}本)", removed);
            }
        }
    }

    Ok(())
}

fn cache_entries(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

fn cached_videos(dir: &Path) -> (usize, u64) {
    let files = cache_entries(dir);
    let total = files
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    (files.len(), total)
}

fn clear_cached_videos(dir: &Path) -> anyhow::Result<usize> {
    let files = cache_entries(dir);
    for file in &files {
        std::fs::remove_file(file)
            .with_context(|| format!("削除できません: {}", file.display()))?;
    }
    Ok(files.len())
}
