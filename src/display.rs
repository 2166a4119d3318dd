//! 表示ループ
//!
//! 受信したイベントを単一スレッドで処理し、タスクごとの進捗バーと
//! サマリーテキストを更新する。

use crate::relay::{ConversionEvent, TaskHandle, TaskId, TaskMessage};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use video_compressor_common::{format_file_size, render_summary, CompressionReport};

const BAR_LENGTH: u64 = 1000;

/// タスクの最終結果
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Finished(CompressionReport),
    Failed(String),
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Finished(_))
    }
}

struct TaskView {
    bar: ProgressBar,
    original_size: Option<u64>,
    summary: Option<String>,
}

/// 表示側の状態
pub struct DisplayState {
    multi: MultiProgress,
    views: HashMap<TaskId, TaskView>,
    outcomes: Vec<(TaskId, TaskOutcome)>,
    print_summaries: bool,
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl DisplayState {
    /// 端末に描画する表示状態
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr(), true)
    }

    /// 何も描画しない表示状態（テスト用）
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden(), false)
    }

    fn with_target(target: ProgressDrawTarget, print_summaries: bool) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            views: HashMap::new(),
            outcomes: Vec::new(),
            print_summaries,
        }
    }

    /// タスクを表示対象に登録
    pub fn register(&mut self, task_id: TaskId, source: &Path) {
        let bar = self.multi.add(ProgressBar::new(BAR_LENGTH));
        bar.set_style(bar_style());
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.display().to_string());
        bar.set_prefix(format!("#{} {}", task_id, name));
        self.views.insert(
            task_id,
            TaskView {
                bar,
                original_size: None,
                summary: None,
            },
        );
    }

    /// 最新のサマリーテキスト
    pub fn summary(&self, task_id: TaskId) -> Option<&str> {
        self.views.get(&task_id).and_then(|v| v.summary.as_deref())
    }

    pub fn outcomes(&self) -> &[(TaskId, TaskOutcome)] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<(TaskId, TaskOutcome)> {
        self.outcomes
    }

    fn print(&self, text: &str) {
        if self.print_summaries {
            self.multi.suspend(|| println!("{}", text));
        }
    }

    /// イベントを1件反映。終端イベントなら結果を返す
    pub fn apply(&mut self, message: TaskMessage) -> Option<TaskOutcome> {
        let TaskMessage { task_id, event } = message;
        if !self.views.contains_key(&task_id) {
            self.register(task_id, Path::new(&format!("task-{}", task_id)));
        }

        let outcome = match event {
            ConversionEvent::Progress {
                cache_file,
                available_size,
                progress,
                info,
            } => {
                let view = self.views.get_mut(&task_id)?;
                let original_size = *view.original_size.get_or_insert_with(|| {
                    std::fs::metadata(&info.original_path)
                        .map(|m| m.len())
                        .unwrap_or(0)
                });
                view.summary = Some(render_summary(
                    &info,
                    original_size,
                    &cache_file.display().to_string(),
                    available_size,
                    progress,
                ));
                view.bar
                    .set_position((progress.clamp(0.0, 1.0) * BAR_LENGTH as f32) as u64);
                view.bar.set_message(format_file_size(available_size));
                return None;
            }
            ConversionEvent::Finished(report) => {
                if let Some(view) = self.views.get_mut(&task_id) {
                    view.summary = Some(render_summary(
                        &report.info,
                        report.original_size,
                        &report.compress_path,
                        report.result_size,
                        1.0,
                    ));
                    view.bar.set_position(BAR_LENGTH);
                    view.bar
                        .finish_with_message(format!("✔ {}", format_file_size(report.result_size)));
                }
                TaskOutcome::Finished(report)
            }
            ConversionEvent::Failed { info, error } => {
                if let Some(view) = self.views.get_mut(&task_id) {
                    view.bar.abandon_with_message("✖ 失敗");
                }
                let source = info.map(|i| i.original_path).unwrap_or_default();
                self.print(&format!("✖ 変換失敗 #{} {}: {}", task_id, source, error));
                TaskOutcome::Failed(error)
            }
            ConversionEvent::Cancelled { .. } => {
                if let Some(view) = self.views.get_mut(&task_id) {
                    view.bar.abandon_with_message("中断");
                }
                TaskOutcome::Cancelled
            }
        };

        if let Some(summary) = self.summary(task_id) {
            self.print(&format!("\n{}\n", summary));
        }
        debug!(task_id, ?outcome, "タスク終了");
        self.outcomes.push((task_id, outcome.clone()));
        Some(outcome)
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new()
    }
}

/// 全タスクが終端イベントを送るまで受信を続ける
///
/// Ctrl-C を受けたら全タスクにキャンセルを要求する（2回目以降は無視）。
pub async fn run_display_loop(
    receiver: UnboundedReceiver<TaskMessage>,
    tasks: &[TaskHandle],
    state: DisplayState,
) -> Vec<(TaskId, TaskOutcome)> {
    run_display_loop_until(receiver, tasks, state, tokio::signal::ctrl_c()).await
}

/// `shutdown` が完了した時点で全タスクにキャンセルを要求する表示ループ
pub async fn run_display_loop_until<F: Future>(
    mut receiver: UnboundedReceiver<TaskMessage>,
    tasks: &[TaskHandle],
    mut state: DisplayState,
    shutdown: F,
) -> Vec<(TaskId, TaskOutcome)> {
    for task in tasks {
        if !state.views.contains_key(&task.id) {
            state.register(task.id, &task.source);
        }
    }

    let mut remaining = tasks.len();
    let mut cancel_requested = false;
    tokio::pin!(shutdown);

    while remaining > 0 {
        tokio::select! {
            message = receiver.recv() => {
                match message {
                    Some(message) => {
                        if state.apply(message).is_some() {
                            remaining -= 1;
                        }
                    }
                    None => break,
                }
            }
            _ = &mut shutdown, if !cancel_requested => {
                cancel_requested = true;
                state.print("⚠ 中断しています...");
                for task in tasks {
                    task.cancel();
                }
            }
        }
    }

    state.into_outcomes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use video_compressor_common::ConversionInfo;

    fn info() -> ConversionInfo {
        ConversionInfo {
            original_path: "/nonexistent/clip.mp4".into(),
            original_width: 1920,
            original_height: 1080,
            result_width: 1280,
            result_height: 720,
            ..Default::default()
        }
    }

    fn progress(task_id: TaskId, value: f32) -> TaskMessage {
        TaskMessage {
            task_id,
            event: ConversionEvent::Progress {
                cache_file: PathBuf::from("/cache/video/Video_Compressor_1.mp4"),
                available_size: 2048,
                progress: value,
                info: info(),
            },
        }
    }

    #[test]
    fn test_progress_updates_summary() {
        let mut state = DisplayState::hidden();
        state.register(1, Path::new("/nonexistent/clip.mp4"));

        assert!(state.apply(progress(1, 0.42)).is_none());

        let summary = state.summary(1).unwrap();
        let progress_line = summary.lines().find(|l| l.starts_with("progress:")).unwrap();
        assert!(progress_line.contains("42.0"));
        assert!(summary.contains("compressPath:/cache/video/Video_Compressor_1.mp4"));
        assert!(summary.contains("availableSize:2.0 KB"));
    }

    #[test]
    fn test_terminal_events_produce_outcomes() {
        let mut state = DisplayState::hidden();
        state.register(1, Path::new("a.mp4"));
        state.register(2, Path::new("b.mp4"));

        let report = CompressionReport {
            info: info(),
            compress_path: "/cache/video/out.mp4".into(),
            original_size: 4096,
            result_size: 1024,
            finished_at: String::new(),
        };
        let done = state.apply(TaskMessage {
            task_id: 1,
            event: ConversionEvent::Finished(report.clone()),
        });
        assert_eq!(done, Some(TaskOutcome::Finished(report)));
        assert!(state.summary(1).unwrap().ends_with("progress:100.0"));

        let failed = state.apply(TaskMessage {
            task_id: 2,
            event: ConversionEvent::Failed {
                info: Some(info()),
                error: "boom".into(),
            },
        });
        assert_eq!(failed, Some(TaskOutcome::Failed("boom".into())));
        assert_eq!(state.outcomes().len(), 2);
    }

    #[test]
    fn test_unknown_task_is_registered_on_the_fly() {
        let mut state = DisplayState::hidden();
        state.apply(progress(7, 0.5));
        assert!(state.summary(7).unwrap().contains("progress:50.0"));
    }
}
