//! 変換ワーカーと表示ループの橋渡し
//!
//! 選択ごとにワーカースレッドを1本起動し、進捗と結果を
//! 単一のチャネル経由で表示側へ送る。同じタスクのイベント順は保たれるが、
//! タスク間の順序は保証しない。

use crate::controller::{apply_trim, ConversionProgress, MediaController};
use crate::error::CompressorError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};
use video_compressor_common::{CompressionReport, ConversionInfo};

pub type TaskId = usize;

/// ワーカーから表示側へのイベント
///
/// 各タスクは0回以上の `Progress` の後、終端イベントを必ず1つ送る。
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent {
    Progress {
        cache_file: PathBuf,
        available_size: u64,
        progress: f32,
        info: ConversionInfo,
    },
    Finished(CompressionReport),
    Failed {
        info: Option<ConversionInfo>,
        error: String,
    },
    Cancelled {
        info: ConversionInfo,
    },
}

impl ConversionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversionEvent::Progress { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub event: ConversionEvent,
}

/// 変換リクエスト
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionRequest {
    pub source: PathBuf,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
}

impl ConversionRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

/// 起動済みタスクへのハンドル
pub struct TaskHandle {
    pub id: TaskId,
    pub source: PathBuf,
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl TaskHandle {
    /// キャンセルを要求（ワーカーは次の進捗確認で停止する）
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            error!(task_id = self.id, "ワーカースレッドがパニックしました");
        }
    }
}

pub struct Relay {
    controller: Arc<MediaController>,
    sender: UnboundedSender<TaskMessage>,
    next_id: TaskId,
}

impl Relay {
    /// リレーと表示側の受信口を作る
    pub fn new(controller: Arc<MediaController>) -> (Self, UnboundedReceiver<TaskMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                controller,
                sender,
                next_id: 1,
            },
            receiver,
        )
    }

    /// 変換タスクを1つ起動
    ///
    /// 上限もキューもなく、呼ばれるたびに新しいワーカーが走る。
    pub fn spawn(&mut self, request: ConversionRequest) -> TaskHandle {
        let task_id = self.next_id;
        self.next_id += 1;

        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let controller = Arc::clone(&self.controller);
        let sender = self.sender.clone();
        let source = request.source.clone();

        debug!(task_id, source = %source.display(), "変換タスク起動");
        let thread = std::thread::spawn(move || {
            let event = run_conversion(&controller, &request, &worker_cancel, |event| {
                sender.send(TaskMessage { task_id, event }).ok();
            });
            sender.send(TaskMessage { task_id, event }).ok();
        });

        TaskHandle {
            id: task_id,
            source,
            cancel,
            thread,
        }
    }
}

/// ワーカー本体。進捗は `emit` で送り、終端イベントを返す
fn run_conversion(
    controller: &MediaController,
    request: &ConversionRequest,
    cancel: &AtomicBool,
    emit: impl Fn(ConversionEvent),
) -> ConversionEvent {
    let mut info = match controller.create_compression_settings(&request.source) {
        Ok(info) => info,
        Err(e) => {
            return ConversionEvent::Failed {
                info: None,
                error: e.to_string(),
            }
        }
    };
    if let Err(e) = apply_trim(&mut info, request.start_time_ms, request.end_time_ms) {
        return ConversionEvent::Failed {
            info: Some(info),
            error: e.to_string(),
        };
    }

    let mut on_progress = |p: ConversionProgress| {
        emit(ConversionEvent::Progress {
            cache_file: p.cache_file,
            available_size: p.available_size,
            progress: p.progress,
            info: info.clone(),
        });
    };

    match controller.convert_video(&info, cancel, &mut on_progress) {
        Ok(report) => ConversionEvent::Finished(report),
        Err(CompressorError::Cancelled) => ConversionEvent::Cancelled { info },
        Err(e) => {
            error!(source = %request.source.display(), error = %e, "変換に失敗");
            ConversionEvent::Failed {
                info: Some(info),
                error: e.to_string(),
            }
        }
    }
}
