//! Fire-and-forget background work.
//!
//! Tasks are transient, best-effort, in-process units: no durable queue,
//! no retry on crash. If the process restarts mid-task the user receives
//! no completion message. Handlers send any "please wait" text before
//! enqueueing; the task itself delivers exactly one terminal message.

pub mod runner;

pub use runner::TaskDeps;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::session::{ExternalField, Location};

/// The unit of work a handler can enqueue.
#[derive(Debug, Clone)]
pub enum TaskKind {
    WeatherReport,
    FarmingAdvice {
        /// Already translated to English by the enqueueing handler.
        query: String,
    },
    PestAnalysis {
        media_url: String,
    },
    MarketResearch {
        crop: String,
        qty_tons: f64,
        location: Location,
    },
    FieldHealth {
        field: ExternalField,
    },
    CropPrediction {
        latitude: f64,
        longitude: f64,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WeatherReport => "weather_report",
            Self::FarmingAdvice { .. } => "farming_advice",
            Self::PestAnalysis { .. } => "pest_analysis",
            Self::MarketResearch { .. } => "market_research",
            Self::FieldHealth { .. } => "field_health",
            Self::CropPrediction { .. } => "crop_prediction",
        }
    }

    /// Human-readable subject for apology messages.
    pub fn subject(&self) -> String {
        match self {
            Self::WeatherReport => "weather report".to_string(),
            Self::FarmingAdvice { .. } => "advice for your question".to_string(),
            Self::PestAnalysis { .. } => "image analysis".to_string(),
            Self::MarketResearch { crop, .. } => format!("market research for {crop}"),
            Self::FieldHealth { field } => format!("analysis of {}", field.name),
            Self::CropPrediction { .. } => "crop prediction for your land".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundTask {
    pub session_key: String,
    pub kind: TaskKind,
}

/// Submission boundary between handlers and the task runtime. Enqueueing
/// never blocks and never fails the calling turn.
pub trait TaskSink: Send + Sync {
    fn enqueue(&self, task: BackgroundTask);
}

/// Production sink: an unbounded channel drained by a dispatcher that runs
/// each task in its own spawn, so tasks execute concurrently with each
/// other and with new inbound turns.
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<BackgroundTask>,
}

impl TaskQueue {
    pub fn start(deps: TaskDeps) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BackgroundTask>();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let deps = deps.clone();
                // Panics stay inside the spawned task and never reach the
                // dispatcher loop.
                tokio::spawn(async move {
                    runner::run(deps, task).await;
                });
            }
        });
        Arc::new(Self { tx })
    }
}

impl TaskSink for TaskQueue {
    fn enqueue(&self, task: BackgroundTask) {
        if self.tx.send(task).is_err() {
            warn!("Task dispatcher is gone, dropping background task");
        }
    }
}
