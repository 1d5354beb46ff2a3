//! Модуль для отслеживания прогресса задач
//!
//! Реестр задач уведомляет наблюдателей при каждом принятом обновлении прогресса.
//! Наблюдатели получают снимок `ProgressInfo` и не могут изменить задачу.

use std::sync::Arc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Информация о прогрессе задачи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Идентификатор задачи
    pub task_id: String,
    /// Процент выполнения (0.0 - 100.0)
    pub percent: f32,
    /// Дополнительная информация
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(task_id: impl Into<String>, percent: f32, details: Option<String>) -> Self {
        Self {
            task_id: task_id.into(),
            percent: percent.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Трейт для наблюдателя, получающего уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    /// Метод, вызываемый при обновлении прогресса
    fn on_progress_update(&self, progress: &ProgressInfo);
}

/// Процент готовности многосегментной задачи
///
/// `divisor` больше единицы, когда синтез сам является этапом более длинного конвейера.
/// Результат округляется до двух знаков.
pub fn segment_progress(completed: usize, total: usize, divisor: f32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let divisor = if divisor > 0.0 { divisor } else { 1.0 };
    let raw = (completed as f32 / total as f32) * 100.0 / divisor;
    (raw * 100.0).round() / 100.0
}

/// Наблюдатель, пишущий прогресс в лог
#[derive(Debug, Default)]
pub struct LogProgressObserver;

impl ProgressObserver for LogProgressObserver {
    fn on_progress_update(&self, progress: &ProgressInfo) {
        match &progress.details {
            Some(details) => log::info!("Task {} progress {:.2}%: {}", progress.task_id, progress.percent, details),
            None => log::info!("Task {} progress {:.2}%", progress.task_id, progress.percent),
        }
    }
}

/// Наблюдатель, сохраняющий историю прогресса в памяти
#[derive(Debug, Default, Clone)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl MemoryProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить историю обновлений прогресса
    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().clone()
    }

    /// История одной задачи
    pub fn history_for(&self, task_id: &str) -> Vec<f32> {
        self.history
            .lock()
            .iter()
            .filter(|info| info.task_id == task_id)
            .map(|info| info.percent)
            .collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress_update(&self, progress: &ProgressInfo) {
        self.history.lock().push(progress.clone());
    }
}
