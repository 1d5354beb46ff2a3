//! Реестр задач в памяти процесса

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;
use crate::progress::{ProgressInfo, ProgressObserver};
use crate::text::NormalizedParams;
use super::{Task, TaskError, TaskResult, TaskStatus};

/// Частичное обновление задачи
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<f32>,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn result(result: TaskResult) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }
}

/// Количество задач по состояниям
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub success: usize,
    pub failed: usize,
}

/// Потокобезопасный реестр задач
///
/// Все изменения одной задачи выполняются под общей блокировкой,
/// поэтому первый переход в конечное состояние побеждает, а остальные игнорируются.
#[derive(Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<String, Task>>,
    observers: RwLock<Vec<Arc<dyn ProgressObserver>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Подписать наблюдателя на обновления прогресса
    pub fn add_observer(&self, observer: Arc<dyn ProgressObserver>) {
        self.observers.write().push(observer);
    }

    /// Создать задачу в состоянии `pending`
    pub fn create_task(&self, fields: NormalizedParams) -> Task {
        let task = Task::new(Uuid::new_v4().to_string(), fields);
        log::debug!("Task {} created for voice {}", task.id, task.fields.voice);
        self.tasks.lock().insert(task.id.clone(), task.clone());
        task
    }

    /// Снимок задачи
    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.lock().get(id).cloned()
    }

    /// Применить частичное обновление
    ///
    /// Возвращает `false`, если задачи нет или она уже завершена.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> bool {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };
        if task.is_terminal() {
            log::debug!("Ignoring update of finished task {}", id);
            return false;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(progress) = patch.progress {
            task.progress = progress.clamp(task.progress, 100.0);
        }
        if let Some(result) = patch.result {
            task.result = Some(result);
        }
        if let Some(error) = patch.error {
            task.error = Some(error);
        }
        task.updated_at = Utc::now();
        true
    }

    /// Перевести задачу в `failed`
    pub fn fail_task(&self, id: &str, error: TaskError) -> bool {
        let accepted = self.update_task(
            id,
            TaskPatch {
                status: Some(TaskStatus::Failed),
                error: Some(error.clone()),
                ..Default::default()
            },
        );
        if accepted {
            log::warn!("Task {} failed: {}", id, error.message);
        }
        accepted
    }

    /// Перевести задачу в `success`
    pub fn end_task(&self, id: &str) -> bool {
        let accepted = self.update_task(
            id,
            TaskPatch {
                status: Some(TaskStatus::Success),
                progress: Some(100.0),
                ..Default::default()
            },
        );
        if accepted {
            log::info!("Task {} finished", id);
        }
        accepted
    }

    /// Уточнить результат уже завершенной успешно задачи
    ///
    /// Нужен отложенной сборке потоковых задач: итоговый файл появляется после
    /// перехода в `success`. Статус и прогресс не меняются.
    pub fn refresh_result(&self, id: &str, result: TaskResult) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(id) {
            Some(task) if task.status == TaskStatus::Success => {
                task.result = Some(result);
                task.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Обновить прогресс
    ///
    /// Прогресс только растет; задача в `pending` переходит в `processing`.
    pub fn update_progress(&self, id: &str, percent: f32, details: Option<String>) -> bool {
        let info = {
            let mut tasks = self.tasks.lock();
            let Some(task) = tasks.get_mut(id) else {
                return false;
            };
            if task.is_terminal() {
                return false;
            }
            let percent = percent.clamp(0.0, 100.0);
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Processing;
            }
            if percent <= task.progress {
                return false;
            }
            task.progress = percent;
            task.updated_at = Utc::now();
            ProgressInfo::new(id, percent, details)
        };

        for observer in self.observers.read().iter() {
            observer.on_progress_update(&info);
        }
        true
    }

    /// Статистика по состояниям
    pub fn stats(&self) -> TaskStats {
        let tasks = self.tasks.lock();
        let mut stats = TaskStats {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Success => stats.success += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Удалить завершенные задачи старше `older_than`
    pub fn evict_finished(&self, older_than: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(older_than) else {
            return 0;
        };
        let cutoff = Utc::now() - age;
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|_, task| !(task.is_terminal() && task.updated_at <= cutoff));
        let evicted = before - tasks.len();
        if evicted > 0 {
            log::debug!("Evicted {} finished tasks", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
