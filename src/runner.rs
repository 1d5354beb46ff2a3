//! Выполнение независимых задач с ограничением параллелизма
//!
//! Ошибка одной задачи не прерывает остальные: она сохраняется в `results`
//! под индексом задачи. Порядок `results` совпадает с порядком задач, а не с
//! порядком их завершения.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use crate::error::Result;

type Producer<T> = Box<dyn FnOnce(usize) -> BoxFuture<'static, Result<T>> + Send>;

/// Единица работы; индекс задачи — ее позиция в списке
pub struct ConcurrencyJob<T> {
    producer: Producer<T>,
}

impl<T: Send + 'static> ConcurrencyJob<T> {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(usize) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            producer: Box::new(move |index| producer(index).boxed()),
        }
    }
}

/// Итог одной задачи
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<T> {
    Success(T),
    Failed(String),
    /// Задача не запускалась из-за отмены
    Skipped,
}

impl<T> JobOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Отчет о выполнении
#[derive(Debug, Clone)]
pub struct RunReport<T> {
    /// Итоги в порядке задач
    pub results: Vec<JobOutcome<T>>,
    /// Выполнение было отменено
    pub cancelled: bool,
}

impl<T> RunReport<T> {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|outcome| outcome.is_success()).count()
    }

    /// Индексы задач, которые не дали результата
    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_partial(&self) -> bool {
        self.succeeded() < self.results.len()
    }
}

/// Исполнитель с фиксированным потолком параллелизма
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyRunner {
    limit: usize,
}

impl ConcurrencyRunner {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn run<T: Send + 'static>(
        &self,
        jobs: Vec<ConcurrencyJob<T>>,
        cancel: &CancellationToken,
    ) -> RunReport<T> {
        self.run_with_progress(jobs, cancel, |_, _| {}).await
    }

    /// Выполнить задачи, вызывая `on_progress(completed, total)` после каждой
    ///
    /// `completed` считает завершенные задачи, включая упавшие: прогресс
    /// показывает, сколько работы уже позади, а не сколько ее удалось.
    /// Пропущенные после отмены задачи не учитываются.
    pub async fn run_with_progress<T, P>(
        &self,
        jobs: Vec<ConcurrencyJob<T>>,
        cancel: &CancellationToken,
        on_progress: P,
    ) -> RunReport<T>
    where
        T: Send + 'static,
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let completed = Arc::new(AtomicUsize::new(0));
        let on_progress = Arc::new(on_progress);
        let mut handles = Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, job) in jobs.into_iter().enumerate() {
            // Разрешение берется до запуска, чтобы после отмены новые задачи не стартовали
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                log::debug!("Runner cancelled before job {}", index);
                cancelled = true;
                break;
            };

            let completed = completed.clone();
            let on_progress = on_progress.clone();
            let future = (job.producer)(index);
            handles.push(tokio::spawn(async move {
                let outcome = match future.await {
                    Ok(value) => JobOutcome::Success(value),
                    Err(e) => {
                        log::warn!("Job {} failed: {}", index, e);
                        JobOutcome::Failed(e.to_string())
                    }
                };
                drop(permit);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                on_progress(done, total);
                outcome
            }));
        }

        let mut results: Vec<JobOutcome<T>> = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(index, joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Job {} panicked: {}", index, e);
                    JobOutcome::Failed(format!("job panicked: {}", e))
                }
            })
            .collect();
        results.resize_with(total, || JobOutcome::Skipped);

        RunReport { results, cancelled }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::error::EdgeVoiceError;

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<ConcurrencyJob<usize>> = (0..12)
            .map(|_| {
                let in_flight = in_flight.clone();
                let max_seen = max_seen.clone();
                ConcurrencyJob::new(move |index| async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 + (index as u64 % 3) * 5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(index)
                })
            })
            .collect();

        let report = ConcurrencyRunner::new(3).run(jobs, &CancellationToken::new()).await;
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
        assert_eq!(report.results.len(), 12);
        for (i, outcome) in report.results.iter().enumerate() {
            assert_eq!(outcome, &JobOutcome::Success(i));
        }
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_results_follow_job_order_not_completion() {
        let jobs: Vec<ConcurrencyJob<usize>> = (0..5)
            .map(|_| {
                ConcurrencyJob::new(|index| async move {
                    tokio::time::sleep(Duration::from_millis(50 - index as u64 * 10)).await;
                    Ok(index * 10)
                })
            })
            .collect();
        let report = ConcurrencyRunner::new(5).run(jobs, &CancellationToken::new()).await;
        let values: Vec<_> = report.results.iter().filter_map(|o| o.success().copied()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let jobs: Vec<ConcurrencyJob<usize>> = (0..4)
            .map(|_| {
                ConcurrencyJob::new(|index| async move {
                    if index == 2 {
                        Err(EdgeVoiceError::from("boom"))
                    } else {
                        Ok(index)
                    }
                })
            })
            .collect();
        let report = ConcurrencyRunner::new(2).run(jobs, &CancellationToken::new()).await;
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed_indices(), vec![2]);
        assert!(report.is_partial());
        assert!(matches!(&report.results[2], JobOutcome::Failed(msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_cancel_stops_scheduling() {
        let cancel = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<ConcurrencyJob<()>> = (0..6)
            .map(|_| {
                let cancel = cancel.clone();
                let started = started.clone();
                ConcurrencyJob::new(move |index| async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if index == 0 {
                        cancel.cancel();
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(())
                })
            })
            .collect();

        let report = ConcurrencyRunner::new(1).run(jobs, &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.results.len(), 6);
        assert!(report.results[0].is_success());
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(report.results[1..].iter().all(|o| *o == JobOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_progress_callback() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let jobs: Vec<ConcurrencyJob<()>> = (0..3).map(|_| ConcurrencyJob::new(|_| async { Ok(()) })).collect();
        ConcurrencyRunner::new(1)
            .run_with_progress(jobs, &CancellationToken::new(), move |done, total| sink.lock().push((done, total)))
            .await;
        assert_eq!(*seen.lock(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_progress_counts_failed_jobs() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let jobs: Vec<ConcurrencyJob<()>> = (0..3)
            .map(|i| {
                ConcurrencyJob::new(move |_| async move {
                    if i == 1 {
                        Err(EdgeVoiceError::from("segment failed"))
                    } else {
                        Ok(())
                    }
                })
            })
            .collect();
        let report = ConcurrencyRunner::new(1)
            .run_with_progress(jobs, &CancellationToken::new(), move |done, total| sink.lock().push((done, total)))
            .await;
        assert_eq!(*seen.lock(), vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(report.failed_indices(), vec![1]);
    }
}
