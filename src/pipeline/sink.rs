//! Приемники потокового вывода
//!
//! Конвейер пишет в абстрактный приемник и не знает о транспорте.
//! Ошибка `write` означает, что потребитель отключился.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use crate::error::{EdgeVoiceError, Result};
use crate::task::TaskResult;

/// Приемник байтов потока
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Передать фрагмент аудио
    async fn write(&self, chunk: Bytes) -> Result<()>;

    /// Поток успешно завершен
    async fn end(&self);

    /// Поток прерван ошибкой
    async fn error(&self, message: &str);

    /// Вместо потока отдать готовый результат (попадание в кэш)
    async fn respond(&self, result: &TaskResult);

    /// Завершается, когда потребитель отключился
    ///
    /// Приемник без такого сигнала не завершает его никогда; отключение тогда
    /// обнаруживается только при следующей записи.
    async fn closed(&self) {
        futures::future::pending::<()>().await
    }
}

/// Событие для потребителя канала
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(Bytes),
    Response(TaskResult),
    End,
    Error(String),
}

/// Приемник поверх канала tokio
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    /// Создать приемник и поток событий для транспорта
    pub fn new(buffer: usize) -> (Self, ReceiverStream<StreamEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, ReceiverStream::new(receiver))
    }

    async fn send(&self, event: StreamEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| EdgeVoiceError::Cancelled)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn write(&self, chunk: Bytes) -> Result<()> {
        self.send(StreamEvent::Chunk(chunk)).await
    }

    async fn end(&self) {
        let _ = self.send(StreamEvent::End).await;
    }

    async fn error(&self, message: &str) {
        let _ = self.send(StreamEvent::Error(message.to_string())).await;
    }

    async fn respond(&self, result: &TaskResult) {
        let _ = self.send(StreamEvent::Response(result.clone())).await;
    }

    async fn closed(&self) {
        self.sender.closed().await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    data: Vec<u8>,
    writes: usize,
    ended: bool,
    error: Option<String>,
    response: Option<TaskResult>,
}

/// Приемник в памяти
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
    /// Отключиться после заданного числа записей
    disconnect_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Приемник, который принимает `writes` записей, а затем ведет себя как отключившийся клиент
    pub fn disconnecting_after(writes: usize) -> Self {
        Self {
            disconnect_after: Some(writes),
            ..Default::default()
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    pub fn error_message(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn response(&self) -> Option<TaskResult> {
        self.state.lock().response.clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write(&self, chunk: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        if matches!(self.disconnect_after, Some(limit) if state.writes >= limit) {
            return Err(EdgeVoiceError::Cancelled);
        }
        state.writes += 1;
        state.data.extend_from_slice(&chunk);
        Ok(())
    }

    async fn end(&self) {
        self.state.lock().ended = true;
    }

    async fn error(&self, message: &str) {
        self.state.lock().error = Some(message.to_string());
    }

    async fn respond(&self, result: &TaskResult) {
        self.state.lock().response = Some(result.clone());
    }
}
