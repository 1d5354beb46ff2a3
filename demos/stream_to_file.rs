//! Пример потокового синтеза
//!
//! Текст озвучивается движком по умолчанию (нужен `OPENAI_API_KEY`), фрагменты
//! аудио пишутся в файл по мере поступления.
//!
//! Запуск: cargo run --example stream_to_file -- "Текст для озвучивания" out.mp3

use std::sync::Arc;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use edge_voice::progress::LogProgressObserver;
use edge_voice::tts::EngineRegistry;
use edge_voice::{ChannelSink, EdgeVoice, EdgeVoiceConfig, StreamEvent, SynthesisParams};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    edge_voice::init_logger();

    let mut args = std::env::args().skip(1);
    let text = args
        .next()
        .unwrap_or_else(|| "Hello from edge-voice. This text is streamed segment by segment.".to_string());
    let output = args.next().unwrap_or_else(|| "stream.mp3".to_string());
    let voice = std::env::var("EDGE_VOICE_VOICE").unwrap_or_else(|_| "alloy".to_string());

    let registry = EngineRegistry::from_env();
    let tts = EdgeVoice::from_registry(EdgeVoiceConfig::from_env(), &registry, None)?;
    tts.add_observer(Arc::new(LogProgressObserver));
    if let Err(e) = tts.check_ffmpeg().await {
        eprintln!("ffmpeg недоступен, итоговый файл не будет собран: {}", e);
    }

    let (sink, mut events) = ChannelSink::new(32);
    let params = SynthesisParams::new(text, voice);

    // Потребитель читает события параллельно с синтезом
    let writer = tokio::spawn(async move {
        let mut file = tokio::fs::File::create(&output).await?;
        let mut written = 0usize;
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Chunk(chunk) => {
                    written += chunk.len();
                    file.write_all(&chunk).await?;
                }
                StreamEvent::Response(result) => println!("Готовый результат из кэша: {}", result.audio),
                StreamEvent::End => println!("Поток завершен, записано {} байт в {}", written, output),
                StreamEvent::Error(message) => eprintln!("Ошибка потока: {}", message),
            }
        }
        file.flush().await?;
        Ok::<_, std::io::Error>(())
    });

    let outcome = tts.generate_stream(&params, &sink).await?;
    drop(sink);
    writer.await??;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("{}", serde_json::to_string_pretty(&tts.stats())?);
    Ok(())
}
