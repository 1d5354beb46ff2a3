use std::time::Duration;
use tokio_test::assert_ok;
use crate::error::EngineErrorKind;
use crate::pipeline::buffered;
use crate::subtitle::TimingMap;
use crate::task::TaskStatus;
use crate::testing::{mock_audio, MockEngine};
use crate::tts::ResultCache;
use super::{expected_audio, Harness, FOUR_SEGMENTS, SEGMENTS};

#[tokio::test]
async fn test_multi_segment_concatenates_in_index_order() {
    let h = Harness::new(MockEngine::new());
    let task = h.task(FOUR_SEGMENTS);

    let result = assert_ok!(buffered::execute(&h.ctx, &task).await);
    assert!(!result.partial);
    assert_eq!(result.file, format!("{}.mp3", task.id));
    assert_eq!(result.srt, format!("/{}.srt", task.id));

    let audio = std::fs::read(h.path(&result.file)).unwrap();
    assert_eq!(audio, expected_audio(&SEGMENTS));
    assert_eq!(result.size, Some(audio.len() as u64));
    assert!(h.path(&result.srt_file).exists());
    assert!(h.path(&format!("{}/[merged]all_splits.mp3.json", task.id)).exists());

    let stored = h.ctx.tasks.get_task(&task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Success);
    assert_eq!(stored.progress, 100.0);
    assert_eq!(stored.result, Some(result));
    assert_eq!(h.engine.calls(), 4);
}

#[tokio::test]
async fn test_shuffled_completion_keeps_order_and_limit() {
    // Первые сегменты завершаются последними
    let engine = MockEngine::new()
        .delay("Alpha", Duration::from_millis(60))
        .delay("Bravo", Duration::from_millis(40))
        .delay("Charlie", Duration::from_millis(20));
    let h = Harness::with_config(engine, |config| config.engine_call_limit = 2);
    let task = h.task(FOUR_SEGMENTS);

    let result = assert_ok!(buffered::execute(&h.ctx, &task).await);
    let audio = std::fs::read(h.path(&result.file)).unwrap();
    assert_eq!(audio, expected_audio(&SEGMENTS));
    assert!(h.engine.max_in_flight() <= 2);

    let names: Vec<String> = h
        .concat
        .last_inputs()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["1_splits.mp3", "2_splits.mp3", "3_splits.mp3", "4_splits.mp3"]);
}

#[tokio::test]
async fn test_partial_result_is_flagged_and_not_cached() {
    let h = Harness::new(MockEngine::new().fail_always("Charlie"));
    let task = h.task(FOUR_SEGMENTS);

    let result = assert_ok!(buffered::execute(&h.ctx, &task).await);
    assert!(result.partial);
    let audio = std::fs::read(h.path(&result.file)).unwrap();
    assert_eq!(audio, expected_audio(&[SEGMENTS[0], SEGMENTS[1], SEGMENTS[3]]));
    // Целиком задача не кэшируется, удачные сегменты кэшируются
    let fingerprint = ResultCache::fingerprint(&task.fields);
    assert!(h.ctx.cache.get(&fingerprint, h.dir.path()).await.is_none());
    assert_eq!(h.store.len(), 3);

    let stored = h.ctx.tasks.get_task(&task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Success);
    assert!(stored.result.unwrap().partial);
}

#[tokio::test]
async fn test_merged_timeline_offsets_follow_segments() {
    let h = Harness::new(MockEngine::new());
    let task = h.task(FOUR_SEGMENTS);
    assert_ok!(buffered::execute(&h.ctx, &task).await);

    let merged = TimingMap::load(&h.path(&format!("{}/[merged]all_splits.mp3.json", task.id)))
        .await
        .unwrap();
    let bravo = merged.cues.iter().find(|cue| cue.part == "Bravo").unwrap();
    // "Alpha one here." -> 5 + 3 + 5 символов по 50 мс
    assert_eq!(bravo.start, 650);

    let srt = std::fs::read_to_string(h.path(&format!("{}.srt", task.id))).unwrap();
    assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:00,250\nAlpha\n"));
}

#[tokio::test]
async fn test_cache_hit_skips_engine() {
    let h = Harness::new(MockEngine::new());
    let first = h.task(FOUR_SEGMENTS);
    let first_result = assert_ok!(buffered::execute(&h.ctx, &first).await);
    // Итог задачи и четыре сегмента
    assert_eq!(h.store.len(), 5);
    let calls = h.engine.calls();

    let second = h.task(FOUR_SEGMENTS);
    let second_result = assert_ok!(buffered::execute(&h.ctx, &second).await);
    assert_eq!(h.engine.calls(), calls);
    assert_eq!(second_result.file, first_result.file);
    assert_eq!(h.ctx.tasks.get_task(&second.id).unwrap().status, TaskStatus::Success);
}

#[tokio::test]
async fn test_retry_after_partial_result_synthesizes_only_failed_segment() {
    let h = Harness::new(MockEngine::new().fail_times("Charlie", 1, EngineErrorKind::Network));
    let first = h.task(FOUR_SEGMENTS);
    let partial = assert_ok!(buffered::execute(&h.ctx, &first).await);
    assert!(partial.partial);
    assert_eq!(h.engine.calls(), 4);

    let second = h.task(FOUR_SEGMENTS);
    let result = assert_ok!(buffered::execute(&h.ctx, &second).await);
    assert!(!result.partial);
    assert_eq!(h.engine.calls(), 5);
    assert_eq!(h.engine.calls_for("Alpha"), 1);
    assert_eq!(h.engine.calls_for("Charlie"), 2);
    let audio = std::fs::read(h.path(&result.file)).unwrap();
    assert_eq!(audio, expected_audio(&SEGMENTS));
}

#[tokio::test]
async fn test_shared_prefix_reuses_cached_segments() {
    let h = Harness::new(MockEngine::new());
    let first = h.task(FOUR_SEGMENTS);
    assert_ok!(buffered::execute(&h.ctx, &first).await);

    let longer = format!("{} Echo five now.", FOUR_SEGMENTS);
    let second = h.task(&longer);
    let result = assert_ok!(buffered::execute(&h.ctx, &second).await);
    assert_eq!(h.engine.calls(), 5);
    assert_eq!(h.engine.calls_for("Alpha"), 1);
    assert_eq!(h.engine.calls_for("Echo"), 1);

    let audio = std::fs::read(h.path(&result.file)).unwrap();
    let mut segments = SEGMENTS.to_vec();
    segments.push("Echo five now.");
    assert_eq!(audio, expected_audio(&segments));

    // Шкала восстановленного сегмента участвует в объединенной
    let merged = TimingMap::load(&h.path(&format!("{}/[merged]all_splits.mp3.json", second.id)))
        .await
        .unwrap();
    assert!(merged.cues.iter().any(|cue| cue.part == "Alpha"));
    assert!(merged.cues.iter().any(|cue| cue.part == "Echo"));
}

#[tokio::test]
async fn test_single_segment_writes_final_artifacts_directly() {
    let h = Harness::new(MockEngine::new());
    let task = h.task("Hello there.");

    let result = assert_ok!(buffered::execute(&h.ctx, &task).await);
    assert_eq!(std::fs::read(h.path(&result.file)).unwrap(), mock_audio("Hello there."));
    assert!(h.path(&result.srt_file).exists());
    assert_eq!(h.concat.calls(), 0);
    assert!(!h.path(&task.id).exists());
}

#[tokio::test]
async fn test_all_segments_failing_fails_task() {
    let engine = MockEngine::new()
        .fail_always("Alpha")
        .fail_always("Bravo")
        .fail_always("Charlie")
        .fail_always("Delta");
    let h = Harness::new(engine);
    let task = h.task(FOUR_SEGMENTS);

    let err = buffered::execute(&h.ctx, &task).await.unwrap_err();
    assert_eq!(err.kind(), "concatenation");
    let stored = h.ctx.tasks.get_task(&task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.error.unwrap().kind, "concatenation");
}

#[tokio::test]
async fn test_single_segment_engine_error_fails_task() {
    let h = Harness::new(MockEngine::new().fail_times("Hello", 1, EngineErrorKind::UnsupportedVoice));
    let task = h.task("Hello there.");

    let err = buffered::execute(&h.ctx, &task).await.unwrap_err();
    assert_eq!(err.kind(), "engine");
    assert_eq!(h.ctx.tasks.get_task(&task.id).unwrap().status, TaskStatus::Failed);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_cleanup_scratch_removes_task_dir() {
    let h = Harness::with_config(MockEngine::new(), |config| config.cleanup_scratch = true);
    let task = h.task(FOUR_SEGMENTS);
    assert_ok!(buffered::execute(&h.ctx, &task).await);
    assert!(!h.path(&task.id).exists());
    assert!(h.path(&format!("{}.mp3", task.id)).exists());
}
