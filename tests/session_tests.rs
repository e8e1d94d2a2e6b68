// Integration tests for the conversation session
//
// These tests run whole turns against stub advisory services and a
// recording output device, checking history, turn state, and what reaches
// the playback scheduler on success and on every failure path.

mod common;

use agrivoice::audio::{read_wav, AudioPayload, PlaybackPolicy};
use agrivoice::session::{
    ConversationSession, Language, Role, SessionConfig, SpeechOutcome, TurnOutcome, TurnPhase,
    DEFAULT_GREETING,
};
use agrivoice::Error;
use anyhow::Result;
use common::{scheduler, session, speech_payload, RecordingOutput, StubAdvisor, StubSpeech};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn quick_output() -> RecordingOutput {
    RecordingOutput::new(Duration::from_millis(10))
}

async fn wait_until_pending(session: &ConversationSession) {
    while !session.is_awaiting_response() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_end_to_end_turn() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Try rice"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[0, 1000, -1000, 32767])));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor.clone(), speech.clone(), &output);

    let outcome = session.submit_user_text("Best crop for rain?").await?;

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "Best crop for rain?");
    assert_eq!(history[1].role, Role::Model);
    assert_eq!(history[1].text, "Try rice");

    // Exactly one 4-frame buffer reached the device
    let started = output.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].frame_count, 4);
    assert_eq!(started[0].sample_rate, 24000);
    assert_eq!(started[0].channels, 1);

    match outcome {
        TurnOutcome::Completed { reply, speech } => {
            assert_eq!(reply, "Try rice");
            assert!(matches!(speech, SpeechOutcome::Playing { .. }));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(advisor.calls(), vec![("Best crop for rain?".to_string(), Language::English)]);
    assert_eq!(speech.calls(), vec![("Try rice".to_string(), Language::English)]);
    assert_eq!(session.phase(), TurnPhase::Idle);
    assert!(!session.is_awaiting_response());

    Ok(())
}

#[tokio::test]
async fn test_new_session_starts_with_greeting() {
    let output = quick_output();
    let session = ConversationSession::new(
        SessionConfig::default(),
        Arc::new(StubAdvisor::replying("ok")),
        Arc::new(StubSpeech::failing("unused")),
        scheduler(&output, PlaybackPolicy::Mix),
    );

    let history = session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::Model);
    assert_eq!(history[0].text, DEFAULT_GREETING);
}

#[tokio::test]
async fn test_blank_input_is_ignored() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("unused"));
    let speech = Arc::new(StubSpeech::failing("unused"));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor.clone(), speech, &output);

    assert_eq!(session.submit_user_text("").await?, TurnOutcome::Ignored);
    assert_eq!(session.submit_user_text("   \n\t").await?, TurnOutcome::Ignored);

    assert_eq!(session.message_count(), 0);
    assert!(advisor.calls().is_empty());
    assert_eq!(session.phase(), TurnPhase::Idle);

    Ok(())
}

#[tokio::test]
async fn test_text_generation_failure_appends_no_reply() {
    let advisor = Arc::new(StubAdvisor::failing("503 unavailable"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor, speech.clone(), &output);

    let result = session.submit_user_text("When to sow wheat?").await;

    assert!(matches!(result, Err(Error::Service(_))));
    let history = session.history();
    assert!(history.iter().all(|m| m.role == Role::User));
    assert_eq!(history.len(), 1, "Only the question is kept");
    assert_eq!(session.phase(), TurnPhase::Idle);
    assert!(speech.calls().is_empty());
    assert!(output.started().is_empty());
    assert_eq!(session.stats().turns_failed, 1);
}

#[tokio::test]
async fn test_synthesis_failure_keeps_text() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Use neem oil"));
    let speech = Arc::new(StubSpeech::failing("quota exceeded"));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor, speech, &output);

    let outcome = session.submit_user_text("Aphids on cotton").await?;

    match outcome {
        TurnOutcome::Completed { reply, speech } => {
            assert_eq!(reply, "Use neem oil");
            assert!(matches!(speech, SpeechOutcome::Skipped { .. }));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let models: Vec<_> = session
        .history()
        .into_iter()
        .filter(|m| m.role == Role::Model)
        .collect();
    assert_eq!(models.len(), 1);
    assert_eq!(session.phase(), TurnPhase::Idle);
    assert!(output.started().is_empty());

    let stats = session.stats();
    assert_eq!(stats.turns_completed, 1);
    assert_eq!(stats.speech_failures, 1);

    Ok(())
}

#[tokio::test]
async fn test_malformed_audio_keeps_text() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Irrigate at dawn"));
    // Decodes to three bytes, not whole PCM16 samples
    let payload = AudioPayload::speech("AAAA");
    let speech = Arc::new(StubSpeech::returning(payload));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor, speech, &output);

    let outcome = session.submit_user_text("Water schedule?").await?;

    match outcome {
        TurnOutcome::Completed { speech, .. } => match speech {
            SpeechOutcome::Skipped { reason } => assert!(reason.contains("malformed audio")),
            other => panic!("unexpected speech outcome: {other:?}"),
        },
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.message_count(), 2);
    assert_eq!(session.phase(), TurnPhase::Idle);

    Ok(())
}

#[tokio::test]
async fn test_playback_device_failure_keeps_text() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Apply urea"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2, 3, 4])));
    let output = quick_output();
    output.fail_next_opens(1);
    let session = session(SessionConfig::default(), advisor, speech, &output);

    let outcome = session.submit_user_text("Fertilizer for maize?").await?;

    assert!(matches!(
        outcome,
        TurnOutcome::Completed {
            speech: SpeechOutcome::Skipped { .. },
            ..
        }
    ));
    assert_eq!(session.message_count(), 2);
    assert_eq!(session.phase(), TurnPhase::Idle);

    Ok(())
}

#[tokio::test]
async fn test_overlapping_turn_is_rejected() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Slow answer").with_delay(Duration::from_millis(100)));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = quick_output();
    let session = Arc::new(session(SessionConfig::default(), advisor.clone(), speech, &output));

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit_user_text("First question").await }
    });
    wait_until_pending(&session).await;

    let second = session.submit_user_text("Second question").await;
    assert!(matches!(second, Err(Error::SessionBusy)));

    let outcome = first.await??;
    assert!(matches!(outcome, TurnOutcome::Completed { .. }));

    // Rejected question never reached history or the advisor
    assert_eq!(session.message_count(), 2);
    assert_eq!(advisor.calls().len(), 1);
    assert_eq!(session.phase(), TurnPhase::Idle);

    Ok(())
}

#[tokio::test]
async fn test_text_generation_timeout_returns_to_idle() {
    let advisor = Arc::new(StubAdvisor::replying("Too late").with_delay(Duration::from_millis(500)));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = quick_output();
    let config = SessionConfig {
        request_timeout: Duration::from_millis(20),
        ..SessionConfig::default()
    };
    let session = session(config, advisor, speech, &output);

    let result = session.submit_user_text("Hello?").await;

    assert!(matches!(result, Err(Error::Timeout { .. })));
    assert_eq!(session.message_count(), 1);
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_dropped_turn_returns_to_idle() {
    let advisor = Arc::new(StubAdvisor::replying("Never seen").with_delay(Duration::from_secs(5)));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor, speech, &output);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), session.submit_user_text("Hello?")).await;

    assert!(abandoned.is_err());
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_replay_does_not_change_history() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Sow after first rain"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[5, 6, 7])));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor, speech.clone(), &output);

    session.submit_user_text("When to sow?").await?;
    let before = session.history();

    let first = session.replay(1).await?;
    let second = session.replay(1).await?;

    assert_ne!(first, second);
    assert_eq!(session.history(), before);
    assert_eq!(output.started().len(), 3);
    assert_eq!(speech.calls().len(), 3);
    assert!(speech.calls().iter().all(|(text, _)| text == "Sow after first rain"));

    Ok(())
}

#[tokio::test]
async fn test_replay_rejects_user_and_missing_messages() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Yes"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1])));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor, speech, &output);

    session.submit_user_text("Is it safe?").await?;

    assert!(matches!(session.replay(0).await, Err(Error::InvalidMessage(_))));
    assert!(matches!(session.replay(7).await, Err(Error::InvalidMessage(_))));
    assert_eq!(session.message_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_replay_runs_during_pending_turn() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Later reply").with_delay(Duration::from_millis(100)));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = RecordingOutput::holding();
    let session = Arc::new(ConversationSession::new(
        SessionConfig::default(),
        advisor,
        speech,
        scheduler(&output, PlaybackPolicy::Mix),
    ));

    let turn = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit_user_text("Next question").await }
    });
    wait_until_pending(&session).await;

    // Greeting is message 0
    let replayed = session.replay(0).await?;
    assert!(session.scheduler().is_active(replayed));

    turn.await??;

    // Replay and reply audio both playing
    assert_eq!(session.scheduler().active_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_replay_from_cache_skips_synthesis() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Harvest in October"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[9, 9, 9, 9])));
    let output = quick_output();
    let config = SessionConfig {
        replay_from_cache: true,
        ..SessionConfig::default()
    };
    let session = session(config, advisor, speech.clone(), &output);

    session.submit_user_text("Harvest time?").await?;
    assert!(session.cached_audio(1).is_some());

    session.replay(1).await?;

    assert_eq!(speech.calls().len(), 1);
    let started = output.started();
    assert_eq!(started.len(), 2);
    assert_eq!(started[1].frame_count, 4);

    Ok(())
}

#[tokio::test]
async fn test_language_applies_to_later_calls_only() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("ठीक है"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = quick_output();
    let session = session(SessionConfig::default(), advisor.clone(), speech.clone(), &output);

    session.submit_user_text("First").await?;
    session.set_language(Language::Hindi);
    session.submit_user_text("Second").await?;

    let languages: Vec<Language> = advisor.calls().into_iter().map(|(_, l)| l).collect();
    assert_eq!(languages, vec![Language::English, Language::Hindi]);
    assert_eq!(speech.calls()[1].1, Language::Hindi);
    assert_eq!(session.language(), Language::Hindi);

    Ok(())
}

#[tokio::test]
async fn test_interrupt_on_submit_stops_previous_audio() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Answer"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = RecordingOutput::holding();
    let config = SessionConfig {
        interrupt_on_submit: true,
        ..SessionConfig::default()
    };
    let session = session(config, advisor, speech, &output);

    session.submit_user_text("One").await?;
    session.submit_user_text("Two").await?;

    let started = output.started();
    assert_eq!(started.len(), 2);
    assert!(started[0].stopped.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(session.scheduler().active_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_close_discards_late_reply() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Late").with_delay(Duration::from_millis(50)));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = quick_output();
    let session = Arc::new(session(SessionConfig::default(), advisor, speech.clone(), &output));

    let turn = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit_user_text("Anyone there?").await }
    });
    wait_until_pending(&session).await;
    session.close();

    assert_eq!(turn.await??, TurnOutcome::Discarded);
    assert_eq!(session.message_count(), 1, "Late reply is not appended");
    assert!(speech.calls().is_empty());
    assert_eq!(session.phase(), TurnPhase::Idle);

    assert!(matches!(
        session.submit_user_text("Again").await,
        Err(Error::SessionClosed)
    ));

    Ok(())
}

#[tokio::test]
async fn test_close_stops_playback() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Long answer"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = RecordingOutput::holding();
    let session = session(SessionConfig::default(), advisor, speech, &output);

    session.submit_user_text("Tell me everything").await?;
    assert_eq!(session.scheduler().active_count(), 1);

    assert_eq!(session.close(), 1);
    assert_eq!(session.scheduler().active_count(), 0);
    assert!(session.stats().closed);
    assert_eq!(session.close(), 0);

    Ok(())
}

#[tokio::test]
async fn test_replies_exported_as_wav() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let advisor = Arc::new(StubAdvisor::replying("Mulch the beds"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[0, 16384, -16384, 8192])));
    let output = quick_output();
    let config = SessionConfig {
        session_id: "test-session".to_string(),
        audio_cache_dir: Some(temp_dir.path().join("replies")),
        ..SessionConfig::default()
    };
    let session = session(config, advisor, speech, &output);

    session.submit_user_text("Weeds?").await?;

    let cached = session.cached_audio(1).expect("reply audio should be cached");
    let path = cached.wav_path.expect("reply should be exported");
    assert!(path.ends_with("test-session-001.wav"));

    let restored = read_wav(&path)?;
    assert_eq!(restored.frame_count(), 4);
    assert_eq!(restored.sample_rate(), 24000);
    assert_eq!(restored.channel(0).unwrap(), cached.buffer.channel(0).unwrap());

    Ok(())
}

#[tokio::test]
async fn test_stats_reflect_session() -> Result<()> {
    let advisor = Arc::new(StubAdvisor::replying("Fine"));
    let speech = Arc::new(StubSpeech::returning(speech_payload(&[1, 2])));
    let output = RecordingOutput::holding();
    let config = SessionConfig {
        language: Language::Marathi,
        ..SessionConfig::default()
    };
    let session = session(config, advisor, speech, &output);

    session.submit_user_text("Kasa aahe?").await?;
    let stats = session.stats();

    assert_eq!(stats.language, Language::Marathi);
    assert_eq!(stats.phase, TurnPhase::Idle);
    assert_eq!(stats.message_count, 2);
    assert_eq!(stats.turns_completed, 1);
    assert_eq!(stats.active_playbacks, 1);
    assert!(!stats.is_capturing);
    assert!(!stats.closed);

    Ok(())
}
