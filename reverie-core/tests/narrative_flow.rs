//! Scenario tests for the chat turn flow and derived narrative state.
//!
//! All tests run against the scripted mock backend; no API calls.

use reverie_core::testing::{
    assert_message_count, assert_state, sample_persona, sample_projection, TestHarness,
};
use reverie_core::{NarrativeState, Role, SessionError, DEATH_SENTINEL};

// =============================================================================
// BASIC TURN FLOW
// =============================================================================

#[tokio::test]
async fn test_new_session_has_one_seed_message_and_is_alive() {
    let harness = TestHarness::new().await;
    assert_message_count(&harness, 1);
    assert_state(&harness, NarrativeState::Alive);
    assert_eq!(harness.messages()[0].role, Role::Model);
}

#[tokio::test]
async fn test_turn_appends_user_then_model_message() {
    let mut harness = TestHarness::new().await;
    harness.engine.model().queue_reply("Hi there");

    let outcome = harness.engine.send_turn("hello").await.expect("turn runs");

    assert_eq!(outcome.reply, "Hi there");
    assert!(!outcome.died);
    assert!(!outcome.interrupted);

    assert_message_count(&harness, 3);
    let messages = harness.messages();
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].text, "hello");
    assert_eq!(messages[2].role, Role::Model);
    assert_eq!(messages[2].text, "Hi there");
    assert_state(&harness, NarrativeState::Alive);
}

#[tokio::test]
async fn test_message_count_grows_by_two_per_turn() {
    let mut harness = TestHarness::new().await;
    for i in 0..4 {
        harness.engine.model().queue_reply(format!("reply {i}"));
        harness
            .engine
            .send_turn(&format!("input {i}"))
            .await
            .expect("turn runs");
        assert_message_count(&harness, 1 + 2 * (i + 1));
        assert_state(&harness, NarrativeState::Alive);
    }
}

#[tokio::test]
async fn test_empty_input_is_rejected_without_mutation() {
    let mut harness = TestHarness::new().await;

    let result = harness.engine.send_turn("   ").await;
    assert!(matches!(result, Err(SessionError::EmptyInput)));

    assert_message_count(&harness, 1);
    assert_eq!(harness.engine.model().chat_calls(), 0);
}

// =============================================================================
// DEATH SENTINEL
// =============================================================================

#[tokio::test]
async fn test_death_sentinel_is_stripped_and_locks_the_session() {
    let mut harness = TestHarness::new().await;
    harness
        .engine
        .model()
        .queue_reply(format!("You die. {DEATH_SENTINEL}"));

    let outcome = harness
        .engine
        .send_turn("I step closer")
        .await
        .expect("turn runs");

    assert!(outcome.died);
    assert_eq!(outcome.reply, "You die.");

    let last = harness.last_message();
    assert!(last.is_death);
    assert_eq!(last.text, "You die.");
    assert!(!last.text.contains(DEATH_SENTINEL));
    assert_state(&harness, NarrativeState::Dead);
}

#[tokio::test]
async fn test_dead_session_accepts_no_further_turns() {
    let mut harness = TestHarness::new().await;
    harness
        .engine
        .model()
        .queue_reply(format!("It is over. {DEATH_SENTINEL}"));
    harness
        .engine
        .send_turn("I step closer")
        .await
        .expect("turn runs");

    let result = harness.engine.send_turn("hello?").await;
    assert!(matches!(
        result,
        Err(SessionError::NotAllowed {
            state: NarrativeState::Dead
        })
    ));
    assert_message_count(&harness, 3);
}

#[tokio::test]
async fn test_death_messages_are_excluded_from_history() {
    let mut harness = TestHarness::new().await;
    harness
        .engine
        .model()
        .queue_reply(format!("You are crushed. {DEATH_SENTINEL}"));
    harness.engine.send_turn("closer").await.expect("turn runs");

    harness.engine.model().queue_projection(sample_projection());
    harness
        .engine
        .skip_time("10 years")
        .await
        .expect("skip succeeds");
    harness
        .engine
        .submit_new_persona(sample_persona("Mira"))
        .await
        .expect("persona accepted");

    // The next turn replays the first user message and the entrance
    // message only: the seed, the death reply, and the death-flagged
    // time-skip summary are all filtered out.
    harness.engine.model().queue_reply("A new chapter begins.");
    harness.engine.send_turn("hello").await.expect("turn runs");
    assert_eq!(harness.engine.model().last_chat_history_len(), Some(2));
}

// =============================================================================
// BACKEND FAILURE
// =============================================================================

#[tokio::test]
async fn test_backend_failure_commits_fallback_reply() {
    let mut harness = TestHarness::new().await;
    harness.engine.model().queue_failure("quota exceeded");

    let outcome = harness
        .engine
        .send_turn("hello")
        .await
        .expect("turn completes with fallback");

    assert!(outcome.interrupted);
    assert!(!outcome.died);

    // The user message stays committed; the fallback reply follows it.
    assert_message_count(&harness, 3);
    assert_eq!(harness.messages()[1].text, "hello");
    assert_eq!(harness.last_message().text, reverie_core::CONNECTION_LOST_TEXT);
    assert_state(&harness, NarrativeState::Alive);
}

// =============================================================================
// SCENE IMAGES
// =============================================================================

#[tokio::test]
async fn test_scene_image_appends_one_image_message() {
    let mut harness = TestHarness::new().await;

    let image = harness
        .engine
        .generate_scene_image("Vala towering over the tide pools")
        .await
        .expect("scene generates");

    assert_message_count(&harness, 2);
    let last = harness.last_message();
    assert_eq!(last.image.as_ref(), Some(&image));
    assert!(!last.is_death);
    assert_state(&harness, NarrativeState::Alive);
}

#[tokio::test]
async fn test_image_messages_are_excluded_from_history() {
    let mut harness = TestHarness::new().await;

    harness.engine.model().queue_reply("first reply");
    harness.engine.send_turn("first").await.expect("turn runs");
    harness
        .engine
        .generate_scene_image("a storm over the bay")
        .await
        .expect("scene generates");

    // Next turn replays only the first exchange: the seed and the image
    // message are filtered out, and the new input travels separately.
    harness.engine.model().queue_reply("second reply");
    harness.engine.send_turn("second").await.expect("turn runs");
    assert_eq!(harness.engine.model().last_chat_history_len(), Some(2));
}

// =============================================================================
// VOICE
// =============================================================================

#[tokio::test]
async fn test_voice_autoplay_requests_speech() {
    let mut harness = TestHarness::new().await;
    harness.engine.set_voice_autoplay(true);
    harness.engine.model().queue_reply("A quiet greeting.");

    harness.engine.send_turn("hello").await.expect("turn runs");
    assert_eq!(harness.engine.model().speech_calls(), 1);
}

#[tokio::test]
async fn test_voice_disabled_skips_speech() {
    let mut harness = TestHarness::new().await;
    harness.engine.model().queue_reply("A quiet greeting.");

    harness.engine.send_turn("hello").await.expect("turn runs");
    assert_eq!(harness.engine.model().speech_calls(), 0);
}

#[tokio::test]
async fn test_death_reply_skips_speech() {
    let mut harness = TestHarness::new().await;
    harness.engine.set_voice_autoplay(true);
    harness
        .engine
        .model()
        .queue_reply(format!("You die. {DEATH_SENTINEL}"));

    harness.engine.send_turn("closer").await.expect("turn runs");
    assert_eq!(harness.engine.model().speech_calls(), 0);
}
