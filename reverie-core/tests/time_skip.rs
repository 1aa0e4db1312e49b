//! Scenario tests for the time-skip flow and persona replacement.

use reverie_core::testing::{
    assert_message_count, assert_state, sample_persona, sample_projection, TestHarness,
};
use reverie_core::{
    ImageHandle, NarrativeState, SessionError, TimeSkipProjection, DEATH_SENTINEL,
    TIME_SKIP_PLACEHOLDER_TEXT,
};

/// Drive a fresh harness into the dead state: seed, user turn, death reply.
async fn dead_harness() -> TestHarness {
    let mut harness = TestHarness::new().await;
    harness
        .engine
        .model()
        .queue_reply(format!("You die. {DEATH_SENTINEL}"));
    harness
        .engine
        .send_turn("I step closer")
        .await
        .expect("turn runs");
    assert_state(&harness, NarrativeState::Dead);
    harness
}

// =============================================================================
// SUCCESSFUL SKIP
// =============================================================================

#[tokio::test]
async fn test_successful_skip_consolidates_and_awaits_persona() {
    let mut harness = dead_harness().await;
    harness.engine.model().queue_projection(sample_projection());

    let outcome = harness
        .engine
        .skip_time("10 years")
        .await
        .expect("skip succeeds");

    // Placeholder removed, exactly one consolidated message appended.
    assert_message_count(&harness, 4);
    assert!(harness.messages().iter().all(|m| !m.id.is_placeholder()));
    assert!(harness
        .messages()
        .iter()
        .all(|m| m.text != TIME_SKIP_PLACEHOLDER_TEXT));

    let last = harness.last_message();
    assert_eq!(last.text, outcome.summary_text);
    assert!(last.text.contains("10 years"));
    assert!(last.text.contains("300kg"));
    // The lock must survive a reload, so the summary keeps the death flag.
    assert!(last.is_death);

    let character = &harness.session().character;
    assert_eq!(character.attributes.weight, "300kg");
    assert_eq!(character.attributes.height, "3m");
    assert_eq!(character.attributes.age, "310");

    // Empty visual prompt: no image-evolution call was made.
    assert_eq!(harness.engine.model().image_evolution_calls(), 0);
    assert!(!outcome.image_evolved);

    assert_state(&harness, NarrativeState::AwaitingNewPersona);
}

#[tokio::test]
async fn test_visual_prompt_evolves_the_base_image() {
    let mut harness = dead_harness().await;
    let projection = TimeSkipProjection {
        visual_evolution_prompt: Some("older, scarred, longer hair".to_string()),
        ..sample_projection()
    };
    harness.engine.model().queue_projection(projection);
    let evolved = ImageHandle::new("image/png", "ZXZvbHZlZA==");
    harness.engine.model().set_evolved_image(evolved.clone());

    let outcome = harness
        .engine
        .skip_time("a century")
        .await
        .expect("skip succeeds");

    assert!(outcome.image_evolved);
    assert_eq!(harness.engine.model().image_evolution_calls(), 1);
    assert_eq!(
        harness.session().character.base_image.as_ref(),
        Some(&evolved)
    );
}

#[tokio::test]
async fn test_image_evolution_failure_is_not_fatal() {
    let mut harness = dead_harness().await;
    let original_image = harness.session().character.base_image.clone();
    let projection = TimeSkipProjection {
        visual_evolution_prompt: Some("older".to_string()),
        ..sample_projection()
    };
    harness.engine.model().queue_projection(projection);
    harness.engine.model().fail_image_evolution();

    let outcome = harness
        .engine
        .skip_time("10 years")
        .await
        .expect("skip still succeeds");

    assert!(!outcome.image_evolved);
    // Prior image kept; attributes still updated.
    assert_eq!(harness.session().character.base_image, original_image);
    assert_eq!(harness.session().character.attributes.age, "310");
    assert_state(&harness, NarrativeState::AwaitingNewPersona);
}

// =============================================================================
// FAILED SKIP
// =============================================================================

#[tokio::test]
async fn test_failed_skip_reverts_to_dead_and_is_retryable() {
    let mut harness = dead_harness().await;
    harness
        .engine
        .model()
        .queue_projection_failure("model overloaded");

    let result = harness.engine.skip_time("10 years").await;
    assert!(matches!(result, Err(SessionError::Narrator(_))));

    // Placeholder removed, character untouched, back to dead.
    assert_message_count(&harness, 3);
    assert!(harness.messages().iter().all(|m| !m.id.is_placeholder()));
    assert_eq!(harness.session().character.attributes.weight, "800kg");
    assert_eq!(harness.session().character.attributes.age, "300");
    assert_state(&harness, NarrativeState::Dead);

    // Retry succeeds.
    harness.engine.model().queue_projection(sample_projection());
    harness
        .engine
        .skip_time("10 years")
        .await
        .expect("retry succeeds");
    assert_state(&harness, NarrativeState::AwaitingNewPersona);
}

#[tokio::test]
async fn test_skip_requires_dead_session_and_duration() {
    let mut harness = TestHarness::new().await;
    let result = harness.engine.skip_time("10 years").await;
    assert!(matches!(
        result,
        Err(SessionError::NotAllowed {
            state: NarrativeState::Alive
        })
    ));

    let mut harness = dead_harness().await;
    let result = harness.engine.skip_time("   ").await;
    assert!(matches!(result, Err(SessionError::EmptyDuration)));
    assert_message_count(&harness, 3);
}

// =============================================================================
// PERSONA REPLACEMENT
// =============================================================================

#[tokio::test]
async fn test_new_persona_revives_the_session() {
    let mut harness = dead_harness().await;
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

    // Exactly one entrance message, and the persona is replaced.
    assert_message_count(&harness, 5);
    let messages = harness.messages();
    let entrance = &messages[4];
    assert!(entrance.text.contains("Mira"));
    assert!(!entrance.is_death);
    // The message immediately prior still carries the death flag; state is
    // computed from the last message only.
    assert!(messages[3].is_death);
    assert_state(&harness, NarrativeState::Alive);
    assert_eq!(
        harness.session().user_persona.as_ref().map(|p| p.name.as_str()),
        Some("Mira")
    );

    // Chat works again.
    harness.engine.model().queue_reply("Welcome back.");
    let outcome = harness.engine.send_turn("hello again").await.expect("turn runs");
    assert!(!outcome.died);
}

#[tokio::test]
async fn test_new_persona_rejected_outside_awaiting_state() {
    let mut harness = TestHarness::new().await;
    let result = harness.engine.submit_new_persona(sample_persona("Mira")).await;
    assert!(matches!(
        result,
        Err(SessionError::NotAllowed {
            state: NarrativeState::Alive
        })
    ));
}

#[tokio::test]
async fn test_invalid_persona_keeps_session_waiting() {
    let mut harness = dead_harness().await;
    harness.engine.model().queue_projection(sample_projection());
    harness
        .engine
        .skip_time("10 years")
        .await
        .expect("skip succeeds");

    let mut incomplete = sample_persona("Mira");
    incomplete.age = String::new();
    let result = harness.engine.submit_new_persona(incomplete).await;
    assert!(matches!(result, Err(SessionError::Validation(_))));

    assert_message_count(&harness, 4);
    assert_state(&harness, NarrativeState::AwaitingNewPersona);
}
