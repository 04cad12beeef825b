//! Unit tests for the deterministic keyword classifier.

use pilot_orchestrator::classifier::RuleClassifier;
use pilot_orchestrator::models::intent::Intent;

fn classify(text: &str) -> Intent {
    RuleClassifier::new().classify(text)
}

#[test]
fn slash_prefix_is_a_command() {
    assert_eq!(classify("/status"), Intent::Command);
    assert_eq!(classify("  /run 07"), Intent::Command);
}

#[test]
fn short_salutations_are_greetings() {
    assert_eq!(classify("hi"), Intent::Greeting);
    assert_eq!(classify("Hello!"), Intent::Greeting);
    assert_eq!(classify("good morning"), Intent::Greeting);
}

/// A greeting word at the start of a longer request is not a greeting.
#[test]
fn long_messages_starting_with_greeting_are_not_greetings() {
    assert_ne!(
        classify("hey can you fix the flaky login test please"),
        Intent::Greeting
    );
}

#[test]
fn research_directives() {
    assert_eq!(classify("research caching strategies"), Intent::Research);
    assert_eq!(classify("please analyze the auth module"), Intent::Research);
}

#[test]
fn planning_keywords() {
    assert_eq!(classify("plan the database migration"), Intent::Planning);
    assert_eq!(classify("how should we structure the api"), Intent::Planning);
}

#[test]
fn opinion_seeking_is_chat() {
    assert_eq!(classify("what do you think about rust"), Intent::Chat);
    assert_eq!(classify("should i use tokio here"), Intent::Chat);
}

#[test]
fn questions() {
    assert_eq!(classify("what handles authentication?"), Intent::Question);
    assert_eq!(classify("where is the config loaded"), Intent::Question);
    assert_eq!(classify("show me the open issues"), Intent::Question);
}

#[test]
fn action_directives_are_tasks() {
    assert_eq!(classify("fix bug in the parser"), Intent::Task);
    assert_eq!(classify("add a README"), Intent::Task);
    assert_eq!(classify("can you refactor the store module"), Intent::Task);
}

/// A bare backlog reference is a task.
#[test]
fn backlog_references_are_tasks() {
    assert_eq!(classify("task 07"), Intent::Task);
    assert_eq!(classify("#12"), Intent::Task);
}

/// Casual use of an action word mid-sentence is not a directive.
#[test]
fn reaction_with_action_word_is_chat() {
    assert_eq!(classify("Wow, let's commit changes first"), Intent::Chat);
    assert_eq!(classify("nice, that looks great"), Intent::Chat);
}

/// Unmatched text falls back to chat, never to task.
#[test]
fn unmatched_text_is_chat() {
    assert_eq!(classify("hmm interesting"), Intent::Chat);
    assert_eq!(classify(""), Intent::Chat);
}

#[test]
fn contains_action_word_checks_directive_position() {
    let rules = RuleClassifier::new();
    assert!(rules.contains_action_word("Fix the tests"));
    assert!(rules.contains_action_word("please update the docs"));
    assert!(!rules.contains_action_word("the fix looks good"));
}
