//! Guided-intake session state machine.
//!
//! A session walks a fixed phase sequence (see `SessionPhase`), extracting
//! one structured field per phase from free-form answers. Transitions are
//! strictly validated — a phase advances only when its field validates, and
//! never moves backward except the single rejected-diagnosis loop:
//!
//! ```text
//! greeting → basic_info → specific_struggle → diagnosis_confirmation → …
//!                              ▲                      │ "no" (once)
//!                              └──────────────────────┘
//! ```
//!
//! After a bounded number of consecutive validation failures in one phase
//! the best-effort answer is accepted and the phase advances anyway, so a
//! confused customer is never trapped mid-intake.

use crate::catalog::Catalog;
use crate::config::ServiceConfig;
use crate::error::{CoreError, Result};
use crate::intake::IntakeRecord;
use crate::store::Store;
use crate::types::SessionPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

pub const FIELD_CHILD_NAME: &str = "child_name";
pub const FIELD_CHILD_AGE: &str = "child_age";
pub const FIELD_STRUGGLE: &str = "struggle";
pub const FIELD_DIAGNOSIS_CONFIRMED: &str = "diagnosis_confirmed";
pub const FIELD_INTERESTS: &str = "interests";
pub const FIELD_LEARNING_STYLE: &str = "learning_style";
pub const FIELD_GOAL: &str = "goal";
pub const FIELD_TONE: &str = "tone";
pub const FIELD_FINAL_CONFIRMED: &str = "final_confirmed";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub product_id: String,
    pub phase: SessionPhase,
    /// Collected fields, append-only except where a phase explicitly
    /// permits revision (the single diagnosis loop re-captures `struggle`).
    pub fields: BTreeMap<String, String>,
    /// Consecutive validation failures in the current phase.
    #[serde(default)]
    pub failures_in_phase: u32,
    /// Set once the rejected-diagnosis loop has been taken.
    #[serde(default)]
    pub diagnosis_looped: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Optimistic-concurrency counter; bumped on every saved mutation.
    #[serde(default)]
    pub version: u64,
}

/// What the client sees after each exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub prompt: String,
    pub phase: SessionPhase,
    pub progress_percent: u8,
    pub is_complete: bool,
}

impl Session {
    pub fn new(product_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.into(),
            phase: SessionPhase::Greeting,
            fields: BTreeMap::new(),
            failures_in_phase: 0,
            diagnosis_looped: false,
            created_at: now,
            last_activity_at: now,
            version: 0,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, config: &ServiceConfig) -> bool {
        now - self.last_activity_at > config.session_timeout()
    }

    fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    fn turn(&self, prompt: String) -> Turn {
        Turn {
            prompt,
            phase: self.phase,
            progress_percent: self.phase.progress_percent(),
            is_complete: self.phase == SessionPhase::Complete,
        }
    }

    /// The question asked on entry to the session's current phase.
    pub fn current_prompt(&self) -> String {
        prompt_for(self.phase, &self.fields)
    }

    /// Apply one raw answer to the session, advancing the phase when the
    /// required field validates. Pure state-machine logic; expiry and
    /// completion are checked by the engine before this is called.
    pub fn apply_answer(&mut self, raw: &str, config: &ServiceConfig) -> Turn {
        self.last_activity_at = Utc::now();
        let raw = raw.trim();

        if self.phase == SessionPhase::DiagnosisConfirmation {
            return self.apply_diagnosis_answer(raw, config);
        }

        match extract(self.phase, raw) {
            Some((field, value, extra)) => {
                self.fields.insert(field.to_string(), value);
                if let Some((extra_field, extra_value)) = extra {
                    self.fields.insert(extra_field.to_string(), extra_value);
                }
                self.advance()
            }
            None => {
                self.failures_in_phase += 1;
                if self.failures_in_phase >= config.phase_retry_limit {
                    // Accept the best-effort answer rather than trapping the
                    // customer in a clarification loop.
                    tracing::debug!(
                        session = %self.id,
                        phase = %self.phase,
                        "accepting best-effort answer after repeated validation failures"
                    );
                    self.fields
                        .insert(required_field(self.phase).to_string(), raw.to_string());
                    self.advance()
                } else {
                    self.turn(clarify_for(self.phase, &self.fields))
                }
            }
        }
    }

    fn apply_diagnosis_answer(&mut self, raw: &str, config: &ServiceConfig) -> Turn {
        match parse_yes_no(raw) {
            Some(true) => {
                self.fields
                    .insert(FIELD_DIAGNOSIS_CONFIRMED.to_string(), "yes".to_string());
                self.advance()
            }
            Some(false) if !self.diagnosis_looped => {
                // The one permitted backward transition: re-capture the
                // struggle, then the diagnosis is restated.
                self.diagnosis_looped = true;
                self.failures_in_phase = 0;
                self.phase = SessionPhase::SpecificStruggle;
                self.turn(format!(
                    "Thanks for telling me — let's try again. In your own words, \
                     what is {} finding hardest right now?",
                    self.field(FIELD_CHILD_NAME)
                ))
            }
            Some(false) => {
                // Second rejection: accept and move on, flagged for review.
                self.fields
                    .insert(FIELD_DIAGNOSIS_CONFIRMED.to_string(), "no".to_string());
                self.advance()
            }
            None => {
                self.failures_in_phase += 1;
                if self.failures_in_phase >= config.phase_retry_limit {
                    // Same escape hatch as every other phase: take the
                    // best-effort answer and move on.
                    tracing::debug!(
                        session = %self.id,
                        phase = %self.phase,
                        "accepting best-effort answer after repeated validation failures"
                    );
                    self.fields
                        .insert(FIELD_DIAGNOSIS_CONFIRMED.to_string(), raw.to_string());
                    return self.advance();
                }
                self.turn(clarify_for(SessionPhase::DiagnosisConfirmation, &self.fields))
            }
        }
    }

    fn advance(&mut self) -> Turn {
        if let Some(next) = self.phase.next() {
            self.phase = next;
        }
        self.failures_in_phase = 0;
        self.turn(prompt_for(self.phase, &self.fields))
    }

    /// Snapshot the collected fields for checkout. Only valid once complete.
    pub fn intake(&self) -> Result<IntakeRecord> {
        if self.phase != SessionPhase::Complete {
            return Err(CoreError::SessionIncomplete(self.id.clone()));
        }
        Ok(IntakeRecord::new(
            Some(self.id.clone()),
            self.fields.clone(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Phase table: required field, extraction, prompts
// ---------------------------------------------------------------------------

pub fn required_field(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Greeting => FIELD_CHILD_NAME,
        SessionPhase::BasicInfo => FIELD_CHILD_AGE,
        SessionPhase::SpecificStruggle => FIELD_STRUGGLE,
        SessionPhase::DiagnosisConfirmation => FIELD_DIAGNOSIS_CONFIRMED,
        SessionPhase::InterestDiscovery => FIELD_INTERESTS,
        SessionPhase::LearningPreferences => FIELD_LEARNING_STYLE,
        SessionPhase::GoalsAndTone => FIELD_GOAL,
        SessionPhase::FinalConfirmation => FIELD_FINAL_CONFIRMED,
        SessionPhase::Complete => FIELD_FINAL_CONFIRMED,
    }
}

/// Extract and validate the current phase's field from a raw answer.
/// Returns `(field, value, optional secondary field)` or `None` when the
/// answer does not validate.
fn extract(
    phase: SessionPhase,
    raw: &str,
) -> Option<(&'static str, String, Option<(&'static str, String)>)> {
    match phase {
        SessionPhase::Greeting => {
            let name = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if name.is_empty() || name.len() > 100 {
                return None;
            }
            Some((FIELD_CHILD_NAME, name.to_string(), None))
        }
        SessionPhase::BasicInfo => {
            let age = first_integer(raw)?;
            if !(4..=14).contains(&age) {
                return None;
            }
            Some((FIELD_CHILD_AGE, age.to_string(), None))
        }
        SessionPhase::SpecificStruggle => {
            if raw.len() < 5 {
                return None;
            }
            Some((FIELD_STRUGGLE, raw.to_string(), None))
        }
        SessionPhase::DiagnosisConfirmation => {
            // Handled by Session::apply_diagnosis_answer.
            None
        }
        SessionPhase::InterestDiscovery => {
            if raw.is_empty() {
                return None;
            }
            Some((FIELD_INTERESTS, raw.to_string(), None))
        }
        SessionPhase::LearningPreferences => {
            if raw.is_empty() {
                return None;
            }
            Some((FIELD_LEARNING_STYLE, raw.to_string(), None))
        }
        SessionPhase::GoalsAndTone => {
            if raw.is_empty() {
                return None;
            }
            let tone = detect_tone(raw).map(|t| (FIELD_TONE, t.to_string()));
            Some((FIELD_GOAL, raw.to_string(), tone))
        }
        SessionPhase::FinalConfirmation => {
            if parse_yes_no(raw)? {
                Some((FIELD_FINAL_CONFIRMED, "yes".to_string(), None))
            } else {
                // An explicit "no" here is treated like an unclear answer:
                // re-prompt, and accept after the retry limit.
                None
            }
        }
        SessionPhase::Complete => None,
    }
}

/// The question asked on entry to `phase`, personalized from what has been
/// collected so far.
pub fn prompt_for(phase: SessionPhase, fields: &BTreeMap<String, String>) -> String {
    let name = fields
        .get(FIELD_CHILD_NAME)
        .map(String::as_str)
        .unwrap_or("your child");
    match phase {
        SessionPhase::Greeting => {
            "Hi! I build lessons made just for one child. What's your child's first name?"
                .to_string()
        }
        SessionPhase::BasicInfo => format!("Lovely. How old is {name}?"),
        SessionPhase::SpecificStruggle => format!(
            "What is {name} struggling with most right now? The more specific, the better."
        ),
        SessionPhase::DiagnosisConfirmation => {
            let struggle = fields
                .get(FIELD_STRUGGLE)
                .map(String::as_str)
                .unwrap_or("the challenge you described");
            format!("So the heart of it is: \"{struggle}\". Did I get that right?")
        }
        SessionPhase::InterestDiscovery => format!(
            "Got it. What does {name} love at the moment? Characters, animals, games — anything."
        ),
        SessionPhase::LearningPreferences => {
            format!("How does {name} learn best? Stories, pictures, songs, or hands-on play?")
        }
        SessionPhase::GoalsAndTone => {
            "What would you love this lesson to achieve, and what tone should it take \
             (playful, calm, encouraging)?"
                .to_string()
        }
        SessionPhase::FinalConfirmation => {
            let struggle = fields.get(FIELD_STRUGGLE).map(String::as_str).unwrap_or("");
            let interests = fields
                .get(FIELD_INTERESTS)
                .map(String::as_str)
                .unwrap_or("their favorite things");
            format!(
                "Here's my plan: a lesson for {name} about \"{struggle}\", \
                 woven around {interests}. Shall I start building?"
            )
        }
        SessionPhase::Complete => {
            "All set! Your personalized lesson is ready for checkout.".to_string()
        }
    }
}

fn clarify_for(phase: SessionPhase, fields: &BTreeMap<String, String>) -> String {
    let name = fields
        .get(FIELD_CHILD_NAME)
        .map(String::as_str)
        .unwrap_or("your child");
    match phase {
        SessionPhase::Greeting => "Sorry, I didn't catch a name — what should I call them?".to_string(),
        SessionPhase::BasicInfo => format!(
            "I need an age between 4 and 14 to pitch the lesson right. How old is {name}?"
        ),
        SessionPhase::SpecificStruggle => {
            "Could you say a little more? A sentence or two about what's hard helps a lot."
                .to_string()
        }
        SessionPhase::DiagnosisConfirmation => {
            "Just to be sure — is that a yes or a no?".to_string()
        }
        SessionPhase::InterestDiscovery => {
            format!("Anything {name} is into right now — even one thing helps.")
        }
        SessionPhase::LearningPreferences => {
            "No wrong answers — stories, pictures, songs, or something else?".to_string()
        }
        SessionPhase::GoalsAndTone => {
            "What outcome are you hoping for? A sentence is plenty.".to_string()
        }
        SessionPhase::FinalConfirmation => {
            "Shall I go ahead and build it? A simple yes works.".to_string()
        }
        SessionPhase::Complete => prompt_for(SessionPhase::Complete, fields),
    }
}

// ---------------------------------------------------------------------------
// Answer parsing helpers
// ---------------------------------------------------------------------------

fn first_integer(raw: &str) -> Option<u32> {
    raw.split(|c: char| !c.is_ascii_digit())
        .find(|tok| !tok.is_empty())
        .and_then(|tok| tok.parse().ok())
}

/// Detect an explicit affirmative or negative signal. Negations win over
/// affirmatives so "not right" reads as a no.
pub fn parse_yes_no(raw: &str) -> Option<bool> {
    let lower = raw.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    const NEGATIVE: &[&str] = &["no", "nope", "nah", "not", "wrong", "incorrect", "isn't"];
    const AFFIRMATIVE: &[&str] = &[
        "yes", "yeah", "yep", "yup", "right", "correct", "exactly", "sure", "ok", "okay",
        "absolutely",
    ];
    if words.iter().any(|w| NEGATIVE.contains(w)) {
        return Some(false);
    }
    if words.iter().any(|w| AFFIRMATIVE.contains(w)) {
        return Some(true);
    }
    None
}

fn detect_tone(raw: &str) -> Option<&'static str> {
    const TONES: &[&str] = &[
        "playful",
        "calm",
        "encouraging",
        "gentle",
        "silly",
        "serious",
        "funny",
    ];
    let lower = raw.to_lowercase();
    TONES.iter().find(|t| lower.contains(**t)).copied()
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// Store-backed session operations. Concurrent answers for the same session
/// are serialized by a version compare-and-set in the store; the loser gets
/// a retryable `SessionBusy`.
pub struct SessionEngine {
    store: Arc<Store>,
    config: ServiceConfig,
}

impl SessionEngine {
    pub fn new(store: Arc<Store>, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Create a session in the greeting phase. Always succeeds for a known
    /// product.
    pub fn start_session(&self, product_id: &str, catalog: &Catalog) -> Result<(Session, Turn)> {
        catalog.get(product_id)?;
        let session = Session::new(product_id);
        self.store.insert_session(&session)?;
        tracing::info!(session = %session.id, product = product_id, "session started");
        let turn = session.turn(session.current_prompt());
        Ok((session, turn))
    }

    pub fn submit_answer(&self, session_id: &str, raw: &str) -> Result<Turn> {
        let mut session = self.store.load_session(session_id)?;

        if session.phase == SessionPhase::Complete {
            return Err(CoreError::SessionAlreadyComplete(session_id.to_string()));
        }
        if session.is_expired_at(Utc::now(), &self.config) {
            return Err(CoreError::SessionExpired(session_id.to_string()));
        }

        let expected_version = session.version;
        let turn = session.apply_answer(raw, &self.config);
        self.store.save_session(&session, expected_version)?;

        if turn.is_complete {
            tracing::info!(session = %session.id, "intake complete");
        }
        Ok(turn)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        self.store.load_session(session_id)
    }

    /// Snapshot a completed session's intake for the checkout bridge.
    pub fn intake(&self, session_id: &str) -> Result<IntakeRecord> {
        self.store.load_session(session_id)?.intake()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
