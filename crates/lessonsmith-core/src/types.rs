use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// A step in the fixed guided-intake sequence. Phases only ever advance
/// forward, with one exception: a rejected diagnosis loops back to
/// `SpecificStruggle` exactly once (see `session::Session`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Greeting,
    BasicInfo,
    SpecificStruggle,
    DiagnosisConfirmation,
    InterestDiscovery,
    LearningPreferences,
    GoalsAndTone,
    FinalConfirmation,
    Complete,
}

impl SessionPhase {
    pub fn all() -> &'static [SessionPhase] {
        &[
            SessionPhase::Greeting,
            SessionPhase::BasicInfo,
            SessionPhase::SpecificStruggle,
            SessionPhase::DiagnosisConfirmation,
            SessionPhase::InterestDiscovery,
            SessionPhase::LearningPreferences,
            SessionPhase::GoalsAndTone,
            SessionPhase::FinalConfirmation,
            SessionPhase::Complete,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<SessionPhase> {
        SessionPhase::all().get(self.index() + 1).copied()
    }

    /// Display-only progress value. Not used for control flow.
    pub fn progress_percent(self) -> u8 {
        match self {
            SessionPhase::Greeting => 5,
            SessionPhase::BasicInfo => 15,
            SessionPhase::SpecificStruggle => 30,
            SessionPhase::DiagnosisConfirmation => 45,
            SessionPhase::InterestDiscovery => 60,
            SessionPhase::LearningPreferences => 70,
            SessionPhase::GoalsAndTone => 80,
            SessionPhase::FinalConfirmation => 90,
            SessionPhase::Complete => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Greeting => "greeting",
            SessionPhase::BasicInfo => "basic_info",
            SessionPhase::SpecificStruggle => "specific_struggle",
            SessionPhase::DiagnosisConfirmation => "diagnosis_confirmation",
            SessionPhase::InterestDiscovery => "interest_discovery",
            SessionPhase::LearningPreferences => "learning_preferences",
            SessionPhase::GoalsAndTone => "goals_and_tone",
            SessionPhase::FinalConfirmation => "final_confirmation",
            SessionPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionPhase {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionPhase::all()
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| crate::error::CoreError::InvalidPhase(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A step in the fixed fulfillment pipeline. The sequence an order walks
/// depends on its product kind (see `ProductKind::stages`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GeneratingScript,
    VerifyingQa,
    GeneratingAudio,
    GeneratingVisuals,
    RenderingVideo,
    GeneratingPdfs,
    Uploading,
}

impl Stage {
    /// Human-readable description shown to the polling customer.
    pub fn label(self) -> &'static str {
        match self {
            Stage::GeneratingScript => "Writing the lesson script",
            Stage::VerifyingQa => "Quality-checking the script",
            Stage::GeneratingAudio => "Recording the narration",
            Stage::GeneratingVisuals => "Illustrating the scenes",
            Stage::RenderingVideo => "Rendering the video",
            Stage::GeneratingPdfs => "Preparing the printable guides",
            Stage::Uploading => "Uploading your files",
        }
    }

    /// Display progress once this stage has completed. Values are fixed per
    /// stage so progress is non-decreasing over any valid stage sequence.
    pub fn progress_after(self) -> u8 {
        match self {
            Stage::GeneratingScript => 15,
            Stage::VerifyingQa => 30,
            Stage::GeneratingAudio => 45,
            Stage::GeneratingVisuals => 55,
            Stage::RenderingVideo => 70,
            Stage::GeneratingPdfs => 85,
            Stage::Uploading => 95,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::GeneratingScript => "generating_script",
            Stage::VerifyingQa => "verifying_qa",
            Stage::GeneratingAudio => "generating_audio",
            Stage::GeneratingVisuals => "generating_visuals",
            Stage::RenderingVideo => "rendering_video",
            Stage::GeneratingPdfs => "generating_pdfs",
            Stage::Uploading => "uploading",
        }
    }

    fn all() -> &'static [Stage] {
        &[
            Stage::GeneratingScript,
            Stage::VerifyingQa,
            Stage::GeneratingAudio,
            Stage::GeneratingVisuals,
            Stage::RenderingVideo,
            Stage::GeneratingPdfs,
            Stage::Uploading,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all()
            .iter()
            .find(|st| st.as_str() == s)
            .copied()
            .ok_or_else(|| crate::error::CoreError::InvalidStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Queued,
    Generating,
    Completed,
    Delivered,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Delivered | OrderStatus::Failed
        )
    }

    /// Completed and delivered orders have produced their deliverables.
    pub fn is_fulfilled(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Delivered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Queued => "queued",
            OrderStatus::Generating => "generating",
            OrderStatus::Completed => "completed",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GiftCodeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftCodeStatus {
    Unredeemed,
    Redeemed,
    Expired,
}

impl fmt::Display for GiftCodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GiftCodeStatus::Unredeemed => "unredeemed",
            GiftCodeStatus::Redeemed => "redeemed",
            GiftCodeStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ProductKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    AudioVideo,
    AudioOnly,
}

impl ProductKind {
    /// The fixed stage sequence for this product kind. Audio-only products
    /// skip the visual and video stages.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            ProductKind::AudioVideo => &[
                Stage::GeneratingScript,
                Stage::VerifyingQa,
                Stage::GeneratingAudio,
                Stage::GeneratingVisuals,
                Stage::RenderingVideo,
                Stage::GeneratingPdfs,
                Stage::Uploading,
            ],
            ProductKind::AudioOnly => &[
                Stage::GeneratingScript,
                Stage::VerifyingQa,
                Stage::GeneratingAudio,
                Stage::GeneratingPdfs,
                Stage::Uploading,
            ],
        }
    }

    pub fn first_stage(self) -> Stage {
        self.stages()[0]
    }

    /// The stage that follows `stage` in this kind's sequence, or `None`
    /// if `stage` is the last one.
    pub fn next_stage(self, stage: Stage) -> Option<Stage> {
        let seq = self.stages();
        let i = seq.iter().position(|&s| s == stage)?;
        seq.get(i + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProductKind::AudioVideo => "audio_video",
            ProductKind::AudioOnly => "audio_only",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductKind {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio_video" => Ok(ProductKind::AudioVideo),
            "audio_only" => Ok(ProductKind::AudioOnly),
            _ => Err(crate::error::CoreError::InvalidProductKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
