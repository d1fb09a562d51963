use crate::error::WorkflowError;
use chrono::{DateTime, Utc};
use plant_classifier::{ClassificationRequest, ClassificationResult, ClassifierErrorKind};
use uuid::Uuid;

/// Where one "identify a plant" session currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No image selected
    Idle,
    ImageSelected,
    /// Inference in flight
    Classifying,
    Classified {
        label: String,
    },
    /// Shown as "could not identify", the reason is kept for diagnostics
    ClassificationFailed {
        reason: ClassifierErrorKind,
    },
    /// Record commit in flight
    Saving {
        label: String,
    },
    Saved {
        record_id: Uuid,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::ImageSelected => "image_selected",
            SessionState::Classifying => "classifying",
            SessionState::Classified { .. } => "classified",
            SessionState::ClassificationFailed { .. } => "classification_failed",
            SessionState::Saving { .. } => "saving",
            SessionState::Saved { .. } => "saved",
        }
    }

    /// The label while one is available for display
    pub fn label(&self) -> Option<&str> {
        match self {
            SessionState::Classified { label } | SessionState::Saving { label } => Some(label),
            _ => None,
        }
    }
}

/// Handed out when a classification starts; the result is only accepted for
/// the same generation
#[derive(Debug, Clone)]
pub struct ClassificationTicket {
    pub generation: u64,
    pub request: ClassificationRequest,
}

/// Handed out when a save starts
#[derive(Debug, Clone)]
pub struct SaveTicket {
    pub generation: u64,
    pub label: String,
    pub request: ClassificationRequest,
}

/// State machine of one identification session.
///
/// Every image selection starts a new generation. Results that belong to an
/// older generation are dropped, so a late result can never show up next to
/// a newer photo.
#[derive(Debug)]
pub struct IdentificationSession {
    state: SessionState,
    image: Option<ClassificationRequest>,
    generation: u64,
    started_at: DateTime<Utc>,
}

impl Default for IdentificationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentificationSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            image: None,
            generation: 0,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn image(&self) -> Option<&ClassificationRequest> {
        self.image.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn invalid(&self, operation: &'static str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            operation,
            state: self.state.name(),
        }
    }

    /// Valid from any state; forgets any previous result
    pub fn select_image(&mut self, request: ClassificationRequest) {
        self.generation += 1;
        self.image = Some(request);
        self.state = SessionState::ImageSelected;
    }

    pub fn start_classification(&mut self) -> Result<ClassificationTicket, WorkflowError> {
        if self.state != SessionState::ImageSelected {
            return Err(self.invalid("start_classification"));
        }
        let request = self
            .image
            .clone()
            .ok_or_else(|| self.invalid("start_classification"))?;

        self.state = SessionState::Classifying;
        Ok(ClassificationTicket {
            generation: self.generation,
            request,
        })
    }

    /// Applies a classification result. Returns `false` if the result was
    /// stale and dropped.
    pub fn complete_classification(
        &mut self,
        generation: u64,
        result: ClassificationResult,
    ) -> bool {
        if generation != self.generation || self.state != SessionState::Classifying {
            return false;
        }

        self.state = match result {
            ClassificationResult::Label(label) => SessionState::Classified { label },
            ClassificationResult::Failure(reason) => {
                SessionState::ClassificationFailed { reason }
            }
        };
        true
    }

    pub fn begin_save(&mut self) -> Result<SaveTicket, WorkflowError> {
        let label = match &self.state {
            SessionState::Classified { label } => label.clone(),
            _ => return Err(self.invalid("save")),
        };
        let request = self.image.clone().ok_or_else(|| self.invalid("save"))?;

        self.state = SessionState::Saving {
            label: label.clone(),
        };
        Ok(SaveTicket {
            generation: self.generation,
            label,
            request,
        })
    }

    pub fn save_succeeded(&mut self, generation: u64, record_id: Uuid) -> bool {
        if generation != self.generation || !matches!(self.state, SessionState::Saving { .. }) {
            return false;
        }
        self.state = SessionState::Saved { record_id };
        true
    }

    /// Returns to `Classified` so the user can retry
    pub fn save_failed(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match &self.state {
            SessionState::Saving { label } => {
                self.state = SessionState::Classified {
                    label: label.clone(),
                };
                true
            }
            _ => false,
        }
    }

    /// Back to `Idle`, used when the sheet closes
    pub fn reset(&mut self) {
        self.generation += 1;
        self.image = None;
        self.state = SessionState::Idle;
    }
}
