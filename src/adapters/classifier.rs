//! Classification backends.
//!
//! Every backend reduces the model's top detection `(class, confidence)`
//! to a [`Label`] through [`PredictionFolder`]:
//!
//! ```text
//!   confidence > threshold && class ∋ accept_keyword  →  Accept
//!   confidence > threshold && class ∋ reject_keyword  →  Reject-A
//!   anything else (incl. no detection)                →  Uncertain
//! ```

use std::collections::VecDeque;

use crate::app::ports::{ClassificationPort, Classification, Frame};
use crate::config::{ClassifierBackend, ClassifierConfig, ScriptStep};
use crate::error::ClassifyError;
use crate::tally::Label;

// ---------------------------------------------------------------------------
// Folding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PredictionFolder {
    threshold: f32,
    accept_keyword: String,
    reject_keyword: String,
}

impl PredictionFolder {
    pub fn from_config(cfg: &ClassifierConfig) -> Self {
        Self {
            threshold: cfg.confidence_threshold,
            accept_keyword: cfg.accept_keyword.to_lowercase(),
            reject_keyword: cfg.reject_keyword.to_lowercase(),
        }
    }

    /// Map the top detection, if any, to a classification.
    pub fn fold(&self, top: Option<(&str, f32)>) -> Classification {
        let Some((class, confidence)) = top else {
            return Classification {
                label: Label::Uncertain,
                confidence: 0.0,
            };
        };
        let label = if confidence > self.threshold {
            let class = class.to_lowercase();
            if class.contains(&self.accept_keyword) {
                Label::Accept
            } else if class.contains(&self.reject_keyword) {
                Label::RejectA
            } else {
                Label::Uncertain
            }
        } else {
            Label::Uncertain
        };
        Classification { label, confidence }
    }
}

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// Replays configured responses, one per frame.
pub struct ScriptedClassifier {
    folder: PredictionFolder,
    steps: VecDeque<ScriptStep>,
    repeat: bool,
}

impl ScriptedClassifier {
    pub fn new(folder: PredictionFolder, steps: Vec<ScriptStep>, repeat: bool) -> Self {
        Self {
            folder,
            steps: steps.into(),
            repeat,
        }
    }

    pub fn from_config(cfg: &ClassifierConfig) -> Self {
        let folder = PredictionFolder::from_config(cfg);
        match &cfg.backend {
            ClassifierBackend::Scripted { steps, repeat } => {
                Self::new(folder, steps.clone(), *repeat)
            }
            ClassifierBackend::Fixed { class, confidence } => Self::new(
                folder,
                vec![ScriptStep::Predict {
                    class: class.clone(),
                    confidence: *confidence,
                }],
                true,
            ),
        }
    }

    fn next_step(&mut self) -> ScriptStep {
        let Some(step) = self.steps.pop_front() else {
            return ScriptStep::Nothing;
        };
        if self.repeat {
            self.steps.push_back(step.clone());
        }
        step
    }
}

impl ClassificationPort for ScriptedClassifier {
    fn classify(&mut self, _frame: &Frame) -> Result<Classification, ClassifyError> {
        match self.next_step() {
            ScriptStep::Predict { class, confidence } => {
                Ok(self.folder.fold(Some((class.as_str(), confidence))))
            }
            ScriptStep::Nothing => Ok(self.folder.fold(None)),
            ScriptStep::Timeout => Err(ClassifyError::Timeout),
            ScriptStep::Fail => Err(ClassifyError::Backend),
        }
    }
}
