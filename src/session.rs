use anyhow::Result;
use tracing::{info, warn};

use crate::annotate::{AnnotationRequest, Annotator};
use crate::reconstruct::{AnnotatedRegion, ReconstructionConfig, ReconstructionReport, reconstruct};
use crate::surface::Surface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Analyzing,
    Reconstructing,
    Completed,
    /// The annotation call failed; the surface was never touched.
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub regions: Vec<AnnotatedRegion>,
    pub report: ReconstructionReport,
}

/// Drives one image through annotation and reconstruction.
pub struct Session {
    annotator: Box<dyn Annotator>,
    stage: Stage,
}

impl Session {
    pub fn new(annotator: impl Annotator + 'static) -> Self {
        Self {
            annotator: Box::new(annotator),
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub async fn run<S: Surface>(
        &mut self,
        surface: &mut S,
        request: AnnotationRequest,
        config: &ReconstructionConfig,
    ) -> Result<SessionOutcome> {
        self.transition(Stage::Analyzing);
        let regions = match self.annotator.annotate(request).await {
            Ok(regions) => regions,
            Err(err) => {
                warn!("annotation failed: {}", err);
                self.transition(Stage::Error(err.to_string()));
                return Err(err);
            }
        };

        self.transition(Stage::Reconstructing);
        match reconstruct(surface, &regions, config) {
            Ok(report) => {
                self.transition(Stage::Completed);
                Ok(SessionOutcome { regions, report })
            }
            Err(err) => {
                // nothing was painted; the caller may retry with a usable surface
                self.transition(Stage::Idle);
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: Stage) {
        info!("session: {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }
}
