use crate::extract::ExtractedRecord;
use crate::SweepError;

/// Result of processing a single identifier
#[derive(Debug)]
pub enum Outcome {
    /// A complete record was extracted
    Success(ExtractedRecord),

    /// The endpoint answered with an anti-automation challenge
    Challenge,

    /// Transport failure, bad status, or a page without the mandatory fields
    HardFailure(SweepError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label used in log lines and stats
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Challenge => "challenge",
            Self::HardFailure(_) => "failure",
        }
    }
}
