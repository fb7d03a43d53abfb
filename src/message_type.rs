use std::{fmt, str::FromStr};

use crate::{Error, Label};

/// CI message types a job can send.
///
/// Each type has a display label (the variant name, e.g. `CodeQualityChecksDone`)
/// and a wire value carried in the `CI_TYPE` property (e.g.
/// `code-quality-checks-done`). Selectors match on the wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, cibus_macros::Label)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageType {
    Custom,
    CodeQualityChecksDone,
    ComponentBuildDone,
    EarlyPerformanceTestingDone,
    EarlySecurityTestingDone,
    ImageUploaded,
    FunctionalTestCoverageDone,
    FunctionalTestingDone,
    NonfunctionalTestingDone,
    OoTBTestingDone,
    PeerReviewDone,
    ProductAcceptedForReleaseTesting,
    ProductBuildDone,
    ProductBuildInStaging,
    ProductTestCoverageDone,
    PullRequest,
    SecurityChecksDone,
    TestingStarted,
    TestingCompleted,
    Tier0TestingDone,
    Tier1TestingDone,
    Tier2IntegrationTestingDone,
    Tier2ValidationTestingDone,
    Tier3TestingDone,
    UnitTestCoverageDone,
    UpdateDefectStatus,
}

impl MessageType {
    pub const ALL: [MessageType; 26] = [
        MessageType::Custom,
        MessageType::CodeQualityChecksDone,
        MessageType::ComponentBuildDone,
        MessageType::EarlyPerformanceTestingDone,
        MessageType::EarlySecurityTestingDone,
        MessageType::ImageUploaded,
        MessageType::FunctionalTestCoverageDone,
        MessageType::FunctionalTestingDone,
        MessageType::NonfunctionalTestingDone,
        MessageType::OoTBTestingDone,
        MessageType::PeerReviewDone,
        MessageType::ProductAcceptedForReleaseTesting,
        MessageType::ProductBuildDone,
        MessageType::ProductBuildInStaging,
        MessageType::ProductTestCoverageDone,
        MessageType::PullRequest,
        MessageType::SecurityChecksDone,
        MessageType::TestingStarted,
        MessageType::TestingCompleted,
        MessageType::Tier0TestingDone,
        MessageType::Tier1TestingDone,
        MessageType::Tier2IntegrationTestingDone,
        MessageType::Tier2ValidationTestingDone,
        MessageType::Tier3TestingDone,
        MessageType::UnitTestCoverageDone,
        MessageType::UpdateDefectStatus,
    ];

    /// Value of the `CI_TYPE` property for this type.
    pub fn ci_type(&self) -> &'static str {
        use MessageType::*;
        match self {
            Custom => "custom",
            CodeQualityChecksDone => "code-quality-checks-done",
            ComponentBuildDone => "component-build-done",
            EarlyPerformanceTestingDone => "early-performance-testing-done",
            EarlySecurityTestingDone => "early-security-testing-done",
            ImageUploaded => "image-uploaded",
            FunctionalTestCoverageDone => "functional-test-coverage-done",
            FunctionalTestingDone => "functional-testing-done",
            NonfunctionalTestingDone => "nonfunctional-testing-done",
            OoTBTestingDone => "ootb-testing-done",
            PeerReviewDone => "peer-review-done",
            ProductAcceptedForReleaseTesting => "product-accepted-for-release-testing",
            ProductBuildDone => "product-build-done",
            ProductBuildInStaging => "product-build-in-staging",
            ProductTestCoverageDone => "product-test-coverage-done",
            PullRequest => "pull-request",
            SecurityChecksDone => "security-checks-done",
            TestingStarted => "testing-started",
            TestingCompleted => "testing-completed",
            Tier0TestingDone => "tier-0-testing-done",
            Tier1TestingDone => "tier-1-testing-done",
            Tier2IntegrationTestingDone => "tier-2-integration-testing-done",
            Tier2ValidationTestingDone => "tier-2-validation-testing-done",
            Tier3TestingDone => "tier-3-testing-done",
            UnitTestCoverageDone => "unit-test-coverage-done",
            UpdateDefectStatus => "update-defect-status",
        }
    }
}

impl FromStr for MessageType {
    type Err = Error;

    /// Accepts either the label (`CodeQualityChecksDone`) or the wire value
    /// (`code-quality-checks-done`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MessageType::ALL
            .into_iter()
            .find(|t| t.label() == s || t.ci_type() == s)
            .ok_or_else(|| Error::config(format!("unknown message type '{s}'")))
    }
}

impl TryFrom<String> for MessageType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        value.label().into_owned()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
