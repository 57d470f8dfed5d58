#![forbid(unsafe_code)]

use tracing::debug;

use healthlog_kernel_contracts::parse::{ParseResult, SlotKey};
use healthlog_kernel_contracts::ReasonCodeId;

pub mod reason_codes {
    use healthlog_kernel_contracts::ReasonCodeId;

    // Fallback gate reason-code namespace.
    pub const GATE_OK_CONFIDENT_COMPLETE: ReasonCodeId = ReasonCodeId(0x4741_0001);
    pub const GATE_OK_INTAKE_TOLERATED: ReasonCodeId = ReasonCodeId(0x4741_0002);
    pub const GATE_OK_TOLERATED: ReasonCodeId = ReasonCodeId(0x4741_0003);

    pub const GATE_ESCALATE_LOW_CONFIDENCE: ReasonCodeId = ReasonCodeId(0x4741_0010);
    pub const GATE_ESCALATE_MISSING_CRITICAL: ReasonCodeId = ReasonCodeId(0x4741_0011);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackGateConfig {
    /// At or above this with nothing missing, no fallback.
    pub accept_confidence: f32,
    /// Food and drink escalate below this.
    pub intake_escalate_below: f32,
    /// Every other intent escalates below this.
    pub general_escalate_below: f32,
}

impl FallbackGateConfig {
    pub fn mvp_v1() -> Self {
        Self {
            accept_confidence: 0.8,
            intake_escalate_below: 0.6,
            general_escalate_below: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    LowConfidence { confidence: f32, threshold: f32 },
    MissingCriticalSlot(SlotKey),
}

impl FallbackReason {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            FallbackReason::LowConfidence { .. } => reason_codes::GATE_ESCALATE_LOW_CONFIDENCE,
            FallbackReason::MissingCriticalSlot(_) => reason_codes::GATE_ESCALATE_MISSING_CRITICAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackDecision {
    NotNeeded(ReasonCodeId),
    Escalate(FallbackReason),
}

impl FallbackDecision {
    pub fn should_escalate(&self) -> bool {
        matches!(self, FallbackDecision::Escalate(_))
    }

    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            FallbackDecision::NotNeeded(code) => *code,
            FallbackDecision::Escalate(reason) => reason.reason_code(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackGate {
    config: FallbackGateConfig,
}

impl FallbackGate {
    pub fn new(config: FallbackGateConfig) -> Self {
        Self { config }
    }

    /// Pure decision over a result. Food and drink tolerate lower confidence than the
    /// other intents and only escalate on a missing item.
    pub fn decide(&self, result: &ParseResult) -> FallbackDecision {
        let decision = self.evaluate(result);
        debug!(
            intent = %result.intent,
            confidence = result.confidence,
            escalate = decision.should_escalate(),
            reason_code = decision.reason_code().0,
            "fallback gate decision"
        );
        decision
    }

    fn evaluate(&self, result: &ParseResult) -> FallbackDecision {
        if result.confidence >= self.config.accept_confidence && result.missing.is_empty() {
            return FallbackDecision::NotNeeded(reason_codes::GATE_OK_CONFIDENT_COMPLETE);
        }

        let (threshold, ok_code) = if result.intent.is_intake() {
            (
                self.config.intake_escalate_below,
                reason_codes::GATE_OK_INTAKE_TOLERATED,
            )
        } else {
            (
                self.config.general_escalate_below,
                reason_codes::GATE_OK_TOLERATED,
            )
        };

        if let Some(key) = result.missing_critical().into_iter().next() {
            return FallbackDecision::Escalate(FallbackReason::MissingCriticalSlot(key));
        }
        if result.confidence < threshold {
            return FallbackDecision::Escalate(FallbackReason::LowConfidence {
                confidence: result.confidence,
                threshold,
            });
        }
        // `other` has no critical slots; its clarification marker still escalates.
        if result.missing.contains(&SlotKey::ClarificationNeeded) {
            return FallbackDecision::Escalate(FallbackReason::MissingCriticalSlot(
                SlotKey::ClarificationNeeded,
            ));
        }
        FallbackDecision::NotNeeded(ok_code)
    }
}
