//! Intervention command selection
//!
//! Maps a risk tier plus the detected anomalies to one actuation command
//! for the session runtime. The mapping is a pure, total decision table:
//! every (tier, anomalies) combination yields exactly one command, so the
//! runtime never has to handle "no instruction".

use crate::types::{
    Anomaly, AnomalyKind, AnomalySeverity, CommandKind, CommandSeverity, InterventionCommand,
    RiskTier,
};

/// Risk-to-command decision table
pub struct CommandPlanner;

impl CommandPlanner {
    /// Select the intervention command for one analysis cycle. Rows are
    /// checked most-urgent first; the first match wins.
    pub fn plan(risk: RiskTier, anomalies: &[Anomaly]) -> InterventionCommand {
        let sustained = anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::SustainedStress);
        let critical_focus_drop = anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::FocusDrop && a.severity == AnomalySeverity::Critical);
        let tremor_surge = anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::TremorSurge);
        let global_arousal = anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::CorrelatedElevation);

        match risk {
            RiskTier::High => {
                if let Some(anomaly) = sustained {
                    InterventionCommand {
                        name: CommandKind::CalmDown,
                        target_region: anomaly.region,
                        reason: "sustained critical stress; begin guided calming".to_string(),
                        severity: CommandSeverity::Critical,
                    }
                } else if critical_focus_drop.is_some() {
                    InterventionCommand {
                        name: CommandKind::Disengage,
                        target_region: None,
                        reason: "attention collapse under high risk; end exposure".to_string(),
                        severity: CommandSeverity::Critical,
                    }
                } else {
                    InterventionCommand {
                        name: CommandKind::PauseAndBreathe,
                        target_region: anomalies.first().and_then(|a| a.region),
                        reason: "high distress; pause the scenario and breathe".to_string(),
                        severity: CommandSeverity::High,
                    }
                }
            }
            RiskTier::Moderate => {
                if let Some(anomaly) = tremor_surge {
                    InterventionCommand {
                        name: CommandKind::PauseAndBreathe,
                        target_region: anomaly.region,
                        reason: "tremor surge at moderate risk; brief breathing pause".to_string(),
                        severity: CommandSeverity::Medium,
                    }
                } else if global_arousal.is_some() {
                    InterventionCommand {
                        name: CommandKind::PauseAndBreathe,
                        target_region: None,
                        reason: "stress rising across several regions; brief breathing pause"
                            .to_string(),
                        severity: CommandSeverity::Medium,
                    }
                } else {
                    InterventionCommand {
                        name: CommandKind::SlowDown,
                        target_region: anomalies.first().and_then(|a| a.region),
                        reason: "elevated distress; reduce scenario intensity".to_string(),
                        severity: CommandSeverity::Medium,
                    }
                }
            }
            RiskTier::Low => {
                if let Some(anomaly) = anomalies.first() {
                    InterventionCommand {
                        name: CommandKind::Monitor,
                        target_region: anomaly.region,
                        reason: "isolated deviation at low risk; observe closely".to_string(),
                        severity: CommandSeverity::Low,
                    }
                } else {
                    InterventionCommand {
                        name: CommandKind::Continue,
                        target_region: None,
                        reason: "all signals within expected range".to_string(),
                        severity: CommandSeverity::Low,
                    }
                }
            }
        }
    }
}
