//! Breached-limit indicators and their ATT&CK technique tags.

use serde::Serialize;

/// ATT&CK technique a feature breach is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Technique {
    pub id: &'static str,
    pub name: &'static str,
    pub tactic: &'static str,
}

const RESOURCE_HIJACKING: Technique = Technique {
    id: "T1496",
    name: "Resource Hijacking",
    tactic: "Impact",
};

const EXFILTRATION: Technique = Technique {
    id: "T1048",
    name: "Exfiltration Over Alternative Protocol",
    tactic: "Exfiltration",
};

const INGRESS_TOOL_TRANSFER: Technique = Technique {
    id: "T1105",
    name: "Ingress Tool Transfer",
    tactic: "Command and Control",
};

const SCRIPTING_INTERPRETER: Technique = Technique {
    id: "T1059",
    name: "Command and Scripting Interpreter",
    tactic: "Execution",
};

/// Technique for a feature name, if the feature has one.
pub fn technique_for(feature: &str) -> Option<Technique> {
    match feature {
        "cpu" | "memory_mb" => Some(RESOURCE_HIJACKING),
        "tx_bytes_per_sec" | "tx_packets" => Some(EXFILTRATION),
        "rx_bytes_per_sec" | "rx_packets" => Some(INGRESS_TOOL_TRANSFER),
        "new_process" => Some(SCRIPTING_INTERPRETER),
        _ => None,
    }
}

/// One feature over its limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicator {
    pub feature: String,
    pub value: f64,
    pub limit: f64,
    /// `value / limit`
    pub ratio: f64,
    pub technique: Option<Technique>,
}

impl Indicator {
    pub fn new(feature: &str, value: f64, limit: f64) -> Self {
        Self {
            feature: feature.to_string(),
            value,
            limit,
            ratio: value / limit,
            technique: technique_for(feature),
        }
    }
}
