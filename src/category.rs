/*!
 * Coarse HCPCS / CPT category classification
 *
 * Level II HCPCS codes (leading letter A-V) map through a per-letter table.
 * Anything else is read as a numeric CPT code from its leading digits and
 * mapped by range.
 */

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Closed set of procedure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcedureCategory {
    TransportDme,
    EnteralParenteral,
    OutpatientHospital,
    Dental,
    Dme,
    ProceduresServices,
    BehavioralHealth,
    Drugs,
    OrthoticsProsthetics,
    QualityMeasures,
    PathologyLab,
    TemporaryCodes,
    Radiology,
    PrivatePayer,
    StateMedicaid,
    VisionHearing,
    OtherLevelII,
    EvaluationManagement,
    Surgery,
    Medicine,
    Other,
}

impl ProcedureCategory {
    pub const ALL: [ProcedureCategory; 21] = [
        ProcedureCategory::TransportDme,
        ProcedureCategory::EnteralParenteral,
        ProcedureCategory::OutpatientHospital,
        ProcedureCategory::Dental,
        ProcedureCategory::Dme,
        ProcedureCategory::ProceduresServices,
        ProcedureCategory::BehavioralHealth,
        ProcedureCategory::Drugs,
        ProcedureCategory::OrthoticsProsthetics,
        ProcedureCategory::QualityMeasures,
        ProcedureCategory::PathologyLab,
        ProcedureCategory::TemporaryCodes,
        ProcedureCategory::Radiology,
        ProcedureCategory::PrivatePayer,
        ProcedureCategory::StateMedicaid,
        ProcedureCategory::VisionHearing,
        ProcedureCategory::OtherLevelII,
        ProcedureCategory::EvaluationManagement,
        ProcedureCategory::Surgery,
        ProcedureCategory::Medicine,
        ProcedureCategory::Other,
    ];

    /// Classify a procedure code. Total and deterministic.
    pub fn classify(code: &str) -> Self {
        let Some(first) = code.chars().next() else {
            return ProcedureCategory::Other;
        };

        if ('A'..='V').contains(&first) {
            return Self::level_two(first);
        }

        let prefix: String = code.chars().take(5).take_while(|c| c.is_ascii_digit()).collect();
        match prefix.parse::<u32>() {
            Ok(num) => Self::numeric(num),
            Err(_) => ProcedureCategory::Other,
        }
    }

    fn level_two(letter: char) -> Self {
        match letter {
            'A' => ProcedureCategory::TransportDme,
            'B' => ProcedureCategory::EnteralParenteral,
            'C' => ProcedureCategory::OutpatientHospital,
            'D' => ProcedureCategory::Dental,
            'E' | 'K' => ProcedureCategory::Dme,
            'G' => ProcedureCategory::ProceduresServices,
            'H' => ProcedureCategory::BehavioralHealth,
            'J' => ProcedureCategory::Drugs,
            'L' => ProcedureCategory::OrthoticsProsthetics,
            'M' => ProcedureCategory::QualityMeasures,
            'P' => ProcedureCategory::PathologyLab,
            'Q' => ProcedureCategory::TemporaryCodes,
            'R' => ProcedureCategory::Radiology,
            'S' => ProcedureCategory::PrivatePayer,
            'T' => ProcedureCategory::StateMedicaid,
            'V' => ProcedureCategory::VisionHearing,
            _ => ProcedureCategory::OtherLevelII,
        }
    }

    fn numeric(num: u32) -> Self {
        match num {
            99201..=99499 => ProcedureCategory::EvaluationManagement,
            10000..=69999 => ProcedureCategory::Surgery,
            70000..=79999 => ProcedureCategory::Radiology,
            80000..=89999 => ProcedureCategory::PathologyLab,
            90000..=99199 => ProcedureCategory::Medicine,
            0..=9999 => ProcedureCategory::EvaluationManagement,
            _ => ProcedureCategory::Other,
        }
    }

    /// Display label written to the output tables
    pub fn label(&self) -> &'static str {
        match self {
            ProcedureCategory::TransportDme => "Transport & DME",
            ProcedureCategory::EnteralParenteral => "Enteral/Parenteral",
            ProcedureCategory::OutpatientHospital => "Outpatient Hospital",
            ProcedureCategory::Dental => "Dental",
            ProcedureCategory::Dme => "DME",
            ProcedureCategory::ProceduresServices => "Procedures/Services",
            ProcedureCategory::BehavioralHealth => "Behavioral Health",
            ProcedureCategory::Drugs => "Drugs",
            ProcedureCategory::OrthoticsProsthetics => "Orthotics/Prosthetics",
            ProcedureCategory::QualityMeasures => "Quality Measures",
            ProcedureCategory::PathologyLab => "Pathology/Lab",
            ProcedureCategory::TemporaryCodes => "Temporary Codes",
            ProcedureCategory::Radiology => "Radiology",
            ProcedureCategory::PrivatePayer => "Private Payer",
            ProcedureCategory::StateMedicaid => "State Medicaid",
            ProcedureCategory::VisionHearing => "Vision/Hearing",
            ProcedureCategory::OtherLevelII => "Other Level II",
            ProcedureCategory::EvaluationManagement => "E&M",
            ProcedureCategory::Surgery => "Surgery",
            ProcedureCategory::Medicine => "Medicine",
            ProcedureCategory::Other => "Other",
        }
    }

    /// Inverse of [`label`](Self::label)
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.label() == label)
    }
}

impl fmt::Display for ProcedureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ProcedureCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ProcedureCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        ProcedureCategory::from_label(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown category '{label}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcedureCategory::*;

    #[test]
    fn test_level_two_letters() {
        assert_eq!(ProcedureCategory::classify("A0428"), TransportDme);
        assert_eq!(ProcedureCategory::classify("D0120"), Dental);
        assert_eq!(ProcedureCategory::classify("E0601"), Dme);
        assert_eq!(ProcedureCategory::classify("K0001"), Dme);
        assert_eq!(ProcedureCategory::classify("H0015"), BehavioralHealth);
        assert_eq!(ProcedureCategory::classify("J1745"), Drugs);
        assert_eq!(ProcedureCategory::classify("T1019"), StateMedicaid);
        assert_eq!(ProcedureCategory::classify("F1234"), OtherLevelII);
        assert_eq!(ProcedureCategory::classify("U0003"), OtherLevelII);
    }

    #[test]
    fn test_numeric_ranges() {
        assert_eq!(ProcedureCategory::classify("99213"), EvaluationManagement);
        assert_eq!(ProcedureCategory::classify("99499"), EvaluationManagement);
        assert_eq!(ProcedureCategory::classify("99500"), Other);
        assert_eq!(ProcedureCategory::classify("99199"), Medicine);
        assert_eq!(ProcedureCategory::classify("90837"), Medicine);
        assert_eq!(ProcedureCategory::classify("10060"), Surgery);
        assert_eq!(ProcedureCategory::classify("71045"), Radiology);
        assert_eq!(ProcedureCategory::classify("85025"), PathologyLab);
        // Category II codes read as their leading digits
        assert_eq!(ProcedureCategory::classify("0001F"), EvaluationManagement);
    }

    #[test]
    fn test_unparseable_is_other() {
        assert_eq!(ProcedureCategory::classify(""), Other);
        assert_eq!(ProcedureCategory::classify("W1234"), Other);
        assert_eq!(ProcedureCategory::classify("j1745"), Other);
        assert_eq!(ProcedureCategory::classify("-1234"), Other);
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&EvaluationManagement).unwrap(), "\"E&M\"");
        assert_eq!(TransportDme.to_string(), "Transport & DME");
        for category in ProcedureCategory::ALL {
            assert_eq!(ProcedureCategory::from_label(category.label()), Some(category));
        }
        let back: ProcedureCategory = serde_json::from_str("\"Pathology/Lab\"").unwrap();
        assert_eq!(back, PathologyLab);
    }
}
