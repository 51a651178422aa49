//! PPE item kinds, per-item presence flags and compliance derivation.
//!
//! The detection backend reports presence under Spanish keys (`casco`,
//! `lentes`, ...). Those keys are the canonical wire and storage names;
//! English aliases are accepted on input.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of personal protective equipment tracked by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PpeItem {
    #[serde(rename = "casco", alias = "helmet")]
    Helmet,
    #[serde(rename = "lentes", alias = "eyewear")]
    Eyewear,
    #[serde(rename = "guantes", alias = "gloves")]
    Gloves,
    #[serde(rename = "botas", alias = "boots")]
    Boots,
    #[serde(rename = "ropa", alias = "bodyProtection")]
    BodyProtection,
    #[serde(rename = "tapabocas", alias = "faceMask")]
    FaceMask,
}

impl PpeItem {
    /// All kinds in canonical order.
    pub const ALL: [PpeItem; 6] = [
        PpeItem::Helmet,
        PpeItem::Eyewear,
        PpeItem::Gloves,
        PpeItem::Boots,
        PpeItem::BodyProtection,
        PpeItem::FaceMask,
    ];

    /// Wire key used by the detection backend.
    pub fn wire_key(self) -> &'static str {
        match self {
            PpeItem::Helmet => "casco",
            PpeItem::Eyewear => "lentes",
            PpeItem::Gloves => "guantes",
            PpeItem::Boots => "botas",
            PpeItem::BodyProtection => "ropa",
            PpeItem::FaceMask => "tapabocas",
        }
    }

    /// Short label stored in history records.
    pub fn history_label(self) -> &'static str {
        match self {
            PpeItem::Helmet => "Casco",
            PpeItem::Eyewear => "Lentes",
            PpeItem::Gloves => "Guantes",
            PpeItem::Boots => "Botas",
            PpeItem::BodyProtection => "Chaleco",
            PpeItem::FaceMask => "Tapabocas",
        }
    }

    /// Descriptive label shown on the missing-equipment banner.
    pub fn banner_label(self) -> &'static str {
        match self {
            PpeItem::Helmet => "Casco",
            PpeItem::Eyewear => "Lentes de seguridad",
            PpeItem::Gloves => "Guantes",
            PpeItem::Boots => "Botas de seguridad",
            PpeItem::BodyProtection => "Chaleco/Protector",
            PpeItem::FaceMask => "Tapabocas",
        }
    }
}

impl fmt::Display for PpeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_key())
    }
}

impl FromStr for PpeItem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "casco" | "helmet" => Ok(PpeItem::Helmet),
            "lentes" | "eyewear" => Ok(PpeItem::Eyewear),
            "guantes" | "gloves" => Ok(PpeItem::Gloves),
            "botas" | "boots" => Ok(PpeItem::Boots),
            "ropa" | "bodyprotection" | "body_protection" => Ok(PpeItem::BodyProtection),
            "tapabocas" | "facemask" | "face_mask" => Ok(PpeItem::FaceMask),
            _ => Err(format!("Unknown PPE item: {}", s)),
        }
    }
}

/// One boolean per PPE kind.
///
/// Used both for detected presence (`ppe_status`) and for the configured
/// required set (`requiredPPE`). Missing keys deserialize as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpeFlags {
    #[serde(rename = "casco", alias = "helmet")]
    pub helmet: bool,
    #[serde(rename = "lentes", alias = "eyewear")]
    pub eyewear: bool,
    #[serde(rename = "guantes", alias = "gloves")]
    pub gloves: bool,
    #[serde(rename = "botas", alias = "boots")]
    pub boots: bool,
    #[serde(rename = "ropa", alias = "bodyProtection")]
    pub body_protection: bool,
    #[serde(rename = "tapabocas", alias = "faceMask")]
    pub face_mask: bool,
}

impl PpeFlags {
    /// Every flag cleared.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every flag set.
    pub fn all() -> Self {
        Self {
            helmet: true,
            eyewear: true,
            gloves: true,
            boots: true,
            body_protection: true,
            face_mask: true,
        }
    }

    pub fn get(&self, item: PpeItem) -> bool {
        match item {
            PpeItem::Helmet => self.helmet,
            PpeItem::Eyewear => self.eyewear,
            PpeItem::Gloves => self.gloves,
            PpeItem::Boots => self.boots,
            PpeItem::BodyProtection => self.body_protection,
            PpeItem::FaceMask => self.face_mask,
        }
    }

    pub fn set(&mut self, item: PpeItem, value: bool) {
        match item {
            PpeItem::Helmet => self.helmet = value,
            PpeItem::Eyewear => self.eyewear = value,
            PpeItem::Gloves => self.gloves = value,
            PpeItem::Boots => self.boots = value,
            PpeItem::BodyProtection => self.body_protection = value,
            PpeItem::FaceMask => self.face_mask = value,
        }
    }

    /// Kinds whose flag is set, in canonical order.
    pub fn items(&self) -> impl Iterator<Item = PpeItem> + '_ {
        PpeItem::ALL.into_iter().filter(|item| self.get(*item))
    }
}

/// Presence of each PPE kind as reported by the backend.
pub type PpeStatus = PpeFlags;

/// Kinds that must be present for a subject to be compliant.
pub type RequiredPpe = PpeFlags;

/// A single object detected in the submitted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class", alias = "class_name", alias = "label")]
    pub label: String,
    #[serde(default)]
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in source-frame pixels.
    #[serde(default, alias = "boundingBox")]
    pub bbox: Vec<f32>,
}

impl Detection {
    /// The bounding box, if the backend sent exactly four coordinates.
    pub fn bounding_box(&self) -> Option<[f32; 4]> {
        match self.bbox.as_slice() {
            [x1, y1, x2, y2] => Some([*x1, *y1, *x2, *y2]),
            _ => None,
        }
    }
}

/// Derived compliance view over the current status and required set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceSnapshot {
    pub is_compliant: bool,
    /// Required kinds not currently present, in canonical order.
    pub missing: Vec<PpeItem>,
}

impl ComplianceSnapshot {
    /// Evaluate compliance.
    ///
    /// With no detection yet there is nothing to judge, so the snapshot is
    /// compliant with no missing items.
    pub fn evaluate(required: &RequiredPpe, status: &PpeStatus, has_detection: bool) -> Self {
        if !has_detection {
            return Self {
                is_compliant: true,
                missing: Vec::new(),
            };
        }

        let missing: Vec<PpeItem> = required.items().filter(|item| !status.get(*item)).collect();

        Self {
            is_compliant: missing.is_empty(),
            missing,
        }
    }

    /// Comma-joined short labels, as stored in history.
    pub fn history_labels(&self) -> String {
        self.missing
            .iter()
            .map(|item| item.history_label())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Descriptive labels for the missing-equipment banner.
    pub fn banner_labels(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|item| item.banner_label().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_deserialize_wire_keys() {
        let json = r#"{"casco": true, "lentes": false, "guantes": true, "botas": true, "ropa": false, "tapabocas": true}"#;
        let flags: PpeFlags = serde_json::from_str(json).unwrap();
        assert!(flags.helmet);
        assert!(!flags.eyewear);
        assert!(flags.gloves);
        assert!(!flags.body_protection);
        assert!(flags.face_mask);
    }

    #[test]
    fn test_flags_missing_keys_default_false() {
        let flags: PpeFlags = serde_json::from_str(r#"{"casco": true}"#).unwrap();
        assert!(flags.helmet);
        assert_eq!(flags.items().count(), 1);
    }

    #[test]
    fn test_flags_accept_english_aliases() {
        let flags: PpeFlags =
            serde_json::from_str(r#"{"helmet": true, "faceMask": true}"#).unwrap();
        assert!(flags.helmet);
        assert!(flags.face_mask);
    }

    #[test]
    fn test_flags_serialize_wire_keys() {
        let json = serde_json::to_value(PpeFlags::all()).unwrap();
        assert_eq!(json["casco"], true);
        assert_eq!(json["tapabocas"], true);
        assert!(json.get("helmet").is_none());
    }

    #[test]
    fn test_item_from_str() {
        assert_eq!(PpeItem::from_str("Casco").unwrap(), PpeItem::Helmet);
        assert_eq!(PpeItem::from_str("face_mask").unwrap(), PpeItem::FaceMask);
        assert!(PpeItem::from_str("cape").is_err());
    }

    #[test]
    fn test_detection_class_aliases() {
        let a: Detection =
            serde_json::from_str(r#"{"class": "casco", "confidence": 0.9, "bbox": [1, 2, 3, 4]}"#)
                .unwrap();
        let b: Detection = serde_json::from_str(
            r#"{"class_name": "casco", "confidence": 0.9, "bbox": [1, 2, 3, 4]}"#,
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.bounding_box(), Some([1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_detection_malformed_bbox() {
        let d: Detection =
            serde_json::from_str(r#"{"class": "botas", "confidence": 0.5, "bbox": [1, 2]}"#)
                .unwrap();
        assert!(d.bounding_box().is_none());
    }

    #[test]
    fn test_compliance_without_detection_is_compliant() {
        let snapshot = ComplianceSnapshot::evaluate(&PpeFlags::all(), &PpeFlags::none(), false);
        assert!(snapshot.is_compliant);
        assert!(snapshot.missing.is_empty());
    }

    #[test]
    fn test_compliance_only_required_items_count() {
        let mut required = PpeFlags::none();
        required.helmet = true;
        required.boots = true;

        let mut status = PpeFlags::none();
        status.helmet = true;

        let snapshot = ComplianceSnapshot::evaluate(&required, &status, true);
        assert!(!snapshot.is_compliant);
        assert_eq!(snapshot.missing, vec![PpeItem::Boots]);

        status.boots = true;
        let snapshot = ComplianceSnapshot::evaluate(&required, &status, true);
        assert!(snapshot.is_compliant);
    }

    #[test]
    fn test_compliance_labels() {
        let snapshot = ComplianceSnapshot::evaluate(&PpeFlags::all(), &PpeFlags::none(), true);
        assert_eq!(
            snapshot.history_labels(),
            "Casco, Lentes, Guantes, Botas, Chaleco, Tapabocas"
        );
        assert_eq!(snapshot.banner_labels()[1], "Lentes de seguridad");
    }

    #[test]
    fn test_empty_required_set_always_compliant() {
        let snapshot = ComplianceSnapshot::evaluate(&PpeFlags::none(), &PpeFlags::none(), true);
        assert!(snapshot.is_compliant);
    }
}
