//! Report units
//!
//! Firmware reports positions either in millimeters or inches depending on
//! its report-units setting (`$13` on Grbl).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Mm,
    Inch,
}

impl Units {
    /// Units selected by the value of a report-units setting (`1` = inches)
    pub fn from_report_setting(value: &str) -> Self {
        match value.trim().parse::<f64>() {
            Ok(v) if v != 0.0 => Self::Inch,
            _ => Self::Mm,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mm => write!(f, "mm"),
            Self::Inch => write!(f, "in"),
        }
    }
}
