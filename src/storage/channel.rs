//! Typed channel descriptors
//!
//! A channel is either a scientific output of a polarimeter or a
//! housekeeping parameter. Inside the crate channels are always typed; the
//! string form returned by [`Channel::key`] is only used to address data
//! inside recording files.
//!
//! ```text
//! Science:       POL_R0/pol_data/DEMQ1
//! Housekeeping:  POL_R0/BIAS/VD1_HK
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::storage::error::StorageError;

/// Name of the dataset holding scientific samples
const SCIENCE_DATASET: &str = "pol_data";

/// Kind of scientific output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// Total power
    Pwr,
    /// Demodulated
    Dem,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Pwr => "PWR",
            DataType::Dem => "DEM",
        }
    }
}

impl FromStr for DataType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PWR" => Ok(DataType::Pwr),
            "DEM" => Ok(DataType::Dem),
            other => Err(StorageError::InvalidFile(format!(
                "invalid data type {other}"
            ))),
        }
    }
}

/// One of the four detectors of a polarimeter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Detector {
    Q1,
    Q2,
    U1,
    U2,
}

impl Detector {
    pub fn all() -> &'static [Detector] {
        &[Detector::Q1, Detector::Q2, Detector::U1, Detector::U2]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Detector::Q1 => "Q1",
            Detector::Q2 => "Q2",
            Detector::U1 => "U1",
            Detector::U2 => "U2",
        }
    }
}

impl FromStr for Detector {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "Q1" => Ok(Detector::Q1),
            "Q2" => Ok(Detector::Q2),
            "U1" => Ok(Detector::U1),
            "U2" => Ok(Detector::U2),
            other => Err(StorageError::InvalidFile(format!("invalid detector {other}"))),
        }
    }
}

/// Housekeeping group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HkGroup {
    Bias,
    Daq,
}

impl HkGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            HkGroup::Bias => "BIAS",
            HkGroup::Daq => "DAQ",
        }
    }
}

impl FromStr for HkGroup {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BIAS" => Ok(HkGroup::Bias),
            "DAQ" => Ok(HkGroup::Daq),
            other => Err(StorageError::InvalidFile(format!(
                "invalid housekeeping group {other}"
            ))),
        }
    }
}

/// A channel that can be loaded from a recording file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Channel {
    /// Output of one detector of a polarimeter
    Science {
        polarimeter: String,
        data_type: DataType,
        detector: Detector,
    },
    /// Housekeeping parameter of a board or polarimeter
    Housekeeping {
        group: HkGroup,
        subgroup: String,
        parameter: String,
    },
}

impl Channel {
    /// Scientific channel; `"R0"` is accepted as a short form of `"POL_R0"`
    pub fn science(polarimeter: &str, data_type: DataType, detector: Detector) -> Self {
        Channel::Science {
            polarimeter: normalize_polarimeter(polarimeter),
            data_type,
            detector,
        }
    }

    /// Housekeeping channel, e.g. `(Bias, "POL_R0", "VD1_HK")`
    pub fn housekeeping(group: HkGroup, subgroup: &str, parameter: &str) -> Self {
        Channel::Housekeeping {
            group,
            subgroup: subgroup.to_ascii_uppercase(),
            parameter: parameter.to_ascii_uppercase(),
        }
    }

    /// String used to address the channel inside a recording file
    pub fn key(&self) -> String {
        match self {
            Channel::Science {
                polarimeter,
                data_type,
                detector,
            } => format!(
                "{polarimeter}/{SCIENCE_DATASET}/{}{}",
                data_type.as_str(),
                detector.as_str()
            ),
            Channel::Housekeeping {
                group,
                subgroup,
                parameter,
            } => format!("{subgroup}/{}/{parameter}", group.as_str()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Channel {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [first, middle, last] = parts.as_slice() else {
            return Err(StorageError::InvalidFile(format!("invalid channel key {s}")));
        };

        if middle.eq_ignore_ascii_case(SCIENCE_DATASET) {
            if last.len() != 5 || !last.is_char_boundary(3) {
                return Err(StorageError::InvalidFile(format!(
                    "invalid scientific column {last}"
                )));
            }
            let (data_type, detector) = last.split_at(3);
            return Ok(Channel::science(
                first,
                data_type.parse()?,
                detector.parse()?,
            ));
        }

        Ok(Channel::housekeeping(middle.parse()?, first, last))
    }
}

fn normalize_polarimeter(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    if upper.len() == 2 {
        format!("POL_{upper}")
    } else {
        upper
    }
}
