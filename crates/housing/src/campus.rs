use core::str::FromStr;

use serde::{Deserialize, Serialize};

use campusstay_core::DomainError;

/// Campuses a student can register against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Campus {
    #[serde(rename = "Soshanguve North")]
    SoshanguveNorth,
    #[serde(rename = "Soshanguve South")]
    SoshanguveSouth,
    #[serde(rename = "Garankuwa Campus")]
    Garankuwa,
    #[serde(rename = "Arts Campus")]
    Arts,
    #[serde(rename = "Arcadia Campus")]
    Arcadia,
    #[serde(rename = "Pretoria Campus")]
    Pretoria,
}

impl Campus {
    pub const ALL: [Campus; 6] = [
        Campus::SoshanguveNorth,
        Campus::SoshanguveSouth,
        Campus::Garankuwa,
        Campus::Arts,
        Campus::Arcadia,
        Campus::Pretoria,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Campus::SoshanguveNorth => "Soshanguve North",
            Campus::SoshanguveSouth => "Soshanguve South",
            Campus::Garankuwa => "Garankuwa Campus",
            Campus::Arts => "Arts Campus",
            Campus::Arcadia => "Arcadia Campus",
            Campus::Pretoria => "Pretoria Campus",
        }
    }
}

impl core::fmt::Display for Campus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Campus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Campus::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Campus::ALL.iter().map(Campus::as_str).collect();
                DomainError::validation(format!("campus must be one of: {}", allowed.join(", ")))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_names() {
        for campus in Campus::ALL {
            assert_eq!(campus.as_str().parse::<Campus>().unwrap(), campus);
        }
    }

    #[test]
    fn rejects_unknown_campus() {
        let err = "Moon Campus".parse::<Campus>().unwrap_err();
        assert!(err.to_string().contains("Pretoria Campus"));
    }
}
