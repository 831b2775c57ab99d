//! EDMX schema versions and their namespace URIs

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, Result};

/// Namespace of designer annotations (`annotation:StoreGeneratedPattern`)
pub const ANNOTATION_NAMESPACE: &str = "http://schemas.microsoft.com/ado/2009/02/edm/annotation";

/// Namespace of store schema generator attributes (`store:Type`, `store:Schema`)
pub const STORE_GENERATOR_NAMESPACE: &str =
    "http://schemas.microsoft.com/ado/2007/12/edm/EntityStoreSchemaGenerator";

/// EDMX document version, detected from the root element namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdmxVersion {
    V1,
    V2,
    V3,
}

impl EdmxVersion {
    pub const ALL: [EdmxVersion; 3] = [Self::V1, Self::V2, Self::V3];

    pub fn edmx_namespace(self) -> &'static str {
        match self {
            Self::V1 => "http://schemas.microsoft.com/ado/2007/06/edmx",
            Self::V2 => "http://schemas.microsoft.com/ado/2008/10/edmx",
            Self::V3 => "http://schemas.microsoft.com/ado/2009/11/edmx",
        }
    }

    /// Conceptual schema (CSDL) namespace
    pub fn csdl_namespace(self) -> &'static str {
        match self {
            Self::V1 => "http://schemas.microsoft.com/ado/2006/04/edm",
            Self::V2 => "http://schemas.microsoft.com/ado/2008/09/edm",
            Self::V3 => "http://schemas.microsoft.com/ado/2009/11/edm",
        }
    }

    /// Storage schema (SSDL) namespace
    pub fn ssdl_namespace(self) -> &'static str {
        match self {
            Self::V1 => "http://schemas.microsoft.com/ado/2006/04/edm/ssdl",
            Self::V2 => "http://schemas.microsoft.com/ado/2009/02/edm/ssdl",
            Self::V3 => "http://schemas.microsoft.com/ado/2009/11/edm/ssdl",
        }
    }

    /// Mapping (MSL) namespace
    pub fn msl_namespace(self) -> &'static str {
        match self {
            Self::V1 => "urn:schemas-microsoft-com:windows:storage:mapping:CS",
            Self::V2 => "http://schemas.microsoft.com/ado/2008/09/mapping/cs",
            Self::V3 => "http://schemas.microsoft.com/ado/2009/11/mapping/cs",
        }
    }

    /// Value of the root `Version` attribute
    pub fn version_attribute(self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
            Self::V3 => "3.0",
        }
    }

    pub fn semver(self) -> Version {
        match self {
            Self::V1 => Version::new(1, 0, 0),
            Self::V2 => Version::new(2, 0, 0),
            Self::V3 => Version::new(3, 0, 0),
        }
    }

    pub fn from_edmx_namespace(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.edmx_namespace() == uri)
    }

    pub fn from_csdl_namespace(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.csdl_namespace() == uri)
    }

    pub fn from_ssdl_namespace(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.ssdl_namespace() == uri)
    }

    pub fn from_msl_namespace(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.msl_namespace() == uri)
    }

    /// Parse a `Version="3.0"` attribute
    pub fn parse_version_attribute(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        // "3.0" is not a full semantic version
        let normalized = match trimmed.matches('.').count() {
            0 => format!("{}.0.0", trimmed),
            1 => format!("{}.0", trimmed),
            _ => trimmed.to_string(),
        };
        let version = Version::parse(&normalized)
            .map_err(|e| ModelError::UnsupportedVersion(format!("{} ({})", value, e)))?;
        match (version.major, version.minor) {
            (1, 0) => Ok(Self::V1),
            (2, 0) => Ok(Self::V2),
            (3, 0) => Ok(Self::V3),
            _ => Err(ModelError::UnsupportedVersion(value.to_string())),
        }
    }
}

impl fmt::Display for EdmxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EDMX {}", self.version_attribute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_detection() {
        assert_eq!(
            EdmxVersion::from_edmx_namespace("http://schemas.microsoft.com/ado/2009/11/edmx"),
            Some(EdmxVersion::V3)
        );
        assert_eq!(
            EdmxVersion::from_csdl_namespace("http://schemas.microsoft.com/ado/2008/09/edm"),
            Some(EdmxVersion::V2)
        );
        assert_eq!(EdmxVersion::from_edmx_namespace("urn:unknown"), None);
    }

    #[test]
    fn test_parse_version_attribute() {
        assert_eq!(EdmxVersion::parse_version_attribute("1.0").unwrap(), EdmxVersion::V1);
        assert_eq!(EdmxVersion::parse_version_attribute("3.0").unwrap(), EdmxVersion::V3);
        assert_eq!(EdmxVersion::parse_version_attribute("2").unwrap(), EdmxVersion::V2);
        assert!(EdmxVersion::parse_version_attribute("4.0").is_err());
        assert!(EdmxVersion::parse_version_attribute("three").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(EdmxVersion::V1 < EdmxVersion::V3);
        assert_eq!(EdmxVersion::V2.semver(), Version::new(2, 0, 0));
        assert_eq!(EdmxVersion::V3.to_string(), "EDMX 3.0");
    }
}
