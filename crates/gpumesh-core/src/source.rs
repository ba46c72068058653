use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Canonical source identifiers used in listings, metrics, and the ops surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Vastai,
    Akash,
    Render,
    Ionet,
}

impl SourceId {
    pub const ALL: [Self; 4] = [Self::Vastai, Self::Akash, Self::Render, Self::Ionet];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vastai => "vastai",
            Self::Akash => "akash",
            Self::Render => "render",
            Self::Ionet => "ionet",
        }
    }

    /// Marketplace display name, as shown in listings.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Vastai => "Vast.ai",
            Self::Akash => "Akash Network",
            Self::Render => "Render Network",
            Self::Ionet => "io.net",
        }
    }

    /// Env-var prefix for this source's configuration keys.
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Vastai => "VASTAI",
            Self::Akash => "AKASH",
            Self::Render => "RENDER",
            Self::Ionet => "IONET",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vastai" | "vast.ai" => Ok(Self::Vastai),
            "akash" => Ok(Self::Akash),
            "render" => Ok(Self::Render),
            "ionet" | "io.net" => Ok(Self::Ionet),
            other => Err(ConfigError::UnknownSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_names() {
        for id in SourceId::ALL {
            assert_eq!(id.as_str().parse::<SourceId>().expect("parses"), id);
        }
    }

    #[test]
    fn accepts_marketplace_aliases() {
        assert_eq!("Vast.ai".parse::<SourceId>().expect("parses"), SourceId::Vastai);
        assert_eq!("io.net".parse::<SourceId>().expect("parses"), SourceId::Ionet);
    }

    #[test]
    fn rejects_unknown_source() {
        assert!("lambda".parse::<SourceId>().is_err());
    }
}
