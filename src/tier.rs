use serde::{Deserialize, Serialize};

/// Market-maker commitment tiers, most to least crisis-committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Martyr,
    Citizen,
    Sovereign,
}

impl Tier {
    /// Waterfall order used by crisis routing.
    pub const CASCADE: [Tier; 3] = [Tier::Martyr, Tier::Citizen, Tier::Sovereign];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Martyr => "martyr",
            Tier::Citizen => "citizen",
            Tier::Sovereign => "sovereign",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "martyr" => Some(Tier::Martyr),
            "citizen" => Some(Tier::Citizen),
            "sovereign" => Some(Tier::Sovereign),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for tier in Tier::CASCADE {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Tier::parse(" Martyr "), Some(Tier::Martyr));
        assert_eq!(Tier::parse("whale"), None);
    }

    #[test]
    fn test_cascade_is_most_committed_first() {
        assert!(Tier::CASCADE.windows(2).all(|w| w[0] < w[1]));
    }
}
