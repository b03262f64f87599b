use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two independent queue backlogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Fetch instructions, one job per scheduled source
    Crawl,

    /// Extracted content waiting for the downstream consumer
    Processing,
}

impl Lane {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Processing => "processing",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "crawl" => Some(Self::Crawl),
            "processing" => Some(Self::Processing),
            _ => None,
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Crawl, Self::Processing]
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
