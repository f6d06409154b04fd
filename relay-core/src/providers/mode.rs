//! Modes and chain selection

use super::registry::Registry;
use std::fmt;
use std::str::FromStr;

/// Appended to a mode's chain name for the tool-calling variant
pub const TOOLS_CHAIN_SUFFIX: &str = "-tools";

/// Conversation mode; each mode names a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Normal,
    Reasoning,
    Search,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Normal, Mode::Reasoning, Mode::Search];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Reasoning => "reasoning",
            Mode::Search => "search",
        }
    }

    /// Name of the chain serving this mode
    pub fn chain_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Mode::Normal),
            "reasoning" => Ok(Mode::Reasoning),
            "search" => Ok(Mode::Search),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Maps a mode to the chain that should serve it
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRouter<'a> {
    registry: &'a Registry,
}

impl<'a> CapabilityRouter<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// `"{mode}-tools"` when tools are required and that chain exists, then the
    /// mode's own chain, then `normal`
    pub fn chain_for(&self, mode: Mode, tools_required: bool) -> &'a str {
        if tools_required {
            let tools_chain = format!("{}{}", mode.chain_name(), TOOLS_CHAIN_SUFFIX);
            if let Some(chain) = self.registry.chain(&tools_chain) {
                return chain.name.as_str();
            }
        }
        match self.registry.chain(mode.chain_name()) {
            Some(chain) => chain.name.as_str(),
            None => Mode::Normal.chain_name(),
        }
    }
}

const SEARCH_KEYWORDS: &[&str] = &[
    "berita terbaru",
    "berita hari ini",
    "harga sekarang",
    "update terbaru",
    "kabar terbaru",
    "news today",
    "current price",
    "latest news",
    "stock price",
    "kurs dollar",
    "hasil pertandingan",
    "jadwal hari ini",
    "siapa yang menang",
    "skor pertandingan",
];

// Trailing spaces keep "hitung" from matching inside "perhitungan"
const REASONING_KEYWORDS: &[&str] = &[
    "jelaskan step by step",
    "langkah demi langkah",
    "hitung ",
    "analisis ",
    "buktikan ",
    "solve ",
    "calculate ",
    "analyze ",
    "tulis kode",
    "write code",
    "debug ",
    "buatkan program",
];

/// Picks a mode from the wording of a message
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeDetector;

impl ModeDetector {
    /// Search keywords win over reasoning keywords; anything else is `normal`
    pub fn detect(text: &str) -> Mode {
        let lower = text.to_lowercase();
        if SEARCH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Mode::Search
        } else if REASONING_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Mode::Reasoning
        } else {
            Mode::Normal
        }
    }
}
