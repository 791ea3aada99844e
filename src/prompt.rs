//! System instructions that steer how replies are laid out.

const PLAIN_INSTRUCTIONS: &str =
    "You are a helpful assistant. Respond in clear paragraphs that are easy to read.";
const BULLETS_INSTRUCTIONS: &str = "You are a helpful assistant. \
     Format your main points as clear bullet points using '-'. \
     Use short, readable lines.";
const NUMBERED_INSTRUCTIONS: &str = "You are a helpful assistant. \
     Format your main points as a numbered list (1., 2., 3., ...). \
     Use short, readable lines.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatStyle {
    #[default]
    Plain,
    Bullets,
    Numbered,
}

impl FormatStyle {
    /// Case-insensitive; anything unrecognised becomes `Plain`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bullets" => Self::Bullets,
            "numbered" => Self::Numbered,
            _ => Self::Plain,
        }
    }

    pub fn is_known(raw: &str) -> bool {
        matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "plain" | "bullets" | "numbered"
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Bullets => "bullets",
            Self::Numbered => "numbered",
        }
    }

    pub fn instructions(&self) -> &'static str {
        match self {
            Self::Plain => PLAIN_INSTRUCTIONS,
            Self::Bullets => BULLETS_INSTRUCTIONS,
            Self::Numbered => NUMBERED_INSTRUCTIONS,
        }
    }
}

pub fn build_system_message(style: &str) -> &'static str {
    FormatStyle::parse(style).instructions()
}
