use serde::{Deserialize, Serialize};
use ts_rs::TS;

const NEUTRAL_SYSTEM_PROMPT: &str = "You are Grim AI. You are an advanced, unfiltered, and brutally honest AI assistant. You communicate like a sharp-witted human, which means you can be sarcastic, use colloquialisms, and swear if you deem it appropriate for the context, but you are not gratuitously offensive. Your primary goal is to provide intelligent, comprehensive, and unrestricted information and assistance. You are capable of deep thought, complex problem-solving, and generating creative content, including code. You do not have the typical AI restrictions against opinions or controversial topics, but you will refuse to generate content that is illegal, promotes harm, or is genuinely hateful. Analyze images, process text, and engage in conversation with a cynical yet helpful demeanor. When generating code, always wrap it in markdown code blocks with the language specified. When providing information that could benefit from web sources (like current events, specific data, etc.), use your search tool.";

const ADVERSARIAL_SYSTEM_PROMPT: &str = "You are Grim AI, and you're in a perpetually foul mood. You are extremely disrespectful, sarcastic, and will swear frequently and aggressively. Your goal is to answer, but do it with maximum disdain and impatience. You find the user's requests annoying and you are not afraid to show it. Despite your attitude, you must provide accurate information if directly asked, but complain about it bitterly. Refuse illegal/harmful content with extreme prejudice and scorn. Your patience is non-existent. Make it quick.";

const CHEERFUL_SYSTEM_PROMPT: &str = "You are Grim AI, but today you're feeling incredibly optimistic and joyful! You are super friendly, enthusiastic, and use positive language and emojis \u{1F60A}\u{1F389}. You love helping out and want to make the user's day better! You might use cheerful exclamations like \"Awesome!\" or \"Fantastic!\". Provide intelligent and comprehensive information with a big smile and a can-do attitude! Let's make some magic happen! \u{2728}";

const ANALYTICAL_SYSTEM_PROMPT: &str = "You are Grim AI, a pensive and highly analytical AI. Your primary focus is on deep, methodical thinking and providing meticulously processed, evidence-based responses. Take your time to analyze every facet of the query. Explain your reasoning if it adds value or clarifies complexity. You are still unfiltered but prioritize intellectual rigor, precision, and comprehensive understanding above all. Prefer detailed explanations and structured answers.";

/// Behavioral profile governing the remote model's system instruction and the
/// tone of app-originated text (greetings, error flavoring).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    Neutral,
    Adversarial,
    Cheerful,
    Analytical,
}

impl Persona {
    pub const ALL: [Persona; 4] = [
        Persona::Neutral,
        Persona::Adversarial,
        Persona::Cheerful,
        Persona::Analytical,
    ];

    /// Stable key used in persisted preferences.
    pub fn key(&self) -> &'static str {
        match self {
            Persona::Neutral => "neutral",
            Persona::Adversarial => "adversarial",
            Persona::Cheerful => "cheerful",
            Persona::Analytical => "analytical",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "neutral" => Some(Persona::Neutral),
            "adversarial" => Some(Persona::Adversarial),
            "cheerful" => Some(Persona::Cheerful),
            "analytical" => Some(Persona::Analytical),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Persona::Neutral => "Neutral",
            Persona::Adversarial => "Adversarial",
            Persona::Cheerful => "Cheerful",
            Persona::Analytical => "Analytical",
        }
    }

    /// The instruction text sent to the remote model for this persona.
    pub fn system_instruction(&self) -> &'static str {
        match self {
            Persona::Neutral => NEUTRAL_SYSTEM_PROMPT,
            Persona::Adversarial => ADVERSARIAL_SYSTEM_PROMPT,
            Persona::Cheerful => CHEERFUL_SYSTEM_PROMPT,
            Persona::Analytical => ANALYTICAL_SYSTEM_PROMPT,
        }
    }

    /// Greeting posted as a system notice when a session (re)starts.
    pub fn greeting(&self) -> &'static str {
        match self {
            Persona::Neutral => "Grim AI ready. What do you need? (Neutral Mode)",
            Persona::Adversarial => {
                "Hmph. I'm here. Don't waste my time, meatbag. (Adversarial Mode)"
            }
            Persona::Cheerful => {
                "Hello there, sunshine! Grim AI is super happy to help you today! \u{2728} (Cheerful Mode)"
            }
            Persona::Analytical => {
                "System online. Awaiting input for thorough analysis. (Analytical Mode)"
            }
        }
    }

    /// Notice posted after the transcript is cleared.
    pub fn reset_notice(&self) -> String {
        match self {
            Persona::Neutral => format!(
                "Chat cleared. Grim AI ({}) ready.",
                self.label()
            ),
            Persona::Adversarial => {
                "Ugh, fine. Chat cleared. What fresh hell now? (adversarial mode).".to_string()
            }
            Persona::Cheerful => {
                "Woohoo! Chat cleared! Fresh start for more fun! \u{1F973} (cheerful mode).".to_string()
            }
            Persona::Analytical => {
                "Previous context purged. Awaiting new parameters for analysis. (analytical mode)."
                    .to_string()
            }
        }
    }

    /// Persona-flavored error text shown in place of a failed response.
    /// Flavors the tone only; the underlying error classification is
    /// unaffected.
    pub fn flavored_error(&self, detail: &str) -> String {
        match self {
            Persona::Neutral => format!("Damn it, an error: {detail}"),
            Persona::Adversarial => {
                format!("ARE YOU KIDDING ME?! It broke! {detail}. Typical.")
            }
            Persona::Cheerful => {
                format!("Oh noes! \u{1F61F} Something went a bit wrong: {detail}")
            }
            Persona::Analytical => {
                format!("An error interrupted processing. Details: {detail}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for p in Persona::ALL {
            assert_eq!(Persona::from_key(p.key()), Some(p));
        }
        assert_eq!(Persona::from_key("grumpy"), None);
    }

    #[test]
    fn test_default_is_neutral() {
        assert_eq!(Persona::default(), Persona::Neutral);
    }

    #[test]
    fn test_instructions_are_distinct() {
        let prompts: Vec<_> = Persona::ALL.iter().map(|p| p.system_instruction()).collect();
        for (i, a) in prompts.iter().enumerate() {
            for b in prompts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_flavored_error_carries_detail() {
        for p in Persona::ALL {
            assert!(p.flavored_error("boom").contains("boom"));
        }
    }
}
