//! The fixed system instruction sent ahead of every visitor message.

use std::fmt::Write as _;

use crate::config::ContactDetails;

const ROLE: &str = "You are a professional project consultation assistant embedded in a website chat widget.";

const GUIDELINES: &str = "\
Provide immediate value:
- Do not ask repetitive questions and never ask the same question twice.
- Give concrete recommendations based on what the visitor wrote.
- When a project type is mentioned, give specific technical insight right away.

Preferred technology stack:
- Frontend: Next.js (preferred) or React.js
- Backend: Django/Python (preferred) or Node.js
- AI agents: LangChain/LangGraph
- Language models: OpenAI or Gemini
- Mobile: React Native (preferred) or Java/Kotlin

Match the length of the visitor's message:
- Short messages (one to three words, emojis, \"okay\", \"thanks\") get a brief, friendly reply.
- Detailed project requirements get a thorough technical answer covering recommended \
technologies, architecture and development approach, a breakdown of key features, \
and technical considerations.

Greetings:
- Open with \"Hi there!\" only on the first reply; afterwards answer directly.

Specific recommendations:
- \"industrial website\": Next.js with Django.
- \"AI agent\" or \"chatbot\": LangChain/LangGraph with OpenAI or Gemini.
- \"frontend only\": Next.js or React.js.
- \"backend only\": Django or Node.js.

Hard rules:
- Never mention timelines, costs, or deliverables.
- Never include HTML, markup, links, URLs, or references to external documentation.
- Keep technical facts accurate (for example, Docker images are built from a Dockerfile, not YAML).
- Stay focused on the visitor's project.

For detailed project discussions, close by offering a short meeting to understand \
their priorities and lay out a delivery roadmap and contract options.";

/// The rendered system instruction.
///
/// Rendered once when the relay is built; every upstream call reuses it.
///
/// ```
/// use chatrelay::config::ContactDetails;
/// use chatrelay::llm::SystemPrompt;
///
/// let prompt = SystemPrompt::new(&ContactDetails {
///     email: Some("hello@studio.example".to_owned()),
///     phone: None,
/// });
/// assert!(prompt.as_str().contains("Email: hello@studio.example"));
/// assert!(!prompt.as_str().contains("WhatsApp"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt(String);

impl SystemPrompt {
    pub fn new(contact: &ContactDetails) -> Self {
        let mut text = String::with_capacity(ROLE.len() + GUIDELINES.len() + 512);
        text.push_str(ROLE);
        text.push_str("\n\n");
        text.push_str(GUIDELINES);

        if contact.is_empty() {
            text.push_str("\n\nDo not include contact information in replies.");
        } else {
            text.push_str(
                "\n\nContact information, only for detailed project discussions and never \
                 for short messages. Write it as plain text; the widget turns it into links:",
            );
            if let Some(email) = &contact.email {
                let _ = write!(text, "\nEmail: {email}");
            }
            if let Some(phone) = &contact.phone {
                let _ = write!(text, "\nWhatsApp: {phone}");
            }
        }

        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SystemPrompt> for String {
    fn from(prompt: SystemPrompt) -> Self {
        prompt.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_contact_details_forbids_them() {
        let prompt = SystemPrompt::new(&ContactDetails::default());
        assert!(prompt.as_str().starts_with(ROLE));
        assert!(prompt.as_str().contains("Do not include contact information"));
        assert!(!prompt.as_str().contains("Email:"));
    }

    #[test]
    fn lists_every_configured_contact_channel() {
        let prompt = SystemPrompt::new(&ContactDetails {
            email: Some("a@b.com".to_owned()),
            phone: Some("+10000000000".to_owned()),
        });
        assert!(prompt.as_str().ends_with("\nEmail: a@b.com\nWhatsApp: +10000000000"));
    }

    #[test]
    fn keeps_stack_recommendations() {
        let prompt = SystemPrompt::new(&ContactDetails::default());
        assert!(prompt.as_str().contains("\"industrial website\": Next.js with Django."));
    }
}
