use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaqAnswer {
    Text(String),
    /// Answer lives in the ticket list rather than in chat.
    OpenTickets,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireFaq", into = "WireFaq")]
pub struct FaqPrompt {
    pub question: String,
    pub answer: FaqAnswer,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireFaq {
    question: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    redirect_to_tickets: bool,
}

impl From<WireFaq> for FaqPrompt {
    fn from(w: WireFaq) -> Self {
        let answer = match (w.redirect_to_tickets, w.answer) {
            (false, Some(text)) => FaqAnswer::Text(text),
            _ => FaqAnswer::OpenTickets,
        };
        Self {
            question: w.question,
            answer,
        }
    }
}

impl From<FaqPrompt> for WireFaq {
    fn from(p: FaqPrompt) -> Self {
        match p.answer {
            FaqAnswer::Text(text) => Self {
                question: p.question,
                answer: Some(text),
                redirect_to_tickets: false,
            },
            FaqAnswer::OpenTickets => Self {
                question: p.question,
                answer: None,
                redirect_to_tickets: true,
            },
        }
    }
}

impl FaqPrompt {
    pub fn text(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: FaqAnswer::Text(answer.into()),
        }
    }
}
