use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{info, warn};

use crate::inference::VisionModel;
use crate::models::{AnalysisReport, ChatRole, ChatTurn};
use crate::preprocessing::ImageOps;

/// Only the most recent turns are rendered into the prompt.
const HISTORY_WINDOW: usize = 10;

const CHAT_PREAMBLE: &str = "You are a friendly, knowledgeable skin care assistant. You are not a doctor \
and never diagnose. Give practical, non-diagnostic guidance in plain language, keep answers \
to a few short sentences, and recommend seeing a dermatologist for anything persistent, \
painful, or worsening.";

const CHAT_FAILURE_REPLY: &str =
    "Sorry, I'm having trouble responding right now. Please try again.";

/// Everything a single chat turn may carry besides the message itself.
#[derive(Default)]
pub struct ChatTurnInput {
    pub history: Vec<ChatTurn>,
    /// The photo the conversation is about. Only forwarded to the model when
    /// an analysis context accompanies it; a bare image with no prior
    /// analysis is not treated as the subject of the conversation.
    pub primary_image: Option<String>,
    pub analysis_context: Option<AnalysisReport>,
    pub attachments: Vec<String>,
}

/// Builds one context-aware conversational turn: advisory quality pre-checks
/// on every attached image, then a single composed prompt to the model.
/// `respond` never fails; model trouble degrades to a fixed apology.
pub struct ChatPipeline {
    image_ops: Arc<dyn ImageOps>,
    model: Arc<dyn VisionModel>,
}

impl ChatPipeline {
    pub fn new(image_ops: Arc<dyn ImageOps>, model: Arc<dyn VisionModel>) -> Self {
        Self { image_ops, model }
    }

    pub async fn respond(&self, message: &str, input: ChatTurnInput) -> String {
        // Every supplied image is pre-checked, numbered primary-first, even
        // when the primary will not be forwarded to the model.
        let checked: Vec<&String> = input
            .primary_image
            .iter()
            .chain(input.attachments.iter())
            .collect();
        if let Some(rejection) = self.quality_precheck(&checked).await {
            info!("chat images rejected by quality pre-check");
            return rejection;
        }

        let prompt = compose_prompt(message, &input);
        let images = collect_model_images(&input);

        match self.model.converse(&prompt, &images).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat inference failed, returning fixed apology");
                CHAT_FAILURE_REPLY.to_string()
            }
        }
    }

    /// Check every attached image and report all poor ones at once. A failed
    /// quality call is advisory only: log and let the turn proceed.
    async fn quality_precheck(&self, images: &[&String]) -> Option<String> {
        let mut poor = Vec::new();
        for (index, image) in images.iter().enumerate() {
            match self.image_ops.check_quality(image).await {
                Ok(report) if !report.is_good_quality => poor.push(index + 1),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, image = index + 1, "quality pre-check unavailable, continuing");
                }
            }
        }

        if poor.is_empty() {
            return None;
        }

        let listed = poor
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let label = if poor.len() == 1 { "Image" } else { "Images" };
        let verb = if poor.len() == 1 { "has" } else { "have" };
        Some(format!(
            "{label} {listed} {verb} poor quality. Please upload clearer images \
             with better lighting and focus for accurate analysis."
        ))
    }
}

/// Images actually forwarded to the model: the primary image only when an
/// analysis context marks it as the subject, plus all attachments.
fn collect_model_images(input: &ChatTurnInput) -> Vec<String> {
    let mut images = Vec::new();
    if input.analysis_context.is_some() {
        if let Some(primary) = &input.primary_image {
            images.push(primary.clone());
        }
    }
    images.extend(input.attachments.iter().cloned());
    images
}

/// Render the full instruction block: persona, bounded history, analysis
/// context, then the user's message.
fn compose_prompt(message: &str, input: &ChatTurnInput) -> String {
    let mut prompt = String::from(CHAT_PREAMBLE);

    let recent = input
        .history
        .iter()
        .rev()
        .take(HISTORY_WINDOW)
        .rev()
        .collect::<Vec<_>>();
    if !recent.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        for turn in recent {
            let speaker = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            let _ = writeln!(prompt, "{speaker}: {}", turn.content);
        }
    }

    if let Some(context) = &input.analysis_context {
        let _ = write!(
            prompt,
            "\nContext from the user's analyzed photo:\n\
             Summary: {}\n\
             Likely categories: {}\n\
             Risk level: {}\n\
             Suggested next steps: {}\n",
            context.summary,
            context.likely_categories.join(", "),
            context.risk_level.as_str(),
            context.next_steps.join("; "),
        );
    }

    let _ = write!(prompt, "\nUser question: {message}");
    prompt
}
