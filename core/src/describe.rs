use crate::client::ChatModel;

/// Content policy sent with every vision call. The model makes the branch
/// decision, not this code: interface-like images get an exhaustive,
/// search-friendly description while purely visual images get a single
/// sentence.
pub const DESCRIBE_PROMPT: &str = "Analyze this image and provide a description based on the following rules:\n\n1. IF the image contains text, UI elements, buttons, menus, forms, error messages, or any digital interface elements:\n   - Provide a detailed description including ALL visible text, UI elements, colors, buttons, error messages, and any other visual elements that someone might search for.\n\n2. IF the image is purely visual content without text (like nature photos, objects, people, etc.):\n   - Provide only ONE descriptive sentence focusing on the main visual elements, colors, and objects.\n\nAnalyze the image and apply the appropriate rule.";

/// Ask the vision model for a description of one image.
///
/// Returns `None` on any failure (transport error, model error, empty reply)
/// so a bad image never aborts a larger batch; the failure is logged with the
/// identifier for context.
pub async fn describe_image(model: &dyn ChatModel, identifier: &str, image: &[u8]) -> Option<String> {
    match model.complete_vision(DESCRIBE_PROMPT, image).await {
        Ok(description) if !description.trim().is_empty() => Some(description),
        Ok(_) => {
            tracing::warn!(identifier, "vision model returned an empty description");
            None
        }
        Err(err) => {
            tracing::warn!(identifier, %err, "vision describe failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct CannedModel(Result<String>);

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete_text(&self, _prompt: &str) -> Result<String> {
            unreachable!("describe never issues text-only calls")
        }

        async fn complete_vision(&self, prompt: &str, _image: &[u8]) -> Result<String> {
            // The prompt carries the whole content policy verbatim.
            assert!(prompt.contains("ALL visible text"));
            assert!(prompt.contains("ONE descriptive sentence"));
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow!(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn successful_describe_returns_text() {
        let model = CannedModel(Ok("A login form with a red error banner.".into()));
        let got = describe_image(&model, "login.png", b"bytes").await;
        assert_eq!(got.as_deref(), Some("A login form with a red error banner."));
    }

    #[tokio::test]
    async fn model_failure_degrades_to_none() {
        let model = CannedModel(Err(anyhow!("connection refused")));
        assert!(describe_image(&model, "login.png", b"bytes").await.is_none());
    }

    #[tokio::test]
    async fn blank_reply_degrades_to_none() {
        let model = CannedModel(Ok("   \n".into()));
        assert!(describe_image(&model, "login.png", b"bytes").await.is_none());
    }
}
