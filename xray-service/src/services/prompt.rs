//! The radiologist instruction sent with every image.

use crate::models::{AnalysisRequest, MediaError, MediaReference};

/// Placeholder marking where the image is attached.
const MEDIA_PLACEHOLDER: &str = "{{media url=photoUrl}}";

const INSTRUCTION_TEMPLATE: &str = "You are an expert radiologist specializing in analyzing X-ray images.

You will analyze the X-ray image and identify any potential bone issues, fractures, or abnormalities.

Based on your analysis, you will determine whether the X-ray image shows any issues and provide a description of the issues found.  You will also provide a confidence score for your analysis.

Use the following as the primary source of information about the X-ray image.

X-ray Image: {{media url=photoUrl}}";

/// One ordered piece of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    Media(MediaReference),
}

/// A rendered prompt: instruction text with the image attached in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub parts: Vec<PromptPart>,
}

impl Prompt {
    /// Length of the text parts in bytes. Media is not counted.
    pub fn text_len(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                PromptPart::Text(text) => text.len(),
                PromptPart::Media(_) => 0,
            })
            .sum()
    }

    pub fn media(&self) -> impl Iterator<Item = &MediaReference> {
        self.parts.iter().filter_map(|p| match p {
            PromptPart::Media(media) => Some(media),
            PromptPart::Text(_) => None,
        })
    }
}

/// Render the instruction template for a request.
pub fn render_prompt(request: &AnalysisRequest) -> Result<Prompt, MediaError> {
    let media = MediaReference::parse(&request.photo_url)?;

    let mut parts = Vec::with_capacity(3);
    match INSTRUCTION_TEMPLATE.split_once(MEDIA_PLACEHOLDER) {
        Some((before, after)) => {
            push_text(&mut parts, before);
            parts.push(PromptPart::Media(media));
            push_text(&mut parts, after);
        }
        None => {
            push_text(&mut parts, INSTRUCTION_TEMPLATE);
            parts.push(PromptPart::Media(media));
        }
    }

    Ok(Prompt { parts })
}

fn push_text(parts: &mut Vec<PromptPart>, text: &str) {
    if !text.is_empty() {
        parts.push(PromptPart::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_follows_instruction_text() {
        let request = AnalysisRequest::new("data:image/jpeg;base64,/9j/4AAQSkZJRg==");
        let prompt = render_prompt(&request).unwrap();

        assert_eq!(prompt.parts.len(), 2);
        match &prompt.parts[0] {
            PromptPart::Text(text) => {
                assert!(text.starts_with("You are an expert radiologist"));
                assert!(text.ends_with("X-ray Image: "));
                assert!(!text.contains("{{media"));
            }
            other => panic!("expected text part, got {:?}", other),
        }
        assert_eq!(
            prompt.parts[1],
            PromptPart::Media(MediaReference::Inline {
                mime_type: "image/jpeg".to_string(),
                data: "/9j/4AAQSkZJRg==".to_string(),
            })
        );
    }

    #[test]
    fn instruction_is_independent_of_the_image() {
        let a = render_prompt(&AnalysisRequest::new("https://example.com/a.png")).unwrap();
        let b = render_prompt(&AnalysisRequest::new("data:image/png;base64,AAAA")).unwrap();
        assert_eq!(a.parts[0], b.parts[0]);
        assert_eq!(a.text_len(), b.text_len());
        assert_eq!(a.media().count(), 1);
    }

    #[test]
    fn invalid_reference_fails_to_render() {
        let result = render_prompt(&AnalysisRequest::new("data:text/plain;base64,aGk="));
        assert!(matches!(result, Err(MediaError::NotAnImage(_))));
    }
}
