use serde::{Deserialize, Serialize};

use crate::extractors::{ExtractedContent, Timestamp};
use crate::router::PlatformTag;

/// Final artifact of the pipeline: one fixed schema regardless of source,
/// consumed by downstream generation and publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedContent {
    pub source: Source,
    pub content: Content,
    pub media: Media,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub platform: PlatformTag,
    pub url: String,
    pub title: String,
    pub author: String,
    pub author_url: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    pub word_count: usize,
    pub reading_time_minutes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub embed_markup: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub links: Vec<String>,
    pub timestamps: Vec<Timestamp>,
    pub duration_seconds: Option<f64>,
}

/// Reshape extractor output into the normalized schema. Deterministic and
/// total: text precedence is transcript, then description, then empty.
/// An empty transcript counts as absent so it never masks a description.
pub fn normalize(content: ExtractedContent) -> NormalizedContent {
    let text = content
        .transcript
        .filter(|t| !t.is_empty())
        .or(content.description)
        .unwrap_or_default();

    let word_count = count_words(&text);
    let reading_time_minutes = reading_time(word_count);

    NormalizedContent {
        source: Source {
            platform: content.platform,
            url: content.url,
            title: content.title,
            author: content.author,
            author_url: content.author_url,
            date: content.date,
        },
        content: Content {
            text,
            word_count,
            reading_time_minutes,
        },
        media: Media {
            embed_markup: content.embed_markup.unwrap_or_default(),
            thumbnail_url: content.thumbnail_url,
        },
        metadata: Metadata {
            links: content.links,
            timestamps: content.timestamps,
            duration_seconds: content.duration_seconds,
        },
    }
}

/// Count whitespace-separated tokens after trimming.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Minutes to read at roughly 200 words per minute, rounded up.
pub fn reading_time(word_count: usize) -> usize {
    word_count.div_ceil(200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ExtractedContent;

    fn sample(transcript: Option<&str>, description: Option<&str>) -> ExtractedContent {
        let mut content = ExtractedContent::new(
            PlatformTag::Video,
            "https://example.com/v",
            "Title".into(),
            "Author".into(),
        );
        content.transcript = transcript.map(String::from);
        content.description = description.map(String::from);
        content
    }

    #[test]
    fn transcript_takes_precedence_over_description() {
        let normalized = normalize(sample(Some("spoken words"), Some("caption")));
        assert_eq!(normalized.content.text, "spoken words");
    }

    #[test]
    fn empty_transcript_falls_through_to_description() {
        let normalized = normalize(sample(Some(""), Some("real caption text")));
        assert_eq!(normalized.content.text, "real caption text");
    }

    #[test]
    fn description_used_when_transcript_absent() {
        let normalized = normalize(sample(None, Some("caption")));
        assert_eq!(normalized.content.text, "caption");
    }

    #[test]
    fn both_absent_yields_empty_text_and_zero_reading_time() {
        let normalized = normalize(sample(None, None));
        assert_eq!(normalized.content.text, "");
        assert_eq!(normalized.content.word_count, 0);
        assert_eq!(normalized.content.reading_time_minutes, 0);
    }

    #[test]
    fn word_count_splits_on_whitespace_runs() {
        assert_eq!(count_words("  one   two\tthree\nfour  "), 4);
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   "), 0);
    }

    #[test]
    fn reading_time_uses_ceiling_not_rounding() {
        let exactly_200 = vec!["word"; 200].join(" ");
        let normalized = normalize(sample(Some(&exactly_200), None));
        assert_eq!(normalized.content.word_count, 200);
        assert_eq!(normalized.content.reading_time_minutes, 1);

        let two_hundred_one = vec!["word"; 201].join(" ");
        let normalized = normalize(sample(Some(&two_hundred_one), None));
        assert_eq!(normalized.content.word_count, 201);
        assert_eq!(normalized.content.reading_time_minutes, 2);
    }

    #[test]
    fn missing_embed_markup_normalizes_to_empty_string() {
        let normalized = normalize(sample(None, None));
        assert_eq!(normalized.media.embed_markup, "");
    }

    #[test]
    fn metadata_and_source_fields_carry_through() {
        let mut content = sample(Some("text"), None);
        content.links = vec!["https://a.example".into()];
        content.timestamps = vec![Timestamp { time_seconds: 30, label: "Intro".into() }];
        content.duration_seconds = Some(120.0);
        content.author_url = Some("https://example.com/author".into());

        let normalized = normalize(content);
        assert_eq!(normalized.metadata.links.len(), 1);
        assert_eq!(normalized.metadata.timestamps[0].label, "Intro");
        assert_eq!(normalized.metadata.duration_seconds, Some(120.0));
        assert_eq!(
            normalized.source.author_url.as_deref(),
            Some("https://example.com/author")
        );
    }
}
