//! Prompt builders for the extraction and video providers, and the parser for
//! extraction responses.

use crate::adapters::ExtractionInput;
use crate::domain::TeaserContent;
use crate::error::ProviderError;

/// Characters of source text sent to an extraction model
pub const SOURCE_TEXT_LIMIT: usize = 2000;

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You write short-form social media teasers. \
Pick the single most engaging moment of the material you are given and turn it into a \
tight, spoken hook.";

/// First `SOURCE_TEXT_LIMIT` characters of `text`, on a char boundary
pub fn truncate_source(text: &str) -> &str {
    match text.char_indices().nth(SOURCE_TEXT_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Narration window around a target length: `[max(5, t-1), t+1]`, upper
/// bound not widened past 120
pub fn narration_window(target: u32) -> (u32, u32) {
    let lower = target.saturating_sub(1).max(5);
    let upper = if target < 120 { target + 1 } else { target };
    (lower, upper)
}

fn language_instruction(language: &str) -> &'static str {
    if language.to_ascii_lowercase().starts_with("he") {
        "Write every text field (headline, script, key points, visual description) in natural \
Modern Hebrew only. Do not transliterate."
    } else {
        "Write every text field in natural, fluent English."
    }
}

/// User prompt asking for a JSON teaser object
pub fn extraction_prompt(input: &ExtractionInput) -> String {
    let target = input.target_duration_seconds;
    let (lower, upper) = narration_window(target);

    format!(
        r#"Create teaser content for a {target}-second social media clip from the material below.

{instruction}

TITLE: {title}

MATERIAL:
{material}

Return:
1. headline: a punchy headline of at most 10 words
2. script: narration that takes {lower}-{upper} seconds to read aloud (do not leave this window)
3. key_points: 3 to 5 of the most interesting points
4. visual_description: what the video should show

Answer with a single JSON object:
{{
    "headline": "...",
    "script": "...",
    "key_points": ["...", "...", "..."],
    "visual_description": "...",
    "duration_seconds": {target}
}}
"#,
        instruction = language_instruction(&input.language),
        title = input.title,
        material = truncate_source(&input.source_text),
    )
}

/// Parse a model reply: the outermost `{...}` span must be a TeaserContent
pub fn parse_extraction(reply: &str, target: u32) -> Result<TeaserContent, ProviderError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if end > start => &reply[start..=end],
        _ => {
            return Err(ProviderError::InvalidResponse(
                "no JSON object in extraction reply".to_string(),
            ))
        }
    };

    let mut value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| ProviderError::InvalidResponse(format!("extraction reply: {e}")))?;
    if let Some(obj) = value.as_object_mut() {
        obj.entry("duration_seconds")
            .or_insert_with(|| serde_json::Value::from(target));
    }

    serde_json::from_value(value)
        .map_err(|e| ProviderError::InvalidResponse(format!("extraction reply: {e}")))
}

/// Per-scene seconds: `max(5, duration)` split in three, each at least 2,
/// remainder going to the earliest scenes
pub fn scene_durations(duration: u32) -> (u32, [u32; 3]) {
    let total = duration.max(5);
    let base = (total / 3).max(2);
    let mut scenes = [base; 3];
    let remainder = total.saturating_sub(base * 3) as usize;
    for scene in scenes.iter_mut().take(remainder) {
        *scene += 1;
    }
    (total, scenes)
}

/// Scene-structured prompt for a text-to-video model
pub fn video_prompt(content: &TeaserContent) -> String {
    let points = &content.key_points;
    let insight = points
        .first()
        .map(String::as_str)
        .unwrap_or(&content.headline)
        .trim()
        .to_string();
    let emotional = points
        .get(1)
        .map(|p| p.trim().to_string())
        .unwrap_or_else(|| {
            content
                .visual_description
                .split('.')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        });
    let curiosity = points
        .get(2)
        .map(|p| p.trim().to_string())
        .unwrap_or_else(|| format!("What comes after '{}'?", content.headline));

    let (total, [first, second, third]) = scene_durations(content.duration_seconds);

    let guidance = format!(
        "Generate a short vertical teaser video for the episode '{}'. The voice-over runs about \
{} seconds. Follow the scene breakdown below for symbolic, cinematic imagery without \
recognizable human faces. Keep motion smooth and colors consistent across scenes. If only plain \
text can be used, describe the scenes in order and keep their timing.",
        content.headline, total
    );

    let scenes = format!(
        r#"<TeaserVideo>
  <Meta>
    <Duration>{total}s</Duration>
    <Tone>Curious, cinematic, musical</Tone>
    <Style>Moody abstract visuals, no people</Style>
  </Meta>
  <Scene id="1" duration="{first}s">
    <Visual>A wide establishing landscape that carries the episode's mood, with faint floating words or notes drifting through the frame.</Visual>
    <Narration>{insight}</Narration>
  </Scene>
  <Scene id="2" duration="{second}s">
    <Visual>A contrasting close-up that hints at the emotional undercurrent, lit by slowly shifting color.</Visual>
    <Narration>{emotional}</Narration>
  </Scene>
  <Scene id="3" duration="{third}s">
    <Visual>An open, unresolved image that invites the viewer to keep watching, such as a door opening onto light.</Visual>
    <Narration>{curiosity}</Narration>
  </Scene>
</TeaserVideo>"#
    );

    let summary: String = points.iter().map(|p| format!("- {p}\n")).collect();

    format!(
        "{guidance}\n\n{scenes}\n\nKey Points:\n{summary}Visual hints: {}\n",
        content.visual_description.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(duration: u32) -> TeaserContent {
        TeaserContent {
            headline: "The Quiet Hour".into(),
            narration_script: "Listen.".into(),
            key_points: vec!["One".into(), "Two".into(), "Three".into()],
            visual_description: "Night city. Rain.".into(),
            duration_seconds: duration,
        }
    }

    #[test]
    fn test_narration_window() {
        assert_eq!(narration_window(15), (14, 16));
        assert_eq!(narration_window(5), (5, 6));
        assert_eq!(narration_window(120), (119, 120));
    }

    #[test]
    fn test_scene_durations() {
        assert_eq!(scene_durations(15), (15, [5, 5, 5]));
        assert_eq!(scene_durations(10), (10, [4, 3, 3]));
        assert_eq!(scene_durations(3), (5, [2, 2, 2]));
        assert_eq!(scene_durations(17), (17, [6, 6, 5]));
    }

    #[test]
    fn test_truncate_source_on_char_boundary() {
        let text = "ש".repeat(3000);
        assert_eq!(truncate_source(&text).chars().count(), SOURCE_TEXT_LIMIT);
        assert_eq!(truncate_source("short"), "short");
    }

    #[test]
    fn test_extraction_prompt_language() {
        let mut input = ExtractionInput {
            title: "Ep1".into(),
            source_text: "Some text".into(),
            target_duration_seconds: 15,
            language: "he-IL".into(),
        };
        assert!(extraction_prompt(&input).contains("Hebrew"));
        assert!(extraction_prompt(&input).contains("14-16 seconds"));

        input.language = "en-US".into();
        assert!(extraction_prompt(&input).contains("English"));
    }

    #[test]
    fn test_parse_extraction_takes_outer_object() {
        let reply = r#"Sure! Here it is:
{"headline": "H", "script": "S", "key_points": ["a"], "visual_description": "V"}
Hope that helps."#;
        let parsed = parse_extraction(reply, 15).unwrap();
        assert_eq!(parsed.headline, "H");
        assert_eq!(parsed.narration_script, "S");
        assert_eq!(parsed.duration_seconds, 15);
    }

    #[test]
    fn test_parse_extraction_rejects_garbage() {
        assert!(parse_extraction("no json here", 15).is_err());
        assert!(parse_extraction("{not json}", 15).is_err());
    }

    #[test]
    fn test_video_prompt_mentions_scenes_and_points() {
        let prompt = video_prompt(&content(10));
        assert!(prompt.contains(r#"<Scene id="1" duration="4s">"#));
        assert!(prompt.contains("<Narration>Three</Narration>"));
        assert!(prompt.contains("- Two\n"));
    }

    #[test]
    fn test_video_prompt_without_key_points() {
        let mut c = content(15);
        c.key_points.clear();
        let prompt = video_prompt(&c);
        assert!(prompt.contains("<Narration>The Quiet Hour</Narration>"));
        assert!(prompt.contains("<Narration>Night city</Narration>"));
        assert!(prompt.contains("What comes after 'The Quiet Hour'?"));
    }
}
