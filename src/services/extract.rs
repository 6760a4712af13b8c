use crate::error::PipelineError;

/// Strip completion formatting from a raw response, yielding executable
/// script source.
///
/// Exactly one leading fence marker (with an optional language tag) and one
/// trailing fence marker are removed; fences embedded elsewhere in the text
/// are left untouched. This is a documented limitation, not recursively
/// "fixed". An empty result after trimming is a terminal failure for the
/// turn: no execution happens and no turn is recorded.
pub fn extract_code(raw: &str) -> Result<String, PipelineError> {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop a language tag such as "python" directly after the fence,
        // but only when the rest of the fence line is nothing but a tag;
        // code sitting on the fence line stays intact.
        let line_end = rest.find('\n').unwrap_or(rest.len());
        let tag = &rest[..line_end];
        if tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            text = &rest[line_end..];
        } else {
            text = rest;
        }
    }
    text = text.trim();
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    let code = text.trim();
    if code.is_empty() {
        return Err(PipelineError::EmptyCode);
    }
    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fenced_code() {
        let code = "print(df.mean(\"age\"))";
        let wrapped = format!("```\n{}\n```", code);
        assert_eq!(extract_code(&wrapped).unwrap(), code);
    }

    #[test]
    fn strips_language_tag() {
        let raw = "```python\nprint(df.head(3))\n```";
        assert_eq!(extract_code(raw).unwrap(), "print(df.head(3))");
    }

    #[test]
    fn passes_unfenced_text_through_trimmed() {
        assert_eq!(
            extract_code("  print(df.shape())  \n").unwrap(),
            "print(df.shape())"
        );
    }

    #[test]
    fn code_on_the_fence_line_is_not_a_language_tag() {
        assert_eq!(
            extract_code("```print(df.count())```").unwrap(),
            "print(df.count())"
        );
        assert_eq!(
            extract_code("```print(df.count())\nprint(df.shape())\n```").unwrap(),
            "print(df.count())\nprint(df.shape())"
        );
    }

    #[test]
    fn leaves_embedded_fences_alone() {
        let raw = "```\nprint(\"a\")\n```\nprint(\"b\")";
        // Only the first leading and final trailing markers are candidates;
        // here the trailing text has no final fence so the inner one stays.
        assert_eq!(extract_code(raw).unwrap(), "print(\"a\")\n```\nprint(\"b\")");
    }

    #[test]
    fn empty_and_blank_responses_fail() {
        assert!(matches!(extract_code(""), Err(PipelineError::EmptyCode)));
        assert!(matches!(
            extract_code("```python\n\n```"),
            Err(PipelineError::EmptyCode)
        ));
        assert!(matches!(
            extract_code("   \n\t"),
            Err(PipelineError::EmptyCode)
        ));
    }
}
