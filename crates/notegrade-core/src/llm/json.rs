use serde_json::Value;

/// Correction sent with the repair re-query.
pub(crate) const REPAIR_INSTRUCTION: &str = "Your previous reply was not valid for the required format. \
Return ONLY a single JSON value that satisfies the schema below. \
No prose, no markdown fences, no trailing commentary.";

/// Pull the first JSON value out of judge output.
///
/// Leading prose, markdown fences and trailing commentary are ignored.
/// Objects are preferred: every `{` is tried in order, then every `[`, until
/// one starts a parseable value. Brackets inside the prose do not hide the
/// JSON after them.
pub fn extract_json(text: &str) -> Result<Value, String> {
    let text = text.trim();
    let starts = text
        .match_indices('{')
        .chain(text.match_indices('['))
        .map(|(i, _)| i);
    let mut first_error = None;
    for start in starts {
        match serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()
        {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => {
                first_error.get_or_insert_with(|| format!("invalid JSON: {}", e));
            }
            None => {}
        }
    }
    Err(first_error.unwrap_or_else(|| "no JSON start ({ or [) found in judge output".to_string()))
}

/// User message for the repair re-query.
pub(crate) fn repair_prompt(schema: &str, problem: &str, previous: &str) -> String {
    format!(
        "{}\n\nSchema: {}\n\nProblem: {}\n\nPrevious reply:\n{}",
        REPAIR_INSTRUCTION, schema, problem, previous
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_fences_and_commentary() {
        let raw = "Sure! Here you go:\n```json\n{\"label\": \"Supported\"}\n```\nHope that helps.";
        assert_eq!(extract_json(raw).unwrap(), json!({"label": "Supported"}));
    }

    #[test]
    fn falls_back_to_arrays() {
        assert_eq!(
            extract_json("claims: [\"a\", \"b\"] trailing").unwrap(),
            json!(["a", "b"])
        );
    }

    #[test]
    fn skips_brackets_in_leading_prose() {
        let raw = "Scores per PDQI-9 [see rubric]: {\"label\": \"Supported\"}";
        assert_eq!(extract_json(raw).unwrap(), json!({"label": "Supported"}));

        let raw = "Note {draft} reviewed. [1] Result: {\"scores\": {\"accurate\": 4}}";
        assert_eq!(extract_json(raw).unwrap(), json!({"scores": {"accurate": 4}}));
    }

    #[test]
    fn reports_missing_or_broken_json() {
        assert!(extract_json("no json here").unwrap_err().contains("no JSON start"));
        assert!(extract_json("{\"scores\": {\"accurate\": 4,}")
            .unwrap_err()
            .contains("invalid JSON"));
    }
}
