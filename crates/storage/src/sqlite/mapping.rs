use quiz_core::model::{
    Complexity, ExplanationStep, OptionId, Question, QuestionDraft, QuestionId, QuestionOption,
    Subject, SubjectId,
};
use sqlx::Row;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn parse_complexity(s: &str) -> Result<Complexity, StorageError> {
    s.parse::<Complexity>().map_err(ser)
}

pub(crate) fn map_subject_row(row: &sqlx::sqlite::SqliteRow) -> Result<Subject, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let name: String = row.try_get("name").map_err(ser)?;
    let chapters: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("chapters").map_err(ser)?).map_err(ser)?;
    let total_questions = u32_from_i64(
        "total_questions",
        row.try_get::<i64, _>("total_questions").map_err(ser)?,
    )?;
    let xp_value = u32_from_i64("xp_value", row.try_get::<i64, _>("xp_value").map_err(ser)?)?;

    Subject::new(SubjectId::new(id), name, chapters, total_questions, xp_value).map_err(ser)
}

/// Rebuild a question from its row, re-running domain validation.
pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let options: Vec<QuestionOption> =
        serde_json::from_str(&row.try_get::<String, _>("options").map_err(ser)?).map_err(ser)?;
    let explanation: Vec<ExplanationStep> =
        serde_json::from_str(&row.try_get::<String, _>("explanation").map_err(ser)?)
            .map_err(ser)?;

    QuestionDraft {
        id: QuestionId::new(row.try_get::<String, _>("id").map_err(ser)?),
        subject_id: SubjectId::new(row.try_get::<String, _>("subject_id").map_err(ser)?),
        chapter: row.try_get("chapter").map_err(ser)?,
        complexity: parse_complexity(&row.try_get::<String, _>("complexity").map_err(ser)?)?,
        prompt: row.try_get("prompt").map_err(ser)?,
        notation: row.try_get("notation").map_err(ser)?,
        options,
        correct_option: OptionId::new(row.try_get::<String, _>("correct_option").map_err(ser)?),
        explanation,
        xp_value: u32_from_i64("xp_value", row.try_get::<i64, _>("xp_value").map_err(ser)?)?,
    }
    .validate()
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_complexities() {
        assert_eq!(parse_complexity("advanced").unwrap(), Complexity::Advanced);
        assert!(matches!(
            parse_complexity("hard"),
            Err(StorageError::Serialization(_))
        ));
    }
}
