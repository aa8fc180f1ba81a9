use async_trait::async_trait;
use quiz_core::model::{Question, Subject, SubjectId};

use super::SqliteRepository;
use super::mapping::{map_question_row, map_subject_row, to_json};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO subjects (id, name, chapters, total_questions, xp_value)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                chapters = excluded.chapters,
                total_questions = excluded.total_questions,
                xp_value = excluded.xp_value
            ",
        )
        .bind(subject.id().as_str())
        .bind(subject.name())
        .bind(to_json(&subject.chapters())?)
        .bind(i64::from(subject.total_questions()))
        .bind(i64::from(subject.xp_value()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_subject(&self, id: &SubjectId) -> Result<Subject, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, name, chapters, total_questions, xp_value
            FROM subjects
            WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_subject_row(&row)
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, name, chapters, total_questions, xp_value
            FROM subjects
            ORDER BY rowid ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_subject_row).collect()
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO questions (
                id, subject_id, chapter, complexity, prompt, notation,
                options, correct_option, explanation, xp_value
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                subject_id = excluded.subject_id,
                chapter = excluded.chapter,
                complexity = excluded.complexity,
                prompt = excluded.prompt,
                notation = excluded.notation,
                options = excluded.options,
                correct_option = excluded.correct_option,
                explanation = excluded.explanation,
                xp_value = excluded.xp_value
            ",
        )
        .bind(question.id().as_str())
        .bind(question.subject_id().as_str())
        .bind(question.chapter())
        .bind(question.complexity().as_str())
        .bind(question.prompt())
        .bind(question.notation())
        .bind(to_json(&question.options())?)
        .bind(question.correct_option().as_str())
        .bind(to_json(&question.explanation())?)
        .bind(i64::from(question.xp_value()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn list_questions(
        &self,
        subject: Option<&SubjectId>,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, subject_id, chapter, complexity, prompt, notation,
                options, correct_option, explanation, xp_value
            FROM questions
            WHERE ?1 IS NULL OR subject_id = ?1
            ORDER BY rowid ASC
            ",
        )
        .bind(subject.map(SubjectId::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_question_row).collect()
    }
}
