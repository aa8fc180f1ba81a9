//! Built-in question bank used for seeding and for the in-memory demo mode.

use quiz_core::model::{
    Complexity, ExplanationStep, OptionId, Question, QuestionDraft, QuestionError, QuestionId,
    QuestionOption, Subject, SubjectError, SubjectId,
};
use thiserror::Error;

use crate::repository::{Storage, StorageError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SampleError {
    #[error(transparent)]
    Catalog(#[from] quiz_core::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Counts of what [`seed`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub subjects: usize,
    pub questions: usize,
}

const SUBJECTS: [(&str, &str, [&str; 4], u32, u32); 6] = [
    (
        "linear-algebra",
        "Linear Algebra",
        ["Vectors & Spaces", "Matrix Operations", "Eigenvalues", "Linear Transformations"],
        245,
        120,
    ),
    (
        "logic",
        "Logic & Reasoning",
        ["Propositional Logic", "Predicate Logic", "Proofs", "Logical Fallacies"],
        180,
        100,
    ),
    (
        "calculus",
        "Calculus",
        ["Limits", "Derivatives", "Integrals", "Series"],
        320,
        150,
    ),
    (
        "statistics",
        "Statistics",
        ["Probability", "Distributions", "Hypothesis Testing", "Regression"],
        210,
        110,
    ),
    (
        "discrete-math",
        "Discrete Mathematics",
        ["Set Theory", "Combinatorics", "Graph Theory", "Number Theory"],
        195,
        105,
    ),
    (
        "physics",
        "Physics",
        ["Mechanics", "Thermodynamics", "Electromagnetism", "Quantum"],
        280,
        140,
    ),
];

/// The six catalog subjects in display order.
///
/// # Errors
///
/// Returns `SubjectError` if a catalog entry is malformed.
pub fn subjects() -> Result<Vec<Subject>, SubjectError> {
    SUBJECTS
        .iter()
        .map(|(id, name, chapters, total, xp)| {
            Subject::new(
                SubjectId::new(*id),
                *name,
                chapters.iter().map(|c| (*c).to_string()).collect(),
                *total,
                *xp,
            )
        })
        .collect()
}

fn options(labels: [&str; 4]) -> Vec<QuestionOption> {
    ["a", "b", "c", "d"]
        .into_iter()
        .zip(labels)
        .map(|(id, notation)| {
            QuestionOption::new(id, format!("Answer {}", id.to_uppercase())).with_notation(notation)
        })
        .collect()
}

fn steps(parts: [(&str, &str); 3]) -> Vec<ExplanationStep> {
    (1..)
        .zip(parts)
        .map(|(n, (title, body))| ExplanationStep::new(n, title, body))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn draft(
    id: &str,
    subject: &str,
    chapter: &str,
    complexity: Complexity,
    prompt: &str,
    notation: Option<&str>,
    labels: [&str; 4],
    explanation: [(&str, &str); 3],
    xp_value: u32,
) -> QuestionDraft {
    QuestionDraft {
        id: QuestionId::new(id),
        subject_id: SubjectId::new(subject),
        chapter: chapter.into(),
        complexity,
        prompt: prompt.into(),
        notation: notation.map(str::to_string),
        options: options(labels),
        correct_option: OptionId::new("a"),
        explanation: steps(explanation),
        xp_value,
    }
}

/// The five bank questions. Every one has option `a` as its correct answer.
///
/// # Errors
///
/// Returns `QuestionError` if a bank entry fails validation.
pub fn questions() -> Result<Vec<Question>, QuestionError> {
    [
        draft(
            "q1",
            "linear-algebra",
            "Matrix Operations",
            Complexity::Intermediate,
            "Find the determinant of the following matrix:",
            Some(r"\begin{pmatrix} 2 & 3 & 1 \\ 4 & 1 & 2 \\ 3 & 2 & 3 \end{pmatrix}"),
            ["-7", "7", "-14", "14"],
            [
                (
                    "Apply cofactor expansion",
                    "Expand along the first row: det(A) = 2·det(M₁₁) - 3·det(M₁₂) + 1·det(M₁₃)",
                ),
                (
                    "Calculate 2x2 determinants",
                    "det(M₁₁) = (1·3 - 2·2) = -1, det(M₁₂) = (4·3 - 2·3) = 6, det(M₁₃) = (4·2 - 1·3) = 5",
                ),
                (
                    "Combine results",
                    "det(A) = 2·(-1) - 3·(6) + 1·(5) = -2 - 18 + 5 = -15",
                ),
            ],
            25,
        ),
        draft(
            "q2",
            "linear-algebra",
            "Eigenvalues",
            Complexity::Advanced,
            "Find the eigenvalues of the matrix:",
            Some(r"\begin{pmatrix} 4 & 2 \\ 1 & 3 \end{pmatrix}"),
            [
                r"\lambda = 5, 2",
                r"\lambda = 4, 3",
                r"\lambda = 6, 1",
                r"\lambda = 7, 0",
            ],
            [
                ("Set up characteristic equation", "det(A - λI) = 0"),
                ("Compute determinant", "(4-λ)(3-λ) - 2·1 = λ² - 7λ + 10 = 0"),
                ("Solve quadratic", "λ = (7 ± √9)/2 = 5, 2"),
            ],
            30,
        ),
        draft(
            "q3",
            "logic",
            "Propositional Logic",
            Complexity::Novice,
            "What is the truth value of (P ∧ Q) → P?",
            None,
            [
                "Tautology (always true)",
                "Contradiction (always false)",
                "Contingent (depends on P, Q)",
                "Cannot be determined",
            ],
            [
                ("Identify the premise", "P ∧ Q means both P and Q are true"),
                (
                    "Analyze implication",
                    "If (P ∧ Q) is true, then P must be true since P ∧ Q requires P to be true",
                ),
                (
                    "Verify truth table",
                    "When premise is false, implication is true. When premise is true, P is true, so implication is true",
                ),
            ],
            15,
        ),
        draft(
            "q4",
            "calculus",
            "Integrals",
            Complexity::Intermediate,
            "Evaluate the integral:",
            Some(r"\int_0^1 x^2 e^x dx"),
            ["e - 2", "e - 1", "e/2 - 1", "e - 3"],
            [
                (
                    "Apply integration by parts",
                    "Let u = x², dv = eˣdx. Then du = 2x dx, v = eˣ",
                ),
                (
                    "First iteration",
                    "x²eˣ - ∫2xeˣdx. Apply parts again for the integral",
                ),
                ("Evaluate bounds", "[x²eˣ - 2xeˣ + 2eˣ]₀¹ = e - 2"),
            ],
            25,
        ),
        draft(
            "q5",
            "statistics",
            "Probability",
            Complexity::Intermediate,
            "In a standard normal distribution, what is P(-1 < Z < 1)?",
            None,
            [
                "≈ 0.6827 (68.27%)",
                "≈ 0.9545 (95.45%)",
                "≈ 0.9973 (99.73%)",
                "≈ 0.5000 (50%)",
            ],
            [
                (
                    "Recall empirical rule",
                    "For normal distribution, ~68% of data falls within 1 standard deviation",
                ),
                ("Verify with z-table", "P(Z < 1) ≈ 0.8413, P(Z < -1) ≈ 0.1587"),
                (
                    "Calculate interval",
                    "P(-1 < Z < 1) = 0.8413 - 0.1587 ≈ 0.6827",
                ),
            ],
            20,
        ),
    ]
    .into_iter()
    .map(QuestionDraft::validate)
    .collect()
}

/// Upsert the built-in catalog into `storage`. Safe to run repeatedly.
///
/// # Errors
///
/// Returns `SampleError` if the catalog is malformed or a write fails.
pub async fn seed(storage: &Storage) -> Result<SeedReport, SampleError> {
    let subjects = subjects().map_err(quiz_core::Error::from)?;
    let questions = questions().map_err(quiz_core::Error::from)?;
    for subject in &subjects {
        storage.questions.upsert_subject(subject).await?;
    }
    for question in &questions {
        storage.questions.upsert_question(question).await?;
    }
    tracing::debug!(
        subjects = subjects.len(),
        questions = questions.len(),
        "seeded sample catalog"
    );
    Ok(SeedReport {
        subjects: subjects.len(),
        questions: questions.len(),
    })
}
