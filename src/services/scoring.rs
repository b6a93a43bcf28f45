// src/services/scoring.rs

use chrono::{DateTime, Utc};

use crate::models::{
    quiz::Quiz,
    submission::{Performance, QuestionResult, SubmissionResult},
};

/// Below this percentage the response suggests reviewing the material.
const REVIEW_THRESHOLD: u32 = 60;

/// `round(correct / total * 100)`, 0 for an empty quiz.
pub fn percentage(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (correct as f64 / total as f64 * 100.0).round() as u32
}

/// Scores `answers` against the quiz's answer key. Answers are compared by
/// index; `None` and out-of-range indices count as incorrect.
pub fn score(
    quiz: &Quiz,
    answers: &[Option<i64>],
    time_taken: Option<u64>,
    submitted_at: DateTime<Utc>,
) -> SubmissionResult {
    let question_results: Vec<QuestionResult> = quiz
        .questions
        .iter()
        .zip(answers.iter().copied())
        .map(|(question, user_answer)| QuestionResult {
            question_id: question.id.clone(),
            user_answer,
            correct_answer: question.correct_answer,
            is_correct: user_answer == Some(i64::from(question.correct_answer)),
            question: question.question.clone(),
            options: question.options.clone(),
            explanation: question.explanation.clone(),
            topic: question.topic.clone(),
        })
        .collect();

    let total = quiz.questions.len();
    let correct = question_results.iter().filter(|r| r.is_correct).count();
    let pct = percentage(correct, total);

    SubmissionResult {
        quiz_id: quiz.id,
        submitted_at,
        total_questions: total,
        correct_answers: correct,
        incorrect_answers: total - correct,
        score: correct,
        percentage: pct,
        time_taken,
        performance: Performance::from_percentage(pct),
        question_results,
    }
}

pub fn suggestions(percentage: u32) -> Vec<String> {
    if percentage < REVIEW_THRESHOLD {
        vec![
            "Review the topics you found challenging".to_string(),
            "Try generating another quiz to practice more".to_string(),
        ]
    } else {
        vec!["Great job! Keep practicing to maintain your performance.".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{question::Question, quiz::QuizMetadata};
    use uuid::Uuid;

    fn quiz_with_answers(answers: &[u8]) -> Quiz {
        let questions = answers
            .iter()
            .enumerate()
            .map(|(i, correct)| Question {
                id: format!("q{}", i + 1),
                question: format!("Question {}", i + 1),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: *correct,
                explanation: None,
                topic: None,
            })
            .collect::<Vec<_>>();
        Quiz {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: String::new(),
            metadata: QuizMetadata {
                total_questions: questions.len(),
                estimated_duration: 5,
                topics: vec![],
                source_files: vec![],
                pdf_count: 1,
                pdf_size: 1,
                generated_at: Utc::now(),
                model: "m".into(),
                pdf_processing_engine: "native".into(),
            },
            questions,
            created_at: Utc::now(),
            source_files: vec![],
        }
    }

    #[test]
    fn test_scoring_example() {
        let quiz = quiz_with_answers(&[0, 1, 2]);
        let result = score(&quiz, &[Some(0), Some(1), Some(3)], Some(30), Utc::now());
        assert_eq!(result.correct_answers, 2);
        assert_eq!(result.incorrect_answers, 1);
        assert_eq!(result.score, 2);
        assert_eq!(result.percentage, 67);
        assert_eq!(result.performance, Performance::Good);
        assert!(!result.question_results[2].is_correct);
        assert_eq!(result.question_results[2].user_answer, Some(3));
    }

    #[test]
    fn test_unanswered_and_out_of_range_are_incorrect() {
        let quiz = quiz_with_answers(&[0, 1]);
        let result = score(&quiz, &[None, Some(-1)], None, Utc::now());
        assert_eq!(result.correct_answers, 0);
        assert_eq!(result.percentage, 0);
        assert_eq!(result.performance, Performance::NeedsImprovement);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn test_suggestions_by_threshold() {
        assert_eq!(suggestions(59).len(), 2);
        assert_eq!(suggestions(60).len(), 1);
    }
}
