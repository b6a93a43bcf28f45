// src/services/prompt.rs

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::models::quiz::GenerationOptions;

/// Schema name sent with structured-output requests.
pub const SCHEMA_NAME: &str = "mcq_quiz_generation";

pub const USER_INSTRUCTION: &str = "Please generate a quiz based on the following document(s).";

pub fn system_prompt(options: &GenerationOptions, now: DateTime<Utc>) -> String {
    let explanation_rule = if options.include_explanations {
        "Include a detailed explanation of why the correct answer is right"
    } else {
        "Keep questions clear and concise; explanations may be brief"
    };

    format!(
        "**Critical context: the current date is {date}. Base all reasoning on this date.** \
You are an expert educator creating high-quality multiple choice questions (MCQs) from the provided PDF document(s).

**INSTRUCTIONS:**
1. Read the document(s) thoroughly to understand their content and scope
2. Generate between {min} and {max} multiple choice questions
3. Scale the number of questions with the amount of meaningful content: fewer for short documents, more for comprehensive ones
4. Each question must have exactly 4 options with exactly one correct answer
5. Make incorrect options plausible but clearly wrong
6. {explanation_rule}
7. Language: {language}
8. Test understanding, not just memorization, across the main topics and key concepts
9. **Ignore non-substantive content such as tables of contents, course outlines, grading rubrics, reference lists and administrative boilerplate.**

**QUALITY REQUIREMENTS:**
- Questions must be clear, unambiguous and grammatically correct
- Avoid questions that can be answered without reading the document
- Cover different cognitive levels (knowledge, comprehension, application, analysis)
- Keep options roughly equal in length and complexity
- Never use \"all of the above\" or \"none of the above\" options
- Do not invent questions when there is not enough substantial content
- Label each question with a clear topic

Return a quiz in the structured output format with the fields: title, description, questions and metadata.",
        date = now.format("%A, %B %-d, %Y %H:%M UTC"),
        min = options.min_questions,
        max = options.max_questions,
        language = options.language,
    )
}

/// `response_format` value demanding the quiz JSON shape.
pub fn quiz_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "strict": true,
            "schema": {
                "title": SCHEMA_NAME,
                "description": "Generate a multiple choice quiz from PDF content",
                "type": "object",
                "additionalProperties": false,
                "required": ["quiz"],
                "properties": {
                    "quiz": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["title", "description", "questions", "metadata"],
                        "properties": {
                            "title": {
                                "type": "string",
                                "description": "A descriptive title for the quiz based on the PDF content"
                            },
                            "description": {
                                "type": "string",
                                "description": "A brief description of what the quiz covers"
                            },
                            "questions": {
                                "type": "array",
                                "description": "Array of multiple choice questions",
                                "items": {
                                    "type": "object",
                                    "additionalProperties": false,
                                    "required": ["id", "question", "options", "correctAnswer", "explanation", "topic"],
                                    "properties": {
                                        "id": { "type": "string", "description": "Question identifier (q1, q2, ...)" },
                                        "question": { "type": "string", "description": "The question text" },
                                        "options": {
                                            "type": "array",
                                            "items": { "type": "string" },
                                            "minItems": 4,
                                            "maxItems": 4,
                                            "description": "Exactly 4 answer options"
                                        },
                                        "correctAnswer": {
                                            "type": "integer",
                                            "minimum": 0,
                                            "maximum": 3,
                                            "description": "Index of the correct answer (0-3)"
                                        },
                                        "explanation": { "type": "string", "description": "Why this answer is correct" },
                                        "topic": { "type": "string", "description": "Topic this question covers" }
                                    }
                                }
                            },
                            "metadata": {
                                "type": "object",
                                "additionalProperties": false,
                                "required": ["totalQuestions", "estimatedDuration", "topics"],
                                "properties": {
                                    "totalQuestions": { "type": "integer", "minimum": 1 },
                                    "estimatedDuration": { "type": "integer", "minimum": 1, "description": "Minutes" },
                                    "topics": { "type": "array", "items": { "type": "string" } }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn options() -> GenerationOptions {
        GenerationOptions {
            language: "fr".into(),
            include_explanations: false,
            min_questions: 7,
            max_questions: 12,
            use_search: false,
        }
    }

    #[test]
    fn test_prompt_carries_options_and_date() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap();
        let prompt = system_prompt(&options(), now);
        assert!(prompt.contains("between 7 and 12"));
        assert!(prompt.contains("Language: fr"));
        assert!(prompt.contains("Wednesday, March 4, 2026"));
        assert!(prompt.contains("all of the above"));
        assert!(prompt.contains("tables of contents"));
    }

    #[test]
    fn test_response_format_is_strict_schema() {
        let format = quiz_response_format();
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], SCHEMA_NAME);
        assert_eq!(format["json_schema"]["strict"], true);
        let items = &format["json_schema"]["schema"]["properties"]["quiz"]["properties"]["questions"]["items"];
        assert_eq!(items["properties"]["options"]["maxItems"], 4);
    }
}
