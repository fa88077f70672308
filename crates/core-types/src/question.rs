//! Question types. Each question is a tagged variant; the grader in
//! `artifact-store::grading` switches on the discriminator rather than
//! probing attributes at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqOption {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingItem {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelPosition {
    pub key: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blank {
    pub key: String,
    pub accepted_answers: Vec<String>,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuestion {
    pub key: String,
    pub prompt: String,
    pub accepted_answers: Vec<String>,
}

/// Question content, keyed by `type` discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionType {
    Mcq {
        options: Vec<McqOption>,
        correct_answers: Vec<String>,
        allow_multiple: bool,
    },
    Essay {
        prompt: String,
    },
    Matching {
        left_items: Vec<MatchingItem>,
        right_items: Vec<MatchingItem>,
        /// `(left_key, right_key)` correct pairs.
        correct_answers: Vec<(String, String)>,
    },
    MapLabeling {
        image_url: String,
        label_positions: Vec<LabelPosition>,
        /// `(label_key, option_key)` correct pairs. Manual-only: never
        /// produced by AI generation.
        correct_answers: Vec<(String, String)>,
    },
    Completion {
        text_template: String,
        blanks: Vec<Blank>,
    },
    SentenceCompletion {
        sentences: Vec<Blank>,
    },
    ShortAnswer {
        sub_questions: Vec<SubQuestion>,
    },
    Listening {
        audio_url: String,
        sections: Vec<QuestionType>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: uuid::Uuid,
    pub prompt: String,
    pub max_points: f64,
    pub content: QuestionType,
}

/// Answer shapes, one per question type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    Mcq { selected: Vec<String> },
    Essay { text: String },
    Matching { pairs: Vec<(String, String)> },
    MapLabeling { pairs: Vec<(String, String)> },
    Completion { blanks: HashMap<String, String> },
    SentenceCompletion { sentences: HashMap<String, String> },
    ShortAnswer { sub_answers: HashMap<String, String> },
    Listening { section_answers: Vec<Answer> },
}
