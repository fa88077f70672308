//! Pure grading functions, one per question type. `grade` never touches
//! storage or the clock — it's a function of `(question, answer)` to a
//! score, nothing else.

use core_types::{Answer, Question, QuestionType};

/// `grade(question, answer) -> score in [0, max_points]`.
/// Mismatched question/answer type shapes score zero rather than panic —
/// a malformed submission is a zero, not a crash.
pub fn grade(question: &Question, answer: &Answer) -> f64 {
    let fraction = match (&question.content, answer) {
        (QuestionType::Mcq { correct_answers, .. }, Answer::Mcq { selected }) => {
            exact_set_match(correct_answers, selected) as u8 as f64
        }
        (QuestionType::Essay { .. }, Answer::Essay { .. }) => 0.0,
        (QuestionType::Matching { correct_answers, .. }, Answer::Matching { pairs }) => {
            proportional_pairs(correct_answers, pairs)
        }
        (QuestionType::MapLabeling { correct_answers, .. }, Answer::MapLabeling { pairs }) => {
            proportional_pairs(correct_answers, pairs)
        }
        (QuestionType::Completion { blanks, .. }, Answer::Completion { blanks: given }) => {
            proportional_blanks(blanks, given)
        }
        (QuestionType::SentenceCompletion { sentences }, Answer::SentenceCompletion { sentences: given }) => {
            proportional_blanks(sentences, given)
        }
        (QuestionType::ShortAnswer { sub_questions }, Answer::ShortAnswer { sub_answers }) => {
            proportional_sub_questions(sub_questions, sub_answers)
        }
        (QuestionType::Listening { sections, .. }, Answer::Listening { section_answers }) => {
            return listening_score(question, sections, section_answers);
        }
        _ => 0.0,
    };
    fraction * question.max_points
}

fn exact_set_match(correct: &[String], selected: &[String]) -> bool {
    if correct.len() != selected.len() {
        return false;
    }
    let mut correct_sorted = correct.to_vec();
    let mut selected_sorted = selected.to_vec();
    correct_sorted.sort();
    selected_sorted.sort();
    correct_sorted == selected_sorted
}

fn proportional_pairs(correct: &[(String, String)], given: &[(String, String)]) -> f64 {
    if correct.is_empty() {
        return 0.0;
    }
    let given_set: std::collections::HashSet<&(String, String)> = given.iter().collect();
    let matched = correct.iter().filter(|pair| given_set.contains(pair)).count();
    matched as f64 / correct.len() as f64
}

fn proportional_blanks(
    blanks: &[core_types::Blank],
    given: &std::collections::HashMap<String, String>,
) -> f64 {
    if blanks.is_empty() {
        return 0.0;
    }
    let correct = blanks
        .iter()
        .filter(|blank| {
            given
                .get(&blank.key)
                .map(|answer| is_accepted(&blank.accepted_answers, answer, blank.case_sensitive))
                .unwrap_or(false)
        })
        .count();
    correct as f64 / blanks.len() as f64
}

fn proportional_sub_questions(
    sub_questions: &[core_types::SubQuestion],
    given: &std::collections::HashMap<String, String>,
) -> f64 {
    if sub_questions.is_empty() {
        return 0.0;
    }
    let correct = sub_questions
        .iter()
        .filter(|sq| {
            given
                .get(&sq.key)
                .map(|answer| is_accepted(&sq.accepted_answers, answer, false))
                .unwrap_or(false)
        })
        .count();
    correct as f64 / sub_questions.len() as f64
}

fn is_accepted(accepted: &[String], given: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        accepted.iter().any(|a| a == given)
    } else {
        accepted.iter().any(|a| a.eq_ignore_ascii_case(given))
    }
}

/// Listening wraps other question types per section; the score is the
/// sum of section scores. Sections reuse the parent
/// question's `max_points` split evenly, since the schema has no
/// per-section point allocation of its own.
fn listening_score(parent: &Question, sections: &[QuestionType], given: &[Answer]) -> f64 {
    if sections.is_empty() {
        return 0.0;
    }
    let per_section_max = parent.max_points / sections.len() as f64;
    sections
        .iter()
        .zip(given.iter())
        .map(|(section_type, section_answer)| {
            let synthetic = Question {
                question_id: parent.question_id,
                prompt: String::new(),
                max_points: per_section_max,
                content: section_type.clone(),
            };
            grade(&synthetic, section_answer)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{McqOption, MatchingItem};

    fn q(content: QuestionType, max_points: f64) -> Question {
        Question {
            question_id: uuid::Uuid::new_v4(),
            prompt: "prompt".to_string(),
            max_points,
            content,
        }
    }

    #[test]
    fn mcq_requires_exact_set_no_partial_credit() {
        let question = q(
            QuestionType::Mcq {
                options: vec![
                    McqOption { key: "a".into(), label: "A".into() },
                    McqOption { key: "b".into(), label: "B".into() },
                ],
                correct_answers: vec!["a".into(), "b".into()],
                allow_multiple: true,
            },
            10.0,
        );
        let partial = Answer::Mcq { selected: vec!["a".into()] };
        assert_eq!(grade(&question, &partial), 0.0);

        let exact = Answer::Mcq { selected: vec!["b".into(), "a".into()] };
        assert_eq!(grade(&question, &exact), 10.0);
    }

    #[test]
    fn matching_is_proportional_and_empty_answer_scores_zero() {
        let question = q(
            QuestionType::Matching {
                left_items: vec![MatchingItem { key: "l1".into(), label: "L1".into() }],
                right_items: vec![MatchingItem { key: "r1".into(), label: "R1".into() }],
                correct_answers: vec![("l1".into(), "r1".into()), ("l2".into(), "r2".into())],
            },
            10.0,
        );
        let half = Answer::Matching { pairs: vec![("l1".into(), "r1".into())] };
        assert_eq!(grade(&question, &half), 5.0);

        let empty = Answer::Matching { pairs: vec![] };
        assert_eq!(grade(&question, &empty), 0.0);
    }

    #[test]
    fn completion_is_case_insensitive_unless_flagged() {
        let question = q(
            QuestionType::Completion {
                text_template: "The sky is ___".to_string(),
                blanks: vec![core_types::Blank {
                    key: "b1".into(),
                    accepted_answers: vec!["Blue".into()],
                    case_sensitive: false,
                }],
            },
            4.0,
        );
        let mut given = std::collections::HashMap::new();
        given.insert("b1".to_string(), "blue".to_string());
        let answer = Answer::Completion { blanks: given };
        assert_eq!(grade(&question, &answer), 4.0);
    }

    #[test]
    fn essay_is_never_auto_graded() {
        let question = q(QuestionType::Essay { prompt: "discuss".to_string() }, 20.0);
        let answer = Answer::Essay { text: "a perfect essay".to_string() };
        assert_eq!(grade(&question, &answer), 0.0);
    }

    #[test]
    fn listening_sums_section_scores() {
        let question = q(
            QuestionType::Listening {
                audio_url: "audio.mp3".to_string(),
                sections: vec![
                    QuestionType::Mcq {
                        options: vec![McqOption { key: "a".into(), label: "A".into() }],
                        correct_answers: vec!["a".into()],
                        allow_multiple: false,
                    },
                    QuestionType::Mcq {
                        options: vec![McqOption { key: "a".into(), label: "A".into() }],
                        correct_answers: vec!["a".into()],
                        allow_multiple: false,
                    },
                ],
            },
            10.0,
        );
        let answer = Answer::Listening {
            section_answers: vec![
                Answer::Mcq { selected: vec!["a".into()] },
                Answer::Mcq { selected: vec!["wrong".into()] },
            ],
        };
        assert_eq!(grade(&question, &answer), 5.0);
    }
}
