//! Question bank backed by a CSV file.

use std::{io, path::Path};

use rand::{
    Rng,
    seq::{IndexedRandom, SliceRandom},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::state::game::{MAX_DIFFICULTY, MIN_DIFFICULTY, Question};

/// Difficulty tolerance used when sampling around a target level.
pub const DEFAULT_TOLERANCE: u8 = 1;

/// Source of questions for the game loop.
pub trait QuestionProvider: Send + Sync {
    /// Up to `count` distinct questions, preferring levels within `tolerance` of `target`.
    ///
    /// Falls back to the whole bank when no question sits in the window and
    /// returns an empty list only when the bank itself is empty.
    fn sample(&self, count: usize, target: Option<u8>, tolerance: u8) -> Vec<Question>;
}

/// Errors raised while loading the question bank.
#[derive(Debug, Error)]
pub enum QuestionBankError {
    /// The CSV file could not be opened or parsed.
    #[error("failed to read question bank: {0}")]
    Csv(#[from] csv::Error),
    /// The file parsed but yielded no usable question.
    #[error("question bank is empty")]
    Empty,
}

/// A question as stored in the bank, before its options are shuffled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    /// Question text.
    pub text: String,
    /// The right answer.
    pub correct_answer: String,
    /// Wrong answers.
    pub wrong_answers: Vec<String>,
    /// Difficulty level (1-10).
    pub difficulty: u8,
}

impl QuestionRecord {
    fn to_question<R: Rng + ?Sized>(&self, rng: &mut R) -> Question {
        let mut options = Vec::with_capacity(self.wrong_answers.len() + 1);
        options.push(self.correct_answer.clone());
        options.extend(self.wrong_answers.iter().cloned());
        options.shuffle(rng);
        Question {
            text: self.text.clone(),
            options,
            correct_answer: self.correct_answer.clone(),
            difficulty: self.difficulty,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Question")]
    question: String,
    #[serde(rename = "Correct Answer")]
    correct_answer: String,
    #[serde(rename = "Wrong Answer 1")]
    wrong_answer_1: String,
    #[serde(rename = "Wrong Answer 2")]
    wrong_answer_2: String,
    #[serde(rename = "Wrong Answer 3")]
    wrong_answer_3: String,
    #[serde(rename = "Difficulty")]
    difficulty: f64,
}

impl From<CsvRow> for QuestionRecord {
    fn from(row: CsvRow) -> Self {
        let difficulty = row
            .difficulty
            .round()
            .clamp(f64::from(MIN_DIFFICULTY), f64::from(MAX_DIFFICULTY)) as u8;
        Self {
            text: row.question,
            correct_answer: row.correct_answer,
            wrong_answers: vec![row.wrong_answer_1, row.wrong_answer_2, row.wrong_answer_3],
            difficulty,
        }
    }
}

/// In-memory question bank.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    records: Vec<QuestionRecord>,
}

impl QuestionBank {
    /// Build a bank from already loaded records.
    pub fn from_records(records: Vec<QuestionRecord>) -> Self {
        Self { records }
    }

    /// Load the bank from a CSV file with `Question`, `Correct Answer`,
    /// `Wrong Answer 1..3` and `Difficulty` columns.
    pub fn from_csv_path(path: &Path) -> Result<Self, QuestionBankError> {
        let reader = csv::Reader::from_path(path)?;
        Self::from_csv(reader)
    }

    /// Load the bank from any CSV source.
    pub fn from_csv_reader<R: io::Read>(source: R) -> Result<Self, QuestionBankError> {
        Self::from_csv(csv::Reader::from_reader(source))
    }

    fn from_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self, QuestionBankError> {
        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            match row {
                Ok(row) => records.push(row.into()),
                Err(err) => warn!(row = line + 1, error = %err, "skipping malformed question row"),
            }
        }

        if records.is_empty() {
            return Err(QuestionBankError::Empty);
        }
        Ok(Self { records })
    }

    /// Number of questions in the bank.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the bank holds no question.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sampling with an explicit random source.
    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        count: usize,
        target: Option<u8>,
        tolerance: u8,
        rng: &mut R,
    ) -> Vec<Question> {
        let mut pool: Vec<&QuestionRecord> = self.records.iter().collect();
        if let Some(target) = target {
            let low = target.saturating_sub(tolerance).max(MIN_DIFFICULTY);
            let high = target.saturating_add(tolerance).min(MAX_DIFFICULTY);
            let window: Vec<&QuestionRecord> = pool
                .iter()
                .copied()
                .filter(|record| (low..=high).contains(&record.difficulty))
                .collect();
            if !window.is_empty() {
                pool = window;
            }
        }

        let picked: Vec<&QuestionRecord> = pool
            .choose_multiple(rng, count.min(pool.len()))
            .copied()
            .collect();
        picked
            .into_iter()
            .map(|record| record.to_question(rng))
            .collect()
    }
}

impl QuestionProvider for QuestionBank {
    fn sample(&self, count: usize, target: Option<u8>, tolerance: u8) -> Vec<Question> {
        self.sample_with(count, target, tolerance, &mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const CSV: &str = "\
Question,Correct Answer,Wrong Answer 1,Wrong Answer 2,Wrong Answer 3,Difficulty
Largest planet?,Jupiter,Mars,Venus,Saturn,1
Smallest prime?,2,1,3,0,2
Author of Dune?,Frank Herbert,Isaac Asimov,Arthur C. Clarke,Philip K. Dick,6
Broken row,only,three,columns
Speed of light (km/s)?,299792,150000,1000000,30000,9
";

    fn bank() -> QuestionBank {
        QuestionBank::from_csv_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn malformed_rows_are_skipped() {
        assert_eq!(bank().len(), 4);
    }

    #[test]
    fn empty_file_is_rejected() {
        let err = QuestionBank::from_csv_reader(
            "Question,Correct Answer,Wrong Answer 1,Wrong Answer 2,Wrong Answer 3,Difficulty\n"
                .as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, QuestionBankError::Empty));
    }

    #[test]
    fn sampling_stays_within_the_window() {
        let mut rng = StdRng::seed_from_u64(3);
        let questions = bank().sample_with(5, Some(1), 1, &mut rng);
        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.difficulty <= 2));
    }

    #[test]
    fn empty_window_falls_back_to_whole_bank() {
        let mut rng = StdRng::seed_from_u64(4);
        let questions = bank().sample_with(1, Some(4), 1, &mut rng);
        assert_eq!(questions.len(), 1);
    }

    #[test]
    fn sampled_questions_are_distinct_and_keep_the_answer() {
        let mut rng = StdRng::seed_from_u64(5);
        let questions = bank().sample_with(10, None, 1, &mut rng);
        assert_eq!(questions.len(), 4);

        let mut texts: Vec<&str> = questions.iter().map(|q| q.text.as_str()).collect();
        texts.sort_unstable();
        texts.dedup();
        assert_eq!(texts.len(), 4);

        for question in &questions {
            assert_eq!(question.options.len(), 4);
            assert!(question.options.contains(&question.correct_answer));
        }
    }

    #[test]
    fn empty_bank_samples_nothing() {
        let bank = QuestionBank::default();
        assert!(bank.sample(3, Some(5), 1).is_empty());
    }
}
