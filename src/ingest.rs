//! Comment ingestion
//!
//! Normalizes every data source into an ordered list of `CommentRecord`s.
//! The pipeline itself depends only on that shape.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Column '{column}' not found in CSV. Available columns: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("No usable comments in input")]
    Empty,
}

/// One input comment with an optional display label.
#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub text: String,
    pub label: Option<String>,
}

impl CommentRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
        }
    }
}

/// Built-in corpora for development and demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Fixture {
    Pets,
    Scifi,
}

impl Fixture {
    pub fn name(&self) -> &'static str {
        match self {
            Fixture::Pets => "pets",
            Fixture::Scifi => "scifi",
        }
    }
}

/// Load comments from a named column of a CSV file.
pub fn load_from_csv(path: &Path, column: &str) -> Result<Vec<CommentRecord>, IngestError> {
    if !path.exists() {
        return Err(IngestError::FileNotFound(path.display().to_string()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column_idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| IngestError::MissingColumn {
            column: column.to_string(),
            available: headers.iter().map(str::to_string).collect(),
        })?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(cell) = row.get(column_idx) {
            let text = cell.trim();
            if !text.is_empty() {
                records.push(CommentRecord::new(text));
            }
        }
    }

    if records.is_empty() {
        return Err(IngestError::Empty);
    }
    Ok(records)
}

/// Load comments from a literal list, dropping empties.
pub fn load_from_list(comments: &[String]) -> Result<Vec<CommentRecord>, IngestError> {
    let records: Vec<CommentRecord> = comments
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(CommentRecord::new)
        .collect();

    if records.is_empty() {
        return Err(IngestError::Empty);
    }
    Ok(records)
}

/// Built-in test corpora.
pub fn fixture(kind: Fixture) -> Vec<CommentRecord> {
    let comments: &[&str] = match kind {
        Fixture::Pets => &[
            "I love cats",
            "I really really love dogs",
            "I'm not sure about birds",
            "Cats are my favorite",
            "Dogs are the best",
            "No seriously dogs are great",
            "Birds I'm hesitant about",
            "Cats can be walked outside and they don't have to",
            "Dogs need to be walked regularly, every day",
            "Dogs can be trained to perform adorable moves on verbal command",
            "Can cats be trained?",
            "Dogs and cats are both adorable and fluffy",
            "Good pets are chill",
            "Cats are fantastic",
            "A goldfish is my top choice",
            "Lizards are scary",
            "Kittens are my favorite when they have snake-like scales",
            "Hairless cats are unique",
            "Flying lizards are majestic",
            "Kittens are so boring",
        ],
        Fixture::Scifi => &[
            "My favorite fantasy novel is Name of the Wind",
            "Terra Ignota is the best scifi series of all time",
            "Idk about Kim Stanley Robinson",
            "Name of the Wind is predictable and hard to read",
            "Some of Kim Stanley Robinson is boring",
            "Terra Ignota gets slow in the middle and hard to follow",
            "Ada Palmer is spectacular",
            "Becky Chambers has fantastic aliens in her work",
            "Ministry for the Future and Years of Rice and Salt are really comprehensive and compelling stories",
            "Do we still talk about Lord of the Rings or Game of Thrones or is epic fantasy over",
            "What about Ted Chiang he is so good",
            "Greg Egan is really good at characters and plot and hard science",
            "I never finished Accelerando",
            "Ministry for the Future is about the climate transition",
            "The climate crisis is a major theme in Ministry for the Future",
            "Ministry for the Future is about climate",
        ],
    };

    comments.iter().map(|c| CommentRecord::new(*c)).collect()
}
