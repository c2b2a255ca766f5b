use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::fs;
use anyhow::{Context, Result};

use crate::game::Lexicon;

/// Word list indexed by letter count, then spelling
#[derive(Debug)]
pub struct Dictionary {
    words: HashMap<usize, HashSet<String>>,
}

impl Dictionary {
    /// Load dictionary from a file with one word per line
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read word list {}", path.display()))?;
        let dictionary = Self::from_words(content.lines());

        tracing::info!("Loaded {} words into dictionary", dictionary.len());

        Ok(dictionary)
    }

    /// Build a dictionary from words in any case. Entries shorter than two
    /// letters or containing anything but A-Z are skipped.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index: HashMap<usize, HashSet<String>> = HashMap::new();

        for word in words {
            let word = word.as_ref().trim().to_ascii_uppercase();
            if word.len() < 2 || !word.chars().all(|c| c.is_ascii_uppercase()) {
                continue;
            }
            index.entry(word.len()).or_default().insert(word);
        }

        Self { words: index }
    }

    /// Create an empty dictionary (for testing)
    pub fn empty() -> Self {
        Self {
            words: HashMap::new(),
        }
    }

    /// Get the number of words in the dictionary
    pub fn len(&self) -> usize {
        self.words.values().map(HashSet::len).sum()
    }

    /// Check if dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lexicon for Dictionary {
    fn contains(&self, word: &str) -> bool {
        let word = word.to_ascii_uppercase();
        self.words
            .get(&word.chars().count())
            .is_some_and(|bucket| bucket.contains(&word))
    }
}
