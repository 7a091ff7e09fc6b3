//! Reverse lookup: text to a sequence of sign labels.

const DEFAULT_TABLE: [(&str, &str); 30] = [
    ("hello", "HELLO"),
    ("hi", "HELLO"),
    ("hey", "HELLO"),
    ("goodbye", "GOODBYE"),
    ("bye", "GOODBYE"),
    ("welcome", "WELCOME"),
    ("yes", "YES"),
    ("yeah", "YES"),
    ("yep", "YES"),
    ("no", "NO"),
    ("nope", "NO"),
    ("thank you", "THANK_YOU"),
    ("thanks", "THANK_YOU"),
    ("please", "PLEASE"),
    ("sorry", "SORRY"),
    ("good", "GOOD"),
    ("bad", "BAD"),
    ("love", "LOVE"),
    ("i love you", "I_LOVE_YOU"),
    ("peace", "PEACE"),
    ("help", "HELP"),
    ("stop", "STOP"),
    ("wait", "WAIT"),
    ("go", "GO"),
    ("come", "COME"),
    ("eat", "EAT"),
    ("drink", "DRINK"),
    ("sleep", "SLEEP"),
    ("wake up", "WAKE_UP"),
    ("i don't understand", "I_DONT_UNDERSTAND"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Signs(Vec<String>),
    /// No word matched; spell the text letter by letter.
    FingerSpelling(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct TextToSign {
    /// (phrase words, sign)
    table: Vec<(Vec<String>, String)>,
    longest: usize,
}

impl Default for TextToSign {
    fn default() -> Self {
        let mut lookup = TextToSign {
            table: Vec::new(),
            longest: 1,
        };
        for (text, sign) in DEFAULT_TABLE {
            lookup.add_mapping(text, sign);
        }
        lookup
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

impl TextToSign {
    /// Add or replace a mapping. Signs are stored upper-case.
    pub fn add_mapping(&mut self, text: &str, sign: &str) {
        let words = tokenize(text);
        if words.is_empty() {
            return;
        }
        let sign = sign.trim().to_uppercase();
        self.longest = self.longest.max(words.len());
        match self.table.iter_mut().find(|(w, _)| *w == words) {
            Some(entry) => entry.1 = sign,
            None => self.table.push((words, sign)),
        }
    }

    fn lookup(&self, words: &[String]) -> Option<&str> {
        self.table
            .iter()
            .find(|(phrase, _)| phrase.as_slice() == words)
            .map(|(_, sign)| sign.as_str())
    }

    /// Greedy left-to-right scan preferring the longest phrase at each
    /// position. Words with no mapping are skipped.
    pub fn signs_for(&self, text: &str) -> Vec<String> {
        let words = tokenize(text);
        let mut signs = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let max = self.longest.min(words.len() - i);
            let found = (1..=max)
                .rev()
                .find_map(|n| self.lookup(&words[i..i + n]).map(|sign| (n, sign)));
            match found {
                Some((n, sign)) => {
                    signs.push(sign.to_string());
                    i += n;
                }
                None => i += 1,
            }
        }
        signs
    }

    pub fn translate(&self, text: &str) -> Translation {
        let signs = self.signs_for(text);
        if !signs.is_empty() {
            return Translation::Signs(signs);
        }
        Translation::FingerSpelling(
            text.chars()
                .filter(|c| c.is_alphanumeric())
                .map(|c| c.to_uppercase().to_string())
                .collect(),
        )
    }

    pub fn available_signs(&self) -> Vec<String> {
        let mut signs: Vec<String> = self.table.iter().map(|(_, s)| s.clone()).collect();
        signs.sort();
        signs.dedup();
        signs
    }
}
