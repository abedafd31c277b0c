//! Body word index and the posting-list matcher.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::model::mail::Uid;
use crate::model::message::MimeMessage;
use crate::search::body::for_each_text;
use crate::search::words::Words;
use crate::search::Cancellable;
use crate::store::folder::Folder;

/// An inverted index from body words to the messages containing them.
pub trait BodyIndex {
    /// Every indexed word.
    fn words(&self) -> Box<dyn Iterator<Item = &str> + '_>;

    /// The posting list of one indexed word.
    fn find(&self, word: &str) -> Vec<Uid>;
}

/// A [`BodyIndex`] held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryIndex {
    postings: BTreeMap<String, Vec<Uid>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `word` occurs in message `uid`.
    pub fn add(&mut self, word: &str, uid: &Uid) {
        let list = self.postings.entry(word.to_lowercase()).or_default();
        if !list.iter().any(|u| u == uid) {
            list.push(uid.clone());
        }
    }

    /// Index every alphanumeric word of the message's text parts.
    pub fn index_message(&mut self, uid: &Uid, message: &MimeMessage) {
        let mut seen: HashSet<String> = HashSet::new();
        for_each_text(&message.body, &mut |text| {
            for word in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                seen.insert(word.to_lowercase());
            }
            true
        });
        for word in seen {
            self.add(&word, uid);
        }
    }

    /// Index every message of a folder. Messages that cannot be fetched are
    /// skipped.
    pub fn build(folder: &dyn Folder, cancel: &Cancellable) -> Self {
        let mut index = Self::new();
        for uid in folder.summary() {
            if cancel.is_cancelled() {
                break;
            }
            match folder.get_message(&uid) {
                Ok(message) => index.index_message(&uid, &message),
                Err(e) => debug!(uid = %uid, error = %e, "Skipping unindexable message"),
            }
        }
        index
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

impl BodyIndex for MemoryIndex {
    fn words(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.postings.keys().map(String::as_str))
    }

    fn find(&self, word: &str) -> Vec<Uid> {
        self.postings.get(word).cloned().unwrap_or_default()
    }
}

/// Messages containing every word of `words` according to the index.
///
/// Each index word that contains requested word `i` (case-insensitively)
/// sets bit `i` on every message it posts; a message matches once all bits
/// are set. Only uids in `candidates` are returned. On cancellation the
/// matches found so far are returned.
pub fn match_words_index(
    index: &dyn BodyIndex,
    words: &Words,
    candidates: &HashSet<Uid>,
    cancel: &Cancellable,
) -> Vec<Uid> {
    if cancel.is_cancelled() || words.is_empty() {
        return Vec::new();
    }

    let full = words.full_mask();
    let mut masks: HashMap<Uid, u32> = HashMap::new();
    let mut order: Vec<Uid> = Vec::new();

    'scan: for indexed in index.words() {
        let lowered = indexed.to_lowercase();
        for (i, word) in words.iter().enumerate() {
            if !lowered.contains(&word.text) {
                continue;
            }
            if cancel.is_cancelled() {
                break 'scan;
            }
            for uid in index.find(indexed) {
                if !candidates.contains(&uid) {
                    continue;
                }
                let mask = masks.entry(uid.clone()).or_insert_with(|| {
                    order.push(uid);
                    0
                });
                *mask |= 1 << i;
            }
        }
    }

    order
        .into_iter()
        .filter(|uid| masks.get(uid) == Some(&full))
        .collect()
}

/// Whether some index word containing `word` posts `uid`.
pub fn match_message_index(index: &dyn BodyIndex, uid: &str, word: &str) -> bool {
    let word = word.to_lowercase();
    let posted = index
        .words()
        .filter(|indexed| indexed.to_lowercase().contains(&word))
        .any(|indexed| index.find(indexed).iter().any(|u| &**u == uid));
    posted
}
