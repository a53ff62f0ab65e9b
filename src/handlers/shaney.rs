//! The channel summariser.
//!
//! Builds order-2 Markov chains over the words of the channel buffer and
//! walks them into a handful of random sentences.  Pure nonsense, fondly
//! kept.  The screen prints its summary, reconnects the caller to the
//! channel and pops.

use crate::channel::{Channel, ChannelLine};
use crate::client::Conn;
use crate::handler::{Handler, Step};
use crate::state::State;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Window size: two words of context predict the third.
const CHAIN_LENGTH: usize = 3;

/// Attempts per sentence before the summary is cut short.
const MAX_ATTEMPTS: usize = 5;

/// Cap on one sentence walk; chains that never reach a recorded ending
/// count as a failed attempt instead of wandering forever.
const MAX_WALK: usize = 1000;

pub struct Summarizer {
    channel: Arc<Channel>,
    buffer: Vec<ChannelLine>,
    size: usize,
}

impl Summarizer {
    pub fn new(channel: Arc<Channel>, buffer: Vec<ChannelLine>, size: usize) -> Summarizer {
        Summarizer {
            channel,
            buffer,
            size,
        }
    }
}

/// Generates up to `size` distinct sentences from the buffer.
pub(crate) fn summarize(
    buffer: &[ChannelLine],
    size: usize,
    rng: &mut impl Rng,
) -> Vec<String> {
    let sentences: Vec<Vec<&str>> = buffer
        .iter()
        .map(|line| line.body.split_whitespace().collect::<Vec<&str>>())
        .filter(|words| words.len() >= CHAIN_LENGTH)
        .collect();
    if sentences.is_empty() {
        return Vec::new();
    }
    let size = size.min(sentences.len());

    let starts: Vec<&[&str]> = sentences.iter().map(|words| &words[..2]).collect();
    let stops: HashSet<&[&str]> = sentences
        .iter()
        .map(|words| &words[words.len() - CHAIN_LENGTH..])
        .collect();
    let mut chains: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
    for words in &sentences {
        for window in words.windows(CHAIN_LENGTH) {
            chains
                .entry((window[0], window[1]))
                .or_default()
                .push(window[2]);
        }
    }

    let mut cache: Vec<String> = Vec::new();
    'sentences: for _ in 0..size {
        for _ in 0..MAX_ATTEMPTS {
            let Some(sentence) = walk(&starts, &stops, &chains, rng) else {
                continue;
            };
            if !cache.contains(&sentence) {
                cache.push(sentence);
                continue 'sentences;
            }
        }
        // nothing fresh in several attempts, call it a day
        break;
    }
    cache
}

fn walk(
    starts: &[&[&str]],
    stops: &HashSet<&[&str]>,
    chains: &HashMap<(&str, &str), Vec<&str>>,
    rng: &mut impl Rng,
) -> Option<String> {
    let start = starts.choose(rng)?;
    let mut words: Vec<&str> = start.to_vec();
    for _ in 0..MAX_WALK {
        let key = (words[words.len() - 2], words[words.len() - 1]);
        let next = *chains.get(&key)?.choose(rng)?;
        words.push(next);
        if stops.contains(&words[words.len() - CHAIN_LENGTH..]) {
            return Some(words.join(" "));
        }
    }
    None
}

#[async_trait]
impl Handler for Summarizer {
    async fn handle(&mut self, conn: &mut Conn, _state: &Arc<State>) -> Step {
        let summary = summarize(&self.buffer, self.size, &mut rand::thread_rng());
        if summary.is_empty() {
            conn.print("There is nothing worth summarizing.")?;
        } else {
            let width = summary
                .iter()
                .map(|sentence| sentence.chars().count())
                .max()
                .unwrap_or(0);
            let rule = "~".repeat(width);
            conn.print(&rule)?;
            for sentence in &summary {
                conn.print(sentence)?;
            }
            conn.print(&rule)?;
        }
        let name = conn.name()?;
        self.channel
            .connect(conn.id(), &name, conn.client().clone())
            .await;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lines(bodies: &[&str]) -> Vec<ChannelLine> {
        bodies
            .iter()
            .map(|body| ChannelLine::new("alice", body))
            .collect()
    }

    #[test]
    fn short_lines_leave_nothing_to_say() {
        let mut rng = StdRng::seed_from_u64(7);
        let buffer = lines(&["hi", "yo there"]);
        assert!(summarize(&buffer, 3, &mut rng).is_empty());
    }

    #[test]
    fn a_single_sentence_comes_back_verbatim() {
        let mut rng = StdRng::seed_from_u64(7);
        let buffer = lines(&["the quick brown fox"]);
        let summary = summarize(&buffer, 4, &mut rng);
        assert_eq!(summary, vec!["the quick brown fox".to_owned()]);
    }

    #[test]
    fn sentences_are_made_of_buffer_words_and_are_distinct() {
        let mut rng = StdRng::seed_from_u64(42);
        let buffer = lines(&[
            "the cat sat on the mat",
            "the cat ate the fish",
            "a dog sat on the grass",
            "the fish swam over the grass",
        ]);
        let words: HashSet<&str> = buffer
            .iter()
            .flat_map(|l| l.body.split_whitespace())
            .collect();
        let summary = summarize(&buffer, 4, &mut rng);
        assert!(!summary.is_empty());
        assert!(summary.len() <= 4);
        for sentence in &summary {
            assert!(sentence.split_whitespace().all(|w| words.contains(w)));
            assert!(sentence.split_whitespace().count() >= CHAIN_LENGTH);
        }
        let distinct: HashSet<&String> = summary.iter().collect();
        assert_eq!(distinct.len(), summary.len());
    }

    #[test]
    fn the_request_size_caps_the_summary() {
        let mut rng = StdRng::seed_from_u64(1);
        let buffer = lines(&[
            "one two three four",
            "five six seven eight",
            "nine ten eleven twelve",
        ]);
        let summary = summarize(&buffer, 1, &mut rng);
        assert!(summary.len() <= 1);
    }
}
