//! CSV record feeds.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use loadtest_core::{DataError, LoadTestError, LoadTestResult};

/// How sessions draw records from a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStrategy {
    /// Each record once, in file order.
    #[default]
    Queue,
    /// File order, starting over at the end.
    Circular,
    Random,
}

/// Row of the subjects feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubjectRecord {
    #[serde(rename = "externalId")]
    pub external_id: String,
}

/// Row of the topics feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicRecord {
    pub topic: String,
}

#[derive(Debug)]
pub struct Feed<T> {
    name: String,
    records: Vec<T>,
    strategy: FeedStrategy,
    cursor: AtomicUsize,
}

impl<T: Clone> Feed<T> {
    pub fn new(name: impl Into<String>, records: Vec<T>, strategy: FeedStrategy) -> Self {
        Self {
            name: name.into(),
            records,
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Reads a headed CSV file.
    pub fn from_path(path: impl AsRef<Path>, strategy: FeedStrategy) -> LoadTestResult<Self>
    where
        T: DeserializeOwned,
    {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| LoadTestError::Config(format!("cannot open feed {}: {}", path.display(), e)))?;
        Self::from_reader(path.display().to_string(), file, strategy)
    }

    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R, strategy: FeedStrategy) -> LoadTestResult<Self>
    where
        T: DeserializeOwned,
    {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let records = reader
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| LoadTestError::Config(format!("invalid feed {}: {}", name, e)))?;
        tracing::debug!(feed = %name, records = records.len(), "feed loaded");
        Ok(Self::new(name, records, strategy))
    }

    /// Keeps at most the first `len` records.
    pub fn truncate(mut self, len: usize) -> Self {
        self.records.truncate(len);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> FeedStrategy {
        self.strategy
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Next record for a session. An exhausted queue is a [`DataError`].
    pub fn next(&self) -> LoadTestResult<T> {
        if self.records.is_empty() {
            return Err(DataError::new(format!("feed {}", self.name), "records").into());
        }
        let index = match self.strategy {
            FeedStrategy::Queue => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed);
                if index >= self.records.len() {
                    return Err(DataError::new(
                        format!("feed {}", self.name),
                        format!("record #{} (feed holds {})", index + 1, self.records.len()),
                    )
                    .into());
                }
                index
            }
            FeedStrategy::Circular => self.cursor.fetch_add(1, Ordering::Relaxed) % self.records.len(),
            FeedStrategy::Random => rand::thread_rng().gen_range(0..self.records.len()),
        };
        Ok(self.records[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadtest_core::is_data_error;
    use std::io::Write;

    const USERS: &str = "externalId\nsub-1\n sub-2 \nsub-3\n";

    fn subjects(strategy: FeedStrategy) -> Feed<SubjectRecord> {
        Feed::from_reader("users.csv", USERS.as_bytes(), strategy).unwrap()
    }

    fn ids(feed: &Feed<SubjectRecord>, n: usize) -> Vec<String> {
        (0..n).map(|_| feed.next().unwrap().external_id).collect()
    }

    #[test]
    fn queue_hands_out_each_record_once() {
        let feed = subjects(FeedStrategy::Queue);
        assert_eq!(ids(&feed, 3), ["sub-1", "sub-2", "sub-3"]);
        assert!(is_data_error(&feed.next().unwrap_err()));
    }

    #[test]
    fn circular_starts_over() {
        let feed = subjects(FeedStrategy::Circular);
        assert_eq!(ids(&feed, 4), ["sub-1", "sub-2", "sub-3", "sub-1"]);
    }

    #[test]
    fn random_stays_within_the_feed() {
        let feed = subjects(FeedStrategy::Random);
        for id in ids(&feed, 20) {
            assert!(["sub-1", "sub-2", "sub-3"].contains(&id.as_str()));
        }
    }

    #[test]
    fn truncate_limits_participants() {
        let feed = subjects(FeedStrategy::Queue).truncate(2);
        assert_eq!(feed.len(), 2);
        assert_eq!(ids(&feed, 2), ["sub-1", "sub-2"]);
    }

    #[test]
    fn missing_column_is_a_config_error() {
        let err = Feed::<TopicRecord>::from_reader("topics.csv", "name\nfoo\n".as_bytes(), FeedStrategy::Queue)
            .unwrap_err();
        assert!(matches!(err, LoadTestError::Config(_)));
    }

    #[test]
    fn reads_topics_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "topic\nquestionnaire_response\nandroid_phone_acceleration").unwrap();
        let feed = Feed::<TopicRecord>::from_path(file.path(), FeedStrategy::Circular).unwrap();
        assert_eq!(feed.records()[1].topic, "android_phone_acceleration");

        let err = Feed::<TopicRecord>::from_path("/nonexistent/topics.csv", FeedStrategy::Queue).unwrap_err();
        assert!(matches!(err, LoadTestError::Config(_)));
    }

    #[test]
    fn empty_feed_is_a_data_error() {
        let feed: Feed<TopicRecord> = Feed::new("topics", Vec::new(), FeedStrategy::Circular);
        assert!(feed.is_empty());
        assert!(is_data_error(&feed.next().unwrap_err()));
    }
}
