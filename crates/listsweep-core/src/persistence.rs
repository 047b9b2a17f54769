use std::collections::HashMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::container::MessageEntry;
use crate::reconcile::Reconcilable;
use crate::sessions::SessionCursor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedEntry {
    Message {
        conversation: String,
        /// How many earlier history entries share this fingerprint. Identical messages, such
        /// as two plain "ok" replies, stay distinct through it.
        #[serde(default)]
        occurrence: usize,
        entry: MessageEntry,
    },
    Cursor {
        cursor: SessionCursor,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub seq: u64,
    pub ts_ms: i64,
    #[serde(flatten)]
    pub record: PersistedEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSnapshot {
    pub version: u8,
    pub seq: u64,
    pub cursor: Option<SessionCursor>,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation: String,
    pub entries: usize,
    pub last_fingerprint: Option<String>,
}

pub const SNAPSHOT_VERSION: u8 = 1;

/// Append-only JSONL log of every recorded message and session cursor.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    snapshot_path: PathBuf,
    next_seq: u64,
}

impl RecordStore {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existing = load_records(path.as_path())?;
        let next_seq = existing
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        let snapshot_path = path.with_extension("snapshot.json");
        Ok(Self {
            path,
            snapshot_path,
            next_seq,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: PersistedEntry) -> std::io::Result<u64> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let record = PersistedRecord {
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            record,
        };
        let line = serde_json::to_string(&record)
            .map_err(|err| std::io::Error::other(format!("serialize record: {err}")))?;
        append_line(self.path.as_path(), line.as_str())?;
        Ok(seq)
    }

    pub fn load(&self) -> std::io::Result<Vec<PersistedRecord>> {
        load_records(self.path.as_path())
    }

    pub fn load_since(&self, seq_exclusive: u64) -> std::io::Result<Vec<PersistedRecord>> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|record| record.seq > seq_exclusive)
            .collect())
    }

    /// Ordered, refined history of one conversation.
    pub fn history(&self, conversation: &str) -> std::io::Result<Vec<MessageEntry>> {
        Ok(replay_history(&self.load()?, conversation))
    }

    /// Appends the entries of `new` that are absent from `old` or were refined since,
    /// comparing repeated fingerprints occurrence by occurrence. Returns how many records
    /// were written.
    pub fn append_history(
        &mut self,
        conversation: &str,
        old: &[MessageEntry],
        new: &[MessageEntry],
    ) -> std::io::Result<usize> {
        let previous: HashMap<(&str, usize), &MessageEntry> = occurrences(old).zip(old).collect();
        let mut written = 0;
        for ((fingerprint, occurrence), entry) in occurrences(new).zip(new) {
            let unchanged = previous
                .get(&(fingerprint, occurrence))
                .is_some_and(|before| same_record(before, entry));
            if unchanged {
                continue;
            }
            self.append(PersistedEntry::Message {
                conversation: conversation.to_string(),
                occurrence,
                entry: entry.clone(),
            })?;
            written += 1;
        }
        Ok(written)
    }

    pub fn find_message(
        &self,
        conversation: &str,
        fingerprint: &str,
    ) -> std::io::Result<Option<MessageEntry>> {
        Ok(self
            .history(conversation)?
            .into_iter()
            .find(|entry| entry.fingerprint == fingerprint))
    }

    /// Most recent record of this exact cursor.
    pub fn find_cursor(&self, cursor: &SessionCursor) -> std::io::Result<Option<PersistedRecord>> {
        Ok(self.load()?.into_iter().rev().find(|record| {
            matches!(&record.record, PersistedEntry::Cursor { cursor: stored } if stored == cursor)
        }))
    }

    pub fn latest_cursor(&self) -> std::io::Result<Option<SessionCursor>> {
        Ok(self
            .load()?
            .into_iter()
            .rev()
            .find_map(|record| match record.record {
                PersistedEntry::Cursor { cursor } => Some(cursor),
                PersistedEntry::Message { .. } => None,
            }))
    }

    pub fn snapshot(&self) -> std::io::Result<SweepSnapshot> {
        let records = self.load()?;
        Ok(build_snapshot(&records))
    }

    pub fn save_snapshot(&self, snapshot: &SweepSnapshot) -> std::io::Result<()> {
        let encoded = serde_json::to_vec(snapshot)
            .map_err(|err| std::io::Error::other(format!("serialize snapshot: {err}")))?;
        std::fs::write(&self.snapshot_path, encoded)
    }

    pub fn load_snapshot(&self) -> std::io::Result<Option<SweepSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.snapshot_path)?;
        let snapshot = serde_json::from_slice::<SweepSnapshot>(&bytes)
            .map_err(|err| std::io::Error::other(format!("parse snapshot: {err}")))?;
        Ok(Some(snapshot))
    }
}

/// `(fingerprint, n)` for each entry, where `n` counts earlier entries with the same
/// fingerprint.
fn occurrences(entries: &[MessageEntry]) -> impl Iterator<Item = (&str, usize)> + '_ {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    entries.iter().map(move |entry| {
        let count = seen.entry(entry.fingerprint.as_str()).or_insert(0);
        let occurrence = *count;
        *count += 1;
        (entry.fingerprint.as_str(), occurrence)
    })
}

/// Equality of everything that gets written; `handled` is run-local.
fn same_record(stored: &MessageEntry, current: &MessageEntry) -> bool {
    let mut stored = stored.clone();
    stored.handled = current.handled;
    stored == *current
}

/// Rebuilds a conversation's history: the first record of a `(fingerprint, occurrence)` pair
/// fixes its position, later records refine its fields.
pub fn replay_history(records: &[PersistedRecord], conversation: &str) -> Vec<MessageEntry> {
    let mut history: Vec<MessageEntry> = Vec::new();
    let mut index: HashMap<(String, usize), usize> = HashMap::new();
    for record in records {
        let PersistedEntry::Message {
            conversation: owner,
            occurrence,
            entry,
        } = &record.record
        else {
            continue;
        };
        if owner != conversation {
            continue;
        }
        let key = (entry.fingerprint.clone(), *occurrence);
        match index.get(&key) {
            Some(&slot) => history[slot].refine(entry),
            None => {
                index.insert(key, history.len());
                history.push(entry.clone());
            }
        }
    }
    history
}

pub fn build_snapshot(records: &[PersistedRecord]) -> SweepSnapshot {
    let mut order: Vec<String> = Vec::new();
    for record in records {
        if let PersistedEntry::Message { conversation, .. } = &record.record {
            if !order.contains(conversation) {
                order.push(conversation.clone());
            }
        }
    }
    let conversations = order
        .into_iter()
        .map(|conversation| {
            let history = replay_history(records, &conversation);
            ConversationSummary {
                entries: history.len(),
                last_fingerprint: history.last().map(|entry| entry.fingerprint.clone()),
                conversation,
            }
        })
        .collect();
    let cursor = records.iter().rev().find_map(|record| match &record.record {
        PersistedEntry::Cursor { cursor } => Some(cursor.clone()),
        PersistedEntry::Message { .. } => None,
    });
    SweepSnapshot {
        version: SNAPSHOT_VERSION,
        seq: records.iter().map(|record| record.seq).max().unwrap_or(0),
        cursor,
        conversations,
    }
}

fn load_records(path: &Path) -> std::io::Result<Vec<PersistedRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PersistedRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("skipping unreadable record in {}: {err}", path.display()),
        }
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::container::MessageFlags;
    use crate::container::MessageKind;
    use crate::fingerprint::Fingerprinter;
    use crate::geometry::Rect;

    fn message(speaker: &str, summary: &str) -> MessageEntry {
        let bounds = Rect::new(0, 400, 1080, 600);
        MessageEntry {
            speaker: speaker.to_string(),
            summary: summary.to_string(),
            kind: MessageKind::Text,
            is_own: false,
            timestamp: Some("10:02".to_string()),
            voice_seconds: None,
            transcript: None,
            fingerprint: Fingerprinter::new().message(speaker, summary, Some("10:02")),
            click_point: bounds.center(),
            bounds,
            flags: MessageFlags::default(),
            media_path: None,
            handled: false,
        }
    }

    fn cursor(name: &str) -> SessionCursor {
        SessionCursor {
            name: name.to_string(),
            subtitle: "hi".to_string(),
            time: "09:00".to_string(),
            unread: 1,
        }
    }

    #[test]
    fn append_records_are_monotonic() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("records.jsonl");
        let mut store = RecordStore::open(&path).expect("open store");
        let first = store
            .append(PersistedEntry::Cursor { cursor: cursor("a") })
            .expect("append");
        let second = store
            .append(PersistedEntry::Cursor { cursor: cursor("b") })
            .expect("append");
        assert_eq!((first, second), (1, 2));

        let reopened = RecordStore::open(&path).expect("reopen");
        assert_eq!(reopened.next_seq, 3);
        assert_eq!(reopened.load_since(1).expect("load").len(), 1);
    }

    #[test]
    fn record_lines_are_flat_json() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("records.jsonl");
        let mut store = RecordStore::open(&path).expect("open store");
        store
            .append(PersistedEntry::Cursor { cursor: cursor("a") })
            .expect("append");
        let raw = std::fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(raw.trim()).expect("json line");
        assert_eq!(value["kind"], "cursor");
        assert_eq!(value["seq"], 1);
        assert_eq!(value["cursor"]["name"], "a");
    }

    #[test]
    fn append_history_writes_only_new_or_refined_entries() {
        let dir = tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path().join("records.jsonl")).expect("open store");
        let old = vec![message("Alice", "one"), message("Bob", "two")];
        assert_eq!(store.append_history("team", &[], &old).expect("append"), 2);

        let mut new = old.clone();
        new[1].media_path = Some("media/two.png".to_string());
        new.push(message("Alice", "three"));
        assert_eq!(store.append_history("team", &old, &new).expect("append"), 2);

        let history = store.history("team").expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].media_path.as_deref(), Some("media/two.png"));
        assert_eq!(
            store
                .find_message("team", &new[2].fingerprint)
                .expect("find")
                .map(|entry| entry.summary),
            Some("three".to_string())
        );
        assert_eq!(store.history("other").expect("history"), Vec::new());
    }

    #[test]
    fn identical_messages_survive_a_round_trip() {
        let dir = tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path().join("records.jsonl")).expect("open store");
        let committed = vec![message("Bob", "ok"), message("Alice", "sure"), message("Bob", "ok")];
        assert_eq!(store.append_history("c", &[], &committed).expect("append"), 3);

        let replayed = store.history("c").expect("history");
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed, committed);
        assert_eq!(store.append_history("c", &replayed, &committed).expect("append"), 0);

        let mut refined = committed.clone();
        refined[2].media_path = Some("media/ok.png".to_string());
        assert_eq!(store.append_history("c", &committed, &refined).expect("append"), 1);
        let replayed = store.history("c").expect("history");
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[0].media_path, None);
        assert_eq!(replayed[2].media_path.as_deref(), Some("media/ok.png"));
    }

    #[test]
    fn records_without_an_occurrence_read_as_the_first() {
        let line = serde_json::json!({
            "seq": 1,
            "ts_ms": 0,
            "kind": "message",
            "conversation": "c",
            "entry": serde_json::to_value(message("Bob", "ok")).expect("encode"),
        });
        let record: PersistedRecord = serde_json::from_value(line).expect("decode");
        assert!(matches!(
            record.record,
            PersistedEntry::Message { occurrence: 0, .. }
        ));
    }

    #[test]
    fn replay_keeps_first_position_and_refines_fields() {
        let first = message("Alice", "[sent a 4s voice]");
        let mut refined = first.clone();
        refined.summary = "[sent a 4s voice] hello".to_string();
        refined.transcript = Some("hello".to_string());
        let records: Vec<PersistedRecord> = [first, message("Bob", "x"), refined]
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| PersistedRecord {
                seq: idx as u64 + 1,
                ts_ms: 0,
                record: PersistedEntry::Message {
                    conversation: "c".to_string(),
                    occurrence: 0,
                    entry,
                },
            })
            .collect();
        let history = replay_history(&records, "c");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].summary, "[sent a 4s voice] hello");
        assert_eq!(history[0].transcript.as_deref(), Some("hello"));
        assert_eq!(history[1].speaker, "Bob");
    }

    #[test]
    fn cursors_and_snapshot() {
        let dir = tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path().join("records.jsonl")).expect("open store");
        assert_eq!(store.latest_cursor().expect("cursor"), None);
        assert_eq!(store.load_snapshot().expect("snapshot"), None);

        store
            .append(PersistedEntry::Cursor { cursor: cursor("a") })
            .expect("append");
        store
            .append_history("team", &[], &[message("Alice", "one")])
            .expect("append");
        store
            .append(PersistedEntry::Cursor { cursor: cursor("b") })
            .expect("append");

        assert_eq!(store.latest_cursor().expect("cursor"), Some(cursor("b")));
        assert_eq!(
            store.find_cursor(&cursor("a")).expect("find").map(|r| r.seq),
            Some(1)
        );
        assert_eq!(store.find_cursor(&cursor("z")).expect("find"), None);

        let snapshot = store.snapshot().expect("snapshot");
        assert_eq!(snapshot.seq, 3);
        assert_eq!(snapshot.cursor, Some(cursor("b")));
        assert_eq!(snapshot.conversations.len(), 1);
        assert_eq!(snapshot.conversations[0].entries, 1);
        store.save_snapshot(&snapshot).expect("save");
        assert_eq!(store.load_snapshot().expect("load"), Some(snapshot));
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("records.jsonl");
        std::fs::write(&path, "not json\n\n").expect("seed");
        let mut store = RecordStore::open(&path).expect("open store");
        assert!(store.load().expect("load").is_empty());
        assert_eq!(
            store
                .append(PersistedEntry::Cursor { cursor: cursor("a") })
                .expect("append"),
            1
        );
        assert_eq!(store.load().expect("load").len(), 1);
    }
}
