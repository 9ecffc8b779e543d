//! Append-only journal describing the cache's contents.
//!
//! ```text
//! sketch.disk
//! 1
//! <cache version>
//!
//! CLEAN <hash> <size> <unix timestamp> <escaped key>
//! READ <hash>
//! REMOVE <hash>
//! ```
//!
//! Replaying the records in order reconstructs both the entry set and the
//! LRU order (every `CLEAN` and `READ` moves an entry to most recently used).

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub(crate) const JOURNAL_FILE: &str = "journal";
const JOURNAL_TMP_FILE: &str = "journal.tmp";
const MAGIC: &str = "sketch.disk";
const FORMAT: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Clean { hash: String, size: u64, committed_at: i64, key: String },
    Read { hash: String },
    Remove { hash: String },
}

impl Record {
    fn parse(line: &str) -> Option<Self> {
        let (op, rest) = line.split_once(' ')?;
        match op {
            "CLEAN" => {
                let mut parts = rest.splitn(4, ' ');
                let hash = parts.next()?.to_string();
                let size = parts.next()?.parse().ok()?;
                let committed_at = parts.next()?.parse().ok()?;
                let key = unescape(parts.next()?)?;
                Some(Record::Clean { hash, size, committed_at, key })
            },
            "READ" => Some(Record::Read { hash: rest.to_string() }),
            "REMOVE" => Some(Record::Remove { hash: rest.to_string() }),
            _ => None,
        }
    }

    fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        match self {
            Record::Clean { hash, size, committed_at, key } => {
                writeln!(w, "CLEAN {hash} {size} {committed_at} {}", escape(key))
            },
            Record::Read { hash } => writeln!(w, "READ {hash}"),
            Record::Remove { hash } => writeln!(w, "REMOVE {hash}"),
        }
    }
}

fn escape(key: &str) -> String {
    key.replace('\\', "\\\\").replace('\n', "\\n").replace('\r', "\\r")
}

fn unescape(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

fn header(version: u32) -> [String; 4] {
    [MAGIC.to_string(), FORMAT.to_string(), version.to_string(), String::new()]
}

/// What was found on disk when opening the journal.
#[derive(Debug)]
pub(crate) enum Replay {
    /// No journal yet: a fresh cache.
    Missing,
    /// Journal written by a different format or cache version.
    Mismatch,
    /// Records in write order, plus how many lines had to be skipped.
    Records(Vec<Record>, usize),
}

pub(crate) fn read(directory: &Path, version: u32) -> io::Result<Replay> {
    let file = match File::open(directory.join(JOURNAL_FILE)) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::Missing),
        Err(e) => return Err(e),
    };
    let mut lines = BufReader::new(file).lines();
    for expected in header(version) {
        match lines.next().transpose()? {
            Some(line) if line == expected => {},
            _ => return Ok(Replay::Mismatch),
        }
    }
    let mut records = Vec::new();
    let mut skipped = 0;
    for line in lines {
        // A torn final line from a crash mid-append is expected; anything
        // unparseable is skipped rather than failing the whole replay.
        match Record::parse(&line?) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }
    Ok(Replay::Records(records, skipped))
}

/// Appends records to the live journal, flushing after each one.
pub(crate) struct JournalWriter {
    file: BufWriter<File>,
}

impl JournalWriter {
    pub(crate) fn append(&mut self, record: &Record) -> io::Result<()> {
        record.write_to(&mut self.file)?;
        self.file.flush()
    }
}

/// Write a compacted journal containing only `records` and atomically swap
/// it in place of the current one.
pub(crate) fn rewrite<'a>(
    directory: &Path,
    version: u32,
    records: impl IntoIterator<Item = &'a Record>,
) -> io::Result<JournalWriter> {
    let tmp_path = directory.join(JOURNAL_TMP_FILE);
    {
        let mut tmp = BufWriter::new(File::create(&tmp_path)?);
        for line in header(version) {
            writeln!(tmp, "{line}")?;
        }
        for record in records {
            record.write_to(&mut tmp)?;
        }
        tmp.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    }
    fs::rename(&tmp_path, directory.join(JOURNAL_FILE))?;
    let file = fs::OpenOptions::new().append(true).open(directory.join(JOURNAL_FILE))?;
    Ok(JournalWriter { file: BufWriter::new(file) })
}

pub(crate) fn is_journal_file(name: &str) -> bool {
    name == JOURNAL_FILE || name == JOURNAL_TMP_FILE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("plain-key")]
    #[case("https://example.com/a b.png?_size=100x100")]
    #[case("multi\nline\r\nkey")]
    #[case("back\\slash\\n")]
    fn test_escape(#[case] key: &str) {
        assert!(!escape(key).contains('\n'));
        assert_eq!(unescape(&escape(key)).as_deref(), Some(key));
    }

    #[rstest]
    #[case("CLEAN abc 10 1700000000 key with spaces", Some(Record::Clean {
        hash: "abc".to_string(), size: 10, committed_at: 1_700_000_000, key: "key with spaces".to_string()
    }))]
    #[case("READ abc", Some(Record::Read { hash: "abc".to_string() }))]
    #[case("REMOVE abc", Some(Record::Remove { hash: "abc".to_string() }))]
    #[case("CLEAN abc ten 0 key", None)]
    #[case("CLEAN abc 10", None)]
    #[case("DIRTY abc", None)]
    #[case("", None)]
    fn test_parse(#[case] line: &str, #[case] expected: Option<Record>) {
        assert_eq!(Record::parse(line), expected);
    }

    #[test]
    fn test_rewrite_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            Record::Clean { hash: "h1".to_string(), size: 3, committed_at: 1, key: "k1".to_string() },
            Record::Read { hash: "h1".to_string() },
        ];
        let mut writer = rewrite(dir.path(), 7, &records).unwrap();
        writer.append(&Record::Remove { hash: "h1".to_string() }).unwrap();
        // Simulate a torn write.
        std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL_FILE))
            .unwrap()
            .write_all(b"CLEAN h2 5")
            .unwrap();

        match read(dir.path(), 7).unwrap() {
            Replay::Records(replayed, skipped) => {
                assert_eq!(replayed.len(), 3);
                assert_eq!(replayed[2], Record::Remove { hash: "h1".to_string() });
                assert_eq!(skipped, 1);
            },
            other => panic!("unexpected replay: {other:?}"),
        }
        assert!(matches!(read(dir.path(), 8).unwrap(), Replay::Mismatch));
    }

    #[test]
    fn test_read_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read(dir.path(), 1).unwrap(), Replay::Missing));
    }
}
